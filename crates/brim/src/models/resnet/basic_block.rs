//! # Basic Block for `ResNet`
//!
//! [`BasicBlock`] is the two-conv residual unit of the shallow (18, 34)
//! `ResNet` depths:
//!
//! ```text
//! y = relu(conv1(conv0(x)) + short(x))
//! ```
//!
//! [`BasicBlockMeta`] defines a common meta API for [`BasicBlock`]
//! and [`BasicBlockConfig`].

use crate::compat::conv_shape::expect_conv1d_output_size;
use crate::errors::ConfigurationError;
use crate::layers::blocks::conv_unit::{ConvUnit, ConvUnitConfig, ConvUnitMeta};
use crate::models::resnet::shortcut::ProjectionShortcutConfig;
use crate::utility::params::{ParamDescriptor, ParamInventory, RecordShapes, join_path};
use bimm_contracts::{assert_shape_contract_periodically, unpack_shape_contract};
use burn::config::Config;
use burn::module::Module;
use burn::nn::Relu;
use burn::prelude::{Backend, Tensor};

/// [`BasicBlock`] Meta trait.
pub trait BasicBlockMeta {
    /// The size of the in channels dimension.
    fn in_channels(&self) -> usize;

    /// Base filter count; also the output channels.
    fn filters(&self) -> usize;

    /// The stride of the first convolution.
    fn stride(&self) -> usize;

    /// Is the skip connection projected?
    fn has_projection_shortcut(&self) -> bool;

    /// The size of the out channels dimension.
    fn out_channels(&self) -> usize {
        self.filters()
    }

    /// Get the output resolution for a given input resolution.
    ///
    /// ``out = ceil(in / stride)``
    fn output_resolution(
        &self,
        input_resolution: [usize; 2],
    ) -> [usize; 2] {
        input_resolution.map(|size| expect_conv1d_output_size(size, 3, self.stride(), 1, 1))
    }
}

/// [`BasicBlock`] Config.
///
/// Implements [`BasicBlockMeta`].
#[derive(Config, Debug)]
pub struct BasicBlockConfig {
    /// The size of the in channels dimension.
    pub in_channels: usize,

    /// Base filter count.
    pub filters: usize,

    /// The stride of the first convolution.
    #[config(default = 1)]
    pub stride: usize,

    /// Identity skip connection when true; projection when false.
    #[config(default = "false")]
    pub shortcut: bool,

    /// Projection strides directly instead of pooling first.
    #[config(default = "true")]
    pub is_first_unit_of_first_stage: bool,

    /// Learning-rate multiplier.
    #[config(default = "1.0")]
    pub lr_multiplier: f64,
}

impl BasicBlockMeta for BasicBlockConfig {
    fn in_channels(&self) -> usize {
        self.in_channels
    }

    fn filters(&self) -> usize {
        self.filters
    }

    fn stride(&self) -> usize {
        self.stride
    }

    fn has_projection_shortcut(&self) -> bool {
        !self.shortcut
    }
}

impl BasicBlockConfig {
    /// Check that an identity shortcut is shape-preserving.
    pub fn try_validate(&self) -> Result<(), ConfigurationError> {
        if self.shortcut && (self.stride != 1 || self.in_channels != self.out_channels()) {
            return Err(ConfigurationError::InvalidBlock(format!(
                "identity shortcut requires stride 1 and matching channels; got stride {} and {} -> {}",
                self.stride,
                self.in_channels,
                self.out_channels(),
            )));
        }
        Ok(())
    }

    /// Initialize a [`BasicBlock`].
    ///
    /// # Panics
    ///
    /// If [`BasicBlockConfig::try_validate`] fails.
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> BasicBlock<B> {
        if let Err(err) = self.try_validate() {
            panic!("{err}");
        }

        BasicBlock {
            conv0: ConvUnitConfig::new(self.in_channels, self.filters, 3)
                .with_stride(self.stride)
                .with_lr_multiplier(self.lr_multiplier)
                .init(device),
            conv1: ConvUnitConfig::new(self.filters, self.filters, 3)
                .with_act(false)
                .with_lr_multiplier(self.lr_multiplier)
                .init(device),
            short: self.has_projection_shortcut().then(|| {
                ProjectionShortcutConfig::new(self.in_channels, self.out_channels())
                    .with_stride(self.stride)
                    .with_is_first_unit_of_first_stage(self.is_first_unit_of_first_stage)
                    .with_lr_multiplier(self.lr_multiplier)
                    .init(device)
            }),
            act: Relu::new(),
        }
    }
}

/// Basic Block for `ResNet`.
///
/// Implements [`BasicBlockMeta`].
#[derive(Module, Debug)]
pub struct BasicBlock<B: Backend> {
    /// 3x3 conv with stride and ReLU.
    pub conv0: ConvUnit<B>,

    /// 3x3 conv without activation.
    pub conv1: ConvUnit<B>,

    /// Optional projection of the skip connection.
    pub short: Option<ConvUnit<B>>,

    /// Post-addition activation.
    pub act: Relu,
}

impl<B: Backend> BasicBlockMeta for BasicBlock<B> {
    fn in_channels(&self) -> usize {
        self.conv0.in_channels()
    }

    fn filters(&self) -> usize {
        self.conv1.out_channels()
    }

    fn stride(&self) -> usize {
        self.conv0.stride()
    }

    fn has_projection_shortcut(&self) -> bool {
        self.short.is_some()
    }
}

impl<B: Backend> BasicBlock<B> {
    /// Forward Pass.
    ///
    /// # Arguments
    ///
    /// - `input`: ``[batch, in_channels, in_height, in_width]``.
    ///
    /// # Returns
    ///
    /// ``[batch, out_channels, out_height, out_width]``
    pub fn forward(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        let [batch, in_height, in_width] = unpack_shape_contract!(
            ["batch", "in_channels", "in_height", "in_width"],
            &input,
            &["batch", "in_height", "in_width"],
            &[("in_channels", self.in_channels())]
        );
        let [out_height, out_width] = self.output_resolution([in_height, in_width]);

        let identity = match &self.short {
            Some(short) => short.forward(input.clone()),
            None => input.clone(),
        };

        let x = self.conv0.forward(input);
        let x = self.conv1.forward(x);
        let x = self.act.forward(x + identity);

        assert_shape_contract_periodically!(
            ["batch", "out_channels", "out_height", "out_width"],
            &x,
            &[
                ("batch", batch),
                ("out_channels", self.out_channels()),
                ("out_height", out_height),
                ("out_width", out_width)
            ]
        );

        x
    }
}

impl<B: Backend> ParamInventory for BasicBlock<B> {
    fn collect_params(
        &self,
        prefix: &str,
        params: &mut Vec<ParamDescriptor>,
    ) {
        self.conv0.collect_params(&join_path(prefix, "conv0"), params);
        self.conv1.collect_params(&join_path(prefix, "conv1"), params);
        if let Some(short) = &self.short {
            short.collect_params(&join_path(prefix, "short"), params);
        }
    }
}

impl<B: Backend> RecordShapes for BasicBlockRecord<B> {
    fn collect_shapes(
        &self,
        prefix: &str,
        shapes: &mut Vec<(String, Vec<usize>)>,
    ) {
        self.conv0.collect_shapes(&join_path(prefix, "conv0"), shapes);
        self.conv1.collect_shapes(&join_path(prefix, "conv1"), shapes);
        if let Some(short) = &self.short {
            short.collect_shapes(&join_path(prefix, "short"), shapes);
        }
    }
}
