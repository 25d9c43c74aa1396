//! # Bottleneck Block for `ResNet`
//!
//! [`BottleneckBlock`] is the three-conv residual unit of the deep (50+)
//! `ResNet` depths. It reduces to `filters` channels with a 1x1 conv,
//! applies the strided 3x3 conv, then expands to `filters * 4`.
//!
//! [`BottleneckBlockMeta`] defines a common meta API for [`BottleneckBlock`]
//! and [`BottleneckBlockConfig`].

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

/// Output channels per base filter of a [`BottleneckBlock`].
pub const BOTTLENECK_EXPANSION: usize = 4;

/// [`BottleneckBlock`] Meta trait.
pub trait BottleneckBlockMeta {
    /// The size of the in channels dimension.
    fn in_channels(&self) -> usize;

    /// Base filter count; the width of the reduced path.
    fn filters(&self) -> usize;

    /// The stride of the 3x3 convolution.
    fn stride(&self) -> usize;

    /// Is the skip connection projected?
    fn has_projection_shortcut(&self) -> bool;

    /// The size of the out channels dimension.
    ///
    /// ``out_channels = filters * 4``
    fn out_channels(&self) -> usize {
        self.filters() * BOTTLENECK_EXPANSION
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

/// [`BottleneckBlock`] Config.
///
/// Implements [`BottleneckBlockMeta`].
#[derive(Config, Debug)]
pub struct BottleneckBlockConfig {
    /// The size of the in channels dimension.
    pub in_channels: usize,

    /// Base filter count.
    pub filters: usize,

    /// The stride of the 3x3 convolution.
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

impl BottleneckBlockMeta for BottleneckBlockConfig {
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

impl BottleneckBlockConfig {
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

    /// Initialize a [`BottleneckBlock`].
    ///
    /// # Panics
    ///
    /// If [`BottleneckBlockConfig::try_validate`] fails.
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> BottleneckBlock<B> {
        if let Err(err) = self.try_validate() {
            panic!("{err}");
        }

        let out_channels = self.out_channels();
        let lr = self.lr_multiplier;

        BottleneckBlock {
            conv0: ConvUnitConfig::new(self.in_channels, self.filters, 1)
                .with_lr_multiplier(lr)
                .init(device),
            conv1: ConvUnitConfig::new(self.filters, self.filters, 3)
                .with_stride(self.stride)
                .with_lr_multiplier(lr)
                .init(device),
            conv2: ConvUnitConfig::new(self.filters, out_channels, 1)
                .with_act(false)
                .with_lr_multiplier(lr)
                .init(device),
            short: self.has_projection_shortcut().then(|| {
                ProjectionShortcutConfig::new(self.in_channels, out_channels)
                    .with_stride(self.stride)
                    .with_is_first_unit_of_first_stage(self.is_first_unit_of_first_stage)
                    .with_lr_multiplier(lr)
                    .init(device)
            }),
            act: Relu::new(),
        }
    }
}

/// Bottleneck Block for `ResNet`.
///
/// Implements [`BottleneckBlockMeta`].
#[derive(Module, Debug)]
pub struct BottleneckBlock<B: Backend> {
    /// 1x1 reduce with ReLU.
    pub conv0: ConvUnit<B>,

    /// 3x3 conv with stride and ReLU.
    pub conv1: ConvUnit<B>,

    /// 1x1 expand without activation.
    pub conv2: ConvUnit<B>,

    /// Optional projection of the skip connection.
    pub short: Option<ConvUnit<B>>,

    /// Post-addition activation.
    pub act: Relu,
}

impl<B: Backend> BottleneckBlockMeta for BottleneckBlock<B> {
    fn in_channels(&self) -> usize {
        self.conv0.in_channels()
    }

    fn filters(&self) -> usize {
        self.conv0.out_channels()
    }

    fn stride(&self) -> usize {
        self.conv1.stride()
    }

    fn has_projection_shortcut(&self) -> bool {
        self.short.is_some()
    }

    fn out_channels(&self) -> usize {
        self.conv2.out_channels()
    }
}

impl<B: Backend> BottleneckBlock<B> {
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

        assert_shape_contract_periodically!(
            ["batch", "filters", "out_height", "out_width"],
            &x,
            &[
                ("batch", batch),
                ("filters", self.filters()),
                ("out_height", out_height),
                ("out_width", out_width)
            ]
        );

        let x = self.conv2.forward(x);
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

impl<B: Backend> ParamInventory for BottleneckBlock<B> {
    fn collect_params(
        &self,
        prefix: &str,
        params: &mut Vec<ParamDescriptor>,
    ) {
        self.conv0.collect_params(&join_path(prefix, "conv0"), params);
        self.conv1.collect_params(&join_path(prefix, "conv1"), params);
        self.conv2.collect_params(&join_path(prefix, "conv2"), params);
        if let Some(short) = &self.short {
            short.collect_params(&join_path(prefix, "short"), params);
        }
    }
}

impl<B: Backend> RecordShapes for BottleneckBlockRecord<B> {
    fn collect_shapes(
        &self,
        prefix: &str,
        shapes: &mut Vec<(String, Vec<usize>)>,
    ) {
        self.conv0.collect_shapes(&join_path(prefix, "conv0"), shapes);
        self.conv1.collect_shapes(&join_path(prefix, "conv1"), shapes);
        self.conv2.collect_shapes(&join_path(prefix, "conv2"), shapes);
        if let Some(short) = &self.short {
            short.collect_shapes(&join_path(prefix, "short"), shapes);
        }
    }
}
