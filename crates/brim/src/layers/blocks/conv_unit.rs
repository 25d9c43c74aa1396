//! # `ConvUnit` - [pool]/conv/norm/[activation] block.
//!
//! A [`ConvUnit`] module is:
//! * an optional 2x2 / stride 2 ceiling-mode [`AvgPool2dCeil`] pre-downsample,
//! * a bias-free [`Conv2d`] layer with ``(kernel_size - 1) / 2`` padding,
//! * a [`BatchNorm`] layer,
//! * an optional [`Relu`] activation.
//!
//! [`ConvUnitMeta`] defines a common meta API for [`ConvUnit`]
//! and [`ConvUnitConfig`].

use crate::compat::conv_shape::{expect_conv1d_output_size, maybe_conv1d_output_size, same_padding};
use crate::layers::pool::{AvgPool2dCeil, AvgPool2dCeilConfig};
use crate::utility::params::{
    ParamDescriptor, ParamInventory, RecordShapes, describe_param, join_path, param_shape,
};
use bimm_contracts::{assert_shape_contract_periodically, unpack_shape_contract};
use burn::config::Config;
use burn::module::{Ignored, Module};
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::{BatchNorm, BatchNormConfig, PaddingConfig2d, Relu};
use burn::prelude::{Backend, Tensor};

/// [`ConvUnit`] Meta.
pub trait ConvUnitMeta {
    /// Number of input channels.
    fn in_channels(&self) -> usize;

    /// Number of output channels.
    fn out_channels(&self) -> usize;

    /// Square kernel size.
    fn kernel_size(&self) -> usize;

    /// Convolution stride.
    fn stride(&self) -> usize;

    /// Number of groups.
    fn groups(&self) -> usize;

    /// Is the input average-pooled before the convolution?
    fn pre_downsample(&self) -> bool;

    /// Is the output rectified?
    fn has_activation(&self) -> bool;

    /// Learning-rate multiplier for the unit's parameters.
    fn lr_multiplier(&self) -> f64;

    /// Convolution padding.
    ///
    /// ``padding = (kernel_size - 1) / 2``
    fn padding(&self) -> usize {
        same_padding(self.kernel_size())
    }

    /// Get the output resolution for a given input resolution.
    ///
    /// # Arguments
    ///
    /// - `input_resolution`: ``[in_height, in_width]``.
    ///
    /// # Returns
    ///
    /// ``[out_height, out_width]``
    fn output_resolution(
        &self,
        input_resolution: [usize; 2],
    ) -> [usize; 2] {
        let resolution = if self.pre_downsample() {
            AvgPool2dCeilConfig::new().output_resolution(input_resolution)
        } else {
            input_resolution
        };
        resolution.map(|size| {
            expect_conv1d_output_size(size, self.kernel_size(), self.stride(), self.padding(), 1)
        })
    }

    /// Get the output resolution for a given input resolution.
    ///
    /// # Returns
    ///
    /// ``Some([out_height, out_width])``; or ``None`` if there is no legal
    /// output size.
    fn maybe_output_resolution(
        &self,
        input_resolution: [usize; 2],
    ) -> Option<[usize; 2]> {
        if input_resolution.contains(&0) {
            return None;
        }
        let [height, width] = if self.pre_downsample() {
            AvgPool2dCeilConfig::new().output_resolution(input_resolution)
        } else {
            input_resolution
        };
        let conv = |size| {
            maybe_conv1d_output_size(size, self.kernel_size(), self.stride(), self.padding(), 1)
        };
        Some([conv(height)?, conv(width)?])
    }
}

/// [`ConvUnit`] Config.
///
/// Implements [`ConvUnitMeta`].
#[derive(Config, Debug)]
pub struct ConvUnitConfig {
    /// Number of input channels.
    pub in_channels: usize,

    /// Number of output channels.
    pub out_channels: usize,

    /// Square kernel size.
    pub kernel_size: usize,

    /// Convolution stride.
    #[config(default = 1)]
    pub stride: usize,

    /// Number of groups.
    #[config(default = 1)]
    pub groups: usize,

    /// Average-pool the input before the convolution.
    #[config(default = "false")]
    pub pre_downsample: bool,

    /// Apply a ReLU after normalization.
    #[config(default = "true")]
    pub act: bool,

    /// Learning-rate multiplier for the unit's parameters.
    #[config(default = "1.0")]
    pub lr_multiplier: f64,
}

impl ConvUnitMeta for ConvUnitConfig {
    fn in_channels(&self) -> usize {
        self.in_channels
    }

    fn out_channels(&self) -> usize {
        self.out_channels
    }

    fn kernel_size(&self) -> usize {
        self.kernel_size
    }

    fn stride(&self) -> usize {
        self.stride
    }

    fn groups(&self) -> usize {
        self.groups
    }

    fn pre_downsample(&self) -> bool {
        self.pre_downsample
    }

    fn has_activation(&self) -> bool {
        self.act
    }

    fn lr_multiplier(&self) -> f64 {
        self.lr_multiplier
    }
}

impl ConvUnitConfig {
    /// Initialize a [`ConvUnit`].
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> ConvUnit<B> {
        let padding = self.padding();
        ConvUnit {
            pool: self
                .pre_downsample
                .then(|| AvgPool2dCeilConfig::new().init()),
            conv: Conv2dConfig::new(
                [self.in_channels, self.out_channels],
                [self.kernel_size, self.kernel_size],
            )
            .with_stride([self.stride, self.stride])
            .with_padding(PaddingConfig2d::Explicit(padding, padding))
            .with_groups(self.groups)
            .with_bias(false)
            .init(device),
            norm: BatchNormConfig::new(self.out_channels).init(device),
            act: self.act.then(Relu::new),
            lr_multiplier: Ignored(self.lr_multiplier),
        }
    }
}

/// Sequenced [pool]/conv/norm/[activation] block.
///
/// Implements [`ConvUnitMeta`].
#[derive(Module, Debug)]
pub struct ConvUnit<B: Backend> {
    /// Optional pre-downsample pooling.
    pub pool: Option<AvgPool2dCeil>,

    /// Internal Conv2d layer.
    pub conv: Conv2d<B>,

    /// Internal Norm layer.
    pub norm: BatchNorm<B, 2>,

    /// Optional activation layer.
    pub act: Option<Relu>,

    /// Learning-rate multiplier for the unit's parameters.
    pub lr_multiplier: Ignored<f64>,
}

impl<B: Backend> ConvUnitMeta for ConvUnit<B> {
    fn in_channels(&self) -> usize {
        self.conv.weight.shape().dims[1] * self.groups()
    }

    fn out_channels(&self) -> usize {
        self.conv.weight.shape().dims[0]
    }

    fn kernel_size(&self) -> usize {
        self.conv.kernel_size[0]
    }

    fn stride(&self) -> usize {
        self.conv.stride[0]
    }

    fn groups(&self) -> usize {
        self.conv.groups
    }

    fn pre_downsample(&self) -> bool {
        self.pool.is_some()
    }

    fn has_activation(&self) -> bool {
        self.act.is_some()
    }

    fn lr_multiplier(&self) -> f64 {
        self.lr_multiplier.0
    }
}

impl<B: Backend> ConvUnit<B> {
    /// Forward Pass.
    ///
    /// # Arguments
    ///
    /// - `input`: ``[batch, in_channels, in_height, in_width]``.
    ///
    /// # Returns
    ///
    /// ``[batch, out_channels, out_height, out_width]``;
    /// see [`ConvUnitMeta::output_resolution`].
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

        let x = match &self.pool {
            Some(pool) => pool.forward(input),
            None => input,
        };
        let x = self.conv.forward(x);
        let x = self.norm.forward(x);
        let x = match &self.act {
            Some(act) => act.forward(x),
            None => x,
        };

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

impl<B: Backend> ParamInventory for ConvUnit<B> {
    fn collect_params(
        &self,
        prefix: &str,
        params: &mut Vec<ParamDescriptor>,
    ) {
        let lr = self.lr_multiplier();
        params.push(describe_param(
            join_path(prefix, "conv.weight"),
            &self.conv.weight,
            lr,
        ));
        params.push(describe_param(
            join_path(prefix, "norm.gamma"),
            &self.norm.gamma,
            lr,
        ));
        params.push(describe_param(
            join_path(prefix, "norm.beta"),
            &self.norm.beta,
            lr,
        ));
    }
}

impl<B: Backend> RecordShapes for ConvUnitRecord<B> {
    fn collect_shapes(
        &self,
        prefix: &str,
        shapes: &mut Vec<(String, Vec<usize>)>,
    ) {
        shapes.push((
            join_path(prefix, "conv.weight"),
            param_shape(&self.conv.weight),
        ));
        shapes.push((
            join_path(prefix, "norm.gamma"),
            param_shape(&self.norm.gamma),
        ));
        shapes.push((
            join_path(prefix, "norm.beta"),
            param_shape(&self.norm.beta),
        ));
        shapes.push((
            join_path(prefix, "norm.running_mean"),
            param_shape(&self.norm.running_mean),
        ));
        shapes.push((
            join_path(prefix, "norm.running_var"),
            param_shape(&self.norm.running_var),
        ));
    }
}
