//! # Input Stems
//!
//! * [`VariantFlag::StandardStem`]: a single ``3 -> 64`` 7x7 conv, stride 2.
//! * [`VariantFlag::DeepStem`]: three 3x3 convs,
//!   ``3 -> 32`` (stride 2), ``32 -> 32``, ``32 -> 64``.
//!
//! Every stem conv is a [`ConvUnit`] with ReLU at the stem's learning-rate
//! multiplier. The network follows the stem with a 3x3 / stride 2 max pool.

use crate::layers::blocks::conv_unit::{ConvUnit, ConvUnitConfig, ConvUnitMeta};
use crate::models::resnet::stage_config::VariantFlag;
use crate::utility::params::{ParamDescriptor, ParamInventory, RecordShapes, join_path};
use bimm_contracts::assert_shape_contract_periodically;
use burn::config::Config;
use burn::module::Module;
use burn::prelude::{Backend, Tensor};

/// Image channels consumed by every stem.
pub const STEM_IN_CHANNELS: usize = 3;

/// Channels produced by every stem.
pub const STEM_OUT_CHANNELS: usize = 64;

/// ``(in_channels, out_channels, kernel_size, stride)`` per stem conv.
const STANDARD_STEM_LAYOUT: [(usize, usize, usize, usize); 1] = [(3, 64, 7, 2)];

const DEEP_STEM_LAYOUT: [(usize, usize, usize, usize); 3] =
    [(3, 32, 3, 2), (32, 32, 3, 1), (32, 64, 3, 1)];

/// [`ResNetStem`] Config.
#[derive(Config, Debug)]
pub struct ResNetStemConfig {
    /// The stem convolutions, in order.
    pub units: Vec<ConvUnitConfig>,
}

impl ResNetStemConfig {
    /// Build the stem for a variant.
    pub fn for_variant(
        variant: VariantFlag,
        lr_multiplier: f64,
    ) -> Self {
        let layout: &[(usize, usize, usize, usize)] = match variant {
            VariantFlag::StandardStem => &STANDARD_STEM_LAYOUT,
            VariantFlag::DeepStem => &DEEP_STEM_LAYOUT,
        };
        Self::new(
            layout
                .iter()
                .map(|&(in_channels, out_channels, kernel_size, stride)| {
                    ConvUnitConfig::new(in_channels, out_channels, kernel_size)
                        .with_stride(stride)
                        .with_lr_multiplier(lr_multiplier)
                })
                .collect(),
        )
    }

    /// Input channels of the first conv.
    pub fn in_channels(&self) -> usize {
        self.units.first().map_or(STEM_IN_CHANNELS, |u| u.in_channels())
    }

    /// Output channels of the last conv.
    pub fn out_channels(&self) -> usize {
        self.units
            .last()
            .map_or(STEM_IN_CHANNELS, |u| u.out_channels())
    }

    /// Get the output resolution for a given input resolution.
    pub fn output_resolution(
        &self,
        input_resolution: [usize; 2],
    ) -> [usize; 2] {
        self.units
            .iter()
            .fold(input_resolution, |res, unit| unit.output_resolution(res))
    }

    /// Get the output resolution for a given input resolution.
    ///
    /// ``None`` if the input is too small for the stem.
    pub fn maybe_output_resolution(
        &self,
        input_resolution: [usize; 2],
    ) -> Option<[usize; 2]> {
        self.units
            .iter()
            .try_fold(input_resolution, |res, unit| unit.maybe_output_resolution(res))
    }

    /// Initialize a [`ResNetStem`].
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> ResNetStem<B> {
        ResNetStem {
            units: self.units.iter().map(|unit| unit.init(device)).collect(),
        }
    }
}

/// `ResNet` input stem.
#[derive(Module, Debug)]
pub struct ResNetStem<B: Backend> {
    /// The stem convolutions, in order.
    pub units: Vec<ConvUnit<B>>,
}

impl<B: Backend> ResNetStem<B> {
    /// Input channels of the first conv.
    pub fn in_channels(&self) -> usize {
        self.units.first().map_or(STEM_IN_CHANNELS, |u| u.in_channels())
    }

    /// Output channels of the last conv.
    pub fn out_channels(&self) -> usize {
        self.units
            .last()
            .map_or(STEM_IN_CHANNELS, |u| u.out_channels())
    }

    /// Get the output resolution for a given input resolution.
    pub fn output_resolution(
        &self,
        input_resolution: [usize; 2],
    ) -> [usize; 2] {
        self.units
            .iter()
            .fold(input_resolution, |res, unit| unit.output_resolution(res))
    }

    /// Get the output resolution for a given input resolution.
    ///
    /// ``None`` if the input is too small for the stem.
    pub fn maybe_output_resolution(
        &self,
        input_resolution: [usize; 2],
    ) -> Option<[usize; 2]> {
        self.units
            .iter()
            .try_fold(input_resolution, |res, unit| unit.maybe_output_resolution(res))
    }

    /// Forward Pass.
    ///
    /// # Arguments
    ///
    /// - `input`: ``[batch, 3, height, width]``.
    ///
    /// # Returns
    ///
    /// ``[batch, 64, out_height, out_width]``
    pub fn forward(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        assert_shape_contract_periodically!(
            ["batch", "in_channels", "height", "width"],
            &input,
            &[("in_channels", self.in_channels())]
        );

        self.units
            .iter()
            .fold(input, |x, unit| unit.forward(x))
    }
}

impl<B: Backend> ParamInventory for ResNetStem<B> {
    fn collect_params(
        &self,
        prefix: &str,
        params: &mut Vec<ParamDescriptor>,
    ) {
        for (idx, unit) in self.units.iter().enumerate() {
            unit.collect_params(&join_path(prefix, &format!("units.{idx}")), params);
        }
    }
}

impl<B: Backend> RecordShapes for ResNetStemRecord<B> {
    fn collect_shapes(
        &self,
        prefix: &str,
        shapes: &mut Vec<(String, Vec<usize>)>,
    ) {
        for (idx, unit) in self.units.iter().enumerate() {
            unit.collect_shapes(&join_path(prefix, &format!("units.{idx}")), shapes);
        }
    }
}
