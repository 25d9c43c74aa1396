//! # Residual Block Wrapper
//!
//! Closed dispatch over the two residual unit variants.

use crate::errors::ConfigurationError;
use crate::models::resnet::assembler::ResidualUnitSpec;
use crate::models::resnet::basic_block::{BasicBlock, BasicBlockConfig, BasicBlockMeta};
use crate::models::resnet::bottleneck_block::{
    BottleneckBlock, BottleneckBlockConfig, BottleneckBlockMeta,
};
use crate::models::resnet::stage_config::BlockType;
use crate::utility::params::{ParamDescriptor, ParamInventory, RecordShapes};
use burn::config::Config;
use burn::prelude::{Backend, Module, Tensor};

/// [`ResidualBlock`] Meta API.
pub trait ResidualBlockMeta {
    /// The number of input channels.
    fn in_channels(&self) -> usize;

    /// The number of output channels.
    fn out_channels(&self) -> usize;

    /// The stride of the unit.
    fn stride(&self) -> usize;

    /// Is the skip connection projected?
    fn has_projection_shortcut(&self) -> bool;

    /// Get the output resolution for a given input resolution.
    fn output_resolution(
        &self,
        input_resolution: [usize; 2],
    ) -> [usize; 2];
}

/// [`ResidualBlock`] Config.
#[derive(Config, Debug)]
pub enum ResidualBlockConfig {
    /// A `ResNet` [`BasicBlock`].
    Basic(BasicBlockConfig),

    /// A `ResNet` [`BottleneckBlock`].
    Bottleneck(BottleneckBlockConfig),
}

impl ResidualBlockMeta for ResidualBlockConfig {
    fn in_channels(&self) -> usize {
        match self {
            Self::Basic(config) => config.in_channels(),
            Self::Bottleneck(config) => config.in_channels(),
        }
    }

    fn out_channels(&self) -> usize {
        match self {
            Self::Basic(config) => config.out_channels(),
            Self::Bottleneck(config) => config.out_channels(),
        }
    }

    fn stride(&self) -> usize {
        match self {
            Self::Basic(config) => config.stride(),
            Self::Bottleneck(config) => config.stride(),
        }
    }

    fn has_projection_shortcut(&self) -> bool {
        match self {
            Self::Basic(config) => config.has_projection_shortcut(),
            Self::Bottleneck(config) => config.has_projection_shortcut(),
        }
    }

    fn output_resolution(
        &self,
        input_resolution: [usize; 2],
    ) -> [usize; 2] {
        match self {
            Self::Basic(config) => config.output_resolution(input_resolution),
            Self::Bottleneck(config) => config.output_resolution(input_resolution),
        }
    }
}

impl From<BasicBlockConfig> for ResidualBlockConfig {
    fn from(config: BasicBlockConfig) -> Self {
        Self::Basic(config)
    }
}

impl From<BottleneckBlockConfig> for ResidualBlockConfig {
    fn from(config: BottleneckBlockConfig) -> Self {
        Self::Bottleneck(config)
    }
}

impl From<&ResidualUnitSpec> for ResidualBlockConfig {
    fn from(spec: &ResidualUnitSpec) -> Self {
        match spec.block_type {
            BlockType::Basic => BasicBlockConfig::new(spec.in_channels, spec.filters)
                .with_stride(spec.stride)
                .with_shortcut(spec.shortcut)
                .with_is_first_unit_of_first_stage(spec.is_first_unit_of_first_stage)
                .with_lr_multiplier(spec.lr_multiplier)
                .into(),
            BlockType::Bottleneck => BottleneckBlockConfig::new(spec.in_channels, spec.filters)
                .with_stride(spec.stride)
                .with_shortcut(spec.shortcut)
                .with_is_first_unit_of_first_stage(spec.is_first_unit_of_first_stage)
                .with_lr_multiplier(spec.lr_multiplier)
                .into(),
        }
    }
}

impl ResidualBlockConfig {
    /// The unit variant.
    pub fn block_type(&self) -> BlockType {
        match self {
            Self::Basic(_) => BlockType::Basic,
            Self::Bottleneck(_) => BlockType::Bottleneck,
        }
    }

    /// Check the shortcut invariants.
    pub fn try_validate(&self) -> Result<(), ConfigurationError> {
        match self {
            Self::Basic(config) => config.try_validate(),
            Self::Bottleneck(config) => config.try_validate(),
        }
    }

    /// Initialize a [`ResidualBlock`].
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> ResidualBlock<B> {
        match self {
            Self::Basic(config) => config.init(device).into(),
            Self::Bottleneck(config) => config.init(device).into(),
        }
    }
}

/// A `ResNet` [`BasicBlock`] or [`BottleneckBlock`] wrapper.
#[derive(Module, Debug)]
#[allow(clippy::large_enum_variant)]
pub enum ResidualBlock<B: Backend> {
    /// A `ResNet` [`BasicBlock`].
    Basic(BasicBlock<B>),

    /// A `ResNet` [`BottleneckBlock`].
    Bottleneck(BottleneckBlock<B>),
}

impl<B: Backend> From<BasicBlock<B>> for ResidualBlock<B> {
    fn from(block: BasicBlock<B>) -> Self {
        Self::Basic(block)
    }
}

impl<B: Backend> From<BottleneckBlock<B>> for ResidualBlock<B> {
    fn from(block: BottleneckBlock<B>) -> Self {
        Self::Bottleneck(block)
    }
}

impl<B: Backend> ResidualBlockMeta for ResidualBlock<B> {
    fn in_channels(&self) -> usize {
        match self {
            Self::Basic(block) => block.in_channels(),
            Self::Bottleneck(block) => block.in_channels(),
        }
    }

    fn out_channels(&self) -> usize {
        match self {
            Self::Basic(block) => block.out_channels(),
            Self::Bottleneck(block) => block.out_channels(),
        }
    }

    fn stride(&self) -> usize {
        match self {
            Self::Basic(block) => block.stride(),
            Self::Bottleneck(block) => block.stride(),
        }
    }

    fn has_projection_shortcut(&self) -> bool {
        match self {
            Self::Basic(block) => block.has_projection_shortcut(),
            Self::Bottleneck(block) => block.has_projection_shortcut(),
        }
    }

    fn output_resolution(
        &self,
        input_resolution: [usize; 2],
    ) -> [usize; 2] {
        match self {
            Self::Basic(block) => block.output_resolution(input_resolution),
            Self::Bottleneck(block) => block.output_resolution(input_resolution),
        }
    }
}

impl<B: Backend> ResidualBlock<B> {
    /// The unit variant.
    pub fn block_type(&self) -> BlockType {
        match self {
            Self::Basic(_) => BlockType::Basic,
            Self::Bottleneck(_) => BlockType::Bottleneck,
        }
    }

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
        match self {
            Self::Basic(block) => block.forward(input),
            Self::Bottleneck(block) => block.forward(input),
        }
    }
}

impl<B: Backend> ParamInventory for ResidualBlock<B> {
    fn collect_params(
        &self,
        prefix: &str,
        params: &mut Vec<ParamDescriptor>,
    ) {
        match self {
            Self::Basic(block) => block.collect_params(prefix, params),
            Self::Bottleneck(block) => block.collect_params(prefix, params),
        }
    }
}

impl<B: Backend> RecordShapes for ResidualBlockRecord<B> {
    fn collect_shapes(
        &self,
        prefix: &str,
        shapes: &mut Vec<(String, Vec<usize>)>,
    ) {
        match self {
            Self::Basic(record) => record.collect_shapes(prefix, shapes),
            Self::Bottleneck(record) => record.collect_shapes(prefix, shapes),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::resnet::assembler::ResNetPlan;
    use crate::models::resnet::stage_config::{StageConfig, VariantFlag};
    use burn::backend::NdArray;
    use burn::tensor::Distribution;

    #[test]
    fn test_from_spec() {
        let config = StageConfig::new(BlockType::Bottleneck, [3, 4, 6, 3], [64, 256, 512, 1024]);
        let plan = ResNetPlan::build(&config, VariantFlag::DeepStem, &[1.0; 5]).unwrap();

        for spec in &plan.units {
            let block = ResidualBlockConfig::from(spec);
            assert_eq!(block.block_type(), BlockType::Bottleneck);
            assert_eq!(block.in_channels(), spec.in_channels);
            assert_eq!(block.out_channels(), spec.out_channels());
            assert_eq!(block.stride(), spec.stride);
            assert_eq!(block.has_projection_shortcut(), spec.has_projection_shortcut());
            assert!(block.try_validate().is_ok());
        }
    }

    #[test]
    fn test_residual_block_forward() {
        type B = NdArray<f32>;
        let device = Default::default();

        let config: ResidualBlockConfig = BasicBlockConfig::new(4, 8)
            .with_stride(2)
            .with_is_first_unit_of_first_stage(false)
            .into();
        let block: ResidualBlock<B> = config.init(&device);
        assert_eq!(block.block_type(), BlockType::Basic);
        assert_eq!(block.in_channels(), 4);
        assert_eq!(block.out_channels(), 8);
        assert_eq!(block.stride(), 2);
        assert!(block.has_projection_shortcut());
        assert_eq!(block.output_resolution([9, 9]), [5, 5]);

        let input = Tensor::random([2, 4, 9, 9], Distribution::Default, &device);
        let output = block.forward(input);
        assert_eq!(output.dims(), [2, 8, 5, 5]);

        let params = block.param_descriptors();
        let shapes: Vec<(String, Vec<usize>)> = block
            .into_record()
            .param_shapes()
            .into_iter()
            .filter(|(path, _)| !path.contains(".norm.running_"))
            .collect();
        assert_eq!(
            shapes,
            params
                .iter()
                .map(|p| (p.path.clone(), p.shape.clone()))
                .collect::<Vec<_>>()
        );
    }
}
