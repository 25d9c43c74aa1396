//! # `ResNet` Core Model
//!
//! [`ResNetAbstractConfig`] is the compact description (stage layout,
//! variant, class count, learning-rate multipliers); it expands through a
//! [`ResNetPlan`] into a concrete [`ResNetConfig`], which initializes a
//! [`ResNet`].

use crate::compat::conv_shape::{expect_conv1d_output_size, maybe_conv1d_output_size};
use crate::errors::ConfigurationError;
use crate::models::resnet::assembler::ResNetPlan;
use crate::models::resnet::head::{ClassifierHead, ClassifierHeadConfig};
use crate::models::resnet::residual_block::{
    ResidualBlock, ResidualBlockConfig, ResidualBlockMeta,
};
use crate::models::resnet::stage_config::{StageConfig, VariantFlag};
use crate::models::resnet::stems::{ResNetStem, ResNetStemConfig};
use crate::utility::params::{ParamDescriptor, ParamInventory, RecordShapes, join_path};
use bimm_contracts::{assert_shape_contract_periodically, unpack_shape_contract};
use burn::config::Config;
use burn::module::{Module, ParamId};
use burn::nn::PaddingConfig2d;
use burn::nn::pool::{MaxPool2d, MaxPool2dConfig};
use burn::prelude::{Backend, Tensor};

/// Compact `ResNet` description.
#[derive(Config, Debug)]
pub struct ResNetAbstractConfig {
    /// Per-stage layout.
    pub stage: StageConfig,

    /// Stem variant.
    #[config(default = "VariantFlag::StandardStem")]
    pub variant: VariantFlag,

    /// Number of output classes.
    #[config(default = 1000)]
    pub num_classes: usize,

    /// Learning-rate multipliers: stem, then one per stage.
    #[config(default = "vec![1.0; 5]")]
    pub lr_multiplier: Vec<f64>,
}

impl ResNetAbstractConfig {
    /// Expand the stage layout.
    pub fn plan(&self) -> Result<ResNetPlan, ConfigurationError> {
        ResNetPlan::build(&self.stage, self.variant, &self.lr_multiplier)
    }

    /// Expand into a concrete [`ResNetConfig`].
    pub fn to_structure(&self) -> Result<ResNetConfig, ConfigurationError> {
        if self.num_classes == 0 {
            return Err(ConfigurationError::InvalidClassCount);
        }
        Ok(ResNetConfig::from_plan(&self.plan()?, self.num_classes))
    }

    /// Initialize a [`ResNet`].
    ///
    /// Nothing is allocated if the configuration is rejected.
    pub fn try_init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> Result<ResNet<B>, ConfigurationError> {
        Ok(self.to_structure()?.init(device))
    }
}

/// Concrete `ResNet` structure.
#[derive(Config, Debug)]
pub struct ResNetConfig {
    /// The input stem.
    pub stem: ResNetStemConfig,

    /// Residual units, in forward order.
    pub blocks: Vec<ResidualBlockConfig>,

    /// The classifier head.
    pub head: ClassifierHeadConfig,
}

impl ResNetConfig {
    /// Build from an assembled plan.
    pub fn from_plan(
        plan: &ResNetPlan,
        num_classes: usize,
    ) -> Self {
        Self::new(
            plan.stem.clone(),
            plan.units.iter().map(ResidualBlockConfig::from).collect(),
            ClassifierHeadConfig::new(plan.head_width()).with_num_classes(num_classes),
        )
    }

    /// Check unit invariants and channel continuity.
    pub fn try_validate(&self) -> Result<(), ConfigurationError> {
        if self.head.num_classes == 0 {
            return Err(ConfigurationError::InvalidClassCount);
        }
        let mut channels = self.stem.out_channels();
        for (idx, block) in self.blocks.iter().enumerate() {
            block.try_validate()?;
            if block.in_channels() != channels {
                return Err(ConfigurationError::InvalidBlock(format!(
                    "block {idx} takes {} channels, but receives {channels}",
                    block.in_channels()
                )));
            }
            channels = block.out_channels();
        }
        if channels != self.head.in_features {
            return Err(ConfigurationError::InvalidBlock(format!(
                "head takes {} features, but receives {channels}",
                self.head.in_features
            )));
        }
        Ok(())
    }

    /// Spatial resolution entering the classifier head.
    pub fn output_resolution(
        &self,
        input_resolution: [usize; 2],
    ) -> [usize; 2] {
        let resolution = stem_pool_output_resolution(self.stem.output_resolution(input_resolution));
        self.blocks
            .iter()
            .fold(resolution, |res, block| block.output_resolution(res))
    }

    /// Initialize a [`ResNet`].
    ///
    /// # Panics
    ///
    /// If a block violates its shortcut invariants.
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> ResNet<B> {
        let model = ResNet {
            stem: self.stem.init(device),
            maxpool: stem_pool_config().init(),
            blocks: self.blocks.iter().map(|block| block.init(device)).collect(),
            head: self.head.init(device),
        };

        tracing::debug!(
            blocks = model.blocks.len(),
            num_classes = model.num_classes(),
            num_params = model.num_params(),
            "initialized ResNet"
        );

        model
    }
}

/// The 3x3 / stride 2 / padding 1 max pool following every stem.
pub fn stem_pool_config() -> MaxPool2dConfig {
    MaxPool2dConfig::new([3, 3])
        .with_strides([2, 2])
        .with_padding(PaddingConfig2d::Explicit(1, 1))
}

fn stem_pool_output_resolution(input_resolution: [usize; 2]) -> [usize; 2] {
    input_resolution.map(|size| expect_conv1d_output_size(size, 3, 2, 1, 1))
}

/// Fallible [`stem_pool_config`] output resolution.
pub(crate) fn maybe_stem_pool_output_resolution(
    input_resolution: [usize; 2],
) -> Option<[usize; 2]> {
    let [height, width] = input_resolution;
    let pool = |size| maybe_conv1d_output_size(size, 3, 2, 1, 1);
    Some([pool(height)?, pool(width)?])
}

/// `ResNet` model.
#[derive(Module, Debug)]
pub struct ResNet<B: Backend> {
    /// Input stem.
    pub stem: ResNetStem<B>,

    /// Post-stem max pool.
    pub maxpool: MaxPool2d,

    /// Residual units, in forward order.
    pub blocks: Vec<ResidualBlock<B>>,

    /// Classifier head.
    pub head: ClassifierHead<B>,
}

impl<B: Backend> ResNet<B> {
    /// Number of output classes.
    pub fn num_classes(&self) -> usize {
        self.head.num_classes()
    }

    /// Spatial resolution entering the classifier head.
    pub fn output_resolution(
        &self,
        input_resolution: [usize; 2],
    ) -> [usize; 2] {
        let resolution = stem_pool_output_resolution(self.stem.output_resolution(input_resolution));
        self.blocks
            .iter()
            .fold(resolution, |res, block| block.output_resolution(res))
    }

    /// Spatial resolution entering the classifier head.
    ///
    /// ``None`` if the input is too small for the network; residual units
    /// keep every non-empty resolution legal.
    pub fn maybe_output_resolution(
        &self,
        input_resolution: [usize; 2],
    ) -> Option<[usize; 2]> {
        let resolution = self
            .stem
            .maybe_output_resolution(input_resolution)
            .and_then(maybe_stem_pool_output_resolution)?;
        Some(
            self.blocks
                .iter()
                .fold(resolution, |res, block| block.output_resolution(res)),
        )
    }

    /// Forward Pass.
    ///
    /// # Arguments
    ///
    /// - `input`: ``[batch, 3, height, width]`` images.
    ///
    /// # Returns
    ///
    /// ``[batch, num_classes]`` logits.
    pub fn forward(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 2> {
        let [batch] = unpack_shape_contract!(
            ["batch", "channels", "height", "width"],
            &input,
            &["batch"],
            &[("channels", self.stem.in_channels())]
        );

        let x = self.stem.forward(input);
        let x = self.maxpool.forward(x);
        let x = self
            .blocks
            .iter()
            .fold(x, |x, block| block.forward(x));
        let x = self.head.forward(x);

        assert_shape_contract_periodically!(
            ["batch", "num_classes"],
            &x,
            &[("batch", batch), ("num_classes", self.num_classes())]
        );

        x
    }

    /// Per-parameter learning-rate multipliers.
    ///
    /// Stem parameters carry ``lr_multiplier[0]``, stage ``s`` parameters
    /// carry ``lr_multiplier[s + 1]``, and the head carries ``1.0``.
    pub fn lr_multipliers(&self) -> Vec<(ParamId, f64)> {
        self.param_descriptors()
            .into_iter()
            .map(|param| (param.id, param.lr_multiplier))
            .collect()
    }

    /// Named shapes of every tensor a checkpoint load overwrites, in
    /// declaration order.
    ///
    /// Includes the normalization running statistics, which
    /// [`ParamInventory::param_descriptors`] omits.
    pub fn param_shapes(&self) -> Vec<(String, Vec<usize>)> {
        self.clone().into_record().param_shapes()
    }
}

impl<B: Backend> ParamInventory for ResNet<B> {
    fn collect_params(
        &self,
        prefix: &str,
        params: &mut Vec<ParamDescriptor>,
    ) {
        self.stem.collect_params(&join_path(prefix, "stem"), params);
        for (idx, block) in self.blocks.iter().enumerate() {
            block.collect_params(&join_path(prefix, &format!("blocks.{idx}")), params);
        }
        self.head.collect_params(&join_path(prefix, "head"), params);
    }
}

impl<B: Backend> RecordShapes for ResNetRecord<B> {
    fn collect_shapes(
        &self,
        prefix: &str,
        shapes: &mut Vec<(String, Vec<usize>)>,
    ) {
        self.stem.collect_shapes(&join_path(prefix, "stem"), shapes);
        for (idx, block) in self.blocks.iter().enumerate() {
            block.collect_shapes(&join_path(prefix, &format!("blocks.{idx}")), shapes);
        }
        self.head.collect_shapes(&join_path(prefix, "head"), shapes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::resnet::stage_config::BlockType;
    use bimm_contracts::assert_shape_contract;
    use burn::backend::{Autodiff, NdArray};
    use burn::tensor::Distribution;
    use hamcrest::prelude::*;

    fn tiny_basic() -> StageConfig {
        StageConfig::new(BlockType::Basic, [1, 1, 1, 1], [64, 64, 128, 256])
    }

    #[test]
    fn test_to_structure() {
        let config = ResNetAbstractConfig::new(StageConfig::new(
            BlockType::Bottleneck,
            [3, 4, 6, 3],
            [64, 256, 512, 1024],
        ));
        let structure = config.to_structure().unwrap();
        assert_eq!(structure.blocks.len(), 16);
        assert_eq!(structure.head.in_features, 2048);
        assert_eq!(structure.head.num_classes, 1000);
        assert_eq!(structure.stem.units.len(), 1);
        assert!(structure.try_validate().is_ok());
        assert_eq!(structure.output_resolution([224, 224]), [7, 7]);
    }

    #[test]
    fn test_rejects_before_allocation() {
        let config = ResNetAbstractConfig::new(tiny_basic()).with_lr_multiplier(vec![1.0; 4]);
        assert_that!(
            config.try_init::<NdArray<f32>>(&Default::default()).err(),
            equal_to(Some(ConfigurationError::LrMultiplierLength {
                expected: 5,
                found: 4
            }))
        );

        let config = ResNetAbstractConfig::new(tiny_basic()).with_num_classes(0);
        assert_eq!(
            config.to_structure().err(),
            Some(ConfigurationError::InvalidClassCount)
        );
    }

    #[test]
    fn test_resnet_forward() {
        type B = Autodiff<NdArray<f32>>;
        let device = Default::default();

        let config = ResNetAbstractConfig::new(tiny_basic())
            .with_variant(VariantFlag::DeepStem)
            .with_num_classes(10);
        let model: ResNet<B> = config.try_init(&device).unwrap();
        assert_eq!(model.num_classes(), 10);
        assert_eq!(model.stem.units.len(), 3);
        assert_eq!(model.blocks.len(), 4);
        assert_eq!(model.output_resolution([32, 32]), [1, 1]);
        assert_eq!(model.maybe_output_resolution([32, 32]), Some([1, 1]));
        assert_eq!(model.maybe_output_resolution([1, 1]), Some([1, 1]));
        assert_eq!(model.maybe_output_resolution([32, 0]), None);
        assert_eq!(
            model.output_resolution([32, 32]),
            config.to_structure().unwrap().output_resolution([32, 32])
        );

        let input = Tensor::random([2, 3, 32, 32], Distribution::Default, &device);
        let output = model.forward(input);

        assert_shape_contract!(
            ["batch", "num_classes"],
            &output,
            &[("batch", 2), ("num_classes", 10)],
        );
    }

    #[test]
    fn test_lr_multipliers() {
        type B = NdArray<f32>;
        let device = Default::default();

        let lr = vec![0.1, 0.2, 0.3, 0.4, 0.5];
        let model: ResNet<B> = ResNetAbstractConfig::new(tiny_basic())
            .with_num_classes(4)
            .with_lr_multiplier(lr.clone())
            .try_init(&device)
            .unwrap();

        let params = model.param_descriptors();
        let multipliers = model.lr_multipliers();
        assert_eq!(params.len(), multipliers.len());

        for param in &params {
            let expected = if param.path.starts_with("stem.") {
                0.1
            } else if let Some(rest) = param.path.strip_prefix("blocks.") {
                let idx: usize = rest.split('.').next().unwrap().parse().unwrap();
                lr[idx + 1]
            } else {
                assert!(param.path.starts_with("head."));
                1.0
            };
            assert_eq!(param.lr_multiplier, expected, "{}", param.path);
        }
    }

    #[test]
    fn test_param_shapes_match_record() {
        type B = NdArray<f32>;
        let device = Default::default();

        let model: ResNet<B> = ResNetAbstractConfig::new(tiny_basic())
            .with_num_classes(7)
            .try_init(&device)
            .unwrap();

        let numel = |shape: &Vec<usize>| shape.iter().product::<usize>();

        let shapes = model.param_shapes();
        let total: usize = shapes.iter().map(|(_, s)| numel(s)).sum();
        assert_eq!(total, model.num_params());

        let learnable: usize = model.param_descriptors().iter().map(|p| numel(&p.shape)).sum();
        let norm_channels: usize = shapes
            .iter()
            .filter(|(path, _)| path.ends_with("norm.running_mean"))
            .map(|(_, s)| numel(s))
            .sum();
        assert!(norm_channels > 0);
        assert_eq!(total - learnable, 2 * norm_channels);

        assert_eq!(shapes.first().unwrap().0, "stem.units.0.conv.weight");
        assert_eq!(shapes[3].0, "stem.units.0.norm.running_mean");
        assert_eq!(
            shapes.last().unwrap(),
            &("head.fc.bias".to_string(), vec![7])
        );
        assert_eq!(model.into_record().param_shapes(), shapes);
    }
}
