//! # Network Assembly
//!
//! [`ResNetPlan::build`] expands a [`StageConfig`], a [`VariantFlag`] and a
//! learning-rate multiplier list into the ordered [`ResidualUnitSpec`] list
//! of a `ResNet`. The plan is pure data; no backend is involved.
//!
//! For stage ``s`` and unit ``i``:
//! ```text
//! in_channels = stage_in_channels[s]   if i == 0
//!               NUM_FILTERS[s] * mult  otherwise
//! stride      = 2 if i == 0 && s != 0 else 1
//! shortcut    = i != 0
//! lr          = lr_multiplier[s + 1]
//! ```
//!
//! The deep-stem variant strides the projection shortcut only for the very
//! first unit of the network; the standard variant always does.

use crate::compat::conv_shape::expect_conv1d_output_size;
use crate::models::resnet::resnet_model::maybe_stem_pool_output_resolution;
use crate::errors::ConfigurationError;
use crate::models::resnet::stage_config::{
    BlockType, LR_MULTIPLIER_LEN, NUM_FILTERS, NUM_STAGES, StageConfig, VariantFlag,
};
use crate::models::resnet::stems::ResNetStemConfig;

/// The derived parameters of one residual unit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResidualUnitSpec {
    /// The residual unit variant.
    pub block_type: BlockType,

    /// Stage index, ``0..4``.
    pub stage: usize,

    /// Unit index within the stage.
    pub index: usize,

    /// Number of input channels.
    pub in_channels: usize,

    /// Base filter count.
    pub filters: usize,

    /// Unit stride.
    pub stride: usize,

    /// Identity skip connection when true; projection when false.
    pub shortcut: bool,

    /// Projection strides directly instead of pooling first.
    pub is_first_unit_of_first_stage: bool,

    /// Learning-rate multiplier.
    pub lr_multiplier: f64,
}

impl ResidualUnitSpec {
    /// Number of output channels.
    pub fn out_channels(&self) -> usize {
        self.filters * self.block_type.expansion()
    }

    /// Is the skip connection projected?
    pub fn has_projection_shortcut(&self) -> bool {
        !self.shortcut
    }
}

/// Check a learning-rate multiplier list.
///
/// # Returns
///
/// The list as a fixed-size array; or an error when the length is not
/// [`LR_MULTIPLIER_LEN`] or an entry is not positive and finite.
pub fn check_lr_multiplier(
    lr_multiplier: &[f64],
) -> Result<[f64; LR_MULTIPLIER_LEN], ConfigurationError> {
    let lr: [f64; LR_MULTIPLIER_LEN] = lr_multiplier.try_into().map_err(|_| {
        ConfigurationError::LrMultiplierLength {
            expected: LR_MULTIPLIER_LEN,
            found: lr_multiplier.len(),
        }
    })?;

    if let Some((index, &value)) = lr
        .iter()
        .enumerate()
        .find(|(_, v)| !(v.is_finite() && **v > 0.0))
    {
        return Err(ConfigurationError::InvalidLrMultiplier { index, value });
    }

    Ok(lr)
}

/// Derive the spec of unit ``index`` of ``stage``.
pub fn unit_spec(
    stage_config: &StageConfig,
    variant: VariantFlag,
    lr_multiplier: &[f64; LR_MULTIPLIER_LEN],
    stage: usize,
    index: usize,
) -> ResidualUnitSpec {
    let first_in_stage = index == 0;

    ResidualUnitSpec {
        block_type: stage_config.block_type,
        stage,
        index,
        in_channels: if first_in_stage {
            stage_config.stage_in_channels[stage]
        } else {
            NUM_FILTERS[stage] * stage_config.channel_multiplier()
        },
        filters: NUM_FILTERS[stage],
        stride: if first_in_stage && stage != 0 { 2 } else { 1 },
        shortcut: !first_in_stage,
        is_first_unit_of_first_stage: match variant {
            VariantFlag::DeepStem => stage == 0 && first_in_stage,
            VariantFlag::StandardStem => true,
        },
        lr_multiplier: lr_multiplier[stage + 1],
    }
}

/// The fully expanded layout of a `ResNet`.
#[derive(Debug, Clone)]
pub struct ResNetPlan {
    /// The source stage layout.
    pub stage_config: StageConfig,

    /// The stem variant.
    pub variant: VariantFlag,

    /// Validated learning-rate multipliers.
    pub lr_multiplier: [f64; LR_MULTIPLIER_LEN],

    /// Channel multiplier applied to [`NUM_FILTERS`].
    pub channel_multiplier: usize,

    /// The stem.
    pub stem: ResNetStemConfig,

    /// Residual units, in forward order.
    pub units: Vec<ResidualUnitSpec>,
}

impl ResNetPlan {
    /// Expand a stage layout.
    ///
    /// Fails before any parameter is allocated if the multiplier list or
    /// the stage layout is malformed, or if consecutive units disagree on
    /// channel counts.
    pub fn build(
        stage_config: &StageConfig,
        variant: VariantFlag,
        lr_multiplier: &[f64],
    ) -> Result<Self, ConfigurationError> {
        let lr_multiplier = check_lr_multiplier(lr_multiplier)?;
        stage_config.try_validate()?;

        let stem = ResNetStemConfig::for_variant(variant, lr_multiplier[0]);

        let units: Vec<ResidualUnitSpec> = (0..NUM_STAGES)
            .flat_map(|stage| {
                (0..stage_config.block_depth[stage]).map(move |index| (stage, index))
            })
            .map(|(stage, index)| unit_spec(stage_config, variant, &lr_multiplier, stage, index))
            .collect();

        let mut channels = stem.out_channels();
        for unit in &units {
            if unit.in_channels != channels {
                return Err(ConfigurationError::InvalidStageConfig(format!(
                    "stage {} unit {} takes {} channels, but receives {}",
                    unit.stage, unit.index, unit.in_channels, channels
                )));
            }
            channels = unit.out_channels();
        }
        if channels != stage_config.head_width() {
            return Err(ConfigurationError::InvalidStageConfig(format!(
                "last unit produces {channels} channels, but the head takes {}",
                stage_config.head_width()
            )));
        }

        let plan = Self {
            stage_config: stage_config.clone(),
            variant,
            lr_multiplier,
            channel_multiplier: stage_config.channel_multiplier(),
            stem,
            units,
        };

        tracing::debug!(
            block_type = %plan.stage_config.block_type,
            variant = plan.variant.version(),
            units = plan.units.len(),
            channel_multiplier = plan.channel_multiplier,
            "assembled ResNet plan"
        );

        Ok(plan)
    }

    /// Number of residual units.
    pub fn num_units(&self) -> usize {
        self.units.len()
    }

    /// Width of the classifier input.
    pub fn head_width(&self) -> usize {
        self.stage_config.head_width()
    }

    /// The units of one stage.
    pub fn stage_units(
        &self,
        stage: usize,
    ) -> impl Iterator<Item = &ResidualUnitSpec> {
        self.units.iter().filter(move |unit| unit.stage == stage)
    }

    /// Spatial resolution entering the classifier head.
    pub fn output_resolution(
        &self,
        input_resolution: [usize; 2],
    ) -> [usize; 2] {
        let resolution = self
            .stem
            .output_resolution(input_resolution)
            .map(|size| expect_conv1d_output_size(size, 3, 2, 1, 1));

        self.units.iter().fold(resolution, |res, unit| {
            res.map(|size| expect_conv1d_output_size(size, 3, unit.stride, 1, 1))
        })
    }

    /// Spatial resolution entering the classifier head.
    ///
    /// ``None`` if the input is too small for the network.
    pub fn maybe_output_resolution(
        &self,
        input_resolution: [usize; 2],
    ) -> Option<[usize; 2]> {
        let resolution = self
            .stem
            .maybe_output_resolution(input_resolution)
            .and_then(maybe_stem_pool_output_resolution)?;
        Some(self.units.iter().fold(resolution, |res, unit| {
            res.map(|size| expect_conv1d_output_size(size, 3, unit.stride, 1, 1))
        }))
    }
}
