//! # `ResNet` Stage Configuration
//!
//! [`StageConfig`] is the compact per-depth description of a `ResNet`:
//! the residual unit variant, the number of units per stage, and the
//! number of channels entering each stage.

use crate::errors::ConfigurationError;
use burn::config::Config;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// Number of residual stages.
pub const NUM_STAGES: usize = 4;

/// Number of learning-rate multipliers: the stem, then one per stage.
pub const LR_MULTIPLIER_LEN: usize = NUM_STAGES + 1;

/// Base filter count of each stage, independent of the configured channels.
pub const NUM_FILTERS: [usize; NUM_STAGES] = [64, 128, 256, 512];

/// Last-stage input channels which mark a basic-block (unexpanded) layout.
pub const BASIC_TERMINAL_CHANNELS: usize = 256;

/// Residual unit variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlockType {
    /// Two 3x3 convolutions; output is the base filter count.
    Basic,

    /// 1x1 reduce, 3x3, 1x1 expand; output is 4x the base filter count.
    Bottleneck,
}

impl BlockType {
    /// Output channels per base filter.
    pub fn expansion(&self) -> usize {
        match self {
            Self::Basic => 1,
            Self::Bottleneck => 4,
        }
    }

    /// The canonical identifier.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Basic => "BasicBlock",
            Self::Bottleneck => "BottleneckBlock",
        }
    }
}

impl Display for BlockType {
    fn fmt(
        &self,
        f: &mut Formatter<'_>,
    ) -> std::fmt::Result {
        f.pad(self.name())
    }
}

impl FromStr for BlockType {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BasicBlock" | "Basic" | "basic" => Ok(Self::Basic),
            "BottleneckBlock" | "Bottleneck" | "bottleneck" => Ok(Self::Bottleneck),
            _ => Err(ConfigurationError::UnknownBlockType(s.to_string())),
        }
    }
}

/// Stem and shortcut-downsampling variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum VariantFlag {
    /// Single 7x7 stem; projection shortcuts carry the stride (``"vb"``).
    #[default]
    StandardStem,

    /// Three 3x3 stem convolutions; projection shortcuts after the first
    /// average-pool, then project (``"vd"``).
    DeepStem,
}

impl VariantFlag {
    /// The version identifier, ``"vb"`` or ``"vd"``.
    pub fn version(&self) -> &'static str {
        match self {
            Self::StandardStem => "vb",
            Self::DeepStem => "vd",
        }
    }

    /// The suffix appended to catalog names.
    pub fn name_suffix(&self) -> &'static str {
        match self {
            Self::StandardStem => "",
            Self::DeepStem => "_vd",
        }
    }
}

impl FromStr for VariantFlag {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "vb" => Ok(Self::StandardStem),
            "vd" => Ok(Self::DeepStem),
            _ => Err(ConfigurationError::UnknownVariant(s.to_string())),
        }
    }
}

/// Per-depth stage layout.
#[derive(Config, Debug, PartialEq)]
pub struct StageConfig {
    /// The residual unit variant.
    pub block_type: BlockType,

    /// Number of residual units in each stage.
    pub block_depth: [usize; NUM_STAGES],

    /// Number of channels entering each stage.
    pub stage_in_channels: [usize; NUM_STAGES],
}

impl StageConfig {
    /// Build from a textual block-type identifier.
    pub fn try_from_names(
        block_type: &str,
        block_depth: [usize; NUM_STAGES],
        stage_in_channels: [usize; NUM_STAGES],
    ) -> Result<Self, ConfigurationError> {
        let config = Self::new(block_type.parse()?, block_depth, stage_in_channels);
        config.try_validate()?;
        Ok(config)
    }

    /// Check that every depth and channel count is positive.
    pub fn try_validate(&self) -> Result<(), ConfigurationError> {
        if let Some(stage) = self.block_depth.iter().position(|&d| d == 0) {
            return Err(ConfigurationError::InvalidStageConfig(format!(
                "block_depth[{stage}] is zero"
            )));
        }
        if let Some(stage) = self.stage_in_channels.iter().position(|&c| c == 0) {
            return Err(ConfigurationError::InvalidStageConfig(format!(
                "stage_in_channels[{stage}] is zero"
            )));
        }
        Ok(())
    }

    /// Channel multiplier applied to [`NUM_FILTERS`] inside a stage.
    ///
    /// ``1`` when the last stage takes [`BASIC_TERMINAL_CHANNELS`], else ``4``.
    pub fn channel_multiplier(&self) -> usize {
        if self.stage_in_channels[NUM_STAGES - 1] == BASIC_TERMINAL_CHANNELS {
            1
        } else {
            4
        }
    }

    /// Width of the classifier input: twice the last stage's input channels.
    pub fn head_width(&self) -> usize {
        self.stage_in_channels[NUM_STAGES - 1] * 2
    }

    /// Total number of residual units.
    pub fn num_units(&self) -> usize {
        self.block_depth.iter().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_type_parse() {
        assert_eq!("BasicBlock".parse::<BlockType>(), Ok(BlockType::Basic));
        assert_eq!(
            "BottleneckBlock".parse::<BlockType>(),
            Ok(BlockType::Bottleneck)
        );
        assert_eq!(
            "ResidualBlock".parse::<BlockType>(),
            Err(ConfigurationError::UnknownBlockType(
                "ResidualBlock".to_string()
            ))
        );
        assert_eq!(BlockType::Bottleneck.to_string(), "BottleneckBlock");
        assert_eq!(format!("{:<12}|", BlockType::Basic), "BasicBlock  |");
        assert_eq!(BlockType::Basic.expansion(), 1);
        assert_eq!(BlockType::Bottleneck.expansion(), 4);
    }

    #[test]
    fn test_variant_parse() {
        assert_eq!("vb".parse::<VariantFlag>(), Ok(VariantFlag::StandardStem));
        assert_eq!("vd".parse::<VariantFlag>(), Ok(VariantFlag::DeepStem));
        assert!(matches!(
            "vc".parse::<VariantFlag>(),
            Err(ConfigurationError::UnknownVariant(_))
        ));
        assert_eq!(VariantFlag::DeepStem.name_suffix(), "_vd");
        assert_eq!(VariantFlag::default().version(), "vb");
    }

    #[test]
    fn test_stage_config() {
        let basic = StageConfig::try_from_names("BasicBlock", [2, 2, 2, 2], [64, 64, 128, 256])
            .unwrap();
        assert_eq!(basic.channel_multiplier(), 1);
        assert_eq!(basic.head_width(), 512);
        assert_eq!(basic.num_units(), 8);

        let bottleneck =
            StageConfig::new(BlockType::Bottleneck, [3, 4, 6, 3], [64, 256, 512, 1024]);
        assert_eq!(bottleneck.channel_multiplier(), 4);
        assert_eq!(bottleneck.head_width(), 2048);
        assert_eq!(bottleneck.num_units(), 16);
    }

    #[test]
    fn test_stage_config_rejects_zero() {
        assert!(matches!(
            StageConfig::try_from_names("BasicBlock", [2, 0, 2, 2], [64, 64, 128, 256]),
            Err(ConfigurationError::InvalidStageConfig(_))
        ));
        assert!(matches!(
            StageConfig::try_from_names("Unknown", [2, 2, 2, 2], [64, 64, 128, 256]),
            Err(ConfigurationError::UnknownBlockType(_))
        ));
    }
}
