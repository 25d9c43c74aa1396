//! # `ResNet`
//!
//! Image-classification residual networks in the standard-stem (``vb``)
//! and deep-stem (``vd``) variants.
//!
//! * [`stage_config`] - per-depth stage layouts.
//! * [`assembler`] - expands a layout into per-unit specs.
//! * [`catalog`] - the named variants and [`ResNetFactory`].
//! * [`pretrained`] - checkpoint registry, fetching and loading.

pub mod assembler;
pub mod basic_block;
pub mod bottleneck_block;
pub mod catalog;
pub mod head;
pub mod pretrained;
pub mod residual_block;
pub mod resnet_model;
pub mod shortcut;
pub mod stage_config;
pub mod stems;

pub use assembler::{ResNetPlan, ResidualUnitSpec};
pub use catalog::*;
pub use resnet_model::{ResNet, ResNetAbstractConfig, ResNetConfig};
pub use stage_config::{BlockType, StageConfig, VariantFlag};
