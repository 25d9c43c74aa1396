//! # Projection Shortcut
//!
//! When a residual unit changes shape, its skip connection is a 1x1
//! [`ConvUnit`] with no activation.
//!
//! The first unit of the network (and every standard-stem unit) strides the
//! projection conv directly; every other projection average-pools 2x2 first
//! and then projects at stride 1.

use crate::layers::blocks::conv_unit::{ConvUnit, ConvUnitConfig};
use burn::config::Config;
use burn::prelude::Backend;

/// Projection shortcut Config.
#[derive(Config, Debug)]
pub struct ProjectionShortcutConfig {
    /// Number of input channels.
    pub in_channels: usize,

    /// Number of output channels.
    pub out_channels: usize,

    /// The stride of the owning residual unit.
    #[config(default = 1)]
    pub stride: usize,

    /// Stride the projection conv directly, rather than pooling first.
    #[config(default = "true")]
    pub is_first_unit_of_first_stage: bool,

    /// Learning-rate multiplier.
    #[config(default = "1.0")]
    pub lr_multiplier: f64,
}

impl ProjectionShortcutConfig {
    /// The [`ConvUnitConfig`] of the projection.
    pub fn conv_unit_config(&self) -> ConvUnitConfig {
        let config = ConvUnitConfig::new(self.in_channels, self.out_channels, 1)
            .with_act(false)
            .with_lr_multiplier(self.lr_multiplier);

        if self.is_first_unit_of_first_stage {
            config.with_stride(self.stride)
        } else {
            config.with_pre_downsample(true)
        }
    }

    /// Initialize the projection [`ConvUnit`].
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> ConvUnit<B> {
        self.conv_unit_config().init(device)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::blocks::conv_unit::ConvUnitMeta;

    #[test]
    fn test_strided_projection() {
        let config = ProjectionShortcutConfig::new(64, 128)
            .with_stride(2)
            .conv_unit_config();
        assert_eq!(config.kernel_size(), 1);
        assert_eq!(config.stride(), 2);
        assert!(!config.pre_downsample());
        assert!(!config.has_activation());
        assert_eq!(config.output_resolution([56, 56]), [28, 28]);
        assert_eq!(config.output_resolution([7, 7]), [4, 4]);
    }

    #[test]
    fn test_pooled_projection() {
        let config = ProjectionShortcutConfig::new(256, 512)
            .with_stride(2)
            .with_is_first_unit_of_first_stage(false)
            .with_lr_multiplier(0.2)
            .conv_unit_config();
        assert_eq!(config.stride(), 1);
        assert!(config.pre_downsample());
        assert!(!config.has_activation());
        assert_eq!(config.lr_multiplier(), 0.2);
        assert_eq!(config.output_resolution([56, 56]), [28, 28]);
        assert_eq!(config.output_resolution([7, 7]), [4, 4]);
    }
}
