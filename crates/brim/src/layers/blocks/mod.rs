//! # Miscellaneous Blocks
pub mod conv_unit;
