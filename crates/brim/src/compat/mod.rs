//! # Compat
//!
//! Shape arithmetic for ``burn`` convolution and pooling layers.

pub mod conv_shape;
