//! # Pooling Layers
mod avg_pool_2d_ceil;

pub use avg_pool_2d_ceil::*;
