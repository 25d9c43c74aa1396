//! Common low-level modules for building residual networks in Burn.
pub mod blocks;
pub mod pool;
