//! # Utilities
pub mod params;
