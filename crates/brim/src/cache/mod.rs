//! # Weight Caches
//!
//! Remote checkpoints are downloaded once into
//! ``~/.cache/brim/weights/{name}-{crc16(url)}-{basename}`` and re-used.

pub mod disk;
pub mod weights;
