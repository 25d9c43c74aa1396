#![warn(missing_docs)]
//!# brim - `ResNet` variants for Burn
//!
//! A compact depth configuration expands into a concrete stack of residual
//! units; the result is a ``burn`` [`Module`](burn::module::Module) mapping
//! ``[batch, 3, H, W]`` images to ``[batch, class_count]`` logits,
//! optionally initialized from a checkpoint.
//!
//! ## Notable Components
//!
//! * [`cache`] - weight download cache.
//! * [`compat`] - convolution and ceiling-mode pooling shape arithmetic.
//! * [`errors`] - configuration and checkpoint error taxonomy.
//! * [`layers`] - reusable neural network modules.
//!   * [`layers::blocks::conv_unit`] - ``[AvgPool] + Conv2d + BatchNorm + [ReLU]`` block.
//!   * [`layers::pool`] - ceiling-mode average pooling.
//! * [`models`] - complete model families.
//!   * [`models::resnet`] - `ResNet` ``vb`` / ``vd``, depths 18 to 200.
//! * [`utility`] - parameter inventories.
//!
//! ## Example
//!
//! ```rust,no_run
//! use brim::models::resnet::{ResNetOptions, resnet50_vd};
//! use burn::backend::NdArray;
//!
//! let options = ResNetOptions::new().with_class_count(10);
//! let model = resnet50_vd::<NdArray>(&options, &Default::default()).unwrap();
//! assert_eq!(model.num_classes(), 10);
//! ```

/// Test-only macro import.
#[cfg(test)]
#[allow(unused_imports)]
#[macro_use]
extern crate hamcrest;

pub mod compat;
pub mod errors;
pub mod layers;

pub mod cache;
pub mod models;
pub mod utility;
