//! # Parameter Inventories
//!
//! Named walks over the learnable parameters of a module (or of its record),
//! used for per-segment learning rates and for checkpoint shape validation.

use burn::module::{Param, ParamId};
use burn::prelude::{Backend, Tensor};

/// A learnable parameter of a module.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamDescriptor {
    /// Dotted path of the parameter, e.g. ``blocks.3.conv1.conv.weight``.
    pub path: String,

    /// The parameter id.
    pub id: ParamId,

    /// The parameter shape.
    pub shape: Vec<usize>,

    /// The learning-rate multiplier of the owning segment.
    pub lr_multiplier: f64,
}

/// Lists the learnable parameters of a module.
pub trait ParamInventory {
    /// Append this module's parameters, with paths under `prefix`.
    fn collect_params(
        &self,
        prefix: &str,
        params: &mut Vec<ParamDescriptor>,
    );

    /// All parameters of this module.
    fn param_descriptors(&self) -> Vec<ParamDescriptor> {
        let mut params = Vec::new();
        self.collect_params("", &mut params);
        params
    }
}

/// Lists every tensor shape stored in a module record.
///
/// Covers the learnable parameters and the normalization running
/// statistics; everything a record load overwrites.
pub trait RecordShapes {
    /// Append this record's tensor shapes, with paths under `prefix`.
    fn collect_shapes(
        &self,
        prefix: &str,
        shapes: &mut Vec<(String, Vec<usize>)>,
    );

    /// All tensor shapes of this record.
    fn param_shapes(&self) -> Vec<(String, Vec<usize>)> {
        let mut shapes = Vec::new();
        self.collect_shapes("", &mut shapes);
        shapes
    }
}

/// Join a dotted parameter path.
pub fn join_path(
    prefix: &str,
    name: &str,
) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}.{name}")
    }
}

/// Describe a tensor parameter.
pub fn describe_param<B: Backend, const D: usize>(
    path: String,
    param: &Param<Tensor<B, D>>,
    lr_multiplier: f64,
) -> ParamDescriptor {
    ParamDescriptor {
        path,
        id: param.id,
        shape: param_shape(param),
        lr_multiplier,
    }
}

/// The shape of a tensor parameter.
pub fn param_shape<B: Backend, const D: usize>(param: &Param<Tensor<B, D>>) -> Vec<usize> {
    param.val().dims().to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_path() {
        assert_eq!(join_path("", "head"), "head");
        assert_eq!(join_path("blocks.0", "conv0"), "blocks.0.conv0");
    }
}
