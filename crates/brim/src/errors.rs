//! # Error Taxonomy
//!
//! * [`ConfigurationError`] - rejected model configuration; raised before any
//!   parameter is allocated.
//! * [`CheckpointLoadError`] - fetching or applying pretrained weights failed.
//! * [`ResNetError`] - the union returned by the catalog factories.

use std::path::PathBuf;
use thiserror::Error;

/// A malformed model configuration.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigurationError {
    /// The learning-rate multiplier list has the wrong length.
    #[error("lr_multiplier length should be {expected} but got {found}")]
    LrMultiplierLength {
        /// Required length.
        expected: usize,
        /// Supplied length.
        found: usize,
    },

    /// A learning-rate multiplier is not a positive, finite number.
    #[error("lr_multiplier[{index}] should be positive and finite but got {value}")]
    InvalidLrMultiplier {
        /// Position in the list.
        index: usize,
        /// Offending value.
        value: f64,
    },

    /// A stage depth or channel count is zero.
    #[error("invalid stage config: {0}")]
    InvalidStageConfig(String),

    /// The block-type identifier does not name a residual unit variant.
    #[error("unknown block type: {0:?}")]
    UnknownBlockType(String),

    /// The version identifier does not name a stem variant.
    #[error("unknown variant: {0:?}")]
    UnknownVariant(String),

    /// The depth identifier is not in the catalog.
    #[error("unknown depth: {0:?}")]
    UnknownDepth(String),

    /// The factory name is not in the catalog.
    #[error("unknown model: {0:?}")]
    UnknownModel(String),

    /// The `pretrained` argument is neither a boolean nor a path string.
    #[error("pretrained type is not available, use `string` or `boolean` type; got {0}")]
    InvalidPretrained(String),

    /// The construction options could not be parsed.
    #[error("invalid options: {0}")]
    InvalidOptions(String),

    /// The class count must be positive.
    #[error("class_count should be positive")]
    InvalidClassCount,

    /// A residual unit config violates its shortcut invariants.
    #[error("invalid residual unit: {0}")]
    InvalidBlock(String),
}

/// A failure to fetch or apply pretrained parameters.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CheckpointLoadError {
    /// The remote checkpoint could not be fetched.
    #[error("failed to fetch {url}: {message}")]
    Fetch {
        /// Source URL.
        url: String,
        /// Underlying failure.
        message: String,
    },

    /// The configured loader cannot read the checkpoint format at this URL.
    #[error("no configured checkpoint loader reads {url}")]
    UnsupportedFormat {
        /// Source URL.
        url: String,
    },

    /// The checkpoint file could not be read or decoded.
    #[error("failed to read checkpoint {path:?}: {message}")]
    Record {
        /// Checkpoint path.
        path: PathBuf,
        /// Underlying failure.
        message: String,
    },

    /// A checkpoint parameter does not match the declared shape.
    #[error("checkpoint {path:?}: parameter {param} expected shape {expected:?}, found {found:?}")]
    ShapeMismatch {
        /// Checkpoint path.
        path: PathBuf,
        /// Parameter path within the model.
        param: String,
        /// Shape declared by the model.
        expected: Vec<usize>,
        /// Shape stored in the checkpoint.
        found: Vec<usize>,
    },

    /// The checkpoint has a different number of tensors than the model.
    #[error("checkpoint {path:?}: expected {expected} tensors, found {found}")]
    ParamCount {
        /// Checkpoint path.
        path: PathBuf,
        /// Tensor count of the model.
        expected: usize,
        /// Tensor count of the checkpoint.
        found: usize,
    },

    /// The registry has no checkpoint for the requested model.
    #[error("no pretrained weights registered for {0:?}")]
    UnknownModel(String),
}

/// Errors raised by the catalog factories.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ResNetError {
    /// See [`ConfigurationError`].
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    /// See [`CheckpointLoadError`].
    #[error(transparent)]
    Checkpoint(#[from] CheckpointLoadError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = ConfigurationError::LrMultiplierLength {
            expected: 5,
            found: 3,
        };
        assert_eq!(
            err.to_string(),
            "lr_multiplier length should be 5 but got 3"
        );

        let err: ResNetError = ConfigurationError::UnknownBlockType("Foo".to_string()).into();
        assert_eq!(err.to_string(), "unknown block type: \"Foo\"");

        let err: ResNetError = CheckpointLoadError::UnknownModel("ResNet7".to_string()).into();
        assert!(matches!(
            err,
            ResNetError::Checkpoint(CheckpointLoadError::UnknownModel(_))
        ));
    }
}
