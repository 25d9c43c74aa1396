//! # Pretrained `ResNet` Weights
//!
//! * [`RESNET_PRETRAINED_WEIGHTS`] - the immutable checkpoint registry.
//! * [`WeightsFetcher`] - resolves a registry URL to a local file;
//!   [`DiskCacheFetcher`] is the read-through disk cache.
//! * [`CheckpointLoader`] - applies a checkpoint file to a [`ResNet`];
//!   [`RecordCheckpointLoader`] reads ``burn`` named-mpk records.
//!
//! The registry URLs name PaddleClas ``.pdparams`` checkpoints, which
//! [`RecordCheckpointLoader`] does not read; resolving them needs an
//! injected [`CheckpointLoader`] that accepts the format.

use crate::cache::disk::DiskCacheConfig;
use crate::cache::weights::{
    PretrainedWeightsMap, StaticPretrainedWeightsDescriptor, StaticPretrainedWeightsMap,
    pretrained_weights_resource_key, url_to_cache_key,
};
use crate::errors::CheckpointLoadError;
use crate::models::resnet::resnet_model::{ResNet, ResNetRecord};
use crate::utility::params::RecordShapes;
use burn::module::Module;
use burn::prelude::Backend;
use burn::record::{FullPrecisionSettings, NamedMpkBytesRecorder, Recorder};
use std::path::{Path, PathBuf};

const LICENSE: Option<&str> = Some("apache-2.0");
const ORIGIN: Option<&str> = Some("https://github.com/PaddlePaddle/PaddleClas");

macro_rules! paddle_weights {
    ($name:literal, $description:literal) => {
        &StaticPretrainedWeightsDescriptor {
            name: $name,
            description: $description,
            license: LICENSE,
            origin: ORIGIN,
            urls: &[concat!(
                "https://paddle-imagenet-models-name.bj.bcebos.com/dygraph/",
                $name,
                "_pretrained.pdparams"
            )],
        }
    };
}

/// ImageNet-1k checkpoints, keyed by catalog name.
pub static RESNET_PRETRAINED_WEIGHTS: StaticPretrainedWeightsMap<'static> =
    StaticPretrainedWeightsMap {
        items: &[
            paddle_weights!("ResNet18", "ResNet-18 trained on ImageNet-1k"),
            paddle_weights!("ResNet18_vd", "ResNet-18-vd trained on ImageNet-1k"),
            paddle_weights!("ResNet34", "ResNet-34 trained on ImageNet-1k"),
            paddle_weights!("ResNet34_vd", "ResNet-34-vd trained on ImageNet-1k"),
            paddle_weights!("ResNet50", "ResNet-50 trained on ImageNet-1k"),
            paddle_weights!("ResNet50_vd", "ResNet-50-vd trained on ImageNet-1k"),
            paddle_weights!("ResNet101", "ResNet-101 trained on ImageNet-1k"),
            paddle_weights!("ResNet101_vd", "ResNet-101-vd trained on ImageNet-1k"),
            paddle_weights!("ResNet152", "ResNet-152 trained on ImageNet-1k"),
            paddle_weights!("ResNet152_vd", "ResNet-152-vd trained on ImageNet-1k"),
            paddle_weights!("ResNet200_vd", "ResNet-200-vd trained on ImageNet-1k"),
        ],
    };

/// Build the default checkpoint registry.
pub fn resnet_pretrained_registry() -> PretrainedWeightsMap {
    RESNET_PRETRAINED_WEIGHTS.to_directory()
}

/// Rewrite a checkpoint URL to its distilled ("ssld") counterpart.
pub fn ssld_url(url: &str) -> String {
    url.replace("_pretrained", "_ssld_pretrained")
}

/// Resolves a checkpoint URL to a local file.
pub trait WeightsFetcher: Send + Sync {
    /// Fetch the checkpoint of model `name` from `url`.
    fn fetch(
        &self,
        name: &str,
        url: &str,
    ) -> Result<PathBuf, CheckpointLoadError>;
}

/// Read-through disk cache over the ``burn`` network downloader.
#[derive(Debug, Clone, Default)]
pub struct DiskCacheFetcher {
    /// Cache location.
    pub cache: DiskCacheConfig,
}

impl DiskCacheFetcher {
    /// The cache path a checkpoint would occupy.
    pub fn cache_path(
        &self,
        name: &str,
        url: &str,
    ) -> anyhow::Result<PathBuf> {
        self.cache
            .resource_to_path(&pretrained_weights_resource_key(&url_to_cache_key(Some(name), url)))
    }
}

impl WeightsFetcher for DiskCacheFetcher {
    fn fetch(
        &self,
        name: &str,
        url: &str,
    ) -> Result<PathBuf, CheckpointLoadError> {
        let resource = pretrained_weights_resource_key(&url_to_cache_key(Some(name), url));
        self.cache
            .fetch_resource(url, &resource)
            .map_err(|err| CheckpointLoadError::Fetch {
                url: url.to_string(),
                message: format!("{err:#}"),
            })
    }
}

/// Applies a checkpoint file to a model.
pub trait CheckpointLoader<B: Backend>: Send + Sync {
    /// Can this loader read the checkpoint served at `url`?
    ///
    /// Consulted before any download.
    fn accepts_url(
        &self,
        _url: &str,
    ) -> bool {
        true
    }

    /// Overwrite the parameters of `model` with those stored at `path`.
    ///
    /// Any parameter shape mismatch is an error.
    fn load(
        &self,
        model: ResNet<B>,
        path: &Path,
        device: &B::Device,
    ) -> Result<ResNet<B>, CheckpointLoadError>;
}

/// Loads ``burn`` named-mpk full-precision records.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecordCheckpointLoader;

impl RecordCheckpointLoader {
    /// File extension of named-mpk records.
    pub const EXTENSION: &'static str = "mpk";

    /// Does `url` name a named-mpk record?
    pub fn reads_url(url: &str) -> bool {
        let file_name = url.rsplit_once('/').map_or(url, |(_, base)| base);
        Path::new(file_name)
            .extension()
            .is_some_and(|ext| ext == Self::EXTENSION)
    }
}

impl<B: Backend> CheckpointLoader<B> for RecordCheckpointLoader {
    fn accepts_url(
        &self,
        url: &str,
    ) -> bool {
        Self::reads_url(url)
    }

    fn load(
        &self,
        model: ResNet<B>,
        path: &Path,
        device: &B::Device,
    ) -> Result<ResNet<B>, CheckpointLoadError> {
        let record_error = |message: String| CheckpointLoadError::Record {
            path: path.to_path_buf(),
            message,
        };

        let bytes = std::fs::read(path).map_err(|err| record_error(err.to_string()))?;
        let record: ResNetRecord<B> = NamedMpkBytesRecorder::<FullPrecisionSettings>::new()
            .load(bytes, device)
            .map_err(|err| record_error(format!("{err:?}")))?;

        check_record_shapes(&model, &record, path)?;

        tracing::info!(
            path = %path.display(),
            num_params = model.num_params(),
            "loaded checkpoint"
        );

        Ok(model.load_record(record))
    }
}

/// Check that a record matches a model parameter for parameter.
pub fn check_record_shapes<B: Backend>(
    model: &ResNet<B>,
    record: &ResNetRecord<B>,
    path: &Path,
) -> Result<(), CheckpointLoadError> {
    let expected = model.param_shapes();
    let found = record.param_shapes();

    for ((param, expected_shape), (_, found_shape)) in expected.iter().zip(found.iter()) {
        if expected_shape != found_shape {
            return Err(CheckpointLoadError::ShapeMismatch {
                path: path.to_path_buf(),
                param: param.clone(),
                expected: expected_shape.clone(),
                found: found_shape.clone(),
            });
        }
    }
    if expected.len() != found.len() {
        return Err(CheckpointLoadError::ParamCount {
            path: path.to_path_buf(),
            expected: expected.len(),
            found: found.len(),
        });
    }
    Ok(())
}

/// Write a model as a checkpoint readable by [`RecordCheckpointLoader`].
pub fn save_checkpoint<B: Backend>(
    model: &ResNet<B>,
    path: &Path,
) -> Result<(), CheckpointLoadError> {
    let record_error = |message: String| CheckpointLoadError::Record {
        path: path.to_path_buf(),
        message,
    };

    let bytes = NamedMpkBytesRecorder::<FullPrecisionSettings>::new()
        .record(model.clone().into_record(), ())
        .map_err(|err| record_error(format!("{err:?}")))?;
    std::fs::write(path, bytes).map_err(|err| record_error(err.to_string()))
}
