//! # `ResNet` Variant Catalog
//!
//! The fixed depth table, the eleven named variants, and
//! [`ResNetFactory`], which builds a named variant and resolves its
//! pretrained weights.
//!
//! | depth | block      | block_depth   | stage_in_channels    |
//! |-------|------------|---------------|----------------------|
//! | 18    | Basic      | 2, 2, 2, 2    | 64, 64, 128, 256     |
//! | 34    | Basic      | 3, 4, 6, 3    | 64, 64, 128, 256     |
//! | 50    | Bottleneck | 3, 4, 6, 3    | 64, 256, 512, 1024   |
//! | 101   | Bottleneck | 3, 4, 23, 3   | 64, 256, 512, 1024   |
//! | 152   | Bottleneck | 3, 8, 36, 3   | 64, 256, 512, 1024   |
//! | 200   | Bottleneck | 3, 12, 48, 3  | 64, 256, 512, 1024   |

use crate::cache::weights::PretrainedWeightsMap;
use crate::errors::{CheckpointLoadError, ConfigurationError, ResNetError};
use crate::models::resnet::assembler::{ResNetPlan, check_lr_multiplier};
use crate::models::resnet::pretrained::{
    CheckpointLoader, DiskCacheFetcher, RecordCheckpointLoader, WeightsFetcher,
    resnet_pretrained_registry, ssld_url,
};
use crate::models::resnet::resnet_model::{ResNet, ResNetAbstractConfig};
use crate::models::resnet::stage_config::{BlockType, StageConfig, VariantFlag};
use burn::config::Config;
use burn::prelude::Backend;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Supported depths.
pub const DEPTHS: [usize; 6] = [18, 34, 50, 101, 152, 200];

/// The stage layout of a supported depth.
pub fn depth_stage_config(depth: usize) -> Result<StageConfig, ConfigurationError> {
    const BASIC_CHANNELS: [usize; 4] = [64, 64, 128, 256];
    const BOTTLENECK_CHANNELS: [usize; 4] = [64, 256, 512, 1024];

    let (block_type, block_depth, stage_in_channels) = match depth {
        18 => (BlockType::Basic, [2, 2, 2, 2], BASIC_CHANNELS),
        34 => (BlockType::Basic, [3, 4, 6, 3], BASIC_CHANNELS),
        50 => (BlockType::Bottleneck, [3, 4, 6, 3], BOTTLENECK_CHANNELS),
        101 => (BlockType::Bottleneck, [3, 4, 23, 3], BOTTLENECK_CHANNELS),
        152 => (BlockType::Bottleneck, [3, 8, 36, 3], BOTTLENECK_CHANNELS),
        200 => (BlockType::Bottleneck, [3, 12, 48, 3], BOTTLENECK_CHANNELS),
        _ => return Err(ConfigurationError::UnknownDepth(depth.to_string())),
    };
    Ok(StageConfig::new(block_type, block_depth, stage_in_channels))
}

/// Parse a depth identifier, e.g. ``"50"``.
pub fn parse_depth(ident: &str) -> Result<usize, ConfigurationError> {
    ident
        .trim()
        .parse::<usize>()
        .ok()
        .filter(|depth| DEPTHS.contains(depth))
        .ok_or_else(|| ConfigurationError::UnknownDepth(ident.to_string()))
}

/// A named catalog variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatalogEntry {
    /// Factory name, e.g. ``"ResNet50_vd"``.
    pub name: &'static str,

    /// Network depth; a key of the depth table.
    pub depth: usize,

    /// Stem variant.
    pub variant: VariantFlag,

    /// Fetch the distilled checkpoint instead of the plain one.
    pub use_ssld: bool,
}

impl CatalogEntry {
    const fn new(
        name: &'static str,
        depth: usize,
        variant: VariantFlag,
        use_ssld: bool,
    ) -> Self {
        Self {
            name,
            depth,
            variant,
            use_ssld,
        }
    }

    /// The stage layout of this variant.
    pub fn stage_config(&self) -> Result<StageConfig, ConfigurationError> {
        depth_stage_config(self.depth)
    }

    /// Expand this variant with the given options.
    pub fn plan(
        &self,
        options: &ResNetOptions,
    ) -> Result<ResNetPlan, ConfigurationError> {
        self.abstract_config(options)?.plan()
    }

    /// The compact model description for the given options.
    pub fn abstract_config(
        &self,
        options: &ResNetOptions,
    ) -> Result<ResNetAbstractConfig, ConfigurationError> {
        options.try_validate()?;
        Ok(ResNetAbstractConfig::new(self.stage_config()?)
            .with_variant(self.variant)
            .with_num_classes(options.class_count)
            .with_lr_multiplier(options.lr_multiplier.clone()))
    }
}

/// Every named variant, in catalog order.
pub static RESNET_CATALOG: [CatalogEntry; 11] = [
    CatalogEntry::new("ResNet18", 18, VariantFlag::StandardStem, false),
    CatalogEntry::new("ResNet18_vd", 18, VariantFlag::DeepStem, false),
    CatalogEntry::new("ResNet34", 34, VariantFlag::StandardStem, false),
    CatalogEntry::new("ResNet34_vd", 34, VariantFlag::DeepStem, true),
    CatalogEntry::new("ResNet50", 50, VariantFlag::StandardStem, false),
    CatalogEntry::new("ResNet50_vd", 50, VariantFlag::DeepStem, true),
    CatalogEntry::new("ResNet101", 101, VariantFlag::StandardStem, false),
    CatalogEntry::new("ResNet101_vd", 101, VariantFlag::DeepStem, true),
    CatalogEntry::new("ResNet152", 152, VariantFlag::StandardStem, false),
    CatalogEntry::new("ResNet152_vd", 152, VariantFlag::DeepStem, false),
    CatalogEntry::new("ResNet200_vd", 200, VariantFlag::DeepStem, true),
];

/// Lookup a catalog variant by its exact name.
pub fn lookup_entry(name: &str) -> Result<&'static CatalogEntry, ConfigurationError> {
    RESNET_CATALOG
        .iter()
        .find(|entry| entry.name == name)
        .ok_or_else(|| ConfigurationError::UnknownModel(name.to_string()))
}

/// Where the initial parameters come from.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "PretrainedArg", into = "PretrainedArg")]
pub enum PretrainedSource {
    /// Random initialization (``false``).
    #[default]
    Disabled,

    /// The registry checkpoint of the variant (``true``).
    Registry,

    /// A local checkpoint file (a path string).
    Path(PathBuf),
}

/// The serialized form: a boolean or a path string.
#[derive(Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum PretrainedArg {
    Flag(bool),
    Path(PathBuf),
}

impl From<PretrainedArg> for PretrainedSource {
    fn from(arg: PretrainedArg) -> Self {
        match arg {
            PretrainedArg::Flag(true) => Self::Registry,
            PretrainedArg::Flag(false) => Self::Disabled,
            PretrainedArg::Path(path) => Self::Path(path),
        }
    }
}

impl From<PretrainedSource> for PretrainedArg {
    fn from(source: PretrainedSource) -> Self {
        match source {
            PretrainedSource::Disabled => Self::Flag(false),
            PretrainedSource::Registry => Self::Flag(true),
            PretrainedSource::Path(path) => Self::Path(path),
        }
    }
}

impl From<bool> for PretrainedSource {
    fn from(flag: bool) -> Self {
        PretrainedArg::Flag(flag).into()
    }
}

impl From<PathBuf> for PretrainedSource {
    fn from(path: PathBuf) -> Self {
        Self::Path(path)
    }
}

impl From<&str> for PretrainedSource {
    fn from(path: &str) -> Self {
        Self::Path(path.into())
    }
}

/// The keys accepted by [`ResNetOptions::from_json`].
pub const OPTION_KEYS: [&str; 3] = ["class_count", "lr_multiplier", "pretrained"];

/// Construction options shared by every catalog factory.
#[derive(Config, Debug)]
pub struct ResNetOptions {
    /// Number of output classes.
    #[config(default = 1000)]
    pub class_count: usize,

    /// Learning-rate multipliers: stem, then one per stage.
    #[config(default = "vec![1.0; 5]")]
    pub lr_multiplier: Vec<f64>,

    /// Initial parameter source.
    #[config(default = "PretrainedSource::Disabled")]
    pub pretrained: PretrainedSource,
}

impl Default for ResNetOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl ResNetOptions {
    /// Check the class count and the multiplier list.
    pub fn try_validate(&self) -> Result<(), ConfigurationError> {
        if self.class_count == 0 {
            return Err(ConfigurationError::InvalidClassCount);
        }
        check_lr_multiplier(&self.lr_multiplier)?;
        Ok(())
    }

    /// Parse options from a JSON object; missing fields take their defaults.
    ///
    /// Keys outside [`OPTION_KEYS`] are rejected; ``pretrained`` must be a
    /// boolean or a path string.
    pub fn from_json(json: &str) -> Result<Self, ConfigurationError> {
        let invalid = |err: serde_json::Error| ConfigurationError::InvalidOptions(err.to_string());

        let value: serde_json::Value = serde_json::from_str(json).map_err(invalid)?;
        let fields = value.as_object().ok_or_else(|| {
            ConfigurationError::InvalidOptions(format!("expected an object, got {value}"))
        })?;

        if let Some(key) = fields
            .keys()
            .find(|key| !OPTION_KEYS.contains(&key.as_str()))
        {
            return Err(ConfigurationError::InvalidOptions(format!(
                "unknown option {key:?}; expected one of {OPTION_KEYS:?}"
            )));
        }

        match fields.get("pretrained") {
            Some(pretrained) if !(pretrained.is_boolean() || pretrained.is_string()) => {
                return Err(ConfigurationError::InvalidPretrained(pretrained.to_string()));
            }
            _ => {}
        }

        let mut merged = serde_json::to_value(Self::new()).map_err(invalid)?;
        if let Some(defaults) = merged.as_object_mut() {
            defaults.extend(fields.clone());
        }

        let options: Self = serde_json::from_value(merged).map_err(invalid)?;
        options.try_validate()?;
        Ok(options)
    }
}

/// Builds catalog variants and resolves their pretrained weights.
///
/// * ``Disabled``: random initialization.
/// * ``Path``: the loader reads the file; every failure propagates.
/// * ``Registry``: the fetcher resolves the registry URL of the variant.
///   A failed fetch is logged and the randomly initialized model is
///   returned; failures after the fetch propagate.
///
/// A registry URL the loader does not accept is rejected with
/// [`CheckpointLoadError::UnsupportedFormat`] before anything is fetched.
/// The default registry serves PaddleClas ``.pdparams`` files, which the
/// default [`RecordCheckpointLoader`] does not read; pair it with a loader
/// for that format via [`ResNetFactory::with_loader`].
pub struct ResNetFactory<B: Backend> {
    registry: PretrainedWeightsMap,
    fetcher: Box<dyn WeightsFetcher>,
    loader: Box<dyn CheckpointLoader<B>>,
}

impl<B: Backend> Default for ResNetFactory<B> {
    fn default() -> Self {
        Self::new(
            resnet_pretrained_registry(),
            Box::new(DiskCacheFetcher::default()),
            Box::new(RecordCheckpointLoader),
        )
    }
}

macro_rules! catalog_factories {
    ($(($method:ident, $name:literal)),* $(,)?) => {
        impl<B: Backend> ResNetFactory<B> {
            $(
                #[doc = concat!("Build `", $name, "`.")]
                pub fn $method(
                    &self,
                    options: &ResNetOptions,
                    device: &B::Device,
                ) -> Result<ResNet<B>, ResNetError> {
                    self.build($name, options, device)
                }
            )*
        }

        $(
            #[doc = concat!("Build `", $name, "` with the default registry, cache and loader.")]
            pub fn $method<B: Backend>(
                options: &ResNetOptions,
                device: &B::Device,
            ) -> Result<ResNet<B>, ResNetError> {
                ResNetFactory::<B>::default().$method(options, device)
            }
        )*
    };
}

catalog_factories!(
    (resnet18, "ResNet18"),
    (resnet18_vd, "ResNet18_vd"),
    (resnet34, "ResNet34"),
    (resnet34_vd, "ResNet34_vd"),
    (resnet50, "ResNet50"),
    (resnet50_vd, "ResNet50_vd"),
    (resnet101, "ResNet101"),
    (resnet101_vd, "ResNet101_vd"),
    (resnet152, "ResNet152"),
    (resnet152_vd, "ResNet152_vd"),
    (resnet200_vd, "ResNet200_vd"),
);

impl<B: Backend> ResNetFactory<B> {
    /// Create a factory.
    pub fn new(
        registry: PretrainedWeightsMap,
        fetcher: Box<dyn WeightsFetcher>,
        loader: Box<dyn CheckpointLoader<B>>,
    ) -> Self {
        Self {
            registry,
            fetcher,
            loader,
        }
    }

    /// Replace the weights fetcher.
    pub fn with_fetcher(
        self,
        fetcher: impl WeightsFetcher + 'static,
    ) -> Self {
        Self {
            fetcher: Box::new(fetcher),
            ..self
        }
    }

    /// Replace the checkpoint loader.
    pub fn with_loader(
        self,
        loader: impl CheckpointLoader<B> + 'static,
    ) -> Self {
        Self {
            loader: Box::new(loader),
            ..self
        }
    }

    /// The checkpoint registry.
    pub fn registry(&self) -> &PretrainedWeightsMap {
        &self.registry
    }

    /// The registry URL for a catalog variant.
    pub fn pretrained_url(
        &self,
        entry: &CatalogEntry,
    ) -> Result<String, CheckpointLoadError> {
        let url = self.registry.try_lookup_by_name(entry.name)?.url()?;
        Ok(if entry.use_ssld {
            ssld_url(url)
        } else {
            url.to_string()
        })
    }

    /// Build a catalog variant by name.
    pub fn build(
        &self,
        name: &str,
        options: &ResNetOptions,
        device: &B::Device,
    ) -> Result<ResNet<B>, ResNetError> {
        self.build_entry(lookup_entry(name)?, options, device)
    }

    /// Build a catalog variant.
    pub fn build_entry(
        &self,
        entry: &CatalogEntry,
        options: &ResNetOptions,
        device: &B::Device,
    ) -> Result<ResNet<B>, ResNetError> {
        let model = entry.abstract_config(options)?.try_init(device)?;

        match &options.pretrained {
            PretrainedSource::Disabled => Ok(model),
            PretrainedSource::Path(path) => Ok(self.loader.load(model, path, device)?),
            PretrainedSource::Registry => {
                let url = self.pretrained_url(entry)?;
                if !self.loader.accepts_url(&url) {
                    return Err(CheckpointLoadError::UnsupportedFormat { url }.into());
                }
                match self.fetcher.fetch(entry.name, &url) {
                    Ok(path) => Ok(self.loader.load(model, &path, device)?),
                    Err(err) => {
                        tracing::warn!(
                            model = entry.name,
                            %url,
                            error = %err,
                            "pretrained weights unavailable; keeping random initialization"
                        );
                        Ok(model)
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::resnet::pretrained::save_checkpoint;
    use crate::models::resnet::stems::STEM_OUT_CHANNELS;
    use burn::backend::NdArray;
    use burn::tensor::Tensor;
    use hamcrest::prelude::*;
    use std::path::Path;
    use std::sync::{Arc, Mutex};

    type B = NdArray<f32>;

    #[derive(Clone, Default)]
    struct RecordingFetcher {
        requests: Arc<Mutex<Vec<(String, String)>>>,
        serve: Option<PathBuf>,
    }

    impl WeightsFetcher for RecordingFetcher {
        fn fetch(
            &self,
            name: &str,
            url: &str,
        ) -> Result<PathBuf, CheckpointLoadError> {
            self.requests
                .lock()
                .unwrap()
                .push((name.to_string(), url.to_string()));
            self.serve.clone().ok_or_else(|| CheckpointLoadError::Fetch {
                url: url.to_string(),
                message: "offline".to_string(),
            })
        }
    }

    struct UnreachableLoader;

    impl CheckpointLoader<B> for UnreachableLoader {
        fn load(
            &self,
            _model: ResNet<B>,
            path: &Path,
            _device: &<B as Backend>::Device,
        ) -> Result<ResNet<B>, CheckpointLoadError> {
            panic!("unexpected load of {}", path.display());
        }
    }

    /// Reads named-mpk records whatever the URL says.
    struct AnyUrlLoader;

    impl CheckpointLoader<B> for AnyUrlLoader {
        fn load(
            &self,
            model: ResNet<B>,
            path: &Path,
            device: &<B as Backend>::Device,
        ) -> Result<ResNet<B>, CheckpointLoadError> {
            RecordCheckpointLoader.load(model, path, device)
        }
    }

    fn factory(fetcher: RecordingFetcher) -> ResNetFactory<B> {
        ResNetFactory::default().with_fetcher(fetcher)
    }

    #[test]
    fn test_depth_table() {
        for depth in DEPTHS {
            let config = depth_stage_config(depth).unwrap();
            assert!(config.try_validate().is_ok());
        }
        assert_eq!(
            depth_stage_config(101).unwrap().block_depth,
            [3, 4, 23, 3]
        );
        assert_eq!(
            depth_stage_config(26),
            Err(ConfigurationError::UnknownDepth("26".to_string()))
        );

        assert_eq!(parse_depth("152"), Ok(152));
        assert!(matches!(
            parse_depth("resnet"),
            Err(ConfigurationError::UnknownDepth(_))
        ));
        assert!(parse_depth("19").is_err());
    }

    #[test]
    fn test_catalog_plans() {
        let options = ResNetOptions::new();
        for entry in &RESNET_CATALOG {
            let plan = entry.plan(&options).unwrap();
            let config = entry.stage_config().unwrap();

            assert_eq!(plan.num_units(), config.num_units(), "{}", entry.name);
            assert_eq!(plan.variant, entry.variant);
            assert_eq!(plan.stem.out_channels(), STEM_OUT_CHANNELS);

            let expected_stem = match entry.variant {
                VariantFlag::StandardStem => 1,
                VariantFlag::DeepStem => 3,
            };
            assert_eq!(plan.stem.units.len(), expected_stem);

            for unit in &plan.units {
                assert_eq!(unit.stride == 2, unit.index == 0 && unit.stage != 0);
                assert_eq!(unit.has_projection_shortcut(), unit.index == 0);
            }

            assert!(entry.name.ends_with(entry.variant.name_suffix()));
            assert_eq!(lookup_entry(entry.name), Ok(entry));
        }
    }

    #[test]
    fn test_lookup_unknown() {
        assert_eq!(
            lookup_entry("ResNet200"),
            Err(ConfigurationError::UnknownModel("ResNet200".to_string()))
        );

        let result = factory(RecordingFetcher::default()).build(
            "resnet18",
            &ResNetOptions::new(),
            &Default::default(),
        );
        assert!(matches!(
            result,
            Err(ResNetError::Configuration(ConfigurationError::UnknownModel(_)))
        ));
    }

    #[test]
    fn test_pretrained_urls() {
        let factory = factory(RecordingFetcher::default());

        let entry = lookup_entry("ResNet18_vd").unwrap();
        assert_eq!(
            factory.pretrained_url(entry).unwrap(),
            "https://paddle-imagenet-models-name.bj.bcebos.com/dygraph/ResNet18_vd_pretrained.pdparams"
        );

        let entry = lookup_entry("ResNet50_vd").unwrap();
        assert_eq!(
            factory.pretrained_url(entry).unwrap(),
            "https://paddle-imagenet-models-name.bj.bcebos.com/dygraph/ResNet50_vd_ssld_pretrained.pdparams"
        );

        let ssld: Vec<&str> = RESNET_CATALOG
            .iter()
            .filter(|e| e.use_ssld)
            .map(|e| e.name)
            .collect();
        assert_eq!(
            ssld,
            vec!["ResNet34_vd", "ResNet50_vd", "ResNet101_vd", "ResNet200_vd"]
        );
    }

    #[test]
    fn test_rejects_bad_lr_multiplier() {
        let factory = factory(RecordingFetcher::default()).with_loader(UnreachableLoader);
        let options = ResNetOptions::new()
            .with_lr_multiplier(vec![1.0; 4])
            .with_pretrained(PretrainedSource::Registry);

        let err = factory.resnet50(&options, &Default::default()).unwrap_err();
        assert_that!(
            err,
            equal_to(ResNetError::Configuration(
                ConfigurationError::LrMultiplierLength {
                    expected: 5,
                    found: 4
                }
            ))
        );
    }

    #[test]
    fn test_resnet50_structure() {
        let model = factory(RecordingFetcher::default())
            .resnet50(&ResNetOptions::new(), &Default::default())
            .unwrap();

        assert_eq!(model.blocks.len(), 16);
        assert_eq!(model.stem.units.len(), 1);
        assert_eq!(model.stem.units[0].conv.kernel_size, [7, 7]);
        assert_eq!(model.stem.units[0].conv.stride, [2, 2]);
        assert_eq!(model.head.in_features(), 2048);
        assert_eq!(model.num_classes(), 1000);
    }

    #[test]
    fn test_registry_fetch_failure_keeps_random_init() {
        let fetcher = RecordingFetcher::default();
        let factory = factory(fetcher.clone()).with_loader(UnreachableLoader);

        let options = ResNetOptions::new()
            .with_class_count(10)
            .with_pretrained(true.into());
        let model = factory.resnet18_vd(&options, &Default::default()).unwrap();

        let channels: Vec<(usize, usize)> = model
            .stem
            .units
            .iter()
            .map(|u| {
                let dims = u.conv.weight.shape().dims;
                (dims[1], dims[0])
            })
            .collect();
        assert_eq!(channels, vec![(3, 32), (32, 32), (32, 64)]);
        assert_eq!(model.num_classes(), 10);

        let requests = fetcher.requests.lock().unwrap();
        assert_eq!(
            *requests,
            vec![(
                "ResNet18_vd".to_string(),
                "https://paddle-imagenet-models-name.bj.bcebos.com/dygraph/ResNet18_vd_pretrained.pdparams"
                    .to_string()
            )]
        );
    }

    #[test]
    fn test_registry_load_failure_propagates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("garbage.pdparams");
        std::fs::write(&path, b"not a record").unwrap();

        let fetcher = RecordingFetcher {
            serve: Some(path),
            ..Default::default()
        };
        let options = ResNetOptions::new().with_pretrained(PretrainedSource::Registry);
        let result = factory(fetcher)
            .with_loader(AnyUrlLoader)
            .resnet18(&options, &Default::default());

        assert!(matches!(
            result,
            Err(ResNetError::Checkpoint(CheckpointLoadError::Record { .. }))
        ));
    }

    #[test]
    fn test_registry_unreadable_format_is_rejected_before_fetch() {
        let fetcher = RecordingFetcher::default();
        let options = ResNetOptions::new().with_pretrained(PretrainedSource::Registry);

        let err = factory(fetcher.clone())
            .resnet50_vd(&options, &Default::default())
            .unwrap_err();
        assert_that!(
            err,
            equal_to(ResNetError::Checkpoint(
                CheckpointLoadError::UnsupportedFormat {
                    url: "https://paddle-imagenet-models-name.bj.bcebos.com/dygraph/ResNet50_vd_ssld_pretrained.pdparams"
                        .to_string()
                }
            ))
        );
        assert!(fetcher.requests.lock().unwrap().is_empty());
    }

    #[test]
    fn test_registry_load_success() {
        let device = Default::default();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ResNet18.mpk");

        let source = factory(RecordingFetcher::default())
            .resnet18(&ResNetOptions::new(), &device)
            .unwrap();
        save_checkpoint(&source, &path).unwrap();

        let fetcher = RecordingFetcher {
            serve: Some(path),
            ..Default::default()
        };
        let options = ResNetOptions::new().with_pretrained(PretrainedSource::Registry);
        let loaded = factory(fetcher.clone())
            .with_loader(AnyUrlLoader)
            .resnet18(&options, &device)
            .unwrap();

        let expected: Tensor<B, 2> = source.head.fc.weight.val();
        loaded
            .head
            .fc
            .weight
            .val()
            .to_data()
            .assert_eq(&expected.to_data(), true);
        assert_eq!(fetcher.requests.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_path_load_and_mismatch() {
        let device = Default::default();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("resnet18.mpk");

        let factory = factory(RecordingFetcher::default());
        let source = factory
            .resnet18(&ResNetOptions::new().with_class_count(3), &device)
            .unwrap();
        save_checkpoint(&source, &path).unwrap();

        let options = ResNetOptions::new()
            .with_class_count(3)
            .with_pretrained(path.clone().into());
        let loaded = factory.resnet18(&options, &device).unwrap();
        let expected: Tensor<B, 4> = source.stem.units[0].conv.weight.val();
        loaded.stem.units[0]
            .conv
            .weight
            .val()
            .to_data()
            .assert_eq(&expected.to_data(), true);

        let options = ResNetOptions::new().with_pretrained(path.clone().into());
        let err = factory.resnet18(&options, &device).unwrap_err();
        assert_eq!(
            err,
            ResNetError::Checkpoint(CheckpointLoadError::ShapeMismatch {
                path,
                param: "head.fc.weight".to_string(),
                expected: vec![512, 1000],
                found: vec![512, 3],
            })
        );
    }

    #[test]
    fn test_options_json() {
        let options = ResNetOptions::from_json(r#"{"class_count": 10}"#).unwrap();
        assert_eq!(options.class_count, 10);
        assert_eq!(options.lr_multiplier, vec![1.0; 5]);
        assert_eq!(options.pretrained, PretrainedSource::Disabled);

        let options = ResNetOptions::from_json(r#"{"pretrained": true}"#).unwrap();
        assert_eq!(options.pretrained, PretrainedSource::Registry);

        let options =
            ResNetOptions::from_json(r#"{"pretrained": "/tmp/weights.mpk"}"#).unwrap();
        assert_eq!(
            options.pretrained,
            PretrainedSource::Path("/tmp/weights.mpk".into())
        );

        assert_eq!(
            ResNetOptions::from_json(r#"{"pretrained": 42}"#).unwrap_err(),
            ConfigurationError::InvalidPretrained("42".to_string())
        );
        assert!(matches!(
            ResNetOptions::from_json(r#"{"lr_multiplier": [1.0, 1.0]}"#),
            Err(ConfigurationError::LrMultiplierLength { .. })
        ));
        assert_eq!(
            ResNetOptions::from_json(r#"{"class_count": 0}"#).unwrap_err(),
            ConfigurationError::InvalidClassCount
        );
        assert!(matches!(
            ResNetOptions::from_json("[]"),
            Err(ConfigurationError::InvalidOptions(_))
        ));
    }

    #[test]
    fn test_options_json_rejects_unknown_keys() {
        let err = ResNetOptions::from_json(r#"{"class_num": 10}"#).unwrap_err();
        assert_that!(
            err,
            equal_to(ConfigurationError::InvalidOptions(
                r#"unknown option "class_num"; expected one of ["class_count", "lr_multiplier", "pretrained"]"#
                    .to_string()
            ))
        );

        assert!(matches!(
            ResNetOptions::from_json(r#"{"class_count": 10, "pretrain": true}"#),
            Err(ConfigurationError::InvalidOptions(_))
        ));

        let options = ResNetOptions::from_json(
            r#"{"class_count": 10, "lr_multiplier": [1, 1, 1, 1, 1], "pretrained": false}"#,
        )
        .unwrap();
        assert_eq!(options.class_count, 10);
    }

    #[test]
    fn test_pretrained_source_serde() {
        let json = serde_json::to_string(&PretrainedSource::Registry).unwrap();
        assert_eq!(json, "true");
        let json = serde_json::to_string(&PretrainedSource::from("w.mpk")).unwrap();
        assert_eq!(json, "\"w.mpk\"");
        assert_eq!(PretrainedSource::from(false), PretrainedSource::Disabled);
    }
}
