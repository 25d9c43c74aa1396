//! # Pretrained Weight Descriptors

use crate::errors::CheckpointLoadError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const X25: crc::Crc<u16> = crc::Crc::<u16>::new(&crc::CRC_16_IBM_SDLC);

/// Build a cache key (bare cache file name) from a name and URL.
///
/// The key is ``{name}-{crc16(url)}-{url basename}``.
pub fn url_to_cache_key(
    name: Option<&str>,
    url: &str,
) -> String {
    let hash = X25.checksum(url.as_bytes()).to_string();
    let base_name = url.rsplit_once('/').map_or(url, |(_, base)| base);
    match name {
        Some(n) => format!("{n}-{hash}-{base_name}"),
        None => format!("{hash}-{base_name}"),
    }
}

/// Get the cache resource key for a pretrained weights file.
pub fn pretrained_weights_resource_key(cache_key: &str) -> Vec<String> {
    vec!["weights".to_string(), cache_key.to_string()]
}

/// Static [`PretrainedWeightsDescriptor`] provider.
#[derive(Debug)]
pub struct StaticPretrainedWeightsDescriptor<'a> {
    /// Name of the model.
    pub name: &'a str,

    /// Description of the model.
    pub description: &'a str,

    /// License.
    pub license: Option<&'a str>,

    /// Source URL.
    pub origin: Option<&'a str>,

    /// URLs to download the weights from; the first is canonical.
    pub urls: &'a [&'a str],
}

impl StaticPretrainedWeightsDescriptor<'_> {
    /// Convert to a [`PretrainedWeightsDescriptor`].
    pub fn to_descriptor(&self) -> PretrainedWeightsDescriptor {
        PretrainedWeightsDescriptor {
            name: self.name.to_string(),
            description: self.description.to_string(),
            license: self.license.map(|s| s.to_string()),
            origin: self.origin.map(|s| s.to_string()),
            urls: self.urls.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// A descriptor for a pretrained weights file.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct PretrainedWeightsDescriptor {
    /// Name of the model.
    pub name: String,

    /// Description of the model.
    pub description: String,

    /// License.
    pub license: Option<String>,

    /// Source URL.
    pub origin: Option<String>,

    /// URLs to download the weights from; the first is canonical.
    pub urls: Vec<String>,
}

impl PretrainedWeightsDescriptor {
    /// The canonical download URL.
    pub fn url(&self) -> Result<&str, CheckpointLoadError> {
        self.urls
            .first()
            .map(String::as_str)
            .ok_or_else(|| CheckpointLoadError::UnknownModel(self.name.clone()))
    }
}

/// Static [`PretrainedWeightsMap`] builder.
#[derive(Debug)]
pub struct StaticPretrainedWeightsMap<'a> {
    /// List of static descriptors.
    pub items: &'a [&'a StaticPretrainedWeightsDescriptor<'a>],
}

impl StaticPretrainedWeightsMap<'_> {
    /// Convert to a [`PretrainedWeightsMap`].
    pub fn to_directory(&self) -> PretrainedWeightsMap {
        PretrainedWeightsMap {
            items: self
                .items
                .iter()
                .map(|d| {
                    let desc = d.to_descriptor();
                    (desc.name.clone(), desc)
                })
                .collect(),
        }
    }
}

/// Immutable directory of [`PretrainedWeightsDescriptor`]s, keyed by name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PretrainedWeightsMap {
    /// Map of descriptors.
    pub items: BTreeMap<String, PretrainedWeightsDescriptor>,
}

impl PretrainedWeightsMap {
    /// Lookup a descriptor by name.
    pub fn lookup_by_name(
        &self,
        name: &str,
    ) -> Option<&PretrainedWeightsDescriptor> {
        self.items.get(name)
    }

    /// Lookup a descriptor.
    pub fn try_lookup_by_name(
        &self,
        name: &str,
    ) -> Result<&PretrainedWeightsDescriptor, CheckpointLoadError> {
        self.lookup_by_name(name)
            .ok_or_else(|| CheckpointLoadError::UnknownModel(name.to_string()))
    }

    /// Registered names, in order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.items.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static TEST_MAP: StaticPretrainedWeightsMap<'static> = StaticPretrainedWeightsMap {
        items: &[&StaticPretrainedWeightsDescriptor {
            name: "my_model",
            description: "some description of my model.",
            license: Some("MIT"),
            origin: Some("https://github.com/my_org/my_model"),
            urls: &["https://example.com/weights/my_model.bin", "mirror"],
        }],
    };

    #[test]
    fn test_url_to_cache_key() {
        let url = "https://example.com/a/b/model.pdparams";
        let hash = X25.checksum(url.as_bytes());
        assert_eq!(
            url_to_cache_key(Some("ResNet18"), url),
            format!("ResNet18-{hash}-model.pdparams")
        );
        assert_eq!(url_to_cache_key(None, url), format!("{hash}-model.pdparams"));
        assert_eq!(url_to_cache_key(None, "bare"), format!("{}-bare", X25.checksum(b"bare")));
    }

    #[test]
    fn test_directory_lookup() {
        let directory = TEST_MAP.to_directory();
        assert_eq!(directory.names().collect::<Vec<_>>(), vec!["my_model"]);

        let desc = directory.try_lookup_by_name("my_model").unwrap();
        assert_eq!(desc.license.as_deref(), Some("MIT"));
        assert_eq!(desc.url().unwrap(), "https://example.com/weights/my_model.bin");
        assert_eq!(desc.urls.len(), 2);

        assert_eq!(
            directory.try_lookup_by_name("other"),
            Err(CheckpointLoadError::UnknownModel("other".to_string()))
        );
    }
}
