//! Registry documents as returned by `crane manifest`.
//!
//! Only the fields needed for footprint accounting are modelled; everything
//! else in the OCI / Docker distribution formats is ignored.

use serde::Deserialize;

/// A multi-platform manifest list (OCI image index).
#[derive(Debug, Clone, Deserialize)]
pub struct ManifestIndex {
    /// `None` when the reference points at a single-platform manifest.
    #[serde(default)]
    pub manifests: Option<Vec<ManifestEntry>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ManifestEntry {
    pub digest: String,
    #[serde(default)]
    pub platform: Platform,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Platform {
    #[serde(default)]
    pub architecture: String,
    #[serde(default)]
    pub os: String,
    #[serde(default)]
    pub variant: Option<String>,
}

impl ManifestEntry {
    pub fn is_linux(&self) -> bool {
        self.platform.os == "linux"
    }
}

/// A single-platform image manifest.
#[derive(Debug, Clone, Deserialize)]
pub struct ImageManifest {
    #[serde(default)]
    pub layers: Vec<Descriptor>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Descriptor {
    pub size: u64,
}

impl ImageManifest {
    pub fn total_layer_size(&self) -> u64 {
        self.layers.iter().map(|layer| layer.size).sum()
    }
}
