use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{config::AssetEntry, Result, SyncError};

/// One playable unit: a media file and the haptic pattern that accompanies it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioAsset {
    pub media_file: PathBuf,
    pub haptic_file: PathBuf,
}

impl AudioAsset {
    pub fn new(media_file: impl Into<PathBuf>, haptic_file: impl Into<PathBuf>) -> Self {
        Self {
            media_file: media_file.into(),
            haptic_file: haptic_file.into(),
        }
    }
}

/// Fixed, non-empty sequence of assets for the lifetime of a session.
#[derive(Debug, Clone, Serialize)]
pub struct Playlist {
    assets: Vec<AudioAsset>,
}

impl Playlist {
    pub fn new(assets: Vec<AudioAsset>) -> Result<Self> {
        if assets.is_empty() {
            return Err(SyncError::msg("playlist must contain at least one asset"));
        }
        Ok(Self { assets })
    }

    /// Resolves every configured entry through `provider`.
    pub fn from_entries(entries: &[AssetEntry], provider: &dyn AssetProvider) -> Result<Self> {
        let assets = entries
            .iter()
            .map(|entry| {
                Ok(AudioAsset::new(
                    provider.resolve(&entry.media)?,
                    provider.resolve(&entry.haptic)?,
                ))
            })
            .collect::<Result<Vec<_>>>()?;
        Self::new(assets)
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&AudioAsset> {
        self.assets.get(index)
    }

    /// Index following `index`, wrapping back to the first entry.
    pub fn next_index(&self, index: usize) -> usize {
        (index + 1) % self.assets.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AudioAsset> {
        self.assets.iter()
    }
}

/// Supplies a stable filesystem path for a logical asset name.
pub trait AssetProvider {
    fn resolve(&self, name: &str) -> Result<PathBuf>;
}

/// Copies assets shipped in a read-only bundle directory into a writable data
/// directory, the way downloaded media would land on disk.
#[derive(Debug, Clone)]
pub struct BundledAssetStore {
    bundle_dir: PathBuf,
    data_dir: PathBuf,
}

impl BundledAssetStore {
    pub fn new(bundle_dir: impl Into<PathBuf>, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            bundle_dir: bundle_dir.into(),
            data_dir: data_dir.into(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Copies `name` into the data directory unless a file with that name is
    /// already present. Existing files are never overwritten.
    pub fn provision(&self, name: &str) -> Result<PathBuf> {
        let target = self.data_dir.join(name);
        if target.is_file() {
            tracing::debug!(?target, "asset already provisioned");
            return Ok(target);
        }

        let source = self.bundle_dir.join(name);
        if !source.is_file() {
            return Err(SyncError::msg(format!(
                "asset `{name}` is missing from bundle {}",
                self.bundle_dir.display()
            )));
        }

        std::fs::create_dir_all(&self.data_dir)?;
        let bytes = std::fs::copy(&source, &target)?;
        tracing::info!(?source, ?target, bytes, "provisioned asset");
        Ok(target)
    }
}

impl AssetProvider for BundledAssetStore {
    fn resolve(&self, name: &str) -> Result<PathBuf> {
        self.provision(name)
    }
}
