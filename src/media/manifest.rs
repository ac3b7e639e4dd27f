//! JSON manifest store.
//!
//! The manifest maps [`MediaUid`]s to [`Metadata`] and is persisted as a
//! single JSON document next to the media files. Reads and writes go through
//! a reader/writer lock: many concurrent readers, or exactly one writer.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use log::{debug, warn};
use tokio::sync::RwLock;

use crate::error::Result;
use crate::media::{MediaUid, Metadata};
use crate::utils::fileio;

/// Shared handle to the process-wide manifest.
pub type SharedManifest = Arc<FileManifest>;

/// Manifest of hosted media, persisted as a JSON file.
#[derive(Debug, Default)]
pub struct FileManifest {
    entries: RwLock<HashMap<MediaUid, Metadata>>,
}

impl FileManifest {
    /// An empty manifest.
    pub fn new() -> Self {
        FileManifest::default()
    }

    /// Decodes a manifest from its JSON document form.
    pub fn from_json(buf: &[u8]) -> Result<Self> {
        let entries: HashMap<MediaUid, Metadata> = serde_json::from_slice(buf)?;
        Ok(FileManifest {
            entries: RwLock::new(entries),
        })
    }

    /// Looks up the metadata for `uid`.
    pub async fn get(&self, uid: &MediaUid) -> Option<Metadata> {
        self.entries.read().await.get(uid).cloned()
    }

    /// True when `uid` is present in the manifest.
    pub async fn contains(&self, uid: &MediaUid) -> bool {
        self.entries.read().await.contains_key(uid)
    }

    /// All entries, in no particular order.
    pub async fn entries(&self) -> Vec<Metadata> {
        self.entries.read().await.values().cloned().collect()
    }

    /// A point-in-time copy of the full uid → metadata mapping.
    pub async fn snapshot(&self) -> HashMap<MediaUid, Metadata> {
        self.entries.read().await.clone()
    }

    /// Serializes the manifest to an indented JSON document.
    pub async fn json(&self) -> Result<Vec<u8>> {
        let entries = self.entries.read().await;
        Ok(serde_json::to_vec_pretty(&*entries)?)
    }

    /// Persists the manifest to `path` atomically (temp file + fsync +
    /// rename in the same directory).
    pub async fn save_json(&self, path: &Path) -> Result<()> {
        let buf = self.json().await?;
        if let Err(e) = fileio::replace_file_contents(path, &buf) {
            warn!("failed to update manifest at {}: {}", path.display(), e);
            return Err(e);
        }
        debug!("manifest saved to {}", path.display());
        Ok(())
    }

    /// Inserts `metadata`, overwriting any entry with the same uid.
    pub async fn put(&self, metadata: Metadata) {
        self.entries
            .write()
            .await
            .insert(metadata.uid.clone(), metadata);
    }

    /// Overwrites the non-empty descriptive fields of the entry matching
    /// `patch.uid` (title, genre, thumbnail URL; duration when positive).
    ///
    /// Returns false when no entry matches.
    pub async fn patch(&self, patch: &Metadata) -> bool {
        let mut entries = self.entries.write().await;
        let Some(existing) = entries.get_mut(&patch.uid) else {
            return false;
        };

        if !patch.title.is_empty() {
            existing.title = patch.title.clone();
        }
        if !patch.genre.is_empty() {
            existing.genre = patch.genre.clone();
        }
        if !patch.thumbnail_url.is_empty() {
            existing.thumbnail_url = patch.thumbnail_url.clone();
        }
        if patch.duration > 0.0 {
            existing.duration = patch.duration;
        }
        true
    }

    /// Deletes the entry with `uid`, returning true iff it existed.
    pub async fn remove(&self, uid: &MediaUid) -> bool {
        self.entries.write().await.remove(uid).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::BasicMediaType;
    use pretty_assertions::assert_eq;

    fn sample(uid: &str, title: &str) -> Metadata {
        Metadata {
            uid: MediaUid::from(uid),
            title: title.into(),
            media_type: BasicMediaType::AudioVideo,
            ..Metadata::default()
        }
    }

    #[tokio::test]
    async fn put_get_remove() {
        let manifest = FileManifest::new();
        manifest.put(sample("abc", "First")).await;

        assert!(manifest.contains(&MediaUid::from("abc")).await);
        assert_eq!(
            manifest.get(&MediaUid::from("abc")).await.unwrap().title,
            "First"
        );

        assert!(manifest.remove(&MediaUid::from("abc")).await);
        assert!(!manifest.remove(&MediaUid::from("abc")).await);
        assert!(manifest.get(&MediaUid::from("abc")).await.is_none());
    }

    #[tokio::test]
    async fn put_overwrites_matching_uid() {
        let manifest = FileManifest::new();
        manifest.put(sample("abc", "First")).await;
        manifest.put(sample("abc", "Second")).await;

        assert_eq!(manifest.entries().await.len(), 1);
        assert_eq!(
            manifest.get(&MediaUid::from("abc")).await.unwrap().title,
            "Second"
        );
    }

    #[tokio::test]
    async fn patch_merges_non_empty_fields() {
        let manifest = FileManifest::new();
        let mut original = sample("abc", "Original");
        original.genre = "drama".into();
        original.duration = 120.0;
        manifest.put(original).await;

        let mut patch = Metadata::default();
        patch.uid = MediaUid::from("abc");
        patch.title = "Renamed".into();
        assert!(manifest.patch(&patch).await);

        let got = manifest.get(&MediaUid::from("abc")).await.unwrap();
        assert_eq!(got.title, "Renamed");
        assert_eq!(got.genre, "drama");
        assert_eq!(got.duration, 120.0);

        patch.uid = MediaUid::from("missing");
        assert!(!manifest.patch(&patch).await);
    }

    #[tokio::test]
    async fn save_and_reload_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manifest.json");

        let manifest = FileManifest::new();
        manifest.put(sample("abc", "First")).await;
        manifest.put(sample("xyz", "Second")).await;
        manifest.save_json(&path).await.unwrap();

        let reloaded = FileManifest::from_json(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(reloaded.snapshot().await, manifest.snapshot().await);
    }
}
