//! Disk-backed persistence for one workspace package.
//!
//! The cache lives at `<project_root>/.dartscope/` and holds the serialized
//! index record stream next to a JSON manifest of content hashes. A stale or
//! unreadable cache is never an error; callers fall back to a full reindex.

use crate::scip::{self, ScipIndex};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

pub const CACHE_DIR: &str = ".dartscope";
pub const INDEX_FILE: &str = "index.bin";
pub const MANIFEST_FILE: &str = "manifest.json";
pub const MANIFEST_VERSION: u32 = 1;

/// Number of hashes spot-checked against disk during validation.
const VALIDATION_SAMPLE: usize = 5;

/// Hashes keyed by POSIX relative path.
pub type FileHashes = BTreeMap<String, String>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceManifest {
    pub version: u32,
    pub created_at: DateTime<Utc>,
    pub project_root: String,
    pub file_hashes: FileHashes,
}

/// Outcome of diffing the manifest against the files currently on disk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheDiff {
    pub changed: Vec<String>,
    pub added: Vec<String>,
    pub removed: Vec<String>,
}

impl CacheDiff {
    pub fn is_empty(&self) -> bool {
        self.changed.is_empty() && self.added.is_empty() && self.removed.is_empty()
    }
}

/// SHA-256 of a file's bytes, lowercase hex.
pub fn hash_file(path: &Path) -> Result<String> {
    let bytes =
        fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    Ok(hash_bytes(&bytes))
}

pub fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    let mut out = String::with_capacity(64);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

pub struct IndexCache {
    project_root: PathBuf,
}

impl IndexCache {
    pub fn new(project_root: PathBuf) -> Self {
        Self { project_root }
    }

    pub fn dir(&self) -> PathBuf {
        self.project_root.join(CACHE_DIR)
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.dir().join(MANIFEST_FILE)
    }

    pub fn index_path(&self) -> PathBuf {
        self.dir().join(INDEX_FILE)
    }

    fn read_manifest(&self) -> Option<WorkspaceManifest> {
        let data = fs::read(self.manifest_path()).ok()?;
        serde_json::from_slice(&data).ok()
    }

    /// Both files present, manifest version current, and a spot check of up
    /// to five recorded hashes matches disk. An empty project is valid.
    pub fn has_valid_cache(&self) -> bool {
        if !self.index_path().exists() {
            return false;
        }
        let Some(manifest) = self.read_manifest() else {
            return false;
        };
        if manifest.version != MANIFEST_VERSION {
            return false;
        }
        for (rel, expected) in manifest.file_hashes.iter().take(VALIDATION_SAMPLE) {
            match hash_file(&self.project_root.join(rel)) {
                Ok(actual) if actual == *expected => {}
                _ => return false,
            }
        }
        true
    }

    /// Load the serialized index and recorded hashes; None on any
    /// validation or decode failure (the caller reindexes from scratch).
    pub fn load(&self) -> Option<(ScipIndex, FileHashes)> {
        if !self.has_valid_cache() {
            return None;
        }
        let manifest = self.read_manifest()?;
        let index = scip::read_from(&self.index_path()).ok()?;
        Some((index, manifest.file_hashes))
    }

    /// Persist the index and hashes. The manifest is written to a temp file
    /// and renamed into place so a crash never leaves it torn.
    pub fn save(&self, index: &ScipIndex, file_hashes: &FileHashes) -> Result<()> {
        let dir = self.dir();
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create cache dir {}", dir.display()))?;

        scip::write_to(&self.index_path(), index)?;

        let manifest = WorkspaceManifest {
            version: MANIFEST_VERSION,
            created_at: Utc::now(),
            project_root: self.project_root.display().to_string(),
            file_hashes: file_hashes.clone(),
        };
        let data = serde_json::to_vec_pretty(&manifest)?;
        let tmp = dir.join(format!("{MANIFEST_FILE}.tmp"));
        fs::write(&tmp, data)
            .with_context(|| format!("failed to write {}", tmp.display()))?;
        fs::rename(&tmp, self.manifest_path())
            .with_context(|| format!("failed to commit {}", self.manifest_path().display()))?;
        Ok(())
    }

    /// Compare the manifest's hashes against the hashes of the files
    /// currently on disk.
    ///
    /// `changed` are files whose hash differs, `added` are files missing
    /// from the manifest, `removed` are manifest entries no longer present.
    pub fn diff_against(&self, current_files: &FileHashes) -> CacheDiff {
        let recorded = self
            .read_manifest()
            .map(|m| m.file_hashes)
            .unwrap_or_default();

        let mut diff = CacheDiff::default();
        for (rel, hash) in current_files {
            match recorded.get(rel) {
                Some(prev) if prev == hash => {}
                Some(_) => diff.changed.push(rel.clone()),
                None => diff.added.push(rel.clone()),
            }
        }
        for rel in recorded.keys() {
            if !current_files.contains_key(rel) {
                diff.removed.push(rel.clone());
            }
        }
        diff
    }

    /// Delete the cache directory recursively.
    pub fn invalidate(&self) -> Result<()> {
        let dir = self.dir();
        if dir.exists() {
            fs::remove_dir_all(&dir)
                .with_context(|| format!("failed to remove cache dir {}", dir.display()))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scip::ScipIndex;

    #[test]
    fn hash_is_stable_hex_sha256() {
        let h = hash_bytes(b"class A {}");
        assert_eq!(h.len(), 64);
        assert_eq!(h, hash_bytes(b"class A {}"));
        assert_ne!(h, hash_bytes(b"class B {}"));
    }

    #[test]
    fn missing_cache_is_invalid_but_load_is_quiet() {
        let temp = tempfile::tempdir().unwrap();
        let cache = IndexCache::new(temp.path().to_path_buf());
        assert!(!cache.has_valid_cache());
        assert!(cache.load().is_none());
    }

    #[test]
    fn save_load_round_trip() {
        let temp = tempfile::tempdir().unwrap();
        std::fs::write(temp.path().join("a.dart"), "class A {}").unwrap();

        let cache = IndexCache::new(temp.path().to_path_buf());
        let mut hashes = FileHashes::new();
        hashes.insert(
            "a.dart".into(),
            hash_file(&temp.path().join("a.dart")).unwrap(),
        );
        cache.save(&ScipIndex::default(), &hashes).unwrap();

        assert!(cache.has_valid_cache());
        let (_, loaded) = cache.load().unwrap();
        assert_eq!(loaded, hashes);
    }

    #[test]
    fn hash_mismatch_invalidates() {
        let temp = tempfile::tempdir().unwrap();
        std::fs::write(temp.path().join("a.dart"), "class A {}").unwrap();

        let cache = IndexCache::new(temp.path().to_path_buf());
        let mut hashes = FileHashes::new();
        hashes.insert(
            "a.dart".into(),
            hash_file(&temp.path().join("a.dart")).unwrap(),
        );
        cache.save(&ScipIndex::default(), &hashes).unwrap();

        std::fs::write(temp.path().join("a.dart"), "class A { int x = 0; }").unwrap();
        assert!(!cache.has_valid_cache());
        assert!(cache.load().is_none());
    }

    #[test]
    fn diff_classifies_changed_added_removed() {
        let temp = tempfile::tempdir().unwrap();
        std::fs::write(temp.path().join("a.dart"), "class A {}").unwrap();

        let cache = IndexCache::new(temp.path().to_path_buf());
        let mut recorded = FileHashes::new();
        recorded.insert("a.dart".into(), hash_bytes(b"old"));
        recorded.insert("gone.dart".into(), hash_bytes(b"gone"));
        cache.save(&ScipIndex::default(), &recorded).unwrap();

        let mut current = FileHashes::new();
        current.insert("a.dart".into(), hash_bytes(b"new"));
        current.insert("fresh.dart".into(), hash_bytes(b"fresh"));

        let diff = cache.diff_against(&current);
        assert_eq!(diff.changed, vec!["a.dart".to_string()]);
        assert_eq!(diff.added, vec!["fresh.dart".to_string()]);
        assert_eq!(diff.removed, vec!["gone.dart".to_string()]);
    }

    #[test]
    fn invalidate_removes_directory() {
        let temp = tempfile::tempdir().unwrap();
        let cache = IndexCache::new(temp.path().to_path_buf());
        cache.save(&ScipIndex::default(), &FileHashes::new()).unwrap();
        assert!(cache.dir().exists());
        cache.invalidate().unwrap();
        assert!(!cache.dir().exists());
    }
}
