//! Artifact cache port.
//!
//! Every persisted intermediate (raw and processed matrices, partition
//! assignment, imputation schema, models, predictions) is addressed by an
//! [`ArtifactKey`]. Presence of an artifact is the only memoization signal the
//! pipeline uses, and deleting it is the only invalidation.
//!
//! Layout under a dataset root: `<root>/<entity>/<file>`.
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tempfile::NamedTempFile;

use crate::error::{LearnerError, Result};

/// Kind of artifact stored for one entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Role {
    Raw,
    ProcessedFull,
    ProcessedTrain,
    ProcessedEval,
    PartitionAssignment,
    ImputationSchema,
    /// Serialized classifier, keyed by algorithm name.
    Model(String),
    /// `actual,predict` pairs, keyed by algorithm name.
    Predictions(String),
    /// `actual,predict` pairs of a transferred model.
    TransferPredictions,
}

impl Role {
    pub fn file_name(&self, entity: &str) -> String {
        match self {
            Role::Raw => format!("{entity}-normality-matrix-raw.tab"),
            Role::ProcessedFull => format!("{entity}-normality-matrix-processed.tab"),
            Role::ProcessedTrain => format!("{entity}-normality-train-matrix-processed.tab"),
            Role::ProcessedEval => format!("{entity}-normality-evalu-matrix-processed.tab"),
            Role::PartitionAssignment => "pat_split.csv".to_string(),
            Role::ImputationSchema => "feat2imputed.json".to_string(),
            Role::Model(alg) => format!("{entity}-normality-{alg}-model.json"),
            Role::Predictions(alg) => format!("{alg}/direct_comparisons.csv"),
            Role::TransferPredictions => "direct_comparisons.csv".to_string(),
        }
    }

    /// Older pipelines named the eval matrix `test`; it is still accepted on read.
    fn legacy_file_name(&self, entity: &str) -> Option<String> {
        match self {
            Role::ProcessedEval => Some(format!("{entity}-normality-test-matrix-processed.tab")),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArtifactKey {
    pub entity: String,
    pub role: Role,
}

impl ArtifactKey {
    pub fn new(entity: impl Into<String>, role: Role) -> Self {
        ArtifactKey {
            entity: entity.into(),
            role,
        }
    }

    pub fn relative_path(&self) -> PathBuf {
        Path::new(&self.entity).join(self.role.file_name(&self.entity))
    }

    /// Primary path first, then any legacy alias.
    fn candidate_paths(&self) -> Vec<PathBuf> {
        let mut paths = vec![self.relative_path()];
        if let Some(legacy) = self.role.legacy_file_name(&self.entity) {
            paths.push(Path::new(&self.entity).join(legacy));
        }
        paths
    }
}

impl fmt::Display for ArtifactKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.relative_path().display())
    }
}

/// Namespaced byte store with whole-artifact reads and writes.
///
/// Writes must be all-or-nothing: a reader never observes a partially
/// written artifact.
pub trait ArtifactCache: Send + Sync {
    fn exists(&self, key: &ArtifactKey) -> bool;
    fn read(&self, key: &ArtifactKey) -> Result<Vec<u8>>;
    fn write(&self, key: &ArtifactKey, bytes: &[u8]) -> Result<()>;
}

/// Filesystem-backed cache rooted at a dataset directory.
#[derive(Debug, Clone)]
pub struct FsCache {
    root: PathBuf,
}

impl FsCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        FsCache { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, key: &ArtifactKey) -> PathBuf {
        self.root.join(key.relative_path())
    }

    fn locate(&self, key: &ArtifactKey) -> Option<PathBuf> {
        key.candidate_paths()
            .into_iter()
            .map(|rel| self.root.join(rel))
            .find(|path| path.is_file())
    }
}

impl ArtifactCache for FsCache {
    fn exists(&self, key: &ArtifactKey) -> bool {
        self.locate(key).is_some()
    }

    fn read(&self, key: &ArtifactKey) -> Result<Vec<u8>> {
        let path = self
            .locate(key)
            .ok_or_else(|| LearnerError::MissingArtifact(self.path_for(key).display().to_string()))?;
        log::debug!("Reading cache artifact {}", path.display());
        Ok(fs::read(path)?)
    }

    fn write(&self, key: &ArtifactKey, bytes: &[u8]) -> Result<()> {
        let path = self.path_for(key);
        let dir = path.parent().unwrap_or(&self.root);
        fs::create_dir_all(dir)?;

        // Stage next to the target so the final rename stays on one filesystem.
        let mut staged = NamedTempFile::new_in(dir)?;
        staged.write_all(bytes)?;
        staged.as_file().sync_all()?;
        staged.persist(&path).map_err(|e| e.error)?;

        log::debug!("Wrote cache artifact {} ({} bytes)", path.display(), bytes.len());
        Ok(())
    }
}

/// In-memory cache used by tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<PathBuf, Vec<u8>>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn remove(&self, key: &ArtifactKey) -> bool {
        self.lock().remove(&key.relative_path()).is_some()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<PathBuf, Vec<u8>>> {
        // A poisoned map is still structurally valid; every write is a single insert.
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl ArtifactCache for MemoryCache {
    fn exists(&self, key: &ArtifactKey) -> bool {
        let entries = self.lock();
        key.candidate_paths().iter().any(|p| entries.contains_key(p))
    }

    fn read(&self, key: &ArtifactKey) -> Result<Vec<u8>> {
        let entries = self.lock();
        key.candidate_paths()
            .iter()
            .find_map(|p| entries.get(p).cloned())
            .ok_or_else(|| LearnerError::MissingArtifact(key.to_string()))
    }

    fn write(&self, key: &ArtifactKey, bytes: &[u8]) -> Result<()> {
        self.lock().insert(key.relative_path(), bytes.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_names_follow_layout() {
        let key = ArtifactKey::new("LABA1C", Role::Raw);
        assert_eq!(
            key.relative_path(),
            PathBuf::from("LABA1C/LABA1C-normality-matrix-raw.tab")
        );
        let key = ArtifactKey::new("LABA1C", Role::Predictions("gbdt".into()));
        assert_eq!(
            key.relative_path(),
            PathBuf::from("LABA1C/gbdt/direct_comparisons.csv")
        );
    }

    #[test]
    fn fs_cache_write_read_exists() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FsCache::new(dir.path());
        let key = ArtifactKey::new("LABK", Role::PartitionAssignment);

        assert!(!cache.exists(&key));
        cache.write(&key, b"pat_id,in_train\n1,1\n").unwrap();
        assert!(cache.exists(&key));
        assert_eq!(cache.read(&key).unwrap(), b"pat_id,in_train\n1,1\n");

        // Overwrite replaces atomically and leaves no staging files behind.
        cache.write(&key, b"pat_id,in_train\n1,0\n").unwrap();
        assert_eq!(cache.read(&key).unwrap(), b"pat_id,in_train\n1,0\n");
        let leftovers = fs::read_dir(dir.path().join("LABK")).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[test]
    fn fs_cache_reads_legacy_eval_name() {
        let dir = tempfile::tempdir().unwrap();
        let entity_dir = dir.path().join("LABK");
        fs::create_dir_all(&entity_dir).unwrap();
        fs::write(
            entity_dir.join("LABK-normality-test-matrix-processed.tab"),
            b"y\n1\n",
        )
        .unwrap();

        let cache = FsCache::new(dir.path());
        let key = ArtifactKey::new("LABK", Role::ProcessedEval);
        assert!(cache.exists(&key));
        assert_eq!(cache.read(&key).unwrap(), b"y\n1\n");
    }

    #[test]
    fn missing_artifact_is_reported() {
        let cache = MemoryCache::new();
        let key = ArtifactKey::new("LABK", Role::ImputationSchema);
        assert!(matches!(
            cache.read(&key).unwrap_err(),
            LearnerError::MissingArtifact(_)
        ));
        cache.write(&key, b"{}").unwrap();
        assert!(cache.exists(&key));
        assert!(cache.remove(&key));
        assert!(cache.is_empty());
    }
}
