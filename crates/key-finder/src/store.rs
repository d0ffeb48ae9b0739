use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::time::SystemTime;

use crate::types::AnalysisResult;

/// Key-value sink for analysis results, keyed by file path.
///
/// The engine never writes one itself; callers decide where results go.
pub trait AnalysisStore: Send + Sync {
    fn put(&self, path: &Path, result: &AnalysisResult);

    /// Store `result` along with the file's modification time when it was
    /// read. Stores that keep no times just `put`.
    fn put_with_modified(
        &self,
        path: &Path,
        result: &AnalysisResult,
        _modified: Option<SystemTime>,
    ) {
        self.put(path, result);
    }

    /// Modification time recorded with the entry for `path`.
    fn modified(&self, _path: &Path) -> Option<SystemTime> {
        None
    }

    fn get(&self, path: &Path) -> Option<AnalysisResult>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone)]
struct Entry {
    result: AnalysisResult,
    modified: Option<SystemTime>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<PathBuf, Entry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every entry, sorted by path.
    pub fn entries(&self) -> Vec<(PathBuf, AnalysisResult)> {
        let guard = match self.entries.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut out: Vec<_> = guard
            .iter()
            .map(|(path, entry)| (path.clone(), entry.result.clone()))
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }
}

impl AnalysisStore for MemoryStore {
    fn put(&self, path: &Path, result: &AnalysisResult) {
        self.put_with_modified(path, result, None);
    }

    fn put_with_modified(
        &self,
        path: &Path,
        result: &AnalysisResult,
        modified: Option<SystemTime>,
    ) {
        let mut guard = match self.entries.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.insert(
            path.to_path_buf(),
            Entry {
                result: result.clone(),
                modified,
            },
        );
    }

    fn get(&self, path: &Path) -> Option<AnalysisResult> {
        let guard = match self.entries.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.get(path).map(|entry| entry.result.clone())
    }

    fn modified(&self, path: &Path) -> Option<SystemTime> {
        let guard = match self.entries.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.get(path).and_then(|entry| entry.modified)
    }

    fn len(&self) -> usize {
        match self.entries.read() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }
}
