//! Batch analysis over many files.
//!
//! Files are discovered up front, analyzed on the blocking pool a few at a
//! time, and reported back strictly in input order. Cancellation is checked
//! between files; a file already being decoded always runs to completion.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::analyzer::MusicAnalyzer;
use crate::store::AnalysisStore;
use crate::types::AnalysisResult;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanOptions {
    /// Lowercase, without the dot.
    pub extensions: Vec<String>,
    /// Paths containing any of these substrings are skipped.
    pub exclude: Vec<String>,
    pub recursive: bool,
    /// Files analyzed concurrently. Zero is treated as one.
    pub workers: usize,
    /// Leave a file alone when the store already holds it with the same
    /// modification time.
    pub skip_unchanged: bool,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            extensions: vec!["mid".into(), "midi".into(), "smf".into()],
            exclude: Vec::new(),
            recursive: true,
            workers: 4,
            skip_unchanged: false,
        }
    }
}

impl ScanOptions {
    fn accepts(&self, path: &Path) -> bool {
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            return false;
        };
        let ext = ext.to_ascii_lowercase();
        if !self.extensions.iter().any(|e| e.eq_ignore_ascii_case(&ext)) {
            return false;
        }
        let full = path.to_string_lossy();
        !self
            .exclude
            .iter()
            .any(|pattern| !pattern.is_empty() && full.contains(pattern.as_str()))
    }
}

/// Collect candidate files under `roots`, sorted and deduplicated.
///
/// A root that is itself a file is kept when its extension matches.
/// Unreadable directory entries are logged and skipped.
pub fn discover_midi_files(roots: &[PathBuf], options: &ScanOptions) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for root in roots {
        let mut walker = WalkDir::new(root).follow_links(false);
        if !options.recursive {
            walker = walker.max_depth(1);
        }

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    warn!(root = %root.display(), error = %err, "skipping unreadable entry");
                    continue;
                }
            };
            if entry.file_type().is_file() && options.accepts(entry.path()) {
                files.push(entry.into_path());
            }
        }
    }

    files.sort();
    files.dedup();
    debug!(count = files.len(), roots = roots.len(), "discovered midi files");
    files
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileAnalysis {
    pub path: PathBuf,
    pub result: AnalysisResult,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanFailure {
    pub path: PathBuf,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanReport {
    pub total: usize,
    pub analyzed: usize,
    pub failed: usize,
    /// Skipped because the store's copy is up to date.
    pub unchanged: usize,
    /// Stopped early. Files already being analyzed when the token fired are
    /// still reported; files after them were never opened.
    pub cancelled: bool,
    pub elapsed: Duration,
    pub results: Vec<FileAnalysis>,
    pub failures: Vec<ScanFailure>,
}

impl ScanReport {
    fn new(total: usize) -> Self {
        Self {
            total,
            analyzed: 0,
            failed: 0,
            unchanged: 0,
            cancelled: false,
            elapsed: Duration::ZERO,
            results: Vec::new(),
            failures: Vec::new(),
        }
    }
}

/// Progress stream for one scan: one `Progress` per finished file, then `Done`.
#[derive(Debug, Clone)]
pub enum ScanEvent {
    Progress {
        /// 1-based.
        current: usize,
        total: usize,
        file_name: String,
    },
    Done(ScanReport),
}

/// What happened to one file on the blocking pool.
enum Visit {
    Unchanged,
    Analyzed {
        outcome: crate::Result<AnalysisResult>,
        modified: Option<SystemTime>,
    },
}

fn visit(
    analyzer: &dyn MusicAnalyzer,
    store: Option<&dyn AnalysisStore>,
    skip_unchanged: bool,
    path: &Path,
) -> Visit {
    let modified = std::fs::metadata(path).and_then(|m| m.modified()).ok();
    if skip_unchanged {
        if let (Some(store), Some(modified)) = (store, modified) {
            if store.modified(path) == Some(modified) {
                return Visit::Unchanged;
            }
        }
    }
    Visit::Analyzed {
        outcome: analyzer.analyze_path(path),
        modified,
    }
}

/// Everything a scan needs besides the file list.
#[derive(Clone)]
pub struct ScanContext {
    pub options: ScanOptions,
    cancel: CancellationToken,
    progress: Option<mpsc::Sender<ScanEvent>>,
    store: Option<Arc<dyn AnalysisStore>>,
}

impl ScanContext {
    pub fn new(options: ScanOptions) -> Self {
        Self {
            options,
            cancel: CancellationToken::new(),
            progress: None,
            store: None,
        }
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_progress(mut self, progress: mpsc::Sender<ScanEvent>) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn with_store(mut self, store: Arc<dyn AnalysisStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    async fn publish(&self, event: ScanEvent) {
        if let Some(progress) = &self.progress {
            // receiver gone just means nobody is watching
            let _ = progress.send(event).await;
        }
    }
}

/// Analyze `paths` and return the report. Does not send `Done`.
pub async fn scan_files(
    analyzer: Arc<dyn MusicAnalyzer>,
    paths: Vec<PathBuf>,
    ctx: &ScanContext,
) -> ScanReport {
    let started = Instant::now();
    let total = paths.len();
    let workers = ctx.options.workers.max(1);
    let skip_unchanged = ctx.options.skip_unchanged;
    let mut report = ScanReport::new(total);

    info!(total, workers, "scan started");

    let mut outcomes = stream::iter(paths.into_iter().enumerate())
        .map(|(index, path)| {
            let analyzer = Arc::clone(&analyzer);
            let store = ctx.store.clone();
            let cancel = ctx.cancel.clone();
            async move {
                if cancel.is_cancelled() {
                    return (index, path, None);
                }
                let task_path = path.clone();
                let outcome = tokio::task::spawn_blocking(move || {
                    visit(analyzer.as_ref(), store.as_deref(), skip_unchanged, &task_path)
                })
                .await;
                (index, path, Some(outcome))
            }
        })
        .buffered(workers);

    // Drain to the end: files started before the cancel still get reported,
    // the rest resolve to `None` without being opened.
    while let Some((index, path, outcome)) = outcomes.next().await {
        let Some(outcome) = outcome else {
            report.cancelled = true;
            continue;
        };

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        ctx.publish(ScanEvent::Progress {
            current: index + 1,
            total,
            file_name,
        })
        .await;

        match outcome {
            Ok(Visit::Unchanged) => {
                debug!(path = %path.display(), "unchanged since last scan");
                report.unchanged += 1;
            }
            Ok(Visit::Analyzed {
                outcome: Ok(result),
                modified,
            }) => {
                debug!(path = %path.display(), key = %result.key_name(), "file analyzed");
                if let Some(store) = &ctx.store {
                    store.put_with_modified(&path, &result, modified);
                }
                report.results.push(FileAnalysis { path, result });
            }
            Ok(Visit::Analyzed {
                outcome: Err(err), ..
            }) => {
                warn!(path = %path.display(), error = %err, "analysis failed");
                report.failures.push(ScanFailure {
                    path,
                    error: err.to_string(),
                });
            }
            Err(join_err) => {
                warn!(path = %path.display(), error = %join_err, "analysis task failed");
                report.failures.push(ScanFailure {
                    path,
                    error: join_err.to_string(),
                });
            }
        }
    }

    report.analyzed = report.results.len();
    report.failed = report.failures.len();
    report.elapsed = started.elapsed();

    info!(
        analyzed = report.analyzed,
        failed = report.failed,
        unchanged = report.unchanged,
        cancelled = report.cancelled,
        elapsed_ms = report.elapsed.as_millis() as u64,
        "scan finished"
    );
    report
}

/// Run a scan in its own task. The receiver yields progress and ends with
/// exactly one `Done`.
pub fn spawn_scan(
    analyzer: Arc<dyn MusicAnalyzer>,
    paths: Vec<PathBuf>,
    ctx: ScanContext,
) -> (mpsc::Receiver<ScanEvent>, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(64);
    let ctx = ctx.with_progress(tx.clone());
    let handle = tokio::spawn(async move {
        let report = scan_files(analyzer, paths, &ctx).await;
        drop(ctx);
        let _ = tx.send(ScanEvent::Done(report)).await;
    });
    (rx, handle)
}
