//! [crates/core/src/scanner.rs]
//! =================================================================
//! APARATO: DIRECTORY SCANNER (ESTRATO L4)
//! RESPONSABILIDAD: DESCUBRIMIENTO PERIODICO DE ARTEFACTOS NO IMPORTADOS
//!
//! Tick-driven directory walk, built on `walkdir` for traversal and
//! `globset` for ignore-pattern matching, tolerant of per-entry I/O
//! errors so one bad entry never aborts a whole pass.
//! =================================================================

use std::path::{Path, PathBuf};
use std::time::Duration;

use globset::{Glob, GlobSet, GlobSetBuilder};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use walkdir::WalkDir;

use altmount_db::QueueRepository;
use altmount_models::queue::NewQueueEntry;

#[derive(Debug, Clone)]
pub struct ScannerConfig {
    pub watch_directory: PathBuf,
    pub poll_interval: Duration,
    pub recursive: bool,
    pub allowed_extensions: Vec<String>,
    pub max_depth: usize,
    pub worker_count: usize,
    pub ignore_patterns: Vec<String>,
    pub default_priority: i32,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            watch_directory: PathBuf::from("."),
            poll_interval: Duration::from_secs(30),
            recursive: true,
            allowed_extensions: vec!["nzb".to_string()],
            max_depth: 8,
            worker_count: 2,
            ignore_patterns: Vec::new(),
            default_priority: 5,
        }
    }
}

/// Checks whether `relative_path` is already materialized, via whatever
/// collaborator owns the imported-files relation. The descriptor parser
/// and VFS mount live outside this workspace, so this is a named seam,
/// not a concrete repository.
#[async_trait::async_trait]
pub trait ImportedFilesIndex: Send + Sync {
    async fn is_already_imported(&self, submission_path: &str) -> bool;
}

pub struct Scanner {
    config: ScannerConfig,
    queue: QueueRepository,
    imported: std::sync::Arc<dyn ImportedFilesIndex>,
    ignore_set: GlobSet,
}

impl Scanner {
    pub fn new(
        config: ScannerConfig,
        queue: QueueRepository,
        imported: std::sync::Arc<dyn ImportedFilesIndex>,
    ) -> Self {
        let ignore_set = build_ignore_set(&config.ignore_patterns);
        Self {
            config,
            queue,
            imported,
            ignore_set,
        }
    }

    /// Runs the poll loop until `cancel` fires. Cancellation aborts the
    /// walk promptly — checked between every directory entry.
    #[instrument(skip(self, cancel))]
    pub async fn run(&self, cancel: &CancellationToken) {
        info!(
            "[SCANNER]: watching '{}' every {:?}",
            self.config.watch_directory.display(),
            self.config.poll_interval
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("[SCANNER]: cancelled, stopping");
                    return;
                }
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }

            if let Err(error) = self.scan_once(cancel).await {
                warn!("[SCANNER]: scan pass failed: {error}");
            }
        }
    }

    /// One pass over the watch directory. Public so callers can trigger
    /// an out-of-band scan (e.g. from an admin action) without waiting
    /// for the next tick.
    #[instrument(skip(self, cancel))]
    pub async fn scan_once(&self, cancel: &CancellationToken) -> anyhow::Result<usize> {
        let candidates = self.walk_candidates(cancel);
        let mut enqueued = 0usize;

        for candidate in candidates {
            if cancel.is_cancelled() {
                break;
            }

            let submission_path = candidate.to_string_lossy().to_string();

            if self.imported.is_already_imported(&submission_path).await {
                continue;
            }

            // UPSERT on submission_path: a repeat scan nudges priority
            // rather than duplicating the row.
            let entry = NewQueueEntry::from_scanner(submission_path.clone(), self.config.default_priority);
            self.queue.enqueue(entry).await?;
            enqueued += 1;
            debug!("[SCANNER]: enqueued '{submission_path}'");
        }

        if enqueued > 0 {
            info!("[SCANNER]: enqueued {enqueued} new candidate(s)");
        }
        Ok(enqueued)
    }

    /// Walks the configured directory, tolerating per-entry I/O errors
    /// (logged, not fatal) and filtering by extension and ignore glob.
    fn walk_candidates(&self, cancel: &CancellationToken) -> Vec<PathBuf> {
        let mut candidates = Vec::new();
        let max_depth = if self.config.recursive { self.config.max_depth } else { 1 };

        let walker = WalkDir::new(&self.config.watch_directory)
            .max_depth(max_depth)
            .into_iter();

        for entry_result in walker {
            if cancel.is_cancelled() {
                break;
            }

            let entry = match entry_result {
                Ok(entry) => entry,
                Err(walk_error) => {
                    warn!("[SCANNER]: walk entry error: {walk_error}");
                    continue;
                }
            };

            if !entry.file_type().is_file() {
                continue;
            }

            if !self.matches_extension(entry.path()) {
                continue;
            }

            if self.is_ignored(entry.path()) {
                continue;
            }

            candidates.push(entry.path().to_path_buf());
        }

        candidates
    }

    fn matches_extension(&self, path: &Path) -> bool {
        if self.config.allowed_extensions.is_empty() {
            return true;
        }
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| {
                self.config
                    .allowed_extensions
                    .iter()
                    .any(|allowed| allowed.eq_ignore_ascii_case(ext))
            })
            .unwrap_or(false)
    }

    fn is_ignored(&self, path: &Path) -> bool {
        if self.ignore_set.is_empty() {
            return false;
        }
        let basename_match = path
            .file_name()
            .map(|name| self.ignore_set.is_match(name))
            .unwrap_or(false);
        basename_match || self.ignore_set.is_match(path)
    }
}

fn build_ignore_set(patterns: &[String]) -> GlobSet {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        match Glob::new(pattern) {
            Ok(glob) => {
                builder.add(glob);
            }
            Err(error) => warn!("[SCANNER]: invalid ignore pattern '{pattern}': {error}"),
        }
    }
    builder.build().unwrap_or_else(|_| GlobSetBuilder::new().build().unwrap())
}
