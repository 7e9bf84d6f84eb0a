//! Categorize runs
//!
//! One run sorts every immediate subdirectory of the source root:
//!
//! ```text
//! validate source ─► scan ─► worker pool (batch_size) ─► report
//!                              │
//!                              ├─ categorize (provider chain)
//!                              └─ move (blocking pool)
//! ```
//!
//! Only a bad source or destination stops a run, and always before the first
//! item. Per-item problems end up in that item's `MoveRecord`.

use chrono::{DateTime, Utc};
use futures::future::FutureExt;
use futures::stream::{FuturesUnordered, StreamExt};
use serde::Serialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

use crate::categorize::{CategoryLabel, ProviderChain, ProviderStatsEntry};
use crate::config::Settings;
use crate::error::{Result, SorterError};
use crate::mover::{DirectoryMover, MoveOutcome, MoveRecord};


/// Progress callback: (items finished, items total)
pub type ProgressCallback = Box<dyn Fn(usize, usize) + Send + Sync>;

/// Run-level cancellation
///
/// Checked by each worker before it starts an item. In-flight items finish.
#[derive(Debug, Clone)]
pub struct CancelFlag(pub Arc<AtomicBool>);

impl Default for CancelFlag {
    fn default() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }
}

impl CancelFlag {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Final tally of a run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    /// Items that produced a record
    pub processed: usize,
    pub moved: usize,
    pub failed: usize,
    pub skipped: usize,
    pub duplicate_risk: usize,
    /// Items that fell through to the default category
    pub defaulted: usize,
    /// Items never started because the run was cancelled
    pub cancelled: usize,
}

impl RunSummary {
    fn tally(records: &[MoveRecord], defaulted: usize, cancelled: usize) -> Self {
        let count = |outcome: MoveOutcome| records.iter().filter(|r| r.outcome() == outcome).count();
        Self {
            processed: records.len(),
            moved: count(MoveOutcome::Success),
            failed: count(MoveOutcome::Failed),
            skipped: count(MoveOutcome::Skipped),
            duplicate_risk: count(MoveOutcome::DuplicateRisk),
            defaulted,
            cancelled,
        }
    }
}

/// Everything a run did, exportable as JSON
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub source_dir: PathBuf,
    pub dest_dir: PathBuf,
    pub dry_run: bool,
    pub summary: RunSummary,
    /// One record per processed item, in scan order
    pub records: Vec<MoveRecord>,
    pub provider_stats: Vec<ProviderStatsEntry>,
}

impl RunReport {
    /// Write the report as pretty JSON
    pub fn export_json(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| SorterError::io(parent, e))?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|e| SorterError::json(path, e))?;
        fs::write(path, json).map_err(|e| SorterError::io(path, e))?;
        info!(path = %path.display(), records = self.records.len(), "Exported run report");
        Ok(())
    }
}

enum ItemResult {
    Recorded { record: MoveRecord, defaulted: bool },
    Cancelled,
}

/// One categorize-and-move pass over a source directory
pub struct CategorizeRun {
    source_dir: PathBuf,
    dest_dir: PathBuf,
    batch_size: usize,
    skip_existing: bool,
    chain: Arc<ProviderChain>,
    mover: Arc<DirectoryMover>,
    cancel: CancelFlag,
    progress: Option<ProgressCallback>,
}

impl CategorizeRun {
    pub fn new(settings: &Settings, chain: Arc<ProviderChain>, mover: Arc<DirectoryMover>) -> Result<Self> {
        Ok(Self {
            source_dir: settings.source_dir()?.to_path_buf(),
            dest_dir: settings.dest_dir()?.to_path_buf(),
            batch_size: settings.batch_size.max(1),
            skip_existing: false,
            chain,
            mover,
            cancel: CancelFlag::default(),
            progress: None,
        })
    }

    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Leave items alone whose name already exists in some category folder
    pub fn skip_existing(mut self, skip: bool) -> Self {
        self.skip_existing = skip;
        self
    }

    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// Run to completion (or cancellation) and return the report
    pub async fn execute(&self) -> Result<RunReport> {
        let started_at = Utc::now();
        self.prepare()?;

        let seeded = self.chain.normalizer().seed_existing(&self.dest_dir)?;
        let items = self.scan()?;
        let total = items.len();
        info!(
            source = %self.source_dir.display(),
            dest = %self.dest_dir.display(),
            items = total,
            existing_categories = seeded,
            workers = self.batch_size,
            dry_run = self.mover.is_dry_run(),
            "Starting categorize run"
        );

        let already_sorted = if self.skip_existing {
            existing_items(&self.dest_dir)
        } else {
            HashMap::new()
        };

        let semaphore = Arc::new(Semaphore::new(self.batch_size));
        let mut futures = FuturesUnordered::new();
        let mut results: Vec<Option<ItemResult>> = (0..total).map(|_| None).collect();
        let mut completed = 0;

        for (index, source) in items.iter().cloned().enumerate() {
            let name = file_name(&source);
            if let Some(category) = already_sorted.get(&name.to_lowercase()) {
                debug!(item = %name, category = %category, "Already sorted, skipping");
                let record = MoveRecord::skipped(
                    &source,
                    Some(self.dest_dir.join(category.as_str()).join(&name)),
                    category,
                    "Already sorted in destination".to_string(),
                    "existing",
                );
                results[index] = Some(ItemResult::Recorded { record, defaulted: false });
                completed += 1;
                continue;
            }

            let sem = Arc::clone(&semaphore);
            let chain = Arc::clone(&self.chain);
            let mover = Arc::clone(&self.mover);
            let cancel = self.cancel.clone();
            let dest_dir = self.dest_dir.clone();

            let handle = tokio::spawn(async move {
                let _permit = match sem.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return ItemResult::Cancelled,
                };
                if cancel.is_cancelled() {
                    return ItemResult::Cancelled;
                }
                process_item(&chain, &mover, source, dest_dir).await
            });
            futures.push(handle.map(move |joined| (index, joined)));
        }

        if completed > 0 {
            if let Some(progress) = &self.progress {
                progress(completed, total);
            }
        }

        while let Some((index, joined)) = futures.next().await {
            let item = match joined {
                Ok(item) => item,
                Err(e) => {
                    error!(item = %items[index].display(), error = %e, "Worker task failed");
                    ItemResult::Recorded {
                        record: MoveRecord::failed(
                            &items[index],
                            self.chain.default_category(),
                            format!("Worker task failed: {}", e),
                            "none",
                        ),
                        defaulted: false,
                    }
                }
            };
            results[index] = Some(item);
            completed += 1;

            if let Some(progress) = &self.progress {
                progress(completed, total);
            }
            debug!(completed, total, "Progress");
        }

        let mut records = Vec::with_capacity(total);
        let mut defaulted = 0;
        let mut cancelled = 0;
        for result in results.into_iter().flatten() {
            match result {
                ItemResult::Recorded { record, defaulted: was_default } => {
                    if was_default {
                        defaulted += 1;
                    }
                    records.push(record);
                }
                ItemResult::Cancelled => cancelled += 1,
            }
        }

        let summary = RunSummary::tally(&records, defaulted, cancelled);
        info!(
            processed = summary.processed,
            moved = summary.moved,
            failed = summary.failed,
            skipped = summary.skipped,
            duplicate_risk = summary.duplicate_risk,
            defaulted = summary.defaulted,
            cancelled = summary.cancelled,
            "Categorize run finished"
        );
        if summary.defaulted > 0 {
            warn!(count = summary.defaulted, "Items placed in the default category need review");
        }

        Ok(RunReport {
            started_at,
            finished_at: Utc::now(),
            source_dir: self.source_dir.clone(),
            dest_dir: self.dest_dir.clone(),
            dry_run: self.mover.is_dry_run(),
            summary,
            records,
            provider_stats: self.chain.provider_stats(),
        })
    }

    /// Fatal checks, all before the first item
    fn prepare(&self) -> Result<()> {
        if !self.source_dir.exists() {
            return Err(SorterError::SourceMissing(self.source_dir.clone()));
        }
        if !self.source_dir.is_dir() {
            return Err(SorterError::NotADirectory(self.source_dir.clone()));
        }
        if self.dest_dir.exists() && !self.dest_dir.is_dir() {
            return Err(SorterError::NotADirectory(self.dest_dir.clone()));
        }
        let source = resolve_path(&self.source_dir);
        let dest = resolve_path(&self.dest_dir);
        if source == dest {
            return Err(SorterError::InvalidConfig(
                "destination directory must differ from the source directory".into(),
            ));
        }
        // A destination directly under the source is skipped by the scan; one
        // deeper down would be moved into itself along with its item
        if let Ok(inside) = dest.strip_prefix(&source) {
            let mut components = inside.components();
            if let (Some(item), Some(_)) = (components.next(), components.next()) {
                return Err(SorterError::InvalidConfig(format!(
                    "destination {} lies inside the plugin directory {}",
                    self.dest_dir.display(),
                    source.join(item).display()
                )));
            }
        }
        if !self.mover.is_dry_run() {
            fs::create_dir_all(&self.dest_dir).map_err(|e| SorterError::io(&self.dest_dir, e))?;
        }
        Ok(())
    }

    /// Immediate, non-hidden subdirectories of the source, sorted by name
    fn scan(&self) -> Result<Vec<PathBuf>> {
        let mut items = Vec::new();
        for entry in WalkDir::new(&self.source_dir)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
        {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(error = %e, "Skipping unreadable entry");
                    continue;
                }
            };
            if !entry.file_type().is_dir() {
                continue;
            }
            if entry.file_name().to_string_lossy().starts_with('.') {
                continue;
            }
            if same_path(entry.path(), &self.dest_dir) {
                debug!(path = %entry.path().display(), "Skipping destination directory");
                continue;
            }
            items.push(entry.into_path());
        }
        Ok(items)
    }
}

/// Categorize one directory and move it
async fn process_item(chain: &ProviderChain, mover: &Arc<DirectoryMover>, source: PathBuf, dest_dir: PathBuf) -> ItemResult {
    let name = file_name(&source);
    let categorization = chain.categorize_with_fallback(&name).await;
    let defaulted = categorization.is_default();
    let label = categorization.label;
    let categorized_by = categorization.source.to_string();

    let mover = Arc::clone(mover);
    let task_source = source.clone();
    let task_label = label.clone();
    let task_by = categorized_by.clone();
    let record = tokio::task::spawn_blocking(move || {
        mover.move_to_category(&task_source, &dest_dir, &task_label, &task_by)
    })
    .await
    .unwrap_or_else(|e| MoveRecord::failed(&source, &label, format!("Move task failed: {}", e), &categorized_by));

    ItemResult::Recorded { record, defaulted }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

fn same_path(a: &Path, b: &Path) -> bool {
    resolve_path(a) == resolve_path(b)
}

/// Canonical form of a path that may not exist yet: the deepest existing
/// ancestor is canonicalized and the rest appended
fn resolve_path(path: &Path) -> PathBuf {
    let mut missing = Vec::new();
    let mut current = path;
    loop {
        let existing = if current.as_os_str().is_empty() { Path::new(".") } else { current };
        if let Ok(canonical) = existing.canonicalize() {
            return missing.iter().rev().fold(canonical, |acc, part| acc.join(part));
        }
        match (current.parent(), current.file_name()) {
            (Some(parent), Some(name)) => {
                missing.push(name.to_os_string());
                current = parent;
            }
            _ => return path.to_path_buf(),
        }
    }
}

/// Names already sorted under `dest/<category>/`, keyed by lower-cased name
fn existing_items(dest_dir: &Path) -> HashMap<String, CategoryLabel> {
    let mut existing = HashMap::new();
    for entry in WalkDir::new(dest_dir)
        .min_depth(2)
        .max_depth(2)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_dir())
    {
        let category = entry
            .path()
            .parent()
            .and_then(|p| p.file_name())
            .and_then(|n| CategoryLabel::new(&n.to_string_lossy()));
        if let Some(category) = category {
            existing
                .entry(entry.file_name().to_string_lossy().to_lowercase())
                .or_insert(category);
        }
    }
    existing
}
