//! Directory mover
//!
//! Moves one source directory into `dest_root/<category>/<name>` and always
//! returns a [`MoveRecord`], whatever happened. Nothing here aborts a batch.
//!
//! A move is an atomic rename when possible. When the rename fails (usually a
//! cross-device move) the directory is copied and the source deleted:
//!
//! - copy fails: the partial destination is removed, outcome `Failed`
//! - delete fails after a full copy: outcome `DuplicateRisk`, since the
//!   directory now exists in both places

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::categorize::CategoryLabel;

/// Attempts at `name_N` before falling back to a UUID suffix
const MAX_RENAME_ATTEMPTS: usize = 1000;

/// Policy for handling an occupied destination
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    /// Generate unique name (_1, _2, etc.) and proceed
    #[default]
    AutoRename,
    /// Leave the source where it is
    Skip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MoveOutcome {
    Success,
    Skipped,
    /// Source untouched
    Failed,
    /// Copied, but the source could not be removed
    DuplicateRisk,
}

/// Result of one move; never modified after creation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveRecord {
    source_path: PathBuf,
    destination_path: Option<PathBuf>,
    category: CategoryLabel,
    outcome: MoveOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_detail: Option<String>,
    categorized_by: String,
    recorded_at: DateTime<Utc>,
}

impl MoveRecord {
    fn new(
        source_path: &Path,
        destination_path: Option<PathBuf>,
        category: &CategoryLabel,
        outcome: MoveOutcome,
        error_detail: Option<String>,
        categorized_by: &str,
    ) -> Self {
        Self {
            source_path: source_path.to_path_buf(),
            destination_path,
            category: category.clone(),
            outcome,
            error_detail,
            categorized_by: categorized_by.to_string(),
            recorded_at: Utc::now(),
        }
    }

    /// Record for an item whose move never ran to completion
    pub(crate) fn failed(source_path: &Path, category: &CategoryLabel, detail: String, categorized_by: &str) -> Self {
        Self::new(source_path, None, category, MoveOutcome::Failed, Some(detail), categorized_by)
    }

    /// Record for an item that was deliberately left in place
    pub(crate) fn skipped(
        source_path: &Path,
        destination_path: Option<PathBuf>,
        category: &CategoryLabel,
        detail: String,
        categorized_by: &str,
    ) -> Self {
        Self::new(source_path, destination_path, category, MoveOutcome::Skipped, Some(detail), categorized_by)
    }

    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    pub fn destination_path(&self) -> Option<&Path> {
        self.destination_path.as_deref()
    }

    pub fn category(&self) -> &CategoryLabel {
        &self.category
    }

    pub fn outcome(&self) -> MoveOutcome {
        self.outcome
    }

    pub fn error_detail(&self) -> Option<&str> {
        self.error_detail.as_deref()
    }

    pub fn categorized_by(&self) -> &str {
        &self.categorized_by
    }

    pub fn recorded_at(&self) -> DateTime<Utc> {
        self.recorded_at
    }
}

/// Filesystem primitives used for a move, swappable in tests
#[derive(Clone, Copy)]
struct FsOps {
    rename: fn(&Path, &Path) -> io::Result<()>,
    copy_file: fn(&Path, &Path) -> io::Result<u64>,
    remove_dir_all: fn(&Path) -> io::Result<()>,
}

impl Default for FsOps {
    fn default() -> Self {
        Self {
            rename: |from, to| fs::rename(from, to),
            copy_file: |from, to| fs::copy(from, to),
            remove_dir_all: |path| fs::remove_dir_all(path),
        }
    }
}

/// Moves directories into category folders
///
/// Safe to share between workers: choosing a destination and claiming it
/// happen under one lock, so two workers never pick the same path.
pub struct DirectoryMover {
    policy: ConflictPolicy,
    dry_run: bool,
    /// Destinations handed out but possibly not yet on disk
    claimed: Mutex<HashSet<PathBuf>>,
    ops: FsOps,
}

impl DirectoryMover {
    pub fn new(policy: ConflictPolicy) -> Self {
        Self {
            policy,
            dry_run: false,
            claimed: Mutex::new(HashSet::new()),
            ops: FsOps::default(),
        }
    }

    /// Resolve destinations without touching the filesystem
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    #[cfg(test)]
    fn with_ops(mut self, ops: FsOps) -> Self {
        self.ops = ops;
        self
    }

    /// Move `source` into `dest_root/<category>/`
    pub fn move_to_category(
        &self,
        source: &Path,
        dest_root: &Path,
        category: &CategoryLabel,
        categorized_by: &str,
    ) -> MoveRecord {
        let failed = |destination: Option<PathBuf>, detail: String| {
            warn!(source = %source.display(), error = %detail, "Move failed");
            MoveRecord::new(source, destination, category, MoveOutcome::Failed, Some(detail), categorized_by)
        };

        if !source.is_dir() {
            return failed(None, format!("Source is not a directory: {}", source.display()));
        }
        let Some(name) = source.file_name() else {
            return failed(None, format!("Source has no name: {}", source.display()));
        };

        let category_dir = dest_root.join(category.as_str());
        if !self.dry_run {
            if let Err(e) = fs::create_dir_all(&category_dir) {
                return failed(None, format!("Failed to create {}: {}", category_dir.display(), e));
            }
        }

        let mut claimed = self.lock_claims();

        let wanted = category_dir.join(name);
        let destination = if is_free(&wanted, &claimed) {
            wanted
        } else {
            match self.policy {
                ConflictPolicy::Skip => {
                    drop(claimed);
                    debug!(source = %source.display(), destination = %wanted.display(), "Destination exists, skipping");
                    return MoveRecord::new(
                        source,
                        Some(wanted.clone()),
                        category,
                        MoveOutcome::Skipped,
                        Some(format!("Destination exists: {}", wanted.display())),
                        categorized_by,
                    );
                }
                ConflictPolicy::AutoRename => generate_unique_path(&wanted, &claimed),
            }
        };

        if self.dry_run {
            claimed.insert(destination.clone());
            drop(claimed);
            info!(source = %source.display(), destination = %destination.display(), "Dry run");
            return MoveRecord::new(
                source,
                Some(destination.clone()),
                category,
                MoveOutcome::Skipped,
                Some(format!("Dry run: would move to {}", destination.display())),
                categorized_by,
            );
        }

        // Try rename first (same filesystem), fall back to copy+delete
        let rename_error = match (self.ops.rename)(source, &destination) {
            Ok(()) => {
                drop(claimed);
                info!(source = %source.display(), destination = %destination.display(), "Moved");
                return MoveRecord::new(source, Some(destination), category, MoveOutcome::Success, None, categorized_by);
            }
            Err(e) => e,
        };

        // Claim the path on disk before releasing the lock
        if let Err(e) = fs::create_dir(&destination) {
            return failed(
                None,
                format!("Rename failed ({}); could not create {}: {}", rename_error, destination.display(), e),
            );
        }
        claimed.insert(destination.clone());
        drop(claimed);

        debug!(
            source = %source.display(),
            error = %rename_error,
            "Rename failed, falling back to copy"
        );

        let copy_result = copy_dir_all(source, &destination, self.ops.copy_file);
        self.release_claim(&destination);

        if let Err(e) = copy_result {
            if let Err(cleanup) = fs::remove_dir_all(&destination) {
                warn!(destination = %destination.display(), error = %cleanup, "Failed to remove partial copy");
            }
            return failed(None, format!("Rename failed ({}); copy failed: {}", rename_error, e));
        }

        match (self.ops.remove_dir_all)(source) {
            Ok(()) => {
                info!(source = %source.display(), destination = %destination.display(), "Moved by copy");
                MoveRecord::new(source, Some(destination), category, MoveOutcome::Success, None, categorized_by)
            }
            Err(e) => {
                let detail = format!("Copied but failed to remove source: {}", e);
                warn!(source = %source.display(), destination = %destination.display(), error = %detail, "Duplicate risk");
                MoveRecord::new(
                    source,
                    Some(destination),
                    category,
                    MoveOutcome::DuplicateRisk,
                    Some(detail),
                    categorized_by,
                )
            }
        }
    }

    fn release_claim(&self, destination: &Path) {
        self.lock_claims().remove(destination);
    }

    fn lock_claims(&self) -> MutexGuard<'_, HashSet<PathBuf>> {
        self.claimed.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn is_free(path: &Path, claimed: &HashSet<PathBuf>) -> bool {
    !claimed.contains(path) && fs::symlink_metadata(path).is_err()
}

/// Append `_1`, `_2`, ... to the name until a free path is found
fn generate_unique_path(original: &Path, claimed: &HashSet<PathBuf>) -> PathBuf {
    let parent = original.parent().unwrap_or(Path::new("."));
    let name = original
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "plugin".to_string());

    for counter in 1..=MAX_RENAME_ATTEMPTS {
        let candidate = parent.join(format!("{}_{}", name, counter));
        if is_free(&candidate, claimed) {
            return candidate;
        }
    }
    parent.join(format!("{}_{}", name, uuid::Uuid::new_v4()))
}

/// Recursively copy a directory, recreating symlinks rather than following them
fn copy_dir_all(src: &Path, dst: &Path, copy_file: fn(&Path, &Path) -> io::Result<u64>) -> io::Result<()> {
    fs::create_dir_all(dst)?;

    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let ty = entry.file_type()?;
        let src_path = entry.path();
        let dst_path = dst.join(entry.file_name());

        if ty.is_dir() {
            copy_dir_all(&src_path, &dst_path, copy_file)?;
        } else if ty.is_symlink() {
            copy_symlink(&src_path, &dst_path, copy_file)?;
        } else {
            copy_file(&src_path, &dst_path)?;
        }
    }

    Ok(())
}

#[cfg(unix)]
fn copy_symlink(src: &Path, dst: &Path, _copy_file: fn(&Path, &Path) -> io::Result<u64>) -> io::Result<()> {
    let target = fs::read_link(src)?;
    std::os::unix::fs::symlink(target, dst)
}

#[cfg(not(unix))]
fn copy_symlink(src: &Path, dst: &Path, copy_file: fn(&Path, &Path) -> io::Result<u64>) -> io::Result<()> {
    copy_file(src, dst).map(|_| ())
}
