//! Recursive tree copy with name-based exclusion.

use std::fs;
use std::path::{Path, PathBuf};

use filetime::FileTime;
use glob::Pattern;
use walkdir::{DirEntry, WalkDir};

use crate::error::{io_err, BackupError};

/// Entry names never copied into a snapshot.
pub const DEFAULT_IGNORE: &[&str] = &[
    ".git*",
    ".svn",
    ".hg",
    ".DS_Store",
    "Thumbs.db",
    "desktop.ini",
    "*.tmp",
    "*.temp",
    "*.lock",
    "*.swp",
    "*~",
    ".trash",
    ".Trash",
    "Trash",
];

/// Decides which entries a copy skips.
#[derive(Debug, Clone, Default)]
pub struct CopyFilter {
    patterns: Vec<Pattern>,
    excluded: Vec<PathBuf>,
}

impl CopyFilter {
    /// A filter that copies everything.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with_patterns(patterns: &[&str]) -> Result<Self, BackupError> {
        let patterns = patterns
            .iter()
            .map(|p| {
                Pattern::new(p).map_err(|source| BackupError::Pattern {
                    pattern: p.to_string(),
                    source,
                })
            })
            .collect::<Result<_, _>>()?;
        Ok(Self {
            patterns,
            excluded: Vec::new(),
        })
    }

    /// Skip this exact directory (e.g. a backup directory inside the source).
    pub fn exclude_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.excluded.push(dir.into());
        self
    }

    fn skips(&self, entry: &DirEntry) -> bool {
        let name = entry.file_name().to_string_lossy();
        if self.patterns.iter().any(|p| p.matches(&name)) {
            return true;
        }
        entry.file_type().is_dir() && self.excluded.iter().any(|dir| dir == entry.path())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CopyStats {
    pub files: u64,
    pub bytes: u64,
}

/// Copy `src` into `dst` (created if missing). Symbolic links are followed;
/// dangling links and link loops are skipped. File permissions and timestamps
/// are preserved.
pub fn copy_tree(src: &Path, dst: &Path, filter: &CopyFilter) -> Result<CopyStats, BackupError> {
    let mut stats = CopyStats::default();
    fs::create_dir_all(dst).map_err(|e| io_err(dst, e))?;

    let walker = WalkDir::new(src)
        .follow_links(true)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !filter.skips(e));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) if is_skippable_link_error(&err) => {
                tracing::debug!(path = ?err.path(), error = %err, "skipping unreadable link");
                continue;
            }
            Err(source) => {
                return Err(BackupError::Walk {
                    path: source.path().map_or_else(|| src.to_path_buf(), Path::to_path_buf),
                    source,
                })
            }
        };
        if entry.depth() == 0 {
            continue;
        }

        let rel = entry.path().strip_prefix(src).unwrap_or(entry.path());
        let target = dst.join(rel);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target).map_err(|e| io_err(&target, e))?;
            continue;
        }

        let bytes = fs::copy(entry.path(), &target).map_err(|e| io_err(entry.path(), e))?;
        let meta = entry.metadata().map_err(|source| BackupError::Walk {
            path: entry.path().to_path_buf(),
            source,
        })?;
        filetime::set_file_times(
            &target,
            FileTime::from_last_access_time(&meta),
            FileTime::from_last_modification_time(&meta),
        )
        .map_err(|e| io_err(&target, e))?;

        stats.files += 1;
        stats.bytes += bytes;
    }
    Ok(stats)
}

fn is_skippable_link_error(err: &walkdir::Error) -> bool {
    if err.loop_ancestor().is_some() {
        return true;
    }
    err.path()
        .and_then(|p| fs::symlink_metadata(p).ok())
        .is_some_and(|meta| meta.file_type().is_symlink())
}

/// Total size in bytes of regular files under `dir`. Unreadable entries count
/// as zero.
pub fn dir_size(dir: &Path) -> u64 {
    WalkDir::new(dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| e.metadata().ok())
        .map(|m| m.len())
        .sum()
}

/// Number of regular files under `dir`.
pub fn file_count(dir: &Path) -> usize {
    WalkDir::new(dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .count()
}
