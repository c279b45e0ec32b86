//! Pure interpretation of git output: divergence, working-tree changes and
//! remote identity.

use std::fmt;

/// How far the local branch and `origin/<branch>` have drifted apart.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DivergenceReport {
    pub diverged: bool,
    pub ahead: u32,
    pub behind: u32,
}

/// How remote commits are integrated into the local branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntegrationStrategy {
    /// No local commits to preserve; never creates a merge commit.
    FastForward,
    /// Replay local commits on top of the fetched branch.
    Rebase,
}

impl fmt::Display for IntegrationStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntegrationStrategy::FastForward => write!(f, "fast-forward"),
            IntegrationStrategy::Rebase => write!(f, "rebase"),
        }
    }
}

impl DivergenceReport {
    pub fn new(ahead: u32, behind: u32) -> Self {
        Self {
            diverged: ahead > 0 && behind > 0,
            ahead,
            behind,
        }
    }

    pub fn is_up_to_date(&self) -> bool {
        self.behind == 0
    }

    /// Strategy for a pull, or `None` when there is nothing to integrate.
    pub fn pull_strategy(&self) -> Option<IntegrationStrategy> {
        match (self.ahead, self.behind) {
            (_, 0) => None,
            (0, _) => Some(IntegrationStrategy::FastForward),
            _ => Some(IntegrationStrategy::Rebase),
        }
    }
}

/// Counts derived from `git status --porcelain`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChangeSummary {
    pub modified: u32,
    pub added: u32,
    pub deleted: u32,
    pub untracked: u32,
}

impl ChangeSummary {
    /// Classify each porcelain line by its two-character status code.
    /// Modification wins over addition, which wins over deletion.
    pub fn from_porcelain(output: &str) -> Self {
        let mut summary = Self::default();
        for line in output.lines().filter(|l| !l.trim().is_empty()) {
            let code: String = line.chars().take(2).collect();
            let has = |c: char| code.starts_with(c) || code.ends_with(c);
            if has('M') {
                summary.modified += 1;
            } else if has('A') {
                summary.added += 1;
            } else if has('D') {
                summary.deleted += 1;
            } else if code.starts_with("??") {
                summary.untracked += 1;
            }
        }
        summary
    }

    pub fn total(&self) -> u32 {
        self.modified + self.added + self.deleted + self.untracked
    }
}

impl fmt::Display for ChangeSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} modified, {} added, {} deleted, {} untracked",
            self.modified, self.added, self.deleted, self.untracked
        )
    }
}

/// Host and path of a remote URL with scheme and embedded credentials removed.
///
/// `https://token@github.com/ada/notes.git` → `github.com/ada/notes.git`
pub fn repo_identity(url: &str) -> &str {
    let rest = url.split_once("://").map_or(url, |(_, rest)| rest);
    rest.split_once('@').map_or(rest, |(_, host)| host)
}
