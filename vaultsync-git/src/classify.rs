//! Push failure classification.
//!
//! Git reports push failures only as text, so the kind is recovered from known
//! stderr fragments. Unmatched text maps to [`PushFailureKind::Other`].

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushFailureKind {
    /// The remote has commits the local branch lacks.
    Rejected,
    /// Credentials were refused.
    Authentication,
    /// The remote repository does not exist or is not visible.
    RepositoryNotFound,
    /// Network timeout.
    Timeout,
    Other,
}

impl PushFailureKind {
    /// What the user should do next.
    pub fn guidance(&self) -> &'static str {
        match self {
            PushFailureKind::Rejected => "remote has commits you don't have locally; pull latest changes first",
            PushFailureKind::Authentication => {
                "check GITHUB_TOKEN in .env and ensure the token has 'repo' scope"
            }
            PushFailureKind::RepositoryNotFound => {
                "check GITHUB_REPOSITORY in .env; it should name an existing repository"
            }
            PushFailureKind::Timeout => {
                "check your internet connection; large repositories may need a longer git.timeout"
            }
            PushFailureKind::Other => "see the git error output above",
        }
    }
}

impl fmt::Display for PushFailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PushFailureKind::Rejected => "rejected",
            PushFailureKind::Authentication => "authentication",
            PushFailureKind::RepositoryNotFound => "repository not found",
            PushFailureKind::Timeout => "timeout",
            PushFailureKind::Other => "other",
        };
        f.write_str(label)
    }
}

/// Map push stderr to a failure kind. First match wins.
pub fn classify_push_failure(stderr: &str) -> PushFailureKind {
    let lower = stderr.to_lowercase();
    let any = |needles: &[&str]| needles.iter().any(|n| lower.contains(n));

    if any(&["rejected", "non-fast-forward"]) {
        PushFailureKind::Rejected
    } else if any(&["authentication", "permission denied"]) {
        PushFailureKind::Authentication
    } else if any(&["repository not found"]) {
        PushFailureKind::RepositoryNotFound
    } else if any(&["timeout", "timed out"]) {
        PushFailureKind::Timeout
    } else {
        PushFailureKind::Other
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(" ! [rejected]        main -> main (fetch first)", PushFailureKind::Rejected)]
    #[case("error: failed to push some refs\nhint: Updates were rejected because the tip... non-fast-forward", PushFailureKind::Rejected)]
    #[case("remote: Invalid username or password.\nfatal: Authentication failed for 'https://github.com/a/b.git/'", PushFailureKind::Authentication)]
    #[case("ERROR: Permission denied to ada.", PushFailureKind::Authentication)]
    #[case("remote: Repository not found.\nfatal: repository 'https://github.com/a/b.git/' not found", PushFailureKind::RepositoryNotFound)]
    #[case("Command timed out after 120s", PushFailureKind::Timeout)]
    #[case("fatal: unable to access: Connection timeout", PushFailureKind::Timeout)]
    #[case("fatal: the remote end hung up unexpectedly", PushFailureKind::Other)]
    fn stderr_maps_to_kind(#[case] stderr: &str, #[case] expected: PushFailureKind) {
        assert_eq!(classify_push_failure(stderr), expected);
    }

    #[test]
    fn every_kind_has_guidance() {
        for kind in [
            PushFailureKind::Rejected,
            PushFailureKind::Authentication,
            PushFailureKind::RepositoryNotFound,
            PushFailureKind::Timeout,
            PushFailureKind::Other,
        ] {
            assert!(!kind.guidance().is_empty());
        }
    }
}
