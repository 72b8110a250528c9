//! Branch classification.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

/// Default pattern for branches that work on a single ticket.
pub const DEFAULT_TICKET_BRANCHES: &str = "^(feature|bugfix|hotfix)";

/// Default pattern for shared integration branches.
pub const DEFAULT_INTEGRATION_BRANCHES: &str = "^(develop|master|release)";

static DEFAULT_CLASSIFIER: LazyLock<BranchClassifier> = LazyLock::new(|| {
    BranchClassifier::new(DEFAULT_TICKET_BRANCHES, DEFAULT_INTEGRATION_BRANCHES)
        .expect("default branch patterns are valid regexes")
});

/// What kind of branch the build runs on, and therefore which way versions move.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BranchClass {
    /// Versions get the ticket id injected.
    Ticket,
    /// Versions get ticket ids stripped.
    Integration,
    /// Versions are left alone.
    Unknown,
}

impl fmt::Display for BranchClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ticket => write!(f, "ticket"),
            Self::Integration => write!(f, "integration"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Classifies branch names by two configurable patterns.
#[derive(Clone, Debug)]
pub struct BranchClassifier {
    ticket: Regex,
    integration: Regex,
}

impl BranchClassifier {
    /// Compile the two patterns.
    ///
    /// # Errors
    /// Returns the regex error of the first invalid pattern.
    pub fn new(ticket: &str, integration: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            ticket: Regex::new(ticket)?,
            integration: Regex::new(integration)?,
        })
    }

    /// Classify `branch`. The ticket pattern is tested first.
    #[must_use]
    pub fn classify(&self, branch: &str) -> BranchClass {
        if self.ticket.is_match(branch) {
            BranchClass::Ticket
        } else if self.integration.is_match(branch) {
            BranchClass::Integration
        } else {
            BranchClass::Unknown
        }
    }
}

impl Default for BranchClassifier {
    fn default() -> Self {
        DEFAULT_CLASSIFIER.clone()
    }
}

/// Reduce a ref or remote-tracking name to the plain branch name.
///
/// `refs/heads/x`, `refs/remotes/<remote>/x` and `<remote>/x` all become `x`.
#[must_use]
pub fn normalize_branch_name<'a>(name: &'a str, remote: &str) -> &'a str {
    if let Some(rest) = name.strip_prefix("refs/heads/") {
        return rest;
    }
    let name = name.strip_prefix("refs/remotes/").unwrap_or(name);
    name.strip_prefix(remote)
        .and_then(|rest| rest.strip_prefix('/'))
        .unwrap_or(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_classification() {
        let c = BranchClassifier::default();
        assert_eq!(c.classify("feature/NCX-41-login"), BranchClass::Ticket);
        assert_eq!(c.classify("bugfix/HSMRT-50"), BranchClass::Ticket);
        assert_eq!(c.classify("hotfix/X-1"), BranchClass::Ticket);
        assert_eq!(c.classify("develop"), BranchClass::Integration);
        assert_eq!(c.classify("master"), BranchClass::Integration);
        assert_eq!(c.classify("release/1.2"), BranchClass::Integration);
        assert_eq!(c.classify("main"), BranchClass::Unknown);
        assert_eq!(c.classify("spike/NCX-1"), BranchClass::Unknown);
    }

    #[test]
    fn ticket_pattern_wins_when_both_match() {
        let c = BranchClassifier::new("NCX", "^develop").unwrap();
        assert_eq!(c.classify("develop-NCX-1"), BranchClass::Ticket);
    }

    #[test]
    fn invalid_pattern_is_rejected() {
        assert!(BranchClassifier::new("(", "develop").is_err());
    }

    #[test]
    fn normalize_strips_ref_and_remote_prefixes() {
        assert_eq!(normalize_branch_name("refs/heads/feature/A-1", "origin"), "feature/A-1");
        assert_eq!(
            normalize_branch_name("refs/remotes/origin/develop", "origin"),
            "develop"
        );
        assert_eq!(normalize_branch_name("origin/develop", "origin"), "develop");
        assert_eq!(normalize_branch_name("originals/x", "origin"), "originals/x");
        assert_eq!(normalize_branch_name("develop", "origin"), "develop");
    }
}
