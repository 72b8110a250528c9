//! Scratch checkouts of dependency repositories.

use std::path::PathBuf;

use bgav_git::{Branch, BranchScope, Credentials, GitRepo, GixRepo};
use tempfile::TempDir;

use crate::error::{BgavError, Result};

/// A temporary clone of a dependency's repository.
///
/// The scratch directory is removed when the handle is dropped, on every
/// exit path of the reconciliation that created it.
pub struct CheckoutHandle {
    scratch: Option<TempDir>,
    repo: GixRepo,
    matched: Option<Branch>,
}

impl CheckoutHandle {
    /// Clone `url` into a fresh scratch directory and look for the first
    /// remote branch whose name contains `ticket`.
    ///
    /// # Errors
    /// Clone or branch-listing failures. The scratch directory is removed
    /// before the error is returned.
    pub fn acquire(
        url: &str,
        artifact_id: &str,
        ticket: &str,
        credentials: Option<&Credentials>,
    ) -> Result<Self> {
        let scratch = tempfile::Builder::new()
            .prefix(&format!("bgav-{artifact_id}-"))
            .tempdir()
            .map_err(|e| BgavError::io(std::env::temp_dir(), e))?;
        let dest = scratch.path().join("checkout");

        let repo = GixRepo::clone_into(url, &dest, credentials)
            .map_err(|e| BgavError::git(format!("cloning {}", redacted(url, credentials)), e))?;
        let branches = repo
            .list_branches(BranchScope::Remote)
            .map_err(|e| BgavError::git("listing remote branches", e))?;
        let matched = branches
            .iter()
            .find(|b| branch_names_ticket(&b.name, ticket))
            .cloned();

        tracing::debug!(
            url = %redacted(url, credentials),
            branches = branches.len(),
            matched = ?matched.as_ref().map(|b| b.name.as_str()),
            "scratch checkout ready"
        );
        Ok(Self {
            scratch: Some(scratch),
            repo,
            matched,
        })
    }

    /// The branch matching the ticket, if any.
    #[must_use]
    pub const fn matched_branch(&self) -> Option<&Branch> {
        self.matched.as_ref()
    }

    /// Check out the matching branch and return the path of its root
    /// descriptor. `None` if no branch matched.
    ///
    /// # Errors
    /// Checkout failure.
    pub fn check_out_match(&self) -> Result<Option<PathBuf>> {
        let Some(branch) = &self.matched else {
            return Ok(None);
        };
        self.repo
            .checkout(branch)
            .map_err(|e| BgavError::git(format!("checking out {branch}"), e))?;
        Ok(Some(self.repo.workdir().join("pom.xml")))
    }
}

impl Drop for CheckoutHandle {
    fn drop(&mut self) {
        let Some(scratch) = self.scratch.take() else {
            return;
        };
        let path = scratch.path().to_path_buf();
        match scratch.close() {
            Ok(()) => tracing::trace!(path = %path.display(), "removed scratch checkout"),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "could not remove scratch checkout");
            }
        }
    }
}

/// Whether `branch` contains `ticket` as a whole token: `feature/NCX-9`
/// names `NCX-9` but `feature/NCX-91` does not.
#[must_use]
pub fn branch_names_ticket(branch: &str, ticket: &str) -> bool {
    if ticket.is_empty() {
        return false;
    }
    branch.match_indices(ticket).any(|(at, _)| {
        let before = branch[..at].chars().next_back();
        let after = branch[at + ticket.len()..].chars().next();
        !before.is_some_and(|c| c.is_ascii_alphanumeric())
            && !after.is_some_and(|c| c.is_ascii_digit())
    })
}

fn redacted(url: &str, credentials: Option<&Credentials>) -> String {
    credentials.map_or_else(|| url.to_owned(), |c| c.redact(url))
}
