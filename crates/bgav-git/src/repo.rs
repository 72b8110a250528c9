//! The [`GitRepo`] trait: the single abstraction boundary between bgav and git.
//!
//! The trait is object-safe so callers can use `&dyn GitRepo` or
//! `Box<dyn GitRepo>`. Method groups:
//!
//! | Group      | Methods                                         |
//! |------------|-------------------------------------------------|
//! | HEAD       | `head`                                          |
//! | Branches   | `list_branches`, `branches_at`, `checkout`      |
//! | Status     | `status`, `staged`, `is_modified`               |
//! | Commit     | `add`, `commit`                                 |
//! | Remotes    | `remote_url`, `push`                            |
//!
//! Cloning creates a repository rather than operating on one, so it lives on
//! the implementation ([`GixRepo::clone_into`](crate::GixRepo::clone_into)).

use std::path::Path;

use crate::error::GitError;
use crate::types::{
    Branch, BranchScope, Credentials, FileStatus, GitOid, HeadState, StatusEntry,
};

/// The git abstraction trait used by the versioning engine.
///
/// Implementations may be backed by gix, the git CLI, or a test double.
pub trait GitRepo {
    /// Root of the working tree.
    fn workdir(&self) -> &Path;

    // -----------------------------------------------------------------------
    // HEAD
    // -----------------------------------------------------------------------

    /// Report whether HEAD is on a named branch or detached at a commit.
    fn head(&self) -> Result<HeadState, GitError>;

    // -----------------------------------------------------------------------
    // Branches
    // -----------------------------------------------------------------------

    /// List branches in `scope`, sorted by ref name within each group.
    fn list_branches(&self, scope: BranchScope) -> Result<Vec<Branch>, GitError>;

    /// Every local or remote-tracking branch whose tip is `oid`.
    ///
    /// Used to name a detached CI checkout.
    fn branches_at(&self, oid: GitOid) -> Result<Vec<Branch>, GitError> {
        Ok(self
            .list_branches(BranchScope::All)?
            .into_iter()
            .filter(|b| b.oid == oid)
            .collect())
    }

    /// Check out `branch`. A remote-tracking branch gets a local branch of
    /// the same name created (or reset) to follow it.
    fn checkout(&self, branch: &Branch) -> Result<(), GitError>;

    // -----------------------------------------------------------------------
    // Status
    // -----------------------------------------------------------------------

    /// Working-tree changes relative to the index.
    fn status(&self) -> Result<Vec<StatusEntry>, GitError>;

    /// Index changes relative to HEAD.
    fn staged(&self) -> Result<Vec<StatusEntry>, GitError>;

    /// Whether the tracked file `path` (absolute, or relative to the workdir)
    /// has uncommitted modifications, staged or not. Untracked files are not
    /// modified.
    fn is_modified(&self, path: &Path) -> Result<bool, GitError> {
        let rel = path.strip_prefix(self.workdir()).unwrap_or(path);
        let rel = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        if self.staged()?.iter().any(|entry| entry.path == rel) {
            return Ok(true);
        }
        Ok(self
            .status()?
            .iter()
            .any(|entry| entry.path == rel && entry.status == FileStatus::Modified))
    }

    // -----------------------------------------------------------------------
    // Commit
    // -----------------------------------------------------------------------

    /// Stage the given paths.
    fn add(&self, paths: &[&Path]) -> Result<(), GitError>;

    /// Commit the index and return the new commit's OID.
    fn commit(&self, message: &str) -> Result<GitOid, GitError>;

    // -----------------------------------------------------------------------
    // Remotes
    // -----------------------------------------------------------------------

    /// The configured URL of `remote`, or `None` if no such remote exists.
    fn remote_url(&self, remote: &str) -> Result<Option<String>, GitError>;

    /// Push `refspec` to `remote`, authenticating HTTP(S) remotes with
    /// `credentials` when given.
    fn push(
        &self,
        remote: &str,
        refspec: &str,
        credentials: Option<&Credentials>,
    ) -> Result<(), GitError>;
}
