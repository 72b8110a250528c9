//! The gix-backed implementation of [`GitRepo`].

use std::path::{Path, PathBuf};

use crate::error::GitError;
use crate::repo::GitRepo;
use crate::types::{Branch, BranchScope, Credentials, GitOid, HeadState, StatusEntry};

/// A [`GitRepo`] implementation backed by [gix](https://github.com/GitoxideLabs/gitoxide)
/// for reads and the git CLI for mutations.
///
/// Construct via [`GixRepo::discover`], [`GixRepo::open`] or [`GixRepo::clone_into`].
pub struct GixRepo {
    pub(crate) repo: gix::Repository,
    pub(crate) workdir: PathBuf,
}

impl GixRepo {
    /// Open the repository whose working tree contains `path`, searching
    /// parent directories.
    ///
    /// # Errors
    /// [`GitError::NotARepository`] if no repository with a working tree is found.
    pub fn discover(path: &Path) -> Result<Self, GitError> {
        let path = path.canonicalize()?;
        let repo = gix::discover(&path).map_err(|e| GitError::NotARepository {
            path: path.clone(),
            message: e.to_string(),
        })?;
        Self::from_repo(repo, &path)
    }

    /// Open the repository at exactly `path` (no parent discovery).
    ///
    /// # Errors
    /// [`GitError::NotARepository`] if `path` is not a non-bare repository.
    pub fn open(path: &Path) -> Result<Self, GitError> {
        let path = path.canonicalize()?;
        let repo = gix::open_opts(&path, gix::open::Options::isolated()).map_err(|e| {
            GitError::NotARepository {
                path: path.clone(),
                message: e.to_string(),
            }
        })?;
        Self::from_repo(repo, &path)
    }

    /// Clone `url` into the (empty or missing) directory `dest` and open it.
    ///
    /// # Errors
    /// Propagates clone failures as [`GitError::CommandFailed`], with
    /// credentials redacted.
    pub fn clone_into(
        url: &str,
        dest: &Path,
        credentials: Option<&Credentials>,
    ) -> Result<Self, GitError> {
        tracing::debug!(url, dest = %dest.display(), "cloning");
        crate::cli::clone(url, dest, credentials)?;
        Self::open(dest)
    }

    fn from_repo(repo: gix::Repository, probed: &Path) -> Result<Self, GitError> {
        let workdir = repo
            .workdir()
            .ok_or_else(|| GitError::NotARepository {
                path: probed.to_path_buf(),
                message: "bare repositories have no working tree".to_owned(),
            })?
            .canonicalize()?;
        Ok(Self { repo, workdir })
    }
}

impl GitRepo for GixRepo {
    fn workdir(&self) -> &Path {
        &self.workdir
    }

    // === HEAD ===
    fn head(&self) -> Result<HeadState, GitError> {
        crate::refs_impl::head(self)
    }

    // === Branches ===
    fn list_branches(&self, scope: BranchScope) -> Result<Vec<Branch>, GitError> {
        crate::refs_impl::list_branches(self, scope)
    }

    fn checkout(&self, branch: &Branch) -> Result<(), GitError> {
        crate::cli::checkout(&self.workdir, branch)
    }

    // === Status ===
    fn status(&self) -> Result<Vec<StatusEntry>, GitError> {
        crate::status_impl::status(self)
    }

    fn staged(&self) -> Result<Vec<StatusEntry>, GitError> {
        crate::cli::staged(&self.workdir)
    }

    // === Commit ===
    fn add(&self, paths: &[&Path]) -> Result<(), GitError> {
        crate::cli::add(&self.workdir, paths)
    }

    fn commit(&self, message: &str) -> Result<GitOid, GitError> {
        crate::cli::commit(&self.workdir, message)
    }

    // === Remotes ===
    fn remote_url(&self, remote: &str) -> Result<Option<String>, GitError> {
        crate::cli::remote_url(&self.workdir, remote)
    }

    fn push(
        &self,
        remote: &str,
        refspec: &str,
        credentials: Option<&Credentials>,
    ) -> Result<(), GitError> {
        crate::cli::push(&self.workdir, remote, refspec, credentials)
    }
}
