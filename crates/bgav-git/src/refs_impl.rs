//! gix-backed HEAD and branch listing.

use crate::error::GitError;
use crate::gix_repo::GixRepo;
use crate::types::{Branch, BranchScope, GitOid, HeadState};

const LOCAL_PREFIX: &str = "refs/heads/";
const REMOTE_PREFIX: &str = "refs/remotes/";

/// Convert a `gix::ObjectId` (or `&gix::oid`) to a `GitOid`.
fn from_gix_oid(oid: &gix::oid) -> GitOid {
    let mut bytes = [0u8; 20];
    bytes.copy_from_slice(oid.as_bytes());
    GitOid::from_bytes(bytes)
}

pub fn head(repo: &GixRepo) -> Result<HeadState, GitError> {
    let name = repo.repo.head_name().map_err(GitError::backend)?;
    if let Some(name) = name {
        return Ok(HeadState::Branch(name.shorten().to_string()));
    }
    let id = repo.repo.head_id().map_err(|e| GitError::NotFound {
        message: format!("HEAD does not point at a commit: {e}"),
    })?;
    Ok(HeadState::Detached(from_gix_oid(id.as_ref())))
}

pub fn list_branches(repo: &GixRepo, scope: BranchScope) -> Result<Vec<Branch>, GitError> {
    let mut branches = Vec::new();
    if matches!(scope, BranchScope::Local | BranchScope::All) {
        branches.extend(list_prefixed(repo, LOCAL_PREFIX)?);
    }
    if matches!(scope, BranchScope::Remote | BranchScope::All) {
        branches.extend(list_prefixed(repo, REMOTE_PREFIX)?);
    }
    Ok(branches)
}

fn list_prefixed(repo: &GixRepo, prefix: &str) -> Result<Vec<Branch>, GitError> {
    let platform = repo.repo.references().map_err(GitError::backend)?;
    let refs_iter = platform.prefixed(prefix).map_err(GitError::backend)?;

    let mut result = Vec::new();
    for r in refs_iter {
        let mut r = r.map_err(GitError::backend)?;
        let full_name = r.name().as_bstr().to_string();
        let id = r.peel_to_id_in_place().map_err(GitError::backend)?;
        if let Some(branch) = parse_branch(&full_name, from_gix_oid(id.as_ref())) {
            result.push(branch);
        }
    }
    result.sort_by(|a, b| a.display_name().cmp(&b.display_name()));
    Ok(result)
}

/// Split a full ref name into a [`Branch`]. Remote `HEAD` pointers are skipped.
fn parse_branch(full_name: &str, oid: GitOid) -> Option<Branch> {
    if let Some(name) = full_name.strip_prefix(LOCAL_PREFIX) {
        return Some(Branch {
            name: name.to_owned(),
            remote: None,
            oid,
        });
    }
    let rest = full_name.strip_prefix(REMOTE_PREFIX)?;
    let (remote, name) = rest.split_once('/')?;
    if name == "HEAD" {
        return None;
    }
    Some(Branch {
        name: name.to_owned(),
        remote: Some(remote.to_owned()),
        oid,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn oid() -> GitOid {
        GitOid::from_bytes([7; 20])
    }

    #[test]
    fn parses_local_branch_with_slashes() {
        let b = parse_branch("refs/heads/feature/NCX-9-login", oid()).unwrap();
        assert_eq!(b.name, "feature/NCX-9-login");
        assert_eq!(b.remote, None);
    }

    #[test]
    fn parses_remote_branch() {
        let b = parse_branch("refs/remotes/origin/bugfix/HSMRT-50", oid()).unwrap();
        assert_eq!(b.name, "bugfix/HSMRT-50");
        assert_eq!(b.remote.as_deref(), Some("origin"));
    }

    #[test]
    fn skips_remote_head_and_foreign_refs() {
        assert!(parse_branch("refs/remotes/origin/HEAD", oid()).is_none());
        assert!(parse_branch("refs/tags/v1.0", oid()).is_none());
    }
}
