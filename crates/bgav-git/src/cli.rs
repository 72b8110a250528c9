//! Operations via the git CLI.
//!
//! Clone, checkout, commit and push stay subprocesses: gix does not provide
//! a high-level API for all of them, and the CLI honours the user's
//! credential helpers and hooks.

use std::path::Path;
use std::process::Command;

use crate::error::GitError;
use crate::types::{
    Branch, Credentials, FileStatus, GitOid, StatusEntry, authenticated_url,
};

/// Run `git <args>` in `dir` and return trimmed stdout.
///
/// `credentials`, when given, is redacted from the error message.
pub(crate) fn run_git(
    dir: &Path,
    args: &[&str],
    credentials: Option<&Credentials>,
) -> Result<String, GitError> {
    let output = Command::new("git").args(args).current_dir(dir).output()?;
    if output.status.success() {
        return Ok(String::from_utf8_lossy(&output.stdout).trim_end().to_owned());
    }
    let redact = |s: &str| credentials.map_or_else(|| s.to_owned(), |c| c.redact(s));
    Err(GitError::CommandFailed {
        command: redact(&format!("git {}", args.join(" "))),
        stderr: redact(String::from_utf8_lossy(&output.stderr).trim()),
        exit_code: output.status.code(),
    })
}

pub(crate) fn clone(
    url: &str,
    dest: &Path,
    credentials: Option<&Credentials>,
) -> Result<(), GitError> {
    let source = authenticated_url(url, credentials);
    let dest_str = dest.to_string_lossy();
    let parent = dest.parent().unwrap_or(dest);
    run_git(
        parent,
        &["clone", "--quiet", "--no-tags", &source, &dest_str],
        credentials,
    )?;
    Ok(())
}

pub(crate) fn checkout(workdir: &Path, branch: &Branch) -> Result<(), GitError> {
    match &branch.remote {
        Some(_) => {
            let start = branch.display_name();
            run_git(
                workdir,
                &["checkout", "--quiet", "-B", &branch.name, &start],
                None,
            )?;
        }
        None => {
            run_git(workdir, &["checkout", "--quiet", &branch.name], None)?;
        }
    }
    Ok(())
}

pub(crate) fn add(workdir: &Path, paths: &[&Path]) -> Result<(), GitError> {
    if paths.is_empty() {
        return Ok(());
    }
    let owned: Vec<String> = paths
        .iter()
        .map(|p| p.strip_prefix(workdir).unwrap_or(p).to_string_lossy().into_owned())
        .collect();
    let mut args = vec!["add", "--"];
    args.extend(owned.iter().map(String::as_str));
    run_git(workdir, &args, None)?;
    Ok(())
}

pub(crate) fn commit(workdir: &Path, message: &str) -> Result<GitOid, GitError> {
    run_git(workdir, &["commit", "--quiet", "-m", message], None)?;
    let head = run_git(workdir, &["rev-parse", "HEAD"], None)?;
    head.parse().map_err(GitError::backend)
}

/// Index entries that differ from HEAD (`git diff --cached`).
///
/// On an unborn branch every index entry counts as added.
pub(crate) fn staged(workdir: &Path) -> Result<Vec<StatusEntry>, GitError> {
    let out = run_git(
        workdir,
        &["diff", "--cached", "--name-status", "--no-renames", "-z"],
        None,
    )?;
    let mut fields = out.split('\0').filter(|f| !f.is_empty());
    let mut entries = Vec::new();
    while let (Some(code), Some(path)) = (fields.next(), fields.next()) {
        let status = match code.chars().next() {
            Some('A' | 'C') => FileStatus::Added,
            Some('D') => FileStatus::Deleted,
            Some('R') => FileStatus::Renamed,
            _ => FileStatus::Modified,
        };
        entries.push(StatusEntry {
            path: path.to_owned(),
            status,
        });
    }
    Ok(entries)
}

pub(crate) fn remote_url(workdir: &Path, remote: &str) -> Result<Option<String>, GitError> {
    match run_git(workdir, &["remote", "get-url", remote], None) {
        Ok(url) => Ok(Some(url)),
        Err(GitError::CommandFailed { .. }) => Ok(None),
        Err(e) => Err(e),
    }
}

pub(crate) fn push(
    workdir: &Path,
    remote: &str,
    refspec: &str,
    credentials: Option<&Credentials>,
) -> Result<(), GitError> {
    // With credentials, push straight to the authenticated URL so nothing
    // is written into the repository's config.
    let target = match (credentials, remote_url(workdir, remote)?) {
        (Some(creds), Some(url)) => authenticated_url(&url, Some(creds)),
        _ => remote.to_owned(),
    };
    run_git(workdir, &["push", "--quiet", &target, refspec], credentials).map_err(|e| {
        GitError::PushFailed {
            remote: remote.to_owned(),
            message: e.to_string(),
        }
    })?;
    Ok(())
}
