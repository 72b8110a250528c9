//! Core types for the bgav git abstraction layer.
//!
//! These types form the vocabulary shared between the [`GitRepo`](crate::GitRepo) trait and
//! the versioning engine. They contain no gix types; the
//! backend is an implementation detail.

use std::fmt;
use std::str::FromStr;

// ---------------------------------------------------------------------------
// GitOid
// ---------------------------------------------------------------------------

/// A git object identifier (SHA-1, 20 bytes).
///
/// Displays as 40 lowercase hex characters.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GitOid([u8; 20]);

impl GitOid {
    /// Create a `GitOid` from raw bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// Return the raw bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl fmt::Display for GitOid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for GitOid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GitOid({self})")
    }
}

impl FromStr for GitOid {
    type Err = OidParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 40 {
            return Err(OidParseError {
                value: s.to_owned(),
                reason: format!("expected 40 hex characters, got {}", s.len()),
            });
        }
        let mut bytes = [0u8; 20];
        for (i, chunk) in s.as_bytes().chunks(2).enumerate() {
            let digit = |b: u8| {
                hex_digit(b).ok_or_else(|| OidParseError {
                    value: s.to_owned(),
                    reason: format!("invalid hex digit '{}'", b as char),
                })
            };
            bytes[i] = (digit(chunk[0])? << 4) | digit(chunk[1])?;
        }
        Ok(Self(bytes))
    }
}

/// Error from parsing a hex string into a [`GitOid`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OidParseError {
    /// The raw value that failed.
    pub value: String,
    /// Why it failed.
    pub reason: String,
}

impl fmt::Display for OidParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid OID {:?}: {}", self.value, self.reason)
    }
}

impl std::error::Error for OidParseError {}

const fn hex_digit(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// HEAD and branches
// ---------------------------------------------------------------------------

/// What HEAD currently points at.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HeadState {
    /// HEAD is a symbolic ref to `refs/heads/<name>`.
    Branch(String),
    /// HEAD points directly at a commit (typical for CI checkouts).
    Detached(GitOid),
}

/// Which branches to list.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BranchScope {
    /// `refs/heads/*`
    Local,
    /// `refs/remotes/*` (symbolic `*/HEAD` entries excluded)
    Remote,
    /// Both of the above, local first.
    All,
}

/// A local or remote-tracking branch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Branch {
    /// Branch name without the remote prefix, e.g. `feature/NCX-9-login`.
    pub name: String,
    /// The remote this branch tracks (`Some("origin")`), or `None` for a local branch.
    pub remote: Option<String>,
    /// The commit the branch points at.
    pub oid: GitOid,
}

impl Branch {
    /// The name as git displays it: `origin/feature/x` or `feature/x`.
    #[must_use]
    pub fn display_name(&self) -> String {
        match &self.remote {
            Some(remote) => format!("{remote}/{}", self.name),
            None => self.name.clone(),
        }
    }
}

impl fmt::Display for Branch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display_name())
    }
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// The working-tree status of a single file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileStatus {
    Added,
    Modified,
    Deleted,
    Renamed,
}

/// A single entry of a working-tree status report.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatusEntry {
    /// Path relative to the worktree root, `/`-separated.
    pub path: String,
    pub status: FileStatus,
}

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

/// Username/password pair for HTTP(S) remotes.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Replace every occurrence of the password in `text` (e.g. captured stderr).
    #[must_use]
    pub fn redact(&self, text: &str) -> String {
        if self.password.is_empty() {
            return text.to_owned();
        }
        text.replace(&self.password, "***")
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// Embed `credentials` into an `http(s)://` remote URL.
///
/// Other URL forms (ssh, scp-like `git@host:path`, local paths) are returned
/// unchanged, as is any URL when `credentials` is `None`.
#[must_use]
pub fn authenticated_url(remote_url: &str, credentials: Option<&Credentials>) -> String {
    let Some(credentials) = credentials else {
        return remote_url.to_owned();
    };
    let Ok(mut parsed) = url::Url::parse(remote_url) else {
        return remote_url.to_owned();
    };
    if !matches!(parsed.scheme(), "http" | "https") {
        return remote_url.to_owned();
    }
    if parsed.set_username(&credentials.username).is_err()
        || parsed.set_password(Some(&credentials.password)).is_err()
    {
        return remote_url.to_owned();
    }
    parsed.into()
}
