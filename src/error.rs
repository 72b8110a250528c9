//! Error types for a reconciliation session.
//!
//! Defines [`BgavError`], the single error type of the engine. Every variant
//! names the module, dependency or file it concerns, so the terminal message
//! identifies the offending item and the rule that was violated.
//!
//! Recoverable conditions (a dependency without SCM metadata, a blank
//! dependency version, no remote branch for the ticket under the `skip`
//! policy) are never errors: they are logged and processing continues.

use std::fmt;
use std::path::PathBuf;

use bgav_git::GitError;
use thiserror::Error;

use crate::config::ConfigError;

/// Convenience alias used throughout the crate.
pub type Result<T, E = BgavError> = std::result::Result<T, E>;

/// Fatal failures of a reconciliation session.
#[derive(Debug, Error)]
pub enum BgavError {
    /// A git operation failed.
    #[error("{context}: {source}")]
    Git {
        /// What was being attempted.
        context: String,
        #[source]
        source: GitError,
    },

    /// The active branch could not be determined.
    #[error("branch name unobtainable: {reason}")]
    BranchUnavailable {
        /// Why resolution failed.
        reason: String,
    },

    /// A ticket branch whose name carries no ticket id.
    #[error("ticket branch `{branch}` contains no ticket id")]
    MissingTicket {
        /// The branch name.
        branch: String,
    },

    /// A module declares its own version with a ticket id other than the branch's.
    #[error(
        "{module}: version carries ticket id {found} but branch is for {expected}; \
         fix the version by hand or switch branches"
    )]
    TicketMismatch {
        /// The module identity.
        module: String,
        /// The ticket id found in the version.
        found: String,
        /// The ticket id of the branch.
        expected: String,
    },

    /// The element a patch should rewrite does not exist in the descriptor.
    #[error("{}: cannot patch {location}: element not present", .path.display())]
    TargetMissing {
        /// Descriptor path.
        path: PathBuf,
        /// Human-readable location, e.g. `parent version`.
        location: String,
    },

    /// A descriptor could not be parsed.
    #[error("{}: malformed descriptor: {message}", .path.display())]
    Descriptor {
        /// Descriptor path (or URL for remote descriptors).
        path: PathBuf,
        /// Parser detail.
        message: String,
    },

    /// A file could not be read or written.
    #[error("{}: {source}", .path.display())]
    Io {
        /// The file involved.
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A descriptor had uncommitted changes when the session started.
    #[error(
        "{} has uncommitted changes; commit or stash them before building",
        .path.display()
    )]
    DirtyDescriptor {
        /// The modified descriptor.
        path: PathBuf,
    },

    /// Strict mode: a watched dependency has no branch for the ticket.
    #[error("{dependency}: no branch for ticket {ticket} in {url}")]
    MissingBranch {
        /// `group:artifact` of the dependency.
        dependency: String,
        /// The active ticket id.
        ticket: String,
        /// The repository that was searched.
        url: String,
    },

    /// A remote descriptor repository could not be queried.
    #[error("resolving {artifact} from {url}: {message}")]
    Resolve {
        /// `group:artifact:version` being resolved.
        artifact: String,
        /// Request URL.
        url: String,
        /// Transport or status detail.
        message: String,
    },

    /// A JSON side-file modification failed.
    #[error("{}: cannot set `{expression}`: {message}", .file.display())]
    Modify {
        /// The JSON file.
        file: PathBuf,
        /// The path expression.
        expression: String,
        /// Why it failed.
        message: String,
    },

    /// The module tree references the same descriptor twice.
    #[error("{}: module tree contains a cycle", .path.display())]
    ModuleCycle {
        /// The descriptor reached a second time.
        path: PathBuf,
    },

    /// Invalid configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Descriptors were changed and the run is configured to fail in that case.
    #[error(
        "versions were corrected for [{}] and {persisted}; re-run the build",
        .artifacts.join(", ")
    )]
    MutationRequired {
        /// Artifacts whose versions changed.
        artifacts: Vec<String>,
        /// What happened to the corrected files.
        persisted: Persistence,
    },

    /// Another error, annotated with the module or dependency being processed.
    #[error("{context}: {source}")]
    Context {
        /// `module …` or `dependency …`.
        context: String,
        #[source]
        source: Box<BgavError>,
    },
}

/// How far corrected descriptors were carried before the run ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Persistence {
    /// Written to the working tree only.
    Uncommitted,
    Committed,
    Pushed,
}

impl fmt::Display for Persistence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Uncommitted => "left uncommitted in the working tree",
            Self::Committed => "committed but not pushed",
            Self::Pushed => "committed and pushed",
        })
    }
}

impl BgavError {
    pub(crate) fn git(context: impl Into<String>, source: GitError) -> Self {
        Self::Git {
            context: context.into(),
            source,
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// The innermost error, skipping [`BgavError::Context`] layers.
    #[must_use]
    pub fn root_cause(&self) -> &Self {
        match self {
            Self::Context { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

/// Attach module/dependency context to a fallible result.
pub(crate) trait ResultExt<T> {
    fn within(self, context: impl FnOnce() -> String) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn within(self, context: impl FnOnce() -> String) -> Result<T> {
        self.map_err(|source| BgavError::Context {
            context: context(),
            source: Box::new(source),
        })
    }
}
