//! Project configuration (`bgav.toml`).
//!
//! Defines the typed configuration read from `bgav.toml` in the project
//! directory: branch and ticket patterns, watched dependencies, descriptor
//! repositories, git persistence switches, and JSON side-file modifications.
//! Command-line flags are applied on top by the binary.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::branch::{BranchClassifier, DEFAULT_INTEGRATION_BRANCHES, DEFAULT_TICKET_BRANCHES};
use crate::modify::Modification;
use crate::pom::{LocalRepository, RemoteRepository, ResolverChain};
use crate::reconcile::MissingBranchPolicy;
use crate::version::{DEFAULT_TICKET_PATTERN, TicketPattern};

/// Name of the configuration file in the project directory.
pub const CONFIG_FILE_NAME: &str = "bgav.toml";

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level configuration.
///
/// Missing fields use defaults; a missing file means all defaults.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BgavConfig {
    #[serde(default)]
    pub branches: BranchesConfig,

    #[serde(default)]
    pub dependencies: DependenciesConfig,

    #[serde(default)]
    pub git: GitConfig,

    /// JSON side files to stamp with the resulting version.
    #[serde(default)]
    pub modify: Vec<Modification>,
}

// ---------------------------------------------------------------------------
// BranchesConfig
// ---------------------------------------------------------------------------

/// Branch classification and ticket-id extraction.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BranchesConfig {
    /// Regex matching ticket branches (default: `^(feature|bugfix|hotfix)`).
    #[serde(default = "default_ticket_branches")]
    pub ticket: String,

    /// Regex matching integration branches (default: `^(develop|master|release)`).
    #[serde(default = "default_integration_branches")]
    pub integration: String,

    /// Regex extracting the ticket id; group 1 if the pattern has one.
    #[serde(default = "default_ticket_id")]
    pub ticket_id: String,
}

impl Default for BranchesConfig {
    fn default() -> Self {
        Self {
            ticket: default_ticket_branches(),
            integration: default_integration_branches(),
            ticket_id: default_ticket_id(),
        }
    }
}

fn default_ticket_branches() -> String {
    DEFAULT_TICKET_BRANCHES.to_owned()
}

fn default_integration_branches() -> String {
    DEFAULT_INTEGRATION_BRANCHES.to_owned()
}

fn default_ticket_id() -> String {
    DEFAULT_TICKET_PATTERN.to_owned()
}

// ---------------------------------------------------------------------------
// DependenciesConfig
// ---------------------------------------------------------------------------

/// Watched dependencies and where their descriptors are found.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DependenciesConfig {
    /// Group-id prefixes whose dependencies follow ticket branches.
    #[serde(default)]
    pub watched: Vec<String>,

    /// Behaviour when a watched dependency has no branch for the ticket.
    #[serde(default)]
    pub missing_branch: MissingBranchPolicy,

    /// Local Maven repository (default: `~/.m2/repository`).
    #[serde(default)]
    pub local_repository: Option<PathBuf>,

    /// Remote repositories consulted after the local one, in order.
    #[serde(default)]
    pub repositories: Vec<RepositoryConfig>,
}

/// One remote descriptor repository.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RepositoryConfig {
    pub url: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl fmt::Debug for RepositoryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RepositoryConfig")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}

// ---------------------------------------------------------------------------
// GitConfig
// ---------------------------------------------------------------------------

/// How corrected descriptors are persisted.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
#[allow(clippy::struct_excessive_bools)]
pub struct GitConfig {
    /// Remote to push to (default: `"origin"`).
    #[serde(default = "default_remote")]
    pub remote: String,

    /// Leave changes uncommitted in the working tree.
    #[serde(default)]
    pub suppress_commit: bool,

    /// Commit but do not push.
    #[serde(default)]
    pub suppress_push: bool,

    /// Fail the run after persisting a correction, so CI re-runs on the
    /// corrected commit.
    #[serde(default)]
    pub fail_on_mutation: bool,
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            remote: default_remote(),
            suppress_commit: false,
            suppress_push: false,
            fail_on_mutation: false,
        }
    }
}

fn default_remote() -> String {
    "origin".to_owned()
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Error loading or validating configuration.
#[derive(Debug)]
pub struct ConfigError {
    /// The file being loaded, if any.
    pub path: Option<PathBuf>,
    /// Human-readable message, with a line number when known.
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(p) = &self.path {
            write!(f, "{}: {}", p.display(), self.message)
        } else {
            write!(f, "config error: {}", self.message)
        }
    }
}

impl std::error::Error for ConfigError {}

impl ConfigError {
    fn invalid(message: String) -> Self {
        Self {
            path: None,
            message,
        }
    }
}

impl BgavConfig {
    /// Load configuration from a TOML file; a missing file yields defaults.
    ///
    /// # Errors
    /// I/O errors other than not-found, invalid TOML, unknown fields.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no configuration file; using defaults");
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(ConfigError {
                    path: Some(path.to_owned()),
                    message: format!("could not read file: {e}"),
                });
            }
        };
        Self::parse(&contents).map_err(|mut e| {
            e.path = Some(path.to_owned());
            e
        })
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    /// Invalid TOML or unknown fields.
    pub fn parse(toml_str: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml_str).map_err(|e| {
            let mut message = e.message().to_owned();
            if let Some(span) = e.span() {
                let line = toml_str[..span.start]
                    .chars()
                    .filter(|&c| c == '\n')
                    .count()
                    + 1;
                message = format!("line {line}: {message}");
            }
            ConfigError::invalid(message)
        })
    }

    /// The branch classifier described by `[branches]`.
    ///
    /// # Errors
    /// An invalid regular expression.
    pub fn classifier(&self) -> Result<BranchClassifier, ConfigError> {
        BranchClassifier::new(&self.branches.ticket, &self.branches.integration)
            .map_err(|e| ConfigError::invalid(format!("branches: {e}")))
    }

    /// The ticket-id pattern described by `[branches]`.
    ///
    /// # Errors
    /// An invalid regular expression.
    pub fn ticket_pattern(&self) -> Result<TicketPattern, ConfigError> {
        TicketPattern::new(&self.branches.ticket_id)
            .map_err(|e| ConfigError::invalid(format!("branches.ticket_id: {e}")))
    }

    /// Descriptor lookup: local repository first, then each remote one.
    #[must_use]
    pub fn resolver(&self) -> ResolverChain {
        let mut chain = ResolverChain::new();
        if let Some(local) = self
            .dependencies
            .local_repository
            .clone()
            .or_else(LocalRepository::default_location)
        {
            chain = chain.with(LocalRepository::new(local));
        }
        for repo in &self.dependencies.repositories {
            let auth = repo
                .username
                .clone()
                .map(|user| (user, repo.password.clone().unwrap_or_default()));
            chain = chain.with(RemoteRepository::new(&repo.url, auth));
        }
        chain
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = BgavConfig::load(&dir.path().join(CONFIG_FILE_NAME)).unwrap();
        assert_eq!(config, BgavConfig::default());
        assert_eq!(config.git.remote, "origin");
        assert_eq!(config.branches.ticket, "^(feature|bugfix|hotfix)");
        assert_eq!(config.dependencies.missing_branch, MissingBranchPolicy::Skip);
    }

    #[test]
    fn full_file_parses() {
        let config = BgavConfig::parse(
            r#"
[branches]
ticket = "^topic/"
ticket_id = "([A-Z]{2,}-\\d+)"

[dependencies]
watched = ["io.crowdcode", "de.example"]
missing_branch = "fail"
local_repository = "/tmp/m2"

[[dependencies.repositories]]
url = "https://repo.example/maven"
username = "ci"
password = "secret"

[git]
remote = "upstream"
suppress_push = true
fail_on_mutation = true

[[modify]]
file = "package.json"
path = "$.version"
value = "NewPomVersion"

[[modify]]
file = "app.json"
path = "$.expo.version"
"#,
        )
        .unwrap();

        assert_eq!(config.branches.ticket, "^topic/");
        assert_eq!(config.branches.integration, "^(develop|master|release)");
        assert_eq!(config.dependencies.watched.len(), 2);
        assert_eq!(config.dependencies.missing_branch, MissingBranchPolicy::Fail);
        assert_eq!(config.dependencies.repositories[0].username.as_deref(), Some("ci"));
        assert!(!format!("{:?}", config.dependencies.repositories[0]).contains("secret"));
        assert_eq!(config.git.remote, "upstream");
        assert!(config.git.suppress_push && !config.git.suppress_commit);
        assert_eq!(config.modify.len(), 2);
        assert_eq!(config.modify[1].value, "NewPomVersion");
        assert_eq!(
            config.ticket_pattern().unwrap().extract("topic/AB-12").as_deref(),
            Some("AB-12")
        );
    }

    #[test]
    fn unknown_field_reports_line() {
        let err = BgavConfig::parse("[git]\nremote = \"o\"\npush = true\n").unwrap_err();
        assert!(err.message.starts_with("line 3:"), "{err}");
    }

    #[test]
    fn load_attaches_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "[branches\n").unwrap();
        let err = BgavConfig::load(&path).unwrap_err();
        assert_eq!(err.path.as_deref(), Some(path.as_path()));
    }

    #[test]
    fn invalid_regex_is_a_config_error() {
        let config = BgavConfig::parse("[branches]\nticket = \"(\"\n").unwrap();
        assert!(config.classifier().is_err());
        let config = BgavConfig::parse("[branches]\nticket_id = \"[\"\n").unwrap();
        let err = config.ticket_pattern().unwrap_err();
        assert!(err.to_string().contains("ticket_id"), "{err}");
    }

    #[test]
    fn resolver_includes_configured_sources() {
        let config = BgavConfig::parse(
            "[dependencies]\nlocal_repository = \"/tmp/m2\"\n\
             [[dependencies.repositories]]\nurl = \"https://repo.example\"\n",
        )
        .unwrap();
        assert!(!config.resolver().is_empty());
    }
}
