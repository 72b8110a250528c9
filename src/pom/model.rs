//! Read-only structured view of a project descriptor.
//!
//! Only the elements the versioning engine consults are modelled; everything
//! else in the file is ignored on read and preserved on write (see
//! [`super::patch`]).

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{BgavError, Result};

/// Default location of a parent descriptor relative to the child's directory.
pub const DEFAULT_PARENT_PATH: &str = "../pom.xml";

// ---------------------------------------------------------------------------
// ArtifactIdentity
// ---------------------------------------------------------------------------

/// `(group, artifact, version)` triple naming a published artifact.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArtifactIdentity {
    pub group_id: String,
    pub artifact_id: String,
    pub version: String,
}

impl ArtifactIdentity {
    #[must_use]
    pub fn new(
        group_id: impl Into<String>,
        artifact_id: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            group_id: group_id.into(),
            artifact_id: artifact_id.into(),
            version: version.into(),
        }
    }
}

impl fmt::Display for ArtifactIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.group_id, self.artifact_id, self.version)
    }
}

// ---------------------------------------------------------------------------
// Descriptor parts
// ---------------------------------------------------------------------------

/// The `<parent>` block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParentRef {
    pub group_id: String,
    pub artifact_id: String,
    pub version: Option<String>,
    /// `<relativePath>` as written. `Some("")` disables the on-disk lookup.
    pub relative_path: Option<String>,
}

impl ParentRef {
    #[must_use]
    pub fn identity(&self) -> ArtifactIdentity {
        ArtifactIdentity::new(
            &self.group_id,
            &self.artifact_id,
            self.version.clone().unwrap_or_default(),
        )
    }

    /// Where the parent descriptor would be on disk, relative to `child_dir`.
    #[must_use]
    pub fn on_disk_candidate(&self, child_dir: &Path) -> Option<PathBuf> {
        let rel = match self.relative_path.as_deref() {
            None => DEFAULT_PARENT_PATH,
            Some("") => return None,
            Some(rel) => rel,
        };
        let path = child_dir.join(rel);
        if path.is_dir() {
            Some(path.join("pom.xml"))
        } else {
            Some(path)
        }
    }
}

/// How a dependency's version is written.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeclaredVersion {
    /// A concrete version in the dependency element.
    Literal(String),
    /// Exactly `${key}`: the value lives in a property.
    Placeholder { key: String },
}

impl DeclaredVersion {
    /// Classify a raw `<version>` text. Blank text yields `None`.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        let key = raw
            .strip_prefix("${")
            .and_then(|rest| rest.strip_suffix('}'))
            .filter(|key| !key.is_empty() && !key.contains(['$', '{', '}']));
        Some(key.map_or_else(
            || Self::Literal(raw.to_owned()),
            |key| Self::Placeholder {
                key: key.to_owned(),
            },
        ))
    }
}

/// A declared dependency.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Dependency {
    pub group_id: String,
    pub artifact_id: String,
    pub version: Option<DeclaredVersion>,
}

impl Dependency {
    /// `group:artifact`, for log and error messages.
    #[must_use]
    pub fn coordinates(&self) -> String {
        format!("{}:{}", self.group_id, self.artifact_id)
    }
}

/// A deployment target inside `<distributionManagement>`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeploymentRepository {
    pub id: Option<String>,
    pub url: Option<String>,
}

/// The `<distributionManagement>` block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DistributionManagement {
    pub repository: Option<DeploymentRepository>,
    pub snapshot_repository: Option<DeploymentRepository>,
}

impl DistributionManagement {
    /// Whether branched snapshot builds have somewhere to be deployed.
    #[must_use]
    pub const fn accepts_snapshots(&self) -> bool {
        self.snapshot_repository.is_some()
    }
}

/// The `<scm>` block.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Scm {
    pub url: Option<String>,
    pub connection: Option<String>,
    pub developer_connection: Option<String>,
}

impl Scm {
    /// A URL `git clone` understands: `<url>`, else a connection string
    /// with its `scm:git:` prefix removed.
    #[must_use]
    pub fn clone_url(&self) -> Option<String> {
        if let Some(url) = &self.url {
            return Some(url.clone());
        }
        self.connection
            .as_deref()
            .or(self.developer_connection.as_deref())
            .map(|c| c.strip_prefix("scm:git:").unwrap_or(c).to_owned())
    }
}

// ---------------------------------------------------------------------------
// ModuleDescriptor
// ---------------------------------------------------------------------------

/// One parsed descriptor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModuleDescriptor {
    /// Where the descriptor was read from. For remote descriptors, the URL.
    pub path: PathBuf,
    pub group_id: Option<String>,
    pub artifact_id: String,
    pub version: Option<String>,
    pub parent: Option<ParentRef>,
    pub modules: Vec<String>,
    pub dependencies: Vec<Dependency>,
    pub properties: BTreeMap<String, String>,
    pub distribution: Option<DistributionManagement>,
    pub scm: Option<Scm>,
}

impl ModuleDescriptor {
    /// Read and parse the descriptor at `path`.
    ///
    /// # Errors
    /// [`BgavError::Io`] if unreadable, [`BgavError::Descriptor`] if malformed.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| BgavError::io(path, e))?;
        Self::parse(&text, path)
    }

    /// Parse descriptor text; `path` is recorded and used in errors.
    ///
    /// # Errors
    /// [`BgavError::Descriptor`] on malformed XML or a missing `<artifactId>`.
    pub fn parse(text: &str, path: &Path) -> Result<Self> {
        let raw: RawProject =
            quick_xml::de::from_str(text).map_err(|e| BgavError::Descriptor {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
        raw.into_descriptor(path)
    }

    /// Directory containing the descriptor.
    #[must_use]
    pub fn dir(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new("."))
    }

    /// Own group id, else the parent's.
    #[must_use]
    pub fn effective_group_id(&self) -> Option<&str> {
        self.group_id
            .as_deref()
            .or_else(|| self.parent.as_ref().map(|p| p.group_id.as_str()))
    }

    /// Own version, else the parent's.
    #[must_use]
    pub fn effective_version(&self) -> Option<&str> {
        self.version
            .as_deref()
            .or_else(|| self.parent.as_ref().and_then(|p| p.version.as_deref()))
    }

    /// Whether the version comes entirely from `<parent>`.
    #[must_use]
    pub const fn is_version_inherited(&self) -> bool {
        self.version.is_none() && self.parent.is_some()
    }

    #[must_use]
    pub fn identity(&self) -> ArtifactIdentity {
        ArtifactIdentity::new(
            self.effective_group_id().unwrap_or_default(),
            &self.artifact_id,
            self.effective_version().unwrap_or_default(),
        )
    }

    /// The concrete version `dependency` currently resolves to.
    ///
    /// `None` when the version is blank, references a property this
    /// descriptor does not define, or still contains an expression.
    #[must_use]
    pub fn resolve_version(&self, dependency: &Dependency) -> Option<String> {
        let value = match dependency.version.as_ref()? {
            DeclaredVersion::Literal(v) => v.as_str(),
            DeclaredVersion::Placeholder { key } => self.properties.get(key)?.trim(),
        };
        (!value.is_empty() && !value.contains("${")).then(|| value.to_owned())
    }

    /// Paths of the descriptors of declared sub-modules.
    ///
    /// A module entry naming a directory resolves to `<dir>/pom.xml`; an entry
    /// naming an `.xml` file is used as is.
    #[must_use]
    pub fn module_descriptor_paths(&self) -> Vec<PathBuf> {
        self.modules
            .iter()
            .map(|module| {
                let path = self.dir().join(module);
                if module.ends_with(".xml") {
                    path
                } else {
                    path.join("pom.xml")
                }
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Raw serde layer
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawProject {
    group_id: Option<String>,
    artifact_id: Option<String>,
    version: Option<String>,
    parent: Option<RawParent>,
    modules: Option<RawModules>,
    dependencies: Option<RawDependencies>,
    properties: Option<BTreeMap<String, String>>,
    distribution_management: Option<RawDistributionManagement>,
    scm: Option<RawScm>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawParent {
    group_id: Option<String>,
    artifact_id: Option<String>,
    version: Option<String>,
    relative_path: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawModules {
    #[serde(default)]
    module: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawDependencies {
    #[serde(default)]
    dependency: Vec<RawDependency>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDependency {
    group_id: Option<String>,
    artifact_id: Option<String>,
    version: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDistributionManagement {
    repository: Option<RawDeploymentRepository>,
    snapshot_repository: Option<RawDeploymentRepository>,
}

#[derive(Debug, Deserialize)]
struct RawDeploymentRepository {
    id: Option<String>,
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawScm {
    url: Option<String>,
    connection: Option<String>,
    developer_connection: Option<String>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}

impl RawProject {
    fn into_descriptor(self, path: &Path) -> Result<ModuleDescriptor> {
        let artifact_id = non_blank(self.artifact_id).ok_or_else(|| BgavError::Descriptor {
            path: path.to_path_buf(),
            message: "missing <artifactId>".to_owned(),
        })?;

        let parent = self.parent.map(|p| ParentRef {
            group_id: non_blank(p.group_id).unwrap_or_default(),
            artifact_id: non_blank(p.artifact_id).unwrap_or_default(),
            version: non_blank(p.version),
            relative_path: p.relative_path.map(|r| r.trim().to_owned()),
        });

        let dependencies = self
            .dependencies
            .unwrap_or_default()
            .dependency
            .into_iter()
            .map(|d| Dependency {
                group_id: non_blank(d.group_id).unwrap_or_default(),
                artifact_id: non_blank(d.artifact_id).unwrap_or_default(),
                version: d.version.as_deref().and_then(DeclaredVersion::parse),
            })
            .collect();

        let deployment = |r: RawDeploymentRepository| DeploymentRepository {
            id: non_blank(r.id),
            url: non_blank(r.url),
        };

        Ok(ModuleDescriptor {
            path: path.to_path_buf(),
            group_id: non_blank(self.group_id),
            artifact_id,
            version: non_blank(self.version),
            parent,
            modules: self
                .modules
                .unwrap_or_default()
                .module
                .into_iter()
                .filter_map(|m| non_blank(Some(m)))
                .collect(),
            dependencies,
            properties: self
                .properties
                .unwrap_or_default()
                .into_iter()
                .map(|(k, v)| (k, v.trim().to_owned()))
                .collect(),
            distribution: self.distribution_management.map(|d| DistributionManagement {
                repository: d.repository.map(deployment),
                snapshot_repository: d.snapshot_repository.map(deployment),
            }),
            scm: self.scm.map(|s| Scm {
                url: non_blank(s.url),
                connection: non_blank(s.connection),
                developer_connection: non_blank(s.developer_connection),
            }),
        })
    }
}
