//! Resolution of descriptors by artifact identity.
//!
//! Used for descriptors that are not part of the working tree: external
//! parents (for inherited distribution-management and SCM blocks) and
//! dependencies (for their SCM location). Lookups go to the local Maven
//! repository first, then to the configured remote repositories.

use std::path::{Path, PathBuf};

use reqwest::StatusCode;
use reqwest::blocking::Client;
use serde::Deserialize;

use super::model::{ArtifactIdentity, ModuleDescriptor};
use crate::error::{BgavError, Result};
use crate::version::SNAPSHOT_SUFFIX;

/// Looks up the descriptor of an artifact.
pub trait ProjectResolver {
    /// `Ok(None)` when no source has the artifact.
    ///
    /// # Errors
    /// Transport failures other than "not found", and malformed descriptors.
    fn resolve(&self, identity: &ArtifactIdentity) -> Result<Option<ModuleDescriptor>>;
}

/// `group/as/path/artifact/version`, the repository layout of an artifact.
#[must_use]
pub fn repository_path(identity: &ArtifactIdentity) -> String {
    format!(
        "{}/{}/{}",
        identity.group_id.replace('.', "/"),
        identity.artifact_id,
        identity.version
    )
}

// ---------------------------------------------------------------------------
// LocalRepository
// ---------------------------------------------------------------------------

/// The local Maven repository (`~/.m2/repository` by default).
#[derive(Clone, Debug)]
pub struct LocalRepository {
    root: PathBuf,
}

impl LocalRepository {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `~/.m2/repository`, if a home directory is known.
    #[must_use]
    pub fn default_location() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".m2").join("repository"))
    }

    /// Where the descriptor of `identity` would be stored.
    #[must_use]
    pub fn pom_path(&self, identity: &ArtifactIdentity) -> PathBuf {
        self.root.join(repository_path(identity)).join(format!(
            "{}-{}.pom",
            identity.artifact_id, identity.version
        ))
    }
}

impl ProjectResolver for LocalRepository {
    fn resolve(&self, identity: &ArtifactIdentity) -> Result<Option<ModuleDescriptor>> {
        let path = self.pom_path(identity);
        if !path.is_file() {
            tracing::trace!(%identity, path = %path.display(), "not in local repository");
            return Ok(None);
        }
        tracing::debug!(%identity, path = %path.display(), "resolved from local repository");
        ModuleDescriptor::load(&path).map(Some)
    }
}

// ---------------------------------------------------------------------------
// RemoteRepository
// ---------------------------------------------------------------------------

/// A remote Maven repository reachable over HTTP(S).
#[derive(Clone, Debug)]
pub struct RemoteRepository {
    base_url: String,
    auth: Option<(String, String)>,
    client: Client,
}

impl RemoteRepository {
    #[must_use]
    pub fn new(base_url: impl Into<String>, auth: Option<(String, String)>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            auth,
            client: Client::new(),
        }
    }

    fn url(&self, relative: &str) -> String {
        format!("{}/{relative}", self.base_url)
    }

    /// GET `url`; `Ok(None)` on 404.
    fn fetch(&self, identity: &ArtifactIdentity, url: &str) -> Result<Option<String>> {
        let resolve_error = |message: String| BgavError::Resolve {
            artifact: identity.to_string(),
            url: url.to_owned(),
            message,
        };

        let mut request = self.client.get(url);
        if let Some((user, password)) = &self.auth {
            request = request.basic_auth(user, Some(password));
        }
        let response = request.send().map_err(|e| resolve_error(e.to_string()))?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => response
                .text()
                .map(Some)
                .map_err(|e| resolve_error(e.to_string())),
            status => Err(resolve_error(format!("HTTP {status}"))),
        }
    }

    /// File-name version of the descriptor: the timestamped build for
    /// snapshots when the repository publishes metadata, else `version`.
    fn file_version(&self, identity: &ArtifactIdentity) -> Result<String> {
        if !identity.version.ends_with(SNAPSHOT_SUFFIX) {
            return Ok(identity.version.clone());
        }
        let url = self.url(&format!("{}/maven-metadata.xml", repository_path(identity)));
        let Some(metadata) = self.fetch(identity, &url)? else {
            return Ok(identity.version.clone());
        };
        Ok(snapshot_pom_version(&identity.version, &metadata)
            .unwrap_or_else(|| identity.version.clone()))
    }
}

impl ProjectResolver for RemoteRepository {
    fn resolve(&self, identity: &ArtifactIdentity) -> Result<Option<ModuleDescriptor>> {
        let file_version = self.file_version(identity)?;
        let url = self.url(&format!(
            "{}/{}-{file_version}.pom",
            repository_path(identity),
            identity.artifact_id
        ));
        let Some(text) = self.fetch(identity, &url)? else {
            tracing::trace!(%identity, %url, "not in remote repository");
            return Ok(None);
        };
        tracing::debug!(%identity, %url, "resolved from remote repository");
        ModuleDescriptor::parse(&text, Path::new(&url)).map(Some)
    }
}

#[derive(Debug, Deserialize)]
struct RawMetadata {
    versioning: Option<RawVersioning>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawVersioning {
    snapshot: Option<RawSnapshot>,
    snapshot_versions: Option<RawSnapshotVersions>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSnapshot {
    timestamp: Option<String>,
    build_number: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSnapshotVersions {
    #[serde(default)]
    snapshot_version: Vec<RawSnapshotVersion>,
}

#[derive(Debug, Deserialize)]
struct RawSnapshotVersion {
    classifier: Option<String>,
    extension: Option<String>,
    value: Option<String>,
}

/// The timestamped version of the newest `.pom` of snapshot `version`,
/// read from `maven-metadata.xml`.
#[must_use]
pub fn snapshot_pom_version(version: &str, metadata_xml: &str) -> Option<String> {
    let metadata: RawMetadata = quick_xml::de::from_str(metadata_xml).ok()?;
    let versioning = metadata.versioning?;

    let listed = versioning
        .snapshot_versions
        .into_iter()
        .flat_map(|v| v.snapshot_version)
        .find(|v| {
            v.extension.as_deref() == Some("pom")
                && v.classifier.as_deref().is_none_or(str::is_empty)
        })
        .and_then(|v| v.value);
    if listed.is_some() {
        return listed;
    }

    let snapshot = versioning.snapshot?;
    let release = version.strip_suffix(SNAPSHOT_SUFFIX)?;
    Some(format!(
        "{release}-{}-{}",
        snapshot.timestamp?,
        snapshot.build_number?
    ))
}

// ---------------------------------------------------------------------------
// ResolverChain
// ---------------------------------------------------------------------------

/// Consults resolvers in order; the first hit wins.
#[derive(Default)]
pub struct ResolverChain {
    resolvers: Vec<Box<dyn ProjectResolver>>,
}

impl ResolverChain {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, resolver: impl ProjectResolver + 'static) -> Self {
        self.resolvers.push(Box::new(resolver));
        self
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resolvers.is_empty()
    }
}

impl ProjectResolver for ResolverChain {
    fn resolve(&self, identity: &ArtifactIdentity) -> Result<Option<ModuleDescriptor>> {
        for resolver in &self.resolvers {
            if let Some(found) = resolver.resolve(identity)? {
                return Ok(Some(found));
            }
        }
        Ok(None)
    }
}
