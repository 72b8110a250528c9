//! Cross-repository dependency reconciliation.
//!
//! On a ticket branch, each watched dependency of a module is looked up in
//! its own repository: if that repository has a branch for the same ticket,
//! the consuming descriptor is pointed at the branched version. On an
//! integration branch, ticket ids are stripped from watched dependency
//! versions without any remote lookup.
//!
//! Lookups that walk parent descriptors (distribution management, SCM) and
//! remote branch versions are memoized in a [`LookupCache`] that lives for
//! one session.

pub mod checkout;

use std::collections::HashMap;

use bgav_git::Credentials;
use serde::Deserialize;

use crate::error::{BgavError, Result, ResultExt};
use crate::graph::{ModuleGraph, NodeId};
use crate::pom::model::ParentRef;
use crate::pom::{
    ArtifactIdentity, DeclaredVersion, Dependency, DistributionManagement, Location,
    ModuleDescriptor, ProjectResolver, Scm, patch,
};
use crate::version::{TicketPattern, strip_ticket};
use crate::walk::{BranchPolicy, ReconciliationOutcome};

use self::checkout::CheckoutHandle;

/// Parent chains longer than this are treated as broken.
const MAX_PARENT_DEPTH: usize = 32;

/// What to do when a watched dependency has no branch for the ticket.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum MissingBranchPolicy {
    /// Keep the dependency's current version and continue.
    #[default]
    Skip,
    /// Abort the session.
    Fail,
}

/// Inputs of dependency reconciliation that do not change during a session.
#[derive(Clone, Debug, Default)]
pub struct ReconcileSettings {
    /// Group-id prefixes of watched dependencies.
    pub watched: Vec<String>,
    pub missing_branch: MissingBranchPolicy,
    /// Credentials for cloning dependency repositories over HTTP(S).
    pub credentials: Option<Credentials>,
}

impl ReconcileSettings {
    #[must_use]
    pub fn is_watched(&self, dependency: &Dependency) -> bool {
        self.watched
            .iter()
            .any(|prefix| !prefix.is_empty() && dependency.group_id.starts_with(prefix.as_str()))
    }
}

/// Per-session memo tables.
#[derive(Debug, Default)]
pub struct LookupCache {
    distribution: HashMap<ArtifactIdentity, Option<DistributionManagement>>,
    scm: HashMap<ArtifactIdentity, Option<Scm>>,
    /// `(repository url, ticket)` → version on the ticket's branch.
    branch_versions: HashMap<(String, String), Option<String>>,
}

// ---------------------------------------------------------------------------
// DependencyReconciler
// ---------------------------------------------------------------------------

/// Reconciles the watched dependencies of one module at a time.
pub struct DependencyReconciler<'a> {
    settings: &'a ReconcileSettings,
    pattern: &'a TicketPattern,
    resolver: &'a dyn ProjectResolver,
    cache: &'a mut LookupCache,
}

impl<'a> DependencyReconciler<'a> {
    pub fn new(
        settings: &'a ReconcileSettings,
        pattern: &'a TicketPattern,
        resolver: &'a dyn ProjectResolver,
        cache: &'a mut LookupCache,
    ) -> Self {
        Self {
            settings,
            pattern,
            resolver,
            cache,
        }
    }

    /// Apply `policy` to the watched dependencies of module `id`.
    ///
    /// `planned` holds the target version of every module in the tree, so
    /// dependencies on sibling modules are aligned without a clone.
    ///
    /// # Errors
    /// Fatal failures annotated with the dependency they concern.
    pub fn reconcile_module(
        &mut self,
        graph: &mut ModuleGraph,
        id: NodeId,
        planned: &[Option<String>],
        policy: &BranchPolicy,
    ) -> Result<ReconciliationOutcome> {
        let mut outcome = ReconciliationOutcome::default();
        let watched: Vec<Dependency> = graph
            .descriptor(id)
            .dependencies
            .iter()
            .filter(|d| self.settings.is_watched(d))
            .cloned()
            .collect();
        if watched.is_empty() {
            return Ok(outcome);
        }

        match policy {
            BranchPolicy::Leave => {
                tracing::debug!(count = watched.len(), "leaving watched dependencies as they are");
            }
            BranchPolicy::Inject { ticket } => {
                let consumer = graph.descriptor(id).clone();
                let accepts = self
                    .distribution_for(&consumer)?
                    .is_some_and(|d| d.accepts_snapshots());
                if !accepts {
                    tracing::warn!(
                        "no <distributionManagement> with a <snapshotRepository> found for this \
                         module or its parents; watched dependencies keep their versions"
                    );
                    return Ok(outcome);
                }
                for dependency in &watched {
                    outcome.merge(
                        self.inject(graph, id, dependency, ticket, planned)
                            .within(|| format!("dependency {}", dependency.coordinates()))?,
                    );
                }
            }
            BranchPolicy::Strip => {
                for dependency in &watched {
                    outcome.merge(
                        self.strip(graph, id, dependency, planned)
                            .within(|| format!("dependency {}", dependency.coordinates()))?,
                    );
                }
            }
        }
        Ok(outcome)
    }

    #[tracing::instrument(skip_all, fields(dependency = %dependency.coordinates()))]
    fn inject(
        &mut self,
        graph: &mut ModuleGraph,
        id: NodeId,
        dependency: &Dependency,
        ticket: &str,
        planned: &[Option<String>],
    ) -> Result<ReconciliationOutcome> {
        let Some(current) = self.current_version(graph.descriptor(id), dependency) else {
            return Ok(ReconciliationOutcome::default());
        };
        if self.pattern.carries(&current, ticket) {
            tracing::debug!(version = %current, "already on the ticket's version");
            return Ok(ReconciliationOutcome::default());
        }

        let target = if let Some(module) = graph.find(&dependency.group_id, &dependency.artifact_id)
        {
            let Some(target) = planned[module.index()].clone() else {
                return Ok(ReconciliationOutcome::default());
            };
            tracing::debug!(version = %target, "dependency is a module of this tree");
            target
        } else {
            let identity =
                ArtifactIdentity::new(&dependency.group_id, &dependency.artifact_id, &current);
            let Some(url) = self.scm_for(&identity)?.and_then(|scm| scm.clone_url()) else {
                tracing::warn!(
                    artifact = %identity,
                    "no <scm> location found for the dependency or its parents; keeping its version"
                );
                return Ok(ReconciliationOutcome::default());
            };
            let Some(branch_version) = self.branch_version(&url, &dependency.artifact_id, ticket)?
            else {
                return match self.settings.missing_branch {
                    MissingBranchPolicy::Skip => {
                        tracing::info!(%url, %ticket, "no branch for the ticket; keeping its version");
                        Ok(ReconciliationOutcome::default())
                    }
                    MissingBranchPolicy::Fail => Err(BgavError::MissingBranch {
                        dependency: dependency.coordinates(),
                        ticket: ticket.to_owned(),
                        url,
                    }),
                };
            };
            self.pattern.inject(&branch_version, ticket)
        };

        apply(graph, id, dependency, &target)
    }

    #[tracing::instrument(skip_all, fields(dependency = %dependency.coordinates()))]
    fn strip(
        &self,
        graph: &mut ModuleGraph,
        id: NodeId,
        dependency: &Dependency,
        planned: &[Option<String>],
    ) -> Result<ReconciliationOutcome> {
        let Some(current) = self.current_version(graph.descriptor(id), dependency) else {
            return Ok(ReconciliationOutcome::default());
        };
        if self.pattern.extract(&current).is_none() {
            return Ok(ReconciliationOutcome::default());
        }
        let target = graph
            .find(&dependency.group_id, &dependency.artifact_id)
            .and_then(|module| planned[module.index()].clone())
            .unwrap_or_else(|| strip_ticket(&current));
        apply(graph, id, dependency, &target)
    }

    /// The version `dependency` resolves to in `consumer`, logging why not.
    fn current_version(&self, consumer: &ModuleDescriptor, dependency: &Dependency) -> Option<String> {
        let resolved = consumer.resolve_version(dependency);
        if resolved.is_none() {
            match &dependency.version {
                None => tracing::debug!("no version declared; nothing to reconcile"),
                Some(declared) => tracing::warn!(
                    declared = ?declared,
                    "version cannot be resolved from this descriptor's properties; skipping"
                ),
            }
        }
        resolved
    }

    /// Version of the dependency on its ticket branch, via a scratch clone.
    fn branch_version(&mut self, url: &str, artifact_id: &str, ticket: &str) -> Result<Option<String>> {
        let key = (url.to_owned(), ticket.to_owned());
        if let Some(cached) = self.cache.branch_versions.get(&key) {
            tracing::debug!(url, ticket, "branch version from cache");
            return Ok(cached.clone());
        }

        let checkout = CheckoutHandle::acquire(
            url,
            artifact_id,
            ticket,
            self.settings.credentials.as_ref(),
        )?;
        let version = match checkout.check_out_match()? {
            None => None,
            Some(pom) => {
                let descriptor = ModuleDescriptor::load(&pom)?;
                let version = descriptor.effective_version().ok_or_else(|| {
                    BgavError::Descriptor {
                        path: pom.clone(),
                        message: "no <version> on the ticket branch".to_owned(),
                    }
                })?;
                tracing::debug!(branch = ?checkout.matched_branch().map(|b| b.name.as_str()), version, "found ticket branch");
                Some(version.to_owned())
            }
        };
        drop(checkout);

        self.cache.branch_versions.insert(key, version.clone());
        Ok(version)
    }

    /// Distribution management of `consumer`, inherited if needed.
    ///
    /// # Errors
    /// Resolver failures and malformed parent descriptors.
    pub fn distribution_for(
        &mut self,
        consumer: &ModuleDescriptor,
    ) -> Result<Option<DistributionManagement>> {
        inherited(
            consumer.clone(),
            self.resolver,
            &mut self.cache.distribution,
            |d| d.distribution.clone(),
        )
    }

    /// SCM block of the published artifact `identity`, inherited if needed.
    ///
    /// # Errors
    /// Resolver failures and malformed descriptors.
    pub fn scm_for(&mut self, identity: &ArtifactIdentity) -> Result<Option<Scm>> {
        if let Some(cached) = self.cache.scm.get(identity) {
            return Ok(cached.clone());
        }
        let Some(descriptor) = self.resolver.resolve(identity)? else {
            tracing::warn!(artifact = %identity, "descriptor not found in any repository");
            self.cache.scm.insert(identity.clone(), None);
            return Ok(None);
        };
        let scm = inherited(descriptor, self.resolver, &mut self.cache.scm, |d| d.scm.clone())?;
        self.cache.scm.insert(identity.clone(), scm.clone());
        Ok(scm)
    }
}

/// Patch the consuming descriptor so `dependency` resolves to `target`.
fn apply(
    graph: &mut ModuleGraph,
    id: NodeId,
    dependency: &Dependency,
    target: &str,
) -> Result<ReconciliationOutcome> {
    let consumer = graph.descriptor(id);
    let path = consumer.path.clone();
    let artifact = consumer.artifact_id.clone();
    let location = match &dependency.version {
        Some(DeclaredVersion::Placeholder { key }) => Location::Property { key: key.clone() },
        _ => Location::DependencyVersion {
            group_id: dependency.group_id.clone(),
            artifact_id: dependency.artifact_id.clone(),
        },
    };

    let mut outcome = ReconciliationOutcome::default();
    if patch::write_value_if_changed(&path, &location, target)? {
        tracing::info!(%location, version = %target, "dependency version updated");
        outcome.record(&path, &artifact);
        graph.reload(id)?;
    }
    Ok(outcome)
}

/// Follow the parent chain from `start` until `pick` finds a value.
///
/// Every identity visited is memoized with the final answer.
fn inherited<T: Clone>(
    start: ModuleDescriptor,
    resolver: &dyn ProjectResolver,
    memo: &mut HashMap<ArtifactIdentity, Option<T>>,
    pick: impl Fn(&ModuleDescriptor) -> Option<T>,
) -> Result<Option<T>> {
    let mut visited: Vec<ArtifactIdentity> = Vec::new();
    let mut current = Some(start);
    let mut found = None;

    while let Some(descriptor) = current.take() {
        let identity = descriptor.identity();
        if let Some(hit) = memo.get(&identity) {
            found = hit.clone();
            break;
        }
        if visited.contains(&identity) || visited.len() >= MAX_PARENT_DEPTH {
            tracing::warn!(artifact = %identity, "parent chain loops; giving up");
            break;
        }
        visited.push(identity);
        if let Some(value) = pick(&descriptor) {
            found = Some(value);
            break;
        }
        if let Some(parent) = &descriptor.parent {
            current = load_parent(&descriptor, parent, resolver)?;
        }
    }

    for identity in visited {
        memo.insert(identity, found.clone());
    }
    Ok(found)
}

/// The parent of `child`: on disk at its relative path when the identity
/// matches, else through `resolver`.
fn load_parent(
    child: &ModuleDescriptor,
    parent: &ParentRef,
    resolver: &dyn ProjectResolver,
) -> Result<Option<ModuleDescriptor>> {
    if let Some(candidate) = parent.on_disk_candidate(child.dir())
        && candidate.is_file()
    {
        let on_disk = ModuleDescriptor::load(&candidate)?;
        if on_disk.artifact_id == parent.artifact_id
            && on_disk.effective_group_id() == Some(parent.group_id.as_str())
        {
            return Ok(Some(on_disk));
        }
    }
    let resolved = resolver.resolve(&parent.identity())?;
    if resolved.is_none() {
        tracing::debug!(parent = %parent.identity(), "parent descriptor not found");
    }
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::fs;
    use std::path::Path;

    use tempfile::TempDir;

    use super::*;
    use crate::pom::{LocalRepository, ResolverChain};

    fn write(dir: &Path, rel: &str, body: &str) -> std::path::PathBuf {
        let path = dir.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, body).unwrap();
        path
    }

    struct Counting<'a> {
        inner: LocalRepository,
        calls: &'a Cell<usize>,
    }

    impl ProjectResolver for Counting<'_> {
        fn resolve(&self, identity: &ArtifactIdentity) -> Result<Option<ModuleDescriptor>> {
            self.calls.set(self.calls.get() + 1);
            self.inner.resolve(identity)
        }
    }

    fn install(m2: &Path, g: &str, a: &str, v: &str, body: &str) {
        let local = LocalRepository::new(m2);
        let path = local.pom_path(&ArtifactIdentity::new(g, a, v));
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, body).unwrap();
    }

    #[test]
    fn watched_is_a_group_prefix() {
        let settings = ReconcileSettings {
            watched: vec!["io.crowdcode".to_owned()],
            ..ReconcileSettings::default()
        };
        let dep = |g: &str| Dependency {
            group_id: g.to_owned(),
            artifact_id: "a".to_owned(),
            version: None,
        };
        assert!(settings.is_watched(&dep("io.crowdcode")));
        assert!(settings.is_watched(&dep("io.crowdcode.shop")));
        assert!(!settings.is_watched(&dep("org.apache")));
        assert!(!ReconcileSettings::default().is_watched(&dep("io.crowdcode")));
    }

    #[test]
    fn distribution_is_inherited_from_on_disk_parent() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "pom.xml",
            "<project><groupId>g</groupId><artifactId>p</artifactId><version>1</version>\
             <distributionManagement><snapshotRepository><id>s</id><url>u</url></snapshotRepository>\
             </distributionManagement></project>",
        );
        let child = write(
            dir.path(),
            "c/pom.xml",
            "<project><parent><groupId>g</groupId><artifactId>p</artifactId><version>1</version></parent>\
             <artifactId>c</artifactId></project>",
        );

        let settings = ReconcileSettings::default();
        let pattern = TicketPattern::default();
        let resolver = ResolverChain::new();
        let mut cache = LookupCache::default();
        let mut rec = DependencyReconciler::new(&settings, &pattern, &resolver, &mut cache);
        let consumer = ModuleDescriptor::load(&child).unwrap();
        let dm = rec.distribution_for(&consumer).unwrap().unwrap();
        assert!(dm.accepts_snapshots());
        assert_eq!(cache.distribution.len(), 2);
    }

    #[test]
    fn scm_is_inherited_through_resolver_and_memoized() {
        let m2 = TempDir::new().unwrap();
        install(
            m2.path(),
            "io.crowdcode",
            "lib",
            "3.1",
            "<project><parent><groupId>io.crowdcode</groupId><artifactId>lib-parent</artifactId>\
             <version>7</version><relativePath/></parent><artifactId>lib</artifactId><version>3.1</version></project>",
        );
        install(
            m2.path(),
            "io.crowdcode",
            "lib-parent",
            "7",
            "<project><groupId>io.crowdcode</groupId><artifactId>lib-parent</artifactId><version>7</version>\
             <scm><connection>scm:git:https://git.example/lib.git</connection></scm></project>",
        );

        let calls = Cell::new(0);
        let resolver = Counting {
            inner: LocalRepository::new(m2.path()),
            calls: &calls,
        };
        let settings = ReconcileSettings::default();
        let pattern = TicketPattern::default();
        let mut cache = LookupCache::default();
        let mut rec = DependencyReconciler::new(&settings, &pattern, &resolver, &mut cache);

        let lib = ArtifactIdentity::new("io.crowdcode", "lib", "3.1");
        let scm = rec.scm_for(&lib).unwrap().unwrap();
        assert_eq!(scm.clone_url().as_deref(), Some("https://git.example/lib.git"));
        assert_eq!(calls.get(), 2);

        rec.scm_for(&lib).unwrap();
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn unknown_dependency_has_no_scm() {
        let m2 = TempDir::new().unwrap();
        let settings = ReconcileSettings::default();
        let pattern = TicketPattern::default();
        let resolver = LocalRepository::new(m2.path());
        let mut cache = LookupCache::default();
        let mut rec = DependencyReconciler::new(&settings, &pattern, &resolver, &mut cache);
        assert!(
            rec.scm_for(&ArtifactIdentity::new("g", "a", "1"))
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn integration_strips_watched_dependencies_only() {
        let dir = TempDir::new().unwrap();
        let pom = write(
            dir.path(),
            "pom.xml",
            "<project><groupId>g</groupId><artifactId>app</artifactId><version>1.0-SNAPSHOT</version>\
             <properties><lib.version>3.1-NCX-9-SNAPSHOT</lib.version></properties>\
             <dependencies>\
             <dependency><groupId>io.crowdcode</groupId><artifactId>lib</artifactId><version>${lib.version}</version></dependency>\
             <dependency><groupId>io.crowdcode</groupId><artifactId>util</artifactId><version>2.0-NCX-9</version></dependency>\
             <dependency><groupId>org.other</groupId><artifactId>x</artifactId><version>1-NCX-9</version></dependency>\
             </dependencies></project>",
        );
        let settings = ReconcileSettings {
            watched: vec!["io.crowdcode".to_owned()],
            ..ReconcileSettings::default()
        };
        let pattern = TicketPattern::default();
        let resolver = ResolverChain::new();
        let mut cache = LookupCache::default();
        let mut graph = ModuleGraph::load(&pom).unwrap();
        let planned = vec![Some("1.0-SNAPSHOT".to_owned())];
        let mut rec = DependencyReconciler::new(&settings, &pattern, &resolver, &mut cache);
        let root = graph.root();
        let outcome = rec
            .reconcile_module(&mut graph, root, &planned, &BranchPolicy::Strip)
            .unwrap();

        assert!(outcome.needs_persistence);
        let text = fs::read_to_string(&pom).unwrap();
        assert!(text.contains("<lib.version>3.1-SNAPSHOT</lib.version>"));
        assert!(text.contains("<version>${lib.version}</version>"));
        assert!(text.contains("<version>2.0</version>"));
        assert!(text.contains("<version>1-NCX-9</version>"));
    }

    #[test]
    fn strip_leaves_same_artifact_id_of_unwatched_group() {
        let dir = TempDir::new().unwrap();
        let pom = write(
            dir.path(),
            "pom.xml",
            "<project><groupId>g</groupId><artifactId>app</artifactId><version>1.0-SNAPSHOT</version>\
             <dependencies>\
             <dependency><groupId>io.crowdcode</groupId><artifactId>core</artifactId><version>2.0-NCX-9-SNAPSHOT</version></dependency>\
             <dependency><groupId>org.other</groupId><artifactId>core</artifactId><version>5.0-ABC-1</version></dependency>\
             </dependencies></project>",
        );
        let settings = ReconcileSettings {
            watched: vec!["io.crowdcode".to_owned()],
            ..ReconcileSettings::default()
        };
        let pattern = TicketPattern::default();
        let resolver = ResolverChain::new();
        let mut cache = LookupCache::default();
        let mut graph = ModuleGraph::load(&pom).unwrap();
        let planned = vec![Some("1.0-SNAPSHOT".to_owned())];
        let mut rec = DependencyReconciler::new(&settings, &pattern, &resolver, &mut cache);
        let root = graph.root();
        let outcome = rec
            .reconcile_module(&mut graph, root, &planned, &BranchPolicy::Strip)
            .unwrap();

        assert!(outcome.needs_persistence);
        let text = fs::read_to_string(&pom).unwrap();
        assert!(text.contains(
            "<groupId>io.crowdcode</groupId><artifactId>core</artifactId><version>2.0-SNAPSHOT</version>"
        ));
        assert!(text.contains(
            "<groupId>org.other</groupId><artifactId>core</artifactId><version>5.0-ABC-1</version>"
        ));
    }

    #[test]
    fn ticket_without_distribution_management_skips_dependencies() {
        let dir = TempDir::new().unwrap();
        let pom = write(
            dir.path(),
            "pom.xml",
            "<project><groupId>g</groupId><artifactId>app</artifactId><version>1.0-SNAPSHOT</version>\
             <dependencies>\
             <dependency><groupId>io.crowdcode</groupId><artifactId>lib</artifactId><version>3.1</version></dependency>\
             </dependencies></project>",
        );
        let settings = ReconcileSettings {
            watched: vec!["io.crowdcode".to_owned()],
            missing_branch: MissingBranchPolicy::Fail,
            credentials: None,
        };
        let pattern = TicketPattern::default();
        let resolver = ResolverChain::new();
        let mut cache = LookupCache::default();
        let mut graph = ModuleGraph::load(&pom).unwrap();
        let planned = vec![Some("1.0-A-1-SNAPSHOT".to_owned())];
        let mut rec = DependencyReconciler::new(&settings, &pattern, &resolver, &mut cache);
        let root = graph.root();
        let policy = BranchPolicy::Inject {
            ticket: "A-1".to_owned(),
        };
        let outcome = rec
            .reconcile_module(&mut graph, root, &planned, &policy)
            .unwrap();
        assert_eq!(outcome, ReconciliationOutcome::default());
    }
}
