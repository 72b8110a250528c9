//! One end-to-end reconciliation run.
//!
//! A [`ReconciliationSession`] validates configuration, resolves and
//! classifies the branch, checks that no descriptor has local changes, walks
//! the module tree, stamps JSON side files, and finally commits and pushes
//! whatever changed. Memo tables live in the session and die with it.

use std::path::{Path, PathBuf};

use bgav_git::{Credentials, GitError, GitOid, GitRepo, GixRepo, HeadState};

use crate::branch::{BranchClass, normalize_branch_name};
use crate::config::BgavConfig;
use crate::error::{BgavError, Persistence, Result};
use crate::graph::ModuleGraph;
use crate::modify;
use crate::pom::ProjectResolver;
use crate::reconcile::{DependencyReconciler, LookupCache, ReconcileSettings};
use crate::walk::{BranchPolicy, ModuleGraphWalker, ReconciliationOutcome};

/// Per-invocation inputs that are not part of `bgav.toml`.
#[derive(Clone, Debug)]
pub struct RunOptions {
    /// Directory holding the root `pom.xml`.
    pub project_dir: PathBuf,
    /// Branch name to use instead of asking git (detached CI checkouts).
    pub branch_override: Option<String>,
    /// Credentials for HTTP(S) clone and push.
    pub credentials: Option<Credentials>,
}

impl RunOptions {
    #[must_use]
    pub fn new(project_dir: impl Into<PathBuf>) -> Self {
        Self {
            project_dir: project_dir.into(),
            branch_override: None,
            credentials: None,
        }
    }
}

/// What a session did.
#[derive(Clone, Debug, Default)]
pub struct SessionReport {
    /// The resolved branch; `None` outside a git repository.
    pub branch: Option<String>,
    pub class: Option<BranchClass>,
    pub policy: Option<BranchPolicy>,
    pub outcome: ReconciliationOutcome,
    /// The correction commit, if one was made.
    pub commit: Option<GitOid>,
    pub pushed: bool,
}

/// Commit message for a correction made under `policy`.
#[must_use]
pub fn commit_message(policy: &BranchPolicy) -> String {
    match policy {
        BranchPolicy::Inject { ticket } => {
            format!("{ticket} - BGAV - set correct branched version")
        }
        BranchPolicy::Strip => "BGAV - remove ticket id from version".to_owned(),
        BranchPolicy::Leave => "BGAV - update versions".to_owned(),
    }
}

/// Orchestrates one run.
pub struct ReconciliationSession {
    config: BgavConfig,
    options: RunOptions,
    resolver: Box<dyn ProjectResolver>,
}

impl ReconciliationSession {
    /// A session resolving descriptors through the sources named in `config`.
    #[must_use]
    pub fn new(config: BgavConfig, options: RunOptions) -> Self {
        let resolver = Box::new(config.resolver());
        Self {
            config,
            options,
            resolver,
        }
    }

    /// Replace the descriptor resolver.
    #[must_use]
    pub fn with_resolver(mut self, resolver: impl ProjectResolver + 'static) -> Self {
        self.resolver = Box::new(resolver);
        self
    }

    /// Run the session.
    ///
    /// # Errors
    /// Any fatal condition; descriptors already written stay written. With
    /// `fail_on_mutation`, [`BgavError::MutationRequired`] once corrections
    /// have been persisted as far as the git settings allow.
    ///
    /// Artifact lookups are memoized for the duration of one call only, so
    /// repeated runs see dependency branches created in between.
    pub fn run(&self) -> Result<SessionReport> {
        let classifier = self.config.classifier()?;
        let pattern = self.config.ticket_pattern()?;
        let mut report = SessionReport::default();

        let root_pom = self.options.project_dir.join("pom.xml");
        if !root_pom.is_file() {
            return Err(BgavError::io(
                &root_pom,
                std::io::Error::new(std::io::ErrorKind::NotFound, "no root descriptor"),
            ));
        }

        let git = match GixRepo::discover(&self.options.project_dir) {
            Ok(git) => git,
            Err(GitError::NotARepository { path, .. }) => {
                tracing::info!(path = %path.display(), "not a git repository; nothing to do");
                return Ok(report);
            }
            Err(e) => return Err(BgavError::git("opening repository", e)),
        };

        let branch = self.resolve_branch(&git)?;
        let class = classifier.classify(&branch);
        let policy = BranchPolicy::for_branch(class, &branch, &pattern)?;
        tracing::info!(
            branch = %branch,
            class = %class,
            ticket = policy.ticket().unwrap_or("-"),
            "branch classified"
        );
        if policy == BranchPolicy::Leave {
            tracing::info!("neither a ticket nor an integration branch; versions stay as they are");
        }
        report.branch = Some(branch.clone());
        report.class = Some(class);
        report.policy = Some(policy.clone());

        let mut graph = ModuleGraph::load(&root_pom)?;
        ensure_clean(&git, graph.descriptor_paths())?;

        let settings = ReconcileSettings {
            watched: self.config.dependencies.watched.clone(),
            missing_branch: self.config.dependencies.missing_branch,
            credentials: self.options.credentials.clone(),
        };
        let mut cache = LookupCache::default();
        let dependencies =
            DependencyReconciler::new(&settings, &pattern, self.resolver.as_ref(), &mut cache);
        let mut outcome = ModuleGraphWalker::new(&mut graph, &policy, &pattern, dependencies).walk()?;

        let root_version = graph.descriptor(graph.root()).effective_version();
        outcome.merge(modify::apply_all(
            &self.options.project_dir,
            &self.config.modify,
            root_version,
        )?);

        report.outcome = outcome;
        self.persist(&git, &branch, &policy, &mut report)?;
        Ok(report)
    }

    fn resolve_branch(&self, git: &GixRepo) -> Result<String> {
        let remote = self.config.git.remote.as_str();
        if let Some(name) = self
            .options
            .branch_override
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
        {
            tracing::debug!(branch = name, "using branch override");
            return Ok(normalize_branch_name(name, remote).to_owned());
        }

        match git.head().map_err(|e| BgavError::git("reading HEAD", e))? {
            HeadState::Branch(name) => Ok(name),
            HeadState::Detached(oid) => {
                let candidates = git
                    .branches_at(oid)
                    .map_err(|e| BgavError::git("listing branches", e))?;
                let Some(found) = candidates.first() else {
                    return Err(BgavError::BranchUnavailable {
                        reason: format!(
                            "HEAD is detached at {oid} and no branch points there; \
                             pass the branch name explicitly"
                        ),
                    });
                };
                tracing::info!(%oid, branch = %found, "detached HEAD; using branch at the same commit");
                Ok(found.name.clone())
            }
        }
    }

    fn persist(
        &self,
        git: &GixRepo,
        branch: &str,
        policy: &BranchPolicy,
        report: &mut SessionReport,
    ) -> Result<()> {
        let outcome = &report.outcome;
        if !outcome.needs_persistence {
            tracing::info!("versions already match the branch");
            return Ok(());
        }
        let git_config = &self.config.git;

        if git_config.suppress_commit {
            tracing::warn!(
                files = outcome.touched_files.len(),
                "commit suppressed; corrected files left in the working tree"
            );
        } else {
            let paths: Vec<&Path> = outcome.touched_files.iter().map(PathBuf::as_path).collect();
            git.add(&paths)
                .map_err(|e| BgavError::git("staging corrected files", e))?;
            let oid = git
                .commit(&commit_message(policy))
                .map_err(|e| BgavError::git("committing corrected files", e))?;
            tracing::info!(%oid, files = paths.len(), "committed corrected versions");
            report.commit = Some(oid);

            if git_config.suppress_push {
                tracing::info!("push suppressed");
            } else {
                let refspec = format!("HEAD:refs/heads/{branch}");
                git.push(
                    &git_config.remote,
                    &refspec,
                    self.options.credentials.as_ref(),
                )
                .map_err(|e| BgavError::git(format!("pushing to {}", git_config.remote), e))?;
                tracing::info!(remote = %git_config.remote, %refspec, "pushed correction");
                report.pushed = true;
            }
        }

        if git_config.fail_on_mutation {
            let persisted = match (report.commit, report.pushed) {
                (None, _) => Persistence::Uncommitted,
                (Some(_), false) => Persistence::Committed,
                (Some(_), true) => Persistence::Pushed,
            };
            return Err(BgavError::MutationRequired {
                artifacts: report.outcome.changed_artifacts.iter().cloned().collect(),
                persisted,
            });
        }
        Ok(())
    }
}

/// Refuse to run over descriptors with uncommitted changes.
fn ensure_clean<'p>(git: &GixRepo, paths: impl Iterator<Item = &'p Path>) -> Result<()> {
    for path in paths {
        if git
            .is_modified(path)
            .map_err(|e| BgavError::git("reading working-tree status", e))?
        {
            return Err(BgavError::DirtyDescriptor {
                path: path.to_path_buf(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commit_messages_per_policy() {
        assert_eq!(
            commit_message(&BranchPolicy::Inject {
                ticket: "NCX-9".to_owned()
            }),
            "NCX-9 - BGAV - set correct branched version"
        );
        assert_eq!(
            commit_message(&BranchPolicy::Strip),
            "BGAV - remove ticket id from version"
        );
    }

    #[test]
    fn missing_root_descriptor_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let session = ReconciliationSession::new(BgavConfig::default(), RunOptions::new(dir.path()));
        assert!(matches!(session.run(), Err(BgavError::Io { .. })));
    }

    #[test]
    fn invalid_pattern_fails_before_anything_else() {
        let dir = tempfile::tempdir().unwrap();
        let config = BgavConfig::parse("[branches]\nintegration = \"(\"\n").unwrap();
        let session = ReconciliationSession::new(config, RunOptions::new(dir.path()));
        assert!(matches!(session.run(), Err(BgavError::Config(_))));
    }
}
