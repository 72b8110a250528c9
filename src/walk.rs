//! Propagating the branch's version policy through the module tree.
//!
//! The walk runs in two phases over the [`ModuleGraph`] arena:
//!
//! 1. **Plan**: in inheritance order (parents first), compute each module's
//!    target effective version. A module with its own version gets the
//!    policy applied to it; a module that inherits takes its parent's target.
//! 2. **Apply**: in post-order (children before their aggregator), patch the
//!    `<parent><version>` of modules whose in-tree parent has a new target,
//!    patch own versions, reconcile watched dependencies, then re-read the
//!    descriptor from disk.
//!
//! Nothing is written when a value already equals its target, so a second
//! run on the same branch changes nothing.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::branch::BranchClass;
use crate::error::{BgavError, Result, ResultExt};
use crate::graph::{ModuleGraph, NodeId};
use crate::pom::Location;
use crate::pom::patch;
use crate::reconcile::DependencyReconciler;
use crate::version::{TicketPattern, strip_ticket};

// ---------------------------------------------------------------------------
// BranchPolicy
// ---------------------------------------------------------------------------

/// What the active branch asks of every version in the tree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BranchPolicy {
    /// Ticket branch: embed `ticket`.
    Inject { ticket: String },
    /// Integration branch: remove ticket ids.
    Strip,
    /// Any other branch: change nothing.
    Leave,
}

impl BranchPolicy {
    /// Policy for a classified branch.
    ///
    /// # Errors
    /// [`BgavError::MissingTicket`] for a ticket branch whose name carries no
    /// ticket id.
    pub fn for_branch(class: BranchClass, branch: &str, pattern: &TicketPattern) -> Result<Self> {
        match class {
            BranchClass::Ticket => pattern
                .extract(branch)
                .map(|ticket| Self::Inject { ticket })
                .ok_or_else(|| BgavError::MissingTicket {
                    branch: branch.to_owned(),
                }),
            BranchClass::Integration => Ok(Self::Strip),
            BranchClass::Unknown => Ok(Self::Leave),
        }
    }

    #[must_use]
    pub fn ticket(&self) -> Option<&str> {
        match self {
            Self::Inject { ticket } => Some(ticket),
            Self::Strip | Self::Leave => None,
        }
    }
}

// ---------------------------------------------------------------------------
// ReconciliationOutcome
// ---------------------------------------------------------------------------

/// What a walk (or part of one) changed on disk.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReconciliationOutcome {
    /// Whether anything was written and must be committed.
    pub needs_persistence: bool,
    /// Artifact ids of modules whose descriptors changed.
    pub changed_artifacts: BTreeSet<String>,
    /// Every file that was written.
    pub touched_files: BTreeSet<PathBuf>,
}

impl ReconciliationOutcome {
    /// Note that `path`, belonging to `artifact`, was rewritten.
    pub fn record(&mut self, path: &Path, artifact: &str) {
        self.needs_persistence = true;
        self.changed_artifacts.insert(artifact.to_owned());
        self.touched_files.insert(path.to_path_buf());
    }

    /// Fold `other` into `self`: logical OR plus set union.
    pub fn merge(&mut self, other: Self) {
        self.needs_persistence |= other.needs_persistence;
        self.changed_artifacts.extend(other.changed_artifacts);
        self.touched_files.extend(other.touched_files);
    }
}

// ---------------------------------------------------------------------------
// ModuleGraphWalker
// ---------------------------------------------------------------------------

/// Applies a [`BranchPolicy`] to every module of a [`ModuleGraph`].
pub struct ModuleGraphWalker<'w, 'r> {
    graph: &'w mut ModuleGraph,
    policy: &'w BranchPolicy,
    pattern: &'w TicketPattern,
    dependencies: DependencyReconciler<'r>,
    planned: Vec<Option<String>>,
}

impl<'w, 'r> ModuleGraphWalker<'w, 'r> {
    pub fn new(
        graph: &'w mut ModuleGraph,
        policy: &'w BranchPolicy,
        pattern: &'w TicketPattern,
        dependencies: DependencyReconciler<'r>,
    ) -> Self {
        Self {
            graph,
            policy,
            pattern,
            dependencies,
            planned: Vec::new(),
        }
    }

    /// Plan and apply the policy to the whole tree.
    ///
    /// # Errors
    /// The first fatal error, annotated with the module it concerns.
    /// Mutations made before the failure stay on disk.
    pub fn walk(mut self) -> Result<ReconciliationOutcome> {
        self.planned = plan(self.graph, self.policy, self.pattern)?;

        let mut outcome = ReconciliationOutcome::default();
        for id in self.graph.post_order() {
            let identity = self.graph.descriptor(id).identity();
            outcome.merge(self.reconcile(id).within(|| format!("module {identity}"))?);
        }
        Ok(outcome)
    }

    #[tracing::instrument(skip_all, fields(module = %self.graph.descriptor(id).identity()))]
    fn reconcile(&mut self, id: NodeId) -> Result<ReconciliationOutcome> {
        let mut outcome = ReconciliationOutcome::default();
        let descriptor = self.graph.descriptor(id).clone();

        if *self.policy != BranchPolicy::Leave {
            if let Some(parent) = self.graph.inheritance_parent(id)
                && let Some(target) = &self.planned[parent.index()]
                && patch::write_value_if_changed(&descriptor.path, &Location::ParentVersion, target)?
            {
                tracing::info!(version = %target, "parent version updated");
                outcome.record(&descriptor.path, &descriptor.artifact_id);
            }

            match (&descriptor.version, &self.planned[id.index()]) {
                (Some(_), Some(target)) => {
                    if patch::write_value_if_changed(
                        &descriptor.path,
                        &Location::ProjectVersion,
                        target,
                    )? {
                        tracing::info!(version = %target, "module version updated");
                        outcome.record(&descriptor.path, &descriptor.artifact_id);
                    }
                }
                (None, Some(inherited)) => {
                    if let BranchPolicy::Inject { ticket } = self.policy
                        && !self.pattern.carries(inherited, ticket)
                    {
                        tracing::warn!(
                            version = %inherited,
                            ticket = %ticket,
                            "inherited version does not carry the ticket id; \
                             the parent is outside this tree"
                        );
                    }
                }
                (_, None) => tracing::debug!("module has no version; nothing to reconcile"),
            }
        }

        outcome.merge(
            self.dependencies
                .reconcile_module(self.graph, id, &self.planned, self.policy)?,
        );
        self.graph.reload(id)?;
        Ok(outcome)
    }
}

/// Target effective version of every module, indexed by [`NodeId::index`].
///
/// # Errors
/// [`BgavError::TicketMismatch`] when a module's own version carries a ticket
/// id other than the branch's.
pub fn plan(
    graph: &ModuleGraph,
    policy: &BranchPolicy,
    pattern: &TicketPattern,
) -> Result<Vec<Option<String>>> {
    let mut planned: Vec<Option<String>> = vec![None; graph.len()];

    for id in graph.inheritance_order()? {
        let descriptor = graph.descriptor(id);
        let target = match (policy, descriptor.version.as_deref()) {
            (BranchPolicy::Leave, _) => descriptor.effective_version().map(ToOwned::to_owned),
            (_, None) => match graph.inheritance_parent(id) {
                Some(parent) => planned[parent.index()].clone(),
                None => descriptor.effective_version().map(ToOwned::to_owned),
            },
            (BranchPolicy::Inject { ticket }, Some(own)) => {
                if let Some(found) = pattern.extract(own)
                    && !pattern.carries(own, ticket)
                {
                    return Err(BgavError::TicketMismatch {
                        module: descriptor.identity().to_string(),
                        found,
                        expected: ticket.clone(),
                    });
                }
                Some(pattern.inject(own, ticket))
            }
            (BranchPolicy::Strip, Some(own)) => Some(if pattern.extract(own).is_some() {
                strip_ticket(own)
            } else {
                own.to_owned()
            }),
        };
        planned[id.index()] = target;
    }
    Ok(planned)
}
