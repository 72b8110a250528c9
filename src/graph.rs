//! The module tree of a project, held in an arena.
//!
//! Built once from the root descriptor by following `<modules>` declarations
//! with an explicit worklist. Nodes refer to each other by [`NodeId`]; the
//! walker re-reads a node's descriptor from disk after patching it.

use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};

use crate::error::{BgavError, Result};
use crate::pom::ModuleDescriptor;

/// Index of a module in its [`ModuleGraph`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

/// One module of the tree.
#[derive(Clone, Debug)]
pub struct ModuleNode {
    pub descriptor: ModuleDescriptor,
    /// The aggregator that declared this module; `None` for the root.
    pub aggregator: Option<NodeId>,
    /// Declared sub-modules, in declaration order.
    pub children: Vec<NodeId>,
}

/// Arena of the modules reachable from a root descriptor.
#[derive(Clone, Debug)]
pub struct ModuleGraph {
    nodes: Vec<ModuleNode>,
}

impl ModuleGraph {
    /// Load the root descriptor and every declared sub-module below it.
    ///
    /// # Errors
    /// Unreadable or malformed descriptors; [`BgavError::ModuleCycle`] if a
    /// descriptor is reached twice.
    pub fn load(root_descriptor: &Path) -> Result<Self> {
        let mut nodes: Vec<ModuleNode> = Vec::new();
        let mut seen: HashSet<PathBuf> = HashSet::new();
        let mut queue: VecDeque<(PathBuf, Option<NodeId>)> = VecDeque::new();
        queue.push_back((root_descriptor.to_path_buf(), None));

        while let Some((path, aggregator)) = queue.pop_front() {
            let canonical = path.canonicalize().map_err(|e| BgavError::io(&path, e))?;
            if !seen.insert(canonical.clone()) {
                return Err(BgavError::ModuleCycle { path });
            }
            let descriptor = ModuleDescriptor::load(&canonical)?;
            let id = NodeId(nodes.len());
            tracing::trace!(module = %descriptor.identity(), path = %canonical.display(), "loaded module");
            for child in descriptor.module_descriptor_paths() {
                queue.push_back((child, Some(id)));
            }
            if let Some(agg) = aggregator {
                nodes[agg.0].children.push(id);
            }
            nodes.push(ModuleNode {
                descriptor,
                aggregator,
                children: Vec::new(),
            });
        }

        tracing::debug!(modules = nodes.len(), "module tree loaded");
        Ok(Self { nodes })
    }

    #[must_use]
    pub const fn root(&self) -> NodeId {
        NodeId(0)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    #[must_use]
    pub fn descriptor(&self, id: NodeId) -> &ModuleDescriptor {
        &self.nodes[id.0].descriptor
    }

    pub fn ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        (0..self.nodes.len()).map(NodeId)
    }

    /// Every descriptor path in the tree.
    pub fn descriptor_paths(&self) -> impl Iterator<Item = &Path> + '_ {
        self.nodes.iter().map(|n| n.descriptor.path.as_path())
    }

    /// Children before their aggregator, siblings in declaration order.
    #[must_use]
    pub fn post_order(&self) -> Vec<NodeId> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![(self.root(), false)];
        while let Some((id, expanded)) = stack.pop() {
            if expanded {
                order.push(id);
                continue;
            }
            stack.push((id, true));
            for &child in self.nodes[id.0].children.iter().rev() {
                stack.push((child, false));
            }
        }
        order
    }

    /// The module with effective `group:artifact`, if it is in this tree.
    #[must_use]
    pub fn find(&self, group_id: &str, artifact_id: &str) -> Option<NodeId> {
        self.ids().find(|&id| {
            let d = self.descriptor(id);
            d.artifact_id == artifact_id && d.effective_group_id() == Some(group_id)
        })
    }

    /// The in-tree module this module inherits from via `<parent>`.
    #[must_use]
    pub fn inheritance_parent(&self, id: NodeId) -> Option<NodeId> {
        let parent = self.descriptor(id).parent.as_ref()?;
        self.find(&parent.group_id, &parent.artifact_id)
            .filter(|&found| found != id)
    }

    /// Inheritance parents before children; modules whose parent is outside
    /// the tree come first.
    ///
    /// # Errors
    /// [`BgavError::ModuleCycle`] if `<parent>` references form a cycle.
    pub fn inheritance_order(&self) -> Result<Vec<NodeId>> {
        let mut placed = vec![false; self.nodes.len()];
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut pending: Vec<NodeId> = self.ids().collect();

        while !pending.is_empty() {
            let before = pending.len();
            pending.retain(|&id| {
                let ready = self
                    .inheritance_parent(id)
                    .is_none_or(|parent| placed[parent.0]);
                if ready {
                    placed[id.0] = true;
                    order.push(id);
                }
                !ready
            });
            if pending.len() == before {
                return Err(BgavError::ModuleCycle {
                    path: self.descriptor(pending[0]).path.clone(),
                });
            }
        }
        Ok(order)
    }

    /// Re-read a module's descriptor from disk.
    ///
    /// # Errors
    /// Unreadable or malformed descriptor.
    pub fn reload(&mut self, id: NodeId) -> Result<&ModuleDescriptor> {
        let node = &mut self.nodes[id.0];
        node.descriptor = ModuleDescriptor::load(&node.descriptor.path)?;
        Ok(&node.descriptor)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;

    fn pom(dir: &Path, rel: &str, body: &str) {
        let path = dir.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, body).unwrap();
    }

    fn tree() -> TempDir {
        let dir = TempDir::new().unwrap();
        pom(
            dir.path(),
            "pom.xml",
            "<project><groupId>g</groupId><artifactId>root</artifactId><version>1</version>\
             <modules><module>a</module><module>b</module></modules></project>",
        );
        pom(
            dir.path(),
            "a/pom.xml",
            "<project><parent><groupId>g</groupId><artifactId>root</artifactId><version>1</version></parent>\
             <artifactId>a</artifactId><modules><module>a1</module></modules></project>",
        );
        pom(
            dir.path(),
            "a/a1/pom.xml",
            "<project><parent><groupId>g</groupId><artifactId>a</artifactId><version>1</version></parent>\
             <artifactId>a1</artifactId></project>",
        );
        pom(
            dir.path(),
            "b/pom.xml",
            "<project><parent><groupId>g</groupId><artifactId>a1</artifactId><version>1</version></parent>\
             <artifactId>b</artifactId></project>",
        );
        dir
    }

    fn artifacts(graph: &ModuleGraph, ids: &[NodeId]) -> Vec<String> {
        ids.iter()
            .map(|&id| graph.descriptor(id).artifact_id.clone())
            .collect()
    }

    #[test]
    fn post_order_visits_children_first() {
        let dir = tree();
        let graph = ModuleGraph::load(&dir.path().join("pom.xml")).unwrap();
        assert_eq!(graph.len(), 4);
        assert_eq!(artifacts(&graph, &graph.post_order()), ["a1", "a", "b", "root"]);
    }

    #[test]
    fn inheritance_order_puts_parents_first() {
        let dir = tree();
        let graph = ModuleGraph::load(&dir.path().join("pom.xml")).unwrap();
        let order = artifacts(&graph, &graph.inheritance_order().unwrap());
        let pos = |name: &str| order.iter().position(|a| a == name).unwrap();
        assert!(pos("root") < pos("a"));
        assert!(pos("a") < pos("a1"));
        assert!(pos("a1") < pos("b"));
    }

    #[test]
    fn find_uses_effective_group() {
        let dir = tree();
        let graph = ModuleGraph::load(&dir.path().join("pom.xml")).unwrap();
        let a1 = graph.find("g", "a1").unwrap();
        assert_eq!(
            graph.descriptor(graph.inheritance_parent(a1).unwrap()).artifact_id,
            "a"
        );
        assert!(graph.find("other", "a1").is_none());
    }

    #[test]
    fn missing_module_is_an_io_error() {
        let dir = TempDir::new().unwrap();
        pom(
            dir.path(),
            "pom.xml",
            "<project><artifactId>root</artifactId><modules><module>gone</module></modules></project>",
        );
        let err = ModuleGraph::load(&dir.path().join("pom.xml")).unwrap_err();
        assert!(matches!(err, BgavError::Io { .. }), "{err}");
    }

    #[test]
    fn self_referencing_module_is_a_cycle() {
        let dir = TempDir::new().unwrap();
        pom(
            dir.path(),
            "pom.xml",
            "<project><artifactId>root</artifactId><modules><module>.</module></modules></project>",
        );
        let err = ModuleGraph::load(&dir.path().join("pom.xml")).unwrap_err();
        assert!(matches!(err, BgavError::ModuleCycle { .. }), "{err}");
    }

    #[test]
    fn reload_reflects_disk() {
        let dir = tree();
        let mut graph = ModuleGraph::load(&dir.path().join("pom.xml")).unwrap();
        pom(
            dir.path(),
            "pom.xml",
            "<project><groupId>g</groupId><artifactId>root</artifactId><version>2</version></project>",
        );
        let root = graph.root();
        assert_eq!(graph.reload(root).unwrap().version.as_deref(), Some("2"));
    }
}
