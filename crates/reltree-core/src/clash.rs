//! Version-clash detection: the same module name bound to differing
//! versions anywhere in the flattened tree.

use std::collections::HashMap;

use crate::tree::{DependencyTree, NodeId};

/// All nodes sharing one clashing module name, ascending by version.
#[derive(Debug, Clone)]
pub struct ClashGroup {
    pub name: String,
    pub nodes: Vec<NodeId>,
}

/// A report of every clash in a tree, in flatten order.
///
/// Derived and recomputed on demand, never persisted.
#[derive(Debug, Clone, Default)]
pub struct ClashReport {
    pub groups: Vec<ClashGroup>,
}

impl ClashReport {
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn get(&self, name: &str) -> Option<&ClashGroup> {
        self.groups.iter().find(|g| g.name == name)
    }

    /// Render the report, one line per contributing reference.
    pub fn describe(&self, tree: &DependencyTree) -> String {
        if self.groups.is_empty() {
            return "No version clashes.".to_string();
        }
        let mut out = format!("Version clashes ({}):\n", self.groups.len());
        for group in &self.groups {
            for &id in &group.nodes {
                let node = tree.node(id);
                match node.parent {
                    Some(p) => {
                        let parent = tree.node(p);
                        out.push_str(&format!(
                            "  {}: {} defines {} as {}\n",
                            parent.name,
                            parent.version,
                            node.name,
                            node.path.display()
                        ));
                    }
                    None => out.push_str(&format!(
                        "  {} is the tree root at {}\n",
                        node.name,
                        node.path.display()
                    )),
                }
            }
        }
        out
    }
}

/// Scan the flattened tree (without path dedup) for module names bound to
/// differing versions.
///
/// Groups whose members all agree on one version are discarded. Surviving
/// groups are sorted ascending by the version in each member's path. With
/// `report_warnings`, one diagnostic line is emitted per member naming the
/// parent that contributed it.
pub fn clashes(tree: &DependencyTree, report_warnings: bool) -> ClashReport {
    let flat = tree.flatten(tree.root(), true, false);
    let mut order: Vec<String> = Vec::new();
    let mut by_name: HashMap<String, Vec<NodeId>> = HashMap::new();
    for id in flat {
        let name = tree.node(id).name.clone();
        if !by_name.contains_key(&name) {
            order.push(name.clone());
        }
        by_name.entry(name).or_default().push(id);
    }

    let env = tree.node(tree.root()).env.clone();
    let mut groups = Vec::new();
    for name in order {
        let Some(mut nodes) = by_name.remove(&name) else {
            continue;
        };
        let first_version = tree.node(nodes[0]).version.clone();
        if nodes
            .iter()
            .all(|&id| tree.node(id).version == first_version)
        {
            continue;
        }
        if report_warnings {
            tracing::warn!("releases do not form a consistent set");
            for &id in &nodes {
                let node = tree.node(id);
                match node.parent {
                    Some(p) => {
                        let parent = tree.node(p);
                        tracing::warn!(
                            "{}: {} defines {} as {}",
                            parent.name,
                            parent.version,
                            node.name,
                            node.path.display()
                        );
                    }
                    None => tracing::warn!(
                        "{} is the tree root at {}",
                        node.name,
                        node.path.display()
                    ),
                }
            }
        }
        nodes.sort_by_cached_key(|&id| {
            let tag = tree
                .node(id)
                .path
                .file_name()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            env.release_key(&tag)
        });
        groups.push(ClashGroup { name, nodes });
    }
    ClashReport { groups }
}
