//! Updating a tree to the latest versions and rolling back to a consistent
//! set.
//!
//! `TreeUpdate` works on a full copy of the original tree. `find_latest`
//! records the available candidate paths per direct child, `apply_latest`
//! rebuilds each such child at its highest candidate, and `make_consistent`
//! reverts the updated modules one step at a time until no clash remains.
//! Only direct children of the root may be reverted, because only their
//! binding lines are locally owned; a clash on a deeper node walks upward
//! to the child that inherited it.

use std::collections::HashMap;
use std::path::PathBuf;

use reltree_core::clash::{clashes, ClashReport};
use reltree_core::{patch, DependencyTree, NodeId};
use reltree_util::errors::{ReltreeError, ReltreeResult};
use reltree_util::fs;

const CLASHING_INPUT_MSG: &str = "Algorithm not guaranteed to work as the original tree \
has clashes. Manually revert some modules and try again.";
const TOO_MANY_WORK_MSG: &str = "Algorithm fails if too many modules are in work";

/// Options for a tree update run.
#[derive(Debug, Clone, Copy)]
pub struct UpdateOptions {
    /// Rebuild each updatable child at its latest candidate.
    pub update: bool,
    /// Roll versions back until the tree is clash-free.
    pub consistent: bool,
}

impl Default for UpdateOptions {
    fn default() -> Self {
        Self {
            update: true,
            consistent: true,
        }
    }
}

/// A version-update session over a working copy of a tree.
#[derive(Debug)]
pub struct TreeUpdate {
    /// The tree as it was read from disk.
    pub old_tree: DependencyTree,
    /// The working tree, mutated in place.
    pub new_tree: DependencyTree,
    /// Remaining candidate paths per module name; shrinks as reverts apply.
    differences: HashMap<String, Vec<PathBuf>>,
    /// Explanation to attach if no consistent set is reachable.
    failure_context: &'static str,
}

impl TreeUpdate {
    /// Update every direct child of `tree` to its latest version, then
    /// (with `options.consistent`) roll the updates back until the versions
    /// form a consistent set.
    pub fn new(tree: &DependencyTree, options: UpdateOptions) -> ReltreeResult<Self> {
        let failure_context = if clashes(tree, false).is_empty() {
            TOO_MANY_WORK_MSG
        } else {
            CLASHING_INPUT_MSG
        };
        let mut session = Self {
            old_tree: tree.clone(),
            new_tree: tree.clone(),
            differences: HashMap::new(),
            failure_context,
        };
        session.find_latest()?;
        if options.update {
            session.apply_latest()?;
        }
        if options.consistent {
            session.make_consistent()?;
        }
        Ok(session)
    }

    /// Record the available candidate lists for every direct child with
    /// more than one option, and stamp each such child with its
    /// `(version, path)` candidates.
    fn find_latest(&mut self) -> ReltreeResult<()> {
        self.new_tree = self.old_tree.clone();
        self.differences.clear();
        let root = self.new_tree.root();
        for child in self.new_tree.node(root).children.clone() {
            let updates = crate::candidates::updates_from(&self.new_tree, child);
            if updates.len() > 1 {
                let node = self.new_tree.node(child);
                let name = node.name.clone();
                let env = node.env.clone();
                let versions: Vec<(String, PathBuf)> = updates
                    .iter()
                    .map(|path| {
                        let (_, version) = env.classify_path(path);
                        (version, path.clone())
                    })
                    .collect();
                self.differences.insert(name, updates);
                self.new_tree.node_mut(child).candidates = versions;
            }
        }
        Ok(())
    }

    /// Rebuild every recorded child at its highest candidate path.
    fn apply_latest(&mut self) -> ReltreeResult<()> {
        let root = self.new_tree.root();
        for child in self.new_tree.node(root).children.clone() {
            let name = self.new_tree.node(child).name.clone();
            let Some(paths) = self.differences.get(&name) else {
                continue;
            };
            let Some(latest) = paths.last().cloned() else {
                continue;
            };
            let saved = self.new_tree.node(child).candidates.clone();
            let replacement = self.new_tree.build_subtree(root, &latest)?;
            self.new_tree.node_mut(replacement).candidates = saved;
            patch::replace_leaf(&mut self.new_tree, root, child, replacement)?;
        }
        Ok(())
    }

    /// Roll versions back until `clashes` is empty.
    ///
    /// Picks the first clash group and targets its highest-version member.
    /// A member bound directly by the root is reverted one step; a deeper
    /// member walks up toward the root-level child that inherited it. When
    /// a member has nothing left to revert to, the next-highest member of
    /// the same group is tried; an exhausted group is a terminal failure.
    /// An explicit iteration bound guarantees termination.
    pub fn make_consistent(&mut self) -> ReltreeResult<()> {
        let root = self.new_tree.root();
        let node_count = self.new_tree.flatten(root, true, false).len();
        let widest = self
            .differences
            .values()
            .map(Vec::len)
            .max()
            .unwrap_or(1);
        let bound = 64 + 8 * node_count * widest;

        let mut report: ClashReport = clashes(&self.new_tree, false);
        let mut agenda: Option<NodeId> = None;
        let mut back_off: isize = -1;
        let mut iterations = 0usize;

        while !report.is_empty() {
            iterations += 1;
            if iterations > bound {
                return Err(ReltreeError::NoConsistentSet {
                    message: format!(
                        "gave up after {bound} steps. {}",
                        self.failure_context
                    ),
                }
                .into());
            }
            match agenda {
                None => {
                    back_off = -1;
                    let group = &report.groups[0];
                    agenda = group.nodes.last().copied();
                }
                Some(current) => {
                    let parent =
                        self.new_tree
                            .node(current)
                            .parent
                            .ok_or_else(|| ReltreeError::Generic {
                                message: format!(
                                    "Module has no parent: {}",
                                    self.new_tree.node(current)
                                ),
                            })?;
                    if parent != root {
                        // only a local declarer may be rewritten
                        agenda = Some(parent);
                        continue;
                    }
                    if self.revert(current)? {
                        report = clashes(&self.new_tree, false);
                        agenda = None;
                    } else {
                        back_off -= 1;
                        let group = &report.groups[0];
                        let len = group.nodes.len() as isize;
                        if len + back_off < 0 {
                            return Err(ReltreeError::NoConsistentSet {
                                message: format!(
                                    "Cannot revert module: {}. {}",
                                    group.name, self.failure_context
                                ),
                            }
                            .into());
                        }
                        agenda = Some(group.nodes[(len + back_off) as usize]);
                    }
                }
            }
        }
        Ok(())
    }

    /// Revert a root-level child by one version step.
    ///
    /// Returns `Ok(false)` when the child has no recorded options left.
    fn revert(&mut self, leaf: NodeId) -> ReltreeResult<bool> {
        let name = self.new_tree.node(leaf).name.clone();
        let Some(paths) = self.differences.get(&name) else {
            return Ok(false);
        };
        if paths.len() < 2 {
            return Ok(false);
        }
        let target = paths[paths.len() - 2].clone();
        let shortened = paths[..paths.len() - 1].to_vec();
        if shortened.len() < 2 {
            self.differences.remove(&name);
        } else {
            self.differences.insert(name.clone(), shortened);
        }

        let root = self.new_tree.root();
        let saved = self.new_tree.node(leaf).candidates.clone();
        let old_version = self.new_tree.node(leaf).version.clone();
        let replacement = self.new_tree.build_subtree(root, &target)?;
        self.new_tree.node_mut(replacement).candidates = saved;
        tracing::info!(
            "Reverting {} from {} to {}",
            name,
            old_version,
            self.new_tree.node(replacement).version
        );
        patch::replace_leaf(&mut self.new_tree, root, leaf, replacement)?;
        Ok(true)
    }

    /// Remaining candidate paths recorded per module name.
    pub fn recorded_updates(&self) -> &HashMap<String, Vec<PathBuf>> {
        &self.differences
    }

    /// Pairs of `(old line, new line)` that differ between the original and
    /// working root config files.
    pub fn changes(&self) -> Vec<(String, String)> {
        let old = &self.old_tree.node(self.old_tree.root()).lines;
        let new = &self.new_tree.node(self.new_tree.root()).lines;
        old.iter()
            .zip(new.iter())
            .filter(|(a, b)| a != b)
            .map(|(a, b)| (a.clone(), b.clone()))
            .collect()
    }

    /// Render the pending changes the way they would be reported.
    pub fn describe_changes(&self) -> String {
        let mut out = String::new();
        for (old, new) in self.changes() {
            out.push_str(&format!("Change: {old}To:     {new}"));
        }
        out
    }

    /// Back the original config file up to `<file>~` and write the working
    /// tree's lines over it. Returns the backup path.
    pub fn write_changes(&self) -> ReltreeResult<PathBuf> {
        let release = self
            .old_tree
            .node(self.old_tree.root())
            .release_file
            .clone();
        let backup = PathBuf::from(format!("{}~", release.display()));
        if backup.is_file() {
            std::fs::remove_file(&backup).map_err(ReltreeError::Io)?;
        }
        std::fs::copy(&release, &backup).map_err(ReltreeError::Io)?;
        let lines = &self.new_tree.node(self.new_tree.root()).lines;
        fs::write_lines(&release, lines).map_err(ReltreeError::Io)?;
        Ok(backup)
    }
}
