//! Enumeration of the release versions available for a module.

use std::path::PathBuf;

use reltree_core::{DependencyTree, NodeId};

/// List every path this module could be bound to, ascending by version.
///
/// Candidates are the sibling version directories under the module's
/// production area root. Tarballs are skipped, and in strict mode so is any
/// directory whose name is not a canonical version tag. When the caller
/// supplied an allow-set for this module name, only directories named in it
/// qualify and the node's current path is excluded; otherwise the current
/// path is always a candidate.
pub fn possible_paths(tree: &DependencyTree, id: NodeId) -> Vec<PathBuf> {
    let node = tree.node(id);
    let env = &node.env;
    let area = if node.path.to_string_lossy().contains("ioc") {
        "ioc"
    } else {
        "support"
    };
    let Ok(prod) = env.prod_area(area) else {
        return vec![node.path.clone()];
    };
    let prefix = prod.join(&node.name);

    let allowed = tree
        .options
        .pinned
        .as_ref()
        .and_then(|pinned| pinned.get(&node.name));
    let mut paths: Vec<PathBuf> = Vec::new();
    if prefix.is_dir() {
        if let Ok(entries) = std::fs::read_dir(&prefix) {
            for entry in entries.flatten() {
                let version = entry.file_name().to_string_lossy().into_owned();
                match allowed {
                    Some(set) => {
                        if set.contains(&version) {
                            paths.push(prefix.join(version));
                        }
                    }
                    None => {
                        if version.contains(".tar.gz") {
                            continue;
                        }
                        if !tree.options.strict || env.is_canonical_tag(&version) {
                            paths.push(prefix.join(version));
                        }
                    }
                }
            }
        }
    }
    if allowed.is_none() && !paths.contains(&node.path) {
        paths.insert(0, node.path.clone());
    }
    env.sort_releases(paths)
}

/// The candidate paths that count as updates: the suffix of
/// [`possible_paths`] from the node's current path onward. When an explicit
/// allow-set was supplied, every candidate is returned regardless of how it
/// orders against the current version.
pub fn updates_from(tree: &DependencyTree, id: NodeId) -> Vec<PathBuf> {
    let paths = possible_paths(tree, id);
    if tree.options.pinned.is_some() {
        return paths;
    }
    let current = &tree.node(id).path;
    match paths.iter().position(|p| p == current) {
        Some(index) => paths[index..].to_vec(),
        None => paths,
    }
}
