//! The dependency tree: arena storage, recursive construction, traversal.
//!
//! Nodes live in a flat arena indexed by [`NodeId`]. The `children` lists
//! are the owning edges; `parent` is a non-owning back-reference used for
//! upward walks during consistency resolution. A tree is structurally
//! always a tree (no shared node identity): the same module name may appear
//! at several paths under different parents, which is exactly what makes
//! version clashes possible.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};

use reltree_env::Environment;
use reltree_util::errors::{ReltreeError, ReltreeResult};
use reltree_util::fs;

use crate::macros::MacroTable;
use crate::release;

/// Upper bound on nested include splicing.
const MAX_INCLUDE_DEPTH: usize = 16;

/// Macro names that never denote a dependency.
const IGNORED_MACROS: &[&str] = &["TEMPLATE_TOP", "EPICS_BASE"];

/// Index of a node within its tree's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub(crate) usize);

/// A module in the dependency tree.
#[derive(Debug, Clone)]
pub struct ModuleNode {
    /// Module name, e.g. `motor` or `BL15I/MO`. Empty if unresolvable.
    pub name: String,
    /// Release tag, or `work` for a development checkout, or `invalid`.
    pub version: String,
    /// Absolute path of the module root.
    pub path: PathBuf,
    /// Fully substituted macros, in declaration order.
    pub macros: MacroTable,
    /// Raw lines of the primary config file, terminators preserved.
    pub lines: Vec<String>,
    /// Lines spliced in from ancestor or platform override files; read-only
    /// for patching purposes.
    pub extra_lines: Vec<String>,
    /// The primary config file (whether or not it exists).
    pub release_file: PathBuf,
    /// Back-reference; never an owning edge.
    pub parent: Option<NodeId>,
    /// Owning edges, in declaration order.
    pub children: Vec<NodeId>,
    /// Upgrade candidates as `(version, path)`, ascending; populated on
    /// demand by the version resolver.
    pub candidates: Vec<(String, PathBuf)>,
    /// Environment snapshot this node was classified under.
    pub env: Environment,
}

impl fmt::Display for ModuleNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.version)
    }
}

/// Options controlling tree construction.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Process `include` lines in config files.
    pub includes: bool,
    /// Emit diagnostics for missing modules.
    pub warnings: bool,
    /// Restrict upgrade candidates to canonical version tags.
    pub strict: bool,
    /// Platform identifier selecting override files.
    pub host_arch: String,
    /// Explicit per-module allow-sets for candidate enumeration.
    pub pinned: Option<HashMap<String, HashSet<String>>>,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            includes: true,
            warnings: true,
            strict: false,
            host_arch: std::env::var("EPICS_HOST_ARCH")
                .unwrap_or_else(|_| "linux-x86_64".to_string()),
            pinned: None,
        }
    }
}

/// A dependency tree rooted at one module.
#[derive(Debug, Clone)]
pub struct DependencyTree {
    nodes: Vec<ModuleNode>,
    root: NodeId,
    pub options: BuildOptions,
}

impl DependencyTree {
    /// Build the tree for a module root (or a config file named directly).
    ///
    /// Construction is fully synchronous: each node is completely populated,
    /// children included, before its parent continues. Relative paths are
    /// resolved against the referring module's root, never by changing the
    /// process working directory.
    pub fn build(
        module_path: impl AsRef<Path>,
        options: BuildOptions,
        env: Environment,
    ) -> ReltreeResult<Self> {
        let base = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/"));
        let mut tree = Self {
            nodes: Vec::new(),
            root: NodeId(0),
            options,
        };
        let raw = module_path.as_ref().to_string_lossy().into_owned();
        let root = tree.build_node(None, &raw, env, &base)?;
        tree.root = root;
        Ok(tree)
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> &ModuleNode {
        &self.nodes[id.0]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut ModuleNode {
        &mut self.nodes[id.0]
    }

    /// Build a new subtree into this arena under `parent`'s environment,
    /// without attaching it to `parent`'s child list.
    pub fn build_subtree(&mut self, parent: NodeId, path: &Path) -> ReltreeResult<NodeId> {
        let env = self.node(parent).env.clone();
        let base = self.node(parent).path.clone();
        let raw = path.to_string_lossy().into_owned();
        self.build_node(Some(parent), &raw, env, &base)
    }

    fn build_node(
        &mut self,
        parent: Option<NodeId>,
        raw: &str,
        mut env: Environment,
        base: &Path,
    ) -> ReltreeResult<NodeId> {
        let mut path = fs::normalize_module_path(raw, base);

        // Tools and python modules may be referenced through their install
        // "prefix" directory.
        if path.file_name().is_some_and(|n| n == "prefix") {
            if let Some(p) = path.parent() {
                path = p.to_path_buf();
            }
        }

        // A path naming the config file directly pins it; the module root
        // is its grandparent.
        let mut explicit_release = None;
        if path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.ends_with(release::RELEASE_FILE))
        {
            explicit_release = Some(path.clone());
            if let Some(root) = path.parent().and_then(Path::parent) {
                path = root.to_path_buf();
            }
        }
        let release_file = match explicit_release {
            Some(file) => file,
            None => release::locate_release_file(&path, &mut env),
        };

        let (name, version) = env.classify_path(&path);
        let id = NodeId(self.nodes.len());
        self.nodes.push(ModuleNode {
            name,
            version,
            path: path.clone(),
            macros: MacroTable::new(),
            lines: Vec::new(),
            extra_lines: Vec::new(),
            release_file: release_file.clone(),
            parent,
            children: Vec::new(),
            candidates: Vec::new(),
            env: env.clone(),
        });

        if !release_file.is_file() {
            if path.is_dir() {
                // a leaf module with no declared dependencies
                return Ok(id);
            }
            self.nodes[id.0].version = "invalid".to_string();
            if self.options.warnings {
                tracing::warn!(
                    module = %self.nodes[id.0].name,
                    release = %release_file.display(),
                    "can't find module"
                );
            }
            return Ok(id);
        }

        let lines = fs::read_lines(&release_file).map_err(ReltreeError::Io)?;
        let spliced = release::spliced_lines(&release_file, &self.options.host_arch);

        let mut macros = MacroTable::new();
        macros.insert("TOP", ".");
        for line in spliced
            .pre
            .iter()
            .chain(lines.iter())
            .chain(spliced.post.iter())
        {
            self.process_line(line, &mut macros, &mut env, &path, 0);
        }

        {
            let node = &mut self.nodes[id.0];
            node.lines = lines;
            node.extra_lines = spliced.pre.into_iter().chain(spliced.post).collect();
            node.env = env.clone();
        }

        // A module that refers to itself is an example app; stop here.
        if let Some(p) = parent {
            if self.nodes[p.0].name == self.nodes[id.0].name {
                self.nodes[id.0].macros = macros;
                return Ok(id);
            }
        }

        macros.substitute()?;
        self.nodes[id.0].macros = macros.clone();

        let mut area_roots: Vec<PathBuf> = Vec::new();
        for area in ["support", "ioc"] {
            if let Ok(root) = env.dev_area(area) {
                area_roots.push(root);
            }
            if let Ok(root) = env.prod_area(area) {
                area_roots.push(root);
            }
        }

        for macro_name in macros.names().to_vec() {
            let value = macros.get(&macro_name).unwrap_or("").to_string();
            if macro_name == "TOP" || value == "." {
                continue;
            }
            if matches!(value.to_uppercase().as_str(), "YES" | "NO" | "TRUE" | "FALSE") {
                continue;
            }
            if value.contains("python") {
                // manages its own versioning
                continue;
            }
            if value.is_empty() {
                continue;
            }
            let value_path = fs::normalize_module_path(&value, &path);
            if area_roots.iter().any(|root| *root == value_path) {
                // a bare area root denotes "no specific module"
                continue;
            }
            if IGNORED_MACROS.contains(&macro_name.as_str()) {
                continue;
            }
            let child = self.build_node(Some(id), &value, env.clone(), &path)?;
            let child_name = self.nodes[child.0].name.clone();
            if !child_name.is_empty() && child_name != self.nodes[id.0].name {
                self.nodes[id.0].children.push(child);
            }
        }

        Ok(id)
    }

    fn process_line(
        &self,
        line: &str,
        macros: &mut MacroTable,
        env: &mut Environment,
        module_root: &Path,
        depth: usize,
    ) {
        let code = release::strip_comment(line);
        if let Some(target) = release::include_target(code) {
            if self.options.includes && depth < MAX_INCLUDE_DEPTH {
                let fname = macros.expand_once(target);
                let file = fs::normalize_module_path(&fname, module_root);
                // unreadable includes are skipped
                if let Ok(included) = fs::read_lines(&file) {
                    for inner in &included {
                        self.process_line(inner, macros, env, module_root, depth + 1);
                    }
                }
            }
            return;
        }
        if let Some((key, value)) = release::parse_assignment(code) {
            if key == "EPICS_BASE" {
                if let Some(token) = Environment::epics_token(&value) {
                    env.set_epics(token);
                }
            }
            macros.insert(key, value);
        }
    }

    /// Flatten the subtree under `from`, post-order, `from` last.
    ///
    /// With `dedup_by_path` false, a module referenced by two parents
    /// appears once per reference, which is what clash detection needs.
    pub fn flatten(&self, from: NodeId, include_self: bool, dedup_by_path: bool) -> Vec<NodeId> {
        let mut out: Vec<NodeId> = Vec::new();
        for &child in &self.node(from).children {
            for id in self.flatten(child, true, true) {
                let duplicate = dedup_by_path
                    && out.iter().any(|&seen| self.node(seen).path == self.node(id).path);
                if !duplicate {
                    out.push(id);
                }
            }
        }
        if include_self {
            out.push(from);
        }
        out
    }

    /// Render the tree as indented ASCII text.
    pub fn render(&self) -> String {
        let mut out = String::new();
        self.render_node(self.root, 0, &mut out);
        out
    }

    fn render_node(&self, id: NodeId, depth: usize, out: &mut String) {
        let node = self.node(id);
        out.push_str(&format!(
            "{}-{}: {} ({})\n",
            " |".repeat(depth),
            node.name,
            node.version,
            node.path.display()
        ));
        for &child in &node.children {
            self.render_node(child, depth + 1, out);
        }
    }

    /// Collect filesystem paths matching `<module path><glob>` for every
    /// module in the tree, in flatten order.
    pub fn matching_paths(&self, globs: &[&str]) -> Vec<PathBuf> {
        let mut out = Vec::new();
        for id in self.flatten(self.root, true, true) {
            let node = self.node(id);
            for glob in globs {
                let pattern = format!("{}{}", node.path.display(), glob);
                let Ok(compiled) = globset::Glob::new(&pattern) else {
                    continue;
                };
                let matcher = compiled.compile_matcher();
                let depth = glob.trim_matches('/').split('/').count();
                let mut found: Vec<PathBuf> = walkdir::WalkDir::new(&node.path)
                    .max_depth(depth)
                    .into_iter()
                    .filter_map(Result::ok)
                    .filter(|entry| matcher.is_match(entry.path()))
                    .map(walkdir::DirEntry::into_path)
                    .collect();
                found.sort();
                out.extend(found);
            }
        }
        out
    }

    fn subtree_eq(&self, a: NodeId, other: &DependencyTree, b: NodeId) -> bool {
        let left = self.node(a);
        let right = other.node(b);
        if left.name != right.name
            || left.version != right.version
            || left.children.len() != right.children.len()
        {
            return false;
        }
        left.children
            .iter()
            .zip(&right.children)
            .all(|(&x, &y)| self.subtree_eq(x, other, y))
    }
}

/// Trees compare equal when their nodes agree on name, version, and shape.
impl PartialEq for DependencyTree {
    fn eq(&self, other: &Self) -> bool {
        self.subtree_eq(self.root, other, other.root)
    }
}
