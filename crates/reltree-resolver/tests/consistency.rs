//! Update and consistency-resolution runs over real directory layouts.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use reltree_core::clash::clashes;
use reltree_core::{BuildOptions, DependencyTree};
use reltree_env::{Environment, SiteConfig};
use reltree_resolver::candidates;
use reltree_resolver::update::{TreeUpdate, UpdateOptions};

fn site(tmp: &TempDir) -> SiteConfig {
    SiteConfig {
        work_root: tmp.path().join("work"),
        prod_root: tmp.path().join("prod"),
        epics_root: tmp.path().join("epics"),
        ..SiteConfig::default()
    }
}

fn env(tmp: &TempDir) -> Environment {
    Environment::with_versions(site(tmp), "R1")
}

fn opts() -> BuildOptions {
    BuildOptions {
        warnings: false,
        host_arch: "linux-x86_64".to_string(),
        ..BuildOptions::default()
    }
}

fn write_release(root: &Path, content: &str) {
    std::fs::create_dir_all(root.join("configure")).unwrap();
    std::fs::write(root.join("configure/RELEASE"), content).unwrap();
}

fn support_work(tmp: &TempDir, name: &str) -> PathBuf {
    let root = tmp.path().join("work/R1/support").join(name);
    std::fs::create_dir_all(&root).unwrap();
    root
}

fn support_prod(tmp: &TempDir, name: &str, version: &str) -> PathBuf {
    let root = tmp.path().join("prod/R1/support").join(name).join(version);
    std::fs::create_dir_all(&root).unwrap();
    root
}

/// Root T pins C at 1-0 and depends on D; D pins C at 2-0; C has releases
/// 1-0, 2-0, 3-0.
fn conflicted_fixture(tmp: &TempDir) -> PathBuf {
    let t = support_work(tmp, "T");
    support_prod(tmp, "C", "1-0");
    let c2 = support_prod(tmp, "C", "2-0");
    support_prod(tmp, "C", "3-0");
    let d = support_prod(tmp, "D", "1-0");
    let support = tmp.path().join("prod/R1/support");
    write_release(&d, &format!("C={}\n", c2.display()));
    write_release(
        &t,
        &format!(
            "SUPPORT={}\nC=$(SUPPORT)/C/1-0\nD=$(SUPPORT)/D/1-0\n",
            support.display()
        ),
    );
    t
}

#[test]
fn possible_paths_are_ascending_and_include_current() {
    let tmp = TempDir::new().unwrap();
    let t = conflicted_fixture(&tmp);
    let tree = DependencyTree::build(&t, opts(), env(&tmp)).unwrap();
    let c = tree.node(tree.root()).children[0];
    assert_eq!(tree.node(c).name, "C");

    let paths = candidates::possible_paths(&tree, c);
    let tags: Vec<_> = paths
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(tags, vec!["1-0", "2-0", "3-0"]);
}

#[test]
fn updates_start_at_current_version() {
    let tmp = TempDir::new().unwrap();
    let t = support_work(&tmp, "T");
    support_prod(&tmp, "C", "1-0");
    let c2 = support_prod(&tmp, "C", "2-0");
    support_prod(&tmp, "C", "3-0");
    write_release(&t, &format!("C={}\n", c2.display()));

    let tree = DependencyTree::build(&t, opts(), env(&tmp)).unwrap();
    let c = tree.node(tree.root()).children[0];
    let tags: Vec<_> = candidates::updates_from(&tree, c)
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(tags, vec!["2-0", "3-0"]);
}

#[test]
fn tarballs_are_never_candidates() {
    let tmp = TempDir::new().unwrap();
    let t = support_work(&tmp, "T");
    let c1 = support_prod(&tmp, "C", "1-0");
    std::fs::write(
        tmp.path().join("prod/R1/support/C/C-2-0.tar.gz"),
        "not a release",
    )
    .unwrap();
    write_release(&t, &format!("C={}\n", c1.display()));

    let tree = DependencyTree::build(&t, opts(), env(&tmp)).unwrap();
    let c = tree.node(tree.root()).children[0];
    assert_eq!(candidates::possible_paths(&tree, c).len(), 1);
}

#[test]
fn strict_mode_filters_non_canonical_tags() {
    let tmp = TempDir::new().unwrap();
    let t = support_work(&tmp, "T");
    let c1 = support_prod(&tmp, "C", "1-0");
    support_prod(&tmp, "C", "2-0beta1");
    support_prod(&tmp, "C", "2-0");
    write_release(&t, &format!("C={}\n", c1.display()));

    let strict = BuildOptions {
        strict: true,
        ..opts()
    };
    let tree = DependencyTree::build(&t, strict, env(&tmp)).unwrap();
    let c = tree.node(tree.root()).children[0];
    let tags: Vec<_> = candidates::possible_paths(&tree, c)
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(tags, vec!["1-0", "2-0"]);
}

#[test]
fn pinned_allow_set_restricts_candidates() {
    let tmp = TempDir::new().unwrap();
    let t = support_work(&tmp, "T");
    let c1 = support_prod(&tmp, "C", "1-0");
    support_prod(&tmp, "C", "2-0");
    support_prod(&tmp, "C", "3-0");
    write_release(&t, &format!("C={}\n", c1.display()));

    let mut pinned: HashMap<String, HashSet<String>> = HashMap::new();
    pinned.insert(
        "C".to_string(),
        ["1-0", "2-0"].iter().map(|s| s.to_string()).collect(),
    );
    let options = BuildOptions {
        pinned: Some(pinned),
        ..opts()
    };
    let tree = DependencyTree::build(&t, options, env(&tmp)).unwrap();
    let c = tree.node(tree.root()).children[0];
    let tags: Vec<_> = candidates::updates_from(&tree, c)
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(tags, vec!["1-0", "2-0"]);

    let session = TreeUpdate::new(
        &tree,
        UpdateOptions {
            update: true,
            consistent: false,
        },
    )
    .unwrap();
    let new_root = session.new_tree.root();
    let c = session.new_tree.node(new_root).children[0];
    assert_eq!(session.new_tree.node(c).version, "2-0");
}

#[test]
fn apply_latest_takes_the_highest_candidate() {
    let tmp = TempDir::new().unwrap();
    let t = conflicted_fixture(&tmp);
    let tree = DependencyTree::build(&t, opts(), env(&tmp)).unwrap();

    let session = TreeUpdate::new(
        &tree,
        UpdateOptions {
            update: true,
            consistent: false,
        },
    )
    .unwrap();
    let root = session.new_tree.root();
    let c = session.new_tree.node(root).children[0];
    assert_eq!(session.new_tree.node(c).version, "3-0");
    // the candidate list rides along on the replacement
    assert_eq!(session.new_tree.node(c).candidates.len(), 3);
    assert!(session.recorded_updates().contains_key("C"));
    // D has a single release, so it is left alone
    let d = session.new_tree.node(root).children[1];
    assert_eq!(session.new_tree.node(d).version, "1-0");
}

#[test]
fn make_consistent_converges_on_the_shared_lower_version() {
    let tmp = TempDir::new().unwrap();
    let t = conflicted_fixture(&tmp);
    let tree = DependencyTree::build(&t, opts(), env(&tmp)).unwrap();
    assert!(!clashes(&tree, false).is_empty());

    let session = TreeUpdate::new(&tree, UpdateOptions::default()).unwrap();
    assert!(clashes(&session.new_tree, false).is_empty());

    let root = session.new_tree.root();
    let c = session.new_tree.node(root).children[0];
    assert_eq!(session.new_tree.node(c).version, "2-0");
    let d = session.new_tree.node(root).children[1];
    let c_via_d = session.new_tree.node(d).children[0];
    assert_eq!(session.new_tree.node(c_via_d).version, "2-0");

    let changes = session.changes();
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].0, "C=$(SUPPORT)/C/1-0\n");
    assert_eq!(changes[0].1, "C=$(SUPPORT)/C/2-0\n");
    assert!(session
        .describe_changes()
        .contains("To:     C=$(SUPPORT)/C/2-0"));
}

#[test]
fn exhausted_reverts_are_a_terminal_failure() {
    let tmp = TempDir::new().unwrap();
    let t = support_work(&tmp, "T");
    let c1 = support_prod(&tmp, "C", "1-0");
    let c3 = support_prod(&tmp, "C", "3-0");
    let d = support_prod(&tmp, "D", "1-0");
    write_release(&d, &format!("C={}\n", c1.display()));
    write_release(&t, &format!("C={}\nD={}\n", c3.display(), d.display()));

    let tree = DependencyTree::build(&t, opts(), env(&tmp)).unwrap();
    let err = TreeUpdate::new(&tree, UpdateOptions::default()).unwrap_err();
    let message = format!("{err:?}");
    assert!(message.contains("Cannot revert"), "got: {message}");
}

#[test]
fn write_changes_backs_up_and_rewrites() {
    let tmp = TempDir::new().unwrap();
    let t = conflicted_fixture(&tmp);
    let original = std::fs::read_to_string(t.join("configure/RELEASE")).unwrap();
    let tree = DependencyTree::build(&t, opts(), env(&tmp)).unwrap();

    let session = TreeUpdate::new(&tree, UpdateOptions::default()).unwrap();
    let backup = session.write_changes().unwrap();

    assert_eq!(std::fs::read_to_string(&backup).unwrap(), original);
    let rewritten = std::fs::read_to_string(t.join("configure/RELEASE")).unwrap();
    assert!(rewritten.contains("C=$(SUPPORT)/C/2-0\n"));
    assert!(rewritten.contains("D=$(SUPPORT)/D/1-0\n"));
}

#[test]
fn already_consistent_trees_are_untouched_by_consistency() {
    let tmp = TempDir::new().unwrap();
    let t = support_work(&tmp, "T");
    let c1 = support_prod(&tmp, "C", "1-0");
    write_release(&t, &format!("C={}\n", c1.display()));

    let tree = DependencyTree::build(&t, opts(), env(&tmp)).unwrap();
    let session = TreeUpdate::new(
        &tree,
        UpdateOptions {
            update: false,
            consistent: true,
        },
    )
    .unwrap();
    assert_eq!(session.new_tree, tree);
    assert!(session.changes().is_empty());
}
