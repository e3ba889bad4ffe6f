//! RELEASE-file location and line-level syntax.
//!
//! The format is line oriented: `#` starts a comment, `KEY = VALUE` binds a
//! macro, and a line whose first characters carry the `include` keyword
//! (but not make's optional `-include`) splices another file in. Platform
//! override files (`RELEASE.<arch>` / `RELEASE.<arch>.Common`) and
//! iocbuilder-generated files pull in extra lines around the primary file.

use std::path::{Path, PathBuf};

use reltree_env::Environment;
use reltree_util::fs;

/// Conventional name of the primary config file.
pub const RELEASE_FILE: &str = "RELEASE";

/// Strip a trailing `#` comment.
pub fn strip_comment(line: &str) -> &str {
    line.split('#').next().unwrap_or("")
}

/// Parse a `KEY = VALUE` assignment; the value is everything right of the
/// first `=`, trimmed.
pub fn parse_assignment(line: &str) -> Option<(String, String)> {
    let (key, value) = line.split_once('=')?;
    Some((key.trim().to_string(), value.trim().to_string()))
}

/// If the line is an include directive, return the referenced file name.
///
/// The keyword must fall within the first 8 characters; the optional
/// `-include` form never counts.
pub fn include_target(line: &str) -> Option<&str> {
    let head = if line.len() >= 8 && line.is_char_boundary(8) {
        &line[..8]
    } else {
        line
    };
    if !head.contains("include") || head.contains("-include") {
        return None;
    }
    line.split_whitespace().nth(1)
}

/// Locate the primary config file for a module root.
///
/// Toolchains older than R3.14 keep it under `config/`, newer ones under
/// `configure/`. A pre-R3.14 version token embedded in the path itself is
/// adopted into the environment first, so later lookups agree with it.
pub fn locate_release_file(root: &Path, env: &mut Environment) -> PathBuf {
    if let Some(token) = Environment::epics_token(&root.to_string_lossy()) {
        if env.with_epics(token.clone()).uses_legacy_config_dir() {
            env.set_epics(token);
        }
    }
    if env.uses_legacy_config_dir() {
        root.join("config").join(RELEASE_FILE)
    } else {
        root.join("configure").join(RELEASE_FILE)
    }
}

/// Lines spliced around the primary file's own lines.
#[derive(Debug, Default)]
pub struct SplicedLines {
    /// From an iocbuilder ancestor project, processed before the primary
    /// lines.
    pub pre: Vec<String>,
    /// From a platform override file, processed after the primary lines.
    pub post: Vec<String>,
}

/// Discover pre- and post-lines for a primary config file.
///
/// A file generated into an `etc/` subtree inherits the owning project's
/// `configure/RELEASE` as pre-lines. A `<file>.<arch>` override beside the
/// (possibly redirected) file contributes post-lines, with the `.Common`
/// variant taking precedence.
pub fn spliced_lines(release_file: &Path, host_arch: &str) -> SplicedLines {
    let mut spliced = SplicedLines::default();

    let mut base = release_file.to_path_buf();
    if let Some(etc_dir) = release_file.parent().and_then(Path::parent) {
        if etc_dir.file_name().is_some_and(|n| n == "etc") {
            if let Some(project) = etc_dir.parent() {
                base = project.join("configure").join(RELEASE_FILE);
                if base.is_file() {
                    spliced.pre = fs::read_lines(&base).unwrap_or_default();
                }
            }
        }
    }

    let arch_file = PathBuf::from(format!("{}.{}", base.display(), host_arch));
    let common_file = PathBuf::from(format!("{}.Common", arch_file.display()));
    if common_file.is_file() {
        spliced.post = fs::read_lines(&common_file).unwrap_or_default();
    } else if arch_file.is_file() {
        spliced.post = fs::read_lines(&arch_file).unwrap_or_default();
    }

    spliced
}
