//! Rewriting a parent's stored config line when a child's bound path
//! changes.
//!
//! The authoritative text (the node's stored lines) and the resolved macro
//! model are kept synchronized: a committed replacement updates exactly one
//! line, the macro table entry, and the child slot, preserving position.
//! Only the locally defined reference to a module may be rewritten; a
//! binding inherited through an include or override file is refused.

use reltree_util::errors::{ReltreeError, ReltreeResult};
use reltree_util::fs;

use crate::macros::MacroTable;
use crate::release;
use crate::tree::{DependencyTree, NodeId};

/// Replace `old_child` with `new_child` in `parent`'s child list, rewriting
/// the config line that binds it.
///
/// Returns `Ok(true)` when the replacement was committed and `Ok(false)`
/// when it was refused (the binding is not locally owned, or the line does
/// not carry the expected path); on refusal the tree is left untouched.
/// Passing a child that is not a member of `parent` is a hard error.
pub fn replace_leaf(
    tree: &mut DependencyTree,
    parent: NodeId,
    old_child: NodeId,
    new_child: NodeId,
) -> ReltreeResult<bool> {
    let position = tree
        .node(parent)
        .children
        .iter()
        .position(|&c| c == old_child)
        .ok_or_else(|| ReltreeError::NotListed {
            path: tree.node(old_child).path.display().to_string(),
        })?;

    let parent_path = tree.node(parent).path.clone();
    let release_file = tree.node(parent).release_file.clone();
    let old_path = tree.node(old_child).path.display().to_string();
    let new_path = tree.node(new_child).path.display().to_string();

    // the macro whose resolved value binds the old path
    let macro_name = tree
        .node(parent)
        .macros
        .iter()
        .find(|(_, value)| fs::normalize_module_path(value, &parent_path) == tree.node(old_child).path)
        .map(|(name, _)| name.to_string());
    let Some(macro_name) = macro_name else {
        tracing::warn!(
            "No macro in {} resolves to {}",
            release_file.display(),
            old_path
        );
        return Ok(false);
    };

    // The last definition wins, and only the primary file may be rewritten;
    // a binding that only comes from spliced lines is refused.
    let Some((index, line)) = find_definition(&tree.node(parent).lines, &macro_name) else {
        tracing::warn!(
            "Cannot update {} as macro {} is not defined in it",
            release_file.display(),
            macro_name
        );
        return Ok(false);
    };

    let code = release::strip_comment(&line);
    let Some((_, raw_value)) = release::parse_assignment(code) else {
        return Ok(false);
    };
    let resolved_value = tree.node(parent).macros.resolve_text(&raw_value);
    let new_line = line.replace(&raw_value, &resolved_value);
    if !new_line.contains(&old_path) {
        tracing::warn!(
            "Module path {} should be in this line: {}",
            old_path,
            new_line.trim_end()
        );
        return Ok(false);
    }
    let new_line = new_line.replace(&old_path, &new_path);
    let folded = refold_macros(&tree.node(parent).macros, &new_line, &[macro_name.as_str()]);

    let parent_node = tree.node_mut(parent);
    parent_node.children[position] = new_child;
    parent_node.lines[index] = folded;
    parent_node.macros.insert(macro_name, new_path);
    tree.node_mut(new_child).parent = Some(parent);
    Ok(true)
}

/// Find the last line defining `macro_name`, comments stripped.
fn find_definition(lines: &[String], macro_name: &str) -> Option<(usize, String)> {
    for (i, line) in lines.iter().enumerate().rev() {
        let code = release::strip_comment(line);
        if let Some((key, _)) = release::parse_assignment(code) {
            if key == macro_name {
                return Some((i, line.clone()));
            }
        }
    }
    None
}

/// Fold known macro values back into `$(NAME)` references when they are a
/// proper prefix of the line's value text, longest values first, so the
/// rewritten line stays stylistically consistent with the rest of the file.
pub fn refold_macros(macros: &MacroTable, line: &str, exclude: &[&str]) -> String {
    let mut folds: Vec<(String, String)> = macros
        .iter()
        .filter(|(name, value)| *name != "TOP" && !exclude.contains(name) && !value.is_empty())
        .map(|(name, value)| (value.to_string(), name.to_string()))
        .collect();
    folds.sort_by_key(|(value, _)| std::cmp::Reverse(value.len()));

    let mut line = line.to_string();
    for (value, name) in folds {
        let value_part = release::strip_comment(&line)
            .rsplit('=')
            .next()
            .unwrap_or("")
            .trim()
            .to_string();
        if value != value_part && value_part.starts_with(&value) {
            line = line.replace(&value, &format!("$({name})"));
        }
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refold_prefers_longest_macro() {
        let mut macros = MacroTable::new();
        macros.insert("PROD", "/prod");
        macros.insert("SUPPORT", "/prod/support");
        let line = "MOTOR=/prod/support/motor/6-4\n";
        let folded = refold_macros(&macros, line, &["MOTOR"]);
        assert_eq!(folded, "MOTOR=$(SUPPORT)/motor/6-4\n");
    }

    #[test]
    fn refold_skips_whole_value_match() {
        let mut macros = MacroTable::new();
        macros.insert("SUPPORT", "/prod/support");
        let line = "OTHER=/prod/support\n";
        let folded = refold_macros(&macros, line, &[]);
        assert_eq!(folded, "OTHER=/prod/support\n");
    }

    #[test]
    fn refold_excludes_named_macros() {
        let mut macros = MacroTable::new();
        macros.insert("MOTOR", "/prod/support/motor/6-3");
        let line = "MOTOR=/prod/support/motor/6-3dls1\n";
        let folded = refold_macros(&macros, line, &["MOTOR"]);
        assert_eq!(folded, "MOTOR=/prod/support/motor/6-3dls1\n");
    }
}
