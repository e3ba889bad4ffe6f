//! Macro substitution over an insertion-ordered symbol table.
//!
//! Values may reference other macros as `$(NAME)`, `${NAME}`, or bare
//! `$NAME` (identifier characters only), regardless of declaration order.
//! Substitution runs to a fixed point: a reference to an undefined macro
//! expands to the empty string, while genuinely cyclic definitions are a
//! typed error naming the cycle.

use std::collections::HashMap;
use std::ops::Range;
use std::sync::OnceLock;

use regex::Regex;

use reltree_util::errors::ReltreeError;

/// Upper bound on re-scan passes per value, for the rare case where a
/// substitution joins with surrounding text to form a new reference.
const MAX_EXPANSION_PASSES: usize = 8;

fn paren_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$\(([^)]+)\)").unwrap())
}

fn brace_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$\{([^}]+)\}").unwrap())
}

fn bare_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$([A-Za-z_][A-Za-z0-9_]*)").unwrap())
}

/// A macro reference found in a value: the byte range of the whole
/// reference and the name it refers to.
fn find_refs(text: &str) -> Vec<(Range<usize>, String)> {
    let mut refs: Vec<(Range<usize>, String)> = Vec::new();
    for re in [paren_re(), brace_re(), bare_re()] {
        for caps in re.captures_iter(text) {
            let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            refs.push((whole.range(), name.as_str().to_string()));
        }
    }
    refs.sort_by_key(|(range, _)| range.start);
    refs
}

/// A name→value mapping that preserves first-declaration order.
///
/// Redefinition keeps the original position and overwrites the value, which
/// matches the last-definition-wins semantics of the config format.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MacroTable {
    order: Vec<String>,
    values: HashMap<String, String>,
}

impl MacroTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        if !self.values.contains_key(&name) {
            self.order.push(name.clone());
        }
        self.values.insert(name, value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Iterate `(name, value)` pairs in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.order
            .iter()
            .filter_map(|name| self.values.get(name).map(|v| (name.as_str(), v.as_str())))
    }

    /// Macro names in declaration order.
    pub fn names(&self) -> &[String] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Resolve every value to its fixed point.
    ///
    /// References to undefined macros become the empty string. Cyclic
    /// definitions return [`ReltreeError::MacroCycle`] naming the chain.
    pub fn substitute(&mut self) -> Result<(), ReltreeError> {
        let mut resolved: HashMap<String, String> = HashMap::new();
        let mut stack: Vec<String> = Vec::new();
        for name in self.order.clone() {
            self.resolve(&name, &mut resolved, &mut stack)?;
        }
        for (name, value) in resolved {
            self.values.insert(name, value);
        }
        Ok(())
    }

    fn resolve(
        &self,
        name: &str,
        resolved: &mut HashMap<String, String>,
        stack: &mut Vec<String>,
    ) -> Result<String, ReltreeError> {
        if let Some(done) = resolved.get(name) {
            return Ok(done.clone());
        }
        if stack.iter().any(|n| n == name) {
            let mut chain: Vec<&str> = stack
                .iter()
                .map(String::as_str)
                .skip_while(|n| *n != name)
                .collect();
            chain.push(name);
            return Err(ReltreeError::MacroCycle {
                chain: chain.join(" -> "),
            });
        }
        stack.push(name.to_string());
        let mut value = self.values.get(name).cloned().unwrap_or_default();
        for _ in 0..MAX_EXPANSION_PASSES {
            let refs = find_refs(&value);
            if refs.is_empty() {
                break;
            }
            let mut out = String::with_capacity(value.len());
            let mut last = 0;
            for (range, target) in refs {
                out.push_str(&value[last..range.start]);
                if self.values.contains_key(&target) {
                    let expansion = self.resolve(&target, resolved, stack)?;
                    out.push_str(&expansion);
                }
                // an undefined reference expands to nothing
                last = range.end;
            }
            out.push_str(&value[last..]);
            value = out;
        }
        stack.pop();
        resolved.insert(name.to_string(), value.clone());
        Ok(value)
    }

    /// Expand references in `text` using the current raw values, one pass.
    ///
    /// Used for include-file names, where unknown references are left
    /// intact rather than blanked.
    pub fn expand_once(&self, text: &str) -> String {
        let refs = find_refs(text);
        if refs.is_empty() {
            return text.to_string();
        }
        let mut out = String::with_capacity(text.len());
        let mut last = 0;
        for (range, target) in refs {
            out.push_str(&text[last..range.start]);
            match self.values.get(&target) {
                Some(value) => out.push_str(value),
                None => out.push_str(&text[range.clone()]),
            }
            last = range.end;
        }
        out.push_str(&text[last..]);
        out
    }

    /// Expand references in `text` against the (already substituted) table,
    /// blanking unknown references.
    pub fn resolve_text(&self, text: &str) -> String {
        let mut out = text.to_string();
        for _ in 0..MAX_EXPANSION_PASSES {
            let refs = find_refs(&out);
            if refs.is_empty() {
                return out;
            }
            let mut next = String::with_capacity(out.len());
            let mut last = 0;
            for (range, target) in refs {
                next.push_str(&out[last..range.start]);
                if let Some(value) = self.values.get(&target) {
                    next.push_str(value);
                }
                last = range.end;
            }
            next.push_str(&out[last..]);
            out = next;
        }
        out
    }
}
