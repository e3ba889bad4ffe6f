//! Release-tag parsing, comparison, and sorting.
//!
//! Site release tags are not semver: `4-5beta2dls1-3` means release 4-5beta2
//! with site patch 1-3. Tags are compared by a fixed-width key of alternating
//! (numeric, suffix) pairs so that numeric components sort numerically and a
//! pre-release suffix (`alpha`, `beta2`, ...) sorts before the bare release
//! at the same position.

use std::path::{Path, PathBuf};

/// Pairs per half of the key; a half that parses to more keeps them all.
const PAIRS_PER_HALF: usize = 3;

/// A fixed-width, totally ordered key for a release tag.
///
/// Each element is a `(numeric, suffix)` pair. A bare numeric component gets
/// the sentinel suffix `"z"`, which sorts after any pre-release qualifier, so
/// `1-0beta1` orders before `1-0`. Missing pairs are padded with `(0, "")` to
/// keep keys of different source tags comparable.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ReleaseKey(Vec<(u64, String)>);

/// Sentinel suffix for a numeric component with no qualifier.
const BARE_RELEASE: &str = "z";

/// Build the ordering key for a release tag.
///
/// `separator` is the site literal splitting the tag into two independently
/// sorted halves (`dls` by convention).
pub fn release_key(tag: &str, separator: &str) -> ReleaseKey {
    let mut pairs: Vec<(u64, String)> = Vec::new();
    let halves: Vec<&str> = match tag.split_once(separator) {
        Some((release, patch)) => vec![release, patch],
        None => vec![tag],
    };
    for half in halves {
        let start = pairs.len();
        let cleaned = half.replace(['.', '_'], "-");
        for subpart in cleaned.splitn(PAIRS_PER_HALF + 1, '-') {
            let digits = subpart
                .find(|c: char| !c.is_ascii_digit())
                .unwrap_or(subpart.len());
            if digits > 0 {
                let numeric = subpart[..digits].parse::<u64>().unwrap_or(u64::MAX);
                let suffix = &subpart[digits..];
                let suffix = if suffix.is_empty() {
                    BARE_RELEASE.to_string()
                } else {
                    suffix.to_string()
                };
                pairs.push((numeric, suffix));
            } else {
                pairs.push((0, subpart.to_string()));
            }
        }
        while pairs.len() < start + PAIRS_PER_HALF {
            pairs.push((0, String::new()));
        }
    }
    while pairs.len() < 2 * PAIRS_PER_HALF {
        pairs.push((0, String::new()));
    }
    ReleaseKey(pairs)
}

/// Sort paths ascending by the release tag in their final segment.
///
/// The sort is stable, so paths whose final segments compare equal keep
/// their input order.
pub fn sort_release_paths(mut paths: Vec<PathBuf>, separator: &str) -> Vec<PathBuf> {
    paths.sort_by_cached_key(|p| release_key(&final_segment(p), separator));
    paths
}

fn final_segment(path: &Path) -> String {
    path.file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}
