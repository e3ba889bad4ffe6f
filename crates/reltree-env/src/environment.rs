//! The environment of a site: per-area root directories, the active
//! toolchain version, and path classification.
//!
//! An "area" is a category of module (support libraries, deployable IOC
//! instances, tools, ...) with its own root-directory convention. The
//! environment maps area names to development and production roots, and maps
//! a module path back to a `(name, version)` pair. It is cheap to clone;
//! tree construction clones it per node so that a toolchain version detected
//! mid-parse propagates to later modules without shared mutable state.

use std::path::{Component, Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;

use reltree_util::errors::{ReltreeError, ReltreeResult};

use crate::release_tag::{self, ReleaseKey};
use crate::site::SiteConfig;

/// Area names understood by the site layout.
pub const AREAS: &[&str] = &[
    "support",
    "ioc",
    "matlab",
    "python",
    "python3",
    "python3ext",
    "etc",
    "tools",
    "epics",
];

/// Areas whose module names span two path segments (`BL15I/MO`).
const NESTED_AREAS: &[&str] = &["ioc", "tools", "python"];

fn epics_ver_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"R\d+(\.\d+)+").unwrap())
}

/// Which side of the site layout a path falls under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Domain {
    Work,
    Prod,
    Invalid,
}

/// The site environment: layout conventions plus the active toolchain and
/// platform versions.
#[derive(Debug, Clone)]
pub struct Environment {
    site: SiteConfig,
    epics: String,
    platform: String,
    canonical_tag: Regex,
}

impl Environment {
    /// Build an environment from a site configuration, taking the EPICS
    /// version from `DLS_EPICS_RELEASE` / `EPICS_RELEASE` if set.
    pub fn new(site: SiteConfig) -> Self {
        let epics = std::env::var("DLS_EPICS_RELEASE")
            .or_else(|_| std::env::var("EPICS_RELEASE"))
            .unwrap_or_else(|_| site.default_epics.clone());
        Self::with_versions(site, epics)
    }

    /// Build an environment with an explicit EPICS version.
    pub fn with_versions(site: SiteConfig, epics: impl Into<String>) -> Self {
        let platform = site.default_platform.clone();
        let canonical_tag = Regex::new(&format!(
            r"^[0-9\-]*({})*[0-9\-]*$",
            regex::escape(&site.separator)
        ))
        .expect("escaped separator forms a valid pattern");
        Self {
            site,
            epics: epics.into(),
            platform,
            canonical_tag,
        }
    }

    pub fn site(&self) -> &SiteConfig {
        &self.site
    }

    /// The active EPICS version, e.g. `R3.14.12.3` (possibly `_64`-suffixed).
    pub fn epics_ver(&self) -> &str {
        &self.epics
    }

    /// Force the EPICS version.
    pub fn set_epics(&mut self, epics: impl Into<String>) {
        self.epics = epics.into();
    }

    /// A copy of this environment with a different EPICS version.
    pub fn with_epics(&self, epics: impl Into<String>) -> Self {
        let mut e = self.clone();
        e.epics = epics.into();
        e
    }

    /// The directory form of the EPICS version (no `_64` suffix).
    pub fn epics_ver_dir(&self) -> &str {
        self.epics.split('_').next().unwrap_or(&self.epics)
    }

    pub fn set_platform(&mut self, platform: impl Into<String>) {
        self.platform = platform.into();
    }

    /// The platform directory, e.g. `RHEL7-x86_64`.
    pub fn platform_dir(&self) -> String {
        format!("RHEL{}-x86_64", self.platform)
    }

    /// Find an EPICS version token (`R3.14...`) embedded in arbitrary text.
    pub fn epics_token(text: &str) -> Option<String> {
        epics_ver_re().find(text).map(|m| m.as_str().to_string())
    }

    /// Whether the active toolchain predates R3.14, which keeps its primary
    /// config file under `config/` rather than `configure/`.
    ///
    /// Versions that do not parse as `R<major>.<minor>...` are treated as
    /// modern.
    pub fn uses_legacy_config_dir(&self) -> bool {
        match Self::epics_components(&self.epics) {
            Some(components) => components < vec![3, 14],
            None => false,
        }
    }

    fn epics_components(ver: &str) -> Option<Vec<u64>> {
        let m = epics_ver_re().find(ver)?;
        if m.start() != 0 {
            return None;
        }
        m.as_str()[1..]
            .split('.')
            .map(|part| part.parse::<u64>().ok())
            .collect()
    }

    fn check_area(&self, area: &str) -> ReltreeResult<()> {
        if AREAS.contains(&area) {
            Ok(())
        } else {
            Err(ReltreeError::UnknownArea {
                area: area.to_string(),
                known: AREAS.join(", "),
            }
            .into())
        }
    }

    /// The development ("work") root directory for an area.
    pub fn dev_area(&self, area: &str) -> ReltreeResult<PathBuf> {
        self.check_area(area)?;
        Ok(self.area_root(&self.site.work_root, area))
    }

    /// The production root directory for an area.
    pub fn prod_area(&self, area: &str) -> ReltreeResult<PathBuf> {
        self.check_area(area)?;
        if area == "epics" {
            return Ok(self.site.epics_root.clone());
        }
        Ok(self.area_root(&self.site.prod_root, area))
    }

    fn area_root(&self, root: &Path, area: &str) -> PathBuf {
        match area {
            "support" | "ioc" => root.join(self.epics_ver_dir()).join(area),
            "epics" | "etc" => root.join(area),
            "tools" => root.join("tools").join(self.platform_dir()),
            "python3" | "python3ext" => root.join("python3").join(self.platform_dir()),
            "python" => root.join("common").join("python").join(self.platform_dir()),
            _ => root.join("common").join("matlab"),
        }
    }

    /// Classify which area and domain a path falls under.
    ///
    /// If no area root is a prefix of the path, retries once with a
    /// toolchain-version token extracted from the path itself, to cope with
    /// paths that embed their own toolchain version.
    pub fn classify_area(&self, path: &Path) -> (String, Domain, String) {
        for &area in AREAS {
            if let Ok(dev) = self.dev_area(area) {
                if path.starts_with(&dev) {
                    return (area.to_string(), Domain::Work, self.epics.clone());
                }
            }
            if let Ok(prod) = self.prod_area(area) {
                if path.starts_with(&prod) {
                    return (area.to_string(), Domain::Prod, self.epics.clone());
                }
            }
        }
        if let Some(token) = Self::epics_token(&path.to_string_lossy()) {
            if token != self.epics {
                return self.with_epics(token).classify_area(path);
            }
        }
        ("invalid".to_string(), Domain::Invalid, self.epics.clone())
    }

    /// Classify a module root into a `(name, version)` pair.
    ///
    /// `version` is `"work"` for a development checkout, `"invalid"` for an
    /// unclassifiable path, or the release tag for a production path. An
    /// identity file under the module root (`etc/module.ini` or
    /// `configure/module.ini`) takes precedence over path-derived naming.
    /// Classifying the same path twice yields the same pair.
    pub fn classify_path(&self, path: &Path) -> (String, String) {
        let (area, domain, epics) = self.classify_area(path);
        let e = if epics != self.epics {
            self.with_epics(epics)
        } else {
            self.clone()
        };
        let mut module = name_from_module_ini(path);
        let root = match domain {
            Domain::Work => e.dev_area(&area).ok(),
            Domain::Prod => e.prod_area(&area).ok(),
            Domain::Invalid => None,
        };
        let remainder = match &root {
            Some(r) => path.strip_prefix(r).unwrap_or(path),
            None => path,
        };
        let mut sections: Vec<String> = remainder
            .components()
            .filter_map(|c| match c {
                Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect();

        // Tools and python modules may carry a trailing install "prefix" dir.
        if matches!(area.as_str(), "python" | "tools")
            && sections.last().is_some_and(|s| s == "prefix")
        {
            sections.pop();
        }

        let nested = NESTED_AREAS.contains(&area.as_str());
        let mut version = match domain {
            Domain::Work => {
                if sections.len() == 1 || (nested && sections.len() == 2) {
                    "work".to_string()
                } else {
                    "invalid".to_string()
                }
            }
            Domain::Prod => {
                if sections.len() == 2 || (nested && sections.len() == 3) {
                    let tag = sections.last().cloned().unwrap_or_default();
                    if module.is_none() {
                        module = Some(if matches!(area.as_str(), "tools" | "python") {
                            sections[sections.len() - 2].clone()
                        } else {
                            sections[..sections.len() - 1].join("/")
                        });
                    }
                    tag
                } else {
                    sections.pop();
                    "invalid".to_string()
                }
            }
            Domain::Invalid => "invalid".to_string(),
        };

        if module.is_none() {
            module = if area == "ioc" && sections.len() >= 2 {
                Some(sections[sections.len() - 2..].join("/"))
            } else {
                sections.last().cloned()
            };
        }
        let mut module = module.unwrap_or_default();

        // A directory name embedding a canonical version tag (B-1-0) is a
        // pinned checkout of a released module, wherever it lives.
        if version == "work" || version == "invalid" {
            if sections.last().is_some_and(|s| *s == module) {
                if let Some((stem, tag)) = self.split_tagged_name(&module) {
                    module = stem;
                    version = tag;
                }
            }
        }

        (module, version)
    }

    /// The ordering key for a release tag under this site's separator.
    pub fn release_key(&self, tag: &str) -> ReleaseKey {
        release_tag::release_key(tag, &self.site.separator)
    }

    /// Sort paths ascending by the release tag in their final segment.
    pub fn sort_releases(&self, paths: Vec<PathBuf>) -> Vec<PathBuf> {
        release_tag::sort_release_paths(paths, &self.site.separator)
    }

    /// Whether a tag matches the site's canonical grammar: digits and
    /// dashes, with at most the site separator literal embedded.
    pub fn is_canonical_tag(&self, tag: &str) -> bool {
        self.canonical_tag.is_match(tag)
    }

    /// Split a `name-tag` directory name into `(name, tag)` where `tag` is
    /// canonical, taking the leftmost dash that yields a canonical tail.
    pub fn split_tagged_name(&self, segment: &str) -> Option<(String, String)> {
        for (i, _) in segment.match_indices('-') {
            let (stem, rest) = segment.split_at(i);
            let tag = &rest[1..];
            if !stem.is_empty()
                && tag.starts_with(|c: char| c.is_ascii_digit())
                && self.is_canonical_tag(tag)
            {
                return Some((stem.to_string(), tag.to_string()));
            }
        }
        None
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new(SiteConfig::default())
    }
}

/// Read the module name from an identity file under the module root.
fn name_from_module_ini(root: &Path) -> Option<String> {
    for rel in ["etc/module.ini", "configure/module.ini"] {
        let ini = root.join(rel);
        if ini.is_file() {
            if let Some(name) = parse_ini_name(&ini) {
                return Some(name);
            }
        }
    }
    None
}

fn parse_ini_name(path: &Path) -> Option<String> {
    let content = std::fs::read_to_string(path).ok()?;
    let mut in_general = false;
    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with('[') {
            in_general = trimmed == "[general]";
            continue;
        }
        if !in_general || trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with(';')
        {
            continue;
        }
        if let Some((key, value)) = trimmed.split_once('=') {
            if key.trim() == "name" {
                return Some(value.trim().to_string());
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env() -> Environment {
        Environment::with_versions(SiteConfig::default(), "R3.14.12.3")
    }

    #[test]
    fn area_templates() {
        let e = env();
        assert_eq!(
            e.dev_area("support").unwrap(),
            PathBuf::from("/dls_sw/work/R3.14.12.3/support")
        );
        assert_eq!(
            e.prod_area("support").unwrap(),
            PathBuf::from("/dls_sw/prod/R3.14.12.3/support")
        );
        assert_eq!(
            e.prod_area("epics").unwrap(),
            PathBuf::from("/dls_sw/epics")
        );
        assert_eq!(
            e.dev_area("tools").unwrap(),
            PathBuf::from("/dls_sw/work/tools/RHEL7-x86_64")
        );
    }

    #[test]
    fn sixty_four_bit_suffix_is_stripped_from_dirs() {
        let e = Environment::with_versions(SiteConfig::default(), "R3.14.12.3_64");
        assert_eq!(e.epics_ver_dir(), "R3.14.12.3");
        assert_eq!(
            e.dev_area("support").unwrap(),
            PathBuf::from("/dls_sw/work/R3.14.12.3/support")
        );
    }

    #[test]
    fn unknown_area_is_fatal() {
        assert!(env().dev_area("gui").is_err());
        assert!(env().prod_area("gui").is_err());
    }

    #[test]
    fn classify_prod_support() {
        let (name, version) =
            env().classify_path(Path::new("/dls_sw/prod/R3.14.12.3/support/motor/6-3"));
        assert_eq!(name, "motor");
        assert_eq!(version, "6-3");
    }

    #[test]
    fn classify_dev_support() {
        let (name, version) =
            env().classify_path(Path::new("/dls_sw/work/R3.14.12.3/support/motor"));
        assert_eq!(name, "motor");
        assert_eq!(version, "work");
    }

    #[test]
    fn classify_prod_ioc_nested_name() {
        let (name, version) =
            env().classify_path(Path::new("/dls_sw/prod/R3.14.12.3/ioc/BL15I/MO/2-1"));
        assert_eq!(name, "BL15I/MO");
        assert_eq!(version, "2-1");
    }

    #[test]
    fn classify_retries_with_embedded_toolchain_version() {
        let (name, version) =
            env().classify_path(Path::new("/dls_sw/prod/R3.13.1/support/motor/6-3"));
        assert_eq!(name, "motor");
        assert_eq!(version, "6-3");
    }

    #[test]
    fn classify_unrecognized_path() {
        let (name, version) = env().classify_path(Path::new("/scratch/odd/motor"));
        assert_eq!(name, "motor");
        assert_eq!(version, "invalid");
    }

    #[test]
    fn classify_is_idempotent() {
        let path = Path::new("/dls_sw/prod/R3.14.12.3/support/motor/6-3");
        assert_eq!(env().classify_path(path), env().classify_path(path));
    }

    #[test]
    fn flat_tagged_checkout_in_work_area() {
        let (name, version) =
            env().classify_path(Path::new("/dls_sw/work/R3.14.12.3/support/motor-6-3dls1"));
        assert_eq!(name, "motor");
        assert_eq!(version, "6-3dls1");
    }

    #[test]
    fn module_ini_overrides_path_name() {
        let tmp = tempfile::TempDir::new().unwrap();
        let root = tmp.path().join("somewhere").join("tmc2");
        std::fs::create_dir_all(root.join("etc")).unwrap();
        std::fs::write(
            root.join("etc/module.ini"),
            "[general]\nname = trajectoryMotion\n",
        )
        .unwrap();
        let (name, _) = env().classify_path(&root);
        assert_eq!(name, "trajectoryMotion");
    }

    #[test]
    fn legacy_config_dir_cutover() {
        assert!(Environment::with_versions(SiteConfig::default(), "R3.13.9").uses_legacy_config_dir());
        assert!(!Environment::with_versions(SiteConfig::default(), "R3.14.8.2")
            .uses_legacy_config_dir());
        // a bare tag with no dotted components is treated as modern
        assert!(!Environment::with_versions(SiteConfig::default(), "R1").uses_legacy_config_dir());
    }

    #[test]
    fn canonical_tag_grammar() {
        let e = env();
        assert!(e.is_canonical_tag("6-3"));
        assert!(e.is_canonical_tag("6-3dls1"));
        assert!(e.is_canonical_tag("4-5dls1-3"));
        assert!(!e.is_canonical_tag("6-3beta1"));
        assert!(!e.is_canonical_tag("work"));
    }

    #[test]
    fn epics_token_extraction() {
        assert_eq!(
            Environment::epics_token("/dls_sw/prod/R3.14.8.2/support"),
            Some("R3.14.8.2".to_string())
        );
        assert_eq!(Environment::epics_token("/scratch/work/R1/support"), None);
    }
}
