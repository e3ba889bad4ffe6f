use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use reltree_util::errors::{ReltreeError, ReltreeResult};

/// Site directory-layout conventions, loadable from a TOML file.
///
/// The defaults describe the Diamond Light Source layout; overriding the
/// roots is enough to point the toolkit at a mirrored or test layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    /// Root of the development ("work") areas.
    #[serde(default = "default_work_root")]
    pub work_root: PathBuf,

    /// Root of the released ("prod") areas.
    #[serde(default = "default_prod_root")]
    pub prod_root: PathBuf,

    /// Root of the EPICS base installations.
    #[serde(default = "default_epics_root")]
    pub epics_root: PathBuf,

    /// Literal splitting a release tag into a site-patch half,
    /// as in `4-5beta2dls1-3`.
    #[serde(default = "default_separator")]
    pub separator: String,

    /// EPICS version assumed when none is found in the process environment.
    #[serde(default = "default_epics")]
    pub default_epics: String,

    /// Platform (RHEL major) version assumed when none is configured.
    #[serde(default = "default_platform")]
    pub default_platform: String,
}

fn default_work_root() -> PathBuf {
    PathBuf::from("/dls_sw/work")
}

fn default_prod_root() -> PathBuf {
    PathBuf::from("/dls_sw/prod")
}

fn default_epics_root() -> PathBuf {
    PathBuf::from("/dls_sw/epics")
}

fn default_separator() -> String {
    "dls".to_string()
}

fn default_epics() -> String {
    "R3.14.12.3".to_string()
}

fn default_platform() -> String {
    "7".to_string()
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            work_root: default_work_root(),
            prod_root: default_prod_root(),
            epics_root: default_epics_root(),
            separator: default_separator(),
            default_epics: default_epics(),
            default_platform: default_platform(),
        }
    }
}

impl SiteConfig {
    /// Load a site configuration from a TOML file.
    pub fn load(path: &Path) -> ReltreeResult<Self> {
        let content = std::fs::read_to_string(path).map_err(ReltreeError::Io)?;
        let config: SiteConfig =
            toml::from_str(&content).map_err(|e| ReltreeError::SiteConfig {
                message: format!("Failed to parse {}: {e}", path.display()),
            })?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_describe_dls() {
        let site = SiteConfig::default();
        assert_eq!(site.work_root, PathBuf::from("/dls_sw/work"));
        assert_eq!(site.prod_root, PathBuf::from("/dls_sw/prod"));
        assert_eq!(site.separator, "dls");
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let tmp = tempfile::TempDir::new().unwrap();
        let file = tmp.path().join("site.toml");
        std::fs::write(&file, "work_root = \"/scratch/work\"\n").unwrap();
        let site = SiteConfig::load(&file).unwrap();
        assert_eq!(site.work_root, PathBuf::from("/scratch/work"));
        assert_eq!(site.prod_root, PathBuf::from("/dls_sw/prod"));
        assert_eq!(site.default_epics, "R3.14.12.3");
    }

    #[test]
    fn malformed_toml_is_an_error() {
        let tmp = tempfile::TempDir::new().unwrap();
        let file = tmp.path().join("site.toml");
        std::fs::write(&file, "work_root = [not toml").unwrap();
        assert!(SiteConfig::load(&file).is_err());
    }
}
