// Process-wide configuration, per SPEC_FULL.md §2.3. Generalizes the
// teacher's leaf `Config` struct (which only threaded
// `ld_preload`/`ld_library_path`/`ld_so_conf`/`system_dirs` through one
// binary's dependency walk) into a `RunContext` built once at
// orchestrator start and threaded explicitly through every step -- per
// the REDESIGN FLAGS, no process-wide mutable globals stand in for
// `LOG_LEVEL` or `CONFIGURATION_VALUES`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::search_path::SearchPathVec;

/// Site/user YAML configuration, grounded in
/// `examples/original_source/e4s_cl/config.py`: `~/.config/e4s-cl.yaml`
/// is read first, falling back to `/etc/e4s-cl/e4s-cl.yaml`. Unlike the
/// original's ad hoc `str.split()` on a space-separated value, each
/// field here is a typed, already-split list.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SiteConfig {
    #[serde(default, rename = "container directory")]
    pub container_directory: Option<String>,
    #[serde(default, rename = "launcher options")]
    pub launcher_options: Vec<String>,
    #[serde(default, rename = "container options")]
    pub container_options: Vec<String>,
}

impl SiteConfig {
    pub fn user_path() -> PathBuf {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/root".to_string());
        Path::new(&home).join(".config").join("e4s-cl.yaml")
    }

    pub const SITE_PATH: &'static str = "/etc/e4s-cl/e4s-cl.yaml";

    /// Loads the user configuration if present, else the site-wide one,
    /// else an empty (all-default) configuration -- `configuration_file`
    /// resolution in the original, minus the lazily-initialized global.
    pub fn load() -> Result<SiteConfig> {
        let user_path = Self::user_path();
        let path = if user_path.exists() {
            Some(user_path)
        } else if Path::new(Self::SITE_PATH).exists() {
            Some(PathBuf::from(Self::SITE_PATH))
        } else {
            None
        };

        match path {
            Some(path) => {
                let text = std::fs::read_to_string(path)?;
                Ok(serde_yaml::from_str(&text)?)
            }
            None => Ok(SiteConfig::default()),
        }
    }
}

/// Explicit, immutable-once-built context threaded through the
/// orchestrator (`src/launcher.rs`) instead of the teacher's borrowed,
/// per-binary `Config<'a>`. Holds the host-side search-path inputs every
/// closure/resolve call in one invocation shares, plus the site
/// configuration and verbosity the CLI parsed.
pub struct RunContext {
    pub ld_preload: SearchPathVec,
    pub ld_library_path: SearchPathVec,
    pub ld_so_conf: SearchPathVec,
    pub system_dirs: SearchPathVec,
    pub platform: Option<String>,
    pub site: SiteConfig,
    pub verbose: bool,
    pub quiet: bool,
    pub dry_run: bool,
}

impl RunContext {
    /// Builds the context for one invocation: ambient `LD_PRELOAD`,
    /// `LD_LIBRARY_PATH`, `/etc/ld.so.conf`, and the native standard
    /// directories, plus whatever the site configuration supplies.
    pub fn build(verbose: bool, quiet: bool, dry_run: bool) -> Result<RunContext> {
        let ld_preload = crate::search_path::from_preload(
            std::env::var("LD_PRELOAD").unwrap_or_default(),
        );
        let ld_library_path = crate::search_path::from_string(
            std::env::var("LD_LIBRARY_PATH").unwrap_or_default(),
            &[':'],
        );
        let ld_so_conf =
            crate::ld_conf::parse_ld_so_conf(&Path::new("/etc/ld.so.conf")).unwrap_or_default();
        let system_dirs = crate::system_dirs::native_system_dirs();
        let site = SiteConfig::load()?;

        Ok(RunContext {
            ld_preload,
            ld_library_path,
            ld_so_conf,
            system_dirs,
            platform: None,
            site,
            verbose,
            quiet,
            dry_run,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_site_config_parses() {
        let cfg: SiteConfig = serde_yaml::from_str("{}").unwrap();
        assert!(cfg.container_directory.is_none());
        assert!(cfg.launcher_options.is_empty());
    }

    #[test]
    fn site_config_parses_spaced_keys() {
        let yaml = "container directory: /opt/e4s-cl\nlauncher options:\n  - --bind\n";
        let cfg: SiteConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.container_directory.as_deref(), Some("/opt/e4s-cl"));
        assert_eq!(cfg.launcher_options, vec!["--bind".to_string()]);
    }
}
