// Profile Contract (C8), per spec.md §4.8, plus the CRUD supplement of
// SPEC_FULL.md §3.2. Grounded in `examples/original_source/e4s_cl/config.py`'s
// YAML-file-as-store shape and the `Profile.controller()`/`Profile.selected()`
// usage pattern referenced by `launch.py`; unlike the original's ad hoc
// record model this is a single typed `serde_yaml` document.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// The read-only interface the orchestrator consumes (spec.md §4.8):
/// `{image, backend, libraries, files, source}`. CLI flags override
/// individual fields at the call site; the store itself stays opaque to
/// the orchestrator beyond this shape.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Profile {
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub backend: Option<String>,
    #[serde(default)]
    pub libraries: Vec<String>,
    #[serde(default)]
    pub files: Vec<String>,
    #[serde(default)]
    pub source: Option<String>,
}

impl Profile {
    /// Applies CLI override fields over this profile's own, the profile
    /// having lower priority (spec.md §4.7 step 2: "Gather profile + CLI
    /// overrides... The profile's parameters have less priority than the
    /// ones specified on the command line", per `launch.py::_parameters`).
    pub fn merged_with(&self, overrides: &ProfileOverrides) -> Profile {
        Profile {
            image: overrides.image.clone().or_else(|| self.image.clone()),
            backend: overrides.backend.clone().or_else(|| self.backend.clone()),
            libraries: if overrides.libraries.is_empty() {
                self.libraries.clone()
            } else {
                overrides.libraries.clone()
            },
            files: if overrides.files.is_empty() {
                self.files.clone()
            } else {
                overrides.files.clone()
            },
            source: overrides.source.clone().or_else(|| self.source.clone()),
        }
    }
}

/// CLI-supplied overrides collected ahead of merging with a named or
/// selected profile (spec.md §4.7 step 2). An unset field (`None` /
/// empty vec) means "did not override"; an explicit `--libraries ''` is
/// not distinguishable from "not given", matching the original's use of
/// argparse's `default=SUPPRESS`.
#[derive(Debug, Clone, Default)]
pub struct ProfileOverrides {
    pub image: Option<String>,
    pub backend: Option<String>,
    pub libraries: Vec<String>,
    pub files: Vec<String>,
    pub source: Option<String>,
}

/// On-disk shape of the profile store, schema-versioned per spec.md §6
/// ("Profile on-disk format... schema-versioned"). `selected` names the
/// profile `launch` falls back to when no `--profile` flag is given.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoreFile {
    #[serde(default = "schema_version")]
    schema_version: u32,
    #[serde(default)]
    selected: Option<String>,
    #[serde(default)]
    profiles: BTreeMap<String, Profile>,
}

fn schema_version() -> u32 {
    1
}

/// CRUD store backed by a single YAML file, per SPEC_FULL.md §3.2.
pub struct ProfileStore {
    path: PathBuf,
    data: StoreFile,
}

impl ProfileStore {
    /// Opens the store at `path`, creating an empty in-memory one if the
    /// file does not yet exist (mirroring the original's lazy
    /// `CONFIGURATION_VALUES` initialization, minus the process-wide
    /// global per REDESIGN FLAGS: the store is an explicit value owned
    /// by the caller).
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let data = if path.exists() {
            let text = fs::read_to_string(&path)?;
            serde_yaml::from_str(&text)?
        } else {
            StoreFile::default()
        };
        Ok(ProfileStore { path, data })
    }

    /// The default profile store location, `~/.config/e4s-cl/profiles.yaml`.
    pub fn default_path() -> PathBuf {
        dirs_config_home().join("e4s-cl").join("profiles.yaml")
    }

    fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let text = serde_yaml::to_string(&self.data)?;
        fs::write(&self.path, text)?;
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Profile> {
        self.data.profiles.get(name)
    }

    pub fn list(&self) -> impl Iterator<Item = (&String, &Profile)> {
        self.data.profiles.iter()
    }

    /// Creates or overwrites a profile under `name`.
    pub fn upsert(&mut self, name: &str, profile: Profile) -> Result<()> {
        self.data.profiles.insert(name.to_string(), profile);
        self.save()
    }

    pub fn delete(&mut self, name: &str) -> Result<bool> {
        let existed = self.data.profiles.remove(name).is_some();
        if existed && self.data.selected.as_deref() == Some(name) {
            self.data.selected = None;
        }
        if existed {
            self.save()?;
        }
        Ok(existed)
    }

    /// Marks `name` as the profile `launch` uses when no `--profile` is
    /// given. Fails with `ConfigurationError` if the name is unknown, the
    /// same validation `_argument_profile` performs in the original.
    pub fn select(&mut self, name: &str) -> Result<()> {
        if !self.data.profiles.contains_key(name) {
            return Err(Error::Configuration(format!("profile '{name}' does not exist")));
        }
        self.data.selected = Some(name.to_string());
        self.save()
    }

    pub fn selected(&self) -> Option<&Profile> {
        self.data.selected.as_deref().and_then(|n| self.data.profiles.get(n))
    }

    pub fn selected_name(&self) -> Option<&str> {
        self.data.selected.as_deref()
    }
}

fn dirs_config_home() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        if !xdg.is_empty() {
            return PathBuf::from(xdg);
        }
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| "/root".to_string());
    Path::new(&home).join(".config")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn profile(image: &str) -> Profile {
        Profile {
            image: Some(image.to_string()),
            backend: Some("singularity".to_string()),
            libraries: vec!["/opt/mpi/lib/libmpi.so.12".to_string()],
            files: Vec::new(),
            source: None,
        }
    }

    #[test]
    fn round_trips_through_yaml_on_disk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("profiles.yaml");

        {
            let mut store = ProfileStore::open(&path).unwrap();
            store.upsert("default", profile("/images/rocky.sif")).unwrap();
            store.select("default").unwrap();
        }

        let store = ProfileStore::open(&path).unwrap();
        assert_eq!(store.selected_name(), Some("default"));
        assert_eq!(store.selected().unwrap().image.as_deref(), Some("/images/rocky.sif"));
    }

    #[test]
    fn selecting_unknown_profile_fails() {
        let dir = tempdir().unwrap();
        let mut store = ProfileStore::open(dir.path().join("profiles.yaml")).unwrap();
        assert!(store.select("missing").is_err());
    }

    #[test]
    fn deleting_selected_profile_clears_selection() {
        let dir = tempdir().unwrap();
        let mut store = ProfileStore::open(dir.path().join("profiles.yaml")).unwrap();
        store.upsert("p1", profile("/images/a.sif")).unwrap();
        store.select("p1").unwrap();
        store.delete("p1").unwrap();
        assert!(store.selected().is_none());
    }

    #[test]
    fn cli_overrides_take_priority_over_profile() {
        let base = profile("/images/rocky.sif");
        let overrides = ProfileOverrides {
            image: Some("/images/other.sif".to_string()),
            ..Default::default()
        };
        let merged = base.merged_with(&overrides);
        assert_eq!(merged.image.as_deref(), Some("/images/other.sif"));
        assert_eq!(merged.backend.as_deref(), Some("singularity"));
    }
}
