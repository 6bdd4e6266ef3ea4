// Container Abstraction & Backends (C5), per spec.md §4.5. Grounded on
// `examples/original_source/e4s_cl/cf/containers/__init__.py`'s
// `Container` base class and its `BACKENDS`/`MIMES` tables, restructured
// per the REDESIGN FLAGS into an explicit static registry (this crate
// has no dynamic `import_module` equivalent, nor any need for one).

mod containerd;
mod docker;
mod shifter;
mod singularity;

/// Shifter's staged-execution paths (see `shifter.rs`): re-exported
/// since they need a live `TempDir` guard that outlives a plain
/// `build_argv`/`spawn` call, which the launcher orchestrator
/// (`src/launcher.rs`) threads through itself instead of going through
/// `Backend::spawn`/`execute`.
pub use shifter::spawn_for_introspection as shifter_spawn_for_introspection;
pub use shifter::stage_for_launch as shifter_stage_for_launch;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// The environment variable name the introspection side channel
/// (spec.md §4.6) threads through `ExecPlan::env`. Named here, rather
/// than in `introspect`, because backends that isolate file
/// descriptors from the guest (Singularity's `--keep-fds`) need to
/// recognize its presence to keep the fd alive across the boundary.
pub const SIDE_CHANNEL_FD_ENV: &str = "__E4S_CL_JSON_FD";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileOption {
    ReadOnly,
    ReadWrite,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bind {
    pub host: PathBuf,
    pub guest: PathBuf,
    pub option: FileOption,
}

/// Everything a backend needs to translate into its own CLI invocation,
/// assembled by the launcher from a `MergePlan` (spec.md §4.5: "Every
/// backend provides... `execute(plan, argv)`"). Serializable so that the
/// orchestrator can materialize it to disk for the `<self> execute
/// --plan=...` re-invocation of spec.md §4.7 step 7.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecPlan {
    pub image: String,
    pub binds: Vec<Bind>,
    pub env: BTreeMap<String, String>,
    pub ld_preload: Vec<String>,
    pub ld_library_path: Vec<String>,
}

impl ExecPlan {
    pub fn bind_file(&mut self, host: impl Into<PathBuf>, guest: impl Into<PathBuf>, option: FileOption) {
        self.binds.push(Bind {
            host: host.into(),
            guest: guest.into(),
            option,
        });
    }

    pub fn set_env(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.env.insert(key.into(), value.into());
    }
}

/// A container runtime driver. Implementations live one per backend
/// module, same division as the original's per-file `NAME`/`CLASS`
/// pair, minus the dynamic discovery machinery.
pub trait Backend {
    fn name(&self) -> &'static str;

    /// The runtime binary is on `PATH` and usable.
    fn available(&self) -> bool;

    /// Translates `plan` and the inner command `argv` into the exact
    /// argv (executable first) this backend would run -- used both by
    /// `spawn`'s default implementation and by the launcher orchestrator
    /// (`src/launcher.rs`) when it needs the command line itself, rather
    /// than a spawned child, to splice into a re-invoked launcher's own
    /// argv (spec.md §4.7 step 7: "Replace program with `<self> execute
    /// --plan=...`").
    fn build_argv(&self, plan: &ExecPlan, argv: &[String]) -> Result<Vec<String>>;

    /// Translates `plan` into the backend's CLI and spawns it,
    /// inheriting stdio (and any other fd the caller left open, which
    /// is how the introspection side channel of spec.md §4.6 reaches
    /// the guest), without waiting for it to finish. The default
    /// implementation runs `build_argv`; backends with side effects
    /// beyond argv construction (Shifter's staging) override this
    /// directly instead.
    fn spawn(&self, plan: &ExecPlan, argv: &[String]) -> Result<std::process::Child> {
        let built = self.build_argv(plan, argv)?;
        let (exe, rest) = built.split_first().ok_or_else(|| {
            Error::BackendUnavailable {
                backend: self.name().to_string(),
                reason: "built an empty command line".to_string(),
            }
        })?;
        std::process::Command::new(exe).args(rest).spawn().map_err(Error::Io)
    }

    /// Spawns and waits, returning the child's exit code. The default
    /// launch path: callers that need to read a side-channel fd while
    /// the container runs use `spawn` directly instead.
    fn execute(&self, plan: &ExecPlan, argv: &[String]) -> Result<i32> {
        let status = self.spawn(plan, argv)?.wait().map_err(Error::Io)?;
        Ok(status.code().unwrap_or(-1))
    }
}

/// The static backend registry (spec.md §4.5 table), replacing the
/// original's `walk_packages`-based dynamic discovery: every backend
/// this crate supports is compiled in, so there is nothing to discover.
pub fn registry() -> Vec<Box<dyn Backend>> {
    vec![
        Box::new(singularity::Singularity),
        Box::new(docker::DockerLike::docker()),
        Box::new(docker::DockerLike::podman()),
        Box::new(shifter::Shifter),
        Box::new(containerd::Containerd),
    ]
}

pub fn backend_by_name(name: &str) -> Option<Box<dyn Backend>> {
    registry().into_iter().find(|b| b.name() == name)
}

/// `(suffix, backend-name)` pairs used to infer a backend from an image
/// filename (spec.md §4.5 "Image-to-backend inference").
const MIMES: &[(&str, &str)] = &[(".sif", "singularity")];

/// Claims a backend by the image's filename suffix. An ambiguous or
/// unrecognized suffix returns `None`, requiring an explicit backend.
pub fn guess_backend(image: &Path) -> Option<&'static str> {
    let suffix = image.extension()?.to_str()?;
    let suffix = format!(".{suffix}");

    let matches: Vec<&(&str, &str)> = MIMES.iter().filter(|(s, _)| *s == suffix).collect();
    if matches.len() != 1 {
        return None;
    }
    Some(matches[0].1)
}

pub fn require_backend(name: &str) -> Result<Box<dyn Backend>> {
    let backend = backend_by_name(name).ok_or_else(|| Error::BackendUnavailable {
        backend: name.to_string(),
        reason: format!(
            "not supported at this time. The available backends: {}",
            registry()
                .iter()
                .map(|b| b.name())
                .collect::<Vec<_>>()
                .join(", ")
        ),
    })?;

    if !backend.available() {
        return Err(Error::BackendUnavailable {
            backend: name.to_string(),
            reason: "executable not found on PATH".to_string(),
        });
    }

    Ok(backend)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sif_suffix_resolves_to_singularity() {
        assert_eq!(guess_backend(Path::new("/images/rocky.sif")), Some("singularity"));
    }

    #[test]
    fn unknown_suffix_is_ambiguous() {
        assert_eq!(guess_backend(Path::new("/images/rocky.tar")), None);
    }

    #[test]
    fn registry_lists_every_backend_once() {
        let names: Vec<&'static str> = registry().iter().map(|b| b.name()).collect();
        assert_eq!(names.len(), 4);
        assert!(names.contains(&"singularity"));
        assert!(names.contains(&"docker"));
        assert!(names.contains(&"podman"));
        assert!(names.contains(&"shifter"));
    }
}
