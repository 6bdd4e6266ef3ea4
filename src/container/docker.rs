// Docker/Podman backend (spec.md §4.5 table). The two share an
// (almost) identical CLI surface, so one driver parameterized on its
// executable name covers both, the way the original's per-module
// `executable_name` class attribute did.

use log::debug;
use which::which;

use super::{Backend, ExecPlan, FileOption};
use crate::error::{Error, Result};

pub struct DockerLike {
    executable: &'static str,
}

impl DockerLike {
    pub fn docker() -> Self {
        DockerLike { executable: "docker" }
    }

    pub fn podman() -> Self {
        DockerLike { executable: "podman" }
    }
}

impl Backend for DockerLike {
    fn name(&self) -> &'static str {
        self.executable
    }

    fn available(&self) -> bool {
        which(self.executable).is_ok()
    }

    fn build_argv(&self, plan: &ExecPlan, argv: &[String]) -> Result<Vec<String>> {
        if !self.available() {
            return Err(Error::BackendUnavailable {
                backend: self.name().to_string(),
                reason: format!("'{}' not found on PATH", self.executable),
            });
        }

        let mut built = vec![self.executable.to_string(), "run".to_string(), "--rm".to_string()];

        for bind in &plan.binds {
            let rw = matches!(bind.option, FileOption::ReadWrite);
            let flag = format!(
                "{}:{}{}",
                bind.host.display(),
                bind.guest.display(),
                if rw { ":rw" } else { ":ro" }
            );
            built.push("-v".to_string());
            built.push(flag);
        }

        for (key, value) in &plan.env {
            built.push("-e".to_string());
            built.push(format!("{key}={value}"));
        }
        if !plan.ld_preload.is_empty() {
            built.push("-e".to_string());
            built.push(format!("LD_PRELOAD={}", plan.ld_preload.join(":")));
        }
        if !plan.ld_library_path.is_empty() {
            built.push("-e".to_string());
            built.push(format!("LD_LIBRARY_PATH={}", plan.ld_library_path.join(":")));
        }

        built.push(plan.image.clone());
        built.extend(argv.iter().cloned());

        debug!("{}: {:?}", self.executable, built);

        Ok(built)
    }
}
