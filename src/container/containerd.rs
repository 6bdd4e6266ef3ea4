// containerd-style backend (spec.md §4.5 table): a thin OCI-bundle
// runner driven through `nerdctl`, the containerd CLI most sites expose
// to users (bare `ctr` has no bind-mount convenience flags). Its flag
// surface mirrors Docker's closely enough that this driver is a
// reduced copy of `docker.rs` rather than new logic.

use log::debug;
use which::which;

use super::{Backend, ExecPlan, FileOption};
use crate::error::{Error, Result};

pub struct Containerd;

impl Backend for Containerd {
    fn name(&self) -> &'static str {
        "containerd"
    }

    fn available(&self) -> bool {
        which("nerdctl").is_ok()
    }

    fn build_argv(&self, plan: &ExecPlan, argv: &[String]) -> Result<Vec<String>> {
        if !self.available() {
            return Err(Error::BackendUnavailable {
                backend: self.name().to_string(),
                reason: "'nerdctl' not found on PATH".to_string(),
            });
        }

        let mut built = vec!["nerdctl".to_string(), "run".to_string(), "--rm".to_string()];

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

        debug!("nerdctl: {:?}", built);

        Ok(built)
    }
}
