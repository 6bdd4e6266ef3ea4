// Singularity/Apptainer backend (spec.md §4.5 table). Both tools share
// one CLI surface (`apptainer` is the upstream rename of `singularity`);
// `which` picks whichever is actually installed, preferring the name
// the operator already has on `PATH`.

use log::debug;
use which::which;

use super::{Backend, ExecPlan, FileOption, SIDE_CHANNEL_FD_ENV};
use crate::error::{Error, Result};

pub struct Singularity;

fn executable() -> Option<&'static str> {
    if which("singularity").is_ok() {
        Some("singularity")
    } else if which("apptainer").is_ok() {
        Some("apptainer")
    } else {
        None
    }
}

impl Backend for Singularity {
    fn name(&self) -> &'static str {
        "singularity"
    }

    fn available(&self) -> bool {
        executable().is_some()
    }

    fn build_argv(&self, plan: &ExecPlan, argv: &[String]) -> Result<Vec<String>> {
        let exe = executable().ok_or_else(|| Error::BackendUnavailable {
            backend: self.name().to_string(),
            reason: "neither 'singularity' nor 'apptainer' found on PATH".to_string(),
        })?;

        let mut built = vec![exe.to_string(), "exec".to_string()];

        // Singularity closes inherited file descriptors by default;
        // the introspection side channel (spec.md §4.6) needs them kept
        // open across the boundary.
        if plan.env.contains_key(SIDE_CHANNEL_FD_ENV) {
            built.push("--keep-fds".to_string());
        }

        for bind in &plan.binds {
            let rw = matches!(bind.option, FileOption::ReadWrite);
            let flag = format!(
                "{}:{}{}",
                bind.host.display(),
                bind.guest.display(),
                if rw { ":rw" } else { ":ro" }
            );
            built.push("--bind".to_string());
            built.push(flag);
        }

        for (key, value) in &plan.env {
            built.push("--env".to_string());
            built.push(format!("{key}={value}"));
        }
        if !plan.ld_preload.is_empty() {
            built.push("--env".to_string());
            built.push(format!("LD_PRELOAD={}", plan.ld_preload.join(":")));
        }
        if !plan.ld_library_path.is_empty() {
            built.push("--env".to_string());
            built.push(format!("LD_LIBRARY_PATH={}", plan.ld_library_path.join(":")));
        }

        built.push(plan.image.clone());
        built.extend(argv.iter().cloned());

        debug!("singularity: {:?}", built);

        Ok(built)
    }
}
