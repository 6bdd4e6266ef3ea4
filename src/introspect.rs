// Guest Introspection (C6), per spec.md §4.6. Grounded on
// `examples/original_source/packages/e4s_cl/cli/commands/analyze.py`
// (the `__E4S_CL_JSON_FD` env var contract and the resolve-then-dump
// shape of the inner "analyze" invocation).

use std::io::{Read, Write};
use std::os::unix::io::FromRawFd;
use std::process::Command;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::container::{Backend, ExecPlan};
use crate::error::{Error, Result};
use crate::libraryset::{self, ClosureContext};
use crate::library::{LibraryRecord, Origin};
use crate::resolver::ResolveContext;
use crate::version::Version;

/// The environment variable the guest-side "analyze" re-invocation reads
/// to find its side-channel write end, named after the original's
/// `__E4S_CL_JSON_FD`.
pub use crate::container::SIDE_CHANNEL_FD_ENV as FD_ENV_VAR;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntrospectionReport {
    pub libc_version: String,
    pub libraries: Vec<LibraryRecord>,
}

/// Runs `ldd --version` and parses the leading version number on its
/// first line (spec.md §4.6 step 3).
pub fn guest_libc_version() -> Result<Version> {
    let output = Command::new("ldd").arg("--version").output().map_err(Error::Io)?;
    let text = String::from_utf8_lossy(&output.stdout);
    let first_line = text.lines().next().unwrap_or("");
    Version::parse(first_line).ok_or_else(|| {
        Error::Configuration(format!("could not parse libc version from: {first_line}"))
    })
}

/// Guest-side analyze pass: resolves every requested soname against the
/// guest's own filesystem (C2+C3, unchanged -- the difference is purely
/// which root filesystem `resolve`/`closure` see when this process runs
/// inside the container) and builds the document the host expects.
pub fn analyze(sonames: &[String]) -> Result<IntrospectionReport> {
    let ctx: ClosureContext = libraryset::host_closure_context(Vec::new());
    let resolve_ctx: ResolveContext = ctx.as_resolve_context(None);

    let set = libraryset::closure(sonames, &[], Origin::Guest, &resolve_ctx);
    let libc_version = guest_libc_version()?;

    let libraries = set.iter().map(LibraryRecord::from).collect();

    Ok(IntrospectionReport {
        libc_version: libc_version.to_string(),
        libraries,
    })
}

/// Writes `report` as a single JSON document to the fd named by
/// `FD_ENV_VAR`, then returns -- the caller (the analyze subcommand's
/// dispatch in `main.rs`) exits 0 immediately afterwards, per spec.md
/// §4.6 step 4.
pub fn emit(report: &IntrospectionReport) -> Result<()> {
    let fd_value = std::env::var(FD_ENV_VAR)
        .map_err(|_| Error::Configuration(format!("{FD_ENV_VAR} is not set")))?;
    let fd: i32 = fd_value
        .parse()
        .map_err(|_| Error::Configuration(format!("{FD_ENV_VAR} is not a valid fd: {fd_value}")))?;

    let bytes = serde_json::to_vec(report)?;

    // SAFETY: `fd` names a file descriptor this process inherited across
    // the container runtime boundary specifically for this write; it is
    // not otherwise owned anywhere else in this process.
    let mut file = unsafe { std::fs::File::from_raw_fd(fd) };
    file.write_all(&bytes).map_err(Error::Io)?;
    Ok(())
}

/// Opens the introspection pipe and records its write end on `plan` via
/// `FD_ENV_VAR`, ahead of spawning the guest process. Split out of
/// `collect` so callers that cannot use `Backend::spawn` directly (the
/// Shifter staged-execution path in `src/launcher.rs`) can still follow
/// the same side-channel protocol.
pub fn prepare(plan: &mut ExecPlan) -> Result<(i32, i32)> {
    let (read_fd, write_fd) = nix::unistd::pipe().map_err(|e| {
        Error::Configuration(format!("could not create introspection pipe: {e}"))
    })?;
    plan.set_env(FD_ENV_VAR, write_fd.to_string());
    Ok((read_fd, write_fd))
}

/// Waits for the already-spawned guest `child`, then reads its JSON
/// document from `read_fd` to completion. `write_fd` is the parent's own
/// copy of the pipe's write end (from `prepare`), closed here so that
/// EOF on `read_fd` is reachable once the guest's copy closes too.
pub fn collect_child(mut child: std::process::Child, read_fd: i32, write_fd: i32) -> Result<IntrospectionReport> {
    let _ = nix::unistd::close(write_fd);

    let status = child.wait().map_err(Error::Io)?;
    let code = status.code().unwrap_or(-1);
    if code != 0 {
        let _ = nix::unistd::close(read_fd);
        return Err(Error::AnalysisFailed(code));
    }

    let mut buf = Vec::new();
    // SAFETY: `read_fd` was produced by `nix::unistd::pipe` in `prepare`
    // and is not read from anywhere else in this process.
    let mut file = unsafe { std::fs::File::from_raw_fd(read_fd) };
    file.read_to_end(&mut buf).map_err(Error::Io)?;

    debug!("introspection document: {} bytes", buf.len());

    let report: IntrospectionReport = serde_json::from_slice(&buf)?;
    Ok(report)
}

/// Host-side collection: spawns `backend` with `plan`'s `FD_ENV_VAR`
/// pointing at a fresh pipe's write end, waits for the child, then
/// reads the guest's JSON document from the read end. Any non-zero
/// guest exit becomes `Error::AnalysisFailed`. Backends whose `spawn`
/// is unavailable (Shifter) are not usable through this entry point;
/// their callers use `prepare`/`collect_child` directly instead.
pub fn collect(backend: &dyn Backend, plan: &mut ExecPlan, argv: &[String]) -> Result<IntrospectionReport> {
    let (read_fd, write_fd) = prepare(plan)?;
    let child = backend.spawn(plan, argv)?;
    collect_child(child, read_fd, write_fd)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_round_trips_through_json() {
        let report = IntrospectionReport {
            libc_version: "2.31.0".to_string(),
            libraries: vec![LibraryRecord {
                soname: "libc.so.6".to_string(),
                path: "/lib64/libc.so.6".into(),
                needed: Vec::new(),
                rpath: Vec::new(),
                runpath: Vec::new(),
                build_id: None,
            }],
        };

        let bytes = serde_json::to_vec(&report).unwrap();
        let back: IntrospectionReport = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(back.libc_version, "2.31.0");
        assert_eq!(back.libraries.len(), 1);
    }

    #[test]
    fn emit_without_env_var_fails_cleanly() {
        std::env::remove_var(FD_ENV_VAR);
        let report = IntrospectionReport {
            libc_version: "2.31.0".to_string(),
            libraries: Vec::new(),
        };
        assert!(emit(&report).is_err());
    }
}
