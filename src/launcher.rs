// Launcher Orchestrator (C7), per spec.md §4.7. Chains C2-C6 into the
// pseudo-contract: split argv, gather a profile, compute the host
// closure, introspect the guest once, merge, materialize an `ExecPlan`,
// and re-invoke the HPC launcher with the program replaced by a
// self-reinvocation that sets env and execs the real command inside
// each rank's container.

use std::collections::HashSet;
use std::ffi::CString;
use std::path::PathBuf;

use log::{debug, info};

use crate::argv_split;
use crate::compiler::Vendor;
use crate::config::RunContext;
use crate::container::{self, Backend, Bind, ExecPlan, FileOption};
use crate::error::{Error, Result};
use crate::interp;
use crate::introspect::{self, IntrospectionReport};
use crate::library::{Library, LibrarySet, Origin};
use crate::libraryset::{self, ClosureContext};
use crate::merge;
use crate::profile::{Profile, ProfileOverrides, ProfileStore};
use crate::version::Version;
use crate::wi4mpi;

/// Everything `launch` needs that the CLI layer parsed, collected ahead
/// of the orchestrator so this module stays independent of `argh`.
pub struct LaunchRequest {
    pub profile: Option<String>,
    pub image: Option<String>,
    pub backend: Option<String>,
    pub files: Vec<String>,
    pub libraries: Vec<String>,
    /// The full `<launcher> [launcher-args] <program> [program-args]`
    /// argv, not yet split (spec.md §4.7 step 1).
    pub argv: Vec<String>,
}

fn closure_context(ctx: &RunContext) -> ClosureContext {
    ClosureContext {
        ld_library_path: ctx.ld_library_path.clone(),
        ld_so_conf: ctx.ld_so_conf.clone(),
        system_dirs: ctx.system_dirs.clone(),
    }
}

/// Reassembles an `IntrospectionReport`'s flat `LibraryRecord`s into a
/// `LibrarySet` tagged `Origin::Guest`, the shape `merge::merge` expects
/// on its guest side. The report carries no ELF/vendor data (the guest
/// only reports what spec.md §4.6 asks it to), so vendor is `Unknown`
/// and rpath/runpath are rebuilt as bare, unvalidated search entries.
fn guest_set_from_report(report: &IntrospectionReport) -> LibrarySet {
    let mut set = LibrarySet::new();
    for record in &report.libraries {
        let rpath = record
            .rpath
            .iter()
            .map(|p| crate::search_path::SearchPath { path: p.clone(), dev: 0, ino: 0 })
            .collect();
        let runpath = record
            .runpath
            .iter()
            .map(|p| crate::search_path::SearchPath { path: p.clone(), dev: 0, ino: 0 })
            .collect();

        let library = if record.path.as_os_str().is_empty() {
            Library::missing(record.soname.clone(), Origin::Guest)
        } else {
            Library {
                path: record.path.clone(),
                soname: record.soname.clone(),
                needed: record.needed.clone(),
                rpath,
                runpath,
                interpreter: String::new(),
                build_id: record.build_id.clone(),
                origin: Origin::Guest,
                compiler_vendor: Vendor::Unknown,
            }
        };
        set.insert(library);
    }
    set
}

/// The compiler vendor to require a host match against before importing
/// a library both sides ship (spec.md §4.4: "the requested MPI stack's
/// vendor"), taken from the first seed soname's resolution in the host
/// closure -- the profile names the MPI library it wants first.
fn mpi_vendor(host_set: &LibrarySet, seeds: &[String]) -> Vendor {
    seeds
        .first()
        .and_then(|s| host_set.get(s))
        .map(|l| l.compiler_vendor)
        .unwrap_or(Vendor::Gnu)
}

fn execvp_replace(argv: &[String]) -> Result<i32> {
    let cargv: Vec<CString> = argv
        .iter()
        .map(|s| CString::new(s.as_bytes()).map_err(|e| Error::Launcher(e.to_string())))
        .collect::<Result<_>>()?;
    let (path, rest) = cargv.split_first().ok_or_else(|| {
        Error::Launcher("re-invocation produced an empty argv".to_string())
    })?;
    let mut full = vec![path.clone()];
    full.extend(rest.iter().cloned());

    // `execvp` only returns on failure: success replaces this process'
    // image entirely, per spec.md §4.7 step 7.
    nix::unistd::execvp(path, &full).map_err(|e| Error::Launcher(format!("execvp failed: {e}")))?;
    unreachable!("execvp does not return on success")
}

/// Forks, runs `argv` (the HPC launcher wrapping the container backend)
/// in the child, waits for it, then returns -- keeping whatever guard
/// the caller holds (the Shifter staging `TempDir`) alive until the
/// whole launcher has exited, since Shifter's own cleanup is not safe to
/// run until every rank's container has returned (spec.md §4.5).
fn fork_and_wait(argv: &[String]) -> Result<i32> {
    use nix::sys::wait::{waitpid, WaitStatus};
    use nix::unistd::{fork, ForkResult};

    // SAFETY: the child immediately calls `execvp_replace` or `_exit`
    // without touching any shared mutable state inherited from the
    // parent beyond the stack frame captured here.
    match unsafe { fork() }.map_err(|e| Error::Launcher(format!("fork failed: {e}")))? {
        ForkResult::Child => {
            let code = match execvp_replace(argv) {
                Ok(code) => code,
                Err(e) => {
                    eprintln!("{e}");
                    127
                }
            };
            std::process::exit(code);
        }
        ForkResult::Parent { child } => match waitpid(child, None) {
            Ok(WaitStatus::Exited(_, code)) => Ok(code),
            Ok(_) => Ok(-1),
            Err(e) => Err(Error::Launcher(format!("waitpid failed: {e}"))),
        },
    }
}

/// Builds the re-invocation argv and runs it, per spec.md §4.7 step 7.
/// Every backend except Shifter produces a plain argv that can
/// `execvp`-replace this process outright; Shifter's staging directory
/// must outlive the whole launcher, so that one path forks instead.
fn reinvoke(backend: &dyn Backend, launcher_argv: &[String], plan: &ExecPlan, inner_argv: &[String]) -> Result<i32> {
    if backend.name() == "shifter" {
        let (staging, built) = crate::container::shifter_stage_for_launch(plan, inner_argv)?;
        let mut full = launcher_argv.to_vec();
        full.extend(built);
        let result = fork_and_wait(&full);
        drop(staging);
        return result;
    }

    let built = backend.build_argv(plan, inner_argv)?;
    let mut full = launcher_argv.to_vec();
    full.extend(built);

    if full.is_empty() {
        return Err(Error::Launcher("nothing to execute".to_string()));
    }

    execvp_replace(&full)
}

/// Runs the full orchestration pseudo-contract of spec.md §4.7. Returns
/// the exit code to propagate, or never returns on the common success
/// path (the process image is replaced by `execvp`).
pub fn launch(ctx: &RunContext, req: LaunchRequest, dry_run: bool) -> Result<i32> {
    let (launcher_argv, program_argv) = argv_split::split(&req.argv);
    debug!("launcher argv: {:?}, program argv: {:?}", launcher_argv, program_argv);

    let store = ProfileStore::open(ProfileStore::default_path())?;
    let base = match &req.profile {
        Some(name) => store
            .get(name)
            .cloned()
            .ok_or_else(|| Error::Configuration(format!("profile '{name}' does not exist")))?,
        None => store.selected().cloned().unwrap_or_default(),
    };

    let overrides = ProfileOverrides {
        image: req.image.clone(),
        backend: req.backend.clone(),
        libraries: req.libraries.clone(),
        files: req.files.clone(),
        source: None,
    };
    let merged: Profile = base.merged_with(&overrides);

    let image = merged
        .image
        .clone()
        .ok_or_else(|| Error::Configuration("no container image specified".to_string()))?;

    let backend_name = merged
        .backend
        .clone()
        .or_else(|| container::guess_backend(&PathBuf::from(&image)).map(str::to_string))
        .ok_or_else(|| {
            Error::Configuration("could not infer a backend from the image; pass --backend".to_string())
        })?;
    let backend = container::require_backend(&backend_name)?;

    // Step 3: host closure.
    let closure_ctx = closure_context(ctx);
    let resolve_ctx = closure_ctx.as_resolve_context(ctx.platform.as_ref());
    let preload: Vec<String> = ctx.ld_preload.iter().map(|p| p.path.clone()).collect();
    let host_set = libraryset::closure(&merged.libraries, &preload, Origin::Host, &resolve_ctx);

    let mut plan = ExecPlan {
        image: image.clone(),
        ..Default::default()
    };
    for file in &merged.files {
        plan.bind_file(file.clone(), file.clone(), FileOption::ReadOnly);
    }

    // Step 4: introspect the guest once (not once per rank).
    let self_exe = std::env::current_exe().map_err(Error::Io)?;
    let analyze_argv = vec![
        self_exe.to_string_lossy().into_owned(),
        "analyze".to_string(),
        "--libraries".to_string(),
        merged.libraries.join(","),
    ];
    let report = if backend_name == "shifter" {
        let (read_fd, write_fd) = introspect::prepare(&mut plan)?;
        let (staging, child) = container::shifter_spawn_for_introspection(&plan, &analyze_argv)?;
        let result = introspect::collect_child(child, read_fd, write_fd);
        drop(staging);
        result?
    } else {
        introspect::collect(backend.as_ref(), &mut plan, &analyze_argv)?
    };
    let guest_libc = Version::parse(&report.libc_version);
    let guest_set = guest_set_from_report(&report);

    // Step 5: merge.
    let host_libc = introspect::guest_libc_version().ok();
    let vendor = mpi_vendor(&host_set, &merged.libraries);
    let plan_merge = merge::merge(&host_set, &guest_set, host_libc, guest_libc, vendor, &HashSet::new(), false);

    if plan_merge.missing().count() > 0 {
        for missing in plan_merge.missing() {
            log::warn!("library '{}' could not be resolved on either side", missing.soname);
        }
    }

    // Step 6: materialize plan. Every import-from-host library and the
    // host loader are bound host-path -> same guest path.
    for merged_lib in &plan_merge.libraries {
        if merged_lib.decision == merge::Decision::ImportFromHost {
            if let Some(host_lib) = &merged_lib.host {
                bind_same_path(&mut plan, host_lib);
            }
        }
    }
    for host_lib in host_set.iter() {
        if interp::is_loader(&host_lib.soname) && !host_lib.is_missing() {
            bind_same_path(&mut plan, host_lib);
        }
    }

    plan.ld_library_path = plan_merge.ld_library_path.iter().map(|p| p.path.clone()).collect();
    plan.ld_preload = plan_merge.ld_preload.clone();

    if wi4mpi::enabled() {
        if let Some(root) = wi4mpi::root() {
            wi4mpi::import(&mut plan, &root);
        }
    }

    if dry_run {
        let json = serde_json::to_string_pretty(&plan)?;
        println!("{json}");
        return Ok(0);
    }

    // Step 7: materialize the plan to disk, bind it and this binary into
    // the guest, and re-invoke.
    let plan_file = tempfile::Builder::new()
        .prefix("e4s-cl-plan-")
        .suffix(".json")
        .tempfile()
        .map_err(Error::Io)?;
    let plan_path = plan_file.path().to_path_buf();
    std::fs::write(&plan_path, serde_json::to_vec(&plan)?)?;
    plan.bind_file(plan_path.clone(), plan_path.clone(), FileOption::ReadOnly);
    plan.bind_file(self_exe.clone(), self_exe.clone(), FileOption::ReadOnly);
    std::fs::write(&plan_path, serde_json::to_vec(&plan)?)?;

    let mut inner_argv = vec![
        self_exe.to_string_lossy().into_owned(),
        "execute".to_string(),
        "--plan".to_string(),
        plan_path.to_string_lossy().into_owned(),
        "--".to_string(),
    ];
    inner_argv.extend(program_argv.iter().cloned());

    info!("launching '{image}' via {backend_name}");
    let code = reinvoke(backend.as_ref(), &launcher_argv, &plan, &inner_argv)?;
    // `plan_file` is kept alive (and removed) until the re-invocation
    // above has returned; the guest only needs to read it up to the
    // moment each rank's `execute` subcommand loads it.
    drop(plan_file);
    Ok(code)
}

fn bind_same_path(plan: &mut ExecPlan, lib: &Library) {
    if plan.binds.iter().any(|b: &Bind| b.host == lib.path) {
        return;
    }
    plan.bind_file(lib.path.clone(), lib.path.clone(), FileOption::ReadOnly);
}

/// The guest-side introspection entry point (C6), dispatched from the
/// internal `analyze` subcommand re-invoked inside the container by
/// `launch`'s step 4.
pub fn run_analyze(libraries: &[String]) -> Result<i32> {
    let report = introspect::analyze(libraries)?;
    introspect::emit(&report)?;
    Ok(0)
}

/// The guest-side exec entry point, dispatched from the internal
/// `execute` subcommand re-invoked inside the container by `launch`'s
/// step 7: loads the materialized `ExecPlan`, applies its environment,
/// and `exec`s the real program in its place.
pub fn run_execute(plan_path: &str, program_argv: &[String]) -> Result<i32> {
    let text = std::fs::read_to_string(plan_path)?;
    let plan: ExecPlan = serde_json::from_str(&text)?;

    if !plan.ld_preload.is_empty() {
        std::env::set_var("LD_PRELOAD", plan.ld_preload.join(":"));
    }
    if !plan.ld_library_path.is_empty() {
        std::env::set_var("LD_LIBRARY_PATH", plan.ld_library_path.join(":"));
    }
    for (key, value) in &plan.env {
        std::env::set_var(key, value);
    }

    if program_argv.is_empty() {
        return Err(Error::Launcher("no program given to execute".to_string()));
    }
    execvp_replace(program_argv)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::LibraryRecord;

    #[test]
    fn guest_report_round_trips_into_a_library_set() {
        let report = IntrospectionReport {
            libc_version: "2.31.0".to_string(),
            libraries: vec![
                LibraryRecord {
                    soname: "libc.so.6".to_string(),
                    path: "/lib64/libc.so.6".into(),
                    needed: Vec::new(),
                    rpath: Vec::new(),
                    runpath: Vec::new(),
                    build_id: None,
                },
                LibraryRecord {
                    soname: "libdoesnotexist.so".to_string(),
                    path: PathBuf::new(),
                    needed: Vec::new(),
                    rpath: Vec::new(),
                    runpath: Vec::new(),
                    build_id: None,
                },
            ],
        };

        let set = guest_set_from_report(&report);
        assert_eq!(set.len(), 2);
        assert!(!set.get("libc.so.6").unwrap().is_missing());
        assert!(set.get("libdoesnotexist.so").unwrap().is_missing());
    }

    #[test]
    fn mpi_vendor_falls_back_to_gnu_without_a_match() {
        let set = LibrarySet::new();
        assert_eq!(mpi_vendor(&set, &["libmpi.so.12".to_string()]), Vendor::Gnu);
    }
}
