// Launcher argument split (C7 step 1), per spec.md §4.7: partitions the
// user's "launcher-and-program" argv into the launcher invocation and the
// program invocation, using a static table of known launchers and which of
// their flags take a separate value argument. This table is deliberately
// thin (spec.md §1 names "launcher-argument grammar" as a named external
// collaborator, not core scope); it only needs to know enough to find
// where the launcher's own options end and the user program begins.

use std::path::Path;

/// One entry per known launcher: its flags that consume the following
/// token as a value (as opposed to boolean switches), so the scanner
/// knows to skip that token rather than mistake it for the program.
struct LauncherSpec {
    name: &'static str,
    value_flags: &'static [&'static str],
}

const LAUNCHERS: &[LauncherSpec] = &[
    LauncherSpec {
        name: "mpirun",
        value_flags: &[
            "-n", "-np", "--np", "-c", "-host", "--host", "-hostfile", "--hostfile", "-x",
            "-wdir", "--wdir", "-np", "-npernode", "--npernode", "-mca", "--mca",
        ],
    },
    LauncherSpec {
        name: "mpiexec",
        value_flags: &[
            "-n", "-np", "--np", "-c", "-host", "--host", "-hostfile", "--hostfile", "-x",
            "-wdir", "--wdir", "-mca", "--mca",
        ],
    },
    LauncherSpec {
        name: "orterun",
        value_flags: &[
            "-n", "-np", "--np", "-host", "--host", "-hostfile", "--hostfile", "-x", "-mca",
            "--mca",
        ],
    },
    LauncherSpec {
        name: "srun",
        value_flags: &[
            "-n", "--ntasks", "-N", "--nodes", "-p", "--partition", "-t", "--time", "-c",
            "--cpus-per-task", "-A", "--account", "-J", "--job-name", "-w", "--nodelist", "-o",
            "--output", "-e", "--error",
        ],
    },
    LauncherSpec {
        name: "jsrun",
        value_flags: &[
            "-n", "--nrs", "-a", "--tasks_per_rs", "-c", "--cpu_per_rs", "-g", "--gpu_per_rs",
            "-r", "--rs_per_host", "-d", "--launch_distribution",
        ],
    },
    LauncherSpec {
        name: "prun",
        value_flags: &["-n", "-N", "-hostfile"],
    },
    LauncherSpec {
        name: "aprun",
        value_flags: &["-n", "-N", "-d", "-cc", "-L"],
    },
];

fn lookup(name: &str) -> Option<&'static LauncherSpec> {
    LAUNCHERS.iter().find(|spec| spec.name == name)
}

/// Splits `args` into `(launcher_and_args, program_and_args)`. When the
/// first token's basename does not name a known launcher, the whole
/// input is treated as the program with an empty launcher, per spec.md
/// §4.7 step 1 ("Unrecognized launchers: treat the first token as
/// program, empty launcher").
pub fn split(args: &[String]) -> (Vec<String>, Vec<String>) {
    let Some(first) = args.first() else {
        return (Vec::new(), Vec::new());
    };

    let basename = Path::new(first)
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or(first.as_str());

    let Some(spec) = lookup(basename) else {
        return (Vec::new(), args.to_vec());
    };

    let mut i = 1;
    while i < args.len() {
        let arg = &args[i];
        if !arg.starts_with('-') {
            break;
        }
        i += 1;
        if spec.value_flags.contains(&arg.as_str()) && i < args.len() {
            i += 1;
        }
    }

    let launcher = args[..i].to_vec();
    let program = args[i..].to_vec();
    (launcher, program)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn known_launcher_splits_at_first_non_flag() {
        let args = v(&["mpirun", "-n", "4", "--host", "node01", "./a.out", "--iters", "10"]);
        let (launcher, program) = split(&args);
        assert_eq!(launcher, v(&["mpirun", "-n", "4", "--host", "node01"]));
        assert_eq!(program, v(&["./a.out", "--iters", "10"]));
    }

    #[test]
    fn srun_splits_correctly() {
        let args = v(&["srun", "-N", "2", "-p", "gpu", "./job"]);
        let (launcher, program) = split(&args);
        assert_eq!(launcher, v(&["srun", "-N", "2", "-p", "gpu"]));
        assert_eq!(program, v(&["./job"]));
    }

    #[test]
    fn unrecognized_launcher_becomes_bare_program() {
        let args = v(&["./a.out", "--flag"]);
        let (launcher, program) = split(&args);
        assert!(launcher.is_empty());
        assert_eq!(program, v(&["./a.out", "--flag"]));
    }

    #[test]
    fn launcher_found_via_absolute_path_basename() {
        let args = v(&["/opt/openmpi/bin/mpirun", "-np", "2", "./a.out"]);
        let (launcher, program) = split(&args);
        assert_eq!(launcher, v(&["/opt/openmpi/bin/mpirun", "-np", "2"]));
        assert_eq!(program, v(&["./a.out"]));
    }

    #[test]
    fn empty_input_is_empty() {
        let (launcher, program) = split(&[]);
        assert!(launcher.is_empty());
        assert!(program.is_empty());
    }
}
