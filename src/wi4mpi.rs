// Wi4MPI ABI-translation hook, per SPEC_FULL.md §2.3. Ported from
// `examples/original_source/packages/e4s_cl/cf/wi4mpi.py`: when
// `WI4MPI_VERSION` is set, the orchestrator binds the Wi4MPI install
// directory, appends its `lib` directory to the guest `LD_LIBRARY_PATH`,
// and resolves the translation shim and source/target MPI library paths
// from `WI4MPI_FROM`/`WI4MPI_TO`. spec.md §1 names Wi4MPI as an external
// collaborator for which "we specify only the hooks it plugs into"; this
// module is exactly that hook, carried in full because the original's
// shape is small and fully visible in `original_source/`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::container::{ExecPlan, FileOption};

const fn translate(identifier: &str) -> Option<&'static str> {
    match identifier.as_bytes() {
        b"OMPI" => Some("OPENMPI"),
        b"INTEL" => Some("INTELMPI"),
        b"MPICH" => Some("MPICH"),
        _ => None,
    }
}

/// Whether Wi4MPI ABI translation was requested for this launch, per the
/// original's convoluted-on-purpose double negative: the *value* of
/// `WI4MPI_VERSION` is irrelevant, only its presence is.
pub fn enabled() -> bool {
    std::env::var_os("WI4MPI_VERSION").is_some()
}

pub fn root() -> Option<PathBuf> {
    std::env::var_os("WI4MPI_ROOT").map(PathBuf::from)
}

fn read_cfg(path: &Path) -> HashMap<String, String> {
    let mut config = HashMap::new();
    let Ok(text) = std::fs::read_to_string(path) else {
        return config;
    };
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || !line.contains('=') {
            continue;
        }
        let mut parts = line.splitn(2, '=');
        let (Some(key), Some(value)) = (parts.next(), parts.next()) else {
            continue;
        };
        config.insert(key.to_string(), value.trim_matches('"').to_string());
    }
    config
}

/// Reads the global (`<install_dir>/etc/wi4mpi.cfg`) then per-user
/// (`~/.wi4mpi.cfg`) configuration files, the user file overriding the
/// global one key-by-key, matching `wi4mpi_config`.
pub fn config(install_dir: &Path) -> HashMap<String, String> {
    let mut global_cfg = read_cfg(&install_dir.join("etc/wi4mpi.cfg"));
    let home = std::env::var("HOME").unwrap_or_default();
    let user_cfg = read_cfg(&Path::new(&home).join(".wi4mpi.cfg"));
    global_cfg.extend(user_cfg);
    global_cfg
}

/// Binds the install directory and every `*_ROOT` entry in the merged
/// configuration into `plan`, appending each root's `lib` directory to
/// the guest `LD_LIBRARY_PATH`, matching `wi4mpi_import`.
pub fn import(plan: &mut ExecPlan, install_dir: &Path) {
    plan.bind_file(install_dir, install_dir, FileOption::ReadOnly);

    for (key, value) in config(install_dir) {
        if key.contains("ROOT") && !value.is_empty() {
            let root = PathBuf::from(&value);
            plan.bind_file(root.clone(), root.clone(), FileOption::ReadOnly);
            plan.ld_library_path.push(root.join("lib").to_string_lossy().into_owned());
        }
    }
}

/// Resolves the translation wrapper library and the source/target MPI
/// libraries named by `WI4MPI_FROM`/`WI4MPI_TO`, matching
/// `wi4mpi_libraries`. Returns an empty vector (and logs, per the
/// original) when either variable is missing.
pub fn libraries(install_dir: &Path) -> Vec<PathBuf> {
    let config = config(install_dir);
    let source = std::env::var("WI4MPI_FROM").unwrap_or_default();
    let target = std::env::var("WI4MPI_TO").unwrap_or_default();

    if source.is_empty() || target.is_empty() {
        log::error!("Wi4MPI translation requested but WI4MPI_FROM/WI4MPI_TO are missing");
        return Vec::new();
    }

    let wrapper_lib = install_dir
        .join("libexec")
        .join("wi4mpi")
        .join(format!("libwi4mpi_{source}_{target}.so"));

    let get_lib = |identifier: &str| -> PathBuf {
        let root_key = translate(identifier)
            .map(|t| format!("{t}_DEFAULT_ROOT"))
            .unwrap_or_default();
        let root = config.get(&root_key).cloned().unwrap_or_default();
        PathBuf::from(root).join("lib").join("libmpi.so")
    };

    vec![wrapper_lib, get_lib(&source), get_lib(&target)]
}

/// Selects the elements of the ambient `LD_LIBRARY_PATH` that belong to
/// the Wi4MPI install, matching `wi4mpi_libpath`.
pub fn libpath(install_dir: &Path) -> Vec<PathBuf> {
    let ld_library_path = std::env::var("LD_LIBRARY_PATH").unwrap_or_default();
    let install = install_dir.to_string_lossy().into_owned();
    ld_library_path
        .split(':')
        .filter(|entry| entry.contains(install.as_str()))
        .map(PathBuf::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn reads_global_then_user_override() {
        let dir = tempdir().unwrap();
        let etc = dir.path().join("etc");
        std::fs::create_dir_all(&etc).unwrap();
        let mut f = std::fs::File::create(etc.join("wi4mpi.cfg")).unwrap();
        writeln!(f, "OPENMPI_DEFAULT_ROOT=\"/opt/ompi\"").unwrap();
        writeln!(f, "# a comment").unwrap();

        let cfg = read_cfg(&etc.join("wi4mpi.cfg"));
        assert_eq!(cfg.get("OPENMPI_DEFAULT_ROOT"), Some(&"/opt/ompi".to_string()));
    }

    #[test]
    fn missing_cfg_file_is_empty() {
        let cfg = read_cfg(Path::new("/does/not/exist/wi4mpi.cfg"));
        assert!(cfg.is_empty());
    }

    #[test]
    fn libraries_empty_without_from_to() {
        std::env::remove_var("WI4MPI_FROM");
        std::env::remove_var("WI4MPI_TO");
        assert!(libraries(Path::new("/opt/wi4mpi")).is_empty());
    }
}
