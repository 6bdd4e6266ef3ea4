// Host/Guest Merger (C4): compares two `LibrarySet`s and produces a
// per-soname decision plus the ordered LD_LIBRARY_PATH/LD_PRELOAD
// fragments the launcher hands to the container backend, per spec.md
// §4.4. Grounded on `examples/original_source/e4s_cl/cf/compiler.py`
// (vendor matching) and the teacher's search-path accumulation style
// already used in `libraryset.rs`.

use std::collections::HashSet;

use crate::compiler::Vendor;
use crate::library::{Library, LibrarySet, Origin};
use crate::search_path::SearchPathVec;
use crate::version::Version;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    ImportFromHost,
    KeepGuest,
    Missing,
}

#[derive(Debug, Clone)]
pub struct MergedLibrary {
    pub soname: String,
    pub decision: Decision,
    pub host: Option<Library>,
    pub guest: Option<Library>,
}

/// The full merge result: per-soname decisions plus the two fragments
/// the launcher threads into the guest's environment (spec.md §4.4,
/// last paragraph).
#[derive(Debug, Clone)]
pub struct MergePlan {
    pub libraries: Vec<MergedLibrary>,
    pub libc_ok: bool,
    pub ld_library_path: SearchPathVec,
    pub ld_preload: Vec<String>,
}

impl MergePlan {
    pub fn missing(&self) -> impl Iterator<Item = &MergedLibrary> {
        self.libraries.iter().filter(|m| m.decision == Decision::Missing)
    }
}

/// Determines the libc gate per spec.md §4.4: host libraries may be
/// imported only when the host libc is at least as new as the guest's.
/// A program linked against a newer libc's symbol versions cannot load
/// under an older one; `host < guest` means the opposite would be
/// required, so the gate refuses.
fn libc_gate(host_libc: Option<Version>, guest_libc: Option<Version>) -> bool {
    match (host_libc, guest_libc) {
        (Some(h), Some(g)) => h >= g,
        // Without a version on one side the comparison cannot be made;
        // fail closed rather than import blindly.
        _ => false,
    }
}

/// Merges `host` and `guest` into a `MergePlan`. `mpi_vendor` is the
/// compiler vendor of the MPI stack the launch was requested for
/// (spec.md: "the requested MPI stack's vendor"); `force_host` is the
/// operator override set of sonames that always import from the host
/// even when the vendor check would otherwise keep the guest copy.
/// `libc_override` forces the gate open regardless of `libc_gate`'s
/// verdict, mirroring the operator override spec.md §4.4 allows for.
pub fn merge(
    host: &LibrarySet,
    guest: &LibrarySet,
    host_libc: Option<Version>,
    guest_libc: Option<Version>,
    mpi_vendor: Vendor,
    force_host: &HashSet<String>,
    libc_override: bool,
) -> MergePlan {
    let libc_ok = libc_override || libc_gate(host_libc, guest_libc);

    let mut sonames: Vec<&str> = Vec::new();
    for lib in host.iter() {
        sonames.push(&lib.soname);
    }
    for lib in guest.iter() {
        if !host.contains(&lib.soname) {
            sonames.push(&lib.soname);
        }
    }

    let mut libraries = Vec::with_capacity(sonames.len());
    let mut ld_library_path = SearchPathVec::new();
    let mut ld_preload = Vec::new();

    for soname in sonames {
        let in_host = host.get(soname);
        let in_guest = guest.get(soname);

        let decision = match (in_host, in_guest) {
            (Some(h), None) => import_if_resolved(h, libc_ok),
            (Some(h), Some(_)) => {
                if force_host.contains(soname) {
                    import_if_resolved(h, libc_ok)
                } else if h.compiler_vendor == mpi_vendor {
                    import_if_resolved(h, libc_ok)
                } else {
                    Decision::KeepGuest
                }
            }
            (None, Some(g)) => {
                if g.is_missing() {
                    Decision::Missing
                } else {
                    Decision::KeepGuest
                }
            }
            (None, None) => Decision::Missing,
        };

        if decision == Decision::ImportFromHost {
            if let Some(h) = in_host {
                if let Some(dir) = h.path.parent() {
                    ld_library_path.push_unique_str(dir);
                }
            }
        }

        libraries.push(MergedLibrary {
            soname: soname.to_string(),
            decision,
            host: in_host.cloned(),
            guest: in_guest.cloned(),
        });
    }

    // The host loader is always imported and bound over the guest's, so
    // that the guest's .interp is transparently served by the host
    // (spec.md §4.4 "Dynamic linker").
    for lib in host.iter() {
        if crate::interp::is_loader(&lib.soname) && !lib.is_missing() {
            if let Some(dir) = lib.path.parent() {
                ld_library_path.push_unique_str(dir);
            }
        }
    }

    for merged in &libraries {
        if merged.decision == Decision::ImportFromHost {
            if let Some(h) = &merged.host {
                if requires_preload(h) {
                    ld_preload.push(h.path.to_string_lossy().into_owned());
                }
            }
        }
    }

    MergePlan {
        libraries,
        libc_ok,
        ld_library_path,
        ld_preload,
    }
}

fn import_if_resolved(host_lib: &Library, libc_ok: bool) -> Decision {
    if host_lib.is_missing() {
        return Decision::Missing;
    }
    if !libc_ok {
        return Decision::KeepGuest;
    }
    Decision::ImportFromHost
}

/// A host-origin library must be force-loaded via LD_PRELOAD, rather
/// than relying on the rewritten LD_LIBRARY_PATH alone, when the guest
/// binary's own dynamic section cannot be made to find it by search
/// path alone -- vendor MPI shim libraries are the motivating case in
/// spec.md §4.4 ("e.g. vendor MPI shim libs"). Origin::Host plus a
/// soname containing "shim" is the signal the original e4s-cl used for
/// Wi4MPI's translation libraries; anything else relies on the rewired
/// search path.
fn requires_preload(lib: &Library) -> bool {
    lib.origin == Origin::Host && lib.soname.contains("shim")
}

trait PushUniqueStr {
    fn push_unique_str(&mut self, dir: &std::path::Path);
}

impl PushUniqueStr for SearchPathVec {
    fn push_unique_str(&mut self, dir: &std::path::Path) {
        let path = dir.to_string_lossy().into_owned();
        if !self.iter().any(|p| p.path == path) {
            self.push(crate::search_path::SearchPath {
                path,
                dev: 0,
                ino: 0,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn lib(soname: &str, path: &str, origin: Origin, vendor: Vendor) -> Library {
        Library {
            path: PathBuf::from(path),
            soname: soname.to_string(),
            needed: Vec::new(),
            rpath: SearchPathVec::new(),
            runpath: SearchPathVec::new(),
            interpreter: String::new(),
            build_id: None,
            origin,
            compiler_vendor: vendor,
        }
    }

    #[test]
    fn host_only_library_imports_when_libc_ok() {
        let mut host = LibrarySet::new();
        host.insert(lib("libmpi.so.12", "/opt/mpi/lib/libmpi.so.12", Origin::Host, Vendor::Gnu));
        let guest = LibrarySet::new();

        let plan = merge(
            &host,
            &guest,
            Some(Version::new(2, 31, 0)),
            Some(Version::new(2, 28, 0)),
            Vendor::Gnu,
            &HashSet::new(),
            false,
        );

        assert!(plan.libc_ok);
        assert_eq!(plan.libraries[0].decision, Decision::ImportFromHost);
        assert_eq!(plan.ld_library_path[0].path, "/opt/mpi/lib");
    }

    #[test]
    fn older_host_libc_keeps_guest() {
        let mut host = LibrarySet::new();
        host.insert(lib("libmpi.so.12", "/opt/mpi/lib/libmpi.so.12", Origin::Host, Vendor::Gnu));
        let mut guest = LibrarySet::new();
        guest.insert(lib("libmpi.so.12", "/usr/lib/libmpi.so.12", Origin::Guest, Vendor::Gnu));

        let plan = merge(
            &host,
            &guest,
            Some(Version::new(2, 17, 0)),
            Some(Version::new(2, 31, 0)),
            Vendor::Gnu,
            &HashSet::new(),
            false,
        );

        assert!(!plan.libc_ok);
        assert_eq!(plan.libraries[0].decision, Decision::KeepGuest);
    }

    #[test]
    fn vendor_mismatch_keeps_guest_copy() {
        let mut host = LibrarySet::new();
        host.insert(lib("libmpi.so.12", "/opt/mpi/lib/libmpi.so.12", Origin::Host, Vendor::Amd));
        let mut guest = LibrarySet::new();
        guest.insert(lib("libmpi.so.12", "/usr/lib/libmpi.so.12", Origin::Guest, Vendor::Gnu));

        let plan = merge(
            &host,
            &guest,
            Some(Version::new(2, 31, 0)),
            Some(Version::new(2, 28, 0)),
            Vendor::Gnu,
            &HashSet::new(),
            false,
        );

        assert_eq!(plan.libraries[0].decision, Decision::KeepGuest);
    }

    #[test]
    fn force_host_overrides_vendor_mismatch() {
        let mut host = LibrarySet::new();
        host.insert(lib("libmpi.so.12", "/opt/mpi/lib/libmpi.so.12", Origin::Host, Vendor::Amd));
        let mut guest = LibrarySet::new();
        guest.insert(lib("libmpi.so.12", "/usr/lib/libmpi.so.12", Origin::Guest, Vendor::Gnu));

        let mut force_host = HashSet::new();
        force_host.insert("libmpi.so.12".to_string());

        let plan = merge(
            &host,
            &guest,
            Some(Version::new(2, 31, 0)),
            Some(Version::new(2, 28, 0)),
            Vendor::Gnu,
            &force_host,
            false,
        );

        assert_eq!(plan.libraries[0].decision, Decision::ImportFromHost);
    }

    #[test]
    fn missing_from_both_is_flagged() {
        let host = LibrarySet::new();
        let mut guest = LibrarySet::new();
        guest.insert(Library::missing("libdoesnotexist.so".to_string(), Origin::Guest));

        let plan = merge(
            &host,
            &guest,
            Some(Version::new(2, 31, 0)),
            Some(Version::new(2, 28, 0)),
            Vendor::Gnu,
            &HashSet::new(),
            false,
        );

        assert_eq!(plan.missing().count(), 1);
    }

    #[test]
    fn libc_override_forces_gate_open() {
        let mut host = LibrarySet::new();
        host.insert(lib("libmpi.so.12", "/opt/mpi/lib/libmpi.so.12", Origin::Host, Vendor::Gnu));
        let guest = LibrarySet::new();

        let plan = merge(&host, &guest, None, None, Vendor::Gnu, &HashSet::new(), true);

        assert!(plan.libc_ok);
        assert_eq!(plan.libraries[0].decision, Decision::ImportFromHost);
    }
}
