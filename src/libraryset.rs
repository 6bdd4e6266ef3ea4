// Library Graph (C3): computes the transitive closure of shared objects
// starting from a set of seed sonames, via work-queue BFS, per spec.md
// §4.3. Adapted from the teacher's recursive `resolve_dependency`, but
// flattened into a `LibrarySet` (deduplicated by soname) instead of a
// per-binary print tree.

use std::collections::VecDeque;
use std::path::PathBuf;

use log::warn;

use std::path::Path;

use crate::elf::ElfInfo;
use crate::interp;
use crate::ld_conf;
use crate::library::{Library, LibrarySet, Origin};
use crate::resolver::{self, ResolveContext};
use crate::search_path::SearchPathVec;
use crate::system_dirs;

/// Builds the transitive closure of `seeds`, tagging every resolved
/// library with `origin`. `preload` entries (absolute paths) are seeded
/// first, ahead of the ordinary sonames, mirroring LD_PRELOAD's priority
/// in the loader's own search.
pub fn closure(
    seeds: &[String],
    preload: &[String],
    origin: Origin,
    ctx: &ResolveContext,
) -> LibrarySet {
    let mut set = LibrarySet::new();
    let mut queue: VecDeque<(String, Option<ElfInfo>)> = VecDeque::new();

    for soname in preload.iter().chain(seeds.iter()) {
        queue.push_back((soname.clone(), None));
    }

    while let Some((soname, needed_by)) = queue.pop_front() {
        // First resolution wins: a soname encountered twice is never
        // re-resolved, which is what makes the closure deterministic
        // regardless of discovery order (spec.md §4.3).
        if set.contains(&soname) {
            continue;
        }

        match resolver::resolve(&soname, needed_by.as_ref(), ctx) {
            Some(resolved) => {
                let path: PathBuf = resolved.realpath.clone();

                // The dynamic loader itself is always origin-bound to the
                // host: the host kernel's execve interprets it regardless
                // of which closure (host or guest) is being built.
                let lib_origin = if interp::is_loader(&soname) {
                    Origin::Host
                } else {
                    origin
                };

                for dep in &resolved.elc.deps {
                    queue.push_back((dep.clone(), Some(resolved.elc.clone())));
                }

                if resolved.elc.nodelete {
                    log::debug!("{}: DF_1_NODELETE set, recorded but not acted on", soname);
                }

                set.insert(Library::from_elf(path, lib_origin, &resolved.elc));
            }
            None => {
                warn!("could not resolve soname '{}', recording as missing", soname);
                set.insert(Library::missing(soname, origin));
            }
        }
    }

    set
}

/// Whole-process closure context: the host's default `LD_LIBRARY_PATH`,
/// `ld.so.conf` search paths and system directories, computed once and
/// reused across every seed soname in a single invocation (so later
/// resolutions see the rpath/runpath their siblings inherited, per
/// spec.md §4.3 point 3 -- the per-object rpath/runpath inheritance
/// itself happens in `resolver::resolve` via `needed_by`).
pub struct ClosureContext {
    pub ld_library_path: SearchPathVec,
    pub ld_so_conf: SearchPathVec,
    pub system_dirs: SearchPathVec,
}

impl ClosureContext {
    pub fn as_resolve_context<'a>(&'a self, platform: Option<&'a String>) -> ResolveContext<'a> {
        ResolveContext {
            ld_library_path: &self.ld_library_path,
            ld_so_conf: &self.ld_so_conf,
            system_dirs: &self.system_dirs,
            platform,
        }
    }
}

/// Builds a `ClosureContext` for the native (host) filesystem: reads
/// `/etc/ld.so.conf` and appends the architecture-specific standard
/// directories for the running process' own architecture.
pub fn host_closure_context(ld_library_path: SearchPathVec) -> ClosureContext {
    let ld_so_conf = ld_conf::parse_ld_so_conf(&Path::new("/etc/ld.so.conf")).unwrap_or_default();
    let system_dirs = system_dirs::native_system_dirs();

    ClosureContext {
        ld_library_path,
        ld_so_conf,
        system_dirs,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_seed_produces_one_warning_entry() {
        let empty = SearchPathVec::new();
        let ctx = ResolveContext {
            ld_library_path: &empty,
            ld_so_conf: &empty,
            system_dirs: &empty,
            platform: None,
        };
        let set = closure(&["libdoesnotexist.so".to_string()], &[], Origin::Host, &ctx);
        assert_eq!(set.len(), 1);
        assert!(set.get("libdoesnotexist.so").unwrap().is_missing());
    }

    #[test]
    fn empty_seed_produces_empty_closure() {
        let empty = SearchPathVec::new();
        let ctx = ResolveContext {
            ld_library_path: &empty,
            ld_so_conf: &empty,
            system_dirs: &empty,
            platform: None,
        };
        let set = closure(&[], &[], Origin::Host, &ctx);
        assert!(set.is_empty());
    }
}
