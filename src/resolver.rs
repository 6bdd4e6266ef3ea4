// Resolver (C2): locates the on-disk file implementing a soname, given a
// search-path context, in the exact order the ELF dynamic linker uses
// (spec.md §4.2). Adapted from the teacher's `resolve_dependency_1`,
// generalized away from the per-binary `DepTree`/print concerns it was
// originally entangled with.

use std::path::{Path, PathBuf};

use crate::elf::{self, ElfInfo};
use crate::search_path::SearchPathVec;

/// Where a soname was found, used by the closure resolver to decide
/// import/keep-guest precedence and by callers that want to explain a
/// resolution in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionMode {
    /// `DT_SONAME` (or a `DT_NEEDED` entry) was an absolute path.
    Direct,
    DtRpath,
    LdLibraryPath,
    DtRunpath,
    LdSoConf,
    SystemDirs,
}

/// A resolved library: the path the search found it at (`search_path`,
/// for reproducing the directory a bind came from) and the realpath
/// after following symlinks, per spec.md §4.2 ("both the symlink name
/// and the resolved name are remembered so that the bind step can
/// reproduce the symlink").
#[derive(Debug, Clone)]
pub struct Resolved {
    pub requested: PathBuf,
    pub realpath: PathBuf,
    pub mode: ResolutionMode,
    pub elc: ElfInfo,
}

pub struct ResolveContext<'a> {
    pub ld_library_path: &'a SearchPathVec,
    pub ld_so_conf: &'a SearchPathVec,
    pub system_dirs: &'a SearchPathVec,
    pub platform: Option<&'a String>,
}

fn try_open(
    candidate: &Path,
    melc: Option<&ElfInfo>,
    soname: &str,
    platform: Option<&String>,
) -> Option<(PathBuf, ElfInfo)> {
    let elc = elf::open_elf_file(&candidate, melc, Some(&soname.to_string()), platform).ok()?;
    let realpath = candidate.canonicalize().unwrap_or_else(|_| candidate.to_path_buf());
    Some((realpath, elc))
}

/// Resolves `soname` to a path, following the ELF dynamic-linker search
/// order of spec.md §4.2. `needed_by`, when given, supplies the RPATH
/// inherited from the object that named this dependency (DT_RPATH is
/// inherited by children that do not define their own, matching glibc).
pub fn resolve(
    soname: &str,
    needed_by: Option<&ElfInfo>,
    ctx: &ResolveContext,
) -> Option<Resolved> {
    let path = Path::new(soname);

    if path.is_absolute() {
        let (realpath, elc) = try_open(path, needed_by, soname, ctx.platform)?;
        return Some(Resolved {
            requested: path.to_path_buf(),
            realpath,
            mode: ResolutionMode::Direct,
            elc,
        });
    }

    let nodeflibs = needed_by.map(|e| e.nodeflibs).unwrap_or(false);
    let runpath_empty = needed_by.map(|e| e.runpath.is_empty()).unwrap_or(true);

    // 1. DT_RPATH iff no DT_RUNPATH is set.
    if runpath_empty {
        if let Some(needed_by) = needed_by {
            for searchpath in &needed_by.rpath {
                let candidate = Path::new(&searchpath.path).join(soname);
                if let Some((realpath, elc)) = try_open(&candidate, Some(needed_by), soname, ctx.platform) {
                    return Some(Resolved {
                        requested: candidate,
                        realpath,
                        mode: ResolutionMode::DtRpath,
                        elc,
                    });
                }
            }
        }
    }

    // 2. LD_LIBRARY_PATH.
    for searchpath in ctx.ld_library_path {
        let candidate = Path::new(&searchpath.path).join(soname);
        if let Some((realpath, elc)) = try_open(&candidate, needed_by, soname, ctx.platform) {
            return Some(Resolved {
                requested: candidate,
                realpath,
                mode: ResolutionMode::LdLibraryPath,
                elc,
            });
        }
    }

    // 3. DT_RUNPATH.
    if let Some(needed_by) = needed_by {
        for searchpath in &needed_by.runpath {
            let candidate = Path::new(&searchpath.path).join(soname);
            if let Some((realpath, elc)) = try_open(&candidate, Some(needed_by), soname, ctx.platform) {
                return Some(Resolved {
                    requested: candidate,
                    realpath,
                    mode: ResolutionMode::DtRunpath,
                    elc,
                });
            }
        }
    }

    if nodeflibs {
        return None;
    }

    // 4a. `/etc/ld.so.conf` (and its includes).
    for searchpath in ctx.ld_so_conf {
        let candidate = Path::new(&searchpath.path).join(soname);
        if let Some((realpath, elc)) = try_open(&candidate, needed_by, soname, ctx.platform) {
            return Some(Resolved {
                requested: candidate,
                realpath,
                mode: ResolutionMode::LdSoConf,
                elc,
            });
        }
    }

    // 4b. Standard directories (`/lib`, `/lib64`, `/usr/lib`, `/usr/lib64`).
    for searchpath in ctx.system_dirs {
        let candidate = Path::new(&searchpath.path).join(soname);
        if let Some((realpath, elc)) = try_open(&candidate, needed_by, soname, ctx.platform) {
            return Some(Resolved {
                requested: candidate,
                realpath,
                mode: ResolutionMode::SystemDirs,
                elc,
            });
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_context_falls_back_cleanly() {
        let empty = SearchPathVec::new();
        let ctx = ResolveContext {
            ld_library_path: &empty,
            ld_so_conf: &empty,
            system_dirs: &empty,
            platform: None,
        };

        // With no search paths configured at all, resolution of a
        // non-existent soname must fail cleanly rather than panic.
        assert!(resolve("libdoesnotexist.so", None, &ctx).is_none());
    }

    #[test]
    fn absolute_soname_with_missing_file_is_none() {
        let empty = SearchPathVec::new();
        let ctx = ResolveContext {
            ld_library_path: &empty,
            ld_so_conf: &empty,
            system_dirs: &empty,
            platform: None,
        };
        assert!(resolve("/nonexistent/libfoo.so", None, &ctx).is_none());
    }
}
