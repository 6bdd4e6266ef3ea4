// Data model of spec.md §3: `Library` and `LibrarySet`.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::compiler::Vendor;
use crate::elf::ElfInfo;
use crate::search_path::SearchPathVec;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    Host,
    Guest,
}

/// One ELF shared object, as described by spec.md §3. `compiler_vendor` is
/// derived lazily from the parsed `.comment` text (see `compiler::vendor_of`)
/// rather than stored redundantly on `ElfInfo`.
#[derive(Debug, Clone)]
pub struct Library {
    pub path: PathBuf,
    pub soname: String,
    pub needed: Vec<String>,
    pub rpath: SearchPathVec,
    pub runpath: SearchPathVec,
    pub interpreter: String,
    pub build_id: Option<String>,
    pub origin: Origin,
    pub compiler_vendor: Vendor,
}

impl Library {
    pub fn from_elf(path: PathBuf, origin: Origin, elc: &ElfInfo) -> Library {
        let soname = elc.soname.clone().unwrap_or_else(|| {
            path.file_name()
                .and_then(|s| s.to_str())
                .unwrap_or("")
                .to_string()
        });

        Library {
            path,
            soname,
            needed: elc.deps.clone(),
            rpath: elc.rpath.clone(),
            runpath: elc.runpath.clone(),
            interpreter: elc.interp.clone().unwrap_or_default(),
            build_id: elc.build_id.clone(),
            origin,
            compiler_vendor: crate::compiler::vendor_of(&elc.comment),
        }
    }

    /// A placeholder for a soname that could not be resolved on disk
    /// (spec.md §4.3: "Missing sonames are recorded as placeholders").
    pub fn missing(soname: String, origin: Origin) -> Library {
        Library {
            path: PathBuf::new(),
            soname,
            needed: Vec::new(),
            rpath: SearchPathVec::new(),
            runpath: SearchPathVec::new(),
            interpreter: String::new(),
            build_id: None,
            origin,
            compiler_vendor: Vendor::Unknown,
        }
    }

    pub fn is_missing(&self) -> bool {
        self.path.as_os_str().is_empty()
    }
}

/// A serializable, wire-format-compatible snapshot of a `Library`, used for
/// the JSON introspection document (spec.md §6). Unlike `Library` this
/// never carries `origin`/`compiler_vendor`, which are host-side concerns
/// the guest side does not report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibraryRecord {
    pub soname: String,
    pub path: PathBuf,
    pub needed: Vec<String>,
    pub rpath: Vec<String>,
    pub runpath: Vec<String>,
    pub build_id: Option<String>,
}

impl From<&Library> for LibraryRecord {
    fn from(lib: &Library) -> Self {
        LibraryRecord {
            soname: lib.soname.clone(),
            path: lib.path.clone(),
            needed: lib.needed.clone(),
            rpath: lib.rpath.iter().map(|p| p.path.clone()).collect(),
            runpath: lib.runpath.iter().map(|p| p.path.clone()).collect(),
            build_id: lib.build_id.clone(),
        }
    }
}

/// A mapping soname -> Library plus the derived, stable-ordered,
/// de-duplicated rpath/runpath union of all of its members (spec.md §3).
/// Built incrementally by the closure resolver, then treated as
/// immutable once handed to the merger.
#[derive(Debug, Clone, Default)]
pub struct LibrarySet {
    members: BTreeMap<String, Library>,
    order: Vec<String>,
    pub rpath: SearchPathVec,
    pub runpath: SearchPathVec,
}

impl LibrarySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `library`, failing the spec.md §3 uniqueness invariant
    /// silently only by replacing -- callers (the closure resolver) never
    /// re-insert an already-resolved soname, so this is only reached for
    /// genuinely new entries.
    pub fn insert(&mut self, library: Library) {
        for entry in &library.rpath {
            self.rpath.push_unique(entry);
        }
        for entry in &library.runpath {
            self.runpath.push_unique(entry);
        }

        if !self.members.contains_key(&library.soname) {
            self.order.push(library.soname.clone());
        }
        self.members.insert(library.soname.clone(), library);
    }

    pub fn contains(&self, soname: &str) -> bool {
        self.members.contains_key(soname)
    }

    pub fn get(&self, soname: &str) -> Option<&Library> {
        self.members.get(soname)
    }

    /// Iterates members in insertion order -- the order in which the BFS
    /// closure first discovered each soname, which spec.md §4.3 requires
    /// to be the deterministic tie-break.
    pub fn iter(&self) -> impl Iterator<Item = &Library> {
        self.order.iter().filter_map(|s| self.members.get(s))
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn missing(&self) -> impl Iterator<Item = &Library> {
        self.iter().filter(|l| l.is_missing())
    }
}

// SearchPathVec needs a push that preserves the "stable-ordered,
// de-duplicated" property the union in spec.md §3 requires.
pub trait PushUnique {
    fn push_unique(&mut self, entry: &crate::search_path::SearchPath);
}

impl PushUnique for SearchPathVec {
    fn push_unique(&mut self, entry: &crate::search_path::SearchPath) {
        if !self.contains(entry) {
            self.push(entry.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lib(soname: &str, origin: Origin) -> Library {
        Library {
            path: PathBuf::from(format!("/usr/lib64/{}", soname)),
            soname: soname.to_string(),
            needed: Vec::new(),
            rpath: SearchPathVec::new(),
            runpath: SearchPathVec::new(),
            interpreter: String::new(),
            build_id: None,
            origin,
            compiler_vendor: Vendor::Gnu,
        }
    }

    #[test]
    fn sonames_are_unique_within_a_set() {
        let mut set = LibrarySet::new();
        set.insert(lib("libmpi.so.12", Origin::Host));
        set.insert(lib("libmpi.so.12", Origin::Host));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn iteration_preserves_insertion_order() {
        let mut set = LibrarySet::new();
        set.insert(lib("libc.so.6", Origin::Host));
        set.insert(lib("libmpi.so.12", Origin::Host));
        set.insert(lib("libopen-rte.so.40", Origin::Host));
        let names: Vec<&str> = set.iter().map(|l| l.soname.as_str()).collect();
        assert_eq!(names, vec!["libc.so.6", "libmpi.so.12", "libopen-rte.so.40"]);
    }

    #[test]
    fn missing_library_has_empty_path() {
        let m = Library::missing("libdoesnotexist.so".to_string(), Origin::Host);
        assert!(m.is_missing());
    }
}
