// Compiler-vendor detection from the `.comment` ELF section (C1), per
// spec.md §4.1. Grounded on
// `examples/original_source/e4s_cl/cf/compiler.py`: the precedence list
// exists because ROCm binaries' `.comment` contains "AMD", "clang" *and*
// "GCC" all at once, and AMD must win.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Vendor {
    Gnu,
    Llvm,
    Intel,
    Amd,
    Pgi,
    ArmClang,
    Fujitsu,
    Unknown,
}

impl fmt::Display for Vendor {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            Vendor::Gnu => "gnu",
            Vendor::Llvm => "llvm",
            Vendor::Intel => "intel",
            Vendor::Amd => "amd",
            Vendor::Pgi => "pgi",
            Vendor::ArmClang => "armclang",
            Vendor::Fujitsu => "fujitsu",
            Vendor::Unknown => "unknown",
        };
        write!(f, "{}", s)
    }
}

/// Precedence order matters: evaluated left to right, first match wins.
const PRECEDENCE: &[(Vendor, fn(&str) -> bool)] = &[
    (Vendor::Amd, |s| s.contains("AMD")),
    (Vendor::Llvm, |s| s.contains("clang")),
    (Vendor::Gnu, |s| s.contains("GCC")),
];

/// Determines the compiler vendor from the raw (already NUL-delimited,
/// joined) `.comment` section contents of an ELF object. Defaults to
/// `Gnu` when nothing in the precedence list matches, per spec.md §4.1.
pub fn vendor_of(comment: &str) -> Vendor {
    for (vendor, check) in PRECEDENCE {
        if check(comment) {
            return *vendor;
        }
    }
    Vendor::Gnu
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rocm_comment_is_amd() {
        assert_eq!(vendor_of("AMD clang version 14 - GCC: (GNU) 8.5.0"), Vendor::Amd);
    }

    #[test]
    fn clang_without_amd_is_llvm() {
        assert_eq!(vendor_of("clang version 14.0.0"), Vendor::Llvm);
    }

    #[test]
    fn gcc_only_is_gnu() {
        assert_eq!(vendor_of("GCC: (GNU) 11.3.0"), Vendor::Gnu);
    }

    #[test]
    fn empty_comment_defaults_to_gnu() {
        assert_eq!(vendor_of(""), Vendor::Gnu);
    }

    #[test]
    fn precedence_order_from_spec() {
        // "AMD clang GCC" must resolve to amd, not llvm or gnu.
        assert_eq!(vendor_of("AMD clang GCC"), Vendor::Amd);
    }
}
