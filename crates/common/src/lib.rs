//! # Common: Shared Vocabulary of the Extraction Pipeline
//!
//! **Role**: Types shared by the usage-analysis engine, the reflection harness and the CLI.
//!
//! **Core Types**:
//! - `SymbolRef` / `SymbolKind`: one statically-resolved reference into an external package.
//! - `UsageIndex`: `package path → sorted, deduplicated exported names`.
//! - `DeclarationModel`: decoded output of a reflection probe (opaque to the pipeline).
//! - `Config`: immutable process-wide configuration, threaded by reference.
//!
//! **Gate**: [`ident::validate_all`] must accept every symbol name before any probe is built.

pub mod config;
pub mod ident;
pub mod model;
pub mod symbols;

pub use config::{Config, ConfigError, DirectiveStyle};
pub use ident::{is_exported_identifier, validate_all, ValidationError};
pub use model::{DeclarationModel, DecodeError, Provenance};
pub use symbols::{SymbolKind, SymbolRef, UsageIndex};

/// Returns `true` if `path` names a package of the Go standard library.
///
/// The standard library is recognised by a first path element free of any dot:
/// `fmt`, `net/http` and `internal/abi` are standard, `example.org/pkg` is not.
///
/// # Example
/// ```
/// # use common::is_standard_import_path;
/// assert!(is_standard_import_path("net/http"));
/// assert!(!is_standard_import_path("github.com/pkg/errors"));
/// ```
pub fn is_standard_import_path(path: &str) -> bool {
    let first = path.split('/').next().unwrap_or(path);
    !first.is_empty() && !first.contains('.')
}

/// Returns `true` if one import path is a slash-delimited extension of the other.
///
/// `a/b` and `a/b/c` overlap; `a/b` and `a/bc` do not. Equal paths do not count as
/// overlapping: exact matches are handled separately by the caller.
pub fn paths_overlap(a: &str, b: &str) -> bool {
    is_subpath(a, b) || is_subpath(b, a)
}

fn is_subpath(child: &str, parent: &str) -> bool {
    child
        .strip_prefix(parent)
        .is_some_and(|rest| rest.starts_with('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_import_paths() {
        assert!(is_standard_import_path("fmt"));
        assert!(is_standard_import_path("encoding/json"));
        assert!(is_standard_import_path("internal/abi"));
        assert!(!is_standard_import_path("example.org/pkg"));
        assert!(!is_standard_import_path("gopkg.in/yaml.v3"));
        assert!(!is_standard_import_path(""));
    }

    #[test]
    fn test_paths_overlap() {
        assert!(paths_overlap("example.org/a", "example.org/a/b"));
        assert!(paths_overlap("example.org/a/b", "example.org/a"));
        assert!(!paths_overlap("example.org/a", "example.org/ab"));
        assert!(!paths_overlap("example.org/a", "example.org/a"));
        assert!(!paths_overlap("example.org/a", "example.org/b"));
    }
}
