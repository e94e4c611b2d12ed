//! Type-checked package facts, as produced by a [`PackageLoader`].

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Loads and type-checks a package, reporting every resolved identifier use.
pub trait PackageLoader {
    /// `pattern` is a package pattern (`.`, `./sub`, an import path) relative to `dir`.
    fn load(&self, pattern: &str, dir: &Path) -> Result<CheckedPackage, LoadError>;
}

/// A loaded entry package.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CheckedPackage {
    /// Import path of the entry package.
    pub path: String,
    /// Diagnostics collected while checking; non-empty means the load failed.
    pub errors: Vec<String>,
    /// Every resolved identifier use, in no particular order.
    pub uses: Vec<ResolvedObject>,
    /// Package path → directory of the module providing it.
    pub module_dirs: BTreeMap<String, PathBuf>,
}

impl CheckedPackage {
    /// Turns collected diagnostics into an aggregate error.
    pub fn into_checked(self) -> Result<Self, LoadError> {
        if self.errors.is_empty() {
            Ok(self)
        } else {
            Err(LoadError::Diagnostics(self.errors))
        }
    }
}

/// The object an identifier use resolves to.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ResolvedObject {
    /// Owning package path; `None` for built-ins and the universe scope.
    #[serde(default)]
    pub package: Option<String>,
    pub name: String,
    pub exported: bool,
    #[serde(flatten)]
    pub decl: Declared,
}

/// A named type: its declaring package and name.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NamedType {
    /// Empty for predeclared types such as `error`.
    #[serde(default)]
    pub package: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Receiver {
    /// The receiver's named type, pointer stripped; `None` for anonymous interfaces.
    #[serde(default)]
    pub named: Option<NamedType>,
    #[serde(default)]
    pub interface: bool,
}

/// Declared-object kind, tagged as `kind` on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Declared {
    TypeName {
        /// The named type this name resolves to (through aliases).
        #[serde(default)]
        named: Option<NamedType>,
    },
    Const,
    Var {
        #[serde(default)]
        is_field: bool,
    },
    Func {
        #[serde(default)]
        receiver: Option<Receiver>,
    },
    Builtin,
    PkgName,
    Label,
    Nil,
    #[serde(other)]
    Unknown,
}

impl Declared {
    pub fn label(&self) -> &'static str {
        match self {
            Declared::TypeName { .. } => "type name",
            Declared::Const => "constant",
            Declared::Var { .. } => "variable",
            Declared::Func { .. } => "function",
            Declared::Builtin => "builtin",
            Declared::PkgName => "package name",
            Declared::Label => "label",
            Declared::Nil => "nil",
            Declared::Unknown => "unknown object",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("{}", format_diagnostics(.0))]
    Diagnostics(Vec<String>),
    #[error("Loader probe failed: {0}")]
    ProbeError(#[from] sandbox::AttemptError),
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Walk error: {0}")]
    WalkError(#[from] walkdir::Error),
    #[error("Cannot resolve package {pattern:?}: {reason}")]
    UnresolvedPattern { pattern: String, reason: String },
    #[error("Parser setup failed: {0}")]
    ParserError(String),
}

/// Renders diagnostics as a single aggregate message.
///
/// ```
/// # use usage::loader::format_diagnostics;
/// let msg = format_diagnostics(&["a.go:1:1: bad".into(), "b.go:2:2: worse".into()]);
/// assert_eq!(msg, "The following errors occurred:\n - a.go:1:1: bad\n - b.go:2:2: worse");
/// ```
pub fn format_diagnostics(diagnostics: &[String]) -> String {
    let mut out = String::from("The following errors occurred:");
    for d in diagnostics {
        out.push_str("\n - ");
        out.push_str(d);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_probe_output() {
        let json = r#"{
            "path": "example.org/consumer",
            "errors": [],
            "uses": [
                {"package": "example.org/pkg", "name": "TypeA", "exported": true,
                 "kind": "type_name", "named": {"package": "example.org/pkg", "name": "TypeA"}},
                {"package": "example.org/pkg", "name": "ConstB", "exported": true, "kind": "const"},
                {"package": "example.org/pkg", "name": "DoThing", "exported": true, "kind": "func",
                 "receiver": {"named": {"package": "example.org/pkg", "name": "TypeA"}, "interface": false}},
                {"package": "example.org/pkg", "name": "Field", "exported": true, "kind": "var", "is_field": true},
                {"package": null, "name": "len", "exported": false, "kind": "builtin"},
                {"package": "example.org/consumer", "name": "x", "exported": false, "kind": "type_param"}
            ],
            "module_dirs": {"example.org/pkg": "/mod/pkg@v1.0.0"}
        }"#;
        let pkg: CheckedPackage = serde_json::from_str(json).unwrap();
        assert_eq!(pkg.path, "example.org/consumer");
        assert_eq!(pkg.uses.len(), 6);
        assert!(matches!(pkg.uses[0].decl, Declared::TypeName { named: Some(_) }));
        assert_eq!(pkg.uses[1].decl, Declared::Const);
        match &pkg.uses[2].decl {
            Declared::Func {
                receiver: Some(recv),
            } => {
                assert_eq!(recv.named.as_ref().unwrap().name, "TypeA");
                assert!(!recv.interface);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(pkg.uses[3].decl, Declared::Var { is_field: true });
        assert_eq!(pkg.uses[4].package, None);
        assert_eq!(pkg.uses[5].decl, Declared::Unknown);
        assert_eq!(
            pkg.module_dirs["example.org/pkg"],
            PathBuf::from("/mod/pkg@v1.0.0")
        );
    }

    #[test]
    fn test_free_function_has_no_receiver() {
        let json = r#"{"package": "p.org/x", "name": "New", "exported": true, "kind": "func"}"#;
        let obj: ResolvedObject = serde_json::from_str(json).unwrap();
        assert_eq!(obj.decl, Declared::Func { receiver: None });
    }

    #[test]
    fn test_diagnostics_become_aggregate_error() {
        let pkg = CheckedPackage {
            errors: vec!["x.go:3:5: undefined: foo".into(), "y.go:1:1: expected 'package'".into()],
            ..CheckedPackage::default()
        };
        let err = pkg.into_checked().unwrap_err();
        let msg = err.to_string();
        assert!(msg.starts_with("The following errors occurred:"));
        assert!(msg.contains("\n - x.go:3:5: undefined: foo"));
        assert!(msg.contains("\n - y.go:1:1: expected 'package'"));
    }
}
