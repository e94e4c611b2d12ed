//! External-symbol detection over a checked package.

use crate::loader::{Declared, LoadError, PackageLoader, ResolvedObject};
use crate::vcs::same_repo;
use common::{is_standard_import_path, paths_overlap, SymbolKind, SymbolRef, UsageIndex};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Per-package symbols the entry package needs from outside its own project.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Detection {
    /// Type-like names.
    pub types: UsageIndex,
    /// Functions, variables, constants and `Type.Method` names.
    pub values: UsageIndex,
    /// Package path → module directory, as reported by the loader.
    pub module_dirs: BTreeMap<String, PathBuf>,
}

impl Detection {
    /// Every package path across both indices, sorted and distinct.
    pub fn packages(&self) -> Vec<&str> {
        let mut paths: Vec<&str> = self.types.packages().chain(self.values.packages()).collect();
        paths.sort_unstable();
        paths.dedup();
        paths
    }
}

/// A reference that the filters should have made impossible.
#[derive(Debug, thiserror::Error)]
pub enum InvariantError {
    #[error("Encountered unexpected unexported {kind} {name} of {package}, which should not be accessible from {entry}")]
    UnexportedReference {
        kind: &'static str,
        name: String,
        package: String,
        entry: String,
    },
    #[error("Unknown declaration kind ({kind}) for {package}.{name}")]
    UnknownDeclaration {
        kind: &'static str,
        name: String,
        package: String,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum DetectError {
    #[error("Error while loading package: {0}")]
    LoadError(#[from] LoadError),
    #[error("Internal invariant violated: {0}")]
    InvariantError(#[from] InvariantError),
}

/// Loads `entry` from `dir` and buckets every external, exported symbol it references.
pub fn detect<L: PackageLoader + ?Sized>(loader: &L, entry: &str, dir: &Path) -> Result<Detection, DetectError> {
    let package = loader.load(entry, dir)?.into_checked()?;
    let scope = ProjectScope::new(&package.path);

    let mut refs = Vec::new();
    for object in &package.uses {
        classify(object, &scope, &mut refs)?;
    }

    let mut detection = Detection {
        module_dirs: package.module_dirs,
        ..Detection::default()
    };
    for r in &refs {
        if r.kind.is_type_like() {
            detection.types.record(&r.package_path, r.name.clone());
        } else {
            detection.values.record(&r.package_path, r.name.clone());
        }
    }
    detection.types.finalize();
    detection.values.finalize();
    debug!(
        entry = %scope.entry,
        packages = detection.packages().len(),
        "detection finished"
    );
    Ok(detection)
}

/// The entry package and what counts as "the same project" as it.
struct ProjectScope {
    entry: String,
}

impl ProjectScope {
    fn new(entry: &str) -> Self {
        Self {
            entry: entry.to_string(),
        }
    }

    /// Why references into `path` are ignored, or `None` if they are external.
    fn skip_reason(&self, path: &str) -> Option<&'static str> {
        if path.is_empty() {
            Some("no package")
        } else if is_standard_import_path(path) {
            Some("standard library")
        } else if path == self.entry {
            Some("entry package")
        } else if same_repo(path, &self.entry) || paths_overlap(path, &self.entry) {
            Some("same project")
        } else {
            None
        }
    }
}

fn classify(object: &ResolvedObject, scope: &ProjectScope, refs: &mut Vec<SymbolRef>) -> Result<(), InvariantError> {
    let Some(package) = object.package.as_deref() else {
        return Ok(());
    };
    if let Some(reason) = scope.skip_reason(package) {
        if reason != "no package" {
            debug!(package, name = %object.name, reason, "skipped");
        }
        return Ok(());
    }
    if !object.exported {
        return Err(InvariantError::UnexportedReference {
            kind: object.decl.label(),
            name: object.name.clone(),
            package: package.to_string(),
            entry: scope.entry.clone(),
        });
    }

    let mut push = |path: &str, name: String, kind: SymbolKind| {
        match scope.skip_reason(path) {
            Some(reason) => debug!(package = path, name = %name, reason, "skipped after attribution"),
            None => refs.push(SymbolRef::new(path, name, kind)),
        }
    };

    match &object.decl {
        Declared::TypeName { named: Some(named) } => {
            push(&named.package, named.name.clone(), SymbolKind::Type);
        }
        Declared::TypeName { named: None } => {
            debug!(package, name = %object.name, "type name of an unnamed type, skipped");
        }
        Declared::Const => push(package, object.name.clone(), SymbolKind::Const),
        Declared::Var { is_field: true } => {}
        Declared::Var { is_field: false } => push(package, object.name.clone(), SymbolKind::Var),
        Declared::Func { receiver: None } => push(package, object.name.clone(), SymbolKind::Func),
        Declared::Func {
            receiver: Some(receiver),
        } => match &receiver.named {
            Some(named) if receiver.interface => {
                push(&named.package, named.name.clone(), SymbolKind::Type);
            }
            Some(named) => {
                push(&named.package, named.name.clone(), SymbolKind::Type);
                push(
                    &named.package,
                    format!("{}.{}", named.name, object.name),
                    SymbolKind::MethodReceiver,
                );
            }
            None => debug!(package, name = %object.name, "method of an unnamed receiver, skipped"),
        },
        other @ (Declared::Builtin
        | Declared::PkgName
        | Declared::Label
        | Declared::Nil
        | Declared::Unknown) => {
            return Err(InvariantError::UnknownDeclaration {
                kind: other.label(),
                name: object.name.clone(),
                package: package.to_string(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::{CheckedPackage, NamedType, Receiver};

    struct StaticLoader(CheckedPackage);

    impl PackageLoader for StaticLoader {
        fn load(&self, _pattern: &str, _dir: &Path) -> Result<CheckedPackage, LoadError> {
            Ok(self.0.clone())
        }
    }

    fn named(package: &str, name: &str) -> NamedType {
        NamedType {
            package: package.into(),
            name: name.into(),
        }
    }

    fn object(package: &str, name: &str, decl: Declared) -> ResolvedObject {
        ResolvedObject {
            package: Some(package.into()),
            name: name.into(),
            exported: common::is_exported_identifier(name),
            decl,
        }
    }

    fn type_name(package: &str, name: &str) -> ResolvedObject {
        object(package, name, Declared::TypeName { named: Some(named(package, name)) })
    }

    fn method(package: &str, receiver: &str, name: &str, interface: bool) -> ResolvedObject {
        object(
            package,
            name,
            Declared::Func {
                receiver: Some(Receiver {
                    named: Some(named(package, receiver)),
                    interface,
                }),
            },
        )
    }

    fn run(uses: Vec<ResolvedObject>) -> Result<Detection, DetectError> {
        let loader = StaticLoader(CheckedPackage {
            path: "example.org/consumer".into(),
            uses,
            ..CheckedPackage::default()
        });
        detect(&loader, ".", Path::new("."))
    }

    #[test]
    fn test_type_const_and_method() {
        let d = run(vec![
            type_name("example.org/pkg", "TypeA"),
            object("example.org/pkg", "ConstB", Declared::Const),
            method("example.org/pkg", "TypeA", "DoThing", false),
            type_name("example.org/pkg", "TypeA"),
        ])
        .unwrap();
        assert_eq!(d.types.get("example.org/pkg"), ["TypeA"]);
        assert_eq!(d.values.get("example.org/pkg"), ["ConstB", "TypeA.DoThing"]);
    }

    #[test]
    fn test_interface_method_records_only_the_interface() {
        let d = run(vec![method("example.org/pkg", "Reader", "Read", true)]).unwrap();
        assert_eq!(d.types.get("example.org/pkg"), ["Reader"]);
        assert!(d.values.is_empty());
    }

    #[test]
    fn test_standard_library_and_same_project_are_skipped() {
        let d = run(vec![
            object("fmt", "Println", Declared::Func { receiver: None }),
            type_name("net/http", "Client"),
            object("example.org/consumer", "helper", Declared::Func { receiver: None }),
            object("example.org/consumer/internal/x", "X", Declared::Var { is_field: false }),
            object("example.org", "Root", Declared::Const),
            object("example.org/pkg", "Kept", Declared::Var { is_field: false }),
        ])
        .unwrap();
        assert_eq!(d.packages(), ["example.org/pkg"]);
    }

    #[test]
    fn test_same_repository_root_is_skipped() {
        let loader = StaticLoader(CheckedPackage {
            path: "github.com/acme/app/cmd/server".into(),
            uses: vec![
                type_name("github.com/acme/app/lib/store", "Store"),
                type_name("github.com/acme/other", "Thing"),
            ],
            ..CheckedPackage::default()
        });
        let d = detect(&loader, ".", Path::new(".")).unwrap();
        assert_eq!(d.packages(), ["github.com/acme/other"]);
    }

    #[test]
    fn test_fields_builtins_and_unnamed_are_ignored() {
        let d = run(vec![
            object("example.org/pkg", "Field", Declared::Var { is_field: true }),
            ResolvedObject {
                package: None,
                name: "len".into(),
                exported: false,
                decl: Declared::Builtin,
            },
            object("example.org/pkg", "Anon", Declared::TypeName { named: None }),
        ])
        .unwrap();
        assert!(d.types.is_empty());
        assert!(d.values.is_empty());
    }

    #[test]
    fn test_alias_attributed_to_target_package() {
        let d = run(vec![
            object(
                "example.org/compat",
                "Client",
                Declared::TypeName { named: Some(named("example.org/impl", "Client")) },
            ),
            object(
                "example.org/compat",
                "Duration",
                Declared::TypeName { named: Some(named("time", "Duration")) },
            ),
        ])
        .unwrap();
        assert_eq!(d.types.get("example.org/impl"), ["Client"]);
        assert!(!d.types.contains_package("example.org/compat"));
        assert!(!d.types.contains_package("time"));
    }

    #[test]
    fn test_unexported_reference_is_invariant_error() {
        let err = run(vec![object("example.org/pkg", "hidden", Declared::Const)]).unwrap_err();
        assert!(matches!(
            err,
            DetectError::InvariantError(InvariantError::UnexportedReference { .. })
        ));
        assert!(err.to_string().contains("hidden"));
    }

    #[test]
    fn test_unknown_kind_is_invariant_error() {
        let err = run(vec![object("example.org/pkg", "L", Declared::Label)]).unwrap_err();
        assert!(matches!(
            err,
            DetectError::InvariantError(InvariantError::UnknownDeclaration { kind: "label", .. })
        ));
    }

    #[test]
    fn test_load_diagnostics_fail_detection() {
        let loader = StaticLoader(CheckedPackage {
            path: "example.org/consumer".into(),
            errors: vec!["a.go:1:1: x".into(), "b.go:2:2: y".into()],
            ..CheckedPackage::default()
        });
        let err = detect(&loader, ".", Path::new(".")).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains(" - a.go:1:1: x"));
        assert!(msg.contains(" - b.go:2:2: y"));
    }

    #[test]
    fn test_detection_is_stable() {
        let uses = vec![
            object("example.org/b", "Z", Declared::Const),
            type_name("example.org/a", "T"),
            object("example.org/b", "A", Declared::Func { receiver: None }),
        ];
        let mut reversed = uses.clone();
        reversed.reverse();
        assert_eq!(run(uses).unwrap(), run(reversed).unwrap());
    }

    #[test]
    fn test_unexported_receiver_type_is_filtered() {
        let d = run(vec![method("example.org/pkg", "impl", "Close", false)]).unwrap();
        assert!(d.types.is_empty());
        assert!(d.values.is_empty());
    }
}
