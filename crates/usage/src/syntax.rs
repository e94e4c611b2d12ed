//! Offline package loader built on tree-sitter-go.
//!
//! Resolves package-qualified references (`alias.Name` selectors and qualified types)
//! through each file's import table. No toolchain is invoked, so resolution is purely
//! syntactic:
//! - method calls on values of external types are invisible;
//! - a local variable shadowing an import alias is taken for the package;
//! - `alias.Name(x)` counts as a function unless `alias.Name` also appears in type position.

use crate::loader::{CheckedPackage, Declared, LoadError, NamedType, PackageLoader, ResolvedObject};
use common::is_exported_identifier;
use sandbox::manifest::{find_manifest, read_module};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::debug;
use tree_sitter::{Node, Parser, Query, QueryCursor, StreamingIterator};
use walkdir::WalkDir;

static REFERENCE_QUERY: OnceLock<Query> = OnceLock::new();

fn reference_query() -> &'static Query {
    REFERENCE_QUERY.get_or_init(|| {
        Query::new(
            &tree_sitter_go::LANGUAGE.into(),
            r#"
            (import_spec) @import
            (qualified_type) @type
            (selector_expression) @selector
            "#,
        )
        .expect("Invalid Go reference query")
    })
}

/// [`PackageLoader`] that parses sources instead of type-checking them.
#[derive(Debug, Default, Clone, Copy)]
pub struct SyntaxLoader;

impl SyntaxLoader {
    pub fn new() -> Self {
        Self
    }
}

impl PackageLoader for SyntaxLoader {
    fn load(&self, pattern: &str, dir: &Path) -> Result<CheckedPackage, LoadError> {
        let target = resolve_pattern(pattern, dir)?;
        let files = go_files(&target.dir, target.recursive)?;
        if files.is_empty() {
            return Err(LoadError::UnresolvedPattern {
                pattern: pattern.to_string(),
                reason: format!("no Go source files in {}", target.dir.display()),
            });
        }
        debug!(import_path = %target.import_path, files = files.len(), "parsing");

        let mut facts = Vec::with_capacity(files.len());
        for file in &files {
            let source = std::fs::read(file)?;
            let label = file
                .strip_prefix(&target.dir)
                .unwrap_or(file)
                .display()
                .to_string();
            facts.push(scan_source(&source, &label)?);
        }
        Ok(assemble(target.import_path, facts))
    }
}

struct Target {
    import_path: String,
    dir: PathBuf,
    recursive: bool,
}

/// Maps a package pattern to an import path and directory via the enclosing `go.mod`.
fn resolve_pattern(pattern: &str, dir: &Path) -> Result<Target, LoadError> {
    let unresolved = |reason: String| LoadError::UnresolvedPattern {
        pattern: pattern.to_string(),
        reason,
    };

    let (base, recursive) = match pattern.strip_suffix("/...") {
        Some(base) => (base, true),
        None if pattern == "..." => (".", true),
        None => (pattern, false),
    };

    let manifest = find_manifest(dir).ok_or_else(|| unresolved("no go.mod found".into()))?;
    let module = read_module(&manifest)?
        .ok_or_else(|| unresolved(format!("{} has no module line", manifest.display())))?;
    let module_root = manifest
        .parent()
        .ok_or_else(|| unresolved("go.mod has no parent directory".into()))?;
    let module_root = dunce::canonicalize(module_root)?;

    let is_relative = base == "." || base == ".." || base.starts_with("./") || base.starts_with("../");
    let package_dir = if is_relative {
        dunce::canonicalize(dir.join(base))?
    } else if base == module.path {
        module_root.clone()
    } else if let Some(rest) = base
        .strip_prefix(module.path.as_str())
        .and_then(|r| r.strip_prefix('/'))
    {
        module_root.join(rest)
    } else {
        return Err(unresolved(format!(
            "outside module {} (offline loading only covers the current module)",
            module.path
        )));
    };

    let rel = package_dir
        .strip_prefix(&module_root)
        .map_err(|_| unresolved(format!("{} is outside module root", package_dir.display())))?;
    let mut import_path = module.path.clone();
    for component in rel.components() {
        import_path.push('/');
        import_path.push_str(&component.as_os_str().to_string_lossy());
    }

    Ok(Target {
        import_path,
        dir: package_dir,
        recursive,
    })
}

/// Non-test `.go` files of `dir` (and of its packages below, when `recursive`).
fn go_files(dir: &Path, recursive: bool) -> Result<Vec<PathBuf>, LoadError> {
    let mut files = Vec::new();
    let walker = WalkDir::new(dir)
        .max_depth(if recursive { usize::MAX } else { 1 })
        .sort_by_file_name();
    for entry in walker
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_excluded(e.path()))
    {
        let entry = entry?;
        let path = entry.path();
        let name = entry.file_name().to_string_lossy();
        if entry.file_type().is_file() && name.ends_with(".go") && !name.ends_with("_test.go") {
            files.push(path.to_path_buf());
        }
    }
    Ok(files)
}

/// Directories the go tool ignores when expanding `...`.
fn is_excluded(path: &Path) -> bool {
    match path.file_name().and_then(|s| s.to_str()) {
        Some(name) => {
            path.is_dir()
                && (name == "vendor"
                    || name == "testdata"
                    || name.starts_with('.')
                    || name.starts_with('_'))
        }
        None => false,
    }
}

/// Conventional package name for an import path.
///
/// ```
/// # use usage::syntax::default_package_name;
/// assert_eq!(default_package_name("github.com/pkg/errors"), "errors");
/// assert_eq!(default_package_name("gopkg.in/yaml.v3"), "yaml");
/// assert_eq!(default_package_name("example.org/lib/v2"), "lib");
/// assert_eq!(default_package_name("github.com/mattn/go-sqlite3"), "sqlite3");
/// ```
pub fn default_package_name(import_path: &str) -> String {
    let mut segments = import_path.rsplit('/');
    let mut last = segments.next().unwrap_or(import_path);
    if is_major_version(last) {
        if let Some(prev) = segments.next() {
            last = prev;
        }
    }
    if let Some((name, version)) = last.rsplit_once('.') {
        if is_major_version(version) {
            last = name;
        }
    }
    let last = last.strip_prefix("go-").unwrap_or(last);
    let last = last.strip_suffix("-go").unwrap_or(last);
    last.replace(['-', '.'], "_")
}

fn is_major_version(s: &str) -> bool {
    s.strip_prefix('v')
        .is_some_and(|n| !n.is_empty() && n.chars().all(|c| c.is_ascii_digit()))
}

/// Syntactic facts of one file.
#[derive(Debug, Default)]
struct FileFacts {
    /// Local package name → import path.
    imports: BTreeMap<String, String>,
    types: Vec<(String, String)>,
    selectors: Vec<Selector>,
    errors: Vec<String>,
}

#[derive(Debug)]
struct Selector {
    alias: String,
    name: String,
    is_call: bool,
    position: String,
}

fn scan_source(source: &[u8], label: &str) -> Result<FileFacts, LoadError> {
    let mut parser = Parser::new();
    parser
        .set_language(&tree_sitter_go::LANGUAGE.into())
        .map_err(|e| LoadError::ParserError(format!("Grammar load failed: {e}")))?;
    let tree = parser
        .parse(source, None)
        .ok_or_else(|| LoadError::ParserError(format!("{label}: parse returned None")))?;
    let root = tree.root_node();

    let mut facts = FileFacts::default();
    if root.has_error() {
        collect_syntax_errors(root, label, &mut facts.errors);
    }

    let query = reference_query();
    let capture_names = query.capture_names();
    let mut cursor = QueryCursor::new();
    let mut matches = cursor.matches(query, root, source);

    while let Some(m) = matches.next() {
        for capture in m.captures {
            let node = capture.node;
            match capture_names[capture.index as usize] {
                "import" => record_import(node, source, &mut facts),
                "type" => {
                    let (Some(pkg), Some(name)) = (
                        field_text(node, "package", source),
                        field_text(node, "name", source),
                    ) else {
                        continue;
                    };
                    facts.types.push((pkg.to_string(), name.to_string()));
                }
                "selector" => {
                    let Some(operand) = node.child_by_field_name("operand") else {
                        continue;
                    };
                    if operand.kind() != "identifier" {
                        continue;
                    }
                    let (Ok(alias), Some(name)) =
                        (operand.utf8_text(source), field_text(node, "field", source))
                    else {
                        continue;
                    };
                    let is_call = node.parent().is_some_and(|p| {
                        p.kind() == "call_expression"
                            && p.child_by_field_name("function").map(|f| f.id()) == Some(node.id())
                    });
                    facts.selectors.push(Selector {
                        alias: alias.to_string(),
                        name: name.to_string(),
                        is_call,
                        position: position(node, label),
                    });
                }
                _ => {}
            }
        }
    }
    Ok(facts)
}

fn record_import(node: Node, source: &[u8], facts: &mut FileFacts) {
    let Some(path) = field_text(node, "path", source) else {
        return;
    };
    let path = path.trim_matches(|c| c == '"' || c == '`').to_string();
    let alias = match node.child_by_field_name("name") {
        Some(name) => match name.kind() {
            "dot" | "blank_identifier" => return,
            _ => match name.utf8_text(source) {
                Ok(text) => text.to_string(),
                Err(_) => return,
            },
        },
        None => default_package_name(&path),
    };
    facts.imports.insert(alias, path);
}

fn field_text<'s>(node: Node, field: &str, source: &'s [u8]) -> Option<&'s str> {
    node.child_by_field_name(field)?.utf8_text(source).ok()
}

fn position(node: Node, label: &str) -> String {
    let p = node.start_position();
    format!("{label}:{}:{}", p.row + 1, p.column + 1)
}

fn collect_syntax_errors(node: Node, label: &str, errors: &mut Vec<String>) {
    if node.is_error() {
        errors.push(format!("{}: syntax error", position(node, label)));
        return;
    }
    if node.is_missing() {
        errors.push(format!("{}: missing {}", position(node, label), node.kind()));
        return;
    }
    if !node.has_error() {
        return;
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        collect_syntax_errors(child, label, errors);
    }
}

/// Turns per-file facts into resolved objects.
fn assemble(import_path: String, facts: Vec<FileFacts>) -> CheckedPackage {
    let mut errors = Vec::new();
    let mut types: BTreeSet<(String, String)> = BTreeSet::new();

    for file in &facts {
        for (alias, name) in &file.types {
            if let Some(path) = file.imports.get(alias) {
                types.insert((path.clone(), name.clone()));
            }
        }
    }

    let mut uses = Vec::new();
    for (path, name) in &types {
        uses.push(type_use(path, name));
    }

    for file in facts {
        errors.extend(file.errors);
        for sel in file.selectors {
            let Some(path) = file.imports.get(&sel.alias) else {
                continue;
            };
            if !is_exported_identifier(&sel.name) {
                errors.push(format!(
                    "{}: name {} not exported by package {}",
                    sel.position, sel.name, path
                ));
                continue;
            }
            if types.contains(&(path.clone(), sel.name.clone())) {
                continue;
            }
            let decl = if sel.is_call {
                Declared::Func { receiver: None }
            } else {
                Declared::Var { is_field: false }
            };
            uses.push(ResolvedObject {
                package: Some(path.clone()),
                name: sel.name,
                exported: true,
                decl,
            });
        }
    }

    CheckedPackage {
        path: import_path,
        errors,
        uses,
        module_dirs: BTreeMap::new(),
    }
}

fn type_use(path: &str, name: &str) -> ResolvedObject {
    ResolvedObject {
        package: Some(path.to_string()),
        name: name.to_string(),
        exported: is_exported_identifier(name),
        decl: Declared::TypeName {
            named: Some(NamedType {
                package: path.to_string(),
                name: name.to_string(),
            }),
        },
    }
}
