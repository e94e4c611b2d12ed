//! Symbol references and the per-package usage index.

use crate::ident::is_exported_identifier;
use serde::Serialize;
use std::collections::BTreeMap;

/// Declared-object kind of a referenced symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolKind {
    /// A named type declaration.
    Type,
    Const,
    /// A package-level variable (never a struct field).
    Var,
    /// A free function.
    Func,
    /// A method, recorded as `Receiver.Method` under the receiver's package.
    MethodReceiver,
}

impl SymbolKind {
    /// Returns `true` if the symbol belongs in the type bucket.
    pub fn is_type_like(self) -> bool {
        matches!(self, SymbolKind::Type)
    }
}

/// One statically-resolved reference into an external package.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SymbolRef {
    pub package_path: String,
    pub name: String,
    pub kind: SymbolKind,
}

impl SymbolRef {
    pub fn new(package_path: impl Into<String>, name: impl Into<String>, kind: SymbolKind) -> Self {
        Self {
            package_path: package_path.into(),
            name: name.into(),
            kind,
        }
    }
}

/// `package path → names`, built incrementally and finalized once.
///
/// After [`UsageIndex::finalize`], every name list is sorted, duplicate-free, free of the
/// blank identifier and contains only exported identifiers. Packages left without names
/// are dropped.
///
/// # Example
/// ```
/// # use common::UsageIndex;
/// let mut index = UsageIndex::default();
/// index.record("example.org/pkg", "Zeta");
/// index.record("example.org/pkg", "Alpha");
/// index.record("example.org/pkg", "Zeta");
/// index.record("example.org/pkg", "_");
/// index.finalize();
/// assert_eq!(index.get("example.org/pkg"), ["Alpha", "Zeta"]);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct UsageIndex {
    entries: BTreeMap<String, Vec<String>>,
}

impl UsageIndex {
    /// Appends a name under `package`. Duplicates are resolved by `finalize`.
    pub fn record(&mut self, package: &str, name: impl Into<String>) {
        self.entries
            .entry(package.to_string())
            .or_default()
            .push(name.into());
    }

    /// Deduplicates, strips the blank identifier and unexported names, then sorts.
    pub fn finalize(&mut self) {
        for names in self.entries.values_mut() {
            names.retain(|n| n != "_" && is_exported_identifier(n));
            names.sort();
            names.dedup();
        }
        self.entries.retain(|_, names| !names.is_empty());
    }

    /// Names recorded for `package`, or an empty slice.
    pub fn get(&self, package: &str) -> &[String] {
        self.entries.get(package).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Package paths in sorted order.
    pub fn packages(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn contains_package(&self, package: &str) -> bool {
        self.entries.contains_key(package)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
