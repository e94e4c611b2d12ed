//! Declaration model decoded from a reflection probe.
//!
//! The probe encodes the packed model with Go's `encoding/json`, so field names arrive in
//! PascalCase. Fields this side does not know about are kept verbatim in `extra` and
//! re-emitted unchanged.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct DeclarationModel {
    pub name: String,
    pub pkg_path: String,
    pub types: Vec<TypeDecl>,
    pub values: Vec<ValueDecl>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct TypeDecl {
    pub name: String,
    /// `struct`, `interface`, `func`, `map`, ... as reported by `reflect.Kind`.
    pub kind: String,
    pub underlying: Option<String>,
    pub methods: Vec<MethodDecl>,
    pub fields: Vec<FieldDecl>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct MethodDecl {
    pub name: String,
    pub signature: String,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct FieldDecl {
    pub name: String,
    #[serde(rename = "Type")]
    pub type_: String,
    pub embedded: bool,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ValueDecl {
    pub name: String,
    /// `func`, `var` or `const`.
    pub kind: String,
    #[serde(rename = "Type")]
    pub type_: String,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl DeclarationModel {
    pub fn type_named(&self, name: &str) -> Option<&TypeDecl> {
        self.types.iter().find(|t| t.name == name)
    }

    pub fn value_named(&self, name: &str) -> Option<&ValueDecl> {
        self.values.iter().find(|v| v.name == name)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("Malformed model JSON: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("Model has no package path")]
    MissingPkgPath,
}

/// Decodes the bytes a probe wrote to its `-output` file.
///
/// Output without a package path did not come from a model encoder.
pub fn decode(bytes: &[u8]) -> Result<DeclarationModel, DecodeError> {
    let model: DeclarationModel = serde_json::from_slice(bytes)?;
    if model.pkg_path.is_empty() {
        return Err(DecodeError::MissingPkgPath);
    }
    Ok(model)
}

/// What was asked for, carried alongside the model to the code generator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Provenance {
    pub import_path: String,
    /// Comma-joined requested type names.
    pub types: String,
    /// Comma-joined requested value names.
    pub values: String,
}

impl Provenance {
    pub fn new(import_path: &str, types: &[String], values: &[String]) -> Self {
        Self {
            import_path: import_path.to_string(),
            types: types.join(","),
            values: values.join(","),
        }
    }
}
