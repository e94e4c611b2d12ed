use common::{validate_all, Provenance, ValidationError};

/// Symbols to reflect on in one package.
///
/// Only constructible through [`ReflectionRequest::new`], which validates every name, so
/// holding a request means its names are all exported identifiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReflectionRequest {
    import_path: String,
    types: Vec<String>,
    values: Vec<String>,
}

impl ReflectionRequest {
    pub fn new(
        import_path: impl Into<String>,
        types: Vec<String>,
        values: Vec<String>,
    ) -> Result<Self, ValidationError> {
        validate_all(types.iter().chain(values.iter()).map(String::as_str))?;
        Ok(Self {
            import_path: import_path.into(),
            types,
            values,
        })
    }

    /// Builds a request from comma-separated name lists, ignoring empty items.
    pub fn from_lists(import_path: &str, types: &str, values: &str) -> Result<Self, ValidationError> {
        Self::new(import_path, split_list(types), split_list(values))
    }

    pub fn import_path(&self) -> &str {
        &self.import_path
    }

    pub fn types(&self) -> &[String] {
        &self.types
    }

    pub fn values(&self) -> &[String] {
        &self.values
    }

    pub fn provenance(&self) -> Provenance {
        Provenance::new(&self.import_path, &self.types, &self.values)
    }
}

/// Splits on commas, dropping empty items.
///
/// ```
/// # use harness::split_list;
/// assert_eq!(split_list("A,,B,"), ["A", "B"]);
/// assert!(split_list("").is_empty());
/// ```
pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
