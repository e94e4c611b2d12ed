//! Exported-identifier validation.
//!
//! Grammar (anchored over the whole name):
//!
//! ```text
//! name    = segment { "." segment }
//! segment = upper { letter | digit }
//! ```
//!
//! `letter` includes `_`, as in the Go language definition, but a segment must start
//! with an upper-case letter. Dotted names address methods (`Type.Method`).

/// A symbol name rejected by the validator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{name:?} is not a valid exported name")]
pub struct ValidationError {
    pub name: String,
}

/// Returns `true` if `name` is an exported identifier, optionally dotted.
///
/// # Example
/// ```
/// # use common::is_exported_identifier;
/// assert!(is_exported_identifier("Client"));
/// assert!(is_exported_identifier("Client.Do"));
/// assert!(!is_exported_identifier("client"));
/// assert!(!is_exported_identifier("Client..Do"));
/// ```
pub fn is_exported_identifier(name: &str) -> bool {
    !name.is_empty() && name.split('.').all(is_exported_segment)
}

fn is_exported_segment(segment: &str) -> bool {
    let mut chars = segment.chars();
    match chars.next() {
        Some(first) if first.is_uppercase() => {
            chars.all(|c| c == '_' || c.is_alphabetic() || c.is_numeric())
        }
        _ => false,
    }
}

/// Checks every name, failing on the first invalid one.
///
/// All-or-nothing: callers must not start any work for a request until this passes.
pub fn validate_all<'a, I>(names: I) -> Result<(), ValidationError>
where
    I: IntoIterator<Item = &'a str>,
{
    for name in names {
        if !is_exported_identifier(name) {
            return Err(ValidationError {
                name: name.to_string(),
            });
        }
    }
    Ok(())
}
