//! # Usage: Static Detection of External Symbols
//!
//! **Role**: Finds, per external package, the exported symbols a consumer package touches.
//!
//! **Pipeline**:
//! 1. A [`PackageLoader`] produces a [`CheckedPackage`]: every resolved identifier use.
//!    - [`GoPackagesLoader`]: full type-checking via a `go/packages` probe.
//!    - [`SyntaxLoader`]: tree-sitter-go, offline, qualified references only.
//! 2. [`detect`] drops built-ins, the standard library and the consumer's own project,
//!    then buckets the rest into type-like and value-like [`common::UsageIndex`]es.
//! 3. [`directive::format_all`] renders one re-extraction directive per package.
//!
//! "Same project" means a shared repository root ([`vcs`]) or overlapping import paths.

pub mod detect;
pub mod directive;
pub mod loader;
pub mod syntax;
pub mod typecheck;
pub mod vcs;

pub use detect::{detect, DetectError, Detection, InvariantError};
pub use directive::{format_all, format_directive};
pub use loader::{CheckedPackage, LoadError, PackageLoader};
pub use syntax::SyntaxLoader;
pub use typecheck::GoPackagesLoader;
