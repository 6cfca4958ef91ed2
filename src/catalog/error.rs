//! Error types for catalog parsing and loading.

use thiserror::Error;

use crate::storage::StoreError;

/// What was wrong with a catalog field.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ParseProblem {
    /// The field is absent.
    #[error("is missing")]
    Missing,
    /// The field has the wrong JSON type.
    #[error("must be {expected}")]
    WrongType {
        /// JSON type the parser expected.
        expected: &'static str,
    },
    /// The field is present but its value is unacceptable.
    #[error("is invalid: {0}")]
    Invalid(String),
    /// The document is not JSON at all.
    #[error("is not valid JSON: {0}")]
    Syntax(String),
}

/// Raised when a catalog document lacks required structure.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("catalog field '{field}' {problem}")]
pub struct ParseError {
    /// Dotted path of the offending field.
    pub field: String,
    /// Description of the failure.
    pub problem: ParseProblem,
}

impl ParseError {
    pub(super) fn new(field: impl Into<String>, problem: ParseProblem) -> Self {
        Self {
            field: field.into(),
            problem,
        }
    }
}

/// Errors raised while loading a catalog from a store.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum CatalogError {
    /// Raised when a document cannot be read from the store.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Raised when a stored document is malformed.
    #[error("failed to parse {path}: {source}")]
    Parse {
        /// Store path of the document.
        path: String,
        /// Parser failure.
        #[source]
        source: ParseError,
    },
    /// Raised when a document declares a format this crate does not read.
    #[error("{path} has unsupported format '{format}'")]
    UnsupportedFormat {
        /// Store path of the document.
        path: String,
        /// Format string found in the document.
        format: String,
    },
    /// Raised when the index has no image entry serving the region.
    #[error("no image-ids index entry serves region {region}")]
    NoIndexEntry {
        /// Region requested by the caller.
        region: String,
    },
}
