use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::value::FieldPath;

/// A selector the query engine could not parse.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid selector `{selector}`: {message}")]
pub struct SelectorError {
    pub selector: String,
    pub message: String,
}

/// Structural problem found while compiling a mapping.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{path}: field name is empty")]
    EmptyName { path: FieldPath },

    #[error("{path}: duplicate field name `{name}`")]
    DuplicateName { path: FieldPath, name: String },

    #[error("{path}: selector is empty")]
    EmptySelector { path: FieldPath },

    #[error("{path}: {source}")]
    InvalidSelector {
        path: FieldPath,
        source: SelectorError,
    },

    #[error("{path}: a list cannot directly contain another list, wrap it in an object")]
    NestedList { path: FieldPath },

    #[error("{path}: unknown definition `{name}`")]
    UnknownDefinition { path: FieldPath, name: String },

    #[error("{path}: default value {reason}")]
    BadDefault { path: FieldPath, reason: String },

    #[error("{path}: {reason}")]
    BadField { path: FieldPath, reason: String },

    #[error("invalid base url `{url}`: {reason}")]
    BadBaseUrl { url: String, reason: String },
}

/// Every structural error of a mapping, in traversal order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationErrors(pub Vec<ValidationError>);

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} structural error(s)", self.0.len())?;
        for err in &self.0 {
            write!(f, "\n  - {err}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

/// Errors raised while loading a mapping file.
#[derive(Debug, Error)]
pub enum MappingError {
    #[error("failed to read mapping {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("malformed JSON mapping: {0}")]
    Json(#[from] serde_json::Error),

    #[error("malformed TOML mapping: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("unsupported mapping format for {0} (expected .json or .toml)")]
    UnsupportedFormat(PathBuf),

    #[error("mapping is invalid: {0}")]
    Invalid(#[from] ValidationErrors),
}

/// Errors raised while loading a document.
#[derive(Debug, Error)]
pub enum InputError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to fetch {url}: {source}")]
    Http {
        url: String,
        source: reqwest::Error,
    },

    #[error("fetching {url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("failed to build HTTP client: {0}")]
    Client(reqwest::Error),

    /// The loading task ended without a result, e.g. it panicked.
    #[error("loading {0} did not complete")]
    Incomplete(String),
}

/// Errors raised by the mapping registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("no mapping registered under `{0}`")]
    NotFound(String),

    #[error("failed to list mapping directory {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}
