//! The binding engine: walks a [`Mapping`] against a [`Document`] and
//! produces a typed [`Extraction`].
//!
//! Extraction is a pure function of its inputs. Field-level anomalies become
//! diagnostics and never abort the run; the only terminal error is a selector
//! the query engine cannot parse.

mod bind;
pub mod coerce;

use tracing::debug;

use crate::error::SelectorError;
use crate::query::Document;
use crate::schema::Mapping;
use crate::value::Extraction;

use bind::Binder;
pub use coerce::{coerce, CoercionContext, CoercionFailed};

pub const DEFAULT_MAX_DEPTH: usize = 32;

#[derive(Debug, Clone)]
pub struct ExtractOptions {
    /// Deepest object nesting bound before `DepthExceeded` is reported.
    /// Bounds self-referential definitions.
    pub max_depth: usize,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

pub fn extract(document: &Document, mapping: &Mapping) -> Result<Extraction, SelectorError> {
    extract_with(document, mapping, &ExtractOptions::default())
}

pub fn extract_with(
    document: &Document,
    mapping: &Mapping,
    options: &ExtractOptions,
) -> Result<Extraction, SelectorError> {
    let ctx = CoercionContext {
        base_url: mapping.base_url().or(document.url()).cloned(),
    };
    let mut binder = Binder::new(mapping, options.max_depth, ctx);
    let data = binder.bind_record(document.root())?;
    let extraction = Extraction {
        data,
        diagnostics: binder.into_diagnostics(),
    };
    debug!(
        mapping = mapping.name(),
        diagnostics = extraction.diagnostics.len(),
        failed = extraction.is_failed(),
        "extraction finished"
    );
    Ok(extraction)
}

/// Parse `markup` and extract it in one step.
pub fn extract_markup(
    markup: &str,
    mapping: &Mapping,
    options: &ExtractOptions,
) -> Result<Extraction, SelectorError> {
    extract_with(&Document::parse(markup), mapping, options)
}

#[cfg(test)]
mod tests;
