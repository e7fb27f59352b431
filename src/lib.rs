//! Declarative extraction of typed records from HTML.
//!
//! A [`Mapping`] describes the output tree: field names, selectors, scalar
//! types, nesting, required flags and defaults. [`extract`] binds it against a
//! parsed [`Document`] and returns the typed value tree together with a
//! diagnostic for every gap it had to paper over.

pub mod batch;
pub mod engine;
pub mod error;
pub mod input;
pub mod query;
pub mod registry;
pub mod schema;
pub mod value;

pub use engine::{extract, extract_markup, extract_with, CoercionContext, ExtractOptions};
pub use error::{InputError, MappingError, RegistryError, SelectorError, ValidationError, ValidationErrors};
pub use query::{Document, Node};
pub use registry::Registry;
pub use schema::{Field, Kind, Mapping, MappingBuilder, MultiMatch, ObjectSchema, ScalarType, Source};
pub use value::{Diagnostic, DiagnosticKind, Extraction, FieldPath, Scalar, Value};
