//! Declarative mapping model: a tree of field descriptors built once,
//! validated, and shared read-only by every extraction run.

pub mod file;
pub mod validate;

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{ValidationError, ValidationErrors};
use crate::value::{FieldPath, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalarType {
    String,
    Integer,
    Float,
    Boolean,
    Date,
    Url,
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ScalarType::String => "string",
            ScalarType::Integer => "integer",
            ScalarType::Float => "float",
            ScalarType::Boolean => "boolean",
            ScalarType::Date => "date",
            ScalarType::Url => "url",
        })
    }
}

/// Which content of a matched node feeds coercion.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Source {
    /// Whitespace-normalized visible text.
    #[default]
    Text,
    Attr(String),
    /// Text nodes as written, for `<script>` and `<pre>` payloads.
    RawText,
    InnerHtml,
}

/// What to do when a selector yields more than one node for a scalar or
/// object field. Lists always take every match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MultiMatch {
    #[default]
    First,
    Last,
    /// More than one match is unexpected: reported, then the first is used.
    All,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScalarSpec {
    pub ty: ScalarType,
    pub source: Source,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ObjectSchema {
    pub fields: Vec<Field>,
}

impl ObjectSchema {
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Kind {
    Scalar(ScalarSpec),
    Object(ObjectSchema),
    /// Element kind bound once per match, scoped to the matched node.
    List(Box<Kind>),
    /// A named definition of the mapping, bound like an object.
    Ref(String),
}

impl Kind {
    pub fn scalar(ty: ScalarType) -> Self {
        Kind::Scalar(ScalarSpec {
            ty,
            source: Source::Text,
        })
    }

    pub fn attr(ty: ScalarType, name: &str) -> Self {
        Kind::Scalar(ScalarSpec {
            ty,
            source: Source::Attr(name.to_string()),
        })
    }

    pub fn object(fields: Vec<Field>) -> Self {
        Kind::Object(ObjectSchema::new(fields))
    }

    pub fn list(element: Kind) -> Self {
        Kind::List(Box::new(element))
    }

    pub fn reference(name: &str) -> Self {
        Kind::Ref(name.to_string())
    }

    pub(crate) fn label(&self) -> &'static str {
        match self {
            Kind::Scalar(_) => "scalar",
            Kind::Object(_) => "object",
            Kind::List(_) => "list",
            Kind::Ref(_) => "reference",
        }
    }
}

/// One output field: where to look, what to build, how strict to be.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub selector: String,
    pub kind: Kind,
    pub required: bool,
    pub default: Option<Value>,
    pub multiple: MultiMatch,
}

impl Field {
    pub fn new(name: &str, selector: &str, kind: Kind) -> Self {
        Self {
            name: name.to_string(),
            selector: selector.to_string(),
            kind,
            required: false,
            default: None,
            multiple: MultiMatch::First,
        }
    }

    pub fn scalar(name: &str, selector: &str, ty: ScalarType) -> Self {
        Self::new(name, selector, Kind::scalar(ty))
    }

    pub fn string(name: &str, selector: &str) -> Self {
        Self::scalar(name, selector, ScalarType::String)
    }

    pub fn object(name: &str, selector: &str, fields: Vec<Field>) -> Self {
        Self::new(name, selector, Kind::object(fields))
    }

    pub fn list(name: &str, selector: &str, element: Kind) -> Self {
        Self::new(name, selector, Kind::list(element))
    }

    pub fn reference(name: &str, selector: &str, definition: &str) -> Self {
        Self::new(name, selector, Kind::reference(definition))
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn policy(mut self, multiple: MultiMatch) -> Self {
        self.multiple = multiple;
        self
    }

    /// Read the scalar from `attr` instead of the node text.
    pub fn from_attr(mut self, attr: &str) -> Self {
        if let Kind::Scalar(spec) = &mut self.kind {
            spec.source = Source::Attr(attr.to_string());
        }
        self
    }

    pub fn from_source(mut self, source: Source) -> Self {
        if let Kind::Scalar(spec) = &mut self.kind {
            spec.source = source;
        }
        self
    }
}

/// A validated mapping. Only [`MappingBuilder::build`] and the file loaders
/// produce one, so extraction never starts from a broken schema.
#[derive(Debug, Clone, PartialEq)]
pub struct Mapping {
    name: String,
    base_url: Option<Url>,
    root: ObjectSchema,
    definitions: BTreeMap<String, ObjectSchema>,
}

impl Mapping {
    pub fn builder(name: &str) -> MappingBuilder {
        MappingBuilder {
            name: name.to_string(),
            base_url: None,
            fields: Vec::new(),
            definitions: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn base_url(&self) -> Option<&Url> {
        self.base_url.as_ref()
    }

    pub fn root(&self) -> &ObjectSchema {
        &self.root
    }

    pub fn definition(&self, name: &str) -> Option<&ObjectSchema> {
        self.definitions.get(name)
    }

    /// Re-run the structural checks. Always empty for a built mapping.
    pub fn validate(&self) -> Vec<ValidationError> {
        validate::validate(&self.root, &self.definitions)
    }
}

#[derive(Debug, Clone)]
pub struct MappingBuilder {
    name: String,
    base_url: Option<String>,
    fields: Vec<Field>,
    definitions: BTreeMap<String, ObjectSchema>,
}

impl MappingBuilder {
    pub fn base_url(mut self, url: &str) -> Self {
        self.base_url = Some(url.to_string());
        self
    }

    pub fn field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    pub fn fields(mut self, fields: impl IntoIterator<Item = Field>) -> Self {
        self.fields.extend(fields);
        self
    }

    pub fn definition(mut self, name: &str, fields: Vec<Field>) -> Self {
        self.definitions
            .insert(name.to_string(), ObjectSchema::new(fields));
        self
    }

    /// Structural errors of the mapping as currently assembled.
    pub fn validate(&self) -> Vec<ValidationError> {
        let root = ObjectSchema::new(self.fields.clone());
        let mut errors = Vec::new();
        if let Some(raw) = &self.base_url {
            if let Err(e) = Url::parse(raw) {
                errors.push(ValidationError::BadBaseUrl {
                    url: raw.clone(),
                    reason: e.to_string(),
                });
            }
        }
        errors.extend(validate::validate(&root, &self.definitions));
        errors
    }

    pub fn build(self) -> Result<Mapping, ValidationErrors> {
        let errors = self.validate();
        if !errors.is_empty() {
            return Err(ValidationErrors(errors));
        }
        let base_url = match self.base_url {
            Some(raw) => Some(Url::parse(&raw).map_err(|e| {
                ValidationErrors(vec![ValidationError::BadBaseUrl {
                    url: raw.clone(),
                    reason: e.to_string(),
                }])
            })?),
            None => None,
        };
        Ok(Mapping {
            name: self.name,
            base_url,
            root: ObjectSchema::new(self.fields),
            definitions: self.definitions,
        })
    }
}

pub(crate) fn definition_path(name: &str) -> FieldPath {
    FieldPath::root().field(&format!("#{name}"))
}
