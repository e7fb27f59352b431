//! JSON / TOML mapping files.
//!
//! Field lists are arrays so the output keeps the author's order:
//!
//! ```json
//! {
//!   "name": "latest",
//!   "base_url": "https://bakashi.tv",
//!   "fields": [
//!     { "name": "episodes", "selector": "article", "list": { "fields": [
//!       { "name": "title", "selector": ".data a", "required": true },
//!       { "name": "link", "selector": ".data a", "attr": "href", "type": "url" }
//!     ]}}
//!   ]
//! }
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use chrono::NaiveDate;
use serde::Deserialize;
use url::Url;

use crate::error::{MappingError, ValidationError, ValidationErrors};
use crate::value::{FieldPath, Scalar, Value};

use super::{definition_path, Field, Kind, Mapping, MultiMatch, ScalarSpec, ScalarType, Source};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MappingFile {
    pub name: Option<String>,
    pub base_url: Option<String>,
    #[serde(default)]
    pub fields: Vec<FieldSpec>,
    #[serde(default)]
    pub definitions: BTreeMap<String, Vec<FieldSpec>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceSpec {
    Text,
    RawText,
    InnerHtml,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FieldSpec {
    pub name: String,
    pub selector: String,
    #[serde(rename = "type")]
    pub ty: Option<ScalarType>,
    pub attr: Option<String>,
    pub source: Option<SourceSpec>,
    pub fields: Option<Vec<FieldSpec>>,
    pub list: Option<Box<ElementSpec>>,
    #[serde(rename = "ref")]
    pub reference: Option<String>,
    #[serde(default)]
    pub required: bool,
    pub default: Option<serde_json::Value>,
    #[serde(default)]
    pub multiple: MultiMatch,
}

/// A list element: the same kind keys as a field, minus name and selector.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ElementSpec {
    #[serde(rename = "type")]
    pub ty: Option<ScalarType>,
    pub attr: Option<String>,
    pub source: Option<SourceSpec>,
    pub fields: Option<Vec<FieldSpec>>,
    pub list: Option<Box<ElementSpec>>,
    #[serde(rename = "ref")]
    pub reference: Option<String>,
}

struct KindParts<'a> {
    ty: Option<ScalarType>,
    attr: Option<&'a String>,
    source: Option<SourceSpec>,
    fields: Option<&'a Vec<FieldSpec>>,
    list: Option<&'a ElementSpec>,
    reference: Option<&'a String>,
}

impl FieldSpec {
    fn parts(&self) -> KindParts<'_> {
        KindParts {
            ty: self.ty,
            attr: self.attr.as_ref(),
            source: self.source,
            fields: self.fields.as_ref(),
            list: self.list.as_deref(),
            reference: self.reference.as_ref(),
        }
    }
}

impl ElementSpec {
    fn parts(&self) -> KindParts<'_> {
        KindParts {
            ty: self.ty,
            attr: self.attr.as_ref(),
            source: self.source,
            fields: self.fields.as_ref(),
            list: self.list.as_deref(),
            reference: self.reference.as_ref(),
        }
    }
}

pub fn from_json_str(text: &str, fallback_name: &str) -> Result<Mapping, MappingError> {
    let file: MappingFile = serde_json::from_str(text)?;
    compile(file, fallback_name)
}

pub fn from_toml_str(text: &str, fallback_name: &str) -> Result<Mapping, MappingError> {
    let file: MappingFile = toml::from_str(text)?;
    compile(file, fallback_name)
}

/// Load a `.json` or `.toml` mapping. The file stem names the mapping unless
/// the file sets `name` itself.
pub fn load(path: &Path) -> Result<Mapping, MappingError> {
    let ext = path.extension().and_then(|e| e.to_str());
    if !matches!(ext, Some("json" | "toml")) {
        return Err(MappingError::UnsupportedFormat(path.to_path_buf()));
    }
    let text = std::fs::read_to_string(path).map_err(|source| MappingError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("mapping");
    if ext == Some("toml") {
        from_toml_str(&text, stem)
    } else {
        from_json_str(&text, stem)
    }
}

pub fn compile(file: MappingFile, fallback_name: &str) -> Result<Mapping, MappingError> {
    let name = file.name.as_deref().unwrap_or(fallback_name);
    let mut errors = Vec::new();

    let defs = &file.definitions;
    let fields = convert_fields(&file.fields, &FieldPath::root(), defs, &mut errors);
    let mut builder = Mapping::builder(name).fields(fields);
    if let Some(url) = &file.base_url {
        builder = builder.base_url(url);
    }
    for (def_name, specs) in &file.definitions {
        let fields = convert_fields(specs, &definition_path(def_name), defs, &mut errors);
        builder = builder.definition(def_name, fields);
    }

    errors.extend(builder.validate());
    if !errors.is_empty() {
        return Err(ValidationErrors(errors).into());
    }
    Ok(builder.build()?)
}

type Definitions = BTreeMap<String, Vec<FieldSpec>>;

fn convert_fields(
    specs: &[FieldSpec],
    parent: &FieldPath,
    defs: &Definitions,
    errors: &mut Vec<ValidationError>,
) -> Vec<Field> {
    specs
        .iter()
        .map(|spec| convert_field(spec, &parent.field(&spec.name), defs, errors))
        .collect()
}

fn convert_field(
    spec: &FieldSpec,
    path: &FieldPath,
    defs: &Definitions,
    errors: &mut Vec<ValidationError>,
) -> Field {
    let kind = convert_kind(spec.parts(), path, defs, errors);
    let default = spec.default.as_ref().and_then(|raw| {
        convert_default(raw, &kind, defs)
            .map_err(|reason| {
                errors.push(ValidationError::BadDefault {
                    path: path.clone(),
                    reason,
                })
            })
            .ok()
    });
    Field {
        name: spec.name.clone(),
        selector: spec.selector.clone(),
        kind,
        required: spec.required,
        default,
        multiple: spec.multiple,
    }
}

fn convert_kind(
    parts: KindParts<'_>,
    path: &FieldPath,
    defs: &Definitions,
    errors: &mut Vec<ValidationError>,
) -> Kind {
    let is_scalar = parts.ty.is_some() || parts.attr.is_some() || parts.source.is_some();
    let declared = [
        is_scalar,
        parts.fields.is_some(),
        parts.list.is_some(),
        parts.reference.is_some(),
    ]
    .iter()
    .filter(|d| **d)
    .count();
    if declared > 1 {
        errors.push(ValidationError::BadField {
            path: path.clone(),
            reason: "set only one of type/attr/source, fields, list or ref".into(),
        });
    }

    if let Some(fields) = parts.fields {
        return Kind::object(convert_fields(fields, path, defs, errors));
    }
    if let Some(element) = parts.list {
        return Kind::list(convert_kind(element.parts(), &path.index(0), defs, errors));
    }
    if let Some(name) = parts.reference {
        return Kind::reference(name);
    }

    let source = match (parts.attr, parts.source) {
        (Some(_), Some(_)) => {
            errors.push(ValidationError::BadField {
                path: path.clone(),
                reason: "`attr` and `source` are mutually exclusive".into(),
            });
            Source::Text
        }
        (Some(attr), None) => Source::Attr(attr.clone()),
        (None, Some(SourceSpec::RawText)) => Source::RawText,
        (None, Some(SourceSpec::InnerHtml)) => Source::InnerHtml,
        (None, Some(SourceSpec::Text)) | (None, None) => Source::Text,
    };
    Kind::Scalar(ScalarSpec {
        ty: parts.ty.unwrap_or(ScalarType::String),
        source,
    })
}

/// A top-level scalar default must convert; anything deeper is converted as
/// far as the kind allows and left to validation for shape errors.
fn convert_default(raw: &serde_json::Value, kind: &Kind, defs: &Definitions) -> Result<Value, String> {
    match kind {
        Kind::Scalar(spec) => convert_scalar(raw, spec.ty)
            .map(Value::Scalar)
            .ok_or_else(|| format!("{raw} is not a valid {}", spec.ty)),
        kind => Ok(typed_value(raw, kind, defs)),
    }
}

fn convert_scalar(raw: &serde_json::Value, ty: ScalarType) -> Option<Scalar> {
    match ty {
        ScalarType::String => raw.as_str().map(|s| Scalar::String(s.to_string())),
        ScalarType::Integer => raw.as_i64().map(Scalar::Integer),
        ScalarType::Float => raw.as_f64().map(Scalar::Float),
        ScalarType::Boolean => raw.as_bool().map(Scalar::Boolean),
        ScalarType::Date => raw
            .as_str()
            .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
            .map(Scalar::Date),
        ScalarType::Url => raw.as_str().and_then(|s| Url::parse(s).ok()).map(Scalar::Url),
    }
}

fn typed_value(raw: &serde_json::Value, kind: &Kind, defs: &Definitions) -> Value {
    match (kind, raw) {
        (_, serde_json::Value::Null) => Value::Missing,
        (Kind::Scalar(spec), raw) => convert_scalar(raw, spec.ty)
            .map(Value::Scalar)
            .unwrap_or_else(|| plain_value(raw)),
        (Kind::Object(schema), serde_json::Value::Object(map)) => {
            let declared: Vec<(&str, Kind)> = schema
                .fields
                .iter()
                .map(|f| (f.name.as_str(), f.kind.clone()))
                .collect();
            typed_entries(map, &declared, defs)
        }
        (Kind::Ref(name), serde_json::Value::Object(map)) => {
            let specs = defs.get(name).map(Vec::as_slice).unwrap_or_default();
            // Errors in the definition are reported where it is declared.
            let declared: Vec<(&str, Kind)> = specs
                .iter()
                .map(|spec| {
                    let kind = convert_kind(spec.parts(), &FieldPath::root(), defs, &mut Vec::new());
                    (spec.name.as_str(), kind)
                })
                .collect();
            typed_entries(map, &declared, defs)
        }
        (Kind::List(element), serde_json::Value::Array(items)) => {
            Value::List(items.iter().map(|v| typed_value(v, element, defs)).collect())
        }
        (_, raw) => plain_value(raw),
    }
}

/// JSON objects carry no key order, so a default naming exactly the declared
/// fields is laid out in declaration order. Any other key set keeps the file's
/// order for validation to report.
fn typed_entries(
    map: &serde_json::Map<String, serde_json::Value>,
    declared: &[(&str, Kind)],
    defs: &Definitions,
) -> Value {
    let exact = map.len() == declared.len() && declared.iter().all(|(name, _)| map.contains_key(*name));
    if exact {
        return Value::Object(
            declared
                .iter()
                .map(|(name, kind)| (name.to_string(), typed_value(&map[*name], kind, defs)))
                .collect(),
        );
    }
    Value::Object(
        map.iter()
            .map(|(k, v)| {
                let value = match declared.iter().find(|(name, _)| *name == k.as_str()) {
                    Some((_, kind)) => typed_value(v, kind, defs),
                    None => plain_value(v),
                };
                (k.clone(), value)
            })
            .collect(),
    )
}

fn plain_value(raw: &serde_json::Value) -> Value {
    match raw {
        serde_json::Value::Null => Value::Missing,
        serde_json::Value::Bool(b) => Value::from(*b),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => Value::from(i),
            None => Value::from(n.as_f64().unwrap_or_default()),
        },
        serde_json::Value::String(s) => Value::from(s.as_str()),
        serde_json::Value::Array(items) => Value::List(items.iter().map(plain_value).collect()),
        serde_json::Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), plain_value(v)))
                .collect(),
        ),
    }
}

impl Mapping {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, MappingError> {
        load(path.as_ref())
    }
}
