use std::collections::{BTreeMap, HashSet};

use crate::error::ValidationError;
use crate::query::parse_selector;
use crate::value::{FieldPath, Value};

use super::{definition_path, Field, Kind, ObjectSchema};

/// Collect every structural error of a schema tree and its definitions.
/// Pure: running it twice on the same input reports the same list.
pub fn validate(
    root: &ObjectSchema,
    definitions: &BTreeMap<String, ObjectSchema>,
) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    check_object(root, &FieldPath::root(), definitions, &mut errors);
    for (name, schema) in definitions {
        check_object(schema, &definition_path(name), definitions, &mut errors);
    }
    errors
}

fn check_object(
    schema: &ObjectSchema,
    path: &FieldPath,
    definitions: &BTreeMap<String, ObjectSchema>,
    errors: &mut Vec<ValidationError>,
) {
    let mut seen = HashSet::new();
    for field in &schema.fields {
        let field_path = path.field(&field.name);
        if field.name.trim().is_empty() {
            errors.push(ValidationError::EmptyName {
                path: field_path.clone(),
            });
        } else if !seen.insert(field.name.as_str()) {
            errors.push(ValidationError::DuplicateName {
                path: path.clone(),
                name: field.name.clone(),
            });
        }
        check_field(field, &field_path, definitions, errors);
    }
}

fn check_field(
    field: &Field,
    path: &FieldPath,
    definitions: &BTreeMap<String, ObjectSchema>,
    errors: &mut Vec<ValidationError>,
) {
    if field.selector.trim().is_empty() {
        errors.push(ValidationError::EmptySelector { path: path.clone() });
    } else if let Err(source) = parse_selector(&field.selector) {
        errors.push(ValidationError::InvalidSelector {
            path: path.clone(),
            source,
        });
    }

    if let Some(default) = &field.default {
        if let Err(reason) = check_default(&field.kind, default, definitions) {
            errors.push(ValidationError::BadDefault {
                path: path.clone(),
                reason,
            });
        }
    }

    match &field.kind {
        Kind::List(element) => check_element(element, &path.index(0), definitions, errors),
        kind => check_kind(kind, path, definitions, errors),
    }
}

fn check_element(
    element: &Kind,
    path: &FieldPath,
    definitions: &BTreeMap<String, ObjectSchema>,
    errors: &mut Vec<ValidationError>,
) {
    match element {
        Kind::List(_) => errors.push(ValidationError::NestedList { path: path.clone() }),
        kind => check_kind(kind, path, definitions, errors),
    }
}

fn check_kind(
    kind: &Kind,
    path: &FieldPath,
    definitions: &BTreeMap<String, ObjectSchema>,
    errors: &mut Vec<ValidationError>,
) {
    match kind {
        Kind::Scalar(_) => {}
        Kind::Object(schema) => check_object(schema, path, definitions, errors),
        Kind::Ref(name) => {
            if !definitions.contains_key(name) {
                errors.push(ValidationError::UnknownDefinition {
                    path: path.clone(),
                    name: name.clone(),
                });
            }
        }
        Kind::List(element) => check_element(element, &path.index(0), definitions, errors),
    }
}

fn check_default(
    kind: &Kind,
    default: &Value,
    definitions: &BTreeMap<String, ObjectSchema>,
) -> Result<(), String> {
    match (kind, default) {
        (Kind::List(_), _) => Err("is not allowed on a list; an unmatched list is empty".into()),
        (_, Value::Missing) => Err("cannot be missing".into()),
        _ => check_value(kind, default, definitions),
    }
}

/// `value` has the shape `kind` would bind: scalar types match, objects carry
/// exactly the declared keys in order.
fn check_value(
    kind: &Kind,
    value: &Value,
    definitions: &BTreeMap<String, ObjectSchema>,
) -> Result<(), String> {
    match (kind, value) {
        (Kind::Scalar(spec), Value::Scalar(s)) if s.scalar_type() == spec.ty => Ok(()),
        (Kind::Scalar(spec), Value::Scalar(s)) => Err(format!(
            "has type {} but the field is {}",
            s.scalar_type(),
            spec.ty
        )),
        (Kind::Object(schema), Value::Object(entries)) => {
            check_entries(schema, entries, definitions)
        }
        // An unknown definition is reported on its own.
        (Kind::Ref(name), Value::Object(entries)) => match definitions.get(name) {
            Some(schema) => check_entries(schema, entries, definitions),
            None => Ok(()),
        },
        (Kind::List(element), Value::List(items)) => items
            .iter()
            .enumerate()
            .filter(|(_, item)| !item.is_missing())
            .try_for_each(|(i, item)| {
                check_value(element, item, definitions).map_err(|e| format!("[{i}] {e}"))
            }),
        (kind, _) => Err(format!("does not fit a {} field", kind.label())),
    }
}

fn check_entries(
    schema: &ObjectSchema,
    entries: &[(String, Value)],
    definitions: &BTreeMap<String, ObjectSchema>,
) -> Result<(), String> {
    let declared: Vec<&str> = schema.fields.iter().map(|f| f.name.as_str()).collect();
    let given: Vec<&str> = entries.iter().map(|(k, _)| k.as_str()).collect();
    if declared != given {
        return Err(format!(
            "has keys [{}] but the object declares [{}]",
            given.join(", "),
            declared.join(", ")
        ));
    }
    for (field, (name, value)) in schema.fields.iter().zip(entries) {
        match value {
            Value::Missing if field.required => {
                return Err(format!("`{name}` is required and cannot be missing"))
            }
            Value::Missing => {}
            value => check_value(&field.kind, value, definitions)
                .map_err(|e| format!("`{name}` {e}"))?,
        }
    }
    Ok(())
}
