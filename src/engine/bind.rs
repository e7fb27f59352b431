use tracing::debug;

use crate::error::SelectorError;
use crate::query::{self, Node};
use crate::schema::{Field, Kind, Mapping, MultiMatch, ObjectSchema, ScalarSpec, Source};
use crate::value::{Diagnostic, DiagnosticKind, FieldPath, Value};

use super::coerce::{coerce, CoercionContext};

/// A bound value and whether it fails the object that encloses it.
struct Bound {
    value: Value,
    fatal: bool,
}

impl Bound {
    fn ok(value: Value) -> Self {
        Self {
            value,
            fatal: false,
        }
    }

    fn fatal() -> Self {
        Self {
            value: Value::Missing,
            fatal: true,
        }
    }
}

/// State of one extraction run. Only the diagnostics list is mutated; the
/// mapping and the document are borrowed read-only.
pub(super) struct Binder<'m> {
    mapping: &'m Mapping,
    max_depth: usize,
    ctx: CoercionContext,
    diagnostics: Vec<Diagnostic>,
}

impl<'m> Binder<'m> {
    pub(super) fn new(mapping: &'m Mapping, max_depth: usize, ctx: CoercionContext) -> Self {
        Self {
            mapping,
            max_depth,
            ctx,
            diagnostics: Vec::new(),
        }
    }

    pub(super) fn into_diagnostics(self) -> Vec<Diagnostic> {
        self.diagnostics
    }

    /// Bind the mapping's root fields at `root`. `Missing` means a required
    /// root field could not be resolved.
    pub(super) fn bind_record(&mut self, root: Node<'_>) -> Result<Value, SelectorError> {
        let mapping = self.mapping;
        Ok(self
            .bind_object(root, mapping.root(), &FieldPath::root(), 0)?
            .value)
    }

    fn report(&mut self, path: &FieldPath, kind: DiagnosticKind) {
        debug!(path = %path, kind = ?kind, "field anomaly");
        self.diagnostics.push(Diagnostic::new(path.clone(), kind));
    }

    fn definition(&self, name: &str) -> &'m ObjectSchema {
        let mapping = self.mapping;
        match mapping.definition(name) {
            Some(schema) => schema,
            None => unreachable!("definition `{name}` is checked when the mapping is built"),
        }
    }

    fn bind_object(
        &mut self,
        scope: Node<'_>,
        schema: &'m ObjectSchema,
        path: &FieldPath,
        depth: usize,
    ) -> Result<Bound, SelectorError> {
        if depth > self.max_depth {
            self.report(
                path,
                DiagnosticKind::DepthExceeded {
                    limit: self.max_depth,
                },
            );
            return Ok(Bound::ok(Value::Missing));
        }

        let mut fields = Vec::with_capacity(schema.fields.len());
        let mut failed = false;
        for field in &schema.fields {
            let bound = self.bind_field(scope, field, &path.field(&field.name), depth)?;
            failed |= bound.fatal;
            fields.push((field.name.clone(), bound.value));
        }

        if failed {
            Ok(Bound::fatal())
        } else {
            Ok(Bound::ok(Value::Object(fields)))
        }
    }

    fn bind_field(
        &mut self,
        scope: Node<'_>,
        field: &'m Field,
        path: &FieldPath,
        depth: usize,
    ) -> Result<Bound, SelectorError> {
        let nodes = query::select(scope, &field.selector)?;
        match &field.kind {
            Kind::Scalar(spec) => Ok(self.bind_scalar(&nodes, field, spec, path)),
            Kind::Object(schema) => self.bind_anchored(&nodes, field, schema, path, depth),
            Kind::Ref(name) => {
                let schema = self.definition(name);
                self.bind_anchored(&nodes, field, schema, path, depth)
            }
            Kind::List(element) => self.bind_list(&nodes, field, element, path, depth),
        }
    }

    fn bind_scalar(
        &mut self,
        nodes: &[Node<'_>],
        field: &Field,
        spec: &ScalarSpec,
        path: &FieldPath,
    ) -> Bound {
        if nodes.is_empty() {
            return self.absent(field, path);
        }

        let node = self.choose(nodes, field.multiple, path);
        let Some(raw) = read(node, &spec.source) else {
            return self.absent(field, path);
        };
        match coerce(&raw, spec.ty, &self.ctx) {
            Ok(scalar) => Bound::ok(Value::Scalar(scalar)),
            Err(failed) => {
                self.report(
                    path,
                    DiagnosticKind::CoercionFailed {
                        raw: failed.raw,
                        target: failed.target,
                    },
                );
                self.fallback(field, path)
            }
        }
    }

    fn bind_anchored(
        &mut self,
        nodes: &[Node<'_>],
        field: &Field,
        schema: &'m ObjectSchema,
        path: &FieldPath,
        depth: usize,
    ) -> Result<Bound, SelectorError> {
        if nodes.is_empty() {
            return Ok(self.absent(field, path));
        }
        let anchor = self.choose(nodes, field.multiple, path);
        let inner = self.bind_object(anchor, schema, path, depth + 1)?;
        // The child's RequiredMissing is already recorded; only the failure moves up.
        if inner.fatal {
            if let Some(default) = &field.default {
                return Ok(Bound::ok(default.clone()));
            }
        }
        Ok(Bound {
            value: inner.value,
            fatal: inner.fatal && field.required,
        })
    }

    fn bind_list(
        &mut self,
        nodes: &[Node<'_>],
        field: &Field,
        element: &'m Kind,
        path: &FieldPath,
        depth: usize,
    ) -> Result<Bound, SelectorError> {
        if nodes.is_empty() && field.required {
            self.report(path, DiagnosticKind::RequiredMissing);
            return Ok(Bound::fatal());
        }

        let mut items = Vec::with_capacity(nodes.len());
        for (i, node) in nodes.iter().enumerate() {
            items.push(self.bind_element(*node, element, &path.index(i), depth)?);
        }
        Ok(Bound::ok(Value::List(items)))
    }

    /// One list element, scoped to its matched node. A failed element is
    /// `Missing` in place and never fails the list.
    fn bind_element(
        &mut self,
        node: Node<'_>,
        element: &'m Kind,
        path: &FieldPath,
        depth: usize,
    ) -> Result<Value, SelectorError> {
        match element {
            Kind::Scalar(spec) => {
                let Some(raw) = read(node, &spec.source) else {
                    self.report(path, DiagnosticKind::Unmatched);
                    return Ok(Value::Missing);
                };
                match coerce(&raw, spec.ty, &self.ctx) {
                    Ok(scalar) => Ok(Value::Scalar(scalar)),
                    Err(failed) => {
                        self.report(
                            path,
                            DiagnosticKind::CoercionFailed {
                                raw: failed.raw,
                                target: failed.target,
                            },
                        );
                        Ok(Value::Missing)
                    }
                }
            }
            Kind::Object(schema) => Ok(self.bind_object(node, schema, path, depth + 1)?.value),
            Kind::Ref(name) => {
                let schema = self.definition(name);
                Ok(self.bind_object(node, schema, path, depth + 1)?.value)
            }
            Kind::List(_) => unreachable!("nested lists are rejected when the mapping is built"),
        }
    }

    /// Pick one node, noting ambiguity. `All` falls back to the first match.
    fn choose<'d>(&mut self, nodes: &[Node<'d>], policy: MultiMatch, path: &FieldPath) -> Node<'d> {
        if nodes.len() > 1 {
            self.report(
                path,
                DiagnosticKind::MultipleMatches { count: nodes.len() },
            );
        }
        match policy {
            MultiMatch::Last => nodes[nodes.len() - 1],
            MultiMatch::First | MultiMatch::All => nodes[0],
        }
    }

    /// Nothing resolved for `field`.
    fn absent(&mut self, field: &Field, path: &FieldPath) -> Bound {
        if field.required && field.default.is_none() {
            self.report(path, DiagnosticKind::RequiredMissing);
            return Bound::fatal();
        }
        self.report(path, DiagnosticKind::Unmatched);
        Bound::ok(field.default.clone().unwrap_or(Value::Missing))
    }

    /// Something matched but could not be coerced.
    fn fallback(&mut self, field: &Field, path: &FieldPath) -> Bound {
        if let Some(default) = &field.default {
            return Bound::ok(default.clone());
        }
        if field.required {
            self.report(path, DiagnosticKind::RequiredMissing);
            return Bound::fatal();
        }
        Bound::ok(Value::Missing)
    }
}

fn read(node: Node<'_>, source: &Source) -> Option<String> {
    match source {
        Source::Text => Some(query::text_of(node)),
        Source::Attr(name) => query::attr_of(node, name),
        Source::RawText => Some(query::raw_text_of(node)),
        Source::InnerHtml => Some(query::inner_html_of(node)),
    }
}
