//! Resolution of the local fields of an operation.
//!
//! The operation's selection set is walked against the current data: the server response, or
//! an empty object when nothing is forwarded. Only the selections requiring local resolution
//! are walked. The result is an object holding what local resolution contributes, to be merged
//! into the current data.

#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]

mod field;
mod list;
mod selection_set;

use std::sync::Arc;

use apollo_compiler::Node;
use apollo_compiler::ast;
use parking_lot::Mutex;

use crate::configuration::Warnings;
use crate::error::ResolutionError;
use crate::graphql;
use crate::graphql::Location;
use crate::json_ext::Object;
use crate::json_ext::Path;
use crate::json_ext::Value;
use crate::json_ext::ValueExt;
use crate::resolvers::ResolverContext;
use crate::resolvers::ResolverMap;
use crate::spec::local_selections::LocalSelections;
use crate::spec::root_typename;
use crate::spec::transform::QuerySplit;

/// Per request state of local resolution.
pub(crate) struct ExecutionContext {
    pub(crate) document: Arc<ast::Document>,
    pub(crate) operation: Node<ast::OperationDefinition>,
    pub(crate) split: Arc<QuerySplit>,
    pub(crate) local_selections: Arc<LocalSelections>,
    /// Request variables over the default values of the operation.
    pub(crate) variables: Object,
    pub(crate) resolvers: Arc<ResolverMap>,
    pub(crate) root_value: Value,
    pub(crate) resolver_context: ResolverContext,
    pub(crate) warnings: Warnings,
    errors: Mutex<Vec<graphql::Error>>,
}

/// Position of a selection set in the data.
#[derive(Clone, Copy)]
pub(crate) struct Level<'a> {
    /// The value the selection set is resolved against.
    pub(crate) data: &'a Value,
    /// `data` with aliased keys renamed back to their field names.
    pub(crate) parent: &'a Value,
    pub(crate) path: &'a Path,
    /// Whether this is the selection set of the operation.
    pub(crate) root: bool,
    /// Whether an enclosing field was resolved locally.
    pub(crate) client_descendant: bool,
}

impl ExecutionContext {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        document: Arc<ast::Document>,
        operation: Node<ast::OperationDefinition>,
        split: Arc<QuerySplit>,
        local_selections: Arc<LocalSelections>,
        variables: &Object,
        resolvers: Arc<ResolverMap>,
        root_value: Value,
        resolver_context: ResolverContext,
        warnings: Warnings,
    ) -> Self {
        let variables = variables_with_defaults(&operation, variables);
        Self {
            document,
            operation,
            split,
            local_selections,
            variables,
            resolvers,
            root_value,
            resolver_context,
            warnings,
            errors: Default::default(),
        }
    }

    /// Resolves the operation against `data`.
    ///
    /// Returns the local contribution and the errors it produced.
    pub(crate) async fn execute(&self, data: &Value) -> (Object, Vec<graphql::Error>) {
        let path = Path::empty();
        let level = Level {
            data,
            parent: data,
            path: &path,
            root: true,
            client_descendant: false,
        };
        let result = selection_set::resolve_selection_set(self, &self.operation.selection_set, level)
            .await;
        (result, std::mem::take(&mut *self.errors.lock()))
    }

    /// The type name of the root fields.
    pub(crate) fn root_typename(&self) -> &str {
        self.root_value
            .typename()
            .unwrap_or_else(|| root_typename(self.operation.operation_type))
    }

    pub(crate) fn record<T>(&self, error: ResolutionError, path: &Path, node: &Node<T>) {
        let locations = node
            .line_column_range(&self.document.sources)
            .map(|range| {
                vec![Location {
                    line: range.start.line as u32,
                    column: range.start.column as u32,
                }]
            })
            .unwrap_or_default();
        tracing::debug!(%path, "local resolution error: {error}");
        self.errors
            .lock()
            .push(error.to_graphql_error(path.clone(), locations));
    }

    /// Renames the aliased keys of `value` back to their field names, for the fields of `set`.
    ///
    /// Only the first level is renamed. Returns `None` when `set` has no alias.
    pub(crate) fn dealias(&self, value: &Value, set: &[ast::Selection]) -> Option<Value> {
        let mut aliases = Vec::new();
        let mut visited = Vec::new();
        self.collect_aliases(set, &mut aliases, &mut visited);
        if aliases.is_empty() {
            return None;
        }
        let mut object = value.as_object()?.clone();
        for (alias, name) in aliases {
            if let Some(value) = object.remove(alias) {
                object.insert(name, value);
            }
        }
        Some(Value::Object(object))
    }

    fn collect_aliases<'a>(
        &'a self,
        set: &'a [ast::Selection],
        aliases: &mut Vec<(&'a str, &'a str)>,
        visited: &mut Vec<&'a str>,
    ) {
        for selection in set {
            match selection {
                ast::Selection::Field(field) => {
                    if let Some(alias) = &field.alias {
                        aliases.push((alias.as_str(), field.name.as_str()));
                    }
                }
                ast::Selection::InlineFragment(inline) => {
                    self.collect_aliases(&inline.selection_set, aliases, visited)
                }
                ast::Selection::FragmentSpread(spread) => {
                    let name = spread.fragment_name.as_str();
                    if visited.contains(&name) {
                        continue;
                    }
                    visited.push(name);
                    if let Some(fragment) = self.split.fragments.get(name) {
                        self.collect_aliases(&fragment.selection_set, aliases, visited)
                    }
                }
            }
        }
    }
}

/// Variables of the request over the default values declared by the operation.
pub(crate) fn variables_with_defaults(
    operation: &ast::OperationDefinition,
    variables: &Object,
) -> Object {
    let mut merged = Object::new();
    for definition in &operation.variables {
        if let Some(default_value) = &definition.default_value {
            merged.insert(
                definition.name.as_str(),
                value_to_json(default_value, &Object::new()),
            );
        }
    }
    for (name, value) in variables {
        merged.insert(name.clone(), value.clone());
    }
    merged
}

/// The arguments of a field.
///
/// An argument bound to a variable without value is left out.
pub(crate) fn arguments(field: &ast::Field, variables: &Object) -> Object {
    field
        .arguments
        .iter()
        .filter_map(|argument| {
            let value = match &*argument.value {
                ast::Value::Variable(name) => variables.get(name.as_str())?.clone(),
                value => value_to_json(value, variables),
            };
            Some((argument.name.as_str().into(), value))
        })
        .collect()
}

pub(crate) fn value_to_json(value: &ast::Value, variables: &Object) -> Value {
    match value {
        ast::Value::Null => Value::Null,
        ast::Value::Enum(name) => name.as_str().into(),
        ast::Value::Variable(name) => variables.get(name.as_str()).cloned().unwrap_or_default(),
        ast::Value::String(string) => string.as_str().into(),
        ast::Value::Float(float) => float
            .as_str()
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .unwrap_or_default(),
        ast::Value::Int(int) => match int.as_str().parse::<i64>() {
            Ok(int) => int.into(),
            Err(_) => int
                .as_str()
                .parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number)
                .unwrap_or_default(),
        },
        ast::Value::Boolean(boolean) => (*boolean).into(),
        ast::Value::List(items) => Value::Array(
            items
                .iter()
                .map(|item| value_to_json(item, variables))
                .collect(),
        ),
        ast::Value::Object(fields) => Value::Object(
            fields
                .iter()
                .map(|(name, value)| (name.as_str().into(), value_to_json(value, variables)))
                .collect(),
        ),
    }
}
