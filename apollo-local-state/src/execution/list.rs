use apollo_compiler::Node;
use apollo_compiler::ast;
use futures::future::BoxFuture;
use futures::future::join_all;

use super::ExecutionContext;
use super::selection_set::resolve_nested;
use crate::error::ResolutionError;
use crate::json_ext::Path;
use crate::json_ext::Value;
use crate::json_ext::ValueExt;

/// Resolves the selection set of `field` on each item of a list, concurrently.
///
/// `resolver` names the resolver the list comes from, when it is local. Local objects must
/// carry `__typename`.
pub(super) fn resolve_list<'a>(
    ctx: &'a ExecutionContext,
    field: &'a Node<ast::Field>,
    set: &'a [ast::Selection],
    value: &'a Value,
    path: &'a Path,
    client_descendant: bool,
    resolver: Option<&'a str>,
) -> BoxFuture<'a, Value> {
    Box::pin(async move {
        let Value::Array(items) = value else {
            return value.clone();
        };
        let items = items.iter().enumerate().map(|(index, item)| async move {
            let path = path.with_index(index);
            match item {
                Value::Null => Value::Null,
                Value::Array(_) => {
                    resolve_list(ctx, field, set, item, &path, client_descendant, resolver).await
                }
                Value::Object(_) => {
                    if client_descendant && item.typename().is_none() {
                        ctx.record(
                            ResolutionError::MissingTypename {
                                resolver: resolver.unwrap_or(field.name.as_str()).to_string(),
                            },
                            &path,
                            field,
                        );
                        return Value::Null;
                    }
                    Value::Object(resolve_nested(ctx, set, item, &path, client_descendant).await)
                }
                scalar => scalar.clone(),
            }
        });
        Value::Array(join_all(items).await)
    })
}
