use std::any::Any;
use std::panic::AssertUnwindSafe;

use apollo_compiler::Node;
use apollo_compiler::ast;
use futures::FutureExt;
use futures::future::BoxFuture;

use super::ExecutionContext;
use super::Level;
use super::arguments;
use super::list::resolve_list;
use super::selection_set::resolve_nested;
use super::selection_set::typename;
use crate::error::ResolutionError;
use crate::json_ext::Path;
use crate::json_ext::Value;
use crate::json_ext::ValueExt;
use crate::resolvers::ResolveInfo;
use crate::spec::has_client_directive;
use crate::spec::response_key;

/// Resolves one field.
///
/// Returns `None` when the field contributes nothing, which differs from contributing `null`.
pub(super) fn resolve_field<'a>(
    ctx: &'a ExecutionContext,
    field: &'a Node<ast::Field>,
    level: Level<'a>,
    path: &'a Path,
) -> BoxFuture<'a, Option<Value>> {
    Box::pin(async move {
        if level.client_descendant || has_client_directive(&field.directives) {
            Some(resolve_local_field(ctx, field, level, path).await)
        } else {
            resolve_remote_field(ctx, field, level, path).await
        }
    })
}

/// A field of the server response enclosing local fields.
async fn resolve_remote_field(
    ctx: &ExecutionContext,
    field: &Node<ast::Field>,
    level: Level<'_>,
    path: &Path,
) -> Option<Value> {
    let object = level.data.as_object()?;
    let value = object
        .get(response_key(field).as_str())
        .or_else(|| object.get(field.name.as_str()))?;

    match value {
        Value::Null => Some(Value::Null),
        _ if field.selection_set.is_empty() => Some(value.clone()),
        Value::Array(_) => {
            Some(resolve_list(ctx, field, &field.selection_set, value, path, false, None).await)
        }
        Value::Object(_) => Some(Value::Object(
            resolve_nested(ctx, &field.selection_set, value, path, false).await,
        )),
        other => Some(other.clone()),
    }
}

async fn resolve_local_field(
    ctx: &ExecutionContext,
    field: &Node<ast::Field>,
    level: Level<'_>,
    path: &Path,
) -> Value {
    let Some(typename) = typename(ctx, level) else {
        ctx.record(
            ResolutionError::UnknownTypename {
                field: field.name.to_string(),
            },
            path,
            field,
        );
        return Value::Null;
    };
    let field_name = field.name.as_str();
    let qualified_name = format!("{typename}.{field_name}");

    let result = match ctx.resolvers.get(typename, field_name) {
        Some(resolver) => {
            let parent = if level.root {
                ctx.root_value.clone()
            } else {
                level.parent.clone()
            };
            let info = ResolveInfo::new(field.clone(), ctx.split.clone(), path.clone());
            // a panicking resolver fails its field only
            let resolved = AssertUnwindSafe(async {
                resolver
                    .resolve(
                        parent,
                        arguments(field, &ctx.variables),
                        ctx.resolver_context.clone(),
                        info,
                    )
                    .await
            })
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(panic_message(&*panic).into()));
            match resolved {
                Ok(Some(value)) => value,
                Ok(None) => {
                    if ctx.warnings.undefined_result {
                        tracing::warn!(
                            resolver = %qualified_name,
                            "the resolver returned no value, resolving the field to null"
                        );
                    }
                    Value::Null
                }
                Err(error) => {
                    ctx.record(
                        ResolutionError::ResolverFailed {
                            resolver: qualified_name,
                            message: error.to_string(),
                        },
                        path,
                        field,
                    );
                    return Value::Null;
                }
            }
        }
        // below a local field, the parent value carries its own properties
        None if level.client_descendant => level
            .parent
            .as_object()
            .and_then(|parent| parent.get(field_name))
            .cloned()
            .unwrap_or_default(),
        None => {
            if ctx.warnings.missing_resolver {
                tracing::warn!(
                    field = %qualified_name,
                    "no resolver is registered for the local field, resolving it to null"
                );
            }
            Value::Null
        }
    };

    if level.root && level.data.is_null() && !result.is_null() {
        ctx.record(
            ResolutionError::NullRoot {
                field: field_name.to_string(),
            },
            path,
            field,
        );
        return Value::Null;
    }

    match result {
        Value::Null => Value::Null,
        result if field.selection_set.is_empty() => result,
        result @ Value::Array(_) => {
            resolve_list(
                ctx,
                field,
                &field.selection_set,
                &result,
                path,
                true,
                Some(qualified_name.as_str()),
            )
            .await
        }
        value @ Value::Object(_) => {
            if value.typename().is_none() {
                ctx.record(
                    ResolutionError::MissingTypename {
                        resolver: qualified_name,
                    },
                    path,
                    field,
                );
                return Value::Null;
            }
            Value::Object(resolve_nested(ctx, &field.selection_set, &value, path, true).await)
        }
        scalar => scalar,
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<String>() {
        format!("panicked: {message}")
    } else if let Some(message) = panic.downcast_ref::<&str>() {
        format!("panicked: {message}")
    } else {
        "panicked".to_string()
    }
}
