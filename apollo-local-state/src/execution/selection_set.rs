use apollo_compiler::ast;
use futures::future::BoxFuture;
use futures::future::join_all;

use super::ExecutionContext;
use super::Level;
use super::field::resolve_field;
use crate::error::ResolutionError;
use crate::json_ext::Object;
use crate::json_ext::Path;
use crate::json_ext::Value;
use crate::json_ext::ValueExt;
use crate::json_ext::merge_objects;
use crate::spec::IncludeSkip;
use crate::spec::directives;
use crate::spec::has_client_directive;
use crate::spec::response_key;
use crate::store;

/// Stands for the type of a value without `__typename` in error messages.
const UNKNOWN_TYPENAME: &str = "<unknown>";

/// Resolves the selections of `set` requiring local resolution.
///
/// Selections run concurrently. Their contributions are deep merged in selection order.
pub(super) fn resolve_selection_set<'a>(
    ctx: &'a ExecutionContext,
    set: &'a [ast::Selection],
    level: Level<'a>,
) -> BoxFuture<'a, Object> {
    Box::pin(async move {
        let selections = set
            .iter()
            .filter(|selection| level.client_descendant || ctx.local_selections.contains(selection))
            .filter(|selection| !IncludeSkip::parse(directives(selection)).should_skip(&ctx.variables))
            .map(|selection| resolve_selection(ctx, selection, level));
        merge_objects(join_all(selections).await)
    })
}

/// Resolves the selection set of a nested object.
pub(super) fn resolve_nested<'a>(
    ctx: &'a ExecutionContext,
    set: &'a [ast::Selection],
    data: &'a Value,
    path: &'a Path,
    client_descendant: bool,
) -> BoxFuture<'a, Object> {
    Box::pin(async move {
        let dealiased = ctx.dealias(data, set);
        let level = Level {
            data,
            parent: dealiased.as_ref().unwrap_or(data),
            path,
            root: false,
            client_descendant,
        };
        resolve_selection_set(ctx, set, level).await
    })
}

fn resolve_selection<'a>(
    ctx: &'a ExecutionContext,
    selection: &'a ast::Selection,
    level: Level<'a>,
) -> BoxFuture<'a, Object> {
    Box::pin(async move {
        match selection {
            ast::Selection::Field(field) => {
                let key = response_key(field);
                let path = level.path.with_key(key.as_str());
                let mut object = Object::new();
                if let Some(value) = resolve_field(ctx, field, level, &path).await {
                    // nothing can be written under a null root
                    if !(level.root && level.data.is_null()) {
                        object.insert(key.as_str(), value);
                    }
                }
                object
            }
            ast::Selection::InlineFragment(inline) => {
                let matches = match &inline.type_condition {
                    None => true,
                    Some(type_condition) => typename(ctx, level).is_some_and(|typename| {
                        store::fragment_matches(
                            ctx.resolver_context.store(),
                            type_condition.as_str(),
                            typename,
                        )
                    }),
                };
                if matches {
                    let level = Level {
                        client_descendant: level.client_descendant
                            || has_client_directive(&inline.directives),
                        ..level
                    };
                    resolve_selection_set(ctx, &inline.selection_set, level).await
                } else {
                    Object::new()
                }
            }
            ast::Selection::FragmentSpread(spread) => {
                let Some(fragment) = ctx.split.fragments.get(spread.fragment_name.as_str()) else {
                    return Object::new();
                };
                let type_condition = fragment.type_condition.as_str();
                let typename = typename(ctx, level);
                if typename.is_some_and(|typename| {
                    store::fragment_matches(ctx.resolver_context.store(), type_condition, typename)
                }) {
                    let level = Level {
                        client_descendant: level.client_descendant
                            || has_client_directive(&spread.directives),
                        ..level
                    };
                    resolve_selection_set(ctx, &fragment.selection_set, level).await
                } else {
                    ctx.record(
                        ResolutionError::FragmentTypeMismatch {
                            fragment: fragment.name.to_string(),
                            type_condition: type_condition.to_string(),
                            typename: typename.unwrap_or(UNKNOWN_TYPENAME).to_string(),
                        },
                        level.path,
                        spread,
                    );
                    Object::new()
                }
            }
        }
    })
}

/// The runtime type name of the value a selection set is resolved against.
pub(super) fn typename<'a>(ctx: &'a ExecutionContext, level: Level<'a>) -> Option<&'a str> {
    if level.root {
        Some(ctx.root_typename())
    } else {
        level.data.typename()
    }
}
