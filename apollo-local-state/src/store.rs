//! The normalized cache that resolvers read from and write to.

use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use apollo_compiler::ast;
use dashmap::DashMap;
use serde_json_bytes::json;

use crate::json_ext::Object;
use crate::json_ext::Value;
use crate::json_ext::ValueExt;
use crate::spec::TYPENAME;

/// Cache collaborator of the local state handler.
///
/// Only resolvers read and write fragments. The handler itself only asks for type condition
/// matching.
pub trait Store: Send + Sync + 'static {
    /// The cache identifier of an object, if it can be identified.
    fn identify(&self, object: &Object) -> Option<String>;

    /// Reads the first fragment of `fragment` from the object identified by `id`.
    fn read_fragment(&self, id: &str, fragment: &ast::Document) -> Option<Value>;

    /// Writes `data` through the first fragment of `fragment` to the object identified by `id`.
    ///
    /// Returns a reference to the written object.
    fn write_fragment(&self, id: &str, fragment: &ast::Document, data: Value) -> Option<Value>;

    /// Whether a value of type `typename` matches the type condition `type_condition`.
    ///
    /// `None` when the store cannot tell abstract types apart.
    fn fragment_matches(&self, _type_condition: &str, _typename: &str) -> Option<bool> {
        None
    }
}

static FRAGMENT_MATCHER_WARNING_EMITTED: AtomicBool = AtomicBool::new(false);

/// Re-arms the warning logged when type conditions fall back to strict type name equality.
pub fn reset_fragment_matcher_warning() {
    FRAGMENT_MATCHER_WARNING_EMITTED.store(false, Ordering::Relaxed);
}

/// Whether a value of type `typename` matches `type_condition`.
pub(crate) fn fragment_matches(store: Option<&dyn Store>, type_condition: &str, typename: &str) -> bool {
    if type_condition == typename {
        return true;
    }
    match store.and_then(|store| store.fragment_matches(type_condition, typename)) {
        Some(matches) => matches,
        None => {
            if !FRAGMENT_MATCHER_WARNING_EMITTED.swap(true, Ordering::Relaxed) {
                tracing::warn!(
                    type_condition,
                    typename,
                    "the configured store cannot match fragments on abstract types, falling back to type name equality"
                );
            }
            false
        }
    }
}

/// A [`Store`] keeping normalized objects in memory.
///
/// Objects are identified by `__typename` and `id`. Abstract types are matched through the
/// possible types given at construction.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    objects: DashMap<String, Object>,
    possible_types: HashMap<String, HashSet<String>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares the concrete types of an interface or union.
    pub fn with_possible_types(
        mut self,
        supertype: impl Into<String>,
        subtypes: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.possible_types
            .entry(supertype.into())
            .or_default()
            .extend(subtypes.into_iter().map(Into::into));
        self
    }
}

fn first_fragment(document: &ast::Document) -> Option<&ast::FragmentDefinition> {
    document.definitions.iter().find_map(|definition| match definition {
        ast::Definition::FragmentDefinition(fragment) => Some(&**fragment),
        _ => None,
    })
}

fn select(value: &Value, set: &[ast::Selection]) -> Option<Value> {
    match value {
        Value::Array(items) => items
            .iter()
            .map(|item| select(item, set))
            .collect::<Option<Vec<_>>>()
            .map(Value::Array),
        Value::Object(object) => {
            let mut selected = Object::new();
            for selection in set {
                match selection {
                    ast::Selection::Field(field) => {
                        let value = object.get(field.name.as_str())?;
                        let value = if field.selection_set.is_empty() {
                            value.clone()
                        } else {
                            select(value, &field.selection_set)?
                        };
                        selected.insert(field.name.as_str(), value);
                    }
                    ast::Selection::InlineFragment(inline) => {
                        if let Value::Object(nested) = select(value, &inline.selection_set)? {
                            for (key, value) in nested {
                                selected.insert(key, value);
                            }
                        }
                    }
                    // named fragments are not expanded when reading
                    ast::Selection::FragmentSpread(_) => {}
                }
            }
            Some(Value::Object(selected))
        }
        other => Some(other.clone()),
    }
}

impl Store for InMemoryStore {
    fn identify(&self, object: &Object) -> Option<String> {
        let typename = object.get(TYPENAME)?.as_str()?;
        let id = match object.get("id")? {
            Value::String(id) => id.as_str().to_string(),
            Value::Number(id) => id.to_string(),
            _ => return None,
        };
        Some(format!("{typename}:{id}"))
    }

    fn read_fragment(&self, id: &str, fragment: &ast::Document) -> Option<Value> {
        let fragment = first_fragment(fragment)?;
        let object = Value::Object(self.objects.get(id)?.value().clone());
        select(&object, &fragment.selection_set)
    }

    fn write_fragment(&self, id: &str, fragment: &ast::Document, data: Value) -> Option<Value> {
        let fragment = first_fragment(fragment)?;
        let Value::Object(mut selected) = select(&data, &fragment.selection_set)? else {
            return None;
        };
        if let Some((typename, _)) = id.split_once(':') {
            selected
                .entry(TYPENAME)
                .or_insert_with(|| typename.into());
        }
        let mut entry = self.objects.entry(id.to_string()).or_default();
        let mut merged = Value::Object(std::mem::take(entry.value_mut()));
        merged.deep_merge(Value::Object(selected));
        if let Value::Object(merged) = merged {
            *entry.value_mut() = merged;
        }
        Some(json!({ "__ref": id }))
    }

    fn fragment_matches(&self, type_condition: &str, typename: &str) -> Option<bool> {
        Some(
            type_condition == typename
                || self
                    .possible_types
                    .get(type_condition)
                    .is_some_and(|subtypes| subtypes.contains(typename)),
        )
    }
}

#[cfg(test)]
mod tests {
    use tracing_test::traced_test;

    use super::*;
    use crate::spec::parse_query;

    #[test]
    fn test_identify() {
        let store = InMemoryStore::new();
        let object = json!({ "__typename": "Cart", "id": 3 });
        assert_eq!(
            store.identify(object.as_object().unwrap()).as_deref(),
            Some("Cart:3")
        );
        let object = json!({ "id": "3" });
        assert_eq!(store.identify(object.as_object().unwrap()), None);
    }

    #[test]
    fn test_write_then_read_fragment() {
        let store = InMemoryStore::new();
        let totals = parse_query("fragment Totals on Cart { total currency }").unwrap();
        let count = parse_query("fragment Count on Cart { items { id } }").unwrap();

        assert_eq!(
            store.write_fragment(
                "Cart:1",
                &totals,
                json!({ "total": 12, "currency": "EUR", "ignored": true })
            ),
            Some(json!({ "__ref": "Cart:1" }))
        );
        store.write_fragment("Cart:1", &count, json!({ "items": [{ "id": "a" }] }));

        assert_eq!(
            store.read_fragment("Cart:1", &totals),
            Some(json!({ "total": 12, "currency": "EUR" }))
        );
        assert_eq!(
            store.read_fragment("Cart:1", &count),
            Some(json!({ "items": [{ "id": "a" }] }))
        );
        let typename = parse_query("fragment T on Cart { __typename }").unwrap();
        assert_eq!(
            store.read_fragment("Cart:1", &typename),
            Some(json!({ "__typename": "Cart" }))
        );
        assert_eq!(store.read_fragment("Cart:2", &totals), None);
        let missing = parse_query("fragment M on Cart { discount }").unwrap();
        assert_eq!(store.read_fragment("Cart:1", &missing), None);
    }

    #[test]
    fn test_possible_types() {
        let store = InMemoryStore::new().with_possible_types("Pet", ["Dog", "Cat"]);
        assert_eq!(store.fragment_matches("Pet", "Dog"), Some(true));
        assert_eq!(store.fragment_matches("Dog", "Cat"), Some(false));
        assert!(fragment_matches(Some(&store as &dyn Store), "Pet", "Cat"));
    }

    #[test]
    #[traced_test]
    fn test_fallback_warns_once() {
        reset_fragment_matcher_warning();
        assert!(fragment_matches(None, "Dog", "Dog"));
        assert!(!logs_contain("cannot match fragments"));
        assert!(!fragment_matches(None, "Pet", "Dog"));
        assert!(logs_contain("cannot match fragments on abstract types"));
        reset_fragment_matcher_warning();
    }
}
