//! Performance oriented JSON manipulation.

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use serde_json_bytes::ByteString;
use serde_json_bytes::Map;
pub use serde_json_bytes::Value;

/// A JSON object.
pub type Object = Map<ByteString, Value>;

/// Extension trait for [`serde_json_bytes::Value`].
pub trait ValueExt {
    /// Deep merge the JSON objects, array and override the values in `&mut self` if they already
    /// exists.
    #[track_caller]
    fn deep_merge(&mut self, other: Self);

    /// Returns the `__typename` of an object value, if any.
    fn typename(&self) -> Option<&str>;
}

impl ValueExt for Value {
    fn deep_merge(&mut self, other: Self) {
        match (self, other) {
            (Value::Object(a), Value::Object(b)) => {
                for (key, value) in b.into_iter() {
                    match a.get_mut(&key) {
                        Some(v) => v.deep_merge(value),
                        None => {
                            a.insert(key, value);
                        }
                    }
                }
            }
            (Value::Array(a), Value::Array(mut b)) => {
                for (b_value, a_value) in b.drain(..a.len().min(b.len())).zip(a.iter_mut()) {
                    a_value.deep_merge(b_value);
                }

                a.extend(b);
            }
            (a, b) => {
                *a = b;
            }
        }
    }

    fn typename(&self) -> Option<&str> {
        self.as_object()
            .and_then(|object| object.get(crate::spec::TYPENAME))
            .and_then(Value::as_str)
    }
}

/// Deep merge a list of objects, later entries winning on conflicting leaves.
pub(crate) fn merge_objects(objects: impl IntoIterator<Item = Object>) -> Object {
    let mut merged = Value::Object(Object::new());
    for object in objects {
        merged.deep_merge(Value::Object(object));
    }
    match merged {
        Value::Object(object) => object,
        _ => Object::new(),
    }
}

/// A GraphQL path element that is composed of strings or numbers.
/// e.g `/book/3/name`
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathElement {
    /// An index path element.
    Index(usize),

    /// A key path element.
    Key(String),
}

impl fmt::Display for PathElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathElement::Index(index) => write!(f, "{index}"),
            PathElement::Key(key) => f.write_str(key),
        }
    }
}

/// A path into the result document.
///
/// This can be composed of strings and numbers
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct Path(pub Vec<PathElement>);

impl Path {
    /// The empty path, pointing at the root of `data`.
    pub fn empty() -> Path {
        Path(Vec::new())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PathElement> {
        self.0.iter()
    }

    /// Returns a new path with `key` appended.
    pub fn with_key(&self, key: impl Into<String>) -> Path {
        let mut elements = self.0.clone();
        elements.push(PathElement::Key(key.into()));
        Path(elements)
    }

    /// Returns a new path with `index` appended.
    pub fn with_index(&self, index: usize) -> Path {
        let mut elements = self.0.clone();
        elements.push(PathElement::Index(index));
        Path(elements)
    }

    pub fn last(&self) -> Option<&PathElement> {
        self.0.last()
    }
}

impl<T> From<T> for Path
where
    T: AsRef<str>,
{
    fn from(s: T) -> Self {
        Self(
            s.as_ref()
                .split('/')
                .filter(|s| !s.is_empty())
                .map(|s| match s.parse::<usize>() {
                    Ok(index) => PathElement::Index(index),
                    Err(_) => PathElement::Key(s.to_string()),
                })
                .collect(),
        )
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for element in self.iter() {
            write!(f, "/{element}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json_bytes::json;

    use super::*;

    #[test]
    fn test_deep_merge_objects_and_arrays() {
        let mut value = json!({
            "cart": { "id": "1", "items": [{ "id": "a" }, { "id": "b" }] },
            "viewer": null,
        });
        value.deep_merge(json!({
            "cart": { "items": [{ "total": 2 }, { "total": 3 }, { "total": 4 }] },
            "viewer": { "name": "ada" },
        }));
        assert_eq!(
            value,
            json!({
                "cart": {
                    "id": "1",
                    "items": [
                        { "id": "a", "total": 2 },
                        { "id": "b", "total": 3 },
                        { "total": 4 },
                    ],
                },
                "viewer": { "name": "ada" },
            })
        );
    }

    #[test]
    fn test_deep_merge_later_null_wins() {
        let mut value = json!({ "cost": 12 });
        value.deep_merge(json!({ "cost": null }));
        assert_eq!(value, json!({ "cost": null }));
    }

    #[test]
    fn test_merge_objects_is_order_insensitive_for_disjoint_keys() {
        let a = json!({ "a": 1, "nested": { "x": 1 } });
        let b = json!({ "b": 2, "nested": { "y": 2 } });
        let ab = merge_objects([
            a.as_object().unwrap().clone(),
            b.as_object().unwrap().clone(),
        ]);
        let ba = merge_objects([
            b.as_object().unwrap().clone(),
            a.as_object().unwrap().clone(),
        ]);
        assert_eq!(Value::Object(ab.clone()), Value::Object(ba));
        assert_eq!(
            Value::Object(ab),
            json!({ "a": 1, "b": 2, "nested": { "x": 1, "y": 2 } })
        );
    }

    #[test]
    fn test_path_from_str_and_display() {
        let path = Path::from("items/2/cost");
        assert_eq!(
            path,
            Path(vec![
                PathElement::Key("items".to_string()),
                PathElement::Index(2),
                PathElement::Key("cost".to_string()),
            ])
        );
        assert_eq!(path.to_string(), "/items/2/cost");
        assert_eq!(
            serde_json_bytes::to_value(&path).unwrap(),
            json!(["items", 2, "cost"])
        );
    }

    #[test]
    fn test_typename() {
        assert_eq!(json!({ "__typename": "Cart" }).typename(), Some("Cart"));
        assert_eq!(json!({ "id": 1 }).typename(), None);
        assert_eq!(json!([1]).typename(), None);
    }
}
