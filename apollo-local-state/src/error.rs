//! Local state errors.
use displaydoc::Display;
use serde::Deserialize;
use serde::Serialize;
use serde_json_bytes::Value;
use thiserror::Error;

pub(crate) use crate::graphql::Error;
use crate::graphql::ErrorExtension;
use crate::graphql::Location as ErrorLocation;
use crate::json_ext::Path;
pub use crate::spec::SpecError;

/// Value of `extensions.source` on every error produced by local resolution.
pub const LOCAL_ERROR_SOURCE: &str = "local_state";

/// Errors preventing a request from being handled at all.
///
/// These are returned as the `Err` side of the service call, before anything is forwarded.
#[derive(Error, Display, Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[non_exhaustive]
pub enum LocalStateError {
    /// the query requires data from a server, but no forward link is configured
    MissingForwardLink,

    /// {0}
    Spec(#[from] SpecError),
}

impl ErrorExtension for LocalStateError {
    fn extension_code(&self) -> String {
        match self {
            LocalStateError::MissingForwardLink => "MISSING_FORWARD_LINK".to_string(),
            LocalStateError::Spec(spec) => spec.extension_code(),
        }
    }
}

impl LocalStateError {
    /// Convert the error to a GraphQL error.
    pub fn to_graphql_error(&self) -> Error {
        Error::builder()
            .message(self.to_string())
            .extension_code(self.extension_code())
            .extension("source", LOCAL_ERROR_SOURCE)
            .build()
    }
}

/// Field scoped errors of local resolution.
///
/// The field resolves to `null` and the error is reported in the response, next to the errors
/// of the forward link.
#[derive(Error, Display, Debug, Clone, Serialize, Eq, PartialEq)]
#[serde(untagged)]
#[non_exhaustive]
pub(crate) enum ResolutionError {
    /// resolver {resolver} failed: {message}
    ResolverFailed {
        /// Qualified name of the resolver, `Type.field`.
        resolver: String,
        /// The error returned by the resolver.
        message: String,
    },

    /// resolver {resolver} returned an object without __typename, which is required to resolve its selection set
    MissingTypename { resolver: String },

    /// could not determine the type of the parent of local field {field}
    UnknownTypename { field: String },

    /// fragment {fragment} on {type_condition} cannot be spread on a value of type {typename}
    FragmentTypeMismatch {
        fragment: String,
        type_condition: String,
        typename: String,
    },

    /// local field {field} cannot be merged into a null root
    NullRoot { field: String },
}

impl ErrorExtension for ResolutionError {
    fn extension_code(&self) -> String {
        match self {
            ResolutionError::ResolverFailed { .. } => "LOCAL_RESOLVER_FAILED",
            ResolutionError::MissingTypename { .. } => "LOCAL_MISSING_TYPENAME",
            ResolutionError::UnknownTypename { .. } => "LOCAL_UNKNOWN_TYPENAME",
            ResolutionError::FragmentTypeMismatch { .. } => "LOCAL_FRAGMENT_TYPE_MISMATCH",
            ResolutionError::NullRoot { .. } => "LOCAL_NULL_ROOT",
        }
        .to_string()
    }
}

impl ResolutionError {
    /// Convert the resolution error to a GraphQL error located at `path`.
    pub(crate) fn to_graphql_error(&self, path: Path, locations: Vec<ErrorLocation>) -> Error {
        let mut value: Value = serde_json_bytes::to_value(self).unwrap_or_default();
        if let Some(extensions) = value.as_object_mut() {
            extensions
                .entry("code")
                .or_insert_with(|| self.extension_code().into());
            extensions.insert("source", LOCAL_ERROR_SOURCE.into());
            // the message already carries it
            extensions.remove("message");
        }

        Error::builder()
            .message(self.to_string())
            .locations(locations)
            .path(path)
            .extensions(match value {
                Value::Object(extensions) => extensions,
                _ => Default::default(),
            })
            .build()
    }
}

#[cfg(test)]
mod tests {
    use serde_json_bytes::json;

    use super::*;

    #[test]
    fn test_resolution_error_extensions() {
        let error = ResolutionError::ResolverFailed {
            resolver: "Item.cost".to_string(),
            message: "no price".to_string(),
        }
        .to_graphql_error(
            Path::from("items/2/cost"),
            vec![ErrorLocation { line: 1, column: 9 }],
        );

        assert_eq!(error.message, "resolver Item.cost failed: no price");
        assert_eq!(
            serde_json_bytes::to_value(&error).unwrap(),
            json!({
                "message": "resolver Item.cost failed: no price",
                "locations": [{ "line": 1, "column": 9 }],
                "path": ["items", 2, "cost"],
                "extensions": {
                    "resolver": "Item.cost",
                    "code": "LOCAL_RESOLVER_FAILED",
                    "source": "local_state",
                },
            })
        );
    }

    #[test]
    fn test_local_state_error_code() {
        let error = LocalStateError::from(SpecError::UnknownFragment("F".to_string()));
        assert_eq!(error.to_string(), "No fragment named \"F\"");
        let error = error.to_graphql_error();
        assert_eq!(error.extension_code().as_deref(), Some("UNKNOWN_FRAGMENT"));
        assert_eq!(
            LocalStateError::MissingForwardLink
                .to_graphql_error()
                .extension_code()
                .as_deref(),
            Some("MISSING_FORWARD_LINK")
        );
    }
}
