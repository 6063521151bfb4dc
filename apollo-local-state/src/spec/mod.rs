//! Query document helpers: fragments, directives, traversal and the `@client` split.

#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::panic))]

mod fragments;
pub(crate) mod local_selections;
mod selection;
pub(crate) mod transform;
pub(crate) mod traverse;

use apollo_compiler::Node;
use apollo_compiler::ast;
use displaydoc::Display;
pub use fragments::Fragments;
pub(crate) use selection::*;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::graphql::ErrorExtension;

/// Directive marking a field as resolved on the client.
pub(crate) const CLIENT_DIRECTIVE_NAME: &str = "client";
pub(crate) const TYPENAME: &str = "__typename";

/// GraphQL document errors.
#[derive(Error, Debug, Display, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum SpecError {
    /// parsing error: {0}
    ParsingError(String),
    /// Unknown operation named "{0}"
    UnknownOperation(String),
    /// operation name required: the document contains {0} operations
    OperationNameRequired(usize),
    /// No fragment named "{0}"
    UnknownFragment(String),
}

impl ErrorExtension for SpecError {
    fn extension_code(&self) -> String {
        match self {
            SpecError::ParsingError(_) => "PARSING_ERROR",
            SpecError::UnknownOperation(_) => "GRAPHQL_UNKNOWN_OPERATION_NAME",
            SpecError::OperationNameRequired(_) => "GRAPHQL_UNKNOWN_OPERATION_NAME",
            SpecError::UnknownFragment(_) => "UNKNOWN_FRAGMENT",
        }
        .to_string()
    }
}

/// Parses a query document. No schema is needed, documents are not validated.
pub fn parse_query(query: &str) -> Result<ast::Document, SpecError> {
    ast::Document::parse(query, "query.graphql")
        .map_err(|with_errors| SpecError::ParsingError(with_errors.errors.to_string()))
}

/// Finds the operation to execute.
///
/// Without a name the document must contain exactly one operation.
pub(crate) fn get_operation<'doc>(
    document: &'doc ast::Document,
    operation_name: Option<&str>,
) -> Result<&'doc Node<ast::OperationDefinition>, SpecError> {
    let mut operations = document.definitions.iter().filter_map(|def| match def {
        ast::Definition::OperationDefinition(op) => Some(op),
        _ => None,
    });
    match operation_name {
        Some(name) => operations
            .find(|op| op.name.as_ref().is_some_and(|n| n.as_str() == name))
            .ok_or_else(|| SpecError::UnknownOperation(name.to_string())),
        None => {
            let all: Vec<_> = operations.collect();
            match all.as_slice() {
                [single] => Ok(*single),
                [] => Err(SpecError::UnknownOperation(String::new())),
                many => Err(SpecError::OperationNameRequired(many.len())),
            }
        }
    }
}

/// The implicit root type name of an operation kind.
pub(crate) fn root_typename(operation_type: ast::OperationType) -> &'static str {
    match operation_type {
        ast::OperationType::Query => "Query",
        ast::OperationType::Mutation => "Mutation",
        ast::OperationType::Subscription => "Subscription",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_operation() {
        let document = parse_query(
            "query A { a } mutation B { b } fragment F on Query { a }",
        )
        .unwrap();
        let a = get_operation(&document, Some("A")).unwrap();
        assert_eq!(a.operation_type, ast::OperationType::Query);
        let b = get_operation(&document, Some("B")).unwrap();
        assert_eq!(root_typename(b.operation_type), "Mutation");
        assert_eq!(
            get_operation(&document, Some("C")).unwrap_err(),
            SpecError::UnknownOperation("C".to_string())
        );
        assert_eq!(
            get_operation(&document, None).unwrap_err(),
            SpecError::OperationNameRequired(2)
        );

        let anonymous = parse_query("{ a }").unwrap();
        assert!(get_operation(&anonymous, None).unwrap().name.is_none());
    }

    #[test]
    fn test_parse_error() {
        assert!(matches!(
            parse_query("{ a "),
            Err(SpecError::ParsingError(_))
        ));
    }
}
