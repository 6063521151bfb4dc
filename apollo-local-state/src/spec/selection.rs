use apollo_compiler::Name;
use apollo_compiler::Node;
use apollo_compiler::ast;

use crate::json_ext::Object;
use crate::spec::CLIENT_DIRECTIVE_NAME;
use crate::spec::TYPENAME;

/// Identity of a node of a parsed document.
///
/// Nodes are reference counted, so the address of their payload is stable for as long as the
/// document is alive, and distinct for structurally equal nodes of different parses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct NodeId(usize);

impl NodeId {
    pub(crate) fn of<T>(node: &Node<T>) -> Self {
        NodeId(&**node as *const T as usize)
    }

    pub(crate) fn of_selection(selection: &ast::Selection) -> Self {
        match selection {
            ast::Selection::Field(field) => NodeId::of(field),
            ast::Selection::FragmentSpread(spread) => NodeId::of(spread),
            ast::Selection::InlineFragment(inline) => NodeId::of(inline),
        }
    }
}

pub(crate) fn directives(selection: &ast::Selection) -> &ast::DirectiveList {
    match selection {
        ast::Selection::Field(field) => &field.directives,
        ast::Selection::FragmentSpread(spread) => &spread.directives,
        ast::Selection::InlineFragment(inline) => &inline.directives,
    }
}

pub(crate) fn has_client_directive(directives: &ast::DirectiveList) -> bool {
    directives
        .0
        .iter()
        .any(|directive| directive.name.as_str() == CLIENT_DIRECTIVE_NAME)
}

/// The key of a field in the response: its alias if any, else its name.
pub(crate) fn response_key(field: &ast::Field) -> &Name {
    field.alias.as_ref().unwrap_or(&field.name)
}

pub(crate) fn is_typename_field(selection: &ast::Selection) -> bool {
    matches!(
        selection,
        ast::Selection::Field(field) if field.alias.is_none() && field.name.as_str() == TYPENAME
    )
}

/// `@include` and `@skip` conditions of a selection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct IncludeSkip {
    include: Condition,
    skip: Condition,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum Condition {
    Yes,
    No,
    Variable(String),
}

impl IncludeSkip {
    pub(crate) fn parse(directives: &ast::DirectiveList) -> Self {
        let mut include = None;
        let mut skip = None;
        for directive in &directives.0 {
            if include.is_none() && directive.name.as_str() == "include" {
                include = Condition::parse(directive)
            }
            if skip.is_none() && directive.name.as_str() == "skip" {
                skip = Condition::parse(directive)
            }
        }
        Self {
            include: include.unwrap_or(Condition::Yes),
            skip: skip.unwrap_or(Condition::No),
        }
    }

    pub(crate) fn should_skip(&self, variables: &Object) -> bool {
        // a missing or non boolean variable leaves the selection in
        self.skip.eval(variables).unwrap_or(false) || !self.include.eval(variables).unwrap_or(true)
    }
}

impl Condition {
    pub(crate) fn parse(directive: &ast::Directive) -> Option<Self> {
        let argument = directive
            .arguments
            .iter()
            .find(|argument| argument.name.as_str() == "if")?;
        match &*argument.value {
            ast::Value::Boolean(true) => Some(Condition::Yes),
            ast::Value::Boolean(false) => Some(Condition::No),
            ast::Value::Variable(variable) => {
                Some(Condition::Variable(variable.as_str().to_owned()))
            }
            _ => None,
        }
    }

    pub(crate) fn eval(&self, variables: &Object) -> Option<bool> {
        match self {
            Condition::Yes => Some(true),
            Condition::No => Some(false),
            Condition::Variable(variable_name) => variables
                .get(variable_name.as_str())
                .and_then(|v| v.as_bool()),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json_bytes::json;

    use super::*;
    use crate::spec::parse_query;

    fn first_selection(query: &str) -> ast::Selection {
        let document = parse_query(query).unwrap();
        match &document.definitions[0] {
            ast::Definition::OperationDefinition(op) => op.selection_set[0].clone(),
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_include_skip() {
        let variables = json!({ "yes": true, "no": false });
        let variables = variables.as_object().unwrap();
        let cases = [
            ("{ a }", false),
            ("{ a @skip(if: true) }", true),
            ("{ a @include(if: false) }", true),
            ("{ a @include(if: $yes) }", false),
            ("{ a @include(if: $no) }", true),
            ("{ a @skip(if: $no) @include(if: $yes) }", false),
            ("{ a @skip(if: $missing) }", false),
        ];
        for (query, skipped) in cases {
            let selection = first_selection(query);
            assert_eq!(
                IncludeSkip::parse(directives(&selection)).should_skip(variables),
                skipped,
                "{query}"
            );
        }
    }

    #[test]
    fn test_field_helpers() {
        let selection = first_selection("{ total: cartTotal @client }");
        let ast::Selection::Field(field) = &selection else {
            panic!("expected a field");
        };
        assert_eq!(response_key(field).as_str(), "total");
        assert!(has_client_directive(&field.directives));
        assert!(!is_typename_field(&selection));
        assert!(is_typename_field(&first_selection("{ __typename }")));
        assert!(!is_typename_field(&first_selection("{ kind: __typename }")));
    }

    #[test]
    fn test_node_id_is_per_parse() {
        let a = first_selection("{ a }");
        let b = first_selection("{ a }");
        assert_eq!(NodeId::of_selection(&a), NodeId::of_selection(&a.clone()));
        assert_ne!(NodeId::of_selection(&a), NodeId::of_selection(&b));
    }
}
