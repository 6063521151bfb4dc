//! Schema-less traversal of executable definitions.
//!
//! Every visit receives the chain of selections enclosing the visited node. A selection is on
//! the chain while its own directives and its nested selection set are visited.

use apollo_compiler::Node;
use apollo_compiler::ast;

use crate::spec::NodeId;
use crate::spec::SpecError;

/// The selections enclosing the node being visited, outermost first.
#[derive(Debug, Default)]
pub(crate) struct Ancestors(Vec<NodeId>);

impl Ancestors {
    pub(crate) fn iter(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.0.iter().copied()
    }

    pub(crate) fn len(&self) -> usize {
        self.0.len()
    }
}

/// Traverse every operation and fragment definition of a document with the given visitor.
pub(crate) fn document(
    visitor: &mut impl Visitor,
    document: &ast::Document,
) -> Result<(), SpecError> {
    document.definitions.iter().try_for_each(|def| match def {
        ast::Definition::OperationDefinition(def) => visitor.operation(def),
        ast::Definition::FragmentDefinition(def) => visitor.fragment_definition(def),
        _ => Ok(()),
    })
}

pub(crate) trait Visitor: Sized {
    /// Traverse an operation definition.
    ///
    /// Call the [`operation`] free function for the default behavior.
    fn operation(&mut self, def: &Node<ast::OperationDefinition>) -> Result<(), SpecError> {
        operation(self, def)
    }

    /// Traverse a fragment definition.
    ///
    /// Call the [`fragment_definition`] free function for the default behavior.
    fn fragment_definition(
        &mut self,
        def: &Node<ast::FragmentDefinition>,
    ) -> Result<(), SpecError> {
        fragment_definition(self, def)
    }

    /// Visit a directive of a selection. The selection is the last of `ancestors`.
    fn directive(
        &mut self,
        _ancestors: &Ancestors,
        _def: &ast::Directive,
    ) -> Result<(), SpecError> {
        Ok(())
    }

    /// Traverse a field. The field is the last of `ancestors`.
    ///
    /// Call the [`field`] free function for the default behavior.
    fn field(
        &mut self,
        ancestors: &mut Ancestors,
        def: &Node<ast::Field>,
    ) -> Result<(), SpecError> {
        field(self, ancestors, def)
    }

    /// Traverse a fragment spread. The spread is the last of `ancestors`.
    ///
    /// Call the [`fragment_spread`] free function for the default behavior.
    fn fragment_spread(
        &mut self,
        ancestors: &mut Ancestors,
        def: &Node<ast::FragmentSpread>,
    ) -> Result<(), SpecError> {
        fragment_spread(self, ancestors, def)
    }

    /// Traverse an inline fragment. The fragment is the last of `ancestors`.
    ///
    /// Call the [`inline_fragment`] free function for the default behavior.
    fn inline_fragment(
        &mut self,
        ancestors: &mut Ancestors,
        def: &Node<ast::InlineFragment>,
    ) -> Result<(), SpecError> {
        inline_fragment(self, ancestors, def)
    }
}

/// The default behavior for traversing an operation.
pub(crate) fn operation(
    visitor: &mut impl Visitor,
    def: &ast::OperationDefinition,
) -> Result<(), SpecError> {
    selection_set(visitor, &mut Ancestors::default(), &def.selection_set)
}

/// The default behavior for traversing a fragment definition.
pub(crate) fn fragment_definition(
    visitor: &mut impl Visitor,
    def: &ast::FragmentDefinition,
) -> Result<(), SpecError> {
    selection_set(visitor, &mut Ancestors::default(), &def.selection_set)
}

/// The default behavior for traversing a field: its directives, then its selection set.
pub(crate) fn field(
    visitor: &mut impl Visitor,
    ancestors: &mut Ancestors,
    def: &ast::Field,
) -> Result<(), SpecError> {
    directives(visitor, ancestors, &def.directives)?;
    selection_set(visitor, ancestors, &def.selection_set)
}

/// The default behavior for traversing a fragment spread: its directives.
pub(crate) fn fragment_spread(
    visitor: &mut impl Visitor,
    ancestors: &mut Ancestors,
    def: &ast::FragmentSpread,
) -> Result<(), SpecError> {
    directives(visitor, ancestors, &def.directives)
}

/// The default behavior for traversing an inline fragment: its directives, then its selection set.
pub(crate) fn inline_fragment(
    visitor: &mut impl Visitor,
    ancestors: &mut Ancestors,
    def: &ast::InlineFragment,
) -> Result<(), SpecError> {
    directives(visitor, ancestors, &def.directives)?;
    selection_set(visitor, ancestors, &def.selection_set)
}

fn directives(
    visitor: &mut impl Visitor,
    ancestors: &Ancestors,
    list: &ast::DirectiveList,
) -> Result<(), SpecError> {
    list.0
        .iter()
        .try_for_each(|directive| visitor.directive(ancestors, directive))
}

fn selection_set(
    visitor: &mut impl Visitor,
    ancestors: &mut Ancestors,
    set: &[ast::Selection],
) -> Result<(), SpecError> {
    set.iter().try_for_each(|selection| {
        ancestors.0.push(NodeId::of_selection(selection));
        let result = match selection {
            ast::Selection::Field(def) => visitor.field(ancestors, def),
            ast::Selection::FragmentSpread(def) => visitor.fragment_spread(ancestors, def),
            ast::Selection::InlineFragment(def) => visitor.inline_fragment(ancestors, def),
        };
        ancestors.0.pop();
        result
    })
}
