//! Split of a query into the part sent to the server and the part resolved locally.

use std::collections::HashSet;
use std::num::NonZeroUsize;
use std::sync::Arc;

use apollo_compiler::Node;
use apollo_compiler::ast;
use apollo_compiler::name;

use crate::cache::DocumentCache;
use crate::spec::CLIENT_DIRECTIVE_NAME;
use crate::spec::Fragments;
use crate::spec::SpecError;
use crate::spec::directives;
use crate::spec::has_client_directive;
use crate::spec::is_typename_field;
use crate::spec::traverse;
use crate::spec::traverse::Ancestors;
use crate::spec::traverse::Visitor;

/// A query document, split.
#[derive(Debug)]
pub(crate) struct QuerySplit {
    pub(crate) fragments: Fragments,
    /// Whether `@client` occurs anywhere in the document.
    pub(crate) has_client_directives: bool,
    /// The document without its `@client` selections, if any operation is left.
    pub(crate) server: Option<Arc<ast::Document>>,
}

impl QuerySplit {
    pub(crate) fn new(document: &ast::Document) -> Result<Self, SpecError> {
        let fragments = Fragments::from_document(document);
        let has_client_directives = has_client_directives(document)?;
        let server = if has_client_directives {
            server_document(document).map(Arc::new)
        } else {
            None
        };
        Ok(Self {
            fragments,
            has_client_directives,
            server,
        })
    }
}

/// Cache of [`QuerySplit`]s, by document.
pub(crate) struct SplitCache {
    documents: DocumentCache<Arc<QuerySplit>>,
}

impl SplitCache {
    pub(crate) fn new(max_capacity: NonZeroUsize) -> Self {
        Self {
            documents: DocumentCache::new(max_capacity),
        }
    }

    pub(crate) fn split(&self, document: &Arc<ast::Document>) -> Result<Arc<QuerySplit>, SpecError> {
        self.documents
            .get_or_try_insert_with(document, || QuerySplit::new(document).map(Arc::new))
    }
}

fn has_client_directives(document: &ast::Document) -> Result<bool, SpecError> {
    struct FindClient(bool);

    impl Visitor for FindClient {
        fn directive(&mut self, _: &Ancestors, def: &ast::Directive) -> Result<(), SpecError> {
            self.0 |= def.name.as_str() == CLIENT_DIRECTIVE_NAME;
            Ok(())
        }
    }

    let mut visitor = FindClient(false);
    traverse::document(&mut visitor, document)?;
    Ok(visitor.0)
}

/// Removes `@client` selections from `document`.
///
/// Returns `None` when no operation is left.
pub(crate) fn server_document(document: &ast::Document) -> Option<ast::Document> {
    // fragments left empty once their client selections are removed, and all their spreads
    // with them, until no new one empties
    let mut emptied = HashSet::new();
    loop {
        let newly_emptied: Vec<String> = document
            .definitions
            .iter()
            .filter_map(|definition| match definition {
                ast::Definition::FragmentDefinition(fragment)
                    if !emptied.contains(fragment.name.as_str()) =>
                {
                    let stripped = strip_selection_set(&fragment.selection_set, &emptied, true);
                    stripped
                        .selections
                        .is_empty()
                        .then(|| fragment.name.as_str().to_string())
                }
                _ => None,
            })
            .collect();
        if newly_emptied.is_empty() {
            break;
        }
        emptied.extend(newly_emptied);
    }

    let mut definitions = Vec::with_capacity(document.definitions.len());
    for definition in &document.definitions {
        match definition {
            ast::Definition::OperationDefinition(operation) => {
                let stripped = strip_selection_set(&operation.selection_set, &emptied, false);
                if stripped.selections.is_empty() {
                    continue;
                }
                let mut operation = operation.clone();
                if stripped.changed {
                    operation.make_mut().selection_set = stripped.selections;
                }
                definitions.push(ast::Definition::OperationDefinition(operation));
            }
            ast::Definition::FragmentDefinition(fragment) => {
                if emptied.contains(fragment.name.as_str()) {
                    continue;
                }
                let stripped = strip_selection_set(&fragment.selection_set, &emptied, true);
                let mut fragment = fragment.clone();
                if stripped.changed {
                    fragment.make_mut().selection_set = stripped.selections;
                }
                definitions.push(ast::Definition::FragmentDefinition(fragment));
            }
            other => definitions.push(other.clone()),
        }
    }

    if !definitions
        .iter()
        .any(|definition| matches!(definition, ast::Definition::OperationDefinition(_)))
    {
        return None;
    }

    let mut server = document.clone();
    server.definitions = definitions;
    remove_unused_definitions(&mut server);
    Some(server)
}

struct Stripped {
    selections: Vec<ast::Selection>,
    changed: bool,
}

fn strip_selection_set(
    set: &[ast::Selection],
    emptied_fragments: &HashSet<String>,
    add_typename: bool,
) -> Stripped {
    let mut selections = Vec::with_capacity(set.len());
    let mut removed = false;
    let mut changed = false;

    for selection in set {
        if has_client_directive(directives(selection)) {
            removed = true;
            continue;
        }
        match selection {
            ast::Selection::Field(field) if !field.selection_set.is_empty() => {
                let nested = strip_selection_set(&field.selection_set, emptied_fragments, true);
                if nested.selections.is_empty() {
                    removed = true;
                } else if nested.changed {
                    let mut field = field.clone();
                    field.make_mut().selection_set = nested.selections;
                    selections.push(ast::Selection::Field(field));
                    changed = true;
                } else {
                    selections.push(selection.clone());
                }
            }
            ast::Selection::InlineFragment(inline) => {
                let nested = strip_selection_set(&inline.selection_set, emptied_fragments, true);
                if nested.selections.is_empty() {
                    removed = true;
                } else if nested.changed {
                    let mut inline = inline.clone();
                    inline.make_mut().selection_set = nested.selections;
                    selections.push(ast::Selection::InlineFragment(inline));
                    changed = true;
                } else {
                    selections.push(selection.clone());
                }
            }
            ast::Selection::FragmentSpread(spread)
                if emptied_fragments.contains(spread.fragment_name.as_str()) =>
            {
                removed = true;
            }
            _ => selections.push(selection.clone()),
        }
    }

    if removed {
        changed = true;
        // local fields below a remote object are dispatched on its type
        if add_typename && !selections.is_empty() && !selections.iter().any(is_typename_field) {
            selections.push(ast::Selection::Field(Node::new(ast::Field {
                alias: None,
                name: name!("__typename"),
                arguments: Vec::new(),
                directives: Default::default(),
                selection_set: Vec::new(),
            })));
        }
    }

    Stripped {
        selections,
        changed,
    }
}

/// Drops fragments no operation reaches, and variable definitions their operation does not use.
fn remove_unused_definitions(document: &mut ast::Document) {
    let fragments = Fragments::from_document(document);
    let mut reachable = HashSet::new();

    for definition in document.definitions.iter_mut() {
        if let ast::Definition::OperationDefinition(operation) = definition {
            let mut usage = Usage {
                fragments: &fragments,
                reached: HashSet::new(),
                variables: HashSet::new(),
            };
            usage.selection_set(&operation.selection_set);
            if operation
                .variables
                .iter()
                .any(|variable| !usage.variables.contains(variable.name.as_str()))
            {
                operation
                    .make_mut()
                    .variables
                    .retain(|variable| usage.variables.contains(variable.name.as_str()));
            }
            reachable.extend(usage.reached);
        }
    }

    document.definitions.retain(|definition| match definition {
        ast::Definition::FragmentDefinition(fragment) => {
            reachable.contains(fragment.name.as_str())
        }
        _ => true,
    });
}

/// Fragments and variables used by an operation.
struct Usage<'a> {
    fragments: &'a Fragments,
    reached: HashSet<String>,
    variables: HashSet<String>,
}

impl Usage<'_> {
    fn selection_set(&mut self, set: &[ast::Selection]) {
        for selection in set {
            self.directives(directives(selection));
            match selection {
                ast::Selection::Field(field) => {
                    for argument in &field.arguments {
                        self.value(&argument.value);
                    }
                    self.selection_set(&field.selection_set);
                }
                ast::Selection::InlineFragment(inline) => self.selection_set(&inline.selection_set),
                ast::Selection::FragmentSpread(spread) => {
                    let name = spread.fragment_name.as_str();
                    if self.reached.insert(name.to_string())
                        && let Some(fragment) = self.fragments.get(name)
                    {
                        self.directives(&fragment.directives);
                        self.selection_set(&fragment.selection_set);
                    }
                }
            }
        }
    }

    fn directives(&mut self, list: &ast::DirectiveList) {
        for directive in &list.0 {
            for argument in &directive.arguments {
                self.value(&argument.value);
            }
        }
    }

    fn value(&mut self, value: &ast::Value) {
        match value {
            ast::Value::Variable(name) => {
                self.variables.insert(name.as_str().to_string());
            }
            ast::Value::List(items) => items.iter().for_each(|item| self.value(item)),
            ast::Value::Object(fields) => fields.iter().for_each(|(_, item)| self.value(item)),
            _ => {}
        }
    }
}
