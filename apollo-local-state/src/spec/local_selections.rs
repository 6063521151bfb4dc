//! Selections requiring local resolution.
//!
//! A selection requires local resolution when it carries `@client`, or when it encloses one,
//! directly or through the fragments it spreads.

use std::collections::HashMap;
use std::collections::HashSet;
use std::num::NonZeroUsize;
use std::sync::Arc;

use apollo_compiler::Node;
use apollo_compiler::ast;
use parking_lot::Mutex;

use crate::cache::DocumentCache;
use crate::spec::CLIENT_DIRECTIVE_NAME;
use crate::spec::Fragments;
use crate::spec::NodeId;
use crate::spec::SpecError;
use crate::spec::traverse;
use crate::spec::traverse::Ancestors;
use crate::spec::traverse::Visitor;

/// The set of selection nodes of one definition that must be walked by the resolver.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct LocalSelections {
    nodes: HashSet<NodeId>,
}

impl LocalSelections {
    pub(crate) fn contains(&self, selection: &ast::Selection) -> bool {
        self.nodes.contains(&NodeId::of_selection(selection))
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.nodes.len()
    }
}

/// An executable definition.
#[derive(Clone, Copy)]
pub(crate) enum Definition<'a> {
    Operation(&'a Node<ast::OperationDefinition>),
    Fragment(&'a Node<ast::FragmentDefinition>),
}

impl Definition<'_> {
    fn id(&self) -> NodeId {
        match self {
            Definition::Operation(def) => NodeId::of(def),
            Definition::Fragment(def) => NodeId::of(def),
        }
    }
}

type DefinitionSelections = Arc<Mutex<HashMap<NodeId, Arc<LocalSelections>>>>;

/// Per document cache of [`LocalSelections`], by definition.
///
/// Once computed for a definition, a set is never replaced.
pub(crate) struct TraverseCache {
    documents: DocumentCache<DefinitionSelections>,
}

impl TraverseCache {
    pub(crate) fn new(max_capacity: NonZeroUsize) -> Self {
        Self {
            documents: DocumentCache::new(max_capacity),
        }
    }

    /// Returns the selections of `definition` requiring local resolution.
    ///
    /// `definition` and `fragments` must belong to `document`.
    pub(crate) fn local_selections(
        &self,
        document: &Arc<ast::Document>,
        fragments: &Fragments,
        definition: Definition<'_>,
    ) -> Result<Arc<LocalSelections>, SpecError> {
        let definitions = match self.documents.get(document) {
            Some(definitions) => definitions,
            None => self.documents.insert(document, Default::default()),
        };
        Introspector {
            definitions: &definitions,
            fragments,
            in_progress: HashSet::new(),
        }
        .compute(definition)
    }
}

struct Introspector<'a> {
    definitions: &'a DefinitionSelections,
    fragments: &'a Fragments,
    // guards against fragment cycles, which only invalid documents contain
    in_progress: HashSet<NodeId>,
}

impl Introspector<'_> {
    fn compute(&mut self, definition: Definition<'_>) -> Result<Arc<LocalSelections>, SpecError> {
        let id = definition.id();
        if let Some(cached) = self.definitions.lock().get(&id) {
            return Ok(cached.clone());
        }
        if !self.in_progress.insert(id) {
            return Ok(Default::default());
        }

        let mut collector = Collector {
            introspector: self,
            nodes: HashSet::new(),
        };
        match definition {
            Definition::Operation(def) => traverse::operation(&mut collector, def),
            Definition::Fragment(def) => traverse::fragment_definition(&mut collector, def),
        }?;
        let computed = Arc::new(LocalSelections {
            nodes: collector.nodes,
        });
        self.in_progress.remove(&id);

        Ok(self
            .definitions
            .lock()
            .entry(id)
            .or_insert(computed)
            .clone())
    }
}

struct Collector<'i, 'a> {
    introspector: &'i mut Introspector<'a>,
    nodes: HashSet<NodeId>,
}

impl Visitor for Collector<'_, '_> {
    fn directive(&mut self, ancestors: &Ancestors, def: &ast::Directive) -> Result<(), SpecError> {
        if def.name.as_str() == CLIENT_DIRECTIVE_NAME {
            self.nodes.extend(ancestors.iter());
        }
        Ok(())
    }

    fn fragment_spread(
        &mut self,
        ancestors: &mut Ancestors,
        def: &Node<ast::FragmentSpread>,
    ) -> Result<(), SpecError> {
        let fragments = self.introspector.fragments;
        let fragment = fragments.require(def.fragment_name.as_str())?;
        let spread = self
            .introspector
            .compute(Definition::Fragment(fragment))?;
        if !spread.is_empty() {
            self.nodes.extend(ancestors.iter());
            self.nodes.extend(spread.nodes.iter().copied());
        }
        traverse::fragment_spread(self, ancestors, def)
    }
}
