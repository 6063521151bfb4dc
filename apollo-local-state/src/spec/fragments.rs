use std::collections::HashMap;

use apollo_compiler::Node;
use apollo_compiler::ast;

use crate::spec::SpecError;

/// Fragment definitions of a document, by name.
#[derive(Debug, Default, Clone)]
pub struct Fragments {
    map: HashMap<String, Node<ast::FragmentDefinition>>,
}

impl Fragments {
    pub(crate) fn from_document(document: &ast::Document) -> Self {
        let map = document
            .definitions
            .iter()
            .filter_map(|definition| match definition {
                ast::Definition::FragmentDefinition(fragment) => {
                    Some((fragment.name.as_str().to_string(), fragment.clone()))
                }
                _ => None,
            })
            .collect();
        Fragments { map }
    }

    /// Returns the fragment definition named `name`.
    pub fn get(&self, name: &str) -> Option<&Node<ast::FragmentDefinition>> {
        self.map.get(name)
    }

    pub(crate) fn require(&self, name: &str) -> Result<&Node<ast::FragmentDefinition>, SpecError> {
        self.get(name)
            .ok_or_else(|| SpecError::UnknownFragment(name.to_string()))
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }
}
