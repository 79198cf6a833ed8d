// SPDX-License-Identifier: MIT OR Apache-2.0
//! Catalog of node types.
//!
//! A catalog maps type names to factories. It is a plain value passed to
//! [`Network::create_child`](crate::network::Network::create_child), so
//! independent catalogs can coexist.

use crate::node::{Node, NodeKind};
use indexmap::IndexMap;
use std::fmt;

/// Builds a detached node with the given name
pub type NodeFactory = Box<dyn Fn(&str) -> Node>;

struct CatalogEntry {
    kind: NodeKind,
    factory: NodeFactory,
}

/// Registry of constructible node types
#[derive(Default)]
pub struct NodeCatalog {
    types: IndexMap<String, CatalogEntry>,
}

impl NodeCatalog {
    /// Create a new empty catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a node type.
    ///
    /// A duplicate type name is logged and dropped; the first registration
    /// wins. Returns whether the type was added.
    pub fn register<F>(&mut self, type_name: &str, kind: NodeKind, factory: F) -> bool
    where
        F: Fn(&str) -> Node + 'static,
    {
        if self.types.contains_key(type_name) {
            tracing::warn!(type_name, "duplicate node type registration dropped");
            return false;
        }
        self.types.insert(
            type_name.to_owned(),
            CatalogEntry {
                kind,
                factory: Box::new(factory),
            },
        );
        true
    }

    /// Construct a node of the given type, or `None` for unknown types
    pub fn construct(&self, type_name: &str, name: &str) -> Option<Node> {
        let Some(entry) = self.types.get(type_name) else {
            tracing::debug!(type_name, "unknown node type");
            return None;
        };
        let mut node = (entry.factory)(name);
        node.set_type(type_name, entry.kind);
        Some(node)
    }

    /// Whether a type is registered
    pub fn contains(&self, type_name: &str) -> bool {
        self.types.contains_key(type_name)
    }

    /// Kind of a registered type
    pub fn kind_of(&self, type_name: &str) -> Option<NodeKind> {
        self.types.get(type_name).map(|entry| entry.kind)
    }

    /// Registered type names in registration order
    pub fn type_names(&self) -> impl Iterator<Item = &str> {
        self.types.keys().map(String::as_str)
    }

    /// Type names of a given kind
    pub fn types_of_kind(&self, kind: NodeKind) -> impl Iterator<Item = &str> {
        self.types
            .iter()
            .filter(move |(_, entry)| entry.kind == kind)
            .map(|(name, _)| name.as_str())
    }

    /// Number of registered types
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Whether the catalog is empty
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

impl fmt::Debug for NodeCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.types.keys()).finish()
    }
}
