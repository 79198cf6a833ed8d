// SPDX-License-Identifier: MIT OR Apache-2.0
//! Connector definitions: named inputs and outputs owned by a node.
//!
//! An [`Input`] remembers the symbolic source it was asked to connect to
//! ([`SourceRef`]) independently of whether that source currently exists.
//! When resolution succeeds the input also caches a [`ResolvedEdge`], and the
//! source [`Output`] lists the consuming node among its dependents.

use crate::node::NodeKey;
use serde::{Deserialize, Serialize};

/// Identifier of an input, unique within its owning node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InputId(pub u32);

/// Identifier of an output, unique within its owning node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OutputId(pub u32);

/// Symbolic reference to a source output: sibling node name plus output name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceRef {
    /// Name of the source node among the consumer's siblings
    pub node: String,
    /// Name of the output on the source node
    pub output: String,
}

impl SourceRef {
    /// Create a new source reference
    pub fn new(node: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            output: output.into(),
        }
    }
}

/// A live edge cached on a resolved input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResolvedEdge {
    /// Source node
    pub node: NodeKey,
    /// Output on the source node
    pub output: OutputId,
}

/// A named input on a node
#[derive(Debug, Clone)]
pub struct Input {
    id: InputId,
    name: String,
    source: Option<SourceRef>,
    edge: Option<ResolvedEdge>,
    /// Set while a disconnect is notifying observers.
    severing: bool,
}

impl Input {
    pub(crate) fn new(id: InputId, name: String) -> Self {
        Self {
            id,
            name,
            source: None,
            edge: None,
            severing: false,
        }
    }

    /// Input identifier
    pub fn id(&self) -> InputId {
        self.id
    }

    /// Input name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Pending symbolic reference, kept even while unresolved
    pub fn source(&self) -> Option<&SourceRef> {
        self.source.as_ref()
    }

    /// The live edge, if resolution succeeded
    pub fn edge(&self) -> Option<ResolvedEdge> {
        self.edge
    }

    /// Whether the input currently has a live edge
    pub fn is_resolved(&self) -> bool {
        self.edge.is_some()
    }

    /// Whether the input holds a reference that did not resolve
    pub fn is_pending(&self) -> bool {
        self.source.is_some() && self.edge.is_none()
    }

    pub(crate) fn set_source(&mut self, source: SourceRef) {
        self.source = Some(source);
    }

    pub(crate) fn clear_source(&mut self) {
        self.source = None;
    }

    pub(crate) fn set_edge(&mut self, edge: Option<ResolvedEdge>) {
        self.edge = edge;
    }

    pub(crate) fn is_severing(&self) -> bool {
        self.severing
    }

    pub(crate) fn set_severing(&mut self, severing: bool) {
        self.severing = severing;
    }
}

/// A named output on a node
#[derive(Debug, Clone)]
pub struct Output {
    id: OutputId,
    name: String,
    /// Downstream nodes with at least one resolved input pointing here.
    dependents: Vec<NodeKey>,
    /// Set while the output is being deleted; resolution skips it.
    removing: bool,
}

impl Output {
    pub(crate) fn new(id: OutputId, name: String) -> Self {
        Self {
            id,
            name,
            dependents: Vec::new(),
            removing: false,
        }
    }

    /// Output identifier
    pub fn id(&self) -> OutputId {
        self.id
    }

    /// Output name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Nodes currently consuming this output, each listed once
    pub fn dependents(&self) -> &[NodeKey] {
        &self.dependents
    }

    /// Whether any node still consumes this output
    pub fn is_used(&self) -> bool {
        !self.dependents.is_empty()
    }

    pub(crate) fn add_dependent(&mut self, node: NodeKey) {
        if !self.dependents.contains(&node) {
            self.dependents.push(node);
        }
    }

    pub(crate) fn remove_dependent(&mut self, node: NodeKey) {
        self.dependents.retain(|n| *n != node);
    }

    pub(crate) fn clear_dependents(&mut self) {
        self.dependents.clear();
    }

    pub(crate) fn is_removing(&self) -> bool {
        self.removing
    }

    pub(crate) fn set_removing(&mut self) {
        self.removing = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::SlotMap;

    #[test]
    fn test_input_pending_state() {
        let mut input = Input::new(InputId(0), "in".to_string());
        assert!(!input.is_pending());
        assert!(!input.is_resolved());

        input.set_source(SourceRef::new("Gen", "image"));
        assert!(input.is_pending());
        assert_eq!(input.source().unwrap().node, "Gen");
    }

    #[test]
    fn test_output_dependents_are_unique() {
        let mut keys: SlotMap<NodeKey, ()> = SlotMap::with_key();
        let a = keys.insert(());
        let b = keys.insert(());

        let mut output = Output::new(OutputId(0), "image".to_string());
        output.add_dependent(a);
        output.add_dependent(a);
        output.add_dependent(b);
        assert_eq!(output.dependents(), &[a, b]);

        output.remove_dependent(a);
        assert_eq!(output.dependents(), &[b]);
        assert!(output.is_used());
    }
}
