// SPDX-License-Identifier: MIT OR Apache-2.0
//! Connection resolution.
//!
//! Inputs are connected symbolically, by sibling node name and output name.
//! The reference is stored on the input even when it does not resolve; when it
//! does, the input caches a [`ResolvedEdge`] and the source output lists the
//! consuming node as a dependent.
//!
//! Dependents are tracked per node, not per input: a node with two inputs
//! reading the same output appears once. Adding the first such input inserts
//! the node, removing the last one takes it out again.

use crate::network::Network;
use crate::node::{Node, NodeKey};
use crate::observer::EventData;
use crate::port::{Input, InputId, Output, OutputId, ResolvedEdge, SourceRef};

/// A live edge between an output and an input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Connection {
    /// Source node
    pub source: NodeKey,
    /// Source output
    pub output: OutputId,
    /// Destination node
    pub dest: NodeKey,
    /// Destination input
    pub input: InputId,
}

impl Connection {
    /// Create a new connection value
    pub fn new(source: NodeKey, output: OutputId, dest: NodeKey, input: InputId) -> Self {
        Self {
            source,
            output,
            dest,
            input,
        }
    }

    /// Check if this connection involves a specific node
    pub fn involves_node(&self, node: NodeKey) -> bool {
        self.source == node || self.dest == node
    }

    /// The edge as cached on the destination input
    pub fn edge(&self) -> ResolvedEdge {
        ResolvedEdge {
            node: self.source,
            output: self.output,
        }
    }
}

impl Network {
    /// Get an input of a child
    pub fn input(&self, node: NodeKey, input: InputId) -> Option<&Input> {
        self.child(node)?.input(input)
    }

    /// Point an input at `source_output` on the sibling named `source_path`.
    ///
    /// Whatever the input resolved to before is disconnected first. The new
    /// reference is stored even if it does not resolve. Returns true when a
    /// live edge was established, in which case `ConnectionAdded` was delivered
    /// to the network's observers.
    pub fn connect_input(
        &mut self,
        node: NodeKey,
        input: InputId,
        source_path: &str,
        source_output: &str,
    ) -> bool {
        if self.input(node, input).is_none() {
            return false;
        }
        self.disconnect_input(node, input);

        let Some(slot) = self.node_mut(node).and_then(|n| n.input_mut(input)) else {
            return false;
        };
        slot.set_source(SourceRef::new(source_path, source_output));
        self.resolve_input(node, input)
    }

    /// Tear down the live edge of an input, keeping its pending reference.
    ///
    /// `ConnectionRemoved` is delivered before any back-edge changes. Returns
    /// false if the input was not resolved.
    pub fn disconnect_input(&mut self, node: NodeKey, input: InputId) -> bool {
        let Some(slot) = self.node_mut(node).and_then(|n| n.input_mut(input)) else {
            return false;
        };
        let Some(edge) = slot.edge() else {
            return false;
        };
        if slot.is_severing() {
            return false;
        }
        slot.set_severing(true);

        let connection = Connection::new(edge.node, edge.output, node, input);
        self.notify_network(EventData::ConnectionRemoved(connection));

        // Observers may have deleted either end in the meantime.
        if self.references_excluding(node, edge, input) == 0 {
            if let Some(output) = self
                .node_mut(edge.node)
                .and_then(|n| n.output_mut(edge.output))
            {
                output.remove_dependent(node);
            }
        }
        if let Some(slot) = self.node_mut(node).and_then(|n| n.input_mut(input)) {
            slot.set_edge(None);
            slot.set_severing(false);
        }
        tracing::debug!(?connection, "connection removed");
        true
    }

    /// Connect `to.to_input` to `from.from_output`, addressing everything by name.
    ///
    /// Does nothing and returns false if `to` or `to_input` does not exist.
    pub fn add_connection(&mut self, from: &str, from_output: &str, to: &str, to_input: &str) -> bool {
        let Some((dest, input)) = self.input_by_path(to, to_input) else {
            tracing::debug!(to, to_input, "connection target not found");
            return false;
        };
        self.connect_input(dest, input, from, from_output)
    }

    /// Disconnect `to.to_input` and forget its pending reference
    pub fn remove_connection(&mut self, to: &str, to_input: &str) -> bool {
        let Some((dest, input)) = self.input_by_path(to, to_input) else {
            return false;
        };
        let removed = self.disconnect_input(dest, input);
        if let Some(slot) = self.node_mut(dest).and_then(|n| n.input_mut(input)) {
            slot.clear_source();
        }
        removed
    }

    /// Retry resolution of every pending input of one child.
    ///
    /// Returns the number of inputs that resolved.
    pub fn reconnect_pending(&mut self, node: NodeKey) -> usize {
        let pending: Vec<InputId> = self
            .child(node)
            .map(|n| n.inputs().filter(|i| i.is_pending()).map(Input::id).collect())
            .unwrap_or_default();
        pending
            .into_iter()
            .filter(|&input| self.resolve_input(node, input))
            .count()
    }

    /// Retry resolution of every pending input in the network
    pub fn resolve_pending(&mut self) -> usize {
        let keys = self.child_keys().to_vec();
        keys.into_iter().map(|key| self.reconnect_pending(key)).sum()
    }

    /// Resolved inputs of a child with the edge each one reads from
    pub fn upstream(&self, node: NodeKey) -> Vec<(InputId, ResolvedEdge)> {
        self.child(node)
            .map(|n| {
                n.inputs()
                    .filter_map(|i| i.edge().map(|edge| (i.id(), edge)))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Other children this child reads from, each listed once
    pub fn dependencies(&self, node: NodeKey) -> Vec<NodeKey> {
        let mut nodes = Vec::new();
        for (_, edge) in self.upstream(node) {
            if edge.node != node && self.contains(edge.node) && !nodes.contains(&edge.node) {
                nodes.push(edge.node);
            }
        }
        nodes
    }

    /// Other children reading from this child, each listed once
    pub fn dependents(&self, node: NodeKey) -> Vec<NodeKey> {
        let mut nodes = Vec::new();
        let Some(child) = self.child(node) else {
            return nodes;
        };
        for &dependent in child.outputs().flat_map(Output::dependents) {
            if dependent != node && !nodes.contains(&dependent) {
                nodes.push(dependent);
            }
        }
        nodes
    }

    /// Every live edge, grouped by destination in child order
    pub fn connections(&self) -> Vec<Connection> {
        self.children()
            .flat_map(|(dest, node)| {
                node.inputs().filter_map(move |i| {
                    i.edge()
                        .map(|edge| Connection::new(edge.node, edge.output, dest, i.id()))
                })
            })
            .collect()
    }

    pub(crate) fn inputs_resolved_to(
        &self,
        dest: NodeKey,
        source: NodeKey,
        output: OutputId,
    ) -> Vec<InputId> {
        let edge = ResolvedEdge { node: source, output };
        self.child(dest)
            .map(|n| {
                n.inputs()
                    .filter(|i| i.edge() == Some(edge))
                    .map(Input::id)
                    .collect()
            })
            .unwrap_or_default()
    }

    fn input_by_path(&self, node: &str, input: &str) -> Option<(NodeKey, InputId)> {
        let key = self.find_child_by_name(node)?;
        let input = self.child(key)?.input_by_name(input)?.id();
        Some((key, input))
    }

    /// Resolve the stored reference of an unresolved input.
    fn resolve_input(&mut self, node: NodeKey, input: InputId) -> bool {
        if self.child(node).map_or(true, Node::is_dying) {
            return false;
        }
        let Some(slot) = self.input(node, input) else {
            return false;
        };
        if slot.is_resolved() {
            return false;
        }
        let Some(source) = slot.source().cloned() else {
            return false;
        };
        let Some(edge) = self.lookup(&source) else {
            if self.settings().warn_on_unresolved {
                tracing::warn!(node = %source.node, output = %source.output, "unresolved input reference");
            } else {
                tracing::debug!(node = %source.node, output = %source.output, "unresolved input reference");
            }
            return false;
        };

        let first = self.references_excluding(node, edge, input) == 0;
        if let Some(slot) = self.node_mut(node).and_then(|n| n.input_mut(input)) {
            slot.set_edge(Some(edge));
        }
        if first {
            if let Some(output) = self
                .node_mut(edge.node)
                .and_then(|n| n.output_mut(edge.output))
            {
                output.add_dependent(node);
            }
        }

        let connection = Connection::new(edge.node, edge.output, node, input);
        tracing::debug!(?connection, "connection added");
        self.notify_network(EventData::ConnectionAdded(connection));
        true
    }

    /// Find the live output a reference names. Outputs and nodes that are
    /// being deleted are skipped.
    fn lookup(&self, source: &SourceRef) -> Option<ResolvedEdge> {
        let node = self.find_child_by_name(&source.node)?;
        let child = self.child(node).filter(|n| !n.is_dying())?;
        let output = child
            .output_by_name(&source.output)
            .filter(|o| !o.is_removing())?
            .id();
        Some(ResolvedEdge { node, output })
    }

    /// Inputs of `node` other than `input` resolved to `edge`
    fn references_excluding(&self, node: NodeKey, edge: ResolvedEdge, input: InputId) -> usize {
        self.child(node).map_or(0, |n| {
            n.inputs()
                .filter(|i| i.id() != input && i.edge() == Some(edge))
                .count()
        })
    }
}
