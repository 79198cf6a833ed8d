// SPDX-License-Identifier: MIT OR Apache-2.0
//! Networks: nodes that own an ordered collection of child nodes.
//!
//! Children live in a slot map and are addressed by [`NodeKey`]. Every
//! mutation that may touch more than one node is a `Network` method, so the
//! back-edges kept on inputs and outputs are always updated together.

use crate::catalog::NodeCatalog;
use crate::node::{unique_name, Node, NodeId, NodeKey, NodeKind};
use crate::observer::{EventData, Observer, ObserverRegistry};
use crate::port::{Input, InputId, Output, OutputId};
use crate::settings::GraphSettings;
use slotmap::SlotMap;

/// A node containing child nodes
#[derive(Debug)]
pub struct Network {
    /// The network's own identity, parameters and observers
    core: Node,
    children: SlotMap<NodeKey, Node>,
    /// Insertion order of `children`
    order: Vec<NodeKey>,
    settings: GraphSettings,
}

impl Network {
    /// Create an empty network with default settings
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_settings(name, GraphSettings::default())
    }

    /// Create an empty network
    pub fn with_settings(name: impl Into<String>, settings: GraphSettings) -> Self {
        Self {
            core: Node::new(name).with_kind(NodeKind::Utility),
            children: SlotMap::with_key(),
            order: Vec::new(),
            settings,
        }
    }

    /// The network viewed as a node
    pub fn as_node(&self) -> &Node {
        &self.core
    }

    /// The network viewed as a node, for parameter edits
    pub fn as_node_mut(&mut self) -> &mut Node {
        &mut self.core
    }

    /// Network name
    pub fn name(&self) -> &str {
        self.core.name()
    }

    /// Active settings
    pub fn settings(&self) -> &GraphSettings {
        &self.settings
    }

    // ------------------------------------------------------------------
    // Observers
    // ------------------------------------------------------------------

    /// Registry receiving the network's own events
    pub fn observers(&self) -> &ObserverRegistry {
        self.core.observers()
    }

    /// Observe the network's own events (children and connections)
    pub fn observe_network<F>(&self, callback: F) -> Observer
    where
        F: Fn(&mut Network, &EventData) + 'static,
    {
        Observer::new(self.core.observers(), callback)
    }

    /// Observe one child's events (connectors and deletion)
    pub fn observe<F>(&self, node: NodeKey, callback: F) -> Option<Observer>
    where
        F: Fn(&mut Network, &EventData) + 'static,
    {
        let child = self.children.get(node)?;
        Some(Observer::new(child.observers(), callback))
    }

    pub(crate) fn notify_network(&mut self, event: EventData) {
        let registry = self.core.observers().clone();
        registry.dispatch(self, &event);
    }

    pub(crate) fn notify_child(&mut self, node: NodeKey, event: EventData) {
        let Some(child) = self.children.get(node) else {
            return;
        };
        let registry = child.observers().clone();
        registry.dispatch(self, &event);
    }

    // ------------------------------------------------------------------
    // Containment
    // ------------------------------------------------------------------

    /// Insert a child, renaming it with a numeric suffix if the name is taken
    pub fn add_child(&mut self, mut node: Node) -> NodeKey {
        let name = unique_name(node.name(), |candidate| {
            self.find_child_by_name(candidate).is_some()
        });
        if name != node.name() {
            tracing::debug!(requested = node.name(), assigned = %name, "child renamed on insert");
        }
        node.set_name(name);
        // Edges are arena handles into the previous owner, if any.
        for input in node.inputs_mut() {
            input.set_edge(None);
        }
        for output in node.outputs_mut() {
            output.clear_dependents();
        }

        let key = self.children.insert(node);
        self.order.push(key);
        tracing::debug!(network = self.name(), child = ?key, "child added");
        self.notify_network(EventData::ChildAdded { child: key });

        if self.settings.auto_resolve_pending {
            self.resolve_pending();
        }
        key
    }

    /// Construct a node through `catalog` and insert it
    pub fn create_child(
        &mut self,
        catalog: &NodeCatalog,
        type_name: &str,
        name: &str,
    ) -> Option<NodeKey> {
        let node = catalog.construct(type_name, name)?;
        Some(self.add_child(node))
    }

    /// Delete a child.
    ///
    /// The child is told it is about to be deleted, then its inputs and outputs
    /// are deleted (severing every edge touching it), then `ChildRemoved` is
    /// delivered and the node is erased. While this runs no edge can form to
    /// or from the child. Returns false for unknown keys and for a child that
    /// is already being deleted.
    pub fn delete_child(&mut self, node: NodeKey) -> bool {
        let Some(child) = self.children.get_mut(node) else {
            return false;
        };
        if child.is_dying() {
            return false;
        }
        child.set_dying();
        self.notify_child(node, EventData::AboutToBeDeleted { node });

        let inputs: Vec<InputId> = self.input_ids(node);
        for input in inputs {
            self.delete_input(node, input);
        }
        let outputs: Vec<OutputId> = self.output_ids(node);
        for output in outputs {
            self.delete_output(node, output);
        }

        self.notify_network(EventData::ChildRemoved { child: node });
        self.order.retain(|k| *k != node);
        if let Some(removed) = self.children.remove(node) {
            tracing::debug!(network = self.name(), child = removed.name(), "child deleted");
        }
        true
    }

    /// Delete several children, returning how many existed
    pub fn delete_children(&mut self, nodes: &[NodeKey]) -> usize {
        nodes.iter().filter(|&&node| self.delete_child(node)).count()
    }

    /// Rename a child, returning the unique name assigned.
    ///
    /// Live edges are kept. Pending references naming the old name are not
    /// rewritten.
    pub fn rename_child(&mut self, node: NodeKey, name: &str) -> Option<String> {
        if !self.children.contains_key(node) {
            return None;
        }
        let name = unique_name(name, |candidate| {
            self.find_child_by_name(candidate)
                .is_some_and(|other| other != node)
        });
        let child = self.children.get_mut(node)?;
        child.set_name(name.clone());
        Some(name)
    }

    /// Get a child
    pub fn child(&self, node: NodeKey) -> Option<&Node> {
        self.children.get(node)
    }

    /// Get a child for parameter edits
    pub fn child_mut(&mut self, node: NodeKey) -> Option<&mut Node> {
        self.children.get_mut(node)
    }

    /// Whether `node` is a live child
    pub fn contains(&self, node: NodeKey) -> bool {
        self.children.contains_key(node)
    }

    /// Children in insertion order
    pub fn children(&self) -> impl Iterator<Item = (NodeKey, &Node)> {
        self.order
            .iter()
            .filter_map(|&key| self.children.get(key).map(|node| (key, node)))
    }

    /// Child keys in insertion order
    pub fn child_keys(&self) -> &[NodeKey] {
        &self.order
    }

    /// Number of children
    pub fn child_count(&self) -> usize {
        self.children.len()
    }

    /// Find a child by name (linear scan)
    pub fn find_child_by_name(&self, name: &str) -> Option<NodeKey> {
        self.children()
            .find(|(_, node)| node.name() == name)
            .map(|(key, _)| key)
    }

    /// Find a child by its process-unique ID
    pub fn find_child_by_id(&self, id: NodeId) -> Option<NodeKey> {
        self.children()
            .find(|(_, node)| node.id() == id)
            .map(|(key, _)| key)
    }

    /// Children of a given kind, in insertion order
    pub fn children_of_kind(&self, kind: NodeKind) -> Vec<NodeKey> {
        self.children()
            .filter(|(_, node)| node.kind() == kind)
            .map(|(key, _)| key)
            .collect()
    }

    /// Children built from a given catalog type, in insertion order
    pub fn children_of_type(&self, type_name: &str) -> Vec<NodeKey> {
        self.children()
            .filter(|(_, node)| node.type_name() == type_name)
            .map(|(key, _)| key)
            .collect()
    }

    /// Children exposing the render target capability
    pub fn render_targets(&self) -> Vec<NodeKey> {
        self.children()
            .filter(|(_, node)| node.as_render_target().is_some())
            .map(|(key, _)| key)
            .collect()
    }

    // ------------------------------------------------------------------
    // Connectors
    // ------------------------------------------------------------------

    /// Create an input on a child. Returns `None` for unknown nodes.
    pub fn create_input(&mut self, node: NodeKey, name: &str) -> Option<InputId> {
        let input = self.children.get_mut(node)?.insert_input(name);
        self.notify_child(node, EventData::InputAdded { node, input });
        Some(input)
    }

    /// Delete an input, disconnecting it first.
    ///
    /// Observers see `ConnectionRemoved` (if it was resolved) and then
    /// `InputRemoved` while the input still exists.
    pub fn delete_input(&mut self, node: NodeKey, input: InputId) -> bool {
        if self.input(node, input).is_none() {
            return false;
        }
        self.disconnect_input(node, input);
        self.notify_child(node, EventData::InputRemoved { node, input });
        if let Some(child) = self.children.get_mut(node) {
            child.remove_input(input);
        }
        true
    }

    /// Create an output on a child. Returns `None` for unknown nodes.
    pub fn create_output(&mut self, node: NodeKey, name: &str) -> Option<OutputId> {
        let output = self.children.get_mut(node)?.insert_output(name);
        self.notify_child(node, EventData::OutputAdded { node, output });
        Some(output)
    }

    /// Delete an output.
    ///
    /// Every downstream input resolved to it is disconnected first, each
    /// producing its own `ConnectionRemoved`, then `OutputRemoved` is delivered.
    /// From the start of the call the output can no longer be resolved to, so
    /// observers cannot re-attach an input to it.
    pub fn delete_output(&mut self, node: NodeKey, output: OutputId) -> bool {
        let Some(slot) = self.node_mut(node).and_then(|child| child.output_mut(output)) else {
            return false;
        };
        if slot.is_removing() {
            return false;
        }
        slot.set_removing();

        self.sever_dependents(node, output);
        self.notify_child(node, EventData::OutputRemoved { node, output });
        // Dependents left behind by an observer are cut without events.
        let removed = self
            .children
            .get_mut(node)
            .and_then(|child| child.remove_output(output));
        if let Some(removed) = removed {
            for &dependent in removed.dependents() {
                self.clear_edges_to(dependent, node, output);
            }
        }
        true
    }

    /// Disconnect every input reading `node.output`, one event per input.
    fn sever_dependents(&mut self, node: NodeKey, output: OutputId) {
        while let Some(dependent) = self
            .child(node)
            .and_then(|child| child.output(output))
            .and_then(|o| o.dependents().first().copied())
        {
            let inputs = self.inputs_resolved_to(dependent, node, output);
            let mut severed = false;
            for input in inputs {
                severed |= self.disconnect_input(dependent, input);
            }
            if !severed {
                // stale entry, or an input already being severed higher up
                if let Some(o) = self.node_mut(node).and_then(|child| child.output_mut(output)) {
                    o.remove_dependent(dependent);
                }
            }
        }
    }

    fn clear_edges_to(&mut self, dependent: NodeKey, node: NodeKey, output: OutputId) {
        for input in self.inputs_resolved_to(dependent, node, output) {
            if let Some(slot) = self.node_mut(dependent).and_then(|n| n.input_mut(input)) {
                slot.set_edge(None);
            }
        }
    }

    pub(crate) fn input_ids(&self, node: NodeKey) -> Vec<InputId> {
        self.child(node)
            .map(|child| child.inputs().map(Input::id).collect())
            .unwrap_or_default()
    }

    pub(crate) fn output_ids(&self, node: NodeKey) -> Vec<OutputId> {
        self.child(node)
            .map(|child| child.outputs().map(Output::id).collect())
            .unwrap_or_default()
    }

    pub(crate) fn node_mut(&mut self, node: NodeKey) -> Option<&mut Node> {
        self.children.get_mut(node)
    }
}
