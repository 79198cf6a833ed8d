// SPDX-License-Identifier: MIT OR Apache-2.0
//! Node definitions for the graph engine.
//!
//! A [`Node`] owns its parameters, inputs and outputs and an
//! [`ObserverRegistry`]. Connector mutations that can affect other nodes
//! (deleting a connected input, deleting an output with dependents) are
//! driven through [`Network`](crate::network::Network), which has access to
//! the siblings holding the other end of each edge.

use crate::observer::ObserverRegistry;
use crate::port::{Input, InputId, Output, OutputId, SourceRef};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

slotmap::new_key_type! {
    /// Arena handle of a child node inside a network.
    ///
    /// Carries a generation, so a key kept after its node was deleted never
    /// resolves to a node inserted later into the same slot.
    pub struct NodeKey;
}

/// Separator placed between a base name and its collision counter
pub const NAME_SEPARATOR: char = '_';

/// Process-unique node identifier, used for serialization and cross references
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(u64);

impl NodeId {
    /// Generate a new unique node ID
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

/// Coarse node kind, used to filter children without inspecting behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum NodeKind {
    /// Produces data from parameters only (noise, constants, file readers)
    Generator,
    /// Transforms its inputs
    Filter,
    /// Terminal node (display, render target, writer)
    Sink,
    /// Grouping, routing and other helpers
    Utility,
    /// Anything else
    #[default]
    Custom,
}

/// Scalar parameter value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ParamValue {
    /// Boolean
    Bool(bool),
    /// Integer
    Int(i64),
    /// Float
    Float(f32),
    /// 2D vector
    Vector2([f32; 2]),
    /// 3D vector
    Vector3([f32; 3]),
    /// 4D vector
    Vector4([f32; 4]),
    /// Color (RGBA)
    Color([f32; 4]),
    /// String
    String(String),
}

/// Capability exposed by nodes that render into a surface.
pub trait RenderTarget {
    /// Surface size in pixels
    fn surface_size(&self) -> [u32; 2];
}

/// Behavior attached to a node by its factory.
///
/// The engine never downcasts behaviors; callers ask for capabilities.
pub trait NodeBehavior {
    /// Render target capability, if the node has one
    fn as_render_target(&self) -> Option<&dyn RenderTarget> {
        None
    }
}

/// A vertex of the dependency graph
pub struct Node {
    id: NodeId,
    name: String,
    type_name: String,
    kind: NodeKind,
    params: IndexMap<String, ParamValue>,
    inputs: IndexMap<InputId, Input>,
    outputs: IndexMap<OutputId, Output>,
    next_input: u32,
    next_output: u32,
    observers: ObserverRegistry,
    behavior: Option<Box<dyn NodeBehavior>>,
    /// Set once deletion starts; no edge may form to or from the node.
    dying: bool,
}

impl Node {
    /// Create a detached node with no connectors
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: NodeId::new(),
            name: name.into(),
            type_name: String::new(),
            kind: NodeKind::default(),
            params: IndexMap::new(),
            inputs: IndexMap::new(),
            outputs: IndexMap::new(),
            next_input: 0,
            next_output: 0,
            observers: ObserverRegistry::new(),
            behavior: None,
            dying: false,
        }
    }

    /// Add an input while building a detached node
    pub fn with_input(mut self, name: &str) -> Self {
        self.insert_input(name);
        self
    }

    /// Add an input that will resolve against `source` once inserted.
    pub fn with_input_from(mut self, name: &str, source: SourceRef) -> Self {
        let id = self.insert_input(name);
        if let Some(input) = self.inputs.get_mut(&id) {
            input.set_source(source);
        }
        self
    }

    /// Add an output while building a detached node
    pub fn with_output(mut self, name: &str) -> Self {
        self.insert_output(name);
        self
    }

    /// Add a parameter while building a detached node
    pub fn with_parameter(mut self, name: &str, value: ParamValue) -> Self {
        self.create_parameter(name, value);
        self
    }

    /// Set the node kind
    pub fn with_kind(mut self, kind: NodeKind) -> Self {
        self.kind = kind;
        self
    }

    /// Attach a behavior object
    pub fn with_behavior(mut self, behavior: impl NodeBehavior + 'static) -> Self {
        self.behavior = Some(Box::new(behavior));
        self
    }

    /// Process-unique identifier
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Name, unique among siblings once inserted into a network
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Catalog type this node was constructed from (empty for ad-hoc nodes)
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Node kind
    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    /// Observer registry receiving this node's events
    pub fn observers(&self) -> &ObserverRegistry {
        &self.observers
    }

    /// Render target capability query
    pub fn as_render_target(&self) -> Option<&dyn RenderTarget> {
        self.behavior.as_deref().and_then(NodeBehavior::as_render_target)
    }

    // ------------------------------------------------------------------
    // Parameters
    // ------------------------------------------------------------------

    /// Create a parameter, returning the unique name it was stored under
    pub fn create_parameter(&mut self, name: &str, value: ParamValue) -> String {
        let name = unique_name(name, |candidate| self.params.contains_key(candidate));
        self.params.insert(name.clone(), value);
        name
    }

    /// Delete a parameter, returning its last value
    pub fn delete_parameter(&mut self, name: &str) -> Option<ParamValue> {
        self.params.shift_remove(name)
    }

    /// Get a parameter value
    pub fn parameter(&self, name: &str) -> Option<&ParamValue> {
        self.params.get(name)
    }

    /// Overwrite an existing parameter. Returns false for unknown names.
    pub fn set_parameter(&mut self, name: &str, value: ParamValue) -> bool {
        match self.params.get_mut(name) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    /// Parameters in creation order
    pub fn parameters(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.params.iter().map(|(name, value)| (name.as_str(), value))
    }

    // ------------------------------------------------------------------
    // Connectors
    // ------------------------------------------------------------------

    /// Get an input by ID
    pub fn input(&self, id: InputId) -> Option<&Input> {
        self.inputs.get(&id)
    }

    /// Find an input by name
    pub fn input_by_name(&self, name: &str) -> Option<&Input> {
        self.inputs.values().find(|i| i.name() == name)
    }

    /// Inputs in creation order
    pub fn inputs(&self) -> impl Iterator<Item = &Input> {
        self.inputs.values()
    }

    /// Number of inputs
    pub fn input_count(&self) -> usize {
        self.inputs.len()
    }

    /// Get an output by ID
    pub fn output(&self, id: OutputId) -> Option<&Output> {
        self.outputs.get(&id)
    }

    /// Find an output by name
    pub fn output_by_name(&self, name: &str) -> Option<&Output> {
        self.outputs.values().find(|o| o.name() == name)
    }

    /// Outputs in creation order
    pub fn outputs(&self) -> impl Iterator<Item = &Output> {
        self.outputs.values()
    }

    /// Number of outputs
    pub fn output_count(&self) -> usize {
        self.outputs.len()
    }

    pub(crate) fn insert_input(&mut self, name: &str) -> InputId {
        let name = unique_name(name, |candidate| self.input_by_name(candidate).is_some());
        let id = InputId(self.next_input);
        self.next_input += 1;
        self.inputs.insert(id, Input::new(id, name));
        id
    }

    pub(crate) fn remove_input(&mut self, id: InputId) -> Option<Input> {
        self.inputs.shift_remove(&id)
    }

    pub(crate) fn input_mut(&mut self, id: InputId) -> Option<&mut Input> {
        self.inputs.get_mut(&id)
    }

    pub(crate) fn inputs_mut(&mut self) -> impl Iterator<Item = &mut Input> {
        self.inputs.values_mut()
    }

    pub(crate) fn insert_output(&mut self, name: &str) -> OutputId {
        let name = unique_name(name, |candidate| self.output_by_name(candidate).is_some());
        let id = OutputId(self.next_output);
        self.next_output += 1;
        self.outputs.insert(id, Output::new(id, name));
        id
    }

    pub(crate) fn remove_output(&mut self, id: OutputId) -> Option<Output> {
        self.outputs.shift_remove(&id)
    }

    pub(crate) fn output_mut(&mut self, id: OutputId) -> Option<&mut Output> {
        self.outputs.get_mut(&id)
    }

    pub(crate) fn outputs_mut(&mut self) -> impl Iterator<Item = &mut Output> {
        self.outputs.values_mut()
    }

    pub(crate) fn set_name(&mut self, name: String) {
        self.name = name;
    }

    pub(crate) fn set_type(&mut self, type_name: &str, kind: NodeKind) {
        self.type_name = type_name.to_owned();
        self.kind = kind;
    }

    pub(crate) fn is_dying(&self) -> bool {
        self.dying
    }

    pub(crate) fn set_dying(&mut self) {
        self.dying = true;
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("type_name", &self.type_name)
            .field("kind", &self.kind)
            .field("inputs", &self.inputs.len())
            .field("outputs", &self.outputs.len())
            .field("observers", &self.observers.len())
            .finish()
    }
}

/// Return `base` if free, otherwise `base_1`, `base_2`, ... up to the first free name.
pub(crate) fn unique_name(base: &str, mut taken: impl FnMut(&str) -> bool) -> String {
    if !taken(base) {
        return base.to_owned();
    }
    let mut counter = 1u32;
    loop {
        let candidate = format!("{base}{NAME_SEPARATOR}{counter}");
        if !taken(&candidate) {
            return candidate;
        }
        counter += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Screen;

    impl RenderTarget for Screen {
        fn surface_size(&self) -> [u32; 2] {
            [1920, 1080]
        }
    }

    impl NodeBehavior for Screen {
        fn as_render_target(&self) -> Option<&dyn RenderTarget> {
            Some(self)
        }
    }

    struct Passive;

    impl NodeBehavior for Passive {}

    #[test]
    fn test_node_ids_are_unique() {
        let a = Node::new("a");
        let b = Node::new("a");
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_connector_names_are_unique() {
        let node = Node::new("blend")
            .with_input("in")
            .with_input("in")
            .with_input("in")
            .with_output("out")
            .with_output("out");

        let inputs: Vec<_> = node.inputs().map(Input::name).collect();
        assert_eq!(inputs, ["in", "in_1", "in_2"]);
        let outputs: Vec<_> = node.outputs().map(Output::name).collect();
        assert_eq!(outputs, ["out", "out_1"]);
    }

    #[test]
    fn test_connector_ids_are_not_reused() {
        let mut node = Node::new("n");
        let first = node.insert_input("a");
        node.remove_input(first);
        let second = node.insert_input("a");
        assert_ne!(first, second);
        assert_eq!(node.input_by_name("a").unwrap().id(), second);
    }

    #[test]
    fn test_parameter_bookkeeping() {
        let mut node = Node::new("blur");
        assert_eq!(node.create_parameter("radius", ParamValue::Float(2.0)), "radius");
        assert_eq!(node.create_parameter("radius", ParamValue::Float(4.0)), "radius_1");

        assert!(node.set_parameter("radius", ParamValue::Float(3.0)));
        assert!(!node.set_parameter("missing", ParamValue::Bool(true)));
        assert_eq!(node.parameter("radius"), Some(&ParamValue::Float(3.0)));

        assert_eq!(node.delete_parameter("radius_1"), Some(ParamValue::Float(4.0)));
        assert!(node.delete_parameter("radius_1").is_none());
        assert_eq!(node.parameters().count(), 1);
    }

    #[test]
    fn test_render_target_capability() {
        let screen = Node::new("screen").with_kind(NodeKind::Sink).with_behavior(Screen);
        assert_eq!(screen.as_render_target().unwrap().surface_size(), [1920, 1080]);

        let passive = Node::new("passive").with_behavior(Passive);
        assert!(passive.as_render_target().is_none());
        assert!(Node::new("bare").as_render_target().is_none());
    }

    #[test]
    fn test_unique_name_skips_taken_suffixes() {
        let taken = ["x", "x_1", "x_3"];
        let name = unique_name("x", |c| taken.contains(&c));
        assert_eq!(name, "x_2");
    }
}
