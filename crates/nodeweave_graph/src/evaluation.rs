// SPDX-License-Identifier: MIT OR Apache-2.0
//! Evaluation ordering.
//!
//! [`Network::sorted_children`] orders children so that every node comes after
//! the siblings it reads from. Each child's dependency list is built from its
//! resolved inputs; the lowest-index child whose list is empty is emitted and
//! erased from every other list, until all children are emitted. Emission
//! already runs producer-first, so the result is not reversed. If a full pass
//! finds no ready child the remaining children form or feed a cycle and the
//! sort fails with [`EvaluationError::CycleDetected`].

use crate::network::Network;
use crate::node::NodeKey;

/// Error during ordering or evaluation
#[derive(Debug, thiserror::Error)]
pub enum EvaluationError {
    /// The dependency graph contains a cycle
    #[error("Network contains a cycle through: {}", .nodes.join(", "))]
    CycleDetected {
        /// Names of the children that could not be ordered
        nodes: Vec<String>,
    },

    /// Node not found
    #[error("Node not found: {0:?}")]
    NodeNotFound(NodeKey),

    /// Custom error raised by an evaluator
    #[error("{0}")]
    Custom(String),
}

impl Network {
    /// Children ordered producers-first.
    ///
    /// Ties between ready children are broken by insertion order.
    pub fn sorted_children(&self) -> Result<Vec<NodeKey>, EvaluationError> {
        let mut pending: Vec<(NodeKey, Vec<NodeKey>)> = self
            .child_keys()
            .iter()
            .map(|&key| (key, self.dependencies(key)))
            .collect();
        let mut sorted = Vec::with_capacity(pending.len());

        while !pending.is_empty() {
            let Some(index) = pending.iter().position(|(_, deps)| deps.is_empty()) else {
                let nodes: Vec<String> = pending
                    .iter()
                    .filter_map(|(key, _)| self.child(*key).map(|n| n.name().to_owned()))
                    .collect();
                tracing::warn!(network = self.name(), ?nodes, "cycle detected");
                return Err(EvaluationError::CycleDetected { nodes });
            };
            let (ready, _) = pending.remove(index);
            for (_, deps) in &mut pending {
                deps.retain(|dep| *dep != ready);
            }
            sorted.push(ready);
        }

        Ok(sorted)
    }
}

/// Trait for evaluating nodes
pub trait NodeEvaluator {
    /// Evaluate one node. Upstream nodes have already been evaluated.
    fn evaluate(&mut self, network: &Network, node: NodeKey) -> Result<(), EvaluationError>;
}

/// A computed evaluation order for one network
#[derive(Debug, Clone)]
pub struct EvaluationOrder {
    nodes: Vec<NodeKey>,
}

impl EvaluationOrder {
    /// Compute the order for `network`
    pub fn new(network: &Network) -> Result<Self, EvaluationError> {
        Ok(Self {
            nodes: network.sorted_children()?,
        })
    }

    /// Nodes in evaluation order
    pub fn nodes(&self) -> &[NodeKey] {
        &self.nodes
    }

    /// Number of nodes
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the order is empty
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Position of a node in the order
    pub fn position(&self, node: NodeKey) -> Option<usize> {
        self.nodes.iter().position(|n| *n == node)
    }

    /// Run `evaluator` over every node, producers first.
    ///
    /// Stops at the first error. Fails with `NodeNotFound` if the network lost
    /// a node since the order was computed.
    pub fn run<E: NodeEvaluator>(
        &self,
        network: &Network,
        evaluator: &mut E,
    ) -> Result<(), EvaluationError> {
        for &node in &self.nodes {
            if !network.contains(node) {
                return Err(EvaluationError::NodeNotFound(node));
            }
            evaluator.evaluate(network, node)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Node;

    fn names(network: &Network, keys: &[NodeKey]) -> Vec<String> {
        keys.iter()
            .map(|k| network.child(*k).unwrap().name().to_owned())
            .collect()
    }

    fn filter(name: &str) -> Node {
        Node::new(name).with_input("in").with_output("out")
    }

    #[test]
    fn test_chain_is_producer_first() {
        let mut network = Network::new("root");
        // inserted consumer-first so insertion order alone would be wrong
        network.add_child(filter("C"));
        network.add_child(filter("B"));
        network.add_child(filter("A"));
        network.add_connection("A", "out", "B", "in");
        network.add_connection("B", "out", "C", "in");

        let order = network.sorted_children().unwrap();
        assert_eq!(names(&network, &order), ["A", "B", "C"]);
    }

    #[test]
    fn test_ties_use_insertion_order() {
        let mut network = Network::new("root");
        network.add_child(filter("X"));
        network.add_child(filter("Y"));
        network.add_child(filter("Z"));
        network.add_connection("Z", "out", "X", "in");

        let order = network.sorted_children().unwrap();
        assert_eq!(names(&network, &order), ["Y", "Z", "X"]);
    }

    #[test]
    fn test_diamond() {
        let mut network = Network::new("root");
        network.add_child(Node::new("Out").with_input("a").with_input("b"));
        network.add_child(filter("Left"));
        network.add_child(filter("Right"));
        network.add_child(Node::new("Src").with_output("out"));
        network.add_connection("Src", "out", "Left", "in");
        network.add_connection("Src", "out", "Right", "in");
        network.add_connection("Left", "out", "Out", "a");
        network.add_connection("Right", "out", "Out", "b");

        let order = EvaluationOrder::new(&network).unwrap();
        for (key, _) in network.children() {
            let at = order.position(key).unwrap();
            for dep in network.dependencies(key) {
                assert!(order.position(dep).unwrap() < at);
            }
        }
        assert_eq!(order.len(), 4);
    }

    #[test]
    fn test_two_cycle_is_detected() {
        let mut network = Network::new("root");
        network.add_child(filter("A"));
        network.add_child(filter("B"));
        network.add_child(filter("Free"));
        network.add_connection("B", "out", "A", "in");
        network.add_connection("A", "out", "B", "in");

        match network.sorted_children() {
            Err(EvaluationError::CycleDetected { nodes }) => assert_eq!(nodes, ["A", "B"]),
            other => panic!("expected a cycle, got {other:?}"),
        }
    }

    #[test]
    fn test_self_reference_does_not_block() {
        let mut network = Network::new("root");
        network.add_child(filter("Feedback"));
        assert!(network.add_connection("Feedback", "out", "Feedback", "in"));
        assert_eq!(network.sorted_children().unwrap().len(), 1);
    }

    #[test]
    fn test_empty_network() {
        let network = Network::new("root");
        assert!(EvaluationOrder::new(&network).unwrap().is_empty());
    }

    struct Recorder {
        visited: Vec<String>,
        fail_on: Option<&'static str>,
    }

    impl NodeEvaluator for Recorder {
        fn evaluate(&mut self, network: &Network, node: NodeKey) -> Result<(), EvaluationError> {
            let name = network.child(node).unwrap().name().to_owned();
            if self.fail_on == Some(name.as_str()) {
                return Err(EvaluationError::Custom(format!("{name} failed")));
            }
            self.visited.push(name);
            Ok(())
        }
    }

    #[test]
    fn test_run_visits_in_order_and_stops_on_error() {
        let mut network = Network::new("root");
        network.add_child(filter("B"));
        network.add_child(filter("A"));
        network.add_child(filter("C"));
        network.add_connection("A", "out", "B", "in");
        network.add_connection("B", "out", "C", "in");
        let order = EvaluationOrder::new(&network).unwrap();

        let mut ok = Recorder { visited: Vec::new(), fail_on: None };
        order.run(&network, &mut ok).unwrap();
        assert_eq!(ok.visited, ["A", "B", "C"]);

        let mut failing = Recorder { visited: Vec::new(), fail_on: Some("B") };
        let err = order.run(&network, &mut failing).unwrap_err();
        assert_eq!(err.to_string(), "B failed");
        assert_eq!(failing.visited, ["A"]);
    }

    #[test]
    fn test_run_after_node_deleted() {
        let mut network = Network::new("root");
        let a = network.add_child(filter("A"));
        let order = EvaluationOrder::new(&network).unwrap();
        network.delete_child(a);

        let mut recorder = Recorder { visited: Vec::new(), fail_on: None };
        assert!(matches!(
            order.run(&network, &mut recorder),
            Err(EvaluationError::NodeNotFound(key)) if key == a
        ));
    }
}
