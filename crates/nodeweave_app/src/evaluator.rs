// SPDX-License-Identifier: MIT OR Apache-2.0
//! Evaluator that traces each node and the edges it reads from.

use nodeweave_graph::{EvaluationError, Input, Network, Node, NodeEvaluator, NodeKey, Output};

/// Logs every evaluated node and keeps the visit order
#[derive(Debug, Default)]
pub struct TraceEvaluator {
    visited: Vec<String>,
}

impl TraceEvaluator {
    /// Names of the nodes evaluated so far, in order
    pub fn visited(&self) -> &[String] {
        &self.visited
    }
}

impl NodeEvaluator for TraceEvaluator {
    fn evaluate(&mut self, network: &Network, node: NodeKey) -> Result<(), EvaluationError> {
        let child = network
            .child(node)
            .ok_or(EvaluationError::NodeNotFound(node))?;

        for (input, edge) in network.upstream(node) {
            let input = child.input(input).map_or("?", Input::name);
            let source = network.child(edge.node);
            let output = source
                .and_then(|s| s.output(edge.output))
                .map_or("?", Output::name);
            tracing::info!(
                node = child.name(),
                input,
                source = source.map_or("?", Node::name),
                output,
                "reads"
            );
        }
        tracing::info!(node = child.name(), kind = ?child.kind(), "evaluated");

        self.visited.push(child.name().to_owned());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nodes::builtin_catalog;
    use nodeweave_graph::EvaluationOrder;

    #[test]
    fn test_trace_follows_dependencies() {
        let catalog = builtin_catalog();
        let mut network = Network::new("demo");
        network.create_child(&catalog, "viewer", "View").unwrap();
        network.create_child(&catalog, "blur", "Blur").unwrap();
        network.create_child(&catalog, "noise", "Noise").unwrap();
        network.add_connection("Noise", "image", "Blur", "in");
        network.add_connection("Blur", "out", "View", "in");

        let mut evaluator = TraceEvaluator::default();
        EvaluationOrder::new(&network)
            .unwrap()
            .run(&network, &mut evaluator)
            .unwrap();
        assert_eq!(evaluator.visited(), ["Noise", "Blur", "View"]);
    }
}
