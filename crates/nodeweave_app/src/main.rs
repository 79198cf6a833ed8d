// SPDX-License-Identifier: MIT OR Apache-2.0
//! `nodeweave` - console host for the node graph engine
//!
//! Builds a small image-processing network from the built-in catalog, traces
//! every structural event, prints the evaluation order and then deletes a node
//! to show how edges are severed.
//!
//! Usage: `nodeweave [SETTINGS.ron]`

mod evaluator;
mod nodes;

use std::path::Path;

use evaluator::TraceEvaluator;
use nodeweave_graph::{EvaluationOrder, EventData, GraphSettings, Network, Node, Observer};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Directives used when `RUST_LOG` is not set
const DEFAULT_FILTER: &str = "nodeweave=info,nodeweave_graph=debug";

fn main() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting nodeweave v{}", env!("CARGO_PKG_VERSION"));

    if let Err(e) = run(std::env::args().nth(1).as_deref()) {
        tracing::error!("nodeweave failed: {e}");
        std::process::exit(1);
    }
}

fn run(settings_path: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
    let settings = match settings_path {
        Some(path) => GraphSettings::load(Path::new(path))?,
        None => GraphSettings::default(),
    };
    tracing::debug!(?settings, "settings loaded");

    let catalog = nodes::builtin_catalog();
    let mut network = Network::with_settings("demo", settings);
    let _events = log_events(&network);

    let noise = network.create_child(&catalog, "noise", "Noise");
    network.create_child(&catalog, "blur", "Blur");
    network.create_child(&catalog, "blur", "Blur");
    network.create_child(&catalog, "composite", "Mix");
    network.create_child(&catalog, "viewer", "View");

    network.add_connection("Noise", "image", "Blur", "in");
    network.add_connection("Noise", "image", "Blur_1", "in");
    network.add_connection("Blur", "out", "Mix", "a");
    network.add_connection("Blur_1", "out", "Mix", "b");
    network.add_connection("Mix", "out", "View", "in");

    for key in network.render_targets() {
        if let Some(target) = network.child(key).and_then(Node::as_render_target) {
            let [width, height] = target.surface_size();
            tracing::info!(width, height, "render target");
        }
    }

    evaluate(&network)?;

    if let Some(noise) = noise {
        network.delete_child(noise);
    }
    tracing::info!(
        children = network.child_count(),
        connections = network.connections().len(),
        "after deleting the generator"
    );
    evaluate(&network)?;

    Ok(())
}

fn evaluate(network: &Network) -> Result<(), Box<dyn std::error::Error>> {
    let order = EvaluationOrder::new(network)?;
    let names: Vec<&str> = order
        .nodes()
        .iter()
        .filter_map(|key| network.child(*key).map(Node::name))
        .collect();
    tracing::info!(order = %names.join(" -> "), "evaluation order");

    let mut evaluator = TraceEvaluator::default();
    order.run(network, &mut evaluator)?;
    tracing::debug!(evaluated = evaluator.visited().len(), "evaluation finished");
    Ok(())
}

fn log_events(network: &Network) -> Observer {
    network.observe_network(|network, event| match *event {
        EventData::ChildAdded { child } | EventData::ChildRemoved { child } => {
            let name = network.child(child).map_or("?", Node::name);
            tracing::info!(event = ?event, child = name, "network changed");
        }
        EventData::ConnectionAdded(c) | EventData::ConnectionRemoved(c) => {
            let source = network.child(c.source).map_or("?", Node::name);
            let dest = network.child(c.dest).map_or("?", Node::name);
            let added = matches!(event, EventData::ConnectionAdded(_));
            tracing::info!(source, dest, added, "connection");
        }
        _ => {}
    })
}
