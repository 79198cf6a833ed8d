// SPDX-License-Identifier: MIT OR Apache-2.0
//! Node graph dependency and lifecycle engine for `nodeweave`.
//!
//! This crate provides the structural core behind a visual node editor:
//! - Nodes with named inputs, outputs and parameters
//! - Symbolic connections resolved into live, reference-counted edges
//! - Reentrancy-safe observers notified of every structural mutation
//! - Evaluation ordering with cycle detection
//!
//! ## Architecture
//!
//! A [`Network`] owns its children in a slot map and hands out [`NodeKey`]
//! handles. Edges are stored as keys on both ends (the input caches a
//! [`ResolvedEdge`], the output lists its dependents), so deleting a node can
//! never leave a dangling reference. All graph mutations go through the
//! network and complete synchronously, observers included, before returning.
//! The engine is single-threaded; callers serialize access.

pub mod catalog;
pub mod connection;
pub mod evaluation;
pub mod network;
pub mod node;
pub mod observer;
pub mod port;
pub mod settings;

pub use catalog::{NodeCatalog, NodeFactory};
pub use connection::Connection;
pub use evaluation::{EvaluationError, EvaluationOrder, NodeEvaluator};
pub use network::Network;
pub use node::{Node, NodeBehavior, NodeId, NodeKey, NodeKind, ParamValue, RenderTarget};
pub use observer::{EventData, Observer, ObserverId, ObserverRegistry};
pub use port::{Input, InputId, Output, OutputId, ResolvedEdge, SourceRef};
pub use settings::{GraphSettings, SettingsError};
