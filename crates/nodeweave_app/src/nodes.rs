// SPDX-License-Identifier: MIT OR Apache-2.0
//! Built-in node types registered by the console host.

use nodeweave_graph::{Node, NodeBehavior, NodeCatalog, NodeKind, ParamValue, RenderTarget};

/// Default viewer surface size
const VIEWER_SIZE: [u32; 2] = [1280, 720];

/// Behavior of the `viewer` sink: a fixed-size render surface
#[derive(Debug, Clone, Copy)]
pub struct Viewer {
    size: [u32; 2],
}

impl RenderTarget for Viewer {
    fn surface_size(&self) -> [u32; 2] {
        self.size
    }
}

impl NodeBehavior for Viewer {
    fn as_render_target(&self) -> Option<&dyn RenderTarget> {
        Some(self)
    }
}

/// Catalog with the image nodes the demo graph is built from
pub fn builtin_catalog() -> NodeCatalog {
    let mut catalog = NodeCatalog::new();

    catalog.register("noise", NodeKind::Generator, |name| {
        Node::new(name)
            .with_output("image")
            .with_parameter("seed", ParamValue::Int(0))
            .with_parameter("scale", ParamValue::Float(1.0))
    });
    catalog.register("blur", NodeKind::Filter, |name| {
        Node::new(name)
            .with_input("in")
            .with_output("out")
            .with_parameter("radius", ParamValue::Float(2.0))
    });
    catalog.register("composite", NodeKind::Filter, |name| {
        Node::new(name)
            .with_input("a")
            .with_input("b")
            .with_output("out")
            .with_parameter("mix", ParamValue::Float(0.5))
    });
    catalog.register("viewer", NodeKind::Sink, |name| {
        Node::new(name)
            .with_input("in")
            .with_parameter("background", ParamValue::Color([0.0, 0.0, 0.0, 1.0]))
            .with_behavior(Viewer { size: VIEWER_SIZE })
    });

    catalog
}
