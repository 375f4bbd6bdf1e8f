//! The execution graph: nodes, bounded edges and timed segments.
//!
//! The compiler lowers a parsed program into this arena-style
//! representation: entities live in flat vectors and refer to each other by
//! integer id, never by owning pointer. The runtime walks the same arenas
//! when wiring channels and spawning workers.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::CompileError;
use crate::registry::{FunctionKind, Params};

macro_rules! arena_id {
    ($(#[$doc:meta])* $name:ident, $prefix:literal) => {
        $(#[$doc])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub u32);

        impl $name {
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }
    };
}

arena_id!(
    /// Index of a node in [`Graph::nodes`].
    NodeId,
    "n"
);
arena_id!(
    /// Index of an edge in [`Graph::edges`].
    EdgeId,
    "e"
);
arena_id!(
    /// Index of a segment in [`Graph::segments`].
    SegmentId,
    "s"
);

/// One function invocation in the graph; runs as one worker.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: NodeId,
    /// Registered function name this node invokes.
    pub name: String,
    pub kind: FunctionKind,
    /// Parameters: registry defaults overlaid with the call's `with` clause.
    pub params: Params,
    pub inputs: Vec<EdgeId>,
    pub outputs: Vec<EdgeId>,
    /// Innermost enclosing timed segment, if any.
    pub segment: Option<SegmentId>,
}

/// A bounded channel connecting one producer to one consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge {
    pub id: EdgeId,
    pub producer: NodeId,
    pub consumer: NodeId,
    /// Queue depth; at least 1.
    pub capacity: usize,
}

/// A set of nodes sharing a wall-clock deadline from `@`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub id: SegmentId,
    pub deadline: Option<Duration>,
    pub members: Vec<NodeId>,
}

/// The compiled execution graph.
///
/// `stages` partitions the nodes into weakly-connected components in
/// program order; the supervisor runs them sequentially, which is what
/// makes `A @ 3s -> B @ 5s` a timed sequence rather than one big graph.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Graph {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    pub segments: Vec<Segment>,
    pub stages: Vec<Vec<NodeId>>,
    pub entry_sources: Vec<NodeId>,
    pub terminal_sinks: Vec<NodeId>,
}

impl Graph {
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    pub fn edge(&self, id: EdgeId) -> &Edge {
        &self.edges[id.index()]
    }

    pub fn segment(&self, id: SegmentId) -> &Segment {
        &self.segments[id.index()]
    }

    pub fn sources(&self) -> impl Iterator<Item = &Node> {
        self.nodes
            .iter()
            .filter(|n| n.kind == FunctionKind::Source)
    }

    pub fn sinks(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().filter(|n| n.kind == FunctionKind::Sink)
    }

    /// Checks the structural invariants the runtime relies on.
    ///
    /// Node-kind arity (sources take no input, sinks feed nothing,
    /// processors have both sides), edge capacities, edge/stage
    /// consistency, and the presence of at least one source and one sink.
    pub fn validate(&self) -> Result<(), CompileError> {
        if !self.nodes.iter().any(|n| n.kind == FunctionKind::Source) {
            return Err(CompileError::NoSource);
        }
        if !self.nodes.iter().any(|n| n.kind == FunctionKind::Sink) {
            return Err(CompileError::NoSink);
        }

        for node in &self.nodes {
            match node.kind {
                FunctionKind::Source => {
                    if !node.inputs.is_empty() {
                        return Err(self.kind_mismatch(node, "a source cannot take input"));
                    }
                    if node.outputs.is_empty() {
                        return Err(self.kind_mismatch(node, "source output is never consumed"));
                    }
                }
                FunctionKind::Processor => {
                    if node.inputs.is_empty() {
                        return Err(self.kind_mismatch(node, "processor receives no input"));
                    }
                    if node.outputs.is_empty() {
                        return Err(self.kind_mismatch(node, "processor output is never consumed"));
                    }
                }
                FunctionKind::Sink => {
                    if node.inputs.is_empty() {
                        return Err(self.kind_mismatch(node, "sink receives no input"));
                    }
                    if !node.outputs.is_empty() {
                        return Err(self.kind_mismatch(node, "a sink cannot feed a downstream stage"));
                    }
                }
            }
        }

        for edge in &self.edges {
            if edge.capacity < 1 {
                return Err(CompileError::KindMismatch {
                    node: self.node(edge.producer).name.clone(),
                    detail: format!("edge {} has zero capacity", edge.id),
                });
            }
            if self.stage_of(edge.producer) != self.stage_of(edge.consumer) {
                return Err(CompileError::KindMismatch {
                    node: self.node(edge.producer).name.clone(),
                    detail: format!("edge {} crosses a stage boundary", edge.id),
                });
            }
        }

        Ok(())
    }

    fn kind_mismatch(&self, node: &Node, detail: &str) -> CompileError {
        CompileError::KindMismatch {
            node: node.name.clone(),
            detail: detail.to_string(),
        }
    }

    /// Which sequential stage a node belongs to.
    pub fn stage_of(&self, id: NodeId) -> Option<usize> {
        self.stages
            .iter()
            .position(|stage| stage.contains(&id))
    }

    /// Renders the graph in Graphviz DOT form, for debugging and docs.
    pub fn dot(&self) -> String {
        let mut out = String::from("digraph pipeline {\n  rankdir=LR;\n");
        for segment in &self.segments {
            out.push_str(&format!("  subgraph cluster_{} {{\n", segment.id.0));
            if let Some(deadline) = segment.deadline {
                out.push_str(&format!(
                    "    label=\"@ {:.1}s\";\n    style=dashed;\n",
                    deadline.as_secs_f64()
                ));
            }
            for member in &segment.members {
                out.push_str(&format!("    {};\n", member));
            }
            out.push_str("  }\n");
        }
        for node in &self.nodes {
            out.push_str(&format!(
                "  {} [label=\"{}\\n({})\"];\n",
                node.id, node.name, node.kind
            ));
        }
        for edge in &self.edges {
            out.push_str(&format!(
                "  {} -> {} [label=\"cap {}\"];\n",
                edge.producer, edge.consumer, edge.capacity
            ));
        }
        out.push_str("}\n");
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: u32, kind: FunctionKind, inputs: Vec<u32>, outputs: Vec<u32>) -> Node {
        Node {
            id: NodeId(id),
            name: format!("f{}", id),
            kind,
            params: Params::new(),
            inputs: inputs.into_iter().map(EdgeId).collect(),
            outputs: outputs.into_iter().map(EdgeId).collect(),
            segment: None,
        }
    }

    fn linear_graph() -> Graph {
        Graph {
            nodes: vec![
                node(0, FunctionKind::Source, vec![], vec![0]),
                node(1, FunctionKind::Sink, vec![0], vec![]),
            ],
            edges: vec![Edge {
                id: EdgeId(0),
                producer: NodeId(0),
                consumer: NodeId(1),
                capacity: 10,
            }],
            segments: vec![],
            stages: vec![vec![NodeId(0), NodeId(1)]],
            entry_sources: vec![NodeId(0)],
            terminal_sinks: vec![NodeId(1)],
        }
    }

    #[test]
    fn valid_linear_graph_passes() {
        assert!(linear_graph().validate().is_ok());
    }

    #[test]
    fn source_with_input_is_rejected() {
        let mut graph = linear_graph();
        graph.nodes[0].inputs.push(EdgeId(0));
        assert!(matches!(
            graph.validate(),
            Err(CompileError::KindMismatch { .. })
        ));
    }

    #[test]
    fn missing_sink_is_rejected() {
        let mut graph = linear_graph();
        graph.nodes[1].kind = FunctionKind::Processor;
        assert_eq!(graph.validate(), Err(CompileError::NoSink));
    }

    #[test]
    fn ids_display_with_prefixes() {
        assert_eq!(NodeId(3).to_string(), "n3");
        assert_eq!(EdgeId(0).to_string(), "e0");
        assert_eq!(SegmentId(7).to_string(), "s7");
    }

    #[test]
    fn dot_output_names_every_node() {
        let dot = linear_graph().dot();
        assert!(dot.contains("n0 [label=\"f0\\n(source)\"]"));
        assert!(dot.contains("n0 -> n1 [label=\"cap 10\"]"));
    }
}
