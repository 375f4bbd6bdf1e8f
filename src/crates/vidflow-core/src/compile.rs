//! Lowering from syntax trees to execution graphs.
//!
//! Compilation resolves named-pipeline references by inlining (with cycle
//! detection), resolves each remaining call against the function registry,
//! merges call parameters over the registry's declared defaults, and emits
//! nodes and bounded edges. Composition flattens structurally:
//!
//! - `A -> B` connects every terminal of `A` to every entry of `B` with one
//!   edge each. When `A` ends in a sink and `B` starts with a source there
//!   is nothing to connect; the two subgraphs become consecutive stages
//!   that the runtime executes back to back.
//! - `(A | B) -> C` makes `C` the merge consumer: every branch terminal
//!   gains an edge straight into `C`. A parallel block whose terminals are
//!   never consumed is a compile error.
//! - `E @ 3s` allocates a segment over the nodes emitted for `E`; nested
//!   bounds keep the innermost segment per node.
//!
//! Syntax trees are dropped after lowering; only the [`Graph`] survives.

use std::collections::HashMap;
use std::time::Duration;

use tracing::warn;
use vidflow_lang::{ChannelClass, Expr, Literal, Program};

use crate::error::CompileError;
use crate::graph::{Edge, EdgeId, Graph, Node, NodeId, Segment, SegmentId};
use crate::registry::{FunctionKind, FunctionRegistry};

/// Capacities the compiler assigns to edges.
#[derive(Debug, Clone)]
pub struct CompileOptions {
    /// Queue depth for `->` edges.
    pub default_edge_capacity: usize,
    /// Queue depth for `~>` edges.
    pub async_edge_capacity: usize,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            default_edge_capacity: 10,
            async_edge_capacity: 20,
        }
    }
}

/// Lowers a program with default options.
pub fn compile(program: &Program, registry: &FunctionRegistry) -> Result<Graph, CompileError> {
    compile_with_options(program, registry, &CompileOptions::default())
}

/// Lowers a program into an execution graph.
pub fn compile_with_options(
    program: &Program,
    registry: &FunctionRegistry,
    options: &CompileOptions,
) -> Result<Graph, CompileError> {
    // A program with nothing to execute (empty, or definitions only) has no
    // source to run.
    let body = program.body.as_ref().ok_or(CompileError::NoSource)?;

    let mut defs: HashMap<&str, &Expr> = HashMap::new();
    for def in &program.defs {
        // Later definitions shadow earlier ones.
        defs.insert(def.name.as_str(), &def.body);
    }

    let mut lowering = Lowering {
        registry,
        options,
        defs,
        expanding: Vec::new(),
        nodes: Vec::new(),
        edges: Vec::new(),
        segments: Vec::new(),
        par_terminals: Vec::new(),
        stage_breaks: Vec::new(),
    };
    lowering.lower(body)?;
    lowering.apply_buffer_overrides();
    lowering.check_dangling_parallel()?;
    lowering.finish()
}

/// A lowered subexpression: the nodes it created, the nodes still awaiting
/// an input edge, and the nodes whose output is still unconsumed.
struct Sub {
    nodes: Vec<NodeId>,
    entries: Vec<NodeId>,
    terminals: Vec<NodeId>,
}

struct Lowering<'a> {
    registry: &'a FunctionRegistry,
    options: &'a CompileOptions,
    defs: HashMap<&'a str, &'a Expr>,
    /// Names currently being inlined, for cycle detection.
    expanding: Vec<&'a str>,
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    segments: Vec<Segment>,
    /// Terminals of every lowered `Par`; unconsumed non-sinks here are a
    /// dangling parallel rather than a generic kind mismatch.
    par_terminals: Vec<NodeId>,
    /// First node id of each stage after the first.
    stage_breaks: Vec<usize>,
}

impl<'a> Lowering<'a> {
    fn lower(&mut self, expr: &'a Expr) -> Result<Sub, CompileError> {
        match expr {
            Expr::Group { inner } => self.lower(inner),
            Expr::Call { name, params } => self.lower_call(name, params),
            Expr::Seq {
                left,
                right,
                channel,
            } => {
                let l = self.lower(left)?;
                let first_right = self.nodes.len();
                let r = self.lower(right)?;

                if !l.terminals.is_empty() && !r.entries.is_empty() {
                    let capacity = match channel {
                        ChannelClass::Sync => self.options.default_edge_capacity,
                        ChannelClass::Buffered => self.options.async_edge_capacity,
                    };
                    for &producer in &l.terminals {
                        for &consumer in &r.entries {
                            self.add_edge(producer, consumer, capacity);
                        }
                    }
                } else if l.terminals.is_empty() && r.entries.is_empty() {
                    // Sink tail meets source head: no data edge, the right
                    // side starts a new sequential stage.
                    self.stage_breaks.push(first_right);
                }
                // The remaining combinations leave dangling ends that
                // validation reports as kind mismatches.

                let mut nodes = l.nodes;
                nodes.extend(r.nodes);
                Ok(Sub {
                    nodes,
                    entries: l.entries,
                    terminals: r.terminals,
                })
            }
            Expr::Par { branches } => {
                let mut nodes = Vec::new();
                let mut entries = Vec::new();
                let mut terminals = Vec::new();
                for branch in branches {
                    let sub = self.lower(branch)?;
                    nodes.extend(sub.nodes);
                    entries.extend(sub.entries);
                    terminals.extend(sub.terminals);
                }
                self.par_terminals.extend(terminals.iter().copied());
                Ok(Sub {
                    nodes,
                    entries,
                    terminals,
                })
            }
            Expr::Timed { inner, seconds } => {
                let sub = self.lower(inner)?;
                let id = SegmentId(self.segments.len() as u32);
                let mut members = Vec::new();
                for &node_id in &sub.nodes {
                    let node = &mut self.nodes[node_id.index()];
                    // Inner bounds were lowered first; a node keeps its
                    // innermost segment.
                    if node.segment.is_none() {
                        node.segment = Some(id);
                        members.push(node_id);
                    }
                }
                self.segments.push(Segment {
                    id,
                    deadline: Some(Duration::from_secs_f64(*seconds)),
                    members,
                });
                Ok(sub)
            }
        }
    }

    fn lower_call(
        &mut self,
        name: &'a str,
        params: &[(String, Literal)],
    ) -> Result<Sub, CompileError> {
        // Pipeline definitions shadow registry functions of the same name.
        if let Some(&body) = self.defs.get(name) {
            if self.expanding.contains(&name) {
                return Err(CompileError::Cycle {
                    name: name.to_string(),
                });
            }
            if !params.is_empty() {
                warn!(pipeline = name, "parameters on a pipeline reference are ignored");
            }
            self.expanding.push(name);
            let sub = self.lower(body)?;
            self.expanding.pop();
            return Ok(sub);
        }

        let spec = self
            .registry
            .get(name)
            .ok_or_else(|| CompileError::UnknownName {
                name: name.to_string(),
            })?;

        let mut merged = spec.defaults.clone();
        for (key, value) in params {
            if !spec.defaults.contains_key(key) && key != "buffer" && key != "window_name" {
                warn!(function = name, param = %key, "unknown parameter, forwarded verbatim");
            }
            merged.insert(key.clone(), value.to_value());
        }

        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node {
            id,
            name: name.to_string(),
            kind: spec.kind,
            params: merged,
            inputs: Vec::new(),
            outputs: Vec::new(),
            segment: None,
        });

        let (entries, terminals) = match spec.kind {
            FunctionKind::Source => (Vec::new(), vec![id]),
            FunctionKind::Processor => (vec![id], vec![id]),
            FunctionKind::Sink => (vec![id], Vec::new()),
        };
        Ok(Sub {
            nodes: vec![id],
            entries,
            terminals,
        })
    }

    fn add_edge(&mut self, producer: NodeId, consumer: NodeId, capacity: usize) {
        let id = EdgeId(self.edges.len() as u32);
        self.edges.push(Edge {
            id,
            producer,
            consumer,
            capacity,
        });
        self.nodes[producer.index()].outputs.push(id);
        self.nodes[consumer.index()].inputs.push(id);
    }

    /// A positive integer `buffer` parameter overrides the capacity of the
    /// edges consuming a node's output (or feeding it, for sinks).
    fn apply_buffer_overrides(&mut self) {
        for index in 0..self.nodes.len() {
            let Some(value) = self.nodes[index].params.get("buffer") else {
                continue;
            };
            let Some(capacity) = value.as_u64().filter(|&n| n >= 1) else {
                warn!(
                    node = %self.nodes[index].name,
                    value = %value,
                    "ignoring buffer override that is not a positive integer"
                );
                continue;
            };
            let edges: Vec<EdgeId> = if self.nodes[index].kind == FunctionKind::Sink {
                self.nodes[index].inputs.clone()
            } else {
                self.nodes[index].outputs.clone()
            };
            for edge in edges {
                self.edges[edge.index()].capacity = capacity as usize;
            }
        }
    }

    fn check_dangling_parallel(&self) -> Result<(), CompileError> {
        for &id in &self.par_terminals {
            let node = &self.nodes[id.index()];
            if node.kind != FunctionKind::Sink && node.outputs.is_empty() {
                return Err(CompileError::DanglingParallel);
            }
        }
        Ok(())
    }

    fn finish(self) -> Result<Graph, CompileError> {
        let mut stages = Vec::new();
        let mut current = Vec::new();
        let mut breaks = self.stage_breaks.iter().copied().peekable();
        for node in &self.nodes {
            if breaks.peek() == Some(&node.id.index()) {
                breaks.next();
                stages.push(std::mem::take(&mut current));
            }
            current.push(node.id);
        }
        if !current.is_empty() {
            stages.push(current);
        }

        let entry_sources = self
            .nodes
            .iter()
            .filter(|n| n.kind == FunctionKind::Source)
            .map(|n| n.id)
            .collect();
        let terminal_sinks = self
            .nodes
            .iter()
            .filter(|n| n.kind == FunctionKind::Sink)
            .map(|n| n.id)
            .collect();

        let graph = Graph {
            nodes: self.nodes,
            edges: self.edges,
            segments: self.segments,
            stages,
            entry_sources,
            terminal_sinks,
        };
        graph.validate()?;
        Ok(graph)
    }
}
