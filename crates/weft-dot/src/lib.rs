//! Visualization exporters for weft graphs.
//!
//! Walks the structural metadata every node handle exposes and renders it as
//! Graphviz DOT or a JSON summary. Purely structural: exporting a graph never
//! schedules any evaluation.

use std::collections::{BTreeMap, HashSet, VecDeque};

use serde::Serialize;
use serde_json::Value;
use weft_core::NodeRef;

#[derive(Debug, Clone, Serialize)]
struct GraphNode {
    id: u64,
    name: String,
    optional: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    subgraph: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
struct GraphEdge {
    from: u64,
    to: u64,
    label: String,
    kind: EdgeStyle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum EdgeStyle {
    Required,
    Optional,
    Sink,
}

#[derive(Debug, Clone, Serialize)]
struct GraphSummary {
    nodes: Vec<GraphNode>,
    edges: Vec<GraphEdge>,
}

/// Breadth-first walk over everything reachable from `roots` through input
/// and sink edges.
fn walk(roots: &[NodeRef]) -> GraphSummary {
    let mut pending: VecDeque<NodeRef> = roots.iter().cloned().collect();
    let mut seen: HashSet<u64> = HashSet::new();
    let mut nodes = Vec::new();
    let mut edges = Vec::new();

    while let Some(node) = pending.pop_front() {
        if !seen.insert(node.id()) {
            continue;
        }
        nodes.push(GraphNode {
            id: node.id(),
            name: node.name(),
            optional: node.is_optional(),
            subgraph: node.subgraph().map(|tag| tag.to_string()),
        });

        for input in node.structure().inputs() {
            edges.push(GraphEdge {
                from: input.node.id(),
                to: node.id(),
                label: input.label.clone(),
                kind: if input.shielded {
                    EdgeStyle::Optional
                } else {
                    EdgeStyle::Required
                },
            });
            pending.push_back(input.node.clone());
        }
        for sink in node.structure().sinks() {
            edges.push(GraphEdge {
                from: node.id(),
                to: sink.id(),
                label: "sink".to_string(),
                kind: EdgeStyle::Sink,
            });
            pending.push_back(sink);
        }
    }

    nodes.sort_by_key(|node| node.id);
    edges.sort_by(|a, b| (a.from, a.to, &a.label).cmp(&(b.from, b.to, &b.label)));
    GraphSummary { nodes, edges }
}

fn escape(label: &str) -> String {
    label.replace('"', "\\\"")
}

/// Emit a Graphviz DOT representation of everything reachable from `roots`.
///
/// Optional edges render dashed, sink edges dotted, and nodes exposed by a
/// subgraph are clustered under its name.
pub fn to_dot(roots: &[NodeRef]) -> String {
    let summary = walk(roots);

    let mut clusters: BTreeMap<String, Vec<&GraphNode>> = BTreeMap::new();
    let mut loose: Vec<&GraphNode> = Vec::new();
    for node in &summary.nodes {
        match &node.subgraph {
            Some(tag) => clusters.entry(tag.clone()).or_default().push(node),
            None => loose.push(node),
        }
    }

    let mut buffer = String::new();
    buffer.push_str("digraph weft {\n");
    buffer.push_str("    rankdir=BT;\n");
    buffer.push_str("    node [shape=box];\n");

    for node in loose {
        buffer.push_str(&format!(
            "    n{} [label=\"{}\"];\n",
            node.id,
            escape(&node.name)
        ));
    }
    for (index, (tag, members)) in clusters.iter().enumerate() {
        buffer.push_str(&format!("    subgraph cluster_{index} {{\n"));
        buffer.push_str(&format!("        label=\"{}\";\n", escape(tag)));
        for node in members {
            buffer.push_str(&format!(
                "        n{} [label=\"{}\"];\n",
                node.id,
                escape(&node.name)
            ));
        }
        buffer.push_str("    }\n");
    }

    for edge in &summary.edges {
        let style = match edge.kind {
            EdgeStyle::Required => "",
            EdgeStyle::Optional => ", style=dashed",
            EdgeStyle::Sink => ", style=dotted",
        };
        buffer.push_str(&format!(
            "    n{} -> n{} [label=\"{}\"{style}];\n",
            edge.from,
            edge.to,
            escape(&edge.label)
        ));
    }

    buffer.push_str("}\n");
    buffer
}

/// Serialise the reachable structure into a `serde_json::Value` for tooling.
pub fn to_json_value(roots: &[NodeRef]) -> Value {
    serde_json::to_value(walk(roots)).expect("graph summary serialisation should not fail")
}
