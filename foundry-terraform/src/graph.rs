//! Dependency graph parser
//!
//! Parses the GraphViz text `terraform graph` emits. This is not a general
//! DOT parser: it extracts exactly what the converter needs, the quoted node
//! names with their `label` attributes and the directed edges between them.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

static EDGE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"^\s*"([^"]+)"\s*->\s*"([^"]+)""#).expect("edge regex"));
static NODE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"^\s*"([^"]+)"\s*\[(.*)\]"#).expect("node regex"));
static LABEL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"label\s*=\s*"([^"]*)""#).expect("label regex"));

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    #[error("not a digraph")]
    NotADigraph,
}

/// A node in the dependency graph
#[derive(Debug, Clone)]
pub struct Node {
    pub name: String,
    pub label: Option<String>,
}

/// A parsed dependency graph
#[derive(Debug, Default)]
pub struct Graph {
    nodes: HashMap<String, Node>,
    src_to_dsts: HashMap<String, Vec<String>>,
    dst_to_srcs: HashMap<String, Vec<String>>,
}

impl Graph {
    pub fn parse(raw: &str) -> Result<Self, GraphError> {
        if !raw.lines().any(|line| line.trim_start().starts_with("digraph")) {
            return Err(GraphError::NotADigraph);
        }

        let mut graph = Graph::default();
        for line in raw.lines() {
            if let Some(captures) = EDGE_RE.captures(line) {
                let src = captures[1].to_string();
                let dst = captures[2].to_string();
                graph.ensure_node(&src);
                graph.ensure_node(&dst);
                graph
                    .src_to_dsts
                    .entry(src.clone())
                    .or_default()
                    .push(dst.clone());
                graph.dst_to_srcs.entry(dst).or_default().push(src);
            } else if let Some(captures) = NODE_RE.captures(line) {
                let name = captures[1].to_string();
                let label = LABEL_RE
                    .captures(&captures[2])
                    .map(|label| label[1].to_string());
                graph.nodes.insert(name.clone(), Node { name, label });
            }
        }

        // Neighbor lists are sorted so traversal order is deterministic.
        for dsts in graph.src_to_dsts.values_mut() {
            dsts.sort();
        }
        for srcs in graph.dst_to_srcs.values_mut() {
            srcs.sort();
        }
        Ok(graph)
    }

    fn ensure_node(&mut self, name: &str) {
        self.nodes.entry(name.to_string()).or_insert_with(|| Node {
            name: name.to_string(),
            label: None,
        });
    }

    pub fn node(&self, name: &str) -> Option<&Node> {
        self.nodes.get(name)
    }

    /// Finds the node carrying the given label. When several nodes share a
    /// label the lexicographically smallest name wins, keeping lookups
    /// deterministic.
    pub fn node_by_label(&self, label: &str) -> Option<&Node> {
        self.nodes
            .values()
            .filter(|node| node.label.as_deref() == Some(label))
            .min_by(|a, b| a.name.cmp(&b.name))
    }

    /// Nodes this node points at: its dependencies.
    pub fn destinations_of(&self, name: &str) -> &[String] {
        self.src_to_dsts.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Nodes pointing at this node: its dependents.
    pub fn sources_of(&self, name: &str) -> &[String] {
        self.dst_to_srcs.get(name).map(Vec::as_slice).unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RAW: &str = r#"
digraph {
	compound = "true"
	newrank = "true"
	subgraph "root" {
		"[root] aws_instance.dev (expand)" [label = "aws_instance.dev", shape = "box"]
		"[root] coder_agent.dev (expand)" [label = "coder_agent.dev", shape = "box"]
		"[root] aws_instance.dev (expand)" -> "[root] coder_agent.dev (expand)"
	}
}
"#;

    #[test]
    fn parses_nodes_and_edges() {
        let graph = Graph::parse(RAW).unwrap();
        let agent = graph.node_by_label("coder_agent.dev").unwrap();
        assert_eq!(agent.name, "[root] coder_agent.dev (expand)");
        assert_eq!(
            graph.sources_of(&agent.name),
            ["[root] aws_instance.dev (expand)"]
        );
        assert!(graph.destinations_of(&agent.name).is_empty());
    }

    #[test]
    fn rejects_non_digraph_input() {
        assert_eq!(Graph::parse("graph {}").unwrap_err(), GraphError::NotADigraph);
        assert_eq!(Graph::parse("").unwrap_err(), GraphError::NotADigraph);
    }
}
