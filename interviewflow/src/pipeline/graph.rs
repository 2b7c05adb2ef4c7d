//! Graph definition and validation.

use super::{Node, PipelineState};
use crate::errors::PipelineError;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// A validated pipeline graph.
///
/// Static edges always point forward in declaration order. Backward moves
/// happen only through routing directives from nodes declared as loop gates.
pub struct PipelineGraph<S: PipelineState> {
    name: String,
    nodes: Vec<Arc<dyn Node<S>>>,
    index: HashMap<String, usize>,
    edges: HashMap<String, String>,
    start: String,
    terminals: HashSet<String>,
    recovery: Option<String>,
    backward: HashMap<String, HashSet<String>>,
}

impl<S: PipelineState> PipelineGraph<S> {
    /// Pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Start node.
    #[must_use]
    pub fn start(&self) -> &str {
        &self.start
    }

    /// Node names in declaration order.
    #[must_use]
    pub fn node_names(&self) -> Vec<&str> {
        self.nodes.iter().map(|n| n.name()).collect()
    }

    /// Looks up a node.
    #[must_use]
    pub fn node(&self, name: &str) -> Option<&Arc<dyn Node<S>>> {
        self.index.get(name).map(|i| &self.nodes[*i])
    }

    /// Returns true if `name` ends the run.
    #[must_use]
    pub fn is_terminal(&self, name: &str) -> bool {
        self.terminals.contains(name)
    }

    /// Static successor of `name`.
    #[must_use]
    pub fn edge(&self, name: &str) -> Option<&str> {
        self.edges.get(name).map(String::as_str)
    }

    /// Where a failure in `name` is routed, if anywhere.
    ///
    /// Terminal nodes and the recovery node itself have no recovery route.
    #[must_use]
    pub fn recovery_for(&self, name: &str) -> Option<&str> {
        self.recovery
            .as_deref()
            .filter(|r| *r != name && !self.is_terminal(name))
    }

    /// Checks a routing directive from `from` to `target`.
    pub fn check_route(&self, from: &str, target: &str) -> Result<(), PipelineError> {
        let (Some(from_idx), Some(target_idx)) = (self.index.get(from), self.index.get(target)) else {
            return Err(PipelineError::UnknownNode {
                from: from.to_string(),
                target: target.to_string(),
            });
        };
        let permitted = self
            .backward
            .get(from)
            .is_some_and(|targets| targets.contains(target));
        if target_idx <= from_idx && !permitted {
            return Err(PipelineError::IllegalBackwardRoute {
                from: from.to_string(),
                target: target.to_string(),
            });
        }
        Ok(())
    }
}

impl<S: PipelineState> std::fmt::Debug for PipelineGraph<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineGraph")
            .field("name", &self.name)
            .field("nodes", &self.node_names())
            .field("edges", &self.edges)
            .field("start", &self.start)
            .field("terminals", &self.terminals)
            .field("recovery", &self.recovery)
            .finish()
    }
}

/// Builder for [`PipelineGraph`].
pub struct GraphBuilder<S: PipelineState> {
    name: String,
    nodes: Vec<Arc<dyn Node<S>>>,
    edges: Vec<(String, String)>,
    start: Option<String>,
    terminals: Vec<String>,
    recovery: Option<String>,
    backward: Vec<(String, String)>,
}

impl<S: PipelineState> GraphBuilder<S> {
    /// Creates an empty builder.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nodes: Vec::new(),
            edges: Vec::new(),
            start: None,
            terminals: Vec::new(),
            recovery: None,
            backward: Vec::new(),
        }
    }

    /// Declares a node. Declaration order defines what "forward" means.
    #[must_use]
    pub fn node(mut self, node: impl Node<S> + 'static) -> Self {
        self.nodes.push(Arc::new(node));
        self
    }

    /// Declares a shared node.
    #[must_use]
    pub fn shared_node(mut self, node: Arc<dyn Node<S>>) -> Self {
        self.nodes.push(node);
        self
    }

    /// Adds a static edge.
    #[must_use]
    pub fn edge(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.edges.push((from.into(), to.into()));
        self
    }

    /// Sets the start node.
    #[must_use]
    pub fn start(mut self, name: impl Into<String>) -> Self {
        self.start = Some(name.into());
        self
    }

    /// Marks a terminal node.
    #[must_use]
    pub fn terminal(mut self, name: impl Into<String>) -> Self {
        self.terminals.push(name.into());
        self
    }

    /// Sets the node that failures are routed to.
    #[must_use]
    pub fn recovery(mut self, name: impl Into<String>) -> Self {
        self.recovery = Some(name.into());
        self
    }

    /// Lets `gate` route backward to `target`.
    #[must_use]
    pub fn allow_backward(mut self, gate: impl Into<String>, target: impl Into<String>) -> Self {
        self.backward.push((gate.into(), target.into()));
        self
    }

    /// Validates and builds the graph.
    pub fn build(self) -> Result<PipelineGraph<S>, PipelineError> {
        let invalid = |msg: String| Err(PipelineError::InvalidGraph(msg));

        if self.nodes.is_empty() {
            return invalid(format!("pipeline '{}' has no nodes", self.name));
        }
        let mut index = HashMap::new();
        for (i, node) in self.nodes.iter().enumerate() {
            if index.insert(node.name().to_string(), i).is_some() {
                return invalid(format!("duplicate node '{}'", node.name()));
            }
        }
        let known = |name: &str| index.contains_key(name);

        let Some(start) = self.start else {
            return invalid("no start node".to_string());
        };
        if !known(start.as_str()) {
            return invalid(format!("start node '{start}' is not declared"));
        }
        if self.terminals.is_empty() {
            return invalid("no terminal node".to_string());
        }
        if let Some(missing) = self.terminals.iter().find(|t| !known(t.as_str())) {
            return invalid(format!("terminal node '{missing}' is not declared"));
        }
        if let Some(recovery) = self.recovery.as_deref().filter(|r| !known(*r)) {
            return invalid(format!("recovery node '{recovery}' is not declared"));
        }

        let mut edges = HashMap::new();
        for (from, to) in self.edges {
            if !known(from.as_str()) || !known(to.as_str()) {
                return invalid(format!("edge '{from}' -> '{to}' references an undeclared node"));
            }
            if index[&to] <= index[&from] {
                return invalid(format!("edge '{from}' -> '{to}' points backward"));
            }
            if edges.insert(from.clone(), to).is_some() {
                return invalid(format!("node '{from}' has more than one static edge"));
            }
        }

        let mut backward: HashMap<String, HashSet<String>> = HashMap::new();
        for (gate, target) in self.backward {
            if !known(gate.as_str()) || !known(target.as_str()) {
                return invalid(format!("loop '{gate}' -> '{target}' references an undeclared node"));
            }
            backward.entry(gate).or_default().insert(target);
        }

        let terminals: HashSet<String> = self.terminals.into_iter().collect();
        for node in &self.nodes {
            let name = node.name();
            if !terminals.contains(name) && !edges.contains_key(name) && !backward.contains_key(name) {
                return invalid(format!("node '{name}' has no outgoing edge"));
            }
        }

        Ok(PipelineGraph {
            name: self.name,
            nodes: self.nodes,
            index,
            edges,
            start,
            terminals,
            recovery: self.recovery,
            backward,
        })
    }
}
