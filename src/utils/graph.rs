//! Minimal directed graph with typed node identifiers.
//!
//! Nodes are stored densely and addressed by [`NodeId`]; edges carry a payload and are kept
//! in insertion order, so every traversal is deterministic. The control-flow graph is built
//! on top of this.

use std::fmt;

use crate::{Error, Result};

/// A strongly-typed index of a node within a [`DirectedGraph`].
///
/// Node ids are assigned sequentially from 0 in insertion order and can be used directly to
/// index per-node vectors.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    /// Creates a node id from a raw index.
    #[must_use]
    #[inline]
    pub const fn new(index: usize) -> Self {
        NodeId(index)
    }

    /// Returns the raw index.
    #[must_use]
    #[inline]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "B{}", self.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "B{}", self.0)
    }
}

#[derive(Debug, Clone)]
struct EdgeData<E> {
    source: NodeId,
    target: NodeId,
    data: E,
}

/// A directed graph with node payload `N` and edge payload `E`.
#[derive(Debug, Clone)]
pub struct DirectedGraph<N, E> {
    nodes: Vec<N>,
    edges: Vec<EdgeData<E>>,
    outgoing: Vec<Vec<usize>>,
    incoming: Vec<Vec<usize>>,
}

impl<N, E> Default for DirectedGraph<N, E> {
    fn default() -> Self {
        DirectedGraph {
            nodes: Vec::new(),
            edges: Vec::new(),
            outgoing: Vec::new(),
            incoming: Vec::new(),
        }
    }
}

impl<N, E> DirectedGraph<N, E> {
    /// Creates an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a node and returns its id.
    pub fn add_node(&mut self, data: N) -> NodeId {
        let id = NodeId::new(self.nodes.len());
        self.nodes.push(data);
        self.outgoing.push(Vec::new());
        self.incoming.push(Vec::new());
        id
    }

    /// Adds an edge.
    ///
    /// A second edge between the same pair of nodes is ignored, so predecessor and
    /// successor lists never contain duplicates. Returns `true` if the edge was added.
    ///
    /// # Errors
    ///
    /// Returns [`Error::GraphError`] if either endpoint is not a node of this graph.
    pub fn add_edge(&mut self, source: NodeId, target: NodeId, data: E) -> Result<bool> {
        for (role, node) in [("source", source), ("target", target)] {
            if node.index() >= self.nodes.len() {
                return Err(Error::GraphError(format!(
                    "{role} node {node} does not exist in graph with {} nodes",
                    self.nodes.len()
                )));
            }
        }

        if self.successors(source).any(|s| s == target) {
            return Ok(false);
        }

        let index = self.edges.len();
        self.edges.push(EdgeData {
            source,
            target,
            data,
        });
        self.outgoing[source.index()].push(index);
        self.incoming[target.index()].push(index);
        Ok(true)
    }

    /// Node payload.
    #[must_use]
    pub fn node(&self, node: NodeId) -> Option<&N> {
        self.nodes.get(node.index())
    }

    /// All nodes in id order.
    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &N)> + '_ {
        self.nodes.iter().enumerate().map(|(i, n)| (NodeId::new(i), n))
    }

    /// Number of nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of edges.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Successors of `node` in edge insertion order.
    pub fn successors(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.outgoing
            .get(node.index())
            .into_iter()
            .flatten()
            .map(|&e| self.edges[e].target)
    }

    /// Predecessors of `node` in edge insertion order.
    pub fn predecessors(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.incoming
            .get(node.index())
            .into_iter()
            .flatten()
            .map(|&e| self.edges[e].source)
    }

    /// Outgoing edges of `node` with their payloads.
    pub fn outgoing_edges(&self, node: NodeId) -> impl Iterator<Item = (NodeId, &E)> + '_ {
        self.outgoing
            .get(node.index())
            .into_iter()
            .flatten()
            .map(|&e| (self.edges[e].target, &self.edges[e].data))
    }

    /// Nodes reachable from `start` in reverse postorder.
    ///
    /// Iterative depth-first search; successors are explored in insertion order.
    #[must_use]
    pub fn reverse_postorder(&self, start: NodeId) -> Vec<NodeId> {
        let mut visited = vec![false; self.nodes.len()];
        let mut order = Vec::with_capacity(self.nodes.len());
        if start.index() >= self.nodes.len() {
            return order;
        }

        // (node, next successor position)
        let mut stack = vec![(start, 0usize)];
        visited[start.index()] = true;
        while let Some((node, position)) = stack.last_mut() {
            let node = *node;
            let outgoing = &self.outgoing[node.index()];
            if let Some(&edge) = outgoing.get(*position) {
                *position += 1;
                let next = self.edges[edge].target;
                if !visited[next.index()] {
                    visited[next.index()] = true;
                    stack.push((next, 0));
                }
            } else {
                order.push(node);
                stack.pop();
            }
        }

        order.reverse();
        order
    }
}
