// src/dag/graph.rs

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::hash::Hash;

use crate::errors::{Result, TaskGraphError};

/// Opaque graph vertex. Equality and hashing are those of the wrapped value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Vertex<V>(V);

impl<V> Vertex<V> {
    pub fn new(value: V) -> Self {
        Vertex(value)
    }

    pub fn value(&self) -> &V {
        &self.0
    }

    pub fn into_value(self) -> V {
        self.0
    }
}

impl<V: fmt::Display> fmt::Display for Vertex<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Ordered pair `from -> to`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Edge<V> {
    from: Vertex<V>,
    to: Vertex<V>,
}

impl<V> Edge<V> {
    pub fn new(from: Vertex<V>, to: Vertex<V>) -> Self {
        Self { from, to }
    }

    pub fn from(&self) -> &Vertex<V> {
        &self.from
    }

    pub fn to(&self) -> &Vertex<V> {
        &self.to
    }
}

/// Adjacency record for one vertex.
#[derive(Debug, Clone)]
struct Node<V> {
    incoming: HashSet<Edge<V>>,
    outgoing: HashSet<Edge<V>>,
}

impl<V> Default for Node<V> {
    fn default() -> Self {
        Self {
            incoming: HashSet::new(),
            outgoing: HashSet::new(),
        }
    }
}

/// Mutable directed graph over opaque values.
///
/// Every edge stored in a node's incoming/outgoing set has a node on its
/// other endpoint; removing a vertex removes every incident edge from both
/// sides. The graph itself may contain cycles; [`Graph::has_cycle`] tells.
#[derive(Debug, Clone)]
pub struct Graph<V: Eq + Hash> {
    nodes: HashMap<Vertex<V>, Node<V>>,
}

impl<V: Eq + Hash> Default for Graph<V> {
    fn default() -> Self {
        Self {
            nodes: HashMap::new(),
        }
    }
}

impl<V> Graph<V>
where
    V: Clone + Eq + Hash + fmt::Debug,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a vertex; adding an existing vertex is a no-op.
    pub fn add_vertex(&mut self, vertex: Vertex<V>) {
        self.nodes.entry(vertex).or_default();
    }

    /// Remove a vertex and every edge incident to it.
    ///
    /// Neighbours lose the opposite side of each removed edge, so a
    /// dependent's in-degree drops by one per removed incoming edge.
    /// Removing an absent vertex is a no-op.
    pub fn remove_vertex(&mut self, vertex: &Vertex<V>) {
        let Some(node) = self.nodes.remove(vertex) else {
            return;
        };

        for edge in node.incoming {
            if let Some(from) = self.nodes.get_mut(&edge.from) {
                from.outgoing.remove(&edge);
            }
        }
        for edge in node.outgoing {
            if let Some(to) = self.nodes.get_mut(&edge.to) {
                to.incoming.remove(&edge);
            }
        }
    }

    /// Add an edge, creating either endpoint if it is not yet present.
    pub fn add_edge(&mut self, edge: Edge<V>) {
        self.nodes
            .entry(edge.from.clone())
            .or_default()
            .outgoing
            .insert(edge.clone());
        self.nodes
            .entry(edge.to.clone())
            .or_default()
            .incoming
            .insert(edge);
    }

    /// Remove an edge. Both endpoints must be present.
    pub fn remove_edge(&mut self, edge: &Edge<V>) -> Result<()> {
        if !self.nodes.contains_key(&edge.from) {
            return Err(missing(&edge.from));
        }
        if !self.nodes.contains_key(&edge.to) {
            return Err(missing(&edge.to));
        }

        if let Some(from) = self.nodes.get_mut(&edge.from) {
            from.outgoing.remove(edge);
        }
        if let Some(to) = self.nodes.get_mut(&edge.to) {
            to.incoming.remove(edge);
        }
        Ok(())
    }

    pub fn contains_vertex(&self, vertex: &Vertex<V>) -> bool {
        self.nodes.contains_key(vertex)
    }

    pub fn contains_edge(&self, edge: &Edge<V>) -> bool {
        match (self.nodes.get(&edge.from), self.nodes.get(&edge.to)) {
            (Some(from), Some(to)) => from.outgoing.contains(edge) && to.incoming.contains(edge),
            _ => false,
        }
    }

    /// Number of incoming edges; `0` for an absent vertex.
    pub fn in_degree(&self, vertex: &Vertex<V>) -> usize {
        self.nodes.get(vertex).map_or(0, |n| n.incoming.len())
    }

    /// Number of outgoing edges; `0` for an absent vertex.
    pub fn out_degree(&self, vertex: &Vertex<V>) -> usize {
        self.nodes.get(vertex).map_or(0, |n| n.outgoing.len())
    }

    pub fn incoming_edges(&self, vertex: &Vertex<V>) -> Result<&HashSet<Edge<V>>> {
        self.nodes
            .get(vertex)
            .map(|n| &n.incoming)
            .ok_or_else(|| missing(vertex))
    }

    pub fn outgoing_edges(&self, vertex: &Vertex<V>) -> Result<&HashSet<Edge<V>>> {
        self.nodes
            .get(vertex)
            .map(|n| &n.outgoing)
            .ok_or_else(|| missing(vertex))
    }

    pub fn vertices(&self) -> impl Iterator<Item = &Vertex<V>> {
        self.nodes.keys()
    }

    pub fn edges(&self) -> impl Iterator<Item = &Edge<V>> {
        self.nodes.values().flat_map(|n| n.outgoing.iter())
    }

    pub fn vertex_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.nodes.values().map(|n| n.outgoing.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Vertices reachable from `start` by walking edges backwards
    /// (`start` included). Absent `start` yields an empty set.
    pub fn ancestors(&self, start: &Vertex<V>) -> HashSet<Vertex<V>> {
        self.walk(start, |node| node.incoming.iter().map(|e| &e.from))
    }

    /// Vertices reachable from `start` by walking edges forwards
    /// (`start` included). Absent `start` yields an empty set.
    pub fn descendants(&self, start: &Vertex<V>) -> HashSet<Vertex<V>> {
        self.walk(start, |node| node.outgoing.iter().map(|e| &e.to))
    }

    fn walk<'a, F, I>(&'a self, start: &Vertex<V>, next: F) -> HashSet<Vertex<V>>
    where
        F: Fn(&'a Node<V>) -> I,
        I: Iterator<Item = &'a Vertex<V>>,
    {
        let mut seen = HashSet::new();
        if !self.nodes.contains_key(start) {
            return seen;
        }

        let mut queue = VecDeque::from([start.clone()]);
        while let Some(vertex) = queue.pop_front() {
            if !seen.insert(vertex.clone()) {
                continue;
            }
            if let Some(node) = self.nodes.get(&vertex) {
                queue.extend(next(node).cloned());
            }
        }
        seen
    }

    /// Kahn's algorithm on a disposable copy; `self` is never touched.
    ///
    /// A cycle exists iff fewer vertices are popped than the graph holds.
    pub fn has_cycle(&self) -> bool {
        let mut work = self.clone();
        let mut queue: VecDeque<Vertex<V>> = work
            .vertices()
            .filter(|v| work.in_degree(v) == 0)
            .cloned()
            .collect();

        let mut popped = 0usize;
        while let Some(vertex) = queue.pop_front() {
            popped += 1;
            let successors: Vec<Vertex<V>> = match work.nodes.get(&vertex) {
                Some(node) => node.outgoing.iter().map(|e| e.to.clone()).collect(),
                None => continue,
            };
            work.remove_vertex(&vertex);
            for to in successors {
                if work.contains_vertex(&to) && work.in_degree(&to) == 0 {
                    queue.push_back(to);
                }
            }
        }

        popped != self.vertex_count()
    }
}

impl<V> Graph<V>
where
    V: Clone + Eq + Hash + fmt::Debug + fmt::Display,
{
    /// DOT rendering for diagnostics. Output is sorted so equal graphs
    /// render identically.
    pub fn to_dot(&self) -> String {
        let mut vertices: Vec<String> = self.vertices().map(|v| v.to_string()).collect();
        vertices.sort();

        let mut edges: Vec<(String, String)> = self
            .edges()
            .map(|e| (e.from.to_string(), e.to.to_string()))
            .collect();
        edges.sort();

        let mut out = String::from("digraph {\n");
        for v in vertices {
            out.push_str(&format!("    {v:?};\n"));
        }
        for (from, to) in edges {
            out.push_str(&format!("    {from:?} -> {to:?};\n"));
        }
        out.push('}');
        out
    }
}

/// Build a graph from `(from, to)` pairs.
impl<V> FromIterator<(V, V)> for Graph<V>
where
    V: Clone + Eq + Hash + fmt::Debug,
{
    fn from_iter<I: IntoIterator<Item = (V, V)>>(iter: I) -> Self {
        let mut graph = Graph::new();
        for (from, to) in iter {
            graph.add_edge(Edge::new(Vertex::new(from), Vertex::new(to)));
        }
        graph
    }
}

fn missing<V: fmt::Debug>(vertex: &Vertex<V>) -> TaskGraphError {
    TaskGraphError::MissingVertex(format!("{:?}", vertex.value()))
}
