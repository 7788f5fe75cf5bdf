//! Cycle-detecting directed graph.
//!
//! Nodes are interned into an open-addressing table; each node's outgoing
//! edges live in a chain of fixed-size blocks so that adjacency reads touch
//! contiguous memory. Every [`DependencyGraph::add_edge`] runs a depth-first
//! search from the edge target and fails if the new edge closed a cycle.

use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Edge targets stored per overflow block.
const BLOCK_SIZE: usize = 4;
/// Initial table capacity; always a power of two.
const INITIAL_CAPACITY: usize = 16;

/// Adding an edge would create a cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleError<T> {
    /// Nodes of the cycle in visit order; first and last are the same node.
    pub path: Vec<T>,
}

impl<T: fmt::Display> fmt::Display for CycleError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("cycle detected: ")?;
        for (i, node) in self.path.iter().enumerate() {
            if i > 0 {
                f.write_str(" -> ")?;
            }
            write!(f, "{node}")?;
        }
        Ok(())
    }
}

impl<T: fmt::Debug + fmt::Display> std::error::Error for CycleError<T> {}

#[derive(Debug, Clone, Copy)]
struct Slot {
    node: usize,
    head: Option<usize>,
}

#[derive(Debug, Clone, Copy)]
struct Block {
    targets: [usize; BLOCK_SIZE],
    len: usize,
    next: Option<usize>,
}

impl Block {
    fn with(target: usize) -> Self {
        let mut targets = [0; BLOCK_SIZE];
        targets[0] = target;
        Self {
            targets,
            len: 1,
            next: None,
        }
    }

    fn targets(&self) -> &[usize] {
        &self.targets[..self.len]
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    Visiting,
    Visited,
}

/// A directed graph that rejects edges closing a cycle.
#[derive(Debug, Clone)]
pub struct DependencyGraph<T> {
    nodes: Vec<T>,
    slots: Vec<Option<Slot>>,
    blocks: Vec<Block>,
    edges: usize,
}

impl<T> Default for DependencyGraph<T> {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            slots: vec![None; INITIAL_CAPACITY],
            blocks: Vec::new(),
            edges: 0,
        }
    }
}

impl<T: Clone + Eq + Hash> DependencyGraph<T> {
    /// Create an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of distinct edges.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edges
    }

    /// Whether the edge `from -> to` is present.
    #[must_use]
    pub fn contains_edge(&self, from: &T, to: &T) -> bool {
        let (Some(f), Some(t)) = (self.find(from), self.find(to)) else {
            return false;
        };
        self.adjacent(f).contains(&t)
    }

    /// Direct successors of `node`, in insertion order.
    #[must_use]
    pub fn successors(&self, node: &T) -> Vec<&T> {
        self.find(node)
            .map(|n| self.adjacent(n).into_iter().map(|i| &self.nodes[i]).collect())
            .unwrap_or_default()
    }

    /// Add the edge `from -> to`.
    ///
    /// The edge stays in the graph even when a cycle is reported; callers
    /// treat the error as fatal to the graph being built.
    ///
    /// # Errors
    ///
    /// Returns a [`CycleError`] with the offending path if the edge closes a
    /// cycle.
    pub fn add_edge(&mut self, from: T, to: T) -> Result<(), CycleError<T>> {
        let f = self.intern(from);
        let t = self.intern(to);
        if !self.adjacent(f).contains(&t) {
            self.push_edge(f, t);
            self.edges = self.edges.saturating_add(1);
        }
        match self.find_cycle(t) {
            Some(path) => Err(CycleError {
                path: path.into_iter().map(|i| self.nodes[i].clone()).collect(),
            }),
            None => Ok(()),
        }
    }

    /// Remove `node` with every edge into or out of it.
    ///
    /// Returns whether the node was present.
    pub fn remove_node(&mut self, node: &T) -> bool {
        let Some(removed) = self.find(node) else {
            return false;
        };
        let edges: Vec<(usize, usize)> = (0..self.nodes.len())
            .filter(|&from| from != removed)
            .flat_map(|from| {
                self.adjacent(from)
                    .into_iter()
                    .filter(|&to| to != removed)
                    .map(move |to| (from, to))
            })
            .collect();

        let mut rebuilt = Self::default();
        let mut remap = vec![usize::MAX; self.nodes.len()];
        for (old, value) in std::mem::take(&mut self.nodes).into_iter().enumerate() {
            if old != removed {
                remap[old] = rebuilt.intern(value);
            }
        }
        for (from, to) in edges {
            rebuilt.push_edge(remap[from], remap[to]);
            rebuilt.edges = rebuilt.edges.saturating_add(1);
        }
        *self = rebuilt;
        true
    }

    fn mask(&self) -> usize {
        self.slots.len().wrapping_sub(1)
    }

    #[allow(clippy::cast_possible_truncation)]
    fn bucket(&self, value: &T) -> usize {
        let mut hasher = DefaultHasher::new();
        value.hash(&mut hasher);
        (hasher.finish() as usize) & self.mask()
    }

    fn probe(&self, value: &T) -> (usize, Option<Slot>) {
        let mut index = self.bucket(value);
        loop {
            match self.slots[index] {
                Some(slot) if self.nodes[slot.node] == *value => return (index, Some(slot)),
                Some(_) => index = index.wrapping_add(1) & self.mask(),
                None => return (index, None),
            }
        }
    }

    fn find(&self, value: &T) -> Option<usize> {
        self.probe(value).1.map(|slot| slot.node)
    }

    fn intern(&mut self, value: T) -> usize {
        if let (_, Some(slot)) = self.probe(&value) {
            return slot.node;
        }
        // Keep the load factor under 3/4.
        if self.nodes.len().saturating_add(1).saturating_mul(4) > self.slots.len().saturating_mul(3) {
            self.grow();
        }
        let node = self.nodes.len();
        let (index, _) = self.probe(&value);
        self.nodes.push(value);
        self.slots[index] = Some(Slot { node, head: None });
        node
    }

    fn grow(&mut self) {
        let capacity = self.slots.len().saturating_mul(2);
        let old = std::mem::replace(&mut self.slots, vec![None; capacity]);
        for slot in old.into_iter().flatten() {
            let (index, _) = self.probe(&self.nodes[slot.node]);
            self.slots[index] = Some(slot);
        }
    }

    fn slot_index(&self, node: usize) -> usize {
        self.probe(&self.nodes[node]).0
    }

    fn adjacent(&self, node: usize) -> Vec<usize> {
        let mut out = Vec::new();
        let mut cursor = self.slots[self.slot_index(node)].and_then(|s| s.head);
        while let Some(b) = cursor {
            out.extend_from_slice(self.blocks[b].targets());
            cursor = self.blocks[b].next;
        }
        out
    }

    fn push_edge(&mut self, from: usize, to: usize) {
        let index = self.slot_index(from);
        let Some(slot) = self.slots[index] else {
            return;
        };
        let Some(head) = slot.head else {
            self.blocks.push(Block::with(to));
            self.slots[index] = Some(Slot {
                head: Some(self.blocks.len().wrapping_sub(1)),
                ..slot
            });
            return;
        };

        let mut tail = head;
        while let Some(next) = self.blocks[tail].next {
            tail = next;
        }
        let block = &mut self.blocks[tail];
        if block.len < BLOCK_SIZE {
            block.targets[block.len] = to;
            block.len = block.len.wrapping_add(1);
        } else {
            self.blocks.push(Block::with(to));
            self.blocks[tail].next = Some(self.blocks.len().wrapping_sub(1));
        }
    }

    /// Iterative DFS from `start`; returns the path of the first cycle found.
    fn find_cycle(&self, start: usize) -> Option<Vec<usize>> {
        let mut marks = vec![Mark::Unvisited; self.nodes.len()];
        let mut stack: Vec<(usize, Vec<usize>, usize)> = vec![(start, self.adjacent(start), 0)];
        marks[start] = Mark::Visiting;

        while let Some((node, successors, cursor)) = stack.last_mut() {
            let Some(&next) = successors.get(*cursor) else {
                marks[*node] = Mark::Visited;
                stack.pop();
                continue;
            };
            *cursor = cursor.wrapping_add(1);
            match marks[next] {
                Mark::Visiting => {
                    let mut path: Vec<usize> = stack
                        .iter()
                        .map(|(n, _, _)| *n)
                        .skip_while(|n| *n != next)
                        .collect();
                    path.push(next);
                    return Some(path);
                },
                Mark::Visited => {},
                Mark::Unvisited => {
                    marks[next] = Mark::Visiting;
                    let successors = self.adjacent(next);
                    stack.push((next, successors, 0));
                },
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_three_node_cycle_reports_path() {
        let mut graph = DependencyGraph::new();
        graph.add_edge("A", "B").unwrap();
        graph.add_edge("B", "C").unwrap();
        let err = graph.add_edge("C", "A").unwrap_err();
        assert_eq!(err.path, vec!["A", "B", "C", "A"]);
        assert_eq!(err.to_string(), "cycle detected: A -> B -> C -> A");
        // No rollback.
        assert!(graph.contains_edge(&"C", &"A"));
    }

    #[test]
    fn test_acyclic_edges_succeed() {
        let mut graph = DependencyGraph::new();
        graph.add_edge("A", "B").unwrap();
        graph.add_edge("A", "C").unwrap();
        graph.add_edge("B", "D").unwrap();
        assert_eq!(graph.node_count(), 4);
        assert_eq!(graph.edge_count(), 3);
        assert_eq!(graph.successors(&"A"), vec![&"B", &"C"]);
    }

    #[test]
    fn test_self_loop() {
        let mut graph = DependencyGraph::new();
        let err = graph.add_edge(1, 1).unwrap_err();
        assert_eq!(err.path, vec![1, 1]);
    }

    #[test]
    fn test_duplicate_edge_counted_once() {
        let mut graph = DependencyGraph::new();
        graph.add_edge("A", "B").unwrap();
        graph.add_edge("A", "B").unwrap();
        assert_eq!(graph.edge_count(), 1);
    }

    #[test]
    fn test_remove_node_drops_its_edges() {
        let mut graph = DependencyGraph::new();
        graph.add_edge("A", "B").unwrap();
        graph.add_edge("B", "C").unwrap();
        graph.add_edge("C", "D").unwrap();

        assert!(graph.remove_node(&"B"));
        assert!(!graph.remove_node(&"B"));
        assert_eq!(graph.node_count(), 3);
        assert_eq!(graph.edge_count(), 1);
        assert!(graph.contains_edge(&"C", &"D"));
        assert!(graph.successors(&"A").is_empty());

        // A recycled node starts without edges.
        graph.add_edge("B", "A").unwrap();
        graph.add_edge("A", "B").unwrap_err();
        assert_eq!(graph.successors(&"B"), vec![&"A"]);
    }

    #[test]
    fn test_growth_and_overflow_blocks() {
        let mut graph = DependencyGraph::new();
        for i in 1..200u32 {
            graph.add_edge(0, i).unwrap();
        }
        for i in 1..199u32 {
            graph.add_edge(i, i + 1).unwrap();
        }
        assert_eq!(graph.node_count(), 200);
        assert_eq!(graph.successors(&0).len(), 199);
        assert!(graph.contains_edge(&0, &150));

        let err = graph.add_edge(199, 1).unwrap_err();
        assert_eq!(err.path.first(), Some(&1));
        assert_eq!(err.path.last(), Some(&1));
        assert_eq!(err.path.len(), 200);
    }
}
