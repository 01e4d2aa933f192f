//! Directed dependency graph over deployment units.
//!
//! Edges point in execution-flow direction: an edge `a -> b` means `b`
//! depends on `a`, so `a` must settle before `b` starts. Node identity is the
//! unit identifier string; insertion order is retained for deterministic
//! tie-breaking in every traversal.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, VecDeque};

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;

/// A directed graph of unit dependencies.
#[derive(Debug, Clone, Default)]
pub struct UnitGraph {
    graph: DiGraph<String, ()>,
    index_map: HashMap<String, NodeIndex>,
    insertion_order: Vec<NodeIndex>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Gray,
    Black,
}

impl UnitGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of units in the graph.
    pub fn unit_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Number of dependency edges in the graph.
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Add a unit if not already present, returning its index.
    pub fn add_unit(&mut self, unit: &str) -> NodeIndex {
        if let Some(&idx) = self.index_map.get(unit) {
            return idx;
        }
        let idx = self.graph.add_node(unit.to_string());
        self.index_map.insert(unit.to_string(), idx);
        self.insertion_order.push(idx);
        idx
    }

    /// Record that `unit` depends on `depends_on`.
    ///
    /// Both units are added to the graph if missing. Duplicate edges are
    /// collapsed so a noisy fact provider cannot skew in-degree counts.
    pub fn add_dependency(&mut self, unit: &str, depends_on: &str) {
        let unit_idx = self.add_unit(unit);
        let dep_idx = self.add_unit(depends_on);
        if !self.graph.contains_edge(dep_idx, unit_idx) {
            self.graph.add_edge(dep_idx, unit_idx, ());
        }
    }

    pub fn contains(&self, unit: &str) -> bool {
        self.index_map.contains_key(unit)
    }

    /// All units in insertion order.
    pub fn units(&self) -> Vec<String> {
        self.insertion_order
            .iter()
            .map(|&idx| self.graph[idx].clone())
            .collect()
    }

    /// Units that `unit` directly depends on.
    pub fn dependencies_of(&self, unit: &str) -> Vec<String> {
        self.neighbors(unit, Direction::Incoming)
    }

    /// Units that directly depend on `unit`.
    pub fn dependents_of(&self, unit: &str) -> Vec<String> {
        self.neighbors(unit, Direction::Outgoing)
    }

    fn neighbors(&self, unit: &str, direction: Direction) -> Vec<String> {
        let Some(&idx) = self.index_map.get(unit) else {
            return Vec::new();
        };
        let mut found: Vec<NodeIndex> = self.graph.neighbors_directed(idx, direction).collect();
        found.sort_by_key(|n| self.rank(*n));
        found.into_iter().map(|n| self.graph[n].clone()).collect()
    }

    /// All units transitively reachable downstream of `unit`.
    pub fn transitive_dependents(&self, unit: &str) -> Vec<String> {
        let Some(&start) = self.index_map.get(unit) else {
            return Vec::new();
        };
        let mut seen = vec![false; self.graph.node_count()];
        let mut queue = VecDeque::from([start]);
        let mut reached: Vec<NodeIndex> = Vec::new();
        seen[start.index()] = true;
        while let Some(node) = queue.pop_front() {
            for next in self.graph.neighbors_directed(node, Direction::Outgoing) {
                if !seen[next.index()] {
                    seen[next.index()] = true;
                    reached.push(next);
                    queue.push_back(next);
                }
            }
        }
        reached.sort_by_key(|n| self.rank(*n));
        reached.into_iter().map(|n| self.graph[n].clone()).collect()
    }

    /// Detect cycles by DFS coloring.
    ///
    /// Every back-edge to a gray node records the cycle as the slice of the
    /// gray stack starting at that node. An acyclic graph returns an empty
    /// list.
    pub fn detect_cycles(&self) -> Vec<Vec<String>> {
        let mut color = vec![Color::White; self.graph.node_count()];
        let mut stack: Vec<NodeIndex> = Vec::new();
        let mut cycles: Vec<Vec<String>> = Vec::new();

        for &start in &self.insertion_order {
            if color[start.index()] == Color::White {
                self.visit(start, &mut color, &mut stack, &mut cycles);
            }
        }
        cycles
    }

    fn visit(
        &self,
        node: NodeIndex,
        color: &mut [Color],
        stack: &mut Vec<NodeIndex>,
        cycles: &mut Vec<Vec<String>>,
    ) {
        color[node.index()] = Color::Gray;
        stack.push(node);

        let mut successors: Vec<NodeIndex> = self
            .graph
            .neighbors_directed(node, Direction::Outgoing)
            .collect();
        successors.sort_by_key(|n| self.rank(*n));

        for succ in successors {
            match color[succ.index()] {
                Color::White => self.visit(succ, color, stack, cycles),
                Color::Gray => {
                    if let Some(pos) = stack.iter().position(|&n| n == succ) {
                        let cycle = stack[pos..]
                            .iter()
                            .map(|&n| self.graph[n].clone())
                            .collect();
                        cycles.push(cycle);
                    }
                }
                Color::Black => {}
            }
        }

        stack.pop();
        color[node.index()] = Color::Black;
    }

    /// Topological execution order via Kahn's algorithm.
    ///
    /// Ties between units with zero remaining in-degree break by insertion
    /// order so the result is deterministic for a given input order. Returns
    /// `None` when the graph contains a cycle.
    pub fn toposort(&self) -> Option<Vec<String>> {
        let mut in_degree: HashMap<NodeIndex, usize> = HashMap::new();
        for &idx in &self.insertion_order {
            in_degree.insert(
                idx,
                self.graph
                    .neighbors_directed(idx, Direction::Incoming)
                    .count(),
            );
        }

        let mut ready: BinaryHeap<Reverse<(usize, NodeIndex)>> = BinaryHeap::new();
        for &idx in &self.insertion_order {
            if in_degree[&idx] == 0 {
                ready.push(Reverse((self.rank(idx), idx)));
            }
        }

        let mut order = Vec::with_capacity(self.graph.node_count());
        while let Some(Reverse((_, node))) = ready.pop() {
            order.push(self.graph[node].clone());
            for succ in self.graph.neighbors_directed(node, Direction::Outgoing) {
                let degree = in_degree.get_mut(&succ)?;
                *degree -= 1;
                if *degree == 0 {
                    ready.push(Reverse((self.rank(succ), succ)));
                }
            }
        }

        if order.len() == self.graph.node_count() {
            Some(order)
        } else {
            None
        }
    }

    /// Group units by longest-path depth from any source node.
    ///
    /// Units in the same layer have no dependency relationship and may run
    /// concurrently; layer `L+1` units each have at least one dependency in
    /// layer `L` or earlier. Returns `None` for cyclic graphs.
    pub fn depth_layers(&self) -> Option<Vec<Vec<String>>> {
        let order = self.toposort()?;
        let mut depth: HashMap<NodeIndex, usize> = HashMap::new();

        for unit in &order {
            let idx = *self.index_map.get(unit)?;
            let unit_depth = self
                .graph
                .neighbors_directed(idx, Direction::Incoming)
                .map(|pred| depth.get(&pred).copied().unwrap_or(0) + 1)
                .max()
                .unwrap_or(0);
            depth.insert(idx, unit_depth);
        }

        let max_depth = depth.values().copied().max().unwrap_or(0);
        let mut layers: Vec<Vec<NodeIndex>> = vec![Vec::new(); max_depth + 1];
        for (&idx, &d) in &depth {
            layers[d].push(idx);
        }
        for layer in &mut layers {
            layer.sort_by_key(|n| self.rank(*n));
        }

        Some(
            layers
                .into_iter()
                .filter(|layer| !layer.is_empty())
                .map(|layer| layer.into_iter().map(|n| self.graph[n].clone()).collect())
                .collect(),
        )
    }

    /// Longest dependency chain by node count.
    ///
    /// This is the critical path: no ordering of the units can finish in
    /// fewer sequential steps than its length. Returns `None` for cyclic
    /// graphs.
    pub fn critical_path(&self) -> Option<Vec<String>> {
        let order = self.toposort()?;
        if order.is_empty() {
            return Some(Vec::new());
        }

        let mut chain_len: HashMap<NodeIndex, usize> = HashMap::new();
        let mut best_pred: HashMap<NodeIndex, NodeIndex> = HashMap::new();

        for unit in &order {
            let idx = *self.index_map.get(unit)?;
            let mut preds: Vec<NodeIndex> = self
                .graph
                .neighbors_directed(idx, Direction::Incoming)
                .collect();
            preds.sort_by_key(|n| self.rank(*n));

            let mut longest = 1usize;
            for pred in preds {
                let candidate = chain_len.get(&pred).copied().unwrap_or(1) + 1;
                if candidate > longest {
                    longest = candidate;
                    best_pred.insert(idx, pred);
                }
            }
            chain_len.insert(idx, longest);
        }

        let mut tail = *self.index_map.get(&order[0])?;
        let mut tail_len = 0usize;
        for &idx in &self.insertion_order {
            let len = chain_len.get(&idx).copied().unwrap_or(1);
            if len > tail_len {
                tail_len = len;
                tail = idx;
            }
        }

        let mut path = vec![self.graph[tail].clone()];
        let mut cursor = tail;
        while let Some(&pred) = best_pred.get(&cursor) {
            path.push(self.graph[pred].clone());
            cursor = pred;
        }
        path.reverse();
        Some(path)
    }

    fn rank(&self, idx: NodeIndex) -> usize {
        self.insertion_order
            .iter()
            .position(|&n| n == idx)
            .unwrap_or(usize::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain_graph() -> UnitGraph {
        // C depends on B depends on A
        let mut graph = UnitGraph::new();
        graph.add_unit("A");
        graph.add_unit("B");
        graph.add_unit("C");
        graph.add_dependency("B", "A");
        graph.add_dependency("C", "B");
        graph
    }

    #[test]
    fn test_toposort_orders_chain() {
        let graph = chain_graph();
        assert_eq!(
            graph.toposort(),
            Some(vec!["A".to_string(), "B".to_string(), "C".to_string()])
        );
    }

    #[test]
    fn test_toposort_tie_break_follows_insertion_order() {
        let mut graph = UnitGraph::new();
        graph.add_unit("web");
        graph.add_unit("api");
        graph.add_unit("db");
        // web and api both depend on db, no edge between them
        graph.add_dependency("web", "db");
        graph.add_dependency("api", "db");

        assert_eq!(
            graph.toposort(),
            Some(vec!["db".to_string(), "web".to_string(), "api".to_string()])
        );
    }

    #[test]
    fn test_cycle_detected_and_toposort_refused() {
        let mut graph = UnitGraph::new();
        graph.add_dependency("a", "b");
        graph.add_dependency("b", "c");
        graph.add_dependency("c", "a");

        let cycles = graph.detect_cycles();
        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0].len(), 3);
        assert!(graph.toposort().is_none());
        assert!(graph.depth_layers().is_none());
    }

    #[test]
    fn test_self_dependency_is_a_cycle() {
        let mut graph = UnitGraph::new();
        graph.add_dependency("solo", "solo");
        assert_eq!(graph.detect_cycles(), vec![vec!["solo".to_string()]]);
    }

    #[test]
    fn test_depth_layers_partition_diamond() {
        let mut graph = UnitGraph::new();
        graph.add_unit("base");
        graph.add_unit("left");
        graph.add_unit("right");
        graph.add_unit("top");
        graph.add_dependency("left", "base");
        graph.add_dependency("right", "base");
        graph.add_dependency("top", "left");
        graph.add_dependency("top", "right");

        let layers = graph.depth_layers().unwrap();
        assert_eq!(
            layers,
            vec![
                vec!["base".to_string()],
                vec!["left".to_string(), "right".to_string()],
                vec!["top".to_string()],
            ]
        );
    }

    #[test]
    fn test_critical_path_picks_longest_chain() {
        let mut graph = UnitGraph::new();
        // two chains from base: base->a->b->c and base->x
        graph.add_dependency("a", "base");
        graph.add_dependency("b", "a");
        graph.add_dependency("c", "b");
        graph.add_dependency("x", "base");

        assert_eq!(
            graph.critical_path(),
            Some(vec![
                "base".to_string(),
                "a".to_string(),
                "b".to_string(),
                "c".to_string(),
            ])
        );
    }

    #[test]
    fn test_transitive_dependents() {
        let graph = chain_graph();
        assert_eq!(
            graph.transitive_dependents("A"),
            vec!["B".to_string(), "C".to_string()]
        );
        assert!(graph.transitive_dependents("C").is_empty());
    }

    #[test]
    fn test_duplicate_edges_collapse() {
        let mut graph = UnitGraph::new();
        graph.add_dependency("b", "a");
        graph.add_dependency("b", "a");
        assert_eq!(graph.edge_count(), 1);
    }
}
