//! Weighted undirected graph for path analysis over externally built
//! node/edge lists. Independent of the grid types.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;

use petgraph::algo::{self, astar, dijkstra};
use petgraph::graph::{EdgeIndex, NodeIndex, UnGraph};
use petgraph::visit::{EdgeFiltered, EdgeRef};

use crate::error::{GridError, Result};

/// A path through the network and its total weight.
pub type WeightedPath<N> = (f64, Vec<N>);

#[derive(Debug, Clone)]
pub struct Network<N: Hash + Eq + Clone> {
    graph: UnGraph<N, f64>,
    indices: HashMap<N, NodeIndex>,
}

impl<N: Hash + Eq + Clone> Default for Network<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<N: Hash + Eq + Clone> Network<N> {
    pub fn new() -> Self {
        Self {
            graph: UnGraph::new_undirected(),
            indices: HashMap::new(),
        }
    }

    pub fn add_node(&mut self, node: N) -> NodeIndex {
        if let Some(&index) = self.indices.get(&node) {
            return index;
        }
        let index = self.graph.add_node(node.clone());
        self.indices.insert(node, index);
        index
    }

    /// Adds an edge, replacing the weight if the pair is already connected.
    pub fn add_edge(&mut self, a: N, b: N, weight: f64) {
        let a = self.add_node(a);
        let b = self.add_node(b);
        self.graph.update_edge(a, b, weight);
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn contains(&self, node: &N) -> bool {
        self.indices.contains_key(node)
    }

    pub fn degree(&self, node: &N) -> Result<usize> {
        Ok(self.graph.edges(self.index(node)?).count())
    }

    /// Nodes with exactly `k` incident edges, in insertion order.
    pub fn nodes_with_degree(&self, k: usize) -> Vec<N> {
        self.graph
            .node_indices()
            .filter(|&index| self.graph.edges(index).count() == k)
            .map(|index| self.graph[index].clone())
            .collect()
    }

    pub fn terminal_nodes(&self) -> Vec<N> {
        self.nodes_with_degree(1)
    }

    /// Nodes at the largest shortest-path distance from `from`, with that
    /// distance. Unreachable nodes are ignored.
    pub fn farthest_nodes(&self, from: &N) -> Result<WeightedPath<N>> {
        let start = self.index(from)?;
        let distances = dijkstra(&self.graph, start, None, |e| *e.weight());
        let max = distances.values().copied().fold(0.0f64, f64::max);
        let mut nodes: Vec<NodeIndex> = distances
            .iter()
            .filter(|&(_, &distance)| distance == max)
            .map(|(&index, _)| index)
            .collect();
        nodes.sort_unstable();
        Ok((max, nodes.into_iter().map(|i| self.graph[i].clone()).collect()))
    }

    /// Every path from `a` to `b` that visits no node twice.
    pub fn all_simple_paths(&self, a: &N, b: &N) -> Result<Vec<Vec<N>>> {
        let (from, to) = (self.index(a)?, self.index(b)?);
        Ok(
            algo::all_simple_paths::<Vec<_>, _>(&self.graph, from, to, 0, None)
                .map(|path| self.nodes_of(&path))
                .collect(),
        )
    }

    pub fn shortest_path(&self, a: &N, b: &N) -> Result<Option<WeightedPath<N>>> {
        let (from, to) = (self.index(a)?, self.index(b)?);
        Ok(
            astar(&self.graph, from, |n| n == to, |e| *e.weight(), |_| 0.0)
                .map(|(cost, path)| (cost, self.nodes_of(&path))),
        )
    }

    /// Up to `k` loopless paths from `a` to `b` in order of increasing weight
    /// (Yen's algorithm).
    pub fn k_shortest_paths(&self, a: &N, b: &N, k: usize) -> Result<Vec<WeightedPath<N>>> {
        let (from, to) = (self.index(a)?, self.index(b)?);
        if k == 0 {
            return Ok(Vec::new());
        }
        let Some(first) = astar(&self.graph, from, |n| n == to, |e| *e.weight(), |_| 0.0) else {
            return Ok(Vec::new());
        };

        let mut accepted: Vec<(f64, Vec<NodeIndex>)> = vec![first];
        let mut candidates: Vec<(f64, Vec<NodeIndex>)> = Vec::new();

        while accepted.len() < k {
            let previous = accepted[accepted.len() - 1].1.clone();
            for i in 0..previous.len() - 1 {
                let spur = previous[i];
                let root = &previous[..=i];

                let removed_edges: HashSet<EdgeIndex> = accepted
                    .iter()
                    .filter(|(_, path)| path.len() > i + 1 && &path[..=i] == root)
                    .filter_map(|(_, path)| self.graph.find_edge(path[i], path[i + 1]))
                    .collect();
                let removed_nodes: HashSet<NodeIndex> = root[..i].iter().copied().collect();

                let filtered = EdgeFiltered::from_fn(&self.graph, |e| {
                    !removed_edges.contains(&e.id())
                        && !removed_nodes.contains(&e.source())
                        && !removed_nodes.contains(&e.target())
                });
                let Some((spur_cost, spur_path)) =
                    astar(&filtered, spur, |n| n == to, |e| *e.weight(), |_| 0.0)
                else {
                    continue;
                };

                let Some(root_cost) = self.index_path_weight(root) else {
                    continue;
                };
                let mut path = root[..i].to_vec();
                path.extend(spur_path);
                let known = accepted.iter().chain(&candidates).any(|(_, p)| *p == path);
                if !known {
                    candidates.push((root_cost + spur_cost, path));
                }
            }

            let Some(best) = candidates
                .iter()
                .enumerate()
                .min_by(|(_, x), (_, y)| x.0.total_cmp(&y.0))
                .map(|(index, _)| index)
            else {
                break;
            };
            accepted.push(candidates.swap_remove(best));
        }

        log::debug!("Found {} of {} requested paths", accepted.len(), k);
        Ok(accepted
            .into_iter()
            .map(|(cost, path)| (cost, self.nodes_of(&path)))
            .collect())
    }

    /// Consecutive node pairs of a path.
    pub fn path_edges(path: &[N]) -> Vec<(N, N)> {
        path.windows(2)
            .map(|pair| (pair[0].clone(), pair[1].clone()))
            .collect()
    }

    /// Sum of edge weights along `path`, or `None` if two consecutive nodes
    /// are not connected.
    pub fn path_weight(&self, path: &[N]) -> Result<Option<f64>> {
        let indices = path
            .iter()
            .map(|node| self.index(node))
            .collect::<Result<Vec<_>>>()?;
        Ok(self.index_path_weight(&indices))
    }

    fn index_path_weight(&self, path: &[NodeIndex]) -> Option<f64> {
        path.windows(2).try_fold(0.0, |total, pair| {
            self.graph
                .find_edge(pair[0], pair[1])
                .map(|edge| total + self.graph[edge])
        })
    }

    fn index(&self, node: &N) -> Result<NodeIndex> {
        self.indices.get(node).copied().ok_or(GridError::NodeNotFound)
    }

    fn nodes_of(&self, path: &[NodeIndex]) -> Vec<N> {
        path.iter().map(|&index| self.graph[index].clone()).collect()
    }
}
