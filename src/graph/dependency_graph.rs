use crate::assignment::Assignment;
use crate::task::{Task, TaskDependency};
use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::unionfind::UnionFind;
use petgraph::visit::EdgeRef;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use thiserror::Error;

/// Which kind of identifier a graph's nodes carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GraphUniverse {
    Tasks,
    People,
}

impl fmt::Display for GraphUniverse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GraphUniverse::Tasks => write!(f, "task"),
            GraphUniverse::People => write!(f, "person"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("dependency cycle among {universe} nodes {remaining:?}")]
pub struct CycleError {
    pub universe: GraphUniverse,
    /// Nodes that never reached in-degree zero, in insertion order.
    pub remaining: Vec<i32>,
}

/// Directed prerequisite graph over plain ids.
///
/// Nodes keep their insertion order; `topological_order` always releases the
/// earliest-inserted ready node first, so callers decide tie-breaking by the
/// order they hand nodes in.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    universe: GraphUniverse,
    graph: DiGraph<i32, ()>,
    id_to_index: HashMap<i32, NodeIndex>,
}

impl DependencyGraph {
    pub fn new<I>(universe: GraphUniverse, nodes: I) -> Self
    where
        I: IntoIterator<Item = i32>,
    {
        let mut graph = DiGraph::new();
        let mut id_to_index = HashMap::new();
        for id in nodes {
            if !id_to_index.contains_key(&id) {
                let ix = graph.add_node(id);
                id_to_index.insert(id, ix);
            }
        }
        Self {
            universe,
            graph,
            id_to_index,
        }
    }

    pub fn from_edges<I, E>(universe: GraphUniverse, nodes: I, edges: E) -> Self
    where
        I: IntoIterator<Item = i32>,
        E: IntoIterator<Item = (i32, i32)>,
    {
        let mut graph = Self::new(universe, nodes);
        for (from, to) in edges {
            graph.add_edge(from, to);
        }
        graph
    }

    /// Adds `from -> to`. Edges touching unknown nodes are ignored and repeated
    /// edges collapse into one. Returns whether the edge is present afterwards.
    pub fn add_edge(&mut self, from: i32, to: i32) -> bool {
        match (self.id_to_index.get(&from), self.id_to_index.get(&to)) {
            (Some(&u), Some(&v)) => {
                self.graph.update_edge(u, v, ());
                true
            }
            _ => false,
        }
    }

    pub fn universe(&self) -> GraphUniverse {
        self.universe
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn contains(&self, id: i32) -> bool {
        self.id_to_index.contains_key(&id)
    }

    pub fn nodes(&self) -> Vec<i32> {
        self.graph.node_indices().map(|ix| self.graph[ix]).collect()
    }

    pub fn edges(&self) -> Vec<(i32, i32)> {
        self.graph
            .edge_references()
            .map(|edge| (self.graph[edge.source()], self.graph[edge.target()]))
            .collect()
    }

    /// Kahn's algorithm. Fails with the unresolved nodes instead of returning a
    /// partial order.
    pub fn topological_order(&self) -> Result<Vec<i32>, CycleError> {
        let mut in_degree: Vec<usize> = self
            .graph
            .node_indices()
            .map(|ix| {
                self.graph
                    .neighbors_directed(ix, Direction::Incoming)
                    .count()
            })
            .collect();

        let mut ready: BTreeSet<usize> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, degree)| **degree == 0)
            .map(|(idx, _)| idx)
            .collect();

        let mut order = Vec::with_capacity(self.graph.node_count());
        while let Some(idx) = ready.pop_first() {
            let ix = NodeIndex::new(idx);
            order.push(self.graph[ix]);
            for succ in self.graph.neighbors_directed(ix, Direction::Outgoing) {
                let degree = &mut in_degree[succ.index()];
                *degree -= 1;
                if *degree == 0 {
                    ready.insert(succ.index());
                }
            }
        }

        if order.len() < self.graph.node_count() {
            let remaining = in_degree
                .iter()
                .enumerate()
                .filter(|(_, degree)| **degree > 0)
                .map(|(idx, _)| self.graph[NodeIndex::new(idx)])
                .collect();
            return Err(CycleError {
                universe: self.universe,
                remaining,
            });
        }
        Ok(order)
    }

    /// Partitions the nodes into sets that share no edge, ignoring direction.
    /// Sets and their members keep insertion order.
    pub fn weakly_connected_components(&self) -> Vec<Vec<i32>> {
        let mut sets = UnionFind::<usize>::new(self.graph.node_count());
        for edge in self.graph.edge_references() {
            sets.union(edge.source().index(), edge.target().index());
        }

        let mut by_root: HashMap<usize, usize> = HashMap::new();
        let mut components: Vec<Vec<i32>> = Vec::new();
        for ix in self.graph.node_indices() {
            let root = sets.find(ix.index());
            let slot = *by_root.entry(root).or_insert_with(|| {
                components.push(Vec::new());
                components.len() - 1
            });
            components[slot].push(self.graph[ix]);
        }
        components
    }

    /// The induced subgraph on `nodes`, keeping this graph's node order.
    pub fn subgraph(&self, nodes: &[i32]) -> Self {
        let keep: std::collections::HashSet<i32> = nodes.iter().copied().collect();
        let ordered = self.nodes().into_iter().filter(|id| keep.contains(id));
        let edges = self
            .edges()
            .into_iter()
            .filter(|(from, to)| keep.contains(from) && keep.contains(to));
        Self::from_edges(self.universe, ordered, edges)
    }
}

/// Task graph over `tasks` (in the given order) using the dependency records
/// whose endpoints are both present.
pub fn task_graph(tasks: &[&Task], dependencies: &[TaskDependency]) -> DependencyGraph {
    DependencyGraph::from_edges(
        GraphUniverse::Tasks,
        tasks.iter().map(|task| task.id),
        dependencies
            .iter()
            .map(|dep| (dep.predecessor, dep.successor)),
    )
}

/// Person graph derived by mapping each task edge through the task's
/// assignees. Edges between tasks owned by the same person are dropped.
pub fn person_graph(assignments: &[&Assignment], dependencies: &[TaskDependency]) -> DependencyGraph {
    let mut owners: HashMap<i32, Vec<i32>> = HashMap::new();
    let mut people = Vec::new();
    for assignment in assignments {
        let entry = owners.entry(assignment.task_id).or_default();
        if !entry.contains(&assignment.person_id) {
            entry.push(assignment.person_id);
        }
        people.push(assignment.person_id);
    }

    let mut graph = DependencyGraph::new(GraphUniverse::People, people);
    for dep in dependencies {
        let (Some(from_people), Some(to_people)) =
            (owners.get(&dep.predecessor), owners.get(&dep.successor))
        else {
            continue;
        };
        for &from in from_people {
            for &to in to_people {
                if from != to {
                    graph.add_edge(from, to);
                }
            }
        }
    }
    graph
}
