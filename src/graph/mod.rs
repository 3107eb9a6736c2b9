pub mod dependency_graph;

pub use dependency_graph::{CycleError, DependencyGraph, GraphUniverse, person_graph, task_graph};
