pub mod dijkstra;

pub use dijkstra::{ComputedPath, ComputedRoute, Edge, EdgeKey, LinkGraph, ShortestPathTree, compute_routes, shortest_path_tree};
