use log::warn;
use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap, HashSet};
use std::net::Ipv4Addr;

use crate::RouterId;
use crate::protocol::Lsa;

/// Directed view of one point-to-point link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge {
    pub from: RouterId,
    pub to: RouterId,
    pub cost: u32,
    pub local_addr: Ipv4Addr,
    pub remote_addr: Ipv4Addr,
}

/// Direction-independent identity of a link, used for disjointness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EdgeKey {
    low: (RouterId, Ipv4Addr),
    high: (RouterId, Ipv4Addr),
}

impl Edge {
    pub fn key(&self) -> EdgeKey {
        let a = (self.from, self.local_addr);
        let b = (self.to, self.remote_addr);
        if a <= b {
            EdgeKey { low: a, high: b }
        } else {
            EdgeKey { low: b, high: a }
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LinkGraph {
    adjacency: BTreeMap<RouterId, Vec<Edge>>,
}

impl LinkGraph {
    /// Builds the graph from router LSAs. A link is kept only when the far
    /// end advertises the same link back.
    pub fn from_lsas(lsas: &[Lsa]) -> Self {
        let by_router: BTreeMap<RouterId, &Lsa> =
            lsas.iter().map(|l| (l.header.advertising_router, l)).collect();

        let mut graph = LinkGraph::default();
        for lsa in lsas {
            let from = lsa.header.advertising_router;
            graph.adjacency.entry(from).or_default();
            for link in &lsa.links {
                let confirmed = by_router.get(&link.neighbor_id).is_some_and(|far| {
                    far.links.iter().any(|back| {
                        back.neighbor_id == from
                            && back.local_addr == link.remote_addr
                            && back.remote_addr == link.local_addr
                    })
                });
                if confirmed {
                    graph.add_edge(Edge {
                        from,
                        to: link.neighbor_id,
                        cost: link.cost,
                        local_addr: link.local_addr,
                        remote_addr: link.remote_addr,
                    });
                }
            }
        }
        graph
    }

    pub fn add_edge(&mut self, edge: Edge) {
        self.adjacency.entry(edge.to).or_default();
        let edges = self.adjacency.entry(edge.from).or_default();
        edges.push(edge);
        edges.sort_by_key(|e| (e.to, e.local_addr, e.remote_addr));
    }

    pub fn edges_from(&self, router: &RouterId) -> &[Edge] {
        self.adjacency.get(router).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn node_count(&self) -> usize {
        self.adjacency.len()
    }

    pub fn edge_count(&self) -> usize {
        self.adjacency.values().map(Vec::len).sum()
    }

    pub fn routers(&self) -> impl Iterator<Item = &RouterId> {
        self.adjacency.keys()
    }
}

#[derive(Debug, Clone)]
pub struct ShortestPathTree {
    pub source: RouterId,
    pub(crate) distance: BTreeMap<RouterId, u64>,
    pub(crate) predecessor: BTreeMap<RouterId, Edge>,
}

impl ShortestPathTree {
    pub fn cost(&self, destination: &RouterId) -> Option<u64> {
        self.distance.get(destination).copied()
    }

    pub fn reachable(&self) -> impl Iterator<Item = &RouterId> {
        self.distance.keys()
    }

    /// Edges from the source to `destination`, in order. Returns `None` when
    /// the destination is unreachable or the predecessor chain is broken.
    pub fn path_edges(&self, destination: &RouterId) -> Option<Vec<Edge>> {
        if *destination == self.source || !self.distance.contains_key(destination) {
            return None;
        }
        let mut edges = Vec::new();
        let mut current = *destination;
        while current != self.source {
            if edges.len() > self.distance.len() {
                warn!("predecessor chain towards {} loops; treating as unreachable", destination);
                return None;
            }
            let Some(edge) = self.predecessor.get(&current) else {
                warn!("predecessor chain towards {} broken at {}; treating as unreachable", destination, current);
                return None;
            };
            edges.push(edge.clone());
            current = edge.from;
        }
        edges.reverse();
        Some(edges)
    }
}

pub fn shortest_path_tree(graph: &LinkGraph, source: RouterId, excluded: &HashSet<EdgeKey>) -> ShortestPathTree {
    let mut distance: BTreeMap<RouterId, u64> = BTreeMap::new();
    let mut predecessor: BTreeMap<RouterId, Edge> = BTreeMap::new();
    let mut heap = BinaryHeap::new();

    distance.insert(source, 0);
    heap.push(Reverse((0u64, source)));

    while let Some(Reverse((cost, router))) = heap.pop() {
        if cost > distance.get(&router).copied().unwrap_or(u64::MAX) {
            continue;
        }
        for edge in graph.edges_from(&router) {
            if excluded.contains(&edge.key()) {
                continue;
            }
            let candidate = cost + edge.cost as u64;
            if candidate < distance.get(&edge.to).copied().unwrap_or(u64::MAX) {
                distance.insert(edge.to, candidate);
                predecessor.insert(edge.to, edge.clone());
                heap.push(Reverse((candidate, edge.to)));
            }
        }
    }

    ShortestPathTree {
        source,
        distance,
        predecessor,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComputedPath {
    pub cost: u64,
    pub edges: Vec<Edge>,
}

impl ComputedPath {
    pub fn first_hop(&self) -> &Edge {
        &self.edges[0]
    }

    pub fn routers(&self) -> Vec<RouterId> {
        let mut out = Vec::with_capacity(self.edges.len() + 1);
        if let Some(first) = self.edges.first() {
            out.push(first.from);
        }
        out.extend(self.edges.iter().map(|e| e.to));
        out
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComputedRoute {
    pub destination: RouterId,
    pub primary: ComputedPath,
    /// Shortest path sharing no link with `primary`, if one exists.
    pub backup: Option<ComputedPath>,
}

/// Primary (and optionally edge-disjoint backup) paths from `source` to
/// every reachable router.
pub fn compute_routes(graph: &LinkGraph, source: RouterId, with_backup: bool) -> Vec<ComputedRoute> {
    let tree = shortest_path_tree(graph, source, &HashSet::new());
    let mut routes = Vec::new();

    for destination in tree.reachable() {
        if *destination == source {
            continue;
        }
        let Some(edges) = tree.path_edges(destination) else {
            continue;
        };
        let primary = ComputedPath {
            cost: tree.distance[destination],
            edges,
        };

        let backup = if with_backup {
            let excluded: HashSet<EdgeKey> = primary.edges.iter().map(Edge::key).collect();
            let alternate = shortest_path_tree(graph, source, &excluded);
            alternate.path_edges(destination).map(|edges| ComputedPath {
                cost: alternate.distance[destination],
                edges,
            })
        } else {
            None
        };

        routes.push(ComputedRoute {
            destination: *destination,
            primary,
            backup,
        });
    }
    routes
}
