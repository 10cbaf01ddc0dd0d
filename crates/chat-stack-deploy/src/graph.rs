//! Resource graph with deployment and teardown ordering
//!
//! Declared resources are nodes; explicit precedence edges mean "from must
//! be ready before to is created". Creation order is a stable topological
//! sort (ties follow declaration order, so plans diff cleanly between
//! runs). Teardown order is the creation order reversed, except around
//! nodes marked as side-effecting teardown actions, whose neighbors keep
//! creation direction so the action runs after its producers are gone and
//! before its host is removed.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};

use serde_json::Value;
use thiserror::Error;

use chat_stack_common::ResourceKind;

/// Ordering errors, reported synchronously at order-computation time
#[derive(Debug, Error)]
pub enum GraphError {
    /// A node id was declared twice
    #[error("duplicate resource node '{0}'")]
    DuplicateNode(String),

    /// An edge or override references an undeclared node
    #[error("unknown resource node '{0}'")]
    UnknownNode(String),

    /// The precedence edges admit no valid order
    #[error("dependency cycle: {}", cycle.join(" -> "))]
    CycleDetected { cycle: Vec<String> },
}

/// A declared resource awaiting provisioning
///
/// The `spec` payload is opaque to the orderer; it is passed through
/// verbatim to the plan consumer.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ResourceNode {
    pub id: String,
    pub kind: ResourceKind,
    pub spec: Value,
}

impl ResourceNode {
    pub fn new(id: impl Into<String>, kind: ResourceKind, spec: Value) -> Self {
        Self {
            id: id.into(),
            kind,
            spec,
        }
    }
}

/// Flat node/edge declaration of one deployment
///
/// Built once per deployment invocation and handed to the plan layer; there
/// is no shared global builder.
#[derive(Debug, Default)]
pub struct ResourceGraph {
    nodes: Vec<ResourceNode>,
    index: HashMap<String, usize>,
    edges: Vec<(usize, usize)>,
    /// (action, host) pairs declared via [`Self::mark_teardown_action`]
    overrides: Vec<(usize, usize)>,
}

impl ResourceGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: &str) -> Option<&ResourceNode> {
        self.index.get(id).map(|&i| &self.nodes[i])
    }

    pub fn nodes(&self) -> impl Iterator<Item = &ResourceNode> {
        self.nodes.iter()
    }

    /// Register a resource declaration
    pub fn add_node(&mut self, node: ResourceNode) -> Result<(), GraphError> {
        if self.index.contains_key(&node.id) {
            return Err(GraphError::DuplicateNode(node.id));
        }
        self.index.insert(node.id.clone(), self.nodes.len());
        self.nodes.push(node);
        Ok(())
    }

    /// Record that `from` must be ready before `to` starts creation
    pub fn add_edge(&mut self, from: &str, to: &str) -> Result<(), GraphError> {
        let from = self.resolve(from)?;
        let to = self.resolve(to)?;
        self.edges.push((from, to));
        Ok(())
    }

    /// Mark `action` as a side-effecting teardown step hosted by `host`
    ///
    /// In the teardown order, every node with a creation edge into `action`
    /// is destroyed before the action runs, and the action completes before
    /// `host` is removed. Call once per host for actions with more than one
    /// supporting resource; independent actions do not interact.
    pub fn mark_teardown_action(&mut self, action: &str, host: &str) -> Result<(), GraphError> {
        let action = self.resolve(action)?;
        let host = self.resolve(host)?;
        self.overrides.push((action, host));
        Ok(())
    }

    fn resolve(&self, id: &str) -> Result<usize, GraphError> {
        self.index
            .get(id)
            .copied()
            .ok_or_else(|| GraphError::UnknownNode(id.to_string()))
    }

    /// Sequence in which the resources must be created
    pub fn creation_order(&self) -> Result<Vec<&ResourceNode>, GraphError> {
        let order = self.creation_order_indices()?;
        Ok(order.into_iter().map(|i| &self.nodes[i]).collect())
    }

    /// Sequence in which the resources must be destroyed
    ///
    /// Pure reversal of the creation order, modulo teardown-action
    /// overrides. The combined teardown constraints must themselves be
    /// acyclic or `CycleDetected` is returned.
    pub fn destruction_order(&self) -> Result<Vec<&ResourceNode>, GraphError> {
        let creation = self.creation_order_indices()?;
        let n = self.nodes.len();

        // Rank by reverse creation position: with no overrides this makes
        // the teardown sort reproduce the creation order exactly reversed.
        let mut rank = vec![0usize; n];
        for (pos, &node) in creation.iter().enumerate() {
            rank[node] = n - 1 - pos;
        }

        let actions: HashSet<usize> = self.overrides.iter().map(|&(action, _)| action).collect();
        let pairs: HashSet<(usize, usize)> = self.overrides.iter().copied().collect();

        let mut edges = Vec::with_capacity(self.edges.len() + self.overrides.len());
        for &(from, to) in &self.edges {
            if pairs.contains(&(from, to)) || pairs.contains(&(to, from)) {
                // Ordering between an action and its host comes from the
                // override entry below.
                continue;
            }
            if actions.contains(&from) || actions.contains(&to) {
                // Neighbors of an action keep creation direction: whatever
                // produced the dynamic resources is gone before the action
                // runs.
                edges.push((from, to));
            } else {
                edges.push((to, from));
            }
        }
        for &(action, host) in &self.overrides {
            edges.push((action, host));
        }

        let order = self.topo_sort(&edges, &rank)?;
        Ok(order.into_iter().map(|i| &self.nodes[i]).collect())
    }

    fn creation_order_indices(&self) -> Result<Vec<usize>, GraphError> {
        let rank: Vec<usize> = (0..self.nodes.len()).collect();
        self.topo_sort(&self.edges, &rank)
    }

    /// Kahn's algorithm; among ready nodes the one with the smallest rank
    /// is emitted first.
    fn topo_sort(&self, edges: &[(usize, usize)], rank: &[usize]) -> Result<Vec<usize>, GraphError> {
        let n = self.nodes.len();
        let mut adjacency = vec![Vec::new(); n];
        let mut indegree = vec![0usize; n];
        for &(from, to) in edges {
            adjacency[from].push(to);
            indegree[to] += 1;
        }

        let mut ready: BinaryHeap<Reverse<(usize, usize)>> = (0..n)
            .filter(|&i| indegree[i] == 0)
            .map(|i| Reverse((rank[i], i)))
            .collect();

        let mut order = Vec::with_capacity(n);
        while let Some(Reverse((_, node))) = ready.pop() {
            order.push(node);
            for &next in &adjacency[node] {
                indegree[next] -= 1;
                if indegree[next] == 0 {
                    ready.push(Reverse((rank[next], next)));
                }
            }
        }

        if order.len() < n {
            let placed: HashSet<usize> = order.iter().copied().collect();
            return Err(GraphError::CycleDetected {
                cycle: self.extract_cycle(edges, &placed),
            });
        }
        Ok(order)
    }

    /// Walk predecessors among the unplaced nodes until one repeats; the
    /// repeated segment, reversed, is a cycle in edge direction.
    fn extract_cycle(&self, edges: &[(usize, usize)], placed: &HashSet<usize>) -> Vec<String> {
        let mut pred: HashMap<usize, usize> = HashMap::new();
        for &(from, to) in edges {
            if !placed.contains(&from) && !placed.contains(&to) {
                pred.entry(to).or_insert(from);
            }
        }

        let Some(start) = (0..self.nodes.len()).find(|i| !placed.contains(i)) else {
            return Vec::new();
        };

        let mut seen: HashMap<usize, usize> = HashMap::new();
        let mut walk: Vec<usize> = Vec::new();
        let mut current = start;
        loop {
            if let Some(&first) = seen.get(&current) {
                return walk[first..]
                    .iter()
                    .rev()
                    .map(|&i| self.nodes[i].id.clone())
                    .collect();
            }
            seen.insert(current, walk.len());
            walk.push(current);
            match pred.get(&current) {
                Some(&p) => current = p,
                // Unreachable for nodes left behind by Kahn's algorithm,
                // which all retain an unplaced predecessor.
                None => return vec![self.nodes[current].id.clone()],
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn node(id: &str, kind: ResourceKind) -> ResourceNode {
        ResourceNode::new(id, kind, json!({}))
    }

    fn graph(ids: &[&str], edges: &[(&str, &str)]) -> ResourceGraph {
        let mut g = ResourceGraph::new();
        for id in ids {
            g.add_node(node(id, ResourceKind::Compute)).unwrap();
        }
        for (from, to) in edges {
            g.add_edge(from, to).unwrap();
        }
        g
    }

    fn position(order: &[&ResourceNode], id: &str) -> usize {
        order
            .iter()
            .position(|n| n.id == id)
            .unwrap_or_else(|| panic!("node {id} missing from order"))
    }

    #[test]
    fn creation_order_respects_every_edge() {
        let edges = [("a", "c"), ("b", "c"), ("c", "d"), ("b", "e")];
        let g = graph(&["a", "b", "c", "d", "e"], &edges);
        let order = g.creation_order().unwrap();

        assert_eq!(order.len(), 5);
        for (from, to) in edges {
            assert!(
                position(&order, from) < position(&order, to),
                "{from} must precede {to}"
            );
        }
    }

    #[test]
    fn unconstrained_nodes_keep_declaration_order() {
        let g = graph(&["zeta", "alpha", "mid"], &[]);
        let order = g.creation_order().unwrap();
        let ids: Vec<_> = order.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, ["zeta", "alpha", "mid"]);
    }

    #[test]
    fn duplicate_node_is_rejected() {
        let mut g = ResourceGraph::new();
        g.add_node(node("vpc", ResourceKind::Network)).unwrap();
        let err = g.add_node(node("vpc", ResourceKind::Network)).unwrap_err();
        assert!(matches!(err, GraphError::DuplicateNode(id) if id == "vpc"));
    }

    #[test]
    fn edge_with_unknown_endpoint_is_rejected() {
        let mut g = ResourceGraph::new();
        g.add_node(node("vpc", ResourceKind::Network)).unwrap();

        let err = g.add_edge("vpc", "missing").unwrap_err();
        assert!(matches!(err, GraphError::UnknownNode(id) if id == "missing"));

        let err = g.add_edge("missing", "vpc").unwrap_err();
        assert!(matches!(err, GraphError::UnknownNode(id) if id == "missing"));

        let err = g.mark_teardown_action("missing", "vpc").unwrap_err();
        assert!(matches!(err, GraphError::UnknownNode(id) if id == "missing"));
    }

    #[test]
    fn cycle_is_reported_with_its_node_sequence() {
        let g = graph(&["a", "b", "c"], &[("a", "b"), ("b", "c"), ("c", "a")]);

        let err = g.creation_order().unwrap_err();
        let GraphError::CycleDetected { cycle } = err else {
            panic!("expected CycleDetected, got {err:?}");
        };

        // The reported sequence must actually trace edges of the graph.
        assert_eq!(cycle.len(), 3);
        let edges: HashSet<(&str, &str)> = [("a", "b"), ("b", "c"), ("c", "a")].into();
        for i in 0..cycle.len() {
            let from = cycle[i].as_str();
            let to = cycle[(i + 1) % cycle.len()].as_str();
            assert!(edges.contains(&(from, to)), "{from} -> {to} is not an edge");
        }
    }

    #[test]
    fn cycle_in_a_larger_graph_never_yields_a_partial_order() {
        // d and e are orderable on their own; the cycle must still fail the
        // whole computation.
        let g = graph(
            &["a", "b", "d", "e"],
            &[("a", "b"), ("b", "a"), ("d", "e")],
        );
        assert!(matches!(
            g.creation_order(),
            Err(GraphError::CycleDetected { .. })
        ));
    }

    #[test]
    fn destruction_is_exact_reverse_without_overrides() {
        let g = graph(
            &["net", "store", "host", "lb", "dns"],
            &[("net", "host"), ("store", "host"), ("host", "lb"), ("lb", "dns")],
        );
        let creation: Vec<_> = g
            .creation_order()
            .unwrap()
            .iter()
            .map(|n| n.id.clone())
            .collect();
        let destruction: Vec<_> = g
            .destruction_order()
            .unwrap()
            .iter()
            .map(|n| n.id.clone())
            .collect();

        let mut reversed = creation.clone();
        reversed.reverse();
        assert_eq!(destruction, reversed);
    }

    #[test]
    fn teardown_action_runs_after_producers_and_before_its_host() {
        // Creation chain: network/storage -> compute -> balancer ->
        // cleanup-trigger -> cleanup-fn, where the trigger is the
        // side-effecting action and the function hosts it.
        let mut g = ResourceGraph::new();
        g.add_node(node("network", ResourceKind::Network)).unwrap();
        g.add_node(node("storage", ResourceKind::Storage)).unwrap();
        g.add_node(node("compute", ResourceKind::Compute)).unwrap();
        g.add_node(node("balancer", ResourceKind::LoadBalancer))
            .unwrap();
        g.add_node(node("cleanup-fn", ResourceKind::Function))
            .unwrap();
        g.add_node(node("cleanup-trigger", ResourceKind::CustomAction))
            .unwrap();

        g.add_edge("network", "compute").unwrap();
        g.add_edge("storage", "compute").unwrap();
        g.add_edge("compute", "balancer").unwrap();
        g.add_edge("balancer", "cleanup-trigger").unwrap();
        g.add_edge("cleanup-trigger", "cleanup-fn").unwrap();
        g.mark_teardown_action("cleanup-trigger", "cleanup-fn")
            .unwrap();

        let creation = g.creation_order().unwrap();
        assert!(position(&creation, "network") < position(&creation, "compute"));
        assert!(position(&creation, "storage") < position(&creation, "compute"));
        assert!(position(&creation, "compute") < position(&creation, "balancer"));
        assert!(position(&creation, "balancer") < position(&creation, "cleanup-trigger"));
        assert!(position(&creation, "cleanup-trigger") < position(&creation, "cleanup-fn"));

        let destruction = g.destruction_order().unwrap();
        assert_eq!(destruction.len(), 6);
        // The balancer is gone before the cleanup runs, and the cleanup
        // completes before its function is removed.
        assert!(position(&destruction, "balancer") < position(&destruction, "cleanup-trigger"));
        assert!(position(&destruction, "cleanup-trigger") < position(&destruction, "cleanup-fn"));
        // Plain edges still reverse.
        assert!(position(&destruction, "balancer") < position(&destruction, "compute"));
        assert!(position(&destruction, "compute") < position(&destruction, "network"));
        assert!(position(&destruction, "compute") < position(&destruction, "storage"));
    }

    #[test]
    fn host_declared_before_action_still_outlives_the_run() {
        // Natural declaration shape: the function exists before the action
        // registers against it.
        let g = {
            let mut g = graph(
                &["fleet", "fn", "cleanup"],
                &[("fn", "cleanup"), ("fleet", "cleanup")],
            );
            g.mark_teardown_action("cleanup", "fn").unwrap();
            g
        };

        let creation = g.creation_order().unwrap();
        assert!(position(&creation, "fn") < position(&creation, "cleanup"));

        let destruction = g.destruction_order().unwrap();
        assert!(position(&destruction, "fleet") < position(&destruction, "cleanup"));
        assert!(position(&destruction, "cleanup") < position(&destruction, "fn"));
    }

    #[test]
    fn independent_teardown_actions_do_not_interact() {
        let mut g = graph(
            &["app-a", "fn-a", "act-a", "app-b", "fn-b", "act-b"],
            &[
                ("fn-a", "act-a"),
                ("app-a", "act-a"),
                ("fn-b", "act-b"),
                ("app-b", "act-b"),
            ],
        );
        g.mark_teardown_action("act-a", "fn-a").unwrap();
        g.mark_teardown_action("act-b", "fn-b").unwrap();

        let destruction = g.destruction_order().unwrap();
        assert!(position(&destruction, "app-a") < position(&destruction, "act-a"));
        assert!(position(&destruction, "act-a") < position(&destruction, "fn-a"));
        assert!(position(&destruction, "app-b") < position(&destruction, "act-b"));
        assert!(position(&destruction, "act-b") < position(&destruction, "fn-b"));
    }

    #[test]
    fn contradictory_teardown_constraints_are_a_cycle() {
        // The override forces action -> fn in teardown, plain reversal
        // forces fn -> z, and the action edge keeps z -> action, closing a
        // loop that exists in the teardown graph only.
        let mut g = graph(&["z", "action", "fn"], &[("z", "action"), ("z", "fn")]);
        g.mark_teardown_action("action", "fn").unwrap();

        assert!(g.creation_order().is_ok());
        assert!(matches!(
            g.destruction_order(),
            Err(GraphError::CycleDetected { .. })
        ));
    }

    #[test]
    fn orders_are_deterministic_across_runs() {
        let build = || {
            graph(
                &["a", "b", "c", "d", "e", "f"],
                &[("a", "d"), ("b", "d"), ("c", "e"), ("d", "f"), ("e", "f")],
            )
        };
        let first: Vec<_> = build()
            .creation_order()
            .unwrap()
            .iter()
            .map(|n| n.id.clone())
            .collect();
        let second: Vec<_> = build()
            .creation_order()
            .unwrap()
            .iter()
            .map(|n| n.id.clone())
            .collect();
        assert_eq!(first, second);
    }
}
