use std::collections::HashMap;
use std::sync::Arc;

use crate::error::GraphError;

/// One node's declared edges, as recorded at registration time.
#[derive(Debug, Clone)]
pub(crate) struct NodeSpec {
    pub name: Arc<str>,
    pub depends: Vec<Arc<str>>,
    pub order_only: Vec<Arc<str>>,
}

/// Validated task dependency graph (DAG).
///
/// Nodes are indexed in definition order. Hard edges carry ordering plus a
/// readable result; order-only edges carry ordering alone. Both edge kinds
/// participate in cycle detection and closure computation.
#[derive(Debug, Clone)]
pub struct TaskGraph {
    names: Vec<Arc<str>>,
    index: HashMap<Arc<str>, usize>,
    hard: Vec<Vec<usize>>,
    order_only: Vec<Vec<usize>>,
}

impl TaskGraph {
    pub(crate) fn build(nodes: &[NodeSpec]) -> Result<Self, GraphError> {
        let mut index = HashMap::new();
        let mut names = Vec::with_capacity(nodes.len());
        for (i, node) in nodes.iter().enumerate() {
            // The registry rejects duplicates already; a second check here
            // keeps the graph self-contained.
            if index.insert(node.name.clone(), i).is_some() {
                return Err(GraphError::DuplicateTask(node.name.to_string()));
            }
            names.push(node.name.clone());
        }

        let resolve_edges = |task: &Arc<str>, deps: &[Arc<str>]| {
            deps.iter()
                .map(|dep| {
                    index
                        .get(dep)
                        .copied()
                        .ok_or_else(|| GraphError::MissingDependency {
                            task: task.to_string(),
                            missing: dep.to_string(),
                        })
                })
                .collect::<Result<Vec<usize>, GraphError>>()
        };

        let mut hard = Vec::with_capacity(nodes.len());
        let mut order_only = Vec::with_capacity(nodes.len());
        for node in nodes {
            hard.push(resolve_edges(&node.name, &node.depends)?);
            order_only.push(resolve_edges(&node.name, &node.order_only)?);
        }

        let graph = Self {
            names,
            index,
            hard,
            order_only,
        };

        if let Some(cycle) = graph.detect_cycle() {
            return Err(GraphError::Cycle(cycle));
        }

        Ok(graph)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn name(&self, idx: usize) -> &Arc<str> {
        &self.names[idx]
    }

    pub fn resolve(&self, name: &str) -> Result<usize, GraphError> {
        self.index
            .get(name)
            .copied()
            .ok_or_else(|| GraphError::UnknownTask(name.to_string()))
    }

    /// Hard dependencies of a node.
    pub(crate) fn hard_deps(&self, idx: usize) -> &[usize] {
        &self.hard[idx]
    }

    /// Order-only dependencies of a node.
    pub(crate) fn order_deps(&self, idx: usize) -> &[usize] {
        &self.order_only[idx]
    }

    /// The induced subgraph of the requested tasks: transitive closure over
    /// hard and order-only edges, in ascending definition order.
    pub(crate) fn closure(&self, requested: &[usize]) -> Vec<usize> {
        let mut seen = vec![false; self.names.len()];
        let mut stack: Vec<usize> = requested.to_vec();
        while let Some(idx) = stack.pop() {
            if std::mem::replace(&mut seen[idx], true) {
                continue;
            }
            stack.extend(self.hard[idx].iter().copied());
            stack.extend(self.order_only[idx].iter().copied());
        }
        (0..self.names.len()).filter(|&i| seen[i]).collect()
    }

    /// Whether `to` is reachable from `from` through hard edges alone.
    /// Order-only edges grant ordering, not results.
    pub(crate) fn hard_reachable(&self, from: usize, to: usize) -> bool {
        let mut seen = vec![false; self.names.len()];
        let mut stack = vec![from];
        while let Some(idx) = stack.pop() {
            if std::mem::replace(&mut seen[idx], true) {
                continue;
            }
            for &dep in &self.hard[idx] {
                if dep == to {
                    return true;
                }
                stack.push(dep);
            }
        }
        false
    }

    /// DFS cycle detection over both edge kinds, returning the cycle as a
    /// `a -> b -> a` path for the error message.
    fn detect_cycle(&self) -> Option<String> {
        let mut visited = vec![false; self.names.len()];
        let mut path = Vec::new();

        for start in 0..self.names.len() {
            if !visited[start] && self.dfs_cycle(start, &mut visited, &mut path) {
                let rendered: Vec<&str> = path.iter().map(|&i| self.names[i].as_ref()).collect();
                return Some(rendered.join(" -> "));
            }
        }

        None
    }

    fn dfs_cycle(&self, node: usize, visited: &mut Vec<bool>, path: &mut Vec<usize>) -> bool {
        visited[node] = true;
        path.push(node);

        let edges = self.hard[node].iter().chain(self.order_only[node].iter());
        for &dep in edges {
            if let Some(pos) = path.iter().position(|&p| p == dep) {
                path.push(dep);
                *path = path[pos..].to_vec();
                return true;
            }
            if !visited[dep] && self.dfs_cycle(dep, visited, path) {
                return true;
            }
        }

        path.pop();
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(name: &str, depends: &[&str], order_only: &[&str]) -> NodeSpec {
        NodeSpec {
            name: Arc::from(name),
            depends: depends.iter().map(|d| Arc::from(*d)).collect(),
            order_only: order_only.iter().map(|d| Arc::from(*d)).collect(),
        }
    }

    #[test]
    fn missing_dependency_is_named() {
        let err = TaskGraph::build(&[node("build", &["configure"], &[])]).unwrap_err();
        match err {
            GraphError::MissingDependency { task, missing } => {
                assert_eq!(task, "build");
                assert_eq!(missing, "configure");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn cycle_error_names_the_cycle() {
        let err = TaskGraph::build(&[
            node("a", &["b"], &[]),
            node("b", &[], &["c"]),
            node("c", &["a"], &[]),
        ])
        .unwrap_err();
        match err {
            GraphError::Cycle(path) => {
                // The path must loop back to its first element.
                let parts: Vec<&str> = path.split(" -> ").collect();
                assert!(parts.len() >= 3);
                assert_eq!(parts.first(), parts.last());
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn self_cycle_is_detected() {
        let err = TaskGraph::build(&[node("a", &[], &["a"])]).unwrap_err();
        assert!(matches!(err, GraphError::Cycle(_)));
    }

    #[test]
    fn closure_spans_both_edge_kinds() {
        let graph = TaskGraph::build(&[
            node("clean", &[], &[]),
            node("a", &[], &["clean"]),
            node("b", &["a"], &[]),
            node("c", &[], &["clean"]),
        ])
        .unwrap();

        let b = graph.resolve("b").unwrap();
        let closure = graph.closure(&[b]);
        let names: Vec<&str> = closure.iter().map(|&i| graph.name(i).as_ref()).collect();
        assert_eq!(names, vec!["clean", "a", "b"]);
    }

    #[test]
    fn hard_reachability_ignores_order_only_edges() {
        let graph = TaskGraph::build(&[
            node("clean", &[], &[]),
            node("a", &[], &["clean"]),
            node("b", &["a"], &[]),
        ])
        .unwrap();

        let (clean, a, b) = (
            graph.resolve("clean").unwrap(),
            graph.resolve("a").unwrap(),
            graph.resolve("b").unwrap(),
        );
        assert!(graph.hard_reachable(b, a));
        assert!(!graph.hard_reachable(b, clean));
        assert!(!graph.hard_reachable(a, clean));
    }
}
