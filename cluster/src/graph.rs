use std::collections::{HashMap, VecDeque};

use serde_json::Value;

use crate::{ClusterError, KubeResource, ResourceKey};

/// One object waiting to be created, already serialized.
#[derive(Clone, Debug)]
pub struct Declared {
    pub key: ResourceKey,
    pub body: Value,
    pub depends_on: Vec<ResourceKey>,
}

/// Typed objects plus the "must exist before" edges between them.
///
/// Dependencies may name objects declared later; they are resolved when the
/// graph is ordered.
#[derive(Clone, Debug, Default)]
pub struct ResourceGraph {
    nodes: Vec<Declared>,
    index: HashMap<ResourceKey, usize>,
}

impl ResourceGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn declare<R, I>(&mut self, resource: &R, depends_on: I) -> Result<ResourceKey, ClusterError>
    where
        R: KubeResource,
        I: IntoIterator<Item = ResourceKey>,
    {
        let key = resource.key();
        if self.index.contains_key(&key) {
            return Err(ClusterError::DuplicateResource {
                key: key.to_string(),
            });
        }
        let body = serde_json::to_value(resource)?;
        tracing::debug!(resource = %key, "declared resource");
        self.index.insert(key.clone(), self.nodes.len());
        self.nodes.push(Declared {
            key: key.clone(),
            body,
            depends_on: depends_on.into_iter().collect(),
        });
        Ok(key)
    }

    pub fn contains(&self, key: &ResourceKey) -> bool {
        self.index.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Orders the graph so every object comes after its dependencies.
    ///
    /// Independent objects keep their declaration order. Self-dependencies
    /// are ignored.
    pub fn topo_order(&self) -> Result<Vec<&Declared>, ClusterError> {
        let n = self.nodes.len();
        let mut indeg = vec![0usize; n];
        let mut out: Vec<Vec<usize>> = vec![Vec::new(); n];

        for (v, node) in self.nodes.iter().enumerate() {
            for dep in &node.depends_on {
                let Some(&u) = self.index.get(dep) else {
                    return Err(ClusterError::UnknownDependency {
                        resource: node.key.to_string(),
                        dependency: dep.to_string(),
                    });
                };
                if u != v {
                    out[u].push(v);
                }
            }
        }

        for out in &mut out {
            out.sort_unstable();
            out.dedup();
            for &v in out.iter() {
                indeg[v] += 1;
            }
        }

        let mut q: VecDeque<usize> = (0..n).filter(|&i| indeg[i] == 0).collect();
        let mut order = Vec::with_capacity(n);
        while let Some(u) = q.pop_front() {
            order.push(&self.nodes[u]);
            for &v in &out[u] {
                indeg[v] -= 1;
                if indeg[v] == 0 {
                    q.push_back(v);
                }
            }
        }

        if order.len() == n {
            return Ok(order);
        }

        let cycle = find_cycle(&out, &indeg)
            .into_iter()
            .map(|i| self.nodes[i].key.to_string())
            .collect();
        Err(ClusterError::Cycle { cycle })
    }
}

fn find_cycle(out: &[Vec<usize>], indeg: &[usize]) -> Vec<usize> {
    let n = out.len();
    let mut state = vec![0u8; n];
    let mut stack = Vec::new();

    fn dfs(
        u: usize,
        out: &[Vec<usize>],
        indeg: &[usize],
        state: &mut [u8],
        stack: &mut Vec<usize>,
    ) -> Option<Vec<usize>> {
        state[u] = 1;
        stack.push(u);

        for &v in &out[u] {
            if indeg[v] == 0 {
                continue;
            }
            match state[v] {
                0 => {
                    if let Some(cycle) = dfs(v, out, indeg, state, stack) {
                        return Some(cycle);
                    }
                }
                1 => {
                    let start = stack.iter().position(|&node| node == v)?;
                    let mut cycle = stack[start..].to_vec();
                    cycle.push(v);
                    return Some(cycle);
                }
                _ => {}
            }
        }

        stack.pop();
        state[u] = 2;
        None
    }

    for u in 0..n {
        if indeg[u] == 0 || state[u] != 0 {
            continue;
        }
        if let Some(cycle) = dfs(u, out, indeg, &mut state, &mut stack) {
            return cycle;
        }
    }
    Vec::new()
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::resources::{Namespace, ServiceAccount};

    fn sa(name: &str) -> ServiceAccount {
        ServiceAccount::new(name, "ns1", BTreeMap::new())
    }

    fn names(order: &[&Declared]) -> Vec<String> {
        order.iter().map(|d| d.key.name.clone()).collect()
    }

    #[test]
    fn independent_resources_keep_declaration_order() {
        let mut graph = ResourceGraph::new();
        for name in ["c", "a", "b"] {
            graph.declare(&sa(name), []).unwrap();
        }
        assert_eq!(names(&graph.topo_order().unwrap()), ["c", "a", "b"]);
    }

    #[test]
    fn dependencies_declared_later_come_first() {
        let mut graph = ResourceGraph::new();
        let ns_key = ResourceKey::namespace_key("ns1");
        graph.declare(&sa("a"), [ns_key.clone()]).unwrap();
        graph
            .declare(&Namespace::new("ns1", BTreeMap::new()), [])
            .unwrap();
        assert_eq!(names(&graph.topo_order().unwrap()), ["ns1", "a"]);
    }

    #[test]
    fn duplicate_and_unknown_resources_are_rejected() {
        let mut graph = ResourceGraph::new();
        graph.declare(&sa("a"), []).unwrap();
        let err = graph.declare(&sa("a"), []).unwrap_err();
        assert!(matches!(err, ClusterError::DuplicateResource { .. }));

        graph
            .declare(&sa("b"), [ResourceKey::namespace_key("missing")])
            .unwrap();
        let err = graph.topo_order().unwrap_err();
        assert!(matches!(err, ClusterError::UnknownDependency { .. }));
    }

    #[test]
    fn cycles_are_reported_as_a_closed_path() {
        let mut graph = ResourceGraph::new();
        let key = |n: &str| sa(n).key();
        graph.declare(&sa("a"), [key("c")]).unwrap();
        graph.declare(&sa("b"), [key("a")]).unwrap();
        graph.declare(&sa("c"), [key("b")]).unwrap();
        graph.declare(&sa("free"), [key("free")]).unwrap();

        let ClusterError::Cycle { cycle } = graph.topo_order().unwrap_err() else {
            panic!("expected a cycle");
        };
        assert_eq!(cycle.len(), 4);
        assert_eq!(cycle.first(), cycle.last());
        assert!(!cycle.iter().any(|k| k.ends_with("/free")));
    }
}
