//! Module dependency graph.
//!
//! Edges point from a module to each module it depends on.

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::{Dfs, EdgeRef};
use std::collections::{BTreeMap, BTreeSet};

use super::ConfigurationError;

#[derive(Debug, Clone, Default)]
pub struct ModuleGraph {
    graph: DiGraph<String, ()>,
    node_map: BTreeMap<String, NodeIndex>,
}

impl ModuleGraph {
    /// Build the graph from `(module id, dependency ids)` pairs.
    ///
    /// Fails on a dependency that names no module, and on any cycle.
    pub fn build<'a, I>(modules: I) -> Result<Self, ConfigurationError>
    where
        I: IntoIterator<Item = (&'a str, &'a [String])> + Clone,
    {
        let mut graph = DiGraph::new();
        let mut node_map = BTreeMap::new();

        for (id, _) in modules.clone() {
            let idx = graph.add_node(id.to_string());
            node_map.insert(id.to_string(), idx);
        }

        for (id, deps) in modules {
            let from = node_map[id];
            for dep in deps {
                let to = *node_map.get(dep.as_str()).ok_or_else(|| {
                    ConfigurationError::UnresolvedDependency {
                        module: id.to_string(),
                        dependency: dep.clone(),
                    }
                })?;
                graph.update_edge(from, to, ());
            }
        }

        let this = Self { graph, node_map };
        this.check_cycles()?;
        Ok(this)
    }

    fn check_cycles(&self) -> Result<(), ConfigurationError> {
        for component in petgraph::algo::tarjan_scc(&self.graph) {
            let is_cycle = component.len() > 1
                || component
                    .first()
                    .is_some_and(|&n| self.graph.contains_edge(n, n));
            if is_cycle {
                let mut modules: Vec<String> = component
                    .into_iter()
                    .map(|n| self.graph[n].clone())
                    .collect();
                modules.sort();
                return Err(ConfigurationError::DependencyCycle { modules });
            }
        }
        Ok(())
    }

    fn dependencies(&self, idx: NodeIndex) -> impl Iterator<Item = NodeIndex> + '_ {
        self.graph.edges(idx).map(|e| e.target())
    }

    /// Module ids with dependencies first, ties broken by id.
    pub fn order(&self) -> Vec<String> {
        let mut remaining: BTreeMap<&str, usize> = self
            .node_map
            .iter()
            .map(|(id, &idx)| (id.as_str(), self.dependencies(idx).count()))
            .collect();
        let mut ready: BTreeSet<&str> = remaining
            .iter()
            .filter(|(_, count)| **count == 0)
            .map(|(id, _)| *id)
            .collect();
        let mut order = Vec::with_capacity(self.node_map.len());

        while let Some(id) = ready.pop_first() {
            remaining.remove(id);
            order.push(id.to_string());

            let idx = self.node_map[id];
            for dependent in self
                .graph
                .neighbors_directed(idx, petgraph::Direction::Incoming)
            {
                let dependent_id = self.graph[dependent].as_str();
                if let Some(count) = remaining.get_mut(dependent_id) {
                    *count -= 1;
                    if *count == 0 {
                        ready.insert(dependent_id);
                    }
                }
            }
        }

        order
    }

    /// Group modules into levels: every module's dependencies sit in
    /// earlier levels. Modules within a level are independent.
    pub fn levels(&self) -> Vec<Vec<String>> {
        let mut level_of: BTreeMap<String, usize> = BTreeMap::new();
        let mut levels: Vec<Vec<String>> = Vec::new();

        for id in self.order() {
            let idx = self.node_map[&id];
            let level = self
                .dependencies(idx)
                .filter_map(|dep| level_of.get(&self.graph[dep]))
                .map(|l| l + 1)
                .max()
                .unwrap_or(0);
            if levels.len() <= level {
                levels.resize_with(level + 1, Vec::new);
            }
            levels[level].push(id.clone());
            level_of.insert(id, level);
        }

        levels
    }

    /// The module plus everything it transitively depends on.
    pub fn closure(&self, id: &str) -> Option<BTreeSet<String>> {
        let start = *self.node_map.get(id)?;
        let mut dfs = Dfs::new(&self.graph, start);
        let mut out = BTreeSet::new();
        while let Some(idx) = dfs.next(&self.graph) {
            out.insert(self.graph[idx].clone());
        }
        Some(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(edges: &[(&str, &[&str])]) -> Result<ModuleGraph, ConfigurationError> {
        let owned: Vec<(String, Vec<String>)> = edges
            .iter()
            .map(|(id, deps)| (id.to_string(), deps.iter().map(|d| d.to_string()).collect()))
            .collect();
        ModuleGraph::build(owned.iter().map(|(id, deps)| (id.as_str(), deps.as_slice())))
    }

    #[test]
    fn order_puts_dependencies_first() {
        let graph = build(&[("app", &["web", "core"]), ("web", &["core"]), ("core", &[])]).unwrap();
        assert_eq!(graph.order(), vec!["core", "web", "app"]);
    }

    #[test]
    fn order_is_deterministic_for_independent_modules() {
        let graph = build(&[("c", &[]), ("a", &[]), ("b", &[])]).unwrap();
        assert_eq!(graph.order(), vec!["a", "b", "c"]);
    }

    #[test]
    fn levels_group_independent_modules() {
        let graph = build(&[
            ("core", &[]),
            ("util", &[]),
            ("web", &["core"]),
            ("cli", &["core", "util"]),
            ("app", &["web", "cli"]),
        ])
        .unwrap();
        assert_eq!(
            graph.levels(),
            vec![
                vec!["core".to_string(), "util".to_string()],
                vec!["cli".to_string(), "web".to_string()],
                vec!["app".to_string()],
            ]
        );
    }

    #[test]
    fn closure_follows_transitive_dependencies() {
        let graph = build(&[("a", &[]), ("b", &["a"]), ("c", &["b"]), ("d", &[])]).unwrap();
        let closure = graph.closure("c").unwrap();
        assert_eq!(
            closure.into_iter().collect::<Vec<_>>(),
            vec!["a", "b", "c"]
        );
        assert!(graph.closure("missing").is_none());
    }

    #[test]
    fn cycle_is_reported_with_members() {
        let err = build(&[("a", &["b"]), ("b", &["c"]), ("c", &["a"]), ("d", &[])]).unwrap_err();
        match err {
            ConfigurationError::DependencyCycle { modules } => {
                assert_eq!(modules, vec!["a", "b", "c"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn self_dependency_is_a_cycle() {
        let err = build(&[("a", &["a"])]).unwrap_err();
        assert!(matches!(err, ConfigurationError::DependencyCycle { .. }));
    }

    #[test]
    fn unresolved_dependency() {
        let err = build(&[("a", &["ghost"])]).unwrap_err();
        assert!(matches!(
            err,
            ConfigurationError::UnresolvedDependency { ref dependency, .. } if dependency == "ghost"
        ));
    }
}
