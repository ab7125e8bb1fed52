//! Reverse dependency index between declarations.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};

use super::rules::DependencyTarget;
use crate::metadata::DeclarationId;

/// Edges are keyed by target string (a declaration name or id) so a
/// dependent can be registered before the declaration it points at.
#[derive(Debug, Default)]
pub struct DeclarationGraph {
    forward: HashMap<DeclarationId, Vec<DependencyTarget>>,
    reverse: HashMap<String, BTreeMap<DeclarationId, BTreeSet<Option<String>>>>,
}

/// One dependent reached during propagation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reached {
    pub declaration: DeclarationId,
    /// From the changed declaration to `declaration`, inclusive.
    pub path: Vec<DeclarationId>,
}

impl DeclarationGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace every outgoing edge of `id`.
    pub fn set_edges(&mut self, id: &DeclarationId, targets: Vec<DependencyTarget>) {
        self.remove(id);
        for target in &targets {
            self.reverse
                .entry(target.declaration.clone())
                .or_default()
                .entry(id.clone())
                .or_default()
                .insert(target.member.clone());
        }
        if !targets.is_empty() {
            self.forward.insert(id.clone(), targets);
        }
    }

    /// Drop every outgoing edge of `id`. Edges pointing at it stay.
    pub fn remove(&mut self, id: &DeclarationId) {
        let Some(targets) = self.forward.remove(id) else {
            return;
        };
        for target in targets {
            if let Some(dependents) = self.reverse.get_mut(&target.declaration) {
                dependents.remove(id);
                if dependents.is_empty() {
                    self.reverse.remove(&target.declaration);
                }
            }
        }
    }

    pub fn dependencies(&self, id: &DeclarationId) -> &[DependencyTarget] {
        self.forward.get(id).map(Vec::as_slice).unwrap_or_default()
    }

    /// Direct dependents of a declaration, known by id and by name.
    ///
    /// `changed` filters member-scoped edges: `None` means the whole
    /// declaration changed (or went away) and every edge fires.
    pub fn dependents(
        &self,
        id: &DeclarationId,
        name: &str,
        changed: Option<&BTreeSet<String>>,
    ) -> BTreeSet<DeclarationId> {
        let mut out = BTreeSet::new();
        for key in [id.as_str(), name] {
            let Some(dependents) = self.reverse.get(key) else {
                continue;
            };
            for (dependent, members) in dependents {
                let fires = members.iter().any(|member| match (member, changed) {
                    (None, _) | (_, None) => true,
                    (Some(m), Some(changed)) => changed.contains(m),
                });
                if fires && dependent != id {
                    out.insert(dependent.clone());
                }
            }
        }
        out
    }

    /// Breadth-first walk of everything that transitively depends on
    /// `origin`. The first hop honours member filters; later hops only
    /// follow whole-declaration edges since the intermediate declarations
    /// did not themselves change. `name_of` maps ids to names for lookup.
    pub fn propagate<'a>(
        &self,
        origin: &DeclarationId,
        origin_name: &str,
        changed: Option<&BTreeSet<String>>,
        name_of: impl Fn(&DeclarationId) -> Option<&'a str>,
    ) -> Vec<Reached> {
        let mut visited: HashSet<DeclarationId> = HashSet::new();
        visited.insert(origin.clone());
        let mut queue = VecDeque::new();
        let mut reached = Vec::new();

        for dependent in self.dependents(origin, origin_name, changed) {
            if visited.insert(dependent.clone()) {
                queue.push_back((dependent.clone(), vec![origin.clone(), dependent]));
            }
        }

        while let Some((current, path)) = queue.pop_front() {
            if let Some(name) = name_of(&current) {
                for next in self.whole_dependents(&current, name) {
                    if visited.insert(next.clone()) {
                        let mut next_path = path.clone();
                        next_path.push(next.clone());
                        queue.push_back((next, next_path));
                    }
                }
            }
            reached.push(Reached {
                declaration: current,
                path,
            });
        }
        reached
    }

    fn whole_dependents(&self, id: &DeclarationId, name: &str) -> BTreeSet<DeclarationId> {
        let mut out = BTreeSet::new();
        for key in [id.as_str(), name] {
            if let Some(dependents) = self.reverse.get(key) {
                out.extend(
                    dependents
                        .iter()
                        .filter(|(_, members)| members.contains(&None))
                        .map(|(dependent, _)| dependent.clone()),
                );
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn id(name: &str) -> DeclarationId {
        DeclarationId::new("m", Path::new("m/x.ts"), name)
    }

    fn names(id: &DeclarationId) -> Option<&'static str> {
        match id.name() {
            "A" => Some("A"),
            "B" => Some("B"),
            "C" => Some("C"),
            _ => None,
        }
    }

    #[test]
    fn dependents_by_name_and_member() {
        let mut graph = DeclarationGraph::new();
        graph.set_edges(&id("B"), vec![DependencyTarget::whole("A")]);
        graph.set_edges(&id("C"), vec![DependencyTarget::member("A", "two")]);

        let one: BTreeSet<String> = ["one".to_string()].into();
        let two: BTreeSet<String> = ["two".to_string()].into();

        assert_eq!(graph.dependents(&id("A"), "A", Some(&one)), [id("B")].into());
        assert_eq!(
            graph.dependents(&id("A"), "A", Some(&two)),
            [id("B"), id("C")].into()
        );
        assert_eq!(
            graph.dependents(&id("A"), "A", None),
            [id("B"), id("C")].into()
        );
    }

    #[test]
    fn propagation_terminates_on_cycles() {
        let mut graph = DeclarationGraph::new();
        graph.set_edges(&id("A"), vec![DependencyTarget::whole("B")]);
        graph.set_edges(&id("B"), vec![DependencyTarget::whole("A")]);

        let reached = graph.propagate(&id("A"), "A", None, names);
        assert_eq!(reached.len(), 1);
        assert_eq!(reached[0].declaration, id("B"));
        assert_eq!(reached[0].path, vec![id("A"), id("B")]);
    }

    #[test]
    fn transitive_paths_are_recorded() {
        let mut graph = DeclarationGraph::new();
        graph.set_edges(&id("B"), vec![DependencyTarget::whole("A")]);
        graph.set_edges(&id("C"), vec![DependencyTarget::whole("B")]);

        let reached = graph.propagate(&id("A"), "A", None, names);
        let paths: Vec<_> = reached.iter().map(|r| r.path.len()).collect();
        assert_eq!(paths, vec![2, 3]);
        assert_eq!(reached[1].path, vec![id("A"), id("B"), id("C")]);
    }

    #[test]
    fn replacing_edges_drops_old_ones() {
        let mut graph = DeclarationGraph::new();
        graph.set_edges(&id("B"), vec![DependencyTarget::whole("A")]);
        graph.set_edges(&id("B"), vec![DependencyTarget::whole("C")]);
        assert!(graph.dependents(&id("A"), "A", None).is_empty());
        assert_eq!(graph.dependencies(&id("B")).len(), 1);
    }
}
