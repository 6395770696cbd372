//! Directed dependency graph between sessions.
//!
//! An edge `dep -> id` means "`dep` must complete before `id` starts".
//! Edges are inserted through [`DependencyGraph::add_edges`], which rejects
//! any batch that would close a cycle before committing it, so the graph
//! is always acyclic.

use std::collections::{BTreeSet, HashMap, VecDeque};

use crate::models::session::SessionStatus;
use crate::{AppError, Result};

/// Adjacency structure with cycle-checked insertion.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    /// `id -> ids it depends on`.
    upstream: HashMap<String, BTreeSet<String>>,
    /// `id -> ids that depend on it`.
    downstream: HashMap<String, BTreeSet<String>>,
    /// Node insertion order for deterministic traversal.
    insertion_order: Vec<String>,
}

impl DependencyGraph {
    /// Creates an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `id` is a node of the graph.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.upstream.contains_key(id)
    }

    /// Number of nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.insertion_order.len()
    }

    /// Whether the graph has no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.insertion_order.is_empty()
    }

    /// Adds a node without edges. No-op if it already exists.
    pub fn add_node(&mut self, id: &str) {
        if self.contains(id) {
            return;
        }
        self.upstream.insert(id.to_owned(), BTreeSet::new());
        self.downstream.insert(id.to_owned(), BTreeSet::new());
        self.insertion_order.push(id.to_owned());
    }

    /// Record that `session_id` depends on every id in `dependency_ids`.
    ///
    /// `session_id` is added as a node if absent. Either every edge is
    /// committed or none is.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` if a dependency is not a node, or
    /// `AppError::CycleDetected` with the offending cycle if any new edge
    /// would make the graph cyclic.
    pub fn add_edges(&mut self, session_id: &str, dependency_ids: &[String]) -> Result<()> {
        for dep in dependency_ids {
            if dep != session_id && !self.contains(dep) {
                return Err(AppError::Validation(format!("unknown dependency {dep}")));
            }
        }

        // Every new edge points into `session_id`, so a cycle exists exactly
        // when `session_id` already reaches one of its new dependencies.
        for dep in dependency_ids {
            if let Some(mut path) = self.path_between(session_id, dep) {
                path.push(session_id.to_owned());
                return Err(AppError::CycleDetected { cycle: path });
            }
        }

        self.add_node(session_id);
        for dep in dependency_ids {
            if let Some(deps) = self.upstream.get_mut(session_id) {
                deps.insert(dep.clone());
            }
            if let Some(dependents) = self.downstream.get_mut(dep) {
                dependents.insert(session_id.to_owned());
            }
        }
        Ok(())
    }

    /// Direct dependencies of `id`, sorted.
    #[must_use]
    pub fn dependencies(&self, id: &str) -> Vec<String> {
        self.upstream
            .get(id)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Direct dependents of `id`, sorted.
    #[must_use]
    pub fn dependents(&self, id: &str) -> Vec<String> {
        self.downstream
            .get(id)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// True iff every dependency of `id` is `completed`.
    ///
    /// A dependency whose status is unknown counts as not completed.
    pub fn ready<F>(&self, id: &str, status_of: F) -> bool
    where
        F: Fn(&str) -> Option<SessionStatus>,
    {
        self.upstream.get(id).is_some_and(|deps| {
            deps.iter()
                .all(|dep| status_of(dep) == Some(SessionStatus::Completed))
        })
    }

    /// The first dependency of `id` that is `failed` or `cancelled`, if any.
    pub fn blocking_dependency<F>(&self, id: &str, status_of: F) -> Option<(String, SessionStatus)>
    where
        F: Fn(&str) -> Option<SessionStatus>,
    {
        self.upstream.get(id)?.iter().find_map(|dep| {
            status_of(dep)
                .filter(|status| status.blocks_dependents())
                .map(|status| (dep.clone(), status))
        })
    }

    /// True iff any dependency of `id` is `failed` or `cancelled`.
    pub fn blocked_by_failure<F>(&self, id: &str, status_of: F) -> bool
    where
        F: Fn(&str) -> Option<SessionStatus>,
    {
        self.blocking_dependency(id, status_of).is_some()
    }

    /// Nodes ordered so every dependency precedes its dependents.
    ///
    /// Uses Kahn's algorithm; ties are broken by insertion order.
    #[must_use]
    pub fn topological_order(&self) -> Vec<String> {
        let mut in_degree: HashMap<&str, usize> = self
            .upstream
            .iter()
            .map(|(id, deps)| (id.as_str(), deps.len()))
            .collect();
        let position: HashMap<&str, usize> = self
            .insertion_order
            .iter()
            .enumerate()
            .map(|(idx, id)| (id.as_str(), idx))
            .collect();

        let mut queue: VecDeque<&str> = self
            .insertion_order
            .iter()
            .map(String::as_str)
            .filter(|id| in_degree.get(id).copied() == Some(0))
            .collect();
        let mut order = Vec::with_capacity(self.len());

        while let Some(id) = queue.pop_front() {
            order.push(id.to_owned());
            let mut released: Vec<&str> = Vec::new();
            for dependent in self.downstream.get(id).into_iter().flatten() {
                if let Some(degree) = in_degree.get_mut(dependent.as_str()) {
                    *degree = degree.saturating_sub(1);
                    if *degree == 0 {
                        released.push(dependent.as_str());
                    }
                }
            }
            released.sort_by_key(|id| position.get(id).copied().unwrap_or(usize::MAX));
            queue.extend(released);
        }

        order
    }

    /// Path `from -> … -> to` along dependent edges, if one exists.
    fn path_between(&self, from: &str, to: &str) -> Option<Vec<String>> {
        if from == to {
            return Some(vec![from.to_owned()]);
        }

        let mut parent: HashMap<&str, &str> = HashMap::new();
        let mut stack = vec![from];
        while let Some(current) = stack.pop() {
            for next in self.downstream.get(current).into_iter().flatten() {
                let next = next.as_str();
                if next == from || parent.contains_key(next) {
                    continue;
                }
                parent.insert(next, current);
                if next == to {
                    let mut path = vec![to.to_owned()];
                    let mut cursor = to;
                    while let Some(&prev) = parent.get(cursor) {
                        path.push(prev.to_owned());
                        cursor = prev;
                    }
                    path.reverse();
                    return Some(path);
                }
                stack.push(next);
            }
        }
        None
    }
}
