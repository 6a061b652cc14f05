// src/dag/graph.rs

use std::collections::{BTreeSet, HashMap};

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::errors::{Result, SchedulerError};
use crate::types::TaskId;

/// Internal node structure: stores immediate deps and dependents.
#[derive(Debug, Clone, Default)]
struct DagNode {
    /// Direct dependencies: tasks that must succeed before this one can run.
    deps: Vec<TaskId>,
    /// Direct dependents: tasks that depend on this one.
    dependents: Vec<TaskId>,
}

/// Dependency graph keyed by task id. Edges point `task -> prerequisite`.
///
/// Every mutation is cycle-checked against a candidate graph before it is
/// committed, so a rejected mutation leaves the graph untouched.
///
/// A prerequisite does not have to be a node: when a task is removed, edges
/// from its dependents keep pointing at the missing id.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    nodes: HashMap<TaskId, DagNode>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, task: &str) -> bool {
        self.nodes.contains_key(task)
    }

    /// Return all task ids that are nodes of the graph.
    pub fn tasks(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(|s| s.as_str())
    }

    /// Immediate dependencies of a task.
    pub fn dependencies_of(&self, task: &str) -> &[TaskId] {
        self.nodes
            .get(task)
            .map(|n| n.deps.as_slice())
            .unwrap_or(&[])
    }

    /// Immediate dependents of a task (tasks that list this one as a dependency).
    pub fn dependents_of(&self, task: &str) -> &[TaskId] {
        self.nodes
            .get(task)
            .map(|n| n.dependents.as_slice())
            .unwrap_or(&[])
    }

    /// All edges as sorted `(task, prerequisite)` pairs.
    pub fn edges(&self) -> BTreeSet<(TaskId, TaskId)> {
        self.nodes
            .iter()
            .flat_map(|(task, node)| node.deps.iter().map(move |dep| (task.clone(), dep.clone())))
            .collect()
    }

    /// Add a single `task -> prerequisite` edge, creating either node if needed.
    pub fn add_edge(&mut self, task: &str, prerequisite: &str) -> Result<()> {
        self.add_edges(task, &[prerequisite.to_string()])
    }

    /// Add `task` (if new) and its edges to every prerequisite in one step.
    ///
    /// Fails with `CyclicDependency` when the result would contain a cycle;
    /// in that case nothing is changed.
    pub fn add_edges(&mut self, task: &str, prerequisites: &[TaskId]) -> Result<()> {
        if let Some(node) = self.find_cycle_with(task, prerequisites) {
            return Err(SchedulerError::CyclicDependency(format!(
                "adding dependencies {prerequisites:?} to task '{task}' creates a cycle involving '{node}'"
            )));
        }

        self.nodes.entry(task.to_string()).or_default();
        for dep in prerequisites {
            let node = self.nodes.entry(task.to_string()).or_default();
            if node.deps.contains(dep) {
                continue;
            }
            node.deps.push(dep.clone());
            self.nodes
                .entry(dep.clone())
                .or_default()
                .dependents
                .push(task.to_string());
        }
        Ok(())
    }

    /// Remove a task and the edges it owns.
    ///
    /// Edges from other tasks to it are kept and now dangle.
    pub fn remove_task(&mut self, task: &str) {
        let Some(node) = self.nodes.get_mut(task) else {
            return;
        };
        let deps = std::mem::take(&mut node.deps);
        if node.dependents.is_empty() {
            self.nodes.remove(task);
        }

        for dep in deps {
            let drop_dep = match self.nodes.get_mut(&dep) {
                Some(dep_node) => {
                    dep_node.dependents.retain(|d| d != task);
                    dep_node.deps.is_empty() && dep_node.dependents.is_empty()
                }
                None => false,
            };
            if drop_dep {
                self.nodes.remove(&dep);
            }
        }
    }

    /// Whether adding `task -> prerequisites` would introduce a cycle.
    pub fn would_cycle(&self, task: &str, prerequisites: &[TaskId]) -> bool {
        self.find_cycle_with(task, prerequisites).is_some()
    }

    /// Build the candidate graph (current edges plus the proposed ones) and
    /// topologically sort it. Returns a node on the cycle, if any.
    fn find_cycle_with(&self, task: &str, prerequisites: &[TaskId]) -> Option<TaskId> {
        let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

        for (name, node) in self.nodes.iter() {
            graph.add_node(name.as_str());
            for dep in node.deps.iter() {
                graph.add_edge(name.as_str(), dep.as_str(), ());
            }
        }

        graph.add_node(task);
        for dep in prerequisites {
            graph.add_edge(task, dep.as_str(), ());
        }

        // A topological sort will fail if there is a cycle.
        match toposort(&graph, None) {
            Ok(_order) => None,
            Err(cycle) => Some(cycle.node_id().to_string()),
        }
    }
}
