//! Task dependency graph

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use anyhow::Result;

use crate::pipeline::TaskId;

/// The tasks requested for one run and the ordering edges between them.
///
/// Edges only connect tasks that are both part of the run: asking for
/// `compile-styles` alone does not pull `aggregate-styles` in.
#[derive(Debug, Default, Clone)]
pub struct TaskGraph {
    /// task -> tasks it waits for
    dependencies: BTreeMap<TaskId, BTreeSet<TaskId>>,
}

impl TaskGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the graph for a set of tasks using their declared ordering
    pub fn for_tasks<I: IntoIterator<Item = TaskId>>(tasks: I) -> Self {
        let mut graph = Self::new();
        for task in tasks {
            graph.add_task(task);
        }

        let nodes: Vec<TaskId> = graph.dependencies.keys().copied().collect();
        for task in nodes {
            for &before in task.after() {
                if graph.contains(before) {
                    graph.add_dependency(task, before);
                }
            }
        }
        graph
    }

    pub fn add_task(&mut self, task: TaskId) {
        self.dependencies.entry(task).or_default();
    }

    /// `task` may only start once `before` has finished
    pub fn add_dependency(&mut self, task: TaskId, before: TaskId) {
        self.add_task(before);
        self.dependencies.entry(task).or_default().insert(before);
    }

    pub fn contains(&self, task: TaskId) -> bool {
        self.dependencies.contains_key(&task)
    }

    pub fn tasks(&self) -> impl Iterator<Item = TaskId> + '_ {
        self.dependencies.keys().copied()
    }

    pub fn dependencies(&self, task: TaskId) -> Vec<TaskId> {
        self.dependencies
            .get(&task)
            .map(|deps| deps.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Tasks waiting for `task`
    pub fn dependents(&self, task: TaskId) -> Vec<TaskId> {
        self.dependencies
            .iter()
            .filter(|(_, deps)| deps.contains(&task))
            .map(|(&id, _)| id)
            .collect()
    }

    /// Kahn's algorithm. Fails if the edges form a cycle.
    pub fn topological_order(&self) -> Result<Vec<TaskId>> {
        let mut pending: BTreeMap<TaskId, usize> = self
            .dependencies
            .iter()
            .map(|(&id, deps)| (id, deps.len()))
            .collect();
        let mut ready: VecDeque<TaskId> = pending
            .iter()
            .filter(|(_, &count)| count == 0)
            .map(|(&id, _)| id)
            .collect();
        let mut order = Vec::with_capacity(pending.len());

        while let Some(id) = ready.pop_front() {
            order.push(id);
            for dependent in self.dependents(id) {
                if let Some(count) = pending.get_mut(&dependent) {
                    *count -= 1;
                    if *count == 0 {
                        ready.push_back(dependent);
                    }
                }
            }
        }

        if order.len() != self.dependencies.len() {
            anyhow::bail!("Task graph contains a cycle");
        }
        Ok(order)
    }

    pub fn len(&self) -> usize {
        self.dependencies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dependencies.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_edges_only_between_requested_tasks() {
        let graph = TaskGraph::for_tasks([TaskId::CompileStyles]);

        assert_eq!(graph.len(), 1);
        assert!(graph.dependencies(TaskId::CompileStyles).is_empty());
    }

    #[test]
    fn test_aggregate_before_compile() {
        let graph = TaskGraph::for_tasks(TaskId::ALL);
        let order = graph.topological_order().unwrap();
        let position = |id| order.iter().position(|&t| t == id).unwrap();

        assert_eq!(order.len(), TaskId::ALL.len());
        assert!(position(TaskId::AggregateStyles) < position(TaskId::CompileStyles));
        assert!(position(TaskId::AggregateData) < position(TaskId::CompilePages));
        assert!(position(TaskId::AggregateScripts) < position(TaskId::CompileScripts));
        assert_eq!(
            graph.dependents(TaskId::AggregateData),
            vec![TaskId::CompilePages]
        );
    }

    #[test]
    fn test_cycle_detected() {
        let mut graph = TaskGraph::new();
        graph.add_dependency(TaskId::CopyImages, TaskId::CopyAssetsCss);
        graph.add_dependency(TaskId::CopyAssetsCss, TaskId::CopyImages);

        assert!(graph.topological_order().is_err());
    }
}
