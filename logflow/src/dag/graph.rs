//! Validated task graph.

use super::TaskSpec;
use std::collections::{BTreeSet, HashMap, VecDeque};

/// A validated directed acyclic graph of tasks.
///
/// Only [`DagBuilder::build`](super::DagBuilder::build) creates one, so a
/// `Dag` is always acyclic with every upstream declared.
#[derive(Debug, Clone)]
pub struct Dag {
    name: String,
    tasks: HashMap<String, TaskSpec>,
    downstream: HashMap<String, BTreeSet<String>>,
    execution_order: Vec<String>,
}

impl Dag {
    pub(super) fn new(name: String, tasks: HashMap<String, TaskSpec>, task_order: &[String]) -> Self {
        let mut downstream: HashMap<String, BTreeSet<String>> =
            tasks.keys().map(|name| (name.clone(), BTreeSet::new())).collect();
        for spec in tasks.values() {
            for dep in &spec.upstream {
                if let Some(children) = downstream.get_mut(dep) {
                    children.insert(spec.name.clone());
                }
            }
        }

        let execution_order = topological_sort(&tasks, &downstream, task_order);

        Self {
            name,
            tasks,
            downstream,
            execution_order,
        }
    }

    /// Returns the DAG name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the number of tasks.
    #[must_use]
    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Returns a topological order, ties broken by insertion order.
    #[must_use]
    pub fn execution_order(&self) -> &[String] {
        &self.execution_order
    }

    /// Returns the specification of a task.
    #[must_use]
    pub fn task(&self, name: &str) -> Option<&TaskSpec> {
        self.tasks.get(name)
    }

    /// Returns the direct downstream tasks of `name`.
    #[must_use]
    pub fn downstream_of(&self, name: &str) -> Option<&BTreeSet<String>> {
        self.downstream.get(name)
    }

    /// Returns every transitive successor of `name`, in execution order.
    #[must_use]
    pub fn descendants(&self, name: &str) -> Vec<String> {
        let mut seen = BTreeSet::new();
        let mut queue: VecDeque<&str> = VecDeque::from([name]);
        while let Some(current) = queue.pop_front() {
            for child in self.downstream.get(current).into_iter().flatten() {
                if seen.insert(child.clone()) {
                    queue.push_back(child);
                }
            }
        }
        self.execution_order
            .iter()
            .filter(|task| seen.contains(*task))
            .cloned()
            .collect()
    }
}

/// Kahn's algorithm; among ready tasks the earliest inserted goes first.
fn topological_sort(
    tasks: &HashMap<String, TaskSpec>,
    downstream: &HashMap<String, BTreeSet<String>>,
    task_order: &[String],
) -> Vec<String> {
    let position: HashMap<&str, usize> = task_order
        .iter()
        .enumerate()
        .map(|(i, name)| (name.as_str(), i))
        .collect();
    let mut in_degree: HashMap<&str, usize> = tasks
        .iter()
        .map(|(name, spec)| (name.as_str(), spec.upstream.len()))
        .collect();
    let mut ready: BTreeSet<(usize, &str)> = in_degree
        .iter()
        .filter(|(_, &count)| count == 0)
        .map(|(name, _)| (position[name], *name))
        .collect();

    let mut result = Vec::with_capacity(tasks.len());
    while let Some(entry) = ready.pop_first() {
        let (_, name) = entry;
        result.push(name.to_string());
        for child in downstream.get(name).into_iter().flatten() {
            if let Some(count) = in_degree.get_mut(child.as_str()) {
                *count = count.saturating_sub(1);
                if *count == 0 {
                    ready.insert((position[child.as_str()], child.as_str()));
                }
            }
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use crate::dag::{DagBuilder, TaskSpec};
    use crate::tasks::NoOpTask;
    use std::sync::Arc;

    fn spec(name: &str, upstream: &[&str]) -> TaskSpec {
        TaskSpec::new(name, Arc::new(NoOpTask::new(name))).with_upstream(upstream.iter().copied())
    }

    fn diamond() -> super::Dag {
        DagBuilder::new("diamond")
            .task(spec("extract", &[]))
            .task(spec("left", &["extract"]))
            .task(spec("right", &["extract"]))
            .task(spec("load", &["left", "right"]))
            .task(spec("audit", &[]))
            .build()
            .unwrap()
    }

    #[test]
    fn test_topological_order() {
        let dag = diamond();
        let order = dag.execution_order();
        let pos = |n: &str| order.iter().position(|x| x == n).unwrap();

        assert_eq!(order.len(), 5);
        assert!(pos("extract") < pos("left"));
        assert!(pos("extract") < pos("right"));
        assert!(pos("left") < pos("load"));
        assert!(pos("right") < pos("load"));
    }

    #[test]
    fn test_descendants() {
        let dag = diamond();
        assert_eq!(dag.descendants("extract"), vec!["left", "right", "load"]);
        assert_eq!(dag.descendants("left"), vec!["load"]);
        assert!(dag.descendants("audit").is_empty());
    }

    #[test]
    fn test_downstream_of() {
        let dag = diamond();
        let children: Vec<_> = dag.downstream_of("extract").unwrap().iter().cloned().collect();
        assert_eq!(children, vec!["left", "right"]);
        assert!(dag.task("load").is_some());
        assert!(dag.task("nope").is_none());
    }
}
