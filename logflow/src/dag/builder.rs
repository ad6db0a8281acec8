//! DAG builder with validation.

use super::{Dag, TaskSpec};
use crate::errors::{codes, CycleDetectedError, DagValidationError, ErrorInfo};
use std::collections::{HashMap, HashSet};

/// Builder for creating validated DAGs.
///
/// Tasks may be added in any order; all validation happens in
/// [`build`](Self::build), so a graph that fails validation never reaches
/// an executor.
#[derive(Debug, Clone)]
pub struct DagBuilder {
    name: String,
    tasks: HashMap<String, TaskSpec>,
    task_order: Vec<String>,
    duplicates: Vec<String>,
}

impl DagBuilder {
    /// Creates a new DAG builder.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tasks: HashMap::new(),
            task_order: Vec::new(),
            duplicates: Vec::new(),
        }
    }

    /// Adds a task.
    #[must_use]
    pub fn task(mut self, spec: TaskSpec) -> Self {
        self.add_task(spec);
        self
    }

    /// Adds a task in place.
    pub fn add_task(&mut self, spec: TaskSpec) {
        if self.tasks.contains_key(&spec.name) {
            self.duplicates.push(spec.name.clone());
            return;
        }
        self.task_order.push(spec.name.clone());
        self.tasks.insert(spec.name.clone(), spec);
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

    /// Validates the graph and builds the DAG.
    ///
    /// # Errors
    ///
    /// Returns a `DagValidationError` if the graph is empty, has duplicate
    /// or blank task names, a self-dependency, an unknown upstream, a task
    /// allowing zero attempts, or a cycle.
    pub fn build(self) -> Result<Dag, DagValidationError> {
        if self.tasks.is_empty() {
            return Err(DagValidationError::new("DAG has no tasks").with_error_info(
                ErrorInfo::new(codes::EMPTY, "Cannot build an empty DAG")
                    .with_fix_hint("Add at least one task before building."),
            ));
        }

        if let Some(name) = self.duplicates.first() {
            return Err(DagValidationError::new(format!("Task '{name}' is declared more than once"))
                .with_tasks(vec![name.clone()])
                .with_error_info(
                    ErrorInfo::new(codes::DUPLICATE, format!("Duplicate task name '{name}'"))
                        .with_fix_hint("Task names must be unique within a DAG."),
                ));
        }

        for name in &self.task_order {
            let spec = &self.tasks[name];

            if name.trim().is_empty() {
                return Err(DagValidationError::new("Task name cannot be empty or whitespace-only"));
            }

            if spec.upstream.contains(name) {
                return Err(DagValidationError::new(format!("Task '{name}' cannot depend on itself"))
                    .with_tasks(vec![name.clone()])
                    .with_error_info(ErrorInfo::new(
                        codes::SELF_DEP,
                        format!("Task '{name}' lists itself as upstream"),
                    )));
            }

            for dep in &spec.upstream {
                if !self.tasks.contains_key(dep) {
                    return Err(DagValidationError::new(format!(
                        "Task '{name}' depends on unknown task '{dep}'"
                    ))
                    .with_tasks(vec![name.clone(), dep.clone()])
                    .with_error_info(
                        ErrorInfo::new(codes::MISSING_DEP, format!("Upstream '{dep}' not found"))
                            .with_fix_hint("Check the upstream name for typos or add the missing task."),
                    ));
                }
            }

            if spec.retry.max_attempts == 0 {
                return Err(DagValidationError::new(format!(
                    "Task '{name}' must allow at least one attempt"
                ))
                .with_tasks(vec![name.clone()]));
            }
        }

        self.detect_cycles()?;

        Ok(Dag::new(self.name, self.tasks, &self.task_order))
    }

    fn detect_cycles(&self) -> Result<(), CycleDetectedError> {
        let mut visited = HashSet::new();
        let mut rec_stack = HashSet::new();
        let mut path = Vec::new();

        for name in &self.task_order {
            if !visited.contains(name.as_str()) {
                if let Some(cycle) = self.dfs_cycle(name, &mut visited, &mut rec_stack, &mut path) {
                    return Err(CycleDetectedError::new(cycle));
                }
            }
        }

        Ok(())
    }

    fn dfs_cycle<'a>(
        &'a self,
        node: &'a str,
        visited: &mut HashSet<&'a str>,
        rec_stack: &mut HashSet<&'a str>,
        path: &mut Vec<&'a str>,
    ) -> Option<Vec<String>> {
        visited.insert(node);
        rec_stack.insert(node);
        path.push(node);

        if let Some(spec) = self.tasks.get(node) {
            for dep in &spec.upstream {
                if !visited.contains(dep.as_str()) {
                    if let Some(cycle) = self.dfs_cycle(dep, visited, rec_stack, path) {
                        return Some(cycle);
                    }
                } else if rec_stack.contains(dep.as_str()) {
                    let start = path.iter().position(|n| *n == dep.as_str()).unwrap_or(0);
                    let mut cycle: Vec<String> = path[start..].iter().map(|n| (*n).to_string()).collect();
                    cycle.push(dep.clone());
                    return Some(cycle);
                }
            }
        }

        path.pop();
        rec_stack.remove(node);
        None
    }
}
