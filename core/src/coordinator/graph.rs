use std::collections::{HashMap, HashSet, VecDeque};

use crate::error::{CoreError, CoreResult};
use crate::model::Task;

/// Anything with an id and declared dependency ids.
pub trait DependencyNode: Clone {
    fn id(&self) -> &str;
    fn dependencies(&self) -> &[String];
}

impl DependencyNode for Task {
    fn id(&self) -> &str {
        &self.id
    }

    fn dependencies(&self) -> &[String] {
        &self.dependencies
    }
}

/// Task dependency graph (DAG)
#[derive(Debug, Clone)]
pub struct TaskGraph<T: DependencyNode> {
    /// Task nodes: task_id -> Task
    pub nodes: HashMap<String, T>,

    /// Dependency edges: task_id -> list of dependencies
    pub edges: HashMap<String, Vec<String>>,

    /// Reverse edges: task_id -> list of tasks that depend on it
    pub reverse_edges: HashMap<String, Vec<String>>,

    /// Original insertion order (for stable sorting)
    insertion_order: Vec<String>,
}

impl<T: DependencyNode> TaskGraph<T> {
    pub fn from_tasks(tasks: &[T]) -> CoreResult<Self> {
        let mut nodes = HashMap::new();
        let mut edges = HashMap::new();
        let mut reverse_edges: HashMap<String, Vec<String>> = HashMap::new();
        let mut insertion_order = Vec::new();

        for task in tasks {
            if nodes.contains_key(task.id()) {
                return Err(CoreError::Conflict(format!(
                    "duplicate task id {}",
                    task.id()
                )));
            }

            let task_id = task.id().to_string();
            let dependencies = task.dependencies().to_vec();

            nodes.insert(task_id.clone(), task.clone());
            edges.insert(task_id.clone(), dependencies.clone());
            insertion_order.push(task_id.clone());

            for dep in dependencies {
                reverse_edges.entry(dep).or_default().push(task_id.clone());
            }
        }

        Ok(Self {
            nodes,
            edges,
            reverse_edges,
            insertion_order,
        })
    }

    /// Every dependency must name a task in the set, and there must be no cycle.
    pub fn validate(&self) -> CoreResult<()> {
        for task_id in &self.insertion_order {
            for dep in self.edges.get(task_id).into_iter().flatten() {
                if !self.nodes.contains_key(dep) {
                    return Err(CoreError::not_found(
                        "dependency",
                        format!("{dep} (required by {task_id})"),
                    ));
                }
            }
        }

        if let Some(cycle) = self.detect_cycle() {
            return Err(CoreError::CycleDetected(cycle));
        }

        Ok(())
    }

    /// Kahn's algorithm. Returns release stages; tasks in one stage are independent.
    ///
    /// Within a stage, tasks keep their input order.
    pub fn topological_sort(&self) -> CoreResult<Vec<Vec<String>>> {
        let mut in_degree: HashMap<&str, usize> = self
            .edges
            .iter()
            .map(|(id, deps)| (id.as_str(), deps.len()))
            .collect();

        let mut stages: Vec<Vec<String>> = Vec::new();
        let mut current_stage: Vec<String> = self
            .insertion_order
            .iter()
            .filter(|id| in_degree.get(id.as_str()) == Some(&0))
            .cloned()
            .collect();

        let mut processed = 0;

        while !current_stage.is_empty() {
            processed += current_stage.len();

            let mut next_stage = Vec::new();
            for task_id in &current_stage {
                for dependent in self.reverse_edges.get(task_id).into_iter().flatten() {
                    if let Some(degree) = in_degree.get_mut(dependent.as_str()) {
                        *degree = degree.saturating_sub(1);
                        if *degree == 0 {
                            next_stage.push(dependent.clone());
                        }
                    }
                }
            }

            next_stage.sort_by_key(|id| self.position(id));
            stages.push(std::mem::replace(&mut current_stage, next_stage));
        }

        if processed != self.nodes.len() {
            let stuck: Vec<&str> = self
                .insertion_order
                .iter()
                .filter(|id| in_degree.get(id.as_str()).is_some_and(|d| *d > 0))
                .map(String::as_str)
                .collect();
            return Err(CoreError::CycleDetected(format!(
                "unable to order tasks: {}",
                stuck.join(", ")
            )));
        }

        Ok(stages)
    }

    /// Tasks that depend on `task_id` directly or transitively, in discovery order.
    pub fn dependents_of(&self, task_id: &str) -> Vec<String> {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut out = Vec::new();
        let mut queue: VecDeque<&str> = VecDeque::from([task_id]);
        while let Some(current) = queue.pop_front() {
            for dependent in self.reverse_edges.get(current).into_iter().flatten() {
                if seen.insert(dependent.as_str()) {
                    out.push(dependent.clone());
                    queue.push_back(dependent.as_str());
                }
            }
        }
        out
    }

    fn position(&self, id: &str) -> usize {
        self.insertion_order
            .iter()
            .position(|k| k == id)
            .unwrap_or(usize::MAX)
    }

    fn detect_cycle(&self) -> Option<String> {
        let mut visited = HashSet::new();
        let mut stack = Vec::new();

        for task_id in &self.insertion_order {
            if !visited.contains(task_id) && self.dfs_cycle(task_id, &mut visited, &mut stack) {
                return Some(stack.join(" -> "));
            }
        }

        None
    }

    fn dfs_cycle(
        &self,
        node: &str,
        visited: &mut HashSet<String>,
        stack: &mut Vec<String>,
    ) -> bool {
        visited.insert(node.to_string());
        stack.push(node.to_string());

        if let Some(dependencies) = self.edges.get(node) {
            for dep in dependencies {
                if let Some(pos) = stack.iter().position(|x| x == dep) {
                    stack.push(dep.clone());
                    *stack = stack[pos..].to_vec();
                    return true;
                }

                if !visited.contains(dep) && self.dfs_cycle(dep, visited, stack) {
                    return true;
                }
            }
        }

        stack.pop();
        false
    }
}
