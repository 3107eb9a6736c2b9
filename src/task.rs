use crate::assignment::Assignment;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub type TaskId = i32;

/// A unit of product work. Tasks form a parent/child hierarchy (`parent_id`,
/// `level`) and a separate dependency DAG stored as [`TaskDependency`] records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Ordering within a level; lower runs first.
    #[serde(default)]
    pub priority: i32,
    #[serde(default = "default_level")]
    pub level: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<TaskId>,
    pub created_at: NaiveDateTime,
}

fn default_level() -> i32 {
    1
}

impl Task {
    pub fn new(id: TaskId, name: impl Into<String>, created_at: NaiveDateTime) -> Self {
        Self {
            id,
            name: name.into(),
            description: String::new(),
            priority: 0,
            level: default_level(),
            parent_id: None,
            created_at,
        }
    }

    pub fn with_level(mut self, level: i32) -> Self {
        self.level = level;
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_parent(mut self, parent_id: TaskId) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    /// Key used wherever tasks are walked "in hierarchy order".
    pub fn ordering_key(&self) -> (i32, i32, NaiveDateTime, TaskId) {
        (self.level, self.priority, self.created_at, self.id)
    }
}

/// `predecessor` must finish before `successor` may start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDependency {
    pub predecessor: TaskId,
    pub successor: TaskId,
    pub established_on: NaiveDateTime,
}

impl TaskDependency {
    pub fn new(predecessor: TaskId, successor: TaskId, established_on: NaiveDateTime) -> Self {
        Self {
            predecessor,
            successor,
            established_on,
        }
    }
}

/// Total estimated person-days for a task: the sum over sub-tasks when it has
/// any, otherwise the sum of its own assignments' estimates.
pub fn total_effort_estimation(task_id: TaskId, tasks: &[Task], assignments: &[Assignment]) -> f64 {
    let mut children: HashMap<TaskId, Vec<TaskId>> = HashMap::new();
    for task in tasks {
        if let Some(parent) = task.parent_id {
            children.entry(parent).or_default().push(task.id);
        }
    }

    let mut total = 0.0;
    let mut stack = vec![task_id];
    let mut visited = std::collections::HashSet::new();
    while let Some(current) = stack.pop() {
        if !visited.insert(current) {
            continue;
        }
        match children.get(&current) {
            Some(subtasks) if !subtasks.is_empty() => stack.extend(subtasks.iter().copied()),
            _ => {
                total += assignments
                    .iter()
                    .filter(|a| a.task_id == current)
                    .map(|a| a.effort_estimation.unwrap_or(0.0))
                    .sum::<f64>();
            }
        }
    }
    total
}
