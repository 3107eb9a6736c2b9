use crate::assignment::{Assignment, AssignmentId};
use crate::calculations::PlannedDates;
use crate::calendar::{CalendarException, Holiday};
use crate::person::{Person, PersonId};
use crate::schedule::{Schedule, ScheduleError};
use crate::task::{Task, TaskDependency, TaskId};
use crate::validation::ValidationError;
use serde_json::Error as SerdeJsonError;
use std::collections::BTreeSet;
use std::io;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("serialization error: {0}")]
    Serialization(#[from] SerdeJsonError),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[cfg(feature = "sqlite")]
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("invalid data: {0}")]
    InvalidData(String),
    #[error("not found: {0}")]
    NotFound(String),
}

impl From<ValidationError> for PersistenceError {
    fn from(value: ValidationError) -> Self {
        Self::InvalidData(value.to_string())
    }
}

impl From<ScheduleError> for PersistenceError {
    fn from(value: ScheduleError) -> Self {
        match value {
            ScheduleError::UnknownAssignment(id) => Self::NotFound(format!("assignment {id}")),
            other => Self::InvalidData(other.to_string()),
        }
    }
}

pub type PersistenceResult<T> = Result<T, PersistenceError>;

/// Selects assignments by owner, fixed/non-fixed, dirty flag, task level and
/// task set. Unset criteria match everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssignmentFilter {
    pub person_id: Option<PersonId>,
    pub fixed: Option<bool>,
    pub needs_recalculation: Option<bool>,
    pub task_level: Option<i32>,
    pub task_ids: Option<Vec<TaskId>>,
}

impl AssignmentFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn for_person(person_id: PersonId) -> Self {
        Self {
            person_id: Some(person_id),
            ..Self::default()
        }
    }

    pub fn for_tasks(task_ids: Vec<TaskId>) -> Self {
        Self {
            task_ids: Some(task_ids),
            ..Self::default()
        }
    }

    pub fn fixed(mut self, fixed: bool) -> Self {
        self.fixed = Some(fixed);
        self
    }

    pub fn needs_recalculation(mut self, dirty: bool) -> Self {
        self.needs_recalculation = Some(dirty);
        self
    }

    pub fn task_level(mut self, level: i32) -> Self {
        self.task_level = Some(level);
        self
    }

    /// `task_level` is the level of the assignment's task, if known.
    pub fn matches(&self, assignment: &Assignment, task_level: Option<i32>) -> bool {
        if let Some(person) = self.person_id {
            if assignment.person_id != person {
                return false;
            }
        }
        if let Some(fixed) = self.fixed {
            if assignment.is_fixed() != fixed {
                return false;
            }
        }
        if let Some(dirty) = self.needs_recalculation {
            if assignment.needs_recalculation != dirty {
                return false;
            }
        }
        if let Some(level) = self.task_level {
            if task_level != Some(level) {
                return false;
            }
        }
        if let Some(task_ids) = &self.task_ids {
            if !task_ids.contains(&assignment.task_id) {
                return false;
            }
        }
        true
    }
}

/// What the recalculator needs from the system that owns the data.
///
/// Passes read through `read_snapshot`, which implementations serve from one
/// lock or transaction. `write_planned_dates` must apply all plans or none
/// and never touches fixed assignments.
pub trait ScheduleStore {
    fn people(&self) -> PersistenceResult<Vec<Person>>;
    fn tasks(&self, ids: &[TaskId]) -> PersistenceResult<Vec<Task>>;
    /// Matching assignments ordered by id.
    fn assignments(&self, filter: &AssignmentFilter) -> PersistenceResult<Vec<Assignment>>;
    fn assignment(&self, id: AssignmentId) -> PersistenceResult<Option<Assignment>>;
    /// Dependency records whose successor is one of `successors`.
    fn predecessor_edges(&self, successors: &[TaskId]) -> PersistenceResult<Vec<TaskDependency>>;
    fn holidays(&self) -> PersistenceResult<Vec<Holiday>>;
    fn calendar_exceptions(&self, people: &[PersonId])
    -> PersistenceResult<Vec<CalendarException>>;
    /// Sets planned start/end and clears `needs_recalculation`. Plans for
    /// assignments that became fixed since they were read are skipped.
    fn write_planned_dates(&self, plans: &[PlannedDates]) -> PersistenceResult<()>;

    /// Everything a pass needs in one consistent view: all people, tasks,
    /// dependencies, assignments and holidays, plus the calendar exceptions
    /// of `people`.
    fn read_snapshot(&self, people: &[PersonId]) -> PersistenceResult<Schedule> {
        let assignments = self.assignments(&AssignmentFilter::all())?;
        let task_ids: Vec<TaskId> = assignments
            .iter()
            .map(|assignment| assignment.task_id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        Ok(Schedule {
            people: self.people()?,
            tasks: self.tasks(&task_ids)?,
            dependencies: self.predecessor_edges(&task_ids)?,
            assignments,
            holidays: self.holidays()?,
            calendar_exceptions: self.calendar_exceptions(people)?,
        })
    }
}

impl<T: ScheduleStore + ?Sized> ScheduleStore for &T {
    fn people(&self) -> PersistenceResult<Vec<Person>> {
        (**self).people()
    }

    fn tasks(&self, ids: &[TaskId]) -> PersistenceResult<Vec<Task>> {
        (**self).tasks(ids)
    }

    fn assignments(&self, filter: &AssignmentFilter) -> PersistenceResult<Vec<Assignment>> {
        (**self).assignments(filter)
    }

    fn assignment(&self, id: AssignmentId) -> PersistenceResult<Option<Assignment>> {
        (**self).assignment(id)
    }

    fn predecessor_edges(&self, successors: &[TaskId]) -> PersistenceResult<Vec<TaskDependency>> {
        (**self).predecessor_edges(successors)
    }

    fn holidays(&self) -> PersistenceResult<Vec<Holiday>> {
        (**self).holidays()
    }

    fn calendar_exceptions(
        &self,
        people: &[PersonId],
    ) -> PersistenceResult<Vec<CalendarException>> {
        (**self).calendar_exceptions(people)
    }

    fn write_planned_dates(&self, plans: &[PlannedDates]) -> PersistenceResult<()> {
        (**self).write_planned_dates(plans)
    }

    fn read_snapshot(&self, people: &[PersonId]) -> PersistenceResult<Schedule> {
        (**self).read_snapshot(people)
    }
}

impl<T: ScheduleStore + ?Sized> ScheduleStore for Arc<T> {
    fn people(&self) -> PersistenceResult<Vec<Person>> {
        (**self).people()
    }

    fn tasks(&self, ids: &[TaskId]) -> PersistenceResult<Vec<Task>> {
        (**self).tasks(ids)
    }

    fn assignments(&self, filter: &AssignmentFilter) -> PersistenceResult<Vec<Assignment>> {
        (**self).assignments(filter)
    }

    fn assignment(&self, id: AssignmentId) -> PersistenceResult<Option<Assignment>> {
        (**self).assignment(id)
    }

    fn predecessor_edges(&self, successors: &[TaskId]) -> PersistenceResult<Vec<TaskDependency>> {
        (**self).predecessor_edges(successors)
    }

    fn holidays(&self) -> PersistenceResult<Vec<Holiday>> {
        (**self).holidays()
    }

    fn calendar_exceptions(
        &self,
        people: &[PersonId],
    ) -> PersistenceResult<Vec<CalendarException>> {
        (**self).calendar_exceptions(people)
    }

    fn write_planned_dates(&self, plans: &[PlannedDates]) -> PersistenceResult<()> {
        (**self).write_planned_dates(plans)
    }

    fn read_snapshot(&self, people: &[PersonId]) -> PersistenceResult<Schedule> {
        (**self).read_snapshot(people)
    }
}

pub mod file;
pub mod memory;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use file::{load_schedule_from_json, save_schedule_to_json};
pub use memory::InMemoryScheduleStore;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteScheduleStore;
