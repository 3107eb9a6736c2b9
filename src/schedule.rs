use crate::assignment::{Assignment, AssignmentId};
use crate::calculations::PlannedDates;
use crate::calendar::{CalendarException, Holiday};
use crate::person::{Person, PersonId};
use crate::persistence::AssignmentFilter;
use crate::task::{Task, TaskDependency, TaskId};
use crate::validation::{self, ValidationError};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum ScheduleError {
    #[error(transparent)]
    Invalid(#[from] ValidationError),
    #[error("unknown person {0}")]
    UnknownPerson(PersonId),
    #[error("unknown task {0}")]
    UnknownTask(TaskId),
    #[error("unknown assignment {0}")]
    UnknownAssignment(AssignmentId),
}

/// The full data set the recalculator works against: people, the task
/// hierarchy and dependency edges, assignments and calendar data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    #[serde(default)]
    pub people: Vec<Person>,
    #[serde(default)]
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub dependencies: Vec<TaskDependency>,
    #[serde(default)]
    pub assignments: Vec<Assignment>,
    #[serde(default)]
    pub holidays: Vec<Holiday>,
    #[serde(default)]
    pub calendar_exceptions: Vec<CalendarException>,
}

impl Schedule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validation::validate_schedule(self)
    }

    pub fn person(&self, id: PersonId) -> Option<&Person> {
        self.people.iter().find(|person| person.id == id)
    }

    pub fn task(&self, id: TaskId) -> Option<&Task> {
        self.tasks.iter().find(|task| task.id == id)
    }

    pub fn assignment(&self, id: AssignmentId) -> Option<&Assignment> {
        self.assignments
            .iter()
            .find(|assignment| assignment.id == id)
    }

    pub fn next_assignment_id(&self) -> AssignmentId {
        self.assignments
            .iter()
            .map(|assignment| assignment.id)
            .max()
            .map(|max| max + 1)
            .unwrap_or(1)
    }

    pub fn upsert_person(&mut self, person: Person) {
        match self.people.iter_mut().find(|p| p.id == person.id) {
            Some(existing) => *existing = person,
            None => self.people.push(person),
        }
    }

    pub fn upsert_task(&mut self, task: Task) -> Result<(), ScheduleError> {
        if let Some(parent) = task.parent_id {
            if parent == task.id || self.task(parent).is_none() {
                return Err(ScheduleError::UnknownTask(parent));
            }
        }
        match self.tasks.iter_mut().find(|t| t.id == task.id) {
            Some(existing) => *existing = task,
            None => self.tasks.push(task),
        }
        Ok(())
    }

    /// Records an edge. Returns `false` when the same edge already exists.
    pub fn add_dependency(&mut self, dependency: TaskDependency) -> Result<bool, ScheduleError> {
        if dependency.predecessor == dependency.successor {
            return Err(ValidationError::new(format!(
                "task {} cannot depend on itself",
                dependency.successor
            ))
            .into());
        }
        for id in [dependency.predecessor, dependency.successor] {
            if self.task(id).is_none() {
                return Err(ScheduleError::UnknownTask(id));
            }
        }
        let exists = self.dependencies.iter().any(|dep| {
            dep.predecessor == dependency.predecessor && dep.successor == dependency.successor
        });
        if exists {
            return Ok(false);
        }
        self.dependencies.push(dependency);
        Ok(true)
    }

    /// Recording an actual date fixes the assignment, which also clears any
    /// pending recalculation flag.
    pub fn upsert_assignment(&mut self, mut assignment: Assignment) -> Result<(), ScheduleError> {
        if assignment.is_fixed() {
            assignment.needs_recalculation = false;
        }
        if self.task(assignment.task_id).is_none() {
            return Err(ScheduleError::UnknownTask(assignment.task_id));
        }
        if self.person(assignment.person_id).is_none() {
            return Err(ScheduleError::UnknownPerson(assignment.person_id));
        }
        validation::validate_assignment(&assignment)?;
        match self.assignments.iter_mut().find(|a| a.id == assignment.id) {
            Some(existing) => *existing = assignment,
            None => self.assignments.push(assignment),
        }
        Ok(())
    }

    pub fn upsert_holiday(&mut self, holiday: Holiday) {
        match self.holidays.iter_mut().find(|h| h.date == holiday.date) {
            Some(existing) => *existing = holiday,
            None => self.holidays.push(holiday),
        }
    }

    /// Stores an exception, replacing the person's previous exception for the
    /// same date if there was one.
    pub fn set_calendar_exception(
        &mut self,
        exception: CalendarException,
    ) -> Result<Option<CalendarException>, ScheduleError> {
        if self.person(exception.person_id).is_none() {
            return Err(ScheduleError::UnknownPerson(exception.person_id));
        }
        validation::validate_calendar_exception(&exception)?;
        let existing = self
            .calendar_exceptions
            .iter_mut()
            .find(|e| e.person_id == exception.person_id && e.date == exception.date);
        match existing {
            Some(slot) => Ok(Some(std::mem::replace(slot, exception))),
            None => {
                self.calendar_exceptions.push(exception);
                Ok(None)
            }
        }
    }

    pub fn remove_calendar_exception(&mut self, person: PersonId, date: NaiveDate) -> bool {
        let before = self.calendar_exceptions.len();
        self.calendar_exceptions
            .retain(|e| !(e.person_id == person && e.date == date));
        self.calendar_exceptions.len() != before
    }

    /// Flags one assignment. Fixed assignments are left clean and report
    /// `false`.
    pub fn mark_dirty(&mut self, id: AssignmentId) -> Result<bool, ScheduleError> {
        self.assignments
            .iter_mut()
            .find(|assignment| assignment.id == id)
            .map(Assignment::mark_dirty)
            .ok_or(ScheduleError::UnknownAssignment(id))
    }

    pub fn mark_person_dirty(&mut self, person: PersonId) -> usize {
        self.assignments
            .iter_mut()
            .filter(|assignment| assignment.person_id == person)
            .map(|assignment| assignment.mark_dirty())
            .filter(|marked| *marked)
            .count()
    }

    pub fn assignments_matching(&self, filter: &AssignmentFilter) -> Vec<Assignment> {
        let levels: HashMap<TaskId, i32> = self
            .tasks
            .iter()
            .map(|task| (task.id, task.level))
            .collect();
        let mut matched: Vec<Assignment> = self
            .assignments
            .iter()
            .filter(|assignment| filter.matches(assignment, levels.get(&assignment.task_id).copied()))
            .cloned()
            .collect();
        matched.sort_by_key(|assignment| assignment.id);
        matched
    }

    pub fn tasks_by_ids(&self, ids: &[TaskId]) -> Vec<Task> {
        let wanted: HashSet<TaskId> = ids.iter().copied().collect();
        self.tasks
            .iter()
            .filter(|task| wanted.contains(&task.id))
            .cloned()
            .collect()
    }

    /// Edges pointing into any of `successors`.
    pub fn predecessor_edges(&self, successors: &[TaskId]) -> Vec<TaskDependency> {
        let wanted: HashSet<TaskId> = successors.iter().copied().collect();
        self.dependencies
            .iter()
            .filter(|dep| wanted.contains(&dep.successor))
            .cloned()
            .collect()
    }

    pub fn exceptions_for(&self, people: &[PersonId]) -> Vec<CalendarException> {
        let wanted: HashSet<PersonId> = people.iter().copied().collect();
        self.calendar_exceptions
            .iter()
            .filter(|exception| wanted.contains(&exception.person_id))
            .cloned()
            .collect()
    }

    /// Writes planned dates and clears dirty flags. Either every plan applies
    /// or none does.
    pub fn apply_plans(
        &mut self,
        plans: &[PlannedDates],
    ) -> Result<Vec<AssignmentId>, ScheduleError> {
        let index: HashMap<AssignmentId, usize> = self
            .assignments
            .iter()
            .enumerate()
            .map(|(idx, assignment)| (assignment.id, idx))
            .collect();
        for plan in plans {
            if !index.contains_key(&plan.assignment_id) {
                return Err(ScheduleError::UnknownAssignment(plan.assignment_id));
            }
        }
        let mut skipped = Vec::new();
        for plan in plans {
            let assignment = &mut self.assignments[index[&plan.assignment_id]];
            // Work started since the plan was computed keeps its dates.
            if assignment.is_fixed() {
                skipped.push(assignment.id);
                continue;
            }
            assignment.apply_plan(plan.planned_start, plan.planned_end);
        }
        Ok(skipped)
    }
}
