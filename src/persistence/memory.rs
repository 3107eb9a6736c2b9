use super::{AssignmentFilter, PersistenceError, PersistenceResult, ScheduleStore};
use crate::assignment::{Assignment, AssignmentId};
use crate::calculations::PlannedDates;
use crate::calendar::{CalendarException, Holiday};
use crate::person::{Person, PersonId};
use crate::schedule::{Schedule, ScheduleError};
use crate::task::{Task, TaskDependency, TaskId};
use chrono::NaiveDate;
use parking_lot::RwLock;
use tracing::{debug, warn};

/// A [`Schedule`] behind a read/write lock. Every write goes through one
/// exclusive lock, so plan commits are atomic with respect to readers.
#[derive(Debug, Default)]
pub struct InMemoryScheduleStore {
    schedule: RwLock<Schedule>,
}

impl InMemoryScheduleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_schedule(schedule: Schedule) -> PersistenceResult<Self> {
        schedule.validate()?;
        Ok(Self {
            schedule: RwLock::new(schedule),
        })
    }

    pub fn snapshot(&self) -> Schedule {
        self.schedule.read().clone()
    }

    pub fn replace(&self, schedule: Schedule) -> PersistenceResult<()> {
        schedule.validate()?;
        *self.schedule.write() = schedule;
        Ok(())
    }

    pub fn upsert_person(&self, person: Person) {
        self.schedule.write().upsert_person(person);
    }

    pub fn upsert_task(&self, task: Task) -> Result<(), ScheduleError> {
        self.schedule.write().upsert_task(task)
    }

    pub fn add_dependency(&self, dependency: TaskDependency) -> Result<bool, ScheduleError> {
        self.schedule.write().add_dependency(dependency)
    }

    pub fn upsert_assignment(&self, assignment: Assignment) -> Result<(), ScheduleError> {
        self.schedule.write().upsert_assignment(assignment)
    }

    pub fn upsert_holiday(&self, holiday: Holiday) {
        self.schedule.write().upsert_holiday(holiday);
    }

    pub fn set_calendar_exception(
        &self,
        exception: CalendarException,
    ) -> Result<Option<CalendarException>, ScheduleError> {
        self.schedule.write().set_calendar_exception(exception)
    }

    pub fn remove_calendar_exception(&self, person: PersonId, date: NaiveDate) -> bool {
        self.schedule.write().remove_calendar_exception(person, date)
    }

    pub fn mark_dirty(&self, id: AssignmentId) -> Result<bool, ScheduleError> {
        self.schedule.write().mark_dirty(id)
    }

    pub fn mark_person_dirty(&self, person: PersonId) -> usize {
        self.schedule.write().mark_person_dirty(person)
    }
}

impl ScheduleStore for InMemoryScheduleStore {
    fn people(&self) -> PersistenceResult<Vec<Person>> {
        Ok(self.schedule.read().people.clone())
    }

    fn tasks(&self, ids: &[TaskId]) -> PersistenceResult<Vec<Task>> {
        Ok(self.schedule.read().tasks_by_ids(ids))
    }

    fn assignments(&self, filter: &AssignmentFilter) -> PersistenceResult<Vec<Assignment>> {
        Ok(self.schedule.read().assignments_matching(filter))
    }

    fn assignment(&self, id: AssignmentId) -> PersistenceResult<Option<Assignment>> {
        Ok(self.schedule.read().assignment(id).cloned())
    }

    fn predecessor_edges(&self, successors: &[TaskId]) -> PersistenceResult<Vec<TaskDependency>> {
        Ok(self.schedule.read().predecessor_edges(successors))
    }

    fn holidays(&self) -> PersistenceResult<Vec<Holiday>> {
        Ok(self.schedule.read().holidays.clone())
    }

    fn calendar_exceptions(
        &self,
        people: &[PersonId],
    ) -> PersistenceResult<Vec<CalendarException>> {
        Ok(self.schedule.read().exceptions_for(people))
    }

    fn write_planned_dates(&self, plans: &[PlannedDates]) -> PersistenceResult<()> {
        if plans.is_empty() {
            return Ok(());
        }
        let skipped = self
            .schedule
            .write()
            .apply_plans(plans)
            .map_err(PersistenceError::from)?;
        if !skipped.is_empty() {
            warn!(?skipped, "plans for assignments fixed since they were read were dropped");
        }
        debug!(
            count = plans.len() - skipped.len(),
            "planned dates committed to memory store"
        );
        Ok(())
    }

    fn read_snapshot(&self, people: &[PersonId]) -> PersistenceResult<Schedule> {
        let schedule = self.schedule.read();
        Ok(Schedule {
            people: schedule.people.clone(),
            tasks: schedule.tasks.clone(),
            dependencies: schedule.dependencies.clone(),
            assignments: schedule.assignments.clone(),
            holidays: schedule.holidays.clone(),
            calendar_exceptions: schedule.exceptions_for(people),
        })
    }
}
