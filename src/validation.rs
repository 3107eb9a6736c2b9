use crate::assignment::Assignment;
use crate::calendar::CalendarException;
use crate::schedule::Schedule;
use std::collections::HashSet;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ValidationError {
    message: String,
}

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

pub fn validate_assignment(assignment: &Assignment) -> Result<(), ValidationError> {
    if let Some(effort) = assignment.effort_estimation {
        if !effort.is_finite() || effort < 0.0 {
            return Err(ValidationError::new(format!(
                "assignment {} has invalid effort_estimation {} (must be a non-negative number of person-days)",
                assignment.id, effort
            )));
        }
    }
    if let (Some(start), Some(end)) = (assignment.actual_start, assignment.actual_end) {
        if start > end {
            return Err(ValidationError::new(format!(
                "assignment {} has actual_start {} after actual_end {}",
                assignment.id, start, end
            )));
        }
    }
    if assignment.is_fixed() && assignment.needs_recalculation {
        return Err(ValidationError::new(format!(
            "assignment {} has recorded actual dates and cannot need recalculation",
            assignment.id
        )));
    }
    Ok(())
}

pub fn validate_calendar_exception(exception: &CalendarException) -> Result<(), ValidationError> {
    if let Some(hours) = exception.hours_worked {
        if !hours.is_finite() || !(0.0..=24.0).contains(&hours) {
            return Err(ValidationError::new(format!(
                "calendar exception for person {} on {} has invalid hours_worked {} (must be between 0 and 24)",
                exception.person_id, exception.date, hours
            )));
        }
    }
    Ok(())
}

pub fn validate_schedule(schedule: &Schedule) -> Result<(), ValidationError> {
    let mut person_ids = HashSet::with_capacity(schedule.people.len());
    for person in &schedule.people {
        if !person_ids.insert(person.id) {
            return Err(ValidationError::new(format!(
                "duplicate person id {}",
                person.id
            )));
        }
    }

    let mut task_ids = HashSet::with_capacity(schedule.tasks.len());
    for task in &schedule.tasks {
        if !task_ids.insert(task.id) {
            return Err(ValidationError::new(format!("duplicate task id {}", task.id)));
        }
    }
    for task in &schedule.tasks {
        if let Some(parent) = task.parent_id {
            if parent == task.id || !task_ids.contains(&parent) {
                return Err(ValidationError::new(format!(
                    "task {} references unknown parent task {}",
                    task.id, parent
                )));
            }
        }
    }

    let mut edges = HashSet::with_capacity(schedule.dependencies.len());
    for dep in &schedule.dependencies {
        if dep.predecessor == dep.successor {
            return Err(ValidationError::new(format!(
                "task {} cannot depend on itself",
                dep.successor
            )));
        }
        for id in [dep.predecessor, dep.successor] {
            if !task_ids.contains(&id) {
                return Err(ValidationError::new(format!(
                    "dependency {} -> {} references unknown task {}",
                    dep.predecessor, dep.successor, id
                )));
            }
        }
        if !edges.insert((dep.predecessor, dep.successor)) {
            return Err(ValidationError::new(format!(
                "duplicate dependency {} -> {}",
                dep.predecessor, dep.successor
            )));
        }
    }

    let mut assignment_ids = HashSet::with_capacity(schedule.assignments.len());
    for assignment in &schedule.assignments {
        if !assignment_ids.insert(assignment.id) {
            return Err(ValidationError::new(format!(
                "duplicate assignment id {}",
                assignment.id
            )));
        }
        if !task_ids.contains(&assignment.task_id) {
            return Err(ValidationError::new(format!(
                "assignment {} references unknown task {}",
                assignment.id, assignment.task_id
            )));
        }
        if !person_ids.contains(&assignment.person_id) {
            return Err(ValidationError::new(format!(
                "assignment {} references unknown person {}",
                assignment.id, assignment.person_id
            )));
        }
        validate_assignment(assignment)?;
    }

    let mut holiday_dates = HashSet::with_capacity(schedule.holidays.len());
    for holiday in &schedule.holidays {
        if !holiday_dates.insert(holiday.date) {
            return Err(ValidationError::new(format!(
                "duplicate holiday on {}",
                holiday.date
            )));
        }
    }

    let mut exception_keys = HashSet::with_capacity(schedule.calendar_exceptions.len());
    for exception in &schedule.calendar_exceptions {
        if !person_ids.contains(&exception.person_id) {
            return Err(ValidationError::new(format!(
                "calendar exception on {} references unknown person {}",
                exception.date, exception.person_id
            )));
        }
        if !exception_keys.insert((exception.person_id, exception.date)) {
            return Err(ValidationError::new(format!(
                "person {} has more than one calendar exception on {}",
                exception.person_id, exception.date
            )));
        }
        validate_calendar_exception(exception)?;
    }

    Ok(())
}
