use super::PlannedDates;
use crate::assignment::Assignment;
use crate::calendar::{CalendarError, WorkCalendar};
use crate::person::PersonId;
use chrono::NaiveDateTime;

/// Plans a single assignment after everything it has to wait for: the
/// person's settled work, their recorded actuals, the present moment and the
/// ends of its predecessor tasks.
pub struct DependencyAwarePass<'a> {
    calendar: &'a WorkCalendar,
    now: NaiveDateTime,
}

impl<'a> DependencyAwarePass<'a> {
    pub fn new(calendar: &'a WorkCalendar, now: NaiveDateTime) -> Self {
        Self { calendar, now }
    }

    /// Latest of: planned ends of the person's clean assignments, actual ends
    /// of any of their assignments, now, and the latest predecessor end.
    pub fn candidate_start(
        &self,
        assignment: &Assignment,
        history: &[&Assignment],
        predecessor_ends: &[NaiveDateTime],
    ) -> NaiveDateTime {
        let latest_settled = history
            .iter()
            .filter(|other| other.id != assignment.id && !other.needs_recalculation)
            .filter_map(|other| other.planned_end)
            .max();
        let latest_actual = history.iter().filter_map(|other| other.actual_end).max();

        let mut candidate = [latest_settled, latest_actual]
            .into_iter()
            .flatten()
            .fold(self.now, NaiveDateTime::max);
        if let Some(latest_predecessor) = predecessor_ends.iter().max() {
            candidate = candidate.max(*latest_predecessor);
        }
        candidate
    }

    /// Returns `None` for assignments without an estimate.
    pub fn plan(
        &self,
        assignment: &Assignment,
        history: &[&Assignment],
        predecessor_ends: &[NaiveDateTime],
    ) -> Result<Option<PlannedDates>, CalendarError> {
        let Some(effort) = assignment.effort_estimation else {
            return Ok(None);
        };
        let person = assignment.person_id;
        let candidate = self.candidate_start(assignment, history, predecessor_ends);
        let planned_start = self.resolve_start(person, candidate)?;
        let planned_end = self.calendar.add_working_hours(
            person,
            planned_start,
            self.calendar.config().effort_hours(effort),
        )?;
        Ok(Some(PlannedDates::new(
            assignment.id,
            planned_start,
            planned_end,
        )))
    }

    /// Start-of-day of the candidate's first available workday, unless the
    /// candidate falls later in that same day. Then the work resumes at the
    /// candidate while the day is still open, or on the next workday.
    fn resolve_start(
        &self,
        person: PersonId,
        candidate: NaiveDateTime,
    ) -> Result<NaiveDateTime, CalendarError> {
        let start = self
            .calendar
            .next_available_workday(person, candidate.date())?;
        if start >= candidate {
            return Ok(start);
        }
        if candidate < self.calendar.end_of_working_day(person, start.date()) {
            return Ok(candidate);
        }
        let next_day = candidate
            .date()
            .succ_opt()
            .ok_or(CalendarError::NoAvailableWorkdayFound {
                person,
                from: candidate.date(),
                scanned_days: 1,
            })?;
        self.calendar.next_available_workday(person, next_day)
    }
}
