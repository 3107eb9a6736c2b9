use super::PlannedDates;
use crate::assignment::Assignment;
use crate::calendar::{CalendarError, WorkCalendar};
use crate::person::PersonId;
use chrono::{Duration, NaiveDate, NaiveDateTime};

const EPSILON: f64 = 1e-6;

/// Lays one person's assignments end to end, ignoring task dependencies.
///
/// Each assignment starts on the first working day at or after the previous
/// one's end. Its end is the working day after the last day that contributed
/// hours, so consecutive assignments never overlap.
pub struct PersonSequentialPass<'a> {
    calendar: &'a WorkCalendar,
    person: PersonId,
}

impl<'a> PersonSequentialPass<'a> {
    pub fn new(calendar: &'a WorkCalendar, person: PersonId) -> Self {
        Self { calendar, person }
    }

    /// `assignments` must already be in walk order. Unestimated assignments
    /// are skipped and keep whatever dates they had.
    pub fn execute(
        &self,
        assignments: &[&Assignment],
        today: NaiveDate,
    ) -> Result<Vec<PlannedDates>, CalendarError> {
        let mut current_date = today;
        let mut results = Vec::with_capacity(assignments.len());

        for assignment in assignments {
            let Some(effort) = assignment.effort_estimation else {
                continue;
            };
            let hours = self.calendar.config().effort_hours(effort);
            let planned_start = self
                .calendar
                .next_available_workday(self.person, current_date)?;
            let planned_end = self.accumulate(planned_start, hours)?;

            results.push(PlannedDates::new(assignment.id, planned_start, planned_end));
            current_date = planned_end.date();
        }

        Ok(results)
    }

    fn accumulate(
        &self,
        planned_start: NaiveDateTime,
        total_hours: f64,
    ) -> Result<NaiveDateTime, CalendarError> {
        if !total_hours.is_finite() || total_hours < 0.0 {
            return Err(CalendarError::InvalidHours(total_hours));
        }

        let limit = self.calendar.config().max_scan_days;
        let mut planned_end = planned_start;
        let mut hours_counted = 0.0;
        let mut scanned = 0;

        while hours_counted + EPSILON < total_hours {
            self.check_limit(planned_start, scanned, limit)?;
            if self.calendar.is_working_day(self.person, planned_end.date()) {
                let hours_today = self
                    .calendar
                    .daily_working_hours(self.person, planned_end.date());
                hours_counted += hours_today.min(total_hours - hours_counted);
            }
            planned_end = self.next_day(planned_start, planned_end, scanned)?;
            scanned += 1;
        }

        while !self.calendar.is_working_day(self.person, planned_end.date()) {
            self.check_limit(planned_start, scanned, limit)?;
            planned_end = self.next_day(planned_start, planned_end, scanned)?;
            scanned += 1;
        }

        Ok(planned_end)
    }

    fn next_day(
        &self,
        planned_start: NaiveDateTime,
        current: NaiveDateTime,
        scanned: u32,
    ) -> Result<NaiveDateTime, CalendarError> {
        current
            .checked_add_signed(Duration::days(1))
            .ok_or(CalendarError::NoAvailableWorkdayFound {
                person: self.person,
                from: planned_start.date(),
                scanned_days: scanned + 1,
            })
    }

    fn check_limit(
        &self,
        planned_start: NaiveDateTime,
        scanned: u32,
        limit: u32,
    ) -> Result<(), CalendarError> {
        if scanned >= limit {
            return Err(CalendarError::NoAvailableWorkdayFound {
                person: self.person,
                from: planned_start.date(),
                scanned_days: scanned,
            });
        }
        Ok(())
    }
}
