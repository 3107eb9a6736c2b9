use crate::person::PersonId;
use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

const EPSILON: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExceptionStatus {
    /// Not working, even on an ordinary weekday.
    Leave,
    /// Working, even on a weekend or holiday.
    Overtime,
}

impl ExceptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExceptionStatus::Leave => "leave",
            ExceptionStatus::Overtime => "overtime",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "leave" => Some(ExceptionStatus::Leave),
            "overtime" => Some(ExceptionStatus::Overtime),
            _ => None,
        }
    }
}

/// A non-default day in one person's calendar. Days without an exception
/// follow the weekly pattern and the global holiday table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarException {
    pub person_id: PersonId,
    pub date: NaiveDate,
    pub status: ExceptionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hours_worked: Option<f64>,
}

impl CalendarException {
    pub fn leave(person_id: PersonId, date: NaiveDate) -> Self {
        Self {
            person_id,
            date,
            status: ExceptionStatus::Leave,
            hours_worked: None,
        }
    }

    pub fn overtime(person_id: PersonId, date: NaiveDate, hours_worked: Option<f64>) -> Self {
        Self {
            person_id,
            date,
            status: ExceptionStatus::Overtime,
            hours_worked,
        }
    }
}

/// Public holiday shared by every person.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Holiday {
    pub date: NaiveDate,
    pub name: String,
}

impl Holiday {
    pub fn new(date: NaiveDate, name: impl Into<String>) -> Self {
        Self {
            date,
            name: name.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CalendarError {
    #[error("no available workday for person {person} within {scanned_days} days of {from}")]
    NoAvailableWorkdayFound {
        person: PersonId,
        from: NaiveDate,
        scanned_days: u32,
    },
    #[error("invalid working hours {0}")]
    InvalidHours(f64),
    #[error("invalid calendar configuration: {0}")]
    InvalidConfig(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkCalendarConfig {
    pub working_days: Vec<Weekday>,
    pub default_daily_hours: f64,
    pub workday_start: NaiveTime,
    pub workday_end: NaiveTime,
    pub overtime_day_end: NaiveTime,
    /// Upper bound on days any forward scan may visit.
    pub max_scan_days: u32,
}

impl Default for WorkCalendarConfig {
    fn default() -> Self {
        Self {
            working_days: vec![
                Weekday::Mon,
                Weekday::Tue,
                Weekday::Wed,
                Weekday::Thu,
                Weekday::Fri,
            ],
            default_daily_hours: 8.0,
            workday_start: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            workday_end: NaiveTime::from_hms_opt(17, 0, 0).unwrap(),
            overtime_day_end: NaiveTime::from_hms_opt(23, 59, 0).unwrap(),
            max_scan_days: 3660,
        }
    }
}

impl WorkCalendarConfig {
    pub fn validate(&self) -> Result<(), CalendarError> {
        if self.working_days.is_empty() {
            return Err(CalendarError::InvalidConfig(
                "at least one working day is required".into(),
            ));
        }
        if !self.default_daily_hours.is_finite()
            || self.default_daily_hours <= 0.0
            || self.default_daily_hours > 24.0
        {
            return Err(CalendarError::InvalidConfig(format!(
                "default_daily_hours must be in (0, 24] (got {})",
                self.default_daily_hours
            )));
        }
        if self.workday_start >= self.workday_end {
            return Err(CalendarError::InvalidConfig(format!(
                "workday_start {} must precede workday_end {}",
                self.workday_start, self.workday_end
            )));
        }
        if self.max_scan_days == 0 {
            return Err(CalendarError::InvalidConfig(
                "max_scan_days must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Effort is stored in person-days; the calendar works in hours.
    pub fn effort_hours(&self, person_days: f64) -> f64 {
        person_days * self.default_daily_hours
    }
}

#[derive(Debug, Clone)]
pub struct WorkCalendar {
    config: WorkCalendarConfig,
    working_days: HashSet<Weekday>,
    holidays: HashSet<NaiveDate>,
    exceptions: HashMap<(PersonId, NaiveDate), CalendarException>,
}

impl Default for WorkCalendar {
    fn default() -> Self {
        Self::from_config(WorkCalendarConfig::default())
    }
}

impl WorkCalendar {
    pub fn from_config(config: WorkCalendarConfig) -> Self {
        let working_days = config.working_days.iter().copied().collect();
        Self {
            config,
            working_days,
            holidays: HashSet::new(),
            exceptions: HashMap::new(),
        }
    }

    pub fn config(&self) -> &WorkCalendarConfig {
        &self.config
    }

    pub fn add_holiday(&mut self, date: NaiveDate) {
        self.holidays.insert(date);
    }

    pub fn add_holidays<I>(&mut self, dates: I)
    where
        I: IntoIterator<Item = NaiveDate>,
    {
        self.holidays.extend(dates);
    }

    /// Stores an exception, replacing any previous one for the same person and
    /// date.
    pub fn set_exception(&mut self, exception: CalendarException) -> Option<CalendarException> {
        self.exceptions
            .insert((exception.person_id, exception.date), exception)
    }

    pub fn extend_exceptions<I>(&mut self, exceptions: I)
    where
        I: IntoIterator<Item = CalendarException>,
    {
        for exception in exceptions {
            self.set_exception(exception);
        }
    }

    pub fn exception(&self, person: PersonId, date: NaiveDate) -> Option<&CalendarException> {
        self.exceptions.get(&(person, date))
    }

    pub fn is_holiday(&self, date: NaiveDate) -> bool {
        self.holidays.contains(&date)
    }

    /// Working-day status ignoring any person-specific exception.
    pub fn is_default_working_day(&self, date: NaiveDate) -> bool {
        self.working_days.contains(&date.weekday()) && !self.is_holiday(date)
    }

    pub fn is_working_day(&self, person: PersonId, date: NaiveDate) -> bool {
        if let Some(exception) = self.exception(person, date) {
            return exception.status == ExceptionStatus::Overtime;
        }
        self.is_default_working_day(date)
    }

    pub fn daily_working_hours(&self, person: PersonId, date: NaiveDate) -> f64 {
        self.exception(person, date)
            .and_then(|exception| exception.hours_worked)
            .unwrap_or(self.config.default_daily_hours)
    }

    pub fn start_of_working_day(&self, date: NaiveDate) -> NaiveDateTime {
        date.and_time(self.config.workday_start)
    }

    /// Cutoff for the given day. Only meaningful on working days.
    pub fn end_of_working_day(&self, person: PersonId, date: NaiveDate) -> NaiveDateTime {
        match self.exception(person, date) {
            Some(exception) if exception.status == ExceptionStatus::Overtime => {
                date.and_time(self.config.overtime_day_end)
            }
            _ => date.and_time(self.config.workday_end),
        }
    }

    /// First working day on or after `from`, at the start-of-day time.
    pub fn next_available_workday(
        &self,
        person: PersonId,
        from: NaiveDate,
    ) -> Result<NaiveDateTime, CalendarError> {
        let mut current = from;
        for scanned in 1..=self.config.max_scan_days {
            if self.is_working_day(person, current) {
                return Ok(self.start_of_working_day(current));
            }
            current = current
                .succ_opt()
                .ok_or(CalendarError::NoAvailableWorkdayFound {
                    person,
                    from,
                    scanned_days: scanned,
                })?;
        }
        Err(CalendarError::NoAvailableWorkdayFound {
            person,
            from,
            scanned_days: self.config.max_scan_days,
        })
    }

    /// Walks forward from `start`, consuming each working day's hours, and
    /// returns the cutoff of the day on which `hours` is fully consumed.
    ///
    /// A first day whose cutoff is not after `start` contributes nothing, so
    /// the result is never earlier than `start`.
    pub fn add_working_hours(
        &self,
        person: PersonId,
        start: NaiveDateTime,
        hours: f64,
    ) -> Result<NaiveDateTime, CalendarError> {
        if !hours.is_finite() || hours < 0.0 {
            return Err(CalendarError::InvalidHours(hours));
        }

        let mut day = start.date();
        let mut remaining = hours;
        for scanned in 0..self.config.max_scan_days {
            let cutoff = self.end_of_working_day(person, day);
            let usable = self.is_working_day(person, day) && (scanned > 0 || start < cutoff);
            if usable {
                let capacity = self.daily_working_hours(person, day);
                if remaining <= capacity + EPSILON {
                    return Ok(cutoff);
                }
                remaining -= capacity;
            }
            // The calendar ends before the hours do.
            day = day.succ_opt().ok_or(CalendarError::NoAvailableWorkdayFound {
                person,
                from: start.date(),
                scanned_days: scanned + 1,
            })?;
        }
        Err(CalendarError::NoAvailableWorkdayFound {
            person,
            from: start.date(),
            scanned_days: self.config.max_scan_days,
        })
    }

    /// Working days for a person in an inclusive date range.
    pub fn working_days_in_range(
        &self,
        person: PersonId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Vec<NaiveDate> {
        let mut days = Vec::new();
        let mut current = start;
        while current <= end {
            if self.is_working_day(person, current) {
                days.push(current);
            }
            match current.succ_opt() {
                Some(next) => current = next,
                None => break,
            }
        }
        days
    }
}
