use chrono::{NaiveDate, NaiveDateTime, Weekday};
use proptest::prelude::*;
use workload_scheduler::calendar::{
    CalendarError, CalendarException, WorkCalendar, WorkCalendarConfig,
};

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

fn at(y: i32, m: u32, day: u32, h: u32, min: u32) -> NaiveDateTime {
    d(y, m, day).and_hms_opt(h, min, 0).unwrap()
}

// 2024-01-01 is a Monday.
fn calendar_with_new_year() -> WorkCalendar {
    let mut cal = WorkCalendar::default();
    cal.add_holiday(d(2024, 1, 1));
    cal
}

#[test]
fn weekends_and_holidays_are_not_working_days() {
    let cal = calendar_with_new_year();
    assert!(!cal.is_working_day(1, d(2024, 1, 6)));
    assert!(!cal.is_working_day(1, d(2024, 1, 7)));
    assert!(!cal.is_working_day(1, d(2024, 1, 1)));
    assert!(cal.is_working_day(1, d(2024, 1, 2)));
}

#[test]
fn overtime_sunday_is_a_short_working_day() {
    let mut cal = WorkCalendar::default();
    let sunday = d(2024, 1, 7);
    cal.set_exception(CalendarException::overtime(1, sunday, Some(4.0)));

    assert!(cal.is_working_day(1, sunday));
    assert_eq!(cal.daily_working_hours(1, sunday), 4.0);
    assert_eq!(cal.end_of_working_day(1, sunday), at(2024, 1, 7, 23, 59));
    // Other people keep the ordinary weekend.
    assert!(!cal.is_working_day(2, sunday));
}

#[test]
fn overtime_on_holiday_overrides_holiday() {
    let mut cal = calendar_with_new_year();
    cal.set_exception(CalendarException::overtime(1, d(2024, 1, 1), None));
    assert!(cal.is_working_day(1, d(2024, 1, 1)));
    assert_eq!(cal.daily_working_hours(1, d(2024, 1, 1)), 8.0);
}

#[test]
fn leave_on_weekday_is_not_working() {
    let mut cal = WorkCalendar::default();
    cal.set_exception(CalendarException::leave(1, d(2024, 1, 3)));
    assert!(!cal.is_working_day(1, d(2024, 1, 3)));
    assert_eq!(cal.end_of_working_day(1, d(2024, 1, 2)), at(2024, 1, 2, 17, 0));
}

#[test]
fn setting_an_exception_replaces_the_previous_one() {
    let mut cal = WorkCalendar::default();
    let day = d(2024, 1, 6);
    assert!(cal.set_exception(CalendarException::leave(1, day)).is_none());
    let previous = cal.set_exception(CalendarException::overtime(1, day, Some(6.0)));
    assert!(previous.is_some());
    assert!(cal.is_working_day(1, day));
    assert_eq!(cal.daily_working_hours(1, day), 6.0);
}

#[test]
fn next_available_workday_skips_weekend_and_holiday() {
    let cal = calendar_with_new_year();
    // Saturday 2023-12-30 -> Monday is New Year -> Tuesday.
    let next = cal.next_available_workday(1, d(2023, 12, 30)).unwrap();
    assert_eq!(next, at(2024, 1, 2, 9, 0));
    // A working day is returned as-is at start of day.
    let same = cal.next_available_workday(1, d(2024, 1, 3)).unwrap();
    assert_eq!(same, at(2024, 1, 3, 9, 0));
}

#[test]
fn add_working_hours_lands_on_end_of_consuming_day() {
    let cal = calendar_with_new_year();
    let end = cal.add_working_hours(1, at(2024, 1, 8, 9, 0), 16.0).unwrap();
    assert_eq!(end, at(2024, 1, 9, 17, 0));

    let partial = cal.add_working_hours(1, at(2024, 1, 8, 9, 0), 10.0).unwrap();
    assert_eq!(partial, at(2024, 1, 9, 17, 0));
}

#[test]
fn add_working_hours_skips_weekend() {
    let cal = WorkCalendar::default();
    let end = cal.add_working_hours(1, at(2024, 1, 5, 9, 0), 16.0).unwrap();
    assert_eq!(end, at(2024, 1, 8, 17, 0));
}

#[test]
fn add_working_hours_uses_overtime_capacity() {
    let mut cal = WorkCalendar::default();
    cal.set_exception(CalendarException::overtime(1, d(2024, 1, 6), Some(4.0)));
    let end = cal.add_working_hours(1, at(2024, 1, 5, 9, 0), 12.0).unwrap();
    assert_eq!(end, at(2024, 1, 6, 23, 59));
}

#[test]
fn zero_hours_resolve_to_end_of_first_open_working_day() {
    let cal = WorkCalendar::default();
    let monday_morning = cal.add_working_hours(1, at(2024, 1, 8, 10, 0), 0.0).unwrap();
    assert_eq!(monday_morning, at(2024, 1, 8, 17, 0));

    let monday_evening = cal.add_working_hours(1, at(2024, 1, 8, 18, 0), 0.0).unwrap();
    assert_eq!(monday_evening, at(2024, 1, 9, 17, 0));

    let saturday = cal.add_working_hours(1, at(2024, 1, 6, 10, 0), 0.0).unwrap();
    assert_eq!(saturday, at(2024, 1, 8, 17, 0));
}

#[test]
fn negative_or_non_finite_hours_are_rejected() {
    let cal = WorkCalendar::default();
    let start = at(2024, 1, 8, 9, 0);
    assert_eq!(
        cal.add_working_hours(1, start, -1.0),
        Err(CalendarError::InvalidHours(-1.0))
    );
    assert!(matches!(
        cal.add_working_hours(1, start, f64::NAN),
        Err(CalendarError::InvalidHours(_))
    ));
}

#[test]
fn scans_give_up_after_the_configured_horizon() {
    let config = WorkCalendarConfig {
        working_days: vec![Weekday::Mon],
        max_scan_days: 5,
        ..WorkCalendarConfig::default()
    };
    let cal = WorkCalendar::from_config(config);
    // Tuesday through Saturday contains no Monday.
    let err = cal.next_available_workday(7, d(2024, 1, 2)).unwrap_err();
    assert_eq!(
        err,
        CalendarError::NoAvailableWorkdayFound {
            person: 7,
            from: d(2024, 1, 2),
            scanned_days: 5,
        }
    );
    assert!(cal.add_working_hours(7, at(2024, 1, 2, 9, 0), 8.0).is_err());
}

#[test]
fn config_validation_rejects_unusable_settings() {
    let empty_week = WorkCalendarConfig {
        working_days: Vec::new(),
        ..WorkCalendarConfig::default()
    };
    assert!(matches!(
        empty_week.validate(),
        Err(CalendarError::InvalidConfig(_))
    ));

    let long_day = WorkCalendarConfig {
        default_daily_hours: 30.0,
        ..WorkCalendarConfig::default()
    };
    assert!(long_day.validate().is_err());
    assert!(WorkCalendarConfig::default().validate().is_ok());
    assert_eq!(WorkCalendarConfig::default().effort_hours(2.5), 20.0);
}

#[test]
fn working_days_in_range_respects_exceptions() {
    let mut cal = calendar_with_new_year();
    cal.set_exception(CalendarException::leave(1, d(2024, 1, 3)));
    cal.set_exception(CalendarException::overtime(1, d(2024, 1, 6), None));
    let days = cal.working_days_in_range(1, d(2024, 1, 1), d(2024, 1, 7));
    assert_eq!(
        days,
        vec![d(2024, 1, 2), d(2024, 1, 4), d(2024, 1, 5), d(2024, 1, 6)]
    );
}

proptest! {
    #[test]
    fn added_hours_never_end_before_start(
        day_offset in 0i64..400,
        hour in 0u32..24,
        hours in 0.0f64..200.0,
    ) {
        let cal = calendar_with_new_year();
        let start = d(2024, 1, 1).and_hms_opt(hour, 0, 0).unwrap()
            + chrono::Duration::days(day_offset);
        let end = cal.add_working_hours(1, start, hours).unwrap();
        prop_assert!(end >= start);
        prop_assert!(cal.is_working_day(1, end.date()));
    }

    #[test]
    fn exceptions_take_precedence_over_defaults(day_offset in 0i64..730, overtime in any::<bool>()) {
        let mut cal = calendar_with_new_year();
        let date = d(2024, 1, 1) + chrono::Duration::days(day_offset);
        let exception = if overtime {
            CalendarException::overtime(3, date, Some(2.0))
        } else {
            CalendarException::leave(3, date)
        };
        cal.set_exception(exception);
        prop_assert_eq!(cal.is_working_day(3, date), overtime);
    }
}

#[test]
fn stepping_past_the_last_date_is_an_error() {
    let mut cal = WorkCalendar::default();
    cal.set_exception(CalendarException::leave(1, NaiveDate::MAX));

    assert_eq!(
        cal.next_available_workday(1, NaiveDate::MAX).unwrap_err(),
        CalendarError::NoAvailableWorkdayFound {
            person: 1,
            from: NaiveDate::MAX,
            scanned_days: 1,
        }
    );
    let last_morning = NaiveDate::MAX.and_hms_opt(9, 0, 0).unwrap();
    assert!(matches!(
        cal.add_working_hours(1, last_morning, 16.0),
        Err(CalendarError::NoAvailableWorkdayFound { person: 1, .. })
    ));
    assert!(cal
        .working_days_in_range(1, NaiveDate::MAX, NaiveDate::MAX)
        .is_empty());
}
