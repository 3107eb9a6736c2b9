use chrono::{NaiveDate, NaiveDateTime, Weekday};
use std::fs;
use tempfile::NamedTempFile;
use workload_scheduler::persistence::file::{load_calendar_config, save_calendar_config};
use workload_scheduler::{
    Assignment, AssignmentFilter, CalendarException, Holiday, InMemoryScheduleStore,
    PersistenceError, Person, PlannedDates, Schedule, ScheduleError, ScheduleStore, Task,
    TaskDependency, WorkCalendarConfig, load_schedule_from_json, save_schedule_to_json,
    total_effort_estimation,
};

fn at(y: i32, m: u32, day: u32, h: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(y, m, day)
        .unwrap()
        .and_hms_opt(h, 0, 0)
        .unwrap()
}

fn sample() -> Schedule {
    let mut fixed = Assignment::new(2, 2, 2, at(2024, 1, 2, 9)).with_effort(1.0);
    fixed.actual_start = Some(at(2024, 1, 3, 9));
    Schedule {
        people: vec![Person::new(1, "Ana"), Person::new(2, "Ben")],
        tasks: vec![
            Task::new(1, "Design", at(2024, 1, 1, 9)),
            Task::new(2, "Build", at(2024, 1, 1, 10)).with_priority(2),
            Task::new(3, "Build API", at(2024, 1, 1, 11))
                .with_level(2)
                .with_parent(2),
        ],
        dependencies: vec![TaskDependency::new(1, 2, at(2024, 1, 1, 12))],
        assignments: vec![
            Assignment::new(1, 1, 1, at(2024, 1, 2, 9)).with_effort(2.0),
            fixed,
            Assignment::new(3, 3, 1, at(2024, 1, 2, 9)).with_effort(0.5),
        ],
        holidays: vec![Holiday::new(
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            "New Year",
        )],
        calendar_exceptions: vec![CalendarException::overtime(
            1,
            NaiveDate::from_ymd_opt(2024, 1, 6).unwrap(),
            Some(4.0),
        )],
    }
}

#[test]
fn json_file_round_trip_preserves_schedule() {
    let file = NamedTempFile::new().unwrap();
    let schedule = sample();
    save_schedule_to_json(&schedule, file.path()).unwrap();
    let loaded = load_schedule_from_json(file.path()).unwrap();
    assert_eq!(loaded, schedule);
}

#[test]
fn loading_rejects_inconsistent_data() {
    let file = NamedTempFile::new().unwrap();
    let mut schedule = sample();
    schedule.assignments[0].person_id = 99;
    fs::write(file.path(), serde_json::to_string(&schedule).unwrap()).unwrap();
    let err = load_schedule_from_json(file.path()).unwrap_err();
    assert!(matches!(err, PersistenceError::InvalidData(_)), "{err}");
}

#[test]
fn sparse_json_uses_defaults() {
    let file = NamedTempFile::new().unwrap();
    fs::write(
        file.path(),
        r#"{
            "people": [{"id": 1, "name": "Ana"}],
            "tasks": [{"id": 1, "name": "Design", "created_at": "2024-01-01T09:00:00"}],
            "assignments": [{"id": 1, "task_id": 1, "person_id": 1,
                             "assigned_at": "2024-01-02T09:00:00", "effort_estimation": 1.5}]
        }"#,
    )
    .unwrap();
    let loaded = load_schedule_from_json(file.path()).unwrap();
    assert_eq!(loaded.tasks[0].level, 1);
    assert!(!loaded.assignments[0].needs_recalculation);
    assert!(loaded.holidays.is_empty());
}

#[test]
fn calendar_config_round_trip_and_partial_files() {
    let file = NamedTempFile::new().unwrap();
    let config = WorkCalendarConfig {
        working_days: vec![Weekday::Mon, Weekday::Tue, Weekday::Wed, Weekday::Thu],
        default_daily_hours: 10.0,
        ..WorkCalendarConfig::default()
    };
    save_calendar_config(&config, file.path()).unwrap();
    assert_eq!(load_calendar_config(file.path()).unwrap(), config);

    fs::write(file.path(), r#"{"default_daily_hours": 6.0}"#).unwrap();
    let partial = load_calendar_config(file.path()).unwrap();
    assert_eq!(partial.default_daily_hours, 6.0);
    assert_eq!(partial.working_days.len(), 5);

    fs::write(file.path(), r#"{"working_days": []}"#).unwrap();
    assert!(matches!(
        load_calendar_config(file.path()),
        Err(PersistenceError::InvalidData(_))
    ));
}

#[test]
fn memory_store_filters_assignments() {
    let store = InMemoryScheduleStore::from_schedule(sample()).unwrap();
    store.mark_dirty(1).unwrap();

    let ids = |filter: AssignmentFilter| -> Vec<i32> {
        store
            .assignments(&filter)
            .unwrap()
            .iter()
            .map(|a| a.id)
            .collect()
    };
    assert_eq!(ids(AssignmentFilter::for_person(1)), vec![1, 3]);
    assert_eq!(ids(AssignmentFilter::all().fixed(true)), vec![2]);
    assert_eq!(ids(AssignmentFilter::all().needs_recalculation(true)), vec![1]);
    assert_eq!(ids(AssignmentFilter::for_person(1).task_level(2)), vec![3]);
    assert_eq!(ids(AssignmentFilter::for_tasks(vec![2, 3])), vec![2, 3]);

    assert_eq!(store.predecessor_edges(&[2]).unwrap().len(), 1);
    assert!(store.predecessor_edges(&[1]).unwrap().is_empty());
    assert_eq!(store.calendar_exceptions(&[1]).unwrap().len(), 1);
    assert!(store.calendar_exceptions(&[2]).unwrap().is_empty());
}

#[test]
fn fixed_assignments_cannot_be_marked_dirty() {
    let store = InMemoryScheduleStore::from_schedule(sample()).unwrap();
    assert!(!store.mark_dirty(2).unwrap());
    assert_eq!(store.mark_person_dirty(2), 0);
    assert_eq!(store.mark_person_dirty(1), 2);
    assert!(matches!(
        store.mark_dirty(42),
        Err(ScheduleError::UnknownAssignment(42))
    ));
}

#[test]
fn planned_date_writes_are_all_or_nothing() {
    let store = InMemoryScheduleStore::from_schedule(sample()).unwrap();
    store.mark_dirty(1).unwrap();
    let good = PlannedDates::new(1, at(2024, 1, 8, 9), at(2024, 1, 9, 17));
    let bad = PlannedDates::new(77, at(2024, 1, 8, 9), at(2024, 1, 9, 17));

    let err = store.write_planned_dates(&[good, bad]).unwrap_err();
    assert!(matches!(err, PersistenceError::NotFound(_)));
    assert_eq!(store.snapshot(), {
        let mut expected = sample();
        expected.assignments[0].needs_recalculation = true;
        expected
    });

    store.write_planned_dates(&[good]).unwrap();
    let updated = store.assignment(1).unwrap().unwrap();
    assert_eq!(updated.planned_end, Some(at(2024, 1, 9, 17)));
    assert!(!updated.needs_recalculation);
}

#[test]
fn exception_upsert_replaces_previous_entry() {
    let store = InMemoryScheduleStore::from_schedule(sample()).unwrap();
    let date = NaiveDate::from_ymd_opt(2024, 1, 6).unwrap();
    let previous = store
        .set_calendar_exception(CalendarException::leave(1, date))
        .unwrap();
    assert!(previous.is_some());
    let exceptions = store.calendar_exceptions(&[1]).unwrap();
    assert_eq!(exceptions, vec![CalendarException::leave(1, date)]);
    assert!(store.remove_calendar_exception(1, date));
}

#[test]
fn schedule_mutations_are_validated() {
    let mut schedule = sample();
    assert!(matches!(
        schedule.add_dependency(TaskDependency::new(1, 1, at(2024, 1, 1, 9))),
        Err(ScheduleError::Invalid(_))
    ));
    assert!(!schedule
        .add_dependency(TaskDependency::new(1, 2, at(2024, 1, 1, 9)))
        .unwrap());
    assert!(matches!(
        schedule.upsert_task(Task::new(9, "Orphan", at(2024, 1, 1, 9)).with_parent(99)),
        Err(ScheduleError::UnknownTask(99))
    ));

    let negative = Assignment::new(9, 1, 1, at(2024, 1, 2, 9)).with_effort(-1.0);
    assert!(matches!(
        schedule.upsert_assignment(negative),
        Err(ScheduleError::Invalid(_))
    ));
    let too_long = CalendarException::overtime(
        1,
        NaiveDate::from_ymd_opt(2024, 1, 13).unwrap(),
        Some(25.0),
    );
    assert!(schedule.set_calendar_exception(too_long).is_err());
    assert_eq!(schedule.next_assignment_id(), 4);
}

#[test]
fn total_effort_rolls_up_from_sub_tasks() {
    let schedule = sample();
    // Task 2 has a sub-task, so only the sub-task's estimate counts.
    assert_eq!(
        total_effort_estimation(2, &schedule.tasks, &schedule.assignments),
        0.5
    );
    assert_eq!(
        total_effort_estimation(1, &schedule.tasks, &schedule.assignments),
        2.0
    );
}

#[test]
fn started_assignments_never_stay_dirty() {
    let mut schedule = sample();
    let mut started = schedule.assignments[0].clone();
    started.actual_start = Some(at(2024, 1, 4, 9));
    started.needs_recalculation = true;
    schedule.upsert_assignment(started).unwrap();
    let stored = schedule.assignment(1).unwrap();
    assert!(stored.is_fixed());
    assert!(!stored.needs_recalculation);

    // Files and stores holding a dirty fixed assignment are rejected.
    let mut raw = sample();
    raw.assignments[1].needs_recalculation = true;
    let file = NamedTempFile::new().unwrap();
    fs::write(file.path(), serde_json::to_string(&raw).unwrap()).unwrap();
    assert!(matches!(
        load_schedule_from_json(file.path()),
        Err(PersistenceError::InvalidData(_))
    ));
    assert!(InMemoryScheduleStore::from_schedule(raw).is_err());
}

#[test]
fn planned_date_writes_skip_fixed_assignments() {
    let store = InMemoryScheduleStore::from_schedule(sample()).unwrap();
    store
        .write_planned_dates(&[
            PlannedDates::new(2, at(2024, 1, 8, 9), at(2024, 1, 8, 17)),
            PlannedDates::new(3, at(2024, 1, 9, 9), at(2024, 1, 9, 17)),
        ])
        .unwrap();
    assert_eq!(store.assignment(2).unwrap().unwrap().planned_start, None);
    assert_eq!(
        store.assignment(3).unwrap().unwrap().planned_start,
        Some(at(2024, 1, 9, 9))
    );
}

#[test]
fn memory_snapshot_limits_exceptions_to_requested_people() {
    let store = InMemoryScheduleStore::from_schedule(sample()).unwrap();
    let snapshot = store.read_snapshot(&[2]).unwrap();
    assert_eq!(snapshot.assignments, sample().assignments);
    assert_eq!(snapshot.dependencies.len(), 1);
    assert!(snapshot.calendar_exceptions.is_empty());
    assert_eq!(store.read_snapshot(&[1]).unwrap().calendar_exceptions.len(), 1);
}
