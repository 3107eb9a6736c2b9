#![cfg(feature = "http_api")]

use std::sync::Arc;

use axum::{
    body::{self, Body},
    http::{Request, StatusCode},
};
use chrono::{NaiveDate, NaiveDateTime};
use serde_json::{Value, json};
use tower::util::ServiceExt;
use workload_scheduler::{
    Assignment, FixedClock, InMemoryScheduleStore, Person, RecalcStrategy, Schedule,
    ScheduleRecalculator, Task, TaskDependency, WorkCalendarConfig, http_api,
};

fn at(y: i32, m: u32, day: u32, h: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(y, m, day)
        .unwrap()
        .and_hms_opt(h, 0, 0)
        .unwrap()
}

fn booked_schedule() -> Schedule {
    let mut booked = Assignment::new(1, 1, 1, at(2024, 1, 2, 9)).with_effort(1.0);
    booked.apply_plan(at(2024, 1, 5, 9), at(2024, 1, 5, 17));
    Schedule {
        people: vec![Person::new(1, "Ana"), Person::new(2, "Ben")],
        tasks: vec![
            Task::new(1, "Design", at(2024, 1, 1, 9)),
            Task::new(2, "Build", at(2024, 1, 1, 10)),
        ],
        assignments: vec![booked],
        ..Schedule::default()
    }
}

fn router_for(schedule: Schedule) -> axum::Router {
    let store = Arc::new(InMemoryScheduleStore::from_schedule(schedule).unwrap());
    // Friday noon.
    let recalculator = ScheduleRecalculator::new(store.clone(), WorkCalendarConfig::default())
        .with_clock(FixedClock(at(2024, 1, 5, 12)));
    http_api::router(http_api::AppState::with_recalculator(store, recalculator))
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap()
}

fn empty_request(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn read_json(response: axum::response::Response) -> Value {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_reports_ok() {
    let app = router_for(Schedule::default());
    let response = app.oneshot(empty_request("GET", "/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(read_json(response).await, json!({ "status": "ok" }));
}

#[tokio::test]
async fn assignment_write_triggers_recalculation() {
    let app = router_for(booked_schedule());
    let new_work = Assignment::new(2, 2, 1, at(2024, 1, 5, 12)).with_effort(2.0);

    let response = app
        .clone()
        .oneshot(json_request(
            "PUT",
            "/assignments/2",
            serde_json::to_value(&new_work).unwrap(),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["assignment"]["planned_start"], "2024-01-08T09:00:00");
    assert_eq!(body["assignment"]["planned_end"], "2024-01-09T17:00:00");
    assert_eq!(body["assignment"]["needs_recalculation"], false);
    assert_eq!(body["summary"]["strategy"], "dependency_aware");

    let response = app
        .oneshot(empty_request("GET", "/assignments?person=1"))
        .await
        .unwrap();
    let listed = read_json(response).await;
    assert_eq!(listed.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn calendar_exception_pushes_work_out() {
    let app = router_for(booked_schedule());
    let new_work = Assignment::new(2, 2, 1, at(2024, 1, 5, 12)).with_effort(2.0);
    app.clone()
        .oneshot(json_request(
            "PUT",
            "/assignments/2",
            serde_json::to_value(&new_work).unwrap(),
        ))
        .await
        .unwrap();

    let response = app
        .clone()
        .oneshot(json_request(
            "PUT",
            "/calendar/exceptions",
            json!({ "person_id": 1, "date": "2024-01-08", "status": "leave" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let summary = read_json(response).await;
    assert_eq!(summary["latest_end"], "2024-01-10T17:00:00");

    let response = app
        .oneshot(empty_request("GET", "/assignments/2"))
        .await
        .unwrap();
    let stored = read_json(response).await;
    assert_eq!(stored["planned_start"], "2024-01-09T09:00:00");
}

#[tokio::test]
async fn invalid_requests_are_rejected() {
    let app = router_for(booked_schedule());

    let response = app
        .clone()
        .oneshot(empty_request("POST", "/people/1/recalculate?strategy=fastest"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(read_json(response).await["error"], "invalid_request");

    let response = app
        .clone()
        .oneshot(empty_request("POST", "/people/9/recalculate"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .clone()
        .oneshot(empty_request("GET", "/assignments/42"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .oneshot(json_request(
            "PUT",
            "/calendar/exceptions",
            json!({ "person_id": 1, "date": "2024-01-06", "status": "overtime", "hours_worked": 30.0 }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn sequential_strategy_can_be_requested() {
    let app = router_for(booked_schedule());
    let response = app
        .oneshot(empty_request("POST", "/people/1/recalculate?strategy=person_sequential"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let summary = read_json(response).await;
    assert_eq!(summary["strategy"], "person_sequential");
    assert_eq!(summary["scheduled"][0]["planned_start"], "2024-01-05T09:00:00");
}

#[tokio::test(flavor = "multi_thread")]
async fn configured_strategy_drives_write_triggered_recalculation() {
    let store = Arc::new(InMemoryScheduleStore::from_schedule(booked_schedule()).unwrap());
    let recalculator = ScheduleRecalculator::new(store.clone(), WorkCalendarConfig::default())
        .with_clock(FixedClock(at(2024, 1, 5, 12)));
    let state = http_api::AppState::with_recalculator(store, recalculator)
        .with_strategy(RecalcStrategy::PersonSequential);
    let app = http_api::router(state);
    let new_work = Assignment::new(2, 2, 1, at(2024, 1, 5, 12)).with_effort(2.0);

    let response = app
        .oneshot(json_request(
            "PUT",
            "/assignments/2",
            serde_json::to_value(&new_work).unwrap(),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["summary"]["strategy"], "person_sequential");
    // Ana's booked day runs Friday, so the new work follows on Monday.
    assert_eq!(body["assignment"]["planned_start"], "2024-01-08T09:00:00");
    assert_eq!(body["assignment"]["planned_end"], "2024-01-10T09:00:00");
}

#[tokio::test]
async fn dependencies_and_person_order() {
    let mut schedule = booked_schedule();
    schedule.tasks.push(Task::new(3, "Review", at(2024, 1, 1, 11)));
    schedule.tasks.push(Task::new(4, "Ship", at(2024, 1, 1, 12)));
    schedule
        .assignments
        .push(Assignment::new(2, 2, 2, at(2024, 1, 2, 9)));
    schedule
        .assignments
        .push(Assignment::new(3, 3, 2, at(2024, 1, 2, 9)));
    schedule
        .assignments
        .push(Assignment::new(4, 4, 1, at(2024, 1, 2, 9)));
    let app = router_for(schedule);

    let edge = |pred: i32, succ: i32| {
        serde_json::to_value(TaskDependency::new(pred, succ, at(2024, 1, 1, 9))).unwrap()
    };
    let response = app
        .clone()
        .oneshot(json_request("POST", "/dependencies", edge(1, 2)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let response = app
        .clone()
        .oneshot(json_request("POST", "/dependencies", edge(1, 2)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(empty_request("GET", "/people/order"))
        .await
        .unwrap();
    assert_eq!(read_json(response).await, json!([1, 2]));

    // Ben's task 3 feeding Ana's task 4 closes a loop between the two people.
    app.clone()
        .oneshot(json_request("POST", "/dependencies", edge(3, 4)))
        .await
        .unwrap();
    let response = app
        .oneshot(empty_request("GET", "/people/order"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = read_json(response).await;
    assert_eq!(body["error"], "conflict");
}
