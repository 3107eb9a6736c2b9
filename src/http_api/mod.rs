use std::{net::SocketAddr, sync::Arc};

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use crate::{
    Assignment, AssignmentFilter, CalendarException, InMemoryScheduleStore, Person,
    PersistenceError, PersonId, RecalcError, RecalcStrategy, RecalcSummary, Schedule,
    ScheduleError, ScheduleRecalculator, ScheduleStore, Task, TaskDependency, WorkCalendarConfig,
};

type SharedRecalculator = ScheduleRecalculator<Arc<InMemoryScheduleStore>>;

/// Writes go to the store, then explicitly trigger a recalculation with the
/// configured strategy.
#[derive(Clone)]
pub struct AppState {
    store: Arc<InMemoryScheduleStore>,
    recalculator: Arc<SharedRecalculator>,
    strategy: RecalcStrategy,
}

impl AppState {
    pub fn new(schedule: Schedule, config: WorkCalendarConfig) -> Result<Self, PersistenceError> {
        let store = Arc::new(InMemoryScheduleStore::from_schedule(schedule)?);
        let recalculator = ScheduleRecalculator::new(store.clone(), config);
        Ok(Self::with_recalculator(store, recalculator))
    }

    pub fn with_recalculator(
        store: Arc<InMemoryScheduleStore>,
        recalculator: SharedRecalculator,
    ) -> Self {
        Self {
            store,
            recalculator: Arc::new(recalculator),
            strategy: RecalcStrategy::default(),
        }
    }

    /// Strategy used when a write triggers recalculation.
    pub fn with_strategy(mut self, strategy: RecalcStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    fn store(&self) -> &InMemoryScheduleStore {
        &self.store
    }

    /// Passes walk the calendar day by day and wait on the pass lock, so
    /// they run on the blocking pool instead of an async worker.
    async fn recalculate<T, F>(&self, job: F) -> Result<T, ApiError>
    where
        T: Send + 'static,
        F: FnOnce(&SharedRecalculator) -> Result<T, RecalcError> + Send + 'static,
    {
        let recalculator = Arc::clone(&self.recalculator);
        tokio::task::spawn_blocking(move || job(&recalculator))
            .await
            .map_err(|err| ApiError::Internal(format!("recalculation task failed: {err}")))?
            .map_err(ApiError::from)
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    message: String,
}

#[derive(Debug)]
enum ApiError {
    NotFound(String),
    Conflict(String),
    Invalid(String),
    Internal(String),
}

impl ApiError {
    fn not_found(message: impl Into<String>) -> Self {
        ApiError::NotFound(message.into())
    }

    fn invalid(message: impl Into<String>) -> Self {
        ApiError::Invalid(message.into())
    }
}

impl From<ScheduleError> for ApiError {
    fn from(value: ScheduleError) -> Self {
        match value {
            ScheduleError::UnknownAssignment(_) => ApiError::NotFound(value.to_string()),
            other => ApiError::Invalid(other.to_string()),
        }
    }
}

impl From<PersistenceError> for ApiError {
    fn from(value: PersistenceError) -> Self {
        match value {
            PersistenceError::NotFound(message) => ApiError::NotFound(message),
            PersistenceError::InvalidData(message) => ApiError::Invalid(message),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<RecalcError> for ApiError {
    fn from(value: RecalcError) -> Self {
        match value {
            RecalcError::Cycle(cycle) => ApiError::Conflict(cycle.to_string()),
            RecalcError::UnknownPerson(_) | RecalcError::UnknownAssignment(_) => {
                ApiError::NotFound(value.to_string())
            }
            RecalcError::Calendar(err) => ApiError::Invalid(err.to_string()),
            RecalcError::Persistence(err) => ApiError::from(err),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error, message) = match self {
            ApiError::NotFound(message) => (StatusCode::NOT_FOUND, "not_found", message),
            ApiError::Conflict(message) => (StatusCode::CONFLICT, "conflict", message),
            ApiError::Invalid(message) => (StatusCode::BAD_REQUEST, "invalid_request", message),
            ApiError::Internal(message) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", message)
            }
        };
        (status, Json(ErrorBody { error, message })).into_response()
    }
}

#[derive(Debug, Deserialize)]
struct AssignmentQuery {
    person: Option<PersonId>,
}

#[derive(Debug, Deserialize)]
struct StrategyQuery {
    strategy: Option<String>,
}

#[derive(Debug, Serialize)]
struct RecalculatedAssignment {
    assignment: Assignment,
    summary: RecalcSummary,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/people", get(list_people))
        .route("/people/order", get(person_order))
        .route("/people/:id", put(upsert_person))
        .route("/people/:id/recalculate", post(recalculate_person))
        .route("/tasks/:id", put(upsert_task))
        .route("/dependencies", post(add_dependency))
        .route("/assignments", get(list_assignments))
        .route("/assignments/:id", get(get_assignment).put(upsert_assignment))
        .route("/calendar/exceptions", put(set_calendar_exception))
        .route("/recalculate", post(recalculate_all_dirty))
        .with_state(state)
}

pub async fn serve(
    addr: SocketAddr,
    schedule: Schedule,
    config: WorkCalendarConfig,
) -> std::io::Result<()> {
    let state = AppState::new(schedule, config).map_err(std::io::Error::other)?;
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "http api listening");
    axum::serve(listener, app).await
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn list_people(State(state): State<AppState>) -> Result<Json<Vec<Person>>, ApiError> {
    Ok(Json(state.store().people()?))
}

async fn upsert_person(
    State(state): State<AppState>,
    Path(person_id): Path<PersonId>,
    Json(person): Json<Person>,
) -> Result<Json<Person>, ApiError> {
    if person.id != person_id {
        return Err(ApiError::invalid(
            "person id in payload does not match path parameter",
        ));
    }
    state.store().upsert_person(person.clone());
    Ok(Json(person))
}

async fn upsert_task(
    State(state): State<AppState>,
    Path(task_id): Path<i32>,
    Json(task): Json<Task>,
) -> Result<Json<Task>, ApiError> {
    if task.id != task_id {
        return Err(ApiError::invalid(
            "task id in payload does not match path parameter",
        ));
    }
    state.store().upsert_task(task.clone())?;
    Ok(Json(task))
}

async fn add_dependency(
    State(state): State<AppState>,
    Json(dependency): Json<TaskDependency>,
) -> Result<(StatusCode, Json<TaskDependency>), ApiError> {
    let created = state.store().add_dependency(dependency.clone())?;
    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(dependency)))
}

async fn list_assignments(
    State(state): State<AppState>,
    Query(query): Query<AssignmentQuery>,
) -> Result<Json<Vec<Assignment>>, ApiError> {
    let filter = match query.person {
        Some(person) => AssignmentFilter::for_person(person),
        None => AssignmentFilter::all(),
    };
    Ok(Json(state.store().assignments(&filter)?))
}

async fn get_assignment(
    State(state): State<AppState>,
    Path(assignment_id): Path<i32>,
) -> Result<Json<Assignment>, ApiError> {
    match state.store().assignment(assignment_id)? {
        Some(assignment) => Ok(Json(assignment)),
        None => Err(ApiError::not_found(format!(
            "assignment {assignment_id} not found"
        ))),
    }
}

async fn upsert_assignment(
    State(state): State<AppState>,
    Path(assignment_id): Path<i32>,
    Json(assignment): Json<Assignment>,
) -> Result<Json<RecalculatedAssignment>, ApiError> {
    if assignment.id != assignment_id {
        return Err(ApiError::invalid(
            "assignment id in payload does not match path parameter",
        ));
    }
    let person = assignment.person_id;
    state.store().upsert_assignment(assignment)?;
    state.store().mark_dirty(assignment_id)?;

    let strategy = state.strategy;
    let summary = state
        .recalculate(move |recalc| recalc.recalculate_for_person(person, strategy))
        .await?;
    let assignment = state
        .store()
        .assignment(assignment_id)?
        .ok_or_else(|| ApiError::not_found(format!("assignment {assignment_id} not found")))?;
    Ok(Json(RecalculatedAssignment {
        assignment,
        summary,
    }))
}

async fn set_calendar_exception(
    State(state): State<AppState>,
    Json(exception): Json<CalendarException>,
) -> Result<Json<RecalcSummary>, ApiError> {
    let person = exception.person_id;
    let replaced = state.store().set_calendar_exception(exception)?;
    if replaced.is_some() {
        info!(person, "calendar exception replaced");
    }
    state.store().mark_person_dirty(person);
    let strategy = state.strategy;
    let summary = state
        .recalculate(move |recalc| recalc.recalculate_for_person(person, strategy))
        .await?;
    Ok(Json(summary))
}

async fn recalculate_person(
    State(state): State<AppState>,
    Path(person_id): Path<PersonId>,
    Query(query): Query<StrategyQuery>,
) -> Result<Json<RecalcSummary>, ApiError> {
    let strategy = match query.strategy.as_deref() {
        Some(value) => RecalcStrategy::from_str(value.trim())
            .ok_or_else(|| ApiError::invalid(format!("unknown strategy '{value}'")))?,
        None => state.strategy,
    };
    let summary = state
        .recalculate(move |recalc| recalc.recalculate_for_person(person_id, strategy))
        .await?;
    Ok(Json(summary))
}

async fn recalculate_all_dirty(
    State(state): State<AppState>,
) -> Result<Json<RecalcSummary>, ApiError> {
    let summary = state
        .recalculate(|recalc| recalc.recalculate_all_dirty_in_dependency_order())
        .await?;
    if !summary.is_complete() {
        warn!(cycles = summary.cycles.len(), "batch finished with skipped sets");
    }
    Ok(Json(summary))
}

async fn person_order(State(state): State<AppState>) -> Result<Json<Vec<PersonId>>, ApiError> {
    let order = state
        .recalculate(|recalc| recalc.person_dependency_order())
        .await?;
    Ok(Json(order))
}
