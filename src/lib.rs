pub mod assignment;
pub mod calculations;
pub mod calendar;
pub mod clock;
pub mod graph;
#[cfg(feature = "http_api")]
pub mod http_api;
pub mod person;
pub mod persistence;
pub mod recalculator;
pub mod schedule;
pub mod task;
pub mod validation;

pub use assignment::{Assignment, AssignmentId, AssignmentState};
pub use calculations::PlannedDates;
pub use calendar::{
    CalendarError, CalendarException, ExceptionStatus, Holiday, WorkCalendar, WorkCalendarConfig,
};
pub use clock::{Clock, FixedClock, SystemClock};
pub use graph::{CycleError, DependencyGraph, GraphUniverse};
pub use person::{Department, Person, PersonId, Position};
pub use persistence::{
    AssignmentFilter, InMemoryScheduleStore, PersistenceError, ScheduleStore,
    load_schedule_from_json, save_schedule_to_json,
};
pub use recalculator::{RecalcError, RecalcStrategy, RecalcSummary, ScheduleRecalculator};
pub use schedule::{Schedule, ScheduleError};
pub use task::{Task, TaskDependency, TaskId, total_effort_estimation};
pub use validation::ValidationError;
