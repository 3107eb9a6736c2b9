use crate::person::PersonId;
use crate::task::TaskId;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

pub type AssignmentId = i32;

/// Where an assignment sits in the recalculation lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentState {
    /// Actual start or end recorded; never touched by the recalculator.
    Fixed,
    /// Waiting for new planned dates.
    Dirty,
    Clean,
}

/// Binds one person to one task with an effort estimate in person-days.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub id: AssignmentId,
    pub task_id: TaskId,
    pub person_id: PersonId,
    pub assigned_at: NaiveDateTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default)]
    pub effort_estimation: Option<f64>,
    #[serde(default)]
    pub planned_start: Option<NaiveDateTime>,
    #[serde(default)]
    pub planned_end: Option<NaiveDateTime>,
    #[serde(default)]
    pub actual_start: Option<NaiveDateTime>,
    #[serde(default)]
    pub actual_end: Option<NaiveDateTime>,
    #[serde(default)]
    pub needs_recalculation: bool,
}

impl Assignment {
    pub fn new(
        id: AssignmentId,
        task_id: TaskId,
        person_id: PersonId,
        assigned_at: NaiveDateTime,
    ) -> Self {
        Self {
            id,
            task_id,
            person_id,
            assigned_at,
            notes: None,
            effort_estimation: None,
            planned_start: None,
            planned_end: None,
            actual_start: None,
            actual_end: None,
            needs_recalculation: false,
        }
    }

    pub fn with_effort(mut self, person_days: f64) -> Self {
        self.effort_estimation = Some(person_days);
        self
    }

    pub fn is_fixed(&self) -> bool {
        self.actual_start.is_some() || self.actual_end.is_some()
    }

    pub fn is_estimated(&self) -> bool {
        self.effort_estimation.is_some()
    }

    pub fn is_eligible(&self) -> bool {
        !self.is_fixed() && self.is_estimated()
    }

    pub fn state(&self) -> AssignmentState {
        if self.is_fixed() {
            AssignmentState::Fixed
        } else if self.needs_recalculation {
            AssignmentState::Dirty
        } else {
            AssignmentState::Clean
        }
    }

    /// Flags the assignment for recalculation. Returns `false` for fixed
    /// assignments, which stay clean.
    pub fn mark_dirty(&mut self) -> bool {
        if self.is_fixed() {
            return false;
        }
        self.needs_recalculation = true;
        true
    }

    pub fn apply_plan(&mut self, planned_start: NaiveDateTime, planned_end: NaiveDateTime) {
        self.planned_start = Some(planned_start);
        self.planned_end = Some(planned_end);
        self.needs_recalculation = false;
    }

    /// The end this assignment imposes on its successors: actual when known,
    /// planned otherwise.
    pub fn effective_end(&self) -> Option<NaiveDateTime> {
        self.actual_end.or(self.planned_end)
    }
}
