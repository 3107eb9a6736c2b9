//! Pure planning passes. Nothing here reads or writes a store; callers hand in
//! a snapshot and commit the returned [`PlannedDates`] themselves.

pub mod dependency_aware;
pub mod person_sequential;

use crate::assignment::AssignmentId;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedDates {
    pub assignment_id: AssignmentId,
    pub planned_start: NaiveDateTime,
    pub planned_end: NaiveDateTime,
}

impl PlannedDates {
    pub fn new(
        assignment_id: AssignmentId,
        planned_start: NaiveDateTime,
        planned_end: NaiveDateTime,
    ) -> Self {
        Self {
            assignment_id,
            planned_start,
            planned_end,
        }
    }
}
