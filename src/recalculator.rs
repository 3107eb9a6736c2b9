use crate::assignment::{Assignment, AssignmentId};
use crate::calculations::PlannedDates;
use crate::calculations::dependency_aware::DependencyAwarePass;
use crate::calculations::person_sequential::PersonSequentialPass;
use crate::calendar::{CalendarError, WorkCalendar, WorkCalendarConfig};
use crate::clock::{Clock, SystemClock};
use crate::graph::{CycleError, DependencyGraph, GraphUniverse, person_graph, task_graph};
use crate::person::PersonId;
use crate::persistence::{AssignmentFilter, PersistenceError, ScheduleStore};
use crate::schedule::Schedule;
use crate::task::{Task, TaskDependency, TaskId};
use chrono::NaiveDateTime;
use parking_lot::Mutex;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info};

/// Which policy a pass uses to place assignments on the calendar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecalcStrategy {
    /// Lay a person's work end to end from today, ignoring task dependencies.
    PersonSequential,
    /// Start each assignment after the person's settled work and its
    /// predecessor tasks.
    #[default]
    DependencyAware,
}

impl RecalcStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecalcStrategy::PersonSequential => "person_sequential",
            RecalcStrategy::DependencyAware => "dependency_aware",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "person_sequential" | "sequential" => Some(RecalcStrategy::PersonSequential),
            "dependency_aware" | "dependency" => Some(RecalcStrategy::DependencyAware),
            _ => None,
        }
    }
}

impl fmt::Display for RecalcStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum RecalcError {
    #[error(transparent)]
    Cycle(#[from] CycleError),
    #[error(transparent)]
    Calendar(#[from] CalendarError),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
    #[error("unknown person {0}")]
    UnknownPerson(PersonId),
    #[error("unknown assignment {0}")]
    UnknownAssignment(AssignmentId),
}

/// Outcome of one recalculation pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecalcSummary {
    pub strategy: RecalcStrategy,
    pub people: Vec<PersonId>,
    pub scheduled: Vec<PlannedDates>,
    pub skipped_unestimated: Vec<AssignmentId>,
    pub latest_end: Option<NaiveDateTime>,
    /// Sets abandoned because their dependencies form a cycle. Nothing in
    /// these sets was written.
    pub cycles: Vec<CycleError>,
}

impl RecalcSummary {
    fn new(strategy: RecalcStrategy, people: Vec<PersonId>) -> Self {
        Self {
            strategy,
            people,
            scheduled: Vec::new(),
            skipped_unestimated: Vec::new(),
            latest_end: None,
            cycles: Vec::new(),
        }
    }

    fn finish(mut self, scheduled: Vec<PlannedDates>) -> Self {
        self.latest_end = scheduled.iter().map(|plan| plan.planned_end).max();
        self.scheduled = scheduled;
        self
    }

    pub fn is_complete(&self) -> bool {
        self.cycles.is_empty()
    }

    pub fn planned(&self, assignment: AssignmentId) -> Option<&PlannedDates> {
        self.scheduled
            .iter()
            .find(|plan| plan.assignment_id == assignment)
    }

    pub fn to_cli_summary(&self) -> String {
        let mut parts = Vec::new();
        parts.push(format!("strategy={}", self.strategy));
        parts.push(format!("people={}", self.people.len()));
        parts.push(format!("scheduled={}", self.scheduled.len()));
        if !self.skipped_unestimated.is_empty() {
            parts.push(format!("unestimated={}", self.skipped_unestimated.len()));
        }
        if let Some(end) = self.latest_end {
            parts.push(format!("finish={}", end.format("%Y-%m-%d %H:%M")));
        }
        for cycle in &self.cycles {
            let chain = cycle
                .remaining
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(",");
            parts.push(format!("cycle({})=[{}]", cycle.universe, chain));
        }
        parts.join(", ")
    }
}

/// Everything a dependency-aware batch reads before it plans.
struct Snapshot {
    calendar: WorkCalendar,
    tasks: HashMap<TaskId, Task>,
    assignments: Vec<Assignment>,
    edges: Vec<TaskDependency>,
}

impl Snapshot {
    fn task_level(&self, task: TaskId) -> Option<i32> {
        self.tasks.get(&task).map(|task| task.level)
    }

    fn ordering_key(&self, task: TaskId) -> Option<(i32, i32, NaiveDateTime, TaskId)> {
        self.tasks.get(&task).map(Task::ordering_key)
    }
}

/// Plans one weakly connected set of people. Holds only borrowed snapshot
/// data so sets can be planned on separate threads.
struct ComponentPlanner<'a> {
    snapshot: &'a Snapshot,
    eligible_by_person: &'a HashMap<PersonId, Vec<&'a Assignment>>,
    people: &'a DependencyGraph,
    now: NaiveDateTime,
}

impl<'a> ComponentPlanner<'a> {
    fn plan(&self, component: &[PersonId]) -> Result<Vec<PlannedDates>, RecalcError> {
        let person_order = self.people.subgraph(component).topological_order()?;
        let pass = DependencyAwarePass::new(&self.snapshot.calendar, self.now);
        let mut overlay: HashMap<AssignmentId, PlannedDates> = HashMap::new();
        let mut plans = Vec::new();

        for person in person_order {
            let Some(mine) = self.eligible_by_person.get(&person) else {
                continue;
            };
            let mut seen = HashSet::new();
            let tasks: Vec<&Task> = mine
                .iter()
                .filter(|assignment| seen.insert(assignment.task_id))
                .filter_map(|assignment| self.snapshot.tasks.get(&assignment.task_id))
                .collect();
            let task_order = task_graph(&tasks, &self.snapshot.edges).topological_order()?;

            for task_id in task_order {
                for assignment in mine.iter().filter(|a| a.task_id == task_id) {
                    let history = self.history(person, &overlay);
                    let history_refs: Vec<&Assignment> = history.iter().collect();
                    let predecessor_ends = self.predecessor_ends(task_id, &overlay);
                    let Some(plan) = pass.plan(assignment, &history_refs, &predecessor_ends)?
                    else {
                        continue;
                    };
                    debug!(
                        person,
                        assignment = plan.assignment_id,
                        task = task_id,
                        start = %plan.planned_start,
                        end = %plan.planned_end,
                        "assignment planned"
                    );
                    overlay.insert(plan.assignment_id, plan);
                    plans.push(plan);
                }
            }
        }
        Ok(plans)
    }

    /// The person's assignments as they stand mid-pass: already planned ones
    /// carry their new dates and count as settled.
    fn history(
        &self,
        person: PersonId,
        overlay: &HashMap<AssignmentId, PlannedDates>,
    ) -> Vec<Assignment> {
        self.snapshot
            .assignments
            .iter()
            .filter(|assignment| assignment.person_id == person)
            .map(|assignment| {
                let mut current = assignment.clone();
                if let Some(plan) = overlay.get(&assignment.id) {
                    current.apply_plan(plan.planned_start, plan.planned_end);
                }
                current
            })
            .collect()
    }

    fn predecessor_ends(
        &self,
        task: TaskId,
        overlay: &HashMap<AssignmentId, PlannedDates>,
    ) -> Vec<NaiveDateTime> {
        self.snapshot
            .edges
            .iter()
            .filter(|edge| edge.successor == task)
            .flat_map(|edge| {
                self.snapshot
                    .assignments
                    .iter()
                    .filter(move |assignment| assignment.task_id == edge.predecessor)
            })
            .filter_map(|assignment| {
                assignment.actual_end.or_else(|| {
                    overlay
                        .get(&assignment.id)
                        .map(|plan| plan.planned_end)
                        .or(assignment.planned_end)
                })
            })
            .collect()
    }
}

/// Drives recalculation passes against a [`ScheduleStore`].
///
/// Every pass reads one consistent snapshot, plans in memory and commits all
/// planned dates with a single `write_planned_dates` call. Passes on the same
/// recalculator never interleave.
pub struct ScheduleRecalculator<S> {
    store: S,
    config: WorkCalendarConfig,
    clock: Arc<dyn Clock>,
    pass_lock: Mutex<()>,
}

impl<S: ScheduleStore> ScheduleRecalculator<S> {
    pub fn new(store: S, config: WorkCalendarConfig) -> Self {
        Self {
            store,
            config,
            clock: Arc::new(SystemClock),
            pass_lock: Mutex::new(()),
        }
    }

    pub fn with_clock<C: Clock + 'static>(mut self, clock: C) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn set_clock<C: Clock + 'static>(&mut self, clock: C) {
        self.clock = Arc::new(clock);
    }

    pub fn set_config(&mut self, config: WorkCalendarConfig) {
        self.config = config;
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &WorkCalendarConfig {
        &self.config
    }

    pub fn now(&self) -> NaiveDateTime {
        self.clock.now()
    }

    /// Entry point for write paths that changed one person's data.
    pub fn recalculate_for_person(
        &self,
        person: PersonId,
        strategy: RecalcStrategy,
    ) -> Result<RecalcSummary, RecalcError> {
        match strategy {
            RecalcStrategy::PersonSequential => self.recalculate_person_sequential(person),
            RecalcStrategy::DependencyAware => self.reschedule_team_member(person),
        }
    }

    /// Reschedules everyone who owns a dirty assignment, prerequisite owners
    /// first.
    pub fn recalculate_all_dirty_in_dependency_order(&self) -> Result<RecalcSummary, RecalcError> {
        let _pass = self.pass_lock.lock();
        let dirty = self.store.assignments(
            &AssignmentFilter::all()
                .fixed(false)
                .needs_recalculation(true),
        )?;
        let people: Vec<PersonId> = dirty
            .iter()
            .map(|assignment| assignment.person_id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        if people.is_empty() {
            info!("no dirty assignments to recalculate");
            return Ok(RecalcSummary::new(RecalcStrategy::DependencyAware, people));
        }
        self.dependency_aware_batch(&people)
    }

    /// Lays the person's non-fixed assignments end to end from today in
    /// (level, priority, creation) order.
    pub fn recalculate_person_sequential(
        &self,
        person: PersonId,
    ) -> Result<RecalcSummary, RecalcError> {
        let _pass = self.pass_lock.lock();
        let snapshot = self.load_snapshot(&[person])?;

        let mut ordered: Vec<&Assignment> = snapshot
            .assignments
            .iter()
            .filter(|a| a.person_id == person && !a.is_fixed())
            .collect();
        ordered.sort_by_key(|a| (snapshot.ordering_key(a.task_id), a.id));

        let mut summary = RecalcSummary::new(RecalcStrategy::PersonSequential, vec![person]);
        summary.skipped_unestimated = ordered
            .iter()
            .filter(|assignment| !assignment.is_estimated())
            .map(|assignment| assignment.id)
            .collect();

        let today = self.clock.now().date();
        info!(person, assignments = ordered.len(), %today, "person-sequential pass started");

        let plans =
            PersonSequentialPass::new(&snapshot.calendar, person).execute(&ordered, today)?;
        for plan in &plans {
            debug!(
                person,
                assignment = plan.assignment_id,
                start = %plan.planned_start,
                end = %plan.planned_end,
                "assignment planned"
            );
        }
        self.store.write_planned_dates(&plans)?;

        let summary = summary.finish(plans);
        info!(person, scheduled = summary.scheduled.len(), "person-sequential pass finished");
        Ok(summary)
    }

    /// Dependency-aware recalculation of one assignment. Returns `None` for
    /// fixed or unestimated assignments, which are left untouched.
    pub fn recalculate_assignment(
        &self,
        id: AssignmentId,
    ) -> Result<Option<PlannedDates>, RecalcError> {
        let _pass = self.pass_lock.lock();
        let person = self
            .store
            .assignment(id)?
            .ok_or(RecalcError::UnknownAssignment(id))?
            .person_id;
        let snapshot = self.load_snapshot(&[person])?;
        // Re-read from the snapshot so every input comes from the same view.
        let assignment = snapshot
            .assignments
            .iter()
            .find(|assignment| assignment.id == id)
            .ok_or(RecalcError::UnknownAssignment(id))?;
        if assignment.is_fixed() {
            debug!(assignment = id, "fixed assignment left as recorded");
            return Ok(None);
        }
        if !assignment.is_estimated() {
            debug!(assignment = id, "assignment has no estimate yet");
            return Ok(None);
        }

        let history_refs: Vec<&Assignment> = snapshot
            .assignments
            .iter()
            .filter(|other| other.person_id == assignment.person_id)
            .collect();
        let predecessors: HashSet<TaskId> = snapshot
            .edges
            .iter()
            .filter(|edge| edge.successor == assignment.task_id)
            .map(|edge| edge.predecessor)
            .collect();
        let predecessor_ends: Vec<NaiveDateTime> = snapshot
            .assignments
            .iter()
            .filter(|other| predecessors.contains(&other.task_id))
            .filter_map(Assignment::effective_end)
            .collect();

        let pass = DependencyAwarePass::new(&snapshot.calendar, self.clock.now());
        let Some(plan) = pass.plan(assignment, &history_refs, &predecessor_ends)? else {
            return Ok(None);
        };
        self.store.write_planned_dates(&[plan])?;
        info!(
            assignment = id,
            start = %plan.planned_start,
            end = %plan.planned_end,
            "assignment recalculated"
        );
        Ok(Some(plan))
    }

    /// Marks the person's top-level, non-fixed assignments dirty and replans
    /// them dependency-aware. A cycle in the person's tasks fails the pass
    /// without writing anything.
    pub fn reschedule_team_member(&self, person: PersonId) -> Result<RecalcSummary, RecalcError> {
        let _pass = self.pass_lock.lock();
        let summary = self.dependency_aware_batch(&[person])?;
        if let Some(cycle) = summary.cycles.first() {
            return Err(RecalcError::Cycle(cycle.clone()));
        }
        Ok(summary)
    }

    /// Reschedules several people so that owners of prerequisite tasks go
    /// before owners of dependent tasks. Sets of people caught in a cycle are
    /// reported in the summary and left unchanged; the rest still complete.
    pub fn reschedule_in_dependency_order(
        &self,
        people: &[PersonId],
    ) -> Result<RecalcSummary, RecalcError> {
        let _pass = self.pass_lock.lock();
        self.dependency_aware_batch(people)
    }

    /// Order of all people derived from task dependencies.
    pub fn person_dependency_order(&self) -> Result<Vec<PersonId>, RecalcError> {
        let schedule = self.store.read_snapshot(&[])?;
        let mut people: Vec<PersonId> = schedule.people.iter().map(|p| p.id).collect();
        people.sort_unstable();

        let refs: Vec<&Assignment> = schedule.assignments.iter().collect();
        let derived = person_graph(&refs, &schedule.dependencies);
        let graph = DependencyGraph::from_edges(GraphUniverse::People, people, derived.edges());
        Ok(graph.topological_order()?)
    }

    fn calendar_for(&self, schedule: &Schedule) -> WorkCalendar {
        let mut calendar = WorkCalendar::from_config(self.config.clone());
        calendar.add_holidays(schedule.holidays.iter().map(|h| h.date));
        calendar.extend_exceptions(schedule.calendar_exceptions.iter().cloned());
        calendar
    }

    /// One consistent read of everything a pass plans from. Fails on people
    /// the store does not know.
    fn load_snapshot(&self, people: &[PersonId]) -> Result<Snapshot, RecalcError> {
        let schedule = self.store.read_snapshot(people)?;
        let known: HashSet<PersonId> = schedule.people.iter().map(|p| p.id).collect();
        if let Some(missing) = people.iter().find(|person| !known.contains(person)) {
            return Err(RecalcError::UnknownPerson(*missing));
        }
        let calendar = self.calendar_for(&schedule);
        let mut assignments = schedule.assignments;
        assignments.sort_by_key(|assignment| assignment.id);
        Ok(Snapshot {
            calendar,
            tasks: schedule
                .tasks
                .into_iter()
                .map(|task| (task.id, task))
                .collect(),
            assignments,
            edges: schedule.dependencies,
        })
    }

    /// Caller holds the pass lock.
    fn dependency_aware_batch(&self, people: &[PersonId]) -> Result<RecalcSummary, RecalcError> {
        let mut requested: Vec<PersonId> = Vec::with_capacity(people.len());
        for person in people {
            if !requested.contains(person) {
                requested.push(*person);
            }
        }
        let rank: HashMap<PersonId, usize> = requested
            .iter()
            .enumerate()
            .map(|(idx, person)| (*person, idx))
            .collect();

        let mut snapshot = self.load_snapshot(&requested)?;
        let mut summary = RecalcSummary::new(RecalcStrategy::DependencyAware, requested.clone());

        // Top-level work is always replanned; deeper levels only when already dirty.
        let mut eligible_ids = HashSet::new();
        let levels: HashMap<TaskId, Option<i32>> = snapshot
            .assignments
            .iter()
            .map(|assignment| (assignment.task_id, snapshot.task_level(assignment.task_id)))
            .collect();
        for assignment in snapshot.assignments.iter_mut() {
            if !rank.contains_key(&assignment.person_id) || assignment.is_fixed() {
                continue;
            }
            let top_level = levels.get(&assignment.task_id).copied().flatten() == Some(1);
            if !top_level && !assignment.needs_recalculation {
                continue;
            }
            if !assignment.is_eligible() {
                summary.skipped_unestimated.push(assignment.id);
                continue;
            }
            assignment.mark_dirty();
            eligible_ids.insert(assignment.id);
        }

        let mut eligible: Vec<&Assignment> = snapshot
            .assignments
            .iter()
            .filter(|assignment| eligible_ids.contains(&assignment.id))
            .collect();
        eligible.sort_by_key(|a| (rank[&a.person_id], snapshot.ordering_key(a.task_id), a.id));

        info!(
            people = requested.len(),
            assignments = eligible.len(),
            "dependency-aware pass started"
        );

        let people_graph = person_graph(&eligible, &snapshot.edges);
        let mut eligible_by_person: HashMap<PersonId, Vec<&Assignment>> = HashMap::new();
        for assignment in eligible.iter().copied() {
            eligible_by_person
                .entry(assignment.person_id)
                .or_default()
                .push(assignment);
        }

        let planner = ComponentPlanner {
            snapshot: &snapshot,
            eligible_by_person: &eligible_by_person,
            people: &people_graph,
            now: self.clock.now(),
        };
        let outcomes: Vec<Result<Vec<PlannedDates>, RecalcError>> = people_graph
            .weakly_connected_components()
            .par_iter()
            .map(|component| planner.plan(component))
            .collect();

        let mut plans = Vec::new();
        for outcome in outcomes {
            match outcome {
                Ok(mut component_plans) => plans.append(&mut component_plans),
                Err(RecalcError::Cycle(cycle)) => {
                    error!(
                        universe = %cycle.universe,
                        nodes = ?cycle.remaining,
                        "dependency cycle, set left unchanged"
                    );
                    summary.cycles.push(cycle);
                }
                Err(other) => return Err(other),
            }
        }

        self.store.write_planned_dates(&plans)?;
        let summary = summary.finish(plans);
        info!(
            scheduled = summary.scheduled.len(),
            cycles = summary.cycles.len(),
            "dependency-aware pass finished"
        );
        Ok(summary)
    }
}
