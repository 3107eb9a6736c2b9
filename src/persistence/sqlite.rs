use super::{AssignmentFilter, PersistenceError, PersistenceResult, ScheduleStore};
use crate::assignment::{Assignment, AssignmentId};
use crate::calculations::PlannedDates;
use crate::calendar::{CalendarException, ExceptionStatus, Holiday};
use crate::person::{Department, Person, PersonId, Position};
use crate::schedule::Schedule;
use crate::task::{Task, TaskDependency, TaskId};
use crate::validation;
use parking_lot::Mutex;
use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension, Row, Transaction, params, params_from_iter};
use tracing::{debug, warn};

const ASSIGNMENT_COLUMNS: &str = "a.id, a.task_id, a.person_id, a.assigned_at, a.notes, \
     a.effort_estimation, a.planned_start, a.planned_end, a.actual_start, a.actual_end, \
     a.needs_recalculation";

pub struct SqliteScheduleStore {
    connection: Mutex<Connection>,
}

impl SqliteScheduleStore {
    pub fn new<P: AsRef<std::path::Path>>(path: P) -> PersistenceResult<Self> {
        let connection = Connection::open(path)?;
        Self::from_connection(connection)
    }

    pub fn in_memory() -> PersistenceResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(connection: Connection) -> PersistenceResult<Self> {
        Self::initialize_schema(&connection)?;
        Ok(Self {
            connection: Mutex::new(connection),
        })
    }

    fn initialize_schema(connection: &Connection) -> PersistenceResult<()> {
        let ddl = r#"
            PRAGMA foreign_keys = ON;
            CREATE TABLE IF NOT EXISTS people (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                position TEXT NOT NULL,
                department TEXT
            );
            CREATE TABLE IF NOT EXISTS tasks (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                priority INTEGER NOT NULL DEFAULT 0,
                level INTEGER NOT NULL DEFAULT 1,
                parent_id INTEGER REFERENCES tasks(id) ON DELETE CASCADE,
                created_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS task_dependencies (
                predecessor INTEGER NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
                successor INTEGER NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
                established_on TEXT NOT NULL,
                UNIQUE (predecessor, successor)
            );
            CREATE TABLE IF NOT EXISTS assignments (
                id INTEGER PRIMARY KEY,
                task_id INTEGER NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
                person_id INTEGER NOT NULL REFERENCES people(id) ON DELETE CASCADE,
                assigned_at TEXT NOT NULL,
                notes TEXT,
                effort_estimation REAL,
                planned_start TEXT,
                planned_end TEXT,
                actual_start TEXT,
                actual_end TEXT,
                needs_recalculation INTEGER NOT NULL DEFAULT 0
            );
            CREATE TABLE IF NOT EXISTS holidays (
                date TEXT PRIMARY KEY,
                name TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS calendar_exceptions (
                person_id INTEGER NOT NULL REFERENCES people(id) ON DELETE CASCADE,
                date TEXT NOT NULL,
                status TEXT NOT NULL,
                hours_worked REAL,
                UNIQUE (person_id, date)
            );
        "#;
        connection.execute_batch(ddl)?;
        Ok(())
    }

    /// Replaces every stored row with the contents of `schedule`.
    pub fn replace_all(&self, schedule: &Schedule) -> PersistenceResult<()> {
        schedule.validate()?;
        let mut conn = self.connection.lock();
        let tx = conn.transaction()?;
        tx.execute_batch(
            "DELETE FROM calendar_exceptions; DELETE FROM holidays; DELETE FROM assignments; \
             DELETE FROM task_dependencies; DELETE FROM tasks; DELETE FROM people;",
        )?;
        Self::insert_people(&tx, &schedule.people)?;
        Self::insert_tasks(&tx, &schedule.tasks)?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO task_dependencies (predecessor, successor, established_on) \
                 VALUES (?1, ?2, ?3)",
            )?;
            for dep in &schedule.dependencies {
                stmt.execute(params![dep.predecessor, dep.successor, dep.established_on])?;
            }
        }
        {
            let mut stmt = tx.prepare(
                "INSERT INTO assignments (id, task_id, person_id, assigned_at, notes, \
                 effort_estimation, planned_start, planned_end, actual_start, actual_end, \
                 needs_recalculation) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            )?;
            for a in &schedule.assignments {
                stmt.execute(params![
                    a.id,
                    a.task_id,
                    a.person_id,
                    a.assigned_at,
                    a.notes,
                    a.effort_estimation,
                    a.planned_start,
                    a.planned_end,
                    a.actual_start,
                    a.actual_end,
                    a.needs_recalculation
                ])?;
            }
        }
        {
            let mut stmt = tx.prepare("INSERT INTO holidays (date, name) VALUES (?1, ?2)")?;
            for holiday in &schedule.holidays {
                stmt.execute(params![holiday.date, holiday.name])?;
            }
        }
        for exception in &schedule.calendar_exceptions {
            Self::upsert_exception(&tx, exception)?;
        }
        tx.commit()?;
        Ok(())
    }

    fn insert_people(tx: &Transaction, people: &[Person]) -> PersistenceResult<()> {
        let mut stmt =
            tx.prepare("INSERT INTO people (id, name, position, department) VALUES (?1, ?2, ?3, ?4)")?;
        for person in people {
            stmt.execute(params![
                person.id,
                person.name,
                person.position.as_str(),
                person.department.map(|d| d.as_str())
            ])?;
        }
        Ok(())
    }

    /// Parents are inserted before their children so the foreign key holds.
    fn insert_tasks(tx: &Transaction, tasks: &[Task]) -> PersistenceResult<()> {
        let mut ordered: Vec<&Task> = tasks.iter().collect();
        ordered.sort_by_key(|task| task.level);
        let mut pending = ordered;
        let mut inserted = std::collections::HashSet::new();
        let mut stmt = tx.prepare(
            "INSERT INTO tasks (id, name, description, priority, level, parent_id, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )?;
        while !pending.is_empty() {
            let before = pending.len();
            let mut deferred = Vec::new();
            for task in pending {
                let ready = task.parent_id.is_none_or(|parent| inserted.contains(&parent));
                if !ready {
                    deferred.push(task);
                    continue;
                }
                stmt.execute(params![
                    task.id,
                    task.name,
                    task.description,
                    task.priority,
                    task.level,
                    task.parent_id,
                    task.created_at
                ])?;
                inserted.insert(task.id);
            }
            if deferred.len() == before {
                return Err(PersistenceError::InvalidData(
                    "task hierarchy contains a parent cycle".into(),
                ));
            }
            pending = deferred;
        }
        Ok(())
    }

    fn upsert_exception(tx: &Transaction, exception: &CalendarException) -> PersistenceResult<()> {
        tx.execute(
            "INSERT INTO calendar_exceptions (person_id, date, status, hours_worked) \
             VALUES (?1, ?2, ?3, ?4) \
             ON CONFLICT (person_id, date) DO UPDATE SET \
             status = excluded.status, hours_worked = excluded.hours_worked",
            params![
                exception.person_id,
                exception.date,
                exception.status.as_str(),
                exception.hours_worked
            ],
        )?;
        Ok(())
    }

    /// Stores an exception, replacing the person's previous one for that date.
    pub fn set_calendar_exception(&self, exception: &CalendarException) -> PersistenceResult<()> {
        validation::validate_calendar_exception(exception)?;
        let mut conn = self.connection.lock();
        let tx = conn.transaction()?;
        Self::upsert_exception(&tx, exception)?;
        tx.commit()?;
        Ok(())
    }

    /// Flags a non-fixed assignment for recalculation.
    pub fn mark_dirty(&self, id: AssignmentId) -> PersistenceResult<bool> {
        let conn = self.connection.lock();
        let exists: Option<i32> = conn
            .query_row("SELECT id FROM assignments WHERE id = ?1", params![id], |row| {
                row.get(0)
            })
            .optional()?;
        if exists.is_none() {
            return Err(PersistenceError::NotFound(format!("assignment {id}")));
        }
        let changed = conn.execute(
            "UPDATE assignments SET needs_recalculation = 1 \
             WHERE id = ?1 AND actual_start IS NULL AND actual_end IS NULL",
            params![id],
        )?;
        Ok(changed > 0)
    }

    pub fn load_all(&self) -> PersistenceResult<Schedule> {
        let mut conn = self.connection.lock();
        let tx = conn.transaction()?;
        let schedule = Schedule {
            people: query_people(&tx)?,
            tasks: query_all_tasks(&tx)?,
            dependencies: query_all_dependencies(&tx)?,
            assignments: query_assignments(&tx, &AssignmentFilter::all())?,
            holidays: query_holidays(&tx)?,
            calendar_exceptions: query_exceptions(&tx, None)?,
        };
        tx.commit()?;
        schedule.validate()?;
        Ok(schedule)
    }
}

fn query_people(conn: &Connection) -> PersistenceResult<Vec<Person>> {
    let mut stmt = conn.prepare("SELECT id, name, position, department FROM people ORDER BY id")?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, PersonId>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, Option<String>>(3)?,
        ))
    })?;

    let mut people = Vec::new();
    for row in rows {
        let (id, name, position, department) = row?;
        let position = Position::from_str(&position).ok_or_else(|| {
            PersistenceError::InvalidData(format!("invalid position '{position}'"))
        })?;
        let department = match department {
            Some(value) => Some(Department::from_str(&value).ok_or_else(|| {
                PersistenceError::InvalidData(format!("invalid department '{value}'"))
            })?),
            None => None,
        };
        people.push(Person {
            id,
            name,
            position,
            department,
        });
    }
    Ok(people)
}

fn query_all_tasks(conn: &Connection) -> PersistenceResult<Vec<Task>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, description, priority, level, parent_id, created_at \
         FROM tasks ORDER BY id",
    )?;
    let rows = stmt.query_map([], task_from_row)?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

fn query_tasks(conn: &Connection, ids: &[TaskId]) -> PersistenceResult<Vec<Task>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let sql = format!(
        "SELECT id, name, description, priority, level, parent_id, created_at \
         FROM tasks WHERE id IN ({}) ORDER BY id",
        placeholders(ids.len())
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(ids.iter()), task_from_row)?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

fn query_all_dependencies(conn: &Connection) -> PersistenceResult<Vec<TaskDependency>> {
    let mut stmt = conn.prepare(
        "SELECT predecessor, successor, established_on FROM task_dependencies ORDER BY rowid",
    )?;
    let rows = stmt.query_map([], dependency_from_row)?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

fn query_predecessor_edges(
    conn: &Connection,
    successors: &[TaskId],
) -> PersistenceResult<Vec<TaskDependency>> {
    if successors.is_empty() {
        return Ok(Vec::new());
    }
    let sql = format!(
        "SELECT predecessor, successor, established_on FROM task_dependencies \
         WHERE successor IN ({}) ORDER BY rowid",
        placeholders(successors.len())
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(successors.iter()), dependency_from_row)?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

fn query_assignments(
    conn: &Connection,
    filter: &AssignmentFilter,
) -> PersistenceResult<Vec<Assignment>> {
    let mut clauses: Vec<String> = Vec::new();
    let mut values: Vec<Value> = Vec::new();

    if let Some(person) = filter.person_id {
        clauses.push("a.person_id = ?".into());
        values.push(Value::Integer(i64::from(person)));
    }
    match filter.fixed {
        Some(true) => {
            clauses.push("(a.actual_start IS NOT NULL OR a.actual_end IS NOT NULL)".into())
        }
        Some(false) => clauses.push("(a.actual_start IS NULL AND a.actual_end IS NULL)".into()),
        None => {}
    }
    if let Some(dirty) = filter.needs_recalculation {
        clauses.push("a.needs_recalculation = ?".into());
        values.push(Value::Integer(i64::from(dirty)));
    }
    if let Some(level) = filter.task_level {
        clauses.push("t.level = ?".into());
        values.push(Value::Integer(i64::from(level)));
    }
    if let Some(task_ids) = &filter.task_ids {
        if task_ids.is_empty() {
            return Ok(Vec::new());
        }
        clauses.push(format!("a.task_id IN ({})", placeholders(task_ids.len())));
        values.extend(task_ids.iter().map(|id| Value::Integer(i64::from(*id))));
    }

    let mut sql =
        format!("SELECT {ASSIGNMENT_COLUMNS} FROM assignments a JOIN tasks t ON t.id = a.task_id");
    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }
    sql.push_str(" ORDER BY a.id");

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(values.iter()), assignment_from_row)?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

fn query_holidays(conn: &Connection) -> PersistenceResult<Vec<Holiday>> {
    let mut stmt = conn.prepare("SELECT date, name FROM holidays ORDER BY date")?;
    let rows = stmt.query_map([], |row| {
        Ok(Holiday {
            date: row.get(0)?,
            name: row.get(1)?,
        })
    })?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

/// `None` reads every person's exceptions.
fn query_exceptions(
    conn: &Connection,
    people: Option<&[PersonId]>,
) -> PersistenceResult<Vec<CalendarException>> {
    let (sql, values): (String, Vec<Value>) = match people {
        None => (
            "SELECT person_id, date, status, hours_worked FROM calendar_exceptions \
             ORDER BY person_id, date"
                .into(),
            Vec::new(),
        ),
        Some([]) => return Ok(Vec::new()),
        Some(people) => (
            format!(
                "SELECT person_id, date, status, hours_worked FROM calendar_exceptions \
                 WHERE person_id IN ({}) ORDER BY person_id, date",
                placeholders(people.len())
            ),
            people.iter().map(|id| Value::Integer(i64::from(*id))).collect(),
        ),
    };
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(values.iter()), raw_exception_from_row)?;
    rows.map(|row| row.map_err(PersistenceError::from).and_then(exception_from_raw))
        .collect()
}

fn task_from_row(row: &Row) -> rusqlite::Result<Task> {
    Ok(Task {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        priority: row.get(3)?,
        level: row.get(4)?,
        parent_id: row.get(5)?,
        created_at: row.get(6)?,
    })
}

fn dependency_from_row(row: &Row) -> rusqlite::Result<TaskDependency> {
    Ok(TaskDependency {
        predecessor: row.get(0)?,
        successor: row.get(1)?,
        established_on: row.get(2)?,
    })
}

fn assignment_from_row(row: &Row) -> rusqlite::Result<Assignment> {
    Ok(Assignment {
        id: row.get(0)?,
        task_id: row.get(1)?,
        person_id: row.get(2)?,
        assigned_at: row.get(3)?,
        notes: row.get(4)?,
        effort_estimation: row.get(5)?,
        planned_start: row.get(6)?,
        planned_end: row.get(7)?,
        actual_start: row.get(8)?,
        actual_end: row.get(9)?,
        needs_recalculation: row.get(10)?,
    })
}

type RawException = (PersonId, chrono::NaiveDate, String, Option<f64>);

fn raw_exception_from_row(row: &Row) -> rusqlite::Result<RawException> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

fn exception_from_raw(raw: RawException) -> PersistenceResult<CalendarException> {
    let (person_id, date, status, hours_worked) = raw;
    let status = ExceptionStatus::from_str(&status).ok_or_else(|| {
        PersistenceError::InvalidData(format!("invalid calendar exception status '{status}'"))
    })?;
    Ok(CalendarException {
        person_id,
        date,
        status,
        hours_worked,
    })
}

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

impl ScheduleStore for SqliteScheduleStore {
    fn people(&self) -> PersistenceResult<Vec<Person>> {
        query_people(&self.connection.lock())
    }

    fn tasks(&self, ids: &[TaskId]) -> PersistenceResult<Vec<Task>> {
        query_tasks(&self.connection.lock(), ids)
    }

    fn assignments(&self, filter: &AssignmentFilter) -> PersistenceResult<Vec<Assignment>> {
        query_assignments(&self.connection.lock(), filter)
    }

    fn assignment(&self, id: AssignmentId) -> PersistenceResult<Option<Assignment>> {
        let conn = self.connection.lock();
        let sql = format!("SELECT {ASSIGNMENT_COLUMNS} FROM assignments a WHERE a.id = ?1");
        let assignment = conn
            .query_row(&sql, params![id], assignment_from_row)
            .optional()?;
        Ok(assignment)
    }

    fn predecessor_edges(&self, successors: &[TaskId]) -> PersistenceResult<Vec<TaskDependency>> {
        query_predecessor_edges(&self.connection.lock(), successors)
    }

    fn holidays(&self) -> PersistenceResult<Vec<Holiday>> {
        query_holidays(&self.connection.lock())
    }

    fn calendar_exceptions(
        &self,
        people: &[PersonId],
    ) -> PersistenceResult<Vec<CalendarException>> {
        query_exceptions(&self.connection.lock(), Some(people))
    }

    fn write_planned_dates(&self, plans: &[PlannedDates]) -> PersistenceResult<()> {
        if plans.is_empty() {
            return Ok(());
        }
        let mut conn = self.connection.lock();
        let tx = conn.transaction()?;
        let mut skipped = Vec::new();
        {
            let mut update = tx.prepare(
                "UPDATE assignments SET planned_start = ?1, planned_end = ?2, \
                 needs_recalculation = 0 \
                 WHERE id = ?3 AND actual_start IS NULL AND actual_end IS NULL",
            )?;
            let mut exists = tx.prepare("SELECT id FROM assignments WHERE id = ?1")?;
            for plan in plans {
                let changed = update.execute(params![
                    plan.planned_start,
                    plan.planned_end,
                    plan.assignment_id
                ])?;
                if changed > 0 {
                    continue;
                }
                let found: Option<AssignmentId> = exists
                    .query_row(params![plan.assignment_id], |row| row.get(0))
                    .optional()?;
                if found.is_none() {
                    return Err(PersistenceError::NotFound(format!(
                        "assignment {}",
                        plan.assignment_id
                    )));
                }
                skipped.push(plan.assignment_id);
            }
        }
        tx.commit()?;
        if !skipped.is_empty() {
            warn!(?skipped, "plans for assignments fixed since they were read were dropped");
        }
        debug!(
            count = plans.len() - skipped.len(),
            "planned dates committed to sqlite store"
        );
        Ok(())
    }

    fn read_snapshot(&self, people: &[PersonId]) -> PersistenceResult<Schedule> {
        let mut conn = self.connection.lock();
        let tx = conn.transaction()?;
        let schedule = Schedule {
            people: query_people(&tx)?,
            tasks: query_all_tasks(&tx)?,
            dependencies: query_all_dependencies(&tx)?,
            assignments: query_assignments(&tx, &AssignmentFilter::all())?,
            holidays: query_holidays(&tx)?,
            calendar_exceptions: query_exceptions(&tx, Some(people))?,
        };
        tx.commit()?;
        Ok(schedule)
    }
}
