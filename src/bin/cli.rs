use chrono::{NaiveDate, NaiveDateTime};
use std::io::{self, Write};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use workload_scheduler::persistence::file::{load_calendar_config, save_calendar_config};
use workload_scheduler::{
    Assignment, AssignmentFilter, CalendarException, FixedClock, Holiday, InMemoryScheduleStore,
    Person, RecalcError, RecalcStrategy, Schedule, ScheduleRecalculator, ScheduleStore, Task,
    TaskDependency, WorkCalendarConfig, load_schedule_from_json, save_schedule_to_json,
};

fn push_row<'a>(out: &mut String, widths: &[usize], cells: impl Iterator<Item = &'a str>) {
    out.push('|');
    for (ci, cell) in cells.enumerate() {
        out.push(' ');
        out.push_str(cell);
        out.push_str(&" ".repeat(widths[ci].saturating_sub(cell.len())));
        out.push(' ');
        out.push('|');
    }
    out.push('\n');
}

fn render_text_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in rows {
        for (ci, cell) in row.iter().enumerate() {
            if cell.len() > widths[ci] {
                widths[ci] = cell.len();
            }
        }
    }

    let mut sep = String::new();
    sep.push('+');
    for w in &widths {
        sep.push_str(&"-".repeat(*w + 2));
        sep.push('+');
    }

    let mut out = String::new();
    out.push_str(&sep);
    out.push('\n');
    push_row(&mut out, &widths, headers.iter().copied());
    out.push_str(&sep);
    out.push('\n');
    for row in rows {
        push_row(&mut out, &widths, row.iter().map(String::as_str));
    }
    out.push_str(&sep);
    out.push('\n');
    out
}

fn fmt_datetime(value: Option<NaiveDateTime>) -> String {
    value
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_default()
}

fn render_assignments(schedule: &Schedule) -> String {
    let mut assignments: Vec<&Assignment> = schedule.assignments.iter().collect();
    assignments.sort_by_key(|a| a.id);
    let rows: Vec<Vec<String>> = assignments
        .iter()
        .map(|a| {
            let task = schedule
                .task(a.task_id)
                .map(|t| t.name.clone())
                .unwrap_or_default();
            let person = schedule
                .person(a.person_id)
                .map(|p| p.name.clone())
                .unwrap_or_default();
            vec![
                a.id.to_string(),
                format!("{} {}", a.task_id, task),
                format!("{} {}", a.person_id, person),
                a.effort_estimation.map(|e| e.to_string()).unwrap_or_default(),
                fmt_datetime(a.planned_start),
                fmt_datetime(a.planned_end),
                fmt_datetime(a.actual_start),
                fmt_datetime(a.actual_end),
                format!("{:?}", a.state()).to_lowercase(),
            ]
        })
        .collect();
    render_text_table(
        &[
            "id",
            "task",
            "person",
            "effort_days",
            "planned_start",
            "planned_end",
            "actual_start",
            "actual_end",
            "state",
        ],
        &rows,
    )
}

fn render_people(schedule: &Schedule) -> String {
    let rows: Vec<Vec<String>> = schedule
        .people
        .iter()
        .map(|p| vec![p.id.to_string(), p.name.clone(), p.position.label().to_string()])
        .collect();
    render_text_table(&["id", "name", "position"], &rows)
}

fn render_tasks(schedule: &Schedule) -> String {
    let mut tasks: Vec<&Task> = schedule.tasks.iter().collect();
    tasks.sort_by_key(|t| t.ordering_key());
    let rows: Vec<Vec<String>> = tasks
        .iter()
        .map(|t| {
            let preds = schedule
                .dependencies
                .iter()
                .filter(|d| d.successor == t.id)
                .map(|d| d.predecessor.to_string())
                .collect::<Vec<_>>()
                .join(",");
            vec![
                t.id.to_string(),
                t.name.clone(),
                t.level.to_string(),
                t.priority.to_string(),
                t.parent_id.map(|p| p.to_string()).unwrap_or_default(),
                preds,
            ]
        })
        .collect();
    render_text_table(
        &["id", "name", "level", "priority", "parent", "predecessors"],
        &rows,
    )
}

fn print_help() {
    println!(
        "Commands:\n  help                               Show this help\n  show                               Show assignments\n  people                             Show people\n  tasks                              Show tasks with predecessors\n  person <id> <name...>              Upsert a person\n  task <id> <name> [level] [priority] [parent]\n                                     Upsert a task\n  dep <pred_id> <succ_id>            Add a task dependency\n  assign <id> <task_id> <person_id> [effort_days]\n                                     Upsert an assignment (marked for recalculation)\n  effort <id> <days>                 Set effort estimation in person-days\n  actual <id> <start|-> <end|->      Record actual start/end (YYYY-MM-DDTHH:MM)\n  dirty <id>                         Mark an assignment for recalculation\n  holiday <YYYY-MM-DD> [name...]     Add a public holiday\n  leave <person_id> <YYYY-MM-DD>     Record leave for a person\n  overtime <person_id> <YYYY-MM-DD> [hours]\n                                     Record an overtime day for a person\n  now [YYYY-MM-DDTHH:MM]             Show or pin the current time\n  recalc <person_id> [sequential|dependency]\n                                     Recalculate one person\n  recalc-one <assignment_id>         Recalculate one assignment (dependency-aware)\n  reschedule <person_id>             Reschedule a team member (dependency-aware)\n  recalc-all                         Recalculate all dirty work in dependency order\n  order                              Show person dependency order\n  calendar show                      Display calendar configuration\n  calendar default                   Reset to the default calendar\n  calendar set <json_path>           Load calendar config from JSON file\n  calendar save <json_path>          Save current calendar config to JSON file\n  save json <path>                   Persist data to disk\n  load json <path>                   Load data from disk\n  quit|exit                          Exit"
    );
}

fn print_calendar_info(config: &WorkCalendarConfig, schedule: &Schedule) {
    let working_days = config
        .working_days
        .iter()
        .map(|wd| wd.to_string())
        .collect::<Vec<_>>()
        .join(", ");
    let holidays = schedule
        .holidays
        .iter()
        .map(|h| h.date.to_string())
        .collect::<Vec<_>>()
        .join(", ");
    println!("Working days       : {}", working_days);
    println!(
        "Working hours      : {} - {} ({}h)",
        config.workday_start, config.workday_end, config.default_daily_hours
    );
    println!("Overtime cutoff    : {}", config.overtime_day_end);
    println!("Holidays           : {}", holidays);
}

fn parse_id(value: Option<&str>) -> Option<i32> {
    value.and_then(|s| s.parse::<i32>().ok())
}

fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").ok()
}

fn parse_datetime(value: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M")
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S"))
        .ok()
}

fn report_recalc_error(err: RecalcError) {
    match err {
        RecalcError::Cycle(cycle) => println!("Recalculation aborted: {}", cycle),
        other => println!("Recalculation error: {}", other),
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(io::stderr)
        .init();

    let store = Arc::new(InMemoryScheduleStore::new());
    let mut config = WorkCalendarConfig::default();
    let mut recalculator = ScheduleRecalculator::new(store.clone(), config.clone());

    println!("Workload Scheduler (CLI) - type 'help' for commands\n");

    let stdin = io::stdin();
    let mut line = String::new();
    loop {
        print!("> ");
        let _ = io::stdout().flush();
        line.clear();
        match stdin.read_line(&mut line) {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }
        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        let mut parts = input.split_whitespace();
        let cmd = parts.next().unwrap_or("");

        match cmd {
            "help" => print_help(),
            "quit" | "exit" => break,
            "show" => println!("{}", render_assignments(&store.snapshot())),
            "people" => println!("{}", render_people(&store.snapshot())),
            "tasks" => println!("{}", render_tasks(&store.snapshot())),
            "person" => {
                let Some(id) = parse_id(parts.next()) else {
                    println!("Usage: person <id> <name...>");
                    continue;
                };
                let name = parts.collect::<Vec<_>>().join(" ");
                if name.is_empty() {
                    println!("Usage: person <id> <name...>");
                    continue;
                }
                store.upsert_person(Person::new(id, name));
                println!("Person upserted.");
            }
            "task" => {
                let (Some(id), Some(name)) = (parse_id(parts.next()), parts.next()) else {
                    println!("Usage: task <id> <name> [level] [priority] [parent]");
                    continue;
                };
                let mut task = Task::new(id, name, recalculator.now());
                if let Some(existing) = store.snapshot().task(id) {
                    task.created_at = existing.created_at;
                }
                let level = parts.next();
                let priority = parts.next();
                let parent = parts.next();
                if let Some(level_s) = level {
                    match level_s.parse::<i32>() {
                        Ok(v) => task = task.with_level(v),
                        Err(_) => {
                            println!("Invalid level");
                            continue;
                        }
                    }
                }
                if let Some(priority_s) = priority {
                    match priority_s.parse::<i32>() {
                        Ok(v) => task = task.with_priority(v),
                        Err(_) => {
                            println!("Invalid priority");
                            continue;
                        }
                    }
                }
                if let Some(parent_s) = parent {
                    match parent_s.parse::<i32>() {
                        Ok(v) => task = task.with_parent(v),
                        Err(_) => {
                            println!("Invalid parent id");
                            continue;
                        }
                    }
                }
                match store.upsert_task(task) {
                    Ok(_) => println!("Task upserted."),
                    Err(e) => println!("Error: {}", e),
                }
            }
            "dep" => match (parse_id(parts.next()), parse_id(parts.next())) {
                (Some(pred), Some(succ)) => {
                    let dependency = TaskDependency::new(pred, succ, recalculator.now());
                    match store.add_dependency(dependency) {
                        Ok(true) => println!("Dependency {pred} -> {succ} added."),
                        Ok(false) => println!("Dependency {pred} -> {succ} already exists."),
                        Err(e) => println!("Error: {}", e),
                    }
                }
                _ => println!("Usage: dep <pred_id> <succ_id>"),
            },
            "assign" => {
                let (Some(id), Some(task_id), Some(person_id)) = (
                    parse_id(parts.next()),
                    parse_id(parts.next()),
                    parse_id(parts.next()),
                ) else {
                    println!("Usage: assign <id> <task_id> <person_id> [effort_days]");
                    continue;
                };
                let mut assignment = Assignment::new(id, task_id, person_id, recalculator.now());
                if let Some(effort_s) = parts.next() {
                    match effort_s.parse::<f64>() {
                        Ok(v) => assignment = assignment.with_effort(v),
                        Err(_) => {
                            println!("Invalid effort_days");
                            continue;
                        }
                    }
                }
                assignment.mark_dirty();
                match store.upsert_assignment(assignment) {
                    Ok(_) => println!("Assignment {id} upserted."),
                    Err(e) => println!("Error: {}", e),
                }
            }
            "effort" => {
                let (Some(id), Some(days_s)) = (parse_id(parts.next()), parts.next()) else {
                    println!("Usage: effort <id> <days>");
                    continue;
                };
                let days: f64 = match days_s.parse() {
                    Ok(v) => v,
                    Err(_) => {
                        println!("Invalid float");
                        continue;
                    }
                };
                let Some(mut assignment) = store.snapshot().assignment(id).cloned() else {
                    println!("Assignment {id} not found.");
                    continue;
                };
                assignment.effort_estimation = Some(days);
                assignment.mark_dirty();
                match store.upsert_assignment(assignment) {
                    Ok(_) => println!("effort_estimation set."),
                    Err(e) => println!("Error: {}", e),
                }
            }
            "actual" => {
                let (Some(id), Some(start_s), Some(end_s)) =
                    (parse_id(parts.next()), parts.next(), parts.next())
                else {
                    println!("Usage: actual <id> <start|-> <end|->");
                    continue;
                };
                let start = if start_s == "-" { None } else { parse_datetime(start_s) };
                let end = if end_s == "-" { None } else { parse_datetime(end_s) };
                if (start_s != "-" && start.is_none()) || (end_s != "-" && end.is_none()) {
                    println!("Invalid datetime (YYYY-MM-DDTHH:MM)");
                    continue;
                }
                let Some(mut assignment) = store.snapshot().assignment(id).cloned() else {
                    println!("Assignment {id} not found.");
                    continue;
                };
                assignment.actual_start = start;
                assignment.actual_end = end;
                if assignment.is_fixed() {
                    assignment.needs_recalculation = false;
                }
                match store.upsert_assignment(assignment) {
                    Ok(_) => println!("Actuals recorded."),
                    Err(e) => println!("Error: {}", e),
                }
            }
            "dirty" => match parse_id(parts.next()) {
                Some(id) => match store.mark_dirty(id) {
                    Ok(true) => println!("Assignment {id} marked for recalculation."),
                    Ok(false) => println!("Assignment {id} is fixed; left unchanged."),
                    Err(e) => println!("Error: {}", e),
                },
                None => println!("Usage: dirty <id>"),
            },
            "holiday" => {
                let Some(date) = parts.next().and_then(parse_date) else {
                    println!("Usage: holiday <YYYY-MM-DD> [name...]");
                    continue;
                };
                let name = parts.collect::<Vec<_>>().join(" ");
                store.upsert_holiday(Holiday::new(date, name));
                println!("Holiday {date} added.");
            }
            "leave" | "overtime" => {
                let (Some(person), Some(date)) =
                    (parse_id(parts.next()), parts.next().and_then(parse_date))
                else {
                    println!("Usage: {cmd} <person_id> <YYYY-MM-DD>");
                    continue;
                };
                let exception = if cmd == "leave" {
                    CalendarException::leave(person, date)
                } else {
                    let hours = match parts.next() {
                        Some(hours_s) => match hours_s.parse::<f64>() {
                            Ok(v) => Some(v),
                            Err(_) => {
                                println!("Invalid hours");
                                continue;
                            }
                        },
                        None => None,
                    };
                    CalendarException::overtime(person, date, hours)
                };
                match store.set_calendar_exception(exception) {
                    Ok(previous) => {
                        if previous.is_some() {
                            println!("Replaced existing exception for {date}.");
                        }
                        let marked = store.mark_person_dirty(person);
                        println!("{cmd} recorded; {marked} assignment(s) marked for recalculation.");
                    }
                    Err(e) => println!("Error: {}", e),
                }
            }
            "now" => match parts.next() {
                None => println!("Now: {}", recalculator.now().format("%Y-%m-%d %H:%M")),
                Some(value) => match parse_datetime(value) {
                    Some(now) => {
                        recalculator.set_clock(FixedClock(now));
                        println!("Now pinned to {}.", now.format("%Y-%m-%d %H:%M"));
                    }
                    None => println!("Invalid datetime (YYYY-MM-DDTHH:MM)"),
                },
            },
            "recalc" => {
                let Some(person) = parse_id(parts.next()) else {
                    println!("Usage: recalc <person_id> [sequential|dependency]");
                    continue;
                };
                let strategy = match parts.next() {
                    Some(value) => match RecalcStrategy::from_str(value) {
                        Some(strategy) => strategy,
                        None => {
                            println!("Unknown strategy '{}'.", value);
                            continue;
                        }
                    },
                    None => RecalcStrategy::default(),
                };
                match recalculator.recalculate_for_person(person, strategy) {
                    Ok(summary) => {
                        println!("Recalculated ({})", summary.to_cli_summary());
                        println!("{}", render_assignments(&store.snapshot()));
                    }
                    Err(e) => report_recalc_error(e),
                }
            }
            "recalc-one" => match parse_id(parts.next()) {
                Some(id) => match recalculator.recalculate_assignment(id) {
                    Ok(Some(plan)) => println!(
                        "Assignment {id} planned {} -> {}.",
                        plan.planned_start.format("%Y-%m-%d %H:%M"),
                        plan.planned_end.format("%Y-%m-%d %H:%M")
                    ),
                    Ok(None) => println!("Assignment {id} left unchanged."),
                    Err(e) => report_recalc_error(e),
                },
                None => println!("Usage: recalc-one <assignment_id>"),
            },
            "reschedule" => match parse_id(parts.next()) {
                Some(person) => match recalculator.reschedule_team_member(person) {
                    Ok(summary) => {
                        println!("Rescheduled ({})", summary.to_cli_summary());
                        println!("{}", render_assignments(&store.snapshot()));
                    }
                    Err(e) => report_recalc_error(e),
                },
                None => println!("Usage: reschedule <person_id>"),
            },
            "recalc-all" => match recalculator.recalculate_all_dirty_in_dependency_order() {
                Ok(summary) => {
                    println!("Recalculated ({})", summary.to_cli_summary());
                    println!("{}", render_assignments(&store.snapshot()));
                }
                Err(e) => report_recalc_error(e),
            },
            "order" => match recalculator.person_dependency_order() {
                Ok(order) => {
                    let chain = order
                        .iter()
                        .map(ToString::to_string)
                        .collect::<Vec<_>>()
                        .join(" -> ");
                    println!("Person order: {}", chain);
                }
                Err(e) => report_recalc_error(e),
            },
            "calendar" => match parts.next() {
                Some("show") | None => print_calendar_info(&config, &store.snapshot()),
                Some("default") => {
                    config = WorkCalendarConfig::default();
                    recalculator.set_config(config.clone());
                    println!("Calendar reset to default.");
                    print_calendar_info(&config, &store.snapshot());
                }
                Some("set") => match parts.next() {
                    Some(path) => match load_calendar_config(path) {
                        Ok(loaded) => {
                            config = loaded;
                            recalculator.set_config(config.clone());
                            println!("Calendar updated from {}.", path);
                            print_calendar_info(&config, &store.snapshot());
                        }
                        Err(e) => println!("Error loading calendar: {}", e),
                    },
                    None => println!("Usage: calendar set <json_path>"),
                },
                Some("save") => match parts.next() {
                    Some(path) => match save_calendar_config(&config, path) {
                        Ok(_) => println!("Calendar saved to {}.", path),
                        Err(e) => println!("Error saving calendar: {}", e),
                    },
                    None => println!("Usage: calendar save <json_path>"),
                },
                Some(other) => {
                    println!("Unknown calendar command '{}'.", other);
                    println!("Usage: calendar show|default|set <json_path>|save <json_path>");
                }
            },
            "save" => match (parts.next(), parts.next()) {
                (Some("json"), Some(path)) => match save_schedule_to_json(&store.snapshot(), path) {
                    Ok(_) => println!("Schedule saved to {}.", path),
                    Err(e) => println!("Error saving schedule: {}", e),
                },
                _ => println!("Usage: save json <path>"),
            },
            "load" => match (parts.next(), parts.next()) {
                (Some("json"), Some(path)) => match load_schedule_from_json(path) {
                    Ok(loaded) => match store.replace(loaded) {
                        Ok(_) => {
                            println!("Schedule loaded from {}.", path);
                            println!("{}", render_assignments(&store.snapshot()));
                        }
                        Err(e) => println!("Error loading schedule: {}", e),
                    },
                    Err(e) => println!("Error loading schedule: {}", e),
                },
                _ => println!("Usage: load json <path>"),
            },
            _ => {
                println!("Unknown command. Type 'help'.");
            }
        }
    }

    let dirty = store
        .assignments(&AssignmentFilter::all().needs_recalculation(true))
        .map(|dirty| dirty.len())
        .unwrap_or(0);
    if dirty > 0 {
        eprintln!("{dirty} assignment(s) still marked for recalculation.");
    }
}
