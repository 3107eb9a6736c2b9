use super::PersistenceResult;
use crate::calendar::WorkCalendarConfig;
use crate::schedule::Schedule;
use std::fs::File;
use std::path::Path;

pub fn save_schedule_to_json<P: AsRef<Path>>(schedule: &Schedule, path: P) -> PersistenceResult<()> {
    schedule.validate()?;
    let file = File::create(path)?;
    serde_json::to_writer_pretty(file, schedule)?;
    Ok(())
}

pub fn load_schedule_from_json<P: AsRef<Path>>(path: P) -> PersistenceResult<Schedule> {
    let file = File::open(path)?;
    let schedule: Schedule = serde_json::from_reader(file)?;
    schedule.validate()?;
    Ok(schedule)
}

pub fn save_calendar_config<P: AsRef<Path>>(
    config: &WorkCalendarConfig,
    path: P,
) -> PersistenceResult<()> {
    let file = File::create(path)?;
    serde_json::to_writer_pretty(file, config)?;
    Ok(())
}

/// Loads a calendar configuration. Missing fields take their defaults.
pub fn load_calendar_config<P: AsRef<Path>>(path: P) -> PersistenceResult<WorkCalendarConfig> {
    let file = File::open(path)?;
    let config: WorkCalendarConfig = serde_json::from_reader(file)?;
    config
        .validate()
        .map_err(|err| super::PersistenceError::InvalidData(err.to_string()))?;
    Ok(config)
}
