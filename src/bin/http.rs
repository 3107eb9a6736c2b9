#[cfg(feature = "http_api")]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    use std::net::SocketAddr;

    use tracing_subscriber::EnvFilter;
    use workload_scheduler::persistence::file::{load_calendar_config, load_schedule_from_json};
    use workload_scheduler::{Schedule, WorkCalendarConfig, http_api};

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let addr: SocketAddr = std::env::var("WORKLOAD_SCHEDULER_HTTP_ADDR")
        .unwrap_or_else(|_| "0.0.0.0:3000".to_string())
        .parse()?;

    let schedule = match std::env::var("WORKLOAD_SCHEDULER_DATA") {
        Ok(path) => load_schedule_from_json(&path)?,
        Err(_) => Schedule::new(),
    };
    let config = match std::env::var("WORKLOAD_SCHEDULER_CALENDAR") {
        Ok(path) => load_calendar_config(&path)?,
        Err(_) => WorkCalendarConfig::default(),
    };

    println!("workload-scheduler HTTP API listening on http://{addr}");
    http_api::serve(addr, schedule, config).await?;
    Ok(())
}

#[cfg(not(feature = "http_api"))]
fn main() {
    eprintln!("Rebuild with the `http_api` feature to enable the HTTP server.");
}
