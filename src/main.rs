use config::config::AppConfig;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::time::{Duration, interval};
use tracing::{debug, error, info, warn};

use clock::clock::{Clock, SystemClock, WakeDetector};
use meeting::meeting::DeviceActivityOracle;
use prompt::prompt::NotificationPrompt;
use scheduler::handle::SchedulerHandle;
use scheduler::scheduler::{Collaborators, Scheduler};
use store::store::JsonFileStore;

mod breaks;
mod clock;
mod config;
mod error;
mod hypr;
mod logging;
mod meeting;
mod prompt;
mod scheduler;
mod store;
mod ws;

const STATUS_REFRESH_SECS: u64 = 10; // Keep the countdown text fresh

fn has_flag(args: &[String], long: &str, short: &str) -> bool {
    args.iter().any(|a| a == long || a == short)
}

fn flag_value(args: &[String], long: &str, short: &str) -> Option<String> {
    args.iter()
        .position(|a| a == long || a == short)
        .and_then(|pos| args.get(pos + 1).cloned())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();

    let verbose = has_flag(&args, "--verbose", "-v");
    let control = !args.iter().any(|a| a == "--no-control");
    let log_file = flag_value(&args, "--log", "-l")
        .map(PathBuf::from)
        .or_else(logging::default_log_path);
    let config_path = flag_value(&args, "--config", "-c")
        .map(PathBuf::from)
        .or_else(AppConfig::default_path);

    let _log_guard = logging::init(verbose, log_file.as_deref())?;

    let config = AppConfig::load(config_path.as_deref())?;
    let schedule = config.schedule()?;

    println!("👀 EyeBreak - Vision Rest Reminder");
    println!("======================================================");
    println!(
        "Break every {}min, snooze {}s (max {}), meeting defers up to {}",
        schedule.interval.as_secs() / 60,
        schedule.snooze_delay.as_secs(),
        schedule.max_snoozes,
        schedule.max_meeting_defers
    );
    if control {
        println!("Control server on ws://{}", config.control_addr);
    }
    if let Some(ref path) = log_file {
        println!("Logging to {}", path.display());
    }
    println!();

    let state_path = config
        .state_path
        .clone()
        .unwrap_or_else(JsonFileStore::default_path);
    let store = JsonFileStore::new(state_path);
    info!(state = %store.path().display(), "using state file");

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let scheduler = Scheduler::new(
        schedule,
        Collaborators {
            store: Box::new(store),
            oracle: Box::new(DeviceActivityOracle::default()),
            prompt: Box::new(NotificationPrompt::new(config.prompt_duration())),
            clock,
        },
    );
    let handle = scheduler.spawn();

    // Sleep/wake signal
    let wake_target = handle.clone();
    let detector = WakeDetector::new(SystemClock, config.wake_poll(), config.wake_gap());
    tokio::spawn(detector.run(move || match wake_target.wake() {
        Ok(()) => true,
        Err(e) => {
            warn!("cannot forward wake signal: {}", e);
            false
        }
    }));

    if control {
        let control_target = handle.clone();
        let addr = config.control_addr;
        tokio::spawn(async move {
            if let Err(e) = ws::websocket_server::start_websocket_server(addr, control_target).await
            {
                error!("control server error: {}", e);
            }
        });
    }

    tokio::spawn(present_status(handle.clone()));

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    Ok(())
}

/// Console presenter: reports every transition and refreshes the countdown.
async fn present_status(scheduler: SchedulerHandle) {
    let mut status = scheduler.subscribe();
    let mut refresh = interval(Duration::from_secs(STATUS_REFRESH_SECS));

    loop {
        tokio::select! {
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                info!("{}", scheduler.status_text());
            }
            _ = refresh.tick() => debug!("{}", scheduler.status_text()),
        }
    }
}
