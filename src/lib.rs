pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod invoke;

use application::commands::{spawn_ai_scheduler, tick_timers_impl, AppState};
use invoke::serve_lines;
use log::{error, info};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::BufReader;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

const TICK_INTERVAL: Duration = Duration::from_secs(1);

fn spawn_ticker(state: Arc<AppState>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(TICK_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            let report = tick_timers_impl(&state);
            if let Some(completion) = report.hour_completed {
                info!(
                    "hour {} complete ({} hours today)",
                    completion.hour, completion.completed_hours
                );
            }
            for failure in report.errors {
                error!("timer tick failed: {failure}");
            }
        }
    })
}

/// Answers JSON command lines on stdin until it closes. The dashboard keeps running
/// without it.
fn spawn_command_reader(state: Arc<AppState>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let reader = BufReader::new(tokio::io::stdin());
        match serve_lines(&state, reader, tokio::io::stdout()).await {
            Ok(()) => info!("command input closed"),
            Err(error) => error!("command input failed: {error}"),
        }
    })
}

pub fn run() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let workspace_root = match std::env::args_os().nth(1) {
        Some(path) => PathBuf::from(path),
        None => std::env::current_dir().expect("failed to resolve current directory"),
    };
    let runtime = tokio::runtime::Runtime::new().expect("failed to start async runtime");

    runtime.block_on(async move {
        let state = Arc::new(AppState::new(workspace_root).expect("failed to initialize app state"));
        info!("hourdash running from {}", state.config_dir().display());

        let ticker = spawn_ticker(Arc::clone(&state));
        let scheduler = spawn_ai_scheduler(&state);
        let commands = spawn_command_reader(Arc::clone(&state));

        if let Err(error) = tokio::signal::ctrl_c().await {
            error!("failed to listen for ctrl-c: {error}");
        }
        info!("shutting down");
        ticker.abort();
        scheduler.abort();
        commands.abort();
        state.alerts().stop();
    });
}
