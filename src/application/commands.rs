use crate::application::ai_scheduler::{AiMessageScheduler, NowProvider};
use crate::application::alerts::AlertController;
use crate::application::bootstrap::bootstrap_workspace;
use crate::application::hourly_timer::{HourCompletion, HourlyTimer};
use crate::application::phase_timer::{PhaseTransition, TimerSnapshot};
use crate::application::pomodoro_timer::{FocusSummary, PomodoroTimer};
use crate::domain::clock::{day_progress_percent, hours_left, local_hour, twelve_hour_label, HoursLeft};
use crate::domain::models::{
    AiMessage, HourlyPopupSettings, PhaseLogEntry, PomodoroPreset, PomodoroSession, ProfileSettings,
    SoundSettings, POMODORO_PRESETS,
};
use crate::domain::quotes::{random_banner_quote, BannerQuote, QuoteStyle};
use crate::infrastructure::api_key_store::{resolve_api_key, ApiKeyStore, KeyringApiKeyStore};
use crate::infrastructure::audio_output::LoggingAudioOutput;
use crate::infrastructure::config::{
    load_configs, save_hourly_settings, save_profile_settings, save_sound_settings, DashboardConfig,
};
use crate::infrastructure::durable_store::{SharedStore, SqliteDurableStore};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::generation_client::ReqwestGenerationClient;
use crate::infrastructure::hour_signal::HourSignal;
use crate::infrastructure::notifier::LogNotificationCenter;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use log::debug;
use serde::Serialize;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;

pub type DashboardScheduler = AiMessageScheduler<ReqwestGenerationClient>;

pub struct AppState {
    config_dir: PathBuf,
    database_path: PathBuf,
    logs_dir: PathBuf,
    config: Mutex<DashboardConfig>,
    tz: Tz,
    api_keys: Arc<dyn ApiKeyStore>,
    alerts: Arc<AlertController>,
    hour_signal: HourSignal,
    hourly: Arc<Mutex<HourlyTimer>>,
    pomodoro: Mutex<PomodoroTimer>,
    scheduler: Arc<DashboardScheduler>,
    now_provider: NowProvider,
    log_guard: Mutex<()>,
}

impl AppState {
    pub fn new(workspace_root: PathBuf) -> Result<Self, InfraError> {
        Self::with_services(
            workspace_root,
            Arc::new(KeyringApiKeyStore::default()),
            Arc::new(Utc::now),
        )
    }

    /// Bootstraps the workspace and mounts both timers, replaying any phase boundary that
    /// passed while the dashboard was closed.
    pub fn with_services(
        workspace_root: PathBuf,
        api_keys: Arc<dyn ApiKeyStore>,
        now_provider: NowProvider,
    ) -> Result<Self, InfraError> {
        let bootstrap = bootstrap_workspace(&workspace_root)?;
        let config_dir = workspace_root.join("config");
        let logs_dir = workspace_root.join("logs");
        let config = load_configs(&config_dir)?;
        let tz = config.tz()?;
        let now = now_provider();

        let store: SharedStore = Arc::new(SqliteDurableStore::new(&bootstrap.database_path));
        let alerts = Arc::new(AlertController::new(
            Arc::new(LoggingAudioOutput),
            Arc::new(LogNotificationCenter::new(config.sound.notification_permission)),
        ));
        let hour_signal = HourSignal::new();

        let client = ReqwestGenerationClient::new(
            &config.app.generation_endpoint,
            &config.app.generation_model,
            Duration::from_secs(config.app.generation_timeout_seconds),
        )?;
        let api_key = resolve_api_key(|key| std::env::var(key).ok(), api_keys.as_ref());
        let scheduler = AiMessageScheduler::new(
            Arc::new(client),
            Arc::clone(&store),
            config.profile.clone(),
            api_key,
            tz,
        )
        .with_now_provider(Arc::clone(&now_provider))
        .with_timeout(Duration::from_secs(config.app.generation_timeout_seconds));

        let hourly = HourlyTimer::mount(
            Arc::clone(&store),
            config.hourly.clone(),
            tz,
            Arc::clone(&alerts),
            hour_signal.clone(),
            now,
        )?;
        let pomodoro = PomodoroTimer::mount(store, config.sound.clone(), tz, Arc::clone(&alerts), now)?;

        Ok(Self {
            config_dir,
            database_path: bootstrap.database_path,
            logs_dir,
            config: Mutex::new(config),
            tz,
            api_keys,
            alerts,
            hour_signal,
            hourly: Arc::new(Mutex::new(hourly)),
            pomodoro: Mutex::new(pomodoro),
            scheduler: Arc::new(scheduler),
            now_provider,
            log_guard: Mutex::new(()),
        })
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn database_path(&self) -> &Path {
        &self.database_path
    }

    pub fn alerts(&self) -> &AlertController {
        &self.alerts
    }

    pub fn scheduler(&self) -> Arc<DashboardScheduler> {
        Arc::clone(&self.scheduler)
    }

    fn now(&self) -> DateTime<Utc> {
        (self.now_provider)()
    }

    pub fn command_error(&self, command: &str, error: &InfraError) -> String {
        self.log_error(command, &error.to_string());
        error.to_string()
    }

    pub fn log_info(&self, command: &str, message: &str) {
        self.append_log("info", command, message);
    }

    pub fn log_error(&self, command: &str, message: &str) {
        self.append_log("error", command, message);
    }

    fn append_log(&self, level: &str, command: &str, message: &str) {
        let Ok(_guard) = self.log_guard.lock() else {
            return;
        };
        let path = self.logs_dir.join("commands.log");
        let payload = serde_json::json!({
            "timestamp": self.now().to_rfc3339(),
            "level": level,
            "command": command,
            "message": message,
        });

        if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(path) {
            let _ = writeln!(file, "{}", payload);
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct HourlyStateResponse {
    pub timer: Option<TimerSnapshot>,
    pub pending_popup: Option<HourCompletion>,
    pub hours_active_today: usize,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CompleteSessionResponse {
    pub completed_cycles: u32,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PomodoroSessionsResponse {
    pub recent: Vec<PomodoroSession>,
    pub sessions_today: usize,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TimeCountersResponse {
    pub hour_label: String,
    pub day_progress: u8,
    pub hours_left: HoursLeft,
    pub banner_quote: BannerQuote,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct AiMessagesResponse {
    pub messages: Vec<AiMessage>,
    pub next_check_in: Option<DateTime<Utc>>,
    pub is_generating: bool,
}

/// Each timer is observed on its own, so a failing one does not stall the other.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub hour_completed: Option<HourCompletion>,
    pub pomodoro_transition: Option<PhaseTransition>,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimerName {
    Hourly,
    Pomodoro,
}

pub fn get_hourly_state_impl(state: &AppState) -> Result<HourlyStateResponse, InfraError> {
    let now = state.now();
    let hourly = lock_hourly(state)?;
    Ok(HourlyStateResponse {
        timer: hourly.snapshot(now),
        pending_popup: hourly.pending_popup().cloned(),
        hours_active_today: hourly.hours_active_today(now)?,
    })
}

pub fn dismiss_hourly_alarm_impl(state: &AppState) -> Result<Option<HourCompletion>, InfraError> {
    let dismissed = lock_hourly(state)?.dismiss_alarm();
    state.log_info("dismiss_hourly_alarm", "dismissed hourly alarm");
    Ok(dismissed)
}

/// Silences whatever is sounding, hourly alarm or pomodoro cue.
pub fn stop_alerts_impl(state: &AppState) {
    state.alerts.stop();
    state.log_info("stop_alerts", "stopped active sound");
}

pub fn preview_hourly_popup_impl(state: &AppState) -> Result<HourCompletion, InfraError> {
    let preview = lock_hourly(state)?.preview_hourly_popup(state.now());
    state.log_info("preview_hourly_popup", &format!("previewed hour={}", preview.hour));
    Ok(preview)
}

pub fn start_pomodoro_impl(
    state: &AppState,
    work_minutes: u32,
    break_minutes: u32,
) -> Result<TimerSnapshot, InfraError> {
    let snapshot = lock_pomodoro(state)?.start(work_minutes, break_minutes, state.now())?;
    state.log_info(
        "start_pomodoro",
        &format!("started work={work_minutes}m break={break_minutes}m"),
    );
    Ok(snapshot)
}

pub fn start_pomodoro_preset_impl(state: &AppState, preset: String) -> Result<TimerSnapshot, InfraError> {
    let preset = preset.trim();
    if preset.is_empty() {
        return Err(InfraError::InvalidConfig("preset must not be empty".to_string()));
    }
    let snapshot = lock_pomodoro(state)?.start_preset(preset, state.now())?;
    state.log_info("start_pomodoro_preset", &format!("started preset={preset}"));
    Ok(snapshot)
}

pub fn list_pomodoro_presets_impl() -> Vec<PomodoroPreset> {
    POMODORO_PRESETS.to_vec()
}

pub fn pause_pomodoro_impl(state: &AppState) -> Result<TimerSnapshot, InfraError> {
    let snapshot = lock_pomodoro(state)?.pause(state.now())?;
    state.log_info(
        "pause_pomodoro",
        &format!("paused with {}s remaining", snapshot.remaining_seconds),
    );
    Ok(snapshot)
}

pub fn resume_pomodoro_impl(state: &AppState) -> Result<TimerSnapshot, InfraError> {
    let snapshot = lock_pomodoro(state)?.resume(state.now())?;
    state.log_info("resume_pomodoro", "resumed paused pomodoro timer");
    Ok(snapshot)
}

pub fn reset_pomodoro_impl(state: &AppState) -> Result<(), InfraError> {
    lock_pomodoro(state)?.reset(state.now())?;
    state.log_info("reset_pomodoro", "cleared pomodoro session");
    Ok(())
}

pub fn complete_pomodoro_impl(state: &AppState) -> Result<CompleteSessionResponse, InfraError> {
    let completed_cycles = lock_pomodoro(state)?.complete_session(state.now())?;
    state.log_info(
        "complete_pomodoro",
        &format!("completed session cycles={completed_cycles}"),
    );
    Ok(CompleteSessionResponse { completed_cycles })
}

pub fn get_pomodoro_state_impl(state: &AppState) -> Result<Option<TimerSnapshot>, InfraError> {
    Ok(lock_pomodoro(state)?.snapshot(state.now()))
}

pub fn get_phase_log_impl(state: &AppState, timer: String) -> Result<Vec<PhaseLogEntry>, InfraError> {
    let now = state.now();
    match parse_timer_name(&timer)? {
        TimerName::Hourly => lock_hourly(state)?.phase_log(now),
        TimerName::Pomodoro => lock_pomodoro(state)?.phase_log(now),
    }
}

pub fn list_pomodoro_sessions_impl(state: &AppState) -> Result<PomodoroSessionsResponse, InfraError> {
    let pomodoro = lock_pomodoro(state)?;
    Ok(PomodoroSessionsResponse {
        recent: pomodoro.recent_sessions()?,
        sessions_today: pomodoro.sessions_today(state.now())?,
    })
}

pub fn get_focus_summary_impl(state: &AppState) -> Result<FocusSummary, InfraError> {
    lock_pomodoro(state)?.focus_summary(state.now())
}

pub fn get_time_counters_impl(state: &AppState) -> TimeCountersResponse {
    let now = state.now();
    let hour = local_hour(now, state.tz);
    TimeCountersResponse {
        hour_label: twelve_hour_label(hour),
        day_progress: day_progress_percent(hour),
        hours_left: hours_left(now, state.tz),
        banner_quote: random_banner_quote(&mut rand::thread_rng()),
    }
}

pub fn list_ai_messages_impl(state: &AppState) -> Result<AiMessagesResponse, InfraError> {
    Ok(AiMessagesResponse {
        messages: state.scheduler.messages()?,
        next_check_in: state.scheduler.next_check_in()?,
        is_generating: state.scheduler.is_generating(),
    })
}

pub fn get_settings_impl(state: &AppState) -> Result<DashboardConfig, InfraError> {
    Ok(lock_config(state)?.clone())
}

pub fn update_profile_settings_impl(
    state: &AppState,
    profile: ProfileSettings,
) -> Result<ProfileSettings, InfraError> {
    save_profile_settings(&state.config_dir, &profile)?;
    if state.scheduler.set_profile(profile.clone()) {
        state.scheduler.spawn_greeting();
    }
    lock_config(state)?.profile = profile.clone();
    state.log_info(
        "update_profile_settings",
        &format!(
            "enabled={} interval={}m",
            profile.enabled, profile.chat_interval_minutes
        ),
    );
    Ok(profile)
}

pub fn update_hourly_settings_impl(
    state: &AppState,
    hourly: HourlyPopupSettings,
) -> Result<HourlyPopupSettings, InfraError> {
    save_hourly_settings(&state.config_dir, &hourly)?;
    lock_hourly(state)?.set_settings(hourly.clone());
    lock_config(state)?.hourly = hourly.clone();
    state.log_info("update_hourly_settings", &format!("enabled={}", hourly.enabled));
    Ok(hourly)
}

pub fn update_sound_settings_impl(
    state: &AppState,
    sound: SoundSettings,
) -> Result<SoundSettings, InfraError> {
    save_sound_settings(&state.config_dir, &sound)?;
    lock_pomodoro(state)?.set_sound(sound.clone());
    lock_config(state)?.sound = sound.clone();
    state.log_info(
        "update_sound_settings",
        &format!("type={}", String::from(sound.sound_type)),
    );
    Ok(sound)
}

/// Stores the generation API key and hands it to the running scheduler.
pub fn save_api_key_impl(state: &AppState, api_key: String) -> Result<(), InfraError> {
    let api_key = api_key.trim();
    if api_key.is_empty() {
        return Err(InfraError::InvalidConfig("api key must not be empty".to_string()));
    }
    state.api_keys.save_key(api_key)?;
    if state.scheduler.set_api_key(Some(api_key.to_string())) {
        state.scheduler.spawn_greeting();
    }
    state.log_info("save_api_key", "stored generation api key");
    Ok(())
}

/// One observation of both timers. Called once a second by the runtime loop.
pub fn tick_timers_impl(state: &AppState) -> TickReport {
    let now = state.now();
    let mut report = TickReport::default();

    let hourly = lock_hourly(state).and_then(|mut hourly| {
        let completion = hourly.tick(now)?;
        let settings = hourly.settings();
        Ok(completion.map(|completion| (completion, settings.use_ai.then_some(settings.quote_style))))
    });
    match hourly {
        Ok(Some((completion, ai_style))) => {
            if let Some(style) = ai_style.filter(|_| completion.quote.is_some()) {
                spawn_popup_quote(state, completion.completed_hours, style);
            }
            report.hour_completed = Some(completion);
        }
        Ok(None) => {}
        Err(error) => report.errors.push(state.command_error("tick_hourly", &error)),
    }

    match lock_pomodoro(state).and_then(|mut pomodoro| pomodoro.tick(now)) {
        Ok(Some(transition)) => {
            state.log_info(
                "tick_timers",
                &format!(
                    "pomodoro {} -> {}",
                    transition.finished.as_str(),
                    transition.next.as_str()
                ),
            );
            report.pomodoro_transition = Some(transition);
        }
        Ok(None) => {}
        Err(error) => report.errors.push(state.command_error("tick_pomodoro", &error)),
    }
    report
}

/// Replaces the static popup quote with a generated one once it arrives. Outside a tokio
/// runtime, or without an API key, the static quote stays.
fn spawn_popup_quote(state: &AppState, completed_hours: u32, style: QuoteStyle) {
    let Ok(runtime) = tokio::runtime::Handle::try_current() else {
        return;
    };
    if !state.scheduler.has_api_key() {
        return;
    }
    let scheduler = state.scheduler();
    let hourly = Arc::clone(&state.hourly);
    runtime.spawn(async move {
        let Some(quote) = scheduler.popup_quote(style).await else {
            return;
        };
        match hourly.lock() {
            Ok(mut hourly) => {
                if !hourly.replace_pending_quote(completed_hours, quote) {
                    debug!("popup for hour {completed_hours} closed before its quote arrived");
                }
            }
            Err(error) => debug!("hourly timer unavailable for popup quote: {error}"),
        }
    });
}

pub fn spawn_ai_scheduler(state: &AppState) -> JoinHandle<()> {
    state.scheduler().spawn(state.hour_signal.subscribe())
}

fn lock_hourly(state: &AppState) -> Result<MutexGuard<'_, HourlyTimer>, InfraError> {
    state
        .hourly
        .lock()
        .map_err(|error| InfraError::InvalidState(format!("hourly timer lock poisoned: {error}")))
}

fn lock_pomodoro(state: &AppState) -> Result<MutexGuard<'_, PomodoroTimer>, InfraError> {
    state
        .pomodoro
        .lock()
        .map_err(|error| InfraError::InvalidState(format!("pomodoro timer lock poisoned: {error}")))
}

fn lock_config(state: &AppState) -> Result<MutexGuard<'_, DashboardConfig>, InfraError> {
    state
        .config
        .lock()
        .map_err(|error| InfraError::InvalidState(format!("config lock poisoned: {error}")))
}

fn parse_timer_name(value: &str) -> Result<TimerName, InfraError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "hourly" => Ok(TimerName::Hourly),
        "pomodoro" => Ok(TimerName::Pomodoro),
        other => Err(InfraError::InvalidConfig(format!("unsupported timer: {other}"))),
    }
}
