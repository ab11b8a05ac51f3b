//! Line-delimited JSON command surface. Each request line names a command and its
//! arguments, e.g. `{"command":"start_pomodoro","workMinutes":25,"breakMinutes":5}`, and
//! gets exactly one response line back.

use crate::application::commands::{
    complete_pomodoro_impl, dismiss_hourly_alarm_impl, get_focus_summary_impl,
    get_hourly_state_impl, get_phase_log_impl, get_pomodoro_state_impl, get_settings_impl,
    get_time_counters_impl, list_ai_messages_impl, list_pomodoro_presets_impl,
    list_pomodoro_sessions_impl, pause_pomodoro_impl, preview_hourly_popup_impl,
    reset_pomodoro_impl, resume_pomodoro_impl, save_api_key_impl, start_pomodoro_impl,
    start_pomodoro_preset_impl, stop_alerts_impl, update_hourly_settings_impl,
    update_profile_settings_impl, update_sound_settings_impl, AppState,
};
use crate::domain::models::{HourlyPopupSettings, ProfileSettings, SoundSettings};
use crate::infrastructure::error::InfraError;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(tag = "command", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum Invocation {
    Ping,
    GetHourlyState,
    DismissHourlyAlarm,
    PreviewHourlyPopup,
    StopAlerts,
    StartPomodoro { work_minutes: u32, break_minutes: u32 },
    StartPomodoroPreset { preset: String },
    ListPomodoroPresets,
    PausePomodoro,
    ResumePomodoro,
    ResetPomodoro,
    CompletePomodoro,
    GetPomodoroState,
    GetPhaseLog { timer: String },
    ListPomodoroSessions,
    GetFocusSummary,
    GetTimeCounters,
    ListAiMessages,
    GetSettings,
    UpdateProfileSettings { profile: ProfileSettings },
    UpdateHourlySettings { hourly: HourlyPopupSettings },
    UpdateSoundSettings { sound: SoundSettings },
    SaveApiKey { api_key: String },
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct InvokeResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<Result<Value, String>> for InvokeResponse {
    fn from(result: Result<Value, String>) -> Self {
        match result {
            Ok(data) => Self { ok: true, data: Some(data), error: None },
            Err(error) => Self { ok: false, data: None, error: Some(error) },
        }
    }
}

fn reply<T: Serialize>(
    state: &AppState,
    command: &str,
    result: Result<T, InfraError>,
) -> Result<Value, String> {
    result
        .and_then(|value| Ok(serde_json::to_value(value)?))
        .map_err(|error| state.command_error(command, &error))
}

pub fn invoke(state: &AppState, invocation: Invocation) -> Result<Value, String> {
    match invocation {
        Invocation::Ping => Ok(Value::from("pong")),
        Invocation::GetHourlyState => reply(state, "get_hourly_state", get_hourly_state_impl(state)),
        Invocation::DismissHourlyAlarm => {
            reply(state, "dismiss_hourly_alarm", dismiss_hourly_alarm_impl(state))
        }
        Invocation::PreviewHourlyPopup => {
            reply(state, "preview_hourly_popup", preview_hourly_popup_impl(state))
        }
        Invocation::StopAlerts => reply(state, "stop_alerts", Ok(stop_alerts_impl(state))),
        Invocation::StartPomodoro { work_minutes, break_minutes } => reply(
            state,
            "start_pomodoro",
            start_pomodoro_impl(state, work_minutes, break_minutes),
        ),
        Invocation::StartPomodoroPreset { preset } => reply(
            state,
            "start_pomodoro_preset",
            start_pomodoro_preset_impl(state, preset),
        ),
        Invocation::ListPomodoroPresets => {
            reply(state, "list_pomodoro_presets", Ok(list_pomodoro_presets_impl()))
        }
        Invocation::PausePomodoro => reply(state, "pause_pomodoro", pause_pomodoro_impl(state)),
        Invocation::ResumePomodoro => reply(state, "resume_pomodoro", resume_pomodoro_impl(state)),
        Invocation::ResetPomodoro => reply(state, "reset_pomodoro", reset_pomodoro_impl(state)),
        Invocation::CompletePomodoro => {
            reply(state, "complete_pomodoro", complete_pomodoro_impl(state))
        }
        Invocation::GetPomodoroState => {
            reply(state, "get_pomodoro_state", get_pomodoro_state_impl(state))
        }
        Invocation::GetPhaseLog { timer } => {
            reply(state, "get_phase_log", get_phase_log_impl(state, timer))
        }
        Invocation::ListPomodoroSessions => {
            reply(state, "list_pomodoro_sessions", list_pomodoro_sessions_impl(state))
        }
        Invocation::GetFocusSummary => reply(state, "get_focus_summary", get_focus_summary_impl(state)),
        Invocation::GetTimeCounters => {
            reply(state, "get_time_counters", Ok(get_time_counters_impl(state)))
        }
        Invocation::ListAiMessages => reply(state, "list_ai_messages", list_ai_messages_impl(state)),
        Invocation::GetSettings => reply(state, "get_settings", get_settings_impl(state)),
        Invocation::UpdateProfileSettings { profile } => reply(
            state,
            "update_profile_settings",
            update_profile_settings_impl(state, profile),
        ),
        Invocation::UpdateHourlySettings { hourly } => reply(
            state,
            "update_hourly_settings",
            update_hourly_settings_impl(state, hourly),
        ),
        Invocation::UpdateSoundSettings { sound } => reply(
            state,
            "update_sound_settings",
            update_sound_settings_impl(state, sound),
        ),
        Invocation::SaveApiKey { api_key } => {
            reply(state, "save_api_key", save_api_key_impl(state, api_key))
        }
    }
}

/// Handles one request line. Blank lines get no response.
pub fn handle_line(state: &AppState, line: &str) -> Option<InvokeResponse> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let result = serde_json::from_str::<Invocation>(line)
        .map_err(|error| format!("invalid command: {error}"))
        .and_then(|invocation| {
            debug!("invoking {invocation:?}");
            invoke(state, invocation)
        });
    Some(InvokeResponse::from(result))
}

/// Serves requests until `reader` reaches end of input.
pub async fn serve_lines<R, W>(state: &AppState, reader: R, mut writer: W) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();
    while let Some(line) = lines.next_line().await? {
        let Some(response) = handle_line(state, &line) else {
            continue;
        };
        if let Some(error) = &response.error {
            warn!("command failed: {error}");
        }
        let mut encoded = serde_json::to_vec(&response)?;
        encoded.push(b'\n');
        writer.write_all(&encoded).await?;
        writer.flush().await?;
    }
    Ok(())
}
