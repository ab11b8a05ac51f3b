use crate::domain::clock::{seconds_until_next_hour, SECONDS_PER_HOUR};
use crate::domain::quotes::QuoteStyle;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

pub const MAX_PHASE_MINUTES: u32 = 180;
pub const MAX_CHAT_INTERVAL_MINUTES: u32 = 24 * 60;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PhaseKind {
    Hour,
    Work,
    Break,
}

impl PhaseKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hour => "hour",
            Self::Work => "work",
            Self::Break => "break",
        }
    }
}

/// How a timer session cycles through its phases.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TimerPlan {
    Hourly,
    WorkBreak { work_minutes: u32, break_minutes: u32 },
}

impl TimerPlan {
    pub fn validate(&self) -> Result<(), String> {
        if let Self::WorkBreak {
            work_minutes,
            break_minutes,
        } = self
        {
            validate_minutes(*work_minutes, "plan.work_minutes")?;
            validate_minutes(*break_minutes, "plan.break_minutes")?;
        }
        Ok(())
    }

    pub fn first_phase(&self, starts_at: DateTime<Utc>, tz: Tz) -> (PhaseKind, u32) {
        match self {
            Self::Hourly => (PhaseKind::Hour, seconds_until_next_hour(starts_at, tz)),
            Self::WorkBreak { work_minutes, .. } => (PhaseKind::Work, work_minutes * 60),
        }
    }

    /// Phase that follows `finished`, starting at `boundary`.
    pub fn next_phase(&self, finished: PhaseKind, boundary: DateTime<Utc>, tz: Tz) -> (PhaseKind, u32) {
        match self {
            Self::Hourly => (PhaseKind::Hour, seconds_until_next_hour(boundary, tz)),
            Self::WorkBreak {
                work_minutes,
                break_minutes,
            } => match finished {
                PhaseKind::Work => (PhaseKind::Break, break_minutes * 60),
                PhaseKind::Break | PhaseKind::Hour => (PhaseKind::Work, work_minutes * 60),
            },
        }
    }

    /// Whether finishing `finished` completes a counted unit (an hour, or a full work/break cycle).
    pub fn completes_unit(&self, finished: PhaseKind) -> bool {
        match self {
            Self::Hourly => true,
            Self::WorkBreak { .. } => finished == PhaseKind::Break,
        }
    }

    pub fn phase_seconds(&self, phase: PhaseKind) -> u32 {
        match (self, phase) {
            (Self::WorkBreak { work_minutes, .. }, PhaseKind::Work) => work_minutes * 60,
            (Self::WorkBreak { break_minutes, .. }, PhaseKind::Break) => break_minutes * 60,
            _ => SECONDS_PER_HOUR,
        }
    }
}

/// Persisted as one record per timer instance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PhaseTimerState {
    pub plan: TimerPlan,
    pub phase: PhaseKind,
    pub phase_duration_seconds: u32,
    pub phase_started_at: DateTime<Utc>,
    pub is_running: bool,
    pub paused_remaining_seconds: Option<u32>,
    pub completed_phase_count: u32,
    pub session_started_at: DateTime<Utc>,
}

impl PhaseTimerState {
    pub fn phase_ends_at(&self) -> DateTime<Utc> {
        self.phase_started_at + Duration::seconds(i64::from(self.phase_duration_seconds))
    }

    pub fn validate(&self) -> Result<(), String> {
        self.plan.validate()?;
        if self.phase_duration_seconds == 0 {
            return Err("timer.phase_duration_seconds must be > 0".to_string());
        }
        if self.is_running && self.paused_remaining_seconds.is_some() {
            return Err("timer cannot be running and paused at once".to_string());
        }
        if let Some(remaining) = self.paused_remaining_seconds {
            if remaining > self.phase_duration_seconds {
                return Err("timer.paused_remaining_seconds exceeds phase duration".to_string());
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PhaseLogEntry {
    pub phase_kind: PhaseKind,
    pub started_at: DateTime<Utc>,
    pub duration_minutes: u32,
}

/// Collection scoped to one local calendar day.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DailyLog<T> {
    pub day: NaiveDate,
    pub entries: Vec<T>,
}

impl<T> DailyLog<T> {
    pub fn empty(day: NaiveDate) -> Self {
        Self {
            day,
            entries: Vec::new(),
        }
    }

    pub fn is_for(&self, day: NaiveDate) -> bool {
        self.day == day
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AiMessageKind {
    Greeting,
    Hourly,
    Interval,
}

impl AiMessageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Greeting => "greeting",
            Self::Hourly => "hourly",
            Self::Interval => "interval",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MessageSource {
    Generated,
    Fallback,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AiMessage {
    pub id: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub kind: AiMessageKind,
    pub source: MessageSource,
}

/// A work/break session from its start until it is completed or reset.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PomodoroSession {
    pub id: String,
    pub work_minutes: u32,
    pub break_minutes: u32,
    pub completed_cycles: u32,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub is_active: bool,
}

impl PomodoroSession {
    pub fn close(&mut self, completed_cycles: u32, now: DateTime<Utc>) {
        self.completed_cycles = completed_cycles;
        self.ended_at = Some(now);
        self.is_active = false;
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AiChatCadence {
    pub last_greeting_at: Option<DateTime<Utc>>,
    pub last_interval_message_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct ProfileSettings {
    pub enabled: bool,
    pub nickname: String,
    pub weekly_goals: String,
    pub daily_focus: String,
    pub chat_interval_minutes: u32,
}

impl Default for ProfileSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            nickname: String::new(),
            weekly_goals: String::new(),
            daily_focus: String::new(),
            chat_interval_minutes: 30,
        }
    }
}

impl ProfileSettings {
    pub fn validate(&self) -> Result<(), String> {
        if self.chat_interval_minutes > MAX_CHAT_INTERVAL_MINUTES {
            return Err(format!(
                "profile.chatIntervalMinutes must be <= {MAX_CHAT_INTERVAL_MINUTES}"
            ));
        }
        validate_max_len(&self.nickname, 64, "profile.nickname")?;
        validate_max_len(&self.weekly_goals, 2_000, "profile.weeklyGoals")?;
        validate_max_len(&self.daily_focus, 2_000, "profile.dailyFocus")?;
        Ok(())
    }
}

/// `single`, `loop`, or a number of seconds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(from = "String", into = "String")]
pub enum SoundDuration {
    #[default]
    Single,
    Loop,
    Seconds(u32),
}

impl From<String> for SoundDuration {
    fn from(value: String) -> Self {
        match value.trim() {
            "loop" => Self::Loop,
            other => match other.parse::<u32>() {
                Ok(seconds) if seconds > 0 => Self::Seconds(seconds),
                _ => Self::Single,
            },
        }
    }
}

impl From<SoundDuration> for String {
    fn from(value: SoundDuration) -> Self {
        match value {
            SoundDuration::Single => "single".to_string(),
            SoundDuration::Loop => "loop".to_string(),
            SoundDuration::Seconds(seconds) => seconds.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(from = "String", into = "String")]
pub enum SoundType {
    #[default]
    Pling,
    Bleep,
    Alarm,
    Custom,
}

impl From<String> for SoundType {
    fn from(value: String) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "bleep" => Self::Bleep,
            "alarm" => Self::Alarm,
            "custom" => Self::Custom,
            _ => Self::Pling,
        }
    }
}

impl From<SoundType> for String {
    fn from(value: SoundType) -> Self {
        match value {
            SoundType::Pling => "pling",
            SoundType::Bleep => "bleep",
            SoundType::Alarm => "alarm",
            SoundType::Custom => "custom",
        }
        .to_string()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum NotificationPermission {
    #[default]
    Default,
    Granted,
    Denied,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct SoundSettings {
    #[serde(rename = "type")]
    pub sound_type: SoundType,
    pub duration: SoundDuration,
    pub custom_sound_path: Option<String>,
    pub notification_permission: NotificationPermission,
}

impl Default for SoundSettings {
    fn default() -> Self {
        Self {
            sound_type: SoundType::Pling,
            duration: SoundDuration::Single,
            custom_sound_path: None,
            notification_permission: NotificationPermission::Default,
        }
    }
}

impl SoundSettings {
    pub fn validate(&self) -> Result<(), String> {
        if self.sound_type == SoundType::Custom {
            let path = self.custom_sound_path.as_deref().map(str::trim).unwrap_or_default();
            validate_non_empty(path, "sound.customSoundPath")?;
        }
        if let SoundDuration::Seconds(seconds) = self.duration {
            if seconds > 600 {
                return Err("sound.duration must be <= 600 seconds".to_string());
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct HourlyPopupSettings {
    pub enabled: bool,
    pub show_hours_left: bool,
    pub show_day_progress: bool,
    pub show_quote: bool,
    pub quote_style: QuoteStyle,
    pub alarm_duration: SoundDuration,
    /// Ask the generation endpoint for the popup quote when an API key is available.
    pub use_ai: bool,
}

impl Default for HourlyPopupSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            show_hours_left: true,
            show_day_progress: true,
            show_quote: true,
            quote_style: QuoteStyle::Motivational,
            alarm_duration: SoundDuration::Seconds(30),
            use_ai: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct PomodoroPreset {
    pub name: &'static str,
    pub work_minutes: u32,
    pub break_minutes: u32,
}

pub const POMODORO_PRESETS: &[PomodoroPreset] = &[
    PomodoroPreset {
        name: "Classic",
        work_minutes: 25,
        break_minutes: 5,
    },
    PomodoroPreset {
        name: "Power Sprint",
        work_minutes: 5,
        break_minutes: 15,
    },
    PomodoroPreset {
        name: "Flow State",
        work_minutes: 5,
        break_minutes: 20,
    },
    PomodoroPreset {
        name: "Deep Dive",
        work_minutes: 5,
        break_minutes: 25,
    },
];

pub fn find_preset(name: &str) -> Option<PomodoroPreset> {
    let name = name.trim();
    POMODORO_PRESETS
        .iter()
        .copied()
        .find(|preset| preset.name.eq_ignore_ascii_case(name))
}

fn validate_minutes(value: u32, field: &str) -> Result<(), String> {
    if value == 0 || value > MAX_PHASE_MINUTES {
        return Err(format!("{field} must be between 1 and {MAX_PHASE_MINUTES}"));
    }
    Ok(())
}

fn validate_non_empty(value: &str, field: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{field} must not be empty"));
    }
    Ok(())
}

fn validate_max_len(value: &str, max: usize, field: &str) -> Result<(), String> {
    if value.chars().count() > max {
        return Err(format!("{field} must be at most {max} characters"));
    }
    Ok(())
}
