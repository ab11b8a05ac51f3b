use crate::application::alerts::{AlertController, RepeatMode, SoundKind, SoundProfile};
use crate::application::phase_timer::{PhaseTimerEngine, PhaseTransition, TimerSnapshot};
use crate::domain::clock::local_day;
use crate::domain::models::{
    find_preset, PhaseKind, PhaseLogEntry, PomodoroSession, SoundSettings, TimerPlan,
};
use crate::infrastructure::daily_log_repository::DailyLogRepository;
use crate::infrastructure::durable_store::{read_json, write_json, SharedStore};
use crate::infrastructure::error::InfraError;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use log::info;
use serde::Serialize;
use std::sync::Arc;

pub const TIMER_KEY: &str = "timer.pomodoro";
pub const LOG_KEY: &str = "log.pomodoro";
pub const SESSIONS_KEY: &str = "pomodoro.sessions";
const MAX_SESSIONS: usize = 100;
const RECENT_SESSIONS: usize = 5;

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct FocusSummary {
    pub completed_work_phases: usize,
    pub completed_break_phases: usize,
    pub total_focus_minutes: u32,
}

impl FocusSummary {
    pub fn from_log(entries: &[PhaseLogEntry]) -> Self {
        entries
            .iter()
            .fold(Self::default(), |mut summary, entry| {
                match entry.phase_kind {
                    PhaseKind::Work => {
                        summary.completed_work_phases += 1;
                        summary.total_focus_minutes += entry.duration_minutes;
                    }
                    PhaseKind::Break => summary.completed_break_phases += 1,
                    PhaseKind::Hour => {}
                }
                summary
            })
    }
}

/// Work/break cycles over the phase engine. A session runs until it is completed or reset.
pub struct PomodoroTimer {
    engine: PhaseTimerEngine,
    store: SharedStore,
    log: DailyLogRepository<PhaseLogEntry>,
    sound: SoundSettings,
    tz: Tz,
    alerts: Arc<AlertController>,
}

impl PomodoroTimer {
    pub fn mount(
        store: SharedStore,
        sound: SoundSettings,
        tz: Tz,
        alerts: Arc<AlertController>,
        now: DateTime<Utc>,
    ) -> Result<Self, InfraError> {
        let engine = PhaseTimerEngine::load(Arc::clone(&store), TIMER_KEY, tz)?;
        alerts.prepare_notifications();
        let mut timer = Self {
            engine,
            log: DailyLogRepository::new(Arc::clone(&store), LOG_KEY),
            store,
            sound,
            tz,
            alerts,
        };
        timer.tick(now)?;
        Ok(timer)
    }

    pub fn snapshot(&self, now: DateTime<Utc>) -> Option<TimerSnapshot> {
        self.engine.snapshot(now)
    }

    /// Takes effect from the next phase switch.
    pub fn set_sound(&mut self, sound: SoundSettings) {
        self.sound = sound;
    }

    pub fn start(
        &mut self,
        work_minutes: u32,
        break_minutes: u32,
        now: DateTime<Utc>,
    ) -> Result<TimerSnapshot, InfraError> {
        self.engine.start(
            TimerPlan::WorkBreak {
                work_minutes,
                break_minutes,
            },
            now,
        )?;
        self.open_session(work_minutes, break_minutes, now)?;
        info!("pomodoro started: {work_minutes}m work / {break_minutes}m break");
        self.current(now)
    }

    pub fn start_preset(&mut self, name: &str, now: DateTime<Utc>) -> Result<TimerSnapshot, InfraError> {
        let preset = find_preset(name)
            .ok_or_else(|| InfraError::InvalidConfig(format!("unknown pomodoro preset: {name}")))?;
        self.start(preset.work_minutes, preset.break_minutes, now)
    }

    pub fn pause(&mut self, now: DateTime<Utc>) -> Result<TimerSnapshot, InfraError> {
        self.tick(now)?;
        self.engine.pause(now)?;
        self.current(now)
    }

    pub fn resume(&mut self, now: DateTime<Utc>) -> Result<TimerSnapshot, InfraError> {
        self.engine.resume(now)?;
        self.current(now)
    }

    /// Abandons the session. It stays in the history with the cycles finished so far.
    pub fn reset(&mut self, now: DateTime<Utc>) -> Result<(), InfraError> {
        self.alerts.stop();
        self.close_session(self.completed_cycles(), now)?;
        self.engine.reset()
    }

    /// Ends the session with the configured cue. Returns the number of finished cycles.
    pub fn complete_session(&mut self, now: DateTime<Utc>) -> Result<u32, InfraError> {
        if self.engine.is_running() {
            self.tick(now)?;
        }
        let cycles = self
            .engine
            .state()
            .map(|state| state.completed_phase_count)
            .ok_or_else(|| InfraError::InvalidState("no pomodoro session to complete".to_string()))?;

        self.alerts.stop();
        self.alerts.play(SoundProfile::once(SoundKind::from_settings(&self.sound)));
        self.alerts.notify(
            "Session Complete!",
            &format!("Great job! You completed {cycles} cycles."),
        );
        self.close_session(cycles, now)?;
        self.engine.reset()?;
        info!("pomodoro session completed after {cycles} cycles");
        Ok(cycles)
    }

    /// Moves past every expired phase. Returns the latest transition, which is the only one
    /// that gets a sound and a notification.
    pub fn tick(&mut self, now: DateTime<Utc>) -> Result<Option<PhaseTransition>, InfraError> {
        let transitions = self.engine.observe(now)?;
        let Some(latest) = transitions.last().cloned() else {
            return Ok(None);
        };
        if transitions.iter().any(|transition| transition.completed_unit) {
            self.record_cycles(latest.completed_phase_count)?;
        }

        let today = local_day(now, self.tz);
        for transition in &transitions {
            if local_day(transition.finished_started_at, self.tz) == today {
                self.log.append(today, transition.log_entry())?;
            }
        }

        self.alerts.play(self.cue());
        match latest.next {
            PhaseKind::Break => self.alerts.notify(
                "Break Time!",
                &format!(
                    "Take a {} minute break. You've earned it!",
                    latest.next_duration_seconds / 60
                ),
            ),
            _ => self.alerts.notify(
                "Back to Work!",
                "Starting your next work session. Keep the momentum going!",
            ),
        }
        Ok(Some(latest))
    }

    pub fn phase_log(&self, now: DateTime<Utc>) -> Result<Vec<PhaseLogEntry>, InfraError> {
        self.log.load_today(local_day(now, self.tz))
    }

    pub fn focus_summary(&self, now: DateTime<Utc>) -> Result<FocusSummary, InfraError> {
        Ok(FocusSummary::from_log(&self.phase_log(now)?))
    }

    /// The last few sessions, oldest first.
    pub fn recent_sessions(&self) -> Result<Vec<PomodoroSession>, InfraError> {
        let sessions = self.sessions()?;
        let skip = sessions.len().saturating_sub(RECENT_SESSIONS);
        Ok(sessions.into_iter().skip(skip).collect())
    }

    /// Sessions started on the current local day, including a running one.
    pub fn sessions_today(&self, now: DateTime<Utc>) -> Result<usize, InfraError> {
        let today = local_day(now, self.tz);
        Ok(self
            .sessions()?
            .iter()
            .filter(|session| local_day(session.started_at, self.tz) == today)
            .count())
    }

    fn sessions(&self) -> Result<Vec<PomodoroSession>, InfraError> {
        Ok(read_json(self.store.as_ref(), SESSIONS_KEY)?.unwrap_or_default())
    }

    fn save_sessions(&self, mut sessions: Vec<PomodoroSession>) -> Result<(), InfraError> {
        let excess = sessions.len().saturating_sub(MAX_SESSIONS);
        sessions.drain(..excess);
        write_json(self.store.as_ref(), SESSIONS_KEY, &sessions)
    }

    fn open_session(
        &self,
        work_minutes: u32,
        break_minutes: u32,
        now: DateTime<Utc>,
    ) -> Result<(), InfraError> {
        let mut sessions = self.sessions()?;
        for stale in sessions.iter_mut().filter(|session| session.is_active) {
            let cycles = stale.completed_cycles;
            stale.close(cycles, now);
        }
        sessions.push(PomodoroSession {
            id: format!("session-{}", now.timestamp_millis()),
            work_minutes,
            break_minutes,
            completed_cycles: 0,
            started_at: now,
            ended_at: None,
            is_active: true,
        });
        self.save_sessions(sessions)
    }

    fn record_cycles(&self, cycles: u32) -> Result<(), InfraError> {
        let mut sessions = self.sessions()?;
        let Some(active) = sessions.iter_mut().rev().find(|session| session.is_active) else {
            return Ok(());
        };
        if active.completed_cycles == cycles {
            return Ok(());
        }
        active.completed_cycles = cycles;
        self.save_sessions(sessions)
    }

    fn close_session(&self, cycles: u32, now: DateTime<Utc>) -> Result<(), InfraError> {
        let mut sessions = self.sessions()?;
        let Some(active) = sessions.iter_mut().rev().find(|session| session.is_active) else {
            return Ok(());
        };
        active.close(cycles, now);
        self.save_sessions(sessions)
    }

    fn completed_cycles(&self) -> u32 {
        self.engine
            .state()
            .map_or(0, |state| state.completed_phase_count)
    }

    fn cue(&self) -> SoundProfile {
        SoundProfile::new(
            SoundKind::from_settings(&self.sound),
            RepeatMode::from(self.sound.duration),
        )
    }

    fn current(&self, now: DateTime<Utc>) -> Result<TimerSnapshot, InfraError> {
        self.engine
            .snapshot(now)
            .ok_or_else(|| InfraError::InvalidState("pomodoro timer has no session".to_string()))
    }
}
