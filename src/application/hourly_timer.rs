use crate::application::alerts::{AlertController, RepeatMode, SoundKind, SoundProfile};
use crate::application::phase_timer::{PhaseTimerEngine, TimerSnapshot};
use crate::domain::clock::{day_progress_percent, hours_left_today, local_day, local_hour};
use crate::domain::models::{HourlyPopupSettings, PhaseLogEntry, TimerPlan};
use crate::domain::quotes::{select_quote, QuoteContext};
use crate::infrastructure::daily_log_repository::DailyLogRepository;
use crate::infrastructure::durable_store::SharedStore;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::hour_signal::HourSignal;
use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use log::info;
use serde::Serialize;
use std::sync::Arc;

pub const TIMER_KEY: &str = "timer.hourly";
pub const LOG_KEY: &str = "log.hourly";
pub const TRACKED_HOURS_KEY: &str = "hourly.tracked_hours";

const HOUR_COMPLETE_TITLE: &str = "Hour Complete!";
const HOUR_COMPLETE_BODY: &str = "Time for a new hour of focused work. What will you accomplish?";

/// Popup content shown when an hour ends.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct HourCompletion {
    pub hour: u32,
    pub completed_hours: u32,
    pub hours_left_today: Option<i64>,
    pub day_progress: Option<u8>,
    pub quote: Option<String>,
}

pub struct HourlyTimer {
    engine: PhaseTimerEngine,
    log: DailyLogRepository<PhaseLogEntry>,
    tracked_hours: DailyLogRepository<u32>,
    settings: HourlyPopupSettings,
    tz: Tz,
    alerts: Arc<AlertController>,
    signal: HourSignal,
    pending: Option<HourCompletion>,
    last_tracked: Option<(NaiveDate, u32)>,
}

impl HourlyTimer {
    /// Loads the persisted hour anchor, starting one when none is running, and replays any
    /// boundary that passed while nothing was observing.
    pub fn mount(
        store: SharedStore,
        settings: HourlyPopupSettings,
        tz: Tz,
        alerts: Arc<AlertController>,
        signal: HourSignal,
        now: DateTime<Utc>,
    ) -> Result<Self, InfraError> {
        let mut engine = PhaseTimerEngine::load(Arc::clone(&store), TIMER_KEY, tz)?;
        let resumable = engine.is_running()
            && engine
                .state()
                .is_some_and(|state| state.plan == TimerPlan::Hourly);
        if !resumable {
            engine.reset()?;
            engine.start(TimerPlan::Hourly, now)?;
        }

        let mut timer = Self {
            engine,
            log: DailyLogRepository::new(Arc::clone(&store), LOG_KEY),
            tracked_hours: DailyLogRepository::new(store, TRACKED_HOURS_KEY),
            settings,
            tz,
            alerts,
            signal,
            pending: None,
            last_tracked: None,
        };
        timer.tick(now)?;
        Ok(timer)
    }

    pub fn settings(&self) -> &HourlyPopupSettings {
        &self.settings
    }

    pub fn set_settings(&mut self, settings: HourlyPopupSettings) {
        self.settings = settings;
    }

    pub fn pending_popup(&self) -> Option<&HourCompletion> {
        self.pending.as_ref()
    }

    pub fn snapshot(&self, now: DateTime<Utc>) -> Option<TimerSnapshot> {
        self.engine.snapshot(now)
    }

    /// Returns popup content when an hour ended since the last observation, or `None` when
    /// nothing changed or popups are disabled.
    pub fn tick(&mut self, now: DateTime<Utc>) -> Result<Option<HourCompletion>, InfraError> {
        self.record_tracked_hour(now)?;
        let transitions = self.engine.observe(now)?;
        let Some(latest) = transitions.last() else {
            return Ok(None);
        };

        let today = local_day(now, self.tz);
        for transition in &transitions {
            if local_day(transition.finished_started_at, self.tz) == today {
                self.log.append(today, transition.log_entry())?;
            }
        }
        if transitions.len() > 1 {
            info!("hourly timer caught up {} hours", transitions.len());
        }

        let completion = if self.settings.enabled {
            self.alerts.play(SoundProfile::new(
                SoundKind::HourChime,
                RepeatMode::from(self.settings.alarm_duration),
            ));
            self.alerts.notify(HOUR_COMPLETE_TITLE, HOUR_COMPLETE_BODY);
            Some(self.completion(now, latest.completed_phase_count))
        } else {
            None
        };
        self.signal.raise(latest.boundary);

        if completion.is_some() {
            self.pending = completion.clone();
        }
        Ok(completion)
    }

    /// Swaps in a generated quote while the popup for `completed_hours` is still pending
    /// and shows a quote. Returns whether it was applied.
    pub fn replace_pending_quote(&mut self, completed_hours: u32, quote: String) -> bool {
        match self.pending.as_mut() {
            Some(pending) if pending.completed_hours == completed_hours && pending.quote.is_some() => {
                pending.quote = Some(quote);
                true
            }
            _ => false,
        }
    }

    pub fn dismiss_alarm(&mut self) -> Option<HourCompletion> {
        self.alerts.stop();
        self.pending.take()
    }

    /// Popup content for the current moment with the short preview chime. Timer state is
    /// left untouched.
    pub fn preview_hourly_popup(&self, now: DateTime<Utc>) -> HourCompletion {
        self.alerts.play(SoundProfile::once(SoundKind::PreviewChime));
        let completed = self
            .engine
            .state()
            .map_or(0, |state| state.completed_phase_count);
        self.completion(now, completed)
    }

    pub fn hours_active_today(&self, now: DateTime<Utc>) -> Result<usize, InfraError> {
        Ok(self.tracked_hours.load_today(local_day(now, self.tz))?.len())
    }

    pub fn phase_log(&self, now: DateTime<Utc>) -> Result<Vec<PhaseLogEntry>, InfraError> {
        self.log.load_today(local_day(now, self.tz))
    }

    fn completion(&self, now: DateTime<Utc>, completed_hours: u32) -> HourCompletion {
        let hour = local_hour(now, self.tz);
        let settings = &self.settings;
        HourCompletion {
            hour,
            completed_hours,
            hours_left_today: settings
                .show_hours_left
                .then(|| hours_left_today(now, self.tz)),
            day_progress: settings
                .show_day_progress
                .then(|| day_progress_percent(hour)),
            quote: settings.show_quote.then(|| {
                select_quote(
                    settings.quote_style,
                    QuoteContext::at_hour(hour),
                    &mut rand::thread_rng(),
                )
            }),
        }
    }

    fn record_tracked_hour(&mut self, now: DateTime<Utc>) -> Result<(), InfraError> {
        let marker = (local_day(now, self.tz), local_hour(now, self.tz));
        if self.last_tracked == Some(marker) {
            return Ok(());
        }
        let (today, hour) = marker;
        let hours = self.tracked_hours.load_today(today)?;
        if !hours.contains(&hour) {
            self.tracked_hours.append(today, hour)?;
        }
        self.last_tracked = Some(marker);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::alerts::testing::{controller, RecordingAudio, RecordingNotifications};
    use crate::domain::models::{NotificationPermission, PhaseKind, SoundDuration};
    use crate::infrastructure::durable_store::{DurableStore, InMemoryDurableStore};
    use tokio::sync::broadcast::error::TryRecvError;

    fn fixed_time(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value)
            .expect("valid datetime")
            .with_timezone(&Utc)
    }

    struct Harness {
        store: Arc<InMemoryDurableStore>,
        audio: Arc<RecordingAudio>,
        notifications: Arc<RecordingNotifications>,
        alerts: Arc<AlertController>,
        signal: HourSignal,
    }

    impl Harness {
        fn new() -> Self {
            let audio = Arc::new(RecordingAudio::default());
            let notifications = Arc::new(RecordingNotifications::with_permission(
                NotificationPermission::Granted,
            ));
            Self {
                store: Arc::new(InMemoryDurableStore::default()),
                alerts: Arc::new(controller(Arc::clone(&audio), Arc::clone(&notifications))),
                audio,
                notifications,
                signal: HourSignal::new(),
            }
        }

        fn mount(&self, settings: HourlyPopupSettings, now: &str) -> HourlyTimer {
            HourlyTimer::mount(
                self.store.clone(),
                settings,
                Tz::UTC,
                Arc::clone(&self.alerts),
                self.signal.clone(),
                fixed_time(now),
            )
            .expect("mount")
        }
    }

    #[tokio::test]
    async fn first_hour_runs_to_the_wall_clock_boundary() {
        let harness = Harness::new();
        let mut timer = harness.mount(HourlyPopupSettings::default(), "2026-02-16T10:15:30Z");

        let first = timer.snapshot(fixed_time("2026-02-16T10:15:30Z")).expect("snapshot");
        assert_eq!(first.phase_duration_seconds, 2_670);
        assert_eq!(first.remaining_seconds, 2_670);
        assert!(timer.pending_popup().is_none());

        let completion = timer
            .tick(fixed_time("2026-02-16T11:00:00Z"))
            .expect("tick")
            .expect("hour completed");
        assert_eq!(completion.hour, 11);
        assert_eq!(completion.completed_hours, 1);
        assert_eq!(completion.day_progress, Some(46));
        assert_eq!(completion.hours_left_today, Some(13));
        assert!(completion.quote.is_some());

        let second = timer.snapshot(fixed_time("2026-02-16T11:00:00Z")).expect("snapshot");
        assert_eq!(second.phase_duration_seconds, 3_600);

        let log = timer.phase_log(fixed_time("2026-02-16T11:00:00Z")).expect("log");
        assert_eq!(
            log,
            vec![PhaseLogEntry {
                phase_kind: PhaseKind::Hour,
                started_at: fixed_time("2026-02-16T10:15:30Z"),
                duration_minutes: 45,
            }]
        );
        assert_eq!(timer.hours_active_today(fixed_time("2026-02-16T11:00:00Z")).expect("hours"), 2);
        assert_eq!(harness.notifications.titles(), vec![HOUR_COMPLETE_TITLE.to_string()]);
        assert!(harness.alerts.is_playing());
    }

    #[tokio::test]
    async fn reload_after_missed_hours_fires_side_effects_once() {
        let harness = Harness::new();
        let mut listener = harness.signal.subscribe();
        drop(harness.mount(HourlyPopupSettings::default(), "2026-02-16T10:15:00Z"));

        let timer = harness.mount(HourlyPopupSettings::default(), "2026-02-16T13:20:00Z");

        let popup = timer.pending_popup().expect("synthesized completion");
        assert_eq!(popup.completed_hours, 3);
        assert_eq!(popup.hour, 13);
        let log = timer.phase_log(fixed_time("2026-02-16T13:20:00Z")).expect("log");
        assert_eq!(log.len(), 3);
        assert_eq!(log[2].started_at, fixed_time("2026-02-16T12:00:00Z"));
        assert_eq!(harness.notifications.titles().len(), 1);

        let signal = listener.try_recv().expect("one hour signal");
        assert_eq!(signal.at, fixed_time("2026-02-16T13:00:00Z"));
        assert!(matches!(listener.try_recv(), Err(TryRecvError::Empty)));

        let remaining = timer.snapshot(fixed_time("2026-02-16T13:20:00Z")).expect("snapshot");
        assert_eq!(remaining.remaining_seconds, 40 * 60);
    }

    #[tokio::test]
    async fn hours_started_yesterday_are_not_logged_today() {
        let harness = Harness::new();
        drop(harness.mount(HourlyPopupSettings::default(), "2026-02-16T23:30:00Z"));

        let timer = harness.mount(HourlyPopupSettings::default(), "2026-02-17T01:10:00Z");

        let log = timer.phase_log(fixed_time("2026-02-17T01:10:00Z")).expect("log");
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].started_at, fixed_time("2026-02-17T00:00:00Z"));
        assert_eq!(timer.hours_active_today(fixed_time("2026-02-17T01:10:00Z")).expect("hours"), 1);
    }

    #[tokio::test]
    async fn disabled_popup_still_logs_and_signals() {
        let harness = Harness::new();
        let mut listener = harness.signal.subscribe();
        let settings = HourlyPopupSettings {
            enabled: false,
            ..HourlyPopupSettings::default()
        };
        let mut timer = harness.mount(settings, "2026-02-16T09:59:00Z");

        let completion = timer.tick(fixed_time("2026-02-16T10:00:05Z")).expect("tick");
        tokio::task::yield_now().await;

        assert!(completion.is_none());
        assert!(timer.pending_popup().is_none());
        assert_eq!(timer.phase_log(fixed_time("2026-02-16T10:00:05Z")).expect("log").len(), 1);
        assert!(listener.try_recv().is_ok());
        assert!(harness.notifications.titles().is_empty());
        assert_eq!(harness.audio.tone_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn dismissing_stops_the_alarm_and_clears_the_popup() {
        let harness = Harness::new();
        let settings = HourlyPopupSettings {
            alarm_duration: SoundDuration::Loop,
            show_quote: false,
            show_hours_left: false,
            ..HourlyPopupSettings::default()
        };
        let mut timer = harness.mount(settings, "2026-02-16T09:59:00Z");
        let completion = timer
            .tick(fixed_time("2026-02-16T10:00:00Z"))
            .expect("tick")
            .expect("completion");
        assert_eq!(completion.quote, None);
        assert_eq!(completion.hours_left_today, None);
        tokio::task::yield_now().await;
        assert!(harness.alerts.is_playing());

        let dismissed = timer.dismiss_alarm();
        assert_eq!(dismissed, Some(completion));
        assert!(!harness.alerts.is_playing());
        assert!(timer.pending_popup().is_none());
        assert!(timer.dismiss_alarm().is_none());
    }

    #[tokio::test]
    async fn generated_quote_only_replaces_the_matching_popup() {
        let harness = Harness::new();
        let mut timer = harness.mount(HourlyPopupSettings::default(), "2026-02-16T09:59:00Z");
        assert!(!timer.replace_pending_quote(1, "too early".to_string()));

        let completion = timer
            .tick(fixed_time("2026-02-16T10:00:00Z"))
            .expect("tick")
            .expect("completion");
        assert!(!timer.replace_pending_quote(2, "wrong hour".to_string()));
        assert!(timer.replace_pending_quote(
            completion.completed_hours,
            "Fourteen hours to go, make this one count.".to_string()
        ));
        assert_eq!(
            timer.pending_popup().and_then(|popup| popup.quote.as_deref()),
            Some("Fourteen hours to go, make this one count.")
        );

        timer.dismiss_alarm();
        assert!(!timer.replace_pending_quote(completion.completed_hours, "late".to_string()));
    }

    #[tokio::test]
    async fn preview_plays_chime_without_touching_the_timer() {
        let harness = Harness::new();
        let timer = harness.mount(HourlyPopupSettings::default(), "2026-02-16T14:10:00Z");
        let before = harness.store.get(TIMER_KEY).expect("get");

        let preview = timer.preview_hourly_popup(fixed_time("2026-02-16T14:12:00Z"));
        tokio::task::yield_now().await;

        assert_eq!(preview.hour, 14);
        assert_eq!(preview.completed_hours, 0);
        assert_eq!(harness.audio.tone_count(), 3);
        assert_eq!(harness.store.get(TIMER_KEY).expect("get"), before);
        assert!(timer.pending_popup().is_none());
    }

    #[tokio::test]
    async fn work_break_record_is_replaced_on_mount() {
        let harness = Harness::new();
        let mut engine =
            PhaseTimerEngine::load(harness.store.clone(), TIMER_KEY, Tz::UTC).expect("load");
        engine
            .start(
                TimerPlan::WorkBreak {
                    work_minutes: 25,
                    break_minutes: 5,
                },
                fixed_time("2026-02-16T08:00:00Z"),
            )
            .expect("start");

        let timer = harness.mount(HourlyPopupSettings::default(), "2026-02-16T08:30:00Z");
        let snapshot = timer.snapshot(fixed_time("2026-02-16T08:30:00Z")).expect("snapshot");
        assert_eq!(snapshot.plan, TimerPlan::Hourly);
        assert_eq!(snapshot.remaining_seconds, 30 * 60);
        assert!(timer.pending_popup().is_none());
    }
}
