use crate::domain::models::{PhaseKind, PhaseLogEntry, PhaseTimerState, TimerPlan};
use crate::infrastructure::durable_store::{read_json, write_json, SharedStore};
use crate::infrastructure::error::InfraError;
use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use log::{debug, warn};
use serde::Serialize;

/// Upper bound on boundaries replayed by one observation.
pub const MAX_CATCH_UP_TRANSITIONS: usize = 10_000;

/// Whole seconds left in a phase started at `started_at`. Never negative; a clock that
/// moved backwards counts as no time elapsed.
pub fn recompute_remaining(started_at: DateTime<Utc>, duration_seconds: u32, now: DateTime<Utc>) -> u32 {
    let elapsed = (now - started_at).num_seconds().max(0);
    let elapsed = u32::try_from(elapsed).unwrap_or(u32::MAX);
    duration_seconds.saturating_sub(elapsed)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseTransition {
    pub finished: PhaseKind,
    pub finished_started_at: DateTime<Utc>,
    pub finished_duration_seconds: u32,
    pub boundary: DateTime<Utc>,
    pub next: PhaseKind,
    pub next_duration_seconds: u32,
    pub completed_unit: bool,
    pub completed_phase_count: u32,
}

impl PhaseTransition {
    /// Log record for the phase this transition finished.
    pub fn log_entry(&self) -> PhaseLogEntry {
        PhaseLogEntry {
            phase_kind: self.finished,
            started_at: self.finished_started_at,
            duration_minutes: self.finished_duration_seconds.div_ceil(60),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TimerSnapshot {
    pub plan: TimerPlan,
    pub phase: PhaseKind,
    pub remaining_seconds: u32,
    pub phase_duration_seconds: u32,
    pub is_running: bool,
    pub is_paused: bool,
    pub completed_phase_count: u32,
    pub phase_started_at: DateTime<Utc>,
    pub session_started_at: DateTime<Utc>,
}

/// Countdown anchored to absolute time and persisted as one record under `key`.
/// Remaining time is always derived from the anchor, so the engine can be dropped and
/// reloaded at any point without losing or repeating a boundary.
pub struct PhaseTimerEngine {
    key: String,
    store: SharedStore,
    tz: Tz,
    state: Option<PhaseTimerState>,
}

impl PhaseTimerEngine {
    pub fn load(store: SharedStore, key: impl Into<String>, tz: Tz) -> Result<Self, InfraError> {
        let key = key.into();
        let state = match read_json::<PhaseTimerState>(store.as_ref(), &key)? {
            Some(state) => match state.validate() {
                Ok(()) => Some(state),
                Err(reason) => {
                    warn!("ignoring stored timer {key}: {reason}");
                    None
                }
            },
            None => None,
        };
        Ok(Self {
            key,
            store,
            tz,
            state,
        })
    }

    pub fn state(&self) -> Option<&PhaseTimerState> {
        self.state.as_ref()
    }

    pub fn is_running(&self) -> bool {
        self.state.as_ref().is_some_and(|state| state.is_running)
    }

    pub fn is_paused(&self) -> bool {
        self.state
            .as_ref()
            .is_some_and(|state| !state.is_running && state.paused_remaining_seconds.is_some())
    }

    pub fn start(&mut self, plan: TimerPlan, now: DateTime<Utc>) -> Result<&PhaseTimerState, InfraError> {
        if self.is_running() {
            return Err(InfraError::InvalidState(format!("{} is already running", self.key)));
        }
        plan.validate().map_err(InfraError::InvalidConfig)?;

        let (phase, duration) = plan.first_phase(now, self.tz);
        let state = PhaseTimerState {
            plan,
            phase,
            phase_duration_seconds: duration,
            phase_started_at: now,
            is_running: true,
            paused_remaining_seconds: None,
            completed_phase_count: 0,
            session_started_at: now,
        };
        write_json(self.store.as_ref(), &self.key, &state)?;
        debug!("{} started {} for {duration}s", self.key, phase.as_str());
        Ok(&*self.state.insert(state))
    }

    pub fn remaining_seconds(&self, now: DateTime<Utc>) -> u32 {
        match &self.state {
            None => 0,
            Some(state) => match state.paused_remaining_seconds {
                Some(remaining) if !state.is_running => remaining,
                _ => recompute_remaining(state.phase_started_at, state.phase_duration_seconds, now),
            },
        }
    }

    /// Switches past every boundary that has expired by `now`, oldest first. Each next phase
    /// starts at the previous boundary, not at `now`.
    pub fn observe(&mut self, now: DateTime<Utc>) -> Result<Vec<PhaseTransition>, InfraError> {
        let tz = self.tz;
        let Some(state) = self.state.as_mut().filter(|state| state.is_running) else {
            return Ok(Vec::new());
        };

        let mut transitions = Vec::new();
        while state.phase_ends_at() <= now {
            if transitions.len() == MAX_CATCH_UP_TRANSITIONS {
                let (phase, duration) = match state.plan {
                    TimerPlan::Hourly => state.plan.first_phase(now, tz),
                    TimerPlan::WorkBreak { .. } => (state.phase, state.plan.phase_seconds(state.phase)),
                };
                warn!(
                    "{} fell more than {MAX_CATCH_UP_TRANSITIONS} phases behind, restarting {} at {now}",
                    self.key,
                    phase.as_str()
                );
                state.phase = phase;
                state.phase_duration_seconds = duration;
                state.phase_started_at = now;
                break;
            }

            let boundary = state.phase_ends_at();
            let finished = state.phase;
            let (next, next_duration) = state.plan.next_phase(finished, boundary, tz);
            let completed_unit = state.plan.completes_unit(finished);
            if completed_unit {
                state.completed_phase_count = state.completed_phase_count.saturating_add(1);
            }
            transitions.push(PhaseTransition {
                finished,
                finished_started_at: state.phase_started_at,
                finished_duration_seconds: state.phase_duration_seconds,
                boundary,
                next,
                next_duration_seconds: next_duration,
                completed_unit,
                completed_phase_count: state.completed_phase_count,
            });
            state.phase = next;
            state.phase_duration_seconds = next_duration;
            state.phase_started_at = boundary;
        }

        if !transitions.is_empty() {
            write_json(self.store.as_ref(), &self.key, &*state)?;
            debug!("{} crossed {} boundaries", self.key, transitions.len());
        }
        Ok(transitions)
    }

    /// Freezes the countdown. Returns the frozen remaining seconds.
    pub fn pause(&mut self, now: DateTime<Utc>) -> Result<u32, InfraError> {
        let remaining = self.remaining_seconds(now);
        let state = self
            .state
            .as_mut()
            .filter(|state| state.is_running)
            .ok_or_else(|| InfraError::InvalidState(format!("{} is not running", self.key)))?;
        state.is_running = false;
        state.paused_remaining_seconds = Some(remaining);
        write_json(self.store.as_ref(), &self.key, &*state)?;
        Ok(remaining)
    }

    /// Continues from the frozen remaining time by moving the anchor forward.
    pub fn resume(&mut self, now: DateTime<Utc>) -> Result<u32, InfraError> {
        let state = self
            .state
            .as_mut()
            .filter(|state| !state.is_running)
            .ok_or_else(|| InfraError::InvalidState(format!("{} is not paused", self.key)))?;
        let remaining = state
            .paused_remaining_seconds
            .ok_or_else(|| InfraError::InvalidState(format!("{} has no paused time", self.key)))?;
        let elapsed = state.phase_duration_seconds.saturating_sub(remaining);
        state.phase_started_at = now - Duration::seconds(i64::from(elapsed));
        state.is_running = true;
        state.paused_remaining_seconds = None;
        write_json(self.store.as_ref(), &self.key, &*state)?;
        Ok(remaining)
    }

    pub fn reset(&mut self) -> Result<(), InfraError> {
        self.state = None;
        self.store.remove(&self.key)
    }

    pub fn snapshot(&self, now: DateTime<Utc>) -> Option<TimerSnapshot> {
        let state = self.state.as_ref()?;
        Some(TimerSnapshot {
            plan: state.plan,
            phase: state.phase,
            remaining_seconds: self.remaining_seconds(now),
            phase_duration_seconds: state.phase_duration_seconds,
            is_running: state.is_running,
            is_paused: self.is_paused(),
            completed_phase_count: state.completed_phase_count,
            phase_started_at: state.phase_started_at,
            session_started_at: state.session_started_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::durable_store::{DurableStore, InMemoryDurableStore};
    use proptest::prelude::*;
    use std::sync::Arc;

    const KEY: &str = "timer.pomodoro";

    fn fixed_time(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value)
            .expect("valid datetime")
            .with_timezone(&Utc)
    }

    fn work_break(work_minutes: u32, break_minutes: u32) -> TimerPlan {
        TimerPlan::WorkBreak {
            work_minutes,
            break_minutes,
        }
    }

    fn engine(store: &Arc<InMemoryDurableStore>) -> PhaseTimerEngine {
        PhaseTimerEngine::load(store.clone(), KEY, Tz::UTC).expect("load engine")
    }

    #[test]
    fn start_persists_one_record_and_rejects_double_start() {
        let store = Arc::new(InMemoryDurableStore::default());
        let start = fixed_time("2026-02-16T09:00:00Z");
        let mut timer = engine(&store);
        timer.start(work_break(25, 5), start).expect("start");
        assert!(store.get(KEY).expect("get").is_some());

        let result = timer.start(work_break(25, 5), start);
        assert!(matches!(result, Err(InfraError::InvalidState(_))));
        assert_eq!(timer.remaining_seconds(start + Duration::seconds(90)), 1410);
    }

    #[test]
    fn start_rejects_out_of_range_plan() {
        let store = Arc::new(InMemoryDurableStore::default());
        let mut timer = engine(&store);
        let result = timer.start(work_break(0, 5), fixed_time("2026-02-16T09:00:00Z"));
        assert!(matches!(result, Err(InfraError::InvalidConfig(_))));
        assert!(timer.state().is_none());
    }

    #[test]
    fn hourly_first_phase_is_partial_then_full_hours() {
        let store = Arc::new(InMemoryDurableStore::default());
        let mut timer = PhaseTimerEngine::load(store.clone(), "timer.hourly", Tz::UTC).expect("load");
        timer
            .start(TimerPlan::Hourly, fixed_time("2026-02-16T10:15:30Z"))
            .expect("start");
        assert_eq!(timer.state().expect("state").phase_duration_seconds, 2670);

        let first = timer.observe(fixed_time("2026-02-16T11:00:00Z")).expect("observe");
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].next_duration_seconds, 3600);

        let second = timer.observe(fixed_time("2026-02-16T12:00:00Z")).expect("observe");
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].finished_duration_seconds, 3600);
        assert_eq!(timer.state().expect("state").completed_phase_count, 2);
    }

    #[test]
    fn jump_past_work_lands_in_break_with_one_transition() {
        let store = Arc::new(InMemoryDurableStore::default());
        let start = fixed_time("2026-02-16T09:00:00Z");
        let mut timer = engine(&store);
        timer.start(work_break(25, 5), start).expect("start");

        // Simulate a reload 26 minutes later.
        let mut reloaded = engine(&store);
        let now = start + Duration::minutes(26);
        let transitions = reloaded.observe(now).expect("observe");

        assert_eq!(transitions.len(), 1);
        assert_eq!(transitions[0].finished, PhaseKind::Work);
        assert_eq!(transitions[0].boundary, start + Duration::minutes(25));
        assert!(!transitions[0].completed_unit);
        let snapshot = reloaded.snapshot(now).expect("snapshot");
        assert_eq!(snapshot.phase, PhaseKind::Break);
        assert_eq!(snapshot.remaining_seconds, 4 * 60);
        assert_eq!(snapshot.completed_phase_count, 0);
    }

    #[test]
    fn long_gap_replays_every_boundary_in_order() {
        let store = Arc::new(InMemoryDurableStore::default());
        let start = fixed_time("2026-02-16T09:00:00Z");
        let mut timer = engine(&store);
        timer.start(work_break(25, 5), start).expect("start");

        let now = start + Duration::minutes(65);
        let transitions = timer.observe(now).expect("observe");
        let kinds = transitions.iter().map(|t| t.finished).collect::<Vec<_>>();
        assert_eq!(
            kinds,
            vec![PhaseKind::Work, PhaseKind::Break, PhaseKind::Work, PhaseKind::Break]
        );
        assert_eq!(timer.state().expect("state").completed_phase_count, 2);
        assert_eq!(timer.remaining_seconds(now), 20 * 60);
        assert!(timer.observe(now).expect("observe again").is_empty());
    }

    #[test]
    fn huge_gap_is_capped_and_reanchored() {
        let store = Arc::new(InMemoryDurableStore::default());
        let mut timer = PhaseTimerEngine::load(store.clone(), "timer.hourly", Tz::UTC).expect("load");
        timer
            .start(TimerPlan::Hourly, fixed_time("2024-01-01T00:00:00Z"))
            .expect("start");

        let now = fixed_time("2026-02-16T10:15:30Z");
        let transitions = timer.observe(now).expect("observe");
        assert_eq!(transitions.len(), MAX_CATCH_UP_TRANSITIONS);
        assert_eq!(timer.remaining_seconds(now), 2670);
        assert!(timer.observe(now).expect("observe again").is_empty());
    }

    #[test]
    fn pause_freezes_and_resume_continues() {
        let store = Arc::new(InMemoryDurableStore::default());
        let start = fixed_time("2026-02-16T09:00:00Z");
        let mut timer = engine(&store);
        timer.start(work_break(25, 5), start).expect("start");

        let paused_at = start + Duration::minutes(10);
        assert_eq!(timer.pause(paused_at).expect("pause"), 15 * 60);
        assert!(timer.is_paused());

        // Time passes while paused, including a reload.
        let mut reloaded = engine(&store);
        let later = paused_at + Duration::hours(2);
        assert!(reloaded.observe(later).expect("observe").is_empty());
        assert_eq!(reloaded.remaining_seconds(later), 15 * 60);

        reloaded.resume(later).expect("resume");
        assert_eq!(reloaded.remaining_seconds(later), 15 * 60);
        assert_eq!(reloaded.remaining_seconds(later + Duration::minutes(5)), 10 * 60);

        let transitions = reloaded.observe(later + Duration::minutes(15)).expect("observe");
        assert_eq!(transitions.len(), 1);
        assert_eq!(transitions[0].boundary, later + Duration::minutes(15));
    }

    #[test]
    fn pause_and_resume_require_matching_state() {
        let store = Arc::new(InMemoryDurableStore::default());
        let now = fixed_time("2026-02-16T09:00:00Z");
        let mut timer = engine(&store);
        assert!(timer.pause(now).is_err());
        assert!(timer.resume(now).is_err());

        timer.start(work_break(25, 5), now).expect("start");
        assert!(timer.resume(now).is_err());
    }

    #[test]
    fn reset_clears_persisted_record() {
        let store = Arc::new(InMemoryDurableStore::default());
        let now = fixed_time("2026-02-16T09:00:00Z");
        let mut timer = engine(&store);
        timer.start(work_break(25, 5), now).expect("start");
        timer.reset().expect("reset");

        assert!(store.get(KEY).expect("get").is_none());
        assert_eq!(timer.remaining_seconds(now), 0);
        assert!(!timer.is_running());
        assert!(engine(&store).state().is_none());
    }

    #[test]
    fn corrupted_record_loads_as_absent() {
        let store = Arc::new(InMemoryDurableStore::default());
        store.set(KEY, "{\"plan\":").expect("seed");
        assert!(engine(&store).state().is_none());
    }

    proptest! {
        #[test]
        fn remaining_is_derived_from_the_anchor(duration in 1u32..20_000, gap in 0i64..40_000) {
            let start = fixed_time("2026-02-16T09:00:00Z");
            let now = start + Duration::seconds(gap);
            let expected = u32::try_from((i64::from(duration) - gap).max(0)).expect("fits");
            prop_assert_eq!(recompute_remaining(start, duration, now), expected);

            let store = Arc::new(InMemoryDurableStore::default());
            let state = PhaseTimerState {
                plan: TimerPlan::Hourly,
                phase: PhaseKind::Hour,
                phase_duration_seconds: duration,
                phase_started_at: start,
                is_running: true,
                paused_remaining_seconds: None,
                completed_phase_count: 0,
                session_started_at: start,
            };
            write_json(store.as_ref(), "timer.hourly", &state).expect("seed");
            let timer = PhaseTimerEngine::load(store.clone(), "timer.hourly", Tz::UTC).expect("load");
            prop_assert_eq!(timer.remaining_seconds(now), expected);
        }
    }

    proptest! {
        #[test]
        fn one_boundary_means_one_transition(
            work in 1u32..=60,
            brk in 1u32..=30,
            offset_into_break in 0u32..1_800,
            step in 1i64..900,
        ) {
            let store = Arc::new(InMemoryDurableStore::default());
            let start = fixed_time("2026-02-16T09:00:00Z");
            let mut timer = engine(&store);
            timer.start(work_break(work, brk), start).expect("start");

            let target = i64::from(work * 60 + offset_into_break % (brk * 60));
            let mut total = 0;
            let mut at = step;
            while at < target {
                total += timer.observe(start + Duration::seconds(at)).expect("observe").len();
                at += step;
            }
            total += timer.observe(start + Duration::seconds(target)).expect("observe").len();

            prop_assert_eq!(total, 1);
            prop_assert_eq!(timer.state().expect("state").phase, PhaseKind::Break);
        }
    }
}
