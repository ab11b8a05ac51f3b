use crate::domain::models::{NotificationPermission, SoundDuration, SoundSettings, SoundType};
use crate::infrastructure::audio_output::{AudioOutput, Tone};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::notifier::NotificationCenter;
use log::{debug, warn};
use std::fs;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};

const PLING: &[Tone] = &[Tone::sine(523.25, 0, 1_000)];
const BLEEP: &[Tone] = &[Tone::sine(800.0, 0, 500)];
const ALARM: &[Tone] = &[
    Tone::square(1000.0, 0, 200),
    Tone::square(800.0, 250, 200),
    Tone::square(1000.0, 500, 200),
    Tone::square(800.0, 750, 200),
];
const HOUR_CHIME: &[Tone] = &[
    Tone::sine(880.0, 0, 300),
    Tone::sine(880.0, 400, 300),
    Tone::sine(880.0, 800, 300),
    Tone::sine(1100.0, 1_200, 500),
];
const PREVIEW_CHIME: &[Tone] = &[
    Tone::sine(880.0, 0, 300),
    Tone::sine(660.0, 300, 300),
    Tone::sine(440.0, 600, 400),
];
const CUSTOM_GAP: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, PartialEq)]
pub enum SoundKind {
    Pling,
    Bleep,
    Alarm,
    HourChime,
    PreviewChime,
    Custom(Arc<Vec<u8>>),
}

impl SoundKind {
    fn sequence(&self) -> Option<(&'static [Tone], Duration)> {
        let sequence = match self {
            Self::Pling => (PLING, Duration::from_millis(1_500)),
            Self::Bleep => (BLEEP, Duration::from_millis(1_000)),
            Self::Alarm => (ALARM, Duration::from_millis(1_200)),
            Self::HourChime => (HOUR_CHIME, Duration::from_millis(2_000)),
            Self::PreviewChime => (PREVIEW_CHIME, Duration::from_millis(1_000)),
            Self::Custom(_) => return None,
        };
        Some(sequence)
    }

    /// Cue configured for work/break switches. A custom clip that cannot be read falls back
    /// to `Pling`.
    pub fn from_settings(settings: &SoundSettings) -> Self {
        match settings.sound_type {
            SoundType::Pling => Self::Pling,
            SoundType::Bleep => Self::Bleep,
            SoundType::Alarm => Self::Alarm,
            SoundType::Custom => {
                let Some(path) = settings.custom_sound_path.as_deref() else {
                    return Self::Pling;
                };
                match fs::read(path) {
                    Ok(bytes) if !bytes.is_empty() => Self::Custom(Arc::new(bytes)),
                    Ok(_) => {
                        warn!("custom sound {path} is empty, using pling");
                        Self::Pling
                    }
                    Err(error) => {
                        warn!("custom sound {path} unreadable, using pling: {error}");
                        Self::Pling
                    }
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepeatMode {
    Once,
    ForSeconds(u32),
    UntilStopped,
}

impl From<SoundDuration> for RepeatMode {
    fn from(value: SoundDuration) -> Self {
        match value {
            SoundDuration::Single => Self::Once,
            SoundDuration::Loop => Self::UntilStopped,
            SoundDuration::Seconds(seconds) => Self::ForSeconds(seconds),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SoundProfile {
    pub kind: SoundKind,
    pub repeat: RepeatMode,
}

impl SoundProfile {
    pub fn new(kind: SoundKind, repeat: RepeatMode) -> Self {
        Self { kind, repeat }
    }

    pub fn once(kind: SoundKind) -> Self {
        Self::new(kind, RepeatMode::Once)
    }
}

/// Stoppable playback. Clones refer to the same playback.
#[derive(Clone)]
pub struct SoundHandle {
    inner: Arc<HandleInner>,
}

struct HandleInner {
    task: Mutex<Option<JoinHandle<()>>>,
    audio: Arc<dyn AudioOutput>,
}

impl SoundHandle {
    fn new(task: Option<JoinHandle<()>>, audio: Arc<dyn AudioOutput>) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                task: Mutex::new(task),
                audio,
            }),
        }
    }

    /// Safe to call any number of times.
    pub fn stop(&self) {
        let task = match self.inner.task.lock() {
            Ok(mut guard) => guard.take(),
            Err(_) => None,
        };
        if let Some(task) = task {
            task.abort();
            self.inner.audio.silence();
        }
    }

    pub fn is_playing(&self) -> bool {
        self.inner
            .task
            .lock()
            .map(|guard| guard.as_ref().is_some_and(|task| !task.is_finished()))
            .unwrap_or(false)
    }
}

/// Plays at most one sound at a time and raises notifications when permitted.
/// Output failures never reach the caller.
pub struct AlertController {
    audio: Arc<dyn AudioOutput>,
    notifications: Arc<dyn NotificationCenter>,
    current: Mutex<Option<SoundHandle>>,
}

impl AlertController {
    pub fn new(audio: Arc<dyn AudioOutput>, notifications: Arc<dyn NotificationCenter>) -> Self {
        Self {
            audio,
            notifications,
            current: Mutex::new(None),
        }
    }

    /// Replaces whatever is sounding. The slot stays locked from stopping the previous
    /// sound until the new one is stored.
    pub fn play(&self, profile: SoundProfile) -> SoundHandle {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = current.take() {
            previous.stop();
        }

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            debug!("no async runtime, skipping {:?}", profile.kind);
            return SoundHandle::new(None, Arc::clone(&self.audio));
        };
        let task = runtime.spawn(run_playback(Arc::clone(&self.audio), profile));
        let handle = SoundHandle::new(Some(task), Arc::clone(&self.audio));
        *current = Some(handle.clone());
        handle
    }

    pub fn stop(&self) {
        let previous = self
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(previous) = previous {
            previous.stop();
        }
    }

    pub fn is_playing(&self) -> bool {
        self.current
            .lock()
            .map(|guard| guard.as_ref().is_some_and(SoundHandle::is_playing))
            .unwrap_or(false)
    }

    pub fn notify(&self, title: &str, body: &str) {
        if self.notifications.permission() != NotificationPermission::Granted {
            debug!("notification suppressed: {title}");
            return;
        }
        if let Err(error) = self.notifications.show(title, body) {
            warn!("notification failed: {error}");
        }
    }

    /// Asks for permission when it has not been decided yet.
    pub fn prepare_notifications(&self) -> NotificationPermission {
        let permission = self.notifications.permission();
        if permission != NotificationPermission::Default {
            return permission;
        }
        match self.notifications.request_permission() {
            Ok(permission) => permission,
            Err(error) => {
                warn!("notification permission request failed: {error}");
                permission
            }
        }
    }
}

async fn run_playback(audio: Arc<dyn AudioOutput>, profile: SoundProfile) {
    let started = Instant::now();
    loop {
        let period = match play_sequence(audio.as_ref(), &profile.kind) {
            Ok(period) => period,
            Err(error) => {
                debug!("playback rejected: {error}");
                return;
            }
        };
        if profile.repeat == RepeatMode::Once {
            return;
        }
        sleep(period).await;
        if let RepeatMode::ForSeconds(seconds) = profile.repeat {
            if started.elapsed() >= Duration::from_secs(u64::from(seconds)) {
                audio.silence();
                return;
            }
        }
    }
}

fn play_sequence(audio: &dyn AudioOutput, kind: &SoundKind) -> Result<Duration, InfraError> {
    if let SoundKind::Custom(bytes) = kind {
        let clip = audio.play_buffer(bytes)?;
        return Ok(clip.max(Duration::from_secs(1)) + CUSTOM_GAP);
    }
    let Some((tones, period)) = kind.sequence() else {
        return Ok(Duration::from_secs(1));
    };
    for tone in tones {
        audio.play_tone(tone)?;
    }
    Ok(period)
}
