use crate::application::prompts::{
    build_popup_quote_prompt, build_prompt, clean_generated, fallback_message, PromptContext,
};
use crate::domain::clock::{hours_left_today, local_day, local_hour};
use crate::domain::models::{AiChatCadence, AiMessage, AiMessageKind, MessageSource, ProfileSettings};
use crate::domain::quotes::QuoteStyle;
use crate::infrastructure::daily_log_repository::DailyLogRepository;
use crate::infrastructure::durable_store::{read_json, write_json, SharedStore};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::generation_client::GenerationClient;
use crate::infrastructure::hour_signal::HourCompleted;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use chrono_tz::Tz;
use log::{debug, info, warn};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::broadcast::Receiver;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, timeout, Instant, MissedTickBehavior};

pub const MESSAGES_KEY: &str = "ai.messages";
pub const CADENCE_KEY: &str = "ai.cadence";
pub const INTERVAL_GRACE: Duration = Duration::from_secs(5);
pub const INTERVAL_POLL: Duration = Duration::from_secs(60);
const GREETING_COOLDOWN_HOURS: i64 = 24;
const DEFAULT_GENERATION_TIMEOUT: Duration = Duration::from_secs(10);

pub type NowProvider = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

static NEXT_MESSAGE_ID: AtomicU64 = AtomicU64::new(1);

fn next_message_id(now: DateTime<Utc>) -> String {
    let sequence = NEXT_MESSAGE_ID.fetch_add(1, Ordering::Relaxed);
    format!("msg-{}-{sequence}", now.timestamp_micros())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Disabled,
    MissingApiKey,
    IntervalOff,
    NotDue,
    InFlight,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationOutcome {
    Generated(AiMessage),
    Fallback(AiMessage),
    Skipped(SkipReason),
}

impl GenerationOutcome {
    pub fn message(&self) -> Option<&AiMessage> {
        match self {
            Self::Generated(message) | Self::Fallback(message) => Some(message),
            Self::Skipped(_) => None,
        }
    }
}

/// Settings that can change while the scheduler runs.
struct Access {
    profile: ProfileSettings,
    api_key: Option<String>,
}

impl Access {
    fn unavailable(&self) -> Option<SkipReason> {
        if !self.profile.enabled {
            return Some(SkipReason::Disabled);
        }
        if self.api_key.is_none() {
            return Some(SkipReason::MissingApiKey);
        }
        None
    }
}

fn usable_key(api_key: Option<String>) -> Option<String> {
    api_key
        .map(|key| key.trim().to_string())
        .filter(|key| !key.is_empty())
}

struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Decides when coaching messages are due and records them, one generation at a time.
pub struct AiMessageScheduler<C>
where
    C: GenerationClient,
{
    client: Arc<C>,
    store: SharedStore,
    messages: DailyLogRepository<AiMessage>,
    access: RwLock<Access>,
    tz: Tz,
    generation_timeout: Duration,
    now_provider: NowProvider,
    generating: AtomicBool,
}

impl<C> AiMessageScheduler<C>
where
    C: GenerationClient,
{
    pub fn new(
        client: Arc<C>,
        store: SharedStore,
        profile: ProfileSettings,
        api_key: Option<String>,
        tz: Tz,
    ) -> Self {
        Self {
            client,
            messages: DailyLogRepository::new(Arc::clone(&store), MESSAGES_KEY),
            store,
            access: RwLock::new(Access {
                profile,
                api_key: usable_key(api_key),
            }),
            tz,
            generation_timeout: DEFAULT_GENERATION_TIMEOUT,
            now_provider: Arc::new(Utc::now),
            generating: AtomicBool::new(false),
        }
    }

    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.now_provider = now_provider;
        self
    }

    pub fn with_timeout(mut self, generation_timeout: Duration) -> Self {
        self.generation_timeout = generation_timeout;
        self
    }

    pub fn is_generating(&self) -> bool {
        self.generating.load(Ordering::Acquire)
    }

    fn now(&self) -> DateTime<Utc> {
        (self.now_provider)()
    }

    fn read_access<R>(&self, read: impl FnOnce(&Access) -> R) -> R {
        let access = self.access.read().unwrap_or_else(PoisonError::into_inner);
        read(&*access)
    }

    /// Applies `update` and reports whether it made the scheduler available.
    fn update_access(&self, update: impl FnOnce(&mut Access)) -> bool {
        let mut access = self.access.write().unwrap_or_else(PoisonError::into_inner);
        let was_available = access.unavailable().is_none();
        update(&mut *access);
        !was_available && access.unavailable().is_none()
    }

    pub fn profile(&self) -> ProfileSettings {
        self.read_access(|access| access.profile.clone())
    }

    /// Applies to the next due check. Returns `true` when this change made the scheduler
    /// available, so the greeting check should run again.
    pub fn set_profile(&self, profile: ProfileSettings) -> bool {
        self.update_access(|access| access.profile = profile)
    }

    pub fn has_api_key(&self) -> bool {
        self.read_access(|access| access.api_key.is_some())
    }

    /// Same contract as [`Self::set_profile`]. Blank keys count as no key.
    pub fn set_api_key(&self, api_key: Option<String>) -> bool {
        let api_key = usable_key(api_key);
        self.update_access(|access| access.api_key = api_key)
    }

    fn api_key(&self) -> Option<String> {
        self.read_access(|access| access.api_key.clone())
    }

    fn interval(&self) -> Option<ChronoDuration> {
        let minutes = self.profile().chat_interval_minutes;
        (minutes > 0).then(|| ChronoDuration::minutes(i64::from(minutes)))
    }

    fn unavailable(&self) -> Option<SkipReason> {
        self.read_access(Access::unavailable)
    }

    pub fn cadence(&self) -> Result<AiChatCadence, InfraError> {
        Ok(read_json::<AiChatCadence>(self.store.as_ref(), CADENCE_KEY)?.unwrap_or_default())
    }

    /// Today's messages, newest first.
    pub fn messages(&self) -> Result<Vec<AiMessage>, InfraError> {
        let mut messages = self.messages.load_today(local_day(self.now(), self.tz))?;
        messages.reverse();
        messages.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(messages)
    }

    pub fn next_check_in(&self) -> Result<Option<DateTime<Utc>>, InfraError> {
        let Some(interval) = self.interval().filter(|_| self.profile().enabled) else {
            return Ok(None);
        };
        let anchor = self
            .cadence()?
            .last_interval_message_at
            .unwrap_or_else(|| self.now());
        Ok(Some(anchor + interval))
    }

    /// Sends the daily greeting unless one went out in the last 24 hours or today
    /// already has messages.
    pub async fn initialize(&self) -> Result<GenerationOutcome, InfraError> {
        self.run(AiMessageKind::Greeting, |scheduler, now| {
            let cadence = scheduler.cadence()?;
            let greeted_recently = cadence.last_greeting_at.is_some_and(|last| {
                now - last <= ChronoDuration::hours(GREETING_COOLDOWN_HOURS)
            });
            let has_messages = !scheduler.messages.load_today(local_day(now, scheduler.tz))?.is_empty();
            Ok(!greeted_recently && !has_messages)
        })
        .await
    }

    pub async fn on_hour_completed(&self) -> Result<GenerationOutcome, InfraError> {
        self.run(AiMessageKind::Hourly, |_, _| Ok(true)).await
    }

    pub async fn check_interval(&self) -> Result<GenerationOutcome, InfraError> {
        let Some(interval) = self.interval() else {
            return Ok(GenerationOutcome::Skipped(
                self.unavailable().unwrap_or(SkipReason::IntervalOff),
            ));
        };
        self.run(AiMessageKind::Interval, |scheduler, now| {
            Ok(scheduler
                .cadence()?
                .last_interval_message_at
                .is_none_or(|last| now - last >= interval))
        })
        .await
    }

    async fn run<F>(&self, kind: AiMessageKind, is_due: F) -> Result<GenerationOutcome, InfraError>
    where
        F: FnOnce(&Self, DateTime<Utc>) -> Result<bool, InfraError>,
    {
        if let Some(reason) = self.unavailable() {
            return Ok(GenerationOutcome::Skipped(reason));
        }
        if self
            .generating
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("{} check ignored: generation in flight", kind.as_str());
            return Ok(GenerationOutcome::Skipped(SkipReason::InFlight));
        }
        let _guard = InFlightGuard(&self.generating);

        if !is_due(self, self.now())? {
            return Ok(GenerationOutcome::Skipped(SkipReason::NotDue));
        }
        self.generate(kind).await
    }

    async fn generate(&self, kind: AiMessageKind) -> Result<GenerationOutcome, InfraError> {
        let api_key = self.api_key().unwrap_or_default();
        let context = PromptContext::new(&self.profile(), local_hour(self.now(), self.tz));
        let prompt = build_prompt(kind, &context);

        let generated = self.request_text(kind.as_str(), &api_key, &prompt).await;

        let now = self.now();
        let (content, source) = match generated {
            Some(text) => (text, MessageSource::Generated),
            None => (fallback_message(kind, &context), MessageSource::Fallback),
        };
        let message = AiMessage {
            id: next_message_id(now),
            content,
            created_at: now,
            kind,
            source,
        };
        self.messages.append(local_day(now, self.tz), message.clone())?;
        self.advance_cadence(kind, now)?;
        info!("{} message recorded ({:?})", kind.as_str(), source);

        Ok(match source {
            MessageSource::Generated => GenerationOutcome::Generated(message),
            MessageSource::Fallback => GenerationOutcome::Fallback(message),
        })
    }

    /// Cleaned model text, or `None` on any failure including the timeout.
    async fn request_text(&self, label: &str, api_key: &str, prompt: &str) -> Option<String> {
        match timeout(self.generation_timeout, self.client.generate(api_key, prompt)).await {
            Ok(Ok(text)) => clean_generated(&text),
            Ok(Err(error)) => {
                warn!("{label} generation failed: {error}");
                None
            }
            Err(_) => {
                warn!("{label} generation failed: {}", InfraError::GenerationTimeout);
                None
            }
        }
    }

    /// Model-written quote for the hour popup. Needs only an API key, not an enabled
    /// profile. `None` tells the caller to keep its static quote.
    pub async fn popup_quote(&self, style: QuoteStyle) -> Option<String> {
        let api_key = self.api_key()?;
        let now = self.now();
        let prompt = build_popup_quote_prompt(
            local_hour(now, self.tz),
            hours_left_today(now, self.tz),
            style,
        );
        self.request_text("popup quote", &api_key, &prompt).await
    }

    fn advance_cadence(&self, kind: AiMessageKind, now: DateTime<Utc>) -> Result<(), InfraError> {
        let mut cadence = self.cadence()?;
        match kind {
            AiMessageKind::Greeting => cadence.last_greeting_at = Some(now),
            AiMessageKind::Interval => cadence.last_interval_message_at = Some(now),
            AiMessageKind::Hourly => return Ok(()),
        }
        write_json(self.store.as_ref(), CADENCE_KEY, &cadence)
    }
}

fn log_outcome(label: &str, outcome: Result<GenerationOutcome, InfraError>) {
    match outcome {
        Ok(GenerationOutcome::Skipped(reason)) => debug!("{label} skipped: {reason:?}"),
        Ok(_) => {}
        Err(error) => warn!("{label} failed: {error}"),
    }
}

impl<C> AiMessageScheduler<C>
where
    C: GenerationClient + 'static,
{
    /// Runs the greeting check in its own task. `None` outside a tokio runtime.
    pub fn spawn_greeting(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        let runtime = tokio::runtime::Handle::try_current().ok()?;
        let scheduler = Arc::clone(self);
        Some(runtime.spawn(async move { log_outcome("greeting", scheduler.initialize().await) }))
    }

    /// Greeting now, interval polling after a short grace period, and an hourly message
    /// for every hour signal. Each due check runs in its own task.
    pub fn spawn(self: Arc<Self>, mut hour_signal: Receiver<HourCompleted>) -> JoinHandle<()> {
        tokio::spawn(async move {
            self.spawn_greeting();

            let mut poll = interval_at(Instant::now() + INTERVAL_GRACE, INTERVAL_POLL);
            poll.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut listening = true;
            loop {
                tokio::select! {
                    _ = poll.tick() => {
                        let scheduler = Arc::clone(&self);
                        tokio::spawn(async move { log_outcome("interval", scheduler.check_interval().await) });
                    }
                    received = hour_signal.recv(), if listening => match received {
                        Ok(signal) => {
                            debug!("hour completed at {}", signal.at);
                            let scheduler = Arc::clone(&self);
                            tokio::spawn(async move { log_outcome("hourly", scheduler.on_hour_completed().await) });
                        }
                        Err(RecvError::Lagged(skipped)) => debug!("missed {skipped} hour signals"),
                        Err(RecvError::Closed) => listening = false,
                    },
                }
            }
        })
    }
}
