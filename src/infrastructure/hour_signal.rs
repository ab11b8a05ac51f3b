use chrono::{DateTime, Utc};
use log::debug;
use tokio::sync::broadcast::{self, Receiver, Sender};

const SIGNAL_CAPACITY: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HourCompleted {
    pub at: DateTime<Utc>,
}

/// Fire-and-forget "hour completed" signal. Nothing is buffered for receivers that
/// subscribe later, and a lagging receiver skips what it missed.
#[derive(Debug, Clone)]
pub struct HourSignal {
    sender: Sender<HourCompleted>,
}

impl Default for HourSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl HourSignal {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(SIGNAL_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> Receiver<HourCompleted> {
        self.sender.subscribe()
    }

    /// Returns how many receivers saw the signal.
    pub fn raise(&self, at: DateTime<Utc>) -> usize {
        match self.sender.send(HourCompleted { at }) {
            Ok(receivers) => receivers,
            Err(_) => {
                debug!("hour signal at {at} dropped: no listeners");
                0
            }
        }
    }
}
