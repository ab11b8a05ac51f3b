use crate::domain::models::DailyLog;
use crate::infrastructure::durable_store::{read_json, write_json, SharedStore};
use crate::infrastructure::error::InfraError;
use chrono::NaiveDate;
use log::debug;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;

/// Day-scoped append-only list stored under a single key.
pub struct DailyLogRepository<T> {
    store: SharedStore,
    key: String,
    _entry: PhantomData<fn() -> T>,
}

impl<T> DailyLogRepository<T>
where
    T: Serialize + DeserializeOwned + Clone,
{
    pub fn new(store: SharedStore, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
            _entry: PhantomData,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Entries recorded on `today`. A log left over from an earlier day is cleared and the
    /// empty log is persisted, so later reads on the same day see what was appended since.
    pub fn load_today(&self, today: NaiveDate) -> Result<Vec<T>, InfraError> {
        Ok(self.load_log(today)?.entries)
    }

    pub fn append(&self, today: NaiveDate, entry: T) -> Result<Vec<T>, InfraError> {
        let mut log = self.load_log(today)?;
        log.entries.push(entry);
        write_json(self.store.as_ref(), &self.key, &log)?;
        Ok(log.entries)
    }

    fn load_log(&self, today: NaiveDate) -> Result<DailyLog<T>, InfraError> {
        match read_json::<DailyLog<T>>(self.store.as_ref(), &self.key)? {
            Some(log) if log.is_for(today) => Ok(log),
            previous => {
                if let Some(stale) = previous {
                    debug!(
                        "resetting {} from {} ({} entries) for {today}",
                        self.key,
                        stale.day,
                        stale.entries.len()
                    );
                }
                let fresh = DailyLog::empty(today);
                write_json(self.store.as_ref(), &self.key, &fresh)?;
                Ok(fresh)
            }
        }
    }
}
