use crate::infrastructure::error::InfraError;
use std::sync::Mutex;

pub const API_KEY_ENV: &str = "HOURDASH_GEMINI_API_KEY";

pub trait ApiKeyStore: Send + Sync {
    fn save_key(&self, key: &str) -> Result<(), InfraError>;
    fn load_key(&self) -> Result<Option<String>, InfraError>;
    fn delete_key(&self) -> Result<(), InfraError>;
}

#[derive(Debug, Clone)]
pub struct KeyringApiKeyStore {
    service_name: String,
    account_name: String,
}

impl KeyringApiKeyStore {
    pub fn new(service_name: impl Into<String>, account_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            account_name: account_name.into(),
        }
    }

    fn entry(&self) -> Result<keyring::Entry, InfraError> {
        keyring::Entry::new(&self.service_name, &self.account_name)
            .map_err(|error| InfraError::Credential(error.to_string()))
    }
}

impl Default for KeyringApiKeyStore {
    fn default() -> Self {
        Self::new("hourdash.gemini", "default")
    }
}

impl ApiKeyStore for KeyringApiKeyStore {
    fn save_key(&self, key: &str) -> Result<(), InfraError> {
        let key = key.trim();
        if key.is_empty() {
            return Err(InfraError::Credential("api key must not be empty".to_string()));
        }
        self.entry()?
            .set_password(key)
            .map_err(|error| InfraError::Credential(error.to_string()))
    }

    fn load_key(&self) -> Result<Option<String>, InfraError> {
        match self.entry()?.get_password() {
            Ok(value) => Ok(normalize(Some(value))),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(error) => Err(InfraError::Credential(error.to_string())),
        }
    }

    fn delete_key(&self) -> Result<(), InfraError> {
        match self.entry()?.delete_credential() {
            Ok(_) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(error) => Err(InfraError::Credential(error.to_string())),
        }
    }
}

#[derive(Debug, Default)]
pub struct InMemoryApiKeyStore {
    key: Mutex<Option<String>>,
}

impl InMemoryApiKeyStore {
    pub fn with_key(key: &str) -> Self {
        Self {
            key: Mutex::new(Some(key.to_string())),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Option<String>>, InfraError> {
        self.key
            .lock()
            .map_err(|error| InfraError::Credential(format!("in-memory lock poisoned: {error}")))
    }
}

impl ApiKeyStore for InMemoryApiKeyStore {
    fn save_key(&self, key: &str) -> Result<(), InfraError> {
        *self.lock()? = Some(key.to_string());
        Ok(())
    }

    fn load_key(&self) -> Result<Option<String>, InfraError> {
        Ok(normalize(self.lock()?.clone()))
    }

    fn delete_key(&self) -> Result<(), InfraError> {
        *self.lock()? = None;
        Ok(())
    }
}

fn normalize(value: Option<String>) -> Option<String> {
    value
        .map(|key| key.trim().to_string())
        .filter(|key| !key.is_empty())
}

/// Environment first, then the store. Store failures count as "no key".
pub fn resolve_api_key<F>(lookup: F, store: &dyn ApiKeyStore) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(key) = normalize(lookup(API_KEY_ENV)) {
        return Some(key);
    }
    match store.load_key() {
        Ok(key) => key,
        Err(error) => {
            log::warn!("api key lookup failed: {error}");
            None
        }
    }
}
