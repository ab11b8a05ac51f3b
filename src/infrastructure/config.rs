use crate::domain::models::{HourlyPopupSettings, ProfileSettings, SoundSettings};
use crate::infrastructure::error::InfraError;
use chrono_tz::Tz;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

const APP_JSON: &str = "app.json";
const PROFILE_JSON: &str = "profile.json";
const HOURLY_JSON: &str = "hourly.json";
const SOUND_JSON: &str = "sound.json";
const SCHEMA_VERSION: u64 = 1;

pub const DEFAULT_GENERATION_ENDPOINT: &str =
    "https://generativelanguage.googleapis.com/v1beta/models";
pub const DEFAULT_GENERATION_MODEL: &str = "gemini-2.0-flash-exp";
const DEFAULT_GENERATION_TIMEOUT_SECONDS: u64 = 10;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct AppSettings {
    pub app_name: String,
    pub timezone: String,
    pub generation_endpoint: String,
    pub generation_model: String,
    pub generation_timeout_seconds: u64,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            app_name: "HourDash".to_string(),
            timezone: "UTC".to_string(),
            generation_endpoint: DEFAULT_GENERATION_ENDPOINT.to_string(),
            generation_model: DEFAULT_GENERATION_MODEL.to_string(),
            generation_timeout_seconds: DEFAULT_GENERATION_TIMEOUT_SECONDS,
        }
    }
}

impl AppSettings {
    pub fn tz(&self) -> Result<Tz, InfraError> {
        parse_timezone(&self.timezone)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.generation_timeout_seconds == 0 || self.generation_timeout_seconds > 120 {
            return Err("app.generationTimeoutSeconds must be between 1 and 120".to_string());
        }
        if self.generation_model.trim().is_empty() {
            return Err("app.generationModel must not be empty".to_string());
        }
        url::Url::parse(self.generation_endpoint.trim())
            .map_err(|error| format!("app.generationEndpoint is not a valid url: {error}"))?;
        Ok(())
    }
}

/// Settings read once at startup and handed to the timers and the scheduler.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct DashboardConfig {
    pub app: AppSettings,
    pub profile: ProfileSettings,
    pub hourly: HourlyPopupSettings,
    pub sound: SoundSettings,
}

impl DashboardConfig {
    pub fn tz(&self) -> Result<Tz, InfraError> {
        self.app.tz()
    }
}

fn with_schema<T: Serialize>(value: &T) -> Result<serde_json::Value, InfraError> {
    let mut json = serde_json::to_value(value)?;
    if let Some(object) = json.as_object_mut() {
        object.insert("schema".to_string(), serde_json::json!(SCHEMA_VERSION));
    }
    Ok(json)
}

fn default_files() -> Result<HashMap<&'static str, serde_json::Value>, InfraError> {
    Ok(HashMap::from([
        (APP_JSON, with_schema(&AppSettings::default())?),
        (PROFILE_JSON, with_schema(&ProfileSettings::default())?),
        (HOURLY_JSON, with_schema(&HourlyPopupSettings::default())?),
        (SOUND_JSON, with_schema(&SoundSettings::default())?),
    ]))
}

pub fn ensure_default_configs(config_dir: &Path) -> Result<(), InfraError> {
    for (name, value) in default_files()? {
        let path = config_dir.join(name);
        if !path.exists() {
            write_pretty(&path, &value)?;
        }
    }
    Ok(())
}

fn read_config(path: &Path) -> Result<serde_json::Value, InfraError> {
    let raw = fs::read_to_string(path)?;
    let parsed: serde_json::Value = serde_json::from_str(&raw)?;
    let schema = parsed
        .get("schema")
        .and_then(serde_json::Value::as_u64)
        .ok_or_else(|| InfraError::InvalidConfig(format!("missing schema in {}", path.display())))?;
    if schema != SCHEMA_VERSION {
        return Err(InfraError::InvalidConfig(format!(
            "unsupported schema {} in {}",
            schema,
            path.display()
        )));
    }
    Ok(parsed)
}

fn read_typed<T: DeserializeOwned>(path: &Path) -> Result<T, InfraError> {
    let value = read_config(path)?;
    serde_json::from_value(value)
        .map_err(|error| InfraError::InvalidConfig(format!("{}: {error}", path.display())))
}

fn write_pretty(path: &Path, value: &serde_json::Value) -> Result<(), InfraError> {
    let formatted = serde_json::to_string_pretty(value)?;
    fs::write(path, format!("{formatted}\n"))?;
    Ok(())
}

pub fn load_configs(config_dir: &Path) -> Result<DashboardConfig, InfraError> {
    let config = DashboardConfig {
        app: read_typed(&config_dir.join(APP_JSON))?,
        profile: read_typed(&config_dir.join(PROFILE_JSON))?,
        hourly: read_typed(&config_dir.join(HOURLY_JSON))?,
        sound: read_typed(&config_dir.join(SOUND_JSON))?,
    };
    config.app.validate().map_err(InfraError::InvalidConfig)?;
    config.profile.validate().map_err(InfraError::InvalidConfig)?;
    config.sound.validate().map_err(InfraError::InvalidConfig)?;
    config.tz()?;
    Ok(config)
}

pub fn parse_timezone(value: &str) -> Result<Tz, InfraError> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(Tz::UTC);
    }
    value
        .parse::<Tz>()
        .map_err(|error| InfraError::InvalidConfig(format!("invalid timezone {value}: {error}")))
}

pub fn save_profile_settings(config_dir: &Path, profile: &ProfileSettings) -> Result<(), InfraError> {
    profile.validate().map_err(InfraError::InvalidConfig)?;
    save_settings(config_dir, PROFILE_JSON, profile)
}

pub fn save_hourly_settings(
    config_dir: &Path,
    hourly: &HourlyPopupSettings,
) -> Result<(), InfraError> {
    save_settings(config_dir, HOURLY_JSON, hourly)
}

pub fn save_sound_settings(config_dir: &Path, sound: &SoundSettings) -> Result<(), InfraError> {
    sound.validate().map_err(InfraError::InvalidConfig)?;
    save_settings(config_dir, SOUND_JSON, sound)
}

fn save_settings<T: Serialize>(config_dir: &Path, name: &str, value: &T) -> Result<(), InfraError> {
    let path = config_dir.join(name);
    // Keep keys this version does not know about.
    let mut merged = match read_config(&path) {
        Ok(existing) => existing,
        Err(InfraError::Io(_)) => serde_json::json!({ "schema": SCHEMA_VERSION }),
        Err(error) => return Err(error),
    };
    let object = merged.as_object_mut().ok_or_else(|| {
        InfraError::InvalidConfig(format!("invalid object structure in {}", path.display()))
    })?;
    if let serde_json::Value::Object(fields) = serde_json::to_value(value)? {
        object.extend(fields);
    }
    write_pretty(&path, &merged)
}
