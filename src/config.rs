use std::{
    fs,
    path::{Path, PathBuf},
    sync::Mutex,
};

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::utils;

pub const DEFAULT_BACKEND_URL: &str = "http://localhost:8000/api/v1";
const DEFAULT_USER_AGENT: &str = "ticket-scout/0.1";
const DEFAULT_EVENT_TZ: &str = "UTC";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config io error: {0}")]
    Io(String),
    #[error("config parse error: {0}")]
    Parse(String),
    #[error("config mutex poisoned")]
    Poisoned,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub backend_url: String,
    pub user_agent: String,
    /// IANA zone applied to backend dates that carry no UTC offset.
    pub event_timezone: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            backend_url: DEFAULT_BACKEND_URL.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            event_timezone: DEFAULT_EVENT_TZ.to_string(),
        }
    }
}

impl AppConfig {
    pub fn apply_env(mut self) -> Self {
        if let Ok(url) = std::env::var("TICKET_SCOUT_BACKEND_URL") {
            self.backend_url = url;
        }
        if let Ok(tz) = std::env::var("TICKET_SCOUT_EVENT_TZ") {
            self.event_timezone = tz;
        }
        if let Ok(agent) = std::env::var("TICKET_SCOUT_USER_AGENT") {
            self.user_agent = agent;
        }
        self
    }

    pub fn timezone(&self) -> Tz {
        match self.event_timezone.parse::<Tz>() {
            Ok(tz) => tz,
            Err(err) => {
                warn!(zone = %self.event_timezone, %err, "unknown event timezone, using UTC");
                Tz::UTC
            }
        }
    }
}

pub struct ConfigStore {
    path: PathBuf,
    data: Mutex<AppConfig>,
}

impl ConfigStore {
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(utils::config_path())
    }

    pub fn load_from(path: PathBuf) -> Result<Self, ConfigError> {
        let data = read_config(&path)?.apply_env();
        Ok(Self {
            path,
            data: Mutex::new(data),
        })
    }

    pub fn read(&self) -> Result<AppConfig, ConfigError> {
        self.data
            .lock()
            .map(|guard| guard.clone())
            .map_err(|_| ConfigError::Poisoned)
    }

    pub fn update<F>(&self, transform: F) -> Result<AppConfig, ConfigError>
    where
        F: FnOnce(&mut AppConfig),
    {
        let mut guard = self.data.lock().map_err(|_| ConfigError::Poisoned)?;
        transform(&mut guard);
        write_config(&self.path, &guard)?;
        Ok(guard.clone())
    }
}

fn read_config(path: &Path) -> Result<AppConfig, ConfigError> {
    if !path.exists() {
        return Ok(AppConfig::default());
    }
    let contents = fs::read_to_string(path).map_err(|err| ConfigError::Io(err.to_string()))?;
    serde_json::from_str(&contents).map_err(|err| ConfigError::Parse(err.to_string()))
}

fn write_config(path: &Path, config: &AppConfig) -> Result<(), ConfigError> {
    utils::ensure_parent(path);
    let contents =
        serde_json::to_string_pretty(config).map_err(|err| ConfigError::Parse(err.to_string()))?;
    fs::write(path, contents).map_err(|err| ConfigError::Io(err.to_string()))
}
