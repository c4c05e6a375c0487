use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::geo::Coordinates;

pub type GeolocationResult = Coordinates;

/// Extra time granted past the platform's own timeout before giving up on it.
const TIMEOUT_GRACE: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeolocationErrorKind {
    PermissionDenied,
    PositionUnavailable,
    Timeout,
    NotSupported,
    Unknown,
}

impl GeolocationErrorKind {
    pub fn from_code(code: u16) -> Self {
        match code {
            1 => GeolocationErrorKind::PermissionDenied,
            2 => GeolocationErrorKind::PositionUnavailable,
            3 => GeolocationErrorKind::Timeout,
            _ => GeolocationErrorKind::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GeolocationErrorKind::PermissionDenied => "permission_denied",
            GeolocationErrorKind::PositionUnavailable => "position_unavailable",
            GeolocationErrorKind::Timeout => "timeout",
            GeolocationErrorKind::NotSupported => "not_supported",
            GeolocationErrorKind::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
#[error("{message}")]
pub struct GeolocationError {
    pub kind: GeolocationErrorKind,
    pub message: String,
}

impl GeolocationError {
    fn new(kind: GeolocationErrorKind, message: impl Into<String>) -> Self {
        let message = message.into();
        let message = if message.is_empty() {
            kind.as_str().to_string()
        } else {
            message
        };
        Self { kind, message }
    }
}

/// Failure reported by the host platform, before classification.
#[derive(Debug, Clone, PartialEq)]
pub struct PlatformError {
    pub code: u16,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionOptions {
    pub enable_high_accuracy: bool,
    pub timeout: Duration,
    pub maximum_age: Duration,
}

impl Default for PositionOptions {
    fn default() -> Self {
        Self {
            enable_high_accuracy: true,
            timeout: Duration::from_secs(10),
            maximum_age: Duration::ZERO,
        }
    }
}

/// Host capability that can report the device position.
#[async_trait]
pub trait PositionSource: Send + Sync {
    fn is_available(&self) -> bool;
    async fn current_position(
        &self,
        options: PositionOptions,
    ) -> Result<Coordinates, PlatformError>;
}

/// Host without any position capability.
pub struct Unsupported;

#[async_trait]
impl PositionSource for Unsupported {
    fn is_available(&self) -> bool {
        false
    }

    async fn current_position(&self, _: PositionOptions) -> Result<Coordinates, PlatformError> {
        Err(PlatformError {
            code: 0,
            message: "Geolocation is not supported".into(),
        })
    }
}

pub struct GeolocationResolver<P> {
    source: P,
    options: PositionOptions,
}

impl<P: PositionSource> GeolocationResolver<P> {
    pub fn new(source: P) -> Self {
        Self {
            source,
            options: PositionOptions::default(),
        }
    }

    pub fn with_options(mut self, options: PositionOptions) -> Self {
        self.options = options;
        self
    }

    pub fn is_supported(&self) -> bool {
        self.source.is_available()
    }

    pub async fn get_current_position(&self) -> Result<GeolocationResult, GeolocationError> {
        if !self.is_supported() {
            return Err(GeolocationError::new(
                GeolocationErrorKind::NotSupported,
                "Geolocation is not supported",
            ));
        }

        let deadline = self.options.timeout + TIMEOUT_GRACE;
        let outcome = tokio::time::timeout(deadline, self.source.current_position(self.options))
            .await
            .map_err(|_| {
                GeolocationError::new(GeolocationErrorKind::Timeout, "Geolocation timed out")
            })?;

        outcome.map_err(|err| {
            let classified = GeolocationError::new(GeolocationErrorKind::from_code(err.code), err.message);
            warn!(kind = classified.kind.as_str(), code = err.code, "geolocation failed");
            classified
        })
    }
}
