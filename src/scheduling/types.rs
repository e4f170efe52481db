use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchedulerError {
    #[error("{field} must be at least one minute")]
    InvalidWindow { field: &'static str },

    #[error("session window cannot change while the scheduler is {state}")]
    SessionInProgress { state: SessionState },
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Idle,
    Active,
    Cooldown,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Active => write!(f, "active"),
            Self::Cooldown => write!(f, "cooldown"),
        }
    }
}

/// Lengths of the trading window and of the pause that follows it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionWindow {
    pub duration_minutes: u32,
    pub cooldown_minutes: u32,
}

impl SessionWindow {
    pub fn new(duration_minutes: u32, cooldown_minutes: u32) -> Result<Self, SchedulerError> {
        let window = Self {
            duration_minutes,
            cooldown_minutes,
        };
        window.validate()?;

        Ok(window)
    }

    pub fn validate(&self) -> Result<(), SchedulerError> {
        if self.duration_minutes == 0 {
            return Err(SchedulerError::InvalidWindow {
                field: "duration_minutes",
            });
        }
        if self.cooldown_minutes == 0 {
            return Err(SchedulerError::InvalidWindow {
                field: "cooldown_minutes",
            });
        }

        Ok(())
    }
}

impl Default for SessionWindow {
    fn default() -> Self {
        Self {
            duration_minutes: 240,
            cooldown_minutes: 60,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SessionConfig {
    /// Admission gate. True exactly while the scheduler is `Active`.
    pub trading_enabled: bool,
    pub session_duration_minutes: u32,
    pub cooldown_minutes: u32,
    /// When set, a new session starts after every cooldown.
    pub manual_override: bool,
}

impl From<SessionWindow> for SessionConfig {
    fn from(window: SessionWindow) -> Self {
        Self {
            trading_enabled: false,
            session_duration_minutes: window.duration_minutes,
            cooldown_minutes: window.cooldown_minutes,
            manual_override: false,
        }
    }
}

/// Point-in-time view of the scheduler, taken under a single lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SessionStatus {
    pub state: SessionState,
    pub trading_enabled: bool,
    pub manual_override: bool,
    pub session_duration_minutes: u32,
    pub cooldown_minutes: u32,
    pub sessions_started: u64,
    pub phase_ends_at: Option<DateTime<Utc>>,
}
