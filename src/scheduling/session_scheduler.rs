use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::scheduling::types::{
    SchedulerError, SessionConfig, SessionState, SessionStatus, SessionWindow,
};

const MINUTE: Duration = Duration::from_secs(60);

#[derive(Debug)]
struct SessionInner {
    config: SessionConfig,
    state: SessionState,
    phase_ends_at: Option<DateTime<Utc>>,
    sessions_started: u64,
    running: Option<CancellationToken>,
}

impl SessionInner {
    fn enter(&mut self, state: SessionState) {
        self.state = state;
        self.config.trading_enabled = state == SessionState::Active;

        let minutes = match state {
            SessionState::Active => {
                self.sessions_started += 1;
                Some(self.config.session_duration_minutes)
            }
            SessionState::Cooldown => Some(self.config.cooldown_minutes),
            SessionState::Idle => None,
        };

        self.phase_ends_at = minutes.and_then(|m| {
            chrono::Duration::try_minutes(i64::from(m)).map(|length| Utc::now() + length)
        });
    }

    fn status(&self) -> SessionStatus {
        SessionStatus {
            state: self.state,
            trading_enabled: self.config.trading_enabled,
            manual_override: self.config.manual_override,
            session_duration_minutes: self.config.session_duration_minutes,
            cooldown_minutes: self.config.cooldown_minutes,
            sessions_started: self.sessions_started,
            phase_ends_at: self.phase_ends_at,
        }
    }
}

/// Alternates between an active trading window and a cooldown.
///
/// At most one timer loop runs per scheduler. `stop_manual` cancels it
/// mid-wait, and every transition the loop makes re-checks cancellation under
/// the same lock that `stop_manual` takes, so a stopped loop never writes.
#[derive(Debug, Clone)]
pub struct SessionScheduler {
    inner: Arc<Mutex<SessionInner>>,
}

impl Default for SessionScheduler {
    fn default() -> Self {
        Self::new(SessionWindow::default())
    }
}

impl SessionScheduler {
    pub fn new(window: SessionWindow) -> Self {
        Self {
            inner: Arc::new(Mutex::new(SessionInner {
                config: SessionConfig::from(window),
                state: SessionState::Idle,
                phase_ends_at: None,
                sessions_started: 0,
                running: None,
            })),
        }
    }

    /// Changes the window lengths. Only allowed between sessions.
    pub fn configure(&self, window: SessionWindow) -> Result<(), SchedulerError> {
        window.validate()?;

        let mut inner = self.inner.lock();
        if inner.state != SessionState::Idle {
            return Err(SchedulerError::SessionInProgress { state: inner.state });
        }

        inner.config.session_duration_minutes = window.duration_minutes;
        inner.config.cooldown_minutes = window.cooldown_minutes;
        info!(
            duration_minutes = window.duration_minutes,
            cooldown_minutes = window.cooldown_minutes,
            "session window configured"
        );

        Ok(())
    }

    /// Starts repeating sessions until `stop_manual`.
    pub fn start_manual(&self) -> SessionStatus {
        self.start(true)
    }

    /// Starts a single session followed by one cooldown, then goes idle.
    /// Issued while a repeating session runs, it makes the current cycle the
    /// last one.
    pub fn start_once(&self) -> SessionStatus {
        self.start(false)
    }

    pub fn stop_manual(&self) -> SessionStatus {
        let mut inner = self.inner.lock();
        inner.config.manual_override = false;
        inner.enter(SessionState::Idle);

        if let Some(cancel) = inner.running.take() {
            cancel.cancel();
            info!("session stopped manually");
        }

        inner.status()
    }

    pub fn status(&self) -> SessionStatus {
        self.inner.lock().status()
    }

    pub fn trading_enabled(&self) -> bool {
        self.inner.lock().config.trading_enabled
    }

    fn start(&self, manual_override: bool) -> SessionStatus {
        let (cancel, status) = {
            let mut inner = self.inner.lock();
            inner.config.manual_override = manual_override;

            if inner.running.is_some() {
                debug!(state = %inner.state, "session loop already running");
                return inner.status();
            }

            inner.enter(SessionState::Active);
            let cancel = CancellationToken::new();
            inner.running = Some(cancel.clone());

            (cancel, inner.status())
        };

        info!(
            duration_minutes = status.session_duration_minutes,
            cooldown_minutes = status.cooldown_minutes,
            manual_override,
            "trading session active"
        );
        tokio::spawn(run_sessions(self.inner.clone(), cancel));

        status
    }
}

/// Returns false when cancelled before the timer lapsed.
async fn wait(cancel: &CancellationToken, length: Duration) -> bool {
    tokio::select! {
        () = cancel.cancelled() => false,
        () = tokio::time::sleep(length) => true,
    }
}

async fn run_sessions(inner: Arc<Mutex<SessionInner>>, cancel: CancellationToken) {
    loop {
        let active_for = MINUTE * inner.lock().config.session_duration_minutes;
        if !wait(&cancel, active_for).await {
            return;
        }

        let cooldown_for = {
            let mut guard = inner.lock();
            if cancel.is_cancelled() {
                return;
            }
            guard.enter(SessionState::Cooldown);
            MINUTE * guard.config.cooldown_minutes
        };
        info!(
            cooldown_minutes = cooldown_for.as_secs() / 60,
            "session ended, cooling down"
        );

        if !wait(&cancel, cooldown_for).await {
            return;
        }

        let mut guard = inner.lock();
        if cancel.is_cancelled() {
            return;
        }

        if !guard.config.manual_override {
            guard.enter(SessionState::Idle);
            guard.running = None;
            info!("cooldown over, scheduler idle");
            return;
        }

        guard.enter(SessionState::Active);
        info!(
            session = guard.sessions_started,
            duration_minutes = guard.config.session_duration_minutes,
            "cooldown over, trading session active"
        );
    }
}
