use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tokio::task;
use tracing::{error, info, warn};

use crate::{
    execution::{
        DynamicVenue,
        dispatch_queue::QueueClosed,
        worker_pool::{DispatchStatsSnapshot, PoolError, WorkerPool},
    },
    scheduling::{
        session_scheduler::SessionScheduler,
        types::{SchedulerError, SessionStatus, SessionWindow},
    },
    types::order::{Order, OrderError, OrderId, OrderRequest},
};

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("invalid order: {0}")]
    Invalid(#[from] OrderError),

    #[error("trading is disabled outside an active session")]
    TradingDisabled,

    #[error(transparent)]
    Closed(#[from] QueueClosed),
}

#[derive(Debug, Error)]
pub enum StartError {
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    #[error(transparent)]
    Pool(#[from] PoolError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BrokerCloseReport {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub closed: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BrokerCloseReport {
    fn closed(count: usize) -> Self {
        Self {
            ok: true,
            closed: Some(count),
            error: None,
        }
    }

    fn failed(error: String) -> Self {
        Self {
            ok: false,
            closed: None,
            error: Some(error),
        }
    }
}

/// Always `ok`: a venue failure while flattening is reported, never raised.
#[derive(Debug, Clone, Serialize)]
pub struct KillSwitchReport {
    pub ok: bool,
    pub broker_close: BrokerCloseReport,
    pub pending_orders: usize,
    pub session: SessionStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeskStatus {
    pub executor_running: bool,
    pub workers: usize,
    pub pending_orders: usize,
    pub dispatch: DispatchStatsSnapshot,
    pub session: SessionStatus,
    pub venue: &'static str,
}

/// Ties the worker pool, the session scheduler and the venue together.
/// Built once at startup and shared by reference with every caller.
pub struct TradingDesk {
    pool: Arc<WorkerPool>,
    scheduler: SessionScheduler,
    venue: DynamicVenue,
    enforce_session_gate: bool,
}

impl TradingDesk {
    pub fn new(
        pool: Arc<WorkerPool>,
        scheduler: SessionScheduler,
        venue: DynamicVenue,
        enforce_session_gate: bool,
    ) -> Self {
        Self {
            pool,
            scheduler,
            venue,
            enforce_session_gate,
        }
    }

    pub fn place(&self, request: OrderRequest) -> Result<OrderId, SubmitError> {
        let order = request.into_order()?;
        self.submit(order)
    }

    /// Queues an order without waiting for it to be dispatched.
    pub fn submit(&self, order: Order) -> Result<OrderId, SubmitError> {
        if self.enforce_session_gate && !self.scheduler.trading_enabled() {
            warn!(symbol = %order.symbol(), "order refused, no active session");
            return Err(SubmitError::TradingDisabled);
        }

        Ok(self.pool.submit(order)?)
    }

    /// Opens a session. With `repeat` the scheduler keeps cycling until
    /// stopped; without it one session and one cooldown run, then it idles.
    pub async fn start_session(
        &self,
        window: Option<SessionWindow>,
        repeat: bool,
    ) -> Result<SessionStatus, StartError> {
        if let Some(window) = window {
            self.scheduler.configure(window)?;
        }

        if repeat {
            self.scheduler.start_manual();
        } else {
            self.scheduler.start_once();
        }
        if let Err(error) = self.pool.start().await {
            self.scheduler.stop_manual();
            return Err(error.into());
        }

        Ok(self.scheduler.status())
    }

    pub async fn stop_session(&self) -> SessionStatus {
        let status = self.scheduler.stop_manual();
        self.pool.stop().await;

        status
    }

    /// Halts admission, waits for in-flight orders, then flattens the venue.
    pub async fn kill_switch(&self) -> KillSwitchReport {
        warn!("kill switch engaged");

        self.scheduler.stop_manual();
        self.pool.stop().await;

        let venue = self.venue.clone();
        let broker_close = match task::spawn_blocking(move || venue.close_all_positions()).await {
            Ok(Ok(outcome)) => {
                info!(closed = outcome.closed, "venue positions closed");
                BrokerCloseReport::closed(outcome.closed)
            }
            Ok(Err(error)) => {
                error!(error = %format!("{error:#}"), "close all positions failed");
                BrokerCloseReport::failed(format!("{error:#}"))
            }
            Err(error) => {
                error!(%error, "close all positions aborted");
                BrokerCloseReport::failed(format!("close all aborted: {error}"))
            }
        };

        KillSwitchReport {
            ok: true,
            broker_close,
            pending_orders: self.pool.pending(),
            session: self.scheduler.status(),
        }
    }

    /// Drops the backlog left behind by a stop or the kill switch.
    pub async fn discard_pending(&self) -> Result<Vec<Order>, PoolError> {
        self.pool.discard_pending().await
    }

    /// Process exit: no new sessions, no new orders, workers joined.
    pub async fn shutdown(&self) {
        self.scheduler.stop_manual();
        self.pool.shutdown().await;

        let pending = self.pool.pending();
        if pending > 0 {
            warn!(pending, "shutting down with undispatched orders");
        }
    }

    pub fn status(&self) -> DeskStatus {
        DeskStatus {
            executor_running: self.pool.is_running(),
            workers: self.pool.worker_count(),
            pending_orders: self.pool.pending(),
            dispatch: self.pool.stats(),
            session: self.scheduler.status(),
            venue: self.venue.name(),
        }
    }
}
