use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Instant;

use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::{self, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    audit::{audit_log::AuditLog, audit_record::AuditRecord},
    execution::{
        DynamicVenue,
        dispatch_queue::{DispatchQueue, QueueClosed},
        dispatch_result::DispatchResult,
    },
    types::order::{Order, OrderId},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PoolError {
    #[error("worker pool cannot start: dispatch queue is closed")]
    QueueClosed,

    #[error("worker pool is running; stop it before discarding pending orders")]
    Running,
}

#[derive(Debug, Default)]
struct DispatchStats {
    dispatched: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    audit_failures: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchStatsSnapshot {
    pub dispatched: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub audit_failures: u64,
}

/// State every worker shares: where orders go and where outcomes are written.
struct Dispatcher {
    venue: DynamicVenue,
    audit: Arc<AuditLog>,
    stats: DispatchStats,
}

impl Dispatcher {
    async fn dispatch(&self, worker: usize, order: Order) {
        let started = Instant::now();
        let queued_ms = (Utc::now() - order.submitted_at()).num_milliseconds();
        debug!(
            worker,
            order_id = %order.id(),
            symbol = %order.symbol(),
            side = %order.side(),
            size = order.size(),
            queued_ms,
            "dispatching order"
        );

        let venue = self.venue.clone();
        let job = order.clone();
        let result = match task::spawn_blocking(move || venue.execute(&job)).await {
            Ok(Ok(result)) => result,
            Ok(Err(error)) => DispatchResult::failure(format!("{error:#}")),
            Err(error) => DispatchResult::failure(format!("venue call aborted: {error}")),
        };

        let elapsed_ms = started.elapsed().as_millis() as u64;
        match &result {
            DispatchResult::Success { venue_reference } => {
                self.stats.succeeded.fetch_add(1, Ordering::Relaxed);
                info!(
                    worker,
                    order_id = %order.id(),
                    %venue_reference,
                    elapsed_ms,
                    "order executed"
                );
            }
            DispatchResult::Failure { reason } => {
                self.stats.failed.fetch_add(1, Ordering::Relaxed);
                warn!(worker, order_id = %order.id(), %reason, elapsed_ms, "order failed");
            }
        }

        let record = AuditRecord::new(&order, &result, worker);
        let audit = self.audit.clone();
        let written = task::spawn_blocking(move || audit.append(record)).await;
        match written {
            Ok(Ok(_)) => {}
            Ok(Err(error)) => {
                self.stats.audit_failures.fetch_add(1, Ordering::Relaxed);
                error!(order_id = %order.id(), %error, "failed to write audit record");
            }
            Err(error) => {
                self.stats.audit_failures.fetch_add(1, Ordering::Relaxed);
                error!(order_id = %order.id(), %error, "audit write aborted");
            }
        }

        self.stats.dispatched.fetch_add(1, Ordering::Release);
    }

    fn snapshot(&self) -> DispatchStatsSnapshot {
        DispatchStatsSnapshot {
            dispatched: self.stats.dispatched.load(Ordering::Acquire),
            succeeded: self.stats.succeeded.load(Ordering::Relaxed),
            failed: self.stats.failed.load(Ordering::Relaxed),
            audit_failures: self.stats.audit_failures.load(Ordering::Relaxed),
        }
    }
}

struct RunningWorkers {
    shutdown: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

/// Fixed set of workers draining one dispatch queue.
///
/// `stop` lets each worker finish the order it holds and then returns once
/// all of them have exited. Orders still queued at that point stay queued.
pub struct WorkerPool {
    worker_count: usize,
    queue: Arc<DispatchQueue>,
    dispatcher: Arc<Dispatcher>,
    workers: Mutex<Option<RunningWorkers>>,
    running: AtomicBool,
}

impl WorkerPool {
    pub fn new(worker_count: usize, venue: DynamicVenue, audit: Arc<AuditLog>) -> Self {
        Self {
            worker_count: worker_count.max(1),
            queue: Arc::new(DispatchQueue::new()),
            dispatcher: Arc::new(Dispatcher {
                venue,
                audit,
                stats: DispatchStats::default(),
            }),
            workers: Mutex::new(None),
            running: AtomicBool::new(false),
        }
    }

    pub fn submit(&self, order: Order) -> Result<OrderId, QueueClosed> {
        let order_id = order.id();
        let side = order.side();
        let symbol = order.symbol().to_string();
        let size = order.size();

        self.queue.enqueue(order)?;
        info!(%order_id, %side, %symbol, size, pending = self.queue.pending(), "order queued");

        Ok(order_id)
    }

    pub async fn start(&self) -> Result<(), PoolError> {
        let mut workers = self.workers.lock().await;
        if workers.is_some() {
            debug!("worker pool already running");
            return Ok(());
        }

        if self.queue.is_closed() {
            return Err(PoolError::QueueClosed);
        }

        let shutdown = CancellationToken::new();
        let handles = (0..self.worker_count)
            .map(|worker| {
                tokio::spawn(run_worker(
                    worker,
                    self.queue.clone(),
                    self.dispatcher.clone(),
                    shutdown.clone(),
                ))
            })
            .collect();

        *workers = Some(RunningWorkers { shutdown, handles });
        self.running.store(true, Ordering::Release);
        info!(workers = self.worker_count, "worker pool started");

        Ok(())
    }

    pub async fn stop(&self) {
        let mut workers = self.workers.lock().await;
        let Some(running) = workers.take() else {
            return;
        };

        running.shutdown.cancel();
        for handle in running.handles {
            if let Err(error) = handle.await {
                error!(%error, "worker exited abnormally");
            }
        }

        self.running.store(false, Ordering::Release);
        info!(pending = self.queue.pending(), "worker pool stopped");
    }

    /// Stops the workers and refuses any further submissions.
    pub async fn shutdown(&self) {
        self.queue.close();
        self.stop().await;
    }

    /// Takes every order that was queued but never started. Only allowed
    /// while stopped: a live worker may be parked on the queue.
    pub async fn discard_pending(&self) -> Result<Vec<Order>, PoolError> {
        let workers = self.workers.lock().await;
        if workers.is_some() {
            return Err(PoolError::Running);
        }

        let drained = self.queue.drain().await;
        drop(workers);

        if !drained.is_empty() {
            warn!(count = drained.len(), "discarded pending orders");
        }

        Ok(drained)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn pending(&self) -> usize {
        self.queue.pending()
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    pub fn stats(&self) -> DispatchStatsSnapshot {
        self.dispatcher.snapshot()
    }
}

async fn run_worker(
    worker: usize,
    queue: Arc<DispatchQueue>,
    dispatcher: Arc<Dispatcher>,
    shutdown: CancellationToken,
) {
    debug!(worker, "worker started");

    loop {
        let order = tokio::select! {
            biased;

            () = shutdown.cancelled() => break,
            next = queue.dequeue() => match next {
                Some(order) => order,
                None => break,
            },
        };

        dispatcher.dispatch(worker, order).await;
    }

    debug!(worker, "worker exited");
}
