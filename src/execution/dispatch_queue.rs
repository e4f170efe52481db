use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use thiserror::Error;
use tokio::sync::{Mutex, mpsc};

use crate::types::order::Order;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("dispatch queue is closed")]
pub struct QueueClosed;

/// Unbounded FIFO shared by every submitter and every worker.
///
/// Consumers take turns on the receiver through a fair async mutex, so orders
/// leave the queue in the order they arrived no matter how many workers are
/// waiting.
#[derive(Debug)]
pub struct DispatchQueue {
    sender: mpsc::UnboundedSender<Order>,
    receiver: Mutex<mpsc::UnboundedReceiver<Order>>,
    pending: AtomicUsize,
    closed: AtomicBool,
}

impl Default for DispatchQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl DispatchQueue {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();

        Self {
            sender,
            receiver: Mutex::new(receiver),
            pending: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// Never waits. Fails only once the queue has been closed for shutdown.
    pub fn enqueue(&self, order: Order) -> Result<(), QueueClosed> {
        if self.closed.load(Ordering::Acquire) {
            return Err(QueueClosed);
        }

        self.pending.fetch_add(1, Ordering::AcqRel);
        self.sender.send(order).map_err(|_| {
            self.pending.fetch_sub(1, Ordering::AcqRel);
            QueueClosed
        })
    }

    /// Waits for the next order. Dropping the returned future before it
    /// resolves leaves the queue untouched.
    pub async fn dequeue(&self) -> Option<Order> {
        let mut receiver = self.receiver.lock().await;
        let order = receiver.recv().await?;
        self.pending.fetch_sub(1, Ordering::AcqRel);

        Some(order)
    }

    /// Removes every order still waiting, oldest first. Waits for the
    /// receiver, so only call it while no consumer is parked in `dequeue`.
    pub async fn drain(&self) -> Vec<Order> {
        let mut receiver = self.receiver.lock().await;
        let mut drained = Vec::new();

        while let Ok(order) = receiver.try_recv() {
            self.pending.fetch_sub(1, Ordering::AcqRel);
            drained.push(order);
        }

        drained
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }
}
