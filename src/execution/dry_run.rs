use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::Duration;

use anyhow::Result;
use parking_lot::Mutex;
use rand::Rng;
use serde::Deserialize;
use tracing::info;

use crate::{
    execution::{
        VenueAdapter,
        dispatch_result::{CloseAllOutcome, DispatchResult},
    },
    types::order::{Order, Side},
};

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct DryRunConfig {
    /// Roughly one order in this many is rejected. 0 never rejects.
    pub reject_one_in: u32,

    /// Time each call holds its thread, standing in for venue round trips.
    pub latency_ms: u64,
}

impl Default for DryRunConfig {
    fn default() -> Self {
        Self {
            reject_one_in: 10,
            latency_ms: 50,
        }
    }
}

#[derive(Debug, Clone)]
struct PaperPosition {
    symbol: String,
    side: Side,
    size: f64,
}

/// Paper venue. Every accepted order opens a position that stays open until
/// `close_all_positions`.
#[derive(Debug)]
pub struct DryRunVenue {
    config: DryRunConfig,
    next_ticket: AtomicU64,
    positions: Mutex<BTreeMap<u64, PaperPosition>>,
}

impl Default for DryRunVenue {
    fn default() -> Self {
        Self::new(DryRunConfig::default())
    }
}

impl DryRunVenue {
    pub fn new(config: DryRunConfig) -> Self {
        Self {
            config,
            next_ticket: AtomicU64::new(1),
            positions: Mutex::new(BTreeMap::new()),
        }
    }

    #[cfg(test)]
    fn open_positions(&self) -> usize {
        self.positions.lock().len()
    }

    fn simulate_latency(&self) {
        if self.config.latency_ms > 0 {
            thread::sleep(Duration::from_millis(self.config.latency_ms));
        }
    }

    fn will_reject(&self) -> bool {
        if self.config.reject_one_in == 0 {
            return false;
        }

        let mut rng = rand::rng();
        rng.random_range(0..self.config.reject_one_in) == 0
    }
}

impl VenueAdapter for DryRunVenue {
    fn name(&self) -> &'static str {
        "dry-run"
    }

    fn execute(&self, order: &Order) -> Result<DispatchResult> {
        self.simulate_latency();

        if self.will_reject() {
            return Ok(DispatchResult::failure("rejected"));
        }

        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
        self.positions.lock().insert(
            ticket,
            PaperPosition {
                symbol: order.symbol().to_string(),
                side: order.side(),
                size: order.size(),
            },
        );

        Ok(DispatchResult::success(format!("DRY-{ticket}")))
    }

    fn close_all_positions(&self) -> Result<CloseAllOutcome> {
        self.simulate_latency();

        let closed = std::mem::take(&mut *self.positions.lock());
        for (ticket, position) in &closed {
            info!(
                ticket,
                symbol = %position.symbol,
                side = %position.side,
                size = position.size,
                "closing paper position"
            );
        }

        Ok(CloseAllOutcome {
            closed: closed.len(),
        })
    }
}
