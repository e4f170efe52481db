//! Venue doubles shared by the unit tests.

use anyhow::{Result, anyhow};
use parking_lot::Mutex;

use crate::execution::VenueAdapter;
use crate::execution::dispatch_result::{CloseAllOutcome, DispatchResult};
use crate::types::order::Order;

/// Accepts everything and remembers the symbols it saw, in call order.
#[derive(Debug, Default)]
pub struct RecordingVenue {
    pub seen: Mutex<Vec<String>>,
}

impl VenueAdapter for RecordingVenue {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn execute(&self, order: &Order) -> Result<DispatchResult> {
        let mut seen = self.seen.lock();
        seen.push(order.symbol().to_string());
        Ok(DispatchResult::success(format!("REF-{}", seen.len())))
    }

    fn close_all_positions(&self) -> Result<CloseAllOutcome> {
        Ok(CloseAllOutcome {
            closed: self.seen.lock().len(),
        })
    }
}

/// Every call fails at the transport level.
#[derive(Debug, Default)]
pub struct ThrowingVenue;

impl VenueAdapter for ThrowingVenue {
    fn name(&self) -> &'static str {
        "throwing"
    }

    fn execute(&self, _order: &Order) -> Result<DispatchResult> {
        Err(anyhow!("connection reset by peer"))
    }

    fn close_all_positions(&self) -> Result<CloseAllOutcome> {
        Err(anyhow!("terminal not connected"))
    }
}
