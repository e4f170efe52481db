pub mod dispatch_queue;
pub mod dispatch_result;
pub mod dry_run;
#[cfg(test)]
pub mod testing;
pub mod unconfigured;
pub mod worker_pool;

use std::sync::Arc;

use anyhow::Result;

use crate::execution::dispatch_result::{CloseAllOutcome, DispatchResult};
use crate::types::order::Order;

pub type DynamicVenue = Arc<dyn VenueAdapter>;

/// Blocking connection to an execution venue.
///
/// Calls may take arbitrarily long and are always made from a blocking
/// thread, never from the async scheduler. A returned `Err` is treated the
/// same as a structured `DispatchResult::Failure`.
pub trait VenueAdapter: Send + Sync {
    fn name(&self) -> &'static str;
    fn execute(&self, order: &Order) -> Result<DispatchResult>;
    fn close_all_positions(&self) -> Result<CloseAllOutcome>;
}
