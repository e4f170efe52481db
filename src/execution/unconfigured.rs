use anyhow::{Result, bail};

use crate::{
    execution::{
        VenueAdapter,
        dispatch_result::{CloseAllOutcome, DispatchResult},
    },
    types::order::Order,
};

/// Stand-in used when no venue is connected. Orders still flow through the
/// pipeline and are audited as failures.
#[derive(Debug, Default)]
pub struct UnconfiguredVenue;

impl VenueAdapter for UnconfiguredVenue {
    fn name(&self) -> &'static str {
        "none"
    }

    fn execute(&self, _order: &Order) -> Result<DispatchResult> {
        Ok(DispatchResult::failure("no broker configured"))
    }

    fn close_all_positions(&self) -> Result<CloseAllOutcome> {
        bail!("no broker configured")
    }
}
