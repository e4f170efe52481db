use std::sync::Arc;

use crate::{
    config::DeskConfig,
    execution::{DynamicVenue, dry_run::DryRunVenue, unconfigured::UnconfiguredVenue},
    scenario::venues::VenueKind,
};

pub struct Scenario;

impl Scenario {
    pub fn execution_venue(kind: VenueKind, config: &DeskConfig) -> DynamicVenue {
        tracing::info!(venue = %kind, "creating execution venue");

        match kind {
            VenueKind::DryRun => Arc::new(DryRunVenue::new(config.dry_run)),
            VenueKind::Unconfigured => Arc::new(UnconfiguredVenue),
        }
    }
}
