use serde::{Deserialize, Serialize};

/// Outcome of one venue call for one order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DispatchResult {
    Success { venue_reference: String },
    Failure { reason: String },
}

impl DispatchResult {
    pub fn success(venue_reference: impl Into<String>) -> Self {
        Self::Success {
            venue_reference: venue_reference.into(),
        }
    }

    pub fn failure(reason: impl Into<String>) -> Self {
        Self::Failure {
            reason: reason.into(),
        }
    }
}

/// Result of flattening every open position on the venue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloseAllOutcome {
    pub closed: usize,
}
