use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::execution::dispatch_result::DispatchResult;
use crate::types::order::{Order, OrderId, Side};

/// One line of the audit log: what was sent and what came back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// RFC 3339, UTC, fixed millisecond width so lines sort as text.
    /// Restamped by [`AuditLog::append`](crate::audit::audit_log::AuditLog::append)
    /// under the file lock.
    pub timestamp: String,
    pub submitted_at: String,
    pub order_id: OrderId,
    pub symbol: String,
    pub side: Side,
    pub size: f64,
    #[serde(default)]
    pub stop_loss: Option<f64>,
    #[serde(default)]
    pub take_profit: Option<f64>,
    pub worker: usize,
    pub result: DispatchResult,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, Value>,
}

impl AuditRecord {
    pub fn new(order: &Order, result: &DispatchResult, worker: usize) -> Self {
        Self::at(Utc::now(), order, result, worker)
    }

    pub fn at(now: DateTime<Utc>, order: &Order, result: &DispatchResult, worker: usize) -> Self {
        Self {
            timestamp: rfc3339(now),
            submitted_at: rfc3339(order.submitted_at()),
            order_id: order.id(),
            symbol: order.symbol().to_string(),
            side: order.side(),
            size: order.size(),
            stop_loss: order.stop_loss(),
            take_profit: order.take_profit(),
            worker,
            result: result.clone(),
            metadata: order.metadata().clone(),
        }
    }

    pub fn stamp(&mut self, now: DateTime<Utc>) {
        self.timestamp = rfc3339(now);
    }
}

fn rfc3339(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}
