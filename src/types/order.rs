use std::collections::BTreeMap;
use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum OrderError {
    #[error("symbol must not be empty")]
    EmptySymbol,

    #[error("unknown side: {0}")]
    UnknownSide(String),

    #[error("size must be a positive number, got {0}")]
    InvalidSize(f64),

    #[error("{field} must be a finite number, got {value}")]
    InvalidLevel { field: &'static str, value: f64 },
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

impl FromStr for Side {
    type Err = OrderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "BUY" => Ok(Self::Buy),
            "SELL" => Ok(Self::Sell),
            other => Err(OrderError::UnknownSide(other.to_string())),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(Uuid);

impl OrderId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for OrderId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A validated instruction to trade. Fields are private so an order cannot
/// change once it has been handed to the dispatch queue.
#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    id: OrderId,
    symbol: String,
    side: Side,
    size: f64,
    stop_loss: Option<f64>,
    take_profit: Option<f64>,
    metadata: BTreeMap<String, serde_json::Value>,
    submitted_at: DateTime<Utc>,
}

impl Order {
    pub fn new(symbol: &str, side: Side, size: f64) -> Result<Self, OrderError> {
        let symbol = symbol.trim();
        if symbol.is_empty() {
            return Err(OrderError::EmptySymbol);
        }

        if !size.is_finite() || size <= 0.0 {
            return Err(OrderError::InvalidSize(size));
        }

        Ok(Self {
            id: OrderId::new(),
            symbol: symbol.to_string(),
            side,
            size,
            stop_loss: None,
            take_profit: None,
            metadata: BTreeMap::new(),
            submitted_at: Utc::now(),
        })
    }

    pub fn with_protection(
        mut self,
        stop_loss: Option<f64>,
        take_profit: Option<f64>,
    ) -> Result<Self, OrderError> {
        self.stop_loss = check_level("stop_loss", stop_loss)?;
        self.take_profit = check_level("take_profit", take_profit)?;

        Ok(self)
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn id(&self) -> OrderId {
        self.id
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn size(&self) -> f64 {
        self.size
    }

    pub fn stop_loss(&self) -> Option<f64> {
        self.stop_loss
    }

    pub fn take_profit(&self) -> Option<f64> {
        self.take_profit
    }

    pub fn metadata(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.metadata
    }

    pub fn submitted_at(&self) -> DateTime<Utc> {
        self.submitted_at
    }
}

impl fmt::Display for Order {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.side, self.size, self.symbol)
    }
}

fn check_level(field: &'static str, level: Option<f64>) -> Result<Option<f64>, OrderError> {
    match level {
        Some(value) if !value.is_finite() => Err(OrderError::InvalidLevel { field, value }),
        other => Ok(other),
    }
}

/// Order as it arrives from a caller, before validation.
#[derive(Debug, Clone, Deserialize)]
pub struct OrderRequest {
    pub symbol: String,

    #[serde(alias = "action")]
    pub side: String,

    pub size: f64,

    #[serde(default, alias = "sl")]
    pub stop_loss: Option<f64>,

    #[serde(default, alias = "tp")]
    pub take_profit: Option<f64>,

    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl OrderRequest {
    pub fn into_order(self) -> Result<Order, OrderError> {
        let side = self.side.parse::<Side>()?;
        let mut order = Order::new(&self.symbol, side, self.size)?
            .with_protection(self.stop_loss, self.take_profit)?;

        for (key, value) in self.metadata {
            order = order.with_metadata(key, value);
        }

        Ok(order)
    }
}
