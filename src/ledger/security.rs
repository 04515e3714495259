use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Investment account holding cash and securities.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Portfolio {
    pub id: Uuid,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Portfolio {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum SecurityKind {
    #[default]
    Stock,
    MutualFund,
    Bond,
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Security {
    pub id: Uuid,
    pub name: String,
    pub symbol: String,
    #[serde(default)]
    pub kind: SecurityKind,
    #[serde(default)]
    pub prices: Vec<PricePoint>,
}

impl Security {
    pub fn new(name: impl Into<String>, symbol: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            symbol: symbol.into(),
            kind: SecurityKind::Stock,
            prices: Vec::new(),
        }
    }

    pub fn with_price(mut self, date: NaiveDate, price: Decimal) -> Self {
        self.prices.push(PricePoint { date, price });
        self
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub price: Decimal,
}

/// A security held inside a specific portfolio.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct HoldingKey {
    pub portfolio: Uuid,
    pub security: Uuid,
}

impl HoldingKey {
    pub fn new(portfolio: Uuid, security: Uuid) -> Self {
        Self {
            portfolio,
            security,
        }
    }
}
