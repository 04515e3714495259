use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A plain (non-investment) money account in the source ledger.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Account {
    pub id: Uuid,
    pub name: String,
    pub kind: AccountKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opening_balance: Option<Decimal>,
    /// Category that cash withdrawn into this account is spent against until
    /// a specific payment reclassifies it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_expense: Option<Uuid>,
}

impl Account {
    pub fn new(name: impl Into<String>, kind: AccountKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            kind,
            description: None,
            opening_balance: None,
            auto_expense: None,
        }
    }

    pub fn with_opening_balance(mut self, balance: Decimal) -> Self {
        self.opening_balance = Some(balance);
        self
    }

    pub fn with_auto_expense(mut self, category: Uuid) -> Self {
        self.auto_expense = Some(category);
        self
    }
}

/// Supported plain account kinds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum AccountKind {
    Bank,
    Cash,
    CreditCard,
    Asset,
    Liability,
}

/// External party money is paid to or received from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Payee {
    pub id: Uuid,
    pub name: String,
}

impl Payee {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
        }
    }
}
