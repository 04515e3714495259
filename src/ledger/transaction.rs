use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::security::HoldingKey;

/// One side of a transaction.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Payee(Uuid),
    Account(Uuid),
    Portfolio(Uuid),
    Holding(HoldingKey),
}

impl Endpoint {
    pub fn holding(&self) -> Option<HoldingKey> {
        match self {
            Endpoint::Holding(key) => Some(*key),
            _ => None,
        }
    }
}

/// Auxiliary monetary fields carried by payroll-style income and expenses.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ExtraDetail {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tax_credit: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub national_insurance: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deemed_benefit: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub charity_donation: Option<Decimal>,
}

impl ExtraDetail {
    pub fn is_empty(&self) -> bool {
        self.tax_credit.is_none()
            && self.national_insurance.is_none()
            && self.deemed_benefit.is_none()
            && self.charity_donation.is_none()
    }
}

/// Ledger transaction; money leaves `debit` and arrives at `credit`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Transaction {
    pub id: Uuid,
    pub date: NaiveDate,
    pub amount: Decimal,
    pub debit: Endpoint,
    pub credit: Endpoint,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(default)]
    pub reconciled: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "ExtraDetail::is_empty")]
    pub extra: ExtraDetail,
    /// Units leaving the debit holding.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debit_units: Option<Decimal>,
    /// Units arriving at the credit holding.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credit_units: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Uuid>,
}

impl Transaction {
    pub fn new(date: NaiveDate, amount: Decimal, debit: Endpoint, credit: Endpoint) -> Self {
        Self {
            id: Uuid::new_v4(),
            date,
            amount,
            debit,
            credit,
            category: None,
            description: None,
            reference: None,
            reconciled: false,
            tags: Vec::new(),
            extra: ExtraDetail::default(),
            debit_units: None,
            credit_units: None,
            parent: None,
            children: Vec::new(),
        }
    }

    pub fn with_category(mut self, category: Uuid) -> Self {
        self.category = Some(category);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn with_extra(mut self, extra: ExtraDetail) -> Self {
        self.extra = extra;
        self
    }

    pub fn with_debit_units(mut self, units: Decimal) -> Self {
        self.debit_units = Some(units);
        self
    }

    pub fn with_credit_units(mut self, units: Decimal) -> Self {
        self.credit_units = Some(units);
        self
    }

    pub fn is_split_parent(&self) -> bool {
        !self.children.is_empty()
    }

    pub fn is_split_child(&self) -> bool {
        self.parent.is_some()
    }

    /// Recorded unit movement of `holding` caused by this transaction.
    pub fn unit_delta(&self, holding: HoldingKey) -> Option<Decimal> {
        let mut delta = None;
        if self.credit == Endpoint::Holding(holding) {
            if let Some(units) = self.credit_units {
                delta = Some(units);
            }
        }
        if self.debit == Endpoint::Holding(holding) {
            if let Some(units) = self.debit_units {
                delta = Some(delta.unwrap_or_default() - units);
            }
        }
        delta
    }
}
