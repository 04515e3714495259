use std::{collections::HashMap, fs, path::Path};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{
    account::{Account, Payee},
    category::Category,
    security::{Portfolio, Security},
    transaction::Transaction,
};
use crate::errors::{QifError, Result};

/// Read-only source ledger the exporter translates.
///
/// Transactions are expected in date order; split children follow their parent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ledger {
    pub name: String,
    pub start_date: NaiveDate,
    #[serde(default)]
    pub accounts: Vec<Account>,
    #[serde(default)]
    pub payees: Vec<Payee>,
    #[serde(default)]
    pub portfolios: Vec<Portfolio>,
    #[serde(default)]
    pub securities: Vec<Security>,
    #[serde(default)]
    pub categories: Vec<Category>,
    #[serde(default)]
    pub transactions: Vec<Transaction>,
}

impl Ledger {
    pub fn new(name: impl Into<String>, start_date: NaiveDate) -> Self {
        Self {
            name: name.into(),
            start_date,
            accounts: Vec::new(),
            payees: Vec::new(),
            portfolios: Vec::new(),
            securities: Vec::new(),
            categories: Vec::new(),
            transactions: Vec::new(),
        }
    }

    pub fn add_account(&mut self, account: Account) -> Uuid {
        let id = account.id;
        self.accounts.push(account);
        id
    }

    pub fn add_payee(&mut self, payee: Payee) -> Uuid {
        let id = payee.id;
        self.payees.push(payee);
        id
    }

    pub fn add_portfolio(&mut self, portfolio: Portfolio) -> Uuid {
        let id = portfolio.id;
        self.portfolios.push(portfolio);
        id
    }

    pub fn add_security(&mut self, security: Security) -> Uuid {
        let id = security.id;
        self.securities.push(security);
        id
    }

    pub fn add_category(&mut self, category: Category) -> Uuid {
        let id = category.id;
        self.categories.push(category);
        id
    }

    pub fn add_transaction(&mut self, transaction: Transaction) -> Uuid {
        let id = transaction.id;
        self.transactions.push(transaction);
        id
    }

    /// Appends a split parent followed by its children, linking both ways.
    pub fn add_split(&mut self, mut parent: Transaction, children: Vec<Transaction>) -> Uuid {
        let id = parent.id;
        parent.children = children.iter().map(|child| child.id).collect();
        self.transactions.push(parent);
        for mut child in children {
            child.parent = Some(id);
            self.transactions.push(child);
        }
        id
    }

    pub fn account(&self, id: Uuid) -> Option<&Account> {
        self.accounts.iter().find(|account| account.id == id)
    }

    pub fn payee(&self, id: Uuid) -> Option<&Payee> {
        self.payees.iter().find(|payee| payee.id == id)
    }

    pub fn portfolio(&self, id: Uuid) -> Option<&Portfolio> {
        self.portfolios.iter().find(|portfolio| portfolio.id == id)
    }

    pub fn security(&self, id: Uuid) -> Option<&Security> {
        self.securities.iter().find(|security| security.id == id)
    }

    pub fn category(&self, id: Uuid) -> Option<&Category> {
        self.categories.iter().find(|category| category.id == id)
    }

    pub fn require_account(&self, id: Uuid) -> Result<&Account> {
        self.account(id)
            .ok_or_else(|| QifError::InvalidRef(format!("account {id}")))
    }

    pub fn require_payee(&self, id: Uuid) -> Result<&Payee> {
        self.payee(id)
            .ok_or_else(|| QifError::InvalidRef(format!("payee {id}")))
    }

    pub fn require_portfolio(&self, id: Uuid) -> Result<&Portfolio> {
        self.portfolio(id)
            .ok_or_else(|| QifError::InvalidRef(format!("portfolio {id}")))
    }

    pub fn require_security(&self, id: Uuid) -> Result<&Security> {
        self.security(id)
            .ok_or_else(|| QifError::InvalidRef(format!("security {id}")))
    }

    pub fn require_category(&self, id: Uuid) -> Result<&Category> {
        self.category(id)
            .ok_or_else(|| QifError::InvalidRef(format!("category {id}")))
    }

    /// Index of transactions by id, used to resolve split children.
    pub fn transaction_index(&self) -> HashMap<Uuid, &Transaction> {
        self.transactions.iter().map(|txn| (txn.id, txn)).collect()
    }
}

/// Loads a ledger snapshot from a JSON file.
pub fn load_ledger(path: &Path) -> Result<Ledger> {
    let data = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&data)?)
}
