use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Categorises ledger activity; the class drives how a transaction is exported.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Category {
    pub id: Uuid,
    /// Fully qualified name, parent segments separated by `:`.
    pub name: String,
    pub class: CategoryClass,
}

impl Category {
    pub fn new(name: impl Into<String>, class: CategoryClass) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            class,
        }
    }
}

/// Closed classification of ledger categories.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum CategoryClass {
    Expense,
    Income,
    Transfer,
    Cashback,
    Interest,
    IncomeFromParent,
    ExpenseToParent,
    Dividend,
    ReinvestedDividend,
    StockSplit,
    UnitAdjust,
    Demerger,
    Takeover,
    LoyaltyBonus,
    PortfolioTransfer,
    CashTransfer,
    ReturnOfCapital,
}

impl CategoryClass {
    /// Whether money booked against the class counts as income in QIF terms.
    pub fn is_income(self) -> bool {
        matches!(
            self,
            CategoryClass::Income
                | CategoryClass::Cashback
                | CategoryClass::Interest
                | CategoryClass::IncomeFromParent
                | CategoryClass::Dividend
                | CategoryClass::ReinvestedDividend
                | CategoryClass::LoyaltyBonus
        )
    }
}
