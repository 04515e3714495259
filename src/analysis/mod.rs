//! Derived per-transaction values the exporter queries while building records.

use std::collections::HashMap;

use rust_decimal::Decimal;
use uuid::Uuid;

use crate::ledger::{CategoryClass, Endpoint, HoldingKey, Ledger, Transaction};

/// Running-balance view over a ledger.
pub trait Analysis {
    /// Units held in `holding` once `txn` has been applied.
    fn units_after(&self, holding: HoldingKey, txn: Uuid) -> Option<Decimal>;
    /// Unit movement of `holding` caused by `txn`.
    fn unit_delta(&self, holding: HoldingKey, txn: Uuid) -> Option<Decimal>;
    /// Cost basis movement of `holding` caused by `txn`.
    fn cost_delta(&self, holding: HoldingKey, txn: Uuid) -> Option<Decimal>;
    /// Cash valuation movement of `portfolio` caused by `txn`.
    fn cash_delta(&self, portfolio: Uuid, txn: Uuid) -> Option<Decimal>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HoldingSnapshot {
    pub units_after: Decimal,
    pub unit_delta: Option<Decimal>,
    pub cost_delta: Decimal,
}

#[derive(Debug, Clone, Copy, Default)]
struct Position {
    units: Decimal,
    cost: Decimal,
}

/// Average-cost analysis computed in one pass over the ledger.
#[derive(Debug, Default, Clone)]
pub struct LedgerAnalysis {
    holdings: HashMap<(HoldingKey, Uuid), HoldingSnapshot>,
    cash: HashMap<(Uuid, Uuid), Decimal>,
}

impl LedgerAnalysis {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn compute(ledger: &Ledger) -> Self {
        let mut analysis = Self::new();
        let mut positions: HashMap<HoldingKey, Position> = HashMap::new();
        for txn in ledger.transactions.iter().filter(|txn| !txn.is_split_child()) {
            let class = txn
                .category
                .and_then(|id| ledger.category(id))
                .map(|category| category.class);
            analysis.apply_holdings(&mut positions, txn, class);
            analysis.apply_cash(txn);
        }
        tracing::debug!(
            holdings = analysis.holdings.len(),
            cash = analysis.cash.len(),
            "ledger analysis computed"
        );
        analysis
    }

    /// Records a snapshot directly; used by callers that compute positions elsewhere.
    pub fn insert_holding(&mut self, holding: HoldingKey, txn: Uuid, snapshot: HoldingSnapshot) {
        self.holdings.insert((holding, txn), snapshot);
    }

    pub fn insert_cash(&mut self, portfolio: Uuid, txn: Uuid, delta: Decimal) {
        self.cash.insert((portfolio, txn), delta);
    }

    fn apply_holdings(
        &mut self,
        positions: &mut HashMap<HoldingKey, Position>,
        txn: &Transaction,
        class: Option<CategoryClass>,
    ) {
        let debit = txn.debit.holding();
        let credit = txn.credit.holding();
        let basis_only = matches!(
            class,
            Some(CategoryClass::StockSplit) | Some(CategoryClass::UnitAdjust)
        );

        if let (Some(key), Some(other)) = (debit, credit) {
            if key == other {
                let position = positions.entry(key).or_default();
                let delta = txn.unit_delta(key);
                position.units += delta.unwrap_or_default();
                let cost_delta = if basis_only { Decimal::ZERO } else { txn.amount };
                position.cost += cost_delta;
                self.insert_holding(
                    key,
                    txn.id,
                    HoldingSnapshot {
                        units_after: position.units,
                        unit_delta: delta,
                        cost_delta,
                    },
                );
                return;
            }
        }

        let mut moved = Decimal::ZERO;
        if let Some(key) = debit {
            let position = positions.entry(key).or_default();
            let delta = txn.unit_delta(key);
            let out = match delta {
                Some(units) if units < Decimal::ZERO && position.units > Decimal::ZERO => {
                    (position.cost * -units / position.units).round_dp(2)
                }
                Some(_) => Decimal::ZERO,
                None => txn.amount.min(position.cost.max(Decimal::ZERO)),
            };
            position.units += delta.unwrap_or_default();
            position.cost -= out;
            moved = out;
            self.insert_holding(
                key,
                txn.id,
                HoldingSnapshot {
                    units_after: position.units,
                    unit_delta: delta,
                    cost_delta: -out,
                },
            );
        }

        if let Some(key) = credit {
            let carries_basis = debit.is_some()
                && matches!(
                    class,
                    Some(CategoryClass::Takeover)
                        | Some(CategoryClass::Demerger)
                        | Some(CategoryClass::PortfolioTransfer)
                );
            let position = positions.entry(key).or_default();
            let delta = txn.unit_delta(key);
            let cost_delta = if basis_only {
                Decimal::ZERO
            } else if carries_basis {
                moved
            } else {
                txn.amount
            };
            position.units += delta.unwrap_or_default();
            position.cost += cost_delta;
            self.insert_holding(
                key,
                txn.id,
                HoldingSnapshot {
                    units_after: position.units,
                    unit_delta: delta,
                    cost_delta,
                },
            );
        }
    }

    fn apply_cash(&mut self, txn: &Transaction) {
        if let Endpoint::Portfolio(id) = txn.debit {
            *self.cash.entry((id, txn.id)).or_default() -= txn.amount;
        }
        if let Endpoint::Portfolio(id) = txn.credit {
            *self.cash.entry((id, txn.id)).or_default() += txn.amount;
        }
    }
}

impl Analysis for LedgerAnalysis {
    fn units_after(&self, holding: HoldingKey, txn: Uuid) -> Option<Decimal> {
        self.holdings
            .get(&(holding, txn))
            .map(|snapshot| snapshot.units_after)
    }

    fn unit_delta(&self, holding: HoldingKey, txn: Uuid) -> Option<Decimal> {
        self.holdings
            .get(&(holding, txn))
            .and_then(|snapshot| snapshot.unit_delta)
    }

    fn cost_delta(&self, holding: HoldingKey, txn: Uuid) -> Option<Decimal> {
        self.holdings
            .get(&(holding, txn))
            .map(|snapshot| snapshot.cost_delta)
    }

    fn cash_delta(&self, portfolio: Uuid, txn: Uuid) -> Option<Decimal> {
        self.cash.get(&(portfolio, txn)).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{Account, AccountKind, Category, Portfolio, Security};
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2022, 5, day).unwrap()
    }

    #[test]
    fn average_cost_follows_buys_and_sells() {
        let mut ledger = Ledger::new("Analysis", date(1));
        let bank = ledger.add_account(Account::new("Current", AccountKind::Bank));
        let portfolio = ledger.add_portfolio(Portfolio::new("Broker"));
        let security = ledger.add_security(Security::new("Acme", "ACM"));
        let holding = HoldingKey::new(portfolio, security);

        let buy = Transaction::new(
            date(2),
            dec!(100),
            Endpoint::Account(bank),
            Endpoint::Holding(holding),
        )
        .with_credit_units(dec!(10));
        let sell = Transaction::new(
            date(3),
            dec!(80),
            Endpoint::Holding(holding),
            Endpoint::Account(bank),
        )
        .with_debit_units(dec!(4));
        let buy_id = ledger.add_transaction(buy);
        let sell_id = ledger.add_transaction(sell);

        let analysis = LedgerAnalysis::compute(&ledger);
        assert_eq!(analysis.units_after(holding, buy_id), Some(dec!(10)));
        assert_eq!(analysis.cost_delta(holding, buy_id), Some(dec!(100)));
        assert_eq!(analysis.units_after(holding, sell_id), Some(dec!(6)));
        assert_eq!(analysis.unit_delta(holding, sell_id), Some(dec!(-4)));
        assert_eq!(analysis.cost_delta(holding, sell_id), Some(dec!(-40)));
    }

    #[test]
    fn stock_split_keeps_cost() {
        let mut ledger = Ledger::new("Split", date(1));
        let bank = ledger.add_account(Account::new("Current", AccountKind::Bank));
        let portfolio = ledger.add_portfolio(Portfolio::new("Broker"));
        let security = ledger.add_security(Security::new("Acme", "ACM"));
        let split = ledger.add_category(Category::new("Split", CategoryClass::StockSplit));
        let holding = HoldingKey::new(portfolio, security);

        ledger.add_transaction(
            Transaction::new(
                date(2),
                dec!(100),
                Endpoint::Account(bank),
                Endpoint::Holding(holding),
            )
            .with_credit_units(dec!(10)),
        );
        let split_id = ledger.add_transaction(
            Transaction::new(
                date(3),
                Decimal::ZERO,
                Endpoint::Holding(holding),
                Endpoint::Holding(holding),
            )
            .with_category(split)
            .with_credit_units(dec!(10)),
        );

        let analysis = LedgerAnalysis::compute(&ledger);
        assert_eq!(analysis.units_after(holding, split_id), Some(dec!(20)));
        assert_eq!(analysis.cost_delta(holding, split_id), Some(Decimal::ZERO));
    }

    #[test]
    fn portfolio_cash_moves_both_ways() {
        let mut ledger = Ledger::new("Cash", date(1));
        let first = ledger.add_portfolio(Portfolio::new("First"));
        let second = ledger.add_portfolio(Portfolio::new("Second"));
        let txn = ledger.add_transaction(Transaction::new(
            date(2),
            dec!(50),
            Endpoint::Portfolio(first),
            Endpoint::Portfolio(second),
        ));

        let analysis = LedgerAnalysis::compute(&ledger);
        assert_eq!(analysis.cash_delta(first, txn), Some(dec!(-50)));
        assert_eq!(analysis.cash_delta(second, txn), Some(dec!(50)));
    }
}
