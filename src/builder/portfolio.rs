//! Investment records for transactions touching portfolios or holdings.

use std::rc::Rc;

use rust_decimal::Decimal;

use super::{BuildContext, Emission, HoldingSide, Side, TAX_CREDIT_CATEGORY, TAX_MAN};
use crate::{
    errors::Result,
    ledger::{self, CategoryClass, Transaction},
    qif::{Account, Action, Field, LineType, QifFile, Record},
};

/// Stock split ratios are written as new units per ten old ones.
const RATIO_RADIX: Decimal = Decimal::TEN;
const PRICE_SCALE: u32 = 6;

pub struct PortfolioBuilder<'a> {
    ctx: BuildContext<'a>,
}

impl<'a> PortfolioBuilder<'a> {
    pub fn new(ctx: BuildContext<'a>) -> Self {
        Self { ctx }
    }

    pub(crate) fn build(
        &self,
        file: &mut QifFile,
        txn: &Transaction,
        debit: Side<'a>,
        credit: Side<'a>,
        category: Option<&'a ledger::Category>,
    ) -> Result<Emission> {
        let class = category.map(|category| category.class);
        match (debit, credit) {
            (Side::Holding(from), Side::Holding(to)) => Ok(self.between_holdings(file, txn, from, to, class)),
            (other, Side::Holding(to)) => Ok(self.into_holding(file, txn, other, to, category)),
            (Side::Holding(from), other) => Ok(self.out_of_holding(file, txn, from, other, category)),
            (Side::Portfolio(from), Side::Portfolio(to)) => {
                Ok(self.between_portfolios(file, txn, from, to, category))
            }
            (Side::Portfolio(from), other) => Ok(self.out_of_portfolio(file, txn, from, other, category)),
            (other, Side::Portfolio(to)) => Ok(self.into_portfolio(file, txn, other, to, category)),
            _ => Ok(Emission::Unsupported(
                "no portfolio or holding endpoint".to_string(),
            )),
        }
    }

    /// Unit movement of `holding`, preferring the analysis over the ledger.
    fn units(&self, txn: &Transaction, holding: &HoldingSide) -> Option<Decimal> {
        self.ctx
            .analysis
            .unit_delta(holding.key, txn.id)
            .or_else(|| txn.unit_delta(holding.key))
            .map(|units| units.abs())
            .filter(|units| !units.is_zero())
    }

    fn push(&self, file: &mut QifFile, account: &Rc<Account>, records: Vec<Record>) {
        for record in records {
            file.add_event(account, record);
        }
    }

    /// Share-moving action on `holding`, with a nominal unit and its
    /// correction when units are missing and zero-unit trades are not allowed.
    /// `link` makes the action carry its cash leg inline when the dialect can.
    fn trade(
        &self,
        file: &mut QifFile,
        txn: &Transaction,
        holding: &HoldingSide,
        action: Action,
        units: Option<Decimal>,
        amount: Decimal,
        link: Option<&Rc<Account>>,
    ) -> Vec<Record> {
        let security = self.ctx.security(file, holding.security);
        let link = link.filter(|_| self.ctx.caps.can_xfer_portfolio);
        let booked = if link.is_some() { action.linked() } else { action };
        let mut record = self.ctx.action(txn, booked, Some(&security));
        let mut correction = None;

        if let Some(reverse) = action.unit_correction() {
            match units {
                Some(units) => {
                    record.add_line(LineType::Quantity, Field::Units(units));
                    if let Some(price) = amount.checked_div(units).filter(|price| !price.is_zero()) {
                        record.add_line(LineType::Price, Field::Price(price.round_dp(PRICE_SCALE)));
                    }
                }
                None if self.ctx.caps.can_trade_zero_shares => {
                    record.add_line(LineType::Quantity, Field::Units(Decimal::ZERO));
                }
                None => {
                    record
                        .add_line(LineType::Quantity, Field::Units(Decimal::ONE))
                        .add_line(LineType::Price, Field::Price(amount));
                    correction = Some(
                        self.ctx
                            .action(txn, reverse, Some(&security))
                            .with_line(LineType::Quantity, Field::Units(Decimal::ONE)),
                    );
                }
            }
        }
        if !amount.is_zero() {
            record.add_line(LineType::Amount, Field::Money(amount));
        }
        if let Some(account) = link {
            let field = self.ctx.account_field(file, txn, account);
            record
                .add_line(LineType::Category, field)
                .add_line(LineType::TransferAmount, Field::Money(amount));
        }

        let mut records = vec![record];
        records.extend(correction);
        records
    }

    /// Trade settled in cash against `counterpart`.
    #[allow(clippy::too_many_arguments)]
    fn linked_trade(
        &self,
        file: &mut QifFile,
        txn: &Transaction,
        holding: &HoldingSide,
        action: Action,
        units: Option<Decimal>,
        amount: Decimal,
        counterpart: &Rc<Account>,
    ) {
        let portfolio = self.ctx.portfolio_account(file, holding.portfolio);
        let buying = matches!(action, Action::Buy | Action::ShrsIn | Action::ReinvDiv);
        let into_counterpart = if buying { -amount } else { amount };

        if self.ctx.caps.can_xfer_portfolio {
            let records = self.trade(file, txn, holding, action, units, amount, Some(counterpart));
            self.push(file, &portfolio, records);
            if !self.ctx.caps.hide_balancing_transfer {
                self.ctx.cash_leg(file, txn, counterpart, &portfolio, into_counterpart);
            }
            return;
        }

        if buying {
            self.ctx.cash_leg(file, txn, &portfolio, counterpart, amount);
        }
        let records = self.trade(file, txn, holding, action, units, amount, None);
        self.push(file, &portfolio, records);
        if !buying {
            self.ctx.cash_leg(file, txn, &portfolio, counterpart, -amount);
        }
        self.ctx.cash_leg(file, txn, counterpart, &portfolio, into_counterpart);
    }

    /// Capital returned from `holding` without units leaving it.
    fn return_capital(
        &self,
        file: &mut QifFile,
        txn: &Transaction,
        holding: &HoldingSide,
        amount: Decimal,
        counterpart: Option<&Rc<Account>>,
    ) {
        let action = if self.ctx.caps.can_return_capital {
            Action::RtrnCap
        } else {
            Action::Sell
        };
        match counterpart {
            Some(counterpart) => {
                self.linked_trade(file, txn, holding, action, None, amount, counterpart)
            }
            None => {
                let portfolio = self.ctx.portfolio_account(file, holding.portfolio);
                let records = self.trade(file, txn, holding, action, None, amount, None);
                self.push(file, &portfolio, records);
            }
        }
    }

    /// Investment record booking income or an expense against a payee.
    fn payee_action(
        &self,
        file: &mut QifFile,
        txn: &Transaction,
        action: Action,
        security: Option<&HoldingSide>,
        payee: &str,
        category: Option<&ledger::Category>,
        amount: Decimal,
    ) -> Record {
        let security = security.map(|holding| self.ctx.security(file, holding.security));
        let payee = self.ctx.payee_field(file, payee);
        let mut record = self
            .ctx
            .action(txn, action, security.as_ref())
            .with_line(LineType::Amount, Field::Money(amount))
            .with_line(LineType::Payee, payee);
        if let Some(category) = category {
            let field = self.ctx.category_field(file, txn, category);
            record.add_line(LineType::Category, field);
        }
        record
    }

    fn into_holding(
        &self,
        file: &mut QifFile,
        txn: &Transaction,
        other: Side<'a>,
        holding: HoldingSide<'a>,
        category: Option<&'a ledger::Category>,
    ) -> Emission {
        let units = self.units(txn, &holding);
        let loyalty = category.map(|category| category.class) == Some(CategoryClass::LoyaltyBonus);
        match other {
            Side::Payee(payee) => self.income_to_holding(file, txn, &holding, &payee.name, category, units),
            other if loyalty => self.income_to_holding(file, txn, &holding, other.name(), category, units),
            Side::Portfolio(portfolio) if portfolio.id == holding.key.portfolio => {
                let account = self.ctx.portfolio_account(file, portfolio);
                let records = self.trade(file, txn, &holding, Action::Buy, units, txn.amount, None);
                self.push(file, &account, records);
                Emission::Emitted
            }
            other => match self.ctx.counterpart(file, &other) {
                Some(counterpart) => {
                    self.linked_trade(file, txn, &holding, Action::Buy, units, txn.amount, &counterpart);
                    Emission::Emitted
                }
                None => unsupported(txn, "purchase source"),
            },
        }
    }

    /// Security bought with income; the cash leg runs through the
    /// portfolio's holding account when the dialect books income there.
    fn income_to_holding(
        &self,
        file: &mut QifFile,
        txn: &Transaction,
        holding: &HoldingSide,
        payee: &str,
        category: Option<&ledger::Category>,
        units: Option<Decimal>,
    ) -> Emission {
        if self.ctx.caps.use_investment_holding_for_category {
            let cash = file.register_holding_account(&holding.portfolio.name);
            let payee = self.ctx.payee_field(file, payee);
            let mut record = self.ctx.event(txn, txn.amount).with_line(LineType::Payee, payee);
            if let Some(category) = category {
                let field = self.ctx.category_field(file, txn, category);
                record.add_line(LineType::Category, field);
            }
            file.add_event(&cash, record);
            self.linked_trade(file, txn, holding, Action::Buy, units, txn.amount, &cash);
        } else {
            let portfolio = self.ctx.portfolio_account(file, holding.portfolio);
            let income =
                self.payee_action(file, txn, Action::MiscInc, Some(holding), payee, category, txn.amount);
            file.add_event(&portfolio, income);
            let records = self.trade(file, txn, holding, Action::Buy, units, txn.amount, None);
            self.push(file, &portfolio, records);
        }
        Emission::Emitted
    }

    fn out_of_holding(
        &self,
        file: &mut QifFile,
        txn: &Transaction,
        holding: HoldingSide<'a>,
        other: Side<'a>,
        category: Option<&'a ledger::Category>,
    ) -> Emission {
        let class = category.map(|category| category.class);
        let units = self.units(txn, &holding);
        if class == Some(CategoryClass::Dividend) {
            return self.dividend(file, txn, &holding, other, category);
        }
        match other {
            Side::Payee(payee) => self.expense_from_holding(file, txn, &holding, &payee.name, category, units),
            Side::Portfolio(portfolio) if portfolio.id == holding.key.portfolio => {
                match units.filter(|_| class != Some(CategoryClass::ReturnOfCapital)) {
                    Some(units) => {
                        let account = self.ctx.portfolio_account(file, portfolio);
                        let records =
                            self.trade(file, txn, &holding, Action::Sell, Some(units), txn.amount, None);
                        self.push(file, &account, records);
                    }
                    None => self.return_capital(file, txn, &holding, txn.amount, None),
                }
                Emission::Emitted
            }
            other => match self.ctx.counterpart(file, &other) {
                Some(counterpart) => {
                    match units.filter(|_| class != Some(CategoryClass::ReturnOfCapital)) {
                        Some(units) => self.linked_trade(
                            file,
                            txn,
                            &holding,
                            Action::Sell,
                            Some(units),
                            txn.amount,
                            &counterpart,
                        ),
                        None => self.return_capital(file, txn, &holding, txn.amount, Some(&counterpart)),
                    }
                    Emission::Emitted
                }
                None => unsupported(txn, "sale destination"),
            },
        }
    }

    /// Security sold to pay a payee.
    fn expense_from_holding(
        &self,
        file: &mut QifFile,
        txn: &Transaction,
        holding: &HoldingSide,
        payee: &str,
        category: Option<&ledger::Category>,
        units: Option<Decimal>,
    ) -> Emission {
        if self.ctx.caps.use_investment_holding_for_category {
            let cash = file.register_holding_account(&holding.portfolio.name);
            self.linked_trade(file, txn, holding, Action::Sell, units, txn.amount, &cash);
            let payee = self.ctx.payee_field(file, payee);
            let mut record = self.ctx.event(txn, -txn.amount).with_line(LineType::Payee, payee);
            if let Some(category) = category {
                let field = self.ctx.category_field(file, txn, category);
                record.add_line(LineType::Category, field);
            }
            file.add_event(&cash, record);
        } else {
            let portfolio = self.ctx.portfolio_account(file, holding.portfolio);
            let records = self.trade(file, txn, holding, Action::Sell, units, txn.amount, None);
            self.push(file, &portfolio, records);
            let expense =
                self.payee_action(file, txn, Action::MiscExp, Some(holding), payee, category, txn.amount);
            file.add_event(&portfolio, expense);
        }
        Emission::Emitted
    }

    /// Dividend paid by `holding`, with any tax credit booked beside it.
    fn dividend(
        &self,
        file: &mut QifFile,
        txn: &Transaction,
        holding: &HoldingSide,
        other: Side<'a>,
        category: Option<&ledger::Category>,
    ) -> Emission {
        let paid_to = match other {
            Side::Payee(_) => None,
            Side::Portfolio(target) if target.id == holding.key.portfolio => None,
            other => match self.ctx.counterpart(file, &other) {
                Some(counterpart) => Some(counterpart),
                None => return unsupported(txn, "dividend destination"),
            },
        };
        let portfolio = self.ctx.portfolio_account(file, holding.portfolio);
        let security = self.ctx.security(file, holding.security);
        let mut dividend = self
            .ctx
            .action(txn, Action::Div, Some(&security))
            .with_line(LineType::Amount, Field::Money(txn.amount));
        if let Some(category) = category {
            let field = self.ctx.category_field(file, txn, category);
            dividend.add_line(LineType::Category, field);
        }

        match paid_to {
            None => file.add_event(&portfolio, dividend),
            Some(counterpart) if self.ctx.caps.can_xfer_portfolio => {
                let link = self.ctx.account_field(file, txn, &counterpart);
                dividend
                    .add_line(LineType::Action, Field::Action(Action::DivX))
                    .add_line(LineType::Category, link)
                    .add_line(LineType::TransferAmount, Field::Money(txn.amount));
                file.add_event(&portfolio, dividend);
                if !self.ctx.caps.hide_balancing_transfer {
                    self.ctx.cash_leg(file, txn, &counterpart, &portfolio, txn.amount);
                }
            }
            Some(counterpart) => {
                file.add_event(&portfolio, dividend);
                self.ctx.cash_leg(file, txn, &portfolio, &counterpart, -txn.amount);
                self.ctx.cash_leg(file, txn, &counterpart, &portfolio, txn.amount);
            }
        }

        if let Some(credit) = txn.extra.tax_credit.filter(|credit| !credit.is_zero()) {
            let tax = file.register_category(TAX_CREDIT_CATEGORY, false);
            let target = Field::category(tax, Vec::new());
            let payee = self.ctx.payee_field(file, TAX_MAN);
            let base = self
                .ctx
                .action(txn, Action::MiscInc, Some(&security))
                .with_line(LineType::Amount, Field::Money(credit))
                .with_line(LineType::Payee, payee)
                .with_line(LineType::Category, target);
            if self.ctx.caps.use_misc_inc_x_for_tax_credit {
                let record = base
                    .with_line(LineType::Action, Field::Action(Action::MiscIncX))
                    .with_line(LineType::TransferAmount, Field::Money(credit));
                file.add_event(&portfolio, record);
            } else {
                let expense = base
                    .clone()
                    .with_line(LineType::Action, Field::Action(Action::MiscExp));
                file.add_event(&portfolio, base);
                file.add_event(&portfolio, expense);
            }
        }
        Emission::Emitted
    }

    fn between_holdings(
        &self,
        file: &mut QifFile,
        txn: &Transaction,
        from: HoldingSide<'a>,
        to: HoldingSide<'a>,
        class: Option<CategoryClass>,
    ) -> Emission {
        if from.key == to.key {
            return match class {
                Some(CategoryClass::StockSplit) => self.stock_split(file, txn, &from),
                Some(CategoryClass::ReinvestedDividend | CategoryClass::Dividend) => {
                    self.reinvest(file, txn, &from)
                }
                _ => self.unit_adjust(file, txn, &from),
            };
        }
        match class {
            Some(CategoryClass::ReinvestedDividend) => self.reinvest(file, txn, &to),
            Some(CategoryClass::Demerger) => self.demerger(file, txn, &from, &to),
            Some(CategoryClass::Takeover | CategoryClass::PortfolioTransfer) => {
                self.move_shares(file, txn, &from, &to)
            }
            _ => self.exchange(file, txn, &from, &to),
        }
    }

    /// Split of `holding` as a ratio of units after to units before, per ten.
    fn stock_split(&self, file: &mut QifFile, txn: &Transaction, holding: &HoldingSide) -> Emission {
        if !self.ctx.caps.use_stock_split {
            return self.unit_adjust(file, txn, holding);
        }
        let delta = self
            .ctx
            .analysis
            .unit_delta(holding.key, txn.id)
            .or_else(|| txn.unit_delta(holding.key))
            .unwrap_or_default();
        let after = self
            .ctx
            .analysis
            .units_after(holding.key, txn.id)
            .unwrap_or_default();
        let ratio = after
            .checked_sub(delta)
            .and_then(|before| after.checked_div(before))
            .and_then(|ratio| ratio.checked_mul(RATIO_RADIX));
        let Some(ratio) = ratio else {
            return Emission::Unsupported(format!(
                "stock split of {} has no representable ratio",
                holding.security.name
            ));
        };
        let portfolio = self.ctx.portfolio_account(file, holding.portfolio);
        let security = self.ctx.security(file, holding.security);
        let record = self
            .ctx
            .action(txn, Action::StkSplit, Some(&security))
            .with_line(LineType::Quantity, Field::Ratio(ratio.round_dp(PRICE_SCALE)));
        file.add_event(&portfolio, record);
        Emission::Emitted
    }

    fn unit_adjust(&self, file: &mut QifFile, txn: &Transaction, holding: &HoldingSide) -> Emission {
        let delta = self
            .ctx
            .analysis
            .unit_delta(holding.key, txn.id)
            .or_else(|| txn.unit_delta(holding.key))
            .filter(|delta| !delta.is_zero());
        let Some(delta) = delta else {
            return Emission::Unsupported(format!(
                "unit adjustment of {} without a unit change",
                holding.security.name
            ));
        };
        let action = if delta > Decimal::ZERO {
            Action::ShrsIn
        } else {
            Action::ShrsOut
        };
        let portfolio = self.ctx.portfolio_account(file, holding.portfolio);
        let records = self.trade(file, txn, holding, action, Some(delta.abs()), Decimal::ZERO, None);
        self.push(file, &portfolio, records);
        Emission::Emitted
    }

    /// Dividend reinvested into `holding`; cash the portfolio kept is paid as a plain dividend.
    fn reinvest(&self, file: &mut QifFile, txn: &Transaction, holding: &HoldingSide) -> Emission {
        let units = self.units(txn, holding);
        let residual = self
            .ctx
            .analysis
            .cash_delta(holding.key.portfolio, txn.id)
            .filter(|cash| *cash > Decimal::ZERO && *cash < txn.amount)
            .unwrap_or_default();
        let portfolio = self.ctx.portfolio_account(file, holding.portfolio);
        let records = self.trade(file, txn, holding, Action::ReinvDiv, units, txn.amount - residual, None);
        self.push(file, &portfolio, records);
        if !residual.is_zero() {
            let security = self.ctx.security(file, holding.security);
            let record = self
                .ctx
                .action(txn, Action::Div, Some(&security))
                .with_line(LineType::Amount, Field::Money(residual));
            file.add_event(&portfolio, record);
        }
        Emission::Emitted
    }

    /// Part of the cost of `from` moved into new units of `to`.
    fn demerger(
        &self,
        file: &mut QifFile,
        txn: &Transaction,
        from: &HoldingSide,
        to: &HoldingSide,
    ) -> Emission {
        let cost = self.moved_cost(txn, to);
        self.return_capital(file, txn, from, cost, None);
        let target = self.ctx.portfolio_account(file, to.portfolio);
        let records = self.trade(file, txn, to, Action::ShrsIn, self.units(txn, to), cost, None);
        self.push(file, &target, records);
        Emission::Emitted
    }

    /// Units leave `from` and arrive in `to` at the same cost.
    fn move_shares(
        &self,
        file: &mut QifFile,
        txn: &Transaction,
        from: &HoldingSide,
        to: &HoldingSide,
    ) -> Emission {
        let cost = self.moved_cost(txn, to);
        let out_units = self.units(txn, from);
        let in_units = self.units(txn, to).or(out_units);
        let source = self.ctx.portfolio_account(file, from.portfolio);
        let records = self.trade(file, txn, from, Action::ShrsOut, out_units, cost, None);
        self.push(file, &source, records);
        let target = self.ctx.portfolio_account(file, to.portfolio);
        let records = self.trade(file, txn, to, Action::ShrsIn, in_units, cost, None);
        self.push(file, &target, records);
        Emission::Emitted
    }

    /// Sale of `from` funding a purchase of `to`.
    fn exchange(
        &self,
        file: &mut QifFile,
        txn: &Transaction,
        from: &HoldingSide,
        to: &HoldingSide,
    ) -> Emission {
        let out_units = self.units(txn, from);
        let in_units = self.units(txn, to);
        let target = self.ctx.portfolio_account(file, to.portfolio);
        if from.key.portfolio == to.key.portfolio {
            let mut records = self.trade(file, txn, from, Action::Sell, out_units, txn.amount, None);
            records.extend(self.trade(file, txn, to, Action::Buy, in_units, txn.amount, None));
            self.push(file, &target, records);
        } else {
            self.linked_trade(file, txn, from, Action::Sell, out_units, txn.amount, &target);
            let records = self.trade(file, txn, to, Action::Buy, in_units, txn.amount, None);
            self.push(file, &target, records);
        }
        Emission::Emitted
    }

    fn moved_cost(&self, txn: &Transaction, to: &HoldingSide) -> Decimal {
        self.ctx
            .analysis
            .cost_delta(to.key, txn.id)
            .filter(|cost| !cost.is_zero())
            .unwrap_or(txn.amount)
    }

    fn between_portfolios(
        &self,
        file: &mut QifFile,
        txn: &Transaction,
        from: &ledger::Portfolio,
        to: &ledger::Portfolio,
        category: Option<&ledger::Category>,
    ) -> Emission {
        match category.map(|category| category.class) {
            None
            | Some(CategoryClass::Transfer)
            | Some(CategoryClass::CashTransfer)
            | Some(CategoryClass::PortfolioTransfer) => {
                if from.id == to.id {
                    return Emission::Unsupported(format!("transfer within portfolio {}", from.name));
                }
                let source = self.ctx.portfolio_account(file, from);
                let target = self.ctx.portfolio_account(file, to);
                self.ctx.transfer_cash(file, txn, &target, &source, txn.amount);
                Emission::Emitted
            }
            Some(class @ (CategoryClass::Income
            | CategoryClass::Interest
            | CategoryClass::Dividend
            | CategoryClass::LoyaltyBonus
            | CategoryClass::Cashback)) => {
                let source = self.ctx.portfolio_account(file, from);
                let record = self.payee_action(
                    file,
                    txn,
                    income_action(class),
                    None,
                    &from.name,
                    category,
                    txn.amount,
                );
                file.add_event(&source, record);
                if from.id != to.id {
                    let target = self.ctx.portfolio_account(file, to);
                    self.ctx.transfer_cash(file, txn, &target, &source, txn.amount);
                }
                Emission::Emitted
            }
            Some(class) => Emission::Unsupported(format!(
                "category class {class:?} between portfolios"
            )),
        }
    }

    fn out_of_portfolio(
        &self,
        file: &mut QifFile,
        txn: &Transaction,
        portfolio: &ledger::Portfolio,
        other: Side<'a>,
        category: Option<&ledger::Category>,
    ) -> Emission {
        match other {
            Side::Payee(payee) => {
                let account = self.ctx.portfolio_account(file, portfolio);
                let record =
                    self.payee_action(file, txn, Action::MiscExp, None, &payee.name, category, txn.amount);
                file.add_event(&account, record);
                Emission::Emitted
            }
            other => match self.ctx.counterpart(file, &other) {
                Some(counterpart) => {
                    let account = self.ctx.portfolio_account(file, portfolio);
                    self.ctx.transfer_cash(file, txn, &account, &counterpart, -txn.amount);
                    Emission::Emitted
                }
                None => unsupported(txn, "withdrawal destination"),
            },
        }
    }

    fn into_portfolio(
        &self,
        file: &mut QifFile,
        txn: &Transaction,
        other: Side<'a>,
        portfolio: &ledger::Portfolio,
        category: Option<&ledger::Category>,
    ) -> Emission {
        match other {
            Side::Payee(payee) => {
                let account = self.ctx.portfolio_account(file, portfolio);
                let action = category
                    .map(|category| income_action(category.class))
                    .unwrap_or(Action::MiscInc);
                let record = self.payee_action(file, txn, action, None, &payee.name, category, txn.amount);
                file.add_event(&account, record);
                Emission::Emitted
            }
            other => match self.ctx.counterpart(file, &other) {
                Some(counterpart) => {
                    let account = self.ctx.portfolio_account(file, portfolio);
                    self.ctx.transfer_cash(file, txn, &account, &counterpart, txn.amount);
                    Emission::Emitted
                }
                None => unsupported(txn, "deposit source"),
            },
        }
    }
}

fn income_action(class: CategoryClass) -> Action {
    match class {
        CategoryClass::Interest => Action::IntInc,
        CategoryClass::Dividend => Action::Div,
        _ => Action::MiscInc,
    }
}

fn unsupported(txn: &Transaction, what: &str) -> Emission {
    Emission::Unsupported(format!("unsupported {what} for transaction {}", txn.id))
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::super::test_support::*;
    use super::super::{BuildContext, EventBuilder};
    use super::*;
    use crate::{
        analysis::{HoldingSnapshot, LedgerAnalysis},
        config::{Capabilities, FileType},
        ledger::{Endpoint, ExtraDetail, HoldingKey, Portfolio, Security},
    };

    fn buy_without_units(caps: Capabilities) -> (QifFile, Vec<Action>) {
        let mut fixture = Fixture::new();
        let holding = fixture.holding();
        fixture.add(1, dec!(100), Endpoint::Account(fixture.current), holding);
        let (file, _) = fixture.build(caps);
        let actions = actions(file.events_for("Broker"));
        (file, actions)
    }

    #[test]
    fn zero_unit_trade_gets_a_nominal_correction() {
        let caps = Capabilities {
            can_xfer_portfolio: true,
            can_trade_zero_shares: false,
            ..Capabilities::default()
        };
        let (file, actions) = buy_without_units(caps);
        assert_eq!(actions, vec![Action::BuyX, Action::ShrsOut]);
        let events = file.events_for("Broker");
        assert_eq!(events[0].quantity(), Some(dec!(1)));
        assert_eq!(events[1].quantity(), Some(dec!(1)));
        assert_eq!(target(&events[0]).as_deref(), Some("[Current]"));
        assert_eq!(file.events_for("Current")[0].amount(), Some(dec!(-100)));
    }

    #[test]
    fn zero_unit_trade_is_kept_when_allowed() {
        let caps = Capabilities {
            can_xfer_portfolio: true,
            can_trade_zero_shares: true,
            ..Capabilities::default()
        };
        let (file, actions) = buy_without_units(caps);
        assert_eq!(actions, vec![Action::BuyX]);
        assert_eq!(file.events_for("Broker")[0].quantity(), Some(dec!(0)));
    }

    #[test]
    fn unlinked_purchase_moves_cash_in_first() {
        let mut fixture = Fixture::new();
        let holding = fixture.holding();
        let txn = Transaction::new(date(2020, 3, 1), dec!(500), Endpoint::Account(fixture.current), holding)
            .with_credit_units(dec!(10));
        fixture.push(txn);

        let (file, _) = fixture.build(Capabilities::default());
        let events = file.events_for("Broker");
        assert_eq!(actions(events), vec![Action::XIn, Action::Buy]);
        assert_eq!(events[1].quantity(), Some(dec!(10)));
        assert_eq!(events[1].line(LineType::Price), Some(&Field::Price(dec!(50))));
        assert_eq!(file.events_for("Current")[0].amount(), Some(dec!(-500)));
        assert!(file.get_account("Broker").unwrap().is_investment());
    }

    #[test]
    fn loyalty_bonus_is_income_not_a_transfer() {
        let mut fixture = Fixture::new();
        let bonus = fixture.category("Loyalty", CategoryClass::LoyaltyBonus);
        let holding = fixture.holding();
        let txn = Transaction::new(date(2020, 3, 1), dec!(8), Endpoint::Account(fixture.current), holding)
            .with_category(bonus)
            .with_credit_units(dec!(2));
        fixture.push(txn);

        let (file, _) = fixture.build(Capabilities::default());
        assert_eq!(actions(file.events_for("Broker")), vec![Action::MiscInc, Action::Buy]);
        assert!(file.events_for("Current").is_empty());
    }

    #[test]
    fn holding_account_carries_income_cash() {
        let mut fixture = Fixture::new();
        let bonus = fixture.category("Bonus", CategoryClass::Income);
        let holding = fixture.holding();
        let txn = Transaction::new(date(2020, 3, 1), dec!(8), Endpoint::Payee(fixture.employer), holding)
            .with_category(bonus)
            .with_credit_units(dec!(2));
        fixture.push(txn);
        let caps = Capabilities {
            use_investment_holding_for_category: true,
            ..Capabilities::default()
        };

        let (file, _) = fixture.build(caps);
        let cash = file.events_for("Broker Holding");
        assert_eq!(cash.len(), 2);
        assert_eq!(cash[0].amount(), Some(dec!(8)));
        assert_eq!(target(&cash[0]).as_deref(), Some("Bonus"));
        assert_eq!(cash[1].amount(), Some(dec!(-8)));
        assert_eq!(actions(file.events_for("Broker")), vec![Action::XIn, Action::Buy]);
    }

    #[test]
    fn dividend_tax_credit_as_misc_inc_x() {
        let mut fixture = Fixture::new();
        let dividend = fixture.category("Dividends", CategoryClass::Dividend);
        let holding = fixture.holding();
        let txn = Transaction::new(date(2020, 3, 1), dec!(30), holding, Endpoint::Account(fixture.current))
            .with_category(dividend)
            .with_extra(ExtraDetail {
                tax_credit: Some(dec!(3)),
                ..ExtraDetail::default()
            });
        fixture.push(txn);

        let (file, _) = fixture.build(FileType::Quicken.capabilities());
        let events = file.events_for("Broker");
        assert_eq!(actions(events), vec![Action::DivX, Action::MiscIncX]);
        assert_eq!(payee(&events[1]).as_deref(), Some(TAX_MAN));
        assert_eq!(target(&events[1]).as_deref(), Some(TAX_CREDIT_CATEGORY));
        assert!(file.events_for("Current").is_empty());
    }

    #[test]
    fn dividend_tax_credit_as_income_expense_pair() {
        let mut fixture = Fixture::new();
        let dividend = fixture.category("Dividends", CategoryClass::Dividend);
        let holding = fixture.holding();
        let txn = Transaction::new(date(2020, 3, 1), dec!(30), holding, Endpoint::Account(fixture.current))
            .with_category(dividend)
            .with_extra(ExtraDetail {
                tax_credit: Some(dec!(3)),
                ..ExtraDetail::default()
            });
        fixture.push(txn);

        let (file, _) = fixture.build(Capabilities::default());
        assert_eq!(
            actions(file.events_for("Broker")),
            vec![Action::Div, Action::XOut, Action::MiscInc, Action::MiscExp]
        );
        assert_eq!(file.events_for("Current")[0].amount(), Some(dec!(30)));
    }

    #[test]
    fn return_of_capital_without_units() {
        let build = |caps: Capabilities| {
            let mut fixture = Fixture::new();
            let holding = fixture.holding();
            fixture.add(1, dec!(50), holding, Endpoint::Account(fixture.current));
            let (file, _) = fixture.build(caps);
            actions(file.events_for("Broker"))
        };

        let caps = Capabilities {
            can_return_capital: true,
            can_xfer_portfolio: true,
            ..Capabilities::default()
        };
        assert_eq!(build(caps), vec![Action::RtrnCapX]);
        assert_eq!(build(Capabilities::default()), vec![Action::Sell, Action::XOut]);
    }

    #[test]
    fn stock_split_ratio_is_scaled_by_ten() {
        let mut fixture = Fixture::new();
        let split = fixture.category("Split", CategoryClass::StockSplit);
        let holding = fixture.holding();
        let buy = Transaction::new(date(2020, 3, 1), dec!(100), Endpoint::Account(fixture.current), holding)
            .with_credit_units(dec!(10));
        fixture.push(buy);
        let txn = Transaction::new(date(2020, 3, 2), dec!(0), holding, holding)
            .with_category(split)
            .with_credit_units(dec!(10));
        fixture.push(txn);

        let (file, _) = fixture.build(Capabilities::default());
        let events = file.events_for("Broker");
        let record = events.last().unwrap();
        assert_eq!(record.action(), Some(Action::StkSplit));
        assert_eq!(record.line(LineType::Quantity), Some(&Field::Ratio(dec!(20))));

        let caps = Capabilities {
            use_stock_split: false,
            ..Capabilities::default()
        };
        let (file, _) = fixture.build(caps);
        let record = file.events_for("Broker").last().unwrap().clone();
        assert_eq!(record.action(), Some(Action::ShrsIn));
        assert_eq!(record.quantity(), Some(dec!(10)));
    }

    #[test]
    fn stock_split_with_an_unrepresentable_ratio_is_dropped() {
        let mut fixture = Fixture::new();
        let split = fixture.category("Split", CategoryClass::StockSplit);
        let holding = fixture.holding();
        let txn = Transaction::new(date(2020, 3, 2), dec!(0), holding, holding)
            .with_category(split)
            .with_credit_units(dec!(10000000000));
        let id = fixture.push(txn.clone());

        let mut analysis = LedgerAnalysis::new();
        analysis.insert_holding(
            HoldingKey::new(fixture.broker, fixture.acme),
            id,
            HoldingSnapshot {
                units_after: Decimal::from_i128_with_scale(10_000_000_000_000_000_000_000_000_001, 18),
                unit_delta: Some(dec!(10000000000)),
                cost_delta: Decimal::ZERO,
            },
        );
        let ctx = BuildContext::new(&fixture.ledger, &analysis, Capabilities::default());
        let mut file = QifFile::new(FileType::Generic);
        let emission = EventBuilder::new(ctx).build(&mut file, &txn).unwrap();

        assert!(matches!(emission, Emission::Unsupported(_)));
        assert!(file.events_for("Broker").is_empty());
        assert!(file.get_account("Broker").is_none());
    }

    #[test]
    fn stock_split_without_units_held_is_dropped() {
        let mut fixture = Fixture::new();
        let split = fixture.category("Split", CategoryClass::StockSplit);
        let holding = fixture.holding();
        let txn = Transaction::new(date(2020, 3, 2), dec!(0), holding, holding)
            .with_category(split)
            .with_credit_units(dec!(10));
        fixture.push(txn);

        let (_, report) = fixture.build(Capabilities::default());
        assert_eq!(report.dropped.len(), 1);
    }

    #[test]
    fn reinvested_dividend_pays_out_the_residual() {
        let mut fixture = Fixture::new();
        let reinvest = fixture.category("Reinvest", CategoryClass::ReinvestedDividend);
        let holding = fixture.holding();
        let txn = Transaction::new(date(2020, 3, 1), dec!(100), holding, holding)
            .with_category(reinvest)
            .with_credit_units(dec!(5));
        let id = fixture.push(txn.clone());

        let mut analysis = LedgerAnalysis::compute(&fixture.ledger);
        analysis.insert_cash(fixture.broker, id, dec!(4));
        let ctx = BuildContext::new(&fixture.ledger, &analysis, Capabilities::default());
        let mut file = QifFile::new(FileType::Generic);
        let emission = EventBuilder::new(ctx).build(&mut file, &txn).unwrap();

        assert_eq!(emission, Emission::Emitted);
        let events = file.events_for("Broker");
        assert_eq!(actions(events), vec![Action::ReinvDiv, Action::Div]);
        assert_eq!(events[0].amount(), Some(dec!(96)));
        assert_eq!(events[1].amount(), Some(dec!(4)));
    }

    #[test]
    fn portfolio_transfers_depend_on_the_category() {
        let mut fixture = Fixture::new();
        let isa = fixture.ledger.add_portfolio(Portfolio::new("ISA"));
        let transfer = fixture.category("Move", CategoryClass::CashTransfer);
        let food = fixture.category("Food", CategoryClass::Expense);
        let moved = Transaction::new(date(2020, 3, 1), dec!(70), Endpoint::Portfolio(fixture.broker), Endpoint::Portfolio(isa))
            .with_category(transfer);
        fixture.push(moved);
        let odd = Transaction::new(date(2020, 3, 2), dec!(5), Endpoint::Portfolio(fixture.broker), Endpoint::Portfolio(isa))
            .with_category(food);
        fixture.push(odd);

        let (file, report) = fixture.build(Capabilities::default());
        assert_eq!(report.dropped.len(), 1);
        assert_eq!(actions(file.events_for("Broker")), vec![Action::XOut]);
        assert_eq!(actions(file.events_for("ISA")), vec![Action::XIn]);
        assert_eq!(file.events_for("ISA")[0].amount(), Some(dec!(70)));
    }

    #[test]
    fn exchange_between_portfolios_links_the_cash() {
        let mut fixture = Fixture::new();
        let isa = fixture.ledger.add_portfolio(Portfolio::new("ISA"));
        let other = fixture.ledger.add_security(crate::ledger::Security::new("Bolt", "BLT"));
        let from = fixture.holding();
        let to = Endpoint::Holding(crate::ledger::HoldingKey::new(isa, other));
        let buy = Transaction::new(date(2020, 3, 1), dec!(60), Endpoint::Account(fixture.current), from)
            .with_credit_units(dec!(6));
        fixture.push(buy);
        let swap = Transaction::new(date(2020, 3, 2), dec!(60), from, to)
            .with_debit_units(dec!(6))
            .with_credit_units(dec!(3));
        fixture.push(swap);

        let (file, report) = fixture.build(Capabilities::default());
        assert!(report.is_complete());
        assert_eq!(
            actions(file.events_for("Broker")),
            vec![Action::XIn, Action::Buy, Action::Sell, Action::XOut]
        );
        assert_eq!(actions(file.events_for("ISA")), vec![Action::XIn, Action::Buy]);
    }

    /// Fixture holding ten Acme bought for 100, plus a second security.
    fn with_ten_acme() -> (Fixture, Endpoint) {
        let mut fixture = Fixture::new();
        let bolt = fixture.ledger.add_security(Security::new("Bolt", "BLT"));
        let holding = fixture.holding();
        let buy = Transaction::new(date(2020, 3, 1), dec!(100), Endpoint::Account(fixture.current), holding)
            .with_credit_units(dec!(10));
        fixture.push(buy);
        let bolt = Endpoint::Holding(HoldingKey::new(fixture.broker, bolt));
        (fixture, bolt)
    }

    #[test]
    fn demerger_returns_capital_then_issues_new_units() {
        let build = |caps: Capabilities| {
            let (mut fixture, bolt) = with_ten_acme();
            let demerger = fixture.category("Demerger", CategoryClass::Demerger);
            let txn = Transaction::new(date(2020, 3, 2), dec!(30), fixture.holding(), bolt)
                .with_category(demerger)
                .with_credit_units(dec!(5));
            fixture.push(txn);
            fixture.build(caps).0
        };

        let file = build(Capabilities::default());
        let events = file.events_for("Broker");
        assert_eq!(
            actions(events),
            vec![Action::XIn, Action::Buy, Action::Sell, Action::ShrsIn]
        );
        assert_eq!(events[2].amount(), Some(dec!(30)));
        assert_eq!(events[2].quantity(), Some(dec!(0)));
        assert_eq!(events[3].quantity(), Some(dec!(5)));
        assert_eq!(events[3].line(LineType::Price), Some(&Field::Price(dec!(6))));
        assert_eq!(events[3].amount(), Some(dec!(30)));

        let caps = Capabilities {
            can_return_capital: true,
            ..Capabilities::default()
        };
        assert_eq!(
            actions(build(caps).events_for("Broker")),
            vec![Action::XIn, Action::Buy, Action::RtrnCap, Action::ShrsIn]
        );
    }

    #[test]
    fn takeover_swaps_units_at_the_same_cost() {
        let (mut fixture, bolt) = with_ten_acme();
        let takeover = fixture.category("Takeover", CategoryClass::Takeover);
        let txn = Transaction::new(date(2020, 3, 2), dec!(100), fixture.holding(), bolt)
            .with_category(takeover)
            .with_debit_units(dec!(10))
            .with_credit_units(dec!(4));
        fixture.push(txn);

        let (file, report) = fixture.build(Capabilities::default());
        assert!(report.is_complete());
        let events = file.events_for("Broker");
        assert_eq!(
            actions(events),
            vec![Action::XIn, Action::Buy, Action::ShrsOut, Action::ShrsIn]
        );
        assert_eq!(events[2].quantity(), Some(dec!(10)));
        assert_eq!(events[2].amount(), Some(dec!(100)));
        assert_eq!(events[3].quantity(), Some(dec!(4)));
        assert_eq!(events[3].line(LineType::Price), Some(&Field::Price(dec!(25))));
        assert_eq!(events[3].amount(), Some(dec!(100)));
    }

    #[test]
    fn portfolio_transfer_moves_units_between_portfolios() {
        let (mut fixture, _) = with_ten_acme();
        let isa = fixture.ledger.add_portfolio(Portfolio::new("ISA"));
        let moved = fixture.category("Move", CategoryClass::PortfolioTransfer);
        let to = Endpoint::Holding(HoldingKey::new(isa, fixture.acme));
        let txn = Transaction::new(date(2020, 3, 2), dec!(100), fixture.holding(), to)
            .with_category(moved)
            .with_debit_units(dec!(10));
        fixture.push(txn);

        let (file, _) = fixture.build(Capabilities::default());
        assert_eq!(
            actions(file.events_for("Broker")),
            vec![Action::XIn, Action::Buy, Action::ShrsOut]
        );
        let arrived = file.events_for("ISA");
        assert_eq!(actions(arrived), vec![Action::ShrsIn]);
        assert_eq!(arrived[0].quantity(), Some(dec!(10)));
        assert_eq!(arrived[0].amount(), Some(dec!(100)));
    }

    #[test]
    fn unit_adjustment_adds_or_removes_shares_without_cash() {
        let mut fixture = Fixture::new();
        let adjust = fixture.category("Adjustment", CategoryClass::UnitAdjust);
        let holding = fixture.holding();
        let up = Transaction::new(date(2020, 3, 1), dec!(0), holding, holding)
            .with_category(adjust)
            .with_credit_units(dec!(3));
        fixture.push(up);
        let down = Transaction::new(date(2020, 3, 2), dec!(0), holding, holding)
            .with_category(adjust)
            .with_debit_units(dec!(2));
        fixture.push(down);

        let (file, report) = fixture.build(Capabilities::default());
        assert!(report.is_complete());
        let events = file.events_for("Broker");
        assert_eq!(actions(events), vec![Action::ShrsIn, Action::ShrsOut]);
        assert_eq!(events[0].quantity(), Some(dec!(3)));
        assert_eq!(events[1].quantity(), Some(dec!(2)));
        assert!(events.iter().all(|record| record.amount().is_none()));
    }

    #[test]
    fn fee_paid_from_a_holding_sells_then_books_the_expense() {
        let build = |caps: Capabilities| {
            let mut fixture = Fixture::new();
            let fees = fixture.category("Fees", CategoryClass::Expense);
            let txn = Transaction::new(date(2020, 3, 1), dec!(12), fixture.holding(), Endpoint::Payee(fixture.shop))
                .with_category(fees)
                .with_debit_units(dec!(1));
            fixture.push(txn);
            fixture.build(caps).0
        };

        let file = build(Capabilities::default());
        let events = file.events_for("Broker");
        assert_eq!(actions(events), vec![Action::Sell, Action::MiscExp]);
        assert_eq!(events[0].quantity(), Some(dec!(1)));
        assert_eq!(events[1].amount(), Some(dec!(12)));
        assert_eq!(payee(&events[1]).as_deref(), Some("Shop"));
        assert_eq!(target(&events[1]).as_deref(), Some("Fees"));

        let caps = Capabilities {
            use_investment_holding_for_category: true,
            ..Capabilities::default()
        };
        let file = build(caps);
        assert_eq!(actions(file.events_for("Broker")), vec![Action::Sell, Action::XOut]);
        let cash = file.events_for("Broker Holding");
        assert_eq!(cash.len(), 2);
        assert_eq!(cash[0].amount(), Some(dec!(12)));
        assert_eq!(cash[1].amount(), Some(dec!(-12)));
        assert_eq!(payee(&cash[1]).as_deref(), Some("Shop"));
        assert_eq!(target(&cash[1]).as_deref(), Some("Fees"));
    }

    #[test]
    fn payee_cash_into_a_portfolio_is_income() {
        let mut fixture = Fixture::new();
        let interest = fixture.category("Broker Interest", CategoryClass::Interest);
        let paid = Transaction::new(date(2020, 3, 1), dec!(5), Endpoint::Payee(fixture.employer), Endpoint::Portfolio(fixture.broker))
            .with_category(interest);
        fixture.push(paid);
        fixture.add(2, dec!(9), Endpoint::Payee(fixture.employer), Endpoint::Portfolio(fixture.broker));

        let (file, _) = fixture.build(Capabilities::default());
        let events = file.events_for("Broker");
        assert_eq!(actions(events), vec![Action::IntInc, Action::MiscInc]);
        assert_eq!(events[0].amount(), Some(dec!(5)));
        assert_eq!(payee(&events[0]).as_deref(), Some("Employer"));
        assert_eq!(target(&events[0]).as_deref(), Some("Broker Interest"));
        assert_eq!(events[1].amount(), Some(dec!(9)));
        assert!(events[1].line(LineType::Category).is_none());
    }

    #[test]
    fn payee_cash_out_of_a_portfolio_is_an_expense() {
        let mut fixture = Fixture::new();
        let fees = fixture.category("Fees", CategoryClass::Expense);
        let txn = Transaction::new(date(2020, 3, 1), dec!(3), Endpoint::Portfolio(fixture.broker), Endpoint::Payee(fixture.shop))
            .with_category(fees);
        fixture.push(txn);

        let (file, _) = fixture.build(Capabilities::default());
        let events = file.events_for("Broker");
        assert_eq!(actions(events), vec![Action::MiscExp]);
        assert_eq!(events[0].amount(), Some(dec!(3)));
        assert_eq!(payee(&events[0]).as_deref(), Some("Shop"));
        assert_eq!(target(&events[0]).as_deref(), Some("Fees"));
    }

    #[test]
    fn dropped_portfolio_movements_register_no_accounts() {
        let mut fixture = Fixture::new();
        let isa = fixture.ledger.add_portfolio(Portfolio::new("ISA"));
        let split = fixture.category("Split", CategoryClass::StockSplit);
        let odd = Transaction::new(date(2020, 3, 1), dec!(5), Endpoint::Portfolio(fixture.broker), Endpoint::Portfolio(isa))
            .with_category(split);
        fixture.push(odd);
        fixture.add(2, dec!(5), Endpoint::Portfolio(isa), Endpoint::Portfolio(isa));

        let (file, report) = fixture.build(Capabilities::default());
        assert_eq!(report.dropped.len(), 2);
        assert!(file.get_account("Broker").is_none());
        assert!(file.get_account("ISA").is_none());
    }
}
