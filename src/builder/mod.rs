//! Translation of ledger transactions into QIF records.

pub mod event;
pub mod portfolio;

use std::rc::Rc;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::{
    analysis::Analysis,
    config::Capabilities,
    errors::{QifError, Result},
    ledger::{self, AccountKind, Endpoint, ExtraDetail, HoldingKey, Ledger, SecurityKind, Transaction},
    qif::{Account, AccountType, Action, Category, Class, Field, LineType, QifFile, Record, Security},
};

pub use event::EventBuilder;
pub use portfolio::PortfolioBuilder;

pub const OPENING_BALANCE: &str = "Opening Balance";
pub const TAX_MAN: &str = "Tax Man";
pub const TAX_CREDIT_CATEGORY: &str = "Tax:Tax Credit";
pub const NATIONAL_INSURANCE_CATEGORY: &str = "Tax:National Insurance";
pub const DEEMED_BENEFIT_CATEGORY: &str = "Income:Deemed Benefit";
pub const CHARITY_CATEGORY: &str = "Charity:Payroll Giving";
const TRANSFER: &str = "Transfer";

/// Auxiliary amounts present on `extra`, each with its fixed category.
pub fn extra_lines(extra: &ExtraDetail) -> Vec<(&'static str, Decimal)> {
    [
        (TAX_CREDIT_CATEGORY, extra.tax_credit),
        (NATIONAL_INSURANCE_CATEGORY, extra.national_insurance),
        (DEEMED_BENEFIT_CATEGORY, extra.deemed_benefit),
        (CHARITY_CATEGORY, extra.charity_donation),
    ]
    .into_iter()
    .filter_map(|(category, amount)| amount.map(|amount| (category, amount)))
    .collect()
}

/// Result of translating one transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Emission {
    Emitted,
    /// The transaction shape is not expressible; nothing was written for it.
    Unsupported(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DroppedTransaction {
    pub id: Uuid,
    pub date: NaiveDate,
    pub reason: String,
}

/// Summary of one build pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildReport {
    pub opening_balances: usize,
    pub processed: usize,
    pub skipped_children: usize,
    pub prices: usize,
    pub dropped: Vec<DroppedTransaction>,
}

impl BuildReport {
    pub fn is_complete(&self) -> bool {
        self.dropped.is_empty()
    }
}

/// Resolved endpoint of a transaction.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Side<'a> {
    Payee(&'a ledger::Payee),
    Cash {
        account: &'a ledger::Account,
        auto_expense: &'a ledger::Category,
    },
    Account(&'a ledger::Account),
    Portfolio(&'a ledger::Portfolio),
    Holding(HoldingSide<'a>),
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct HoldingSide<'a> {
    pub portfolio: &'a ledger::Portfolio,
    pub security: &'a ledger::Security,
    pub key: HoldingKey,
}

impl<'a> Side<'a> {
    pub fn plain_account(&self) -> Option<&'a ledger::Account> {
        match *self {
            Side::Account(account) | Side::Cash { account, .. } => Some(account),
            _ => None,
        }
    }

    pub fn name(&self) -> &'a str {
        match *self {
            Side::Payee(payee) => &payee.name,
            Side::Account(account) | Side::Cash { account, .. } => &account.name,
            Side::Portfolio(portfolio) => &portfolio.name,
            Side::Holding(holding) => &holding.security.name,
        }
    }
}

/// Inputs and switches shared by the event and portfolio builders.
#[derive(Clone, Copy)]
pub struct BuildContext<'a> {
    pub ledger: &'a Ledger,
    pub analysis: &'a dyn Analysis,
    pub caps: Capabilities,
}

impl<'a> BuildContext<'a> {
    pub fn new(ledger: &'a Ledger, analysis: &'a dyn Analysis, caps: Capabilities) -> Self {
        Self {
            ledger,
            analysis,
            caps,
        }
    }

    pub(crate) fn side(&self, endpoint: Endpoint) -> Result<Side<'a>> {
        let ledger = self.ledger;
        Ok(match endpoint {
            Endpoint::Payee(id) => Side::Payee(ledger.require_payee(id)?),
            Endpoint::Account(id) => {
                let account = ledger.require_account(id)?;
                match account.auto_expense {
                    Some(category) if account.kind == AccountKind::Cash => Side::Cash {
                        account,
                        auto_expense: ledger.require_category(category)?,
                    },
                    _ => Side::Account(account),
                }
            }
            Endpoint::Portfolio(id) => Side::Portfolio(ledger.require_portfolio(id)?),
            Endpoint::Holding(key) => Side::Holding(HoldingSide {
                portfolio: ledger.require_portfolio(key.portfolio)?,
                security: ledger.require_security(key.security)?,
                key,
            }),
        })
    }

    pub(crate) fn category_of(&self, txn: &Transaction) -> Result<Option<&'a ledger::Category>> {
        txn.category
            .map(|id| self.ledger.require_category(id))
            .transpose()
    }

    pub(crate) fn account(&self, file: &mut QifFile, account: &ledger::Account) -> Rc<Account> {
        let account_type = match account.kind {
            AccountKind::Bank => AccountType::Bank,
            AccountKind::Cash => AccountType::Cash,
            AccountKind::CreditCard => AccountType::CreditCard,
            AccountKind::Asset => AccountType::OtherAsset,
            AccountKind::Liability => AccountType::OtherLiability,
        };
        file.register_account_with(&account.name, account_type, account.description.clone())
    }

    pub(crate) fn portfolio_account(
        &self,
        file: &mut QifFile,
        portfolio: &ledger::Portfolio,
    ) -> Rc<Account> {
        file.register_account_with(
            &portfolio.name,
            AccountType::Investment,
            portfolio.description.clone(),
        )
    }

    /// QIF account standing in for a plain or portfolio side.
    pub(crate) fn counterpart(&self, file: &mut QifFile, side: &Side<'a>) -> Option<Rc<Account>> {
        match side {
            Side::Account(account) | Side::Cash { account, .. } => Some(self.account(file, account)),
            Side::Portfolio(portfolio) => Some(self.portfolio_account(file, portfolio)),
            _ => None,
        }
    }

    pub(crate) fn security(&self, file: &mut QifFile, security: &ledger::Security) -> Rc<Security> {
        let security_type = match security.kind {
            SecurityKind::Stock => "Stock",
            SecurityKind::MutualFund => "Mutual Fund",
            SecurityKind::Bond => "Bond",
            SecurityKind::Other => "Other",
        };
        file.register_security(&security.name, &security.symbol, security_type)
    }

    pub(crate) fn category(&self, file: &mut QifFile, category: &ledger::Category) -> Rc<Category> {
        file.register_category(&category.name, category.class.is_income())
    }

    pub(crate) fn classes(&self, file: &mut QifFile, txn: &Transaction) -> Vec<Rc<Class>> {
        txn.tags.iter().map(|tag| file.register_class(tag)).collect()
    }

    pub(crate) fn category_field(
        &self,
        file: &mut QifFile,
        txn: &Transaction,
        category: &ledger::Category,
    ) -> Field {
        let classes = self.classes(file, txn);
        Field::category(self.category(file, category), classes)
    }

    pub(crate) fn account_field(
        &self,
        file: &mut QifFile,
        txn: &Transaction,
        account: &Rc<Account>,
    ) -> Field {
        let classes = self.classes(file, txn);
        Field::account(Rc::clone(account), classes)
    }

    pub(crate) fn payee_field(&self, file: &mut QifFile, name: &str) -> Field {
        Field::payee(file.register_payee(name))
    }

    /// Payee text describing a transfer with `other`.
    pub(crate) fn transfer_payee(&self, file: &mut QifFile, other: &str, incoming: bool) -> Field {
        let text = if self.caps.use_simple_transfer {
            TRANSFER.to_string()
        } else if incoming {
            format!("{TRANSFER} from {other}")
        } else {
            format!("{TRANSFER} to {other}")
        };
        self.payee_field(file, &text)
    }

    /// Plain event carrying the date, reference, memo and cleared state of `txn`.
    pub(crate) fn event(&self, txn: &Transaction, amount: Decimal) -> Record {
        let mut record = Record::event(txn.date, amount);
        if txn.reconciled {
            record.add_line(LineType::Cleared, Field::Cleared(true));
        }
        if let Some(reference) = &txn.reference {
            record.add_line(LineType::Number, Field::Text(reference.clone()));
        }
        if let Some(description) = &txn.description {
            record.add_line(LineType::Comment, Field::Text(description.clone()));
        }
        record
    }

    /// Investment record carrying the date, action, security, memo and cleared state.
    pub(crate) fn action(
        &self,
        txn: &Transaction,
        action: Action,
        security: Option<&Rc<Security>>,
    ) -> Record {
        let mut record = Record::investment(txn.date, action);
        if let Some(security) = security {
            record.add_line(LineType::Security, Field::security(Rc::clone(security)));
        }
        if txn.reconciled {
            record.add_line(LineType::Cleared, Field::Cleared(true));
        }
        if let Some(description) = &txn.description {
            record.add_line(LineType::Comment, Field::Text(description.clone()));
        }
        record
    }

    /// Books `amount` (positive = money arriving) on `on`, linked to `other`.
    ///
    /// Investment accounts receive `XIn`/`XOut`; the `[other]` link is inline
    /// only when the dialect can transfer from portfolios.
    pub(crate) fn cash_leg(
        &self,
        file: &mut QifFile,
        txn: &Transaction,
        on: &Rc<Account>,
        other: &Rc<Account>,
        amount: Decimal,
    ) {
        let incoming = amount >= Decimal::ZERO;
        let payee = self.transfer_payee(file, &other.name, incoming);
        let record = if on.is_investment() {
            let action = if incoming { Action::XIn } else { Action::XOut };
            let mut record = self
                .action(txn, action, None)
                .with_line(LineType::Amount, Field::Money(amount.abs()))
                .with_line(LineType::Payee, payee);
            if self.caps.can_xfer_portfolio {
                let link = self.account_field(file, txn, other);
                record
                    .add_line(LineType::Category, link)
                    .add_line(LineType::TransferAmount, Field::Money(amount.abs()));
            }
            record
        } else {
            let link = self.account_field(file, txn, other);
            self.event(txn, amount)
                .with_line(LineType::Payee, payee)
                .with_line(LineType::Category, link)
        };
        file.add_event(on, record);
    }

    /// Cash transfer into `on` from `other`, mirrored unless the dialect
    /// expresses it inline and hides balancing transfers.
    pub(crate) fn transfer_cash(
        &self,
        file: &mut QifFile,
        txn: &Transaction,
        on: &Rc<Account>,
        other: &Rc<Account>,
        amount: Decimal,
    ) {
        self.cash_leg(file, txn, on, other, amount);
        if !(self.caps.can_xfer_portfolio && self.caps.hide_balancing_transfer) {
            self.cash_leg(file, txn, other, on, -amount);
        }
    }
}

/// Builds `file` from `ledger`: opening balances, every transaction up to
/// the first one dated after `cutoff`, then prices up to `cutoff`.
///
/// Unsupported transaction shapes are logged and listed in the report; a
/// dangling ledger reference aborts the build.
pub fn build_data(
    file: &mut QifFile,
    ledger: &Ledger,
    analysis: &dyn Analysis,
    caps: Capabilities,
    cutoff: NaiveDate,
) -> Result<BuildReport> {
    let ctx = BuildContext::new(ledger, analysis, caps);
    let builder = EventBuilder::new(ctx);
    let mut report = BuildReport::default();
    file.set_bounds(ledger.start_date, cutoff);

    for account in &ledger.accounts {
        if builder.opening_balance(file, account) {
            report.opening_balances += 1;
        }
    }

    let index = ledger.transaction_index();
    for txn in &ledger.transactions {
        if txn.date > cutoff {
            tracing::debug!(date = %txn.date, %cutoff, "stopping at first transaction past cutoff");
            break;
        }
        if txn.is_split_child() {
            report.skipped_children += 1;
            continue;
        }
        let emission = if txn.is_split_parent() {
            let children = txn
                .children
                .iter()
                .map(|id| {
                    index
                        .get(id)
                        .copied()
                        .ok_or_else(|| QifError::InvalidRef(format!("split child {id}")))
                })
                .collect::<Result<Vec<_>>>()?;
            builder.build_split(file, txn, &children)?
        } else {
            builder.build(file, txn)?
        };
        match emission {
            Emission::Emitted => report.processed += 1,
            Emission::Unsupported(reason) => {
                tracing::error!(id = %txn.id, date = %txn.date, %reason, "transaction dropped");
                report.dropped.push(DroppedTransaction {
                    id: txn.id,
                    date: txn.date,
                    reason,
                });
            }
        }
    }

    for security in &ledger.securities {
        let handle = ctx.security(file, security);
        for point in security.prices.iter().filter(|point| point.date <= cutoff) {
            file.register_price(&handle, point.date, point.price);
            report.prices += 1;
        }
    }

    file.sort_lists();
    tracing::info!(
        processed = report.processed,
        dropped = report.dropped.len(),
        prices = report.prices,
        "QIF data built"
    );
    Ok(report)
}
