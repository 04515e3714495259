//! Plain account events: income, expenses, transfers and split transactions.

use std::rc::Rc;

use rust_decimal::Decimal;

use super::{extra_lines, BuildContext, Emission, PortfolioBuilder, Side, OPENING_BALANCE, TAX_MAN};
use crate::{
    errors::Result,
    ledger::{self, CategoryClass, Transaction},
    qif::{Account, Field, LineType, QifFile, Record, Split, Tagged, Target},
};

/// Entry point for translating one ledger transaction.
pub struct EventBuilder<'a> {
    ctx: BuildContext<'a>,
    portfolio: PortfolioBuilder<'a>,
}

enum SplitLine<'t> {
    Category(&'t Transaction, Option<&'t ledger::Category>),
    Transfer(&'t Transaction, &'t ledger::Account),
}

impl<'a> EventBuilder<'a> {
    pub fn new(ctx: BuildContext<'a>) -> Self {
        Self {
            ctx,
            portfolio: PortfolioBuilder::new(ctx),
        }
    }

    /// Writes the opening balance event of `account`; returns whether one was written.
    pub fn opening_balance(&self, file: &mut QifFile, account: &ledger::Account) -> bool {
        let Some(balance) = account.opening_balance else {
            return false;
        };
        let date = self.ctx.ledger.start_date;
        let handle = self.ctx.account(file, account);
        let payee = self.ctx.payee_field(file, OPENING_BALANCE);
        let target = if self.ctx.caps.self_opening_balance {
            Field::account(Rc::clone(&handle), Vec::new())
        } else {
            Field::category(file.register_category(OPENING_BALANCE, true), Vec::new())
        };
        let record = Record::event(date, balance)
            .with_line(LineType::Payee, payee)
            .with_line(LineType::Category, target);
        file.add_event(&handle, record);
        true
    }

    /// Emits the records for a non-split transaction.
    pub fn build(&self, file: &mut QifFile, txn: &Transaction) -> Result<Emission> {
        let debit = self.ctx.side(txn.debit)?;
        let credit = self.ctx.side(txn.credit)?;
        let category = self.ctx.category_of(txn)?;

        if matches!(debit, Side::Holding(_) | Side::Portfolio(_))
            || matches!(credit, Side::Holding(_) | Side::Portfolio(_))
        {
            return self.portfolio.build(file, txn, debit, credit, category);
        }

        match (debit, credit) {
            (Side::Payee(_), Side::Payee(_)) => Ok(Emission::Unsupported(
                "transaction between two payees".to_string(),
            )),
            (Side::Cash { account, auto_expense }, Side::Payee(payee)) => {
                self.cash_payment(file, txn, account, auto_expense, payee, category, true)
            }
            (Side::Payee(payee), Side::Cash { account, auto_expense }) => {
                self.cash_payment(file, txn, account, auto_expense, payee, category, false)
            }
            (Side::Payee(payee), credit) => match credit.plain_account() {
                Some(account) => self.payee_event(file, txn, payee, account, category, true),
                None => Ok(unsupported_shape(txn)),
            },
            (debit, Side::Payee(payee)) => match debit.plain_account() {
                Some(account) => self.payee_event(file, txn, payee, account, category, false),
                None => Ok(unsupported_shape(txn)),
            },
            (debit, credit) => match (debit.plain_account(), credit.plain_account()) {
                (Some(from), Some(to)) => self.between_accounts(file, txn, from, to, category),
                _ => Ok(unsupported_shape(txn)),
            },
        }
    }

    /// Emits one split event for `parent` with a line per child.
    ///
    /// Every child is validated before anything is written, so an
    /// unsupported child drops the whole transaction.
    pub fn build_split(
        &self,
        file: &mut QifFile,
        parent: &Transaction,
        children: &[&Transaction],
    ) -> Result<Emission> {
        let debit = self.ctx.side(parent.debit)?;
        let credit = self.ctx.side(parent.credit)?;
        let (account, payee, income) = match (debit, credit) {
            (Side::Payee(payee), other) => match other.plain_account() {
                Some(account) => (account, payee, true),
                None => return Ok(Emission::Unsupported("split into a non-cash endpoint".to_string())),
            },
            (other, Side::Payee(payee)) => match other.plain_account() {
                Some(account) => (account, payee, false),
                None => return Ok(Emission::Unsupported("split from a non-cash endpoint".to_string())),
            },
            _ => {
                return Ok(Emission::Unsupported(
                    "split must pair an account with a payee".to_string(),
                ))
            }
        };
        let parent_category = self.ctx.category_of(parent)?;

        let mut lines = Vec::with_capacity(children.len());
        for child in children.iter().copied() {
            let other = self.ctx.side(if income { child.debit } else { child.credit })?;
            let line = match other {
                Side::Payee(_) => SplitLine::Category(child, self.child_category(child, parent_category)?),
                other => match other.plain_account() {
                    Some(target) if target.id == account.id => {
                        SplitLine::Category(child, self.child_category(child, parent_category)?)
                    }
                    Some(target) => SplitLine::Transfer(child, target),
                    None => {
                        return Ok(Emission::Unsupported(format!(
                            "split child {} moves securities",
                            child.id
                        )))
                    }
                },
            };
            lines.push(line);
        }

        let signed = |value: Decimal| if income { value } else { -value };
        let handle = self.ctx.account(file, account);
        let payee = self.ctx.payee_field(file, &payee.name);
        let mut record = self
            .ctx
            .event(parent, signed(parent.amount))
            .with_line(LineType::Payee, payee);

        for line in lines {
            match line {
                SplitLine::Category(child, category) => {
                    let target = match category {
                        Some(category) => Some(self.target(file, child, category)),
                        None => None,
                    };
                    record.add_split(Split {
                        target,
                        amount: Some(signed(child.amount)),
                        percent: None,
                        comment: child.description.clone(),
                    });
                }
                SplitLine::Transfer(child, target) => {
                    let other = self.ctx.account(file, target);
                    let classes = self.ctx.classes(file, child);
                    let mut split = Split::new(
                        Tagged::new(Target::Account(Rc::clone(&other))).with_classes(classes),
                        signed(child.amount),
                    );
                    split.comment = child.description.clone();
                    record.add_split(split);
                    if !self.ctx.caps.hide_balancing_split_transfer {
                        self.mirror(file, child, &other, &handle, -signed(child.amount));
                    }
                }
            }
        }

        file.add_event(&handle, record);
        Ok(Emission::Emitted)
    }

    fn child_category(
        &self,
        child: &Transaction,
        fallback: Option<&'a ledger::Category>,
    ) -> Result<Option<&'a ledger::Category>> {
        Ok(self.ctx.category_of(child)?.or(fallback))
    }

    fn target(&self, file: &mut QifFile, txn: &Transaction, category: &ledger::Category) -> Tagged<Target> {
        let classes = self.ctx.classes(file, txn);
        Tagged::new(Target::Category(self.ctx.category(file, category))).with_classes(classes)
    }

    /// Income (`income`) or expense event between `account` and `payee`.
    ///
    /// Auxiliary amounts turn the event into a split: the primary line
    /// carries the gross amount and each auxiliary line offsets it.
    fn payee_event(
        &self,
        file: &mut QifFile,
        txn: &Transaction,
        payee: &ledger::Payee,
        account: &ledger::Account,
        category: Option<&ledger::Category>,
        income: bool,
    ) -> Result<Emission> {
        let signed = |value: Decimal| if income { value } else { -value };
        let handle = self.ctx.account(file, account);
        let payee = self.ctx.payee_field(file, &payee.name);
        let mut record = self
            .ctx
            .event(txn, signed(txn.amount))
            .with_line(LineType::Payee, payee);

        let extras = extra_lines(&txn.extra);
        if extras.is_empty() {
            if let Some(category) = category {
                let field = self.ctx.category_field(file, txn, category);
                record.add_line(LineType::Category, field);
            }
        } else {
            let gross = extras
                .iter()
                .fold(txn.amount, |total, (_, amount)| total + amount);
            record.add_split(Split {
                target: category.map(|category| self.target(file, txn, category)),
                amount: Some(signed(gross)),
                percent: None,
                comment: None,
            });
            for (name, amount) in extras {
                let extra = file.register_category(name, false);
                record.add_split(
                    Split::new(Tagged::new(Target::Category(extra)), -signed(amount))
                        .with_comment(TAX_MAN),
                );
            }
        }

        file.add_event(&handle, record);
        Ok(Emission::Emitted)
    }

    /// Payment (`payment`) from or recovery into a cash account with an
    /// auto-expense category: a zero-total split moving the amount between
    /// the auto-expense and the named category.
    #[allow(clippy::too_many_arguments)]
    fn cash_payment(
        &self,
        file: &mut QifFile,
        txn: &Transaction,
        account: &ledger::Account,
        auto_expense: &ledger::Category,
        payee: &ledger::Payee,
        category: Option<&ledger::Category>,
        payment: bool,
    ) -> Result<Emission> {
        let Some(category) = category else {
            return self.payee_event(file, txn, payee, account, None, !payment);
        };
        let signed = |value: Decimal| if payment { value } else { -value };
        let handle = self.ctx.account(file, account);
        let payee = self.ctx.payee_field(file, &payee.name);
        let mut record = self
            .ctx
            .event(txn, Decimal::ZERO)
            .with_line(LineType::Payee, payee);
        let auto = Tagged::new(Target::Category(self.ctx.category(file, auto_expense)));
        record.add_split(Split::new(auto, signed(txn.amount)));
        let named = self.target(file, txn, category);
        record.add_split(Split::new(named, -signed(txn.amount)));
        file.add_event(&handle, record);
        Ok(Emission::Emitted)
    }

    fn between_accounts(
        &self,
        file: &mut QifFile,
        txn: &Transaction,
        from: &ledger::Account,
        to: &ledger::Account,
        category: Option<&ledger::Category>,
    ) -> Result<Emission> {
        match category.map(|category| (category, category.class)) {
            Some((category, CategoryClass::Cashback | CategoryClass::Interest)) => {
                self.earn_then_transfer(file, txn, from, to, category)
            }
            Some((category, CategoryClass::IncomeFromParent)) => {
                self.parent_pair(file, txn, to, from, category)
            }
            Some((category, CategoryClass::ExpenseToParent)) => {
                self.parent_pair(file, txn, from, to, category)
            }
            _ => {
                let from = self.ctx.account(file, from);
                let to = self.ctx.account(file, to);
                self.transfer(file, txn, &from, &to, category);
                Ok(Emission::Emitted)
            }
        }
    }

    /// Income credited to `from`, then moved on to `to` when they differ.
    fn earn_then_transfer(
        &self,
        file: &mut QifFile,
        txn: &Transaction,
        from: &ledger::Account,
        to: &ledger::Account,
        category: &ledger::Category,
    ) -> Result<Emission> {
        let earner = self.ctx.account(file, from);
        let payee = self.ctx.payee_field(file, leaf_name(&category.name));
        let field = self.ctx.category_field(file, txn, category);
        let record = self
            .ctx
            .event(txn, txn.amount)
            .with_line(LineType::Payee, payee)
            .with_line(LineType::Category, field);
        file.add_event(&earner, record);
        if from.id != to.id {
            let to = self.ctx.account(file, to);
            self.transfer(file, txn, &earner, &to, None);
        }
        Ok(Emission::Emitted)
    }

    /// Unlinked events on both accounts, each carrying the category.
    fn parent_pair(
        &self,
        file: &mut QifFile,
        txn: &Transaction,
        first: &ledger::Account,
        second: &ledger::Account,
        category: &ledger::Category,
    ) -> Result<Emission> {
        if first.id == second.id {
            return Ok(Emission::Unsupported(
                "parent transfer within a single account".to_string(),
            ));
        }
        let incoming = category.class == CategoryClass::IncomeFromParent;
        for (account, other, amount) in [
            (first, second, if incoming { txn.amount } else { -txn.amount }),
            (second, first, if incoming { -txn.amount } else { txn.amount }),
        ] {
            let handle = self.ctx.account(file, account);
            let payee = self.ctx.payee_field(file, &other.name);
            let field = self.ctx.category_field(file, txn, category);
            let record = self
                .ctx
                .event(txn, amount)
                .with_line(LineType::Payee, payee)
                .with_line(LineType::Category, field);
            file.add_event(&handle, record);
        }
        Ok(Emission::Emitted)
    }

    /// Transfer of `txn.amount` out of `from` into `to`.
    ///
    /// A transfer to the same account is a single event against the category.
    fn transfer(
        &self,
        file: &mut QifFile,
        txn: &Transaction,
        from: &Rc<Account>,
        to: &Rc<Account>,
        category: Option<&ledger::Category>,
    ) {
        if Rc::ptr_eq(from, to) {
            let mut record = self.ctx.event(txn, txn.amount);
            if let Some(category) = category {
                let field = self.ctx.category_field(file, txn, category);
                record.add_line(LineType::Category, field);
            }
            file.add_event(from, record);
            return;
        }
        self.mirror(file, txn, from, to, -txn.amount);
        if !self.ctx.caps.hide_balancing_transfer {
            self.mirror(file, txn, to, from, txn.amount);
        }
    }

    /// Event on `on` linked to `other`.
    fn mirror(
        &self,
        file: &mut QifFile,
        txn: &Transaction,
        on: &Rc<Account>,
        other: &Rc<Account>,
        amount: Decimal,
    ) {
        let payee = self
            .ctx
            .transfer_payee(file, &other.name, amount >= Decimal::ZERO);
        let link = self.ctx.account_field(file, txn, other);
        let record = self
            .ctx
            .event(txn, amount)
            .with_line(LineType::Payee, payee)
            .with_line(LineType::Category, link);
        file.add_event(on, record);
    }
}

fn unsupported_shape(txn: &Transaction) -> Emission {
    Emission::Unsupported(format!("unsupported endpoints for transaction {}", txn.id))
}

fn leaf_name(name: &str) -> &str {
    name.rsplit(crate::qif::file::CATEGORY_SEPARATOR)
        .next()
        .unwrap_or(name)
}
