//! In-memory model of the QIF document being built or read.

use std::{collections::HashMap, rc::Rc};

use chrono::NaiveDate;
use rust_decimal::Decimal;

use super::{
    entity::{Account, AccountType, Category, Class, Named, ParentCategory, Payee, Security},
    record::Record,
};
use crate::config::FileType;

pub const CATEGORY_SEPARATOR: char = ':';
pub const HOLDING_SUFFIX: &str = "Holding";

/// Name-keyed registry with a separate output order list.
#[derive(Debug, Clone)]
pub struct Registry<T> {
    by_name: HashMap<String, Rc<T>>,
    order: Vec<Rc<T>>,
}

impl<T> Default for Registry<T> {
    fn default() -> Self {
        Self {
            by_name: HashMap::new(),
            order: Vec::new(),
        }
    }
}

impl<T: Named> Registry<T> {
    pub fn get(&self, name: &str) -> Option<Rc<T>> {
        self.by_name.get(name).cloned()
    }

    /// Returns the canonical entity for `name`, creating it with `make` on first use.
    pub fn register_with(&mut self, name: &str, make: impl FnOnce() -> T) -> Rc<T> {
        if let Some(existing) = self.by_name.get(name) {
            return Rc::clone(existing);
        }
        let entity = Rc::new(make());
        self.by_name.insert(name.to_string(), Rc::clone(&entity));
        self.order.push(Rc::clone(&entity));
        entity
    }

    pub fn iter(&self) -> impl Iterator<Item = &Rc<T>> {
        self.order.iter()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    fn sort(&mut self) {
        self.order.sort_by(|a, b| a.name().cmp(b.name()));
    }
}

/// Events booked against one account.
#[derive(Debug, Clone)]
pub struct AccountEvents {
    pub account: Rc<Account>,
    pub events: Vec<Record>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceEntry {
    pub date: NaiveDate,
    pub price: Decimal,
}

/// Dated price history of one security.
#[derive(Debug, Clone)]
pub struct SecurityPrices {
    pub security: Rc<Security>,
    pub prices: Vec<PriceEntry>,
}

#[derive(Debug, Clone)]
pub struct QifFile {
    file_type: FileType,
    start_date: Option<NaiveDate>,
    last_event_date: Option<NaiveDate>,
    accounts: Registry<Account>,
    payees: Registry<Payee>,
    securities: Registry<Security>,
    categories: Registry<Category>,
    classes: Registry<Class>,
    parents: Vec<ParentCategory>,
    parent_index: HashMap<String, usize>,
    account_events: Vec<AccountEvents>,
    event_index: HashMap<String, usize>,
    security_prices: Vec<SecurityPrices>,
    price_index: HashMap<String, usize>,
}

impl QifFile {
    pub fn new(file_type: FileType) -> Self {
        Self {
            file_type,
            start_date: None,
            last_event_date: None,
            accounts: Registry::default(),
            payees: Registry::default(),
            securities: Registry::default(),
            categories: Registry::default(),
            classes: Registry::default(),
            parents: Vec::new(),
            parent_index: HashMap::new(),
            account_events: Vec::new(),
            event_index: HashMap::new(),
            security_prices: Vec::new(),
            price_index: HashMap::new(),
        }
    }

    pub fn file_type(&self) -> FileType {
        self.file_type
    }

    pub fn start_date(&self) -> Option<NaiveDate> {
        self.start_date
    }

    pub fn last_event_date(&self) -> Option<NaiveDate> {
        self.last_event_date
    }

    pub fn set_bounds(&mut self, start_date: NaiveDate, last_event_date: NaiveDate) {
        self.start_date = Some(start_date);
        self.last_event_date = Some(last_event_date);
    }

    pub fn register_account(&mut self, name: &str, account_type: AccountType) -> Rc<Account> {
        self.register_account_with(name, account_type, None)
    }

    pub fn register_account_with(
        &mut self,
        name: &str,
        account_type: AccountType,
        description: Option<String>,
    ) -> Rc<Account> {
        self.accounts.register_with(name, || Account {
            name: name.to_string(),
            account_type,
            description,
        })
    }

    /// Synthetic per-portfolio account carrying the cash leg of security income.
    pub fn register_holding_account(&mut self, portfolio: &str) -> Rc<Account> {
        let name = format!("{} {}", portfolio, HOLDING_SUFFIX);
        self.register_account(&name, AccountType::Bank)
    }

    pub fn register_payee(&mut self, name: &str) -> Rc<Payee> {
        self.payees.register_with(name, || Payee {
            name: name.to_string(),
        })
    }

    pub fn register_security(
        &mut self,
        name: &str,
        symbol: &str,
        security_type: &str,
    ) -> Rc<Security> {
        self.securities.register_with(name, || Security {
            name: name.to_string(),
            symbol: symbol.to_string(),
            security_type: security_type.to_string(),
        })
    }

    pub fn register_class(&mut self, name: &str) -> Rc<Class> {
        self.register_class_with(name, None)
    }

    pub fn register_class_with(&mut self, name: &str, description: Option<String>) -> Rc<Class> {
        self.classes.register_with(name, || Class {
            name: name.to_string(),
            description,
        })
    }

    pub fn register_category(&mut self, name: &str, income: bool) -> Rc<Category> {
        self.register_category_with(name, income, None)
    }

    /// Registers `name` and, first, every parent along its `:` separated path.
    pub fn register_category_with(
        &mut self,
        name: &str,
        income: bool,
        description: Option<String>,
    ) -> Rc<Category> {
        if let Some(existing) = self.categories.get(name) {
            return existing;
        }
        let parent = name
            .rfind(CATEGORY_SEPARATOR)
            .map(|position| self.register_category(&name[..position], income));
        let category = self.categories.register_with(name, || Category {
            name: name.to_string(),
            income,
            description,
        });
        if let Some(parent) = parent {
            let index = match self.parent_index.get(&parent.name) {
                Some(index) => *index,
                None => {
                    self.parents.push(ParentCategory {
                        category: Rc::clone(&parent),
                        children: Vec::new(),
                    });
                    self.parent_index
                        .insert(parent.name.clone(), self.parents.len() - 1);
                    self.parents.len() - 1
                }
            };
            self.parents[index].children.push(Rc::clone(&category));
        }
        category
    }

    /// Adds a dated price; a second price for the same date replaces the first.
    pub fn register_price(&mut self, security: &Rc<Security>, date: NaiveDate, price: Decimal) {
        let index = match self.price_index.get(&security.name) {
            Some(index) => *index,
            None => {
                self.security_prices.push(SecurityPrices {
                    security: Rc::clone(security),
                    prices: Vec::new(),
                });
                self.price_index
                    .insert(security.name.clone(), self.security_prices.len() - 1);
                self.security_prices.len() - 1
            }
        };
        let prices = &mut self.security_prices[index].prices;
        match prices.iter_mut().find(|entry| entry.date == date) {
            Some(entry) => entry.price = price,
            None => prices.push(PriceEntry { date, price }),
        }
    }

    /// Appends `record` to the event list of `account`.
    pub fn add_event(&mut self, account: &Rc<Account>, record: Record) {
        if record.kind() != account.account_type.event_kind() {
            tracing::warn!(
                account = %account.name,
                kind = ?record.kind(),
                "record kind does not match account type"
            );
        }
        let index = match self.event_index.get(&account.name) {
            Some(index) => *index,
            None => {
                self.account_events.push(AccountEvents {
                    account: Rc::clone(account),
                    events: Vec::new(),
                });
                self.event_index
                    .insert(account.name.clone(), self.account_events.len() - 1);
                self.account_events.len() - 1
            }
        };
        self.account_events[index].events.push(record);
    }

    pub fn get_account(&self, name: &str) -> Option<Rc<Account>> {
        self.accounts.get(name)
    }

    pub fn get_category(&self, name: &str) -> Option<Rc<Category>> {
        self.categories.get(name)
    }

    pub fn get_security(&self, name: &str) -> Option<Rc<Security>> {
        self.securities.get(name)
    }

    pub fn get_security_by_symbol(&self, symbol: &str) -> Option<Rc<Security>> {
        if symbol.is_empty() {
            return None;
        }
        self.securities
            .iter()
            .find(|security| security.symbol == symbol)
            .cloned()
    }

    pub fn get_class(&self, name: &str) -> Option<Rc<Class>> {
        self.classes.get(name)
    }

    pub fn get_parent(&self, name: &str) -> Option<&ParentCategory> {
        self.parent_index.get(name).map(|index| &self.parents[*index])
    }

    pub fn accounts(&self) -> &Registry<Account> {
        &self.accounts
    }

    pub fn payees(&self) -> &Registry<Payee> {
        &self.payees
    }

    pub fn securities(&self) -> &Registry<Security> {
        &self.securities
    }

    pub fn categories(&self) -> &Registry<Category> {
        &self.categories
    }

    pub fn classes(&self) -> &Registry<Class> {
        &self.classes
    }

    pub fn parents(&self) -> &[ParentCategory] {
        &self.parents
    }

    pub fn account_events(&self) -> &[AccountEvents] {
        &self.account_events
    }

    pub fn events_for(&self, account: &str) -> &[Record] {
        self.event_index
            .get(account)
            .map(|index| self.account_events[*index].events.as_slice())
            .unwrap_or(&[])
    }

    pub fn security_prices(&self) -> &[SecurityPrices] {
        &self.security_prices
    }

    /// Stable reordering of every output list: entities by name, events and
    /// prices by date with insertion order kept for equal dates.
    pub fn sort_lists(&mut self) {
        self.accounts.sort();
        self.payees.sort();
        self.securities.sort();
        self.categories.sort();
        self.classes.sort();

        self.parents
            .sort_by(|a, b| a.category.name.cmp(&b.category.name));
        for parent in &mut self.parents {
            parent.children.sort_by(|a, b| a.name.cmp(&b.name));
        }
        self.parent_index = index_by(&self.parents, |parent| parent.category.name.clone());

        self.account_events
            .sort_by(|a, b| a.account.name.cmp(&b.account.name));
        for entry in &mut self.account_events {
            entry.events.sort_by_key(|record| record.date());
        }
        self.event_index = index_by(&self.account_events, |entry| entry.account.name.clone());

        self.security_prices
            .sort_by(|a, b| a.security.name.cmp(&b.security.name));
        for entry in &mut self.security_prices {
            entry.prices.sort_by_key(|price| price.date);
        }
        self.price_index = index_by(&self.security_prices, |entry| entry.security.name.clone());
    }
}

fn index_by<T>(items: &[T], key: impl Fn(&T) -> String) -> HashMap<String, usize> {
    items
        .iter()
        .enumerate()
        .map(|(index, item)| (key(item), index))
        .collect()
}
