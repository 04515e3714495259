#![allow(dead_code)]

use std::{path::PathBuf, sync::Mutex};

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use qif_core::ledger::{
    Account, AccountKind, Category, CategoryClass, Endpoint, ExtraDetail, HoldingKey, Ledger,
    Payee, Portfolio, Security, Transaction,
};
use rust_decimal_macros::dec;
use tempfile::TempDir;

/// Holds TempDir guards so temporary folders live for the duration of the test run.
static TEST_DIRS: Lazy<Mutex<Vec<TempDir>>> = Lazy::new(|| Mutex::new(Vec::new()));

/// Creates a fresh directory that outlives the calling test.
pub fn temp_dir() -> PathBuf {
    let temp = TempDir::new().expect("create temp dir");
    let path = temp.path().to_path_buf();
    TEST_DIRS.lock().expect("lock temp dir registry").push(temp);
    path
}

pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap()
}

/// One deposit account with an opening balance and a single grocery expense.
pub fn grocery_ledger() -> Ledger {
    let mut ledger = Ledger::new("Groceries", date(2020, 1, 1));
    let deposit = ledger
        .add_account(Account::new("Deposit", AccountKind::Bank).with_opening_balance(dec!(100.00)));
    let shop = ledger.add_payee(Payee::new("Shop"));
    let groceries = ledger.add_category(Category::new("Groceries", CategoryClass::Expense));
    ledger.add_transaction(
        Transaction::new(
            date(2020, 2, 1),
            dec!(25.00),
            Endpoint::Account(deposit),
            Endpoint::Payee(shop),
        )
        .with_category(groceries),
    );
    ledger
}

/// Ledger exercising income, expenses, transfers, splits and investments.
pub fn household_ledger() -> Ledger {
    let mut ledger = Ledger::new("Household", date(2021, 1, 1));
    let current = ledger
        .add_account(Account::new("Current", AccountKind::Bank).with_opening_balance(dec!(1500)));
    let savings = ledger.add_account(Account::new("Savings", AccountKind::Bank));
    let card = ledger.add_account(Account::new("Card", AccountKind::CreditCard));
    let employer = ledger.add_payee(Payee::new("Employer"));
    let shop = ledger.add_payee(Payee::new("Shop"));
    let broker = ledger.add_portfolio(Portfolio::new("Broker"));
    let acme = ledger.add_security(
        Security::new("Acme", "ACM")
            .with_price(date(2021, 1, 4), dec!(10))
            .with_price(date(2021, 2, 1), dec!(12.5)),
    );
    let holding = Endpoint::Holding(HoldingKey::new(broker, acme));

    let salary = ledger.add_category(Category::new("Income:Salary", CategoryClass::Income));
    let groceries = ledger.add_category(Category::new("Food:Groceries", CategoryClass::Expense));
    let dining = ledger.add_category(Category::new("Food:Dining", CategoryClass::Expense));
    let interest = ledger.add_category(Category::new("Interest", CategoryClass::Interest));
    let dividend = ledger.add_category(Category::new("Dividends", CategoryClass::Dividend));
    let split = ledger.add_category(Category::new("Stock Split", CategoryClass::StockSplit));

    ledger.add_transaction(
        Transaction::new(date(2021, 1, 5), dec!(2000), Endpoint::Payee(employer), Endpoint::Account(current))
            .with_category(salary)
            .with_extra(ExtraDetail {
                tax_credit: Some(dec!(400)),
                national_insurance: Some(dec!(150)),
                charity_donation: Some(dec!(10)),
                ..ExtraDetail::default()
            }),
    );
    ledger.add_transaction(
        Transaction::new(date(2021, 1, 6), dec!(42.10), Endpoint::Account(card), Endpoint::Payee(shop))
            .with_category(groceries)
            .with_tag("Holiday")
            .with_description("Weekend shop"),
    );
    ledger.add_transaction(Transaction::new(
        date(2021, 1, 7),
        dec!(300),
        Endpoint::Account(current),
        Endpoint::Account(savings),
    ));
    ledger.add_split(
        Transaction::new(date(2021, 1, 8), dec!(60), Endpoint::Account(current), Endpoint::Payee(shop)),
        vec![
            Transaction::new(date(2021, 1, 8), dec!(35), Endpoint::Account(current), Endpoint::Payee(shop))
                .with_category(groceries),
            Transaction::new(date(2021, 1, 8), dec!(25), Endpoint::Account(current), Endpoint::Payee(shop))
                .with_category(dining),
        ],
    );
    ledger.add_transaction(
        Transaction::new(date(2021, 1, 31), dec!(1.25), Endpoint::Account(savings), Endpoint::Account(savings))
            .with_category(interest),
    );
    ledger.add_transaction(
        Transaction::new(date(2021, 2, 1), dec!(500), Endpoint::Account(current), holding)
            .with_credit_units(dec!(40)),
    );
    ledger.add_transaction(
        Transaction::new(date(2021, 2, 15), dec!(0), holding, holding)
            .with_category(split)
            .with_credit_units(dec!(40)),
    );
    ledger.add_transaction(
        Transaction::new(date(2021, 3, 1), dec!(12), holding, Endpoint::Account(current))
            .with_category(dividend)
            .with_extra(ExtraDetail {
                tax_credit: Some(dec!(1.2)),
                ..ExtraDetail::default()
            }),
    );
    ledger.add_transaction(Transaction::new(
        date(2021, 3, 2),
        dec!(100),
        holding,
        Endpoint::Account(savings),
    ));
    ledger
}

/// Writes `ledger` as JSON into a fresh temp directory.
pub fn write_ledger(ledger: &Ledger) -> PathBuf {
    let path = temp_dir().join("ledger.json");
    std::fs::write(&path, serde_json::to_string_pretty(ledger).unwrap()).unwrap();
    path
}
