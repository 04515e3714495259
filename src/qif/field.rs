//! Typed values of a single QIF line and their text codec.

use std::{fmt, rc::Rc, str::FromStr};

use chrono::NaiveDate;
use rust_decimal::Decimal;
use thiserror::Error;

use super::{
    entity::{Account, AccountType, Category, Class, Named, Payee, Security},
    file::QifFile,
};
use crate::config::DateFormat;

/// Two-digit years below this value belong to the 21st century.
pub const CENTURY_PIVOT: i32 = 50;

pub const RECONCILED_CODE: &str = "X";
pub const CLEARED_CODE: &str = "*";

const CLASS_SEPARATOR: &str = "/[";

/// Text-level settings shared by every line of one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QifFormat {
    pub date_format: DateFormat,
}

impl QifFormat {
    pub fn new(date_format: DateFormat) -> Self {
        Self { date_format }
    }

    pub fn format_date(&self, date: NaiveDate) -> String {
        date.format(self.date_format.pattern()).to_string()
    }

    pub fn parse_date(&self, text: &str) -> Result<NaiveDate, FieldError> {
        let parts: Vec<&str> = text
            .split(|ch: char| !ch.is_ascii_digit())
            .filter(|part| !part.is_empty())
            .collect();
        if parts.len() != 3 {
            return Err(FieldError::Date(text.to_string()));
        }
        let number = |part: &str| {
            part.parse::<u32>()
                .map_err(|_| FieldError::Date(text.to_string()))
        };
        let (day, month) = match self.date_format {
            DateFormat::DayMonthYear => (number(parts[0])?, number(parts[1])?),
            DateFormat::MonthDayYear => (number(parts[1])?, number(parts[0])?),
        };
        let raw_year = number(parts[2])? as i32;
        let year = if parts[2].len() <= 2 {
            if raw_year < CENTURY_PIVOT {
                2000 + raw_year
            } else {
                1900 + raw_year
            }
        } else {
            raw_year
        };
        NaiveDate::from_ymd_opt(year, month, day).ok_or_else(|| FieldError::Date(text.to_string()))
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FieldError {
    #[error("invalid date `{0}`")]
    Date(String),
    #[error("invalid number `{0}`")]
    Number(String),
    #[error("unknown action `{0}`")]
    Action(String),
    #[error("unknown account type `{0}`")]
    AccountType(String),
    #[error("malformed price line `{0}`")]
    PriceLine(String),
}

/// Investment action carried by the `N` line of an investment record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Buy,
    BuyX,
    Sell,
    SellX,
    ShrsIn,
    ShrsOut,
    StkSplit,
    Div,
    DivX,
    ReinvDiv,
    RtrnCap,
    RtrnCapX,
    XIn,
    XOut,
    MiscInc,
    MiscIncX,
    MiscExp,
    MiscExpX,
    IntInc,
}

impl Action {
    pub const ALL: [Action; 19] = [
        Action::Buy,
        Action::BuyX,
        Action::Sell,
        Action::SellX,
        Action::ShrsIn,
        Action::ShrsOut,
        Action::StkSplit,
        Action::Div,
        Action::DivX,
        Action::ReinvDiv,
        Action::RtrnCap,
        Action::RtrnCapX,
        Action::XIn,
        Action::XOut,
        Action::MiscInc,
        Action::MiscIncX,
        Action::MiscExp,
        Action::MiscExpX,
        Action::IntInc,
    ];

    pub fn code(self) -> &'static str {
        match self {
            Action::Buy => "Buy",
            Action::BuyX => "BuyX",
            Action::Sell => "Sell",
            Action::SellX => "SellX",
            Action::ShrsIn => "ShrsIn",
            Action::ShrsOut => "ShrsOut",
            Action::StkSplit => "StkSplit",
            Action::Div => "Div",
            Action::DivX => "DivX",
            Action::ReinvDiv => "ReinvDiv",
            Action::RtrnCap => "RtrnCap",
            Action::RtrnCapX => "RtrnCapX",
            Action::XIn => "XIn",
            Action::XOut => "XOut",
            Action::MiscInc => "MiscInc",
            Action::MiscIncX => "MiscIncX",
            Action::MiscExp => "MiscExp",
            Action::MiscExpX => "MiscExpX",
            Action::IntInc => "IntInc",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|action| action.code() == code)
    }

    /// Variant carrying an inline transfer account, if the action has one.
    pub fn linked(self) -> Self {
        match self {
            Action::Buy => Action::BuyX,
            Action::Sell => Action::SellX,
            Action::Div => Action::DivX,
            Action::RtrnCap => Action::RtrnCapX,
            Action::MiscInc => Action::MiscIncX,
            Action::MiscExp => Action::MiscExpX,
            other => other,
        }
    }

    /// Share movement that cancels a nominal unit booked by this action.
    pub fn unit_correction(self) -> Option<Self> {
        match self {
            Action::Buy | Action::BuyX | Action::ShrsIn | Action::ReinvDiv => Some(Action::ShrsOut),
            Action::Sell | Action::SellX | Action::ShrsOut => Some(Action::ShrsIn),
            _ => None,
        }
    }
}

/// Destination of an `L`/`S` line: a category or a `[transfer account]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Target {
    Category(Rc<Category>),
    Account(Rc<Account>),
}

impl Target {
    fn reference(&self) -> String {
        match self {
            Target::Category(category) => category.name.clone(),
            Target::Account(account) => format!("[{}]", account.name),
        }
    }
}

/// A reference together with the classes attached to it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Tagged<T> {
    pub item: T,
    pub classes: Vec<Rc<Class>>,
}

impl<T> Tagged<T> {
    pub fn new(item: T) -> Self {
        Self {
            item,
            classes: Vec::new(),
        }
    }

    pub fn with_classes(mut self, classes: Vec<Rc<Class>>) -> Self {
        self.classes = classes;
        self
    }

    fn suffix(&self) -> String {
        if self.classes.is_empty() {
            return String::new();
        }
        let mut out = String::from("/");
        for class in &self.classes {
            out.push('[');
            out.push_str(&class.name);
            out.push(']');
        }
        out
    }
}

/// Value kind a line type is decoded as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Date,
    Money,
    Text,
    Rate,
    Ratio,
    Units,
    Price,
    Cleared,
    Flag,
    Action,
    AccountType,
    Target,
    Payee,
    Security,
    PricePoint,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Field {
    Date(NaiveDate),
    Money(Decimal),
    Text(String),
    Rate(Decimal),
    Ratio(Decimal),
    Units(Decimal),
    Price(Decimal),
    Cleared(bool),
    Flag,
    Action(Action),
    AccountType(AccountType),
    Target(Tagged<Target>),
    Payee(Tagged<Rc<Payee>>),
    Security(Tagged<Rc<Security>>),
    PricePoint {
        security: Rc<Security>,
        price: Decimal,
        date: NaiveDate,
    },
}

impl Field {
    pub fn category(category: Rc<Category>, classes: Vec<Rc<Class>>) -> Self {
        Field::Target(Tagged::new(Target::Category(category)).with_classes(classes))
    }

    pub fn account(account: Rc<Account>, classes: Vec<Rc<Class>>) -> Self {
        Field::Target(Tagged::new(Target::Account(account)).with_classes(classes))
    }

    pub fn payee(payee: Rc<Payee>) -> Self {
        Field::Payee(Tagged::new(payee))
    }

    pub fn security(security: Rc<Security>) -> Self {
        Field::Security(Tagged::new(security))
    }

    pub fn kind(&self) -> FieldKind {
        match self {
            Field::Date(_) => FieldKind::Date,
            Field::Money(_) => FieldKind::Money,
            Field::Text(_) => FieldKind::Text,
            Field::Rate(_) => FieldKind::Rate,
            Field::Ratio(_) => FieldKind::Ratio,
            Field::Units(_) => FieldKind::Units,
            Field::Price(_) => FieldKind::Price,
            Field::Cleared(_) => FieldKind::Cleared,
            Field::Flag => FieldKind::Flag,
            Field::Action(_) => FieldKind::Action,
            Field::AccountType(_) => FieldKind::AccountType,
            Field::Target(_) => FieldKind::Target,
            Field::Payee(_) => FieldKind::Payee,
            Field::Security(_) => FieldKind::Security,
            Field::PricePoint { .. } => FieldKind::PricePoint,
        }
    }

    /// Decimal payload of numeric fields.
    pub fn decimal(&self) -> Option<Decimal> {
        match self {
            Field::Money(value)
            | Field::Rate(value)
            | Field::Ratio(value)
            | Field::Units(value)
            | Field::Price(value) => Some(*value),
            _ => None,
        }
    }

    /// Renders the value part of the line (without the type code).
    pub fn format(&self, format: &QifFormat) -> String {
        match self {
            Field::Date(date) => format.format_date(*date),
            Field::Money(value) => format_money(*value),
            Field::Text(text) => single_line(text),
            Field::Rate(value) | Field::Ratio(value) | Field::Units(value) | Field::Price(value) => {
                format_decimal(*value)
            }
            Field::Cleared(true) => RECONCILED_CODE.to_string(),
            Field::Cleared(false) => CLEARED_CODE.to_string(),
            Field::Flag => String::new(),
            Field::Action(action) => action.code().to_string(),
            Field::AccountType(kind) => kind.code().to_string(),
            Field::Target(target) => {
                single_line(&format!("{}{}", target.item.reference(), target.suffix()))
            }
            Field::Payee(payee) => single_line(&format!("{}{}", payee.item.name(), payee.suffix())),
            Field::Security(security) => {
                single_line(&format!("{}{}", security.item.name(), security.suffix()))
            }
            Field::PricePoint {
                security,
                price,
                date,
            } => single_line(&format!(
                "\"{}\",{},\"{}\"",
                security.price_key(),
                format_decimal(*price),
                format.format_date(*date)
            )),
        }
    }

    /// Decodes `text` as `kind`.
    ///
    /// References that cannot be resolved against `file` yield `Ok(None)`;
    /// payees and classes are registered on demand.
    pub fn parse(
        kind: FieldKind,
        text: &str,
        format: &QifFormat,
        file: &mut QifFile,
    ) -> Result<Option<Field>, FieldError> {
        let field = match kind {
            FieldKind::Date => Field::Date(format.parse_date(text)?),
            FieldKind::Money => Field::Money(parse_decimal(text)?),
            FieldKind::Text => Field::Text(text.to_string()),
            FieldKind::Rate => Field::Rate(parse_decimal(text)?),
            FieldKind::Ratio => Field::Ratio(parse_decimal(text)?),
            FieldKind::Units => Field::Units(parse_decimal(text)?),
            FieldKind::Price => Field::Price(parse_decimal(text)?),
            FieldKind::Cleared => Field::Cleared(text == RECONCILED_CODE),
            FieldKind::Flag => Field::Flag,
            FieldKind::Action => Field::Action(
                Action::from_code(text).ok_or_else(|| FieldError::Action(text.to_string()))?,
            ),
            FieldKind::AccountType => Field::AccountType(
                AccountType::from_code(text)
                    .ok_or_else(|| FieldError::AccountType(text.to_string()))?,
            ),
            FieldKind::Target => {
                let (base, classes) = split_classes(text, file);
                let target = match base.strip_prefix('[').and_then(|rest| rest.strip_suffix(']')) {
                    Some(account) => file.get_account(account).map(Target::Account),
                    None => file.get_category(base).map(Target::Category),
                };
                match target {
                    Some(target) => Field::Target(Tagged::new(target).with_classes(classes)),
                    None => return Ok(None),
                }
            }
            FieldKind::Payee => {
                let (base, classes) = split_classes(text, file);
                let payee = file.register_payee(base);
                Field::Payee(Tagged::new(payee).with_classes(classes))
            }
            FieldKind::Security => {
                let (base, classes) = split_classes(text, file);
                let security = file
                    .get_security(base)
                    .or_else(|| file.get_security_by_symbol(base));
                match security {
                    Some(security) => Field::Security(Tagged::new(security).with_classes(classes)),
                    None => return Ok(None),
                }
            }
            FieldKind::PricePoint => return parse_price_point(text, format, file),
        };
        Ok(Some(field))
    }
}

/// Replaces line breaks so a value never spills onto a second QIF line.
pub(crate) fn single_line(text: &str) -> String {
    text.replace(['\r', '\n'], " ")
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.format(&QifFormat::default()))
    }
}

/// Splits `Name/[a][b]` into the base reference and its resolved classes.
fn split_classes<'t>(text: &'t str, file: &mut QifFile) -> (&'t str, Vec<Rc<Class>>) {
    let Some(position) = text.find(CLASS_SEPARATOR) else {
        return (text, Vec::new());
    };
    let (base, suffix) = text.split_at(position);
    let mut rest = &suffix[1..];
    let mut names = Vec::new();
    while !rest.is_empty() {
        let Some(inner) = rest.strip_prefix('[') else {
            return (text, Vec::new());
        };
        let Some(end) = inner.find(']') else {
            return (text, Vec::new());
        };
        names.push(&inner[..end]);
        rest = &inner[end + 1..];
    }
    let classes = names
        .into_iter()
        .map(|name| file.register_class(name))
        .collect();
    (base, classes)
}

fn parse_price_point(
    text: &str,
    format: &QifFormat,
    file: &mut QifFile,
) -> Result<Option<Field>, FieldError> {
    let parts: Vec<&str> = text.split(',').map(|part| part.trim().trim_matches('"')).collect();
    if parts.len() != 3 {
        return Err(FieldError::PriceLine(text.to_string()));
    }
    let price = parse_decimal(parts[1])?;
    let date = format.parse_date(parts[2])?;
    let security = file
        .get_security_by_symbol(parts[0])
        .or_else(|| file.get_security(parts[0]));
    Ok(security.map(|security| Field::PricePoint {
        security,
        price,
        date,
    }))
}

fn canonical(value: Decimal) -> Decimal {
    if value.is_zero() {
        Decimal::ZERO
    } else {
        value
    }
}

/// Money always renders with two decimal places.
pub fn format_money(value: Decimal) -> String {
    format!("{:.2}", canonical(value.round_dp(2)))
}

/// Non-money decimals render without trailing zeros.
pub fn format_decimal(value: Decimal) -> String {
    canonical(value).normalize().to_string()
}

pub fn parse_decimal(text: &str) -> Result<Decimal, FieldError> {
    let cleaned: String = text.trim().chars().filter(|ch| *ch != ',').collect();
    Decimal::from_str(&cleaned).map_err(|_| FieldError::Number(text.to_string()))
}
