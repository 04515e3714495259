//! Records: ordered line collections forming one logical QIF entity.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;

use super::field::{single_line, Action, Field, FieldKind, QifFormat, Tagged, Target};

pub const RECORD_TERMINATOR: &str = "^";

/// Closed set of line types. Declaration order is the output order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LineType {
    Name,
    Symbol,
    Description,
    AccountType,
    SecurityType,
    IncomeFlag,
    ExpenseFlag,
    Date,
    Action,
    Security,
    Price,
    Quantity,
    Amount,
    Cleared,
    Number,
    Payee,
    Comment,
    Commission,
    Category,
    TransferAmount,
    PricePoint,
}

impl LineType {
    pub fn field_kind(self) -> FieldKind {
        match self {
            LineType::Name
            | LineType::Symbol
            | LineType::Description
            | LineType::SecurityType
            | LineType::Number
            | LineType::Comment => FieldKind::Text,
            LineType::AccountType => FieldKind::AccountType,
            LineType::IncomeFlag | LineType::ExpenseFlag => FieldKind::Flag,
            LineType::Date => FieldKind::Date,
            LineType::Action => FieldKind::Action,
            LineType::Security => FieldKind::Security,
            LineType::Price => FieldKind::Price,
            LineType::Quantity => FieldKind::Units,
            LineType::Amount | LineType::Commission | LineType::TransferAmount => FieldKind::Money,
            LineType::Cleared => FieldKind::Cleared,
            LineType::Payee => FieldKind::Payee,
            LineType::Category => FieldKind::Target,
            LineType::PricePoint => FieldKind::PricePoint,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    Event,
    Investment,
    Account,
    Category,
    Class,
    Security,
    Price,
}

const EVENT_CODES: &[(LineType, char)] = &[
    (LineType::Date, 'D'),
    (LineType::Amount, 'T'),
    (LineType::Cleared, 'C'),
    (LineType::Number, 'N'),
    (LineType::Payee, 'P'),
    (LineType::Comment, 'M'),
    (LineType::Category, 'L'),
];

const INVESTMENT_CODES: &[(LineType, char)] = &[
    (LineType::Date, 'D'),
    (LineType::Action, 'N'),
    (LineType::Security, 'Y'),
    (LineType::Price, 'I'),
    (LineType::Quantity, 'Q'),
    (LineType::Amount, 'T'),
    (LineType::Cleared, 'C'),
    (LineType::Payee, 'P'),
    (LineType::Comment, 'M'),
    (LineType::Commission, 'O'),
    (LineType::Category, 'L'),
    (LineType::TransferAmount, '$'),
];

const ACCOUNT_CODES: &[(LineType, char)] = &[
    (LineType::Name, 'N'),
    (LineType::AccountType, 'T'),
    (LineType::Description, 'D'),
];

const CATEGORY_CODES: &[(LineType, char)] = &[
    (LineType::Name, 'N'),
    (LineType::Description, 'D'),
    (LineType::IncomeFlag, 'I'),
    (LineType::ExpenseFlag, 'E'),
];

const CLASS_CODES: &[(LineType, char)] = &[(LineType::Name, 'N'), (LineType::Description, 'D')];

const SECURITY_CODES: &[(LineType, char)] = &[
    (LineType::Name, 'N'),
    (LineType::Symbol, 'S'),
    (LineType::SecurityType, 'T'),
];

pub const SPLIT_TARGET_CODE: char = 'S';
pub const SPLIT_COMMENT_CODE: char = 'E';
pub const SPLIT_AMOUNT_CODE: char = '$';
pub const SPLIT_PERCENT_CODE: char = '%';

impl RecordKind {
    fn codes(self) -> &'static [(LineType, char)] {
        match self {
            RecordKind::Event => EVENT_CODES,
            RecordKind::Investment => INVESTMENT_CODES,
            RecordKind::Account => ACCOUNT_CODES,
            RecordKind::Category => CATEGORY_CODES,
            RecordKind::Class => CLASS_CODES,
            RecordKind::Security => SECURITY_CODES,
            RecordKind::Price => &[],
        }
    }

    /// Line prefix for `line` in this record kind; price lines carry none.
    pub fn code(self, line: LineType) -> Option<Option<char>> {
        if self == RecordKind::Price {
            return (line == LineType::PricePoint).then_some(None);
        }
        self.codes()
            .iter()
            .find(|(candidate, _)| *candidate == line)
            .map(|(_, code)| Some(*code))
    }

    pub fn line_for_code(self, code: char) -> Option<LineType> {
        self.codes()
            .iter()
            .find(|(_, candidate)| *candidate == code)
            .map(|(line, _)| *line)
    }

    pub fn supports_splits(self) -> bool {
        self == RecordKind::Event
    }
}

/// One line of a split event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Split {
    /// Category or transfer account; absent only when a parsed target was unresolvable.
    pub target: Option<Tagged<Target>>,
    pub amount: Option<Decimal>,
    pub percent: Option<Decimal>,
    pub comment: Option<String>,
}

impl Split {
    pub fn new(target: Tagged<Target>, amount: Decimal) -> Self {
        Self {
            target: Some(target),
            amount: Some(amount),
            percent: None,
            comment: None,
        }
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    fn write(&self, format: &QifFormat, out: &mut String) {
        if let Some(target) = &self.target {
            push_line(out, SPLIT_TARGET_CODE, &Field::Target(target.clone()).format(format));
        }
        if let Some(comment) = &self.comment {
            push_line(out, SPLIT_COMMENT_CODE, &single_line(comment));
        }
        if let Some(amount) = self.amount {
            push_line(out, SPLIT_AMOUNT_CODE, &Field::Money(amount).format(format));
        }
        if let Some(percent) = self.percent {
            push_line(out, SPLIT_PERCENT_CODE, &Field::Rate(percent).format(format));
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Record {
    kind: RecordKind,
    lines: BTreeMap<LineType, Field>,
    splits: Vec<Split>,
}

impl Record {
    pub fn new(kind: RecordKind) -> Self {
        Self {
            kind,
            lines: BTreeMap::new(),
            splits: Vec::new(),
        }
    }

    /// Plain event skeleton with its date and total.
    pub fn event(date: NaiveDate, amount: Decimal) -> Self {
        let mut record = Self::new(RecordKind::Event);
        record
            .add_line(LineType::Date, Field::Date(date))
            .add_line(LineType::Amount, Field::Money(amount));
        record
    }

    /// Investment record skeleton with its date and action.
    pub fn investment(date: NaiveDate, action: Action) -> Self {
        let mut record = Self::new(RecordKind::Investment);
        record
            .add_line(LineType::Date, Field::Date(date))
            .add_line(LineType::Action, Field::Action(action));
        record
    }

    pub fn kind(&self) -> RecordKind {
        self.kind
    }

    /// Sets the line of `line` type, replacing any earlier value.
    pub fn add_line(&mut self, line: LineType, field: Field) -> &mut Self {
        if self.kind.code(line).is_none() {
            tracing::warn!(?line, kind = ?self.kind, "line type not valid for record kind");
            return self;
        }
        self.lines.insert(line, field);
        self
    }

    pub fn with_line(mut self, line: LineType, field: Field) -> Self {
        self.add_line(line, field);
        self
    }

    pub fn line(&self, line: LineType) -> Option<&Field> {
        self.lines.get(&line)
    }

    pub fn add_split(&mut self, split: Split) -> &mut Self {
        if self.kind.supports_splits() {
            self.splits.push(split);
        } else {
            tracing::warn!(kind = ?self.kind, "splits are only valid on plain events");
        }
        self
    }

    pub fn splits(&self) -> &[Split] {
        &self.splits
    }

    pub fn date(&self) -> Option<NaiveDate> {
        match self.lines.get(&LineType::Date) {
            Some(Field::Date(date)) => Some(*date),
            _ => None,
        }
    }

    pub fn amount(&self) -> Option<Decimal> {
        self.lines.get(&LineType::Amount).and_then(Field::decimal)
    }

    pub fn action(&self) -> Option<Action> {
        match self.lines.get(&LineType::Action) {
            Some(Field::Action(action)) => Some(*action),
            _ => None,
        }
    }

    pub fn quantity(&self) -> Option<Decimal> {
        self.lines.get(&LineType::Quantity).and_then(Field::decimal)
    }

    /// Sum of split amounts; `None` without splits.
    pub fn split_total(&self) -> Option<Decimal> {
        if self.splits.is_empty() {
            return None;
        }
        Some(self.splits.iter().filter_map(|split| split.amount).sum())
    }

    /// Renders the record including its terminator line.
    pub fn format(&self, format: &QifFormat) -> String {
        let mut out = String::new();
        for (line, field) in &self.lines {
            match self.kind.code(*line) {
                Some(Some(code)) => push_line(&mut out, code, &field.format(format)),
                Some(None) => {
                    out.push_str(&field.format(format));
                    out.push('\n');
                }
                None => {}
            }
        }
        for split in &self.splits {
            split.write(format, &mut out);
        }
        out.push_str(RECORD_TERMINATOR);
        out.push('\n');
        out
    }
}

fn push_line(out: &mut String, code: char, value: &str) {
    out.push(code);
    out.push_str(value);
    out.push('\n');
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qif::entity::{Account, AccountType, Category};
    use rust_decimal_macros::dec;
    use std::rc::Rc;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2020, 2, 1).unwrap()
    }

    #[test]
    fn lines_render_in_type_order_not_insertion_order() {
        let mut record = Record::new(RecordKind::Event);
        record
            .add_line(LineType::Comment, Field::Text("weekly shop".into()))
            .add_line(LineType::Amount, Field::Money(dec!(-25)))
            .add_line(LineType::Date, Field::Date(date()));
        assert_eq!(
            record.format(&QifFormat::default()),
            "D01/02/20\nT-25.00\nMweekly shop\n^\n"
        );
    }

    #[test]
    fn later_lines_overwrite_earlier_ones() {
        let mut record = Record::event(date(), dec!(1));
        record.add_line(LineType::Amount, Field::Money(dec!(2)));
        assert_eq!(record.amount(), Some(dec!(2)));
    }

    #[test]
    fn investment_codes_differ_from_event_codes() {
        let record = Record::investment(date(), Action::Buy)
            .with_line(LineType::Quantity, Field::Units(dec!(10)))
            .with_line(LineType::Price, Field::Price(dec!(2.5)))
            .with_line(LineType::Amount, Field::Money(dec!(25)));
        assert_eq!(
            record.format(&QifFormat::default()),
            "D01/02/20\nNBuy\nI2.5\nQ10\nT25.00\n^\n"
        );
    }

    #[test]
    fn invalid_line_for_kind_is_ignored() {
        let record = Record::event(date(), dec!(1)).with_line(LineType::Quantity, Field::Units(dec!(3)));
        assert!(record.line(LineType::Quantity).is_none());
    }

    #[test]
    fn splits_follow_lines() {
        let groceries = Rc::new(Category {
            name: "Groceries".into(),
            income: false,
            description: None,
        });
        let savings = Rc::new(Account::new("Savings", AccountType::Bank));
        let mut record = Record::event(date(), dec!(-30));
        record
            .add_split(Split::new(Tagged::new(Target::Category(groceries)), dec!(-20)).with_comment("food"))
            .add_split(Split::new(Tagged::new(Target::Account(savings)), dec!(-10)));
        assert_eq!(record.split_total(), Some(dec!(-30)));
        assert_eq!(
            record.format(&QifFormat::default()),
            "D01/02/20\nT-30.00\nSGroceries\nEfood\n$-20.00\nS[Savings]\n$-10.00\n^\n"
        );
    }

    #[test]
    fn equality_is_structural() {
        let first = Record::event(date(), dec!(5)).with_line(LineType::Number, Field::Text("101".into()));
        let second = Record::new(RecordKind::Event)
            .with_line(LineType::Number, Field::Text("101".into()))
            .with_line(LineType::Amount, Field::Money(dec!(5)))
            .with_line(LineType::Date, Field::Date(date()));
        assert_eq!(first, second);
    }
}
