//! Deduplicated reference objects of a QIF file.

use std::rc::Rc;

use super::{
    field::Field,
    record::{LineType, Record, RecordKind},
};

/// Entities are identified by name inside one file.
pub trait Named {
    fn name(&self) -> &str;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccountType {
    Bank,
    Cash,
    CreditCard,
    Investment,
    OtherAsset,
    OtherLiability,
}

impl AccountType {
    pub const ALL: [AccountType; 6] = [
        AccountType::Bank,
        AccountType::Cash,
        AccountType::CreditCard,
        AccountType::Investment,
        AccountType::OtherAsset,
        AccountType::OtherLiability,
    ];

    pub fn code(self) -> &'static str {
        match self {
            AccountType::Bank => "Bank",
            AccountType::Cash => "Cash",
            AccountType::CreditCard => "CCard",
            AccountType::Investment => "Invst",
            AccountType::OtherAsset => "Oth A",
            AccountType::OtherLiability => "Oth L",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.code() == code)
    }

    /// Record kind used for this account's events.
    pub fn event_kind(self) -> RecordKind {
        match self {
            AccountType::Investment => RecordKind::Investment,
            _ => RecordKind::Event,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Account {
    pub name: String,
    pub account_type: AccountType,
    pub description: Option<String>,
}

impl Account {
    pub fn new(name: impl Into<String>, account_type: AccountType) -> Self {
        Self {
            name: name.into(),
            account_type,
            description: None,
        }
    }

    pub fn is_investment(&self) -> bool {
        self.account_type == AccountType::Investment
    }

    pub fn to_record(&self) -> Record {
        let mut record = Record::new(RecordKind::Account);
        record
            .add_line(LineType::Name, Field::Text(self.name.clone()))
            .add_line(LineType::AccountType, Field::AccountType(self.account_type));
        if let Some(description) = &self.description {
            record.add_line(LineType::Description, Field::Text(description.clone()));
        }
        record
    }
}

impl Named for Account {
    fn name(&self) -> &str {
        &self.name
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Payee {
    pub name: String,
}

impl Named for Payee {
    fn name(&self) -> &str {
        &self.name
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Security {
    pub name: String,
    pub symbol: String,
    pub security_type: String,
}

impl Security {
    pub fn to_record(&self) -> Record {
        let mut record = Record::new(RecordKind::Security);
        record.add_line(LineType::Name, Field::Text(self.name.clone()));
        if !self.symbol.is_empty() {
            record.add_line(LineType::Symbol, Field::Text(self.symbol.clone()));
        }
        record.add_line(LineType::SecurityType, Field::Text(self.security_type.clone()));
        record
    }

    /// Text used to key price lines; falls back to the name without a symbol.
    pub fn price_key(&self) -> &str {
        if self.symbol.is_empty() {
            &self.name
        } else {
            &self.symbol
        }
    }
}

impl Named for Security {
    fn name(&self) -> &str {
        &self.name
    }
}

/// Category an event or split is booked against.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Category {
    pub name: String,
    pub income: bool,
    pub description: Option<String>,
}

impl Category {
    pub fn to_record(&self) -> Record {
        let mut record = Record::new(RecordKind::Category);
        record.add_line(LineType::Name, Field::Text(self.name.clone()));
        if let Some(description) = &self.description {
            record.add_line(LineType::Description, Field::Text(description.clone()));
        }
        if self.income {
            record.add_line(LineType::IncomeFlag, Field::Flag);
        } else {
            record.add_line(LineType::ExpenseFlag, Field::Flag);
        }
        record
    }
}

impl Named for Category {
    fn name(&self) -> &str {
        &self.name
    }
}

/// A category that other categories are nested under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParentCategory {
    pub category: Rc<Category>,
    pub children: Vec<Rc<Category>>,
}

impl Named for ParentCategory {
    fn name(&self) -> &str {
        &self.category.name
    }
}

/// QIF class (tag) attachable to references.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Class {
    pub name: String,
    pub description: Option<String>,
}

impl Class {
    pub fn to_record(&self) -> Record {
        let mut record = Record::new(RecordKind::Class);
        record.add_line(LineType::Name, Field::Text(self.name.clone()));
        if let Some(description) = &self.description {
            record.add_line(LineType::Description, Field::Text(description.clone()));
        }
        record
    }
}

impl Named for Class {
    fn name(&self) -> &str {
        &self.name
    }
}
