use std::{io::Read, mem, rc::Rc};

use rust_decimal::Decimal;

use super::{
    ACCOUNT_HEADER, AUTO_SWITCH_OFF, AUTO_SWITCH_ON, CATEGORY_HEADER, CLASS_HEADER, PRICES_HEADER,
    SECURITY_HEADER, TYPE_PREFIX,
};
use crate::{
    config::FileType,
    errors::{QifError, Result},
    qif::{
        record::{SPLIT_AMOUNT_CODE, SPLIT_COMMENT_CODE, SPLIT_PERCENT_CODE, SPLIT_TARGET_CODE},
        Account, AccountType, Action, Field, FieldKind, LineType, QifFile, QifFormat, Record,
        RecordKind, Split,
    },
};

#[derive(Debug, Clone)]
enum Section {
    Preamble,
    Classes,
    Categories,
    AccountList,
    AccountHeader,
    Events(Rc<Account>),
    Securities,
    Prices,
    Unknown,
}

impl Section {
    fn record_kind(&self) -> Option<RecordKind> {
        match self {
            Section::Classes => Some(RecordKind::Class),
            Section::Categories => Some(RecordKind::Category),
            Section::AccountList | Section::AccountHeader => Some(RecordKind::Account),
            Section::Events(account) => Some(account.account_type.event_kind()),
            Section::Securities => Some(RecordKind::Security),
            Section::Prices => Some(RecordKind::Price),
            Section::Preamble | Section::Unknown => None,
        }
    }
}

/// Split lines belonging to the most recently opened split.
#[derive(Debug, Default)]
enum SplitState {
    #[default]
    NoOpenSplit,
    OpenSplit(Split),
}

impl SplitState {
    fn finish(&mut self, record: &mut Record) {
        if let SplitState::OpenSplit(split) = mem::take(self) {
            record.add_split(split);
        }
    }

    /// Open split, starting a new one when `occupied` says the current
    /// split already holds the value about to be set.
    fn open(&mut self, record: &mut Record, occupied: impl Fn(&Split) -> bool) -> Option<&mut Split> {
        let fresh = match self {
            SplitState::OpenSplit(split) => occupied(split),
            SplitState::NoOpenSplit => true,
        };
        if fresh {
            self.finish(record);
            *self = SplitState::OpenSplit(Split::default());
        }
        match self {
            SplitState::OpenSplit(split) => Some(split),
            SplitState::NoOpenSplit => None,
        }
    }
}

/// Record under construction.
struct Pending {
    record: Record,
    split: SplitState,
}

impl Pending {
    fn new(kind: RecordKind) -> Self {
        Self {
            record: Record::new(kind),
            split: SplitState::NoOpenSplit,
        }
    }

    fn finish(mut self) -> Record {
        self.split.finish(&mut self.record);
        self.record
    }
}

/// Parses QIF text produced for the same dialect back into a [`QifFile`].
#[derive(Debug, Clone, Copy)]
pub struct QifReader {
    format: QifFormat,
    file_type: FileType,
}

impl QifReader {
    pub fn new(format: QifFormat, file_type: FileType) -> Self {
        Self { format, file_type }
    }

    pub fn read<R: Read>(&self, mut input: R) -> Result<QifFile> {
        let mut text = String::new();
        input.read_to_string(&mut text)?;
        self.read_str(&text)
    }

    /// Malformed values fail with the offending line number; references
    /// that cannot be resolved are logged and skipped.
    pub fn read_str(&self, text: &str) -> Result<QifFile> {
        let mut file = QifFile::new(self.file_type);
        let mut section = Section::Preamble;
        let mut auto_switch = false;
        let mut current: Option<Rc<Account>> = None;
        let mut pending: Option<Pending> = None;

        for (index, raw) in text.lines().enumerate() {
            let number = index + 1;
            let line = raw.trim_end_matches('\r');
            if line.trim().is_empty() {
                continue;
            }

            if line.starts_with('!') {
                if pending.take().is_some() {
                    tracing::warn!(line = number, "unterminated record discarded");
                }
                section = match line {
                    AUTO_SWITCH_ON => {
                        auto_switch = true;
                        continue;
                    }
                    AUTO_SWITCH_OFF => {
                        auto_switch = false;
                        continue;
                    }
                    ACCOUNT_HEADER if auto_switch => Section::AccountList,
                    ACCOUNT_HEADER => Section::AccountHeader,
                    CLASS_HEADER => Section::Classes,
                    CATEGORY_HEADER => Section::Categories,
                    SECURITY_HEADER => Section::Securities,
                    PRICES_HEADER => Section::Prices,
                    other => self.event_section(other, current.as_ref(), number),
                };
                continue;
            }

            let Some(kind) = section.record_kind() else {
                tracing::warn!(line = number, "line outside a known section ignored");
                continue;
            };

            if line == crate::qif::record::RECORD_TERMINATOR {
                if let Some(done) = pending.take() {
                    self.store(&mut file, &section, &mut current, done.finish());
                }
                continue;
            }

            let entry = pending.get_or_insert_with(|| Pending::new(kind));
            self.parse_line(&mut file, entry, line, number)?;
        }

        if let Some(done) = pending.take() {
            tracing::warn!("missing terminator on the last record");
            self.store(&mut file, &section, &mut current, done.finish());
        }
        file.sort_lists();
        Ok(file)
    }

    fn event_section(&self, header: &str, current: Option<&Rc<Account>>, number: usize) -> Section {
        let Some(code) = header.strip_prefix(TYPE_PREFIX) else {
            tracing::warn!(line = number, header, "unknown header");
            return Section::Unknown;
        };
        match (AccountType::from_code(code), current) {
            (Some(account_type), Some(account)) => {
                if account.account_type != account_type {
                    tracing::warn!(
                        line = number,
                        account = %account.name,
                        "event type does not match the account type"
                    );
                }
                Section::Events(Rc::clone(account))
            }
            (Some(_), None) => {
                tracing::warn!(line = number, "events without a preceding account");
                Section::Unknown
            }
            (None, _) => {
                tracing::warn!(line = number, header, "unknown header");
                Section::Unknown
            }
        }
    }

    fn parse_line(&self, file: &mut QifFile, entry: &mut Pending, line: &str, number: usize) -> Result<()> {
        let kind = entry.record.kind();
        if kind == RecordKind::Price {
            match self.field(FieldKind::PricePoint, line, file, number)? {
                Some(field) => {
                    entry.record.add_line(LineType::PricePoint, field);
                }
                None => tracing::warn!(line = number, "price for an unknown security"),
            }
            return Ok(());
        }

        let mut chars = line.chars();
        let Some(code) = chars.next() else {
            return Ok(());
        };
        let value = chars.as_str();

        if kind.supports_splits() {
            match code {
                SPLIT_TARGET_CODE => {
                    entry.split.finish(&mut entry.record);
                    let target = match self.field(FieldKind::Target, value, file, number)? {
                        Some(Field::Target(target)) => Some(target),
                        _ => {
                            self.unresolved(file, &mut entry.record, value, number);
                            None
                        }
                    };
                    entry.split = SplitState::OpenSplit(Split {
                        target,
                        ..Split::default()
                    });
                    return Ok(());
                }
                SPLIT_AMOUNT_CODE => {
                    let amount = self.decimal(FieldKind::Money, value, file, number)?;
                    if let Some(split) = entry.split.open(&mut entry.record, occupied_amount) {
                        split.amount = amount;
                    }
                    return Ok(());
                }
                SPLIT_PERCENT_CODE => {
                    let percent = self.decimal(FieldKind::Rate, value, file, number)?;
                    if let Some(split) = entry.split.open(&mut entry.record, |split| split.percent.is_some()) {
                        split.percent = percent;
                    }
                    return Ok(());
                }
                SPLIT_COMMENT_CODE => {
                    let occupied = |split: &Split| split.comment.is_some() || occupied_amount(split);
                    if let Some(split) = entry.split.open(&mut entry.record, occupied) {
                        split.comment = Some(value.to_string());
                    }
                    return Ok(());
                }
                _ => {}
            }
        }

        let Some(line_type) = kind.line_for_code(code) else {
            tracing::warn!(line = number, %code, ?kind, "unknown line code ignored");
            return Ok(());
        };
        match self.field(line_type.field_kind(), value, file, number)? {
            Some(field) => {
                entry.record.add_line(line_type, field);
            }
            None if line_type == LineType::Category => {
                self.unresolved(file, &mut entry.record, value, number)
            }
            None => tracing::warn!(line = number, ?line_type, value, "unresolved reference"),
        }
        Ok(())
    }

    /// An unknown category or account is most likely free text: keep it as
    /// the payee when the record has none.
    fn unresolved(&self, file: &mut QifFile, record: &mut Record, value: &str, number: usize) {
        tracing::warn!(line = number, value, "unresolved category or account");
        if record.line(LineType::Payee).is_none() && record.kind().code(LineType::Payee).is_some() {
            let payee = file.register_payee(value);
            record.add_line(LineType::Payee, Field::payee(payee));
        }
    }

    fn field(&self, kind: FieldKind, value: &str, file: &mut QifFile, number: usize) -> Result<Option<Field>> {
        Field::parse(kind, value, &self.format, file).map_err(|err| QifError::parse(number, err.to_string()))
    }

    fn decimal(&self, kind: FieldKind, value: &str, file: &mut QifFile, number: usize) -> Result<Option<Decimal>> {
        Ok(self.field(kind, value, file, number)?.and_then(|field| field.decimal()))
    }

    fn store(&self, file: &mut QifFile, section: &Section, current: &mut Option<Rc<Account>>, mut record: Record) {
        let text = |record: &Record, line: LineType| match record.line(line) {
            Some(Field::Text(text)) => Some(text.clone()),
            _ => None,
        };
        match section {
            Section::Classes => {
                if let Some(name) = text(&record, LineType::Name) {
                    file.register_class_with(&name, text(&record, LineType::Description));
                }
            }
            Section::Categories => {
                if let Some(name) = text(&record, LineType::Name) {
                    let income = record.line(LineType::IncomeFlag).is_some();
                    file.register_category_with(&name, income, text(&record, LineType::Description));
                }
            }
            Section::AccountList | Section::AccountHeader => {
                let Some(name) = text(&record, LineType::Name) else {
                    tracing::warn!("account record without a name");
                    return;
                };
                let account_type = match record.line(LineType::AccountType) {
                    Some(Field::AccountType(account_type)) => *account_type,
                    _ => AccountType::Bank,
                };
                let account = file.register_account_with(
                    &name,
                    account_type,
                    text(&record, LineType::Description),
                );
                if matches!(section, Section::AccountHeader) {
                    *current = Some(account);
                }
            }
            Section::Events(account) => {
                if record.date().is_none() {
                    tracing::warn!(account = %account.name, "event record without a date skipped");
                    return;
                }
                if record.action() == Some(Action::StkSplit) {
                    if let Some(ratio) = record.quantity() {
                        record.add_line(LineType::Quantity, Field::Ratio(ratio));
                    }
                }
                file.add_event(account, record);
            }
            Section::Securities => {
                if let Some(name) = text(&record, LineType::Name) {
                    let symbol = text(&record, LineType::Symbol).unwrap_or_default();
                    let security_type = text(&record, LineType::SecurityType).unwrap_or_default();
                    file.register_security(&name, &symbol, &security_type);
                }
            }
            Section::Prices => {
                if let Some(Field::PricePoint { security, price, date }) = record.line(LineType::PricePoint) {
                    file.register_price(security, *date, *price);
                }
            }
            Section::Preamble | Section::Unknown => {}
        }
    }
}

fn occupied_amount(split: &Split) -> bool {
    split.amount.is_some() || split.percent.is_some()
}
