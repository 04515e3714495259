use std::{io::Write, rc::Rc};

use super::{
    Progress, Stage, ACCOUNT_HEADER, AUTO_SWITCH_OFF, AUTO_SWITCH_ON, CATEGORY_HEADER,
    CLASS_HEADER, PRICES_HEADER, SECURITY_HEADER, TYPE_PREFIX,
};
use crate::{
    errors::Result,
    qif::{Field, LineType, QifFile, QifFormat, Record, RecordKind},
};

/// How a write ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Completed,
    /// The progress sink asked to stop during `Stage`; the output is partial.
    Cancelled(Stage),
}

/// Renders a sorted [`QifFile`] section by section.
pub struct QifWriter<W: Write> {
    out: W,
    format: QifFormat,
}

impl<W: Write> QifWriter<W> {
    pub fn new(out: W, format: QifFormat) -> Self {
        Self { out, format }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    /// Writes every section of `file`. I/O errors abort immediately; a
    /// cancelled write leaves discarding the partial output to the caller.
    pub fn write_file(&mut self, file: &QifFile, progress: &mut dyn Progress) -> Result<WriteOutcome> {
        let classes: Vec<_> = file.classes().iter().collect();
        if !classes.is_empty() {
            self.header(CLASS_HEADER)?;
        }
        if !self.stage(Stage::Classes, &classes, progress, |writer, class| {
            writer.record(&class.to_record())
        })? {
            return self.cancel(Stage::Classes);
        }

        self.header(CATEGORY_HEADER)?;
        let categories: Vec<_> = file.categories().iter().collect();
        if !self.stage(Stage::Categories, &categories, progress, |writer, category| {
            writer.record(&category.to_record())
        })? {
            return self.cancel(Stage::Categories);
        }

        self.header(AUTO_SWITCH_ON)?;
        self.header(ACCOUNT_HEADER)?;
        let accounts: Vec<_> = file.accounts().iter().collect();
        let completed = self.stage(Stage::Accounts, &accounts, progress, |writer, account| {
            writer.record(&account.to_record())
        })?;
        self.header(AUTO_SWITCH_OFF)?;
        if !completed {
            return self.cancel(Stage::Accounts);
        }

        let securities: Vec<_> = file.securities().iter().collect();
        if !securities.is_empty() {
            self.header(SECURITY_HEADER)?;
        }
        if !self.stage(Stage::Securities, &securities, progress, |writer, security| {
            writer.record(&security.to_record())
        })? {
            return self.cancel(Stage::Securities);
        }

        let blocks: Vec<_> = file
            .account_events()
            .iter()
            .filter(|entry| !entry.events.is_empty())
            .collect();
        if !self.stage(Stage::Events, &blocks, progress, |writer, entry| {
            writer.header(ACCOUNT_HEADER)?;
            writer.record(&entry.account.to_record())?;
            writer.header(&format!("{TYPE_PREFIX}{}", entry.account.account_type.code()))?;
            entry.events.iter().try_for_each(|event| writer.record(event))
        })? {
            return self.cancel(Stage::Events);
        }

        let lists: Vec<_> = file
            .security_prices()
            .iter()
            .filter(|entry| !entry.prices.is_empty())
            .collect();
        if !self.stage(Stage::Prices, &lists, progress, |writer, entry| {
            writer.header(PRICES_HEADER)?;
            entry.prices.iter().try_for_each(|price| {
                let record = Record::new(RecordKind::Price).with_line(
                    LineType::PricePoint,
                    Field::PricePoint {
                        security: Rc::clone(&entry.security),
                        price: price.price,
                        date: price.date,
                    },
                );
                writer.record(&record)
            })
        })? {
            return self.cancel(Stage::Prices);
        }

        self.out.flush()?;
        Ok(WriteOutcome::Completed)
    }

    /// Writes `items` one unit at a time, polling `progress` after each.
    /// An empty stage still reports once. Returns `false` when cancelled.
    fn stage<T>(
        &mut self,
        stage: Stage,
        items: &[T],
        progress: &mut dyn Progress,
        mut write: impl FnMut(&mut Self, &T) -> Result<()>,
    ) -> Result<bool> {
        let total = items.len();
        if total == 0 {
            return Ok(progress.step(stage, 0, 0));
        }
        for (index, item) in items.iter().enumerate() {
            write(self, item)?;
            if !progress.step(stage, index + 1, total) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn header(&mut self, header: &str) -> Result<()> {
        writeln!(self.out, "{header}")?;
        Ok(())
    }

    fn record(&mut self, record: &Record) -> Result<()> {
        self.out.write_all(record.format(&self.format).as_bytes())?;
        Ok(())
    }

    fn cancel(&mut self, stage: Stage) -> Result<WriteOutcome> {
        tracing::warn!(stage = stage.label(), "QIF write cancelled");
        self.out.flush()?;
        Ok(WriteOutcome::Cancelled(stage))
    }
}

/// Renders `file` to a string.
pub fn write_to_string(file: &QifFile, format: QifFormat) -> Result<String> {
    let mut writer = QifWriter::new(Vec::new(), format);
    writer.write_file(file, &mut super::NoProgress)?;
    String::from_utf8(writer.into_inner())
        .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidData, err).into())
}
