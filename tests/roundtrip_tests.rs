mod common;

use std::fs;

use common::{date, household_ledger, temp_dir};
use qif_core::{
    config::{DateFormat, ExportConfig, FileType},
    export::{build_file, export_to_path},
    io::{write_to_string, NoProgress, QifReader, Stage, WriteOutcome},
    ledger::{Account, AccountKind, Endpoint, Ledger, Payee, Transaction},
    qif::QifFormat,
};
use rust_decimal_macros::dec;

const DIALECTS: [FileType; 4] = [
    FileType::Quicken,
    FileType::MsMoney,
    FileType::GnuCash,
    FileType::Generic,
];

#[test]
fn reading_back_reproduces_the_written_text() {
    let ledger = household_ledger();
    for file_type in DIALECTS {
        let config = ExportConfig::for_file_type(file_type);
        let format = QifFormat::new(config.date_format);
        let (file, _) = build_file(&ledger, &config).unwrap();
        let written = write_to_string(&file, format).unwrap();

        let parsed = QifReader::new(format, file_type).read_str(&written).unwrap();
        let rewritten = write_to_string(&parsed, format).unwrap();
        assert_eq!(rewritten, written, "{file_type:?}");
    }
}

#[test]
fn month_first_dates_roundtrip() {
    let config = ExportConfig {
        date_format: DateFormat::MonthDayYear,
        ..ExportConfig::for_file_type(FileType::Generic)
    };
    let format = QifFormat::new(config.date_format);
    let (file, _) = build_file(&household_ledger(), &config).unwrap();
    let written = write_to_string(&file, format).unwrap();
    assert!(written.contains("D01/31/21"));

    let parsed = QifReader::new(format, FileType::Generic).read_str(&written).unwrap();
    assert_eq!(write_to_string(&parsed, format).unwrap(), written);
}

#[test]
fn export_to_path_writes_a_readable_file() {
    let path = temp_dir().join("out").join("household.qif");
    let config = ExportConfig::for_file_type(FileType::Quicken);
    let summary = export_to_path(&household_ledger(), &config, &path, &mut NoProgress).unwrap();
    assert_eq!(summary.outcome, WriteOutcome::Completed);
    assert!(summary.report.is_complete());

    let file = fs::File::open(&path).unwrap();
    let parsed = QifReader::new(QifFormat::new(config.date_format), config.file_type)
        .read(file)
        .unwrap();
    assert!(parsed.get_account("Current").is_some());
    assert!(parsed.get_security_by_symbol("ACM").is_some());
    assert!(!parsed.events_for("Broker").is_empty());
}

#[test]
fn cancelled_export_leaves_no_file() {
    let dir = temp_dir();
    let path = dir.join("cancelled.qif");
    let mut progress = |stage: Stage, _: usize, _: usize| stage != Stage::Events;
    let summary = export_to_path(
        &household_ledger(),
        &ExportConfig::for_file_type(FileType::Generic),
        &path,
        &mut progress,
    )
    .unwrap();
    assert_eq!(summary.outcome, WriteOutcome::Cancelled(Stage::Events));
    assert!(!path.exists());
    assert_eq!(fs::read_dir(&dir).unwrap().count(), 0);
}

#[test]
fn multi_line_text_stays_on_one_line() {
    let mut ledger = Ledger::new("Notes", date(2020, 1, 1));
    let current = ledger.add_account(Account::new("Current", AccountKind::Bank));
    let shop = ledger.add_payee(Payee::new("Corner\nShop"));
    ledger.add_transaction(
        Transaction::new(date(2020, 1, 2), dec!(4), Endpoint::Account(current), Endpoint::Payee(shop))
            .with_description("first\n^\nsecond"),
    );
    ledger.add_transaction(Transaction::new(
        date(2020, 1, 3),
        dec!(6),
        Endpoint::Account(current),
        Endpoint::Payee(shop),
    ));

    let config = ExportConfig::for_file_type(FileType::Generic);
    let format = QifFormat::new(config.date_format);
    let (file, _) = build_file(&ledger, &config).unwrap();
    let written = write_to_string(&file, format).unwrap();
    assert!(written.contains("\nMfirst ^ second\n"));
    assert!(written.contains("\nPCorner Shop\n"));

    let parsed = QifReader::new(format, FileType::Generic).read_str(&written).unwrap();
    assert_eq!(parsed.events_for("Current").len(), 2);
    assert_eq!(write_to_string(&parsed, format).unwrap(), written);
}
