use std::{env, path::PathBuf, process};

use chrono::NaiveDate;
use colored::Colorize;

use qif_core::{
    config::ExportConfig,
    export::export_to_path,
    init,
    io::{LogProgress, WriteOutcome},
    ledger::load_ledger,
    utils::{build_info, persistence},
};

fn main() {
    init();

    if let Err(err) = run() {
        eprintln!("{} {err}", "Error:".red().bold());
        process::exit(1);
    }
}

struct Options {
    ledger: PathBuf,
    output: PathBuf,
    config: Option<PathBuf>,
    cutoff: Option<NaiveDate>,
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let options = match parse_args(env::args().skip(1))? {
        Some(options) => options,
        None => return Ok(()),
    };

    let config_path = options.config.unwrap_or_else(persistence::default_config_file);
    let mut config = ExportConfig::load(&config_path)?;
    if options.cutoff.is_some() {
        config.cutoff = options.cutoff;
    }

    let ledger = load_ledger(&options.ledger)?;
    let summary = export_to_path(&ledger, &config, &options.output, &mut LogProgress)?;

    for dropped in &summary.report.dropped {
        eprintln!(
            "{} {} ({}): {}",
            "Dropped".yellow().bold(),
            dropped.id,
            dropped.date,
            dropped.reason
        );
    }
    match summary.outcome {
        WriteOutcome::Completed => println!(
            "{} {} transactions, {} prices written to {} ({})",
            "Exported".green().bold(),
            summary.report.processed,
            summary.report.prices,
            options.output.display(),
            config.file_type.label()
        ),
        WriteOutcome::Cancelled(stage) => {
            eprintln!("{} while writing {}", "Cancelled".yellow().bold(), stage.label());
            process::exit(2);
        }
    }
    Ok(())
}

fn parse_args(
    mut args: impl Iterator<Item = String>,
) -> Result<Option<Options>, Box<dyn std::error::Error>> {
    let mut positional = Vec::new();
    let mut config = None;
    let mut cutoff = None;
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--version" | "-V" => {
                println!("{}", build_info::summary());
                return Ok(None);
            }
            "--help" | "-h" => {
                print_usage();
                return Ok(None);
            }
            "--config" => {
                let value = args.next().ok_or("--config needs a path")?;
                config = Some(PathBuf::from(value));
            }
            "--cutoff" => {
                let value = args.next().ok_or("--cutoff needs a YYYY-MM-DD date")?;
                cutoff = Some(NaiveDate::parse_from_str(&value, "%Y-%m-%d")?);
            }
            _ => positional.push(arg),
        }
    }

    let mut positional = positional.into_iter();
    match (positional.next(), positional.next(), positional.next()) {
        (Some(ledger), Some(output), None) => Ok(Some(Options {
            ledger: PathBuf::from(ledger),
            output: PathBuf::from(output),
            config,
            cutoff,
        })),
        _ => {
            print_usage();
            process::exit(1);
        }
    }
}

fn print_usage() {
    eprintln!(
        "Usage: qif_export_cli <ledger.json> <output.qif> [options]\n\
         Options:\n  \
         --config <file.json>   export configuration (default: ~/.qif_core/config.json)\n  \
         --cutoff <YYYY-MM-DD>  last date to export\n  \
         --version              print build information"
    );
}
