//! Streaming a built [`QifFile`](crate::qif::QifFile) to text and back.

pub mod reader;
pub mod writer;

pub use reader::QifReader;
pub use writer::{write_to_string, QifWriter, WriteOutcome};

pub const CLASS_HEADER: &str = "!Type:Class";
pub const CATEGORY_HEADER: &str = "!Type:Cat";
pub const ACCOUNT_HEADER: &str = "!Account";
pub const SECURITY_HEADER: &str = "!Type:Security";
pub const PRICES_HEADER: &str = "!Type:Prices";
pub const AUTO_SWITCH_ON: &str = "!Option:AutoSwitch";
pub const AUTO_SWITCH_OFF: &str = "!Clear:AutoSwitch";
pub const TYPE_PREFIX: &str = "!Type:";

/// Output stages, in the order they are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Classes,
    Categories,
    Accounts,
    Securities,
    Events,
    Prices,
}

impl Stage {
    pub const ALL: [Stage; 6] = [
        Stage::Classes,
        Stage::Categories,
        Stage::Accounts,
        Stage::Securities,
        Stage::Events,
        Stage::Prices,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Stage::Classes => "classes",
            Stage::Categories => "categories",
            Stage::Accounts => "accounts",
            Stage::Securities => "securities",
            Stage::Events => "events",
            Stage::Prices => "prices",
        }
    }

    /// Zero-based position among [`Stage::ALL`].
    pub fn index(self) -> usize {
        Stage::ALL
            .iter()
            .position(|stage| *stage == self)
            .unwrap_or_default()
    }
}

/// Progress sink polled after every unit of output; `false` cancels the write.
pub trait Progress {
    fn step(&mut self, stage: Stage, done: usize, total: usize) -> bool;
}

impl<F> Progress for F
where
    F: FnMut(Stage, usize, usize) -> bool,
{
    fn step(&mut self, stage: Stage, done: usize, total: usize) -> bool {
        self(stage, done, total)
    }
}

/// Never cancels and reports nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl Progress for NoProgress {
    fn step(&mut self, _stage: Stage, _done: usize, _total: usize) -> bool {
        true
    }
}

/// Logs each completed stage through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogProgress;

impl Progress for LogProgress {
    fn step(&mut self, stage: Stage, done: usize, total: usize) -> bool {
        if done == total {
            tracing::debug!(
                stage = stage.label(),
                step = stage.index() + 1,
                of = Stage::ALL.len(),
                items = total,
                "stage written"
            );
        }
        true
    }
}
