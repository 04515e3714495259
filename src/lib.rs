#![doc(test(attr(deny(warnings))))]

//! QIF Core translates a double-entry ledger of accounts, payees, portfolios
//! and securities into Quicken Interchange Format files, and reads such files
//! back for the same dialect.

pub mod analysis;
pub mod builder;
pub mod config;
pub mod errors;
pub mod export;
pub mod io;
pub mod ledger;
pub mod qif;
pub mod utils;

use std::sync::Once;

static INIT_TRACING: Once = Once::new();

/// Initializes global tracing and emits a startup info log.
pub fn init() {
    INIT_TRACING.call_once(|| {
        utils::init_tracing();
        tracing::info!("QIF Core tracing initialized.");
    });
}

#[cfg(test)]
mod tests {
    #[test]
    fn init_does_not_panic() {
        super::init();
    }
}
