//! Source ledger model consumed by the exporter.

pub mod account;
pub mod category;
#[allow(clippy::module_inception)]
pub mod ledger;
pub mod security;
pub mod transaction;

pub use account::{Account, AccountKind, Payee};
pub use category::{Category, CategoryClass};
pub use ledger::{load_ledger, Ledger};
pub use security::{HoldingKey, Portfolio, PricePoint, Security, SecurityKind};
pub use transaction::{Endpoint, ExtraDetail, Transaction};
