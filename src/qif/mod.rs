//! QIF document model: entities, typed lines, records and the file registries.

pub mod entity;
pub mod field;
pub mod file;
pub mod record;

pub use entity::{Account, AccountType, Category, Class, Named, ParentCategory, Payee, Security};
pub use field::{Action, Field, FieldError, FieldKind, QifFormat, Tagged, Target};
pub use file::{AccountEvents, PriceEntry, QifFile, Registry, SecurityPrices};
pub use record::{LineType, Record, RecordKind, Split};
