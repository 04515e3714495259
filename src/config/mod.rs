//! Export configuration: target dialect, capability switches and text formats.

use std::{fs, path::Path};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::{
    errors::{QifError, Result},
    utils::persistence::write_atomic,
};

/// Named variant of the QIF grammar understood by a target application.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum FileType {
    #[default]
    Quicken,
    MsMoney,
    GnuCash,
    Generic,
}

impl FileType {
    /// Capability preset used when the configuration does not override it.
    pub fn capabilities(self) -> Capabilities {
        match self {
            FileType::Quicken => Capabilities {
                can_trade_zero_shares: false,
                can_xfer_portfolio: true,
                can_return_capital: true,
                use_investment_holding_for_category: false,
                hide_balancing_split_transfer: true,
                hide_balancing_transfer: true,
                use_misc_inc_x_for_tax_credit: true,
                use_stock_split: true,
                use_simple_transfer: false,
                self_opening_balance: true,
            },
            FileType::MsMoney => Capabilities {
                can_trade_zero_shares: false,
                can_xfer_portfolio: true,
                can_return_capital: true,
                use_investment_holding_for_category: false,
                hide_balancing_split_transfer: true,
                hide_balancing_transfer: true,
                use_misc_inc_x_for_tax_credit: false,
                use_stock_split: true,
                use_simple_transfer: true,
                self_opening_balance: true,
            },
            FileType::GnuCash => Capabilities {
                can_trade_zero_shares: true,
                can_xfer_portfolio: false,
                can_return_capital: false,
                use_investment_holding_for_category: true,
                hide_balancing_split_transfer: false,
                hide_balancing_transfer: false,
                use_misc_inc_x_for_tax_credit: false,
                use_stock_split: false,
                use_simple_transfer: true,
                self_opening_balance: false,
            },
            FileType::Generic => Capabilities::default(),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            FileType::Quicken => "Quicken",
            FileType::MsMoney => "Microsoft Money",
            FileType::GnuCash => "GnuCash",
            FileType::Generic => "Generic QIF",
        }
    }
}

/// Independent switches controlling the shape of emitted records.
///
/// None of the switches changes the economic meaning of an export, only how a
/// movement is expressed in the target dialect.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Capabilities {
    /// Trades may carry a zero or missing share quantity.
    pub can_trade_zero_shares: bool,
    /// Investment records may carry an inline `[account]` transfer with amount.
    pub can_xfer_portfolio: bool,
    /// A pure cost-basis reduction may be written as `RtrnCap`.
    pub can_return_capital: bool,
    /// Route security income/expense cash through a synthetic holding account.
    pub use_investment_holding_for_category: bool,
    /// Omit mirrored events for transfer lines inside split transactions.
    pub hide_balancing_split_transfer: bool,
    /// Omit the mirrored event of a plain account-to-account transfer.
    pub hide_balancing_transfer: bool,
    /// Express dividend tax credits as a single `MiscIncX` record.
    pub use_misc_inc_x_for_tax_credit: bool,
    /// Emit `StkSplit` records instead of share adjustments.
    pub use_stock_split: bool,
    /// Name transfer payees `Transfer` without the direction and account.
    pub use_simple_transfer: bool,
    /// Opening balances transfer from the account itself.
    pub self_opening_balance: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            can_trade_zero_shares: true,
            can_xfer_portfolio: false,
            can_return_capital: false,
            use_investment_holding_for_category: false,
            hide_balancing_split_transfer: false,
            hide_balancing_transfer: false,
            use_misc_inc_x_for_tax_credit: false,
            use_stock_split: true,
            use_simple_transfer: false,
            self_opening_balance: false,
        }
    }
}

/// Day/month ordering of the two-digit-year QIF date text.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum DateFormat {
    #[default]
    DayMonthYear,
    MonthDayYear,
}

impl DateFormat {
    pub fn pattern(self) -> &'static str {
        match self {
            DateFormat::DayMonthYear => "%d/%m/%y",
            DateFormat::MonthDayYear => "%m/%d/%y",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExportConfig {
    #[serde(default)]
    pub file_type: FileType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capabilities: Option<Capabilities>,
    #[serde(default)]
    pub date_format: DateFormat,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cutoff: Option<NaiveDate>,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            file_type: FileType::default(),
            capabilities: None,
            date_format: DateFormat::default(),
            cutoff: None,
        }
    }
}

impl ExportConfig {
    pub fn for_file_type(file_type: FileType) -> Self {
        Self {
            file_type,
            ..Self::default()
        }
    }

    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = Some(capabilities);
        self
    }

    /// Explicit overrides win over the file type preset.
    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
            .unwrap_or_else(|| self.file_type.capabilities())
    }

    /// Loads a configuration file, falling back to defaults when it is absent.
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            let data = fs::read_to_string(path)?;
            serde_json::from_str(&data)
                .map_err(|err| QifError::Config(format!("{}: {err}", path.display())))
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        write_atomic(path, &json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_replace_preset() {
        let config = ExportConfig::for_file_type(FileType::Quicken);
        assert!(config.capabilities().can_xfer_portfolio);

        let custom = Capabilities {
            can_xfer_portfolio: false,
            ..FileType::Quicken.capabilities()
        };
        let config = config.with_capabilities(custom);
        assert!(!config.capabilities().can_xfer_portfolio);
        assert!(config.capabilities().use_stock_split);
    }

    #[test]
    fn missing_file_loads_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = ExportConfig::load(&dir.path().join("absent.json")).unwrap();
        assert_eq!(config, ExportConfig::default());
    }

    #[test]
    fn save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let config = ExportConfig {
            file_type: FileType::GnuCash,
            capabilities: None,
            date_format: DateFormat::MonthDayYear,
            cutoff: NaiveDate::from_ymd_opt(2021, 12, 31),
        };
        config.save(&path).unwrap();
        assert_eq!(ExportConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn malformed_file_names_the_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();
        let err = ExportConfig::load(&path).unwrap_err();
        assert!(matches!(&err, QifError::Config(message) if message.contains("config.json")));
    }

    #[test]
    fn partial_capabilities_fill_defaults() {
        let config: ExportConfig =
            serde_json::from_str(r#"{"capabilities":{"use_stock_split":false}}"#).unwrap();
        let caps = config.capabilities();
        assert!(!caps.use_stock_split);
        assert!(caps.can_trade_zero_shares);
    }
}
