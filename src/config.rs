//! Settings
//!
//! Admin-managed settings: the small-lot threshold and charge, an optional
//! tiered charge table, the basket idle timeout, the optimiser's enumeration
//! cap, the working currency and the margins added to supplier prices.
//! Loaded from YAML.

use std::{fs, path::Path, time::Duration};

use rust_decimal::Decimal;
use rustc_hash::FxHashMap;
use rusty_money::iso::{self, Currency};
use serde::Deserialize;
use thiserror::Error;

use crate::{
    basket::ExpiryPolicy,
    optimiser::{CapPolicy, DEFAULT_MAX_SUBSET_SIZE, OptimiserConfig},
    pricing::Margin,
    tiers::{Tier, TierTable},
};

/// Largest enumeration cap accepted; `2^32` subsets is already far beyond interactive use.
pub const MAX_SUBSET_SIZE_LIMIT: usize = 32;

/// Longest basket idle timeout accepted: one week.
pub const MAX_BASKET_TIMEOUT_MINUTES: i64 = 7 * 24 * 60;

/// Settings loading and validation errors.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// IO error reading the settings file
    #[error("Failed to read settings file: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parsing error
    #[error("Failed to parse settings: {0}")]
    Yaml(#[from] serde_norway::Error),

    /// Small-lot threshold must be positive.
    #[error("small-lot threshold must be greater than zero, got {0}")]
    NonPositiveThreshold(Decimal),

    /// A per-tonne charge was negative.
    #[error("charge per tonne must not be negative, got {0}")]
    NegativeCharge(Decimal),

    /// Basket timeout is out of range.
    #[error("basket timeout must be between 1 and {MAX_BASKET_TIMEOUT_MINUTES} minutes, got {0}")]
    TimeoutOutOfRange(i64),

    /// Enumeration cap is out of range.
    #[error("max subset size must be between 1 and {MAX_SUBSET_SIZE_LIMIT}, got {0}")]
    SubsetSizeOutOfRange(usize),

    /// Unknown ISO currency code.
    #[error("Unknown currency code: {0}")]
    UnknownCurrency(String),

    /// A tier row sets both an inclusive and an exclusive ceiling.
    #[error("tier starting at {0} t sets both max_tonnes and below_tonnes")]
    AmbiguousCeiling(Decimal),
}

/// One row of a configured tier table.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TierRow {
    /// Lower bound, inclusive
    pub min_tonnes: Decimal,

    /// Upper bound, inclusive
    #[serde(default)]
    pub max_tonnes: Option<Decimal>,

    /// Upper bound, exclusive
    #[serde(default)]
    pub below_tonnes: Option<Decimal>,

    /// Charge per tonne within the tier
    pub charge_per_tonne: Decimal,

    /// Inactive rows are ignored
    #[serde(default = "active_by_default")]
    pub active: bool,
}

const fn active_by_default() -> bool {
    true
}

impl TryFrom<&TierRow> for Tier {
    type Error = SettingsError;

    fn try_from(row: &TierRow) -> Result<Self, Self::Error> {
        if row.charge_per_tonne < Decimal::ZERO {
            return Err(SettingsError::NegativeCharge(row.charge_per_tonne));
        }

        let tier = match (row.max_tonnes, row.below_tonnes) {
            (Some(_), Some(_)) => return Err(SettingsError::AmbiguousCeiling(row.min_tonnes)),
            (None, Some(below)) => Tier::below(row.min_tonnes, below, row.charge_per_tonne),
            (max, None) => Tier::new(row.min_tonnes, max, row.charge_per_tonne),
        };

        Ok(if row.active { tier } else { tier.inactive() })
    }
}

/// How the optimiser treats a supplier universe larger than its cap.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapSetting {
    /// Fail the optimisation
    #[default]
    Reject,

    /// Explore up to the cap and flag the result
    Truncate,
}

impl From<CapSetting> for CapPolicy {
    fn from(setting: CapSetting) -> Self {
        match setting {
            CapSetting::Reject => CapPolicy::Reject,
            CapSetting::Truncate => CapPolicy::Truncate,
        }
    }
}

/// Margins per tonne keyed by category and by product.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
struct MarginRows {
    categories: FxHashMap<String, Decimal>,
    products: FxHashMap<String, Decimal>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct RawSettings {
    small_lot_threshold_t: Decimal,
    small_lot_charge_per_t: Decimal,
    basket_timeout_minutes: i64,
    max_subset_size: usize,
    cap_policy: CapSetting,
    deadline_ms: Option<u64>,
    currency: String,
    tiers: Option<Vec<TierRow>>,
    margins: MarginRows,
}

impl Default for RawSettings {
    fn default() -> Self {
        Self {
            small_lot_threshold_t: Decimal::from(24),
            small_lot_charge_per_t: Decimal::from(15),
            basket_timeout_minutes: 20,
            max_subset_size: DEFAULT_MAX_SUBSET_SIZE,
            cap_policy: CapSetting::Reject,
            deadline_ms: None,
            currency: "GBP".to_string(),
            tiers: None,
            margins: MarginRows::default(),
        }
    }
}

/// Validated admin settings.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    small_lot_threshold: Decimal,
    small_lot_charge: Decimal,
    basket_timeout_minutes: i64,
    max_subset_size: usize,
    cap_policy: CapSetting,
    deadline: Option<Duration>,
    currency: &'static Currency,
    tiers: Option<Vec<Tier>>,
    margins: Vec<Margin>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            small_lot_threshold: Decimal::from(24),
            small_lot_charge: Decimal::from(15),
            basket_timeout_minutes: 20,
            max_subset_size: DEFAULT_MAX_SUBSET_SIZE,
            cap_policy: CapSetting::Reject,
            deadline: None,
            currency: iso::GBP,
            tiers: None,
            margins: Vec::new(),
        }
    }
}

impl Settings {
    /// Parse settings from YAML. Missing keys take their defaults.
    ///
    /// # Errors
    ///
    /// Returns a [`SettingsError`] if the YAML is malformed or a value is out of range.
    pub fn from_yaml_str(contents: &str) -> Result<Self, SettingsError> {
        let raw: RawSettings = serde_norway::from_str(contents)?;

        Self::try_from(raw)
    }

    /// Load settings from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns a [`SettingsError`] if the file cannot be read or fails validation.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        Self::from_yaml_str(&fs::read_to_string(path)?)
    }

    /// Small-lot threshold in tonnes.
    pub fn small_lot_threshold(&self) -> Decimal {
        self.small_lot_threshold
    }

    /// Small-lot charge per tonne.
    pub fn small_lot_charge(&self) -> Decimal {
        self.small_lot_charge
    }

    /// Working currency.
    pub fn currency(&self) -> &'static Currency {
        self.currency
    }

    /// Tier table in force: the configured tiers if any, otherwise the small-lot rule.
    pub fn tier_table(&self) -> TierTable {
        match &self.tiers {
            Some(tiers) => TierTable::new(tiers.clone()),
            None => TierTable::small_lot(self.small_lot_threshold, self.small_lot_charge),
        }
    }

    /// Configured margins; product margins override category margins.
    pub fn margins(&self) -> &[Margin] {
        &self.margins
    }

    /// Basket idle-expiry policy.
    pub fn expiry_policy(&self) -> ExpiryPolicy {
        ExpiryPolicy::from_mins(self.basket_timeout_minutes)
    }

    /// Optimiser configuration.
    pub fn optimiser_config(&self) -> OptimiserConfig {
        OptimiserConfig {
            max_subset_size: self.max_subset_size,
            cap_policy: self.cap_policy.into(),
            deadline: self.deadline,
        }
    }
}

impl TryFrom<RawSettings> for Settings {
    type Error = SettingsError;

    fn try_from(raw: RawSettings) -> Result<Self, Self::Error> {
        if raw.small_lot_threshold_t <= Decimal::ZERO {
            return Err(SettingsError::NonPositiveThreshold(raw.small_lot_threshold_t));
        }

        if raw.small_lot_charge_per_t < Decimal::ZERO {
            return Err(SettingsError::NegativeCharge(raw.small_lot_charge_per_t));
        }

        if !(1..=MAX_BASKET_TIMEOUT_MINUTES).contains(&raw.basket_timeout_minutes) {
            return Err(SettingsError::TimeoutOutOfRange(raw.basket_timeout_minutes));
        }

        if !(1..=MAX_SUBSET_SIZE_LIMIT).contains(&raw.max_subset_size) {
            return Err(SettingsError::SubsetSizeOutOfRange(raw.max_subset_size));
        }

        let currency = iso::find(raw.currency.trim())
            .ok_or_else(|| SettingsError::UnknownCurrency(raw.currency.clone()))?;

        let tiers = raw
            .tiers
            .map(|rows| rows.iter().map(Tier::try_from).collect::<Result<Vec<_>, _>>())
            .transpose()?;

        let mut margins: Vec<Margin> = raw
            .margins
            .categories
            .into_iter()
            .map(|(category, per_tonne)| Margin::category(category, per_tonne))
            .chain(
                raw.margins
                    .products
                    .into_iter()
                    .map(|(product, per_tonne)| Margin::product(product, per_tonne)),
            )
            .collect();

        margins.sort_by(|a, b| a.scope.cmp(&b.scope));

        Ok(Self {
            small_lot_threshold: raw.small_lot_threshold_t,
            small_lot_charge: raw.small_lot_charge_per_t,
            basket_timeout_minutes: raw.basket_timeout_minutes,
            max_subset_size: raw.max_subset_size,
            cap_policy: raw.cap_policy,
            deadline: raw.deadline_ms.map(Duration::from_millis),
            currency,
            tiers,
            margins,
        })
    }
}
