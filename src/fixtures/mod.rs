//! Fixtures

use std::{fs, path::PathBuf};

use jiff::Timestamp;
use rusty_money::iso::Currency;
use serde::Deserialize;
use thiserror::Error;

use crate::{
    basket::{Basket, BasketError, DemandLine},
    config::{SettingsError, TierRow},
    fixtures::{baskets::read_basket, offers::OffersFixture},
    offers::{PriceOffer, PriceTable, PriceTableError},
    tiers::{Tier, TierTable},
};

pub mod baskets;
pub mod offers;

/// Fixture Parsing Errors
#[derive(Debug, Error)]
pub enum FixtureError {
    /// IO error reading fixture files
    #[error("Failed to read fixture file: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parsing error
    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_norway::Error),

    /// Invalid price format
    #[error("Invalid price format: {0}")]
    InvalidPrice(String),

    /// Unknown currency code
    #[error("Unknown currency code: {0}")]
    UnknownCurrency(String),

    /// Currency mismatch between offers
    #[error("Currency mismatch: expected {0}, found {1}")]
    CurrencyMismatch(String, String),

    /// No offers loaded yet
    #[error("No offers loaded yet; currency unknown")]
    NoCurrency,

    /// No basket lines loaded
    #[error("No basket lines loaded; cannot create basket")]
    NoLines,

    /// Invalid tier row
    #[error("Invalid tier: {0}")]
    Tier(#[from] SettingsError),

    /// Price table construction error
    #[error("Failed to build price table: {0}")]
    PriceTable(#[from] PriceTableError),

    /// Basket line error
    #[error("Failed to create basket line: {0}")]
    Basket(#[from] BasketError),
}

/// Wrapper for tier rows in YAML
#[derive(Debug, Deserialize)]
struct TiersFixture {
    tiers: Vec<TierRow>,
}

/// A named set of offers, tiers and basket lines loaded from YAML.
#[derive(Debug)]
pub struct Fixture {
    /// Base path for fixture files
    base_path: PathBuf,

    /// Supplier offers
    offers: Vec<PriceOffer>,

    /// Tier rows, if loaded
    tiers: Option<Vec<Tier>>,

    /// Demand lines
    lines: Vec<DemandLine>,

    /// Currency for the fixture set
    currency: Option<&'static Currency>,
}

impl Fixture {
    /// Create a new empty fixture with default base path
    pub fn new() -> Self {
        Self::with_base_path("./fixtures")
    }

    /// Create a new empty fixture with custom base path
    pub fn with_base_path(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
            offers: Vec::new(),
            tiers: None,
            lines: Vec::new(),
            currency: None,
        }
    }

    fn read(&self, category: &str, name: &str) -> Result<String, FixtureError> {
        let file_path = self.base_path.join(category).join(format!("{name}.yml"));

        Ok(fs::read_to_string(file_path)?)
    }

    /// Load supplier offers from a YAML fixture file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or if there are currency mismatches.
    pub fn load_offers(&mut self, name: &str) -> Result<&mut Self, FixtureError> {
        let fixture: OffersFixture = serde_norway::from_str(&self.read("offers", name)?)?;

        for offer_fixture in fixture.offers {
            let (offer, currency) = offer_fixture.try_into_offer()?;

            match self.currency {
                Some(existing) if existing != currency => {
                    return Err(FixtureError::CurrencyMismatch(
                        existing.iso_alpha_code.to_string(),
                        currency.iso_alpha_code.to_string(),
                    ));
                }
                Some(_) => {}
                None => self.currency = Some(currency),
            }

            self.offers.push(offer);
        }

        Ok(self)
    }

    /// Load a tier table from a YAML fixture file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or a tier row is invalid.
    pub fn load_tiers(&mut self, name: &str) -> Result<&mut Self, FixtureError> {
        let fixture: TiersFixture = serde_norway::from_str(&self.read("tiers", name)?)?;

        let tiers = fixture
            .tiers
            .iter()
            .map(Tier::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        self.tiers = Some(tiers);

        Ok(self)
    }

    /// Load basket lines from a YAML fixture file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or a line has a non-positive quantity.
    pub fn load_basket(&mut self, name: &str) -> Result<&mut Self, FixtureError> {
        let file_path = self.base_path.join("baskets").join(format!("{name}.yml"));

        self.lines.extend(read_basket(file_path)?);

        Ok(self)
    }

    /// Load a complete fixture set (offers, tiers and basket with the same name)
    ///
    /// # Errors
    ///
    /// Returns an error if any of the fixture files cannot be loaded.
    pub fn from_set(name: &str) -> Result<Self, FixtureError> {
        let mut fixture = Self::new();

        fixture
            .load_offers(name)?
            .load_tiers(name)?
            .load_basket(name)?;

        Ok(fixture)
    }

    /// Get all offers
    pub fn offers(&self) -> &[PriceOffer] {
        &self.offers
    }

    /// Get all basket lines
    pub fn lines(&self) -> &[DemandLine] {
        &self.lines
    }

    /// Build a price table from the loaded offers
    ///
    /// # Errors
    ///
    /// Returns an error if no offers are loaded or the offers are invalid.
    pub fn price_table(&self) -> Result<PriceTable, FixtureError> {
        Ok(PriceTable::new(self.offers.clone(), self.currency()?)?)
    }

    /// Tier table from the loaded tiers, or no charges if none were loaded
    pub fn tier_table(&self) -> TierTable {
        self.tiers
            .as_ref()
            .map_or_else(TierTable::none, |tiers| TierTable::new(tiers.clone()))
    }

    /// Create a basket from the loaded lines, started at `created_at`
    ///
    /// # Errors
    ///
    /// Returns an error if no lines are loaded.
    pub fn basket(&self, created_at: Timestamp) -> Result<Basket, FixtureError> {
        if self.lines.is_empty() {
            return Err(FixtureError::NoLines);
        }

        Ok(Basket::with_lines(self.lines.clone(), created_at))
    }

    /// Get the currency
    ///
    /// # Errors
    ///
    /// Returns an error if no offers have been loaded yet.
    pub fn currency(&self) -> Result<&'static Currency, FixtureError> {
        self.currency.ok_or(FixtureError::NoCurrency)
    }
}

impl Default for Fixture {
    fn default() -> Self {
        Self::new()
    }
}
