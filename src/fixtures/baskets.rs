//! Basket Fixtures

use std::{fs, path::Path};

use rust_decimal::Decimal;
use serde::Deserialize;

use crate::{basket::DemandLine, fixtures::FixtureError, offers::OfferKey};

/// Wrapper for basket lines in YAML
#[derive(Debug, Deserialize)]
pub struct BasketFixture {
    /// Demand lines in basket order
    pub lines: Vec<LineFixture>,
}

/// Demand line from YAML
#[derive(Debug, Deserialize)]
pub struct LineFixture {
    /// Product name
    pub product: String,

    /// Delivery location
    #[serde(default)]
    pub location: String,

    /// Delivery window
    pub window: String,

    /// Tonnes required
    pub qty: Decimal,
}

impl TryFrom<LineFixture> for DemandLine {
    type Error = FixtureError;

    fn try_from(line: LineFixture) -> Result<Self, Self::Error> {
        let key = OfferKey::new(line.product, line.location, line.window);

        Ok(DemandLine::new(key, line.qty)?)
    }
}

/// Read demand lines from a basket YAML file anywhere on disk.
///
/// # Errors
///
/// Returns an error if the file cannot be read, parsed, or a line has a non-positive quantity.
pub fn read_basket(path: impl AsRef<Path>) -> Result<Vec<DemandLine>, FixtureError> {
    let fixture: BasketFixture = serde_norway::from_str(&fs::read_to_string(path)?)?;

    fixture.lines.into_iter().map(DemandLine::try_from).collect()
}
