//! Offer Fixtures

use std::str::FromStr;

use rust_decimal::Decimal;
use rusty_money::iso::{self, Currency};
use serde::Deserialize;

use crate::{
    fixtures::FixtureError,
    offers::{OfferKey, PriceOffer},
};

/// Wrapper for offers in YAML
#[derive(Debug, Deserialize)]
pub struct OffersFixture {
    /// Supplier offers
    pub offers: Vec<OfferFixture>,
}

/// Supplier offer from YAML
#[derive(Debug, Deserialize)]
pub struct OfferFixture {
    /// Supplier name
    pub supplier: String,

    /// Product category
    #[serde(default)]
    pub category: String,

    /// Product name
    pub product: String,

    /// Delivery location
    #[serde(default)]
    pub location: String,

    /// Delivery window
    pub window: String,

    /// Price per tonne (e.g. "280.50 GBP")
    pub price: String,
}

impl OfferFixture {
    /// Convert to a [`PriceOffer`] and the currency its price is quoted in.
    ///
    /// # Errors
    ///
    /// Returns an error if the price cannot be parsed.
    pub fn try_into_offer(self) -> Result<(PriceOffer, &'static Currency), FixtureError> {
        let (price, currency) = parse_price(&self.price)?;
        let key = OfferKey::new(self.product, self.location, self.window);

        let offer = PriceOffer::new(self.supplier, key, price).with_category(self.category);

        Ok((offer, currency))
    }
}

/// Parse a price string like "280.50 GBP" into an amount and currency.
///
/// # Errors
///
/// Returns an error if the format is invalid or the currency is unknown.
pub fn parse_price(s: &str) -> Result<(Decimal, &'static Currency), FixtureError> {
    let mut parts = s.split_whitespace();

    let (Some(amount), Some(code), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(FixtureError::InvalidPrice(s.to_string()));
    };

    let amount = Decimal::from_str(amount).map_err(|_err| FixtureError::InvalidPrice(s.to_string()))?;
    let currency = iso::find(code).ok_or_else(|| FixtureError::UnknownCurrency(code.to_string()))?;

    Ok((amount, currency))
}
