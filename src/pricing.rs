//! Pricing
//!
//! Sell prices shown to traders are the supplier price plus a margin per
//! tonne. Margins are configured per product category and may be overridden
//! per product; the margin itself is never displayed.

use std::io;

use rust_decimal::{Decimal, RoundingStrategy};
use rustc_hash::FxHashMap;
use rusty_money::{Money, iso::Currency};
use tabled::{
    builder::Builder,
    settings::{
        Alignment, Color, Style,
        object::{Columns, Rows},
    },
};
use thiserror::Error;

use crate::offers::PriceOffer;

/// Errors raised while converting amounts to money.
#[derive(Debug, Error, PartialEq)]
pub enum PricingError {
    /// Amount cannot be represented in minor units.
    #[error("amount {0} cannot be represented in minor units")]
    MinorUnitsOverflow(Decimal),

    /// IO error
    #[error("IO error")]
    IO,
}

/// What a margin applies to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MarginScope {
    /// Every product in a category
    Category(String),

    /// A single product, overriding its category margin
    Product(String),
}

/// A margin per tonne added on top of the supplier price.
#[derive(Debug, Clone, PartialEq)]
pub struct Margin {
    /// What the margin applies to
    pub scope: MarginScope,

    /// Amount added per tonne
    pub per_tonne: Decimal,
}

impl Margin {
    /// Margin for every product in `category`.
    pub fn category(category: impl Into<String>, per_tonne: Decimal) -> Self {
        Self {
            scope: MarginScope::Category(category.into()),
            per_tonne,
        }
    }

    /// Margin for a single `product`.
    pub fn product(product: impl Into<String>, per_tonne: Decimal) -> Self {
        Self {
            scope: MarginScope::Product(product.into()),
            per_tonne,
        }
    }
}

/// An offer together with the price a trader sees.
#[derive(Debug, Clone, PartialEq)]
pub struct SellPrice<'a> {
    /// Underlying supplier offer
    pub offer: &'a PriceOffer,

    /// Supplier price plus margin
    pub sell_price: Decimal,
}

/// Compute sell prices for `offers`.
///
/// A product margin takes precedence over its category margin; offers with
/// neither sell at the supplier price.
pub fn apply_margins<'a>(offers: &'a [PriceOffer], margins: &[Margin]) -> Vec<SellPrice<'a>> {
    let mut by_category = FxHashMap::default();
    let mut by_product = FxHashMap::default();

    for margin in margins {
        match &margin.scope {
            MarginScope::Category(category) => {
                by_category.insert(category.as_str(), margin.per_tonne);
            }
            MarginScope::Product(product) => {
                by_product.insert(product.as_str(), margin.per_tonne);
            }
        }
    }

    offers
        .iter()
        .map(|offer| {
            let margin = by_product
                .get(offer.key.product.as_str())
                .or_else(|| by_category.get(offer.product_category.as_str()))
                .copied()
                .unwrap_or(Decimal::ZERO);

            SellPrice {
                offer,
                sell_price: offer.price + margin,
            }
        })
        .collect()
}

/// Convert a decimal amount into money, rounding half away from zero to the
/// currency's minor units (two places for GBP, none for JPY, three for BHD).
///
/// # Errors
///
/// Returns [`PricingError::MinorUnitsOverflow`] if the amount does not fit in minor units.
pub fn to_money(
    amount: Decimal,
    currency: &'static Currency,
) -> Result<Money<'static, Currency>, PricingError> {
    let mut rounded =
        amount.round_dp_with_strategy(currency.exponent, RoundingStrategy::MidpointAwayFromZero);

    rounded.rescale(currency.exponent);

    if rounded.scale() != currency.exponent {
        return Err(PricingError::MinorUnitsOverflow(amount));
    }

    let minor_units = i64::try_from(rounded.mantissa())
        .map_err(|_err| PricingError::MinorUnitsOverflow(amount))?;

    Ok(Money::from_minor(minor_units, currency))
}

/// Write a trader-facing price list: every offer at its sell price.
///
/// # Errors
///
/// Returns a [`PricingError`] if a price cannot be formatted or the write fails.
pub fn write_price_list(
    out: &mut impl io::Write,
    prices: &[SellPrice<'_>],
    currency: &'static Currency,
) -> Result<(), PricingError> {
    let mut builder = Builder::default();

    builder.push_record(["Supplier", "Category", "Product", "Location", "Window", "Price /t"]);

    for price in prices {
        builder.push_record([
            price.offer.supplier.clone(),
            price.offer.product_category.clone(),
            price.offer.key.product.clone(),
            price.offer.key.location.clone(),
            price.offer.key.delivery_window.clone(),
            to_money(price.sell_price, currency)?.to_string(),
        ]);
    }

    let mut table = builder.build();

    table.with(Style::modern_rounded());
    table.modify(Rows::first(), Color::BOLD);
    table.modify(Columns::new(5..6), Alignment::right());

    writeln!(out, "\n{table}").map_err(|_err| PricingError::IO)
}
