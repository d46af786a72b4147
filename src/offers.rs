//! Supplier Offers
//!
//! A [`PriceTable`] is the typed, read-only view of one published price sheet.
//! Offers are indexed by their [`OfferKey`] so that demand lines can find their
//! candidate suppliers without scanning the whole table.

use rust_decimal::Decimal;
use rustc_hash::FxHashMap;
use rusty_money::iso::{Currency, GBP};
use smallvec::SmallVec;
use thiserror::Error;

/// Errors raised while building a price table.
#[derive(Debug, Error, PartialEq)]
pub enum PriceTableError {
    /// Two offers share the same supplier, product, location and delivery window.
    #[error("duplicate offer from {supplier} for {key}")]
    DuplicateOffer {
        /// Supplier that quoted twice
        supplier: String,
        /// Product, location and window of the duplicated quote
        key: OfferKey,
    },

    /// An offer quoted a negative price.
    #[error("offer from {supplier} for {key} has a negative price: {price}")]
    NegativePrice {
        /// Supplier that quoted the price
        supplier: String,
        /// Product, location and window of the quote
        key: OfferKey,
        /// Offending price
        price: Decimal,
    },
}

/// Product, location and delivery window: the key a demand line is matched on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OfferKey {
    /// Product name
    pub product: String,

    /// Delivery location (may be empty)
    pub location: String,

    /// Delivery window label, e.g. "Mar-26"
    pub delivery_window: String,
}

impl OfferKey {
    /// Create a new key.
    pub fn new(
        product: impl Into<String>,
        location: impl Into<String>,
        delivery_window: impl Into<String>,
    ) -> Self {
        Self {
            product: product.into(),
            location: location.into(),
            delivery_window: delivery_window.into(),
        }
    }
}

impl std::fmt::Display for OfferKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.location.is_empty() {
            write!(f, "{} {}", self.product, self.delivery_window)
        } else {
            write!(
                f,
                "{} @ {} {}",
                self.product, self.location, self.delivery_window
            )
        }
    }
}

/// One supplier's quoted price per tonne for a product, location and delivery window.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceOffer {
    /// Supplier name
    pub supplier: String,

    /// Product category, used for margin lookups (may be empty)
    pub product_category: String,

    /// Product, location and delivery window
    pub key: OfferKey,

    /// Price per unit in the table currency
    pub price: Decimal,

    /// Unit the price is quoted in, e.g. "t"
    pub unit: String,
}

impl PriceOffer {
    /// Create an offer priced per tonne with no category.
    pub fn new(supplier: impl Into<String>, key: OfferKey, price: Decimal) -> Self {
        Self {
            supplier: supplier.into(),
            product_category: String::new(),
            key,
            price,
            unit: "t".to_string(),
        }
    }

    /// Set the product category.
    #[must_use]
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.product_category = category.into();
        self
    }

    /// Set the pricing unit.
    #[must_use]
    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = unit.into();
        self
    }
}

/// Indexed, validated set of offers from one snapshot.
#[derive(Debug, Clone)]
pub struct PriceTable {
    offers: Vec<PriceOffer>,

    /// Offer indexes per key, ordered by price then supplier name
    index: FxHashMap<OfferKey, SmallVec<[usize; 8]>>,

    currency: &'static Currency,
}

impl PriceTable {
    /// Build a table from offers quoted in `currency`.
    ///
    /// # Errors
    ///
    /// - [`PriceTableError::DuplicateOffer`]: a supplier quoted the same key twice.
    /// - [`PriceTableError::NegativePrice`]: an offer has a price below zero.
    pub fn new(
        offers: impl Into<Vec<PriceOffer>>,
        currency: &'static Currency,
    ) -> Result<Self, PriceTableError> {
        let offers = offers.into();
        let mut index: FxHashMap<OfferKey, SmallVec<[usize; 8]>> = FxHashMap::default();

        for (idx, offer) in offers.iter().enumerate() {
            if offer.price < Decimal::ZERO {
                return Err(PriceTableError::NegativePrice {
                    supplier: offer.supplier.clone(),
                    key: offer.key.clone(),
                    price: offer.price,
                });
            }

            let slot = index.entry(offer.key.clone()).or_default();

            let duplicate = slot
                .iter()
                .filter_map(|&other| offers.get(other))
                .any(|other| other.supplier == offer.supplier);

            if duplicate {
                return Err(PriceTableError::DuplicateOffer {
                    supplier: offer.supplier.clone(),
                    key: offer.key.clone(),
                });
            }

            slot.push(idx);
        }

        for slot in index.values_mut() {
            slot.sort_by(|&a, &b| match (offers.get(a), offers.get(b)) {
                (Some(a), Some(b)) => a
                    .price
                    .cmp(&b.price)
                    .then_with(|| a.supplier.cmp(&b.supplier)),
                _ => a.cmp(&b),
            });
        }

        Ok(Self {
            offers,
            index,
            currency,
        })
    }

    /// An empty table in pounds sterling.
    pub fn empty() -> Self {
        Self {
            offers: Vec::new(),
            index: FxHashMap::default(),
            currency: GBP,
        }
    }

    /// Offers matching `key`, cheapest first, ties broken by supplier name.
    pub fn candidates(&self, key: &OfferKey) -> SmallVec<[&PriceOffer; 8]> {
        self.index
            .get(key)
            .map(|slot| slot.iter().filter_map(|&idx| self.offers.get(idx)).collect())
            .unwrap_or_default()
    }

    /// All offers in the order they were supplied.
    pub fn offers(&self) -> &[PriceOffer] {
        &self.offers
    }

    /// Table currency.
    pub fn currency(&self) -> &'static Currency {
        self.currency
    }

    /// Number of offers.
    pub fn len(&self) -> usize {
        self.offers.len()
    }

    /// Whether the table has no offers.
    pub fn is_empty(&self) -> bool {
        self.offers.is_empty()
    }

    /// Distinct product names, sorted.
    pub fn products(&self) -> Vec<&str> {
        self.distinct(|offer| offer.key.product.as_str())
    }

    /// Distinct locations, sorted.
    pub fn locations(&self) -> Vec<&str> {
        self.distinct(|offer| offer.key.location.as_str())
    }

    /// Distinct delivery windows, sorted.
    pub fn delivery_windows(&self) -> Vec<&str> {
        self.distinct(|offer| offer.key.delivery_window.as_str())
    }

    /// Offers where any text field or the price contains `query`, ignoring case.
    pub fn search(&self, query: &str) -> Vec<&PriceOffer> {
        let needle = query.trim().to_lowercase();

        if needle.is_empty() {
            return self.offers.iter().collect();
        }

        self.offers
            .iter()
            .filter(|offer| {
                [
                    offer.supplier.as_str(),
                    offer.product_category.as_str(),
                    offer.key.product.as_str(),
                    offer.key.location.as_str(),
                    offer.key.delivery_window.as_str(),
                    offer.unit.as_str(),
                ]
                .iter()
                .any(|field| field.to_lowercase().contains(&needle))
                    || offer.price.to_string().contains(&needle)
            })
            .collect()
    }

    fn distinct<'a>(&'a self, field: impl Fn(&'a PriceOffer) -> &'a str) -> Vec<&'a str> {
        let mut values: Vec<&str> = self.offers.iter().map(field).collect();

        values.sort_unstable();
        values.dedup();

        values
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;
    use rusty_money::iso::GBP;
    use testresult::TestResult;

    use super::*;

    fn urea() -> OfferKey {
        OfferKey::new("Urea", "Teesside", "Mar-26")
    }

    fn offer(supplier: &str, price: i64) -> PriceOffer {
        PriceOffer::new(supplier, urea(), Decimal::from(price))
    }

    #[test]
    fn candidates_are_sorted_by_price_then_supplier() -> TestResult {
        let table = PriceTable::new(
            [offer("Cargill", 300), offer("Yara", 280), offer("Bunge", 280)],
            GBP,
        )?;

        let suppliers: Vec<&str> = table
            .candidates(&urea())
            .iter()
            .map(|o| o.supplier.as_str())
            .collect();

        assert_eq!(suppliers, ["Bunge", "Yara", "Cargill"]);

        Ok(())
    }

    #[test]
    fn candidates_for_unknown_key_is_empty() -> TestResult {
        let table = PriceTable::new([offer("Yara", 280)], GBP)?;

        assert!(table.candidates(&OfferKey::new("AN", "", "Mar-26")).is_empty());

        Ok(())
    }

    #[test]
    fn duplicate_supplier_key_is_rejected() {
        let result = PriceTable::new([offer("Yara", 280), offer("Yara", 290)], GBP);

        assert!(matches!(
            result,
            Err(PriceTableError::DuplicateOffer { supplier, .. }) if supplier == "Yara"
        ));
    }

    #[test]
    fn negative_price_is_rejected() {
        let result = PriceTable::new([offer("Yara", -1)], GBP);

        assert!(matches!(result, Err(PriceTableError::NegativePrice { .. })));
    }

    #[test]
    fn pick_lists_are_sorted_and_distinct() -> TestResult {
        let table = PriceTable::new(
            [
                offer("Yara", 280),
                PriceOffer::new("Yara", OfferKey::new("AN", "Avonmouth", "Apr-26"), Decimal::from(310)),
                offer("Bunge", 290),
            ],
            GBP,
        )?;

        assert_eq!(table.products(), ["AN", "Urea"]);
        assert_eq!(table.locations(), ["Avonmouth", "Teesside"]);
        assert_eq!(table.delivery_windows(), ["Apr-26", "Mar-26"]);

        Ok(())
    }

    #[test]
    fn search_matches_text_fields_case_insensitively() -> TestResult {
        let table = PriceTable::new(
            [
                offer("Yara", 280).with_category("Nitrogen"),
                PriceOffer::new("Bunge", OfferKey::new("MOP", "Hull", "Mar-26"), Decimal::from(350)),
            ],
            GBP,
        )?;

        assert_eq!(table.search("nitro").len(), 1);
        assert_eq!(table.search("HULL").len(), 1);
        assert_eq!(table.search("350").len(), 1);
        assert_eq!(table.search("  ").len(), 2);

        Ok(())
    }

    #[test]
    fn key_display_omits_blank_location() {
        assert_eq!(urea().to_string(), "Urea @ Teesside Mar-26");
        assert_eq!(OfferKey::new("AN", "", "Q2").to_string(), "AN Q2");
    }
}
