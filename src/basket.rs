//! Basket

use jiff::{SignedDuration, Timestamp};
use rust_decimal::Decimal;
use thiserror::Error;

use crate::offers::OfferKey;

/// Errors related to basket construction.
#[derive(Debug, Error, PartialEq)]
pub enum BasketError {
    /// A demand line asked for zero or negative tonnes.
    #[error("quantity for {0} must be greater than zero, got {1}")]
    NonPositiveQuantity(OfferKey, Decimal),

    /// A line was not found in the basket.
    #[error("line {0} not found")]
    LineNotFound(usize),
}

/// A request for `qty` tonnes of a product at a location and delivery window.
#[derive(Debug, Clone, PartialEq)]
pub struct DemandLine {
    /// Product, location and delivery window the line must be sourced for
    pub key: OfferKey,

    /// Tonnes required
    pub qty: Decimal,
}

impl DemandLine {
    /// Create a demand line.
    ///
    /// # Errors
    ///
    /// Returns [`BasketError::NonPositiveQuantity`] if `qty` is not above zero.
    pub fn new(key: OfferKey, qty: Decimal) -> Result<Self, BasketError> {
        if qty <= Decimal::ZERO {
            return Err(BasketError::NonPositiveQuantity(key, qty));
        }

        Ok(Self { key, qty })
    }
}

/// How long a basket may sit before it is discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpiryPolicy {
    timeout: SignedDuration,
}

impl ExpiryPolicy {
    /// Expire baskets older than `timeout`.
    pub const fn new(timeout: SignedDuration) -> Self {
        Self { timeout }
    }

    /// Expire baskets older than the given number of minutes.
    ///
    /// # Panics
    ///
    /// Panics if `minutes` does not fit in a [`SignedDuration`]; settings cap it
    /// at [`MAX_BASKET_TIMEOUT_MINUTES`](crate::config::MAX_BASKET_TIMEOUT_MINUTES).
    pub const fn from_mins(minutes: i64) -> Self {
        Self::new(SignedDuration::from_mins(minutes))
    }

    /// The configured timeout.
    pub const fn timeout(&self) -> SignedDuration {
        self.timeout
    }

    /// Whether `basket` has outlived the timeout at `now`.
    pub fn is_expired(&self, basket: &Basket, now: Timestamp) -> bool {
        now.duration_since(basket.created_at) > self.timeout
    }
}

impl Default for ExpiryPolicy {
    fn default() -> Self {
        Self::from_mins(20)
    }
}

/// A trader's ordered list of demand lines awaiting a sourcing decision.
#[derive(Debug, Clone, PartialEq)]
pub struct Basket {
    lines: Vec<DemandLine>,
    created_at: Timestamp,
}

impl Basket {
    /// Create an empty basket whose expiry clock starts at `created_at`.
    pub fn new(created_at: Timestamp) -> Self {
        Self {
            lines: Vec::new(),
            created_at,
        }
    }

    /// Create a basket with the given lines.
    pub fn with_lines(lines: impl Into<Vec<DemandLine>>, created_at: Timestamp) -> Self {
        Self {
            lines: lines.into(),
            created_at,
        }
    }

    /// Append a line.
    pub fn push(&mut self, line: DemandLine) {
        self.lines.push(line);
    }

    /// Remove and return the line at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`BasketError::LineNotFound`] if there is no such line.
    pub fn remove(&mut self, index: usize) -> Result<DemandLine, BasketError> {
        if index >= self.lines.len() {
            return Err(BasketError::LineNotFound(index));
        }

        Ok(self.lines.remove(index))
    }

    /// Empty the basket and restart its expiry clock.
    pub fn clear(&mut self, now: Timestamp) {
        self.lines.clear();
        self.created_at = now;
    }

    /// Clear the basket if `policy` says it has expired. Returns whether it was cleared.
    pub fn expire_if_stale(&mut self, now: Timestamp, policy: &ExpiryPolicy) -> bool {
        if policy.is_expired(self, now) {
            self.clear(now);

            return true;
        }

        false
    }

    /// Lines in insertion order.
    pub fn lines(&self) -> &[DemandLine] {
        &self.lines
    }

    /// Iterate over the lines.
    pub fn iter(&self) -> impl Iterator<Item = &DemandLine> {
        self.lines.iter()
    }

    /// When the expiry clock started.
    pub fn created_at(&self) -> Timestamp {
        self.created_at
    }

    /// Total tonnes requested across all lines.
    pub fn total_tonnes(&self) -> Decimal {
        self.lines.iter().map(|line| line.qty).sum()
    }

    /// Number of lines.
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// Check if the basket is empty.
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}
