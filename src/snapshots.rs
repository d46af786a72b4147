//! Price Snapshots
//!
//! Every publication of a supplier price sheet becomes an immutable snapshot
//! keyed by a generated identifier. Snapshots are only ever appended; readers
//! receive a shared handle to the table so a running optimisation always sees
//! one consistent set of prices.

use std::sync::{Arc, RwLock};

use jiff::{RoundMode, Timestamp, TimestampRound, Unit};
use rusty_money::iso::Currency;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::offers::{PriceOffer, PriceTable, PriceTableError};

/// Snapshot store errors.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// No snapshot exists with the given identifier.
    #[error("snapshot {0} not found")]
    NotFound(Uuid),

    /// The publisher name was blank.
    #[error("a snapshot must name who published it")]
    EmptyPublisher,

    /// The offers do not form a valid price table.
    #[error(transparent)]
    InvalidTable(#[from] PriceTableError),

    /// The publication time could not be truncated to seconds.
    #[error("invalid publication time: {0}")]
    Timestamp(#[from] jiff::Error),

    /// A writer panicked while holding the store lock.
    #[error("snapshot store lock poisoned")]
    Poisoned,
}

/// Publication metadata for a snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotMeta {
    /// Generated identifier
    pub id: Uuid,

    /// Publication time, truncated to whole seconds
    pub published_at: Timestamp,

    /// Who published the snapshot
    pub published_by: String,

    /// SHA-256 of the uploaded file, lower-case hex
    pub source_hash: String,

    /// Number of offers in the snapshot
    pub row_count: usize,
}

/// Append-only storage of published price tables.
pub trait SnapshotStore: Send + Sync {
    /// Publish `offers` as a new snapshot.
    ///
    /// # Errors
    ///
    /// Returns a [`SnapshotError`] if the publisher is blank or the offers are invalid.
    fn publish(
        &self,
        offers: Vec<PriceOffer>,
        currency: &'static Currency,
        published_by: &str,
        source: &[u8],
    ) -> Result<SnapshotMeta, SnapshotError>;

    /// Prices of a snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotError::NotFound`] for an unknown identifier.
    fn prices(&self, id: Uuid) -> Result<Arc<PriceTable>, SnapshotError>;

    /// Metadata of up to `limit` snapshots, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotError::Poisoned`] if the store is unusable.
    fn list(&self, limit: usize) -> Result<Vec<SnapshotMeta>, SnapshotError>;

    /// Metadata of the most recent snapshot, if any.
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotError::Poisoned`] if the store is unusable.
    fn latest(&self) -> Result<Option<SnapshotMeta>, SnapshotError>;
}

/// Lower-case hex SHA-256 of `source`.
pub fn source_hash(source: &[u8]) -> String {
    format!("{:x}", Sha256::digest(source))
}

#[derive(Debug)]
struct StoredSnapshot {
    meta: SnapshotMeta,
    prices: Arc<PriceTable>,
}

/// Process-local snapshot store.
#[derive(Debug, Default)]
pub struct InMemorySnapshotStore {
    snapshots: RwLock<Vec<StoredSnapshot>>,
}

impl InMemorySnapshotStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish with an explicit publication time.
    ///
    /// # Errors
    ///
    /// Returns a [`SnapshotError`] if the publisher is blank or the offers are invalid.
    #[tracing::instrument(
        name = "snapshots.publish",
        skip(self, offers, currency, source),
        fields(rows = offers.len()),
        err
    )]
    pub fn publish_at(
        &self,
        offers: Vec<PriceOffer>,
        currency: &'static Currency,
        published_by: &str,
        source: &[u8],
        now: Timestamp,
    ) -> Result<SnapshotMeta, SnapshotError> {
        let published_by = published_by.trim();

        if published_by.is_empty() {
            return Err(SnapshotError::EmptyPublisher);
        }

        let prices = PriceTable::new(offers, currency)?;

        let meta = SnapshotMeta {
            id: Uuid::new_v4(),
            published_at: now.round(
                TimestampRound::new()
                    .smallest(Unit::Second)
                    .mode(RoundMode::Trunc),
            )?,
            published_by: published_by.to_string(),
            source_hash: source_hash(source),
            row_count: prices.len(),
        };

        self.snapshots
            .write()
            .map_err(|_err| SnapshotError::Poisoned)?
            .push(StoredSnapshot {
                meta: meta.clone(),
                prices: Arc::new(prices),
            });

        info!(snapshot_id = %meta.id, rows = meta.row_count, "published snapshot");

        Ok(meta)
    }

    fn newest_first(&self) -> Result<Vec<SnapshotMeta>, SnapshotError> {
        let snapshots = self.snapshots.read().map_err(|_err| SnapshotError::Poisoned)?;

        let mut metas: Vec<SnapshotMeta> = snapshots
            .iter()
            .rev()
            .map(|stored| stored.meta.clone())
            .collect();

        // Publication order breaks ties between snapshots published within the same second.
        metas.sort_by(|a, b| b.published_at.cmp(&a.published_at));

        Ok(metas)
    }
}

impl SnapshotStore for InMemorySnapshotStore {
    fn publish(
        &self,
        offers: Vec<PriceOffer>,
        currency: &'static Currency,
        published_by: &str,
        source: &[u8],
    ) -> Result<SnapshotMeta, SnapshotError> {
        self.publish_at(offers, currency, published_by, source, Timestamp::now())
    }

    fn prices(&self, id: Uuid) -> Result<Arc<PriceTable>, SnapshotError> {
        self.snapshots
            .read()
            .map_err(|_err| SnapshotError::Poisoned)?
            .iter()
            .find(|stored| stored.meta.id == id)
            .map(|stored| Arc::clone(&stored.prices))
            .ok_or(SnapshotError::NotFound(id))
    }

    fn list(&self, limit: usize) -> Result<Vec<SnapshotMeta>, SnapshotError> {
        let mut metas = self.newest_first()?;

        metas.truncate(limit);

        Ok(metas)
    }

    fn latest(&self) -> Result<Option<SnapshotMeta>, SnapshotError> {
        Ok(self.newest_first()?.into_iter().next())
    }
}
