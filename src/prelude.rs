//! Foresight prelude.
//!
//! Convenience exports for common library consumers.

pub use crate::{
    allocation::{Allocation, AllocationError, LineAllocation, LotCharge},
    basket::{Basket, BasketError, DemandLine, ExpiryPolicy},
    config::{Settings, SettingsError},
    ingest::{IngestError, SheetFormat, SheetUpload, read_sheet},
    offers::{OfferKey, PriceOffer, PriceTable, PriceTableError},
    optimiser::{CapPolicy, Optimiser, OptimiserConfig, OptimiserError, optimise},
    pricing::{Margin, MarginScope, SellPrice, apply_margins, to_money},
    snapshots::{InMemorySnapshotStore, SnapshotError, SnapshotMeta, SnapshotStore},
    tiers::{Tier, TierCeiling, TierTable, resolve},
};
