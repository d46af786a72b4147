//! Foresight
//!
//! Foresight turns supplier price sheets into published price snapshots and
//! sources trader baskets from them at the lowest total cost, accounting for
//! tiered small-lot charges that depend on how many tonnes each supplier wins.

pub mod allocation;
pub mod basket;
pub mod config;
pub mod fixtures;
pub mod ingest;
pub mod offers;
pub mod optimiser;
pub mod prelude;
pub mod pricing;
pub mod snapshots;
pub mod tiers;
