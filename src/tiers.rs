//! Small-lot Charge Tiers
//!
//! Suppliers penalise uneconomically small orders with a per-tonne surcharge
//! that depends on the *total* tonnage they win across a basket. A
//! [`TierTable`] maps that total onto a charge per tonne.

use rust_decimal::Decimal;

/// Upper end of a tier's tonnage range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TierCeiling {
    /// Range includes the given tonnage.
    AtMost(Decimal),

    /// Range stops just short of the given tonnage.
    Below(Decimal),

    /// No upper limit.
    Unbounded,
}

impl TierCeiling {
    fn admits(self, tonnes: Decimal) -> bool {
        match self {
            TierCeiling::AtMost(max) => tonnes <= max,
            TierCeiling::Below(max) => tonnes < max,
            TierCeiling::Unbounded => true,
        }
    }
}

/// A single charge band over a supplier's total committed tonnage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tier {
    /// Lowest tonnage in the band (inclusive)
    pub min_tonnes: Decimal,

    /// Upper end of the band
    pub ceiling: TierCeiling,

    /// Surcharge per tonne for the whole committed tonnage
    pub charge_per_tonne: Decimal,

    /// Inactive tiers are ignored
    pub active: bool,
}

impl Tier {
    /// Create an active tier with an inclusive upper bound, or none.
    pub fn new(min_tonnes: Decimal, max_tonnes: Option<Decimal>, charge_per_tonne: Decimal) -> Self {
        Self {
            min_tonnes,
            ceiling: max_tonnes.map_or(TierCeiling::Unbounded, TierCeiling::AtMost),
            charge_per_tonne,
            active: true,
        }
    }

    /// Create an active tier covering `[min_tonnes, below)`.
    pub fn below(min_tonnes: Decimal, below: Decimal, charge_per_tonne: Decimal) -> Self {
        Self {
            min_tonnes,
            ceiling: TierCeiling::Below(below),
            charge_per_tonne,
            active: true,
        }
    }

    /// Mark the tier inactive.
    #[must_use]
    pub const fn inactive(mut self) -> Self {
        self.active = false;
        self
    }

    /// Whether `tonnes` falls inside this tier's range.
    pub fn contains(&self, tonnes: Decimal) -> bool {
        tonnes >= self.min_tonnes && self.ceiling.admits(tonnes)
    }
}

/// Admin-configured set of tiers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TierTable {
    /// Active tiers sorted by minimum tonnage, stable for equal minimums
    active: Vec<Tier>,

    /// Every tier as configured
    tiers: Vec<Tier>,
}

impl TierTable {
    /// Create a table from tier rows.
    pub fn new(tiers: impl Into<Vec<Tier>>) -> Self {
        let tiers = tiers.into();

        let mut active: Vec<Tier> = tiers.iter().filter(|tier| tier.active).copied().collect();

        active.sort_by(|a, b| a.min_tonnes.cmp(&b.min_tonnes));

        Self { active, tiers }
    }

    /// The single-threshold variant: anything below `threshold` tonnes pays `charge_per_tonne`.
    pub fn small_lot(threshold: Decimal, charge_per_tonne: Decimal) -> Self {
        Self::new([Tier::below(Decimal::ZERO, threshold, charge_per_tonne)])
    }

    /// A table that never charges.
    pub fn none() -> Self {
        Self::default()
    }

    /// Tiers as configured, including inactive rows.
    pub fn tiers(&self) -> &[Tier] {
        &self.tiers
    }

    /// Charge per tonne for a supplier committed to `tonnes` in total.
    pub fn charge_per_tonne(&self, tonnes: Decimal) -> Decimal {
        if tonnes <= Decimal::ZERO {
            return Decimal::ZERO;
        }

        self.active
            .iter()
            .find(|tier| tier.contains(tonnes))
            .map_or(Decimal::ZERO, |tier| tier.charge_per_tonne)
    }
}

/// Resolve the per-tonne surcharge for `tonnes` against arbitrary tier rows.
///
/// Only active tiers are considered, in ascending order of minimum tonnage; the
/// first tier whose range contains `tonnes` wins. Zero or negative tonnage and
/// tonnage matching no tier both resolve to a zero charge.
pub fn resolve(tonnes: Decimal, tiers: &[Tier]) -> Decimal {
    TierTable::new(tiers).charge_per_tonne(tonnes)
}
