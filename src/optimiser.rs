//! Basket Optimiser
//!
//! Chooses one supplier per demand line so that goods cost plus small-lot
//! charges is as low as possible.
//!
//! The small-lot charge depends on the *total* tonnage a supplier wins across
//! the basket, so the cheapest supplier for each line in isolation is not
//! necessarily the cheapest basket. The optimiser searches jointly over which
//! suppliers are in play: for every subset of the supplier universe, each line
//! goes to its cheapest in-subset offer, and the subset with the lowest total
//! (including tier charges) wins.
//!
//! The search is exponential in the number of distinct suppliers. It is
//! bounded by [`OptimiserConfig::max_subset_size`]; a universe larger than the
//! cap is rejected unless [`CapPolicy::Truncate`] is chosen, in which case the
//! result is flagged as non-exhaustive.

use std::time::{Duration, Instant};

use rust_decimal::Decimal;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use thiserror::Error;
use tracing::{debug, warn};

use crate::{
    allocation::{Allocation, LineAllocation, LotCharge},
    basket::DemandLine,
    offers::{OfferKey, PriceTable},
    tiers::TierTable,
};

mod subsets;

use subsets::{SubsetWalker, subset_count};

/// Default largest supplier subset the optimiser will enumerate.
pub const DEFAULT_MAX_SUBSET_SIZE: usize = 15;

/// Optimiser Errors
#[derive(Debug, Error, PartialEq)]
pub enum OptimiserError {
    /// The basket has no lines.
    #[error("Basket is empty.")]
    EmptyBasket,

    /// A demand line has no matching offer in the price table.
    #[error("No supplier prices for {key} (line {index})")]
    NoSupplierForLine {
        /// Position of the line in the basket
        index: usize,
        /// Product, location and window that could not be matched
        key: OfferKey,
    },

    /// No explored supplier subset could serve every line.
    #[error("No feasible supplier set found.")]
    NoFeasibleAllocation,

    /// The supplier universe is larger than the enumeration cap.
    #[error("{suppliers} candidate suppliers exceeds the search cap of {cap}")]
    CapacityExceeded {
        /// Distinct suppliers across all lines
        suppliers: usize,
        /// Configured maximum subset size
        cap: usize,
    },

    /// The configured deadline passed before the search finished.
    #[error("optimisation deadline exceeded after {subsets_evaluated} supplier subsets")]
    DeadlineExceeded {
        /// Subsets examined before giving up
        subsets_evaluated: usize,
    },

    /// A line cost, tonnage or total is too large to represent.
    #[error("amount overflow while costing the basket")]
    AmountOverflow,
}

/// What to do when the supplier universe is larger than the subset cap.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CapPolicy {
    /// Fail with [`OptimiserError::CapacityExceeded`].
    #[default]
    Reject,

    /// Explore subsets up to the cap and flag the result as non-exhaustive.
    Truncate,
}

/// Search limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OptimiserConfig {
    /// Largest supplier subset to enumerate
    pub max_subset_size: usize,

    /// Behaviour when more suppliers are in play than `max_subset_size`
    pub cap_policy: CapPolicy,

    /// Give up once this much wall-clock time has elapsed
    pub deadline: Option<Duration>,
}

impl Default for OptimiserConfig {
    fn default() -> Self {
        Self {
            max_subset_size: DEFAULT_MAX_SUBSET_SIZE,
            cap_policy: CapPolicy::Reject,
            deadline: None,
        }
    }
}

/// Exhaustive supplier-subset optimiser.
#[derive(Debug, Clone, Copy, Default)]
pub struct Optimiser {
    config: OptimiserConfig,
}

/// A line's candidate offers as (supplier index, price), cheapest first.
type Candidates = SmallVec<[(usize, Decimal); 8]>;

/// Best allocation found so far: total and the winning candidate position per line.
struct Best {
    total: Decimal,
    picks: SmallVec<[usize; 16]>,
}

impl Optimiser {
    /// Create an optimiser with the given limits.
    pub const fn with_config(config: OptimiserConfig) -> Self {
        Self { config }
    }

    /// The optimiser's limits.
    pub const fn config(&self) -> &OptimiserConfig {
        &self.config
    }

    /// Find the minimum-cost allocation of `basket` to suppliers in `prices`.
    ///
    /// # Errors
    ///
    /// - [`OptimiserError::EmptyBasket`]: the basket has no lines.
    /// - [`OptimiserError::NoSupplierForLine`]: a line has no matching offer.
    /// - [`OptimiserError::CapacityExceeded`]: too many suppliers under [`CapPolicy::Reject`].
    /// - [`OptimiserError::NoFeasibleAllocation`]: no explored subset covers every line.
    /// - [`OptimiserError::DeadlineExceeded`]: the configured deadline passed.
    /// - [`OptimiserError::AmountOverflow`]: quantities and prices too large to cost.
    #[tracing::instrument(
        name = "optimiser.optimise",
        skip_all,
        fields(lines = basket.len(), offers = prices.len()),
        err
    )]
    pub fn optimise(
        &self,
        basket: &[DemandLine],
        prices: &PriceTable,
        tiers: &TierTable,
    ) -> Result<Allocation, OptimiserError> {
        if basket.is_empty() {
            return Err(OptimiserError::EmptyBasket);
        }

        let started = Instant::now();

        let (universe, candidates) = candidates_by_line(basket, prices)?;

        let exhaustive = universe.len() <= self.config.max_subset_size;

        if !exhaustive {
            match self.config.cap_policy {
                CapPolicy::Reject => {
                    return Err(OptimiserError::CapacityExceeded {
                        suppliers: universe.len(),
                        cap: self.config.max_subset_size,
                    });
                }
                CapPolicy::Truncate => warn!(
                    suppliers = universe.len(),
                    cap = self.config.max_subset_size,
                    "supplier universe exceeds search cap; result may not be optimal"
                ),
            }
        }

        debug!(
            suppliers = universe.len(),
            subsets = %subset_count(universe.len(), self.config.max_subset_size),
            "enumerating supplier subsets"
        );

        let mut walker = SubsetWalker::new(universe.len(), self.config.max_subset_size);
        let mut in_subset = vec![false; universe.len()];
        let mut tonnes = vec![Decimal::ZERO; universe.len()];
        let mut picks: SmallVec<[usize; 16]> = SmallVec::with_capacity(basket.len());
        let mut best: Option<Best> = None;
        let mut subsets_evaluated = 0_usize;

        while let Some(subset) = walker.next_subset() {
            if let Some(deadline) = self.config.deadline
                && started.elapsed() >= deadline
            {
                return Err(OptimiserError::DeadlineExceeded { subsets_evaluated });
            }

            subsets_evaluated += 1;

            in_subset.fill(false);

            for &member in subset {
                if let Some(flag) = in_subset.get_mut(member) {
                    *flag = true;
                }
            }

            let Some(total) = evaluate_subset(
                basket,
                &candidates,
                &in_subset,
                tiers,
                &mut tonnes,
                &mut picks,
            )?
            else {
                continue;
            };

            if best.as_ref().is_none_or(|best| total < best.total) {
                best = Some(Best {
                    total,
                    picks: picks.clone(),
                });
            }
        }

        let best = best.ok_or(OptimiserError::NoFeasibleAllocation)?;

        let allocation = build_allocation(basket, &candidates, &universe, &best, prices, tiers)
            .with_search_stats(universe.len(), subsets_evaluated, exhaustive);

        debug!(
            subsets_evaluated,
            total = %allocation.total(),
            elapsed_us = started.elapsed().as_micros(),
            "optimised basket"
        );

        Ok(allocation)
    }
}

/// Find the minimum-cost allocation with the default search limits.
///
/// # Errors
///
/// See [`Optimiser::optimise`].
pub fn optimise(
    basket: &[DemandLine],
    prices: &PriceTable,
    tiers: &TierTable,
) -> Result<Allocation, OptimiserError> {
    Optimiser::default().optimise(basket, prices, tiers)
}

/// Collect each line's candidates and the sorted universe of suppliers they come from.
fn candidates_by_line<'p>(
    basket: &[DemandLine],
    prices: &'p PriceTable,
) -> Result<(Vec<&'p str>, Vec<Candidates>), OptimiserError> {
    let mut offers_by_line = Vec::with_capacity(basket.len());

    for (index, line) in basket.iter().enumerate() {
        let offers = prices.candidates(&line.key);

        if offers.is_empty() {
            return Err(OptimiserError::NoSupplierForLine {
                index,
                key: line.key.clone(),
            });
        }

        offers_by_line.push(offers);
    }

    let mut universe: Vec<&str> = offers_by_line
        .iter()
        .flatten()
        .map(|offer| offer.supplier.as_str())
        .collect();

    universe.sort_unstable();
    universe.dedup();

    let positions: FxHashMap<&str, usize> = universe
        .iter()
        .enumerate()
        .map(|(idx, &supplier)| (supplier, idx))
        .collect();

    let candidates = offers_by_line
        .iter()
        .map(|offers| {
            offers
                .iter()
                .filter_map(|offer| {
                    positions
                        .get(offer.supplier.as_str())
                        .map(|&idx| (idx, offer.price))
                })
                .collect()
        })
        .collect();

    Ok((universe, candidates))
}

/// Cost of serving every line from suppliers flagged in `in_subset`.
///
/// Fills `picks` with the chosen candidate position per line. Returns `None`
/// when some line has no candidate inside the subset.
fn evaluate_subset(
    basket: &[DemandLine],
    candidates: &[Candidates],
    in_subset: &[bool],
    tiers: &TierTable,
    tonnes: &mut [Decimal],
    picks: &mut SmallVec<[usize; 16]>,
) -> Result<Option<Decimal>, OptimiserError> {
    tonnes.fill(Decimal::ZERO);
    picks.clear();

    let mut base_cost = Decimal::ZERO;

    for (line, line_candidates) in basket.iter().zip(candidates) {
        let Some((position, &(supplier, price))) = line_candidates
            .iter()
            .enumerate()
            .find(|(_, (supplier, _))| in_subset.get(*supplier).copied().unwrap_or(false))
        else {
            return Ok(None);
        };

        if let Some(won) = tonnes.get_mut(supplier) {
            *won = won.checked_add(line.qty).ok_or(OptimiserError::AmountOverflow)?;
        }

        base_cost = line
            .qty
            .checked_mul(price)
            .and_then(|line_cost| base_cost.checked_add(line_cost))
            .ok_or(OptimiserError::AmountOverflow)?;

        picks.push(position);
    }

    let mut total = base_cost;

    for &won in tonnes.iter().filter(|won| **won > Decimal::ZERO) {
        total = won
            .checked_mul(tiers.charge_per_tonne(won))
            .and_then(|lot_charge| total.checked_add(lot_charge))
            .ok_or(OptimiserError::AmountOverflow)?;
    }

    Ok(Some(total))
}

/// Rebuild the winning subset's allocation. Every product and sum here was
/// already computed with checked arithmetic by [`evaluate_subset`].
fn build_allocation(
    basket: &[DemandLine],
    candidates: &[Candidates],
    universe: &[&str],
    best: &Best,
    prices: &PriceTable,
    tiers: &TierTable,
) -> Allocation {
    let mut tonnes = vec![Decimal::ZERO; universe.len()];

    let lines = basket
        .iter()
        .zip(candidates)
        .zip(&best.picks)
        .filter_map(|((line, line_candidates), &pick)| {
            let &(supplier, price) = line_candidates.get(pick)?;
            let name = universe.get(supplier)?;

            if let Some(won) = tonnes.get_mut(supplier) {
                *won += line.qty;
            }

            Some(LineAllocation {
                line: line.clone(),
                supplier: (*name).to_string(),
                price,
                line_cost: line.qty * price,
            })
        })
        .collect();

    let lot_charges = universe
        .iter()
        .zip(&tonnes)
        .filter(|(_, won)| **won > Decimal::ZERO)
        .filter_map(|(name, &won)| {
            let charge_per_tonne = tiers.charge_per_tonne(won);

            (charge_per_tonne > Decimal::ZERO).then(|| LotCharge {
                supplier: (*name).to_string(),
                tonnes: won,
                charge_per_tonne,
                lot_charge: won * charge_per_tonne,
            })
        })
        .collect();

    Allocation::new(lines, lot_charges, prices.currency())
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;
    use rusty_money::iso::GBP;
    use testresult::TestResult;

    use crate::{
        offers::{OfferKey, PriceOffer},
        tiers::Tier,
    };

    use super::*;

    fn d(value: i64) -> Decimal {
        Decimal::from(value)
    }

    fn key(product: &str) -> OfferKey {
        OfferKey::new(product, "X", "W1")
    }

    fn line(product: &str, qty: i64) -> TestResult<DemandLine> {
        Ok(DemandLine::new(key(product), d(qty))?)
    }

    fn table(offers: &[(&str, &str, i64)]) -> TestResult<PriceTable> {
        let offers: Vec<PriceOffer> = offers
            .iter()
            .map(|&(supplier, product, price)| PriceOffer::new(supplier, key(product), d(price)))
            .collect();

        Ok(PriceTable::new(offers, GBP)?)
    }

    fn small_lot() -> TierTable {
        TierTable::new([
            Tier::below(d(0), d(24), d(15)),
            Tier::new(d(24), None, d(0)),
        ])
    }

    #[test]
    fn empty_basket_errors() -> TestResult {
        let prices = table(&[("A", "Urea", 300)])?;

        assert_eq!(
            optimise(&[], &prices, &small_lot()),
            Err(OptimiserError::EmptyBasket)
        );

        Ok(())
    }

    #[test]
    fn unmatched_line_names_the_line() -> TestResult {
        let prices = table(&[("A", "Urea", 300)])?;
        let basket = [line("Urea", 10)?, line("AN", 5)?];

        assert_eq!(
            optimise(&basket, &prices, &small_lot()),
            Err(OptimiserError::NoSupplierForLine {
                index: 1,
                key: key("AN"),
            })
        );

        Ok(())
    }

    #[test]
    fn single_line_takes_cheapest_and_pays_lot_charge() -> TestResult {
        let prices = table(&[("SupplierA", "Urea", 300), ("SupplierB", "Urea", 280)])?;
        let basket = [line("Urea", 10)?];

        let allocation = optimise(&basket, &prices, &small_lot())?;

        let chosen = allocation.lines().first().ok_or("no lines")?;

        assert_eq!(chosen.supplier, "SupplierB");
        assert_eq!(chosen.price, d(280));
        assert_eq!(allocation.base_cost(), d(2800));
        assert_eq!(allocation.lot_charge_total(), d(150));
        assert_eq!(allocation.total(), d(2950));

        Ok(())
    }

    #[test]
    fn combined_tonnage_crosses_threshold() -> TestResult {
        let prices = table(&[
            ("A", "Urea", 300),
            ("A", "AN", 310),
            ("B", "Urea", 298),
            ("C", "AN", 308),
        ])?;
        let basket = [line("Urea", 15)?, line("AN", 15)?];

        let allocation = optimise(&basket, &prices, &small_lot())?;

        assert_eq!(allocation.suppliers(), ["A"]);
        assert_eq!(allocation.tonnes_for("A"), d(30));
        assert_eq!(allocation.lot_charge_total(), Decimal::ZERO);
        assert!(allocation.lot_charges().is_empty());
        assert_eq!(allocation.total(), d(15 * 300 + 15 * 310));

        Ok(())
    }

    #[test]
    fn per_line_cheapest_wins_when_charges_do_not_matter() -> TestResult {
        let prices = table(&[
            ("A", "Urea", 300),
            ("A", "AN", 310),
            ("B", "Urea", 250),
            ("C", "AN", 260),
        ])?;
        let basket = [line("Urea", 15)?, line("AN", 15)?];

        let allocation = optimise(&basket, &prices, &small_lot())?;

        assert_eq!(allocation.suppliers(), ["B", "C"]);
        assert_eq!(allocation.base_cost(), d(15 * 250 + 15 * 260));
        assert_eq!(allocation.lot_charge_total(), d(30 * 15));

        Ok(())
    }

    #[test]
    fn price_ties_go_to_supplier_name_order() -> TestResult {
        let prices = table(&[("Zeta", "Urea", 280), ("Alpha", "Urea", 280)])?;
        let basket = [line("Urea", 30)?];

        let allocation = optimise(&basket, &prices, &TierTable::none())?;

        assert_eq!(allocation.suppliers(), ["Alpha"]);

        Ok(())
    }

    #[test]
    fn lines_keep_basket_order() -> TestResult {
        let prices = table(&[("A", "Urea", 300), ("B", "AN", 310), ("A", "MOP", 320)])?;
        let basket = [line("MOP", 5)?, line("AN", 5)?, line("Urea", 5)?];

        let allocation = optimise(&basket, &prices, &TierTable::none())?;

        let products: Vec<&str> = allocation
            .lines()
            .iter()
            .map(|l| l.line.key.product.as_str())
            .collect();

        assert_eq!(products, ["MOP", "AN", "Urea"]);

        Ok(())
    }

    #[test]
    fn universe_over_cap_is_rejected_by_default() -> TestResult {
        let prices = table(&[("A", "Urea", 300), ("B", "Urea", 290), ("C", "Urea", 280)])?;
        let basket = [line("Urea", 10)?];

        let optimiser = Optimiser::with_config(OptimiserConfig {
            max_subset_size: 2,
            ..OptimiserConfig::default()
        });

        assert_eq!(
            optimiser.optimise(&basket, &prices, &TierTable::none()),
            Err(OptimiserError::CapacityExceeded {
                suppliers: 3,
                cap: 2,
            })
        );

        Ok(())
    }

    #[test]
    fn truncated_search_flags_non_exhaustive_result() -> TestResult {
        let prices = table(&[("A", "Urea", 300), ("B", "Urea", 290), ("C", "Urea", 280)])?;
        let basket = [line("Urea", 10)?];

        let optimiser = Optimiser::with_config(OptimiserConfig {
            max_subset_size: 1,
            cap_policy: CapPolicy::Truncate,
            deadline: None,
        });

        let allocation = optimiser.optimise(&basket, &prices, &TierTable::none())?;

        assert!(!allocation.is_exhaustive());
        assert_eq!(allocation.subsets_evaluated(), 3);
        assert_eq!(allocation.suppliers(), ["C"]);

        Ok(())
    }

    #[test]
    fn truncated_search_can_be_infeasible() -> TestResult {
        let prices = table(&[("A", "Urea", 300), ("B", "AN", 290), ("C", "MOP", 280)])?;
        let basket = [line("Urea", 10)?, line("AN", 10)?, line("MOP", 10)?];

        let optimiser = Optimiser::with_config(OptimiserConfig {
            max_subset_size: 2,
            cap_policy: CapPolicy::Truncate,
            deadline: None,
        });

        assert_eq!(
            optimiser.optimise(&basket, &prices, &TierTable::none()),
            Err(OptimiserError::NoFeasibleAllocation)
        );

        Ok(())
    }

    #[test]
    fn zero_deadline_stops_the_search() -> TestResult {
        let prices = table(&[("A", "Urea", 300)])?;
        let basket = [line("Urea", 10)?];

        let optimiser = Optimiser::with_config(OptimiserConfig {
            deadline: Some(Duration::ZERO),
            ..OptimiserConfig::default()
        });

        assert_eq!(
            optimiser.optimise(&basket, &prices, &TierTable::none()),
            Err(OptimiserError::DeadlineExceeded {
                subsets_evaluated: 0
            })
        );

        Ok(())
    }

    #[test]
    fn oversized_line_cost_is_an_error() -> TestResult {
        let prices = PriceTable::new(
            vec![PriceOffer::new("A", key("Urea"), Decimal::MAX)],
            GBP,
        )?;
        let basket = [line("Urea", 10)?];

        assert_eq!(
            optimise(&basket, &prices, &TierTable::none()),
            Err(OptimiserError::AmountOverflow)
        );

        Ok(())
    }

    #[test]
    fn oversized_lot_charge_is_an_error() -> TestResult {
        let prices = table(&[("A", "Urea", 1)])?;
        let basket = [line("Urea", 10)?];
        let tiers = TierTable::new([Tier::new(d(0), None, Decimal::MAX)]);

        assert_eq!(
            optimise(&basket, &prices, &tiers),
            Err(OptimiserError::AmountOverflow)
        );

        Ok(())
    }

    #[test]
    fn full_universe_is_enumerated_when_within_cap() -> TestResult {
        let prices = table(&[("A", "Urea", 300), ("B", "Urea", 290), ("C", "Urea", 280)])?;
        let basket = [line("Urea", 10)?];

        let allocation = optimise(&basket, &prices, &TierTable::none())?;

        assert!(allocation.is_exhaustive());
        assert_eq!(allocation.subsets_evaluated(), 7);

        Ok(())
    }
}
