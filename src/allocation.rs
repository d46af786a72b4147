//! Allocation
//!
//! The outcome of optimising a basket: which supplier serves each line, what
//! small-lot charges that choice attracts and the resulting totals.

use std::io;

use rust_decimal::Decimal;
use rusty_money::iso::Currency;
use tabled::{
    builder::Builder,
    settings::{
        Alignment, Color, Style,
        object::{Columns, Rows},
    },
};
use thiserror::Error;

use crate::{
    basket::DemandLine,
    pricing::{PricingError, to_money},
};

/// Errors that can occur when writing an allocation.
#[derive(Debug, Error)]
pub enum AllocationError {
    /// Amount could not be formatted as money.
    #[error(transparent)]
    Pricing(#[from] PricingError),

    /// IO error
    #[error("IO error")]
    IO,
}

/// The supplier chosen for one demand line.
#[derive(Debug, Clone, PartialEq)]
pub struct LineAllocation {
    /// The demand line being served
    pub line: DemandLine,

    /// Winning supplier
    pub supplier: String,

    /// Supplier's quoted price per tonne
    pub price: Decimal,

    /// `qty × price`
    pub line_cost: Decimal,
}

/// Small-lot charge levied by one supplier on the tonnes it won.
#[derive(Debug, Clone, PartialEq)]
pub struct LotCharge {
    /// Supplier levying the charge
    pub supplier: String,

    /// Total tonnes won across the basket
    pub tonnes: Decimal,

    /// Resolved tier charge per tonne
    pub charge_per_tonne: Decimal,

    /// `tonnes × charge_per_tonne`
    pub lot_charge: Decimal,
}

/// Minimum-cost sourcing of a basket.
#[derive(Debug, Clone, PartialEq)]
pub struct Allocation {
    lines: Vec<LineAllocation>,
    lot_charges: Vec<LotCharge>,
    base_cost: Decimal,
    lot_charge_total: Decimal,
    total: Decimal,
    currency: &'static Currency,
    suppliers_evaluated: usize,
    subsets_evaluated: usize,
    exhaustive: bool,
}

impl Allocation {
    /// Assemble an allocation, deriving the totals from its lines and charges.
    pub fn new(
        lines: Vec<LineAllocation>,
        lot_charges: Vec<LotCharge>,
        currency: &'static Currency,
    ) -> Self {
        let base_cost = lines.iter().map(|line| line.line_cost).sum();
        let lot_charge_total = lot_charges.iter().map(|charge| charge.lot_charge).sum();

        Self {
            lines,
            lot_charges,
            base_cost,
            lot_charge_total,
            total: base_cost + lot_charge_total,
            currency,
            suppliers_evaluated: 0,
            subsets_evaluated: 0,
            exhaustive: true,
        }
    }

    pub(crate) fn with_search_stats(
        mut self,
        suppliers_evaluated: usize,
        subsets_evaluated: usize,
        exhaustive: bool,
    ) -> Self {
        self.suppliers_evaluated = suppliers_evaluated;
        self.subsets_evaluated = subsets_evaluated;
        self.exhaustive = exhaustive;
        self
    }

    /// Line-level breakdown in basket order.
    pub fn lines(&self) -> &[LineAllocation] {
        &self.lines
    }

    /// Suppliers that attract a non-zero small-lot charge, by supplier name.
    pub fn lot_charges(&self) -> &[LotCharge] {
        &self.lot_charges
    }

    /// Sum of line costs.
    pub fn base_cost(&self) -> Decimal {
        self.base_cost
    }

    /// Sum of small-lot charges.
    pub fn lot_charge_total(&self) -> Decimal {
        self.lot_charge_total
    }

    /// Base cost plus small-lot charges.
    pub fn total(&self) -> Decimal {
        self.total
    }

    /// Currency of every amount.
    pub fn currency(&self) -> &'static Currency {
        self.currency
    }

    /// Size of the supplier universe the search ran over.
    pub fn suppliers_evaluated(&self) -> usize {
        self.suppliers_evaluated
    }

    /// Number of feasible and infeasible supplier subsets examined.
    pub fn subsets_evaluated(&self) -> usize {
        self.subsets_evaluated
    }

    /// False when the supplier universe was larger than the search cap and only
    /// smaller subsets were explored, so cheaper allocations may exist.
    pub fn is_exhaustive(&self) -> bool {
        self.exhaustive
    }

    /// Tonnes won by `supplier`.
    pub fn tonnes_for(&self, supplier: &str) -> Decimal {
        self.lines
            .iter()
            .filter(|line| line.supplier == supplier)
            .map(|line| line.line.qty)
            .sum()
    }

    /// Distinct winning suppliers, sorted.
    pub fn suppliers(&self) -> Vec<&str> {
        let mut suppliers: Vec<&str> = self.lines.iter().map(|l| l.supplier.as_str()).collect();

        suppliers.sort_unstable();
        suppliers.dedup();

        suppliers
    }

    /// Write the allocation, lot charges and totals as tables.
    ///
    /// # Errors
    ///
    /// Returns an [`AllocationError`] if an amount cannot be formatted or the write fails.
    pub fn write_to(&self, out: &mut impl io::Write) -> Result<(), AllocationError> {
        let mut builder = Builder::default();

        builder.push_record([
            "#", "Product", "Location", "Window", "Qty (t)", "Supplier", "Price", "Line Cost",
        ]);

        for (idx, line) in self.lines.iter().enumerate() {
            builder.push_record([
                format!("#{:<3}", idx + 1),
                line.line.key.product.clone(),
                line.line.key.location.clone(),
                line.line.key.delivery_window.clone(),
                line.line.qty.normalize().to_string(),
                line.supplier.clone(),
                to_money(line.price, self.currency)?.to_string(),
                to_money(line.line_cost, self.currency)?.to_string(),
            ]);
        }

        write_table(out, builder, 4..8)?;

        if !self.lot_charges.is_empty() {
            let mut builder = Builder::default();

            builder.push_record(["Supplier", "Tonnes", "Charge /t", "Lot Charge"]);

            for charge in &self.lot_charges {
                builder.push_record([
                    charge.supplier.clone(),
                    charge.tonnes.normalize().to_string(),
                    to_money(charge.charge_per_tonne, self.currency)?.to_string(),
                    to_money(charge.lot_charge, self.currency)?.to_string(),
                ]);
            }

            write_table(out, builder, 1..4)?;
        }

        self.write_summary(out)
    }

    fn write_summary(&self, out: &mut impl io::Write) -> Result<(), AllocationError> {
        let rows = [
            (" Base cost:", to_money(self.base_cost, self.currency)?.to_string()),
            (" Small-lot:", to_money(self.lot_charge_total, self.currency)?.to_string()),
            (" Total:", to_money(self.total, self.currency)?.to_string()),
        ];

        let label_width = rows.iter().map(|(label, _)| label.len()).max().unwrap_or(0);
        let value_width = rows.iter().map(|(_, value)| value.len()).max().unwrap_or(0);

        writeln!(out).map_err(|_err| AllocationError::IO)?;

        for (label, value) in rows {
            writeln!(out, "{label:<label_width$} {value:>value_width$}")
                .map_err(|_err| AllocationError::IO)?;
        }

        if !self.exhaustive {
            writeln!(
                out,
                "\n Search was capped; a cheaper allocation may exist."
            )
            .map_err(|_err| AllocationError::IO)?;
        }

        writeln!(out).map_err(|_err| AllocationError::IO)
    }
}

fn write_table(
    out: &mut impl io::Write,
    builder: Builder,
    numeric_columns: std::ops::Range<usize>,
) -> Result<(), AllocationError> {
    let mut table = builder.build();

    table.with(Style::modern_rounded());
    table.modify(Rows::first(), Color::BOLD);
    table.modify(Columns::new(numeric_columns), Alignment::right());

    writeln!(out, "\n{table}").map_err(|_err| AllocationError::IO)
}
