//! Supplier Subset Enumeration

use smallvec::SmallVec;

/// Walks every non-empty subset of `0..universe` with at most `max_size`
/// members: smallest subsets first, lexicographic order within a size.
///
/// Subsets are lent out one at a time so no allocation happens per subset.
#[derive(Debug)]
pub(crate) struct SubsetWalker {
    universe: usize,
    max_size: usize,
    size: usize,
    indices: SmallVec<[usize; 16]>,
    started: bool,
}

impl SubsetWalker {
    pub(crate) fn new(universe: usize, max_size: usize) -> Self {
        Self {
            universe,
            max_size: max_size.min(universe),
            size: 1,
            indices: SmallVec::new(),
            started: false,
        }
    }

    /// Advance to the next subset, returning its member indexes in ascending order.
    pub(crate) fn next_subset(&mut self) -> Option<&[usize]> {
        if !self.started {
            self.started = true;

            if self.max_size == 0 {
                return None;
            }

            self.reset_to_size(1);

            return Some(&self.indices);
        }

        if self.size == 0 {
            return None;
        }

        let universe = self.universe;
        let size = self.size;

        // Rightmost index that can still move right.
        let movable = self
            .indices
            .iter()
            .enumerate()
            .rev()
            .find(|&(pos, &value)| value != pos + universe - size)
            .map(|(pos, _)| pos);

        match movable {
            Some(pos) => {
                let mut next = self.indices.get(pos).map_or(0, |value| value + 1);

                for slot in self.indices.iter_mut().skip(pos) {
                    *slot = next;
                    next += 1;
                }
            }
            None if size < self.max_size => self.reset_to_size(size + 1),
            None => {
                self.size = 0;
                self.indices.clear();

                return None;
            }
        }

        Some(&self.indices)
    }

    fn reset_to_size(&mut self, size: usize) {
        self.size = size;
        self.indices.clear();
        self.indices.extend(0..size);
    }
}

/// Number of subsets a [`SubsetWalker`] will visit.
pub(crate) fn subset_count(universe: usize, max_size: usize) -> u128 {
    let max_size = max_size.min(universe);
    let universe = universe as u128;

    let mut total = 0_u128;
    let mut choose = 1_u128;

    for size in 1..=max_size as u128 {
        choose = choose * (universe - size + 1) / size;
        total += choose;
    }

    total
}
