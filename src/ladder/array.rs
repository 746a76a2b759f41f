//! Sparse direct-indexed ladder.
//!
//! A fixed window of `slots` prices starting at `base_price`, one slot per
//! tick. Each slot holds the index of its level or `NULL_INDEX`. Occupied
//! levels are also doubly linked in price order (`left` = next lower price,
//! `right` = next higher price), so removal and best advancement never scan.
//!
//! Inserting a new price links it to its nearest occupied neighbour. That is
//! O(1) when an adjacent slot is occupied or the price extends the occupied
//! range, and otherwise scans outward across empty slots.

use crate::arena::{Arena, ArenaIndex, NULL_INDEX};
use crate::error::BookError;
use crate::event::Side;
use crate::ladder::SideBook;
use crate::price_level::PriceLevel;

pub struct ArrayLadder {
    side: Side,
    base_price: u64,
    tick_size: u64,
    slots: Vec<ArenaIndex>,
    levels: Arena<PriceLevel>,
    /// Lowest-price occupied level
    low: ArenaIndex,
    /// Highest-price occupied level
    high: ArenaIndex,
}

impl ArrayLadder {
    /// Create an empty window of `slots` ticks.
    ///
    /// # Panics
    /// Panics if `tick_size` is zero.
    pub fn new(side: Side, base_price: u64, tick_size: u64, slots: u32, capacity: u32) -> Self {
        assert!(tick_size > 0, "tick_size must be positive");
        Self {
            side,
            base_price,
            tick_size,
            slots: vec![NULL_INDEX; slots as usize],
            levels: Arena::new(capacity.min(slots)),
            low: NULL_INDEX,
            high: NULL_INDEX,
        }
    }

    /// Slot addressed by `price`, if the window covers it.
    #[inline]
    fn slot_of(&self, price: u64) -> Option<usize> {
        let offset = price.checked_sub(self.base_price)?;
        if offset % self.tick_size != 0 {
            return None;
        }
        let slot = offset / self.tick_size;
        (slot < self.slots.len() as u64).then_some(slot as usize)
    }

    #[inline]
    fn slot_of_level(&self, idx: ArenaIndex) -> usize {
        ((self.levels.get(idx).price - self.base_price) / self.tick_size) as usize
    }

    /// Occupied neighbours `(lower, upper)` of an empty slot.
    fn neighbours(&self, slot: usize) -> (ArenaIndex, ArenaIndex) {
        if self.low == NULL_INDEX {
            return (NULL_INDEX, NULL_INDEX);
        }
        if slot > self.slot_of_level(self.high) {
            return (self.high, NULL_INDEX);
        }
        if slot < self.slot_of_level(self.low) {
            return (NULL_INDEX, self.low);
        }

        // Strictly inside the occupied range, so both directions terminate
        let mut distance = 1;
        loop {
            if let Some(below) = slot.checked_sub(distance) {
                let lower = self.slots[below];
                if lower != NULL_INDEX {
                    return (lower, self.levels.get(lower).right);
                }
            }
            if let Some(&upper) = self.slots.get(slot + distance) {
                if upper != NULL_INDEX {
                    return (self.levels.get(upper).left, upper);
                }
            }
            distance += 1;
        }
    }

    fn insert(&mut self, slot: usize, price: u64) -> Result<ArenaIndex, BookError> {
        let (lower, upper) = self.neighbours(slot);

        let mut level = PriceLevel::new(price);
        level.left = lower;
        level.right = upper;
        let idx = self
            .levels
            .alloc(level)
            .ok_or(BookError::CapacityExhausted(self.levels.capacity()))?;

        if lower == NULL_INDEX {
            self.low = idx;
        } else {
            self.levels.get_mut(lower).right = idx;
        }
        if upper == NULL_INDEX {
            self.high = idx;
        } else {
            self.levels.get_mut(upper).left = idx;
        }
        self.slots[slot] = idx;

        tracing::trace!(side = ?self.side, price, "level created");
        Ok(idx)
    }
}

impl SideBook for ArrayLadder {
    #[inline]
    fn side(&self) -> Side {
        self.side
    }

    #[inline]
    fn check_price(&self, price: u64) -> Result<(), BookError> {
        self.slot_of(price)
            .map(|_| ())
            .ok_or(BookError::PriceOutOfRange(price))
    }

    #[inline]
    fn find_level(&self, price: u64) -> Option<ArenaIndex> {
        let idx = self.slots[self.slot_of(price)?];
        (idx != NULL_INDEX).then_some(idx)
    }

    #[inline]
    fn get_or_create_level(&mut self, price: u64) -> Result<ArenaIndex, BookError> {
        let slot = self.slot_of(price).ok_or(BookError::PriceOutOfRange(price))?;
        match self.slots[slot] {
            NULL_INDEX => self.insert(slot, price),
            idx => Ok(idx),
        }
    }

    fn remove_level_if_empty(&mut self, level: ArenaIndex) -> bool {
        let PriceLevel { left, right, price, count, .. } = *self.levels.get(level);
        if count != 0 {
            return false;
        }

        if left == NULL_INDEX {
            self.low = right;
        } else {
            self.levels.get_mut(left).right = right;
        }
        if right == NULL_INDEX {
            self.high = left;
        } else {
            self.levels.get_mut(right).left = left;
        }

        let slot = self.slot_of_level(level);
        self.slots[slot] = NULL_INDEX;
        self.levels.free(level);

        tracing::trace!(side = ?self.side, price, "level removed");
        true
    }

    #[inline]
    fn best_level(&self) -> Option<ArenaIndex> {
        let best = match self.side {
            Side::Bid => self.high,
            Side::Ask => self.low,
        };
        (best != NULL_INDEX).then_some(best)
    }

    #[inline]
    fn next_worse(&self, level: ArenaIndex) -> Option<ArenaIndex> {
        let node = self.levels.get(level);
        let next = match self.side {
            Side::Bid => node.left,
            Side::Ask => node.right,
        };
        (next != NULL_INDEX).then_some(next)
    }

    #[inline]
    fn level(&self, level: ArenaIndex) -> &PriceLevel {
        self.levels.get(level)
    }

    #[inline]
    fn level_mut(&mut self, level: ArenaIndex) -> &mut PriceLevel {
        self.levels.get_mut(level)
    }

    #[inline]
    fn level_count(&self) -> usize {
        self.levels.allocated() as usize
    }

    fn clear(&mut self) {
        self.slots.fill(NULL_INDEX);
        self.levels.reset();
        self.low = NULL_INDEX;
        self.high = NULL_INDEX;
    }

    fn warm_up(&mut self) {
        self.levels.warm_up();
    }
}
