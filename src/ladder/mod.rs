//! Side structures - ordered price levels for one side of the book.
//!
//! Two interchangeable strategies sit behind [`SideBook`]:
//!
//! - [`TreeLadder`]: AVL tree with parent links. Any price, O(log M) level
//!   insertion, O(1) advance of the best level when it empties.
//! - [`ArrayLadder`]: direct-indexed price window with linked occupied
//!   levels. O(1) lookup, insertion and removal when the book is dense.
//!
//! [`Ladder`] picks one at runtime from [`LadderKind`] and dispatches
//! statically.

mod array;
mod tree;

pub use array::ArrayLadder;
pub use tree::TreeLadder;

use crate::arena::{ArenaIndex, NULL_INDEX};
use crate::config::LadderKind;
use crate::error::BookError;
use crate::event::Side;
use crate::price_level::PriceLevel;

/// Ordered collection of price levels for one side of the book.
///
/// Level handles are arena indices; they stay valid until the level is
/// removed, regardless of how the structure reorganises around them.
pub trait SideBook {
    /// Which side this structure holds.
    fn side(&self) -> Side;

    /// Fails if the structure can never hold a level at `price`.
    fn check_price(&self, price: u64) -> Result<(), BookError>;

    /// O(1) lookup of an existing level.
    fn find_level(&self, price: u64) -> Option<ArenaIndex>;

    /// Existing level at `price`, or a new empty one linked into place.
    fn get_or_create_level(&mut self, price: u64) -> Result<ArenaIndex, BookError>;

    /// Unlink and free `level` if its queue is empty, advancing the cached
    /// best level when needed. Returns whether the level was removed.
    fn remove_level_if_empty(&mut self, level: ArenaIndex) -> bool;

    /// O(1) handle of the best level, `None` when the side is empty.
    fn best_level(&self) -> Option<ArenaIndex>;

    /// The next level away from the inside of the book.
    fn next_worse(&self, level: ArenaIndex) -> Option<ArenaIndex>;

    fn level(&self, level: ArenaIndex) -> &PriceLevel;

    fn level_mut(&mut self, level: ArenaIndex) -> &mut PriceLevel;

    fn level_count(&self) -> usize;

    /// Drop every level.
    fn clear(&mut self);

    /// Pre-fault the level arena.
    fn warm_up(&mut self);

    /// The best level itself.
    #[inline]
    fn best(&self) -> Option<&PriceLevel> {
        self.best_level().map(|idx| self.level(idx))
    }

    /// Levels from best to worst.
    fn levels(&self) -> Levels<'_, Self>
    where
        Self: Sized,
    {
        Levels {
            ladder: self,
            cursor: self.best_level(),
        }
    }
}

/// Iterator over a side's levels, best first.
pub struct Levels<'a, S: SideBook> {
    ladder: &'a S,
    cursor: Option<ArenaIndex>,
}

impl<'a, S: SideBook> Iterator for Levels<'a, S> {
    type Item = &'a PriceLevel;

    fn next(&mut self) -> Option<Self::Item> {
        let idx = self.cursor?;
        self.cursor = self.ladder.next_worse(idx);
        Some(self.ladder.level(idx))
    }
}

/// Configuration-selected side structure.
pub enum Ladder {
    Tree(TreeLadder),
    Array(ArrayLadder),
}

impl Ladder {
    /// Build the structure `kind` describes for `side`, sized for
    /// `capacity` resting orders.
    pub fn new(side: Side, kind: LadderKind, capacity: u32) -> Self {
        // One spare level so a full book can still move an order to a new price
        let capacity = capacity.saturating_add(1).min(NULL_INDEX - 1);
        match kind {
            LadderKind::Tree => Ladder::Tree(TreeLadder::new(side, capacity)),
            LadderKind::Array {
                base_price,
                tick_size,
                slots,
            } => Ladder::Array(ArrayLadder::new(side, base_price, tick_size, slots, capacity)),
        }
    }
}

macro_rules! dispatch {
    ($self:ident, $ladder:ident => $body:expr) => {
        match $self {
            Ladder::Tree($ladder) => $body,
            Ladder::Array($ladder) => $body,
        }
    };
}

impl SideBook for Ladder {
    #[inline]
    fn side(&self) -> Side {
        dispatch!(self, l => l.side())
    }

    #[inline]
    fn check_price(&self, price: u64) -> Result<(), BookError> {
        dispatch!(self, l => l.check_price(price))
    }

    #[inline]
    fn find_level(&self, price: u64) -> Option<ArenaIndex> {
        dispatch!(self, l => l.find_level(price))
    }

    #[inline]
    fn get_or_create_level(&mut self, price: u64) -> Result<ArenaIndex, BookError> {
        dispatch!(self, l => l.get_or_create_level(price))
    }

    #[inline]
    fn remove_level_if_empty(&mut self, level: ArenaIndex) -> bool {
        dispatch!(self, l => l.remove_level_if_empty(level))
    }

    #[inline]
    fn best_level(&self) -> Option<ArenaIndex> {
        dispatch!(self, l => l.best_level())
    }

    #[inline]
    fn next_worse(&self, level: ArenaIndex) -> Option<ArenaIndex> {
        dispatch!(self, l => l.next_worse(level))
    }

    #[inline]
    fn level(&self, level: ArenaIndex) -> &PriceLevel {
        dispatch!(self, l => l.level(level))
    }

    #[inline]
    fn level_mut(&mut self, level: ArenaIndex) -> &mut PriceLevel {
        dispatch!(self, l => l.level_mut(level))
    }

    #[inline]
    fn level_count(&self) -> usize {
        dispatch!(self, l => l.level_count())
    }

    fn clear(&mut self) {
        dispatch!(self, l => l.clear())
    }

    fn warm_up(&mut self) {
        dispatch!(self, l => l.warm_up())
    }
}

impl std::fmt::Debug for Ladder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self {
            Ladder::Tree(_) => "tree",
            Ladder::Array(_) => "array",
        };
        f.debug_struct("Ladder")
            .field("kind", &kind)
            .field("side", &self.side())
            .field("levels", &self.level_count())
            .field("best", &self.best().map(|l| l.price))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ladders(side: Side) -> Vec<Ladder> {
        vec![
            Ladder::new(side, LadderKind::Tree, 64),
            Ladder::new(
                side,
                LadderKind::Array {
                    base_price: 90,
                    tick_size: 1,
                    slots: 40,
                },
                64,
            ),
        ]
    }

    fn prices<S: SideBook>(ladder: &S) -> Vec<u64> {
        ladder.levels().map(|l| l.price).collect()
    }

    #[test]
    fn test_both_strategies_agree_on_order() {
        for side in [Side::Bid, Side::Ask] {
            for mut ladder in ladders(side) {
                for price in [100, 97, 104, 101, 99, 110] {
                    ladder.get_or_create_level(price).unwrap();
                }
                let expected = match side {
                    Side::Bid => vec![110, 104, 101, 100, 99, 97],
                    Side::Ask => vec![97, 99, 100, 101, 104, 110],
                };
                assert_eq!(prices(&ladder), expected, "{:?}", ladder);
            }
        }
    }

    #[test]
    fn test_best_advances_on_removal() {
        for mut ladder in ladders(Side::Ask) {
            let a = ladder.get_or_create_level(100).unwrap();
            let b = ladder.get_or_create_level(102).unwrap();
            ladder.get_or_create_level(105).unwrap();

            assert_eq!(ladder.best().map(|l| l.price), Some(100));
            assert!(ladder.remove_level_if_empty(a));
            assert_eq!(ladder.best().map(|l| l.price), Some(102));
            assert!(ladder.remove_level_if_empty(b));
            assert_eq!(ladder.best().map(|l| l.price), Some(105));
            assert_eq!(ladder.level_count(), 1);
        }
    }

    #[test]
    fn test_existing_level_is_reused() {
        for mut ladder in ladders(Side::Bid) {
            let a = ladder.get_or_create_level(100).unwrap();
            assert_eq!(ladder.get_or_create_level(100).unwrap(), a);
            assert_eq!(ladder.find_level(100), Some(a));
            assert_eq!(ladder.find_level(101), None);
            assert_eq!(ladder.level_count(), 1);
        }
    }

    #[test]
    fn test_non_empty_level_is_kept() {
        use crate::arena::{Arena, OrderNode};

        for mut ladder in ladders(Side::Bid) {
            let mut orders = Arena::new(4);
            let order = orders.alloc(OrderNode::new(1, Side::Bid, 100, 5, 1, 0)).unwrap();
            let level = ladder.get_or_create_level(100).unwrap();
            ladder.level_mut(level).push_back(&mut orders, order);

            assert!(!ladder.remove_level_if_empty(level));
            assert_eq!(ladder.best().map(|l| l.total_qty), Some(5));
        }
    }

    #[test]
    fn test_clear() {
        for mut ladder in ladders(Side::Bid) {
            ladder.get_or_create_level(100).unwrap();
            ladder.get_or_create_level(101).unwrap();
            ladder.clear();
            assert_eq!(ladder.level_count(), 0);
            assert!(ladder.best_level().is_none());
            assert_eq!(ladder.find_level(100), None);
            ladder.get_or_create_level(95).unwrap();
            assert_eq!(ladder.best().map(|l| l.price), Some(95));
        }
    }
}
