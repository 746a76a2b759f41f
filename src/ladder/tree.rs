//! AVL tree ladder.
//!
//! Levels are tree nodes in a per-side arena, linked by `parent`, `left`
//! and `right` indices and ordered by ascending price. A side hash map gives
//! O(1) access to existing levels; the tree only pays O(log M) when a price
//! appears or disappears.
//!
//! The best level is cached. In an AVL tree the extreme node has no child on
//! its outer side and at most a single leaf on its inner side, so the next
//! best level is one step away through the child or parent link.

use rustc_hash::FxHashMap;

use crate::arena::{Arena, ArenaIndex, NULL_INDEX};
use crate::error::BookError;
use crate::event::Side;
use crate::ladder::SideBook;
use crate::price_level::PriceLevel;

pub struct TreeLadder {
    side: Side,
    levels: Arena<PriceLevel>,
    by_price: FxHashMap<u64, ArenaIndex>,
    root: ArenaIndex,
    best: ArenaIndex,
}

impl TreeLadder {
    /// Create an empty tree able to hold `capacity` levels.
    pub fn new(side: Side, capacity: u32) -> Self {
        Self {
            side,
            levels: Arena::new(capacity),
            by_price: FxHashMap::default(),
            root: NULL_INDEX,
            best: NULL_INDEX,
        }
    }

    // ========================================================================
    // Node helpers
    // ========================================================================

    #[inline]
    fn node(&self, idx: ArenaIndex) -> &PriceLevel {
        self.levels.get(idx)
    }

    #[inline]
    fn node_mut(&mut self, idx: ArenaIndex) -> &mut PriceLevel {
        self.levels.get_mut(idx)
    }

    #[inline]
    fn height(&self, idx: ArenaIndex) -> i8 {
        if idx == NULL_INDEX {
            0
        } else {
            self.node(idx).height
        }
    }

    #[inline]
    fn balance_factor(&self, idx: ArenaIndex) -> i8 {
        let node = self.node(idx);
        self.height(node.left) - self.height(node.right)
    }

    #[inline]
    fn update_height(&mut self, idx: ArenaIndex) {
        let node = self.node(idx);
        let height = 1 + self.height(node.left).max(self.height(node.right));
        self.node_mut(idx).height = height;
    }

    /// Point whichever link referenced `old` at `new`.
    #[inline]
    fn replace_child(&mut self, parent: ArenaIndex, old: ArenaIndex, new: ArenaIndex) {
        if parent == NULL_INDEX {
            self.root = new;
        } else if self.node(parent).left == old {
            self.node_mut(parent).left = new;
        } else {
            debug_assert_eq!(self.node(parent).right, old);
            self.node_mut(parent).right = new;
        }
    }

    fn leftmost(&self, mut idx: ArenaIndex) -> ArenaIndex {
        while self.node(idx).left != NULL_INDEX {
            idx = self.node(idx).left;
        }
        idx
    }

    fn rightmost(&self, mut idx: ArenaIndex) -> ArenaIndex {
        while self.node(idx).right != NULL_INDEX {
            idx = self.node(idx).right;
        }
        idx
    }

    /// Next higher price, walking parent links when there is no right subtree.
    fn successor(&self, idx: ArenaIndex) -> ArenaIndex {
        let right = self.node(idx).right;
        if right != NULL_INDEX {
            return self.leftmost(right);
        }
        let mut child = idx;
        let mut parent = self.node(idx).parent;
        while parent != NULL_INDEX && self.node(parent).right == child {
            child = parent;
            parent = self.node(parent).parent;
        }
        parent
    }

    /// Next lower price.
    fn predecessor(&self, idx: ArenaIndex) -> ArenaIndex {
        let left = self.node(idx).left;
        if left != NULL_INDEX {
            return self.rightmost(left);
        }
        let mut child = idx;
        let mut parent = self.node(idx).parent;
        while parent != NULL_INDEX && self.node(parent).left == child {
            child = parent;
            parent = self.node(parent).parent;
        }
        parent
    }

    // ========================================================================
    // Rotations
    // ========================================================================

    fn rotate_left(&mut self, x: ArenaIndex) -> ArenaIndex {
        let y = self.node(x).right;
        let inner = self.node(y).left;
        let parent = self.node(x).parent;

        self.node_mut(x).right = inner;
        if inner != NULL_INDEX {
            self.node_mut(inner).parent = x;
        }

        self.node_mut(y).parent = parent;
        self.replace_child(parent, x, y);

        self.node_mut(y).left = x;
        self.node_mut(x).parent = y;

        self.update_height(x);
        self.update_height(y);
        y
    }

    fn rotate_right(&mut self, x: ArenaIndex) -> ArenaIndex {
        let y = self.node(x).left;
        let inner = self.node(y).right;
        let parent = self.node(x).parent;

        self.node_mut(x).left = inner;
        if inner != NULL_INDEX {
            self.node_mut(inner).parent = x;
        }

        self.node_mut(y).parent = parent;
        self.replace_child(parent, x, y);

        self.node_mut(y).right = x;
        self.node_mut(x).parent = y;

        self.update_height(x);
        self.update_height(y);
        y
    }

    /// Restore the AVL property at `idx`; returns the subtree's new root.
    fn rebalance(&mut self, idx: ArenaIndex) -> ArenaIndex {
        self.update_height(idx);
        let balance = self.balance_factor(idx);

        if balance > 1 {
            let left = self.node(idx).left;
            if self.balance_factor(left) < 0 {
                self.rotate_left(left);
            }
            return self.rotate_right(idx);
        }
        if balance < -1 {
            let right = self.node(idx).right;
            if self.balance_factor(right) > 0 {
                self.rotate_right(right);
            }
            return self.rotate_left(idx);
        }
        idx
    }

    /// Rebalance every node from `idx` up to the root.
    fn retrace(&mut self, mut idx: ArenaIndex) {
        while idx != NULL_INDEX {
            let top = self.rebalance(idx);
            idx = self.node(top).parent;
        }
    }

    // ========================================================================
    // Insertion / removal
    // ========================================================================

    fn insert(&mut self, price: u64) -> Result<ArenaIndex, BookError> {
        let idx = self
            .levels
            .alloc(PriceLevel::new(price))
            .ok_or(BookError::CapacityExhausted(self.levels.capacity()))?;

        if self.root == NULL_INDEX {
            self.root = idx;
        } else {
            let mut cursor = self.root;
            loop {
                let node = self.node(cursor);
                debug_assert_ne!(node.price, price, "price already in tree");
                let next = if price < node.price { node.left } else { node.right };
                if next == NULL_INDEX {
                    break;
                }
                cursor = next;
            }

            if price < self.node(cursor).price {
                self.node_mut(cursor).left = idx;
            } else {
                self.node_mut(cursor).right = idx;
            }
            self.node_mut(idx).parent = cursor;
            self.retrace(cursor);
        }

        self.by_price.insert(price, idx);
        if self.best == NULL_INDEX || self.side.is_better(price, self.node(self.best).price) {
            self.best = idx;
        }

        tracing::trace!(side = ?self.side, price, "level created");
        Ok(idx)
    }

    /// Replace the subtree rooted at `old` with the one rooted at `new`.
    fn transplant(&mut self, old: ArenaIndex, new: ArenaIndex) {
        let parent = self.node(old).parent;
        self.replace_child(parent, old, new);
        if new != NULL_INDEX {
            self.node_mut(new).parent = parent;
        }
    }

    /// Detach `z` from the tree, moving nodes rather than payloads so every
    /// other level keeps its index.
    fn unlink(&mut self, z: ArenaIndex) {
        let PriceLevel {
            left, right, parent, height, ..
        } = *self.node(z);

        let retrace_from = if left == NULL_INDEX {
            self.transplant(z, right);
            parent
        } else if right == NULL_INDEX {
            self.transplant(z, left);
            parent
        } else {
            let y = self.leftmost(right);
            let from = if self.node(y).parent != z {
                let y_parent = self.node(y).parent;
                let y_right = self.node(y).right;
                self.transplant(y, y_right);
                self.node_mut(y).right = right;
                self.node_mut(right).parent = y;
                y_parent
            } else {
                y
            };
            self.transplant(z, y);
            self.node_mut(y).left = left;
            self.node_mut(left).parent = y;
            self.node_mut(y).height = height;
            from
        };

        self.retrace(retrace_from);
    }
}

impl SideBook for TreeLadder {
    #[inline]
    fn side(&self) -> Side {
        self.side
    }

    #[inline]
    fn check_price(&self, _price: u64) -> Result<(), BookError> {
        Ok(())
    }

    #[inline]
    fn find_level(&self, price: u64) -> Option<ArenaIndex> {
        self.by_price.get(&price).copied()
    }

    #[inline]
    fn get_or_create_level(&mut self, price: u64) -> Result<ArenaIndex, BookError> {
        match self.find_level(price) {
            Some(idx) => Ok(idx),
            None => self.insert(price),
        }
    }

    fn remove_level_if_empty(&mut self, level: ArenaIndex) -> bool {
        if !self.node(level).is_empty() {
            return false;
        }

        if self.best == level {
            self.best = self.next_worse(level).unwrap_or(NULL_INDEX);
        }

        let price = self.node(level).price;
        self.unlink(level);
        self.by_price.remove(&price);
        self.levels.free(level);

        tracing::trace!(side = ?self.side, price, "level removed");
        true
    }

    #[inline]
    fn best_level(&self) -> Option<ArenaIndex> {
        (self.best != NULL_INDEX).then_some(self.best)
    }

    #[inline]
    fn next_worse(&self, level: ArenaIndex) -> Option<ArenaIndex> {
        let next = match self.side {
            Side::Bid => self.predecessor(level),
            Side::Ask => self.successor(level),
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
        self.by_price.len()
    }

    fn clear(&mut self) {
        self.levels.reset();
        self.by_price.clear();
        self.root = NULL_INDEX;
        self.best = NULL_INDEX;
    }

    fn warm_up(&mut self) {
        self.levels.warm_up();
    }
}
