//! Price Level - A FIFO queue of orders at a single price point.
//!
//! Implements a doubly-linked list using arena indices for O(1)
//! insertion, removal from head, and removal from arbitrary position.
//! Levels themselves live in a per-side arena and carry the structural
//! links their side structure needs.

use crate::arena::{Arena, ArenaIndex, OrderNode, Slot, NULL_INDEX};

/// A queue of orders at a specific price level.
///
/// Orders are kept in arrival (FIFO) order. The doubly-linked structure
/// enables O(1) removal from any position.
///
/// `parent`, `left`, `right` and `height` belong to the side structure: the
/// tree ladder uses them as AVL links, the array ladder uses `left`/`right`
/// as its lower-price/higher-price occupied neighbours.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PriceLevel {
    /// Price shared by every order in the queue
    pub price: u64,
    /// Total quantity across all orders at this level
    pub total_qty: u64,
    /// Index of the oldest order (highest priority)
    pub head: ArenaIndex,
    /// Index of the newest order
    pub tail: ArenaIndex,
    /// Number of orders at this level
    pub count: u32,

    pub parent: ArenaIndex,
    pub left: ArenaIndex,
    pub right: ArenaIndex,
    pub height: i8,
}

impl PriceLevel {
    /// Create a new empty, unlinked price level
    #[inline]
    pub const fn new(price: u64) -> Self {
        Self {
            price,
            total_qty: 0,
            head: NULL_INDEX,
            tail: NULL_INDEX,
            count: 0,
            parent: NULL_INDEX,
            left: NULL_INDEX,
            right: NULL_INDEX,
            height: 1,
        }
    }

    /// Returns true if there are no orders at this level
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Append an order to the tail of the queue (newest order).
    ///
    /// # Complexity
    /// O(1)
    #[inline]
    pub fn push_back(&mut self, orders: &mut Arena<OrderNode>, index: ArenaIndex) {
        let qty = orders.get(index).qty;

        if self.tail == NULL_INDEX {
            // Empty list: new node becomes both head and tail
            debug_assert!(self.head == NULL_INDEX);
            self.head = index;
            self.tail = index;
            let node = orders.get_mut(index);
            node.prev = NULL_INDEX;
            node.next = NULL_INDEX;
        } else {
            orders.get_mut(self.tail).next = index;
            let node = orders.get_mut(index);
            node.prev = self.tail;
            node.next = NULL_INDEX;
            self.tail = index;
        }

        self.count += 1;
        self.total_qty += qty as u64;
    }

    /// Remove an order from anywhere in the queue.
    ///
    /// Uses the order's own `prev`/`next` links, so no search is needed.
    ///
    /// # Returns
    /// `true` if the level is now empty, `false` otherwise.
    /// The order is NOT freed from the arena; caller must do that.
    ///
    /// # Complexity
    /// O(1)
    #[inline]
    pub fn remove(&mut self, orders: &mut Arena<OrderNode>, index: ArenaIndex) -> bool {
        let node = orders.get(index);
        let prev_idx = node.prev;
        let next_idx = node.next;
        let qty = node.qty;

        if prev_idx == NULL_INDEX {
            debug_assert!(self.head == index);
            self.head = next_idx;
        } else {
            orders.get_mut(prev_idx).next = next_idx;
        }

        if next_idx == NULL_INDEX {
            debug_assert!(self.tail == index);
            self.tail = prev_idx;
        } else {
            orders.get_mut(next_idx).prev = prev_idx;
        }

        self.count -= 1;
        self.total_qty -= qty as u64;

        // Clear the removed node's linkage
        let node = orders.get_mut(index);
        node.prev = NULL_INDEX;
        node.next = NULL_INDEX;

        self.count == 0
    }

    /// Update total quantity after a partial reduction.
    ///
    /// Call this after modifying an order's qty directly.
    #[inline]
    pub fn subtract_qty(&mut self, qty: u32) {
        debug_assert!(self.total_qty >= qty as u64);
        self.total_qty -= qty as u64;
    }
}

impl Slot for PriceLevel {
    #[inline]
    fn vacant() -> Self {
        Self::new(0)
    }

    #[inline]
    fn free_link(&mut self) -> &mut ArenaIndex {
        &mut self.parent
    }
}
