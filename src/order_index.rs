//! Order Index - O(1) mapping from external order ID to arena index.

use rustc_hash::FxHashMap;

use crate::arena::ArenaIndex;
use crate::error::BookError;

/// Mapping from OrderId to the order's slot in the order arena.
#[derive(Debug, Default)]
pub struct OrderIndex {
    map: FxHashMap<u64, ArenaIndex>,
}

impl OrderIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(orders: usize) -> Self {
        Self {
            map: FxHashMap::with_capacity_and_hasher(orders, Default::default()),
        }
    }

    /// Register an order. Fails if the ID is already resting.
    #[inline]
    pub fn insert(&mut self, order_id: u64, index: ArenaIndex) -> Result<(), BookError> {
        use std::collections::hash_map::Entry;

        match self.map.entry(order_id) {
            Entry::Occupied(_) => Err(BookError::DuplicateOrderId(order_id)),
            Entry::Vacant(slot) => {
                slot.insert(index);
                Ok(())
            }
        }
    }

    #[inline]
    pub fn lookup(&self, order_id: u64) -> Result<ArenaIndex, BookError> {
        self.map
            .get(&order_id)
            .copied()
            .ok_or(BookError::OrderNotFound(order_id))
    }

    #[inline]
    pub fn remove(&mut self, order_id: u64) -> Result<ArenaIndex, BookError> {
        self.map
            .remove(&order_id)
            .ok_or(BookError::OrderNotFound(order_id))
    }

    #[inline]
    pub fn contains(&self, order_id: u64) -> bool {
        self.map.contains_key(&order_id)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn clear(&mut self) {
        self.map.clear();
    }
}
