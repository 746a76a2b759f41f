//! Arena Allocator - O(1) slab allocator for order and level records.
//!
//! The arena pre-allocates a contiguous block of records at startup,
//! eliminating heap allocation in the hot path. Vacant records are threaded
//! into a free list through one of their own link fields, so allocation and
//! deallocation are a single pointer swap.

use std::fmt;

use crate::event::{OrderState, Side};

/// Sentinel value representing a null/invalid index (like nullptr)
pub const NULL_INDEX: u32 = u32::MAX;

/// Type alias for arena indices - our "compressed pointers"
/// Using u32 instead of 64-bit pointers halves metadata size,
/// doubling cache efficiency.
pub type ArenaIndex = u32;

/// A record that can live in an [`Arena`].
///
/// While a record is vacant, the arena borrows one of its index fields to
/// thread the free list.
pub trait Slot: Copy {
    /// A blank record, used to fill the arena and to scrub freed slots.
    fn vacant() -> Self;

    /// The index field that links vacant records together.
    fn free_link(&mut self) -> &mut ArenaIndex;
}

/// A single resting order - exactly 64 bytes (one cache line).
///
/// # Memory Layout
///
/// | Field      | Type       | Offset | Size |
/// |------------|------------|--------|------|
/// | price      | u64        | 0      | 8    |
/// | qty        | u32        | 8      | 4    |
/// | side       | Side       | 12     | 1    |
/// | state      | OrderState | 13     | 1    |
/// | (padding)  | -          | 14     | 2    |
/// | order_id   | u64        | 16     | 8    |
/// | sequence   | u64        | 24     | 8    |
/// | ts_event   | u64        | 32     | 8    |
/// | next       | u32        | 40     | 4    |
/// | prev       | u32        | 44     | 4    |
/// | level      | u32        | 48     | 4    |
/// | _reserved  | [u8;12]    | 52     | 12   |
/// | **Total**  |            |        | 64   |
#[repr(C)]
#[repr(align(64))]
#[derive(Clone, Copy)]
pub struct OrderNode {
    // === Hot Data ===
    /// Fixed-point price, already scaled by the feed
    pub price: u64,

    /// Remaining resting quantity
    pub qty: u32,

    /// Book side the order rests on
    pub side: Side,

    /// Lifecycle state (Active or PartiallyFilled while resting)
    pub state: OrderState,

    /// External order ID
    pub order_id: u64,

    /// Arrival sequence of the event that gave the order its queue position
    pub sequence: u64,

    /// Timestamp (ns) of the last event that touched the order
    pub ts_event: u64,

    // === Linkage ===
    /// Index of next order at same price level
    pub next: ArenaIndex,

    /// Index of previous order (enables O(1) cancel)
    pub prev: ArenaIndex,

    /// Index of the owning price level in its side's level arena
    pub level: ArenaIndex,

    pub _reserved: [u8; 12],
}

// Compile-time assertion: OrderNode must be exactly 64 bytes
const _: () = assert!(
    std::mem::size_of::<OrderNode>() == 64,
    "OrderNode must be exactly 64 bytes (one cache line)"
);

// Compile-time assertion: OrderNode must be 64-byte aligned
const _: () = assert!(
    std::mem::align_of::<OrderNode>() == 64,
    "OrderNode must be 64-byte aligned"
);

impl OrderNode {
    /// Create a new, unlinked order node
    #[inline]
    pub fn new(order_id: u64, side: Side, price: u64, qty: u32, sequence: u64, ts_event: u64) -> Self {
        Self {
            price,
            qty,
            side,
            state: OrderState::Active,
            order_id,
            sequence,
            ts_event,
            next: NULL_INDEX,
            prev: NULL_INDEX,
            level: NULL_INDEX,
            _reserved: [0u8; 12],
        }
    }

    /// Create an empty/uninitialized node (for free list)
    #[inline]
    pub const fn empty() -> Self {
        Self {
            price: 0,
            qty: 0,
            side: Side::Bid,
            state: OrderState::Active,
            order_id: 0,
            sequence: 0,
            ts_event: 0,
            next: NULL_INDEX,
            prev: NULL_INDEX,
            level: NULL_INDEX,
            _reserved: [0u8; 12],
        }
    }
}

impl Slot for OrderNode {
    #[inline]
    fn vacant() -> Self {
        Self::empty()
    }

    #[inline]
    fn free_link(&mut self) -> &mut ArenaIndex {
        &mut self.next
    }
}

impl fmt::Debug for OrderNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrderNode")
            .field("order_id", &self.order_id)
            .field("side", &self.side)
            .field("price", &self.price)
            .field("qty", &self.qty)
            .field("state", &self.state)
            .field("sequence", &self.sequence)
            .field("level", &self.level)
            .field("prev", &self.prev)
            .field("next", &self.next)
            .finish()
    }
}

/// Pre-allocated pool with O(1) allocation and deallocation.
///
/// Uses a free list threaded through each vacant record's [`Slot::free_link`].
/// No system calls or locks in the hot path.
pub struct Arena<T: Slot> {
    /// Contiguous block of pre-allocated records
    nodes: Vec<T>,

    /// Head of the free list (index of first available record)
    free_head: ArenaIndex,

    /// Number of currently allocated records
    allocated_count: u32,

    /// Total capacity
    capacity: u32,
}

impl<T: Slot> Arena<T> {
    /// Create a new arena with the specified capacity.
    ///
    /// # Panics
    /// Panics if capacity is not below `NULL_INDEX` (reserved as the null index)
    pub fn new(capacity: u32) -> Self {
        assert!(capacity < NULL_INDEX, "Capacity must be less than NULL_INDEX");

        let mut arena = Self {
            nodes: vec![T::vacant(); capacity as usize],
            free_head: NULL_INDEX,
            allocated_count: 0,
            capacity,
        };
        arena.thread_free_list();
        arena
    }

    /// Link every record into the free list in index order.
    fn thread_free_list(&mut self) {
        let capacity = self.capacity;
        for (i, node) in self.nodes.iter_mut().enumerate() {
            *node = T::vacant();
            let next = i as u32 + 1;
            *node.free_link() = if next < capacity { next } else { NULL_INDEX };
        }
        self.free_head = if capacity > 0 { 0 } else { NULL_INDEX };
        self.allocated_count = 0;
    }

    /// Allocate a record from the arena and initialise it with `value`.
    ///
    /// Returns `None` if the arena is full.
    ///
    /// # Complexity
    /// O(1) - pops from head of free list
    #[inline]
    pub fn alloc(&mut self, value: T) -> Option<ArenaIndex> {
        if self.free_head == NULL_INDEX {
            return None;
        }

        let index = self.free_head;
        let slot = &mut self.nodes[index as usize];
        self.free_head = *slot.free_link();
        *slot = value;
        self.allocated_count += 1;

        Some(index)
    }

    /// Return a record to the arena.
    ///
    /// The caller must ensure the index is currently allocated; a double free
    /// corrupts the free list.
    ///
    /// # Complexity
    /// O(1) - pushes to head of free list
    #[inline]
    pub fn free(&mut self, index: ArenaIndex) {
        debug_assert!(index < self.capacity, "Index out of bounds");
        debug_assert!(self.allocated_count > 0, "Double free detected");

        let slot = &mut self.nodes[index as usize];
        *slot = T::vacant();
        *slot.free_link() = self.free_head;
        self.free_head = index;
        self.allocated_count -= 1;
    }

    /// Get an immutable reference to a record.
    #[inline]
    pub fn get(&self, index: ArenaIndex) -> &T {
        debug_assert!(index < self.capacity, "Index out of bounds");
        &self.nodes[index as usize]
    }

    /// Get a mutable reference to a record.
    #[inline]
    pub fn get_mut(&mut self, index: ArenaIndex) -> &mut T {
        debug_assert!(index < self.capacity, "Index out of bounds");
        &mut self.nodes[index as usize]
    }

    /// Returns the number of currently allocated records.
    #[inline]
    pub fn allocated(&self) -> u32 {
        self.allocated_count
    }

    /// Returns the total capacity of the arena.
    #[inline]
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Returns true if no records are allocated.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.allocated_count == 0
    }

    /// Returns true if the arena is full (no free records).
    #[inline]
    pub fn is_full(&self) -> bool {
        self.free_head == NULL_INDEX
    }

    /// Release every record at once. O(capacity).
    pub fn reset(&mut self) {
        self.thread_free_list();
    }

    /// Pre-fault all memory pages (warm-up routine).
    ///
    /// Touches every record so the OS maps its page before the hot path
    /// needs it.
    pub fn warm_up(&mut self) {
        for node in &mut self.nodes {
            let value = *node;
            // Volatile write so the touch is not optimised away
            unsafe {
                std::ptr::write_volatile(node as *mut T, value);
            }
        }
    }
}

impl<T: Slot> fmt::Debug for Arena<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Arena")
            .field("capacity", &self.capacity)
            .field("allocated", &self.allocated_count)
            .field("free_head", &self.free_head)
            .finish()
    }
}
