//! Event types consumed by the book and the outcomes it reports.
//!
//! Events are normalized feed records, one per market-by-order message.
//! Outcomes describe what happened to the order an event touched.

use serde::{Deserialize, Serialize};

use crate::error::BookError;

/// Order side (bid = buy, ask = sell)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Side {
    /// Buy side (bids)
    Bid = 0,
    /// Sell side (asks)
    Ask = 1,
}

impl Side {
    /// Returns the opposite side
    #[inline]
    pub const fn opposite(self) -> Self {
        match self {
            Side::Bid => Side::Ask,
            Side::Ask => Side::Bid,
        }
    }

    /// True if `a` is a strictly better price than `b` on this side.
    #[inline]
    pub const fn is_better(self, a: u64, b: u64) -> bool {
        match self {
            Side::Bid => a > b,
            Side::Ask => a < b,
        }
    }
}

/// Lifecycle of a single order.
///
/// `Active` and `PartiallyFilled` are resting states; `Filled` and
/// `Cancelled` are terminal and only ever reported, never stored.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum OrderState {
    Active = 0,
    PartiallyFilled = 1,
    Filled = 2,
    Cancelled = 3,
}

impl OrderState {
    #[inline]
    pub const fn is_terminal(self) -> bool {
        matches!(self, OrderState::Filled | OrderState::Cancelled)
    }
}

/// What a feed record asks the book to do.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    /// Insert a new resting order
    Add,
    /// Withdraw some or all of a resting order (`qty == 0` means all)
    Cancel,
    /// Fill against a named resting order, already matched upstream
    Execute,
    /// Change price and/or size of a resting order
    Modify,
    /// Drop every resting order
    Clear,
    /// Trade print; carries no book change
    Trade,
}

impl TryFrom<char> for EventKind {
    type Error = BookError;

    /// Decode a market-by-order action code.
    fn try_from(action: char) -> Result<Self, Self::Error> {
        match action {
            'A' => Ok(EventKind::Add),
            'C' => Ok(EventKind::Cancel),
            'F' => Ok(EventKind::Execute),
            'M' => Ok(EventKind::Modify),
            'R' => Ok(EventKind::Clear),
            'T' => Ok(EventKind::Trade),
            other => Err(BookError::UnknownEventKind(other)),
        }
    }
}

/// A normalized feed record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BookEvent {
    pub kind: EventKind,
    pub order_id: u64,
    pub side: Side,
    /// Fixed-point price, already scaled upstream
    pub price: u64,
    pub qty: u32,
    /// Monotonic arrival counter
    pub sequence: u64,
    /// Event time in nanoseconds
    pub ts_event: u64,
}

impl BookEvent {
    pub fn add(order_id: u64, side: Side, price: u64, qty: u32, sequence: u64) -> Self {
        Self { kind: EventKind::Add, order_id, side, price, qty, sequence, ts_event: 0 }
    }

    /// A cancel of `qty`; pass 0 to cancel the whole order.
    pub fn cancel(order_id: u64, qty: u32, sequence: u64) -> Self {
        Self { kind: EventKind::Cancel, order_id, side: Side::Bid, price: 0, qty, sequence, ts_event: 0 }
    }

    pub fn execute(order_id: u64, qty: u32, sequence: u64) -> Self {
        Self { kind: EventKind::Execute, order_id, side: Side::Bid, price: 0, qty, sequence, ts_event: 0 }
    }

    pub fn modify(order_id: u64, side: Side, price: u64, qty: u32, sequence: u64) -> Self {
        Self { kind: EventKind::Modify, order_id, side, price, qty, sequence, ts_event: 0 }
    }

    pub fn clear(sequence: u64) -> Self {
        Self { kind: EventKind::Clear, order_id: 0, side: Side::Bid, price: 0, qty: 0, sequence, ts_event: 0 }
    }

    /// Set the event timestamp.
    pub fn at(mut self, ts_event: u64) -> Self {
        self.ts_event = ts_event;
        self
    }

    /// The order an Add event describes.
    pub fn new_order(&self) -> NewOrder {
        NewOrder {
            order_id: self.order_id,
            side: self.side,
            price: self.price,
            qty: self.qty,
            sequence: self.sequence,
            ts_event: self.ts_event,
        }
    }
}

/// An order about to be added to the book.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NewOrder {
    pub order_id: u64,
    pub side: Side,
    pub price: u64,
    pub qty: u32,
    pub sequence: u64,
    pub ts_event: u64,
}

/// The effect of one event on one order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Transition {
    pub order_id: u64,
    /// State after the event; terminal states mean the order left the book
    pub state: OrderState,
    /// Quantity still resting after the event
    pub remaining: u32,
    /// Quantity the event removed (0 for adds and priority-keeping modifies)
    pub removed: u32,
}

/// Result of applying one event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Applied {
    /// The event touched a single order
    Order(Transition),
    /// The book was cleared; carries the number of orders dropped
    Cleared(usize),
    /// The event has no effect on resting orders
    Skipped,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_side_opposite() {
        assert_eq!(Side::Bid.opposite(), Side::Ask);
        assert_eq!(Side::Ask.opposite(), Side::Bid);
    }

    #[test]
    fn test_is_better() {
        assert!(Side::Bid.is_better(101, 100));
        assert!(!Side::Bid.is_better(100, 100));
        assert!(Side::Ask.is_better(100, 101));
        assert!(!Side::Ask.is_better(101, 100));
    }

    #[test]
    fn test_action_codes() {
        assert_eq!(EventKind::try_from('A'), Ok(EventKind::Add));
        assert_eq!(EventKind::try_from('C'), Ok(EventKind::Cancel));
        assert_eq!(EventKind::try_from('F'), Ok(EventKind::Execute));
        assert_eq!(EventKind::try_from('M'), Ok(EventKind::Modify));
        assert_eq!(EventKind::try_from('R'), Ok(EventKind::Clear));
        assert_eq!(EventKind::try_from('T'), Ok(EventKind::Trade));
        assert_eq!(EventKind::try_from('X'), Err(BookError::UnknownEventKind('X')));
    }

    #[test]
    fn test_terminal_states() {
        assert!(!OrderState::Active.is_terminal());
        assert!(!OrderState::PartiallyFilled.is_terminal());
        assert!(OrderState::Filled.is_terminal());
        assert!(OrderState::Cancelled.is_terminal());
    }

    #[test]
    fn test_new_order_from_add() {
        let event = BookEvent::add(7, Side::Ask, 10_100, 5, 3).at(42);
        let order = event.new_order();
        assert_eq!(order.order_id, 7);
        assert_eq!(order.side, Side::Ask);
        assert_eq!(order.price, 10_100);
        assert_eq!(order.qty, 5);
        assert_eq!(order.sequence, 3);
        assert_eq!(order.ts_event, 42);
    }
}
