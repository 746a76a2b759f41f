//! Read-side views of the book.
//!
//! The book has a single writer. Readers on other threads either share it
//! behind a lock ([`SharedBook`]) or read immutable depth snapshots that the
//! writer republishes at a fixed cadence ([`SnapshotPublisher`]).

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::Serialize;

use crate::arena::OrderNode;
use crate::event::{OrderState, Side};
use crate::order_book::Book;
use crate::price_level::PriceLevel;

/// Aggregate view of one price level.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct LevelView {
    pub price: u64,
    /// Total resting quantity
    pub qty: u64,
    /// Number of resting orders
    pub count: u32,
}

impl From<&PriceLevel> for LevelView {
    #[inline]
    fn from(level: &PriceLevel) -> Self {
        Self {
            price: level.price,
            qty: level.total_qty,
            count: level.count,
        }
    }
}

/// A resting order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct OrderView {
    pub order_id: u64,
    pub side: Side,
    pub price: u64,
    pub qty: u32,
    pub state: OrderState,
    /// Sequence of the event that gave the order its queue position
    pub sequence: u64,
    pub ts_event: u64,
}

impl From<&OrderNode> for OrderView {
    #[inline]
    fn from(node: &OrderNode) -> Self {
        Self {
            order_id: node.order_id,
            side: node.side,
            price: node.price,
            qty: node.qty,
            state: node.state,
            sequence: node.sequence,
            ts_event: node.ts_event,
        }
    }
}

/// Best bid and offer. An empty side is `None`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Bbo {
    pub bid: Option<LevelView>,
    pub ask: Option<LevelView>,
}

impl Bbo {
    /// best ask - best bid, `None` unless both sides are populated and the
    /// book is not crossed.
    pub fn spread(&self) -> Option<u64> {
        let (bid, ask) = (self.bid?, self.ask?);
        ask.price.checked_sub(bid.price)
    }

    /// True when both sides are populated and bid >= ask.
    pub fn is_crossed(&self) -> bool {
        matches!((self.bid, self.ask), (Some(b), Some(a)) if b.price >= a.price)
    }
}

/// Immutable top-of-book depth at one point in the event stream.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct BookSnapshot {
    /// Sequence of the last event applied before the snapshot was taken
    pub sequence: Option<u64>,
    /// Best to worst
    pub bids: Vec<LevelView>,
    /// Best to worst
    pub asks: Vec<LevelView>,
    pub bid_total: u64,
    pub ask_total: u64,
    pub order_count: usize,
}

impl BookSnapshot {
    pub fn bbo(&self) -> Bbo {
        Bbo {
            bid: self.bids.first().copied(),
            ask: self.asks.first().copied(),
        }
    }
}

/// A book shared between one writer and any number of readers.
///
/// The writer holds the write lock for the duration of one event, so
/// readers never observe a half-applied event. A panic while a guard is
/// held cannot leave the book torn (every mutation validates before it
/// writes), so a poisoned lock is recovered rather than propagated.
#[derive(Clone, Debug)]
pub struct SharedBook {
    inner: Arc<RwLock<Book>>,
}

impl SharedBook {
    pub fn new(book: Book) -> Self {
        Self {
            inner: Arc::new(RwLock::new(book)),
        }
    }

    pub fn read(&self) -> RwLockReadGuard<'_, Book> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, Book> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Writer half of the snapshot channel. Owned by the engine.
#[derive(Debug)]
pub struct SnapshotPublisher {
    slot: Arc<RwLock<Arc<BookSnapshot>>>,
    cadence: u64,
    depth: usize,
    pending: u64,
}

impl SnapshotPublisher {
    /// Publish a `depth`-level snapshot every `cadence` applied events.
    ///
    /// A cadence of 0 is treated as 1.
    pub fn new(cadence: u64, depth: usize) -> (Self, SnapshotReader) {
        let slot = Arc::new(RwLock::new(Arc::new(BookSnapshot::default())));
        let reader = SnapshotReader { slot: Arc::clone(&slot) };
        let publisher = Self {
            slot,
            cadence: cadence.max(1),
            depth,
            pending: 0,
        };
        (publisher, reader)
    }

    /// Count one applied event, republishing if the cadence is reached.
    /// Returns whether a snapshot was published.
    #[inline]
    pub fn on_event(&mut self, book: &Book) -> bool {
        self.pending += 1;
        if self.pending < self.cadence {
            return false;
        }
        self.publish(book);
        true
    }

    /// Publish immediately and restart the cadence.
    pub fn publish(&mut self, book: &Book) {
        let snapshot = Arc::new(book.snapshot(self.depth));
        *self.slot.write().unwrap_or_else(PoisonError::into_inner) = snapshot;
        self.pending = 0;
    }
}

/// Reader half of the snapshot channel. Cheap to clone.
#[derive(Clone, Debug)]
pub struct SnapshotReader {
    slot: Arc<RwLock<Arc<BookSnapshot>>>,
}

impl SnapshotReader {
    /// The latest published snapshot. Holding it does not block the writer.
    pub fn latest(&self) -> Arc<BookSnapshot> {
        Arc::clone(&self.slot.read().unwrap_or_else(PoisonError::into_inner))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BookConfig;
    use crate::event::NewOrder;

    fn order(order_id: u64, side: Side, price: u64, qty: u32) -> NewOrder {
        NewOrder { order_id, side, price, qty, sequence: order_id, ts_event: 0 }
    }

    #[test]
    fn test_bbo_spread() {
        let level = |price| Some(LevelView { price, qty: 1, count: 1 });
        assert_eq!(Bbo::default().spread(), None);
        assert_eq!(Bbo { bid: level(100), ask: None }.spread(), None);
        assert_eq!(Bbo { bid: level(100), ask: level(103) }.spread(), Some(3));

        let crossed = Bbo { bid: level(104), ask: level(103) };
        assert!(crossed.is_crossed());
        assert_eq!(crossed.spread(), None);
    }

    #[test]
    fn test_publisher_cadence() {
        let mut book = Book::new(BookConfig::default().with_capacity(16));
        let (mut publisher, reader) = SnapshotPublisher::new(2, 5);
        assert_eq!(reader.latest().order_count, 0);

        book.add(order(1, Side::Bid, 100, 10)).unwrap();
        assert!(!publisher.on_event(&book));
        assert_eq!(reader.latest().order_count, 0);

        book.add(order(2, Side::Ask, 101, 4)).unwrap();
        assert!(publisher.on_event(&book));

        let snapshot = reader.latest();
        assert_eq!(snapshot.order_count, 2);
        assert_eq!(snapshot.bbo(), book.bbo());
    }

    #[test]
    fn test_held_snapshot_is_immutable() {
        let mut book = Book::new(BookConfig::default().with_capacity(16));
        let (mut publisher, reader) = SnapshotPublisher::new(1, 5);

        book.add(order(1, Side::Bid, 100, 10)).unwrap();
        publisher.on_event(&book);
        let held = reader.latest();

        book.cancel(1, None).unwrap();
        publisher.on_event(&book);

        assert_eq!(held.bids.len(), 1);
        assert!(reader.latest().bids.is_empty());
    }

    #[test]
    fn test_shared_book_across_threads() {
        let shared = SharedBook::new(Book::new(BookConfig::default().with_capacity(16)));
        shared.write().add(order(1, Side::Ask, 105, 3)).unwrap();

        let reader = shared.clone();
        let best = std::thread::spawn(move || reader.read().best_ask())
            .join()
            .unwrap();
        assert_eq!(best, Some(105));
    }
}
