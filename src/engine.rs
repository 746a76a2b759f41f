//! Engine - Main event loop with CPU pinning and warm-up.
//!
//! Wraps the book with outcome accounting, snapshot publishing, and (with
//! the `runtime` feature) I/O via rtrb ring buffers.

use crate::config::BookConfig;
use crate::error::BookError;
use crate::event::{Applied, BookEvent};
use crate::order_book::Book;
use crate::snapshot::{Bbo, SnapshotPublisher, SnapshotReader};

/// Per-outcome event counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EngineStats {
    /// Events that changed the book
    pub applied: u64,
    /// Events the book refused
    pub rejected: u64,
    /// Book-neutral events (trades)
    pub skipped: u64,
    /// Results lost because the output ring was full (`runtime` loop only)
    pub dropped_results: u64,
}

impl EngineStats {
    /// Events processed, whatever their outcome.
    pub fn total(&self) -> u64 {
        self.applied + self.rejected + self.skipped
    }
}

/// The single writer in front of a [`Book`].
pub struct Engine {
    /// The underlying book
    pub book: Book,
    publisher: Option<SnapshotPublisher>,
    stats: EngineStats,
}

impl Engine {
    pub fn new(config: BookConfig) -> Self {
        Self {
            book: Book::new(config),
            publisher: None,
            stats: EngineStats::default(),
        }
    }

    /// Start publishing `depth`-level snapshots every `cadence` processed
    /// events. The first snapshot is published immediately.
    pub fn publish_every(&mut self, cadence: u64, depth: usize) -> SnapshotReader {
        let (mut publisher, reader) = SnapshotPublisher::new(cadence, depth);
        publisher.publish(&self.book);
        self.publisher = Some(publisher);
        reader
    }

    /// Run the engine event loop.
    ///
    /// # Arguments
    /// * `input` - Consumer end of the event ring buffer
    /// * `output` - Producer end of the per-event result ring buffer
    /// * `pin_to_core` - Whether to pin to the last available CPU core
    ///
    /// # Note
    /// This function runs forever (until the program terminates).
    #[cfg(feature = "runtime")]
    pub fn run(
        &mut self,
        input: &mut rtrb::Consumer<BookEvent>,
        output: &mut rtrb::Producer<Result<Applied, BookError>>,
        pin_to_core: bool,
    ) {
        // Pin to isolated CPU core
        if pin_to_core {
            self.pin_to_core();
        }

        self.warm_up();
        tracing::info!(capacity = self.book.config().order_capacity, "engine running");

        // Main event loop (busy-wait)
        loop {
            self.drain(input, output);
            std::hint::spin_loop();
        }
    }

    /// Process every event currently queued on `input`, returning how many
    /// were processed.
    ///
    /// Results go to `output` best effort: when the ring is full the result
    /// is dropped and counted in [`EngineStats::dropped_results`].
    #[cfg(feature = "runtime")]
    pub fn drain(
        &mut self,
        input: &mut rtrb::Consumer<BookEvent>,
        output: &mut rtrb::Producer<Result<Applied, BookError>>,
    ) -> usize {
        let mut processed = 0;
        while let Ok(event) = input.pop() {
            let result = self.process(&event);
            if let Err(rtrb::PushError::Full(result)) = output.push(result) {
                self.stats.dropped_results += 1;
                tracing::trace!(sequence = event.sequence, ?result, "output ring full, result dropped");
            }
            processed += 1;
        }
        processed
    }

    /// Apply one event, count its outcome and publish if due.
    ///
    /// This is the main entry point for synchronous usage (testing, replay,
    /// benchmarks). Rejections are logged and returned; the engine keeps
    /// going either way.
    #[inline]
    pub fn process(&mut self, event: &BookEvent) -> Result<Applied, BookError> {
        let result = self.book.apply(event);
        match &result {
            Ok(Applied::Skipped) => self.stats.skipped += 1,
            Ok(_) => self.stats.applied += 1,
            Err(err) => {
                self.stats.rejected += 1;
                tracing::warn!(
                    sequence = event.sequence,
                    order_id = event.order_id,
                    kind = ?event.kind,
                    error = %err,
                    "event rejected"
                );
            }
        }
        if let Some(publisher) = self.publisher.as_mut() {
            publisher.on_event(&self.book);
        }
        result
    }

    /// Pin the current thread to the last available CPU core.
    ///
    /// The last core is typically isolated from OS interrupts.
    pub fn pin_to_core(&self) {
        if let Some(core_ids) = core_affinity::get_core_ids() {
            if let Some(last_core) = core_ids.last() {
                if core_affinity::set_for_current(*last_core) {
                    tracing::debug!(core = last_core.id, "engine pinned");
                }
            }
        }
    }

    /// Warm up the engine by pre-faulting memory pages.
    pub fn warm_up(&mut self) {
        self.book.warm_up();
    }

    pub fn stats(&self) -> EngineStats {
        self.stats
    }

    #[inline]
    pub fn bbo(&self) -> Bbo {
        self.book.bbo()
    }

    #[inline]
    pub fn best_bid(&self) -> Option<u64> {
        self.book.best_bid()
    }

    #[inline]
    pub fn best_ask(&self) -> Option<u64> {
        self.book.best_ask()
    }

    #[inline]
    pub fn spread(&self) -> Option<u64> {
        self.book.spread()
    }

    #[inline]
    pub fn order_count(&self) -> usize {
        self.book.order_count()
    }

    /// Compute state hash for determinism testing.
    #[inline]
    pub fn state_hash(&self) -> u64 {
        self.book.state_hash()
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(BookConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{EventKind, Side};

    fn engine() -> Engine {
        Engine::new(BookConfig::default().with_capacity(1_000))
    }

    #[test]
    fn test_engine_creation() {
        let engine = engine();
        assert_eq!(engine.order_count(), 0);
        assert_eq!(engine.best_bid(), None);
        assert_eq!(engine.best_ask(), None);
        assert_eq!(engine.stats().total(), 0);
    }

    #[test]
    fn test_engine_counts_outcomes() {
        let mut engine = engine();

        assert!(engine.process(&BookEvent::add(1, Side::Bid, 10_000, 100, 1)).is_ok());
        assert!(engine.process(&BookEvent::add(1, Side::Bid, 10_000, 100, 2)).is_err());
        let trade = BookEvent { kind: EventKind::Trade, ..BookEvent::clear(3) };
        assert_eq!(engine.process(&trade), Ok(Applied::Skipped));
        assert!(engine.process(&BookEvent::cancel(1, 0, 4)).is_ok());

        assert_eq!(
            engine.stats(),
            EngineStats { applied: 2, rejected: 1, skipped: 1, dropped_results: 0 }
        );
        assert_eq!(engine.order_count(), 0);
    }

    #[test]
    fn test_engine_publishes_snapshots() {
        let mut engine = engine();
        let reader = engine.publish_every(2, 10);
        assert_eq!(reader.latest().order_count, 0);

        engine.process(&BookEvent::add(1, Side::Ask, 10_100, 5, 1)).unwrap();
        assert_eq!(reader.latest().order_count, 0);

        // Rejected events still count towards the cadence
        let _ = engine.process(&BookEvent::execute(9, 1, 2));
        let snapshot = reader.latest();
        assert_eq!(snapshot.order_count, 1);
        assert_eq!(snapshot.sequence, Some(1));
        assert_eq!(snapshot.bbo(), engine.bbo());
    }

    #[test]
    fn test_engine_state_hash_determinism() {
        let mut engine1 = engine();
        let mut engine2 = engine();

        for i in 0..100u64 {
            let side = if i % 2 == 0 { Side::Bid } else { Side::Ask };
            let price = match side {
                Side::Bid => 10_000 - (i % 10) * 10,
                Side::Ask => 10_010 + (i % 10) * 10,
            };
            let event = BookEvent::add(i, side, price, 100, i);
            engine1.process(&event).unwrap();
            engine2.process(&event).unwrap();
        }

        assert_eq!(engine1.state_hash(), engine2.state_hash());
    }

    #[test]
    fn test_engine_warm_up() {
        let mut engine = engine();
        engine.warm_up(); // Should not panic
    }

    #[cfg(feature = "runtime")]
    #[test]
    fn test_engine_ring_buffers() {
        let (mut event_tx, mut event_rx) = rtrb::RingBuffer::<BookEvent>::new(16);
        let (mut result_tx, mut result_rx) = rtrb::RingBuffer::new(16);

        event_tx.push(BookEvent::add(1, Side::Bid, 10_000, 10, 1)).unwrap();
        event_tx.push(BookEvent::execute(2, 1, 2)).unwrap();

        std::thread::spawn(move || {
            let mut engine = Engine::new(BookConfig::default().with_capacity(64));
            engine.run(&mut event_rx, &mut result_tx, false);
        });

        let mut results = Vec::new();
        while results.len() < 2 {
            if let Ok(result) = result_rx.pop() {
                results.push(result);
            }
            std::hint::spin_loop();
        }
        assert!(matches!(results[0], Ok(Applied::Order(_))));
        assert_eq!(results[1], Err(BookError::OrderNotFound(2)));
    }

    #[cfg(feature = "runtime")]
    #[test]
    fn test_engine_counts_dropped_results() {
        let (mut event_tx, mut event_rx) = rtrb::RingBuffer::<BookEvent>::new(16);
        let (mut result_tx, mut result_rx) = rtrb::RingBuffer::new(1);
        let mut engine = engine();

        event_tx.push(BookEvent::add(1, Side::Bid, 10_000, 10, 1)).unwrap();
        event_tx.push(BookEvent::add(2, Side::Bid, 10_000, 10, 2)).unwrap();
        event_tx.push(BookEvent::execute(9, 1, 3)).unwrap();

        assert_eq!(engine.drain(&mut event_rx, &mut result_tx), 3);
        let stats = engine.stats();
        assert_eq!(stats.total(), 3);
        assert_eq!(stats.dropped_results, 2);
        // Dropped results were still applied
        assert_eq!(engine.order_count(), 2);

        assert!(matches!(result_rx.pop(), Ok(Ok(Applied::Order(_)))));
        assert!(result_rx.pop().is_err());
    }
}
