//! Order Book - the market-by-order book replicator.
//!
//! Owns the order arena, the order index and one side structure per side.
//! Every mutation validates first and mutates second, so a rejected event
//! leaves the book exactly as it was.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use crate::arena::{Arena, ArenaIndex, OrderNode, NULL_INDEX};
use crate::config::{BookConfig, CrossedBookPolicy};
use crate::error::BookError;
use crate::event::{Applied, BookEvent, EventKind, NewOrder, OrderState, Side, Transition};
use crate::ladder::{Ladder, SideBook};
use crate::order_index::OrderIndex;
use crate::snapshot::{Bbo, BookSnapshot, LevelView, OrderView};

/// Limit order book state rebuilt from a market-by-order event stream.
pub struct Book {
    config: BookConfig,
    /// Memory arena for order nodes
    orders: Arena<OrderNode>,
    /// Order lookup: OrderId -> arena index
    index: OrderIndex,
    bids: Ladder,
    asks: Ladder,
    /// Resting quantity per side
    bid_total: u64,
    ask_total: u64,
    last_sequence: Option<u64>,
}

impl Book {
    /// Create an empty book.
    ///
    /// # Panics
    /// Panics on a config that [`BookConfig::validate`] rejects.
    pub fn new(config: BookConfig) -> Self {
        let capacity = config.order_capacity;
        Self {
            config,
            orders: Arena::new(capacity),
            index: OrderIndex::with_capacity(capacity as usize),
            bids: Ladder::new(Side::Bid, config.ladder, capacity),
            asks: Ladder::new(Side::Ask, config.ladder, capacity),
            bid_total: 0,
            ask_total: 0,
            last_sequence: None,
        }
    }

    pub fn config(&self) -> &BookConfig {
        &self.config
    }

    /// The side structure for `side`.
    #[inline]
    pub fn ladder(&self, side: Side) -> &Ladder {
        match side {
            Side::Bid => &self.bids,
            Side::Ask => &self.asks,
        }
    }

    #[inline]
    fn total_mut(&mut self, side: Side) -> &mut u64 {
        match side {
            Side::Bid => &mut self.bid_total,
            Side::Ask => &mut self.ask_total,
        }
    }

    // ========================================================================
    // Event Entry Point
    // ========================================================================

    /// Apply one normalized feed event.
    ///
    /// Events must arrive in feed order. On error nothing changes, including
    /// the recorded sequence.
    pub fn apply(&mut self, event: &BookEvent) -> Result<Applied, BookError> {
        if self.config.check_sequence {
            if let Some(last) = self.last_sequence {
                if event.sequence < last {
                    return Err(BookError::SequenceRegression {
                        last,
                        got: event.sequence,
                    });
                }
            }
        }

        let ts = Some(event.ts_event);
        let applied = match event.kind {
            EventKind::Add => Applied::Order(self.add(event.new_order())?),
            EventKind::Cancel => {
                let qty = (event.qty != 0).then_some(event.qty);
                Applied::Order(self.reduce(event.order_id, qty, OrderState::Cancelled, ts)?)
            }
            EventKind::Execute => {
                Applied::Order(self.reduce(event.order_id, Some(event.qty), OrderState::Filled, ts)?)
            }
            EventKind::Modify => Applied::Order(self.modify(
                event.order_id,
                event.price,
                event.qty,
                event.sequence,
                event.ts_event,
            )?),
            EventKind::Clear => Applied::Cleared(self.clear()),
            EventKind::Trade => Applied::Skipped,
        };

        self.last_sequence = Some(event.sequence);
        Ok(applied)
    }

    // ========================================================================
    // Order Management
    // ========================================================================

    /// Add a resting order.
    pub fn add(&mut self, order: NewOrder) -> Result<Transition, BookError> {
        if order.qty == 0 {
            return Err(BookError::InvalidQuantity {
                order_id: order.order_id,
                requested: 0,
                resting: 0,
            });
        }
        if self.index.contains(order.order_id) {
            return Err(BookError::DuplicateOrderId(order.order_id));
        }
        self.ladder(order.side).check_price(order.price)?;
        self.check_cross(order.side, order.price)?;
        if self.orders.is_full() {
            return Err(BookError::CapacityExhausted(self.orders.capacity()));
        }

        let idx = self.rest(OrderNode::new(
            order.order_id,
            order.side,
            order.price,
            order.qty,
            order.sequence,
            order.ts_event,
        ))?;
        self.index.insert(order.order_id, idx)?;

        Ok(Transition {
            order_id: order.order_id,
            state: OrderState::Active,
            remaining: order.qty,
            removed: 0,
        })
    }

    /// Withdraw `qty` from a resting order, or all of it when `qty` is `None`.
    pub fn cancel(&mut self, order_id: u64, qty: Option<u32>) -> Result<Transition, BookError> {
        self.reduce(order_id, qty, OrderState::Cancelled, None)
    }

    /// Apply a fill of `qty` against a resting order. The fill was matched
    /// upstream; the book only records it.
    pub fn execute(&mut self, order_id: u64, qty: u32) -> Result<Transition, BookError> {
        self.reduce(order_id, Some(qty), OrderState::Filled, None)
    }

    /// Change the price and/or size of a resting order.
    ///
    /// A price change or a size increase sends the order to the back of the
    /// queue at its (new) price with the event's sequence; a pure size
    /// decrease keeps its place.
    pub fn modify(
        &mut self,
        order_id: u64,
        price: u64,
        qty: u32,
        sequence: u64,
        ts_event: u64,
    ) -> Result<Transition, BookError> {
        let idx = self.index.lookup(order_id)?;
        let node = *self.orders.get(idx);
        if qty == 0 {
            return Err(BookError::InvalidQuantity {
                order_id,
                requested: 0,
                resting: node.qty,
            });
        }

        let removed = node.qty.saturating_sub(qty);

        if price == node.price && qty <= node.qty {
            let ladder = match node.side {
                Side::Bid => &mut self.bids,
                Side::Ask => &mut self.asks,
            };
            ladder.level_mut(node.level).subtract_qty(removed);
            let order = self.orders.get_mut(idx);
            order.qty = qty;
            order.ts_event = ts_event;
            *self.total_mut(node.side) -= removed as u64;

            return Ok(Transition { order_id, state: node.state, remaining: qty, removed });
        }

        self.ladder(node.side).check_price(price)?;
        if price != node.price {
            self.check_cross(node.side, price)?;
        }

        // Create the target level first so the only fallible step happens
        // before the order leaves its current queue.
        if price != node.price {
            let ladder = match node.side {
                Side::Bid => &mut self.bids,
                Side::Ask => &mut self.asks,
            };
            ladder.get_or_create_level(price)?;
        }

        self.unlink(idx);
        let mut requeued = node;
        requeued.price = price;
        requeued.qty = qty;
        requeued.sequence = sequence;
        requeued.ts_event = ts_event;
        requeued.next = NULL_INDEX;
        requeued.prev = NULL_INDEX;
        requeued.level = NULL_INDEX;
        *self.orders.get_mut(idx) = requeued;
        self.link(idx)?;

        Ok(Transition { order_id, state: node.state, remaining: qty, removed })
    }

    /// Remove every resting order. Returns how many were dropped.
    pub fn clear(&mut self) -> usize {
        let dropped = self.index.len();
        self.orders.reset();
        self.index.clear();
        self.bids.clear();
        self.asks.clear();
        self.bid_total = 0;
        self.ask_total = 0;
        tracing::debug!(dropped, "book cleared");
        dropped
    }

    /// Shared cancel/execute path.
    fn reduce(
        &mut self,
        order_id: u64,
        qty: Option<u32>,
        terminal: OrderState,
        ts_event: Option<u64>,
    ) -> Result<Transition, BookError> {
        let idx = self.index.lookup(order_id)?;
        let node = *self.orders.get(idx);
        let qty = qty.unwrap_or(node.qty);

        if qty == 0 || qty > node.qty {
            return Err(BookError::InvalidQuantity {
                order_id,
                requested: qty,
                resting: node.qty,
            });
        }

        let remaining = node.qty - qty;
        if remaining == 0 {
            self.unlink(idx);
            self.index.remove(order_id)?;
            self.orders.free(idx);
            return Ok(Transition { order_id, state: terminal, remaining, removed: qty });
        }

        // Partial reduction keeps queue position
        let ladder = match node.side {
            Side::Bid => &mut self.bids,
            Side::Ask => &mut self.asks,
        };
        ladder.level_mut(node.level).subtract_qty(qty);
        let order = self.orders.get_mut(idx);
        order.qty = remaining;
        order.state = OrderState::PartiallyFilled;
        if let Some(ts) = ts_event {
            order.ts_event = ts;
        }
        *self.total_mut(node.side) -= qty as u64;

        Ok(Transition {
            order_id,
            state: OrderState::PartiallyFilled,
            remaining,
            removed: qty,
        })
    }

    /// Allocate `node` and queue it at its price.
    fn rest(&mut self, node: OrderNode) -> Result<ArenaIndex, BookError> {
        let ladder = match node.side {
            Side::Bid => &mut self.bids,
            Side::Ask => &mut self.asks,
        };
        let level = ladder.get_or_create_level(node.price)?;

        let Some(idx) = self.orders.alloc(node) else {
            ladder.remove_level_if_empty(level);
            return Err(BookError::CapacityExhausted(self.orders.capacity()));
        };

        ladder.level_mut(level).push_back(&mut self.orders, idx);
        self.orders.get_mut(idx).level = level;
        *self.total_mut(node.side) += node.qty as u64;
        Ok(idx)
    }

    /// Queue an already allocated order at its price.
    fn link(&mut self, idx: ArenaIndex) -> Result<(), BookError> {
        let node = *self.orders.get(idx);
        let ladder = match node.side {
            Side::Bid => &mut self.bids,
            Side::Ask => &mut self.asks,
        };
        let level = ladder.get_or_create_level(node.price)?;
        ladder.level_mut(level).push_back(&mut self.orders, idx);
        self.orders.get_mut(idx).level = level;
        *self.total_mut(node.side) += node.qty as u64;
        Ok(())
    }

    /// Take an order out of its level queue, dropping the level if it empties.
    /// The order stays allocated.
    fn unlink(&mut self, idx: ArenaIndex) {
        let node = *self.orders.get(idx);
        let ladder = match node.side {
            Side::Bid => &mut self.bids,
            Side::Ask => &mut self.asks,
        };
        if ladder.level_mut(node.level).remove(&mut self.orders, idx) {
            ladder.remove_level_if_empty(node.level);
        }
        *self.total_mut(node.side) -= node.qty as u64;
    }

    /// Would a resting order at `price` on `side` lock or cross the book?
    fn check_cross(&self, side: Side, price: u64) -> Result<(), BookError> {
        let Some(opposite) = self.ladder(side.opposite()).best() else {
            return Ok(());
        };
        let (bid, ask) = match side {
            Side::Bid => (price, opposite.price),
            Side::Ask => (opposite.price, price),
        };
        if bid < ask {
            return Ok(());
        }

        match self.config.crossed_book {
            CrossedBookPolicy::Reject => Err(BookError::CrossedBookDetected { bid, ask }),
            CrossedBookPolicy::Allow => {
                tracing::debug!(bid, ask, "book crossed");
                Ok(())
            }
        }
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Best bid and best ask levels. Empty sides are `None`.
    #[inline]
    pub fn bbo(&self) -> Bbo {
        Bbo {
            bid: self.bids.best().map(LevelView::from),
            ask: self.asks.best().map(LevelView::from),
        }
    }

    #[inline]
    pub fn best_bid(&self) -> Option<u64> {
        self.bids.best().map(|l| l.price)
    }

    #[inline]
    pub fn best_ask(&self) -> Option<u64> {
        self.asks.best().map(|l| l.price)
    }

    /// Calculate spread (best_ask - best_bid)
    pub fn spread(&self) -> Option<u64> {
        self.bbo().spread()
    }

    /// Resting quantity at one price, 0 if there is no level there.
    #[inline]
    pub fn volume_at_limit(&self, side: Side, price: u64) -> u64 {
        let ladder = self.ladder(side);
        ladder
            .find_level(price)
            .map(|idx| ladder.level(idx).total_qty)
            .unwrap_or(0)
    }

    /// Up to `levels` price levels on `side`, best first.
    pub fn depth(&self, side: Side, levels: usize) -> Vec<LevelView> {
        self.ladder(side)
            .levels()
            .take(levels)
            .map(LevelView::from)
            .collect()
    }

    /// Immutable copy of the top `levels` of both sides.
    pub fn snapshot(&self, levels: usize) -> BookSnapshot {
        BookSnapshot {
            sequence: self.last_sequence,
            bids: self.depth(Side::Bid, levels),
            asks: self.depth(Side::Ask, levels),
            bid_total: self.bid_total,
            ask_total: self.ask_total,
            order_count: self.order_count(),
        }
    }

    /// A resting order by ID.
    pub fn lookup(&self, order_id: u64) -> Result<OrderView, BookError> {
        let idx = self.index.lookup(order_id)?;
        Ok(OrderView::from(self.orders.get(idx)))
    }

    #[inline]
    pub fn contains(&self, order_id: u64) -> bool {
        self.index.contains(order_id)
    }

    /// Every resting order: bids best to worst, then asks best to worst,
    /// FIFO within each level.
    pub fn orders(&self) -> Orders<'_> {
        Orders {
            book: self,
            side: Some(Side::Bid),
            level: NULL_INDEX,
            order: NULL_INDEX,
        }
    }

    /// Total resting quantity on a side.
    #[inline]
    pub fn total_qty(&self, side: Side) -> u64 {
        match side {
            Side::Bid => self.bid_total,
            Side::Ask => self.ask_total,
        }
    }

    pub fn level_count(&self, side: Side) -> usize {
        self.ladder(side).level_count()
    }

    /// Get the total number of orders in the book
    pub fn order_count(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Sequence of the last successfully applied event.
    pub fn last_sequence(&self) -> Option<u64> {
        self.last_sequence
    }

    /// Pre-fault arena memory pages
    pub fn warm_up(&mut self) {
        self.orders.warm_up();
        self.bids.warm_up();
        self.asks.warm_up();
    }

    /// Hash of every resting order in book order (for determinism testing)
    pub fn state_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        for order in self.orders() {
            order.order_id.hash(&mut hasher);
            order.side.hash(&mut hasher);
            order.price.hash(&mut hasher);
            order.qty.hash(&mut hasher);
        }
        self.bid_total.hash(&mut hasher);
        self.ask_total.hash(&mut hasher);
        hasher.finish()
    }
}

impl Default for Book {
    fn default() -> Self {
        Self::new(BookConfig::default())
    }
}

impl std::fmt::Debug for Book {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Book")
            .field("best_bid", &self.best_bid())
            .field("best_ask", &self.best_ask())
            .field("bid_levels", &self.bids.level_count())
            .field("ask_levels", &self.asks.level_count())
            .field("order_count", &self.order_count())
            .field("last_sequence", &self.last_sequence)
            .finish()
    }
}

/// Iterator over resting orders. See [`Book::orders`].
pub struct Orders<'a> {
    book: &'a Book,
    side: Option<Side>,
    level: ArenaIndex,
    order: ArenaIndex,
}

impl Iterator for Orders<'_> {
    type Item = OrderView;

    fn next(&mut self) -> Option<OrderView> {
        loop {
            let side = self.side?;

            if self.order != NULL_INDEX {
                let node = self.book.orders.get(self.order);
                self.order = node.next;
                return Some(OrderView::from(node));
            }

            let ladder = self.book.ladder(side);
            let next_level = if self.level == NULL_INDEX {
                ladder.best_level()
            } else {
                ladder.next_worse(self.level)
            };

            match next_level {
                Some(level) => {
                    self.level = level;
                    self.order = ladder.level(level).head;
                }
                None => {
                    self.side = match side {
                        Side::Bid => Some(Side::Ask),
                        Side::Ask => None,
                    };
                    self.level = NULL_INDEX;
                }
            }
        }
    }
}
