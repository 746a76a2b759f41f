//! Fuzz Test - Compares the book against a brute-force reference.
//!
//! The reference keeps orders in a flat map and per-price aggregates in
//! B-tree maps, recomputing queue order by sorting. Slow but obviously
//! correct.

use mbo_book::{Book, BookConfig, BookEvent, EventKind, LadderKind, LevelView, Side};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use std::collections::{BTreeMap, HashMap};

const MID: u64 = 10_000;

#[derive(Clone, Copy)]
struct RefOrder {
    side: Side,
    price: u64,
    qty: u32,
    /// Lower is earlier in the queue
    priority: u64,
}

/// Naive replica of the book's event semantics
#[derive(Default)]
struct ReferenceBook {
    orders: HashMap<u64, RefOrder>,
    /// price -> (qty, count), per side
    bids: BTreeMap<u64, (u64, u32)>,
    asks: BTreeMap<u64, (u64, u32)>,
    next_priority: u64,
}

impl ReferenceBook {
    fn levels(&mut self, side: Side) -> &mut BTreeMap<u64, (u64, u32)> {
        match side {
            Side::Bid => &mut self.bids,
            Side::Ask => &mut self.asks,
        }
    }

    fn rest(&mut self, order_id: u64, order: RefOrder) {
        let level = self.levels(order.side).entry(order.price).or_default();
        level.0 += order.qty as u64;
        level.1 += 1;
        self.orders.insert(order_id, order);
    }

    fn unrest(&mut self, order_id: u64) -> Option<RefOrder> {
        let order = self.orders.remove(&order_id)?;
        let levels = self.levels(order.side);
        let level = levels.get_mut(&order.price)?;
        level.0 -= order.qty as u64;
        level.1 -= 1;
        if level.1 == 0 {
            levels.remove(&order.price);
        }
        Some(order)
    }

    fn best(&self, side: Side) -> Option<LevelView> {
        let (&price, &(qty, count)) = match side {
            Side::Bid => self.bids.last_key_value()?,
            Side::Ask => self.asks.first_key_value()?,
        };
        Some(LevelView { price, qty, count })
    }

    fn volume(&self, side: Side, price: u64) -> u64 {
        let levels = match side {
            Side::Bid => &self.bids,
            Side::Ask => &self.asks,
        };
        levels.get(&price).map(|l| l.0).unwrap_or(0)
    }

    fn would_cross(&self, side: Side, price: u64) -> bool {
        match self.best(side.opposite()) {
            Some(opposite) => match side {
                Side::Bid => price >= opposite.price,
                Side::Ask => price <= opposite.price,
            },
            None => false,
        }
    }

    /// Returns whether the event was accepted.
    fn apply(&mut self, event: &BookEvent) -> bool {
        match event.kind {
            EventKind::Add => {
                if event.qty == 0
                    || self.orders.contains_key(&event.order_id)
                    || self.would_cross(event.side, event.price)
                {
                    return false;
                }
                self.next_priority += 1;
                let order = RefOrder {
                    side: event.side,
                    price: event.price,
                    qty: event.qty,
                    priority: self.next_priority,
                };
                self.rest(event.order_id, order);
                true
            }
            EventKind::Cancel | EventKind::Execute => {
                let Some(order) = self.orders.get(&event.order_id).copied() else {
                    return false;
                };
                let qty = match (event.kind, event.qty) {
                    (EventKind::Cancel, 0) => order.qty,
                    (_, qty) => qty,
                };
                if qty == 0 || qty > order.qty {
                    return false;
                }
                self.unrest(event.order_id);
                if qty < order.qty {
                    self.rest(event.order_id, RefOrder { qty: order.qty - qty, ..order });
                }
                true
            }
            EventKind::Modify => {
                let Some(order) = self.orders.get(&event.order_id).copied() else {
                    return false;
                };
                if event.qty == 0 || (event.price != order.price && self.would_cross(order.side, event.price)) {
                    return false;
                }
                let requeue = event.price != order.price || event.qty > order.qty;
                if requeue {
                    self.next_priority += 1;
                }
                self.unrest(event.order_id);
                let modified = RefOrder {
                    price: event.price,
                    qty: event.qty,
                    priority: if requeue { self.next_priority } else { order.priority },
                    ..order
                };
                self.rest(event.order_id, modified);
                true
            }
            EventKind::Clear => {
                self.orders.clear();
                self.bids.clear();
                self.asks.clear();
                true
            }
            EventKind::Trade => true,
        }
    }

    /// Order IDs in book order: bids best first, then asks, FIFO per level
    fn ordered_ids(&self) -> Vec<u64> {
        let mut all: Vec<(u64, &RefOrder)> = self.orders.iter().map(|(id, o)| (*id, o)).collect();
        all.sort_by_key(|(_, o)| {
            let (side_rank, price_rank) = match o.side {
                Side::Bid => (0, u64::MAX - o.price),
                Side::Ask => (1, o.price),
            };
            (side_rank, price_rank, o.priority)
        });
        all.into_iter().map(|(id, _)| id).collect()
    }
}

fn price_for(rng: &mut ChaCha8Rng, side: Side) -> u64 {
    match side {
        Side::Bid => MID + 3 - rng.gen_range(0..60),
        Side::Ask => MID + rng.gen_range(0..60) - 3,
    }
}

/// Random events over a narrow, overlapping price band so that crossings,
/// duplicates and unknown IDs all occur.
fn generate_events(seed: u64, count: usize) -> Vec<BookEvent> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut events = Vec::with_capacity(count);
    let mut next_id = 1u64;

    for sequence in 1..=count as u64 {
        let side = if rng.gen_bool(0.5) { Side::Bid } else { Side::Ask };
        let known_id = rng.gen_range(1..next_id.max(2));
        let event = match rng.gen_range(0..1000) {
            0..=449 => {
                // Occasional duplicate
                let order_id = if rng.gen_bool(0.02) { known_id } else { next_id };
                next_id += 1;
                let price = price_for(&mut rng, side);
                BookEvent::add(order_id, side, price, rng.gen_range(0..200), sequence)
            }
            450..=699 => {
                let qty = if rng.gen_bool(0.5) { 0 } else { rng.gen_range(1..150) };
                BookEvent::cancel(known_id, qty, sequence)
            }
            700..=849 => BookEvent::execute(known_id, rng.gen_range(0..150), sequence),
            850..=997 => {
                let price = price_for(&mut rng, side);
                BookEvent::modify(known_id, side, price, rng.gen_range(0..200), sequence)
            }
            998 => BookEvent { kind: EventKind::Trade, ..BookEvent::clear(sequence) },
            _ => BookEvent::clear(sequence),
        };
        events.push(event);
    }

    events
}

fn run_against_reference(config: BookConfig, seed: u64, count: usize) {
    let events = generate_events(seed, count);
    let mut book = Book::new(config);
    let mut reference = ReferenceBook::default();
    let mut accepted = 0usize;

    for (i, event) in events.iter().enumerate() {
        let expected = reference.apply(event);
        let actual = book.apply(event);
        assert_eq!(
            actual.is_ok(),
            expected,
            "event {} {:?}: book returned {:?}",
            i,
            event,
            actual
        );
        accepted += expected as usize;

        if i % 1000 == 0 {
            let bbo = book.bbo();
            assert_eq!(bbo.bid, reference.best(Side::Bid), "bid mismatch at event {}", i);
            assert_eq!(bbo.ask, reference.best(Side::Ask), "ask mismatch at event {}", i);
            assert_eq!(book.order_count(), reference.orders.len());
            assert!(!bbo.is_crossed());

            for price in (MID - 60)..(MID + 60) {
                for side in [Side::Bid, Side::Ask] {
                    let expected = reference.volume(side, price);
                    assert_eq!(book.volume_at_limit(side, price), expected, "volume at {}", price);
                }
            }
        }
        if i % 10_000 == 0 {
            let ids: Vec<u64> = book.orders().map(|o| o.order_id).collect();
            assert_eq!(ids, reference.ordered_ids(), "queue order mismatch at event {}", i);
        }
    }

    // Sanity: the generator must exercise both outcomes
    assert!(accepted > count / 4, "only {} of {} events accepted", accepted, count);
    assert!(accepted < count, "no rejections generated");
}

#[test]
fn test_tree_ladder_against_reference() {
    run_against_reference(BookConfig::default().with_capacity(100_000), 42, 100_000);
}

#[test]
fn test_array_ladder_against_reference() {
    let config = BookConfig::default().with_capacity(100_000).with_ladder(LadderKind::Array {
        base_price: MID - 100,
        tick_size: 1,
        slots: 200,
    });
    run_against_reference(config, 42, 100_000);
}

#[test]
fn test_multiple_seeds() {
    for seed in [7, 1234, 0xBEEF] {
        run_against_reference(BookConfig::default().with_capacity(100_000), seed, 20_000);
    }
}
