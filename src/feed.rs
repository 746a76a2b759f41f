//! Feed boundary - decode market-by-order CSV records into book events.
//!
//! Expected header:
//!
//! ```text
//! ts_event,action,side,price,size,order_id,sequence
//! ```
//!
//! `ts_event` is RFC 3339. `action` is one of `A C F M R T`, `side` one of
//! `B A N`. Prices are already scaled integers; [`UNDEF_PRICE`] marks a
//! record that carries no price.

use std::io::Read;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use thiserror::Error;

use crate::error::BookError;
use crate::event::{BookEvent, EventKind, Side};

/// Price of records that have none (trades with no print, clears).
pub const UNDEF_PRICE: i64 = i64::MAX;

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("csv: {0}")]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Book(#[from] BookError),

    /// Side `N` (or anything else) on an action that needs a side
    #[error("sequence {sequence}: action {action:?} requires a side, got {side:?}")]
    MissingSide { sequence: u64, action: char, side: char },

    /// Undefined or negative price on an action that needs a price
    #[error("sequence {sequence}: invalid price {price}")]
    InvalidPrice { sequence: u64, price: i64 },

    #[error("sequence {sequence}: timestamp {ts} outside the nanosecond range")]
    InvalidTimestamp { sequence: u64, ts: DateTime<Utc> },
}

/// One CSV row.
#[derive(Clone, Debug, Deserialize)]
pub struct MboRecord {
    pub ts_event: DateTime<Utc>,
    pub action: char,
    pub side: char,
    pub price: i64,
    pub size: u32,
    pub order_id: u64,
    pub sequence: u64,
}

impl MboRecord {
    /// Normalize into a [`BookEvent`].
    ///
    /// Add, cancel and modify need a real side and price. Fills, trades and
    /// clears may carry side `N` and [`UNDEF_PRICE`].
    pub fn to_event(&self) -> Result<BookEvent, FeedError> {
        let kind = EventKind::try_from(self.action)?;

        let side = match self.side {
            'B' => Some(Side::Bid),
            'A' => Some(Side::Ask),
            _ => None,
        };
        let price = u64::try_from(self.price)
            .ok()
            .filter(|_| self.price != UNDEF_PRICE);

        let needs_order_fields = matches!(kind, EventKind::Add | EventKind::Cancel | EventKind::Modify);
        if needs_order_fields && side.is_none() {
            return Err(FeedError::MissingSide {
                sequence: self.sequence,
                action: self.action,
                side: self.side,
            });
        }
        if needs_order_fields && price.is_none() {
            return Err(FeedError::InvalidPrice {
                sequence: self.sequence,
                price: self.price,
            });
        }

        let ts_event = self
            .ts_event
            .timestamp_nanos_opt()
            .and_then(|ns| u64::try_from(ns).ok())
            .ok_or(FeedError::InvalidTimestamp {
                sequence: self.sequence,
                ts: self.ts_event,
            })?;

        Ok(BookEvent {
            kind,
            order_id: self.order_id,
            side: side.unwrap_or(Side::Bid),
            price: price.unwrap_or(0),
            qty: self.size,
            sequence: self.sequence,
            ts_event,
        })
    }
}

/// Decode every row of a headed CSV stream, in file order.
pub fn read_events<R: Read>(reader: R) -> impl Iterator<Item = Result<BookEvent, FeedError>> {
    csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader)
        .into_deserialize::<MboRecord>()
        .map(|row| row.map_err(FeedError::from)?.to_event())
}

/// Format an event timestamp the way the feed writes them.
pub fn format_ts(ts_event: u64) -> String {
    let ts = i64::try_from(ts_event).unwrap_or(i64::MAX);
    DateTime::<Utc>::from_timestamp_nanos(ts).to_rfc3339_opts(chrono::SecondsFormat::Nanos, true)
}
