//! Error types for book mutations.

use thiserror::Error;

/// Why the book refused an event. The book is unchanged whenever one of
/// these is returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BookError {
    /// Add with an identifier that is already resting
    #[error("order {0} already exists")]
    DuplicateOrderId(u64),

    /// Cancel/execute/modify of an identifier that is not resting
    #[error("order {0} not found")]
    OrderNotFound(u64),

    /// Zero quantity where a positive one is required, or a reduction larger
    /// than the resting size
    #[error("invalid quantity {requested} for order {order_id} (resting {resting})")]
    InvalidQuantity {
        order_id: u64,
        requested: u32,
        resting: u32,
    },

    /// Action code that maps to no event kind
    #[error("unknown event kind {0:?}")]
    UnknownEventKind(char),

    /// The event would leave best bid >= best ask
    #[error("crossed book: bid {bid} >= ask {ask}")]
    CrossedBookDetected { bid: u64, ask: u64 },

    /// Price the configured side structure cannot address
    #[error("price {0} outside the ladder window")]
    PriceOutOfRange(u64),

    /// The order arena has no free records
    #[error("order capacity {0} exhausted")]
    CapacityExhausted(u32),

    /// Event sequence went backwards
    #[error("sequence regression: last {last}, got {got}")]
    SequenceRegression { last: u64, got: u64 },
}

/// A [`BookConfig`](crate::BookConfig) the book cannot be built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// Capacity collides with the arena's reserved null index
    #[error("order capacity {0} must be below u32::MAX")]
    CapacityTooLarge(u32),

    #[error("array ladder tick size must be positive")]
    ZeroTickSize,
}
