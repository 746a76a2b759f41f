//! # MBO-Book
//!
//! A deterministic market-by-order limit order book replicator.
//!
//! Consumes a feed of add / cancel / execute / modify / clear events and
//! maintains per-order state and per-level aggregates. Matching happens
//! upstream; the book only records its effects.
//!
//! ## Design Principles
//!
//! - **Single-Writer**: One thread applies events in feed order
//! - **O(1) Hot Path**: Cancel, execute, BBO and volume-at-limit
//! - **Cache-Optimized**: 64-byte aligned nodes, 32-bit indices
//! - **Arena Allocation**: No heap allocation in the hot path
//! - **Atomic Events**: A rejected event leaves the book untouched
//!
//! ## Architecture
//!
//! ```text
//! [Feed Decoder] --> [SPSC Ring Buffer] --> [Engine Thread (Pinned)]
//!                                                  |
//!                                   [Results]  [Snapshots]
//! ```

pub mod arena;
pub mod config;
pub mod engine;
pub mod error;
pub mod event;
pub mod feed;
pub mod ladder;
pub mod order_book;
pub mod order_index;
pub mod price_level;
pub mod snapshot;

// Re-exports for convenience
pub use arena::{Arena, ArenaIndex, OrderNode, NULL_INDEX};
pub use config::{BookConfig, CrossedBookPolicy, LadderKind};
pub use engine::{Engine, EngineStats};
pub use error::{BookError, ConfigError};
pub use event::{Applied, BookEvent, EventKind, NewOrder, OrderState, Side, Transition};
pub use feed::{FeedError, MboRecord};
pub use ladder::{Ladder, SideBook};
pub use order_book::Book;
pub use price_level::PriceLevel;
pub use snapshot::{Bbo, BookSnapshot, LevelView, OrderView, SharedBook, SnapshotPublisher, SnapshotReader};
