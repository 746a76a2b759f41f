//! Book configuration.

use serde::Deserialize;

use crate::arena::NULL_INDEX;
use crate::error::ConfigError;

/// Which side structure backs each side of the book.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LadderKind {
    /// AVL tree of levels. Any price, O(log M) level insertion.
    #[default]
    Tree,
    /// Direct-indexed window of `slots` prices starting at `base_price`,
    /// spaced `tick_size` apart. Best when occupied levels are contiguous.
    Array {
        base_price: u64,
        tick_size: u64,
        slots: u32,
    },
}

/// What to do with an event that would leave best bid >= best ask.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrossedBookPolicy {
    /// Apply it anyway; the crossing is logged at debug level
    Allow,
    /// Reject it with `CrossedBookDetected`, leaving the book unchanged
    #[default]
    Reject,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BookConfig {
    /// Maximum number of simultaneously resting orders
    pub order_capacity: u32,
    pub ladder: LadderKind,
    pub crossed_book: CrossedBookPolicy,
    /// Reject events whose sequence is below the last applied one
    pub check_sequence: bool,
}

impl Default for BookConfig {
    fn default() -> Self {
        Self {
            order_capacity: 1_000_000,
            ladder: LadderKind::Tree,
            crossed_book: CrossedBookPolicy::Reject,
            check_sequence: true,
        }
    }
}

impl BookConfig {
    pub fn with_capacity(mut self, order_capacity: u32) -> Self {
        self.order_capacity = order_capacity;
        self
    }

    pub fn with_ladder(mut self, ladder: LadderKind) -> Self {
        self.ladder = ladder;
        self
    }

    pub fn with_crossed_book(mut self, policy: CrossedBookPolicy) -> Self {
        self.crossed_book = policy;
        self
    }

    pub fn with_sequence_check(mut self, check: bool) -> Self {
        self.check_sequence = check;
        self
    }

    /// Check the values `Book::new` would otherwise panic on. Configs that
    /// come from outside the program (CLI, deserialized files) go through
    /// here first.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.order_capacity >= NULL_INDEX {
            return Err(ConfigError::CapacityTooLarge(self.order_capacity));
        }
        if let LadderKind::Array { tick_size: 0, .. } = self.ladder {
            return Err(ConfigError::ZeroTickSize);
        }
        Ok(())
    }
}
