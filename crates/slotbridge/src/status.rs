//! Pool status snapshots.

use serde::{Deserialize, Serialize};

/// Coarse health of a pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PoolHealth {
    /// At least one slot is available
    #[default]
    Ready,
    /// Every live slot is borrowed
    Busy,
    /// Every slot has been quarantined
    Exhausted,
    /// `close()` was called
    Closed,
}

/// Point-in-time view of a pool's slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStatus {
    pub size: usize,
    pub available: usize,
    pub in_use: usize,
    pub quarantined: usize,
    pub health: PoolHealth,
}

impl PoolStatus {
    pub(crate) fn new(size: usize, live: usize, available: usize, closed: bool) -> Self {
        let live = live.min(size);
        let available = available.min(live);
        let health = if closed {
            PoolHealth::Closed
        } else if live == 0 {
            PoolHealth::Exhausted
        } else if available == 0 {
            PoolHealth::Busy
        } else {
            PoolHealth::Ready
        };

        Self {
            size,
            available,
            in_use: live - available,
            quarantined: size - live,
            health,
        }
    }

    pub fn is_accepting(&self) -> bool {
        matches!(self.health, PoolHealth::Ready | PoolHealth::Busy)
    }
}
