//! # Trigger Submission Rate Buffer
//!
//! Sliding window of the most recent trigger timestamps per masternode,
//! evaluated against a cap of roughly two triggers per superblock cycle.
//! Only triggers are rate-capped; other object types bypass the buffer.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

/// How many recent timestamps the window retains.
pub const RATE_BUFFER_SIZE: usize = 5;

/// Fixed-capacity ring of recent submission timestamps.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RateCheckBuffer {
    timestamps: VecDeque<i64>,
}

impl RateCheckBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_timestamp(&mut self, timestamp: i64) {
        if self.timestamps.len() == RATE_BUFFER_SIZE {
            self.timestamps.pop_front();
        }
        self.timestamps.push_back(timestamp);
    }

    pub fn count(&self) -> usize {
        self.timestamps.len()
    }

    pub fn min_timestamp(&self) -> Option<i64> {
        self.timestamps.iter().copied().min()
    }

    pub fn max_timestamp(&self) -> Option<i64> {
        self.timestamps.iter().copied().max()
    }

    /// Submissions per second over the window.
    ///
    /// Fewer than two samples rate as zero; a zero-width window rates as
    /// infinitely fast.
    pub fn rate(&self) -> f64 {
        if self.timestamps.len() < 2 {
            return 0.0;
        }
        let min = self.min_timestamp().unwrap_or(0);
        let max = self.max_timestamp().unwrap_or(0);
        if min == max {
            return f64::MAX;
        }
        self.timestamps.len() as f64 / (max - min) as f64
    }
}

/// Per-masternode rate state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LastObjectRecord {
    /// False after a failed rate check; forces full re-evaluation next time.
    pub status_ok: bool,
    pub trigger_buffer: RateCheckBuffer,
}

impl LastObjectRecord {
    pub fn new(status_ok: bool) -> Self {
        Self {
            status_ok,
            trigger_buffer: RateCheckBuffer::new(),
        }
    }
}
