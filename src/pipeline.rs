//! Pipeline Delay Model
//!
//! Models the latency of a hardware pipeline as a fixed-length queue of
//! predicted values. A value shifted in on edge `T` leaves the queue on edge
//! `T + depth`.

use std::collections::VecDeque;

/// Fixed-depth delay line of predicted output words.
#[derive(Debug, Clone)]
pub struct PipelineDelay {
    slots: VecDeque<u128>,
}

impl PipelineDelay {
    /// Create a delay line with `depth` zeroed slots.
    pub fn new(depth: usize) -> Self {
        PipelineDelay {
            slots: VecDeque::from(vec![0; depth]),
        }
    }

    /// Number of edges between a value entering and leaving.
    pub fn depth(&self) -> usize {
        self.slots.len()
    }

    /// Advance one edge: append `incoming` and return the oldest value.
    ///
    /// Push and pop happen together so the queue length never changes.
    pub fn shift(&mut self, incoming: u128) -> u128 {
        self.slots.push_back(incoming);
        self.slots.pop_front().unwrap_or_default()
    }

    /// Replace every slot with zero.
    pub fn flush(&mut self) {
        let depth = self.slots.len();
        self.slots = VecDeque::from(vec![0; depth]);
    }

    /// Values still in flight, oldest first.
    pub fn pending(&self) -> Vec<u128> {
        self.slots.iter().copied().collect()
    }

    /// True if nothing non-zero is in flight.
    pub fn is_idle(&self) -> bool {
        self.slots.iter().all(|&v| v == 0)
    }
}
