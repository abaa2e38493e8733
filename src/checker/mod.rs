//! Golden-Model Checkers
//!
//! One checker per hardware block. Each predicts the block's output from the
//! values it is driven with and compares the prediction against the device
//! once the pipeline latency has elapsed:
//! - [`MacChecker`]: single multiply-add unit
//! - [`SliceChecker`]: one-row windowed accumulator
//! - [`EngineChecker`]: multi-row, multi-channel convolution engine
//!
//! All three share the [`Scoreboard`], which owns the delay queue, the reset
//! state and the comparison itself.

pub mod engine;
pub mod mac;
pub mod slice;

pub use engine::EngineChecker;
pub use mac::MacChecker;
pub use slice::SliceChecker;

use log::{info, warn};

use crate::error::{OracleError, Result};
use crate::pipeline::PipelineDelay;
use crate::signal::{unpack, Signals};
use crate::testbench::CheckStats;

/// Synchronous reset input shared by every block.
pub const RST: &str = "rst";
/// Output bus shared by every block.
pub const RESULT: &str = "result";

/// Delay-matched comparison of predictions against observed outputs.
///
/// Two states: normal, and resetting while the reset input is asserted.
/// Reset takes priority over any prediction made for the same edge.
#[derive(Debug, Clone)]
pub struct Scoreboard {
    name: &'static str,
    result_width: u32,
    pipeline: PipelineDelay,
    /// Prediction for the upcoming edge
    pending: u128,
    /// Last value that compared equal
    previous: u128,
    reset: bool,
    stats: CheckStats,
}

impl Scoreboard {
    pub fn new(name: &'static str, result_width: u32, depth: usize) -> Self {
        Scoreboard {
            name,
            result_width,
            pipeline: PipelineDelay::new(depth),
            pending: 0,
            previous: 0,
            reset: false,
            stats: CheckStats::default(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Replace the prediction for the upcoming edge.
    pub fn predict(&mut self, value: u128) {
        self.pending = value;
    }

    pub fn set_reset(&mut self, state: bool) {
        if state != self.reset {
            info!("{}: reset {}", self.name, if state { "asserted" } else { "released" });
        }
        self.reset = state;
    }

    pub fn in_reset(&self) -> bool {
        self.reset
    }

    pub fn stats(&self) -> CheckStats {
        self.stats
    }

    pub fn pipeline(&self) -> &PipelineDelay {
        &self.pipeline
    }

    /// Shift the delay queue by one edge and compare its output with the
    /// observed result. Returns true if the edge was a reset edge, in which
    /// case the caller must clear its own accumulators.
    ///
    /// # Errors
    ///
    /// Returns [`OracleError::Mismatch`] when the device disagrees with the
    /// model, or [`OracleError::MissingSignal`] if no result was reported.
    pub fn check(&mut self, observed: &Signals) -> Result<bool> {
        let bits = observed
            .get(RESULT)
            .ok_or_else(|| OracleError::missing_signal(RESULT))?;
        let hw_result = unpack(self.result_width, bits);

        let expected = self.pipeline.shift(std::mem::take(&mut self.pending));
        let cycle = self.stats.cycles;

        if hw_result != expected {
            warn!(
                "{}: cycle {} expected {:#x}, observed {:#x}",
                self.name, cycle, expected, hw_result
            );
            return Err(OracleError::Mismatch {
                checker: self.name,
                cycle,
                expected,
                observed: hw_result,
                previous: self.previous,
                pending: self.pipeline.pending(),
            });
        }

        self.stats.cycles += 1;
        if expected != 0 {
            self.stats.nonzero_matches += 1;
        }
        self.previous = expected;

        if self.reset {
            self.pipeline.flush();
            self.previous = 0;
            self.stats.reset_cycles += 1;
        }
        Ok(self.reset)
    }
}
