//! Clock-Driven Testbench
//!
//! Ties a device under test to the checker that predicts its outputs:
//! - the device is reached only through [`SimulationAdapter`]
//! - the checker is registered once and its hook runs after every edge
//! - driving calls go through [`Testbench::prep`] before the next edge

use log::trace;

use crate::error::Result;
use crate::signal::{BitVector, Signals};

/// Narrow driving/observing protocol of a simulated design.
pub trait SimulationAdapter {
    /// Set an input signal for the next clock edge.
    fn drive(&mut self, signal: &str, value: BitVector);

    /// Advance the design by one clock edge.
    ///
    /// # Errors
    ///
    /// Returns error if the simulator cannot advance.
    fn step(&mut self) -> Result<()>;

    /// Output values as sampled on the last edge.
    fn observe(&self) -> Signals;
}

/// Per-cycle hook of a golden model.
pub trait CycleChecker {
    /// Short block name used in reports and errors.
    fn name(&self) -> &'static str;

    /// Drive the reset input and arm or release the model's reset.
    fn reset(&mut self, sim: &mut dyn SimulationAdapter, state: bool);

    /// Compare the observed outputs of one edge against the model.
    ///
    /// Called exactly once per edge, after the edge.
    ///
    /// # Errors
    ///
    /// Returns error on a cycle-accuracy mismatch or missing output.
    fn advance(&mut self, observed: &Signals, sim: &mut dyn SimulationAdapter) -> Result<()>;

    /// Comparison counters so far.
    fn stats(&self) -> CheckStats;
}

/// Counters kept by every checker
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CheckStats {
    /// Edges compared
    pub cycles: u64,
    /// Edges where a non-zero value was expected and observed
    pub nonzero_matches: u64,
    /// Edges spent in reset
    pub reset_cycles: u64,
}

/// Global testbench clock
#[derive(Debug, Clone, Copy, Default)]
pub struct Clock {
    pub cycle: u64,
}

/// A device under test with its registered checker
pub struct Testbench<A, C> {
    pub sim: A,
    pub checker: C,
    pub clock: Clock,
}

impl<A: SimulationAdapter, C: CycleChecker> Testbench<A, C> {
    /// Register `checker` so its hook runs after every edge of `sim`.
    pub fn new(sim: A, checker: C) -> Self {
        Testbench {
            sim,
            checker,
            clock: Clock::default(),
        }
    }

    /// Run a driving call against the checker before the next edge.
    pub fn prep<R>(&mut self, f: impl FnOnce(&mut C, &mut A) -> Result<R>) -> Result<R> {
        f(&mut self.checker, &mut self.sim)
    }

    /// Execute one clock edge and run the checker hook on its outputs.
    pub fn tick(&mut self) -> Result<Signals> {
        self.sim.step()?;
        let observed = self.sim.observe();
        trace!("{} cycle {}: {:?}", self.checker.name(), self.clock.cycle, observed);
        self.checker.advance(&observed, &mut self.sim)?;
        self.clock.cycle += 1;
        Ok(observed)
    }

    /// Execute `n` edges, returning the outputs of the last one.
    pub fn advance_clock(&mut self, n: u64) -> Result<Signals> {
        let mut observed = self.sim.observe();
        for _ in 0..n {
            observed = self.tick()?;
        }
        Ok(observed)
    }

    /// Hold reset for `hold` edges, then release it and idle `settle` edges.
    pub fn apply_reset(&mut self, hold: u64, settle: u64) -> Result<()> {
        self.checker.reset(&mut self.sim, true);
        self.advance_clock(hold)?;
        self.checker.reset(&mut self.sim, false);
        self.advance_clock(settle)?;
        Ok(())
    }

    /// Edges executed so far.
    pub fn cycle(&self) -> u64 {
        self.clock.cycle
    }

    pub fn into_parts(self) -> (A, C) {
        (self.sim, self.checker)
    }
}
