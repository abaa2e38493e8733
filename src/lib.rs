//! Fixed-Point MAC Golden Model
//!
//! A bit-exact, cycle-accurate reference model for a pipelined fixed-point
//! multiply-accumulate convolution block. For every clock edge of a simulated
//! design it predicts the expected output and fails on the first divergence.
//!
//! # Overview
//!
//! Three checkers cover the hardware hierarchy:
//! - **multiply_add**: one MAC unit, 5 cycles deep
//! - **slice**: a row of MACs with partial sums straddling beats, 18 cycles deep
//! - **engine**: kernel rows x channels of slices, summed, rescaled and
//!   saturated into one result word, 28 cycles deep
//!
//! All arithmetic goes through [`fixed_point`], which models two's-complement
//! values of any width up to 126 bits.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use mac_oracle::prelude::*;
//!
//! let config = MacConfig::default();
//! let mut tb = Testbench::new(MacDevice::new(&config), MacChecker::new(&config)?);
//!
//! tb.apply_reset(2, 2)?;
//! tb.prep(|checker, sim| checker.set(sim, 5, 1, 0))?;
//! tb.advance_clock(10)?;
//! # Ok::<(), mac_oracle::OracleError>(())
//! ```
//!
//! # Simulator Boundary
//!
//! The design under test is reached only through [`SimulationAdapter`]
//! (drive, step, observe). An HDL simulator binding implements it the same
//! way the behavioral models in [`dut`] do. The checker registered with a
//! [`Testbench`] runs once after every edge.
//!
//! # Regression
//!
//! ```rust,no_run
//! use mac_oracle::prelude::*;
//!
//! let scenario = Scenario {
//!     block: Block::Engine,
//!     seed: 0,
//!     stimulus: StimulusConfig { valid_probability: 0.5, ..Default::default() },
//!     fault: None,
//! };
//! let report = sweep(&OracleConfig::default(), &scenario, &[1, 2, 3, 4])?;
//! assert!(report.passed());
//! # Ok::<(), mac_oracle::OracleError>(())
//! ```
//!
//! [`SimulationAdapter`]: testbench::SimulationAdapter
//! [`Testbench`]: testbench::Testbench

pub mod checker;
pub mod config;
pub mod dut;
pub mod error;
pub mod fixed_point;
pub mod pipeline;
pub mod regression;
pub mod signal;
pub mod stimulus;
pub mod testbench;

pub use error::{OracleError, Result};

/// Prelude - commonly used types
pub mod prelude {
    pub use crate::checker::{EngineChecker, MacChecker, Scoreboard, SliceChecker};
    pub use crate::config::{EngineConfig, MacConfig, OracleConfig, SliceConfig};
    pub use crate::dut::{EngineDevice, FaultInjector, MacDevice, OutputFault, SliceDevice};
    pub use crate::error::{OracleError, Result};
    pub use crate::pipeline::PipelineDelay;
    pub use crate::regression::{run, sweep, Block, RunReport, Scenario, SweepReport};
    pub use crate::signal::{pack, unpack, BitVector, Signals};
    pub use crate::stimulus::{MacOp, Step, Stimulus, StimulusConfig};
    pub use crate::testbench::{CheckStats, CycleChecker, SimulationAdapter, Testbench};
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
