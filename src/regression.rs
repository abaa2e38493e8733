//! Regression Runs
//!
//! Drives seeded stimulus into a behavioral device through a testbench with
//! the matching checker registered, and summarizes the outcome. Independent
//! seeds are swept in parallel.

use std::fmt;
use std::str::FromStr;

use log::{info, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::checker::{EngineChecker, MacChecker, SliceChecker};
use crate::config::OracleConfig;
use crate::dut::{EngineDevice, FaultInjector, MacDevice, OutputFault, SliceDevice};
use crate::error::{OracleError, Result};
use crate::stimulus::{Step, Stimulus, StimulusConfig};
use crate::testbench::{CheckStats, CycleChecker, SimulationAdapter, Testbench};

/// Edges held in reset before and after a run.
const RESET_HOLD: u64 = 2;
/// Extra edges past the pipeline depth before a run ends.
const DRAIN_MARGIN: u64 = 10;

/// Hardware block under test
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Block {
    Mac,
    Slice,
    Engine,
}

impl Block {
    pub const ALL: [Block; 3] = [Block::Mac, Block::Slice, Block::Engine];
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Block::Mac => "mac",
            Block::Slice => "slice",
            Block::Engine => "engine",
        })
    }
}

impl FromStr for Block {
    type Err = OracleError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "mac" | "multiply_add" => Ok(Block::Mac),
            "slice" => Ok(Block::Slice),
            "engine" => Ok(Block::Engine),
            other => Err(OracleError::invalid_config(format!(
                "unknown block '{other}' (expected mac, slice or engine)"
            ))),
        }
    }
}

/// One regression scenario
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    pub block: Block,
    pub seed: u64,
    pub stimulus: StimulusConfig,
    pub fault: Option<OutputFault>,
}

/// Summary report of one run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub block: Block,
    pub seed: u64,
    pub cycles: u64,
    pub beats: usize,
    pub stats: CheckStats,
    pub passed: bool,
    /// Cycle of the first mismatch
    pub mismatch_cycle: Option<u64>,
    pub failure: Option<String>,
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verdict = if self.passed { "PASS" } else { "FAIL" };
        writeln!(f, "╔══════════════════════════════════════════════════════════════╗")?;
        writeln!(f, "║                    Golden Model Regression                   ║")?;
        writeln!(f, "╠══════════════════════════════════════════════════════════════╣")?;
        writeln!(f, "║ Block:                     {:>12}                      ║", self.block)?;
        writeln!(f, "║ Seed:                      {:>12}                      ║", self.seed)?;
        writeln!(f, "║ Beats Driven:              {:>12}                      ║", self.beats)?;
        writeln!(f, "╠══════════════════════════════════════════════════════════════╣")?;
        writeln!(f, "║ Cycles:                    {:>12}                      ║", self.cycles)?;
        writeln!(f, "║ Cycles Compared:           {:>12}                      ║", self.stats.cycles)?;
        writeln!(f, "║ Non-zero Matches:          {:>12}                      ║", self.stats.nonzero_matches)?;
        writeln!(f, "║ Reset Cycles:              {:>12}                      ║", self.stats.reset_cycles)?;
        writeln!(f, "╠══════════════════════════════════════════════════════════════╣")?;
        writeln!(f, "║ Result:                    {:>12}                      ║", verdict)?;
        writeln!(f, "╚══════════════════════════════════════════════════════════════╝")?;
        if let Some(failure) = &self.failure {
            writeln!(f, "{failure}")?;
        }
        Ok(())
    }
}

/// Outcome of a seed sweep
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepReport {
    pub block: Block,
    pub runs: Vec<RunReport>,
}

impl SweepReport {
    pub fn failing_seeds(&self) -> Vec<u64> {
        self.runs.iter().filter(|r| !r.passed).map(|r| r.seed).collect()
    }

    pub fn passed(&self) -> bool {
        self.runs.iter().all(|r| r.passed)
    }
}

/// Run one scenario.
///
/// A mismatch produces a failing report; any other error (contract
/// violation, bad configuration) is returned.
pub fn run(config: &OracleConfig, scenario: &Scenario) -> Result<RunReport> {
    config.validate()?;
    let mut stimulus = Stimulus::new(scenario.seed, &scenario.stimulus)?;
    info!("{} seed {}: {} beats", scenario.block, scenario.seed, scenario.stimulus.beats);

    match scenario.block {
        Block::Mac => {
            let dut = FaultInjector::new(MacDevice::new(&config.mac), scenario.fault);
            let mut tb = Testbench::new(dut, MacChecker::new(&config.mac)?);
            let outcome = drive_mac(&mut tb, &mut stimulus);
            finish(scenario, &tb, outcome)
        }
        Block::Slice => {
            let dut = FaultInjector::new(SliceDevice::new(&config.slice), scenario.fault);
            let mut tb = Testbench::new(dut, SliceChecker::new(&config.slice)?);
            let outcome = drive_slice(&mut tb, &mut stimulus);
            finish(scenario, &tb, outcome)
        }
        Block::Engine => {
            let dut = FaultInjector::new(EngineDevice::new(&config.engine), scenario.fault);
            let mut tb = Testbench::new(dut, EngineChecker::new(&config.engine)?);
            let outcome = drive_engine(&mut tb, &mut stimulus);
            finish(scenario, &tb, outcome)
        }
    }
}

/// Run `scenario` once per seed in `seeds`, in parallel.
pub fn sweep(config: &OracleConfig, scenario: &Scenario, seeds: &[u64]) -> Result<SweepReport> {
    let runs = seeds
        .par_iter()
        .map(|&seed| run(config, &Scenario { seed, ..scenario.clone() }))
        .collect::<Result<Vec<_>>>()?;
    Ok(SweepReport {
        block: scenario.block,
        runs,
    })
}

fn finish<A, C>(scenario: &Scenario, tb: &Testbench<A, C>, outcome: Result<usize>) -> Result<RunReport>
where
    A: SimulationAdapter,
    C: CycleChecker,
{
    let mut report = RunReport {
        block: scenario.block,
        seed: scenario.seed,
        cycles: tb.cycle(),
        beats: 0,
        stats: tb.checker.stats(),
        passed: true,
        mismatch_cycle: None,
        failure: None,
    };
    match outcome {
        Ok(beats) => report.beats = beats,
        Err(err @ OracleError::Mismatch { cycle, .. }) => {
            warn!("{} seed {} failed: {}", scenario.block, scenario.seed, err);
            report.passed = false;
            report.mismatch_cycle = Some(cycle);
            report.failure = Some(err.to_string());
        }
        Err(err) => return Err(err),
    }
    Ok(report)
}

fn drive_mac<A: SimulationAdapter>(
    tb: &mut Testbench<A, MacChecker>,
    stimulus: &mut Stimulus,
) -> Result<usize> {
    let depth = tb.checker.config().pipeline_depth as u64;
    let steps = stimulus.mac_ops(tb.checker.config());

    tb.apply_reset(RESET_HOLD, RESET_HOLD)?;
    let mut beats = 0;
    for step in steps {
        match step {
            Step::Beat(op) => {
                tb.prep(|checker, sim| checker.set(sim, op.m1, op.m2, op.add))?;
                beats += 1;
            }
            Step::Reset => {
                tb.apply_reset(1, 0)?;
                continue;
            }
            Step::Idle => {}
        }
        tb.tick()?;
    }
    tb.advance_clock(depth + DRAIN_MARGIN)?;
    Ok(beats)
}

fn drive_slice<A: SimulationAdapter>(
    tb: &mut Testbench<A, SliceChecker>,
    stimulus: &mut Stimulus,
) -> Result<usize> {
    let c = tb.checker.config().clone();
    let steps = stimulus.beats(c.image_width, c.mac_count);
    let weight = stimulus.weights(c.weight_width, c.mac_count);

    tb.apply_reset(RESET_HOLD, RESET_HOLD)?;
    tb.send_weight(&weight)?;
    let mut beats = 0;
    for step in steps {
        match step {
            Step::Beat(image) => {
                tb.prep(|checker, sim| checker.prep_image(sim, &image))?;
                beats += 1;
            }
            Step::Reset => {
                tb.apply_reset(1, 0)?;
                tb.send_weight(&weight)?;
                continue;
            }
            Step::Idle => {}
        }
        tb.tick()?;
    }
    tb.advance_clock(c.pipeline_depth as u64 + DRAIN_MARGIN)?;
    Ok(beats)
}

fn drive_engine<A: SimulationAdapter>(
    tb: &mut Testbench<A, EngineChecker>,
    stimulus: &mut Stimulus,
) -> Result<usize> {
    let c = tb.checker.config().clone();
    let steps = stimulus.beats(c.image_width, c.beat_len());
    let weight = stimulus.weights(c.weight_width, c.kernel_count());
    let shift = stimulus.shift(&c);

    tb.apply_reset(RESET_HOLD, RESET_HOLD)?;
    tb.send_shift(shift)?;
    tb.send_weight(&weight)?;
    let mut beats = 0;
    for step in steps {
        match step {
            Step::Beat(image) => {
                tb.prep(|checker, sim| checker.prep_image(sim, &image))?;
                beats += 1;
            }
            Step::Reset => {
                tb.apply_reset(1, 0)?;
                tb.send_weight(&weight)?;
                continue;
            }
            Step::Idle => {}
        }
        tb.tick()?;
    }
    tb.advance_clock(c.pipeline_depth as u64 + DRAIN_MARGIN)?;
    Ok(beats)
}
