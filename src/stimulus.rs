//! Stimulus Generators
//!
//! Seeded random stimulus for the three blocks:
//! - multiply-add operand streams
//! - slice and engine image beats, weights and shifts
//! - contiguous or intermittent valid patterns with an optional reset
//!
//! The same seed always produces the same schedule.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::config::{EngineConfig, MacConfig};
use crate::error::{OracleError, Result};

/// Stimulus configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StimulusConfig {
    /// Number of valid beats (or operand sets)
    pub beats: usize,
    /// Probability that a beat follows the previous one without a gap.
    /// 1.0 gives a contiguous stream.
    pub valid_probability: f64,
    /// Assert reset once, just before this beat
    pub reset_at: Option<usize>,
}

impl Default for StimulusConfig {
    fn default() -> Self {
        StimulusConfig {
            beats: 64,
            valid_probability: 1.0,
            reset_at: None,
        }
    }
}

impl StimulusConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.valid_probability > 0.0 && self.valid_probability <= 1.0) {
            return Err(OracleError::invalid_config(format!(
                "valid probability {} must be in (0, 1]",
                self.valid_probability
            )));
        }
        Ok(())
    }
}

/// One clock's worth of stimulus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step<T> {
    Beat(T),
    Idle,
    Reset,
}

/// Operands of one multiply-add.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MacOp {
    pub m1: i128,
    pub m2: i128,
    pub add: i128,
}

/// Seeded stimulus source
pub struct Stimulus {
    rng: StdRng,
    config: StimulusConfig,
}

impl Stimulus {
    pub fn new(seed: u64, config: &StimulusConfig) -> Result<Self> {
        config.validate()?;
        Ok(Stimulus {
            rng: StdRng::seed_from_u64(seed),
            config: config.clone(),
        })
    }

    /// Uniform signed value of `width` bits.
    pub fn signed(&mut self, width: u32) -> i128 {
        let half = 1i128 << (width - 1);
        self.rng.gen_range(-half..half)
    }

    /// Uniform raw bit pattern of `width` bits.
    pub fn raw(&mut self, width: u32) -> i128 {
        self.rng.gen_range(0..1i128 << width)
    }

    pub fn weights(&mut self, width: u32, count: usize) -> Vec<i128> {
        (0..count).map(|_| self.signed(width)).collect()
    }

    /// Rescale shift covering both sides of the signed-reinterpretation gate.
    pub fn shift(&mut self, config: &EngineConfig) -> u32 {
        self.rng.gen_range(0..=config.image_width.min(config.max_shift()))
    }

    /// Operand stream for the multiply-add block.
    pub fn mac_ops(&mut self, config: &MacConfig) -> Vec<Step<MacOp>> {
        self.schedule(|s| MacOp {
            m1: s.raw(config.m1_width),
            m2: s.raw(config.m2_width),
            add: s.signed(config.result_width()),
        })
    }

    /// Beat stream of `len` pixels per beat.
    pub fn beats(&mut self, width: u32, len: usize) -> Vec<Step<Vec<i128>>> {
        self.schedule(|s| (0..len).map(|_| s.raw(width)).collect())
    }

    fn schedule<T>(&mut self, mut beat: impl FnMut(&mut Self) -> T) -> Vec<Step<T>> {
        let mut steps = Vec::with_capacity(self.config.beats);
        for x in 0..self.config.beats {
            if self.config.reset_at == Some(x) {
                steps.push(Step::Reset);
            }
            steps.push(Step::Beat(beat(self)));
            while !self.rng.gen_bool(self.config.valid_probability) {
                steps.push(Step::Idle);
            }
        }
        steps
    }
}
