//! Slice checker.
//!
//! A slice multiplies one beat of `mac_count` pixels by its weights. Pixels
//! below `offset` finish the sum started by the previous beat; the rest open
//! a partial sum that the next beat finishes. With `offset == 0` every pixel
//! belongs to the current beat.

use log::{debug, info};

use super::{Scoreboard, RST};
use crate::config::SliceConfig;
use crate::error::{OracleError, Result};
use crate::fixed_point::{accumulate, fits, multiply, to_twos};
use crate::signal::{pack, BitVector, Signals};
use crate::testbench::{CheckStats, CycleChecker, SimulationAdapter, Testbench};

pub const WEIGHT: &str = "weight";
pub const WEIGHT_VALID: &str = "weight_valid";
pub const IMAGE: &str = "image";
pub const IMAGE_VALID: &str = "image_valid";

/// Model of the `slice` block.
#[derive(Debug, Clone)]
pub struct SliceChecker {
    config: SliceConfig,
    weight: Vec<u128>,
    partial: u128,
    board: Scoreboard,
}

impl SliceChecker {
    pub fn new(config: &SliceConfig) -> Result<Self> {
        config.validate()?;
        Ok(SliceChecker {
            config: config.clone(),
            weight: vec![0; config.mac_count],
            partial: 0,
            board: Scoreboard::new("slice", config.result_width(), config.pipeline_depth),
        })
    }

    pub fn config(&self) -> &SliceConfig {
        &self.config
    }

    /// Partial sum carried into the next beat.
    pub fn partial(&self) -> u128 {
        self.partial
    }

    /// Replace the model's weights. The bus sequence is driven by
    /// [`Testbench::send_weight`].
    pub fn load_weight(&mut self, weight: &[i128]) -> Result<()> {
        let c = &self.config;
        if weight.len() != c.mac_count {
            return Err(OracleError::length_mismatch("weights", weight.len(), c.mac_count));
        }
        if let Some(&w) = weight.iter().find(|&&w| !fits(c.weight_width, w)) {
            return Err(OracleError::out_of_range(WEIGHT, w, c.weight_width));
        }
        self.weight = weight.iter().map(|&w| to_twos(c.weight_width, w)).collect();
        info!("slice: weights {:?}", weight);
        Ok(())
    }

    /// Drive one weight with its one-hot strobe, or clear the strobe.
    pub fn strobe_weight(&self, sim: &mut dyn SimulationAdapter, weight: Option<(usize, i128)>) {
        let mut valid = BitVector::zero(self.config.mac_count as u32);
        if let Some((x, _)) = weight {
            valid.set_bit(x as u32, true);
        }
        sim.drive(WEIGHT, pack(self.config.weight_width, weight.map_or(0, |(_, w)| w)));
        sim.drive(WEIGHT_VALID, valid);
    }

    /// Drive one image beat and predict its completing sum.
    ///
    /// # Errors
    ///
    /// Returns error if the beat has the wrong length or a pixel does not fit.
    pub fn prep_image(&mut self, sim: &mut dyn SimulationAdapter, image: &[i128]) -> Result<()> {
        let c = &self.config;
        if image.len() != c.mac_count {
            return Err(OracleError::length_mismatch("pixels", image.len(), c.mac_count));
        }
        if let Some(&p) = image.iter().find(|&&p| !fits(c.image_width, p)) {
            return Err(OracleError::out_of_range(IMAGE, p, c.image_width));
        }

        let pixels: Vec<u128> = image.iter().map(|&p| to_twos(c.image_width, p)).collect();
        sim.drive(IMAGE, BitVector::from_fields(c.image_width, &pixels));
        sim.drive(IMAGE_VALID, pack(1, 1));

        let result = self.slice(&pixels);
        debug!("slice: beat {:?} -> {:#x}, carry {:#x}", image, result, self.partial);
        self.board.predict(result);
        Ok(())
    }

    fn slice(&mut self, image: &[u128]) -> u128 {
        let c = &self.config;
        let (rw, pw) = (c.result_width(), c.product_width());

        let mut result = self.partial;
        let mut partial = 0;

        for (x, (&pixel, &weight)) in image.iter().zip(&self.weight).enumerate() {
            let product = multiply(pixel, c.image_width, weight, c.weight_width);
            if c.offset == 0 || x < c.offset {
                result = accumulate(result, rw, product, pw);
            } else {
                partial = accumulate(partial, rw, product, pw);
            }
        }

        self.partial = partial;
        result
    }

    fn drive_idle(&self, sim: &mut dyn SimulationAdapter) {
        sim.drive(IMAGE, BitVector::zero(self.config.image_bus_width()));
        sim.drive(IMAGE_VALID, pack(1, 0));
    }
}

impl CycleChecker for SliceChecker {
    fn name(&self) -> &'static str {
        self.board.name()
    }

    fn reset(&mut self, sim: &mut dyn SimulationAdapter, state: bool) {
        sim.drive(RST, pack(1, i128::from(state)));
        self.board.set_reset(state);
    }

    fn advance(&mut self, observed: &Signals, sim: &mut dyn SimulationAdapter) -> Result<()> {
        let resetting = self.board.check(observed)?;
        self.drive_idle(sim);
        if resetting {
            self.weight.fill(0);
            self.partial = 0;
        }
        Ok(())
    }

    fn stats(&self) -> CheckStats {
        self.board.stats()
    }
}

impl<A: SimulationAdapter> Testbench<A, SliceChecker> {
    /// Load weights: one clock per weight with a one-hot strobe, then a
    /// clearing clock.
    pub fn send_weight(&mut self, weight: &[i128]) -> Result<()> {
        self.checker.load_weight(weight)?;
        for (x, &w) in weight.iter().enumerate() {
            self.checker.strobe_weight(&mut self.sim, Some((x, w)));
            self.tick()?;
        }
        self.checker.strobe_weight(&mut self.sim, None);
        self.tick()?;
        Ok(())
    }
}
