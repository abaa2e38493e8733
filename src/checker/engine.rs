//! Engine checker.
//!
//! The engine runs `kernel_height x image_count` slices in parallel. Every
//! slice (position `p`, row `h`) reads the whole beat through a window that
//! starts `min(p, kernel_width - 1) + 1` pixels in, wrapping around the beat,
//! and multiplies it by kernel row `h`. Per position the row sums are added,
//! rescaled by the configured shift and packed into one result word.

use log::{debug, info};

use super::{Scoreboard, RST};
use crate::config::EngineConfig;
use crate::error::{OracleError, Result};
use crate::fixed_point::{accumulate, fits, group_sum, multiply, rescale, to_twos};
use crate::signal::{pack, BitVector, Signals};
use crate::testbench::{CheckStats, CycleChecker, SimulationAdapter, Testbench};

pub const WEIGHT: &str = "weight";
pub const WEIGHT_VALID: &str = "weight_valid";
pub const IMAGE: &str = "image";
pub const IMAGE_VALID: &str = "image_valid";
pub const CFG_SHIFT: &str = "cfg_shift";
pub const CFG_VALID: &str = "cfg_valid";

/// Model of the `engine` block.
#[derive(Debug, Clone)]
pub struct EngineChecker {
    config: EngineConfig,
    shift: u32,
    weight: Vec<u128>,
    /// Carried partial sums, indexed `[position][row]`
    partial: Vec<Vec<u128>>,
    board: Scoreboard,
}

impl EngineChecker {
    pub fn new(config: &EngineConfig) -> Result<Self> {
        config.validate()?;
        Ok(EngineChecker {
            config: config.clone(),
            shift: 0,
            weight: vec![0; config.kernel_count()],
            partial: vec![vec![0; config.kernel_height]; config.image_count],
            board: Scoreboard::new("engine", config.word_width(), config.pipeline_depth),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn shift(&self) -> u32 {
        self.shift
    }

    /// Carried partial sum of slice (`position`, `row`).
    pub fn partial(&self, position: usize, row: usize) -> u128 {
        self.partial[position][row]
    }

    /// Replace the model's rescale shift.
    ///
    /// # Errors
    ///
    /// Returns error if the shift does not fit the configuration bus.
    pub fn load_shift(&mut self, shift: u32) -> Result<()> {
        if shift > self.config.max_shift() {
            return Err(OracleError::out_of_range(
                "shift value too large for the configuration bus",
                i128::from(shift),
                self.config.shift_width,
            ));
        }
        self.shift = shift;
        info!("engine: shift {shift}");
        Ok(())
    }

    /// Drive the configuration bus, or clear it.
    pub fn strobe_shift(&self, sim: &mut dyn SimulationAdapter, shift: Option<u32>) {
        let width = self.config.shift_width;
        sim.drive(CFG_SHIFT, pack(width, shift.map_or(0, i128::from)));
        sim.drive(CFG_VALID, pack(1, i128::from(shift.is_some())));
    }

    /// Replace the model's kernel, row-major.
    pub fn load_weight(&mut self, weight: &[i128]) -> Result<()> {
        let c = &self.config;
        if weight.len() != c.kernel_count() {
            return Err(OracleError::length_mismatch("weights", weight.len(), c.kernel_count()));
        }
        if let Some(&w) = weight.iter().find(|&&w| !fits(c.weight_width, w)) {
            return Err(OracleError::out_of_range(WEIGHT, w, c.weight_width));
        }
        self.weight = weight.iter().map(|&w| to_twos(c.weight_width, w)).collect();
        info!("engine: weights {:?}", weight);
        Ok(())
    }

    /// Drive one weight with the valid strobe, or clear it.
    pub fn strobe_weight(&self, sim: &mut dyn SimulationAdapter, weight: Option<i128>) {
        sim.drive(WEIGHT, pack(self.config.weight_width, weight.unwrap_or(0)));
        sim.drive(WEIGHT_VALID, pack(1, i128::from(weight.is_some())));
    }

    /// Drive one beat (`kernel_height` rows of `image_count` pixels) and
    /// predict its result word.
    ///
    /// # Errors
    ///
    /// Returns error if the beat has the wrong length or a pixel does not fit.
    pub fn prep_image(&mut self, sim: &mut dyn SimulationAdapter, image: &[i128]) -> Result<()> {
        let c = &self.config;
        if image.len() != c.beat_len() {
            return Err(OracleError::length_mismatch("pixels", image.len(), c.beat_len()));
        }
        if let Some(&p) = image.iter().find(|&&p| !fits(c.image_width, p)) {
            return Err(OracleError::out_of_range(IMAGE, p, c.image_width));
        }

        let pixels: Vec<u128> = image.iter().map(|&p| to_twos(c.image_width, p)).collect();
        sim.drive(IMAGE, BitVector::from_fields(c.image_width, &pixels));
        sim.drive(IMAGE_VALID, pack(1, 1));

        let word = self.beat(&pixels);
        debug!("engine: beat {:?} -> {:#x}", image, word);
        self.board.predict(word);
        Ok(())
    }

    fn beat(&mut self, pixels: &[u128]) -> u128 {
        let (n, rows) = (self.config.image_count, self.config.kernel_height);
        let rw = self.config.result_width();
        let iw = self.config.image_width;

        let mut word = 0u128;
        for position in 0..n {
            let column: Vec<u128> = (0..rows).map(|row| self.slice(pixels, row, position)).collect();
            let scaled = rescale(group_sum(&column, rw), rw, iw, self.shift);
            word |= scaled << (position as u32 * iw);
        }
        word
    }

    fn slice(&mut self, pixels: &[u128], row: usize, position: usize) -> u128 {
        let c = &self.config;
        let kw = c.kernel_width;
        let (rw, pw) = (c.result_width(), c.product_width());
        let offset = position.min(kw - 1);

        let doubled: Vec<u128> = pixels.iter().chain(pixels).copied().collect();
        let window = &doubled[offset + 1..offset + kw + 1];
        let weight = &self.weight[row * kw..row * kw + kw];

        let mut result = self.partial[position][row];
        let mut partial = 0;

        for (x, (&pixel, &w)) in window.iter().zip(weight).enumerate() {
            let product = multiply(pixel, c.image_width, w, c.weight_width);
            if offset == kw - 1 || kw - 1 - offset <= x {
                result = accumulate(result, rw, product, pw);
            } else {
                partial = accumulate(partial, rw, product, pw);
            }
        }

        self.partial[position][row] = partial;
        result
    }

    fn drive_idle(&self, sim: &mut dyn SimulationAdapter) {
        sim.drive(IMAGE, BitVector::zero(self.config.image_bus_width()));
        sim.drive(IMAGE_VALID, pack(1, 0));
    }
}

impl CycleChecker for EngineChecker {
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
            self.partial.iter_mut().for_each(|rows| rows.fill(0));
        }
        Ok(())
    }

    fn stats(&self) -> CheckStats {
        self.board.stats()
    }
}

impl<A: SimulationAdapter> Testbench<A, EngineChecker> {
    /// Load the kernel: one clock per weight, then a clearing clock.
    pub fn send_weight(&mut self, weight: &[i128]) -> Result<()> {
        self.checker.load_weight(weight)?;
        for &w in weight {
            self.checker.strobe_weight(&mut self.sim, Some(w));
            self.tick()?;
        }
        self.checker.strobe_weight(&mut self.sim, None);
        self.tick()?;
        Ok(())
    }

    /// Configure the rescale shift: one configuration clock, then a
    /// clearing clock.
    pub fn send_shift(&mut self, shift: u32) -> Result<()> {
        self.checker.load_shift(shift)?;
        self.checker.strobe_shift(&mut self.sim, Some(shift));
        self.tick()?;
        self.checker.strobe_shift(&mut self.sim, None);
        self.tick()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Sink;

    impl SimulationAdapter for Sink {
        fn drive(&mut self, _signal: &str, _value: BitVector) {}
        fn step(&mut self) -> Result<()> {
            Ok(())
        }
        fn observe(&self) -> Signals {
            Signals::new()
        }
    }

    fn word(fields: &[u128]) -> u128 {
        fields
            .iter()
            .enumerate()
            .fold(0, |acc, (x, &f)| acc | (f << (x * 16)))
    }

    #[test]
    fn test_two_beats_unit_kernel() {
        let mut checker = EngineChecker::new(&EngineConfig::default()).unwrap();
        checker.load_weight(&[1; 9]).unwrap();

        let beat: Vec<i128> = [1, 2, 3].repeat(3);
        checker.prep_image(&mut Sink, &beat).unwrap();
        assert_eq!(checker.board.pending, word(&[3, 9, 18]));
        assert_eq!(checker.partial(0, 0), 5);
        assert_eq!(checker.partial(1, 2), 3);
        assert_eq!(checker.partial(2, 1), 0);

        let beat: Vec<i128> = [4, 5, 6].repeat(3);
        checker.prep_image(&mut Sink, &beat).unwrap();
        assert_eq!(checker.board.pending, word(&[27, 36, 45]));
    }

    #[test]
    fn test_window_spans_whole_beat() {
        let mut checker = EngineChecker::new(&EngineConfig::default()).unwrap();
        checker.load_weight(&[1; 9]).unwrap();

        // every row sees [2, 3, 10], [3, 10, 20] and [10, 20, 30]
        checker.prep_image(&mut Sink, &[1, 2, 3, 10, 20, 30, 100, 200, 300]).unwrap();
        assert_eq!(checker.board.pending, word(&[30, 90, 180]));
        assert_eq!(checker.partial(0, 2), 5);
        assert_eq!(checker.partial(1, 0), 3);

        checker.prep_image(&mut Sink, &[4, 5, 6, 40, 50, 60, 400, 500, 600]).unwrap();
        assert_eq!(checker.board.pending, word(&[135, 279, 450]));
    }

    #[test]
    fn test_narrow_image_wraps_across_rows() {
        let config = EngineConfig {
            image_count: 2,
            ..Default::default()
        };
        let mut checker = EngineChecker::new(&config).unwrap();
        checker.load_weight(&[1; 9]).unwrap();

        // beat [1..6]: position 0 window [2, 3, 4], position 1 window [3, 4, 5]
        checker.prep_image(&mut Sink, &[1, 2, 3, 4, 5, 6]).unwrap();
        assert_eq!(checker.board.pending, word(&[12, 27]));
    }

    #[test]
    fn test_shift_and_saturation() {
        let mut checker = EngineChecker::new(&EngineConfig::default()).unwrap();
        checker.load_weight(&[127; 9]).unwrap();
        checker.load_shift(1).unwrap();

        let beat: Vec<i128> = vec![32767; 9];
        checker.prep_image(&mut Sink, &beat).unwrap();
        // position 2 completes 3 rows x 3 taps of 127 * 32767 in one beat
        assert_eq!(checker.board.pending >> 32, 0x7fff);

        let mut checker = EngineChecker::new(&EngineConfig::default()).unwrap();
        checker.load_weight(&[1; 9]).unwrap();
        checker.load_shift(1).unwrap();
        let beat: Vec<i128> = [-1, -2, -3].repeat(3);
        checker.prep_image(&mut Sink, &beat).unwrap();
        // -18 >> 1 at position 2, -3 >> 1 at position 0
        assert_eq!(checker.board.pending >> 32, to_twos(16, -9));
        assert_eq!(checker.board.pending & 0xffff, to_twos(16, -2));
    }

    #[test]
    fn test_shift_must_fit_bus() {
        let mut checker = EngineChecker::new(&EngineConfig::default()).unwrap();
        assert!(checker.load_shift(127).is_ok());
        assert!(matches!(
            checker.load_shift(128),
            Err(OracleError::OutOfRange { width: 7, .. })
        ));
        assert_eq!(checker.shift(), 127);
    }

    #[test]
    fn test_beat_length_checked() {
        let mut checker = EngineChecker::new(&EngineConfig::default()).unwrap();
        assert!(matches!(
            checker.prep_image(&mut Sink, &[1, 2, 3]),
            Err(OracleError::LengthMismatch { given: 3, expected: 9, .. })
        ));
        assert!(checker.load_weight(&[1; 8]).is_err());
    }
}
