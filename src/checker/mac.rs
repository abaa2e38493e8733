//! Multiply-add unit checker.

use log::debug;

use super::{Scoreboard, RST};
use crate::config::MacConfig;
use crate::error::{OracleError, Result};
use crate::fixed_point::{accumulate, fits, multiply, to_twos};
use crate::signal::{pack, Signals};
use crate::testbench::{CheckStats, CycleChecker, SimulationAdapter};

pub const M1: &str = "m1";
pub const M2: &str = "m2";
pub const ADD: &str = "add";

/// Model of the `multiply_add` block: `result = add + m1 * m2`.
#[derive(Debug, Clone)]
pub struct MacChecker {
    config: MacConfig,
    board: Scoreboard,
}

impl MacChecker {
    pub fn new(config: &MacConfig) -> Result<Self> {
        config.validate()?;
        Ok(MacChecker {
            config: config.clone(),
            board: Scoreboard::new("multiply_add", config.result_width(), config.pipeline_depth),
        })
    }

    pub fn config(&self) -> &MacConfig {
        &self.config
    }

    /// Expected result word for one set of operands.
    pub fn predict(&self, m1: i128, m2: i128, add: i128) -> u128 {
        let c = &self.config;
        let product = multiply(
            to_twos(c.m1_width, m1),
            c.m1_width,
            to_twos(c.m2_width, m2),
            c.m2_width,
        );
        accumulate(
            to_twos(c.result_width(), add),
            c.result_width(),
            product,
            c.product_width(),
        )
    }

    /// Drive 'm1', 'm2' and 'add' for the next edge and predict the result.
    ///
    /// # Errors
    ///
    /// Returns error if any operand does not fit its bus; nothing is driven.
    pub fn set(&mut self, sim: &mut dyn SimulationAdapter, m1: i128, m2: i128, add: i128) -> Result<()> {
        let c = &self.config;
        for (what, value, width) in [
            (M1, m1, c.m1_width),
            (M2, m2, c.m2_width),
            (ADD, add, c.result_width()),
        ] {
            if !fits(width, value) {
                return Err(OracleError::out_of_range(what, value, width));
            }
        }

        sim.drive(M2, pack(c.m2_width, m2));
        sim.drive(M1, pack(c.m1_width, m1));
        sim.drive(ADD, pack(c.result_width(), add));

        let expected = self.predict(m1, m2, add);
        debug!("multiply_add: {m1} * {m2} + {add} -> {expected:#x}");
        self.board.predict(expected);
        Ok(())
    }

    fn drive_idle(&self, sim: &mut dyn SimulationAdapter) {
        sim.drive(M2, pack(self.config.m2_width, 0));
        sim.drive(M1, pack(self.config.m1_width, 0));
        sim.drive(ADD, pack(self.config.result_width(), 0));
    }
}

impl CycleChecker for MacChecker {
    fn name(&self) -> &'static str {
        self.board.name()
    }

    fn reset(&mut self, sim: &mut dyn SimulationAdapter, state: bool) {
        sim.drive(RST, pack(1, i128::from(state)));
        self.board.set_reset(state);
    }

    fn advance(&mut self, observed: &Signals, sim: &mut dyn SimulationAdapter) -> Result<()> {
        self.board.check(observed)?;
        self.drive_idle(sim);
        Ok(())
    }

    fn stats(&self) -> CheckStats {
        self.board.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixed_point::to_signed;

    #[test]
    fn test_predict_signs() {
        let checker = MacChecker::new(&MacConfig::default()).unwrap();
        assert_eq!(checker.predict(5, 1, 0), 5);
        assert_eq!(to_signed(33, checker.predict(-1, 7, 0)), -7);
        assert_eq!(to_signed(33, checker.predict(-1, -10, 0)), 10);
        assert_eq!(to_signed(33, checker.predict(3, 4, -20)), -8);
    }

    #[test]
    fn test_raw_patterns_are_signed() {
        let checker = MacChecker::new(&MacConfig::default()).unwrap();
        // 0xffff on a 16-bit bus is -1
        assert_eq!(checker.predict(0xffff, 2, 0), checker.predict(-1, 2, 0));
    }
}
