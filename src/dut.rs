//! Behavioral Devices
//!
//! Cycle-level models of the three blocks that speak the same signal
//! protocol as the HDL simulation. They stand in for the external simulator
//! when running the checkers from the command line or in tests.
//!
//! Each device latches its driven inputs on `step()`, pushes the computed
//! word into an output register chain, and reports the word leaving the
//! chain. A synchronous reset clears every register on the edge it is seen.

use std::collections::VecDeque;

use log::trace;
use serde::{Deserialize, Serialize};

use crate::checker::{engine, mac, slice, RESULT, RST};
use crate::config::{EngineConfig, MacConfig, SliceConfig};
use crate::error::Result;
use crate::fixed_point::{accumulate, group_sum, mask, multiply, rescale};
use crate::signal::{unpack, BitVector, Signals};
use crate::testbench::SimulationAdapter;

/// Input signals as last driven.
#[derive(Debug, Clone, Default)]
struct InputPort {
    values: Signals,
}

impl InputPort {
    fn set(&mut self, signal: &str, value: BitVector) {
        self.values.insert(signal.to_string(), value);
    }

    fn read(&self, signal: &str, width: u32) -> u128 {
        self.values.get(signal).map_or(0, |bits| unpack(width, bits))
    }

    fn high(&self, signal: &str) -> bool {
        self.read(signal, 1) == 1
    }

    fn bit(&self, signal: &str, index: usize) -> bool {
        self.values.get(signal).is_some_and(|bits| bits.bit(index as u32))
    }

    fn field(&self, signal: &str, index: usize, width: u32) -> u128 {
        self.values.get(signal).map_or(0, |bits| bits.field(index, width))
    }
}

/// Output register chain of a pipelined block.
#[derive(Debug, Clone)]
struct OutputStages {
    stages: VecDeque<u128>,
    result: u128,
}

impl OutputStages {
    fn new(depth: usize) -> Self {
        OutputStages {
            stages: VecDeque::from(vec![0; depth]),
            result: 0,
        }
    }

    fn clock(&mut self, value: u128, reset: bool) {
        self.stages.push_back(value);
        self.result = self.stages.pop_front().unwrap_or_default();
        if reset {
            self.stages.iter_mut().for_each(|s| *s = 0);
        }
    }

    fn signals(&self, width: u32) -> Signals {
        let mut out = Signals::new();
        out.insert(RESULT.to_string(), BitVector::from_fields(width, &[self.result]));
        out
    }
}

/// `multiply_add` device.
#[derive(Debug, Clone)]
pub struct MacDevice {
    config: MacConfig,
    inputs: InputPort,
    output: OutputStages,
}

impl MacDevice {
    pub fn new(config: &MacConfig) -> Self {
        MacDevice {
            config: config.clone(),
            inputs: InputPort::default(),
            output: OutputStages::new(config.pipeline_depth),
        }
    }
}

impl SimulationAdapter for MacDevice {
    fn drive(&mut self, signal: &str, value: BitVector) {
        self.inputs.set(signal, value);
    }

    fn step(&mut self) -> Result<()> {
        let c = &self.config;
        let m1 = self.inputs.read(mac::M1, c.m1_width);
        let m2 = self.inputs.read(mac::M2, c.m2_width);
        let add = self.inputs.read(mac::ADD, c.result_width());

        let product = multiply(m1, c.m1_width, m2, c.m2_width);
        let value = accumulate(add, c.result_width(), product, c.product_width());
        self.output.clock(value, self.inputs.high(RST));
        Ok(())
    }

    fn observe(&self) -> Signals {
        self.output.signals(self.config.result_width())
    }
}

/// `slice` device.
#[derive(Debug, Clone)]
pub struct SliceDevice {
    config: SliceConfig,
    inputs: InputPort,
    weight: Vec<u128>,
    carry: u128,
    output: OutputStages,
}

impl SliceDevice {
    pub fn new(config: &SliceConfig) -> Self {
        SliceDevice {
            config: config.clone(),
            inputs: InputPort::default(),
            weight: vec![0; config.mac_count],
            carry: 0,
            output: OutputStages::new(config.pipeline_depth),
        }
    }
}

impl SimulationAdapter for SliceDevice {
    fn drive(&mut self, signal: &str, value: BitVector) {
        self.inputs.set(signal, value);
    }

    fn step(&mut self) -> Result<()> {
        let c = &self.config;
        let n = c.mac_count;
        let (rw, pw) = (c.result_width(), c.product_width());

        let w = self.inputs.read(slice::WEIGHT, c.weight_width);
        for (x, slot) in self.weight.iter_mut().enumerate() {
            if self.inputs.bit(slice::WEIGHT_VALID, x) {
                *slot = w;
            }
        }

        let mut sum = 0;
        if self.inputs.high(slice::IMAGE_VALID) {
            // lanes [0, offset) close the previous beat's sum
            let split = if c.offset == 0 { n } else { c.offset };
            let products: Vec<u128> = (0..n)
                .map(|x| {
                    let pixel = self.inputs.field(slice::IMAGE, x, c.image_width);
                    multiply(pixel, c.image_width, self.weight[x], c.weight_width)
                })
                .collect();
            sum = products[..split]
                .iter()
                .fold(self.carry, |acc, &p| accumulate(acc, rw, p, pw));
            self.carry = products[split..]
                .iter()
                .fold(0, |acc, &p| accumulate(acc, rw, p, pw));
        }

        let reset = self.inputs.high(RST);
        self.output.clock(sum, reset);
        if reset {
            self.weight.fill(0);
            self.carry = 0;
        }
        Ok(())
    }

    fn observe(&self) -> Signals {
        self.output.signals(self.config.result_width())
    }
}

/// `engine` device.
#[derive(Debug, Clone)]
pub struct EngineDevice {
    config: EngineConfig,
    inputs: InputPort,
    /// Kernel shift register, newest weight last
    weight: VecDeque<u128>,
    shift: u32,
    /// Carried partial sums, indexed `[position][row]`
    carry: Vec<Vec<u128>>,
    output: OutputStages,
}

impl EngineDevice {
    pub fn new(config: &EngineConfig) -> Self {
        EngineDevice {
            config: config.clone(),
            inputs: InputPort::default(),
            weight: VecDeque::from(vec![0; config.kernel_count()]),
            shift: 0,
            carry: vec![vec![0; config.kernel_height]; config.image_count],
            output: OutputStages::new(config.pipeline_depth),
        }
    }

    fn beat(&mut self) -> u128 {
        let c = &self.config;
        let (n, kw, len) = (c.image_count, c.kernel_width, c.beat_len());
        let (rw, pw, iw) = (c.result_width(), c.product_width(), c.image_width);

        let mut word = 0;
        for position in 0..n {
            let offset = position.min(kw - 1);
            // taps at or past `first` finish on this beat
            let first = if offset == kw - 1 { 0 } else { kw - 1 - offset };

            let mut rows = Vec::with_capacity(c.kernel_height);
            for row in 0..c.kernel_height {
                let mut sum = self.carry[position][row];
                let mut carry = 0;
                for tap in 0..kw {
                    let pixel = self.inputs.field(engine::IMAGE, (offset + 1 + tap) % len, iw);
                    let product = multiply(pixel, iw, self.weight[row * kw + tap], c.weight_width);
                    if tap >= first {
                        sum = accumulate(sum, rw, product, pw);
                    } else {
                        carry = accumulate(carry, rw, product, pw);
                    }
                }
                self.carry[position][row] = carry;
                rows.push(sum);
            }

            word |= rescale(group_sum(&rows, rw), rw, iw, self.shift) << (position as u32 * iw);
        }
        word & mask(c.word_width())
    }
}

impl SimulationAdapter for EngineDevice {
    fn drive(&mut self, signal: &str, value: BitVector) {
        self.inputs.set(signal, value);
    }

    fn step(&mut self) -> Result<()> {
        let c = &self.config;
        if self.inputs.high(engine::WEIGHT_VALID) {
            let w = self.inputs.read(engine::WEIGHT, c.weight_width);
            self.weight.pop_front();
            self.weight.push_back(w);
        }
        if self.inputs.high(engine::CFG_VALID) {
            self.shift = self.inputs.read(engine::CFG_SHIFT, c.shift_width) as u32;
        }

        let word = if self.inputs.high(engine::IMAGE_VALID) {
            self.beat()
        } else {
            0
        };

        let reset = self.inputs.high(RST);
        self.output.clock(word, reset);
        if reset {
            self.weight.iter_mut().for_each(|w| *w = 0);
            self.carry.iter_mut().for_each(|rows| rows.fill(0));
        }
        Ok(())
    }

    fn observe(&self) -> Signals {
        self.output.signals(self.config.word_width())
    }
}

/// Corrupt the result bus on one edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputFault {
    /// Edge index (from 0) whose output is corrupted
    pub cycle: u64,
    /// Bits flipped in the result
    pub flip: u128,
}

/// Adapter wrapper that injects an [`OutputFault`] into another device.
#[derive(Debug, Clone)]
pub struct FaultInjector<A> {
    inner: A,
    fault: Option<OutputFault>,
    edges: u64,
}

impl<A: SimulationAdapter> FaultInjector<A> {
    pub fn new(inner: A, fault: Option<OutputFault>) -> Self {
        FaultInjector {
            inner,
            fault,
            edges: 0,
        }
    }
}

impl<A: SimulationAdapter> SimulationAdapter for FaultInjector<A> {
    fn drive(&mut self, signal: &str, value: BitVector) {
        self.inner.drive(signal, value);
    }

    fn step(&mut self) -> Result<()> {
        self.inner.step()?;
        self.edges += 1;
        Ok(())
    }

    fn observe(&self) -> Signals {
        let mut out = self.inner.observe();
        if let Some(fault) = self.fault.filter(|f| f.cycle + 1 == self.edges) {
            if let Some(bits) = out.get_mut(RESULT) {
                let width = bits.width();
                let value = (unpack(width, bits) ^ fault.flip) & mask(width);
                trace!("fault injected at cycle {}: {:#x}", fault.cycle, value);
                *bits = BitVector::from_fields(width, &[value]);
            }
        }
        out
    }
}
