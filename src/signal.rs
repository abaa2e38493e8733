//! Bus-Level Values
//!
//! Exact-width bit vectors used to move numbers across the simulation
//! boundary. Buses wider than 128 bits (the engine image bus) are built and
//! read field by field.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::fixed_point::{mask, to_twos};

/// Output values reported by a device after an edge, keyed by signal name.
pub type Signals = BTreeMap<String, BitVector>;

/// Little-endian bit vector of a fixed width.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BitVector {
    width: u32,
    words: Vec<u64>,
}

impl BitVector {
    /// All-zero vector of `width` bits.
    pub fn zero(width: u32) -> Self {
        BitVector {
            width,
            words: vec![0; Self::word_count(width)],
        }
    }

    fn word_count(width: u32) -> usize {
        (width as usize).div_ceil(64).max(1)
    }

    /// Width in bits.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Read a single bit. Bits past the width read as zero.
    pub fn bit(&self, index: u32) -> bool {
        if index >= self.width {
            return false;
        }
        (self.words[(index / 64) as usize] >> (index % 64)) & 1 == 1
    }

    /// Write a single bit. Bits past the width are ignored.
    pub fn set_bit(&mut self, index: u32, value: bool) {
        if index >= self.width {
            return;
        }
        let word = &mut self.words[(index / 64) as usize];
        if value {
            *word |= 1 << (index % 64);
        } else {
            *word &= !(1 << (index % 64));
        }
    }

    /// Read `width` bits starting at bit `lsb`.
    pub fn slice(&self, lsb: u32, width: u32) -> u128 {
        (0..width.min(128))
            .filter(|&i| self.bit(lsb + i))
            .fold(0u128, |acc, i| acc | (1u128 << i))
    }

    /// Write the low `width` bits of `value` starting at bit `lsb`.
    pub fn set_slice(&mut self, lsb: u32, width: u32, value: u128) {
        for i in 0..width.min(128) {
            self.set_bit(lsb + i, (value >> i) & 1 == 1);
        }
    }

    /// Pack equal-width fields, field 0 in the least significant position.
    pub fn from_fields(field_width: u32, fields: &[u128]) -> Self {
        let mut bits = Self::zero(field_width * fields.len() as u32);
        for (x, &field) in fields.iter().enumerate() {
            bits.set_slice(x as u32 * field_width, field_width, field);
        }
        bits
    }

    /// Read field `index` of `field_width` bits.
    pub fn field(&self, index: usize, field_width: u32) -> u128 {
        self.slice(index as u32 * field_width, field_width)
    }

    /// True if every bit is clear.
    pub fn is_zero(&self) -> bool {
        self.words.iter().all(|&w| w == 0)
    }
}

impl fmt::Display for BitVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}'h", self.width)?;
        let mut started = false;
        for (i, word) in self.words.iter().enumerate().rev() {
            if started {
                write!(f, "{:016x}", word)?;
            } else if *word != 0 || i == 0 {
                write!(f, "{:x}", word)?;
                started = true;
            }
        }
        Ok(())
    }
}

/// Serialize a signed integer onto a `width`-bit bus (two's complement).
pub fn pack(width: u32, value: i128) -> BitVector {
    let mut bits = BitVector::zero(width);
    bits.set_slice(0, width, to_twos(width.min(128), value));
    bits
}

/// Read the low `width` bits of a bus as an unsigned pattern.
pub fn unpack(width: u32, bits: &BitVector) -> u128 {
    bits.slice(0, width) & mask(width)
}
