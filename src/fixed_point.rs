//! Fixed-Point Arithmetic Model
//!
//! Bit-exact two's-complement primitives shared by every checker. Values are
//! carried as `u128` bit patterns normalized to a declared width; the width is
//! always passed alongside the value, never stored with it.
//!
//! All derived widths of a validated configuration stay at or below
//! [`MAX_WIDTH`], so intermediate sums of two normalized values never leave
//! the `u128` range.

/// Widest value any primitive is asked to hold.
pub const MAX_WIDTH: u32 = 126;

/// All-ones mask of `width` bits.
#[inline]
pub fn mask(width: u32) -> u128 {
    if width >= 128 {
        u128::MAX
    } else {
        (1u128 << width) - 1
    }
}

/// Convert a signed integer into its `width`-bit two's-complement pattern.
///
/// Negative numbers wrap at the width boundary; positive numbers are masked
/// so no bits beyond `width` survive. Idempotent.
#[inline]
pub fn to_twos(width: u32, value: i128) -> u128 {
    (value as u128) & mask(width)
}

/// Reinterpret a `width`-bit pattern as a signed integer.
#[inline]
pub fn to_signed(width: u32, value: u128) -> i128 {
    if width == 0 {
        return 0;
    }
    let pad = 128 - width.min(128);
    ((value << pad) as i128) >> pad
}

/// True if `value` can be driven onto a `width`-bit bus, either as a signed
/// number or as a raw unsigned pattern.
#[inline]
pub fn fits(width: u32, value: i128) -> bool {
    let span = 1i128 << width.min(MAX_WIDTH);
    value >= -(span >> 1) && value < span
}

/// Extend the sign bit of a `from_width` pattern up to `to_width` bits.
pub fn sign_extend(to_width: u32, from_width: u32, value: u128) -> u128 {
    let value = value & mask(from_width);
    if from_width > 0 && (value >> (from_width - 1)) & 1 == 1 {
        (mask(to_width) ^ mask(from_width)) | value
    } else {
        value
    }
}

/// Two's-complement multiply. The result is `width_a + width_b` bits wide,
/// which always holds the exact product.
pub fn multiply(a: u128, width_a: u32, b: u128, width_b: u32) -> u128 {
    let width = width_a + width_b;
    let a = sign_extend(width, width_a, a);
    let b = sign_extend(width, width_b, b);
    a.wrapping_mul(b) & mask(width)
}

/// Two's-complement addition of a product into an accumulator.
///
/// Callers size the accumulator one bit wider than the product.
pub fn accumulate(acc: u128, width_acc: u32, product: u128, width_product: u32) -> u128 {
    let acc = acc & mask(width_acc);
    let product = sign_extend(width_acc, width_product, product);
    (acc + product) & mask(width_acc)
}

/// Sum a group of `result_width` terms with two guard bits, wrapping the
/// total back to `result_width`.
pub fn group_sum(terms: &[u128], result_width: u32) -> u128 {
    let width_sum = result_width + 2;
    terms
        .iter()
        .map(|&t| sign_extend(width_sum, result_width, t))
        .fold(0u128, u128::wrapping_add)
        & mask(result_width)
}

/// Bounded rescale of a `result_width` number into the image range.
///
/// Negative inputs are only treated as negative while
/// `result_width >= image_width + shift`; past that point the raw pattern is
/// shifted as an unsigned number. The shifted value saturates at the signed
/// `image_width` limits.
pub fn rescale(value: u128, result_width: u32, image_width: u32, shift: u32) -> u128 {
    let number = value & mask(result_width);
    let negative = (number >> (result_width - 1)) & 1 == 1;

    let gated = result_width
        .checked_sub(image_width)
        .is_some_and(|room| shift <= room);
    let number = if negative && gated {
        to_signed(result_width, number)
    } else {
        number as i128
    };

    let img_max = (1i128 << (image_width - 1)) - 1;
    let img_min = -img_max - 1;

    let shifted = number >> shift.min(127);
    to_twos(image_width, shifted.clamp(img_min, img_max))
}
