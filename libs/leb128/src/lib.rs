// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Read and write the "Little Endian Base 128" (LEB128) variable length
//! integer encoding used throughout the WebAssembly binary format.
//!
//! Unlike the unbounded DWARF flavour, every reader here is bounded by the
//! width of its target type: at most 5 bytes for 32-bit values and at most 10
//! bytes for 64-bit values. Encodings that are longer, or whose final byte
//! carries bits that do not fit the target type, are rejected.
//!
//! ```
//! use regwasm_leb128::{Leb128Read, Leb128Write};
//!
//! let mut buf = Vec::new();
//! buf.write_sleb128(-12345).expect("Should write number");
//! buf.write_uleb128(98765).expect("Should write number");
//!
//! let mut readable = &buf[..];
//! assert_eq!(readable.read_var_i32().expect("Should read number"), -12345);
//! assert_eq!(readable.read_var_u32().expect("Should read number"), 98765);
//! ```

use std::mem;

#[derive(Debug, Clone, Copy, PartialEq, Eq, onlyerror::Error)]
pub enum Error {
    /// Ran out of bytes in the middle of a number.
    UnexpectedEof,
    /// The encoded number does not fit into the requested integer type.
    Overflow,
    /// The output buffer is too small for the encoded number.
    NotEnoughSpace,
}

pub type Result<T> = core::result::Result<T, Error>;

const CONTINUATION_BIT: u8 = 1 << 7;
const SIGN_BIT: u8 = 1 << 6;

/// Bounded LEB128 readers.
///
/// Implementors only provide [`Leb128Read::read_byte`], the width specific
/// decoders are derived from it.
pub trait Leb128Read {
    #[doc(hidden)]
    fn read_byte(&mut self) -> Result<u8>;

    fn read_var_u32(&mut self) -> Result<u32> {
        let value = read_unsigned(self, u32::BITS)?;
        u32::try_from(value).map_err(|_| Error::Overflow)
    }

    fn read_var_u64(&mut self) -> Result<u64> {
        read_unsigned(self, u64::BITS)
    }

    fn read_var_i32(&mut self) -> Result<i32> {
        let value = read_signed(self, i32::BITS)?;
        i32::try_from(value).map_err(|_| Error::Overflow)
    }

    fn read_var_i64(&mut self) -> Result<i64> {
        read_signed(self, i64::BITS)
    }
}

impl Leb128Read for &[u8] {
    fn read_byte(&mut self) -> Result<u8> {
        let (byte, rest) = self.split_first().ok_or(Error::UnexpectedEof)?;
        *self = rest;
        Ok(*byte)
    }
}

fn read_unsigned<R: Leb128Read + ?Sized>(reader: &mut R, bits: u32) -> Result<u64> {
    let max_bytes = bits.div_ceil(7);
    let mut result = 0u64;
    let mut shift = 0u32;

    for _ in 0..max_bytes {
        let byte = reader.read_byte()?;
        let low_bits = u64::from(low_bits_of_byte(byte));

        if shift + 7 > bits {
            // the last permitted byte: payload bits above the type width must be clear
            if byte & CONTINUATION_BIT != 0 || low_bits >> (bits - shift) != 0 {
                return Err(Error::Overflow);
            }
        }

        result |= low_bits << shift;

        if byte & CONTINUATION_BIT == 0 {
            return Ok(result);
        }

        shift += 7;
    }

    Err(Error::Overflow)
}

fn read_signed<R: Leb128Read + ?Sized>(reader: &mut R, bits: u32) -> Result<i64> {
    let max_bytes = bits.div_ceil(7);
    let mut result = 0i64;
    let mut shift = 0u32;

    for _ in 0..max_bytes {
        let byte = reader.read_byte()?;

        if shift + 7 > bits {
            if byte & CONTINUATION_BIT != 0 {
                return Err(Error::Overflow);
            }

            // the sign bit of the value and every unused bit above it must agree
            let used = bits - shift;
            let upper = low_bits_of_byte(byte) >> (used - 1);
            let all_ones = low_bits_of_byte(!0) >> (used - 1);
            if upper != 0 && upper != all_ones {
                return Err(Error::Overflow);
            }
        }

        result |= i64::from(low_bits_of_byte(byte)) << shift;
        shift += 7;

        if byte & CONTINUATION_BIT == 0 {
            if shift < i64::BITS && byte & SIGN_BIT == SIGN_BIT {
                // Sign extend the result.
                result |= !0 << shift;
            }
            return Ok(result);
        }
    }

    Err(Error::Overflow)
}

pub trait Leb128Write {
    fn write_byte(&mut self, val: u8) -> Result<()>;

    fn write_uleb128(&mut self, mut val: u64) -> Result<usize> {
        let mut bytes_written = 0;
        loop {
            let mut byte = low_bits_of_u64(val);
            val >>= 7;
            if val != 0 {
                // More bytes to come, so set the continuation bit.
                byte |= CONTINUATION_BIT;
            }

            self.write_byte(byte)?;
            bytes_written += 1;

            if val == 0 {
                return Ok(bytes_written);
            }
        }
    }

    fn write_sleb128(&mut self, mut val: i64) -> Result<usize> {
        let mut bytes_written = 0;
        loop {
            let mut byte = val.to_le_bytes()[0];
            // Keep the sign bit for testing
            val >>= 6;
            let done = val == 0 || val == -1;
            if done {
                byte &= !CONTINUATION_BIT;
            } else {
                // Remove the sign bit
                val >>= 1;
                // More bytes to come, so set the continuation bit.
                byte |= CONTINUATION_BIT;
            }

            self.write_byte(byte)?;
            bytes_written += 1;

            if done {
                return Ok(bytes_written);
            }
        }
    }
}

impl Leb128Write for &mut [u8] {
    #[inline]
    fn write_byte(&mut self, val: u8) -> Result<()> {
        let (a, b) = mem::take(self)
            .split_first_mut()
            .ok_or(Error::NotEnoughSpace)?;
        *a = val;
        *self = b;
        Ok(())
    }
}

impl Leb128Write for Vec<u8> {
    #[inline]
    fn write_byte(&mut self, val: u8) -> Result<()> {
        self.push(val);
        Ok(())
    }
}

#[inline]
fn low_bits_of_byte(byte: u8) -> u8 {
    byte & !CONTINUATION_BIT
}

#[inline]
fn low_bits_of_u64(val: u64) -> u8 {
    low_bits_of_byte(val.to_le_bytes()[0])
}
