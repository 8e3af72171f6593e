// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use crate::ValueType;

/// Possible runtime values that a WebAssembly module can either consume or
/// produce.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Val {
    /// A 32-bit integer.
    I32(i32),

    /// A 64-bit integer.
    I64(i64),

    /// A 32-bit float.
    ///
    /// Note that the raw bits of the float are stored here, and you can use
    /// `f32::from_bits` to create an `f32` value.
    F32(u32),

    /// A 64-bit float.
    ///
    /// Note that the raw bits of the float are stored here, and you can use
    /// `f64::from_bits` to create an `f64` value.
    F64(u64),
}

// ===== impl Val =====

impl Val {
    /// Returns the default (zero) value for the given type.
    pub fn default_for_ty(ty: ValueType) -> Val {
        Val::from_bits(ty, 0)
    }

    pub fn ty(&self) -> ValueType {
        match self {
            Val::I32(_) => ValueType::I32,
            Val::I64(_) => ValueType::I64,
            Val::F32(_) => ValueType::F32,
            Val::F64(_) => ValueType::F64,
        }
    }

    /// Reinterprets a register slot as a value of type `ty`.
    ///
    /// 32-bit values occupy the low half of the slot.
    pub(crate) fn from_bits(ty: ValueType, bits: u64) -> Val {
        let low = bits.to_le_bytes();
        let low = [low[0], low[1], low[2], low[3]];
        match ty {
            ValueType::I32 => Val::I32(i32::from_le_bytes(low)),
            ValueType::I64 => Val::I64(i64::from_le_bytes(bits.to_le_bytes())),
            ValueType::F32 => Val::F32(u32::from_le_bytes(low)),
            ValueType::F64 => Val::F64(bits),
        }
    }

    pub(crate) fn to_bits(self) -> u64 {
        match self {
            Val::I32(v) => u64::from(u32::from_le_bytes(v.to_le_bytes())),
            Val::I64(v) => u64::from_le_bytes(v.to_le_bytes()),
            Val::F32(v) => u64::from(v),
            Val::F64(v) => v,
        }
    }

    /// The value as an `i32`, or `None` for any other type.
    pub fn i32(self) -> Option<i32> {
        match self {
            Val::I32(v) => Some(v),
            _ => None,
        }
    }

    pub fn i64(self) -> Option<i64> {
        match self {
            Val::I64(v) => Some(v),
            _ => None,
        }
    }

    pub fn f32(self) -> Option<f32> {
        match self {
            Val::F32(bits) => Some(f32::from_bits(bits)),
            _ => None,
        }
    }

    pub fn f64(self) -> Option<f64> {
        match self {
            Val::F64(bits) => Some(f64::from_bits(bits)),
            _ => None,
        }
    }
}

impl From<i32> for Val {
    #[inline]
    fn from(val: i32) -> Val {
        Val::I32(val)
    }
}

impl From<i64> for Val {
    #[inline]
    fn from(val: i64) -> Val {
        Val::I64(val)
    }
}

impl From<f32> for Val {
    #[inline]
    fn from(val: f32) -> Val {
        Val::F32(val.to_bits())
    }
}

impl From<f64> for Val {
    #[inline]
    fn from(val: f64) -> Val {
        Val::F64(val.to_bits())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bits_round_trip() {
        for val in [
            Val::I32(-1),
            Val::I64(i64::MIN),
            Val::from(-0.5f32),
            Val::from(f64::INFINITY),
        ] {
            assert_eq!(Val::from_bits(val.ty(), val.to_bits()), val);
        }

        assert_eq!(Val::I32(-1).to_bits(), 0xffff_ffff);
        assert_eq!(Val::default_for_ty(ValueType::F64), Val::F64(0));
        assert_eq!(Val::from(1.5f64).f64(), Some(1.5));
        assert_eq!(Val::from(-0.5f32).f32(), Some(-0.5));
        assert_eq!(Val::from(-0.5f32).f64(), None);
        assert_eq!(Val::I32(-7).i32(), Some(-7));
        assert_eq!(Val::I32(1).i64(), None);
    }
}
