// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Numeric instruction semantics on raw register bits.

#![allow(
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss,
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_lossless,
    reason = "instructions reinterpret and convert register bits as WebAssembly defines"
)]

use regwasm_reader::{BinaryOp, UnaryOp};

use crate::trap::Trap;

const F32_SIGN: u32 = 0x8000_0000;
const F64_SIGN: u64 = 0x8000_0000_0000_0000;

#[inline]
fn u32_of(bits: u64) -> u32 {
    bits as u32
}

#[inline]
fn i32_of(bits: u64) -> i32 {
    bits as u32 as i32
}

#[inline]
fn f32_of(bits: u64) -> f32 {
    f32::from_bits(bits as u32)
}

#[inline]
fn f64_of(bits: u64) -> f64 {
    f64::from_bits(bits)
}

#[inline]
fn from_u32(value: u32) -> u64 {
    value as u64
}

#[inline]
fn from_i32(value: i32) -> u64 {
    value as u32 as u64
}

#[inline]
fn from_f32(value: f32) -> u64 {
    value.to_bits() as u64
}

#[inline]
fn from_bool(value: bool) -> u64 {
    value as u64
}

pub(super) fn unary(op: UnaryOp, x: u64) -> Result<u64, Trap> {
    use UnaryOp::*;

    let bits = match op {
        I32Eqz => from_bool(u32_of(x) == 0),
        I64Eqz => from_bool(x == 0),
        I32Clz => from_u32(u32_of(x).leading_zeros()),
        I32Ctz => from_u32(u32_of(x).trailing_zeros()),
        I32Popcnt => from_u32(u32_of(x).count_ones()),
        I64Clz => x.leading_zeros() as u64,
        I64Ctz => x.trailing_zeros() as u64,
        I64Popcnt => x.count_ones() as u64,

        F32Abs => from_u32(u32_of(x) & !F32_SIGN),
        F32Neg => from_u32(u32_of(x) ^ F32_SIGN),
        F32Ceil => from_f32(f32_of(x).ceil()),
        F32Floor => from_f32(f32_of(x).floor()),
        F32Trunc => from_f32(f32_of(x).trunc()),
        F32Nearest => from_f32(f32_of(x).round_ties_even()),
        F32Sqrt => from_f32(f32_of(x).sqrt()),
        F64Abs => x & !F64_SIGN,
        F64Neg => x ^ F64_SIGN,
        F64Ceil => f64_of(x).ceil().to_bits(),
        F64Floor => f64_of(x).floor().to_bits(),
        F64Trunc => f64_of(x).trunc().to_bits(),
        F64Nearest => f64_of(x).round_ties_even().to_bits(),
        F64Sqrt => f64_of(x).sqrt().to_bits(),

        I32WrapI64 => from_u32(x as u32),
        I32TruncF32S => from_i32(trunc_i32(f32_of(x) as f64)?),
        I32TruncF32U => from_u32(trunc_u32(f32_of(x) as f64)?),
        I32TruncF64S => from_i32(trunc_i32(f64_of(x))?),
        I32TruncF64U => from_u32(trunc_u32(f64_of(x))?),
        I64ExtendI32S => i32_of(x) as i64 as u64,
        I64ExtendI32U => from_u32(u32_of(x)),
        I64TruncF32S => trunc_i64(f32_of(x) as f64)? as u64,
        I64TruncF32U => trunc_u64(f32_of(x) as f64)?,
        I64TruncF64S => trunc_i64(f64_of(x))? as u64,
        I64TruncF64U => trunc_u64(f64_of(x))?,

        F32ConvertI32S => from_f32(i32_of(x) as f32),
        F32ConvertI32U => from_f32(u32_of(x) as f32),
        F32ConvertI64S => from_f32(x as i64 as f32),
        F32ConvertI64U => from_f32(x as f32),
        F32DemoteF64 => from_f32(f64_of(x) as f32),
        F64ConvertI32S => (i32_of(x) as f64).to_bits(),
        F64ConvertI32U => (u32_of(x) as f64).to_bits(),
        F64ConvertI64S => (x as i64 as f64).to_bits(),
        F64ConvertI64U => (x as f64).to_bits(),
        F64PromoteF32 => (f32_of(x) as f64).to_bits(),

        // registers already hold the raw bits
        I32ReinterpretF32 | F32ReinterpretI32 => from_u32(u32_of(x)),
        I64ReinterpretF64 | F64ReinterpretI64 => x,
    };

    Ok(bits)
}

pub(super) fn binary(op: BinaryOp, a: u64, b: u64) -> Result<u64, Trap> {
    use BinaryOp::*;

    let bits = match op {
        I32Eq => from_bool(u32_of(a) == u32_of(b)),
        I32Ne => from_bool(u32_of(a) != u32_of(b)),
        I32LtS => from_bool(i32_of(a) < i32_of(b)),
        I32LtU => from_bool(u32_of(a) < u32_of(b)),
        I32GtS => from_bool(i32_of(a) > i32_of(b)),
        I32GtU => from_bool(u32_of(a) > u32_of(b)),
        I32LeS => from_bool(i32_of(a) <= i32_of(b)),
        I32LeU => from_bool(u32_of(a) <= u32_of(b)),
        I32GeS => from_bool(i32_of(a) >= i32_of(b)),
        I32GeU => from_bool(u32_of(a) >= u32_of(b)),
        I64Eq => from_bool(a == b),
        I64Ne => from_bool(a != b),
        I64LtS => from_bool((a as i64) < (b as i64)),
        I64LtU => from_bool(a < b),
        I64GtS => from_bool((a as i64) > (b as i64)),
        I64GtU => from_bool(a > b),
        I64LeS => from_bool((a as i64) <= (b as i64)),
        I64LeU => from_bool(a <= b),
        I64GeS => from_bool((a as i64) >= (b as i64)),
        I64GeU => from_bool(a >= b),
        F32Eq => from_bool(f32_of(a) == f32_of(b)),
        F32Ne => from_bool(f32_of(a) != f32_of(b)),
        F32Lt => from_bool(f32_of(a) < f32_of(b)),
        F32Gt => from_bool(f32_of(a) > f32_of(b)),
        F32Le => from_bool(f32_of(a) <= f32_of(b)),
        F32Ge => from_bool(f32_of(a) >= f32_of(b)),
        F64Eq => from_bool(f64_of(a) == f64_of(b)),
        F64Ne => from_bool(f64_of(a) != f64_of(b)),
        F64Lt => from_bool(f64_of(a) < f64_of(b)),
        F64Gt => from_bool(f64_of(a) > f64_of(b)),
        F64Le => from_bool(f64_of(a) <= f64_of(b)),
        F64Ge => from_bool(f64_of(a) >= f64_of(b)),

        I32Add => from_u32(u32_of(a).wrapping_add(u32_of(b))),
        I32Sub => from_u32(u32_of(a).wrapping_sub(u32_of(b))),
        I32Mul => from_u32(u32_of(a).wrapping_mul(u32_of(b))),
        I32DivS => {
            let (a, b) = (i32_of(a), i32_of(b));
            if b == 0 {
                return Err(Trap::IntegerDivisionByZero);
            }
            from_i32(a.checked_div(b).ok_or(Trap::IntegerOverflow)?)
        }
        I32DivU => from_u32(
            u32_of(a)
                .checked_div(u32_of(b))
                .ok_or(Trap::IntegerDivisionByZero)?,
        ),
        I32RemS => {
            let (a, b) = (i32_of(a), i32_of(b));
            if b == 0 {
                return Err(Trap::IntegerDivisionByZero);
            }
            from_i32(a.wrapping_rem(b))
        }
        I32RemU => from_u32(
            u32_of(a)
                .checked_rem(u32_of(b))
                .ok_or(Trap::IntegerDivisionByZero)?,
        ),
        I32And => from_u32(u32_of(a) & u32_of(b)),
        I32Or => from_u32(u32_of(a) | u32_of(b)),
        I32Xor => from_u32(u32_of(a) ^ u32_of(b)),
        I32Shl => from_u32(u32_of(a).wrapping_shl(u32_of(b))),
        I32ShrS => from_i32(i32_of(a).wrapping_shr(u32_of(b))),
        I32ShrU => from_u32(u32_of(a).wrapping_shr(u32_of(b))),
        I32Rotl => from_u32(u32_of(a).rotate_left(u32_of(b))),
        I32Rotr => from_u32(u32_of(a).rotate_right(u32_of(b))),

        I64Add => a.wrapping_add(b),
        I64Sub => a.wrapping_sub(b),
        I64Mul => a.wrapping_mul(b),
        I64DivS => {
            let (a, b) = (a as i64, b as i64);
            if b == 0 {
                return Err(Trap::IntegerDivisionByZero);
            }
            a.checked_div(b).ok_or(Trap::IntegerOverflow)? as u64
        }
        I64DivU => a.checked_div(b).ok_or(Trap::IntegerDivisionByZero)?,
        I64RemS => {
            let (a, b) = (a as i64, b as i64);
            if b == 0 {
                return Err(Trap::IntegerDivisionByZero);
            }
            a.wrapping_rem(b) as u64
        }
        I64RemU => a.checked_rem(b).ok_or(Trap::IntegerDivisionByZero)?,
        I64And => a & b,
        I64Or => a | b,
        I64Xor => a ^ b,
        I64Shl => a.wrapping_shl(b as u32),
        I64ShrS => (a as i64).wrapping_shr(b as u32) as u64,
        I64ShrU => a.wrapping_shr(b as u32),
        I64Rotl => a.rotate_left((b % 64) as u32),
        I64Rotr => a.rotate_right((b % 64) as u32),

        F32Add => from_f32(f32_of(a) + f32_of(b)),
        F32Sub => from_f32(f32_of(a) - f32_of(b)),
        F32Mul => from_f32(f32_of(a) * f32_of(b)),
        F32Div => from_f32(f32_of(a) / f32_of(b)),
        F32Min => from_f32(f32_min(f32_of(a), f32_of(b))),
        F32Max => from_f32(f32_max(f32_of(a), f32_of(b))),
        F32Copysign => from_u32((u32_of(a) & !F32_SIGN) | (u32_of(b) & F32_SIGN)),
        F64Add => (f64_of(a) + f64_of(b)).to_bits(),
        F64Sub => (f64_of(a) - f64_of(b)).to_bits(),
        F64Mul => (f64_of(a) * f64_of(b)).to_bits(),
        F64Div => (f64_of(a) / f64_of(b)).to_bits(),
        F64Min => f64_min(f64_of(a), f64_of(b)).to_bits(),
        F64Max => f64_max(f64_of(a), f64_of(b)).to_bits(),
        F64Copysign => (a & !F64_SIGN) | (b & F64_SIGN),
    };

    Ok(bits)
}

// `min` and `max` propagate NaN and order -0 below +0, unlike `f32::min`.

fn f32_min(a: f32, b: f32) -> f32 {
    if a.is_nan() || b.is_nan() {
        f32::NAN
    } else if a == b {
        f32::from_bits(a.to_bits() | b.to_bits())
    } else {
        a.min(b)
    }
}

fn f32_max(a: f32, b: f32) -> f32 {
    if a.is_nan() || b.is_nan() {
        f32::NAN
    } else if a == b {
        f32::from_bits(a.to_bits() & b.to_bits())
    } else {
        a.max(b)
    }
}

fn f64_min(a: f64, b: f64) -> f64 {
    if a.is_nan() || b.is_nan() {
        f64::NAN
    } else if a == b {
        f64::from_bits(a.to_bits() | b.to_bits())
    } else {
        a.min(b)
    }
}

fn f64_max(a: f64, b: f64) -> f64 {
    if a.is_nan() || b.is_nan() {
        f64::NAN
    } else if a == b {
        f64::from_bits(a.to_bits() & b.to_bits())
    } else {
        a.max(b)
    }
}

/// Truncates toward zero, trapping on NaN and on results outside
/// `(lower, upper)` exclusive.
fn checked_trunc(value: f64, lower: f64, upper: f64) -> Result<f64, Trap> {
    if value.is_nan() {
        return Err(Trap::BadConversionToInteger);
    }
    let truncated = value.trunc();
    if truncated <= lower || truncated >= upper {
        return Err(Trap::IntegerOverflow);
    }
    Ok(truncated)
}

fn trunc_i32(value: f64) -> Result<i32, Trap> {
    checked_trunc(value, -2_147_483_649.0, 2_147_483_648.0).map(|v| v as i32)
}

fn trunc_u32(value: f64) -> Result<u32, Trap> {
    checked_trunc(value, -1.0, 4_294_967_296.0).map(|v| v as u32)
}

fn trunc_i64(value: f64) -> Result<i64, Trap> {
    // -2^63 is exactly representable, the next smaller double is not a valid i64
    if value.trunc() == -9_223_372_036_854_775_808.0 {
        return Ok(i64::MIN);
    }
    checked_trunc(value, -9_223_372_036_854_775_808.0, 9_223_372_036_854_775_808.0)
        .map(|v| v as i64)
}

fn trunc_u64(value: f64) -> Result<u64, Trap> {
    checked_trunc(value, -1.0, 18_446_744_073_709_551_616.0).map(|v| v as u64)
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn i32_bits(value: i32) -> u64 {
        from_i32(value)
    }

    #[test]
    fn integer_division() {
        assert_eq!(binary(BinaryOp::I32DivS, i32_bits(-7), i32_bits(2)).unwrap(), i32_bits(-3));
        assert_eq!(binary(BinaryOp::I32RemS, i32_bits(-7), i32_bits(2)).unwrap(), i32_bits(-1));
        assert!(matches!(
            binary(BinaryOp::I32DivU, 1, 0),
            Err(Trap::IntegerDivisionByZero)
        ));
        assert!(matches!(
            binary(BinaryOp::I32DivS, i32_bits(i32::MIN), i32_bits(-1)),
            Err(Trap::IntegerOverflow)
        ));
        assert_eq!(binary(BinaryOp::I32RemS, i32_bits(i32::MIN), i32_bits(-1)).unwrap(), 0);
        assert!(matches!(
            binary(BinaryOp::I64RemS, 5, 0),
            Err(Trap::IntegerDivisionByZero)
        ));
    }

    #[test]
    fn shifts_and_rotates_mask_their_count() {
        assert_eq!(binary(BinaryOp::I32Shl, 1, 33).unwrap(), 2);
        assert_eq!(binary(BinaryOp::I32ShrS, i32_bits(-8), 1).unwrap(), i32_bits(-4));
        assert_eq!(binary(BinaryOp::I32ShrU, i32_bits(-8), 1).unwrap(), 0x7fff_fffc);
        assert_eq!(binary(BinaryOp::I32Rotl, 0x8000_0001, 1).unwrap(), 3);
        assert_eq!(binary(BinaryOp::I64Rotr, 1, 65).unwrap(), 1 << 63);
    }

    #[test]
    fn results_stay_zero_extended() {
        assert_eq!(binary(BinaryOp::I32Sub, 0, 1).unwrap(), 0xffff_ffff);
        assert_eq!(unary(UnaryOp::I32WrapI64, u64::MAX).unwrap(), 0xffff_ffff);
        assert_eq!(unary(UnaryOp::I64ExtendI32S, 0xffff_ffff).unwrap(), u64::MAX);
        assert_eq!(unary(UnaryOp::I64ExtendI32U, 0xffff_ffff).unwrap(), 0xffff_ffff);
    }

    #[test]
    fn float_min_max() {
        let min = binary(BinaryOp::F32Min, from_f32(0.0), from_f32(-0.0)).unwrap();
        assert_eq!(min, from_f32(-0.0));
        let max = binary(BinaryOp::F64Max, (-0.0f64).to_bits(), 0.0f64.to_bits()).unwrap();
        assert_eq!(max, 0.0f64.to_bits());
        let nan = binary(BinaryOp::F64Min, f64::NAN.to_bits(), 1.0f64.to_bits()).unwrap();
        assert!(f64_of(nan).is_nan());
    }

    #[test]
    fn float_sign_ops() {
        assert_eq!(unary(UnaryOp::F32Neg, from_f32(1.5)).unwrap(), from_f32(-1.5));
        assert_eq!(unary(UnaryOp::F64Abs, (-2.0f64).to_bits()).unwrap(), 2.0f64.to_bits());
        let copied = binary(BinaryOp::F32Copysign, from_f32(3.0), from_f32(-0.0)).unwrap();
        assert_eq!(copied, from_f32(-3.0));
        assert_eq!(unary(UnaryOp::F64Nearest, 2.5f64.to_bits()).unwrap(), 2.0f64.to_bits());
    }

    #[test]
    fn truncation_traps() {
        assert_eq!(unary(UnaryOp::I32TruncF64S, (-3.9f64).to_bits()).unwrap(), i32_bits(-3));
        assert_eq!(unary(UnaryOp::I32TruncF32U, from_f32(-0.5)).unwrap(), 0);
        assert!(matches!(
            unary(UnaryOp::I32TruncF32S, from_f32(f32::NAN)),
            Err(Trap::BadConversionToInteger)
        ));
        assert!(matches!(
            unary(UnaryOp::I32TruncF64S, 2_147_483_648.0f64.to_bits()),
            Err(Trap::IntegerOverflow)
        ));
        assert!(matches!(
            unary(UnaryOp::I64TruncF64U, (-1.0f64).to_bits()),
            Err(Trap::IntegerOverflow)
        ));
        assert_eq!(
            unary(UnaryOp::I64TruncF64S, (-9_223_372_036_854_775_808.0f64).to_bits()).unwrap(),
            i64::MIN as u64
        );
    }

    proptest! {
        #[test]
        fn i32_results_are_zero_extended(a: u32, b: u32) {
            for op in [BinaryOp::I32Add, BinaryOp::I32Sub, BinaryOp::I32Mul, BinaryOp::I32Shl] {
                let bits = binary(op, from_u32(a), from_u32(b)).unwrap();
                prop_assert_eq!(bits >> 32, 0);
            }
        }

        #[test]
        fn rotations_are_inverse(a: u64, count: u64) {
            let rotated = binary(BinaryOp::I64Rotl, a, count).unwrap();
            prop_assert_eq!(binary(BinaryOp::I64Rotr, rotated, count).unwrap(), a);
        }
    }
}
