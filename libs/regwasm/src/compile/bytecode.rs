// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use core::fmt;

use regwasm_reader::{BinaryOp, LoadOp, StoreOp, UnaryOp};
use smallvec::SmallVec;

use super::register_space::Reg;
use crate::ValueType;
use crate::errors::CompileError;
use crate::indices::{FuncIndex, SigIndex};

/// Size of the slot at the start of an argument window that receives the
/// callee's return value.
const RETURN_SLOT_SIZE: u32 = 8;

/// A forward or backward jump target, resolved to an instruction index once
/// the function is complete.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct Label(pub(crate) u32);

/// One bytecode instruction.
///
/// Registers are typed implicitly: every operand names a register in the
/// register space of the type the instruction expects.
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    Unreachable,
    Const {
        ty: ValueType,
        dst: Reg,
        bits: u64,
    },
    Move {
        ty: ValueType,
        dst: Reg,
        src: Reg,
    },
    Unary {
        op: UnaryOp,
        dst: Reg,
        src: Reg,
    },
    Binary {
        op: BinaryOp,
        dst: Reg,
        lhs: Reg,
        rhs: Reg,
    },
    /// `dst = if cond != 0 { if_true } else { if_false }`, `cond` is an i32.
    Select {
        ty: ValueType,
        dst: Reg,
        cond: Reg,
        if_true: Reg,
        if_false: Reg,
    },
    Load {
        op: LoadOp,
        dst: Reg,
        addr: Reg,
        offset: u32,
    },
    Store {
        op: StoreOp,
        addr: Reg,
        value: Reg,
        offset: u32,
    },
    MemorySize {
        dst: Reg,
    },
    MemoryGrow {
        dst: Reg,
        delta: Reg,
    },
    /// Reads a global at a byte offset into the globals region.
    GetGlobal {
        ty: ValueType,
        dst: Reg,
        offset: u32,
    },
    SetGlobal {
        ty: ValueType,
        src: Reg,
        offset: u32,
    },
    Jump {
        target: Label,
    },
    BrIf {
        cond: Reg,
        target: Label,
    },
    BrUnless {
        cond: Reg,
        target: Label,
    },
    /// Jumps to `target` if the i32 `scrutinee` equals `value`.
    BrTableCase {
        scrutinee: Reg,
        value: u32,
        target: Label,
    },
    /// Writes an argument into the outgoing argument window at byte `slot`.
    ArgOut {
        ty: ValueType,
        src: Reg,
        slot: u16,
    },
    Call {
        func: FuncIndex,
        result: Option<(ValueType, Reg)>,
    },
    /// Calls the table element at the i32 in `index`, trapping unless its
    /// signature equals `sig`.
    CallIndirect {
        sig: SigIndex,
        index: Reg,
        result: Option<(ValueType, Reg)>,
    },
    Return,
}

/// Byte layout of a call's argument window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgLayout {
    /// Byte offset of each parameter.
    pub offsets: SmallVec<[u16; 8]>,
    /// Window size in 8-byte slots, the return slot included.
    pub slots: u16,
}

/// The compiled form of one function body.
#[derive(Debug, Clone)]
pub struct CompiledFunction {
    pub(crate) name: String,
    pub(crate) ops: Box<[Op]>,
    /// Instruction index of every label.
    pub(crate) labels: Box<[u32]>,
    pub(crate) register_counts: [u16; 4],
    /// Register each parameter is passed in.
    pub(crate) params: Box<[(ValueType, Reg)]>,
    pub(crate) result: Option<ValueType>,
    pub(crate) arg_slots: u16,
}

// ===== impl Label =====

impl fmt::Debug for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

// ===== impl ArgLayout =====

impl ArgLayout {
    pub fn new(params: &[ValueType]) -> Result<Self, CompileError> {
        let mut offsets = SmallVec::with_capacity(params.len());
        let mut end = RETURN_SLOT_SIZE;

        for (ty, offset) in params.iter().zip(arg_offsets(params)) {
            end = offset + ty.byte_size();
            let offset = u16::try_from(offset).map_err(|_| {
                CompileError::new(format!(
                    "call arguments need {end} bytes, at most {} are supported",
                    u16::MAX
                ))
            })?;
            offsets.push(offset);
        }

        let slots = u16::try_from(end.div_ceil(8))
            .map_err(|_| CompileError::new("call argument window is too large"))?;

        Ok(Self { offsets, slots })
    }
}

/// Byte offset of each parameter in an argument window. Parameters follow the
/// return slot, each aligned to its own size.
pub(crate) fn arg_offsets(params: &[ValueType]) -> impl Iterator<Item = u32> + '_ {
    params.iter().scan(RETURN_SLOT_SIZE, |end, ty| {
        let offset = end.next_multiple_of(ty.byte_size());
        *end = offset + ty.byte_size();
        Some(offset)
    })
}

// ===== impl CompiledFunction =====

impl CompiledFunction {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ops(&self) -> &[Op] {
        &self.ops
    }

    /// Instruction index a label resolves to.
    pub fn label_target(&self, label: Label) -> usize {
        self.labels[label.0 as usize] as usize
    }

    pub fn register_count(&self, ty: ValueType) -> u16 {
        self.register_counts[ty.index()]
    }

    pub fn result(&self) -> Option<ValueType> {
        self.result
    }

    /// Largest argument window of any call in the function, in 8-byte slots.
    pub fn arg_slots(&self) -> u16 {
        self.arg_slots
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arg_layout() {
        use ValueType::*;

        let layout = ArgLayout::new(&[I32, F64, F32, I64]).unwrap();
        assert_eq!(layout.offsets.as_slice(), [8, 16, 24, 32]);
        assert_eq!(layout.slots, 5);

        let layout = ArgLayout::new(&[I32, I32, I32]).unwrap();
        assert_eq!(layout.offsets.as_slice(), [8, 12, 16]);
        assert_eq!(layout.slots, 3);

        assert_eq!(ArgLayout::new(&[]).unwrap().slots, 1);
    }

    #[test]
    fn arg_layout_too_large() {
        let params = vec![ValueType::I64; 8200];
        assert!(ArgLayout::new(&params).is_err());
    }
}
