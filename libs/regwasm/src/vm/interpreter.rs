// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::sync::Arc;

use regwasm_reader::{LoadOp, StoreOp};
use smallvec::SmallVec;

use super::numeric;
use crate::compile::{CompiledFunction, Op, RESERVED_REGISTER_COUNT, RETURN_REGISTER, Reg, arg_offsets};
use crate::func::FuncKind;
use crate::instance::Instance;
use crate::trap::Trap;
use crate::{Func, Memory, Store, Table, Val, ValueType};

/// Registers and the outgoing argument window of one activation.
struct Frame {
    registers: [Vec<u64>; 4],
    args: Vec<u8>,
}

// ===== impl Frame =====

impl Frame {
    fn new(code: &CompiledFunction) -> Self {
        let registers = ValueType::ALL.map(|ty| {
            let count = code.register_count(ty).max(RESERVED_REGISTER_COUNT);
            vec![0; usize::from(count)]
        });

        Self {
            registers,
            args: vec![0; usize::from(code.arg_slots()) * 8],
        }
    }

    #[inline]
    fn get(&self, ty: ValueType, reg: Reg) -> u64 {
        self.registers[ty.index()][reg.index()]
    }

    #[inline]
    fn set(&mut self, ty: ValueType, reg: Reg, bits: u64) {
        self.registers[ty.index()][reg.index()] = bits;
    }

    fn i32(&self, reg: Reg) -> u32 {
        let bytes = self.get(ValueType::I32, reg).to_le_bytes();
        u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
    }

    fn write_arg(&mut self, offset: usize, ty: ValueType, bits: u64) {
        let len = ty.byte_size() as usize;
        self.args[offset..offset + len].copy_from_slice(&bits.to_le_bytes()[..len]);
    }

    fn read_arg(&self, offset: usize, ty: ValueType) -> u64 {
        let len = ty.byte_size() as usize;
        let mut bytes = [0; 8];
        bytes[..len].copy_from_slice(&self.args[offset..offset + len]);
        u64::from_le_bytes(bytes)
    }

    /// Collects the arguments for a callee from the argument window.
    fn arguments(&self, params: &[ValueType]) -> SmallVec<[Val; 8]> {
        params
            .iter()
            .zip(arg_offsets(params))
            .map(|(ty, offset)| Val::from_bits(*ty, self.read_arg(offset as usize, *ty)))
            .collect()
    }

    /// Stores a callee's result in the return slot and moves it to `dst`.
    fn complete_call(&mut self, result: Option<(ValueType, Reg)>, value: Option<Val>) {
        if let (Some((ty, dst)), Some(value)) = (result, value) {
            self.write_arg(0, ty, value.to_bits());
            let bits = self.read_arg(0, ty);
            self.set(ty, dst, bits);
        }
    }
}

/// One wasm function activation on the interpreter's explicit call stack.
struct Activation {
    instance: Instance,
    code: Arc<CompiledFunction>,
    memory: Option<Memory>,
    table: Option<Table>,
    frame: Frame,
    pc: usize,
    /// Where the result of the call this activation is suspended in goes.
    pending: Option<(ValueType, Reg)>,
}

/// Why [`Activation::run`] handed control back to [`execute`].
enum Control {
    Call {
        callee: Func,
        args: SmallVec<[Val; 8]>,
        result: Option<(ValueType, Reg)>,
    },
    Return(Option<Val>),
}

/// Runs a compiled function to completion.
///
/// Calls between wasm functions are kept on an explicit activation stack, so
/// the native stack does not grow with wasm call depth. Host functions are
/// entered through [`super::invoke`].
pub(super) fn execute(
    store: &mut Store,
    instance: Instance,
    code: Arc<CompiledFunction>,
    args: &[Val],
) -> Result<Option<Val>, Trap> {
    let max_depth = store.engine().config().max_call_depth;
    let base_depth = store.call_depth();

    let mut current = Activation::new(store, instance, code, args);
    let mut callers: Vec<Activation> = Vec::new();

    loop {
        match current.run(store)? {
            Control::Call {
                callee,
                args,
                result,
            } => {
                let wasm = match &store[callee.0].kind {
                    FuncKind::Wasm { instance, code } => Some((*instance, Arc::clone(code))),
                    FuncKind::Host(_) => None,
                };

                if let Some((instance, code)) = wasm {
                    let depth = base_depth + callers.len();
                    if depth >= max_depth {
                        tracing::debug!(depth, "call stack exhausted");
                        return Err(Trap::StackOverflow);
                    }

                    tracing::trace!(func = code.name(), "invoking");
                    let callee = Activation::new(store, instance, code, &args);
                    current.pending = result;
                    callers.push(core::mem::replace(&mut current, callee));
                } else {
                    let value = super::invoke(store, callee, &args)?;
                    current.frame.complete_call(result, value);
                }
            }
            Control::Return(value) => {
                let Some(caller) = callers.pop() else {
                    return Ok(value);
                };
                current = caller;
                let result = current.pending.take();
                current.frame.complete_call(result, value);
            }
        }
    }
}

// ===== impl Activation =====

impl Activation {
    fn new(store: &Store, instance: Instance, code: Arc<CompiledFunction>, args: &[Val]) -> Self {
        let mut frame = Frame::new(&code);
        for ((ty, reg), arg) in code.params.iter().zip(args) {
            frame.set(*ty, *reg, arg.to_bits());
        }

        let env = &store[instance.0].env;
        Self {
            instance,
            memory: env.memory,
            table: env.table,
            code,
            frame,
            pc: 0,
            pending: None,
        }
    }

    /// Executes ops until the function calls out or returns.
    fn run(&mut self, store: &mut Store) -> Result<Control, Trap> {
        let code = Arc::clone(&self.code);
        let ops = code.ops();

        loop {
            let op = &ops[self.pc];
            self.pc += 1;

            match op {
                Op::Unreachable => return Err(Trap::UnreachableCodeReached),
                Op::Const { ty, dst, bits } => self.frame.set(*ty, *dst, *bits),
                Op::Move { ty, dst, src } => self.frame.set(*ty, *dst, self.frame.get(*ty, *src)),
                Op::Unary { op, dst, src } => {
                    let (param, result) = op.signature();
                    let bits = numeric::unary(*op, self.frame.get(param, *src))?;
                    self.frame.set(result, *dst, bits);
                }
                Op::Binary { op, dst, lhs, rhs } => {
                    let (param, result) = op.signature();
                    let (lhs, rhs) = (self.frame.get(param, *lhs), self.frame.get(param, *rhs));
                    let bits = numeric::binary(*op, lhs, rhs)?;
                    self.frame.set(result, *dst, bits);
                }
                Op::Select {
                    ty,
                    dst,
                    cond,
                    if_true,
                    if_false,
                } => {
                    let src = if self.frame.i32(*cond) != 0 {
                        if_true
                    } else {
                        if_false
                    };
                    self.frame.set(*ty, *dst, self.frame.get(*ty, *src));
                }
                Op::Load {
                    op,
                    dst,
                    addr,
                    offset,
                } => {
                    let memory = self.memory.ok_or(Trap::MemoryOutOfBounds)?;
                    let bits = load(store, memory, *op, self.frame.i32(*addr), *offset)?;
                    self.frame.set(op.value_type(), *dst, bits);
                }
                Op::Store {
                    op,
                    addr,
                    value,
                    offset,
                } => {
                    let memory = self.memory.ok_or(Trap::MemoryOutOfBounds)?;
                    let bits = self.frame.get(op.value_type(), *value);
                    store_bits(store, memory, *op, self.frame.i32(*addr), *offset, bits)?;
                }
                Op::MemorySize { dst } => {
                    let pages = self.memory.map_or(0, |memory| memory.size(store));
                    self.frame.set(ValueType::I32, *dst, u64::from(pages));
                }
                Op::MemoryGrow { dst, delta } => {
                    let delta = self.frame.i32(*delta);
                    let old = self
                        .memory
                        .and_then(|memory| memory.grow(store, delta))
                        .unwrap_or(u32::MAX);
                    self.frame.set(ValueType::I32, *dst, u64::from(old));
                }
                Op::GetGlobal { ty, dst, offset } => {
                    let bits = store[self.instance.0].env.globals.read(*offset, *ty);
                    self.frame.set(*ty, *dst, bits);
                }
                Op::SetGlobal { ty, src, offset } => {
                    let bits = self.frame.get(*ty, *src);
                    store[self.instance.0].env.globals.write(*offset, *ty, bits);
                }
                Op::Jump { target } => self.pc = code.label_target(*target),
                Op::BrIf { cond, target } => {
                    if self.frame.i32(*cond) != 0 {
                        self.pc = code.label_target(*target);
                    }
                }
                Op::BrUnless { cond, target } => {
                    if self.frame.i32(*cond) == 0 {
                        self.pc = code.label_target(*target);
                    }
                }
                Op::BrTableCase {
                    scrutinee,
                    value,
                    target,
                } => {
                    if self.frame.i32(*scrutinee) == *value {
                        self.pc = code.label_target(*target);
                    }
                }
                Op::ArgOut { ty, src, slot } => {
                    self.frame.write_arg(usize::from(*slot), *ty, self.frame.get(*ty, *src));
                }
                Op::Call { func, result } => {
                    let callee = store[self.instance.0].env.function(*func);
                    return Ok(self.call_out(store, callee, *result));
                }
                Op::CallIndirect { sig, index, result } => {
                    let table = self.table.ok_or(Trap::TableOutOfBounds)?;
                    let callee = store[table.0]
                        .get(self.frame.i32(*index))
                        .ok_or(Trap::TableOutOfBounds)?
                        .ok_or(Trap::IndirectCallToNull)?;

                    let expected = &store[self.instance.0].module.info().signatures[*sig];
                    if store[callee.0].ty != *expected {
                        tracing::trace!(?callee, %expected, "indirect call signature mismatch");
                        return Err(Trap::BadSignature);
                    }

                    return Ok(self.call_out(store, callee, *result));
                }
                Op::Return => {
                    let value = code
                        .result()
                        .map(|ty| Val::from_bits(ty, self.frame.get(ty, RETURN_REGISTER)));
                    return Ok(Control::Return(value));
                }
            }
        }
    }

    fn call_out(&self, store: &Store, callee: Func, result: Option<(ValueType, Reg)>) -> Control {
        Control::Call {
            callee,
            args: self.frame.arguments(store[callee.0].ty.params()),
            result,
        }
    }
}

/// Bounds-checks an access and returns its byte range.
fn effective_range(len: usize, addr: u32, offset: u32, size: u32) -> Result<(usize, usize), Trap> {
    let start = u64::from(addr) + u64::from(offset);
    let end = start + u64::from(size);
    if end > len as u64 {
        return Err(Trap::MemoryOutOfBounds);
    }
    // `end <= len` so both fit in usize
    Ok((start as usize, end as usize))
}

fn load(store: &Store, memory: Memory, op: LoadOp, addr: u32, offset: u32) -> Result<u64, Trap> {
    let bytes = memory.data(store);
    let (start, end) = effective_range(bytes.len(), addr, offset, op.access_size())?;

    let mut raw = [0; 8];
    raw[..end - start].copy_from_slice(&bytes[start..end]);
    let mut bits = u64::from_le_bytes(raw);

    let width = op.access_size() * 8;
    if op.is_signed() && width < 64 {
        let shift = 64 - width;
        bits = (i64::from_le_bytes((bits << shift).to_le_bytes()) >> shift).cast_unsigned();
    }
    if op.value_type().byte_size() == 4 {
        bits &= u64::from(u32::MAX);
    }

    Ok(bits)
}

fn store_bits(
    store: &mut Store,
    memory: Memory,
    op: StoreOp,
    addr: u32,
    offset: u32,
    bits: u64,
) -> Result<(), Trap> {
    let bytes = memory.data_mut(store);
    let (start, end) = effective_range(bytes.len(), addr, offset, op.access_size())?;
    bytes[start..end].copy_from_slice(&bits.to_le_bytes()[..end - start]);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_bounds() {
        assert_eq!(effective_range(16, 12, 0, 4).unwrap(), (12, 16));
        assert_eq!(effective_range(16, 4, 8, 4).unwrap(), (12, 16));
        assert!(effective_range(16, 13, 0, 4).is_err());
        assert!(effective_range(16, u32::MAX, u32::MAX, 8).is_err());
    }
}
