// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use cranelift_entity::EntityRef;
use regwasm_reader::{BlockType, BrTable, MemArg, Operator};
use smallvec::SmallVec;

use super::bytecode::{ArgLayout, CompiledFunction, Label, Op};
use super::register_space::{RETURN_REGISTER, Reg, RegisterSpaces, ZERO_REGISTER};
use crate::errors::CompileError;
use crate::indices::{FuncIndex, GlobalIndex, SigIndex};
use crate::module::ModuleInfo;
use crate::utils::ensure;
use crate::values::Val;
use crate::{FuncType, ValueType};

/// Static type of a compiled expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExprType {
    Value(ValueType),
    Void,
    /// Control never reaches past the expression.
    Unreachable,
}

/// Where the value of a compiled expression lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmitInfo {
    pub register: Reg,
    pub ty: ExprType,
}

/// An entry on the operand stack. `ty` is `None` for the polymorphic values
/// conjured up in unreachable code.
#[derive(Debug, Clone, Copy)]
struct Operand {
    ty: Option<ValueType>,
    reg: Reg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameKind {
    Function,
    Block,
    Loop,
    If { else_label: Label, has_else: bool },
}

#[derive(Debug, Clone, Copy)]
struct ControlFrame {
    kind: FrameKind,
    result: Option<ValueType>,
    /// Register the frame's result is merged into.
    result_reg: Option<Reg>,
    /// Where a branch to this frame goes: the end for blocks, the header for
    /// loops.
    branch_label: Label,
    end_label: Label,
    /// Operand stack height at frame entry.
    height: usize,
    unreachable: bool,
}

/// Translates one function's operators into register bytecode.
pub struct BytecodeGenerator<'m> {
    module: &'m ModuleInfo,
    signature: &'m FuncType,
    locals: Vec<(ValueType, Reg)>,
    registers: RegisterSpaces,
    operands: SmallVec<[Operand; 32]>,
    frames: SmallVec<[ControlFrame; 16]>,
    ops: Vec<Op>,
    labels: Vec<Option<u32>>,
    arg_slots: u16,
}

impl ControlFrame {
    fn branch_type(&self) -> Option<ValueType> {
        match self.kind {
            FrameKind::Loop => None,
            _ => self.result,
        }
    }

    fn branch_reg(&self) -> Reg {
        match self.kind {
            FrameKind::Loop => ZERO_REGISTER,
            _ => self.result_reg.unwrap_or(ZERO_REGISTER),
        }
    }
}

impl<'m> BytecodeGenerator<'m> {
    pub fn new(
        module: &'m ModuleInfo,
        signature: &'m FuncType,
        locals: &[ValueType],
    ) -> Result<Self, CompileError> {
        let mut registers = RegisterSpaces::default();
        let locals = locals
            .iter()
            .map(|ty| Ok((*ty, registers.get_mut(*ty).acquire_var()?)))
            .collect::<Result<Vec<_>, CompileError>>()?;

        let mut this = Self {
            module,
            signature,
            locals,
            registers,
            operands: SmallVec::new(),
            frames: SmallVec::new(),
            ops: Vec::new(),
            labels: Vec::new(),
            arg_slots: 1,
        };

        let exit = this.new_label();
        this.frames.push(ControlFrame {
            kind: FrameKind::Function,
            result: signature.result(),
            result_reg: signature.result().map(|_| RETURN_REGISTER),
            branch_label: exit,
            end_label: exit,
            height: 0,
            unreachable: false,
        });

        Ok(this)
    }

    /// Type checks one operator and emits its bytecode.
    pub fn emit(&mut self, op: &Operator<'_>) -> Result<EmitInfo, CompileError> {
        match op {
            Operator::Unreachable => {
                self.push_op(Op::Unreachable);
                Ok(self.set_unreachable())
            }
            Operator::Nop => Ok(void()),
            Operator::Block { ty } => self.emit_block(*ty, FrameKind::Block),
            Operator::Loop { ty } => self.emit_block(*ty, FrameKind::Loop),
            Operator::If { ty } => {
                let cond = self.pop(ValueType::I32)?;
                let else_label = self.new_label();
                self.push_op(Op::BrUnless {
                    cond,
                    target: else_label,
                });
                self.emit_block(
                    *ty,
                    FrameKind::If {
                        else_label,
                        has_else: false,
                    },
                )
            }
            Operator::Else => self.emit_else(),
            Operator::End => self.emit_end(),
            Operator::Br {
                arity,
                relative_depth,
            } => self.emit_br(*arity, *relative_depth),
            Operator::BrIf {
                arity,
                relative_depth,
            } => self.emit_br_if(*arity, *relative_depth),
            Operator::BrTable { table } => self.emit_br_table(table),
            Operator::Return { arity } => self.emit_return(*arity),
            Operator::Call {
                arity,
                function_index,
            } => self.emit_call(*arity, FuncIndex::from_u32(*function_index)),
            Operator::CallIndirect {
                arity,
                signature_index,
            } => self.emit_call_indirect(*arity, SigIndex::from_u32(*signature_index)),
            Operator::Drop => {
                self.pop_any()?;
                Ok(void())
            }
            Operator::Select => self.emit_select(),
            Operator::GetLocal { local_index } => {
                let (ty, var) = self.local(*local_index)?;
                let dst = self.push_temp(ty)?;
                self.push_op(Op::Move { ty, dst, src: var });
                Ok(value(ty, dst))
            }
            Operator::SetLocal { local_index } => {
                let (ty, var) = self.local(*local_index)?;
                let src = self.pop(ty)?;
                self.push_op(Op::Move { ty, dst: var, src });
                Ok(void())
            }
            Operator::TeeLocal { local_index } => {
                let (ty, var) = self.local(*local_index)?;
                let src = self.peek(ty)?;
                self.push_op(Op::Move { ty, dst: var, src });
                Ok(value(ty, src))
            }
            Operator::GetGlobal { global_index } => {
                let (ty, offset) = self.global(*global_index)?;
                let dst = self.push_temp(ty)?;
                self.push_op(Op::GetGlobal { ty, dst, offset });
                Ok(value(ty, dst))
            }
            Operator::SetGlobal { global_index } => {
                let index = GlobalIndex::from_u32(*global_index);
                ensure!(
                    self.module.globals.get(index).is_some_and(|g| g.mutable),
                    CompileError::new(format!("global {global_index} is immutable"))
                );
                let (ty, offset) = self.global(*global_index)?;
                let src = self.pop(ty)?;
                self.push_op(Op::SetGlobal { ty, src, offset });
                Ok(void())
            }
            Operator::Load { op, memarg } => {
                self.check_memory(op.name())?;
                check_alignment(op.name(), *memarg, op.access_size())?;
                let addr = self.pop(ValueType::I32)?;
                let ty = op.value_type();
                let dst = self.push_temp(ty)?;
                self.push_op(Op::Load {
                    op: *op,
                    dst,
                    addr,
                    offset: memarg.offset,
                });
                Ok(value(ty, dst))
            }
            Operator::Store { op, memarg } => {
                self.check_memory(op.name())?;
                check_alignment(op.name(), *memarg, op.access_size())?;
                let value = self.pop(op.value_type())?;
                let addr = self.pop(ValueType::I32)?;
                self.push_op(Op::Store {
                    op: *op,
                    addr,
                    value,
                    offset: memarg.offset,
                });
                Ok(void())
            }
            Operator::MemorySize => {
                self.check_memory("memory.size")?;
                let dst = self.push_temp(ValueType::I32)?;
                self.push_op(Op::MemorySize { dst });
                Ok(value(ValueType::I32, dst))
            }
            Operator::MemoryGrow => {
                self.check_memory("memory.grow")?;
                let delta = self.pop(ValueType::I32)?;
                let dst = self.push_temp(ValueType::I32)?;
                self.push_op(Op::MemoryGrow { dst, delta });
                Ok(value(ValueType::I32, dst))
            }
            Operator::I32Const { value } => self.emit_const(Val::I32(*value)),
            Operator::I64Const { value } => self.emit_const(Val::I64(*value)),
            Operator::F32Const { value } => self.emit_const(Val::F32(value.bits())),
            Operator::F64Const { value } => self.emit_const(Val::F64(value.bits())),
            Operator::Unary { op } => {
                let (param, result) = op.signature();
                let src = self.pop(param)?;
                let dst = self.push_temp(result)?;
                self.push_op(Op::Unary { op: *op, dst, src });
                Ok(value(result, dst))
            }
            Operator::Binary { op } => {
                let (param, result) = op.signature();
                let rhs = self.pop(param)?;
                let lhs = self.pop(param)?;
                let dst = self.push_temp(result)?;
                self.push_op(Op::Binary {
                    op: *op,
                    dst,
                    lhs,
                    rhs,
                });
                Ok(value(result, dst))
            }
        }
    }

    /// Closes the function body and resolves all labels.
    pub fn finish(mut self, name: &str) -> Result<CompiledFunction, CompileError> {
        ensure!(
            self.frames.len() == 1,
            CompileError::new(format!(
                "function body ends inside {} unterminated blocks",
                self.frames.len() - 1
            ))
        );

        // falling off the end behaves like `return`
        self.finish_arm()?;
        let Some(frame) = self.frames.pop() else {
            return Err(CompileError::new("missing function frame"));
        };
        self.bind_label(frame.end_label);
        self.push_op(Op::Return);

        let labels = self
            .labels
            .iter()
            .enumerate()
            .map(|(i, target)| {
                target.ok_or_else(|| CompileError::new(format!("label {i} was never bound")))
            })
            .collect::<Result<Box<[u32]>, CompileError>>()?;

        let params = self.locals[..self.signature.params().len()].into();

        Ok(CompiledFunction {
            name: name.to_owned(),
            ops: self.ops.into_boxed_slice(),
            labels,
            register_counts: self.registers.register_counts(),
            params,
            result: self.signature.result(),
            arg_slots: self.arg_slots,
        })
    }

    // ===== control flow =====

    fn emit_block(&mut self, ty: BlockType, kind: FrameKind) -> Result<EmitInfo, CompileError> {
        let result = ty.result();
        let result_reg = match result {
            Some(ty) => Some(self.registers.get_mut(ty).acquire_temp()?),
            None => None,
        };

        let end_label = self.new_label();
        let branch_label = if kind == FrameKind::Loop {
            let header = self.new_label();
            self.bind_label(header);
            header
        } else {
            end_label
        };

        self.frames.push(ControlFrame {
            kind,
            result,
            result_reg,
            branch_label,
            end_label,
            height: self.operands.len(),
            unreachable: false,
        });
        Ok(void())
    }

    fn emit_else(&mut self) -> Result<EmitInfo, CompileError> {
        let frame = self.frame();
        let FrameKind::If {
            else_label,
            has_else: false,
        } = frame.kind
        else {
            return Err(CompileError::new("else without a matching if"));
        };

        self.finish_arm()?;
        self.push_op(Op::Jump {
            target: frame.end_label,
        });
        self.bind_label(else_label);

        let frame = self.frame_mut();
        frame.kind = FrameKind::If {
            else_label,
            has_else: true,
        };
        frame.unreachable = false;
        Ok(void())
    }

    fn emit_end(&mut self) -> Result<EmitInfo, CompileError> {
        ensure!(
            self.frames.len() > 1,
            CompileError::new("end without a matching block")
        );

        self.finish_arm()?;
        let Some(frame) = self.frames.pop() else {
            return Err(CompileError::new("end without a matching block"));
        };

        if let FrameKind::If {
            else_label,
            has_else: false,
        } = frame.kind
        {
            ensure!(
                frame.result.is_none(),
                CompileError::new("if without else cannot produce a value")
            );
            self.bind_label(else_label);
        }
        self.bind_label(frame.end_label);

        match (frame.result, frame.result_reg) {
            (Some(ty), Some(reg)) => {
                self.operands.push(Operand { ty: Some(ty), reg });
                Ok(value(ty, reg))
            }
            _ => Ok(void()),
        }
    }

    /// Moves the arm's value into the frame's result register and checks
    /// that nothing else is left on the stack.
    fn finish_arm(&mut self) -> Result<(), CompileError> {
        let frame = self.frame();

        if let (Some(ty), Some(dst)) = (frame.result, frame.result_reg) {
            let src = self.pop(ty)?;
            self.push_op(Op::Move { ty, dst, src });
        }

        let remaining = self.operands.len() - frame.height;
        ensure!(
            remaining == 0,
            CompileError::new(format!(
                "{remaining} values remain on the stack at the end of the block"
            ))
        );
        Ok(())
    }

    fn emit_br(&mut self, arity: u8, depth: u32) -> Result<EmitInfo, CompileError> {
        let target = self.branch_target(depth, arity)?;
        if let Some(ty) = target.branch_type() {
            let src = self.pop(ty)?;
            self.push_op(Op::Move {
                ty,
                dst: target.branch_reg(),
                src,
            });
        }
        self.push_op(Op::Jump {
            target: target.branch_label,
        });
        Ok(self.set_unreachable())
    }

    fn emit_br_if(&mut self, arity: u8, depth: u32) -> Result<EmitInfo, CompileError> {
        let cond = self.pop(ValueType::I32)?;
        let target = self.branch_target(depth, arity)?;

        match target.branch_type() {
            Some(ty) => {
                // the value stays on the stack for the fallthrough path
                let src = self.peek(ty)?;
                let skip = self.new_label();
                self.push_op(Op::BrUnless { cond, target: skip });
                self.push_op(Op::Move {
                    ty,
                    dst: target.branch_reg(),
                    src,
                });
                self.push_op(Op::Jump {
                    target: target.branch_label,
                });
                self.bind_label(skip);
                Ok(value(ty, src))
            }
            None => {
                self.push_op(Op::BrIf {
                    cond,
                    target: target.branch_label,
                });
                Ok(void())
            }
        }
    }

    fn emit_br_table(&mut self, table: &BrTable<'_>) -> Result<EmitInfo, CompileError> {
        let arity = u8::try_from(table.arity)
            .map_err(|_| CompileError::new(format!("invalid br_table arity {}", table.arity)))?;

        let default = self.branch_target(table.default, arity)?;
        let targets = table
            .targets()
            .map(|depth| self.branch_target(depth, arity))
            .collect::<Result<SmallVec<[ControlFrame; 8]>, CompileError>>()?;

        let ty = default.branch_type();
        ensure!(
            targets.iter().all(|target| target.branch_type() == ty),
            CompileError::new("br_table targets have inconsistent types")
        );

        let scrutinee = self.pop(ValueType::I32)?;
        let src = match ty {
            Some(ty) => Some((ty, self.pop(ty)?)),
            None => None,
        };

        match src {
            None => {
                for (value, target) in (0..).zip(&targets) {
                    self.push_op(Op::BrTableCase {
                        scrutinee,
                        value,
                        target: target.branch_label,
                    });
                }
                self.push_op(Op::Jump {
                    target: default.branch_label,
                });
            }
            Some((ty, src)) => {
                // each case needs its own move, so cases jump to stubs
                let stubs = targets
                    .iter()
                    .map(|_| self.new_label())
                    .collect::<SmallVec<[Label; 8]>>();
                for (value, stub) in (0..).zip(&stubs) {
                    self.push_op(Op::BrTableCase {
                        scrutinee,
                        value,
                        target: *stub,
                    });
                }
                for (stub, target) in core::iter::once(None)
                    .chain(stubs.iter().map(Some))
                    .zip(core::iter::once(&default).chain(&targets))
                {
                    if let Some(stub) = stub {
                        self.bind_label(*stub);
                    }
                    self.push_op(Op::Move {
                        ty,
                        dst: target.branch_reg(),
                        src,
                    });
                    self.push_op(Op::Jump {
                        target: target.branch_label,
                    });
                }
            }
        }

        Ok(self.set_unreachable())
    }

    fn emit_return(&mut self, arity: u8) -> Result<EmitInfo, CompileError> {
        let target = self.frames[0];
        check_arity(arity, target.result)?;

        if let Some(ty) = target.result {
            let src = self.pop(ty)?;
            self.push_op(Op::Move {
                ty,
                dst: RETURN_REGISTER,
                src,
            });
        }
        self.push_op(Op::Jump {
            target: target.end_label,
        });
        Ok(self.set_unreachable())
    }

    // ===== calls =====

    fn emit_call(&mut self, arity: u32, func: FuncIndex) -> Result<EmitInfo, CompileError> {
        let module = self.module;
        let ty = module.function_signature(func).ok_or_else(|| {
            CompileError::new(format!("call to unknown function {}", func.index()))
        })?;
        check_call_arity(arity, ty)?;

        self.emit_arguments(ty, 0)?;
        self.pop_arguments(ty)?;

        let result = self.call_result(ty)?;
        self.push_op(Op::Call { func, result });
        Ok(result.map_or(void(), |(ty, reg)| value(ty, reg)))
    }

    fn emit_call_indirect(&mut self, arity: u32, sig: SigIndex) -> Result<EmitInfo, CompileError> {
        ensure!(
            self.module.table.is_some(),
            CompileError::new("call_indirect requires a function table")
        );
        let module = self.module;
        let ty = module.signatures.get(sig).ok_or_else(|| {
            CompileError::new(format!("call_indirect to unknown signature {}", sig.index()))
        })?;
        check_call_arity(arity, ty)?;

        self.check_operands(&[ValueType::I32], 0)?;
        self.emit_arguments(ty, 1)?;
        let index = self.pop(ValueType::I32)?;
        self.pop_arguments(ty)?;

        let result = self.call_result(ty)?;
        self.push_op(Op::CallIndirect { sig, index, result });
        Ok(result.map_or(void(), |(ty, reg)| value(ty, reg)))
    }

    /// Type checks the call's arguments, `skip` entries below the top of the
    /// stack, then writes them into the outgoing argument window.
    fn emit_arguments(&mut self, ty: &FuncType, skip: usize) -> Result<(), CompileError> {
        let args = self.check_operands(ty.params(), skip)?;
        let layout = ArgLayout::new(ty.params())?;
        self.arg_slots = self.arg_slots.max(layout.slots);

        for ((ty, src), slot) in ty.params().iter().zip(args).zip(layout.offsets) {
            self.push_op(Op::ArgOut {
                ty: *ty,
                src,
                slot,
            });
        }
        Ok(())
    }

    fn pop_arguments(&mut self, ty: &FuncType) -> Result<(), CompileError> {
        for param in ty.params().iter().rev() {
            self.pop(*param)?;
        }
        Ok(())
    }

    fn call_result(&mut self, ty: &FuncType) -> Result<Option<(ValueType, Reg)>, CompileError> {
        match ty.result() {
            Some(ty) => Ok(Some((ty, self.push_temp(ty)?))),
            None => Ok(None),
        }
    }

    // ===== other operators =====

    fn emit_select(&mut self) -> Result<EmitInfo, CompileError> {
        let cond = self.pop(ValueType::I32)?;
        let (if_false_ty, if_false) = self.pop_any()?;
        let (if_true_ty, if_true) = self.pop_any()?;

        let ty = match (if_true_ty, if_false_ty) {
            (Some(a), Some(b)) if a != b => {
                return Err(CompileError::new(format!(
                    "type mismatch in select: {a} and {b}"
                )));
            }
            (a, b) => a.or(b),
        };

        let Some(ty) = ty else {
            self.operands.push(Operand {
                ty: None,
                reg: ZERO_REGISTER,
            });
            return Ok(EmitInfo {
                register: ZERO_REGISTER,
                ty: ExprType::Unreachable,
            });
        };

        let dst = self.push_temp(ty)?;
        self.push_op(Op::Select {
            ty,
            dst,
            cond,
            if_true,
            if_false,
        });
        Ok(value(ty, dst))
    }

    fn emit_const(&mut self, val: Val) -> Result<EmitInfo, CompileError> {
        let ty = val.ty();
        let dst = self.push_temp(ty)?;
        self.push_op(Op::Const {
            ty,
            dst,
            bits: val.to_bits(),
        });
        Ok(value(ty, dst))
    }

    fn local(&self, index: u32) -> Result<(ValueType, Reg), CompileError> {
        self.locals.get(index as usize).copied().ok_or_else(|| {
            CompileError::new(format!(
                "local index {index} out of bounds, the function has {} locals",
                self.locals.len()
            ))
        })
    }

    fn global(&self, index: u32) -> Result<(ValueType, u32), CompileError> {
        let index = GlobalIndex::from_u32(index);
        let unknown = || CompileError::new(format!("unknown global {}", index.index()));

        let desc = self.module.globals.get(index).ok_or_else(unknown)?;
        let offset = self.module.global_layout.offset(index).ok_or_else(unknown)?;
        Ok((desc.ty, offset))
    }

    fn check_memory(&self, op: &str) -> Result<(), CompileError> {
        ensure!(
            self.module.memory.is_some(),
            CompileError::new(format!("{op} requires a memory"))
        );
        Ok(())
    }

    // ===== operand stack =====

    fn frame(&self) -> ControlFrame {
        self.frames[self.frames.len() - 1]
    }

    fn frame_mut(&mut self) -> &mut ControlFrame {
        let last = self.frames.len() - 1;
        &mut self.frames[last]
    }

    fn push_temp(&mut self, ty: ValueType) -> Result<Reg, CompileError> {
        let reg = self.registers.get_mut(ty).acquire_temp()?;
        self.operands.push(Operand { ty: Some(ty), reg });
        Ok(reg)
    }

    fn pop_any(&mut self) -> Result<(Option<ValueType>, Reg), CompileError> {
        let frame = self.frame();
        if self.operands.len() == frame.height {
            ensure!(
                frame.unreachable,
                CompileError::new("type mismatch: expected a value, found nothing")
            );
            return Ok((None, ZERO_REGISTER));
        }

        let Some(operand) = self.operands.pop() else {
            return Err(CompileError::new("operand stack underflow"));
        };
        if let Some(ty) = operand.ty {
            self.registers.get_mut(ty).release_temp(operand.reg);
        }
        Ok((operand.ty, operand.reg))
    }

    fn pop(&mut self, expected: ValueType) -> Result<Reg, CompileError> {
        self.peek(expected)?;
        let (_, reg) = self.pop_any()?;
        Ok(reg)
    }

    fn peek(&self, expected: ValueType) -> Result<Reg, CompileError> {
        let args = self.check_operands(&[expected], 0)?;
        Ok(args[0])
    }

    /// Checks that the `types.len()` operands below the top `skip` entries
    /// have the given types, returning their registers bottom to top.
    fn check_operands(
        &self,
        types: &[ValueType],
        skip: usize,
    ) -> Result<SmallVec<[Reg; 8]>, CompileError> {
        let frame = self.frame();
        let available = &self.operands[frame.height..];

        let mut regs = SmallVec::with_capacity(types.len());
        for (i, expected) in types.iter().enumerate() {
            let depth = skip + (types.len() - 1 - i);
            let Some(operand) = available.len().checked_sub(depth + 1).map(|j| available[j])
            else {
                ensure!(
                    frame.unreachable,
                    CompileError::new(format!("type mismatch: expected {expected}, found nothing"))
                );
                regs.push(ZERO_REGISTER);
                continue;
            };

            match operand.ty {
                Some(found) if found != *expected => {
                    return Err(CompileError::new(format!(
                        "type mismatch: expected {expected}, found {found}"
                    )));
                }
                _ => regs.push(operand.reg),
            }
        }
        Ok(regs)
    }

    /// Drops the rest of the frame's operands, the following code is dead
    /// until the frame ends.
    fn set_unreachable(&mut self) -> EmitInfo {
        let height = self.frame().height;
        while self.operands.len() > height {
            if let Some(Operand { ty: Some(ty), reg }) = self.operands.pop() {
                self.registers.get_mut(ty).release_temp(reg);
            }
        }
        self.frame_mut().unreachable = true;

        EmitInfo {
            register: ZERO_REGISTER,
            ty: ExprType::Unreachable,
        }
    }

    fn branch_target(&self, depth: u32, arity: u8) -> Result<ControlFrame, CompileError> {
        let index = (self.frames.len() - 1)
            .checked_sub(depth as usize)
            .ok_or_else(|| CompileError::new("invalid branch target"))?;
        let target = self.frames[index];
        check_arity(arity, target.branch_type())?;
        Ok(target)
    }

    // ===== labels =====

    fn new_label(&mut self) -> Label {
        let label = Label(u32::try_from(self.labels.len()).unwrap_or(u32::MAX));
        self.labels.push(None);
        label
    }

    fn bind_label(&mut self, label: Label) {
        debug_assert!(self.labels[label.0 as usize].is_none(), "label bound twice");
        self.labels[label.0 as usize] = Some(u32::try_from(self.ops.len()).unwrap_or(u32::MAX));
    }

    fn push_op(&mut self, op: Op) {
        self.ops.push(op);
    }
}

fn void() -> EmitInfo {
    EmitInfo {
        register: ZERO_REGISTER,
        ty: ExprType::Void,
    }
}

fn value(ty: ValueType, register: Reg) -> EmitInfo {
    EmitInfo {
        register,
        ty: ExprType::Value(ty),
    }
}

fn check_arity(arity: u8, ty: Option<ValueType>) -> Result<(), CompileError> {
    let expected = u8::from(ty.is_some());
    ensure!(
        arity == expected,
        CompileError::new(format!(
            "branch carries {arity} values, its target expects {expected}"
        ))
    );
    Ok(())
}

fn check_call_arity(arity: u32, ty: &FuncType) -> Result<(), CompileError> {
    ensure!(
        arity as usize == ty.params().len(),
        CompileError::new(format!(
            "call passes {arity} arguments to a function with signature {ty}"
        ))
    );
    Ok(())
}

fn check_alignment(op: &str, memarg: MemArg, access_size: u32) -> Result<(), CompileError> {
    ensure!(
        1u64.checked_shl(memarg.align)
            .is_some_and(|align| align <= u64::from(access_size)),
        CompileError::new(format!(
            "alignment of {op} must not be larger than {access_size} bytes"
        ))
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use regwasm_reader::{BinaryOp, LoadOp};

    use super::*;
    use crate::indices::DefinedFuncIndex;
    use crate::module::{ModuleBuilder, ModuleEnvironment};
    use crate::{Engine, Module};

    const I32: ValueType = ValueType::I32;

    fn module(setup: impl FnOnce(&mut ModuleEnvironment)) -> Module {
        let mut env = ModuleEnvironment::new(&Engine::default());
        setup(&mut env);
        env.finish().unwrap()
    }

    /// A module with one `(i32, i32) -> i32` function and a `f64 -> void` one.
    fn two_functions() -> Module {
        module(|env| {
            let binary = env
                .add_signature(FuncType::new([I32, I32], Some(I32)))
                .unwrap();
            let unary = env
                .add_signature(FuncType::new([ValueType::F64], None))
                .unwrap();
            for sig in [binary, unary] {
                let func = env.allocate_function_info(sig).unwrap();
                env.set_function_body(func, &[], 0).unwrap();
            }
        })
    }

    fn generator(module: &Module) -> BytecodeGenerator<'_> {
        let info = module.info();
        let func = &info.function_infos[DefinedFuncIndex::new(0)];
        BytecodeGenerator::new(info, &info.signatures[func.signature], &func.locals).unwrap()
    }

    fn emit_all(
        generator: &mut BytecodeGenerator<'_>,
        ops: &[Operator<'_>],
    ) -> Result<EmitInfo, CompileError> {
        let mut last = void();
        for op in ops {
            last = generator.emit(op)?;
        }
        Ok(last)
    }

    fn br(relative_depth: u32) -> Operator<'static> {
        Operator::Br {
            arity: 0,
            relative_depth,
        }
    }

    #[test_log::test]
    fn add_params() {
        let module = two_functions();
        let mut generator = generator(&module);

        let info = emit_all(
            &mut generator,
            &[
                Operator::GetLocal { local_index: 0 },
                Operator::GetLocal { local_index: 1 },
                Operator::Binary {
                    op: BinaryOp::I32Add,
                },
            ],
        )
        .unwrap();
        assert_eq!(info.ty, ExprType::Value(I32));

        let compiled = generator.finish("add").unwrap();
        assert_eq!(compiled.name(), "add");
        assert_eq!(compiled.result(), Some(I32));
        assert!(matches!(compiled.ops().last(), Some(Op::Return)));
        assert!(compiled.ops().iter().any(|op| matches!(
            op,
            Op::Move {
                dst: RETURN_REGISTER,
                ..
            }
        )));
        // two reserved, two vars, two temps
        assert_eq!(compiled.register_count(I32), 6);
    }

    #[test_log::test]
    fn missing_result() {
        let module = two_functions();
        let generator = generator(&module);
        let err = generator.finish("f").unwrap_err();
        assert!(err.message().contains("expected i32"), "{err}");
    }

    #[test_log::test]
    fn operand_type_mismatch() {
        let module = two_functions();
        let mut generator = generator(&module);

        let err = emit_all(
            &mut generator,
            &[
                Operator::GetLocal { local_index: 0 },
                Operator::I64Const { value: 1 },
                Operator::Binary {
                    op: BinaryOp::I32Add,
                },
            ],
        )
        .unwrap_err();
        assert!(err.message().contains("expected i32, found i64"), "{err}");
    }

    #[test_log::test]
    fn branch_targets() {
        let module = two_functions();
        let mut generator = generator(&module);

        emit_all(
            &mut generator,
            &[
                Operator::Block {
                    ty: BlockType::Empty,
                },
                Operator::Block {
                    ty: BlockType::Empty,
                },
                br(0),
                Operator::End,
                br(0),
                Operator::End,
                Operator::I32Const { value: 0 },
            ],
        )
        .unwrap();
        let compiled = generator.finish("f").unwrap();

        let jumps = compiled
            .ops()
            .iter()
            .enumerate()
            .filter_map(|(i, op)| match op {
                Op::Jump { target } => Some((i, compiled.label_target(*target))),
                _ => None,
            })
            .collect::<Vec<_>>();

        // each br jumps to the instruction right behind its block
        assert_eq!(jumps, [(0, 1), (1, 2)]);
    }

    #[test_log::test]
    fn invalid_branch_depth() {
        let module = two_functions();
        let mut generator = generator(&module);

        let err = emit_all(
            &mut generator,
            &[
                Operator::Block {
                    ty: BlockType::Empty,
                },
                br(2),
            ],
        )
        .unwrap_err();
        assert_eq!(err.message(), "invalid branch target");
    }

    #[test_log::test]
    fn loop_branches_to_header() {
        let module = two_functions();
        let mut generator = generator(&module);

        emit_all(
            &mut generator,
            &[
                Operator::Loop {
                    ty: BlockType::Empty,
                },
                Operator::GetLocal { local_index: 0 },
                Operator::BrIf {
                    arity: 0,
                    relative_depth: 0,
                },
                Operator::End,
                Operator::GetLocal { local_index: 1 },
            ],
        )
        .unwrap();
        let compiled = generator.finish("f").unwrap();

        let Some(Op::BrIf { target, .. }) = compiled
            .ops()
            .iter()
            .find(|op| matches!(op, Op::BrIf { .. }))
        else {
            panic!("no br_if emitted");
        };
        assert_eq!(compiled.label_target(*target), 0);
    }

    #[test_log::test]
    fn unreachable_code_is_polymorphic() {
        let module = two_functions();
        let mut generator = generator(&module);

        let info = emit_all(
            &mut generator,
            &[
                Operator::Unreachable,
                Operator::Binary {
                    op: BinaryOp::I32Add,
                },
            ],
        )
        .unwrap();
        assert_eq!(info.ty, ExprType::Value(I32));
        generator.finish("f").unwrap();
    }

    #[test_log::test]
    fn if_without_else_has_no_value() {
        let module = two_functions();
        let mut generator = generator(&module);

        let err = emit_all(
            &mut generator,
            &[
                Operator::GetLocal { local_index: 0 },
                Operator::If {
                    ty: BlockType::Value(I32),
                },
                Operator::I32Const { value: 1 },
                Operator::End,
            ],
        )
        .unwrap_err();
        assert!(err.message().contains("if without else"), "{err}");
    }

    #[test_log::test]
    fn call_argument_types_checked_first() {
        let module = two_functions();
        let mut generator = generator(&module);

        let err = emit_all(
            &mut generator,
            &[
                Operator::I32Const { value: 1 },
                Operator::Call {
                    arity: 1,
                    function_index: 1,
                },
            ],
        )
        .unwrap_err();
        assert!(err.message().contains("expected f64, found i32"), "{err}");
        assert!(
            !generator
                .ops
                .iter()
                .any(|op| matches!(op, Op::ArgOut { .. } | Op::Call { .. }))
        );
    }

    #[test_log::test]
    fn call_arity_must_match() {
        let module = two_functions();
        let mut generator = generator(&module);

        let err = generator
            .emit(&Operator::Call {
                arity: 0,
                function_index: 1,
            })
            .unwrap_err();
        assert!(err.message().contains("passes 0 arguments"), "{err}");
    }

    #[test_log::test]
    fn call_tracks_arg_slots() {
        let module = two_functions();
        let mut generator = generator(&module);

        emit_all(
            &mut generator,
            &[
                Operator::GetLocal { local_index: 0 },
                Operator::GetLocal { local_index: 1 },
                Operator::Call {
                    arity: 2,
                    function_index: 0,
                },
            ],
        )
        .unwrap();
        let compiled = generator.finish("f").unwrap();

        let slots = compiled
            .ops()
            .iter()
            .filter_map(|op| match op {
                Op::ArgOut { slot, .. } => Some(*slot),
                _ => None,
            })
            .collect::<Vec<_>>();
        assert_eq!(slots, [8, 12]);
        assert_eq!(compiled.arg_slots(), 2);
    }

    #[test_log::test]
    fn memory_and_table_required() {
        let module = two_functions();
        let mut generator = generator(&module);

        let err = emit_all(
            &mut generator,
            &[
                Operator::I32Const { value: 0 },
                Operator::Load {
                    op: LoadOp::I32Load,
                    memarg: MemArg {
                        align: 2,
                        offset: 0,
                    },
                },
            ],
        )
        .unwrap_err();
        assert!(err.message().contains("requires a memory"), "{err}");

        let err = generator
            .emit(&Operator::CallIndirect {
                arity: 0,
                signature_index: 0,
            })
            .unwrap_err();
        assert!(err.message().contains("function table"), "{err}");
    }

    #[test_log::test]
    fn load_alignment() {
        let module = module(|env| {
            env.initialize_memory(1, Some(1), false).unwrap();
            let sig = env.add_signature(FuncType::new([], None)).unwrap();
            let func = env.allocate_function_info(sig).unwrap();
            env.set_function_body(func, &[], 0).unwrap();
        });
        let mut generator = generator(&module);

        let load = |align| Operator::Load {
            op: LoadOp::I32Load16U,
            memarg: MemArg { align, offset: 4 },
        };

        generator.emit(&Operator::I32Const { value: 0 }).unwrap();
        let err = generator.emit(&load(2)).unwrap_err();
        assert!(err.message().contains("alignment"), "{err}");

        let info = generator.emit(&load(1)).unwrap();
        assert_eq!(info.ty, ExprType::Value(I32));
    }

    #[test_log::test]
    fn immutable_global() {
        let module = module(|env| {
            env.add_global(I32, false, crate::module::GlobalInit::Const(Val::I32(1)))
                .unwrap();
            let sig = env.add_signature(FuncType::new([], None)).unwrap();
            let func = env.allocate_function_info(sig).unwrap();
            env.set_function_body(func, &[], 0).unwrap();
        });
        let mut generator = generator(&module);

        generator
            .emit(&Operator::GetGlobal { global_index: 0 })
            .unwrap();
        let err = generator
            .emit(&Operator::SetGlobal { global_index: 0 })
            .unwrap_err();
        assert!(err.message().contains("immutable"), "{err}");
    }

    #[test_log::test]
    fn leftover_values() {
        let module = two_functions();
        let mut generator = generator(&module);

        let err = emit_all(
            &mut generator,
            &[
                Operator::Block {
                    ty: BlockType::Empty,
                },
                Operator::I32Const { value: 1 },
                Operator::End,
            ],
        )
        .unwrap_err();
        assert!(err.message().contains("1 values remain"), "{err}");
    }
}
