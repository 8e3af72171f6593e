// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use core::fmt;

use crate::binary_reader::BinaryReader;
use crate::limits::MAX_WASM_BR_TABLE_SIZE;
use crate::types::{BlockType, ValueType};
use crate::Error;

/// Generates an operator enum together with its opcode and type tables.
///
/// Each entry reads `Variant = opcode, "text", operand -> result`.
macro_rules! numeric_ops {
    (
        $(#[$outer:meta])*
        pub enum $name:ident {
            $($variant:ident = $opcode:literal, $text:literal, $param:ident -> $result:ident;)*
        }
    ) => {
        $(#[$outer])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant,)*
        }

        impl $name {
            pub const fn from_opcode(opcode: u8) -> Option<Self> {
                match opcode {
                    $($opcode => Some(Self::$variant),)*
                    _ => None,
                }
            }

            pub const fn opcode(self) -> u8 {
                match self {
                    $(Self::$variant => $opcode,)*
                }
            }

            pub const fn name(self) -> &'static str {
                match self {
                    $(Self::$variant => $text,)*
                }
            }

            /// Returns the `(operand, result)` types of this operator.
            pub const fn signature(self) -> (ValueType, ValueType) {
                match self {
                    $(Self::$variant => (ValueType::$param, ValueType::$result),)*
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.name())
            }
        }
    };
}

/// Like `numeric_ops!` but for memory accesses, each entry reads
/// `Variant = opcode, "text", value type, access size, sign extends`.
macro_rules! memory_ops {
    (
        $(#[$outer:meta])*
        pub enum $name:ident {
            $($variant:ident = $opcode:literal, $text:literal, $ty:ident, $size:literal, $signed:literal;)*
        }
    ) => {
        $(#[$outer])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant,)*
        }

        impl $name {
            pub const fn from_opcode(opcode: u8) -> Option<Self> {
                match opcode {
                    $($opcode => Some(Self::$variant),)*
                    _ => None,
                }
            }

            pub const fn opcode(self) -> u8 {
                match self {
                    $(Self::$variant => $opcode,)*
                }
            }

            pub const fn name(self) -> &'static str {
                match self {
                    $(Self::$variant => $text,)*
                }
            }

            pub const fn value_type(self) -> ValueType {
                match self {
                    $(Self::$variant => ValueType::$ty,)*
                }
            }

            /// Number of bytes touched in memory.
            pub const fn access_size(self) -> u32 {
                match self {
                    $(Self::$variant => $size,)*
                }
            }

            pub const fn is_signed(self) -> bool {
                match self {
                    $(Self::$variant => $signed,)*
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.name())
            }
        }
    };
}

numeric_ops! {
    /// Operators that consume one value and produce one value.
    pub enum UnaryOp {
        I32Eqz = 0x45, "i32.eqz", I32 -> I32;
        I64Eqz = 0x50, "i64.eqz", I64 -> I32;
        I32Clz = 0x67, "i32.clz", I32 -> I32;
        I32Ctz = 0x68, "i32.ctz", I32 -> I32;
        I32Popcnt = 0x69, "i32.popcnt", I32 -> I32;
        I64Clz = 0x79, "i64.clz", I64 -> I64;
        I64Ctz = 0x7a, "i64.ctz", I64 -> I64;
        I64Popcnt = 0x7b, "i64.popcnt", I64 -> I64;
        F32Abs = 0x8b, "f32.abs", F32 -> F32;
        F32Neg = 0x8c, "f32.neg", F32 -> F32;
        F32Ceil = 0x8d, "f32.ceil", F32 -> F32;
        F32Floor = 0x8e, "f32.floor", F32 -> F32;
        F32Trunc = 0x8f, "f32.trunc", F32 -> F32;
        F32Nearest = 0x90, "f32.nearest", F32 -> F32;
        F32Sqrt = 0x91, "f32.sqrt", F32 -> F32;
        F64Abs = 0x99, "f64.abs", F64 -> F64;
        F64Neg = 0x9a, "f64.neg", F64 -> F64;
        F64Ceil = 0x9b, "f64.ceil", F64 -> F64;
        F64Floor = 0x9c, "f64.floor", F64 -> F64;
        F64Trunc = 0x9d, "f64.trunc", F64 -> F64;
        F64Nearest = 0x9e, "f64.nearest", F64 -> F64;
        F64Sqrt = 0x9f, "f64.sqrt", F64 -> F64;
        I32WrapI64 = 0xa7, "i32.wrap_i64", I64 -> I32;
        I32TruncF32S = 0xa8, "i32.trunc_f32_s", F32 -> I32;
        I32TruncF32U = 0xa9, "i32.trunc_f32_u", F32 -> I32;
        I32TruncF64S = 0xaa, "i32.trunc_f64_s", F64 -> I32;
        I32TruncF64U = 0xab, "i32.trunc_f64_u", F64 -> I32;
        I64ExtendI32S = 0xac, "i64.extend_i32_s", I32 -> I64;
        I64ExtendI32U = 0xad, "i64.extend_i32_u", I32 -> I64;
        I64TruncF32S = 0xae, "i64.trunc_f32_s", F32 -> I64;
        I64TruncF32U = 0xaf, "i64.trunc_f32_u", F32 -> I64;
        I64TruncF64S = 0xb0, "i64.trunc_f64_s", F64 -> I64;
        I64TruncF64U = 0xb1, "i64.trunc_f64_u", F64 -> I64;
        F32ConvertI32S = 0xb2, "f32.convert_i32_s", I32 -> F32;
        F32ConvertI32U = 0xb3, "f32.convert_i32_u", I32 -> F32;
        F32ConvertI64S = 0xb4, "f32.convert_i64_s", I64 -> F32;
        F32ConvertI64U = 0xb5, "f32.convert_i64_u", I64 -> F32;
        F32DemoteF64 = 0xb6, "f32.demote_f64", F64 -> F32;
        F64ConvertI32S = 0xb7, "f64.convert_i32_s", I32 -> F64;
        F64ConvertI32U = 0xb8, "f64.convert_i32_u", I32 -> F64;
        F64ConvertI64S = 0xb9, "f64.convert_i64_s", I64 -> F64;
        F64ConvertI64U = 0xba, "f64.convert_i64_u", I64 -> F64;
        F64PromoteF32 = 0xbb, "f64.promote_f32", F32 -> F64;
        I32ReinterpretF32 = 0xbc, "i32.reinterpret_f32", F32 -> I32;
        I64ReinterpretF64 = 0xbd, "i64.reinterpret_f64", F64 -> I64;
        F32ReinterpretI32 = 0xbe, "f32.reinterpret_i32", I32 -> F32;
        F64ReinterpretI64 = 0xbf, "f64.reinterpret_i64", I64 -> F64;
    }
}

numeric_ops! {
    /// Operators that consume two values of the same type and produce one value.
    pub enum BinaryOp {
        I32Eq = 0x46, "i32.eq", I32 -> I32;
        I32Ne = 0x47, "i32.ne", I32 -> I32;
        I32LtS = 0x48, "i32.lt_s", I32 -> I32;
        I32LtU = 0x49, "i32.lt_u", I32 -> I32;
        I32GtS = 0x4a, "i32.gt_s", I32 -> I32;
        I32GtU = 0x4b, "i32.gt_u", I32 -> I32;
        I32LeS = 0x4c, "i32.le_s", I32 -> I32;
        I32LeU = 0x4d, "i32.le_u", I32 -> I32;
        I32GeS = 0x4e, "i32.ge_s", I32 -> I32;
        I32GeU = 0x4f, "i32.ge_u", I32 -> I32;
        I64Eq = 0x51, "i64.eq", I64 -> I32;
        I64Ne = 0x52, "i64.ne", I64 -> I32;
        I64LtS = 0x53, "i64.lt_s", I64 -> I32;
        I64LtU = 0x54, "i64.lt_u", I64 -> I32;
        I64GtS = 0x55, "i64.gt_s", I64 -> I32;
        I64GtU = 0x56, "i64.gt_u", I64 -> I32;
        I64LeS = 0x57, "i64.le_s", I64 -> I32;
        I64LeU = 0x58, "i64.le_u", I64 -> I32;
        I64GeS = 0x59, "i64.ge_s", I64 -> I32;
        I64GeU = 0x5a, "i64.ge_u", I64 -> I32;
        F32Eq = 0x5b, "f32.eq", F32 -> I32;
        F32Ne = 0x5c, "f32.ne", F32 -> I32;
        F32Lt = 0x5d, "f32.lt", F32 -> I32;
        F32Gt = 0x5e, "f32.gt", F32 -> I32;
        F32Le = 0x5f, "f32.le", F32 -> I32;
        F32Ge = 0x60, "f32.ge", F32 -> I32;
        F64Eq = 0x61, "f64.eq", F64 -> I32;
        F64Ne = 0x62, "f64.ne", F64 -> I32;
        F64Lt = 0x63, "f64.lt", F64 -> I32;
        F64Gt = 0x64, "f64.gt", F64 -> I32;
        F64Le = 0x65, "f64.le", F64 -> I32;
        F64Ge = 0x66, "f64.ge", F64 -> I32;
        I32Add = 0x6a, "i32.add", I32 -> I32;
        I32Sub = 0x6b, "i32.sub", I32 -> I32;
        I32Mul = 0x6c, "i32.mul", I32 -> I32;
        I32DivS = 0x6d, "i32.div_s", I32 -> I32;
        I32DivU = 0x6e, "i32.div_u", I32 -> I32;
        I32RemS = 0x6f, "i32.rem_s", I32 -> I32;
        I32RemU = 0x70, "i32.rem_u", I32 -> I32;
        I32And = 0x71, "i32.and", I32 -> I32;
        I32Or = 0x72, "i32.or", I32 -> I32;
        I32Xor = 0x73, "i32.xor", I32 -> I32;
        I32Shl = 0x74, "i32.shl", I32 -> I32;
        I32ShrS = 0x75, "i32.shr_s", I32 -> I32;
        I32ShrU = 0x76, "i32.shr_u", I32 -> I32;
        I32Rotl = 0x77, "i32.rotl", I32 -> I32;
        I32Rotr = 0x78, "i32.rotr", I32 -> I32;
        I64Add = 0x7c, "i64.add", I64 -> I64;
        I64Sub = 0x7d, "i64.sub", I64 -> I64;
        I64Mul = 0x7e, "i64.mul", I64 -> I64;
        I64DivS = 0x7f, "i64.div_s", I64 -> I64;
        I64DivU = 0x80, "i64.div_u", I64 -> I64;
        I64RemS = 0x81, "i64.rem_s", I64 -> I64;
        I64RemU = 0x82, "i64.rem_u", I64 -> I64;
        I64And = 0x83, "i64.and", I64 -> I64;
        I64Or = 0x84, "i64.or", I64 -> I64;
        I64Xor = 0x85, "i64.xor", I64 -> I64;
        I64Shl = 0x86, "i64.shl", I64 -> I64;
        I64ShrS = 0x87, "i64.shr_s", I64 -> I64;
        I64ShrU = 0x88, "i64.shr_u", I64 -> I64;
        I64Rotl = 0x89, "i64.rotl", I64 -> I64;
        I64Rotr = 0x8a, "i64.rotr", I64 -> I64;
        F32Add = 0x92, "f32.add", F32 -> F32;
        F32Sub = 0x93, "f32.sub", F32 -> F32;
        F32Mul = 0x94, "f32.mul", F32 -> F32;
        F32Div = 0x95, "f32.div", F32 -> F32;
        F32Min = 0x96, "f32.min", F32 -> F32;
        F32Max = 0x97, "f32.max", F32 -> F32;
        F32Copysign = 0x98, "f32.copysign", F32 -> F32;
        F64Add = 0xa0, "f64.add", F64 -> F64;
        F64Sub = 0xa1, "f64.sub", F64 -> F64;
        F64Mul = 0xa2, "f64.mul", F64 -> F64;
        F64Div = 0xa3, "f64.div", F64 -> F64;
        F64Min = 0xa4, "f64.min", F64 -> F64;
        F64Max = 0xa5, "f64.max", F64 -> F64;
        F64Copysign = 0xa6, "f64.copysign", F64 -> F64;
    }
}

memory_ops! {
    pub enum LoadOp {
        I32Load = 0x28, "i32.load", I32, 4, false;
        I64Load = 0x29, "i64.load", I64, 8, false;
        F32Load = 0x2a, "f32.load", F32, 4, false;
        F64Load = 0x2b, "f64.load", F64, 8, false;
        I32Load8S = 0x2c, "i32.load8_s", I32, 1, true;
        I32Load8U = 0x2d, "i32.load8_u", I32, 1, false;
        I32Load16S = 0x2e, "i32.load16_s", I32, 2, true;
        I32Load16U = 0x2f, "i32.load16_u", I32, 2, false;
        I64Load8S = 0x30, "i64.load8_s", I64, 1, true;
        I64Load8U = 0x31, "i64.load8_u", I64, 1, false;
        I64Load16S = 0x32, "i64.load16_s", I64, 2, true;
        I64Load16U = 0x33, "i64.load16_u", I64, 2, false;
        I64Load32S = 0x34, "i64.load32_s", I64, 4, true;
        I64Load32U = 0x35, "i64.load32_u", I64, 4, false;
    }
}

memory_ops! {
    pub enum StoreOp {
        I32Store = 0x36, "i32.store", I32, 4, false;
        I64Store = 0x37, "i64.store", I64, 8, false;
        F32Store = 0x38, "f32.store", F32, 4, false;
        F64Store = 0x39, "f64.store", F64, 8, false;
        I32Store8 = 0x3a, "i32.store8", I32, 1, false;
        I32Store16 = 0x3b, "i32.store16", I32, 2, false;
        I64Store8 = 0x3c, "i64.store8", I64, 1, false;
        I64Store16 = 0x3d, "i64.store16", I64, 2, false;
        I64Store32 = 0x3e, "i64.store32", I64, 4, false;
    }
}

const UNREACHABLE: u8 = 0x00;
const NOP: u8 = 0x01;
const BLOCK: u8 = 0x02;
const LOOP: u8 = 0x03;
const IF: u8 = 0x04;
const ELSE: u8 = 0x05;
const END: u8 = 0x0b;
const BR: u8 = 0x0c;
const BR_IF: u8 = 0x0d;
const BR_TABLE: u8 = 0x0e;
const RETURN: u8 = 0x0f;
const CALL: u8 = 0x10;
const CALL_INDIRECT: u8 = 0x11;
const DROP: u8 = 0x1a;
const SELECT: u8 = 0x1b;
const GET_LOCAL: u8 = 0x20;
const SET_LOCAL: u8 = 0x21;
const TEE_LOCAL: u8 = 0x22;
const GET_GLOBAL: u8 = 0x23;
const SET_GLOBAL: u8 = 0x24;
const MEMORY_SIZE: u8 = 0x3f;
const MEMORY_GROW: u8 = 0x40;
const I32_CONST: u8 = 0x41;
const I64_CONST: u8 = 0x42;
const F32_CONST: u8 = 0x43;
const F64_CONST: u8 = 0x44;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Ieee32(u32);

impl Ieee32 {
    pub fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub fn bits(self) -> u32 {
        self.0
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Ieee64(u64);

impl Ieee64 {
    pub fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    pub fn bits(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct MemArg {
    /// Log2 of the alignment hint.
    pub align: u32,
    pub offset: u32,
}

/// The targets of a `br_table`, stored as raw little-endian `u32`s.
#[derive(Clone, PartialEq, Eq)]
pub struct BrTable<'a> {
    pub arity: u32,
    targets: &'a [u8],
    pub default: u32,
}

impl<'a> BrTable<'a> {
    pub fn len(&self) -> usize {
        self.targets.len() / 4
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn targets(&self) -> impl ExactSizeIterator<Item = u32> + 'a {
        self.targets
            .chunks_exact(4)
            .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
    }
}

impl fmt::Debug for BrTable<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrTable")
            .field("arity", &self.arity)
            .field("targets", &self.targets().collect::<Vec<_>>())
            .field("default", &self.default)
            .finish()
    }
}

/// One decoded instruction node: an opcode plus its immediates.
#[derive(Debug, Clone, PartialEq)]
pub enum Operator<'a> {
    Unreachable,
    Nop,
    Block { ty: BlockType },
    Loop { ty: BlockType },
    If { ty: BlockType },
    Else,
    End,
    Br { arity: u8, relative_depth: u32 },
    BrIf { arity: u8, relative_depth: u32 },
    BrTable { table: BrTable<'a> },
    Return { arity: u8 },
    Call { arity: u32, function_index: u32 },
    CallIndirect { arity: u32, signature_index: u32 },
    Drop,
    Select,
    GetLocal { local_index: u32 },
    SetLocal { local_index: u32 },
    TeeLocal { local_index: u32 },
    GetGlobal { global_index: u32 },
    SetGlobal { global_index: u32 },
    Load { op: LoadOp, memarg: MemArg },
    Store { op: StoreOp, memarg: MemArg },
    MemorySize,
    MemoryGrow,
    I32Const { value: i32 },
    I64Const { value: i64 },
    F32Const { value: Ieee32 },
    F64Const { value: Ieee64 },
    Unary { op: UnaryOp },
    Binary { op: BinaryOp },
}

/// Current sizes of the module's index spaces, used to bounds check index
/// immediates while decoding.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IndexSpaces {
    pub functions: u32,
    pub signatures: u32,
    pub globals: u32,
}

impl IndexSpaces {
    fn check(space: &'static str, index: u32, len: u32) -> crate::Result<u32> {
        if index < len {
            Ok(index)
        } else {
            Err(Error::IndexOutOfBounds { space, index, len })
        }
    }
}

/// Decodes one instruction node per call from a function's code bytes.
#[derive(Debug, Clone)]
pub struct OperatorsReader<'a> {
    reader: BinaryReader<'a>,
    spaces: IndexSpaces,
}

impl<'a> OperatorsReader<'a> {
    pub fn new(bytes: &'a [u8], offset: usize, spaces: IndexSpaces) -> Self {
        Self {
            reader: BinaryReader::new_with_offset(bytes, offset),
            spaces,
        }
    }

    pub fn eof(&self) -> bool {
        self.reader.eof()
    }

    pub fn original_position(&self) -> usize {
        self.reader.original_position()
    }

    pub fn read(&mut self) -> crate::Result<Operator<'a>> {
        let offset = self.reader.original_position();
        let opcode = self.reader.read_u8()?;

        Ok(match opcode {
            UNREACHABLE => Operator::Unreachable,
            NOP => Operator::Nop,
            BLOCK => Operator::Block {
                ty: self.reader.read_block_type()?,
            },
            LOOP => Operator::Loop {
                ty: self.reader.read_block_type()?,
            },
            IF => Operator::If {
                ty: self.reader.read_block_type()?,
            },
            ELSE => Operator::Else,
            END => Operator::End,
            BR => Operator::Br {
                arity: self.read_small_arity()?,
                relative_depth: self.reader.read_var_u32()?,
            },
            BR_IF => Operator::BrIf {
                arity: self.read_small_arity()?,
                relative_depth: self.reader.read_var_u32()?,
            },
            BR_TABLE => Operator::BrTable {
                table: self.read_br_table()?,
            },
            RETURN => Operator::Return {
                arity: self.read_small_arity()?,
            },
            CALL => Operator::Call {
                arity: self.reader.read_var_u32()?,
                function_index: IndexSpaces::check(
                    "function",
                    self.reader.read_var_u32()?,
                    self.spaces.functions,
                )?,
            },
            CALL_INDIRECT => Operator::CallIndirect {
                arity: self.reader.read_var_u32()?,
                signature_index: IndexSpaces::check(
                    "signature",
                    self.reader.read_var_u32()?,
                    self.spaces.signatures,
                )?,
            },
            DROP => Operator::Drop,
            SELECT => Operator::Select,
            GET_LOCAL => Operator::GetLocal {
                local_index: self.reader.read_var_u32()?,
            },
            SET_LOCAL => Operator::SetLocal {
                local_index: self.reader.read_var_u32()?,
            },
            TEE_LOCAL => Operator::TeeLocal {
                local_index: self.reader.read_var_u32()?,
            },
            GET_GLOBAL => Operator::GetGlobal {
                global_index: self.read_global_index()?,
            },
            SET_GLOBAL => Operator::SetGlobal {
                global_index: self.read_global_index()?,
            },
            MEMORY_SIZE => Operator::MemorySize,
            MEMORY_GROW => Operator::MemoryGrow,
            I32_CONST => Operator::I32Const {
                value: self.reader.read_var_i32()?,
            },
            I64_CONST => Operator::I64Const {
                value: self.reader.read_var_i64()?,
            },
            F32_CONST => Operator::F32Const {
                value: Ieee32(self.reader.read_u32()?),
            },
            F64_CONST => Operator::F64Const {
                value: Ieee64(self.reader.read_u64()?),
            },
            _ => {
                if let Some(op) = LoadOp::from_opcode(opcode) {
                    Operator::Load {
                        op,
                        memarg: self.read_memarg()?,
                    }
                } else if let Some(op) = StoreOp::from_opcode(opcode) {
                    Operator::Store {
                        op,
                        memarg: self.read_memarg()?,
                    }
                } else if let Some(op) = UnaryOp::from_opcode(opcode) {
                    Operator::Unary { op }
                } else if let Some(op) = BinaryOp::from_opcode(opcode) {
                    Operator::Binary { op }
                } else {
                    return Err(Error::UnknownOpcode { opcode, offset });
                }
            }
        })
    }

    fn read_small_arity(&mut self) -> crate::Result<u8> {
        let arity = self.reader.read_u8()?;
        if arity > 1 {
            return Err(Error::InvalidArity(u32::from(arity)));
        }
        Ok(arity)
    }

    fn read_global_index(&mut self) -> crate::Result<u32> {
        let index = self.reader.read_var_u32()?;
        IndexSpaces::check("global", index, self.spaces.globals)
    }

    fn read_memarg(&mut self) -> crate::Result<MemArg> {
        Ok(MemArg {
            align: self.reader.read_var_u32()?,
            offset: self.reader.read_var_u32()?,
        })
    }

    fn read_br_table(&mut self) -> crate::Result<BrTable<'a>> {
        let arity = self.reader.read_var_u32()?;
        if arity > 1 {
            return Err(Error::InvalidArity(arity));
        }

        let count = self.reader.read_size()?;
        if count > MAX_WASM_BR_TABLE_SIZE {
            return Err(Error::BrTableTooLarge(count));
        }

        let targets = self.reader.read_bytes(count * 4)?;
        let default = self.reader.read_u32()?;

        Ok(BrTable {
            arity,
            targets,
            default,
        })
    }
}
