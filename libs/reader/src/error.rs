// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

#[derive(Debug, onlyerror::Error)]
pub enum Error {
    #[error("UTF8 {0}")]
    Utf8(#[from] core::str::Utf8Error),
    #[error("unexpected end of input at offset {offset}")]
    UnexpectedEof { offset: usize },
    #[error("invalid LEB128 integer at offset {offset}: {kind}")]
    InvalidLeb128 {
        offset: usize,
        kind: regwasm_leb128::Error,
    },
    #[error("invalid magic number {0:#010X}")]
    BadMagic(u32),
    #[error("unsupported binary version {0:#X}")]
    UnsupportedVersion(u32),
    #[error("section of {size} bytes at offset {offset} reaches past the end of the module")]
    SectionOutOfBounds { offset: usize, size: usize },
    #[error("section `{section}` is out of order, it must come before `{after}`")]
    SectionOutOfOrder {
        section: &'static str,
        after: &'static str,
    },
    #[error("duplicate section `{0}`")]
    DuplicateSection(&'static str),
    #[error("section `{section}` requires a preceding `{precedent}` section")]
    MissingPrecedent {
        section: &'static str,
        precedent: &'static str,
    },
    #[error("missing required section `{0}`")]
    MissingSection(&'static str),
    #[error("section `{section}` has {trailing} unexpected trailing bytes")]
    SectionSizeMismatch {
        section: &'static str,
        trailing: usize,
    },
    #[error("unknown value type {0:#X}")]
    UnknownValueType(u8),
    #[error("unknown block type {0:#X}")]
    UnknownBlockType(u8),
    #[error("unknown import kind {0:#X}")]
    UnknownImportKind(u8),
    #[error("invalid signature form {0:#X}")]
    InvalidSignatureForm(u8),
    #[error("signature has {0} parameters, more than the supported maximum")]
    TooManyParams(usize),
    #[error("signature has {0} results, at most one is supported")]
    TooManyResults(u32),
    #[error("unknown opcode {opcode:#04X} at offset {offset}")]
    UnknownOpcode { opcode: u8, offset: usize },
    #[error("{space} index {index} out of bounds, the module only has {len}")]
    IndexOutOfBounds {
        space: &'static str,
        index: u32,
        len: u32,
    },
    #[error("invalid arity {0}, must be 0 or 1")]
    InvalidArity(u32),
    #[error("br_table with {0} targets exceeds the supported maximum")]
    BrTableTooLarge(usize),
    #[error("expected {expected} {what}, found {actual}")]
    CountMismatch {
        what: &'static str,
        expected: u32,
        actual: u32,
    },
    #[error("section `{section}` declares {count} entries but only {remaining} bytes remain")]
    CountTooLarge {
        section: &'static str,
        count: u32,
        remaining: usize,
    },
    #[error("string too long")]
    StringTooLong,
    #[error("too many locals")]
    TooManyLocals,
}
