// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Decoder for the sectioned WebAssembly binary format.
//!
//! [`Parser`] validates the module header and hands out a [`SectionsIter`]
//! that enforces section ordering. Function bodies are decoded lazily, one
//! instruction per call, through an [`OperatorsReader`].

mod binary_reader;
mod code;
mod error;
mod limits;
mod operators;
mod sections;
mod types;
mod vec_reader;

pub use binary_reader::BinaryReader;
pub use code::{CodeBytes, FunctionBody, Locals};
pub use error::Error;
pub use limits::*;
pub use operators::{
    BinaryOp, BrTable, Ieee32, Ieee64, IndexSpaces, LoadOp, MemArg, Operator, OperatorsReader,
    StoreOp, UnaryOp,
};
pub use sections::{
    DataSegment, Export, FunctionNames, Import, ImportKind, MemorySection, Payload, SectionId,
    SectionsIter,
};
pub use types::{BlockType, FuncType, ValueType};
pub use vec_reader::{FromReader, VecIter, VecReader};

pub type Result<T> = core::result::Result<T, Error>;

/// `\0asm`
pub const WASM_MAGIC: u32 = 0x6d73_6100;
pub const WASM_VERSION: u32 = 0x0b;

#[derive(Debug, Clone)]
pub struct Parser<'a> {
    reader: BinaryReader<'a>,
    decode_auxiliary: bool,
}

impl<'a> Parser<'a> {
    /// Checks the module header and positions the parser at the first section.
    pub fn new(bytes: &'a [u8]) -> Result<Self> {
        let mut reader = BinaryReader::new(bytes);

        let magic = reader.read_u32()?;
        if magic != WASM_MAGIC {
            return Err(Error::BadMagic(magic));
        }
        let version = reader.read_u32()?;
        if version != WASM_VERSION {
            return Err(Error::UnsupportedVersion(version));
        }
        log::trace!("module header ok, {} bytes of sections", reader.remaining_bytes().len());

        Ok(Self {
            reader,
            decode_auxiliary: false,
        })
    }

    /// Whether the `import_table`, `start_function` and `names` sections are
    /// decoded instead of skipped.
    pub fn decode_auxiliary_sections(mut self, enable: bool) -> Self {
        self.decode_auxiliary = enable;
        self
    }

    pub fn sections(&self) -> SectionsIter<'a> {
        SectionsIter::new(self.reader.clone(), self.decode_auxiliary)
    }
}
