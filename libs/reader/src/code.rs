// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use core::fmt;

use crate::binary_reader::BinaryReader;
use crate::limits::MAX_WASM_FUNCTION_LOCALS;
use crate::types::ValueType;
use crate::vec_reader::FromReader;
use crate::Error;

/// The raw bytes of one entry of the `function_bodies` section.
#[derive(Clone)]
pub struct FunctionBody<'a> {
    reader: BinaryReader<'a>,
}

/// Run-length encoded local declarations at the start of a function body.
#[derive(Clone)]
pub struct Locals<'a> {
    reader: BinaryReader<'a>,
    remaining: u32,
    declared: u32,
    err: bool,
}

/// The instruction bytes of a function body, after the local declarations.
#[derive(Debug, Clone, Copy)]
pub struct CodeBytes<'a> {
    pub offset: usize,
    pub bytes: &'a [u8],
}

impl<'a> FromReader<'a> for FunctionBody<'a> {
    fn from_reader(reader: &mut BinaryReader<'a>) -> crate::Result<Self> {
        let size = reader.read_size()?;
        let offset = reader.original_position();
        let bytes = reader.read_bytes(size)?;

        Ok(FunctionBody {
            reader: BinaryReader::new_with_offset(bytes, offset),
        })
    }
}

impl<'a> FunctionBody<'a> {
    pub fn len(&self) -> usize {
        self.reader.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reader.bytes.is_empty()
    }

    pub fn original_position(&self) -> usize {
        self.reader.original_position()
    }

    pub fn locals(&self) -> crate::Result<Locals<'a>> {
        let mut reader = self.reader.clone();
        let count = reader.read_var_u32()?;

        Ok(Locals {
            reader,
            remaining: count,
            declared: 0,
            err: false,
        })
    }

    /// Skips the local declarations and returns the instruction bytes.
    ///
    /// Instructions run until the end of the body; there is no terminating
    /// `end` opcode at function level.
    pub fn code(&self) -> crate::Result<CodeBytes<'a>> {
        let mut locals = self.locals()?;
        for entry in locals.by_ref() {
            entry?;
        }

        Ok(CodeBytes {
            offset: locals.reader.original_position(),
            bytes: locals.reader.remaining_bytes(),
        })
    }
}

impl fmt::Debug for FunctionBody<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionBody")
            .field("offset", &self.reader.original_position())
            .field("len", &self.len())
            .finish()
    }
}

impl Locals<'_> {
    fn read(&mut self) -> crate::Result<(u32, ValueType)> {
        let count = self.reader.read_var_u32()?;
        self.declared = self
            .declared
            .checked_add(count)
            .filter(|declared| *declared <= MAX_WASM_FUNCTION_LOCALS)
            .ok_or(Error::TooManyLocals)?;
        let value_type = self.reader.read_value_type()?;
        Ok((count, value_type))
    }
}

impl Iterator for Locals<'_> {
    type Item = crate::Result<(u32, ValueType)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.err || self.remaining == 0 {
            return None;
        }

        let res = self.read();
        self.err = res.is_err();
        self.remaining -= 1;
        Some(res)
    }
}

impl fmt::Debug for Locals<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut l = f.debug_list();
        for (count, ty) in self.clone().flatten() {
            for _ in 0..count {
                l.entry(&ty);
            }
        }

        l.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locals_and_code() {
        // size 8: two local entries (2 x i32, 1 x f64) followed by three code bytes
        let bytes = [0x08, 0x02, 0x02, 0x01, 0x01, 0x04, 0x41, 0x2a, 0x1a];
        let body = FunctionBody::from_reader(&mut BinaryReader::new(&bytes)).unwrap();
        assert_eq!(body.len(), 8);

        let locals = body
            .locals()
            .unwrap()
            .collect::<crate::Result<Vec<_>>>()
            .unwrap();
        assert_eq!(locals, [(2, ValueType::I32), (1, ValueType::F64)]);

        let code = body.code().unwrap();
        assert_eq!(code.bytes, &[0x41, 0x2a, 0x1a]);
        assert_eq!(code.offset, 6);
    }

    #[test]
    fn too_many_locals() {
        let bytes = [0x07, 0x02, 0xff, 0xff, 0x03, 0x01, 0x01, 0x01];
        let body = FunctionBody::from_reader(&mut BinaryReader::new(&bytes)).unwrap();
        assert!(matches!(body.code(), Err(Error::TooManyLocals)));
    }
}
