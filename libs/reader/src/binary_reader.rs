// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use core::str;

use regwasm_leb128::Leb128Read;

use crate::limits::MAX_WASM_STRING_SIZE;
use crate::types::{BlockType, ValueType};
use crate::Error;

/// A cursor over a slice of the module's bytes.
///
/// `offset` is the position of `bytes[0]` within the whole module so that
/// errors and code locations can be reported relative to the original input.
#[derive(Clone, Debug)]
pub struct BinaryReader<'a> {
    pub(crate) bytes: &'a [u8],
    pub(crate) pos: usize,
    offset: usize,
}

impl<'a> BinaryReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self::new_with_offset(bytes, 0)
    }

    pub fn new_with_offset(bytes: &'a [u8], offset: usize) -> Self {
        Self {
            bytes,
            pos: 0,
            offset,
        }
    }

    /// The current position relative to the start of the module.
    pub fn original_position(&self) -> usize {
        self.offset + self.pos
    }

    pub fn eof(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    pub fn remaining_bytes(&self) -> &'a [u8] {
        &self.bytes[self.pos..]
    }

    pub fn ensure_bytes(&self, len: usize) -> crate::Result<()> {
        if self.pos + len > self.bytes.len() {
            Err(Error::UnexpectedEof {
                offset: self.original_position(),
            })
        } else {
            Ok(())
        }
    }

    /// Fails if there are bytes left, attributing them to `section`.
    pub fn ensure_end(&self, section: &'static str) -> crate::Result<()> {
        if self.eof() {
            Ok(())
        } else {
            Err(Error::SectionSizeMismatch {
                section,
                trailing: self.bytes.len() - self.pos,
            })
        }
    }

    pub fn read_u8(&mut self) -> crate::Result<u8> {
        self.ensure_bytes(1)?;
        let byte = self.bytes[self.pos];
        self.pos += 1;
        Ok(byte)
    }

    pub fn read_bytes(&mut self, len: usize) -> crate::Result<&'a [u8]> {
        self.ensure_bytes(len)?;
        let bytes = &self.bytes[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    pub fn read_u32(&mut self) -> crate::Result<u32> {
        let bytes = self.read_bytes(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn read_u64(&mut self) -> crate::Result<u64> {
        let mut buf = [0; 8];
        buf.copy_from_slice(self.read_bytes(8)?);
        Ok(u64::from_le_bytes(buf))
    }

    pub fn read_var_u32(&mut self) -> crate::Result<u32> {
        self.read_leb128(|r| r.read_var_u32())
    }

    pub fn read_var_i32(&mut self) -> crate::Result<i32> {
        self.read_leb128(|r| r.read_var_i32())
    }

    pub fn read_var_i64(&mut self) -> crate::Result<i64> {
        self.read_leb128(|r| r.read_var_i64())
    }

    /// Reads a `u32` LEB128 count or length and widens it to `usize`.
    pub fn read_size(&mut self) -> crate::Result<usize> {
        let size = self.read_var_u32()?;
        usize::try_from(size).map_err(|_| Error::InvalidLeb128 {
            offset: self.original_position(),
            kind: regwasm_leb128::Error::Overflow,
        })
    }

    fn read_leb128<T>(
        &mut self,
        read: impl FnOnce(&mut &'a [u8]) -> regwasm_leb128::Result<T>,
    ) -> crate::Result<T> {
        let mut rest = self.remaining_bytes();
        let before = rest.len();
        match read(&mut rest) {
            Ok(value) => {
                self.pos += before - rest.len();
                Ok(value)
            }
            Err(kind) => Err(Error::InvalidLeb128 {
                offset: self.original_position(),
                kind,
            }),
        }
    }

    pub fn read_str(&mut self) -> crate::Result<&'a str> {
        let len = self.read_size()?;

        if len > MAX_WASM_STRING_SIZE {
            return Err(Error::StringTooLong);
        }

        let bytes = self.read_bytes(len)?;
        Ok(str::from_utf8(bytes)?)
    }

    pub fn read_value_type(&mut self) -> crate::Result<ValueType> {
        let byte = self.read_u8()?;
        ValueType::from_byte(byte).ok_or(Error::UnknownValueType(byte))
    }

    pub fn read_block_type(&mut self) -> crate::Result<BlockType> {
        let byte = self.read_u8()?;
        if byte == BlockType::EMPTY_BYTE {
            Ok(BlockType::Empty)
        } else {
            ValueType::from_byte(byte)
                .map(BlockType::Value)
                .ok_or(Error::UnknownBlockType(byte))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_advance_and_track_offsets() {
        let bytes = [0x01, 0xe5, 0x8e, 0x26, 0x03, b'a', b'b', b'c', 0x04];
        let mut reader = BinaryReader::new_with_offset(&bytes, 100);

        assert_eq!(reader.read_value_type().unwrap(), ValueType::I32);
        assert_eq!(reader.read_var_u32().unwrap(), 624485);
        assert_eq!(reader.original_position(), 104);
        assert_eq!(reader.read_str().unwrap(), "abc");
        assert_eq!(reader.read_block_type().unwrap(), BlockType::Value(ValueType::F64));
        assert!(reader.eof());
        assert!(reader.ensure_end("test").is_ok());
    }

    #[test]
    fn errors_carry_original_offset() {
        let bytes = [0x80, 0x80];
        let mut reader = BinaryReader::new_with_offset(&bytes, 7);
        assert!(matches!(
            reader.read_var_u32(),
            Err(Error::InvalidLeb128 { offset: 7, .. })
        ));

        let mut reader = BinaryReader::new_with_offset(&bytes, 7);
        assert!(matches!(
            reader.read_u32(),
            Err(Error::UnexpectedEof { offset: 7 })
        ));
    }

    #[test]
    fn unknown_types() {
        assert!(matches!(
            BinaryReader::new(&[0x7f]).read_value_type(),
            Err(Error::UnknownValueType(0x7f))
        ));
        assert!(matches!(
            BinaryReader::new(&[0x40]).read_block_type(),
            Err(Error::UnknownBlockType(0x40))
        ));
        assert_eq!(
            BinaryReader::new(&[0x00]).read_block_type().unwrap(),
            BlockType::Empty
        );
    }

    #[test]
    fn trailing_bytes() {
        let reader = BinaryReader::new(&[1, 2, 3]);
        assert!(matches!(
            reader.ensure_end("memory"),
            Err(Error::SectionSizeMismatch {
                section: "memory",
                trailing: 3
            })
        ));
    }
}
