// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use core::fmt;

use crate::binary_reader::BinaryReader;
use crate::limits::MAX_WASM_FUNCTION_PARAMS;
use crate::vec_reader::FromReader;
use crate::Error;

/// The four MVP value types.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub enum ValueType {
    I32,
    I64,
    F32,
    F64,
}

impl ValueType {
    /// All value types in their canonical order.
    pub const ALL: [ValueType; 4] = [Self::I32, Self::I64, Self::F32, Self::F64];

    pub const fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(Self::I32),
            0x02 => Some(Self::I64),
            0x03 => Some(Self::F32),
            0x04 => Some(Self::F64),
            _ => None,
        }
    }

    pub const fn to_byte(self) -> u8 {
        match self {
            Self::I32 => 0x01,
            Self::I64 => 0x02,
            Self::F32 => 0x03,
            Self::F64 => 0x04,
        }
    }

    /// The natural size of the type in bytes, which is also its alignment.
    pub const fn byte_size(self) -> u32 {
        match self {
            Self::I32 | Self::F32 => 4,
            Self::I64 | Self::F64 => 8,
        }
    }

    /// Position of the type within [`ValueType::ALL`], usable as an array index.
    pub const fn index(self) -> usize {
        match self {
            Self::I32 => 0,
            Self::I64 => 1,
            Self::F32 => 2,
            Self::F64 => 3,
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::I32 => "i32",
            Self::I64 => "i64",
            Self::F32 => "f32",
            Self::F64 => "f64",
        })
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum BlockType {
    Empty,
    Value(ValueType),
}

impl BlockType {
    pub(crate) const EMPTY_BYTE: u8 = 0x00;

    pub fn result(self) -> Option<ValueType> {
        match self {
            BlockType::Empty => None,
            BlockType::Value(ty) => Some(ty),
        }
    }
}

/// A function signature: ordered parameter types and at most one result.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FuncType {
    params: Box<[ValueType]>,
    result: Option<ValueType>,
}

impl FuncType {
    pub(crate) const FORM: u8 = 0x40;

    pub fn new(params: impl IntoIterator<Item = ValueType>, result: Option<ValueType>) -> Self {
        Self {
            params: params.into_iter().collect(),
            result,
        }
    }

    pub fn params(&self) -> &[ValueType] {
        &self.params
    }

    pub fn result(&self) -> Option<ValueType> {
        self.result
    }
}

impl fmt::Display for FuncType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{param}")?;
        }
        f.write_str(") -> ")?;
        match self.result {
            Some(ty) => write!(f, "{ty}"),
            None => f.write_str("void"),
        }
    }
}

impl<'a> FromReader<'a> for FuncType {
    fn from_reader(reader: &mut BinaryReader<'a>) -> crate::Result<Self> {
        let form = reader.read_u8()?;
        if form != Self::FORM {
            return Err(Error::InvalidSignatureForm(form));
        }

        let param_count = reader.read_size()?;
        if param_count > MAX_WASM_FUNCTION_PARAMS {
            return Err(Error::TooManyParams(param_count));
        }
        let params = (0..param_count)
            .map(|_| reader.read_value_type())
            .collect::<crate::Result<Box<[_]>>>()?;

        let result = match reader.read_var_u32()? {
            0 => None,
            1 => Some(reader.read_value_type()?),
            n => return Err(Error::TooManyResults(n)),
        };

        Ok(Self { params, result })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_entry() {
        let bytes = [0x40, 0x02, 0x01, 0x04, 0x01, 0x02];
        let ty = FuncType::from_reader(&mut BinaryReader::new(&bytes)).unwrap();
        assert_eq!(ty.params(), &[ValueType::I32, ValueType::F64]);
        assert_eq!(ty.result(), Some(ValueType::I64));
        assert_eq!(ty.to_string(), "(i32, f64) -> i64");

        let void = [0x40, 0x00, 0x00];
        let ty = FuncType::from_reader(&mut BinaryReader::new(&void)).unwrap();
        assert_eq!(ty, FuncType::new([], None));
    }

    #[test]
    fn signature_errors() {
        let bad_form = [0x60, 0x00, 0x00];
        assert!(matches!(
            FuncType::from_reader(&mut BinaryReader::new(&bad_form)),
            Err(Error::InvalidSignatureForm(0x60))
        ));

        let multi_value = [0x40, 0x00, 0x02, 0x01, 0x01];
        assert!(matches!(
            FuncType::from_reader(&mut BinaryReader::new(&multi_value)),
            Err(Error::TooManyResults(2))
        ));
    }

    #[test]
    fn value_type_bytes() {
        for ty in ValueType::ALL {
            assert_eq!(ValueType::from_byte(ty.to_byte()), Some(ty));
            assert_eq!(ValueType::ALL[ty.index()], ty);
        }
        assert_eq!(ValueType::from_byte(0x00), None);
    }
}
