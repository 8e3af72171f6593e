// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use cranelift_entity::{EntityRef, PrimaryMap};

use crate::indices::{DefinedFuncIndex, FuncIndex};
use crate::{Func, Memory, Table, Val, ValueType};

/// The private state of one instance.
#[derive(Debug)]
pub(crate) struct Environment {
    pub memory: Option<Memory>,
    pub table: Option<Table>,
    /// Imported functions, in import order.
    pub imported_functions: Vec<Func>,
    pub defined_functions: PrimaryMap<DefinedFuncIndex, Func>,
    pub globals: GlobalsRegion,
}

/// Globals packed according to the module's global layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct GlobalsRegion(Vec<u8>);

// ===== impl Environment =====

impl Environment {
    /// Resolves an index of the function index space.
    ///
    /// # Panics
    ///
    /// Panics if `index` is outside the module's function index space.
    pub fn function(&self, index: FuncIndex) -> Func {
        match index.index().checked_sub(self.imported_functions.len()) {
            None => self.imported_functions[index.index()],
            Some(defined) => self.defined_functions[DefinedFuncIndex::new(defined)],
        }
    }

    /// Size in 8-byte slots: memory and table, the function bindings and the
    /// globals region.
    pub fn size_in_slots(&self) -> usize {
        2 + self.imported_functions.len() + self.defined_functions.len() + self.globals.slots()
    }
}

// ===== impl GlobalsRegion =====

impl GlobalsRegion {
    pub fn new(size: u32) -> Self {
        Self(vec![0; size as usize])
    }

    fn slots(&self) -> usize {
        self.0.len().div_ceil(8)
    }

    /// Reads the raw bits of a global, 32-bit values in the low half.
    pub fn read(&self, offset: u32, ty: ValueType) -> u64 {
        let start = offset as usize;
        let mut bytes = [0; 8];
        bytes[..ty.byte_size() as usize]
            .copy_from_slice(&self.0[start..start + ty.byte_size() as usize]);
        u64::from_le_bytes(bytes)
    }

    pub fn write(&mut self, offset: u32, ty: ValueType, bits: u64) {
        let start = offset as usize;
        let len = ty.byte_size() as usize;
        self.0[start..start + len].copy_from_slice(&bits.to_le_bytes()[..len]);
    }

    pub fn get(&self, offset: u32, ty: ValueType) -> Val {
        Val::from_bits(ty, self.read(offset, ty))
    }

    pub fn set(&mut self, offset: u32, val: Val) {
        self.write(offset, val.ty(), val.to_bits());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn globals_region() {
        let mut globals = GlobalsRegion::new(24);
        globals.set(0, Val::I32(-7));
        globals.set(4, Val::I32(42));
        globals.set(16, Val::from(2.5f64));

        assert_eq!(globals.get(0, ValueType::I32), Val::I32(-7));
        assert_eq!(globals.get(4, ValueType::I32), Val::I32(42));
        assert_eq!(globals.get(16, ValueType::F64), Val::from(2.5f64));
        assert_eq!(globals.read(0, ValueType::I32), 0xffff_fff9);
        assert_eq!(globals.slots(), 3);
    }
}
