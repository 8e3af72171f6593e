// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use core::fmt;

use crate::ValueType;
use crate::errors::CompileError;

/// Registers at the bottom of every register space that are never allocated.
pub const RESERVED_REGISTER_COUNT: u16 = 2;
/// Always holds zero.
pub const ZERO_REGISTER: Reg = Reg(0);
/// Holds the function's return value on exit.
pub const RETURN_REGISTER: Reg = Reg(1);

/// A register within the register space of one value type.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Reg(u16);

/// Allocation state of one value type's registers.
///
/// Laid out as `[reserved | vars | temps]`. Vars are acquired once per local
/// and never released; temps are acquired and released in LIFO order.
#[derive(Debug, Default, Clone)]
pub struct RegisterSpace {
    vars: u16,
    temps: u16,
    max_temps: u16,
}

/// One [`RegisterSpace`] per value type.
#[derive(Debug, Default, Clone)]
pub struct RegisterSpaces([RegisterSpace; 4]);

// ===== impl Reg =====

impl Reg {
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for Reg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

// ===== impl RegisterSpace =====

impl RegisterSpace {
    fn too_many() -> CompileError {
        CompileError::new("function requires too many registers")
    }

    pub fn acquire_var(&mut self) -> Result<Reg, CompileError> {
        debug_assert_eq!(self.temps, 0, "vars must be acquired before any temp");

        let reg = RESERVED_REGISTER_COUNT
            .checked_add(self.vars)
            .ok_or_else(Self::too_many)?;
        self.vars += 1;
        Ok(Reg(reg))
    }

    pub fn acquire_temp(&mut self) -> Result<Reg, CompileError> {
        let reg = RESERVED_REGISTER_COUNT
            .checked_add(self.vars)
            .and_then(|first| first.checked_add(self.temps))
            .filter(|reg| *reg < u16::MAX)
            .ok_or_else(Self::too_many)?;

        self.temps += 1;
        self.max_temps = self.max_temps.max(self.temps);
        Ok(Reg(reg))
    }

    /// Releases the most recently acquired temp.
    pub fn release_temp(&mut self, reg: Reg) {
        debug_assert!(self.temps > 0, "no temp to release");
        debug_assert_eq!(
            reg.0,
            RESERVED_REGISTER_COUNT + self.vars + self.temps - 1,
            "temps must be released in LIFO order"
        );
        self.temps -= 1;
    }

    pub fn live_temps(&self) -> u16 {
        self.temps
    }

    /// Number of registers a frame needs for this type.
    pub fn register_count(&self) -> u16 {
        RESERVED_REGISTER_COUNT + self.vars + self.max_temps
    }
}

// ===== impl RegisterSpaces =====

impl RegisterSpaces {
    pub fn get(&self, ty: ValueType) -> &RegisterSpace {
        &self.0[ty.index()]
    }

    pub fn get_mut(&mut self, ty: ValueType) -> &mut RegisterSpace {
        &mut self.0[ty.index()]
    }

    pub fn register_counts(&self) -> [u16; 4] {
        ValueType::ALL.map(|ty| self.get(ty).register_count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout() {
        let mut space = RegisterSpace::default();
        assert_eq!(space.acquire_var().unwrap(), Reg(2));
        assert_eq!(space.acquire_var().unwrap(), Reg(3));

        let a = space.acquire_temp().unwrap();
        let b = space.acquire_temp().unwrap();
        assert_eq!((a, b), (Reg(4), Reg(5)));
        space.release_temp(b);
        assert_eq!(space.acquire_temp().unwrap(), Reg(5));
        space.release_temp(Reg(5));
        space.release_temp(a);

        assert_eq!(space.live_temps(), 0);
        assert_eq!(space.register_count(), 6);
    }

    #[test]
    fn spaces_are_independent() {
        let mut spaces = RegisterSpaces::default();
        spaces.get_mut(ValueType::F64).acquire_var().unwrap();
        let i = spaces.get_mut(ValueType::I32).acquire_temp().unwrap();
        let f = spaces.get_mut(ValueType::F64).acquire_temp().unwrap();

        assert_eq!(i, Reg(2));
        assert_eq!(f, Reg(3));
        assert_eq!(spaces.register_counts(), [3, 2, 2, 4]);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "LIFO")]
    fn out_of_order_release() {
        let mut space = RegisterSpace::default();
        let a = space.acquire_temp().unwrap();
        let _b = space.acquire_temp().unwrap();
        space.release_temp(a);
    }
}
