// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use crate::errors::LinkError;
use crate::store::{Store, Stored};
use crate::trap::Trap;
use crate::utils::ensure;
use crate::Func;

/// A table of function references, the target of `call_indirect`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Table(pub(crate) Stored<TableData>);

#[derive(Debug)]
pub(crate) struct TableData {
    elements: Vec<Option<Func>>,
    max: Option<u32>,
}

impl Table {
    /// Creates a table of `min` null elements.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::InvalidLimits`] if `max < min` or the minimum
    /// exceeds the engine's element limit.
    pub fn new(store: &mut Store, min: u32, max: Option<u32>) -> crate::Result<Table> {
        let data = TableData::new(store, min, max)?;
        Ok(Table(store.add_table(data)))
    }

    /// # Panics
    ///
    /// Panics if `store` does not own this table.
    pub fn size(self, store: &Store) -> u32 {
        store[self.0].size()
    }

    /// # Panics
    ///
    /// Panics if `store` does not own this table.
    pub fn max(self, store: &Store) -> Option<u32> {
        store[self.0].max
    }

    /// Returns the element at `index`, `None` if it is null or out of bounds.
    ///
    /// # Panics
    ///
    /// Panics if `store` does not own this table.
    pub fn get(self, store: &Store, index: u32) -> Option<Func> {
        store[self.0].get(index).flatten()
    }

    /// # Errors
    ///
    /// Traps with [`Trap::TableOutOfBounds`] if `index` is out of bounds.
    ///
    /// # Panics
    ///
    /// Panics if `store` does not own this table.
    pub fn set(self, store: &mut Store, index: u32, func: Option<Func>) -> crate::Result<()> {
        let slot = store[self.0]
            .elements
            .get_mut(index as usize)
            .ok_or(Trap::TableOutOfBounds)?;
        *slot = func;
        Ok(())
    }
}

impl TableData {
    pub(crate) fn new(store: &Store, min: u32, max: Option<u32>) -> Result<Self, LinkError> {
        let invalid = || LinkError::InvalidLimits {
            kind: "table",
            min,
            max,
        };

        ensure!(
            min <= store.engine().config().max_table_elements,
            invalid()
        );
        ensure!(max.is_none_or(|max| max >= min), invalid());

        Ok(Self {
            elements: vec![None; min as usize],
            max,
        })
    }

    pub(crate) fn size(&self) -> u32 {
        u32::try_from(self.elements.len()).unwrap_or(u32::MAX)
    }

    pub(crate) fn max(&self) -> Option<u32> {
        self.max
    }

    /// `None` if out of bounds, `Some(None)` for a null element.
    pub(crate) fn get(&self, index: u32) -> Option<Option<Func>> {
        self.elements.get(index as usize).copied()
    }

    pub(crate) fn elements_mut(&mut self) -> &mut [Option<Func>] {
        &mut self.elements
    }
}
