// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use crate::errors::LinkError;
use crate::store::{Store, Stored};
use crate::utils::ensure;

/// A WebAssembly linear memory.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Memory(pub(crate) Stored<MemoryData>);

#[derive(Debug)]
pub(crate) struct MemoryData {
    bytes: Vec<u8>,
    /// Declared maximum in pages.
    max: Option<u32>,
    /// Hard limit in pages imposed by the engine.
    limit: u32,
    page_size: usize,
}

// ===== impl Memory =====

impl Memory {
    /// Creates a memory of `min` pages that may grow up to `max` pages.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::InvalidLimits`] if `max < min` or the minimum
    /// exceeds the engine's page limit.
    pub fn new(store: &mut Store, min: u32, max: Option<u32>) -> crate::Result<Memory> {
        let data = MemoryData::new(store, min, max)?;
        Ok(Memory(store.add_memory(data)))
    }

    /// Current size in pages.
    ///
    /// # Panics
    ///
    /// Panics if `store` does not own this memory.
    pub fn size(self, store: &Store) -> u32 {
        store[self.0].size()
    }

    /// Declared maximum size in pages.
    ///
    /// # Panics
    ///
    /// Panics if `store` does not own this memory.
    pub fn max(self, store: &Store) -> Option<u32> {
        store[self.0].max
    }

    /// # Panics
    ///
    /// Panics if `store` does not own this memory.
    pub fn page_size(self, store: &Store) -> usize {
        store[self.0].page_size
    }

    /// # Panics
    ///
    /// Panics if `store` does not own this memory.
    pub fn data(self, store: &Store) -> &[u8] {
        &store[self.0].bytes
    }

    /// # Panics
    ///
    /// Panics if `store` does not own this memory.
    pub fn data_mut(self, store: &mut Store) -> &mut [u8] {
        &mut store[self.0].bytes
    }

    /// Grows the memory by `delta` pages, returning the previous size, or
    /// `None` if the new size would exceed the maximum.
    ///
    /// # Panics
    ///
    /// Panics if `store` does not own this memory.
    pub fn grow(self, store: &mut Store, delta: u32) -> Option<u32> {
        store[self.0].grow(delta)
    }
}

// ===== impl MemoryData =====

impl MemoryData {
    pub(crate) fn new(store: &Store, min: u32, max: Option<u32>) -> Result<Self, LinkError> {
        let config = store.engine().config();
        let invalid = || LinkError::InvalidLimits {
            kind: "memory",
            min,
            max,
        };

        ensure!(min <= config.max_memory_pages, invalid());
        ensure!(max.is_none_or(|max| max >= min), invalid());

        let page_size = config.page_size();
        Ok(Self {
            bytes: vec![0; min as usize * page_size],
            max,
            limit: config.max_memory_pages,
            page_size,
        })
    }

    pub(crate) fn size(&self) -> u32 {
        u32::try_from(self.bytes.len() / self.page_size).unwrap_or(u32::MAX)
    }

    pub(crate) fn max(&self) -> Option<u32> {
        self.max
    }

    pub(crate) fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub(crate) fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.bytes
    }

    pub(crate) fn grow(&mut self, delta: u32) -> Option<u32> {
        let old = self.size();
        let new = old.checked_add(delta)?;
        let max = self.max.map_or(self.limit, |max| max.min(self.limit));
        if new > max {
            tracing::trace!(old, delta, max, "memory.grow failed");
            return None;
        }

        self.bytes.resize(new as usize * self.page_size, 0);
        Some(old)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Config, Engine};

    #[test]
    fn grow_respects_maximum() {
        let mut config = Config::new();
        config.page_size_log2(4);
        let mut store = Store::new(&Engine::new(&config));

        let memory = Memory::new(&mut store, 1, Some(3)).unwrap();
        assert_eq!(memory.data(&store).len(), 16);
        assert_eq!(memory.grow(&mut store, 2), Some(1));
        assert_eq!(memory.size(&store), 3);
        assert_eq!(memory.grow(&mut store, 1), None);
        assert_eq!(memory.grow(&mut store, 0), Some(3));
        assert_eq!(memory.data(&store).len(), 48);
    }

    #[test]
    fn invalid_limits() {
        let mut store = Store::new(&Engine::default());
        assert!(Memory::new(&mut store, 2, Some(1)).is_err());
        assert!(Memory::new(&mut store, 70_000, None).is_err());
    }
}
