// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::sync::Arc;

/// The number of pages a 32-bit memory can have before it runs out of byte
/// index space.
pub const WASM32_MAX_PAGES: u32 = 1 << 16;
pub const DEFAULT_PAGE_SIZE_LOG2: u8 = 16;

#[derive(Debug, Clone)]
pub struct Config {
    pub(crate) max_call_depth: usize,
    pub(crate) decode_auxiliary_sections: bool,
    pub(crate) max_memory_pages: u32,
    pub(crate) max_table_elements: u32,
    pub(crate) page_size_log2: u8,
}

#[derive(Debug, Clone)]
pub struct Engine(Arc<EngineInner>);

#[derive(Debug)]
struct EngineInner {
    config: Config,
}

// ===== impl Config =====

impl Default for Config {
    fn default() -> Self {
        Self {
            max_call_depth: 512,
            decode_auxiliary_sections: false,
            max_memory_pages: WASM32_MAX_PAGES,
            max_table_elements: 10_000_000,
            page_size_log2: DEFAULT_PAGE_SIZE_LOG2,
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Nesting depth of calls after which execution traps with
    /// [`Trap::StackOverflow`](crate::Trap::StackOverflow).
    ///
    /// Wasm-to-wasm calls run on a heap-allocated activation stack, so this
    /// bounds memory use rather than native stack use.
    pub fn max_call_depth(&mut self, depth: usize) -> &mut Self {
        self.max_call_depth = depth;
        self
    }

    /// Decode the `import_table`, `start_function` and `names` sections
    /// instead of skipping them.
    pub fn decode_auxiliary_sections(&mut self, enable: bool) -> &mut Self {
        self.decode_auxiliary_sections = enable;
        self
    }

    pub fn max_memory_pages(&mut self, pages: u32) -> &mut Self {
        self.max_memory_pages = pages.min(WASM32_MAX_PAGES);
        self
    }

    pub fn max_table_elements(&mut self, elements: u32) -> &mut Self {
        self.max_table_elements = elements;
        self
    }

    /// Sets the size of a memory page to `1 << log2` bytes, at most 64KiB.
    pub fn page_size_log2(&mut self, log2: u8) -> &mut Self {
        self.page_size_log2 = log2.min(DEFAULT_PAGE_SIZE_LOG2);
        self
    }

    pub(crate) fn page_size(&self) -> usize {
        1 << self.page_size_log2
    }
}

// ===== impl Engine =====

impl Default for Engine {
    fn default() -> Self {
        Self::new(&Config::default())
    }
}

impl Engine {
    pub fn new(config: &Config) -> Engine {
        Engine(Arc::new(EngineInner {
            config: config.clone(),
        }))
    }

    pub fn same(lhs: &Engine, rhs: &Engine) -> bool {
        Arc::ptr_eq(&lhs.0, &rhs.0)
    }

    pub fn config(&self) -> &Config {
        &self.0.config
    }
}
