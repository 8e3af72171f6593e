// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

mod stored;

use stored::{StoreId, StoredData};

pub use stored::Stored;

use crate::Engine;
use crate::trap::Trap;

/// Owns all runtime objects: instances, functions, tables, memories and
/// globals. Objects are referred to by cheap, copyable handles.
#[derive(Debug)]
pub struct Store {
    id: StoreId,
    engine: Engine,
    stored: StoredData,
    call_depth: usize,
}

// ===== impl Store =====

impl Store {
    pub fn new(engine: &Engine) -> Self {
        Self {
            id: StoreId::allocate(),
            engine: engine.clone(),
            stored: StoredData::default(),
            call_depth: 0,
        }
    }

    #[inline]
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// The number of calls currently entered through [`Store::with_call_depth`].
    #[inline]
    pub(crate) fn call_depth(&self) -> usize {
        self.call_depth
    }

    /// Runs `f` one call level deeper, trapping once the configured maximum
    /// call depth is exceeded.
    pub(crate) fn with_call_depth<R>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<R, Trap>,
    ) -> Result<R, Trap> {
        if self.call_depth >= self.engine.config().max_call_depth {
            tracing::debug!(depth = self.call_depth, "call stack exhausted");
            return Err(Trap::StackOverflow);
        }

        self.call_depth += 1;
        let result = f(self);
        self.call_depth -= 1;
        result
    }
}
