// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use crate::store::{Store, Stored};
use crate::{Val, ValueType};

/// A global value owned by a store.
///
/// Instances keep their globals in a private region, exporting one hands
/// out a snapshot. Only immutable globals can be exported or imported, so the
/// snapshot never goes stale.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Global(pub(crate) Stored<GlobalData>);

#[derive(Debug)]
pub(crate) struct GlobalData {
    pub value: Val,
    pub mutable: bool,
}

impl Global {
    pub fn new(store: &mut Store, value: Val, mutable: bool) -> Global {
        Global(store.add_global(GlobalData { value, mutable }))
    }

    /// # Panics
    ///
    /// Panics if `store` does not own this global.
    pub fn get(self, store: &Store) -> Val {
        store[self.0].value
    }

    /// # Panics
    ///
    /// Panics if `store` does not own this global.
    pub fn ty(self, store: &Store) -> ValueType {
        store[self.0].value.ty()
    }

    /// # Panics
    ///
    /// Panics if `store` does not own this global.
    pub fn is_mutable(self, store: &Store) -> bool {
        store[self.0].mutable
    }
}
