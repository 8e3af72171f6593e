// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use core::fmt;
use core::marker::PhantomData;
use core::num::NonZeroU64;
use core::sync::atomic::{AtomicU64, Ordering};

use crate::func::FuncData;
use crate::global::GlobalData;
use crate::instance::InstanceData;
use crate::memory::MemoryData;
use crate::table::TableData;

/// Backing storage for every object a store owns.
#[derive(Debug, Default)]
pub struct StoredData {
    pub(super) instances: Vec<InstanceData>,
    pub(super) functions: Vec<FuncData>,
    pub(super) tables: Vec<TableData>,
    pub(super) memories: Vec<MemoryData>,
    pub(super) globals: Vec<GlobalData>,
}

/// Identifies the store a [`Stored`] handle was issued by.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct StoreId(NonZeroU64);

/// A typed handle to an object owned by a [`Store`](super::Store).
pub struct Stored<T> {
    store_id: StoreId,
    index: usize,
    _m: PhantomData<fn() -> T>,
}

// ===== impl StoreId =====

impl StoreId {
    pub(crate) fn allocate() -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);

        let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
        // 2^64 stores cannot be created, so the counter never wraps to zero
        Self(NonZeroU64::new(id).unwrap_or(NonZeroU64::MAX))
    }

    /// Panics if `handle` was issued by a different store.
    #[inline]
    fn assert_owns<T>(self, handle: Stored<T>) {
        assert!(
            self == handle.store_id,
            "object used with a store that does not own it"
        );
    }
}

// ===== impl Stored =====

impl<T> Stored<T> {
    pub(crate) fn new(store_id: StoreId, index: usize) -> Self {
        Self {
            store_id,
            index,
            _m: PhantomData,
        }
    }
}

impl<T> Clone for Stored<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Stored<T> {}

impl<T> PartialEq for Stored<T> {
    fn eq(&self, other: &Self) -> bool {
        self.store_id == other.store_id && self.index == other.index
    }
}

impl<T> Eq for Stored<T> {}

impl<T> fmt::Debug for Stored<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Stored").field(&self.index).finish()
    }
}

macro_rules! stored_impls {
    ($bind:ident $(($ty:path, $add:ident, $field:expr))*) => {
        $(
            impl super::Store {
                pub(crate) fn $add(&mut self, val: $ty) -> Stored<$ty> {
                    let $bind = self;
                    let index = $field.len();
                    $field.push(val);
                    Stored::new($bind.id, index)
                }
            }

            /// # Panics
            ///
            /// Panics if the handle was issued by a different store.
            impl ::core::ops::Index<Stored<$ty>> for super::Store {
                type Output = $ty;

                fn index(&self, index: Stored<$ty>) -> &$ty {
                    self.id.assert_owns(index);
                    let $bind = self;
                    &$field[index.index]
                }
            }

            impl ::core::ops::IndexMut<Stored<$ty>> for super::Store {
                fn index_mut(&mut self, index: Stored<$ty>) -> &mut $ty {
                    self.id.assert_owns(index);
                    let $bind = self;
                    &mut $field[index.index]
                }
            }
        )*
    };
}

stored_impls! {
    s
    (InstanceData, add_instance, s.stored.instances)
    (FuncData, add_function, s.stored.functions)
    (TableData, add_table, s.stored.tables)
    (MemoryData, add_memory, s.stored.memories)
    (GlobalData, add_global, s.stored.globals)
}

impl super::Store {
    /// The handle the next instance added to the store will receive.
    pub(crate) fn next_instance(&self) -> Stored<InstanceData> {
        Stored::new(self.id, self.stored.instances.len())
    }
}
