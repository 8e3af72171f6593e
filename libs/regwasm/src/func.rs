// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::sync::Arc;

use crate::compile::CompiledFunction;
use crate::instance::Instance;
use crate::store::{Store, Stored};
use crate::{Error, FuncType, Val, vm};

/// A host callback. Receives the arguments in parameter order and returns the
/// result, if the signature has one.
pub type HostFn = dyn Fn(&[Val]) -> anyhow::Result<Option<Val>> + Send + Sync;

/// A WebAssembly function, either defined by an instance or by the host.
///
/// Methods taking a [`Store`] panic if that store does not own the function.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Func(pub(crate) Stored<FuncData>);

#[derive(Debug)]
pub(crate) struct FuncData {
    pub ty: FuncType,
    pub kind: FuncKind,
}

#[derive(Clone)]
pub(crate) enum FuncKind {
    Host(Arc<HostFn>),
    Wasm {
        instance: Instance,
        code: Arc<CompiledFunction>,
    },
}

/// A host function that is not yet owned by any store.
pub(crate) struct HostFunc {
    pub ty: FuncType,
    pub func: Arc<HostFn>,
}

// ===== impl Func =====

impl Func {
    /// Defines a host function with the given signature.
    pub fn new<F>(store: &mut Store, ty: FuncType, func: F) -> Func
    where
        F: Fn(&[Val]) -> anyhow::Result<Option<Val>> + Send + Sync + 'static,
    {
        HostFunc {
            ty,
            func: Arc::new(func),
        }
        .to_func(store)
    }

    pub fn ty(self, store: &Store) -> &FuncType {
        &store[self.0].ty
    }

    /// Calls the function, returning its result if it has one.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ArgumentMismatch`] if `params` do not match the
    /// function's signature and [`Error::Trap`] if execution traps.
    pub fn call(self, store: &mut Store, params: &[Val]) -> crate::Result<Option<Val>> {
        let ty = self.ty(store);
        let matches = ty.params().len() == params.len()
            && ty.params().iter().zip(params).all(|(ty, val)| *ty == val.ty());
        if !matches {
            return Err(Error::ArgumentMismatch {
                expected: ty.clone(),
            });
        }

        Ok(vm::invoke(store, self, params)?)
    }
}

// ===== impl FuncKind =====

impl core::fmt::Debug for FuncKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            FuncKind::Host(_) => f.write_str("Host"),
            FuncKind::Wasm { instance, code } => f
                .debug_struct("Wasm")
                .field("instance", instance)
                .field("name", &code.name())
                .finish(),
        }
    }
}

// ===== impl HostFunc =====

impl HostFunc {
    pub(crate) fn to_func(&self, store: &mut Store) -> Func {
        Func(store.add_function(FuncData {
            ty: self.ty.clone(),
            kind: FuncKind::Host(Arc::clone(&self.func)),
        }))
    }
}

impl core::fmt::Debug for HostFunc {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("HostFunc").field("ty", &self.ty).finish_non_exhaustive()
    }
}
