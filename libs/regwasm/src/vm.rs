// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! A reference executor for compiled bytecode.

mod interpreter;
mod numeric;

use anyhow::anyhow;

use crate::func::FuncKind;
use crate::trap::Trap;
use crate::{Func, Store, Val};

/// Calls `func` with already type-checked arguments.
pub(crate) fn invoke(store: &mut Store, func: Func, args: &[Val]) -> Result<Option<Val>, Trap> {
    let kind = store[func.0].kind.clone();

    store.with_call_depth(|store| match kind {
        FuncKind::Host(host) => {
            let result = host(args).map_err(Trap::Host)?;

            let expected = store[func.0].ty.result();
            let found = result.map(|val| val.ty());
            if found != expected {
                return Err(Trap::Host(anyhow!(
                    "host function returned {found:?}, its signature declares {expected:?}"
                )));
            }

            Ok(result)
        }
        FuncKind::Wasm { instance, code } => {
            tracing::trace!(func = code.name(), "invoking");
            interpreter::execute(store, instance, code, args)
        }
    })
}
