// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Translation of function bodies into register bytecode.

mod bytecode;
mod generator;
mod register_space;

use regwasm_reader::{IndexSpaces, OperatorsReader};

use crate::errors::{CompileError, Location};
use crate::indices::DefinedFuncIndex;
use crate::module::ModuleInfo;

use generator::BytecodeGenerator;

pub(crate) use bytecode::arg_offsets;
pub use bytecode::{CompiledFunction, Label, Op};
pub use register_space::{RESERVED_REGISTER_COUNT, RETURN_REGISTER, Reg, ZERO_REGISTER};

/// Type checks and compiles one module-defined function.
pub(crate) fn compile_function(
    info: &ModuleInfo,
    index: DefinedFuncIndex,
) -> Result<CompiledFunction, CompileError> {
    let func = &info.function_infos[index];
    let span = tracing::debug_span!("compile_function", name = func.display_name);
    let _enter = span.enter();

    compile_body(info, index)
        .map_err(|err| err.in_function(&func.display_name))
        .inspect(|compiled| {
            tracing::debug!(ops = compiled.ops().len(), "compiled function");
        })
}

fn compile_body(
    info: &ModuleInfo,
    index: DefinedFuncIndex,
) -> Result<CompiledFunction, CompileError> {
    let func = &info.function_infos[index];
    let body = func
        .body
        .as_ref()
        .ok_or_else(|| CompileError::new("function has no body"))?;
    let signature = &info.signatures[func.signature];

    let len = |n: usize| u32::try_from(n).unwrap_or(u32::MAX);
    let spaces = IndexSpaces {
        functions: len(info.functions.len()),
        signatures: len(info.signatures.len()),
        globals: len(info.globals.len()),
    };

    let mut generator = BytecodeGenerator::new(info, signature, &func.locals)?;
    let mut reader = OperatorsReader::new(&body.code, body.offset, spaces);

    while !reader.eof() {
        let offset = reader.original_position();
        let located = |err: CompileError, end: usize| {
            err.with_location(Location {
                offset,
                size: end.saturating_sub(offset),
            })
        };

        let op = reader
            .read()
            .map_err(|err| located(err.into(), offset))?;
        let info = generator
            .emit(&op)
            .map_err(|err| located(err, reader.original_position()))?;
        tracing::trace!(?op, register = ?info.register, ty = ?info.ty);
    }

    generator.finish(&func.display_name)
}
