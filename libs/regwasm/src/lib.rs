// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Decodes WebAssembly modules, translates function bodies into register
//! bytecode and links modules into instances.

mod compile;
mod engine;
mod environment;
mod errors;
mod func;
mod global;
mod indices;
mod instance;
mod linker;
mod memory;
mod module;
mod store;
mod table;
mod trap;
mod utils;
mod values;
mod vm;


pub type Result<T> = core::result::Result<T, Error>;

pub use compile::{
    CompiledFunction, Label, Op, RESERVED_REGISTER_COUNT, RETURN_REGISTER, Reg, ZERO_REGISTER,
};
pub use engine::{Config, Engine, WASM32_MAX_PAGES};
pub use errors::{CompileError, Error, LinkError, Location};
pub use func::{Func, HostFn};
pub use global::Global;
pub use indices::{DefinedFuncIndex, EntityIndex, FuncIndex, GlobalIndex, SigIndex};
pub use instance::{Export, Instance};
pub use linker::Linker;
pub use memory::Memory;
pub use module::{ConstExpr, GlobalInit, Import, ImportType, Module, ModuleBuilder, ModuleEnvironment};
pub use regwasm_reader::{BlockType, FuncType, ValueType};
pub use store::Store;
pub use table::Table;
pub use trap::Trap;
pub use values::Val;

/// A WebAssembly external value which is just any type that can be imported or exported between modules.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Extern {
    Func(Func),
    Table(Table),
    Memory(Memory),
    Global(Global),
}

impl From<Func> for Extern {
    fn from(f: Func) -> Self {
        Extern::Func(f)
    }
}

impl From<Table> for Extern {
    fn from(t: Table) -> Self {
        Extern::Table(t)
    }
}

impl From<Memory> for Extern {
    fn from(m: Memory) -> Self {
        Extern::Memory(m)
    }
}

impl From<Global> for Extern {
    fn from(g: Global) -> Self {
        Extern::Global(g)
    }
}

impl Extern {
    /// Name of the extern's kind, as used in link errors.
    pub fn kind(&self) -> &'static str {
        match self {
            Extern::Func(_) => "function",
            Extern::Table(_) => "table",
            Extern::Memory(_) => "memory",
            Extern::Global(_) => "global",
        }
    }

    /// Returns the function if this is [`Extern::Func`].
    pub fn into_func(self) -> Option<Func> {
        match self {
            Extern::Func(func) => Some(func),
            _ => None,
        }
    }

    pub fn into_table(self) -> Option<Table> {
        match self {
            Extern::Table(table) => Some(table),
            _ => None,
        }
    }

    pub fn into_memory(self) -> Option<Memory> {
        match self {
            Extern::Memory(memory) => Some(memory),
            _ => None,
        }
    }

    pub fn into_global(self) -> Option<Global> {
        match self {
            Extern::Global(global) => Some(global),
            _ => None,
        }
    }
}
