// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

mod builder;
mod translate;

use std::sync::{Arc, OnceLock};

use cranelift_entity::{EntityRef, PrimaryMap};
use hashbrown::HashMap;

use crate::compile::{CompiledFunction, compile_function};
use crate::errors::CompileError;
use crate::indices::{DefinedFuncIndex, EntityIndex, FuncIndex, GlobalIndex, SigIndex};
use crate::values::Val;
use crate::{Engine, FuncType, ValueType};

pub use builder::{ConstExpr, GlobalInit, ModuleBuilder, ModuleEnvironment};
pub use translate::translate_module;

/// A validated, immutable WebAssembly module.
///
/// Cheap to clone and shareable across threads. Function bodies are compiled
/// on first use and the result is cached for all instances.
#[derive(Debug, Clone)]
pub struct Module(Arc<ModuleInner>);

#[derive(Debug)]
struct ModuleInner {
    engine: Engine,
    info: ModuleInfo,
    compiled: PrimaryMap<DefinedFuncIndex, OnceLock<Arc<CompiledFunction>>>,
}

#[derive(Debug, Default)]
pub(crate) struct ModuleInfo {
    pub signatures: PrimaryMap<SigIndex, FuncType>,
    pub imports: Vec<Import>,
    /// The signature of every function in the function index space.
    pub functions: PrimaryMap<FuncIndex, SigIndex>,
    pub num_imported_functions: u32,
    pub function_infos: PrimaryMap<DefinedFuncIndex, FunctionInfo>,
    pub globals: PrimaryMap<GlobalIndex, GlobalDesc>,
    pub num_imported_globals: u32,
    pub exports: Vec<Export>,
    pub export_names: HashMap<String, usize>,
    pub data_segments: Vec<DataSegment>,
    pub element_segments: Vec<ElementSegment>,
    pub memory: Option<MemoryPlan>,
    pub table: Option<TablePlan>,
    pub start: Option<FuncIndex>,
    pub global_layout: GlobalLayout,
}

#[derive(Debug, Clone)]
pub struct Import {
    pub module: String,
    pub field: String,
    pub ty: ImportType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportType {
    Function(SigIndex),
    Table,
    Memory,
    Global(ValueType),
}

#[derive(Debug, Clone)]
pub struct Export {
    pub name: String,
    pub index: EntityIndex,
}

#[derive(Debug, Clone)]
pub struct FunctionInfo {
    pub signature: SigIndex,
    /// Parameters followed by the declared locals.
    pub locals: Vec<ValueType>,
    pub name: Option<String>,
    pub display_name: String,
    pub body: Option<FunctionBodyData>,
}

#[derive(Debug, Clone)]
pub struct FunctionBodyData {
    /// Instruction bytes, the local declarations already stripped.
    pub code: Box<[u8]>,
    /// Offset of `code` within the original module bytes.
    pub offset: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GlobalDesc {
    pub ty: ValueType,
    pub mutable: bool,
    pub kind: GlobalKind,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GlobalKind {
    Const(Val),
    Imported,
    LocalAlias(GlobalIndex),
}

#[derive(Debug, Clone)]
pub struct DataSegment {
    pub offset: ConstExpr,
    pub data: Box<[u8]>,
}

#[derive(Debug, Clone)]
pub struct ElementSegment {
    pub offset: ConstExpr,
    pub functions: Box<[FuncIndex]>,
}

/// Memory limits in pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryPlan {
    pub min: u32,
    pub max: Option<u32>,
    pub imported: bool,
    pub exported: bool,
}

/// Table limits in elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TablePlan {
    pub min: u32,
    pub max: Option<u32>,
    pub imported: bool,
}

/// Byte offsets of all globals within the packed globals region.
///
/// Globals are grouped by type in the order `i32, i64, f32, f64`, each group
/// starting at the running offset aligned up to the type's natural size.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct GlobalLayout {
    offsets: Vec<u32>,
    size: u32,
}

// ===== impl Module =====

impl Module {
    /// Decodes and validates a binary module.
    ///
    /// Function bodies are type checked lazily, see [`Module::compile_functions`].
    pub fn from_bytes(engine: &Engine, bytes: &[u8]) -> crate::Result<Self> {
        let mut env = ModuleEnvironment::new(engine);
        translate_module(
            &mut env,
            bytes,
            engine.config().decode_auxiliary_sections,
        )?;
        Ok(env.finish()?)
    }

    pub(crate) fn new(engine: Engine, info: ModuleInfo) -> Self {
        let compiled = info
            .function_infos
            .keys()
            .map(|_| OnceLock::new())
            .collect();

        Self(Arc::new(ModuleInner {
            engine,
            info,
            compiled,
        }))
    }

    pub fn engine(&self) -> &Engine {
        &self.0.engine
    }

    pub(crate) fn info(&self) -> &ModuleInfo {
        &self.0.info
    }

    pub fn signature_count(&self) -> usize {
        self.0.info.signatures.len()
    }

    /// Number of functions defined by the module, imports excluded.
    pub fn function_count(&self) -> usize {
        self.0.info.function_infos.len()
    }

    pub fn import_count(&self) -> usize {
        self.0.info.imports.len()
    }

    pub fn global_count(&self) -> usize {
        self.0.info.globals.len()
    }

    pub fn signature(&self, index: SigIndex) -> Option<&FuncType> {
        self.0.info.signatures.get(index)
    }

    pub fn function_signature(&self, index: FuncIndex) -> Option<&FuncType> {
        self.0.info.function_signature(index)
    }

    pub fn imports(&self) -> impl ExactSizeIterator<Item = &Import> {
        self.0.info.imports.iter()
    }

    pub fn exports(&self) -> impl ExactSizeIterator<Item = (&str, EntityIndex)> + '_ {
        self.0
            .info
            .exports
            .iter()
            .map(|export| (export.name.as_str(), export.index))
    }

    pub fn start_function(&self) -> Option<FuncIndex> {
        self.0.info.start
    }

    pub fn function_name(&self, index: DefinedFuncIndex) -> Option<&str> {
        self.0
            .info
            .function_infos
            .get(index)
            .map(|info| info.display_name.as_str())
    }

    /// Byte offset of a global within the instance's globals region.
    pub fn offset_for_global(&self, index: GlobalIndex) -> Option<u32> {
        self.0.info.global_layout.offset(index)
    }

    /// Size in bytes of the packed globals region.
    pub fn globals_size(&self) -> u32 {
        self.0.info.global_layout.size()
    }

    /// Size of an instance environment in 8-byte slots: memory and table
    /// handles, one slot per function in the index space, then the globals.
    pub fn environment_size(&self) -> usize {
        self.0.info.environment_size()
    }

    /// Compiles every function body that has not been compiled yet.
    pub fn compile_functions(&self) -> crate::Result<()> {
        for index in self.0.info.function_infos.keys() {
            self.compiled_function(index)?;
        }
        Ok(())
    }

    /// Returns the bytecode of a defined function, compiling it on first use.
    pub fn compiled_function(
        &self,
        index: DefinedFuncIndex,
    ) -> Result<Arc<CompiledFunction>, CompileError> {
        let cell = self
            .0
            .compiled
            .get(index)
            .ok_or_else(|| CompileError::new(format!("function {} is not defined", index.index())))?;

        if let Some(compiled) = cell.get() {
            return Ok(Arc::clone(compiled));
        }

        let compiled = Arc::new(compile_function(&self.0.info, index)?);
        Ok(Arc::clone(cell.get_or_init(|| compiled)))
    }
}

// ===== impl ImportType =====

impl ImportType {
    pub fn kind(self) -> &'static str {
        match self {
            ImportType::Function(_) => "function",
            ImportType::Table => "table",
            ImportType::Memory => "memory",
            ImportType::Global(_) => "global",
        }
    }
}

// ===== impl ModuleInfo =====

impl ModuleInfo {
    pub fn function_signature(&self, index: FuncIndex) -> Option<&FuncType> {
        let sig = self.functions.get(index)?;
        self.signatures.get(*sig)
    }

    pub fn defined_func_index(&self, index: FuncIndex) -> Option<DefinedFuncIndex> {
        let imported = usize::try_from(self.num_imported_functions).ok()?;
        index
            .index()
            .checked_sub(imported)
            .map(DefinedFuncIndex::new)
    }

    pub fn func_index(&self, index: DefinedFuncIndex) -> FuncIndex {
        let imported = self.num_imported_functions as usize;
        FuncIndex::new(imported + index.index())
    }

    pub fn environment_size(&self) -> usize {
        let global_slots = self.global_layout.size().div_ceil(8) as usize;
        2 + self.functions.len() + global_slots
    }
}

// ===== impl GlobalLayout =====

impl GlobalLayout {
    pub fn new(types: &[ValueType]) -> Result<Self, CompileError> {
        let too_large = || CompileError::new("globals exceed the addressable region size");

        let mut counts = [0u32; 4];
        for ty in types {
            counts[ty.index()] += 1;
        }

        let mut starts = [0u32; 4];
        let mut running = 0u32;
        for ty in ValueType::ALL {
            let size = ty.byte_size();
            let start = running.checked_next_multiple_of(size).ok_or_else(too_large)?;
            starts[ty.index()] = start;
            running = counts[ty.index()]
                .checked_mul(size)
                .and_then(|len| start.checked_add(len))
                .ok_or_else(too_large)?;
        }

        let mut ordinals = [0u32; 4];
        let offsets = types
            .iter()
            .map(|ty| {
                let ordinal = &mut ordinals[ty.index()];
                let offset = starts[ty.index()] + *ordinal * ty.byte_size();
                *ordinal += 1;
                offset
            })
            .collect();

        Ok(Self {
            offsets,
            size: running,
        })
    }

    pub fn offset(&self, index: GlobalIndex) -> Option<u32> {
        self.offsets.get(index.index()).copied()
    }

    pub fn size(&self) -> u32 {
        self.size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_layout_worked_example() {
        use ValueType::*;

        let layout = GlobalLayout::new(&[I32, I32, F64, I32]).unwrap();
        let offsets = (0..4)
            .map(|i| layout.offset(GlobalIndex::new(i)).unwrap())
            .collect::<Vec<_>>();

        assert_eq!(offsets, [0, 4, 16, 8]);
        assert_eq!(layout.size(), 24);
    }

    #[test]
    fn global_layout_alignment() {
        use ValueType::*;

        let layout = GlobalLayout::new(&[F32, I64, I32, F64, F32]).unwrap();
        // i32 at 0, i64 aligned up to 8, f32 region at 16, f64 region at 24
        assert_eq!(layout.offset(GlobalIndex::new(2)), Some(0));
        assert_eq!(layout.offset(GlobalIndex::new(1)), Some(8));
        assert_eq!(layout.offset(GlobalIndex::new(0)), Some(16));
        assert_eq!(layout.offset(GlobalIndex::new(4)), Some(20));
        assert_eq!(layout.offset(GlobalIndex::new(3)), Some(24));
        assert_eq!(layout.size(), 32);

        assert_eq!(GlobalLayout::new(&[]).unwrap().size(), 0);
    }
}
