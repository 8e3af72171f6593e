// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use cranelift_entity::EntityRef;
use hashbrown::hash_map::Entry;

use super::{
    DataSegment, ElementSegment, Export, FunctionBodyData, FunctionInfo, GlobalDesc, GlobalKind,
    GlobalLayout, Import, ImportType, MemoryPlan, Module, ModuleInfo, TablePlan,
};
use crate::errors::CompileError;
use crate::indices::{DefinedFuncIndex, EntityIndex, FuncIndex, GlobalIndex, SigIndex};
use crate::utils::ensure;
use crate::values::Val;
use crate::{Config, Engine, FuncType, ValueType};

/// Initializer of a module-defined global.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GlobalInit {
    Const(Val),
    /// Copy the value of another global at instantiation time.
    Alias(GlobalIndex),
}

/// Offset expression of a data or element segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstExpr {
    I32(u32),
    /// The value of an `i32` global.
    Global(GlobalIndex),
}

/// Incremental construction of a module.
///
/// Every operation validates its arguments against what has been declared so
/// far and fails with a [`CompileError`] if they are out of range or
/// inconsistent.
pub trait ModuleBuilder {
    fn add_signature(&mut self, ty: FuncType) -> Result<SigIndex, CompileError>;

    fn add_function_import(
        &mut self,
        module: &str,
        field: &str,
        sig: SigIndex,
    ) -> Result<FuncIndex, CompileError>;

    /// Imports the module's table. Its limits are declared with
    /// [`ModuleBuilder::initialize_table`].
    fn add_table_import(&mut self, module: &str, field: &str) -> Result<(), CompileError>;

    /// Imports the module's memory. Its limits are declared with
    /// [`ModuleBuilder::initialize_memory`].
    fn add_memory_import(&mut self, module: &str, field: &str) -> Result<(), CompileError>;

    fn add_global_import(
        &mut self,
        module: &str,
        field: &str,
        ty: ValueType,
    ) -> Result<GlobalIndex, CompileError>;

    fn allocate_function_info(&mut self, sig: SigIndex) -> Result<DefinedFuncIndex, CompileError>;

    fn add_locals(
        &mut self,
        func: DefinedFuncIndex,
        count: u32,
        ty: ValueType,
    ) -> Result<(), CompileError>;

    /// Sets the instruction bytes of a function. `offset` is their position
    /// in the module source and is used for error locations.
    fn set_function_body(
        &mut self,
        func: DefinedFuncIndex,
        code: &[u8],
        offset: usize,
    ) -> Result<(), CompileError>;

    fn set_function_name(&mut self, func: DefinedFuncIndex, name: &str)
    -> Result<(), CompileError>;

    fn set_export(&mut self, name: &str, index: EntityIndex) -> Result<(), CompileError>;

    fn add_global(
        &mut self,
        ty: ValueType,
        mutable: bool,
        init: GlobalInit,
    ) -> Result<GlobalIndex, CompileError>;

    fn allocate_data_segments(&mut self, count: u32) -> Result<(), CompileError>;

    fn set_data_segment(
        &mut self,
        index: u32,
        offset: ConstExpr,
        data: &[u8],
    ) -> Result<(), CompileError>;

    fn allocate_element_segments(&mut self, count: u32) -> Result<(), CompileError>;

    fn set_element_segment(
        &mut self,
        index: u32,
        offset: ConstExpr,
        functions: &[FuncIndex],
    ) -> Result<(), CompileError>;

    /// Declares the memory limits in pages, `exported` exports it as `"memory"`.
    fn initialize_memory(
        &mut self,
        min: u32,
        max: Option<u32>,
        exported: bool,
    ) -> Result<(), CompileError>;

    fn initialize_table(&mut self, min: u32, max: Option<u32>) -> Result<(), CompileError>;

    fn set_start_function(&mut self, func: FuncIndex) -> Result<(), CompileError>;
}

/// The [`ModuleBuilder`] that produces a [`Module`].
#[derive(Debug)]
pub struct ModuleEnvironment {
    engine: Engine,
    info: ModuleInfo,
    data_segments: Option<Vec<Option<DataSegment>>>,
    element_segments: Option<Vec<Option<ElementSegment>>>,
    memory_initialized: bool,
    table_initialized: bool,
}

// ===== impl ModuleEnvironment =====

impl ModuleEnvironment {
    pub fn new(engine: &Engine) -> Self {
        Self {
            engine: engine.clone(),
            info: ModuleInfo::default(),
            data_segments: None,
            element_segments: None,
            memory_initialized: false,
            table_initialized: false,
        }
    }

    fn config(&self) -> &Config {
        self.engine.config()
    }

    /// Checks that the module is complete and freezes it.
    pub fn finish(mut self) -> Result<Module, CompileError> {
        for (index, info) in &self.info.function_infos {
            ensure!(
                info.body.is_some(),
                CompileError::new(format!("function {} has no body", index.index()))
            );
        }

        let data_segments = self.data_segments.take().unwrap_or_default();
        self.info.data_segments = data_segments
            .into_iter()
            .enumerate()
            .map(|(i, segment)| {
                segment.ok_or_else(|| CompileError::new(format!("data segment {i} was never set")))
            })
            .collect::<Result<_, _>>()?;

        let element_segments = self.element_segments.take().unwrap_or_default();
        self.info.element_segments = element_segments
            .into_iter()
            .enumerate()
            .map(|(i, segment)| {
                segment
                    .ok_or_else(|| CompileError::new(format!("element segment {i} was never set")))
            })
            .collect::<Result<_, _>>()?;

        let types = self
            .info
            .globals
            .values()
            .map(|global| global.ty)
            .collect::<Vec<_>>();
        self.info.global_layout = GlobalLayout::new(&types)?;

        for index in self.info.function_infos.keys().collect::<Vec<_>>() {
            let display_name = self.display_name(index);
            self.info.function_infos[index].display_name = display_name;
        }

        tracing::debug!(
            signatures = self.info.signatures.len(),
            functions = self.info.function_infos.len(),
            globals = self.info.globals.len(),
            "finished module"
        );

        Ok(Module::new(self.engine, self.info))
    }

    /// The name section entry, else the first export of the function, else a
    /// name derived from its index.
    fn display_name(&self, index: DefinedFuncIndex) -> String {
        let func = self.info.func_index(index);
        if let Some(name) = &self.info.function_infos[index].name {
            return name.clone();
        }

        self.info
            .exports
            .iter()
            .find(|export| export.index == EntityIndex::Function(func))
            .map_or_else(
                || format!("wasm-function[{}]", func.index()),
                |export| format!("{}[{}]", export.name, func.index()),
            )
    }

    fn function_info_mut(
        &mut self,
        func: DefinedFuncIndex,
    ) -> Result<&mut FunctionInfo, CompileError> {
        self.info
            .function_infos
            .get_mut(func)
            .ok_or_else(|| CompileError::new(format!("function {} is not defined", func.index())))
    }

    fn check_signature(&self, sig: SigIndex) -> Result<&FuncType, CompileError> {
        self.info.signatures.get(sig).ok_or_else(|| {
            CompileError::new(format!(
                "signature index {} out of range, the module has {} signatures",
                sig.index(),
                self.info.signatures.len()
            ))
        })
    }

    fn check_function(&self, func: FuncIndex) -> Result<(), CompileError> {
        ensure!(
            func.index() < self.info.functions.len(),
            CompileError::new(format!(
                "function index {} out of range, the module has {} functions",
                func.index(),
                self.info.functions.len()
            ))
        );
        Ok(())
    }

    fn check_offset(&self, offset: ConstExpr) -> Result<(), CompileError> {
        if let ConstExpr::Global(global) = offset {
            let desc = self.info.globals.get(global).ok_or_else(|| {
                CompileError::new(format!("offset global {} is not declared", global.index()))
            })?;
            ensure!(
                desc.ty == ValueType::I32,
                CompileError::new(format!(
                    "offset global {} has type {}, expected i32",
                    global.index(),
                    desc.ty
                ))
            );
        }
        Ok(())
    }

    fn push_import(&mut self, module: &str, field: &str, ty: ImportType) {
        self.info.imports.push(Import {
            module: module.into(),
            field: field.into(),
            ty,
        });
    }
}

impl ModuleBuilder for ModuleEnvironment {
    fn add_signature(&mut self, ty: FuncType) -> Result<SigIndex, CompileError> {
        Ok(self.info.signatures.push(ty))
    }

    fn add_function_import(
        &mut self,
        module: &str,
        field: &str,
        sig: SigIndex,
    ) -> Result<FuncIndex, CompileError> {
        self.check_signature(sig)?;
        ensure!(
            self.info.function_infos.is_empty(),
            CompileError::new(format!(
                "function import {module}::{field} declared after a module-defined function"
            ))
        );

        self.push_import(module, field, ImportType::Function(sig));
        self.info.num_imported_functions += 1;
        Ok(self.info.functions.push(sig))
    }

    fn add_table_import(&mut self, module: &str, field: &str) -> Result<(), CompileError> {
        ensure!(
            self.info.table.is_none(),
            CompileError::new(format!(
                "table import {module}::{field} declared after the module's table"
            ))
        );

        self.push_import(module, field, ImportType::Table);
        self.info.table = Some(TablePlan {
            min: 0,
            max: None,
            imported: true,
        });
        Ok(())
    }

    fn add_memory_import(&mut self, module: &str, field: &str) -> Result<(), CompileError> {
        ensure!(
            self.info.memory.is_none(),
            CompileError::new(format!(
                "memory import {module}::{field} declared after the module's memory"
            ))
        );

        self.push_import(module, field, ImportType::Memory);
        self.info.memory = Some(MemoryPlan {
            min: 0,
            max: None,
            imported: true,
            exported: false,
        });
        Ok(())
    }

    fn add_global_import(
        &mut self,
        module: &str,
        field: &str,
        ty: ValueType,
    ) -> Result<GlobalIndex, CompileError> {
        ensure!(
            self.info.globals.len() as u32 == self.info.num_imported_globals,
            CompileError::new(format!(
                "global import {module}::{field} declared after a module-defined global"
            ))
        );

        self.push_import(module, field, ImportType::Global(ty));
        self.info.num_imported_globals += 1;
        Ok(self.info.globals.push(GlobalDesc {
            ty,
            mutable: false,
            kind: GlobalKind::Imported,
        }))
    }

    fn allocate_function_info(&mut self, sig: SigIndex) -> Result<DefinedFuncIndex, CompileError> {
        let params = self.check_signature(sig)?.params().to_vec();

        self.info.functions.push(sig);
        Ok(self.info.function_infos.push(FunctionInfo {
            signature: sig,
            locals: params,
            name: None,
            display_name: String::new(),
            body: None,
        }))
    }

    fn add_locals(
        &mut self,
        func: DefinedFuncIndex,
        count: u32,
        ty: ValueType,
    ) -> Result<(), CompileError> {
        let info = self.function_info_mut(func)?;
        let total = u32::try_from(info.locals.len())
            .ok()
            .and_then(|len| len.checked_add(count))
            .filter(|total| *total <= regwasm_reader::MAX_WASM_FUNCTION_LOCALS);
        ensure!(
            total.is_some(),
            CompileError::new(format!("function {} declares too many locals", func.index()))
        );

        info.locals
            .extend(core::iter::repeat_n(ty, count as usize));
        Ok(())
    }

    fn set_function_body(
        &mut self,
        func: DefinedFuncIndex,
        code: &[u8],
        offset: usize,
    ) -> Result<(), CompileError> {
        let info = self.function_info_mut(func)?;
        ensure!(
            info.body.is_none(),
            CompileError::new(format!("function {} already has a body", func.index()))
        );

        info.body = Some(FunctionBodyData {
            code: code.into(),
            offset,
        });
        Ok(())
    }

    fn set_function_name(
        &mut self,
        func: DefinedFuncIndex,
        name: &str,
    ) -> Result<(), CompileError> {
        self.function_info_mut(func)?.name = Some(name.into());
        Ok(())
    }

    fn set_export(&mut self, name: &str, index: EntityIndex) -> Result<(), CompileError> {
        match index {
            EntityIndex::Function(func) => self.check_function(func)?,
            EntityIndex::Table => ensure!(
                self.info.table.is_some(),
                CompileError::new("cannot export a table, the module has none")
            ),
            EntityIndex::Memory => ensure!(
                self.info.memory.is_some(),
                CompileError::new("cannot export a memory, the module has none")
            ),
            EntityIndex::Global(global) => {
                let desc = self.info.globals.get(global).ok_or_else(|| {
                    CompileError::new(format!("exported global {} is not declared", global.index()))
                })?;
                ensure!(
                    !desc.mutable,
                    CompileError::new(format!("mutable global {name} cannot be exported"))
                );
            }
        }

        let position = self.info.exports.len();
        match self.info.export_names.entry(name.into()) {
            Entry::Occupied(_) => {
                return Err(CompileError::new(format!("duplicate export name {name}")));
            }
            Entry::Vacant(entry) => {
                entry.insert(position);
            }
        }

        self.info.exports.push(Export {
            name: name.into(),
            index,
        });
        Ok(())
    }

    fn add_global(
        &mut self,
        ty: ValueType,
        mutable: bool,
        init: GlobalInit,
    ) -> Result<GlobalIndex, CompileError> {
        let kind = match init {
            GlobalInit::Const(val) => {
                ensure!(
                    val.ty() == ty,
                    CompileError::new(format!(
                        "global initializer has type {}, expected {ty}",
                        val.ty()
                    ))
                );
                GlobalKind::Const(val)
            }
            GlobalInit::Alias(target) => {
                // Aliases of later globals are rejected when linking.
                if let Some(desc) = self.info.globals.get(target) {
                    ensure!(
                        matches!(desc.kind, GlobalKind::Const(_) | GlobalKind::Imported),
                        CompileError::new(format!(
                            "global {} aliases global {}, which is itself an alias",
                            self.info.globals.len(),
                            target.index()
                        ))
                    );
                    ensure!(
                        desc.ty == ty,
                        CompileError::new(format!(
                            "global of type {ty} aliases global {} of type {}",
                            target.index(),
                            desc.ty
                        ))
                    );
                }
                GlobalKind::LocalAlias(target)
            }
        };

        Ok(self.info.globals.push(GlobalDesc { ty, mutable, kind }))
    }

    fn allocate_data_segments(&mut self, count: u32) -> Result<(), CompileError> {
        ensure!(
            self.data_segments.is_none(),
            CompileError::new("data segments are already allocated")
        );
        ensure!(
            count <= regwasm_reader::MAX_WASM_DATA_SEGMENTS,
            CompileError::new(format!("{count} data segments exceed the supported maximum"))
        );
        self.data_segments = Some(vec![None; count as usize]);
        Ok(())
    }

    fn set_data_segment(
        &mut self,
        index: u32,
        offset: ConstExpr,
        data: &[u8],
    ) -> Result<(), CompileError> {
        ensure!(
            self.info.memory.is_some(),
            CompileError::new("data segment declared but the module has no memory")
        );
        self.check_offset(offset)?;

        let slot = self
            .data_segments
            .as_mut()
            .and_then(|segments| segments.get_mut(index as usize))
            .ok_or_else(|| CompileError::new(format!("data segment {index} is not allocated")))?;
        ensure!(
            slot.is_none(),
            CompileError::new(format!("data segment {index} is already set"))
        );

        *slot = Some(DataSegment {
            offset,
            data: data.into(),
        });
        Ok(())
    }

    fn allocate_element_segments(&mut self, count: u32) -> Result<(), CompileError> {
        ensure!(
            self.element_segments.is_none(),
            CompileError::new("element segments are already allocated")
        );
        ensure!(
            count <= regwasm_reader::MAX_WASM_ELEMENT_SEGMENTS,
            CompileError::new(format!("{count} element segments exceed the supported maximum"))
        );
        self.element_segments = Some(vec![None; count as usize]);
        Ok(())
    }

    fn set_element_segment(
        &mut self,
        index: u32,
        offset: ConstExpr,
        functions: &[FuncIndex],
    ) -> Result<(), CompileError> {
        ensure!(
            self.info.table.is_some(),
            CompileError::new("element segment declared but the module has no table")
        );
        self.check_offset(offset)?;
        for func in functions {
            self.check_function(*func)?;
        }

        let slot = self
            .element_segments
            .as_mut()
            .and_then(|segments| segments.get_mut(index as usize))
            .ok_or_else(|| {
                CompileError::new(format!("element segment {index} is not allocated"))
            })?;
        ensure!(
            slot.is_none(),
            CompileError::new(format!("element segment {index} is already set"))
        );

        *slot = Some(ElementSegment {
            offset,
            functions: functions.into(),
        });
        Ok(())
    }

    fn initialize_memory(
        &mut self,
        min: u32,
        max: Option<u32>,
        exported: bool,
    ) -> Result<(), CompileError> {
        ensure!(
            !self.memory_initialized,
            CompileError::new("memory is already declared")
        );
        let limit = self.config().max_memory_pages;
        ensure!(
            min <= limit,
            CompileError::new(format!("memory minimum of {min} pages exceeds {limit} pages"))
        );
        if let Some(max) = max {
            ensure!(
                max >= min,
                CompileError::new(format!(
                    "memory maximum {max} is smaller than the minimum {min}"
                ))
            );
            ensure!(
                max <= limit,
                CompileError::new(format!("memory maximum of {max} pages exceeds {limit} pages"))
            );
        }

        let imported = self.info.memory.is_some_and(|memory| memory.imported);
        self.info.memory = Some(MemoryPlan {
            min,
            max,
            imported,
            exported,
        });
        self.memory_initialized = true;

        if exported {
            self.set_export("memory", EntityIndex::Memory)?;
        }
        Ok(())
    }

    fn initialize_table(&mut self, min: u32, max: Option<u32>) -> Result<(), CompileError> {
        ensure!(
            !self.table_initialized,
            CompileError::new("table is already declared")
        );
        let limit = self.config().max_table_elements;
        ensure!(
            min <= limit,
            CompileError::new(format!("table minimum of {min} elements exceeds {limit}"))
        );
        if let Some(max) = max {
            ensure!(
                max >= min,
                CompileError::new(format!(
                    "table maximum {max} is smaller than the minimum {min}"
                ))
            );
        }

        let imported = self.info.table.is_some_and(|table| table.imported);
        self.info.table = Some(TablePlan { min, max, imported });
        self.table_initialized = true;
        Ok(())
    }

    fn set_start_function(&mut self, func: FuncIndex) -> Result<(), CompileError> {
        self.check_function(func)?;
        ensure!(
            self.info.start.is_none(),
            CompileError::new("start function is already set")
        );

        let ty = self
            .info
            .function_signature(func)
            .ok_or_else(|| CompileError::new("start function has no signature"))?;
        ensure!(
            ty.params().is_empty() && ty.result().is_none(),
            CompileError::new(format!(
                "start function must have signature () -> void, found {ty}"
            ))
        );

        self.info.start = Some(func);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env() -> ModuleEnvironment {
        ModuleEnvironment::new(&Engine::default())
    }

    fn defined_function(env: &mut ModuleEnvironment, ty: FuncType) -> DefinedFuncIndex {
        let sig = env.add_signature(ty).unwrap();
        let func = env.allocate_function_info(sig).unwrap();
        env.set_function_body(func, &[], 0).unwrap();
        func
    }

    #[test]
    fn counts() {
        let mut env = env();
        env.add_signature(FuncType::new([], None)).unwrap();
        let sig = env
            .add_signature(FuncType::new([ValueType::I32], Some(ValueType::I32)))
            .unwrap();
        env.add_function_import("env", "f", sig).unwrap();
        for _ in 0..3 {
            let func = env.allocate_function_info(sig).unwrap();
            env.set_function_body(func, &[], 0).unwrap();
        }
        env.add_global_import("env", "g", ValueType::I64).unwrap();
        env.add_global(ValueType::F32, true, GlobalInit::Const(Val::from(1.0f32)))
            .unwrap();

        let module = env.finish().unwrap();
        assert_eq!(module.signature_count(), 2);
        assert_eq!(module.function_count(), 3);
        assert_eq!(module.import_count(), 2);
        assert_eq!(module.global_count(), 2);
        // memory + table + 4 functions + one slot each for the i64 and the f32
        assert_eq!(module.environment_size(), 2 + 4 + 2);
    }

    #[test]
    fn import_after_definition() {
        let mut env = env();
        let sig = env.add_signature(FuncType::new([], None)).unwrap();
        env.allocate_function_info(sig).unwrap();
        let err = env.add_function_import("env", "f", sig).unwrap_err();
        assert!(err.message().contains("after a module-defined function"));

        env.add_global(ValueType::I32, false, GlobalInit::Const(Val::I32(0)))
            .unwrap();
        assert!(env.add_global_import("env", "g", ValueType::I32).is_err());

        env.initialize_memory(1, None, false).unwrap();
        assert!(env.add_memory_import("env", "memory").is_err());
    }

    #[test]
    fn signature_out_of_range() {
        let mut env = env();
        env.add_signature(FuncType::new([], None)).unwrap();
        assert!(env.allocate_function_info(SigIndex::new(1)).is_err());
        assert!(env.add_function_import("env", "f", SigIndex::new(7)).is_err());
    }

    #[test]
    fn memory_and_table_limits() {
        let mut env = env();
        assert!(env.initialize_memory(2, Some(1), false).is_err());
        assert!(env.initialize_memory(65537, None, false).is_err());
        env.initialize_memory(1, Some(2), true).unwrap();
        assert!(env.initialize_memory(1, Some(2), false).is_err());

        assert!(env.initialize_table(3, Some(2)).is_err());
        env.initialize_table(2, None).unwrap();

        let module = env.finish().unwrap();
        assert_eq!(
            module.exports().collect::<Vec<_>>(),
            [("memory", EntityIndex::Memory)]
        );
    }

    #[test]
    fn global_aliases() {
        let mut env = env();
        let imported = env.add_global_import("env", "g", ValueType::I32).unwrap();
        let constant = env
            .add_global(ValueType::F64, false, GlobalInit::Const(Val::from(2.5f64)))
            .unwrap();

        let alias = env
            .add_global(ValueType::I32, false, GlobalInit::Alias(imported))
            .unwrap();
        env.add_global(ValueType::F64, false, GlobalInit::Alias(constant))
            .unwrap();

        // transitive alias
        assert!(
            env.add_global(ValueType::I32, false, GlobalInit::Alias(alias))
                .is_err()
        );
        // type mismatch
        assert!(
            env.add_global(ValueType::I64, false, GlobalInit::Alias(imported))
                .is_err()
        );
        // initializer type mismatch
        assert!(
            env.add_global(ValueType::I64, false, GlobalInit::Const(Val::I32(1)))
                .is_err()
        );
        // forward references are left to the linker
        env.add_global(ValueType::I32, false, GlobalInit::Alias(GlobalIndex::new(10)))
            .unwrap();
    }

    #[test]
    fn exports() {
        let mut env = env();
        let func = defined_function(&mut env, FuncType::new([], None));
        let func = FuncIndex::new(func.index());
        let mutable = env
            .add_global(ValueType::I32, true, GlobalInit::Const(Val::I32(0)))
            .unwrap();

        env.set_export("a", EntityIndex::Function(func)).unwrap();
        env.set_export("b", EntityIndex::Function(func)).unwrap();
        assert!(env.set_export("a", EntityIndex::Function(func)).is_err());
        assert!(
            env.set_export("f", EntityIndex::Function(FuncIndex::new(1)))
                .is_err()
        );
        assert!(env.set_export("g", EntityIndex::Global(mutable)).is_err());
        assert!(env.set_export("t", EntityIndex::Table).is_err());

        let module = env.finish().unwrap();
        assert_eq!(module.function_name(DefinedFuncIndex::new(0)), Some("a[0]"));
    }

    #[test]
    fn segments() {
        let mut env = env();
        assert!(
            env.set_data_segment(0, ConstExpr::I32(0), &[1, 2])
                .is_err(),
            "data segments need a memory"
        );
        env.initialize_memory(1, None, false).unwrap();
        assert!(env.allocate_data_segments(u32::MAX).is_err());
        env.allocate_data_segments(1).unwrap();
        assert!(env.set_data_segment(1, ConstExpr::I32(0), &[]).is_err());
        env.set_data_segment(0, ConstExpr::I32(0), &[1, 2]).unwrap();
        assert!(env.set_data_segment(0, ConstExpr::I32(4), &[]).is_err());

        let offset = env
            .add_global(ValueType::F32, false, GlobalInit::Const(Val::F32(0)))
            .unwrap();
        env.initialize_table(1, Some(1)).unwrap();
        assert!(env.allocate_element_segments(u32::MAX).is_err());
        env.allocate_element_segments(2).unwrap();
        assert!(
            env.set_element_segment(0, ConstExpr::Global(offset), &[])
                .is_err()
        );
        assert!(
            env.set_element_segment(0, ConstExpr::I32(0), &[FuncIndex::new(0)])
                .is_err()
        );
        env.set_element_segment(0, ConstExpr::I32(0), &[]).unwrap();

        let err = env.finish().unwrap_err();
        assert_eq!(err.message(), "element segment 1 was never set");
    }

    #[test]
    fn start_function() {
        let mut env = env();
        let bad = defined_function(&mut env, FuncType::new([ValueType::I32], None));
        let good = defined_function(&mut env, FuncType::new([], None));

        assert!(
            env.set_start_function(FuncIndex::new(bad.index()))
                .is_err()
        );
        assert!(env.set_start_function(FuncIndex::new(2)).is_err());
        env.set_start_function(FuncIndex::new(good.index()))
            .unwrap();

        let module = env.finish().unwrap();
        assert_eq!(module.start_function(), Some(FuncIndex::new(1)));
        assert_eq!(
            module.function_name(DefinedFuncIndex::new(1)),
            Some("wasm-function[1]")
        );
    }

    #[test]
    fn missing_body() {
        let mut env = env();
        let sig = env.add_signature(FuncType::new([], None)).unwrap();
        env.allocate_function_info(sig).unwrap();
        assert_eq!(
            env.finish().unwrap_err().message(),
            "function 0 has no body"
        );
    }
}
