// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use cranelift_entity::{EntityRef, PrimaryMap};

use crate::environment::{Environment, GlobalsRegion};
use crate::errors::LinkError;
use crate::func::{FuncData, FuncKind};
use crate::indices::{DefinedFuncIndex, EntityIndex, GlobalIndex};
use crate::memory::MemoryData;
use crate::module::{ConstExpr, GlobalKind, ImportType, ModuleInfo};
use crate::store::{Store, Stored};
use crate::table::TableData;
use crate::utils::ensure;
use crate::{Engine, Extern, Func, Global, Memory, Module, Table, Val, vm};

/// An instantiated module.
///
/// Methods taking a [`Store`] panic if that store does not own the instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instance(pub(crate) Stored<InstanceData>);

#[derive(Debug)]
pub(crate) struct InstanceData {
    pub module: Module,
    pub env: Environment,
    /// Exports in module order, `None` where the exported entity is missing.
    exports: Vec<Option<Extern>>,
}

#[derive(Clone, Debug)]
pub struct Export<'instance> {
    /// The name of the export.
    pub name: &'instance str,
    /// The definition of the export.
    pub definition: Extern,
}

/// Imports sorted by kind, each checked against the module's expectations.
#[derive(Default)]
struct ResolvedImports {
    functions: Vec<Func>,
    memory: Option<Memory>,
    table: Option<Table>,
    globals: Vec<Val>,
}

/// A memory or table that is either shared with the host or will be created
/// once every check passed.
enum Pending<H, D> {
    Imported(H),
    Fresh(D),
}

// ===== impl Instance =====

impl Instance {
    /// Instantiates `module` with `imports` given in the module's import order.
    ///
    /// Nothing is added to the store unless every import, limit and segment
    /// check passes. A trap in the start function is returned after the
    /// instance has been committed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Link`](crate::Error::Link) for mismatched imports,
    /// limits or segments, [`Error::Compile`](crate::Error::Compile) for an
    /// invalid function body and [`Error::Trap`](crate::Error::Trap) if the
    /// start function traps.
    pub fn new(store: &mut Store, module: &Module, imports: &[Extern]) -> crate::Result<Instance> {
        ensure!(
            Engine::same(store.engine(), module.engine()),
            LinkError::EngineMismatch
        );
        let info = module.info();
        ensure!(
            imports.len() == info.imports.len(),
            LinkError::ImportCountMismatch {
                expected: info.imports.len(),
                actual: imports.len(),
            }
        );

        let span = tracing::debug_span!("instantiate", imports = imports.len());
        let _enter = span.enter();

        tracing::trace!("resolving imports");
        let resolved = resolve_imports(store, info, imports)?;

        tracing::trace!("initializing memory and table");
        let memory = match info.memory {
            None => None,
            Some(plan) if plan.imported => {
                let memory = resolved.memory.ok_or_else(|| missing(info, "memory"))?;
                let data = &store[memory.0];
                check_import_limits("memory", data.size(), data.max(), plan.min, plan.max)?;
                Some(Pending::Imported(memory))
            }
            Some(plan) => Some(Pending::Fresh(MemoryData::new(store, plan.min, plan.max)?)),
        };
        let table = match info.table {
            None => None,
            Some(plan) if plan.imported => {
                let table = resolved.table.ok_or_else(|| missing(info, "table"))?;
                let data = &store[table.0];
                check_import_limits("table", data.size(), data.max(), plan.min, plan.max)?;
                Some(Pending::Imported(table))
            }
            Some(plan) => Some(Pending::Fresh(TableData::new(store, plan.min, plan.max)?)),
        };

        tracing::trace!("initializing globals");
        let globals = resolve_globals(info, &resolved.globals)?;

        tracing::trace!("compiling functions");
        let code = info
            .function_infos
            .keys()
            .map(|index| module.compiled_function(index))
            .collect::<Result<PrimaryMap<DefinedFuncIndex, _>, _>>()?;

        tracing::trace!("checking segments");
        let memory_len = match &memory {
            Some(Pending::Imported(memory)) => store[memory.0].bytes().len(),
            Some(Pending::Fresh(data)) => data.bytes().len(),
            None => 0,
        };
        let data_offsets = info
            .data_segments
            .iter()
            .enumerate()
            .map(|(index, segment)| {
                let offset = eval_offset(segment.offset, &globals)?;
                check_segment("data", index, offset, segment.data.len(), memory_len)
            })
            .collect::<Result<Vec<_>, _>>()?;

        let table_len = match &table {
            Some(Pending::Imported(table)) => store[table.0].size() as usize,
            Some(Pending::Fresh(data)) => data.size() as usize,
            None => 0,
        };
        let element_offsets = info
            .element_segments
            .iter()
            .enumerate()
            .map(|(index, segment)| {
                let offset = eval_offset(segment.offset, &globals)?;
                check_segment("element", index, offset, segment.functions.len(), table_len)
            })
            .collect::<Result<Vec<_>, _>>()?;

        // Every check passed, commit to the store.
        let handle = Instance(store.next_instance());

        let memory = memory.map(|memory| match memory {
            Pending::Imported(memory) => memory,
            Pending::Fresh(data) => Memory(store.add_memory(data)),
        });
        let table = table.map(|table| match table {
            Pending::Imported(table) => table,
            Pending::Fresh(data) => Table(store.add_table(data)),
        });

        let defined_functions = code
            .into_iter()
            .map(|(index, code)| {
                let ty = info.signatures[info.function_infos[index].signature].clone();
                Func(store.add_function(FuncData {
                    ty,
                    kind: FuncKind::Wasm {
                        instance: handle,
                        code,
                    },
                }))
            })
            .collect();

        let mut region = GlobalsRegion::new(info.global_layout.size());
        for (index, value) in globals.iter().enumerate() {
            if let Some(offset) = info.global_layout.offset(GlobalIndex::new(index)) {
                region.set(offset, *value);
            }
        }

        let env = Environment {
            memory,
            table,
            imported_functions: resolved.functions,
            defined_functions,
            globals: region,
        };
        debug_assert_eq!(env.size_in_slots(), module.environment_size());

        tracing::trace!("initializing segments");
        if let Some(memory) = env.memory {
            let bytes = store[memory.0].bytes_mut();
            for (segment, offset) in info.data_segments.iter().zip(data_offsets) {
                bytes[offset..offset + segment.data.len()].copy_from_slice(&segment.data);
            }
        }
        if let Some(table) = env.table {
            let elements = store[table.0].elements_mut();
            for (segment, offset) in info.element_segments.iter().zip(element_offsets) {
                for (slot, func) in elements[offset..].iter_mut().zip(&segment.functions) {
                    *slot = Some(env.function(*func));
                }
            }
        }

        let exports = info
            .exports
            .iter()
            .map(|export| match export.index {
                EntityIndex::Function(func) => Some(Extern::Func(env.function(func))),
                EntityIndex::Table => env.table.map(Extern::Table),
                EntityIndex::Memory => env.memory.map(Extern::Memory),
                EntityIndex::Global(global) => globals
                    .get(global.index())
                    .map(|value| Extern::Global(Global::new(store, *value, false))),
            })
            .collect();

        let start = info.start.map(|start| env.function(start));
        let stored = store.add_instance(InstanceData {
            module: module.clone(),
            env,
            exports,
        });
        debug_assert_eq!(stored, handle.0);

        if let Some(start) = start {
            tracing::trace!("invoking start function");
            vm::invoke(store, start, &[])?;
        }

        tracing::debug!(instance = ?handle, "instantiated module");
        Ok(handle)
    }

    /// Returns the module this instance was instantiated from.
    pub fn module(self, store: &Store) -> &Module {
        &store[self.0].module
    }

    /// Returns an iterator over the exports of this instance.
    pub fn exports(self, store: &Store) -> impl Iterator<Item = Export<'_>> {
        let data = &store[self.0];
        data.module
            .info()
            .exports
            .iter()
            .zip(&data.exports)
            .filter_map(|(export, definition)| {
                Some(Export {
                    name: &export.name,
                    definition: (*definition)?,
                })
            })
    }

    /// Attempts to get an export from this instance.
    pub fn get_export(self, store: &Store, name: &str) -> Option<Extern> {
        let data = &store[self.0];
        let position = *data.module.info().export_names.get(name)?;
        data.exports.get(position).copied().flatten()
    }

    /// Attempts to get an exported `Func` from this instance.
    pub fn get_func(self, store: &Store, name: &str) -> Option<Func> {
        self.get_export(store, name)?.into_func()
    }

    /// Attempts to get an exported `Table` from this instance.
    pub fn get_table(self, store: &Store, name: &str) -> Option<Table> {
        self.get_export(store, name)?.into_table()
    }

    /// Attempts to get an exported `Memory` from this instance.
    pub fn get_memory(self, store: &Store, name: &str) -> Option<Memory> {
        self.get_export(store, name)?.into_memory()
    }

    /// Attempts to get an exported `Global` from this instance.
    pub fn get_global(self, store: &Store, name: &str) -> Option<Global> {
        self.get_export(store, name)?.into_global()
    }
}

fn missing(info: &ModuleInfo, kind: &'static str) -> LinkError {
    let import = info.imports.iter().find(|import| import.ty.kind() == kind);
    LinkError::MissingImport {
        kind,
        module: import.map(|import| import.module.clone()).unwrap_or_default(),
        field: import.map(|import| import.field.clone()).unwrap_or_default(),
    }
}

fn resolve_imports(
    store: &Store,
    info: &ModuleInfo,
    imports: &[Extern],
) -> Result<ResolvedImports, LinkError> {
    let mut resolved = ResolvedImports::default();

    for (import, definition) in info.imports.iter().zip(imports) {
        let module = || import.module.clone();
        let field = || import.field.clone();

        match (import.ty, definition) {
            (ImportType::Function(sig), Extern::Func(func)) => {
                let expected = &info.signatures[sig];
                let found = func.ty(store);
                ensure!(
                    found == expected,
                    LinkError::SignatureMismatch {
                        module: module(),
                        field: field(),
                        expected: expected.clone(),
                        found: found.clone(),
                    }
                );
                resolved.functions.push(*func);
            }
            (ImportType::Table, Extern::Table(table)) => resolved.table = Some(*table),
            (ImportType::Memory, Extern::Memory(memory)) => resolved.memory = Some(*memory),
            (ImportType::Global(expected), Extern::Global(global)) => {
                ensure!(
                    !global.is_mutable(store),
                    LinkError::MutableGlobalImport {
                        module: module(),
                        field: field(),
                    }
                );
                let found = global.ty(store);
                ensure!(
                    found == expected,
                    LinkError::GlobalTypeMismatch {
                        module: module(),
                        field: field(),
                        expected,
                        found,
                    }
                );
                resolved.globals.push(global.get(store));
            }
            (ty, definition) => {
                return Err(LinkError::ImportKindMismatch {
                    module: module(),
                    field: field(),
                    expected: ty.kind(),
                    found: definition.kind(),
                });
            }
        }
    }

    Ok(resolved)
}

/// An imported memory or table must be at least as large as the module's
/// minimum and may not grow beyond the module's maximum.
fn check_import_limits(
    kind: &'static str,
    actual: u32,
    actual_max: Option<u32>,
    min: u32,
    max: Option<u32>,
) -> Result<(), LinkError> {
    ensure!(
        actual >= min,
        LinkError::ImportTooSmall {
            kind,
            actual,
            required: min,
        }
    );
    if let Some(max) = max {
        ensure!(
            actual_max.is_some_and(|actual_max| actual_max <= max),
            LinkError::ImportMaximumTooLarge { kind }
        );
    }
    Ok(())
}

/// Computes the initial value of every global in declaration order.
fn resolve_globals(info: &ModuleInfo, imported: &[Val]) -> Result<Vec<Val>, LinkError> {
    let mut values = Vec::with_capacity(info.globals.len());

    for (index, desc) in &info.globals {
        let unresolved = |target: GlobalIndex| LinkError::UnresolvedGlobal {
            global: index.as_u32(),
            target: target.as_u32(),
        };

        let value = match desc.kind {
            GlobalKind::Const(value) => value,
            GlobalKind::Imported => *imported.get(index.index()).ok_or(unresolved(index))?,
            GlobalKind::LocalAlias(target) => {
                *values.get(target.index()).ok_or(unresolved(target))?
            }
        };
        values.push(value);
    }

    Ok(values)
}

fn eval_offset(offset: ConstExpr, globals: &[Val]) -> Result<u32, LinkError> {
    match offset {
        ConstExpr::I32(offset) => Ok(offset),
        ConstExpr::Global(global) => globals
            .get(global.index())
            .and_then(|value| value.i32())
            .map(|value| u32::from_le_bytes(value.to_le_bytes()))
            .ok_or(LinkError::UnresolvedGlobal {
                global: global.as_u32(),
                target: global.as_u32(),
            }),
    }
}

fn check_segment(
    kind: &'static str,
    index: usize,
    offset: u32,
    size: usize,
    len: usize,
) -> Result<usize, LinkError> {
    let start = offset as usize;
    ensure!(
        start.checked_add(size).is_some_and(|end| end <= len),
        LinkError::SegmentOutOfBounds {
            kind,
            index,
            offset,
            size,
            len,
        }
    );
    Ok(start)
}
