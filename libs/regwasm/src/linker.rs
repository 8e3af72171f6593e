// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::sync::Arc;

use hashbrown::HashMap;
use hashbrown::hash_map::Entry;

use crate::errors::LinkError;
use crate::func::HostFunc;
use crate::utils::ensure;
use crate::{Engine, Extern, FuncType, Instance, Module, Store, Val};

/// Resolves module imports by name.
#[derive(Debug)]
pub struct Linker {
    engine: Engine,
    string2idx: HashMap<Arc<str>, usize>,
    strings: Vec<Arc<str>>,
    map: HashMap<ImportKey, Definition>,
}

#[derive(Debug, Copy, Clone, Hash, PartialEq, Eq)]
struct ImportKey {
    name: usize,
    module: usize,
}

#[derive(Debug, Clone)]
enum Definition {
    Extern(Extern),
    /// A host function that is materialized in whichever store instantiates.
    HostFunc(Arc<HostFunc>),
}

impl Linker {
    /// Create a new `Linker`.
    ///
    /// This linker is scoped to the provided engine and cannot be used to link modules from other engines.
    pub fn new(engine: &Engine) -> Self {
        Self {
            engine: engine.clone(),
            string2idx: HashMap::new(),
            strings: Vec::new(),
            map: HashMap::new(),
        }
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Defines `module::name` as `def`.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::AlreadyDefined`] if the name is taken.
    pub fn define(
        &mut self,
        module: &str,
        name: &str,
        def: impl Into<Extern>,
    ) -> crate::Result<&mut Self> {
        let key = self.import_key(module, name);
        self.insert(key, Definition::Extern(def.into()))?;
        Ok(self)
    }

    /// Defines `module::name` as a host function that is not bound to a store.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::AlreadyDefined`] if the name is taken.
    pub fn func_new<F>(
        &mut self,
        module: &str,
        name: &str,
        ty: FuncType,
        func: F,
    ) -> crate::Result<&mut Self>
    where
        F: Fn(&[Val]) -> anyhow::Result<Option<Val>> + Send + Sync + 'static,
    {
        let func = HostFunc {
            ty,
            func: Arc::new(func),
        };

        let key = self.import_key(module, name);
        self.insert(key, Definition::HostFunc(Arc::new(func)))?;
        Ok(self)
    }

    /// Attempt to retrieve a definition from this linker.
    pub fn get(&self, store: &mut Store, module: &str, name: &str) -> Option<Extern> {
        Some(self._get(module, name)?.to_extern(store))
    }

    fn _get(&self, module: &str, name: &str) -> Option<&Definition> {
        let key = ImportKey {
            module: *self.string2idx.get(module)?,
            name: *self.string2idx.get(name)?,
        };
        self.map.get(&key)
    }

    /// Define all exports of the provided `instance` under the module name `module_name`.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::AlreadyDefined`] if one of the exports collides
    /// with an existing definition.
    pub fn define_instance(
        &mut self,
        store: &Store,
        module_name: &str,
        instance: Instance,
    ) -> crate::Result<&mut Self> {
        let exports = instance
            .exports(store)
            .map(|e| (self.import_key(module_name, e.name), e.definition))
            .collect::<Vec<_>>();

        for (key, ext) in exports {
            self.insert(key, Definition::Extern(ext))?;
        }

        Ok(self)
    }

    /// Instantiate the provided `module`.
    ///
    /// Each import of the module is looked up in this linker and must have
    /// previously been defined. Type checking happens during instantiation.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::MissingImport`] for imports without a definition,
    /// and everything [`Instance::new`] returns.
    pub fn instantiate(&self, store: &mut Store, module: &Module) -> crate::Result<Instance> {
        ensure!(
            Engine::same(&self.engine, module.engine()),
            LinkError::EngineMismatch
        );

        let imports = module
            .imports()
            .map(|import| {
                self._get(&import.module, &import.field)
                    .map(|def| def.to_extern(store))
                    .ok_or_else(|| LinkError::MissingImport {
                        kind: import.ty.kind(),
                        module: import.module.clone(),
                        field: import.field.clone(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Instance::new(store, module, &imports)
    }

    fn insert(&mut self, key: ImportKey, item: Definition) -> Result<(), LinkError> {
        match self.map.entry(key) {
            Entry::Occupied(_) => {
                return Err(LinkError::AlreadyDefined {
                    module: self.strings[key.module].to_string(),
                    field: self.strings[key.name].to_string(),
                });
            }
            Entry::Vacant(v) => {
                v.insert(item);
            }
        }

        Ok(())
    }

    fn import_key(&mut self, module: &str, name: &str) -> ImportKey {
        ImportKey {
            module: self.intern_str(module),
            name: self.intern_str(name),
        }
    }

    fn intern_str(&mut self, string: &str) -> usize {
        if let Some(idx) = self.string2idx.get(string) {
            return *idx;
        }
        let string: Arc<str> = string.into();
        let idx = self.strings.len();
        self.strings.push(string.clone());
        self.string2idx.insert(string, idx);
        idx
    }
}

impl Definition {
    fn to_extern(&self, store: &mut Store) -> Extern {
        match self {
            Definition::Extern(ext) => *ext,
            Definition::HostFunc(f) => Extern::Func(f.to_func(store)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Error, Global};

    #[test]
    fn duplicate_definitions() {
        let engine = Engine::default();
        let mut store = Store::new(&engine);
        let mut linker = Linker::new(&engine);

        let global = Global::new(&mut store, Val::I32(1), false);
        linker.define("env", "g", global).unwrap();
        let err = linker.define("env", "g", global).unwrap_err();
        assert!(matches!(
            err,
            Error::Link(LinkError::AlreadyDefined { ref module, ref field })
                if module == "env" && field == "g"
        ));

        assert_eq!(
            linker.get(&mut store, "env", "g"),
            Some(Extern::Global(global))
        );
        assert_eq!(linker.get(&mut store, "env", "h"), None);
    }

    #[test]
    fn host_functions_are_materialized_per_store() {
        let engine = Engine::default();
        let mut linker = Linker::new(&engine);
        linker
            .func_new("env", "f", FuncType::new([], None), |_| Ok(None))
            .unwrap();

        let mut store = Store::new(&engine);
        let a = linker.get(&mut store, "env", "f").unwrap();
        let b = linker.get(&mut store, "env", "f").unwrap();
        assert_ne!(a, b);
        assert!(a.into_func().is_some());
    }
}
