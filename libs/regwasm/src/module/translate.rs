// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use cranelift_entity::EntityRef;
use regwasm_reader::{
    DataSegment, Export, FunctionBody, FunctionNames, Import, ImportKind, Parser, Payload,
    VecReader,
};

use super::builder::{ConstExpr, ModuleBuilder};
use crate::errors::CompileError;
use crate::indices::{DefinedFuncIndex, EntityIndex, FuncIndex, SigIndex};
use crate::utils::ensure;

/// Feeds the sections of a binary module into a [`ModuleBuilder`].
pub fn translate_module<B: ModuleBuilder + ?Sized>(
    builder: &mut B,
    bytes: &[u8],
    decode_auxiliary_sections: bool,
) -> crate::Result<()> {
    let parser = Parser::new(bytes)?.decode_auxiliary_sections(decode_auxiliary_sections);

    let mut translator = ModuleTranslator {
        builder,
        param_counts: Vec::new(),
        num_imported_functions: 0,
        defined: Vec::new(),
    };

    for payload in parser.sections() {
        translator.translate_payload(payload?)?;
    }

    Ok(())
}

struct ModuleTranslator<'b, B: ?Sized> {
    builder: &'b mut B,
    /// Parameter count per signature.
    param_counts: Vec<usize>,
    num_imported_functions: u32,
    /// Defined functions and their total local count, parameters included.
    defined: Vec<(DefinedFuncIndex, usize)>,
}

impl<B: ModuleBuilder + ?Sized> ModuleTranslator<'_, B> {
    fn translate_payload(&mut self, payload: Payload<'_>) -> crate::Result<()> {
        match payload {
            Payload::Memory(memory) => {
                self.builder.initialize_memory(
                    memory.min_pages,
                    Some(memory.max_pages),
                    memory.exported,
                )?;
            }
            Payload::Signatures(signatures) => {
                tracing::trace!(count = signatures.count(), "translating signatures");
                for ty in signatures {
                    let ty = ty?;
                    self.param_counts.push(ty.params().len());
                    self.builder.add_signature(ty)?;
                }
            }
            Payload::ImportTable(imports) => self.translate_imports(imports)?,
            Payload::FunctionSignatures(functions) => {
                tracing::trace!(count = functions.count(), "translating function signatures");
                for sig in functions {
                    let sig = SigIndex::from_u32(sig?);
                    let func = self.builder.allocate_function_info(sig)?;
                    let params = self.param_counts.get(sig.index()).copied().unwrap_or(0);
                    self.defined.push((func, params));
                }
            }
            Payload::FunctionTable(entries) => {
                let functions = entries
                    .into_iter()
                    .map(|func| func.map(FuncIndex::from_u32))
                    .collect::<regwasm_reader::Result<Vec<_>>>()?;
                let len = u32::try_from(functions.len())
                    .map_err(|_| CompileError::new("function table is too large"))?;

                self.builder.initialize_table(len, Some(len))?;
                self.builder.allocate_element_segments(1)?;
                self.builder
                    .set_element_segment(0, ConstExpr::I32(0), &functions)?;
            }
            Payload::ExportTable(exports) => {
                for export in exports {
                    let Export { func_index, name } = export?;
                    self.builder
                        .set_export(name, EntityIndex::Function(FuncIndex::from_u32(func_index)))?;
                }
            }
            Payload::StartFunction(func) => {
                self.builder.set_start_function(FuncIndex::from_u32(func))?;
            }
            Payload::FunctionBodies(bodies) => self.translate_bodies(bodies)?,
            Payload::DataSegments(segments) => {
                self.builder.allocate_data_segments(segments.count())?;
                for (index, segment) in (0..).zip(segments) {
                    let DataSegment { offset, data } = segment?;
                    self.builder
                        .set_data_segment(index, ConstExpr::I32(offset), data)?;
                }
            }
            Payload::Names(names) => self.translate_names(names)?,
            Payload::Skipped { name, range } => {
                tracing::trace!(name, ?range, "skipped section");
            }
        }

        Ok(())
    }

    fn translate_imports(&mut self, imports: VecReader<'_, Import<'_>>) -> crate::Result<()> {
        for import in imports {
            let Import {
                module,
                field,
                kind,
            } = import?;
            tracing::trace!(module, field, ?kind, "translating import");

            match kind {
                ImportKind::Function(sig) => {
                    self.builder
                        .add_function_import(module, field, SigIndex::from_u32(sig))?;
                    self.num_imported_functions += 1;
                }
                ImportKind::Table => self.builder.add_table_import(module, field)?,
                ImportKind::Memory => self.builder.add_memory_import(module, field)?,
                ImportKind::Global(ty) => {
                    self.builder.add_global_import(module, field, ty)?;
                }
            }
        }
        Ok(())
    }

    fn translate_bodies(
        &mut self,
        bodies: VecReader<'_, FunctionBody<'_>>,
    ) -> crate::Result<()> {
        let expected = u32::try_from(self.defined.len()).unwrap_or(u32::MAX);
        ensure!(
            bodies.count() == expected,
            regwasm_reader::Error::CountMismatch {
                what: "function bodies",
                expected,
                actual: bodies.count(),
            }
        );
        tracing::debug!(count = expected, "translating function bodies");

        for (i, body) in bodies.into_iter().enumerate() {
            let body = body?;
            let (func, locals) = &mut self.defined[i];

            for entry in body.locals()? {
                let (count, ty) = entry?;
                self.builder.add_locals(*func, count, ty)?;
                *locals += count as usize;
            }

            let code = body.code()?;
            self.builder.set_function_body(*func, code.bytes, code.offset)?;
        }
        Ok(())
    }

    fn translate_names(&mut self, names: VecReader<'_, FunctionNames<'_>>) -> crate::Result<()> {
        ensure!(
            names.count() as usize <= self.defined.len(),
            CompileError::new(format!(
                "names section has {} entries, the module defines {} functions",
                names.count(),
                self.defined.len()
            ))
        );

        for (i, entry) in names.into_iter().enumerate() {
            let FunctionNames { name, locals } = entry?;
            let (func, local_count) = self.defined[i];
            ensure!(
                locals.len() == local_count,
                CompileError::new(format!(
                    "names section lists {} locals for function {name}, it declares {local_count}",
                    locals.len()
                ))
            );
            self.builder.set_function_name(func, name)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Engine, FuncType, Module, ValueType};
    use crate::module::ModuleEnvironment;

    /// Tiny binary encoder, every count and size in these tests is below 128.
    struct Bytes(Vec<u8>);

    impl Bytes {
        fn new() -> Self {
            let mut out = regwasm_reader::WASM_MAGIC.to_le_bytes().to_vec();
            out.extend_from_slice(&regwasm_reader::WASM_VERSION.to_le_bytes());
            Self(out)
        }

        fn section(mut self, name: &str, payload: &[u8]) -> Self {
            let size = 1 + name.len() + payload.len();
            self.0.push(u8::try_from(size).unwrap());
            self.0.push(u8::try_from(name.len()).unwrap());
            self.0.extend_from_slice(name.as_bytes());
            self.0.extend_from_slice(payload);
            self
        }
    }

    fn translate(bytes: &Bytes, auxiliary: bool) -> crate::Result<Module> {
        let mut env = ModuleEnvironment::new(&Engine::default());
        translate_module(&mut env, &bytes.0, auxiliary)?;
        Ok(env.finish()?)
    }

    #[test_log::test]
    fn translates_sections() {
        let bytes = Bytes::new()
            .section("memory", &[0x01, 0x02, 0x01])
            .section("signatures", &[0x02, 0x40, 0x00, 0x00, 0x40, 0x01, 0x01, 0x01, 0x01])
            .section("function_signatures", &[0x02, 0x00, 0x01])
            .section("function_table", &[0x02, 0x01, 0x00])
            .section("export_table", &[0x01, 0x01, 0x02, b'i', b'd'])
            .section(
                "function_bodies",
                &[0x02, 0x01, 0x00, 0x05, 0x01, 0x01, 0x01, 0x20, 0x00],
            )
            .section("data_segments", &[0x01, 0x00, 0x01, 0xff])
            .section("end", &[]);

        let module = translate(&bytes, false).unwrap();
        assert_eq!(module.signature_count(), 2);
        assert_eq!(module.function_count(), 2);
        assert_eq!(
            module.function_signature(FuncIndex::new(1)),
            Some(&FuncType::new([ValueType::I32], Some(ValueType::I32)))
        );

        let info = module.info();
        assert_eq!(info.table.map(|t| (t.min, t.max)), Some((2, Some(2))));
        assert_eq!(
            &*info.element_segments[0].functions,
            &[FuncIndex::new(1), FuncIndex::new(0)]
        );
        assert_eq!(
            info.function_infos[DefinedFuncIndex::new(1)].locals,
            [ValueType::I32, ValueType::I32]
        );
        assert_eq!(module.function_name(DefinedFuncIndex::new(1)), Some("id[1]"));
        assert_eq!(
            module.exports().map(|(name, _)| name).collect::<Vec<_>>(),
            ["memory", "id"]
        );
    }

    #[test_log::test]
    fn body_count_mismatch() {
        let bytes = Bytes::new()
            .section("signatures", &[0x01, 0x40, 0x00, 0x00])
            .section("function_signatures", &[0x02, 0x00, 0x00])
            .section("function_bodies", &[0x01, 0x01, 0x00]);

        assert!(matches!(
            translate(&bytes, false),
            Err(crate::Error::Decode(regwasm_reader::Error::CountMismatch {
                expected: 2,
                actual: 1,
                ..
            }))
        ));
    }

    #[test_log::test]
    fn data_segment_count_exceeds_section() {
        let bytes = Bytes::new()
            .section("data_segments", &[0xff, 0xff, 0xff, 0xff, 0x0f])
            .section("end", &[]);

        assert!(matches!(
            translate(&bytes, false),
            Err(crate::Error::Decode(regwasm_reader::Error::CountTooLarge {
                count: u32::MAX,
                remaining: 0,
                ..
            }))
        ));
    }

    #[test_log::test]
    fn auxiliary_sections() {
        let bytes = Bytes::new()
            .section("signatures", &[0x01, 0x40, 0x00, 0x00])
            .section(
                "import_table",
                &[0x01, 0x00, 0x03, b'e', b'n', b'v', 0x03, b'l', b'o', b'g', 0x00],
            )
            .section("function_signatures", &[0x01, 0x00])
            .section("start_function", &[0x01])
            .section("function_bodies", &[0x01, 0x01, 0x00])
            .section("names", &[0x01, 0x04, b'm', b'a', b'i', b'n', 0x00]);

        let module = translate(&bytes, true).unwrap();
        assert_eq!(module.import_count(), 1);
        assert_eq!(module.start_function(), Some(FuncIndex::new(1)));
        assert_eq!(module.function_name(DefinedFuncIndex::new(0)), Some("main"));

        let skipped = translate(&bytes, false).unwrap();
        assert_eq!(skipped.import_count(), 0);
        assert_eq!(skipped.start_function(), None);
        assert_eq!(
            skipped.function_name(DefinedFuncIndex::new(0)),
            Some("wasm-function[0]")
        );
    }

    #[test_log::test]
    fn names_local_count() {
        let bytes = Bytes::new()
            .section("signatures", &[0x01, 0x40, 0x01, 0x01, 0x00])
            .section("function_signatures", &[0x01, 0x00])
            .section("function_bodies", &[0x01, 0x01, 0x00])
            .section("names", &[0x01, 0x01, b'f', 0x00]);

        let err = translate(&bytes, true).unwrap_err();
        assert!(matches!(err, crate::Error::Compile(_)), "{err}");
    }
}
