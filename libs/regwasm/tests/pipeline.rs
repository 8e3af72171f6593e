// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

mod common;

use common::ModuleBytes;
use regwasm::{
    Config, Engine, EntityIndex, Error, FuncIndex, FuncType, Global, GlobalIndex, GlobalInit,
    Instance, LinkError, Linker, Module, ModuleBuilder, ModuleEnvironment, Op, Store, Val,
    ValueType,
};

use ValueType::{F64, I32};

fn binop() -> FuncType {
    FuncType::new([I32, I32], Some(I32))
}

/// `get_local 0; get_local 1; i32.add`
const ADD: &[u8] = &[0x20, 0x00, 0x20, 0x01, 0x6a];

#[test_log::test]
fn end_to_end() {
    let engine = Engine::default();

    let mut env = ModuleEnvironment::new(&engine);
    env.initialize_memory(1, Some(2), false).unwrap();
    let sig = env.add_signature(binop()).unwrap();
    let add = env.allocate_function_info(sig).unwrap();
    env.set_function_body(add, ADD, 0).unwrap();
    env.set_export("add", EntityIndex::Function(FuncIndex::from_u32(0)))
        .unwrap();
    let g = env
        .add_global(I32, false, GlobalInit::Const(Val::I32(42)))
        .unwrap();
    env.set_export("g", EntityIndex::Global(g)).unwrap();
    let module = env.finish().unwrap();

    let mut store = Store::new(&engine);
    let instance = Linker::new(&engine)
        .instantiate(&mut store, &module)
        .unwrap();

    let g = instance.get_global(&store, "g").unwrap();
    assert_eq!(g.get(&store), Val::I32(42));
    assert!(!g.is_mutable(&store));

    let add = instance.get_func(&store, "add").unwrap();
    assert_eq!(add.ty(&store), &binop());
    assert_eq!(
        add.call(&mut store, &[Val::I32(3), Val::I32(4)]).unwrap(),
        Some(Val::I32(7))
    );

    let names = instance
        .exports(&store)
        .map(|export| export.name)
        .collect::<Vec<_>>();
    assert_eq!(names, ["add", "g"]);
}

#[test_log::test]
fn end_to_end_from_bytes() {
    let bytes = ModuleBytes::new()
        .memory(1, 2, true)
        .signatures(&[binop()])
        .function_signatures(&[0])
        .exports(&[(0, "add")])
        .bodies(&[(&[], ADD)])
        .finish();

    let engine = Engine::default();
    let module = Module::from_bytes(&engine, &bytes).unwrap();
    assert_eq!(module.signature_count(), 1);
    assert_eq!(module.function_count(), 1);
    assert_eq!(module.global_count(), 0);

    let mut store = Store::new(&engine);
    let instance = Instance::new(&mut store, &module, &[]).unwrap();

    let memory = instance.get_memory(&store, "memory").unwrap();
    assert_eq!(memory.size(&store), 1);
    assert_eq!(memory.max(&store), Some(2));

    let add = instance.get_func(&store, "add").unwrap();
    assert_eq!(
        add.call(&mut store, &[Val::I32(-3), Val::I32(4)]).unwrap(),
        Some(Val::I32(1))
    );
    assert!(matches!(
        add.call(&mut store, &[Val::I32(3)]),
        Err(Error::ArgumentMismatch { .. })
    ));
}

#[test_log::test]
fn counts_match_declarations() {
    let bytes = ModuleBytes::new()
        .signatures(&[
            FuncType::new([], None),
            binop(),
            FuncType::new([F64], Some(F64)),
        ])
        .function_signatures(&[1, 1])
        .bodies(&[(&[], ADD), (&[(1, I32)], &[0x20, 0x02])])
        .finish();

    let module = Module::from_bytes(&Engine::default(), &bytes).unwrap();
    assert_eq!(module.signature_count(), 3);
    assert_eq!(module.function_count(), 2);
    assert_eq!(module.global_count(), 0);
    module.compile_functions().unwrap();
}

#[test_log::test]
fn bodies_before_signatures() {
    let bytes = ModuleBytes::new()
        .signatures(&[binop()])
        .bodies(&[(&[], ADD)])
        .function_signatures(&[0])
        .finish();

    let err = Module::from_bytes(&Engine::default(), &bytes).unwrap_err();
    assert!(matches!(err, Error::Decode(_)), "{err}");
}

#[test_log::test]
fn oversized_segment_count_is_rejected() {
    // data_segments declaring u32::MAX entries with an empty payload
    let bytes = ModuleBytes::new()
        .memory(1, 1, false)
        .section("data_segments", &[0xff, 0xff, 0xff, 0xff, 0x0f])
        .finish();

    let err = Module::from_bytes(&Engine::default(), &bytes).unwrap_err();
    assert!(matches!(err, Error::Decode(_)), "{err}");
}

#[test_log::test]
fn global_layout_is_packed() {
    let mut env = ModuleEnvironment::new(&Engine::default());
    for ty in [I32, I32, F64, I32] {
        env.add_global(ty, false, GlobalInit::Const(Val::default_for_ty(ty)))
            .unwrap();
    }
    let module = env.finish().unwrap();

    let offset = |i: usize| module.offset_for_global(GlobalIndex::from_u32(i as u32)).unwrap();
    let i32s = [offset(0), offset(1), offset(3)];
    let f64 = offset(2);

    assert_eq!(f64 % 8, 0);
    for i32 in i32s {
        assert!(i32 + 4 <= f64 || i32 >= f64 + 8, "{i32} overlaps {f64}");
    }
    assert_eq!(module.globals_size(), 24);
}

#[test_log::test]
fn argument_types_checked_before_call() {
    let engine = Engine::default();
    let mut env = ModuleEnvironment::new(&engine);
    let callee_sig = env.add_signature(binop()).unwrap();
    let caller_sig = env.add_signature(FuncType::new([], Some(I32))).unwrap();

    let callee = env.allocate_function_info(callee_sig).unwrap();
    env.set_function_body(callee, ADD, 0).unwrap();

    // f64.const 1.0; i32.const 2; call/2 0
    let mut code = vec![0x44];
    code.extend(1.0f64.to_bits().to_le_bytes());
    code.extend([0x41, 0x02, 0x10, 0x02, 0x00]);
    let caller = env.allocate_function_info(caller_sig).unwrap();
    env.set_function_body(caller, &code, 0).unwrap();

    let module = env.finish().unwrap();
    let err = module.compiled_function(caller).unwrap_err();
    assert!(err.message().contains("expected i32"), "{err}");
    assert!(module.compiled_function(callee).is_ok());
}

#[test_log::test]
fn nested_branches() {
    let engine = Engine::default();
    let mut env = ModuleEnvironment::new(&engine);
    let sig = env.add_signature(FuncType::new([], None)).unwrap();
    let func = env.allocate_function_info(sig).unwrap();
    // block; block; br 0; end; br 0; end
    let code = [
        0x02, 0x00, 0x02, 0x00, 0x0c, 0x00, 0x00, 0x0b, 0x0c, 0x00, 0x00, 0x0b,
    ];
    env.set_function_body(func, &code, 0).unwrap();
    let module = env.finish().unwrap();

    let compiled = module.compiled_function(func).unwrap();
    let jumps = compiled
        .ops()
        .iter()
        .enumerate()
        .filter_map(|(i, op)| match op {
            Op::Jump { target } => Some((i, compiled.label_target(*target))),
            _ => None,
        })
        .collect::<Vec<_>>();

    // the inner br exits the inner block only, the outer one leaves both
    assert_eq!(jumps, [(0, 1), (1, 2)]);
}

fn alias_module(engine: &Engine, forward: bool) -> Module {
    let mut env = ModuleEnvironment::new(engine);
    let imported = env.add_global_import("env", "base", I32).unwrap();
    let constant = env
        .add_global(I32, false, GlobalInit::Const(Val::I32(5)))
        .unwrap();

    let a = env
        .add_global(I32, false, GlobalInit::Alias(imported))
        .unwrap();
    let b = env
        .add_global(I32, false, GlobalInit::Alias(constant))
        .unwrap();
    env.set_export("a", EntityIndex::Global(a)).unwrap();
    env.set_export("b", EntityIndex::Global(b)).unwrap();

    if forward {
        let next = GlobalIndex::from_u32(b.as_u32() + 2);
        env.add_global(I32, false, GlobalInit::Alias(next)).unwrap();
        env.add_global(I32, false, GlobalInit::Const(Val::I32(1)))
            .unwrap();
    }

    env.finish().unwrap()
}

#[test_log::test]
fn global_aliases_resolve_in_order() {
    let engine = Engine::default();
    let mut store = Store::new(&engine);
    let mut linker = Linker::new(&engine);
    let base = Global::new(&mut store, Val::I32(7), false);
    linker.define("env", "base", base).unwrap();

    let instance = linker
        .instantiate(&mut store, &alias_module(&engine, false))
        .unwrap();
    let a = instance.get_global(&store, "a").unwrap();
    let b = instance.get_global(&store, "b").unwrap();
    assert_eq!(a.get(&store), Val::I32(7));
    assert_eq!(b.get(&store), Val::I32(5));

    let err = linker
        .instantiate(&mut store, &alias_module(&engine, true))
        .unwrap_err();
    assert!(
        matches!(err, Error::Link(LinkError::UnresolvedGlobal { global: 4, target: 5 })),
        "{err}"
    );
}

fn data_module(engine: &Engine, pages: u32) -> Module {
    let bytes = ModuleBytes::new()
        .memory(pages, pages, true)
        .data(&[(100, &[0xab; 50])])
        .finish();
    Module::from_bytes(engine, &bytes).unwrap()
}

#[test_log::test]
fn data_segment_bounds() {
    let mut config = Config::new();
    config.page_size_log2(3);
    let engine = Engine::new(&config);
    let mut store = Store::new(&engine);

    // 15 pages of 8 bytes
    let err = Instance::new(&mut store, &data_module(&engine, 15), &[]).unwrap_err();
    assert!(
        matches!(
            err,
            Error::Link(LinkError::SegmentOutOfBounds {
                kind: "data",
                index: 0,
                offset: 100,
                size: 50,
                len: 120,
            })
        ),
        "{err}"
    );

    let instance = Instance::new(&mut store, &data_module(&engine, 25), &[]).unwrap();
    let memory = instance.get_memory(&store, "memory").unwrap();
    let data = memory.data(&store);
    assert_eq!(data.len(), 200);
    assert!(data[..100].iter().all(|b| *b == 0));
    assert!(data[100..150].iter().all(|b| *b == 0xab));
    assert!(data[150..].iter().all(|b| *b == 0));
}

#[test]
fn engines_must_match() {
    let _trace = common::trace();

    let module = data_module(&Engine::default(), 1);
    let mut store = Store::new(&Engine::default());
    let err = Instance::new(&mut store, &module, &[]).unwrap_err();
    assert!(matches!(err, Error::Link(LinkError::EngineMismatch)));
}
