// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

#![allow(dead_code, reason = "not every test binary uses every helper")]

use regwasm::{FuncType, ValueType};
use regwasm_leb128::Leb128Write;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::util::SubscriberInitExt;

/// Installs a subscriber for the current test, filtered by `RUST_LOG`.
pub fn trace() -> tracing::subscriber::DefaultGuard {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .set_default()
}

/// Encoder for binary modules.
pub struct ModuleBytes(Vec<u8>);

impl ModuleBytes {
    pub fn new() -> Self {
        let mut out = regwasm_reader::WASM_MAGIC.to_le_bytes().to_vec();
        out.extend_from_slice(&regwasm_reader::WASM_VERSION.to_le_bytes());
        Self(out)
    }

    pub fn section(mut self, name: &str, payload: &[u8]) -> Self {
        let mut body = string(name);
        body.extend_from_slice(payload);
        self.0.extend(uleb(body.len() as u64));
        self.0.extend(body);
        self
    }

    /// `min` and `max` in pages.
    pub fn memory(self, min: u32, max: u32, exported: bool) -> Self {
        let mut payload = uleb(u64::from(min));
        payload.extend(uleb(u64::from(max)));
        payload.push(u8::from(exported));
        self.section("memory", &payload)
    }

    pub fn signatures(self, signatures: &[FuncType]) -> Self {
        let items = signatures
            .iter()
            .map(|ty| {
                let mut out = vec![0x40];
                out.extend(uleb(ty.params().len() as u64));
                out.extend(ty.params().iter().map(|ty| ty.to_byte()));
                match ty.result() {
                    Some(result) => out.extend([0x01, result.to_byte()]),
                    None => out.push(0x00),
                }
                out
            })
            .collect::<Vec<_>>();
        self.section("signatures", &vector(&items))
    }

    pub fn function_signatures(self, signatures: &[u32]) -> Self {
        self.section("function_signatures", &indices(signatures))
    }

    pub fn function_table(self, functions: &[u32]) -> Self {
        self.section("function_table", &indices(functions))
    }

    pub fn exports(self, exports: &[(u32, &str)]) -> Self {
        let items = exports
            .iter()
            .map(|(func, name)| {
                let mut out = uleb(u64::from(*func));
                out.extend(string(name));
                out
            })
            .collect::<Vec<_>>();
        self.section("export_table", &vector(&items))
    }

    /// Each body is a list of local declarations and its instruction bytes.
    pub fn bodies(self, bodies: &[(&[(u32, ValueType)], &[u8])]) -> Self {
        let items = bodies
            .iter()
            .map(|(locals, code)| {
                let mut body = uleb(locals.len() as u64);
                for (count, ty) in *locals {
                    body.extend(uleb(u64::from(*count)));
                    body.push(ty.to_byte());
                }
                body.extend_from_slice(code);

                let mut out = uleb(body.len() as u64);
                out.extend(body);
                out
            })
            .collect::<Vec<_>>();
        self.section("function_bodies", &vector(&items))
    }

    pub fn data(self, segments: &[(u32, &[u8])]) -> Self {
        let items = segments
            .iter()
            .map(|(offset, data)| {
                let mut out = uleb(u64::from(*offset));
                out.extend(uleb(data.len() as u64));
                out.extend_from_slice(data);
                out
            })
            .collect::<Vec<_>>();
        self.section("data_segments", &vector(&items))
    }

    pub fn finish(self) -> Vec<u8> {
        self.section("end", &[]).0
    }
}

pub fn uleb(value: u64) -> Vec<u8> {
    let mut out = Vec::new();
    out.write_uleb128(value).unwrap();
    out
}

pub fn sleb(value: i64) -> Vec<u8> {
    let mut out = Vec::new();
    out.write_sleb128(value).unwrap();
    out
}

pub fn string(value: &str) -> Vec<u8> {
    let mut out = uleb(value.len() as u64);
    out.extend_from_slice(value.as_bytes());
    out
}

pub fn vector(items: &[Vec<u8>]) -> Vec<u8> {
    let mut out = uleb(items.len() as u64);
    for item in items {
        out.extend_from_slice(item);
    }
    out
}

fn indices(values: &[u32]) -> Vec<u8> {
    let items = values
        .iter()
        .map(|value| uleb(u64::from(*value)))
        .collect::<Vec<_>>();
    vector(&items)
}

/// `i32.const value`
pub fn i32_const(value: i32) -> Vec<u8> {
    let mut out = vec![0x41];
    out.extend(sleb(i64::from(value)));
    out
}
