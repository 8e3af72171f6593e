// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

pub const MAX_WASM_STRING_SIZE: usize = 100_000;
pub const MAX_WASM_FUNCTION_PARAMS: usize = 1000;
pub const MAX_WASM_FUNCTION_LOCALS: u32 = 50_000;
pub const MAX_WASM_BR_TABLE_SIZE: usize = 1 << 16;
pub const MAX_WASM_DATA_SEGMENTS: u32 = 100_000;
pub const MAX_WASM_ELEMENT_SEGMENTS: u32 = 100_000;
