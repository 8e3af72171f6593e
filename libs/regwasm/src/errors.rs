// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use core::fmt;

use crate::trap::Trap;
use crate::{FuncType, ValueType};

#[derive(Debug, onlyerror::Error)]
pub enum Error {
    #[error("failed to decode module: {0}")]
    Decode(#[from] regwasm_reader::Error),
    #[error("{0}")]
    Compile(#[from] CompileError),
    #[error("failed to link module: {0}")]
    Link(#[from] LinkError),
    #[error("wasm trap: {0}")]
    Trap(#[from] Trap),
    #[error("arguments do not match the function signature {expected}")]
    ArgumentMismatch { expected: FuncType },
}

/// A position in the module's bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Location {
    pub offset: usize,
    pub size: usize,
}

/// The module is well-formed but invalid: a type error, an out-of-range
/// index or a violated module-level constraint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileError {
    message: String,
    location: Option<Location>,
    function: Option<String>,
}

#[derive(Debug, onlyerror::Error)]
pub enum LinkError {
    #[error("module was compiled with a different engine")]
    EngineMismatch,
    #[error("missing {kind} import {module}::{field}")]
    MissingImport {
        kind: &'static str,
        module: String,
        field: String,
    },
    #[error("import {module}::{field} must be a {expected}, found a {found}")]
    ImportKindMismatch {
        module: String,
        field: String,
        expected: &'static str,
        found: &'static str,
    },
    #[error("function import {module}::{field} has signature {found}, expected {expected}")]
    SignatureMismatch {
        module: String,
        field: String,
        expected: FuncType,
        found: FuncType,
    },
    #[error("global import {module}::{field} has type {found}, expected {expected}")]
    GlobalTypeMismatch {
        module: String,
        field: String,
        expected: ValueType,
        found: ValueType,
    },
    #[error("global import {module}::{field} must be immutable")]
    MutableGlobalImport { module: String, field: String },
    #[error("imported {kind} has {actual} initial entries, the module requires at least {required}")]
    ImportTooSmall {
        kind: &'static str,
        actual: u32,
        required: u32,
    },
    #[error("imported {kind} may grow beyond the maximum declared by the module")]
    ImportMaximumTooLarge { kind: &'static str },
    #[error(
        "{kind} segment {index} at offset {offset} with {size} entries does not fit into {len} entries"
    )]
    SegmentOutOfBounds {
        kind: &'static str,
        index: usize,
        offset: u32,
        size: usize,
        len: usize,
    },
    #[error("invalid {kind} limits: minimum {min}, maximum {max:?}")]
    InvalidLimits {
        kind: &'static str,
        min: u32,
        max: Option<u32>,
    },
    #[error("module declares {expected} imports, {actual} were provided")]
    ImportCountMismatch { expected: usize, actual: usize },
    #[error("global {global} aliases global {target} which is not initialized yet")]
    UnresolvedGlobal { global: u32, target: u32 },
    #[error("Name {module}::{field} is already defined")]
    AlreadyDefined { module: String, field: String },
}

// ===== impl CompileError =====

impl CompileError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            location: None,
            function: None,
        }
    }

    #[must_use]
    pub fn with_location(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }

    /// Attributes the error to a function, unless it already is.
    #[must_use]
    pub fn in_function(mut self, name: &str) -> Self {
        if self.function.is_none() {
            self.function = Some(name.into());
        }
        self
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn location(&self) -> Option<Location> {
        self.location
    }

    pub fn function(&self) -> Option<&str> {
        self.function.as_deref()
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "compile error")?;
        if let Some(function) = &self.function {
            write!(f, " in function {function}")?;
        }
        if let Some(location) = self.location {
            write!(f, " at offset {}", location.offset)?;
        }
        write!(f, ": {}", self.message)
    }
}

impl core::error::Error for CompileError {}

impl From<regwasm_reader::Error> for CompileError {
    fn from(err: regwasm_reader::Error) -> Self {
        Self::new(err.to_string())
    }
}
