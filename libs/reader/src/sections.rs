// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use core::ops::Range;

use crate::binary_reader::BinaryReader;
use crate::code::FunctionBody;
use crate::types::{FuncType, ValueType};
use crate::vec_reader::{FromReader, VecReader};
use crate::Error;

/// Known sections, declared in the order they must appear in a module.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SectionId {
    Memory,
    Signatures,
    ImportTable,
    FunctionSignatures,
    FunctionTable,
    ExportTable,
    StartFunction,
    FunctionBodies,
    DataSegments,
    Names,
    End,
}

impl SectionId {
    pub const COUNT: usize = 11;

    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "memory" => Self::Memory,
            "signatures" => Self::Signatures,
            "import_table" => Self::ImportTable,
            "function_signatures" => Self::FunctionSignatures,
            "function_table" => Self::FunctionTable,
            "export_table" => Self::ExportTable,
            "start_function" => Self::StartFunction,
            "function_bodies" => Self::FunctionBodies,
            "data_segments" => Self::DataSegments,
            "names" => Self::Names,
            "end" => Self::End,
            _ => return None,
        })
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Signatures => "signatures",
            Self::ImportTable => "import_table",
            Self::FunctionSignatures => "function_signatures",
            Self::FunctionTable => "function_table",
            Self::ExportTable => "export_table",
            Self::StartFunction => "start_function",
            Self::FunctionBodies => "function_bodies",
            Self::DataSegments => "data_segments",
            Self::Names => "names",
            Self::End => "end",
        }
    }

    /// The section that must have been read before this one, if any.
    pub const fn precedent(self) -> Option<Self> {
        match self {
            Self::ImportTable | Self::FunctionSignatures => Some(Self::Signatures),
            Self::FunctionTable
            | Self::ExportTable
            | Self::StartFunction
            | Self::FunctionBodies
            | Self::Names => Some(Self::FunctionSignatures),
            Self::Memory | Self::Signatures | Self::DataSegments | Self::End => None,
        }
    }

    /// Sections that are skipped unless auxiliary decoding is enabled.
    pub const fn is_auxiliary(self) -> bool {
        matches!(self, Self::ImportTable | Self::StartFunction | Self::Names)
    }

    const fn index(self) -> usize {
        self as usize
    }
}

/// The decoded contents of one section.
#[derive(Debug)]
pub enum Payload<'a> {
    Memory(MemorySection),
    Signatures(VecReader<'a, FuncType>),
    ImportTable(VecReader<'a, Import<'a>>),
    FunctionSignatures(VecReader<'a, u32>),
    FunctionTable(VecReader<'a, u32>),
    ExportTable(VecReader<'a, Export<'a>>),
    StartFunction(u32),
    FunctionBodies(VecReader<'a, FunctionBody<'a>>),
    DataSegments(VecReader<'a, DataSegment<'a>>),
    Names(VecReader<'a, FunctionNames<'a>>),
    /// A section with an unknown id, or an auxiliary section that was not requested.
    Skipped { name: &'a str, range: Range<usize> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemorySection {
    pub min_pages: u32,
    pub max_pages: u32,
    pub exported: bool,
}

#[derive(Debug, Clone)]
pub struct Import<'a> {
    pub module: &'a str,
    pub field: &'a str,
    pub kind: ImportKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportKind {
    Function(u32),
    Table,
    Memory,
    Global(ValueType),
}

#[derive(Debug, Clone)]
pub struct Export<'a> {
    pub func_index: u32,
    pub name: &'a str,
}

#[derive(Debug, Clone)]
pub struct DataSegment<'a> {
    pub offset: u32,
    pub data: &'a [u8],
}

#[derive(Debug, Clone)]
pub struct FunctionNames<'a> {
    pub name: &'a str,
    pub locals: Vec<&'a str>,
}

impl<'a> FromReader<'a> for Import<'a> {
    fn from_reader(reader: &mut BinaryReader<'a>) -> crate::Result<Self> {
        let kind = reader.read_u8()?;
        let module = reader.read_str()?;
        let field = reader.read_str()?;
        let kind = match kind {
            0x00 => ImportKind::Function(reader.read_var_u32()?),
            0x01 => ImportKind::Table,
            0x02 => ImportKind::Memory,
            0x03 => ImportKind::Global(reader.read_value_type()?),
            _ => return Err(Error::UnknownImportKind(kind)),
        };
        Ok(Self {
            module,
            field,
            kind,
        })
    }
}

impl<'a> FromReader<'a> for Export<'a> {
    fn from_reader(reader: &mut BinaryReader<'a>) -> crate::Result<Self> {
        Ok(Self {
            func_index: reader.read_var_u32()?,
            name: reader.read_str()?,
        })
    }
}

impl<'a> FromReader<'a> for DataSegment<'a> {
    fn from_reader(reader: &mut BinaryReader<'a>) -> crate::Result<Self> {
        let offset = reader.read_var_u32()?;
        let len = reader.read_size()?;
        let data = reader.read_bytes(len)?;
        Ok(Self { offset, data })
    }
}

impl<'a> FromReader<'a> for FunctionNames<'a> {
    fn from_reader(reader: &mut BinaryReader<'a>) -> crate::Result<Self> {
        let name = reader.read_str()?;
        let count = reader.read_var_u32()?;
        let locals = (0..count)
            .map(|_| reader.read_str())
            .collect::<crate::Result<_>>()?;
        Ok(Self { name, locals })
    }
}

/// Iterator over the sections of a module.
///
/// Enforces the canonical section order, section precedents and the presence
/// of required sections. Iteration stops at the `end` section, at the end of
/// input, or after the first error.
pub struct SectionsIter<'a> {
    reader: BinaryReader<'a>,
    decode_auxiliary: bool,
    seen: [bool; SectionId::COUNT],
    last: Option<SectionId>,
    done: bool,
}

impl<'a> SectionsIter<'a> {
    pub(crate) fn new(reader: BinaryReader<'a>, decode_auxiliary: bool) -> Self {
        Self {
            reader,
            decode_auxiliary,
            seen: [false; SectionId::COUNT],
            last: None,
            done: false,
        }
    }

    fn read_section(&mut self) -> crate::Result<Option<Payload<'a>>> {
        let start = self.reader.original_position();
        let size = self.reader.read_size()?;
        if self.reader.ensure_bytes(size).is_err() {
            return Err(Error::SectionOutOfBounds {
                offset: start,
                size,
            });
        }

        let body_offset = self.reader.original_position();
        let body = self.reader.read_bytes(size)?;
        let mut reader = BinaryReader::new_with_offset(body, body_offset);
        let name = reader.read_str()?;
        let range = reader.original_position()..body_offset + size;

        let Some(id) = SectionId::from_name(name) else {
            log::debug!("Skipping unknown section {name:?} ({} bytes)", range.len());
            return Ok(Some(Payload::Skipped { name, range }));
        };

        self.check_order(id)?;

        if id.is_auxiliary() && !self.decode_auxiliary {
            log::debug!("Skipping {} section", id.name());
            return Ok(Some(Payload::Skipped { name, range }));
        }

        log::debug!("Parsing {} section...", id.name());
        let section = id.name();
        let payload = match id {
            SectionId::Memory => {
                let memory = MemorySection {
                    min_pages: reader.read_var_u32()?,
                    max_pages: reader.read_var_u32()?,
                    exported: reader.read_u8()? != 0,
                };
                reader.ensure_end(section)?;
                Payload::Memory(memory)
            }
            SectionId::Signatures => Payload::Signatures(VecReader::new(reader, section)?),
            SectionId::ImportTable => Payload::ImportTable(VecReader::new(reader, section)?),
            SectionId::FunctionSignatures => {
                Payload::FunctionSignatures(VecReader::new(reader, section)?)
            }
            SectionId::FunctionTable => Payload::FunctionTable(VecReader::new(reader, section)?),
            SectionId::ExportTable => Payload::ExportTable(VecReader::new(reader, section)?),
            SectionId::StartFunction => {
                let index = reader.read_var_u32()?;
                reader.ensure_end(section)?;
                Payload::StartFunction(index)
            }
            SectionId::FunctionBodies => {
                Payload::FunctionBodies(VecReader::new(reader, section)?)
            }
            SectionId::DataSegments => Payload::DataSegments(VecReader::new(reader, section)?),
            SectionId::Names => Payload::Names(VecReader::new(reader, section)?),
            SectionId::End => {
                log::debug!("Reached end section");
                return Ok(None);
            }
        };

        Ok(Some(payload))
    }

    fn check_order(&mut self, id: SectionId) -> crate::Result<()> {
        if self.seen[id.index()] {
            return Err(Error::DuplicateSection(id.name()));
        }
        if let Some(last) = self.last.filter(|last| id < *last) {
            return Err(Error::SectionOutOfOrder {
                section: id.name(),
                after: last.name(),
            });
        }
        if let Some(precedent) = id
            .precedent()
            .filter(|precedent| !self.seen[precedent.index()])
        {
            return Err(Error::MissingPrecedent {
                section: id.name(),
                precedent: precedent.name(),
            });
        }

        self.seen[id.index()] = true;
        self.last = Some(id);
        Ok(())
    }

    fn finish(&self) -> crate::Result<()> {
        if self.seen[SectionId::FunctionSignatures.index()]
            && !self.seen[SectionId::FunctionBodies.index()]
        {
            return Err(Error::MissingSection(SectionId::FunctionBodies.name()));
        }
        Ok(())
    }
}

impl<'a> Iterator for SectionsIter<'a> {
    type Item = crate::Result<Payload<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        if self.reader.eof() {
            self.done = true;
            return self.finish().err().map(Err);
        }

        match self.read_section() {
            Ok(Some(payload)) => Some(Ok(payload)),
            Ok(None) => {
                self.done = true;
                self.finish().err().map(Err)
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}
