// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use core::fmt;
use core::marker::PhantomData;

use crate::binary_reader::BinaryReader;

/// Types that can be decoded from a [`BinaryReader`].
pub trait FromReader<'a>: Sized {
    fn from_reader(reader: &mut BinaryReader<'a>) -> crate::Result<Self>;
}

impl<'a> FromReader<'a> for u32 {
    fn from_reader(reader: &mut BinaryReader<'a>) -> crate::Result<Self> {
        reader.read_var_u32()
    }
}

/// A lazily decoded, count-prefixed vector of section entries.
///
/// Iterating yields each entry in turn; once the announced count has been
/// read the section must be fully consumed, trailing bytes are an error.
#[derive(Clone)]
pub struct VecReader<'a, T> {
    reader: BinaryReader<'a>,
    count: u32,
    section: &'static str,
    _m: PhantomData<T>,
}

impl<'a, T: FromReader<'a>> VecReader<'a, T> {
    pub(crate) fn new(mut reader: BinaryReader<'a>, section: &'static str) -> crate::Result<Self> {
        let count = reader.read_var_u32()?;
        // every entry occupies at least one byte
        let remaining = reader.remaining_bytes().len();
        if !usize::try_from(count).is_ok_and(|count| count <= remaining) {
            return Err(crate::Error::CountTooLarge {
                section,
                count,
                remaining,
            });
        }

        Ok(Self {
            reader,
            count,
            section,
            _m: PhantomData,
        })
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn original_position(&self) -> usize {
        self.reader.original_position()
    }
}

impl<'a, T: FromReader<'a>> IntoIterator for VecReader<'a, T> {
    type Item = crate::Result<T>;
    type IntoIter = VecIter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        VecIter {
            remaining: self.count,
            reader: self.reader,
            section: self.section,
            done: false,
            _m: PhantomData,
        }
    }
}

impl<T> fmt::Debug for VecReader<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VecReader")
            .field("section", &self.section)
            .field("count", &self.count)
            .finish_non_exhaustive()
    }
}

pub struct VecIter<'a, T> {
    reader: BinaryReader<'a>,
    remaining: u32,
    section: &'static str,
    done: bool,
    _m: PhantomData<T>,
}

impl<'a, T: FromReader<'a>> Iterator for VecIter<'a, T> {
    type Item = crate::Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        if self.remaining == 0 {
            self.done = true;
            return self.reader.ensure_end(self.section).err().map(Err);
        }

        self.remaining -= 1;
        let res = T::from_reader(&mut self.reader);
        self.done = res.is_err();
        Some(res)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = usize::try_from(self.remaining).unwrap_or(usize::MAX);
        (0, Some(remaining.saturating_add(1)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn yields_entries_then_checks_trailing_bytes() {
        let bytes = [0x02, 0x05, 0x80, 0x01];
        let reader = VecReader::<u32>::new(BinaryReader::new(&bytes), "test").unwrap();
        assert_eq!(reader.count(), 2);
        let entries = reader.into_iter().collect::<crate::Result<Vec<_>>>().unwrap();
        assert_eq!(entries, [5, 128]);

        let bytes = [0x01, 0x05, 0xff];
        let reader = VecReader::<u32>::new(BinaryReader::new(&bytes), "test").unwrap();
        let mut iter = reader.into_iter();
        assert_eq!(iter.next().unwrap().unwrap(), 5);
        assert!(matches!(
            iter.next(),
            Some(Err(Error::SectionSizeMismatch { trailing: 1, .. }))
        ));
        assert!(iter.next().is_none());
    }

    #[test]
    fn count_bounded_by_remaining_bytes() {
        let bytes = [0xff, 0xff, 0xff, 0xff, 0x0f];
        let err = VecReader::<u32>::new(BinaryReader::new(&bytes), "test").unwrap_err();
        assert!(matches!(
            err,
            Error::CountTooLarge {
                section: "test",
                count: u32::MAX,
                remaining: 0,
            }
        ));

        let bytes = [0x03, 0x01, 0x02];
        assert!(VecReader::<u32>::new(BinaryReader::new(&bytes), "test").is_err());
    }

    #[test]
    fn stops_after_error() {
        let bytes = [0x02, 0x05, 0x80];
        let reader = VecReader::<u32>::new(BinaryReader::new(&bytes), "test").unwrap();
        let mut iter = reader.into_iter();
        assert!(iter.next().unwrap().is_ok());
        assert!(iter.next().unwrap().is_err());
        assert!(iter.next().is_none());
    }
}
