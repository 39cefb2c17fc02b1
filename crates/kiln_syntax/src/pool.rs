//! Interning pools referenced by record extras.
//!
//! Strings, names, constants and types are stored once per encoded heap and
//! referred to by dense 32-bit indices. Indices follow first-insertion order.

use indexmap::IndexSet;

use crate::data::Data;
use crate::error::{DecodeError, SyntaxError};
use crate::leb128;

/// The four pools written ahead of the records of an encoded heap.
///
/// The type pool holds heap indices of type items, so a `TypePoolRef` extra
/// resolves first to a heap index and then to an item.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Pools {
    strings: IndexSet<String>,
    names: IndexSet<String>,
    constants: IndexSet<Data>,
    types: IndexSet<u32>,
}

fn pool_index(index: usize, pool: &'static str) -> Result<u32, SyntaxError> {
    u32::try_from(index).map_err(|_| SyntaxError::PoolOverflow { pool })
}

impl Pools {
    /// Creates empty pools.
    pub fn new() -> Self {
        Self::default()
    }

    /// Interns a string and returns its index.
    pub fn intern_string(&mut self, s: &str) -> Result<u32, SyntaxError> {
        let index = match self.strings.get_index_of(s) {
            Some(index) => index,
            None => self.strings.insert_full(s.to_string()).0,
        };
        pool_index(index, "string")
    }

    /// Interns a name and returns its index.
    pub fn intern_name(&mut self, s: &str) -> Result<u32, SyntaxError> {
        let index = match self.names.get_index_of(s) {
            Some(index) => index,
            None => self.names.insert_full(s.to_string()).0,
        };
        pool_index(index, "name")
    }

    /// Interns a constant and returns its index.
    pub fn intern_constant(&mut self, value: &Data) -> Result<u32, SyntaxError> {
        let index = match self.constants.get_index_of(value) {
            Some(index) => index,
            None => self.constants.insert_full(value.clone()).0,
        };
        pool_index(index, "constant")
    }

    /// Interns the heap index of a type item and returns its pool index.
    pub fn intern_type(&mut self, heap_index: u32) -> Result<u32, SyntaxError> {
        let (index, _) = self.types.insert_full(heap_index);
        pool_index(index, "type")
    }

    /// Returns the string at `index`.
    pub fn string(&self, index: u32) -> Option<&str> {
        self.strings.get_index(index as usize).map(String::as_str)
    }

    /// Returns the name at `index`.
    pub fn name(&self, index: u32) -> Option<&str> {
        self.names.get_index(index as usize).map(String::as_str)
    }

    /// Returns the constant at `index`.
    pub fn constant(&self, index: u32) -> Option<&Data> {
        self.constants.get_index(index as usize)
    }

    /// Returns the heap index stored at type pool `index`.
    pub fn type_item(&self, index: u32) -> Option<u32> {
        self.types.get_index(index as usize).copied()
    }

    /// Returns the sizes of the string, name, constant and type pools.
    pub fn sizes(&self) -> [usize; 4] {
        [
            self.strings.len(),
            self.names.len(),
            self.constants.len(),
            self.types.len(),
        ]
    }

    pub(crate) fn write(&self, out: &mut Vec<u8>) {
        leb128::write_len(out, self.strings.len());
        for s in &self.strings {
            leb128::write_str(out, s);
        }
        leb128::write_len(out, self.names.len());
        for s in &self.names {
            leb128::write_str(out, s);
        }
        leb128::write_len(out, self.constants.len());
        for c in &self.constants {
            c.write(out);
        }
        leb128::write_len(out, self.types.len());
        for t in &self.types {
            leb128::write_u64(out, u64::from(*t));
        }
    }

    pub(crate) fn read(bytes: &[u8], offset: &mut usize) -> Result<Self, DecodeError> {
        let mut pools = Self::new();
        let count = leb128::read_len(bytes, offset, 1)?;
        for index in 0..count {
            let s = leb128::read_str(bytes, offset)?;
            unique(pools.strings.insert(s), "string", index)?;
        }
        let count = leb128::read_len(bytes, offset, 1)?;
        for index in 0..count {
            let s = leb128::read_str(bytes, offset)?;
            unique(pools.names.insert(s), "name", index)?;
        }
        let count = leb128::read_len(bytes, offset, 2)?;
        for index in 0..count {
            let value = Data::read(bytes, offset)?;
            unique(pools.constants.insert(value), "constant", index)?;
        }
        let count = leb128::read_len(bytes, offset, 1)?;
        for index in 0..count {
            let item = leb128::read_u32(bytes, offset, "type pool entry")?;
            unique(pools.types.insert(item), "type", index)?;
        }
        Ok(pools)
    }
}

/// A repeated entry would shift every later index of its pool.
fn unique(inserted: bool, pool: &'static str, index: usize) -> Result<(), DecodeError> {
    if inserted {
        Ok(())
    } else {
        Err(DecodeError::DuplicatePoolEntry { pool, index })
    }
}
