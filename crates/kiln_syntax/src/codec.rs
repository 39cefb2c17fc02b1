//! Whole-heap serialization.
//!
//! An encoded heap is a 4-byte little-endian header length, a bincode
//! [`HeapHeader`] (magic, format version and body checksum), then the body:
//! the [`Pools`], the item count, and one record per item in index order.
//! Item `i` of the decoded heap comes from record `i`.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::checksum::Checksum;
use crate::error::{DecodeError, SyntaxError};
use crate::heap::SyntacticHeap;
use crate::item::{ItemRef, SyntacticItem};
use crate::leb128;
use crate::pool::Pools;
use crate::record::{decode_record, encode_record, Record};
use crate::schema::{Extra, ExtraValue, Fields, SchemaRegistry};

/// Magic bytes identifying an encoded heap.
const HEAP_MAGIC: [u8; 4] = *b"KSYN";

/// Current heap format version. Increment on breaking changes to the
/// header, pool or record layout.
const HEAP_FORMAT_VERSION: u32 = 1;

/// Header prepended to every encoded heap.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeapHeader {
    /// Magic bytes: must be `b"KSYN"`.
    pub magic: [u8; 4],
    /// Heap format version.
    pub format_version: u32,
    /// Checksum of the body.
    pub checksum: Checksum,
}

/// Encodes every item of `heap`.
///
/// Every operand of every item must itself belong to `heap`; an operand that
/// is detached fails with [`SyntaxError::NotAllocated`] and one owned by
/// another heap with [`SyntaxError::AllocationConflict`].
pub fn write_heap(heap: &SyntacticHeap, registry: &SchemaRegistry) -> Result<Vec<u8>, SyntaxError> {
    let mut pools = Pools::new();
    let mut records = Vec::with_capacity(heap.len());
    for (_, item) in heap.iter() {
        let fields = registry.get(item.opcode())?.deconstruct(item)?;
        records.push(Record {
            opcode: item.opcode(),
            operands: heap_refs(heap, &fields.operands)?,
            blocks: heap_refs(heap, &fields.blocks)?,
            extras: fields
                .extras
                .iter()
                .map(|extra| pool_extra(heap, &mut pools, extra))
                .collect::<Result<_, _>>()?,
        });
    }

    let mut body = Vec::new();
    pools.write(&mut body);
    leb128::write_len(&mut body, records.len());
    for record in &records {
        encode_record(record, registry, &mut body)?;
    }

    let bytes = seal(&body)?;
    debug!(items = records.len(), bytes = bytes.len(), "encoded heap");
    Ok(bytes)
}

/// Decodes a heap written by [`write_heap`] with the same registry.
///
/// Records may refer to items at any index, including later ones. A record
/// that refers to itself, directly or through other records, is malformed.
pub fn read_heap(bytes: &[u8], registry: &SchemaRegistry) -> Result<SyntacticHeap, SyntaxError> {
    let body = unseal(bytes)?;

    let mut offset = 0;
    let pools = Pools::read(body, &mut offset)?;
    let count = leb128::read_len(body, &mut offset, 1)?;
    let records = (0..count)
        .map(|_| decode_record(body, &mut offset, registry))
        .collect::<Result<Vec<_>, _>>()?;
    if offset != body.len() {
        return Err(DecodeError::TrailingBytes {
            count: body.len() - offset,
        }
        .into());
    }

    let mut resolver = Resolver {
        records: &records,
        pools: &pools,
        registry,
        slots: vec![Slot::Pending; records.len()],
    };
    let mut heap = SyntacticHeap::new();
    for (index, record) in records.iter().enumerate() {
        let item = resolver.resolve(index, record.opcode)?;
        heap.push(item)?;
    }
    debug!(items = heap.len(), bytes = bytes.len(), "decoded heap");
    Ok(heap)
}

fn seal(body: &[u8]) -> Result<Vec<u8>, SyntaxError> {
    let header = HeapHeader {
        magic: HEAP_MAGIC,
        format_version: HEAP_FORMAT_VERSION,
        checksum: Checksum::of(body),
    };
    let header_bytes = bincode::serde::encode_to_vec(&header, bincode::config::standard())
        .map_err(|e| SyntaxError::Serialization {
            reason: e.to_string(),
        })?;

    let header_len = u32::try_from(header_bytes.len()).map_err(|_| SyntaxError::InvalidHeader {
        reason: "header too large".to_string(),
    })?;
    let mut output = Vec::with_capacity(4 + header_bytes.len() + body.len());
    output.extend_from_slice(&header_len.to_le_bytes());
    output.extend_from_slice(&header_bytes);
    output.extend_from_slice(body);
    Ok(output)
}

fn unseal(bytes: &[u8]) -> Result<&[u8], SyntaxError> {
    let invalid = |reason: &str| SyntaxError::InvalidHeader {
        reason: reason.to_string(),
    };
    if bytes.len() < 4 {
        return Err(invalid("missing header length"));
    }
    let (len_bytes, rest) = bytes.split_at(4);
    let header_len = u32::from_le_bytes([len_bytes[0], len_bytes[1], len_bytes[2], len_bytes[3]]) as usize;
    if rest.len() < header_len {
        return Err(invalid("truncated header"));
    }
    let (header_bytes, body) = rest.split_at(header_len);

    let (header, _): (HeapHeader, usize) =
        bincode::serde::decode_from_slice(header_bytes, bincode::config::standard()).map_err(
            |e| SyntaxError::Serialization {
                reason: e.to_string(),
            },
        )?;
    if header.magic != HEAP_MAGIC {
        return Err(invalid("bad magic bytes"));
    }
    if header.format_version != HEAP_FORMAT_VERSION {
        return Err(SyntaxError::InvalidHeader {
            reason: format!(
                "unsupported format version {} (expected {HEAP_FORMAT_VERSION})",
                header.format_version
            ),
        });
    }
    if !header.checksum.verifies(body) {
        return Err(SyntaxError::ChecksumMismatch {
            expected: header.checksum.to_string(),
            actual: Checksum::of(body).to_string(),
        });
    }
    Ok(body)
}

fn heap_ref(heap: &SyntacticHeap, item: &SyntacticItem) -> Result<u32, SyntaxError> {
    if !heap.owns(item) {
        return Err(if item.is_allocated() {
            SyntaxError::AllocationConflict {
                opcode: item.opcode(),
            }
        } else {
            SyntaxError::NotAllocated {
                opcode: item.opcode(),
            }
        });
    }
    let index = item.index()?;
    u32::try_from(index).map_err(|_| SyntaxError::PoolOverflow { pool: "heap" })
}

fn heap_refs(heap: &SyntacticHeap, items: &[ItemRef]) -> Result<Vec<u32>, SyntaxError> {
    items.iter().map(|item| heap_ref(heap, item)).collect()
}

fn pool_extra(
    heap: &SyntacticHeap,
    pools: &mut Pools,
    extra: &ExtraValue,
) -> Result<Extra, SyntaxError> {
    Ok(match extra {
        ExtraValue::String(s) => Extra::String(pools.intern_string(s)?),
        ExtraValue::Name(s) => Extra::Name(pools.intern_name(s)?),
        ExtraValue::Constant(value) => Extra::Constant(pools.intern_constant(value)?),
        ExtraValue::Type(item) => Extra::Type(pools.intern_type(heap_ref(heap, item)?)?),
        ExtraValue::StringArray(strings) => Extra::StringArray(
            strings
                .iter()
                .map(|s| pools.intern_string(s))
                .collect::<Result<_, _>>()?,
        ),
        ExtraValue::SwitchArray(cases) => Extra::SwitchArray(
            cases
                .iter()
                .map(|case| {
                    case.iter()
                        .map(|c| pools.intern_constant(c))
                        .collect::<Result<Vec<_>, _>>()
                })
                .collect::<Result<_, _>>()?,
        ),
    })
}

#[derive(Clone)]
enum Slot {
    Pending,
    InProgress,
    Done(ItemRef),
}

/// A record whose references are still being resolved.
struct Frame {
    index: usize,
    references: Vec<u32>,
    next: usize,
}

/// Builds items from decoded records, resolving references on demand.
///
/// Resolution walks an explicit stack, so reference chains of any depth
/// decode without recursion.
struct Resolver<'a> {
    records: &'a [Record],
    pools: &'a Pools,
    registry: &'a SchemaRegistry,
    slots: Vec<Slot>,
}

impl Resolver<'_> {
    /// Returns the item for record `index`; `referrer` is the opcode that
    /// asked for it, used in error reports.
    fn resolve(&mut self, index: usize, referrer: u16) -> Result<ItemRef, SyntaxError> {
        if let Some(Slot::Done(item)) = self.slots.get(index) {
            return Ok(item.clone());
        }
        let mut stack = vec![self.enter(index, referrer)?];
        while let Some(frame) = stack.last_mut() {
            let Some(&next) = frame.references.get(frame.next) else {
                let index = frame.index;
                stack.pop();
                let item = self.build(index)?;
                self.slots[index] = Slot::Done(item);
                continue;
            };
            frame.next += 1;
            let opcode = self.records[frame.index].opcode;
            if !matches!(self.slots.get(next as usize), Some(Slot::Done(_))) {
                let child = self.enter(next as usize, opcode)?;
                stack.push(child);
            }
        }
        self.done(index, referrer)
    }

    /// Marks record `index` in progress and lists the records it refers to.
    fn enter(&mut self, index: usize, referrer: u16) -> Result<Frame, SyntaxError> {
        match self.slots.get(index) {
            None => {
                return Err(SyntaxError::malformed(
                    referrer,
                    format!(
                        "reference to item {index} outside a heap of {} items",
                        self.records.len()
                    ),
                ))
            }
            Some(Slot::InProgress) => {
                return Err(SyntaxError::malformed(
                    referrer,
                    format!("cyclic reference to item {index}"),
                ))
            }
            Some(Slot::Pending | Slot::Done(_)) => {}
        }
        self.slots[index] = Slot::InProgress;

        let record = &self.records[index];
        let types = record.extras.iter().filter_map(|extra| match extra {
            Extra::Type(i) => self.pools.type_item(*i),
            _ => None,
        });
        let references = record
            .operands
            .iter()
            .chain(&record.blocks)
            .copied()
            .chain(types)
            .collect();
        Ok(Frame {
            index,
            references,
            next: 0,
        })
    }

    /// Constructs record `index` once everything it refers to is resolved.
    fn build(&self, index: usize) -> Result<ItemRef, SyntaxError> {
        let record = &self.records[index];
        let opcode = record.opcode;
        let fields = Fields {
            operands: self.done_all(&record.operands, opcode)?,
            blocks: self.done_all(&record.blocks, opcode)?,
            extras: record
                .extras
                .iter()
                .map(|extra| self.extra_value(extra, opcode))
                .collect::<Result<Vec<_>, _>>()?,
        };
        Ok(self.registry.get(opcode)?.construct(opcode, fields)?.into_ref())
    }

    fn done(&self, index: usize, referrer: u16) -> Result<ItemRef, SyntaxError> {
        match self.slots.get(index) {
            Some(Slot::Done(item)) => Ok(item.clone()),
            _ => Err(SyntaxError::malformed(
                referrer,
                format!("item {index} is unresolved"),
            )),
        }
    }

    fn done_all(&self, indices: &[u32], referrer: u16) -> Result<Vec<ItemRef>, SyntaxError> {
        indices
            .iter()
            .map(|&i| self.done(i as usize, referrer))
            .collect()
    }

    fn extra_value(&self, extra: &Extra, opcode: u16) -> Result<ExtraValue, SyntaxError> {
        let pools = self.pools;
        let missing = |pool: &str, i: u32| {
            SyntaxError::malformed(opcode, format!("{pool} pool index {i} out of range"))
        };
        let string = |i: u32| {
            pools
                .string(i)
                .map(str::to_string)
                .ok_or_else(|| missing("string", i))
        };
        let constant = |i: u32| pools.constant(i).cloned().ok_or_else(|| missing("constant", i));

        Ok(match extra {
            Extra::String(i) => ExtraValue::String(string(*i)?),
            Extra::Name(i) => ExtraValue::Name(
                pools
                    .name(*i)
                    .map(str::to_string)
                    .ok_or_else(|| missing("name", *i))?,
            ),
            Extra::Constant(i) => ExtraValue::Constant(constant(*i)?),
            Extra::Type(i) => {
                let index = pools.type_item(*i).ok_or_else(|| missing("type", *i))?;
                ExtraValue::Type(self.done(index as usize, opcode)?)
            }
            Extra::StringArray(indices) => ExtraValue::StringArray(
                indices.iter().map(|&i| string(i)).collect::<Result<_, _>>()?,
            ),
            Extra::SwitchArray(cases) => ExtraValue::SwitchArray(
                cases
                    .iter()
                    .map(|case| case.iter().map(|&i| constant(i)).collect::<Result<Vec<_>, _>>())
                    .collect::<Result<_, _>>()?,
            ),
        })
    }
}
