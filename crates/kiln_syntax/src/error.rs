//! Error types for heap construction, schema registration and the record codec.

/// Low-level failures while reading the binary form.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// The input ended in the middle of a value.
    #[error("unexpected end of input")]
    UnexpectedEof,

    /// A LEB128 varint was longer than ten bytes or had a stray continuation bit.
    #[error("invalid LEB128 varint")]
    InvalidVarint,

    /// A varint decoded correctly but does not fit the field it was read into.
    #[error("value {value} does not fit in a {field}")]
    OutOfRange {
        /// The decoded value.
        value: u64,
        /// The field the value was read for (e.g. "opcode").
        field: &'static str,
    },

    /// A text payload was not valid UTF-8.
    #[error("invalid UTF-8 in text payload")]
    InvalidUtf8,

    /// A constant carried a data-kind tag outside the known set.
    #[error("unknown data kind tag {tag}")]
    UnknownDataKind {
        /// The tag that was read.
        tag: u8,
    },

    /// A boolean constant was encoded as something other than 0 or 1.
    #[error("invalid boolean byte {byte:#04x}")]
    InvalidBoolean {
        /// The byte that was read.
        byte: u8,
    },

    /// A pool listed the same entry twice.
    #[error("duplicate entry at index {index} of the {pool} pool")]
    DuplicatePoolEntry {
        /// The pool holding the duplicate.
        pool: &'static str,
        /// Index of the second occurrence.
        index: usize,
    },

    /// Bytes remained after the last record.
    #[error("{count} trailing bytes after last record")]
    TrailingBytes {
        /// Number of unread bytes.
        count: usize,
    },
}

/// Errors raised by heaps, schemas and the heap codec.
///
/// All of these are structural: the operation that produced one is aborted
/// and nothing is retried.
#[derive(Debug, thiserror::Error)]
pub enum SyntaxError {
    /// An item was offered to a heap other than the one that already owns it.
    #[error("item with opcode {opcode} is already allocated to a different heap")]
    AllocationConflict {
        /// Opcode of the offending item.
        opcode: u16,
    },

    /// An item's heap index was requested before the item was allocated.
    #[error("item with opcode {opcode} is not allocated to a heap")]
    NotAllocated {
        /// Opcode of the offending item.
        opcode: u16,
    },

    /// A record or set of record fields disagrees with its schema.
    #[error("malformed record for opcode {opcode}: {reason}")]
    MalformedRecord {
        /// Opcode of the record.
        opcode: u16,
        /// What was wrong with it.
        reason: String,
    },

    /// No schema is registered for an opcode.
    #[error("no schema registered for opcode {opcode}")]
    UnknownOpcode {
        /// The unregistered opcode.
        opcode: u16,
    },

    /// A second schema was registered for an opcode.
    #[error("schema for opcode {opcode} registered twice")]
    DuplicateSchema {
        /// The opcode registered twice.
        opcode: u16,
    },

    /// A schema cannot be used with the layout it was declared with.
    #[error("invalid schema for opcode {opcode}: {reason}")]
    InvalidSchema {
        /// The opcode the schema was registered for.
        opcode: u16,
        /// Why the schema was rejected.
        reason: String,
    },

    /// An in-memory item has no representation under its schema.
    #[error("item with opcode {opcode} cannot be encoded: {reason}")]
    Unrepresentable {
        /// Opcode of the item.
        opcode: u16,
        /// Why it cannot be encoded.
        reason: String,
    },

    /// A pool grew past the range of a 32-bit index.
    #[error("{pool} pool exceeds the 32-bit index range")]
    PoolOverflow {
        /// Which pool overflowed.
        pool: &'static str,
    },

    /// The encoded heap has a missing or unsupported header.
    #[error("invalid heap header: {reason}")]
    InvalidHeader {
        /// Description of the header problem.
        reason: String,
    },

    /// The body checksum stored in the header does not match the body.
    #[error("checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// Checksum recorded in the header.
        expected: String,
        /// Checksum computed from the body.
        actual: String,
    },

    /// The header could not be serialized or deserialized.
    #[error("serialization error: {reason}")]
    Serialization {
        /// Description of the failure.
        reason: String,
    },

    /// The binary form could not be read.
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

impl SyntaxError {
    pub(crate) fn malformed(opcode: u16, reason: impl Into<String>) -> Self {
        Self::MalformedRecord {
            opcode,
            reason: reason.into(),
        }
    }

    pub(crate) fn unrepresentable(opcode: u16, reason: impl Into<String>) -> Self {
        Self::Unrepresentable {
            opcode,
            reason: reason.into(),
        }
    }
}
