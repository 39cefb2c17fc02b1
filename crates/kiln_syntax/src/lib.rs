//! The syntactic item heap shared by every Kiln front end and back end.
//!
//! A [`SyntacticItem`] is an opcode, an ordered list of child references and an
//! optional [`Data`] payload. Items compare, hash and order purely by structure,
//! so they can be deduplicated and written out deterministically. Items live in
//! an append-only [`SyntacticHeap`] which assigns each one a stable index, and a
//! [`SchemaRegistry`] describes how every opcode maps onto the flat record form
//! read and written by [`codec`].

#![warn(missing_docs)]

pub mod checksum;
pub mod codec;
pub mod data;
pub mod error;
pub mod heap;
pub mod item;
pub mod leb128;
pub mod pool;
pub mod record;
pub mod schema;

pub use checksum::Checksum;
pub use codec::{read_heap, write_heap};
pub use data::{Data, DataKind};
pub use error::{DecodeError, SyntaxError};
pub use heap::SyntacticHeap;
pub use item::{HeapId, ItemRef, SyntacticItem};
pub use pool::Pools;
pub use record::{decode_record, encode_record, Record};
pub use schema::{Arity, Extra, ExtraKind, ExtraValue, Fields, Schema, SchemaRegistry};
