//! The flat record form of a single item.
//!
//! A record is `[opcode][operand indices][block indices][extras]`, every
//! integer an unsigned LEB128 varint. Operand and block counts are only
//! written for [`Arity::Many`]; fixed arities imply them. Extras follow in the
//! order the schema declares, pool references as bare indices and arrays with
//! a length prefix. Nothing but the opcode is self-describing, so decoding
//! needs the same [`SchemaRegistry`] the record was encoded with.

use crate::error::SyntaxError;
use crate::leb128;
use crate::schema::{Arity, Extra, ExtraKind, SchemaRegistry};

/// One encoded item with its references still as raw indices.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Record {
    /// The item's opcode.
    pub opcode: u16,
    /// Heap indices of the operand children.
    pub operands: Vec<u32>,
    /// Heap indices of the block children.
    pub blocks: Vec<u32>,
    /// Extras in schema order.
    pub extras: Vec<Extra>,
}

fn write_indices(out: &mut Vec<u8>, arity: Arity, indices: &[u32]) {
    if arity == Arity::Many {
        leb128::write_len(out, indices.len());
    }
    for index in indices {
        leb128::write_u64(out, u64::from(*index));
    }
}

fn read_indices(
    bytes: &[u8],
    offset: &mut usize,
    arity: Arity,
    field: &'static str,
) -> Result<Vec<u32>, SyntaxError> {
    let count = match arity.fixed() {
        Some(n) => n,
        None => leb128::read_len(bytes, offset, 1)?,
    };
    (0..count)
        .map(|_| leb128::read_u32(bytes, offset, field).map_err(SyntaxError::from))
        .collect()
}

fn write_u32s(out: &mut Vec<u8>, values: &[u32]) {
    leb128::write_len(out, values.len());
    for v in values {
        leb128::write_u64(out, u64::from(*v));
    }
}

fn read_u32s(bytes: &[u8], offset: &mut usize, field: &'static str) -> Result<Vec<u32>, SyntaxError> {
    let len = leb128::read_len(bytes, offset, 1)?;
    (0..len)
        .map(|_| leb128::read_u32(bytes, offset, field).map_err(SyntaxError::from))
        .collect()
}

/// Appends the encoding of `record` to `out`.
///
/// Fails with [`SyntaxError::MalformedRecord`] if the record's counts or
/// extras disagree with the opcode's schema.
pub fn encode_record(
    record: &Record,
    registry: &SchemaRegistry,
    out: &mut Vec<u8>,
) -> Result<(), SyntaxError> {
    let schema = registry.get(record.opcode)?;
    schema.check_shape(
        record.opcode,
        record.operands.len(),
        record.blocks.len(),
        record.extras.iter().map(Extra::kind),
    )?;

    leb128::write_u64(out, u64::from(record.opcode));
    write_indices(out, schema.operands(), &record.operands);
    write_indices(out, schema.blocks(), &record.blocks);
    for extra in &record.extras {
        match extra {
            Extra::String(i) | Extra::Constant(i) | Extra::Type(i) | Extra::Name(i) => {
                leb128::write_u64(out, u64::from(*i));
            }
            Extra::StringArray(indices) => write_u32s(out, indices),
            Extra::SwitchArray(cases) => {
                leb128::write_len(out, cases.len());
                for case in cases {
                    write_u32s(out, case);
                }
            }
        }
    }
    Ok(())
}

/// Decodes one record starting at `offset`, advancing it past the record.
pub fn decode_record(
    bytes: &[u8],
    offset: &mut usize,
    registry: &SchemaRegistry,
) -> Result<Record, SyntaxError> {
    let opcode = leb128::read_u16(bytes, offset, "opcode")?;
    let schema = registry.get(opcode)?;
    let operands = read_indices(bytes, offset, schema.operands(), "operand index")?;
    let blocks = read_indices(bytes, offset, schema.blocks(), "block index")?;

    let mut extras = Vec::with_capacity(schema.extras().len());
    for kind in schema.extras() {
        let extra = match kind {
            ExtraKind::StringPoolRef => Extra::String(leb128::read_u32(bytes, offset, "string index")?),
            ExtraKind::ConstantPoolRef => {
                Extra::Constant(leb128::read_u32(bytes, offset, "constant index")?)
            }
            ExtraKind::TypePoolRef => Extra::Type(leb128::read_u32(bytes, offset, "type index")?),
            ExtraKind::NamePoolRef => Extra::Name(leb128::read_u32(bytes, offset, "name index")?),
            ExtraKind::StringArray => Extra::StringArray(read_u32s(bytes, offset, "string index")?),
            ExtraKind::SwitchArray => {
                let cases = leb128::read_len(bytes, offset, 1)?;
                let mut switch = Vec::with_capacity(cases);
                for _ in 0..cases {
                    switch.push(read_u32s(bytes, offset, "constant index")?);
                }
                Extra::SwitchArray(switch)
            }
        };
        extras.push(extra);
    }

    Ok(Record {
        opcode,
        operands,
        blocks,
        extras,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DecodeError;
    use crate::schema::Schema;
    use crate::{Fields, SyntacticItem};

    const NOP: u16 = 0;
    const BINOP: u16 = 1;
    const CALL: u16 = 2;
    const SWITCH: u16 = 300;

    fn no_construct(_: &Schema, opcode: u16, _: Fields) -> Result<SyntacticItem, SyntaxError> {
        Ok(SyntacticItem::leaf(opcode))
    }

    fn no_deconstruct(_: &Schema, _: &SyntacticItem) -> Result<Fields, SyntaxError> {
        Ok(Fields::default())
    }

    fn registry() -> SchemaRegistry {
        let mut reg = SchemaRegistry::new();
        reg.register(NOP, Schema::new("nop", Arity::Zero, Arity::Zero, &[]))
            .unwrap();
        reg.register(BINOP, Schema::new("binop", Arity::Two, Arity::Zero, &[]))
            .unwrap();
        reg.register(
            CALL,
            Schema::new("call", Arity::Many, Arity::Zero, &[ExtraKind::NamePoolRef]),
        )
        .unwrap();
        reg.register(
            SWITCH,
            Schema::custom(
                "switch",
                Arity::One,
                Arity::Many,
                &[ExtraKind::StringArray, ExtraKind::SwitchArray],
                no_construct,
                no_deconstruct,
            ),
        )
        .unwrap();
        reg
    }

    fn roundtrip(record: &Record) -> Record {
        let reg = registry();
        let mut buf = Vec::new();
        encode_record(record, &reg, &mut buf).unwrap();
        let mut off = 0;
        let back = decode_record(&buf, &mut off, &reg).unwrap();
        assert_eq!(off, buf.len());
        back
    }

    #[test]
    fn fixed_arity_writes_no_count() {
        let reg = registry();
        let record = Record {
            opcode: BINOP,
            operands: vec![3, 4],
            blocks: vec![],
            extras: vec![],
        };
        let mut buf = Vec::new();
        encode_record(&record, &reg, &mut buf).unwrap();
        assert_eq!(buf, vec![1, 3, 4]);
    }

    #[test]
    fn many_arity_writes_count() {
        let record = Record {
            opcode: CALL,
            operands: vec![0, 200],
            blocks: vec![],
            extras: vec![Extra::Name(5)],
        };
        let reg = registry();
        let mut buf = Vec::new();
        encode_record(&record, &reg, &mut buf).unwrap();
        assert_eq!(buf, vec![2, 2, 0, 0xc8, 0x01, 5]);
        assert_eq!(roundtrip(&record), record);
    }

    #[test]
    fn empty_many_list() {
        let record = Record {
            opcode: CALL,
            operands: vec![],
            blocks: vec![],
            extras: vec![Extra::Name(0)],
        };
        assert_eq!(roundtrip(&record), record);
    }

    #[test]
    fn array_extras() {
        let record = Record {
            opcode: SWITCH,
            operands: vec![7],
            blocks: vec![8, 9, 10],
            extras: vec![
                Extra::StringArray(vec![1, 2]),
                Extra::SwitchArray(vec![vec![0], vec![], vec![1, 2, 3]]),
            ],
        };
        assert_eq!(roundtrip(&record), record);
    }

    #[test]
    fn encode_rejects_count_mismatch() {
        let reg = registry();
        let record = Record {
            opcode: BINOP,
            operands: vec![1],
            blocks: vec![],
            extras: vec![],
        };
        let err = encode_record(&record, &reg, &mut Vec::new()).unwrap_err();
        assert!(matches!(err, SyntaxError::MalformedRecord { opcode: BINOP, .. }));
    }

    #[test]
    fn encode_rejects_wrong_extras() {
        let reg = registry();
        let record = Record {
            opcode: CALL,
            operands: vec![],
            blocks: vec![],
            extras: vec![Extra::String(0)],
        };
        assert!(matches!(
            encode_record(&record, &reg, &mut Vec::new()),
            Err(SyntaxError::MalformedRecord { .. })
        ));
    }

    #[test]
    fn decode_unknown_opcode() {
        let mut off = 0;
        assert!(matches!(
            decode_record(&[42], &mut off, &registry()),
            Err(SyntaxError::UnknownOpcode { opcode: 42 })
        ));
    }

    #[test]
    fn decode_truncated_record() {
        let mut off = 0;
        let err = decode_record(&[BINOP as u8, 3], &mut off, &registry()).unwrap_err();
        assert!(matches!(
            err,
            SyntaxError::Decode(DecodeError::UnexpectedEof)
        ));
    }

    #[test]
    fn consecutive_records() {
        let reg = registry();
        let first = Record {
            opcode: NOP,
            operands: vec![],
            blocks: vec![],
            extras: vec![],
        };
        let second = Record {
            opcode: BINOP,
            operands: vec![0, 0],
            blocks: vec![],
            extras: vec![],
        };
        let mut buf = Vec::new();
        encode_record(&first, &reg, &mut buf).unwrap();
        encode_record(&second, &reg, &mut buf).unwrap();
        let mut off = 0;
        assert_eq!(decode_record(&buf, &mut off, &reg).unwrap(), first);
        assert_eq!(decode_record(&buf, &mut off, &reg).unwrap(), second);
        assert_eq!(off, buf.len());
    }
}
