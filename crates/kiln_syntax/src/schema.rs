//! Per-opcode schemas and the registry that holds them.
//!
//! A [`Schema`] declares the shape of an opcode's encoded record: how many
//! operand indices, how many block indices, and which extras follow. It also
//! carries the pair of functions that convert between record fields and an
//! in-memory [`SyntacticItem`]. Most opcodes use the standard layout:
//!
//! - the item's operands are the operand children, then the block children,
//!   then one child per `TypePoolRef` extra;
//! - a single `StringPoolRef`, `NamePoolRef` or `ConstantPoolRef` extra is
//!   carried as the item's payload.
//!
//! Opcodes that need array extras, or more than one payload extra, register a
//! custom constructor/deconstructor pair.

use std::collections::BTreeMap;
use std::fmt;

use crate::data::Data;
use crate::error::SyntaxError;
use crate::item::{ItemRef, SyntacticItem};

/// How many operand (or block) indices a record carries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Arity {
    /// Exactly zero.
    Zero,
    /// Exactly one.
    One,
    /// Exactly two.
    Two,
    /// Any number; the count is written explicitly.
    Many,
}

impl Arity {
    /// Returns the fixed count, or `None` for [`Arity::Many`].
    pub fn fixed(self) -> Option<usize> {
        match self {
            Self::Zero => Some(0),
            Self::One => Some(1),
            Self::Two => Some(2),
            Self::Many => None,
        }
    }

    /// Returns `true` if `count` entries are allowed.
    pub fn admits(self, count: usize) -> bool {
        self.fixed().map_or(true, |n| n == count)
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Zero => "ZERO",
            Self::One => "ONE",
            Self::Two => "TWO",
            Self::Many => "MANY",
        })
    }
}

/// The kind of an auxiliary slot following the operand and block indices.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ExtraKind {
    /// Index into the string pool.
    StringPoolRef,
    /// Index into the constant pool.
    ConstantPoolRef,
    /// Index into the type pool.
    TypePoolRef,
    /// Index into the name pool.
    NamePoolRef,
    /// Length-prefixed array of string pool indices.
    StringArray,
    /// Length-prefixed array of cases, each a length-prefixed array of
    /// constant pool indices.
    SwitchArray,
}

impl ExtraKind {
    fn is_payload(self) -> bool {
        matches!(
            self,
            Self::StringPoolRef | Self::ConstantPoolRef | Self::NamePoolRef
        )
    }

    fn is_array(self) -> bool {
        matches!(self, Self::StringArray | Self::SwitchArray)
    }
}

/// An extra as it appears in an encoded record: raw pool indices.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Extra {
    /// String pool index.
    String(u32),
    /// Constant pool index.
    Constant(u32),
    /// Type pool index.
    Type(u32),
    /// Name pool index.
    Name(u32),
    /// String pool indices.
    StringArray(Vec<u32>),
    /// Constant pool indices per case.
    SwitchArray(Vec<Vec<u32>>),
}

impl Extra {
    /// Returns the kind of this extra.
    pub fn kind(&self) -> ExtraKind {
        match self {
            Self::String(_) => ExtraKind::StringPoolRef,
            Self::Constant(_) => ExtraKind::ConstantPoolRef,
            Self::Type(_) => ExtraKind::TypePoolRef,
            Self::Name(_) => ExtraKind::NamePoolRef,
            Self::StringArray(_) => ExtraKind::StringArray,
            Self::SwitchArray(_) => ExtraKind::SwitchArray,
        }
    }
}

/// An extra with its pool references resolved.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExtraValue {
    /// A string from the string pool.
    String(String),
    /// A constant from the constant pool.
    Constant(Data),
    /// A type item, resolved through the type pool.
    Type(ItemRef),
    /// A name from the name pool.
    Name(String),
    /// Strings from the string pool.
    StringArray(Vec<String>),
    /// Constants per switch case.
    SwitchArray(Vec<Vec<Data>>),
}

impl ExtraValue {
    /// Returns the kind of this extra.
    pub fn kind(&self) -> ExtraKind {
        match self {
            Self::String(_) => ExtraKind::StringPoolRef,
            Self::Constant(_) => ExtraKind::ConstantPoolRef,
            Self::Type(_) => ExtraKind::TypePoolRef,
            Self::Name(_) => ExtraKind::NamePoolRef,
            Self::StringArray(_) => ExtraKind::StringArray,
            Self::SwitchArray(_) => ExtraKind::SwitchArray,
        }
    }
}

/// The decoded fields of a record, with indices resolved to items.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Fields {
    /// Operand children.
    pub operands: Vec<ItemRef>,
    /// Nested block children.
    pub blocks: Vec<ItemRef>,
    /// Extras in declared order.
    pub extras: Vec<ExtraValue>,
}

/// Builds an item from resolved record fields.
pub type Construct = fn(&Schema, u16, Fields) -> Result<SyntacticItem, SyntaxError>;

/// Splits an item back into record fields. Must invert the paired [`Construct`].
pub type Deconstruct = fn(&Schema, &SyntacticItem) -> Result<Fields, SyntaxError>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Layout {
    Standard,
    Custom,
}

/// Static description of one opcode's encoded shape.
#[derive(Clone)]
pub struct Schema {
    name: &'static str,
    operands: Arity,
    blocks: Arity,
    extras: Vec<ExtraKind>,
    layout: Layout,
    construct: Construct,
    deconstruct: Deconstruct,
}

impl Schema {
    /// Creates a schema using the standard layout.
    pub fn new(name: &'static str, operands: Arity, blocks: Arity, extras: &[ExtraKind]) -> Self {
        Self {
            name,
            operands,
            blocks,
            extras: extras.to_vec(),
            layout: Layout::Standard,
            construct: standard_construct,
            deconstruct: standard_deconstruct,
        }
    }

    /// Creates a schema with its own constructor and deconstructor.
    pub fn custom(
        name: &'static str,
        operands: Arity,
        blocks: Arity,
        extras: &[ExtraKind],
        construct: Construct,
        deconstruct: Deconstruct,
    ) -> Self {
        Self {
            name,
            operands,
            blocks,
            extras: extras.to_vec(),
            layout: Layout::Custom,
            construct,
            deconstruct,
        }
    }

    /// Returns the human-readable opcode name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Returns the operand arity.
    pub fn operands(&self) -> Arity {
        self.operands
    }

    /// Returns the block arity.
    pub fn blocks(&self) -> Arity {
        self.blocks
    }

    /// Returns the declared extras, in order.
    pub fn extras(&self) -> &[ExtraKind] {
        &self.extras
    }

    /// Checks operand and block counts and extra kinds against this schema.
    pub fn check_shape(
        &self,
        opcode: u16,
        operands: usize,
        blocks: usize,
        extras: impl IntoIterator<Item = ExtraKind>,
    ) -> Result<(), SyntaxError> {
        if !self.operands.admits(operands) {
            return Err(SyntaxError::malformed(
                opcode,
                format!("expected {} operands, found {operands}", self.operands),
            ));
        }
        if !self.blocks.admits(blocks) {
            return Err(SyntaxError::malformed(
                opcode,
                format!("expected {} blocks, found {blocks}", self.blocks),
            ));
        }
        let found: Vec<ExtraKind> = extras.into_iter().collect();
        if found != self.extras {
            return Err(SyntaxError::malformed(
                opcode,
                format!("expected extras {:?}, found {found:?}", self.extras),
            ));
        }
        Ok(())
    }

    /// Builds an item from decoded fields after checking their shape.
    pub fn construct(&self, opcode: u16, fields: Fields) -> Result<SyntacticItem, SyntaxError> {
        self.check_shape(
            opcode,
            fields.operands.len(),
            fields.blocks.len(),
            fields.extras.iter().map(ExtraValue::kind),
        )?;
        (self.construct)(self, opcode, fields)
    }

    /// Splits an item into record fields and checks their shape.
    pub fn deconstruct(&self, item: &SyntacticItem) -> Result<Fields, SyntaxError> {
        let fields = (self.deconstruct)(self, item)?;
        self.check_shape(
            item.opcode(),
            fields.operands.len(),
            fields.blocks.len(),
            fields.extras.iter().map(ExtraValue::kind),
        )?;
        Ok(fields)
    }

    fn validate(&self, opcode: u16) -> Result<(), SyntaxError> {
        if self.layout == Layout::Custom {
            return Ok(());
        }
        let reason = if self.operands == Arity::Many && self.blocks == Arity::Many {
            "operand and block arity are both MANY"
        } else if self.extras.iter().filter(|k| k.is_payload()).count() > 1 {
            "more than one payload extra"
        } else if self.extras.iter().any(|k| k.is_array()) {
            "array extras require a custom layout"
        } else {
            return Ok(());
        };
        Err(SyntaxError::InvalidSchema {
            opcode,
            reason: reason.to_string(),
        })
    }

    /// Splits `total` children into operand and block counts.
    fn split(&self, opcode: u16, total: usize) -> Result<(usize, usize), SyntaxError> {
        match (self.operands.fixed(), self.blocks.fixed()) {
            (Some(ops), Some(blocks)) if ops + blocks == total => Ok((ops, blocks)),
            (Some(ops), None) if total >= ops => Ok((ops, total - ops)),
            (None, Some(blocks)) if total >= blocks => Ok((total - blocks, blocks)),
            (None, None) => Err(SyntaxError::InvalidSchema {
                opcode,
                reason: "operand and block arity are both MANY".to_string(),
            }),
            _ => Err(SyntaxError::unrepresentable(
                opcode,
                format!(
                    "{total} children do not fit {} operands and {} blocks",
                    self.operands, self.blocks
                ),
            )),
        }
    }
}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schema")
            .field("name", &self.name)
            .field("operands", &self.operands)
            .field("blocks", &self.blocks)
            .field("extras", &self.extras)
            .field("layout", &self.layout)
            .finish()
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} <{} operands, {} blocks, {:?}>",
            self.name, self.operands, self.blocks, self.extras
        )
    }
}

fn standard_construct(
    _schema: &Schema,
    opcode: u16,
    fields: Fields,
) -> Result<SyntacticItem, SyntaxError> {
    let mut operands: Vec<Option<ItemRef>> = fields
        .operands
        .into_iter()
        .chain(fields.blocks)
        .map(Some)
        .collect();
    let mut data = None;
    for extra in fields.extras {
        match extra {
            ExtraValue::Type(ty) => operands.push(Some(ty)),
            ExtraValue::String(s) | ExtraValue::Name(s) => data = Some(Data::Text(s)),
            ExtraValue::Constant(value) => data = Some(value),
            ExtraValue::StringArray(_) | ExtraValue::SwitchArray(_) => {
                return Err(SyntaxError::InvalidSchema {
                    opcode,
                    reason: "array extras require a custom layout".to_string(),
                })
            }
        }
    }
    let item = SyntacticItem::with_operands(opcode, operands);
    Ok(match data {
        Some(data) => item.with_data(data),
        None => item,
    })
}

fn standard_deconstruct(schema: &Schema, item: &SyntacticItem) -> Result<Fields, SyntaxError> {
    let opcode = item.opcode();
    let mut children = item
        .operands()
        .iter()
        .enumerate()
        .map(|(i, operand)| {
            operand
                .clone()
                .ok_or_else(|| SyntaxError::unrepresentable(opcode, format!("operand {i} is absent")))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let type_count = schema
        .extras
        .iter()
        .filter(|k| **k == ExtraKind::TypePoolRef)
        .count();
    if children.len() < type_count {
        return Err(SyntaxError::unrepresentable(
            opcode,
            format!("expected at least {type_count} type children"),
        ));
    }
    let mut types = children.split_off(children.len() - type_count).into_iter();
    let (operand_count, _) = schema.split(opcode, children.len())?;
    let blocks = children.split_off(operand_count);

    let mut extras = Vec::with_capacity(schema.extras.len());
    let mut payload_used = false;
    for kind in &schema.extras {
        let value = match kind {
            ExtraKind::TypePoolRef => match types.next() {
                Some(ty) => ExtraValue::Type(ty),
                None => return Err(SyntaxError::unrepresentable(opcode, "missing type child")),
            },
            ExtraKind::StringPoolRef | ExtraKind::NamePoolRef => {
                let text = item.data().and_then(Data::as_text).ok_or_else(|| {
                    SyntaxError::unrepresentable(opcode, "expected a text payload")
                })?;
                payload_used = true;
                if *kind == ExtraKind::StringPoolRef {
                    ExtraValue::String(text.to_string())
                } else {
                    ExtraValue::Name(text.to_string())
                }
            }
            ExtraKind::ConstantPoolRef => {
                let value = item
                    .data()
                    .ok_or_else(|| SyntaxError::unrepresentable(opcode, "expected a payload"))?;
                payload_used = true;
                ExtraValue::Constant(value.clone())
            }
            ExtraKind::StringArray | ExtraKind::SwitchArray => {
                return Err(SyntaxError::InvalidSchema {
                    opcode,
                    reason: "array extras require a custom layout".to_string(),
                })
            }
        };
        extras.push(value);
    }
    if !payload_used && item.data().is_some() {
        return Err(SyntaxError::unrepresentable(
            opcode,
            "payload has no extra slot in the schema",
        ));
    }

    Ok(Fields {
        operands: children,
        blocks,
        extras,
    })
}

/// The set of schemas, one per opcode.
///
/// Built once before any decoding or encoding and read-only afterwards;
/// encoder and decoder must use the same registry.
#[derive(Clone, Debug, Default)]
pub struct SchemaRegistry {
    schemas: BTreeMap<u16, Schema>,
}

impl SchemaRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the schema for `opcode`.
    pub fn register(&mut self, opcode: u16, schema: Schema) -> Result<(), SyntaxError> {
        if self.schemas.contains_key(&opcode) {
            return Err(SyntaxError::DuplicateSchema { opcode });
        }
        schema.validate(opcode)?;
        self.schemas.insert(opcode, schema);
        Ok(())
    }

    /// Returns the schema for `opcode`.
    pub fn get(&self, opcode: u16) -> Result<&Schema, SyntaxError> {
        self.schemas
            .get(&opcode)
            .ok_or(SyntaxError::UnknownOpcode { opcode })
    }

    /// Returns the number of registered opcodes.
    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    /// Returns `true` if no schema is registered.
    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }

    /// Iterates over `(opcode, schema)` pairs in opcode order.
    pub fn iter(&self) -> impl Iterator<Item = (u16, &Schema)> {
        self.schemas.iter().map(|(op, s)| (*op, s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONST: u16 = 1;
    const IF: u16 = 2;
    const CAST: u16 = 3;

    fn registry() -> SchemaRegistry {
        let mut reg = SchemaRegistry::new();
        reg.register(
            CONST,
            Schema::new("const", Arity::Zero, Arity::Zero, &[ExtraKind::ConstantPoolRef]),
        )
        .unwrap();
        reg.register(IF, Schema::new("if", Arity::One, Arity::Many, &[]))
            .unwrap();
        reg.register(
            CAST,
            Schema::new("cast", Arity::One, Arity::Zero, &[ExtraKind::TypePoolRef]),
        )
        .unwrap();
        reg
    }

    fn constant(v: i64) -> ItemRef {
        SyntacticItem::leaf(CONST).with_data(v).into_ref()
    }

    #[test]
    fn arity_admits() {
        assert!(Arity::Zero.admits(0));
        assert!(!Arity::One.admits(2));
        assert!(Arity::Two.admits(2));
        assert!(Arity::Many.admits(0));
        assert!(Arity::Many.admits(1000));
    }

    #[test]
    fn duplicate_registration_rejected() {
        let mut reg = registry();
        let err = reg
            .register(CONST, Schema::new("again", Arity::Zero, Arity::Zero, &[]))
            .unwrap_err();
        assert!(matches!(err, SyntaxError::DuplicateSchema { opcode: CONST }));
    }

    #[test]
    fn unknown_opcode() {
        assert!(matches!(
            registry().get(99),
            Err(SyntaxError::UnknownOpcode { opcode: 99 })
        ));
    }

    #[test]
    fn ambiguous_standard_layout_rejected() {
        let mut reg = SchemaRegistry::new();
        let err = reg
            .register(7, Schema::new("block", Arity::Many, Arity::Many, &[]))
            .unwrap_err();
        assert!(matches!(err, SyntaxError::InvalidSchema { opcode: 7, .. }));
    }

    #[test]
    fn array_extras_need_custom_layout() {
        let mut reg = SchemaRegistry::new();
        let err = reg
            .register(
                8,
                Schema::new("switch", Arity::One, Arity::Many, &[ExtraKind::SwitchArray]),
            )
            .unwrap_err();
        assert!(matches!(err, SyntaxError::InvalidSchema { .. }));
    }

    #[test]
    fn fixed_arity_mismatch_is_malformed() {
        let reg = registry();
        let schema = reg.get(IF).unwrap();
        let fields = Fields {
            operands: vec![constant(1), constant(2)],
            ..Fields::default()
        };
        let err = schema.construct(IF, fields).unwrap_err();
        assert!(matches!(err, SyntaxError::MalformedRecord { opcode: IF, .. }));
    }

    #[test]
    fn many_arity_accepts_any_count() {
        let reg = registry();
        let schema = reg.get(IF).unwrap();
        for blocks in 0..4 {
            let fields = Fields {
                operands: vec![constant(0)],
                blocks: (0..blocks).map(constant).collect(),
                extras: vec![],
            };
            let item = schema.construct(IF, fields).unwrap();
            assert_eq!(item.len(), 1 + blocks as usize);
        }
    }

    #[test]
    fn standard_layout_roundtrips_payload_and_blocks() {
        let reg = registry();
        let schema = reg.get(IF).unwrap();
        let item = SyntacticItem::new(IF, vec![constant(1), constant(2), constant(3)]);
        let fields = schema.deconstruct(&item).unwrap();
        assert_eq!(fields.operands.len(), 1);
        assert_eq!(fields.blocks.len(), 2);
        let rebuilt = schema.construct(IF, fields).unwrap();
        assert_eq!(rebuilt, item);
    }

    #[test]
    fn constant_payload_maps_to_extra() {
        let reg = registry();
        let schema = reg.get(CONST).unwrap();
        let fields = schema.deconstruct(&constant(5)).unwrap();
        assert_eq!(fields.extras, vec![ExtraValue::Constant(Data::from(5))]);
    }

    #[test]
    fn type_extra_is_trailing_child() {
        let reg = registry();
        let schema = reg.get(CAST).unwrap();
        let ty = SyntacticItem::leaf(CONST).with_data("int").into_ref();
        let item = SyntacticItem::new(CAST, vec![constant(1), ty.clone()]);
        let fields = schema.deconstruct(&item).unwrap();
        assert_eq!(fields.operands, vec![constant(1)]);
        assert_eq!(fields.extras, vec![ExtraValue::Type(ty)]);
    }

    #[test]
    fn missing_payload_is_unrepresentable() {
        let reg = registry();
        let schema = reg.get(CONST).unwrap();
        let err = schema.deconstruct(&SyntacticItem::leaf(CONST)).unwrap_err();
        assert!(matches!(err, SyntaxError::Unrepresentable { .. }));
    }

    #[test]
    fn undeclared_payload_is_unrepresentable() {
        let reg = registry();
        let schema = reg.get(IF).unwrap();
        let item = SyntacticItem::new(IF, vec![constant(1)]).with_data(true);
        assert!(matches!(
            schema.deconstruct(&item),
            Err(SyntaxError::Unrepresentable { .. })
        ));
    }

    #[test]
    fn absent_operand_is_unrepresentable() {
        let reg = registry();
        let schema = reg.get(IF).unwrap();
        let item = SyntacticItem::with_operands(IF, vec![None]);
        assert!(matches!(
            schema.deconstruct(&item),
            Err(SyntaxError::Unrepresentable { .. })
        ));
    }

    #[test]
    fn display_lists_shape() {
        let reg = registry();
        assert_eq!(
            reg.get(IF).unwrap().to_string(),
            "if <ONE operands, MANY blocks, []>"
        );
    }
}
