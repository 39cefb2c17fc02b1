//! End-to-end tests for building, interning and serializing heaps of a small
//! expression language.

use kiln_syntax::{
    read_heap, write_heap, Arity, Data, ExtraKind, ExtraValue, Fields, ItemRef, Schema,
    SchemaRegistry, SyntacticHeap, SyntacticItem, SyntaxError,
};

const INT: u16 = 1;
const VAR: u16 = 2;
const ADD: u16 = 3;
const CALL: u16 = 4;
const IF: u16 = 5;
const TYPE: u16 = 6;
const CAST: u16 = 7;
const SWITCH: u16 = 8;
const STR: u16 = 9;

/// Case constants are stored in the payload as `;`-separated groups of
/// `,`-separated integers.
fn switch_construct(_: &Schema, opcode: u16, fields: Fields) -> Result<SyntacticItem, SyntaxError> {
    let Some(ExtraValue::SwitchArray(cases)) = fields.extras.first() else {
        return Err(SyntaxError::MalformedRecord {
            opcode,
            reason: "missing cases".to_string(),
        });
    };
    let rendered = cases
        .iter()
        .map(|case| {
            case.iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(",")
        })
        .collect::<Vec<_>>()
        .join(";");
    let children = fields.operands.into_iter().chain(fields.blocks).collect();
    Ok(SyntacticItem::new(opcode, children).with_data(rendered))
}

fn switch_deconstruct(_: &Schema, item: &SyntacticItem) -> Result<Fields, SyntaxError> {
    let text = item.data().and_then(Data::as_text).unwrap_or_default();
    let cases = text
        .split(';')
        .map(|case| {
            case.split(',')
                .filter(|s| !s.is_empty())
                .map(|s| Data::from(s.parse::<i64>().unwrap_or_default()))
                .collect()
        })
        .collect();
    let mut children: Vec<ItemRef> = item.operands().iter().flatten().cloned().collect();
    let blocks = children.split_off(1);
    Ok(Fields {
        operands: children,
        blocks,
        extras: vec![ExtraValue::SwitchArray(cases)],
    })
}

fn registry() -> SchemaRegistry {
    let mut reg = SchemaRegistry::new();
    let schemas = [
        (INT, Schema::new("int", Arity::Zero, Arity::Zero, &[ExtraKind::ConstantPoolRef])),
        (VAR, Schema::new("var", Arity::Zero, Arity::Zero, &[ExtraKind::NamePoolRef])),
        (ADD, Schema::new("add", Arity::Two, Arity::Zero, &[])),
        (CALL, Schema::new("call", Arity::Many, Arity::Zero, &[ExtraKind::NamePoolRef])),
        (IF, Schema::new("if", Arity::One, Arity::Two, &[])),
        (TYPE, Schema::new("type", Arity::Zero, Arity::Zero, &[ExtraKind::StringPoolRef])),
        (CAST, Schema::new("cast", Arity::One, Arity::Zero, &[ExtraKind::TypePoolRef])),
        (
            SWITCH,
            Schema::custom(
                "switch",
                Arity::One,
                Arity::Many,
                &[ExtraKind::SwitchArray],
                switch_construct,
                switch_deconstruct,
            ),
        ),
        (STR, Schema::new("str", Arity::Zero, Arity::Zero, &[ExtraKind::StringPoolRef])),
    ];
    for (opcode, schema) in schemas {
        reg.register(opcode, schema).unwrap();
    }
    reg
}

fn int(v: i64) -> ItemRef {
    SyntacticItem::leaf(INT).with_data(v).into_ref()
}

fn var(name: &str) -> ItemRef {
    SyntacticItem::leaf(VAR).with_data(name).into_ref()
}

fn node(opcode: u16, operands: Vec<ItemRef>) -> ItemRef {
    SyntacticItem::new(opcode, operands).into_ref()
}

fn program(heap: &mut SyntacticHeap) -> ItemRef {
    let x = var("x");
    let sum = node(ADD, vec![x.clone(), int(1)]);
    let call = node(CALL, vec![sum.clone(), x.clone(), int(2)]).with_name("print");
    let empty_call = node(CALL, vec![]).with_name("flush");
    let ty = SyntacticItem::leaf(TYPE).with_data("u8").into_ref();
    let cast = node(CAST, vec![sum, ty]);
    let cond = node(IF, vec![x.clone(), call, empty_call]);
    let switch = SyntacticItem::new(SWITCH, vec![x, cond, cast])
        .with_data("1,2;-3")
        .into_ref();
    let big = SyntacticItem::leaf(INT)
        .with_data(Data::Integer("-98765432109876543210".parse().unwrap()))
        .into_ref();
    let text = SyntacticItem::leaf(STR).with_data("héllo\n").into_ref();
    heap.allocate(&switch).unwrap();
    heap.allocate(&big).unwrap();
    heap.allocate(&text).unwrap();
    switch
}

trait WithName {
    fn with_name(self, name: &str) -> ItemRef;
}

impl WithName for ItemRef {
    fn with_name(self, name: &str) -> ItemRef {
        (*self).clone().with_data(name).into_ref()
    }
}

#[test]
fn every_item_survives_a_roundtrip() {
    let reg = registry();
    let mut heap = SyntacticHeap::new();
    program(&mut heap);

    let bytes = write_heap(&heap, &reg).unwrap();
    let decoded = read_heap(&bytes, &reg).unwrap();

    assert_eq!(decoded.len(), heap.len());
    for (index, item) in heap.iter() {
        assert_eq!(decoded.get(index).unwrap(), item, "item {index} differs");
    }
}

#[test]
fn encoding_is_deterministic() {
    let reg = registry();
    let mut a = SyntacticHeap::new();
    let mut b = SyntacticHeap::new();
    program(&mut a);
    program(&mut b);
    assert_eq!(write_heap(&a, &reg).unwrap(), write_heap(&b, &reg).unwrap());
}

#[test]
fn reencoding_a_decoded_heap_is_stable() {
    let reg = registry();
    let mut heap = SyntacticHeap::new();
    program(&mut heap);
    let first = write_heap(&heap, &reg).unwrap();
    let second = write_heap(&read_heap(&first, &reg).unwrap(), &reg).unwrap();
    assert_eq!(first, second);
}

#[test]
fn interned_heap_has_no_structural_duplicates() {
    let mut heap = SyntacticHeap::new();
    let a = heap.intern(&node(ADD, vec![var("x"), int(1)])).unwrap();
    let b = heap.intern(&node(ADD, vec![var("x"), int(1)])).unwrap();
    assert_eq!(a, b);

    let mut seen = std::collections::HashSet::new();
    for (_, item) in heap.iter() {
        assert!(seen.insert(item.clone()), "duplicate {item}");
    }
}

#[test]
fn sorting_items_is_deterministic() {
    let mut heap = SyntacticHeap::new();
    program(&mut heap);
    let mut forward: Vec<ItemRef> = heap.items().to_vec();
    let mut backward: Vec<ItemRef> = heap.items().iter().rev().cloned().collect();
    forward.sort();
    backward.sort();
    assert_eq!(forward, backward);
    for pair in forward.windows(2) {
        assert!(pair[0] <= pair[1]);
    }
}

#[test]
fn decoding_with_a_different_registry_fails() {
    let reg = registry();
    let mut heap = SyntacticHeap::new();
    program(&mut heap);
    let bytes = write_heap(&heap, &reg).unwrap();

    let mut partial = SchemaRegistry::new();
    partial
        .register(INT, Schema::new("int", Arity::Zero, Arity::Zero, &[ExtraKind::ConstantPoolRef]))
        .unwrap();
    assert!(read_heap(&bytes, &partial).is_err());
}
