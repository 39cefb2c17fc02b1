//! Syntactic items: the nodes stored in a [`SyntacticHeap`](crate::SyntacticHeap).
//!
//! Equality, hashing and ordering look only at structure (opcode, operands,
//! payload). Which heap an item lives in, and at what index, never affects
//! them. The operand graph must be acyclic; this holds by construction since
//! an item's operands are fixed when it is created.

use std::cmp::Ordering;
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering as AtomicOrdering};
use std::sync::Arc;

use crate::data::Data;
use crate::error::SyntaxError;

/// Shared handle to an item. Items reference their operands through these.
pub type ItemRef = Arc<SyntacticItem>;

/// Process-unique identity of a heap.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct HeapId(u64);

impl HeapId {
    /// Returns a heap identity that has never been handed out before.
    pub(crate) fn fresh() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, AtomicOrdering::Relaxed))
    }

    /// Returns the raw identity value. Never zero.
    pub fn as_raw(self) -> u64 {
        self.0
    }
}

/// Marks an item that no heap owns yet.
const DETACHED: u64 = 0;

/// A single node: opcode, ordered operands and an optional payload.
///
/// Items are created detached and later bound to exactly one heap. Operands
/// may be absent (`None`), which models a partially built tree.
pub struct SyntacticItem {
    opcode: u16,
    operands: Vec<Option<ItemRef>>,
    data: Option<Data>,
    /// Structural hash, fixed at construction.
    hash: u64,
    owner: AtomicU64,
    index: AtomicUsize,
}

impl SyntacticItem {
    /// Creates a detached item whose operands are all present.
    pub fn new(opcode: u16, operands: Vec<ItemRef>) -> Self {
        Self::with_operands(opcode, operands.into_iter().map(Some).collect())
    }

    /// Creates a detached item with no operands.
    pub fn leaf(opcode: u16) -> Self {
        Self::with_operands(opcode, Vec::new())
    }

    /// Creates a detached item whose operands may be absent.
    pub fn with_operands(opcode: u16, operands: Vec<Option<ItemRef>>) -> Self {
        Self::build(opcode, operands, None)
    }

    /// Attaches a payload, replacing any existing one.
    pub fn with_data(self, data: impl Into<Data>) -> Self {
        Self::build(self.opcode, self.operands, Some(data.into()))
    }

    fn build(opcode: u16, operands: Vec<Option<ItemRef>>, data: Option<Data>) -> Self {
        let mut hasher = DefaultHasher::new();
        opcode.hash(&mut hasher);
        operands.len().hash(&mut hasher);
        for operand in &operands {
            operand.as_ref().map(|op| op.hash).hash(&mut hasher);
        }
        data.hash(&mut hasher);
        Self {
            opcode,
            operands,
            data,
            hash: hasher.finish(),
            owner: AtomicU64::new(DETACHED),
            index: AtomicUsize::new(0),
        }
    }

    /// Wraps this item in a shared handle.
    pub fn into_ref(self) -> ItemRef {
        Arc::new(self)
    }

    /// Returns the opcode.
    pub fn opcode(&self) -> u16 {
        self.opcode
    }

    /// Returns the operands in order.
    pub fn operands(&self) -> &[Option<ItemRef>] {
        &self.operands
    }

    /// Returns the `i`th operand, or `None` if it is absent or out of range.
    pub fn operand(&self, i: usize) -> Option<&ItemRef> {
        self.operands.get(i).and_then(Option::as_ref)
    }

    /// Returns the number of operand slots, counting absent ones.
    pub fn len(&self) -> usize {
        self.operands.len()
    }

    /// Returns `true` if the item has no operand slots.
    pub fn is_empty(&self) -> bool {
        self.operands.is_empty()
    }

    /// Returns the payload, if any.
    pub fn data(&self) -> Option<&Data> {
        self.data.as_ref()
    }

    /// Binds this item to `heap` at `index`.
    ///
    /// Rebinding into the heap that already owns the item is allowed and
    /// moves it to the new index. Binding into any other heap fails with
    /// [`SyntaxError::AllocationConflict`].
    pub fn allocate(&self, heap: HeapId, index: usize) -> Result<(), SyntaxError> {
        match self.owner.compare_exchange(
            DETACHED,
            heap.0,
            AtomicOrdering::AcqRel,
            AtomicOrdering::Acquire,
        ) {
            Ok(_) => {}
            Err(current) if current == heap.0 => {}
            Err(_) => {
                return Err(SyntaxError::AllocationConflict {
                    opcode: self.opcode,
                })
            }
        }
        self.index.store(index, AtomicOrdering::Release);
        Ok(())
    }

    /// Returns the heap that owns this item, if it has been allocated.
    pub fn heap(&self) -> Option<HeapId> {
        match self.owner.load(AtomicOrdering::Acquire) {
            DETACHED => None,
            raw => Some(HeapId(raw)),
        }
    }

    /// Returns `true` once the item belongs to a heap.
    pub fn is_allocated(&self) -> bool {
        self.heap().is_some()
    }

    /// Returns the item's index in its heap.
    pub fn index(&self) -> Result<usize, SyntaxError> {
        if self.is_allocated() {
            Ok(self.index.load(AtomicOrdering::Acquire))
        } else {
            Err(SyntaxError::NotAllocated {
                opcode: self.opcode,
            })
        }
    }
}

impl Clone for SyntacticItem {
    /// Copies the structure. The copy is detached.
    fn clone(&self) -> Self {
        Self {
            opcode: self.opcode,
            operands: self.operands.clone(),
            data: self.data.clone(),
            hash: self.hash,
            owner: AtomicU64::new(DETACHED),
            index: AtomicUsize::new(0),
        }
    }
}

impl PartialEq for SyntacticItem {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash
            && self.opcode == other.opcode
            && self.operands == other.operands
            && self.data == other.data
    }
}

impl Eq for SyntacticItem {}

impl Hash for SyntacticItem {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash);
    }
}

impl Ord for SyntacticItem {
    /// Orders by opcode, then operand count, then operands pairwise (an
    /// absent operand sorts below a present one), then payload.
    fn cmp(&self, other: &Self) -> Ordering {
        self.opcode
            .cmp(&other.opcode)
            .then_with(|| self.operands.len().cmp(&other.operands.len()))
            .then_with(|| self.operands.cmp(&other.operands))
            .then_with(|| self.data.cmp(&other.data))
    }
}

impl PartialOrd for SyntacticItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for SyntacticItem {
    /// Renders `opcode(i, j, ?)` plus `:payload`, where operands show their
    /// heap index or `?` while unresolved.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.opcode)?;
        if !self.operands.is_empty() {
            f.write_str("(")?;
            for (i, operand) in self.operands.iter().enumerate() {
                if i != 0 {
                    f.write_str(", ")?;
                }
                match operand.as_ref().map(|op| op.index()) {
                    Some(Ok(index)) => write!(f, "{index}")?,
                    _ => f.write_str("?")?,
                }
            }
            f.write_str(")")?;
        }
        if let Some(data) = &self.data {
            write!(f, ":{data}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for SyntacticItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyntacticItem")
            .field("opcode", &self.opcode)
            .field("operands", &self.operands)
            .field("data", &self.data)
            .field("heap", &self.heap())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn var(name: &str) -> ItemRef {
        SyntacticItem::leaf(1).with_data(name).into_ref()
    }

    fn add(lhs: ItemRef, rhs: ItemRef) -> ItemRef {
        SyntacticItem::new(2, vec![lhs, rhs]).into_ref()
    }

    #[test]
    fn structural_equality_ignores_identity() {
        let a = add(var("x"), var("y"));
        let b = add(var("x"), var("y"));
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(a, b);
        assert_eq!(a.cmp(&b), Ordering::Equal);

        let mut set = HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));
    }

    #[test]
    fn equality_ignores_allocation() {
        let a = var("x");
        let b = var("x");
        a.allocate(HeapId::fresh(), 7).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn different_payload_not_equal() {
        assert_ne!(var("x"), var("y"));
        assert!(var("x") < var("y"));
    }

    #[test]
    fn order_by_opcode_then_arity() {
        let leaf = SyntacticItem::leaf(5);
        let unary = SyntacticItem::new(5, vec![var("a")]);
        let other = SyntacticItem::leaf(6);
        assert!(leaf < unary);
        assert!(unary < other);
    }

    #[test]
    fn order_recurses_into_operands() {
        let a = add(var("a"), var("z"));
        let b = add(var("b"), var("a"));
        assert!(a < b);
        assert!(b > a);
    }

    #[test]
    fn absent_operand_orders_below_present() {
        let partial = SyntacticItem::with_operands(2, vec![None, Some(var("y"))]);
        let full = SyntacticItem::with_operands(2, vec![Some(var("x")), Some(var("y"))]);
        assert!(partial < full);
        assert!(full > partial);
    }

    #[test]
    fn absent_operands_continue_to_payload() {
        let a = SyntacticItem::with_operands(3, vec![None]).with_data(1);
        let b = SyntacticItem::with_operands(3, vec![None]).with_data(2);
        assert!(a < b);
        assert_ne!(a, b);
    }

    #[test]
    fn allocate_into_second_heap_conflicts() {
        let item = var("x");
        let h1 = HeapId::fresh();
        let h2 = HeapId::fresh();
        item.allocate(h1, 0).unwrap();
        let err = item.allocate(h2, 0).unwrap_err();
        assert!(matches!(err, SyntaxError::AllocationConflict { opcode: 1 }));
        assert_eq!(item.heap(), Some(h1));
    }

    #[test]
    fn reallocate_into_same_heap_rebinds() {
        let item = var("x");
        let heap = HeapId::fresh();
        item.allocate(heap, 0).unwrap();
        item.allocate(heap, 4).unwrap();
        assert_eq!(item.index().unwrap(), 4);
    }

    #[test]
    fn index_before_allocation_fails() {
        let item = var("x");
        assert!(matches!(
            item.index(),
            Err(SyntaxError::NotAllocated { opcode: 1 })
        ));
    }

    #[test]
    fn clone_is_detached() {
        let item = var("x");
        item.allocate(HeapId::fresh(), 3).unwrap();
        let copy = (*item).clone();
        assert!(!copy.is_allocated());
        assert_eq!(&copy, item.as_ref());
    }

    #[test]
    fn display_shows_indices_or_unresolved() {
        let heap = HeapId::fresh();
        let x = var("x");
        x.allocate(heap, 0).unwrap();
        let item = SyntacticItem::with_operands(2, vec![Some(x), Some(var("y")), None]);
        assert_eq!(item.to_string(), "2(0, ?, ?)");
    }

    #[test]
    fn display_with_payload() {
        assert_eq!(var("x").to_string(), "1:\"x\"");
        assert_eq!(SyntacticItem::leaf(9).to_string(), "9");
    }
}
