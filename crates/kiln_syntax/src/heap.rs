//! Append-only, indexed storage for syntactic items.

use std::collections::HashMap;

use crate::error::SyntaxError;
use crate::item::{HeapId, ItemRef, SyntacticItem};

/// A dense, append-only store of items.
///
/// Every item pushed receives the next index; indices are never reused or
/// renumbered, and they are what the record codec writes for cross
/// references. An item belongs to at most one heap for its whole life.
#[derive(Debug)]
pub struct SyntacticHeap {
    id: HeapId,
    items: Vec<ItemRef>,
    /// First index of each structurally distinct item, for [`Self::intern`].
    canonical: HashMap<ItemRef, usize>,
}

impl Default for SyntacticHeap {
    fn default() -> Self {
        Self::new()
    }
}

impl SyntacticHeap {
    /// Creates an empty heap with a fresh identity.
    pub fn new() -> Self {
        Self {
            id: HeapId::fresh(),
            items: Vec::new(),
            canonical: HashMap::new(),
        }
    }

    /// Returns this heap's identity.
    pub fn id(&self) -> HeapId {
        self.id
    }

    /// Returns the number of slots in the heap.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns `true` if nothing has been allocated.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Returns the item at `index`.
    pub fn get(&self, index: usize) -> Option<&ItemRef> {
        self.items.get(index)
    }

    /// Returns all items in index order.
    pub fn items(&self) -> &[ItemRef] {
        &self.items
    }

    /// Iterates over `(index, item)` pairs in index order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &ItemRef)> {
        self.items.iter().enumerate()
    }

    /// Returns `true` if `item` is owned by this heap.
    pub fn owns(&self, item: &SyntacticItem) -> bool {
        item.heap() == Some(self.id)
    }

    /// Appends `item` at the next index without touching its operands.
    ///
    /// Pushing an item this heap already owns rebinds it to the new index.
    pub fn push(&mut self, item: ItemRef) -> Result<usize, SyntaxError> {
        let index = self.items.len();
        item.allocate(self.id, index)?;
        self.canonical.entry(item.clone()).or_insert(index);
        self.items.push(item);
        Ok(index)
    }

    /// Allocates `item` and, first, every operand not yet in this heap.
    ///
    /// Operands always end up at lower indices than the items that use them.
    /// An item this heap already owns keeps its index.
    pub fn allocate(&mut self, item: &ItemRef) -> Result<usize, SyntaxError> {
        // Post-order walk; each entry resumes scanning operands at its cursor.
        let mut stack = vec![(item.clone(), 0)];
        while let Some((current, cursor)) = stack.pop() {
            if self.owns(&current) {
                continue;
            }
            if current.is_allocated() {
                return Err(SyntaxError::AllocationConflict {
                    opcode: current.opcode(),
                });
            }
            let pending = current.operands()[cursor..]
                .iter()
                .position(|op| op.as_ref().is_some_and(|op| !self.owns(op)));
            match pending.and_then(|offset| {
                let next = cursor + offset;
                current.operand(next).cloned().map(|op| (next, op))
            }) {
                Some((next, operand)) => {
                    stack.push((current, next + 1));
                    stack.push((operand, 0));
                }
                None => {
                    self.push(current)?;
                }
            }
        }
        item.index()
    }

    /// Returns the index of an item structurally equal to `item`, allocating
    /// `item` only if no such item exists yet.
    pub fn intern(&mut self, item: &ItemRef) -> Result<usize, SyntaxError> {
        if self.owns(item) {
            return item.index();
        }
        if let Some(&index) = self.canonical.get(item) {
            return Ok(index);
        }
        self.allocate(item)
    }
}
