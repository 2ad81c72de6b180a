//! Per-evaluation-site state for compiled expressions.

use std::ops::{Index, IndexMut};

use latticedb_core::Value;

use super::compile::Expression;

/// Mutable evaluation state for one caller of a compiled [`Expression`].
///
/// Holds the current binding values, a private working copy of every value
/// slot, and zero-initialized scratch buffers for stateful functions. A
/// context is created once per evaluation site (for example once per chunk
/// iterator) and reused across many `evaluate` calls by updating bindings
/// in between. Two contexts over the same expression never share mutable
/// state, so independent contexts may evaluate concurrently.
#[derive(Debug, Clone)]
pub struct ExpressionContext {
    bindings: Vec<Value>,
    pub(crate) slots: Vec<Value>,
    pub(crate) state: Vec<Vec<u8>>,
    dirty: bool,
}

impl ExpressionContext {
    pub(crate) fn new(expression: &Expression) -> Self {
        let slots = expression.slot_values().to_vec();
        let bindings = (0..expression.consumer_lists().len())
            .map(|i| expression.binding_seed(i))
            .collect();
        let state = expression
            .compiled_functions()
            .iter()
            .map(|f| vec![0u8; f.state_size])
            .collect();
        Self { bindings, slots, state, dirty: true }
    }

    /// Number of bindings this context carries.
    #[must_use]
    pub fn binding_count(&self) -> usize {
        self.bindings.len()
    }

    /// Sets the value of binding `i`; takes effect on the next `evaluate`.
    pub fn set(&mut self, i: usize, value: Value) {
        self.bindings[i] = value;
        self.dirty = true;
    }

    /// Copies changed binding values into every consumer slot.
    pub(crate) fn sync_bindings(&mut self, expression: &Expression) {
        if !self.dirty {
            return;
        }
        for (i, consumers) in expression.consumer_lists().iter().enumerate() {
            for &slot in consumers {
                self.slots[slot] = self.bindings[i].clone();
            }
        }
        self.dirty = false;
    }
}

impl Index<usize> for ExpressionContext {
    type Output = Value;

    fn index(&self, i: usize) -> &Value {
        &self.bindings[i]
    }
}

impl IndexMut<usize> for ExpressionContext {
    /// Writing through the returned reference marks the context dirty.
    fn index_mut(&mut self, i: usize) -> &mut Value {
        self.dirty = true;
        &mut self.bindings[i]
    }
}
