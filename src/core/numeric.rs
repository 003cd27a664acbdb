//! Numeric Modifier Stack
//!
//! Deferred arithmetic on integer fields (health, shields, coins).
//! A modifier is an ordered list of `add` / `mul` operations folded
//! left-to-right starting from zero; the folded total is then added to
//! the field's base value when the owning patch is applied.

use serde::{Deserialize, Serialize};

/// One arithmetic step in a modifier stack.
///
/// Serialized externally tagged: `{"add": -5}`, `{"mul": 2}`; `multiply`
/// is accepted for `mul`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NumericOp {
    /// Add the operand to the running total.
    Add(i64),
    /// Multiply the running total by the operand.
    #[serde(alias = "multiply")]
    Mul(i64),
}

impl NumericOp {
    #[inline]
    fn fold(self, acc: i64) -> i64 {
        match self {
            NumericOp::Add(n) => acc.saturating_add(n),
            NumericOp::Mul(n) => acc.saturating_mul(n),
        }
    }
}

/// Ordered stack of numeric operations targeting a single field.
///
/// Modifiers are single-application deltas: applying the same modifier
/// twice moves the field twice.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NumericModifier {
    ops: Vec<NumericOp>,
}

impl NumericModifier {
    /// Create an empty modifier (total = 0).
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a modifier holding a single operation.
    pub fn from_op(op: NumericOp) -> Self {
        Self { ops: vec![op] }
    }

    /// Operations in application order.
    pub fn ops(&self) -> &[NumericOp] {
        &self.ops
    }

    /// Append an operation to the end of the fold.
    ///
    /// A trailing `mul` scales everything accumulated so far, so
    /// `mul 0` nulls the whole stack.
    pub fn push(&mut self, op: NumericOp) {
        self.ops.push(op);
    }

    /// Combine an independent modifier additively.
    ///
    /// The other stack is folded on its own and its total is added, so
    /// its `mul` steps never scale operations already on this stack.
    pub fn combine(&mut self, other: &NumericModifier) {
        match other.ops.as_slice() {
            [] => {}
            [NumericOp::Add(n)] => self.ops.push(NumericOp::Add(*n)),
            _ => self.ops.push(NumericOp::Add(other.total())),
        }
    }

    /// Folded delta of all operations, starting from zero.
    pub fn total(&self) -> i64 {
        self.ops.iter().fold(0, |acc, op| op.fold(acc))
    }

    /// Apply the folded delta to a base value.
    #[inline]
    pub fn apply_to(&self, base: i64) -> i64 {
        base.saturating_add(self.total())
    }

    /// True when the stack holds no operations.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fold_order() {
        let mut m = NumericModifier::new();
        m.push(NumericOp::Add(-5));
        m.push(NumericOp::Mul(2));
        m.push(NumericOp::Add(-3));
        assert_eq!(m.total(), -13);
        assert_eq!(m.apply_to(250), 237);
    }

    #[test]
    fn test_mul_zero_nulls_stack() {
        let mut m = NumericModifier::from_op(NumericOp::Add(-40));
        m.push(NumericOp::Mul(0));
        assert_eq!(m.total(), 0);
        assert_eq!(m.apply_to(100), 100);
    }

    #[test]
    fn test_combine_is_additive() {
        let mut a = NumericModifier::from_op(NumericOp::Add(-10));
        let mut b = NumericModifier::from_op(NumericOp::Add(-4));
        b.push(NumericOp::Mul(3));

        a.combine(&b);
        assert_eq!(a.total(), -22);

        // The combined stack's multiplier did not scale our -10.
        a.combine(&NumericModifier::new());
        assert_eq!(a.total(), -22);
    }

    #[test]
    fn test_saturating() {
        let mut m = NumericModifier::from_op(NumericOp::Add(i64::MAX));
        m.push(NumericOp::Mul(4));
        assert_eq!(m.total(), i64::MAX);
        assert_eq!(m.apply_to(10), i64::MAX);
    }

    #[test]
    fn test_wire_format() {
        let mut m = NumericModifier::from_op(NumericOp::Add(-5));
        m.push(NumericOp::Mul(2));
        let json = serde_json::to_value(&m).unwrap();
        assert_eq!(json, serde_json::json!([{"add": -5}, {"mul": 2}]));

        let back: NumericModifier = serde_json::from_value(json).unwrap();
        assert_eq!(back, m);
    }
}
