//! Signed-magnitude arithmetic with condition-code update.
//!
//! Operands decode to native integers, the operation runs in wide `i64`
//! arithmetic, and the result re-encodes on the way back into AC. The
//! two's-complement intermediate never leaks out of this module.

use crate::processor::psw::Cond;
use deka::Word;

/// The four accumulator operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
}

/// Apply `ac ⊙ operand` and classify the result.
///
/// Division by zero must be rejected by the caller before getting here;
/// magnitudes beyond seven digits clamp and report [`Cond::Overflow`].
#[must_use]
pub fn arithmetic(op: ArithOp, ac: Word, operand: Word) -> (Word, Cond) {
    let a = ac.value();
    let b = operand.value();
    let result = match op {
        ArithOp::Add => a + b,
        ArithOp::Sub => a - b,
        ArithOp::Mul => a * b,
        ArithOp::Div => a / b,
    };
    let cc = Cond::of_value(result);
    let (word, clamped) = Word::from_value(result);
    (word, if clamped { Cond::Overflow } else { cc })
}

/// Compare decoded values for `COMP`; AC is left untouched by the caller.
#[must_use]
pub fn compare(ac: Word, operand: Word) -> Cond {
    let a = ac.value();
    let b = operand.value();
    if a == b {
        Cond::Equal
    } else if a < b {
        Cond::Less
    } else {
        Cond::Greater
    }
}
