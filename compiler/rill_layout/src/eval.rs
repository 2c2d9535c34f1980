//! Constant-expression interface.
//!
//! Array extents and bitfield widths arrive as unevaluated expression
//! handles; the surrounding compiler owns the evaluator. The engine only
//! needs one question answered: does this expression fold to an unsigned
//! integer, and if so which one.

use std::fmt;

/// Handle to a constant expression owned by the surrounding compiler.
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
#[repr(transparent)]
pub struct ExprRef(u32);

impl ExprRef {
    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        ExprRef(raw)
    }

    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    #[inline]
    pub(crate) const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for ExprRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ExprRef({})", self.0)
    }
}

/// The one query the engine makes of the constant folder.
///
/// `None` means the expression does not reduce to a constant unsigned
/// integer; the engine treats that as fatal wherever it asks.
pub trait ConstEval {
    fn evaluate(&self, expr: ExprRef) -> Option<u64>;
}

/// A table of pre-folded literals.
///
/// Stands in for the real evaluator in tests and simple drivers: the caller
/// registers each constant (or a deliberately unresolved slot) up front and
/// hands out the resulting handles.
#[derive(Default, Debug)]
pub struct LiteralExprs {
    values: Vec<Option<u64>>,
}

impl LiteralExprs {
    pub fn new() -> Self {
        LiteralExprs::default()
    }

    /// Register a folded constant.
    pub fn literal(&mut self, value: u64) -> ExprRef {
        self.push(Some(value))
    }

    /// Register an expression that does not fold. Evaluating it yields
    /// `None`, which lets tests drive the fatal paths.
    pub fn unresolved(&mut self) -> ExprRef {
        self.push(None)
    }

    fn push(&mut self, value: Option<u64>) -> ExprRef {
        let raw = u32::try_from(self.values.len())
            .unwrap_or_else(|_| panic!("expression table overflow"));
        self.values.push(value);
        ExprRef::from_raw(raw)
    }
}

impl ConstEval for LiteralExprs {
    fn evaluate(&self, expr: ExprRef) -> Option<u64> {
        self.values.get(expr.index()).copied().flatten()
    }
}
