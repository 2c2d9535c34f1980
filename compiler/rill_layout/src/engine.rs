//! The layout engine: dispatch over type kind, the once-only layout cache,
//! and the offset queries later stages consume.

use rill_abi::{LayoutFamily, TargetEnv};

use crate::error::{LayoutError, Result};
use crate::eval::ConstEval;
use crate::result::{FieldOffset, TypeLayout};
use crate::table::{TypeDescriptor, TypeRef, TypeTable};
use crate::{itanium, sequential};

/// Computes and caches layouts for the types of one translation unit.
///
/// The engine is purely computational: no I/O, no blocking. It assumes a
/// bottom-up schedule imposed by the caller; every constituent of a type
/// (element type, bases, member types) must have been laid out through the
/// same engine before the type itself is requested, or layout fails with
/// [`LayoutError::NotLaidOut`].
pub struct LayoutEngine<'t, E> {
    types: &'t TypeTable,
    env: &'t TargetEnv,
    family: LayoutFamily,
    eval: &'t E,
    layouts: Vec<Option<TypeLayout>>,
    ledger_bytes: u64,
}

impl<'t, E: ConstEval> LayoutEngine<'t, E> {
    pub fn new(
        types: &'t TypeTable,
        env: &'t TargetEnv,
        family: LayoutFamily,
        eval: &'t E,
    ) -> Self {
        LayoutEngine {
            types,
            env,
            family,
            eval,
            layouts: Vec::new(),
            ledger_bytes: 0,
        }
    }

    pub fn table(&self) -> &'t TypeTable {
        self.types
    }

    pub fn env(&self) -> &'t TargetEnv {
        self.env
    }

    pub fn family(&self) -> LayoutFamily {
        self.family
    }

    pub fn eval(&self) -> &'t E {
        self.eval
    }

    /// Bytes of internal bookkeeping (ledger) consumed so far. Diagnostic
    /// only; not part of the layout contract.
    pub fn used_memory(&self) -> u64 {
        self.ledger_bytes
    }

    /// Compute (or fetch) the layout of one type.
    ///
    /// Idempotent: the first call computes and caches, every later call
    /// returns the cached record untouched.
    pub fn layout(&mut self, ty: TypeRef) -> Result<&TypeLayout> {
        if self.layouts.len() < self.types.len() {
            self.layouts.resize_with(self.types.len(), || None);
        }
        if self.layouts[ty.index()].is_none() {
            let computed = self.compute(ty)?;
            self.layouts[ty.index()] = Some(computed);
        }
        self.layouts[ty.index()]
            .as_ref()
            .ok_or(LayoutError::NotLaidOut { ty })
    }

    #[tracing::instrument(level = "debug", skip(self), fields(target = self.env.name))]
    fn compute(&mut self, ty: TypeRef) -> Result<TypeLayout> {
        match self.types.descriptor(ty) {
            TypeDescriptor::Scalar(kind) => {
                let prim = self.env.primitive(*kind);
                Ok(TypeLayout::plain(prim.size, prim.align))
            }
            TypeDescriptor::Array { .. } => sequential::layout_array(self, ty),
            TypeDescriptor::Union { .. } => sequential::layout_union(self, ty),
            TypeDescriptor::Aggregate { .. } => match self.family {
                LayoutFamily::C => sequential::layout_record(self, ty),
                LayoutFamily::Cxx => {
                    let (layout, ledger_bytes) = itanium::layout_class(self, ty)?;
                    self.ledger_bytes += ledger_bytes;
                    Ok(layout)
                }
            },
            // A reference has the layout of its referee.
            TypeDescriptor::Reference { referee } => match self.family {
                LayoutFamily::Cxx => Ok(self.constituent(*referee)?.clone()),
                LayoutFamily::C => Err(LayoutError::UnhandledKind { ty }),
            },
        }
    }

    /// Cached layout of a type, if it has been computed.
    pub fn try_layout_of(&self, ty: TypeRef) -> Option<&TypeLayout> {
        self.layouts.get(ty.index()).and_then(Option::as_ref)
    }

    /// Cached layout of a type.
    ///
    /// Panics if `layout` has not succeeded for `ty`: querying an
    /// uncomputed layout is a programming error in the caller's
    /// scheduling, not a recoverable condition.
    pub fn layout_of(&self, ty: TypeRef) -> &TypeLayout {
        match self.try_layout_of(ty) {
            Some(layout) => layout,
            None => panic!("layout of {ty} queried before it was computed"),
        }
    }

    /// Cached layout of a constituent type; an ordering violation if absent.
    pub(crate) fn constituent(&self, ty: TypeRef) -> Result<&TypeLayout> {
        self.try_layout_of(ty).ok_or(LayoutError::NotLaidOut { ty })
    }

    /// Offset of the `index`th declared member of a laid-out aggregate.
    pub fn field_offset(&self, ty: TypeRef, index: usize) -> Option<FieldOffset> {
        self.layout_of(ty).field_offset(index)
    }

    /// Offset of the `index`th direct base of a laid-out aggregate.
    pub fn base_offset(&self, ty: TypeRef, index: usize) -> Option<u64> {
        self.layout_of(ty).base_offset(index)
    }

    /// Offset of a virtual base within a laid-out complete object.
    pub fn virtual_base_offset(&self, ty: TypeRef, class: TypeRef) -> Option<u64> {
        self.layout_of(ty).virtual_base_offset(class)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::LiteralExprs;
    use pretty_assertions::assert_eq;
    use rill_abi::Primitive;

    #[test]
    fn scalars_take_target_extents() {
        let exprs = LiteralExprs::new();
        let mut table = TypeTable::new();
        let int = table.scalar(Primitive::Int);
        let ld = table.scalar(Primitive::LongDouble);

        let env = TargetEnv::linux_ia32();
        let mut engine = LayoutEngine::new(&table, &env, LayoutFamily::Cxx, &exprs);

        let int_layout = engine.layout(int).cloned();
        assert_eq!(int_layout, Ok(TypeLayout::plain(4, 4)));
        let ld_layout = engine.layout(ld).cloned();
        assert_eq!(ld_layout, Ok(TypeLayout::plain(12, 4)));
    }

    #[test]
    fn references_lay_out_as_their_referee() {
        let exprs = LiteralExprs::new();
        let mut table = TypeTable::new();
        let double = table.scalar(Primitive::Double);
        let reference = table.reference(double);

        let env = TargetEnv::linux_ia32();
        let mut engine = LayoutEngine::new(&table, &env, LayoutFamily::Cxx, &exprs);
        let _ = engine.layout(double);
        let layout = engine.layout(reference).cloned();
        assert_eq!(layout, Ok(TypeLayout::plain(8, 4)));
    }

    #[test]
    fn references_are_unhandled_in_the_c_family() {
        let exprs = LiteralExprs::new();
        let mut table = TypeTable::new();
        let int = table.scalar(Primitive::Int);
        let reference = table.reference(int);

        let env = TargetEnv::linux_ia32();
        let mut engine = LayoutEngine::new(&table, &env, LayoutFamily::C, &exprs);
        let _ = engine.layout(int);
        assert_eq!(
            engine.layout(reference).cloned(),
            Err(LayoutError::UnhandledKind { ty: reference })
        );
    }

    #[test]
    fn constituents_must_be_laid_out_first() {
        let mut exprs = LiteralExprs::new();
        let ten = exprs.literal(10);
        let mut table = TypeTable::new();
        let int = table.scalar(Primitive::Int);
        let array = table.array(int, ten);

        let env = TargetEnv::linux_ia32();
        let mut engine = LayoutEngine::new(&table, &env, LayoutFamily::Cxx, &exprs);
        // Asking for the array before the element type is a caller error.
        assert_eq!(
            engine.layout(array).cloned(),
            Err(LayoutError::NotLaidOut { ty: int })
        );
    }

    #[test]
    #[should_panic(expected = "queried before it was computed")]
    fn querying_an_uncomputed_layout_panics() {
        let exprs = LiteralExprs::new();
        let mut table = TypeTable::new();
        let int = table.scalar(Primitive::Int);

        let env = TargetEnv::linux_ia32();
        let engine = LayoutEngine::new(&table, &env, LayoutFamily::Cxx, &exprs);
        let _ = engine.layout_of(int);
    }
}
