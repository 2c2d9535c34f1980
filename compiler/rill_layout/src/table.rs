//! Type table and the read-only query facade over it.
//!
//! The surrounding compiler owns the types; the layout engine only reads
//! their structure. [`TypeRef`] is a non-owning 32-bit handle into a
//! [`TypeTable`], compared by index: two handles are the same type exactly
//! when they are equal, which is the type-equivalence rule the subobject
//! conflict check relies on.

use bitflags::bitflags;
use std::fmt;

use crate::eval::ExprRef;
use rill_abi::Primitive;

/// A 32-bit handle to a type in a [`TypeTable`].
///
/// `Copy`, cheap to pass, equality is O(1) index comparison.
#[derive(Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct TypeRef(u32);

impl TypeRef {
    /// Create a handle from a raw index. The caller must ensure the index
    /// is valid in the table it will be used with.
    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        TypeRef(raw)
    }

    /// Get the raw index.
    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    #[inline]
    pub(crate) const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeRef({})", self.0)
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "type#{}", self.0)
    }
}

// TypeRef is stored in ledger entries by the million; keep it word-small.
const _: () = assert!(std::mem::size_of::<TypeRef>() == 4);

bitflags! {
    /// Class-model properties of an aggregate, classified by the front end.
    ///
    /// The layout engine consumes these as facts; it never derives them.
    #[derive(Copy, Clone, Eq, PartialEq, Debug, Default)]
    pub struct ClassFlags: u8 {
        /// Declares or inherits a virtual function or virtual base.
        const DYNAMIC = 1 << 0;
        /// No non-static data members, no non-empty bases.
        const EMPTY = 1 << 1;
        /// Would contain only a vtable pointer, no data.
        const NEARLY_EMPTY = 1 << 2;
        /// Degenerates to the flat C layout.
        const STANDARD_LAYOUT = 1 << 3;
    }
}

/// Bitfield metadata on a member declaration.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct BitfieldSpec {
    /// Width expression, resolved through the constant evaluator.
    pub width: ExprRef,
    /// Unnamed padding bitfields do not contribute to the record alignment.
    pub is_unnamed: bool,
}

/// A non-static data member, in declaration order.
///
/// Declaration order is the only order the layout algorithms consult.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct Member {
    pub ty: TypeRef,
    pub bitfield: Option<BitfieldSpec>,
}

impl Member {
    /// An ordinary (non-bitfield) data member.
    pub const fn field(ty: TypeRef) -> Self {
        Member { ty, bitfield: None }
    }

    /// A named bitfield of the given width expression.
    pub const fn bitfield(ty: TypeRef, width: ExprRef) -> Self {
        Member {
            ty,
            bitfield: Some(BitfieldSpec {
                width,
                is_unnamed: false,
            }),
        }
    }

    /// An unnamed padding bitfield (`int : n;`).
    pub const fn padding_bitfield(ty: TypeRef, width: ExprRef) -> Self {
        Member {
            ty,
            bitfield: Some(BitfieldSpec {
                width,
                is_unnamed: true,
            }),
        }
    }

    #[inline]
    pub const fn is_bitfield(&self) -> bool {
        self.bitfield.is_some()
    }
}

/// A base class specification on an aggregate.
///
/// Declaration order among non-virtual bases is significant; among virtual
/// bases only preorder of discovery is.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct BaseSpec {
    pub class: TypeRef,
    pub is_virtual: bool,
}

impl BaseSpec {
    pub const fn direct(class: TypeRef) -> Self {
        BaseSpec {
            class,
            is_virtual: false,
        }
    }

    pub const fn virtual_base(class: TypeRef) -> Self {
        BaseSpec {
            class,
            is_virtual: true,
        }
    }
}

/// Structural view of one type, as much of it as layout needs.
#[derive(Clone, Eq, PartialEq, Debug)]
pub enum TypeDescriptor {
    /// A primitive with target-defined size and alignment.
    Scalar(Primitive),
    /// `element[length]`; the length must fold to a constant.
    Array { element: TypeRef, length: ExprRef },
    /// All members at offset zero.
    Union { members: Vec<Member> },
    /// Plain struct or class, possibly with bases and a vtable.
    Aggregate {
        bases: Vec<BaseSpec>,
        members: Vec<Member>,
        flags: ClassFlags,
    },
    /// References lay out exactly as their referee.
    Reference { referee: TypeRef },
}

/// Owning arena of type descriptors plus the query facade.
#[derive(Default, Debug)]
pub struct TypeTable {
    types: Vec<TypeDescriptor>,
}

impl TypeTable {
    pub fn new() -> Self {
        TypeTable::default()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    fn push(&mut self, descriptor: TypeDescriptor) -> TypeRef {
        let raw = u32::try_from(self.types.len()).unwrap_or_else(|_| {
            // 4+ billion types means the front end has already gone wrong.
            panic!("type table overflow")
        });
        self.types.push(descriptor);
        TypeRef::from_raw(raw)
    }

    pub fn scalar(&mut self, kind: Primitive) -> TypeRef {
        self.push(TypeDescriptor::Scalar(kind))
    }

    pub fn array(&mut self, element: TypeRef, length: ExprRef) -> TypeRef {
        self.push(TypeDescriptor::Array { element, length })
    }

    pub fn union_of(&mut self, members: Vec<Member>) -> TypeRef {
        self.push(TypeDescriptor::Union { members })
    }

    pub fn aggregate(
        &mut self,
        bases: Vec<BaseSpec>,
        members: Vec<Member>,
        flags: ClassFlags,
    ) -> TypeRef {
        self.push(TypeDescriptor::Aggregate {
            bases,
            members,
            flags,
        })
    }

    /// A plain struct: no bases, no object model, standard layout.
    pub fn record(&mut self, members: Vec<Member>) -> TypeRef {
        self.aggregate(Vec::new(), members, ClassFlags::STANDARD_LAYOUT)
    }

    pub fn reference(&mut self, referee: TypeRef) -> TypeRef {
        self.push(TypeDescriptor::Reference { referee })
    }

    /// Structural view of one type. Panics on a handle from another table.
    pub fn descriptor(&self, ty: TypeRef) -> &TypeDescriptor {
        &self.types[ty.index()]
    }

    /// Ordered member list of a union or aggregate; empty otherwise.
    pub fn members(&self, ty: TypeRef) -> &[Member] {
        match self.descriptor(ty) {
            TypeDescriptor::Union { members } | TypeDescriptor::Aggregate { members, .. } => {
                members
            }
            _ => &[],
        }
    }

    /// Direct base list of an aggregate; empty otherwise.
    pub fn bases(&self, ty: TypeRef) -> &[BaseSpec] {
        match self.descriptor(ty) {
            TypeDescriptor::Aggregate { bases, .. } => bases,
            _ => &[],
        }
    }

    /// Class-model flags of an aggregate; empty for every other kind.
    pub fn flags(&self, ty: TypeRef) -> ClassFlags {
        match self.descriptor(ty) {
            TypeDescriptor::Aggregate { flags, .. } => *flags,
            _ => ClassFlags::empty(),
        }
    }

    pub fn is_class(&self, ty: TypeRef) -> bool {
        matches!(self.descriptor(ty), TypeDescriptor::Aggregate { .. })
    }

    pub fn is_dynamic(&self, ty: TypeRef) -> bool {
        self.flags(ty).contains(ClassFlags::DYNAMIC)
    }

    pub fn is_empty_class(&self, ty: TypeRef) -> bool {
        self.flags(ty).contains(ClassFlags::EMPTY)
    }

    pub fn is_nearly_empty(&self, ty: TypeRef) -> bool {
        self.flags(ty).contains(ClassFlags::NEARLY_EMPTY)
    }

    pub fn is_standard_layout(&self, ty: TypeRef) -> bool {
        self.flags(ty).contains(ClassFlags::STANDARD_LAYOUT)
    }

    /// Type equivalence as the conflict check needs it: handle identity.
    ///
    /// The type table interns one descriptor per distinct type, so two
    /// subobjects have "the same type" exactly when their handles agree.
    pub fn equivalent(&self, a: TypeRef, b: TypeRef) -> bool {
        a == b
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::LiteralExprs;
    use pretty_assertions::assert_eq;

    #[test]
    fn facade_queries_on_aggregates() {
        let mut exprs = LiteralExprs::new();
        let mut table = TypeTable::new();
        let int = table.scalar(Primitive::Int);
        let s = table.aggregate(
            Vec::new(),
            vec![
                Member::field(int),
                Member::bitfield(int, exprs.literal(3)),
            ],
            ClassFlags::STANDARD_LAYOUT,
        );

        assert!(table.is_class(s));
        assert!(table.is_standard_layout(s));
        assert!(!table.is_dynamic(s));
        assert_eq!(table.members(s).len(), 2);
        assert!(table.members(s)[1].is_bitfield());
        assert!(table.bases(s).is_empty());
    }

    #[test]
    fn non_aggregates_report_no_structure() {
        let mut table = TypeTable::new();
        let int = table.scalar(Primitive::Int);
        assert!(table.members(int).is_empty());
        assert!(table.bases(int).is_empty());
        assert_eq!(table.flags(int), ClassFlags::empty());
        assert!(!table.is_class(int));
    }

    #[test]
    fn equivalence_is_handle_identity() {
        let mut table = TypeTable::new();
        let a = table.scalar(Primitive::Int);
        let b = table.scalar(Primitive::Int);
        // Distinct descriptors are distinct types even when structurally equal.
        assert!(table.equivalent(a, a));
        assert!(!table.equivalent(a, b));
    }
}
