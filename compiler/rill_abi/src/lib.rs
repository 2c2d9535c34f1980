//! Target ABI configuration for Rill.
//!
//! A [`TargetEnv`] is the immutable table of primitive sizes and alignments
//! that a compilation target mandates, plus a handful of target-wide knobs
//! (signedness of plain `char`, the type `sizeof` yields). The layout engine
//! never computes these values; it only reads them.
//!
//! Environments are process-wide constants: construct one per target and
//! share it freely. Nothing here is ever mutated after construction.

use std::fmt;

/// Primitive object kinds the layout engine can ask a target about.
///
/// `Pointer` covers pointers to objects; pointers to data members, plain
/// functions, and member functions are distinct kinds because the Itanium
/// ABI gives them distinct sizes (a pointer-to-member-function is two
/// `ptrdiff_t`s wide).
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum Primitive {
    Bool,
    Char,
    WideChar,
    Short,
    Int,
    Long,
    LongLong,
    Float,
    Double,
    LongDouble,
    Pointer,
    DataMemberPointer,
    FunctionPointer,
    MemberFunctionPointer,
}

impl fmt::Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Primitive::Bool => "bool",
            Primitive::Char => "char",
            Primitive::WideChar => "wchar_t",
            Primitive::Short => "short",
            Primitive::Int => "int",
            Primitive::Long => "long",
            Primitive::LongLong => "long long",
            Primitive::Float => "float",
            Primitive::Double => "double",
            Primitive::LongDouble => "long double",
            Primitive::Pointer => "pointer",
            Primitive::DataMemberPointer => "pointer-to-data-member",
            Primitive::FunctionPointer => "pointer-to-function",
            Primitive::MemberFunctionPointer => "pointer-to-member-function",
        };
        f.write_str(name)
    }
}

/// Size and alignment of one primitive, in bytes.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct PrimLayout {
    pub size: u64,
    pub align: u64,
}

impl PrimLayout {
    const fn of(size: u64, align: u64) -> Self {
        PrimLayout { size, align }
    }
}

/// Which layout family the front end is translating for.
///
/// The C family uses the flat sequential algorithm for every aggregate; the
/// C++ family adds the Itanium-style inheritance-aware algorithm for classes
/// with a nontrivial object model.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum LayoutFamily {
    C,
    Cxx,
}

/// Immutable per-target table of primitive sizes and alignments.
///
/// Field order follows the kinds in [`Primitive`]; use
/// [`TargetEnv::primitive`] rather than reaching into fields when the kind
/// is not statically known.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct TargetEnv {
    pub name: &'static str,

    pub bool_: PrimLayout,
    pub char_: PrimLayout,
    pub wide_char: PrimLayout,
    pub short: PrimLayout,
    pub int: PrimLayout,
    pub long: PrimLayout,
    pub long_long: PrimLayout,
    pub float: PrimLayout,
    pub double: PrimLayout,
    pub long_double: PrimLayout,
    pub pointer: PrimLayout,
    pub data_member_pointer: PrimLayout,
    pub function_pointer: PrimLayout,
    pub member_function_pointer: PrimLayout,

    /// Whether plain `char` behaves as `signed char` on this target.
    pub plain_char_signed: bool,
    /// The primitive `sizeof` expressions evaluate to.
    pub sizeof_type: Primitive,
}

impl TargetEnv {
    /// Look up the size/alignment of one primitive kind.
    pub const fn primitive(&self, kind: Primitive) -> PrimLayout {
        match kind {
            Primitive::Bool => self.bool_,
            Primitive::Char => self.char_,
            Primitive::WideChar => self.wide_char,
            Primitive::Short => self.short,
            Primitive::Int => self.int,
            Primitive::Long => self.long,
            Primitive::LongLong => self.long_long,
            Primitive::Float => self.float,
            Primitive::Double => self.double,
            Primitive::LongDouble => self.long_double,
            Primitive::Pointer => self.pointer,
            Primitive::DataMemberPointer => self.data_member_pointer,
            Primitive::FunctionPointer => self.function_pointer,
            Primitive::MemberFunctionPointer => self.member_function_pointer,
        }
    }

    /// Linux IA-32. Nothing is aligned to more than 4 bytes here, including
    /// `long long` and `double`.
    pub const fn linux_ia32() -> Self {
        TargetEnv {
            name: "linux-ia32",
            bool_: PrimLayout::of(1, 1),
            char_: PrimLayout::of(1, 1),
            wide_char: PrimLayout::of(2, 2),
            short: PrimLayout::of(2, 2),
            int: PrimLayout::of(4, 4),
            long: PrimLayout::of(4, 4),
            long_long: PrimLayout::of(8, 4),
            float: PrimLayout::of(4, 4),
            double: PrimLayout::of(8, 4),
            long_double: PrimLayout::of(12, 4),
            pointer: PrimLayout::of(4, 4),
            // One ptrdiff_t
            data_member_pointer: PrimLayout::of(4, 4),
            function_pointer: PrimLayout::of(4, 4),
            // Two ptrdiff_t
            member_function_pointer: PrimLayout::of(8, 4),
            plain_char_signed: true,
            sizeof_type: Primitive::Int,
        }
    }

    /// Linux x86-64, System V psABI.
    pub const fn linux_x86_64() -> Self {
        TargetEnv {
            name: "linux-x86_64",
            bool_: PrimLayout::of(1, 1),
            char_: PrimLayout::of(1, 1),
            wide_char: PrimLayout::of(4, 4),
            short: PrimLayout::of(2, 2),
            int: PrimLayout::of(4, 4),
            long: PrimLayout::of(8, 8),
            long_long: PrimLayout::of(8, 8),
            float: PrimLayout::of(4, 4),
            double: PrimLayout::of(8, 8),
            long_double: PrimLayout::of(16, 16),
            pointer: PrimLayout::of(8, 8),
            data_member_pointer: PrimLayout::of(8, 8),
            function_pointer: PrimLayout::of(8, 8),
            member_function_pointer: PrimLayout::of(16, 8),
            plain_char_signed: true,
            sizeof_type: Primitive::Long,
        }
    }
}
