//! Layout error taxonomy.
//!
//! None of these are recoverable inside the engine: there is no retry and
//! no degraded computation. The driver is expected to format the error and
//! abort translation of the current unit. A layout is either exactly
//! correct or not produced.

use crate::table::TypeRef;

/// Fatal layout failures.
#[derive(Clone, Eq, PartialEq, Debug, thiserror::Error)]
pub enum LayoutError {
    /// An array extent did not fold to a constant unsigned integer.
    #[error("cannot compute the size of array {ty}: extent is not a constant")]
    UnresolvedArrayExtent { ty: TypeRef },

    /// An array's byte size does not fit in the offset arithmetic.
    #[error("array {ty} with {extent} elements overflows the object size limit")]
    ArrayTooLarge { ty: TypeRef, extent: u64 },

    /// A bitfield width did not fold to a constant unsigned integer.
    #[error("bitfield width of member #{member} of {ty} is not a constant")]
    UnresolvedBitfieldWidth { ty: TypeRef, member: usize },

    /// A bitfield is declared wider than its storage type. The front end
    /// rejects this earlier; seeing it here is an invariant violation.
    #[error(
        "bitfield width {width} of member #{member} of {ty} exceeds its \
         storage unit ({storage_bits} bits)"
    )]
    BitfieldTooWide {
        ty: TypeRef,
        member: usize,
        width: u64,
        storage_bits: u64,
    },

    /// Layout requested for a kind the engine does not handle under the
    /// active layout family.
    #[error("layout requested for unhandled type kind: {ty}")]
    UnhandledKind { ty: TypeRef },

    /// A constituent type has no layout yet: the caller violated the
    /// bottom-up dependency order.
    #[error("{ty} has no layout yet; constituents must be laid out first")]
    NotLaidOut { ty: TypeRef },
}

pub type Result<T> = std::result::Result<T, LayoutError>;
