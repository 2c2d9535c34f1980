//! ABI type layout for the Rill front end.
//!
//! Given the structure of an aggregate type (array, union, plain record,
//! or class with inheritance and virtual dispatch), this crate computes
//! the byte size, alignment, and per-member byte/bit offsets the target
//! ABI mandates, so that emitted code matches what a native compiler for
//! that target produces. Two layout families are implemented:
//!
//! - sequential (flat, C-style): arrays, unions, plain records, System V
//!   bitfield packing;
//! - inheritance-aware (Itanium C++ ABI style): primary base selection,
//!   vtable-pointer placement, empty-base-class optimization with
//!   subobject conflict detection, virtual base placement.
//!
//! Layouts are computed once per type and cached on the engine; drivers
//! must request constituents before the aggregates built from them
//! (bottom-up over the type dependency graph). There is no best-effort
//! mode: a layout is either exactly correct or an error.

mod engine;
mod error;
mod eval;
mod itanium;
mod ledger;
mod primary;
mod result;
mod sequential;
mod table;


pub use engine::LayoutEngine;
pub use error::LayoutError;
pub use eval::{ConstEval, ExprRef, LiteralExprs};
pub use result::{AggregateLayout, FieldOffset, TypeLayout};
pub use table::{
    BaseSpec, BitfieldSpec, ClassFlags, Member, TypeDescriptor, TypeRef, TypeTable,
};

// Handles are stored densely in ledgers and caches; keep them word-small.
#[cfg(target_pointer_width = "64")]
mod size_asserts {
    const _: () = assert!(std::mem::size_of::<super::TypeRef>() == 4);
    const _: () = assert!(std::mem::size_of::<super::ExprRef>() == 4);
}
