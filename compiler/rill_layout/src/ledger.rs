//! Subobject offset ledger.
//!
//! While laying out one class, the engine tracks which subobjects (bases
//! and data members, recursively expanded) already sit at each byte offset.
//! The ledger answers exactly one question: is there already a subobject of
//! an equivalent type at this exact offset? Distinct same-type objects may
//! never share an address; that is the only overlap rule the ABI imposes,
//! so offset ranges are never checked, only exact-offset collisions.
//!
//! A ledger lives for a single class-layout call and is discarded with it.

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::table::{TypeRef, TypeTable};

type Entries = SmallVec<[TypeRef; 2]>;

/// Byte offset -> subobjects already placed there.
#[derive(Default, Debug)]
pub struct OffsetLedger {
    slots: FxHashMap<u64, Entries>,
    bytes: u64,
}

impl OffsetLedger {
    pub fn new() -> Self {
        OffsetLedger::default()
    }

    /// Record one subobject at one offset. Append-only; entries are never
    /// removed within a layout call.
    pub fn record(&mut self, ty: TypeRef, offset: u64) {
        let entries = self.slots.entry(offset).or_insert_with(|| {
            self.bytes += std::mem::size_of::<(u64, Entries)>() as u64;
            Entries::new()
        });
        if entries.len() >= entries.inline_size() {
            self.bytes += std::mem::size_of::<TypeRef>() as u64;
        }
        entries.push(ty);
    }

    /// Is there a subobject of an equivalent type at exactly this offset?
    pub fn has_equivalent_at(&self, table: &TypeTable, ty: TypeRef, offset: u64) -> bool {
        self.slots
            .get(&offset)
            .is_some_and(|entries| entries.iter().any(|&entry| table.equivalent(entry, ty)))
    }

    /// Bookkeeping bytes consumed by this ledger, for the engine's
    /// diagnostic memory counter.
    pub fn bytes_allocated(&self) -> u64 {
        self.bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rill_abi::Primitive;

    #[test]
    fn exact_offset_equivalent_type_collides() {
        let mut table = TypeTable::new();
        let a = table.scalar(Primitive::Int);
        let b = table.scalar(Primitive::Int);

        let mut ledger = OffsetLedger::new();
        ledger.record(a, 0);
        ledger.record(b, 4);

        assert!(ledger.has_equivalent_at(&table, a, 0));
        // Different offset: no collision, even for the same type.
        assert!(!ledger.has_equivalent_at(&table, a, 4));
        // Same offset, inequivalent type: no collision.
        assert!(!ledger.has_equivalent_at(&table, b, 0));
    }

    #[test]
    fn multiple_entries_share_an_offset() {
        let mut table = TypeTable::new();
        let a = table.scalar(Primitive::Char);
        let b = table.scalar(Primitive::Short);
        let c = table.scalar(Primitive::Int);

        let mut ledger = OffsetLedger::new();
        ledger.record(a, 0);
        ledger.record(b, 0);
        ledger.record(c, 0);

        for ty in [a, b, c] {
            assert!(ledger.has_equivalent_at(&table, ty, 0));
        }
    }

    #[test]
    fn byte_accounting_grows_monotonically() {
        let mut table = TypeTable::new();
        let a = table.scalar(Primitive::Int);

        let mut ledger = OffsetLedger::new();
        assert_eq!(ledger.bytes_allocated(), 0);
        ledger.record(a, 0);
        let after_one = ledger.bytes_allocated();
        assert!(after_one > 0);
        ledger.record(a, 8);
        assert!(ledger.bytes_allocated() > after_one);
    }
}
