//! Computed layout records.
//!
//! A [`TypeLayout`] is written exactly once per type by the engine and
//! cached; later stages query it, they never re-derive it. Aggregates carry
//! the per-member and per-base offsets alongside the size/alignment pair.

use crate::table::TypeRef;

/// Where one member landed.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum FieldOffset {
    /// Ordinary member at a byte offset from the start of the object.
    Byte(u64),
    /// Bitfield packed into a storage unit.
    Bits {
        /// Byte offset of the storage unit holding the field.
        unit: u64,
        /// First bit of the field, counted from the start of the unit.
        bit: u64,
        /// Storage unit size in bytes (the declared type's size).
        unit_size: u64,
    },
}

impl FieldOffset {
    /// Byte offset of the member, or of its storage unit for bitfields.
    pub const fn byte_offset(&self) -> u64 {
        match *self {
            FieldOffset::Byte(offset) => offset,
            FieldOffset::Bits { unit, .. } => unit,
        }
    }

    /// Bit offset within the first occupied byte, for bitfields.
    pub const fn bit_within_byte(&self) -> Option<u64> {
        match *self {
            FieldOffset::Byte(_) => None,
            FieldOffset::Bits { bit, .. } => Some(bit % 8),
        }
    }
}

/// Offsets and non-virtual extents of an aggregate.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct AggregateLayout {
    /// Parallel to the declaration-ordered member list.
    pub field_offsets: Vec<FieldOffset>,
    /// Parallel to the direct base list.
    pub base_offsets: Vec<u64>,
    /// Every distinct virtual base of the transitive hierarchy, in
    /// preorder of discovery, with its offset in the complete object.
    pub vbase_offsets: Vec<(TypeRef, u64)>,
    /// Data size: high-water mark excluding trailing padding.
    pub dsize: u64,
    /// Size when this class is placed as a base of another class.
    pub nvsize: u64,
    /// Alignment when this class is placed as a base of another class.
    pub nvalign: u64,
}

/// Size, alignment, and (for aggregates) offsets of one laid-out type.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct TypeLayout {
    pub size: u64,
    pub align: u64,
    pub aggregate: Option<AggregateLayout>,
}

impl TypeLayout {
    /// Layout of a type with no internal structure.
    pub const fn plain(size: u64, align: u64) -> Self {
        TypeLayout {
            size,
            align,
            aggregate: None,
        }
    }

    /// Non-virtual size: the aggregate's recorded nvsize, or the full size
    /// for types that never distinguish the two.
    pub fn nvsize(&self) -> u64 {
        match &self.aggregate {
            Some(agg) => agg.nvsize,
            None => self.size,
        }
    }

    /// Non-virtual alignment, falling back to the full alignment.
    pub fn nvalign(&self) -> u64 {
        match &self.aggregate {
            Some(agg) => agg.nvalign,
            None => self.align,
        }
    }

    /// Data size (extent excluding trailing padding), falling back to the
    /// full size.
    pub fn dsize(&self) -> u64 {
        match &self.aggregate {
            Some(agg) => agg.dsize,
            None => self.size,
        }
    }

    /// Offset of the `index`th declared member, if this is an aggregate.
    pub fn field_offset(&self, index: usize) -> Option<FieldOffset> {
        self.aggregate
            .as_ref()
            .and_then(|agg| agg.field_offsets.get(index))
            .copied()
    }

    /// Offset of the `index`th direct base, if this is an aggregate.
    pub fn base_offset(&self, index: usize) -> Option<u64> {
        self.aggregate
            .as_ref()
            .and_then(|agg| agg.base_offsets.get(index))
            .copied()
    }

    /// Offset of a virtual base anywhere in the hierarchy.
    pub fn virtual_base_offset(&self, class: TypeRef) -> Option<u64> {
        self.aggregate.as_ref().and_then(|agg| {
            agg.vbase_offsets
                .iter()
                .find(|(vbase, _)| *vbase == class)
                .map(|&(_, offset)| offset)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_layout_has_no_structure() {
        let layout = TypeLayout::plain(4, 4);
        assert_eq!(layout.field_offset(0), None);
        assert_eq!(layout.base_offset(0), None);
        assert_eq!(layout.nvsize(), 4);
        assert_eq!(layout.nvalign(), 4);
        assert_eq!(layout.dsize(), 4);
    }

    #[test]
    fn bitfield_offset_reports_bit_within_byte() {
        let off = FieldOffset::Bits {
            unit: 2,
            bit: 9,
            unit_size: 2,
        };
        assert_eq!(off.byte_offset(), 2);
        assert_eq!(off.bit_within_byte(), Some(1));
        assert_eq!(FieldOffset::Byte(8).bit_within_byte(), None);
    }
}
