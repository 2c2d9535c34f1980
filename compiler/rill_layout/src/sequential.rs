//! Sequential (flat, C-style) layout.
//!
//! Arrays, unions, and plain aggregates: members are placed in declaration
//! order with internal padding, System V bitfield packing (bitfields never
//! straddle storage units), and tail padding to the whole alignment. A
//! zero-sized result is replaced by the target's signed-int layout; the ABI
//! does not permit zero-sized objects.

use crate::engine::LayoutEngine;
use crate::error::{LayoutError, Result};
use crate::eval::ConstEval;
use crate::result::{AggregateLayout, FieldOffset, TypeLayout};
use crate::table::{BitfieldSpec, TypeDescriptor, TypeRef};

/// Round `value` up to the nearest multiple of `align`.
pub(crate) fn align_up(value: u64, align: u64) -> u64 {
    if align <= 1 {
        value
    } else {
        value.div_ceil(align) * align
    }
}

/// In-progress bitfield run: the byte offset of the current storage unit
/// and the first free bit within it.
#[derive(Copy, Clone, Debug)]
pub(crate) struct BitfieldState {
    pub unit: u64,
    pub bit: u64,
}

impl BitfieldState {
    /// Seed a run from a byte cursor: the unit starts at the cursor rounded
    /// down to the storage alignment, with the bytes below the cursor
    /// already counted as occupied.
    pub fn seed(offset: u64, storage_align: u64) -> Self {
        let align = storage_align.max(1);
        let unit = offset - offset % align;
        BitfieldState {
            unit,
            bit: (offset % align) * 8,
        }
    }

    /// Byte cursor just past every bit consumed so far.
    pub fn resync_offset(&self) -> u64 {
        self.unit + self.bit.div_ceil(8)
    }
}

/// Resolve a bitfield width and check it against the storage unit.
///
/// Widths that do not fold, or that exceed the storage type's bit size,
/// are fatal: the front end validates the latter long before layout runs.
pub(crate) fn bitfield_width<E: ConstEval>(
    engine: &LayoutEngine<'_, E>,
    ty: TypeRef,
    member: usize,
    spec: BitfieldSpec,
    storage_bits: u64,
) -> Result<u64> {
    let width = engine
        .eval()
        .evaluate(spec.width)
        .ok_or(LayoutError::UnresolvedBitfieldWidth { ty, member })?;
    if width > storage_bits {
        return Err(LayoutError::BitfieldTooWide {
            ty,
            member,
            width,
            storage_bits,
        });
    }
    Ok(width)
}

/// Array layout: `length x element`, aligned as the element.
///
/// The extent must fold to a constant; layout of an array of unknown
/// extent is impossible, not approximate.
pub(crate) fn layout_array<E: ConstEval>(
    engine: &LayoutEngine<'_, E>,
    ty: TypeRef,
) -> Result<TypeLayout> {
    let TypeDescriptor::Array { element, length } = engine.table().descriptor(ty) else {
        return Err(LayoutError::UnhandledKind { ty });
    };
    let element = engine.constituent(*element)?;
    let extent = engine
        .eval()
        .evaluate(*length)
        .ok_or(LayoutError::UnresolvedArrayExtent { ty })?;
    let size = extent
        .checked_mul(element.size)
        .ok_or(LayoutError::ArrayTooLarge { ty, extent })?;

    Ok(TypeLayout::plain(size, element.align))
}

/// Union layout: max size, max alignment, every member at offset zero.
pub(crate) fn layout_union<E: ConstEval>(
    engine: &LayoutEngine<'_, E>,
    ty: TypeRef,
) -> Result<TypeLayout> {
    let table = engine.table();
    let members = table.members(ty);

    let mut size = 0u64;
    let mut align = 1u64;
    let mut field_offsets = Vec::with_capacity(members.len());

    for (index, member) in members.iter().enumerate() {
        let member_layout = engine.constituent(member.ty)?;
        match member.bitfield {
            Some(spec) => {
                // A union bitfield occupies the low bits of one storage
                // unit at offset zero. Unlike the struct walk, every
                // member contributes to the union alignment, named or not.
                bitfield_width(engine, ty, index, spec, member_layout.size * 8)?;
                size = size.max(member_layout.size);
                align = align.max(member_layout.align);
                field_offsets.push(FieldOffset::Bits {
                    unit: 0,
                    bit: 0,
                    unit_size: member_layout.size,
                });
            }
            None => {
                size = size.max(member_layout.size);
                align = align.max(member_layout.align);
                field_offsets.push(FieldOffset::Byte(0));
            }
        }
    }

    size = align_up(size, align);
    if size == 0 {
        // A union with no data is an empty struct for layout purposes.
        let int = engine.env().int;
        size = int.size;
        align = int.align;
    }

    Ok(TypeLayout {
        size,
        align,
        aggregate: Some(AggregateLayout {
            field_offsets,
            base_offsets: Vec::new(),
            vbase_offsets: Vec::new(),
            dsize: size,
            nvsize: size,
            nvalign: align,
        }),
    })
}

/// Flat record layout: bases (for standard-layout chains delegated from the
/// class algorithm), then members in declaration order.
pub(crate) fn layout_record<E: ConstEval>(
    engine: &LayoutEngine<'_, E>,
    ty: TypeRef,
) -> Result<TypeLayout> {
    let table = engine.table();
    let bases = table.bases(ty);
    let members = table.members(ty);

    let mut offset = 0u64;
    let mut whole_align = 1u64;
    let mut base_offsets = Vec::with_capacity(bases.len());
    let mut field_offsets = Vec::with_capacity(members.len());

    // A standard-layout chain has at most one level with data; empty bases
    // contribute alignment but occupy no storage.
    for base in bases {
        debug_assert!(!base.is_virtual, "standard-layout class with a virtual base");
        let base_layout = engine.constituent(base.class)?;
        whole_align = whole_align.max(base_layout.align);
        if table.is_empty_class(base.class) {
            base_offsets.push(0);
        } else {
            offset = align_up(offset, base_layout.align);
            base_offsets.push(offset);
            offset += base_layout.size;
        }
    }

    let mut run: Option<BitfieldState> = None;

    for (index, member) in members.iter().enumerate() {
        let member_layout = engine.constituent(member.ty)?;
        let member_size = member_layout.size;
        let member_align = member_layout.align;

        match member.bitfield {
            Some(spec) => {
                // If the previous member was not a bitfield, the bit cursor
                // re-seeds just past it, relative to the storage alignment.
                let mut state = match run {
                    Some(state) => state,
                    None => BitfieldState::seed(offset, member_align),
                };
                let width = bitfield_width(engine, ty, index, spec, member_size * 8)?;

                if width == 0 {
                    // Conventional "close the unit" marker: consume every
                    // remaining bit of the current storage unit. Does not
                    // contribute to the record alignment.
                    field_offsets.push(FieldOffset::Bits {
                        unit: state.unit,
                        bit: state.bit,
                        unit_size: member_size,
                    });
                    state.bit = align_up(state.bit, member_size * 8);
                } else {
                    if state.bit + width > member_size * 8 {
                        // No overlap packing in System V: the field does
                        // not fit in the remaining bits, so it opens a new
                        // suitably aligned storage unit.
                        let next = align_up(state.resync_offset(), member_align);
                        state = BitfieldState { unit: next, bit: 0 };
                    }
                    field_offsets.push(FieldOffset::Bits {
                        unit: state.unit,
                        bit: state.bit,
                        unit_size: member_size,
                    });
                    state.bit += width;
                    if !spec.is_unnamed {
                        // Named bitfields do contribute to the whole
                        // alignment; unnamed padding does not.
                        whole_align = whole_align.max(member_align);
                    }
                }
                run = Some(state);
            }
            None => {
                if let Some(state) = run.take() {
                    // Back from bits to bytes: round the cursor up past
                    // the consumed bits.
                    offset = state.resync_offset();
                }
                whole_align = whole_align.max(member_align);
                offset = align_up(offset, member_align);
                field_offsets.push(FieldOffset::Byte(offset));
                offset += member_size;
            }
        }
    }

    if let Some(state) = run.take() {
        offset = state.resync_offset();
    }

    // Tail padding: the next laid-out entity must satisfy the alignment.
    offset = align_up(offset, whole_align);

    if offset == 0 {
        // Empty record: give it the extent of a signed int.
        let int = engine.env().int;
        offset = int.size;
        whole_align = int.align;
    }

    Ok(TypeLayout {
        size: offset,
        align: whole_align,
        aggregate: Some(AggregateLayout {
            field_offsets,
            base_offsets,
            vbase_offsets: Vec::new(),
            dsize: offset,
            nvsize: offset,
            nvalign: whole_align,
        }),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn align_up_rounds_to_multiples() {
        assert_eq!(align_up(0, 4), 0);
        assert_eq!(align_up(1, 4), 4);
        assert_eq!(align_up(4, 4), 4);
        assert_eq!(align_up(5, 4), 8);
        assert_eq!(align_up(7, 1), 7);
        assert_eq!(align_up(7, 0), 7);
    }

    #[test]
    fn bitfield_state_seeds_relative_to_unit() {
        // Cursor at byte 1, 2-byte storage: unit 0, bit 8.
        let state = BitfieldState::seed(1, 2);
        assert_eq!(state.unit, 0);
        assert_eq!(state.bit, 8);
        assert_eq!(state.resync_offset(), 1);

        // Aligned cursor: fresh unit.
        let state = BitfieldState::seed(4, 4);
        assert_eq!(state.unit, 4);
        assert_eq!(state.bit, 0);
        assert_eq!(state.resync_offset(), 4);
    }

    #[test]
    fn resync_rounds_partial_bytes_up() {
        let state = BitfieldState { unit: 4, bit: 9 };
        assert_eq!(state.resync_offset(), 6);
        let state = BitfieldState { unit: 4, bit: 16 };
        assert_eq!(state.resync_offset(), 6);
    }
}
