//! Inheritance-aware (Itanium C++ ABI style) class layout.
//!
//! A class with a nontrivial object model is laid out in phases: primary
//! base or vtable pointer first, then the remaining direct non-virtual
//! bases in declaration order, then data members and bitfields, then the
//! virtual bases of the whole hierarchy, then tail padding. Empty bases
//! try to share offset zero; the offset ledger keeps two subobjects of the
//! same type from ever sharing an address.
//!
//! Standard-layout classes degenerate to the flat algorithm and are
//! delegated wholesale, so tail-padding logic exists in exactly one place.

use crate::engine::LayoutEngine;
use crate::error::Result;
use crate::eval::ConstEval;
use crate::ledger::OffsetLedger;
use crate::primary;
use crate::result::{AggregateLayout, FieldOffset, TypeLayout};
use crate::sequential::{self, align_up, BitfieldState};
use crate::table::{BitfieldSpec, TypeRef};

/// Lay out one class. Returns the layout plus the ledger bytes consumed,
/// which the engine folds into its diagnostic memory counter.
pub(crate) fn layout_class<E: ConstEval>(
    engine: &LayoutEngine<'_, E>,
    ty: TypeRef,
) -> Result<(TypeLayout, u64)> {
    let table = engine.table();

    if table.is_standard_layout(ty) {
        return Ok((sequential::layout_record(engine, ty)?, 0));
    }

    let bases = table.bases(ty);
    let members = table.members(ty);

    let mut builder = Builder {
        engine,
        ledger: OffsetLedger::new(),
        size: 0,
        align: 1,
        dsize: 0,
        prev_base: None,
        run: None,
    };

    let mut base_offsets = vec![0u64; bases.len()];
    let mut vbase_offsets: Vec<(TypeRef, u64)> = Vec::new();
    let mut primary_index = None;
    let mut primary_virtual = None;

    // Step 1: vtable pointer or primary base at offset zero.
    if table.is_dynamic(ty) {
        match primary::select_primary(table, ty) {
            None => {
                let ptr = engine.env().pointer;
                builder.size = ptr.size;
                builder.align = ptr.align;
                builder.dsize = ptr.size;
                tracing::trace!(ty = %ty, "vtable pointer at offset 0");
            }
            Some(primary) => {
                let primary_layout = engine.constituent(primary.class)?;
                builder.size = primary_layout.size;
                builder.align = primary_layout.align;
                builder.dsize = primary_layout.dsize();
                builder.register(primary.class, 0)?;
                if primary.is_virtual {
                    vbase_offsets.push((primary.class, 0));
                    primary_virtual = Some(primary.class);
                } else {
                    primary_index = bases
                        .iter()
                        .position(|base| !base.is_virtual && base.class == primary.class);
                    if let Some(index) = primary_index {
                        base_offsets[index] = 0;
                    }
                }
                // The primary's reused segment already contains its own
                // virtual bases at their recorded offsets; they are
                // subsumed, not placed again in step 5.
                if let Some(agg) = primary_layout.aggregate.as_ref() {
                    for &(vbase, offset) in &agg.vbase_offsets {
                        if vbase_offsets.iter().all(|&(placed, _)| placed != vbase) {
                            builder.register(vbase, offset)?;
                            vbase_offsets.push((vbase, offset));
                        }
                    }
                }
                builder.prev_base = Some(primary.class);
                tracing::trace!(ty = %ty, primary = %primary.class, "primary base at offset 0");
            }
        }
    }

    // Step 2: remaining direct non-virtual bases, declaration order.
    for (index, base) in bases.iter().enumerate() {
        if base.is_virtual || Some(index) == primary_index {
            continue;
        }
        base_offsets[index] = builder.lay_component(base.class, true)?;
    }

    // Step 3: data members and bitfields, declaration order.
    let mut field_offsets = Vec::with_capacity(members.len());
    for (index, member) in members.iter().enumerate() {
        match member.bitfield {
            Some(spec) => {
                field_offsets.push(builder.lay_bitfield(ty, index, member.ty, spec)?);
            }
            None => {
                let offset = builder.lay_component(member.ty, false)?;
                field_offsets.push(FieldOffset::Byte(offset));
            }
        }
    }

    // Step 4: the non-virtual extents, before any virtual base lands.
    let nvalign = builder.align;
    let nvsize = builder.size;

    // Step 5: every distinct virtual base of the hierarchy, preorder,
    // minus the one already subsumed as primary.
    for (vbase, is_virtual) in primary::preorder_bases(table, ty) {
        if !is_virtual || Some(vbase) == primary_virtual {
            continue;
        }
        if vbase_offsets.iter().any(|&(placed, _)| placed == vbase) {
            continue;
        }
        let offset = builder.lay_component(vbase, true)?;
        vbase_offsets.push((vbase, offset));
        if let Some(index) = bases
            .iter()
            .position(|base| base.is_virtual && base.class == vbase)
        {
            base_offsets[index] = offset;
        }
    }

    // Step 6: tail padding.
    let mut size = align_up(builder.size, builder.align);
    let mut align = builder.align;
    if size == 0 {
        let int = engine.env().int;
        size = int.size;
        align = int.align;
    }

    let layout = TypeLayout {
        size,
        align,
        aggregate: Some(AggregateLayout {
            field_offsets,
            base_offsets,
            vbase_offsets,
            dsize: builder.dsize,
            nvsize,
            nvalign,
        }),
    };
    Ok((layout, builder.ledger.bytes_allocated()))
}

/// Working state for one class-layout call.
struct Builder<'e, 't, E> {
    engine: &'e LayoutEngine<'t, E>,
    ledger: OffsetLedger,
    size: u64,
    align: u64,
    /// Data size: high-water mark excluding trailing padding.
    dsize: u64,
    /// Set while the previous placed component was a base class; bitfields
    /// may not start inside that base's tail padding.
    prev_base: Option<TypeRef>,
    /// In-progress bitfield run, if the previous member was a bitfield.
    run: Option<BitfieldState>,
}

impl<E: ConstEval> Builder<'_, '_, E> {
    /// Place one base class or non-bitfield data member.
    ///
    /// Non-empty components start at `dsize` rounded up to their alignment
    /// and slide forward past exact-offset same-type collisions. Empty
    /// bases try offset zero first and deliberately do not advance `dsize`,
    /// so siblings of different types can reuse the same bytes.
    fn lay_component(&mut self, component: TypeRef, is_base: bool) -> Result<u64> {
        let table = self.engine.table();
        let layout = self.engine.constituent(component)?;

        let offset = if is_base && table.is_empty_class(component) {
            let nvalign = layout.nvalign().max(1);
            let mut candidate = 0;
            if self.conflicts(component, candidate)? {
                candidate = self.dsize;
                while self.conflicts(component, candidate)? {
                    candidate += nvalign;
                }
            }
            self.register(component, candidate)?;
            self.size = self.size.max(candidate + layout.size);
            candidate
        } else {
            let (component_align, component_size) = if is_base {
                (layout.nvalign(), layout.nvsize())
            } else {
                (layout.align, layout.size)
            };
            let align = component_align.max(1);
            let mut candidate = align_up(self.dsize, align);
            while self.conflicts(component, candidate)? {
                candidate += align;
            }
            self.register(component, candidate)?;
            self.size = self.size.max(candidate + component_size);
            self.dsize = candidate + component_size;
            self.align = self.align.max(align);
            candidate
        };

        tracing::trace!(component = %component, offset, is_base, "placed component");
        self.prev_base = is_base.then_some(component);
        self.run = None;
        Ok(offset)
    }

    /// Place one bitfield, packing into the current storage unit when the
    /// remaining bits allow, per the same System V rule as the flat
    /// algorithm. The one extra constraint here: a bitfield never starts
    /// inside the tail padding of a preceding base class.
    fn lay_bitfield(
        &mut self,
        owner: TypeRef,
        index: usize,
        storage: TypeRef,
        spec: BitfieldSpec,
    ) -> Result<FieldOffset> {
        let layout = self.engine.constituent(storage)?;
        let storage_bits = layout.size * 8;
        let width = sequential::bitfield_width(self.engine, owner, index, spec, storage_bits)?;

        let mut state = match self.run {
            Some(state) => state,
            None => {
                let mut cursor = self.dsize;
                if let Some(prev) = self.prev_base {
                    let prev_layout = self.engine.constituent(prev)?;
                    cursor = align_up(cursor, prev_layout.nvalign());
                }
                BitfieldState::seed(cursor, layout.align)
            }
        };

        let placed;
        if width == 0 {
            placed = FieldOffset::Bits {
                unit: state.unit,
                bit: state.bit,
                unit_size: layout.size,
            };
            state.bit = align_up(state.bit, storage_bits);
        } else {
            if state.bit + width > storage_bits {
                let next = align_up(state.resync_offset(), layout.align);
                state = BitfieldState { unit: next, bit: 0 };
            }
            placed = FieldOffset::Bits {
                unit: state.unit,
                bit: state.bit,
                unit_size: layout.size,
            };
            state.bit += width;
            if !spec.is_unnamed {
                self.align = self.align.max(layout.align);
            }
        }

        self.dsize = state.resync_offset();
        self.size = self.size.max(self.dsize);
        self.run = Some(state);
        self.prev_base = None;
        Ok(placed)
    }

    /// Record a placed component and, recursively, every non-virtual base
    /// and non-bitfield member nested inside it, at their final offsets.
    fn register(&mut self, component: TypeRef, offset: u64) -> Result<()> {
        self.ledger.record(component, offset);

        let table = self.engine.table();
        if !table.is_class(component) {
            return Ok(());
        }
        let layout = self.engine.constituent(component)?;
        let Some(agg) = layout.aggregate.as_ref() else {
            return Ok(());
        };
        for (index, base) in table.bases(component).iter().enumerate() {
            if !base.is_virtual {
                self.register(base.class, offset + agg.base_offsets[index])?;
            }
        }
        for (index, member) in table.members(component).iter().enumerate() {
            if !member.is_bitfield() {
                self.register(member.ty, offset + agg.field_offsets[index].byte_offset())?;
            }
        }
        Ok(())
    }

    /// Would placing `component` at `offset` put any of its subobjects at
    /// the exact offset of an already-placed subobject of the same type?
    ///
    /// Only exact-offset identical-type collisions are checked; the ABI
    /// guarantees nothing about partial range overlap, and non-empty
    /// subobjects get fresh storage from the `dsize` cursor anyway.
    fn conflicts(&self, component: TypeRef, offset: u64) -> Result<bool> {
        let table = self.engine.table();
        if self.ledger.has_equivalent_at(table, component, offset) {
            return Ok(true);
        }
        if !table.is_class(component) {
            return Ok(false);
        }
        let layout = self.engine.constituent(component)?;
        let Some(agg) = layout.aggregate.as_ref() else {
            return Ok(false);
        };
        for (index, base) in table.bases(component).iter().enumerate() {
            if !base.is_virtual && self.conflicts(base.class, offset + agg.base_offsets[index])? {
                return Ok(true);
            }
        }
        for (index, member) in table.members(component).iter().enumerate() {
            if !member.is_bitfield()
                && self.conflicts(member.ty, offset + agg.field_offsets[index].byte_offset())?
            {
                return Ok(true);
            }
        }
        Ok(false)
    }
}
