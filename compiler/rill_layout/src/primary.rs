//! Primary base selection.
//!
//! A dynamic class reuses one base class's layout as its own initial
//! segment when it can, so the vtable pointer is not duplicated. The
//! precedence is the Itanium one: first non-virtual dynamic direct base in
//! declaration order, otherwise the first nearly-empty virtual base in the
//! preorder inheritance graph that is not already the primary base of some
//! other base ("claimed"), otherwise the first nearly-empty virtual base
//! found at all.

use crate::table::{TypeRef, TypeTable};

/// Outcome of primary base selection.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct PrimaryBase {
    pub class: TypeRef,
    pub is_virtual: bool,
}

/// All bases of `ty`, direct and indirect, in preorder.
///
/// Deduplicated by `(class, is_virtual)`: a class reached virtually through
/// two paths is one entry, a class reached both virtually and non-virtually
/// is two. Non-virtual repeats stay distinct; they are distinct subobjects.
pub(crate) fn preorder_bases(table: &TypeTable, ty: TypeRef) -> Vec<(TypeRef, bool)> {
    let mut found = Vec::new();
    collect_bases(table, ty, &mut found);
    found
}

fn collect_bases(table: &TypeTable, ty: TypeRef, found: &mut Vec<(TypeRef, bool)>) {
    for base in table.bases(ty) {
        let duplicate_virtual = base.is_virtual
            && found
                .iter()
                .any(|&(class, is_virtual)| class == base.class && is_virtual);
        if duplicate_virtual {
            continue;
        }
        found.push((base.class, base.is_virtual));
        collect_bases(table, base.class, found);
    }
}

/// Choose the primary base of `ty`, if it has one.
pub(crate) fn select_primary(table: &TypeTable, ty: TypeRef) -> Option<PrimaryBase> {
    let all_bases = preorder_bases(table, ty);

    // Virtual bases that are already the primary base of some other base in
    // the hierarchy. Choosing one of these again would share a vtable
    // pointer that is already spoken for.
    let mut claimed: Vec<TypeRef> = Vec::new();
    for &(base, _) in &all_bases {
        if let Some(primary) = select_primary(table, base) {
            if primary.is_virtual && !claimed.contains(&primary.class) {
                claimed.push(primary.class);
            }
        }
    }

    // a) The first non-virtual dynamic direct base, in declaration order.
    for base in table.bases(ty) {
        if !base.is_virtual && table.is_dynamic(base.class) {
            return Some(PrimaryBase {
                class: base.class,
                is_virtual: false,
            });
        }
    }

    // b) The first unclaimed nearly-empty virtual base in preorder, falling
    // back to the first nearly-empty virtual base at all.
    let mut first_nearly_empty = None;
    for &(base, is_virtual) in &all_bases {
        if is_virtual && table.is_nearly_empty(base) {
            if first_nearly_empty.is_none() {
                first_nearly_empty = Some(base);
            }
            if !claimed.contains(&base) {
                return Some(PrimaryBase {
                    class: base,
                    is_virtual: true,
                });
            }
        }
    }

    first_nearly_empty.map(|class| PrimaryBase {
        class,
        is_virtual: true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::{BaseSpec, ClassFlags};
    use pretty_assertions::assert_eq;

    fn dynamic_class(table: &mut TypeTable, bases: Vec<BaseSpec>) -> TypeRef {
        table.aggregate(bases, Vec::new(), ClassFlags::DYNAMIC)
    }

    #[test]
    fn preorder_walks_depth_first() {
        let mut table = TypeTable::new();
        let a = dynamic_class(&mut table, Vec::new());
        let b = dynamic_class(&mut table, vec![BaseSpec::direct(a)]);
        let c = dynamic_class(&mut table, Vec::new());
        let d = dynamic_class(&mut table, vec![BaseSpec::direct(b), BaseSpec::direct(c)]);

        let order = preorder_bases(&table, d);
        assert_eq!(order, vec![(b, false), (a, false), (c, false)]);
    }

    #[test]
    fn virtual_base_reached_twice_is_one_entry() {
        let mut table = TypeTable::new();
        let v = dynamic_class(&mut table, Vec::new());
        let left = dynamic_class(&mut table, vec![BaseSpec::virtual_base(v)]);
        let right = dynamic_class(&mut table, vec![BaseSpec::virtual_base(v)]);
        let join = dynamic_class(
            &mut table,
            vec![BaseSpec::direct(left), BaseSpec::direct(right)],
        );

        let order = preorder_bases(&table, join);
        assert_eq!(order, vec![(left, false), (v, true), (right, false)]);
    }

    #[test]
    fn nonvirtual_repeats_stay_distinct() {
        let mut table = TypeTable::new();
        let a = table.aggregate(
            Vec::new(),
            Vec::new(),
            ClassFlags::EMPTY | ClassFlags::STANDARD_LAYOUT,
        );
        let b = table.aggregate(vec![BaseSpec::direct(a)], Vec::new(), ClassFlags::EMPTY);
        let c = table.aggregate(vec![BaseSpec::direct(a)], Vec::new(), ClassFlags::EMPTY);
        let d = table.aggregate(
            vec![BaseSpec::direct(b), BaseSpec::direct(c)],
            Vec::new(),
            ClassFlags::EMPTY,
        );

        let order = preorder_bases(&table, d);
        assert_eq!(order, vec![(b, false), (a, false), (c, false), (a, false)]);
    }

    #[test]
    fn first_nonvirtual_dynamic_direct_base_wins() {
        let mut table = TypeTable::new();
        let plain = table.aggregate(Vec::new(), Vec::new(), ClassFlags::STANDARD_LAYOUT);
        let dynamic = dynamic_class(&mut table, Vec::new());
        let derived = dynamic_class(
            &mut table,
            vec![BaseSpec::direct(plain), BaseSpec::direct(dynamic)],
        );

        let primary = select_primary(&table, derived);
        assert_eq!(
            primary,
            Some(PrimaryBase {
                class: dynamic,
                is_virtual: false,
            })
        );
    }

    #[test]
    fn nearly_empty_virtual_base_is_fallback_primary() {
        let mut table = TypeTable::new();
        let v = table.aggregate(
            Vec::new(),
            Vec::new(),
            ClassFlags::DYNAMIC | ClassFlags::NEARLY_EMPTY,
        );
        let derived = dynamic_class(&mut table, vec![BaseSpec::virtual_base(v)]);

        let primary = select_primary(&table, derived);
        assert_eq!(
            primary,
            Some(PrimaryBase {
                class: v,
                is_virtual: true,
            })
        );
    }

    #[test]
    fn claimed_virtual_primary_is_skipped_when_possible() {
        let mut table = TypeTable::new();
        // v1 is the primary base of mid; a class deriving from mid must
        // prefer a different nearly-empty virtual base.
        let v1 = table.aggregate(
            Vec::new(),
            Vec::new(),
            ClassFlags::DYNAMIC | ClassFlags::NEARLY_EMPTY,
        );
        let v2 = table.aggregate(
            Vec::new(),
            Vec::new(),
            ClassFlags::DYNAMIC | ClassFlags::NEARLY_EMPTY,
        );
        let mid = dynamic_class(&mut table, vec![BaseSpec::virtual_base(v1)]);
        let derived = dynamic_class(
            &mut table,
            vec![BaseSpec::direct(mid), BaseSpec::virtual_base(v2)],
        );

        // mid is dynamic and non-virtual, so rule (a) selects it first.
        let primary = select_primary(&table, derived);
        assert_eq!(
            primary,
            Some(PrimaryBase {
                class: mid,
                is_virtual: false,
            })
        );

        // With only virtual candidates, v1 is claimed by mid, so v2 wins
        // even though v1 comes first in preorder.
        let virtual_only = dynamic_class(
            &mut table,
            vec![BaseSpec::virtual_base(mid), BaseSpec::virtual_base(v2)],
        );
        let primary = select_primary(&table, virtual_only);
        assert_eq!(
            primary,
            Some(PrimaryBase {
                class: v2,
                is_virtual: true,
            })
        );
    }

    #[test]
    fn no_candidates_means_no_primary() {
        let mut table = TypeTable::new();
        let derived = dynamic_class(&mut table, Vec::new());
        assert_eq!(select_primary(&table, derived), None);
    }
}
