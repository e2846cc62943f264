//! Recursive traversal of the type graph.

use std::collections::HashSet;

use crate::{
    metadata::{
        module::Module,
        token::{TableId, Token},
        typesystem::TypeDef,
    },
    strip::{
        attributes::filter_attributes,
        members::{prune_members, prune_nested_types},
        StripContext,
    },
};

/// Strip `ty` and everything nested in it.
///
/// Nested types are walked first, including the ones `ty` is about to remove; whether a type
/// is kept depends only on its own visibility, never on what is left of its members.
pub fn walk_type(ctx: &StripContext<'_>, ty: &mut TypeDef) {
    for nested in &mut ty.nested_types {
        walk_type(ctx, nested);
    }

    filter_attributes(ctx, ty);
    prune_members(ctx, ty);
    prune_nested_types(ctx, ty);
}

/// Strip every type of `module` and remove the top-level types that are not retained.
pub fn walk_module(ctx: &StripContext<'_>, module: &mut Module) {
    filter_attributes(ctx, module);

    for ty in &mut module.types {
        walk_type(ctx, ty);
    }

    let policy = ctx.config.policy;
    module
        .types
        .retain(|ty| policy.retains_type(ty.visibility()));

    drop_removed_interfaces(module);
}

/// Remove member references declared on a type or method definition no longer present.
/// Returns the number removed.
pub fn drop_orphaned_member_refs(module: &mut Module) -> usize {
    let mut defined = HashSet::new();
    for ty in module.all_types() {
        defined.insert(ty.token);
        defined.extend(ty.methods.iter().map(|method| method.token));
    }

    let before = module.member_refs.len();
    module.member_refs.retain(|member_ref| {
        let parent = member_ref.parent;
        let local = parent.is_table(TableId::TYPE_DEF) || parent.is_table(TableId::METHOD_DEF);
        if local && !defined.contains(&parent) {
            log::trace!(
                "Dropping member reference {} on removed 0x{:08x}",
                member_ref.name,
                parent.value()
            );
            return false;
        }
        true
    });
    before - module.member_refs.len()
}

/// Remove interface implementations that point at a type definition no longer present
fn drop_removed_interfaces(module: &mut Module) {
    let defined: HashSet<Token> = module.all_types().iter().map(|ty| ty.token).collect();

    fn drop_in(ty: &mut TypeDef, defined: &HashSet<Token>) {
        ty.interfaces
            .retain(|interface| !interface.is_table(TableId::TYPE_DEF) || defined.contains(interface));
        for nested in &mut ty.nested_types {
            drop_in(nested, defined);
        }
    }

    for ty in &mut module.types {
        drop_in(ty, &defined);
    }
}
