//! Member pruning within one type.
//!
//! Properties and events are kept as long as one of their accessors survives; the accessor
//! handles that point at removed methods are cleared first, so no retained property or event
//! refers to a method that is gone.

use std::collections::HashSet;

use crate::{
    metadata::{token::Token, typesystem::TypeDef},
    strip::{attributes::filter_attributes, body::stub_method, StripContext},
};

/// Prune the fields, properties, events and methods of `ty`, stub the surviving methods and
/// filter the attributes of every surviving member.
pub fn prune_members(ctx: &StripContext<'_>, ty: &mut TypeDef) {
    let policy = ctx.config.policy;

    ty.fields.retain(|field| policy.retains(field.access()));
    for field in &mut ty.fields {
        filter_attributes(ctx, field);
    }

    let retained: HashSet<Token> = ty
        .methods
        .iter()
        .filter(|method| policy.retains(method.access()))
        .map(|method| method.token)
        .collect();
    let clear_removed = |accessor: &mut Option<Token>| {
        if accessor.is_some_and(|token| !retained.contains(&token)) {
            *accessor = None;
        }
    };

    for property in &mut ty.properties {
        clear_removed(&mut property.getter);
        clear_removed(&mut property.setter);
    }
    ty.properties.retain(|property| !property.has_no_accessors());
    for property in &mut ty.properties {
        filter_attributes(ctx, property);
    }

    for event in &mut ty.events {
        clear_removed(&mut event.add_method);
        clear_removed(&mut event.remove_method);
        clear_removed(&mut event.raise_method);
    }
    ty.events.retain(|event| !event.has_no_accessors());
    for event in &mut ty.events {
        filter_attributes(ctx, event);
    }

    ty.methods.retain(|method| retained.contains(&method.token));
    for method in &mut ty.methods {
        stub_method(ctx, method);
        filter_attributes(ctx, method);
    }
}

/// Remove the nested types of `ty` that are not retained
pub fn prune_nested_types(ctx: &StripContext<'_>, ty: &mut TypeDef) {
    let policy = ctx.config.policy;
    ty.nested_types
        .retain(|nested| policy.retains_nested(nested.visibility()));
}
