//! The difference between a modified assembly and the image it was read from.
//!
//! Images are never re-encoded from the model. [`ImagePatch::between`] compares the model
//! read from the source image with the modified one and expresses the modification as row
//! operations the writer can replay on the source image:
//!
//! - rows whose token disappeared from the model are removed
//! - rows present in both whose base type, resolution scope, body or implementation flags
//!   changed are updated
//! - reference rows (`AssemblyRef`, `TypeRef`, `MemberRef`) with new tokens are added
//!
//! Definitions cannot be added this way; a model that gained a type, member or attribute is
//! rejected.

use std::collections::{BTreeMap, BTreeSet};

use crate::{
    metadata::{
        assembly::Assembly,
        customattributes::CustomAttribute,
        method::MethodDef,
        module::Module,
        references::{AssemblyRef, MemberRef, TypeRef},
        token::Token,
        typesystem::TypeDef,
    },
    Error, Result,
};

/// Row operations turning a source image into the image of a modified model
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImagePatch {
    /// `TypeDef` rows to remove
    pub removed_types: Vec<Token>,
    /// `MethodDef` rows to remove
    pub removed_methods: Vec<Token>,
    /// `Field` rows to remove
    pub removed_fields: Vec<Token>,
    /// `Property` rows to remove
    pub removed_properties: Vec<Token>,
    /// `Event` rows to remove
    pub removed_events: Vec<Token>,
    /// `CustomAttribute` rows to remove
    pub removed_attributes: Vec<Token>,
    /// `InterfaceImpl` rows to remove, as (implementing type, interface)
    pub removed_interfaces: Vec<(Token, Token)>,
    /// `MemberRef` rows to remove
    pub removed_member_refs: Vec<Token>,
    /// `AssemblyRef` rows to remove
    pub removed_references: Vec<Token>,
    /// `AssemblyRef` rows to add
    pub added_references: Vec<AssemblyRef>,
    /// `TypeRef` rows to add
    pub added_type_refs: Vec<TypeRef>,
    /// `MemberRef` rows to add
    pub added_member_refs: Vec<MemberRef>,
    /// `TypeRef` rows whose resolution scope changed
    pub rescoped_type_refs: Vec<TypeRef>,
    /// `TypeDef` rows whose base type changed
    pub rebased_types: Vec<(Token, Option<Token>)>,
    /// `MethodDef` rows whose body or implementation flags changed
    pub rewritten_methods: Vec<MethodDef>,
}

impl ImagePatch {
    /// Compute the patch that turns `original` into `modified`.
    ///
    /// # Errors
    /// - [`Error::NoMainModule`] if either assembly has no module
    /// - [`Error::Error`] if `modified` defines a type, member, interface implementation or
    ///   custom attribute that `original` does not
    pub fn between(original: &Assembly, modified: &Assembly) -> Result<ImagePatch> {
        let before = original.main_module().ok_or(Error::NoMainModule)?;
        let after = modified.main_module().ok_or(Error::NoMainModule)?;

        let mut patch = ImagePatch::default();
        patch.diff_types(before, after)?;
        patch.diff_attributes(original, modified)?;
        patch.diff_references(original, modified, before, after);

        log::trace!(
            "Patch removes {} types, {} methods, {} fields, {} attributes; rewrites {} methods",
            patch.removed_types.len(),
            patch.removed_methods.len(),
            patch.removed_fields.len(),
            patch.removed_attributes.len(),
            patch.rewritten_methods.len()
        );
        Ok(patch)
    }

    /// Returns true if applying the patch would not change the image
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == ImagePatch::default()
    }

    fn diff_types(&mut self, before: &Module, after: &Module) -> Result<()> {
        let old = types_by_token(before);
        let new = types_by_token(after);

        if let Some(token) = new.keys().find(|token| !old.contains_key(token)) {
            return Err(added_error("TypeDef", *token));
        }

        for (token, ty) in &old {
            match new.get(token) {
                None => {
                    self.removed_types.push(*token);
                    self.removed_methods.extend(ty.methods.iter().map(|m| m.token));
                    self.removed_fields.extend(ty.fields.iter().map(|f| f.token));
                    self.removed_properties
                        .extend(ty.properties.iter().map(|p| p.token));
                    self.removed_events.extend(ty.events.iter().map(|e| e.token));
                }
                Some(kept) => self.diff_type(ty, kept)?,
            }
        }

        self.removed_methods.sort_unstable();
        self.removed_fields.sort_unstable();
        self.removed_properties.sort_unstable();
        self.removed_events.sort_unstable();
        Ok(())
    }

    fn diff_type(&mut self, old: &TypeDef, new: &TypeDef) -> Result<()> {
        if old.extends != new.extends {
            self.rebased_types.push((old.token, new.extends));
        }

        if let Some(interface) = new
            .interfaces
            .iter()
            .find(|interface| !old.interfaces.contains(interface))
        {
            return Err(Error::Error(format!(
                "Interface implementation {} on {} was added",
                interface, new.token
            )));
        }
        self.removed_interfaces.extend(
            old.interfaces
                .iter()
                .filter(|interface| !new.interfaces.contains(interface))
                .map(|interface| (old.token, *interface)),
        );

        self.removed_fields.extend(removed(
            "Field",
            old.fields.iter().map(|f| f.token),
            new.fields.iter().map(|f| f.token),
        )?);
        self.removed_properties.extend(removed(
            "Property",
            old.properties.iter().map(|p| p.token),
            new.properties.iter().map(|p| p.token),
        )?);
        self.removed_events.extend(removed(
            "Event",
            old.events.iter().map(|e| e.token),
            new.events.iter().map(|e| e.token),
        )?);
        self.removed_methods.extend(removed(
            "MethodDef",
            old.methods.iter().map(|m| m.token),
            new.methods.iter().map(|m| m.token),
        )?);

        for method in &new.methods {
            let Some(previous) = old.methods.iter().find(|m| m.token == method.token) else {
                continue;
            };
            if previous.body != method.body || previous.impl_flags != method.impl_flags {
                self.rewritten_methods.push(MethodDef {
                    custom_attributes: Vec::new(),
                    ..method.clone()
                });
            }
        }
        Ok(())
    }

    fn diff_attributes(&mut self, original: &Assembly, modified: &Assembly) -> Result<()> {
        let old = attribute_tokens(original);
        let new = attribute_tokens(modified);

        if let Some(added) = new.iter().find(|token| !old.contains(token)) {
            return Err(added_error("CustomAttribute", *added));
        }
        if count_attributes(modified) != new.len() {
            return Err(Error::Error(
                "A custom attribute without a row was added".to_string(),
            ));
        }

        self.removed_attributes = old.difference(&new).copied().collect();
        Ok(())
    }

    fn diff_references(
        &mut self,
        original: &Assembly,
        modified: &Assembly,
        before: &Module,
        after: &Module,
    ) {
        for reference in &original.references {
            if modified.reference(reference.token).is_none() {
                self.removed_references.push(reference.token);
            }
        }
        for reference in &modified.references {
            if original.reference(reference.token).is_none() {
                self.added_references.push(reference.clone());
            }
        }

        for type_ref in &after.type_refs {
            match before.type_ref(type_ref.token) {
                None => self.added_type_refs.push(type_ref.clone()),
                Some(previous) if previous.scope != type_ref.scope => {
                    self.rescoped_type_refs.push(type_ref.clone());
                }
                Some(_) => {}
            }
        }

        for member_ref in &before.member_refs {
            if after.member_ref(member_ref.token).is_none() {
                self.removed_member_refs.push(member_ref.token);
            }
        }
        for member_ref in &after.member_refs {
            if before.member_ref(member_ref.token).is_none() {
                self.added_member_refs.push(member_ref.clone());
            }
        }

        self.removed_references.sort_unstable();
        self.removed_member_refs.sort_unstable();
        self.added_references.sort_unstable_by_key(|reference| reference.token);
        self.added_type_refs.sort_unstable_by_key(|type_ref| type_ref.token);
        self.added_member_refs
            .sort_unstable_by_key(|member_ref| member_ref.token);
    }
}

fn added_error(table: &str, token: Token) -> Error {
    Error::Error(format!("{table} {token} is not in the source image"))
}

fn types_by_token(module: &Module) -> BTreeMap<Token, &TypeDef> {
    module
        .all_types()
        .into_iter()
        .map(|ty| (ty.token, ty))
        .collect()
}

/// Tokens of `old` missing from `new`; errors if `new` has tokens `old` does not
fn removed(
    table: &str,
    old: impl Iterator<Item = Token>,
    new: impl Iterator<Item = Token>,
) -> Result<Vec<Token>> {
    let old: BTreeSet<Token> = old.collect();
    let new: BTreeSet<Token> = new.collect();

    if let Some(added) = new.difference(&old).next() {
        return Err(added_error(table, *added));
    }
    Ok(old.difference(&new).copied().collect())
}

fn each_attribute_list(assembly: &Assembly, f: &mut dyn FnMut(&[CustomAttribute])) {
    f(&assembly.custom_attributes);
    let Some(module) = assembly.main_module() else {
        return;
    };
    f(&module.custom_attributes);

    for ty in module.all_types() {
        f(&ty.custom_attributes);
        for field in &ty.fields {
            f(&field.custom_attributes);
        }
        for method in &ty.methods {
            f(&method.custom_attributes);
        }
        for property in &ty.properties {
            f(&property.custom_attributes);
        }
        for event in &ty.events {
            f(&event.custom_attributes);
        }
    }
}

fn attribute_tokens(assembly: &Assembly) -> BTreeSet<Token> {
    let mut tokens = BTreeSet::new();
    each_attribute_list(assembly, &mut |attributes| {
        tokens.extend(attributes.iter().filter_map(|attribute| attribute.token));
    });
    tokens
}

fn count_attributes(assembly: &Assembly) -> usize {
    let mut count = 0;
    each_attribute_list(assembly, &mut |attributes| count += attributes.len());
    count
}
