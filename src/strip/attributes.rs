//! Custom attribute filtering.
//!
//! Whether an attribute survives depends only on its constructor. All constructors are
//! judged once, up front, against the model as it was loaded; the walk then only looks the
//! verdicts up. Judging up front keeps the verdicts independent of the order in which the
//! walk removes types and members.

use std::collections::HashMap;

use crate::{
    metadata::{
        assembly::Assembly,
        customattributes::{CustomAttribute, HasCustomAttributes},
        resolver::AssemblyResolver,
        token::Token,
        typesystem::TypeDef,
    },
    strip::{policy::VisibilityPolicy, StripContext},
};

/// The visibility of every attribute constructor used by an assembly
#[derive(Debug, Clone, Default)]
pub struct AttributeVerdicts {
    visible: HashMap<Token, bool>,
}

impl AttributeVerdicts {
    /// Judge every distinct attribute constructor of `assembly`.
    ///
    /// A constructor is visible if it resolves, its accessibility is retained by `policy`,
    /// and every type declaring it is retained as well.
    #[must_use]
    pub fn compute(
        assembly: &Assembly,
        policy: VisibilityPolicy,
        resolver: &dyn AssemblyResolver,
    ) -> Self {
        let mut visible = HashMap::new();

        for constructor in constructors(assembly) {
            visible.entry(constructor).or_insert_with(|| {
                let verdict = assembly
                    .resolve_method(constructor, resolver)
                    .is_some_and(|resolved| {
                        policy.retains(resolved.access)
                            && policy.retains_chain(&resolved.declaring_chain)
                    });
                if !verdict {
                    log::trace!(
                        "Attribute constructor 0x{:08x} is not visible",
                        constructor.value()
                    );
                }
                verdict
            });
        }

        AttributeVerdicts { visible }
    }

    /// Returns true if an attribute with this constructor is kept.
    ///
    /// Attributes without a constructor, or with one that was never judged, are not.
    #[must_use]
    pub fn is_visible(&self, constructor: Option<Token>) -> bool {
        constructor
            .and_then(|token| self.visible.get(&token).copied())
            .unwrap_or(false)
    }

    /// Number of distinct constructors judged
    #[must_use]
    pub fn len(&self) -> usize {
        self.visible.len()
    }

    /// Returns true if the assembly uses no attributes
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.visible.is_empty()
    }
}

/// Remove every attribute of `owner` whose constructor is not visible.
///
/// The order of the remaining attributes is preserved.
pub fn filter_attributes<T: HasCustomAttributes + ?Sized>(ctx: &StripContext<'_>, owner: &mut T) {
    owner
        .custom_attributes_mut()
        .retain(|attribute| ctx.verdicts.is_visible(attribute.constructor));
}

fn constructors(assembly: &Assembly) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut collect = |attributes: &[CustomAttribute]| {
        tokens.extend(attributes.iter().filter_map(|attribute| attribute.constructor));
    };

    collect(&assembly.custom_attributes);
    if let Some(module) = assembly.main_module() {
        collect(&module.custom_attributes);
        for ty in &module.types {
            ty.visit(&mut |ty: &TypeDef| {
                collect(&ty.custom_attributes);
                ty.fields.iter().for_each(|f| collect(&f.custom_attributes));
                ty.methods.iter().for_each(|m| collect(&m.custom_attributes));
                ty.properties.iter().for_each(|p| collect(&p.custom_attributes));
                ty.events.iter().for_each(|e| collect(&e.custom_attributes));
            });
        }
    }

    tokens
}
