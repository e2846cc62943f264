//! Base types of retained types that derive from removed ones.
//!
//! A public type may derive from an internal one. Once the internal type is gone, the public
//! type is re-pointed at the nearest type of its original base chain that is retained, or at
//! a type outside the module (`TypeRef`/`TypeSpec`) the chain reaches first. A chain made of
//! removed definitions only ends at the core library's `System.Object`.

use std::collections::{HashMap, HashSet};

use crate::{
    metadata::{
        module::Module,
        token::{TableId, Token},
        typesystem::TypeDef,
    },
    strip::VisibilityPolicy,
};

/// The base type rewrites of one module, planned on the unmodified type graph
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BaseRewrites {
    /// New base of each retained type whose base is removed; `None` when no retained base is
    /// left and `System.Object` takes over
    rewrites: HashMap<Token, Option<Token>>,
}

impl BaseRewrites {
    /// Plan the rewrites for `module` under `policy`
    #[must_use]
    pub fn compute(module: &Module, policy: VisibilityPolicy) -> Self {
        let retained = retained_types(module, policy);
        let bases: HashMap<Token, Option<Token>> = module
            .all_types()
            .iter()
            .map(|ty| (ty.token, ty.extends))
            .collect();

        let mut rewrites = HashMap::new();
        for token in &retained {
            let Some(base) = bases.get(token).copied().flatten() else {
                continue;
            };
            if !base.is_table(TableId::TYPE_DEF) || retained.contains(&base) {
                continue;
            }
            rewrites.insert(*token, nearest_retained(base, &bases, &retained));
        }

        BaseRewrites { rewrites }
    }

    /// Returns true if nothing needs rewriting
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rewrites.is_empty()
    }

    /// Returns true if some type is left without a retained base
    #[must_use]
    pub fn needs_root(&self) -> bool {
        self.rewrites.values().any(Option::is_none)
    }

    /// Re-point the base types of `module`; `root` stands in for the chains without a
    /// retained type. Returns the number of types rewritten.
    pub fn apply(&self, module: &mut Module, root: Option<Token>) -> usize {
        fn apply_in(
            ty: &mut TypeDef,
            rewrites: &HashMap<Token, Option<Token>>,
            root: Option<Token>,
        ) -> usize {
            let mut count = 0;
            if let Some(base) = rewrites.get(&ty.token) {
                let base = base.or(root);
                log::trace!("Rebasing {} from {:?} to {:?}", ty.full_name(), ty.extends, base);
                ty.extends = base;
                count += 1;
            }
            for nested in &mut ty.nested_types {
                count += apply_in(nested, rewrites, root);
            }
            count
        }

        if self.rewrites.is_empty() {
            return 0;
        }
        module
            .types
            .iter_mut()
            .map(|ty| apply_in(ty, &self.rewrites, root))
            .sum()
    }
}

/// Tokens of the types `policy` keeps, nested types only when their whole declaring chain is
/// kept
fn retained_types(module: &Module, policy: VisibilityPolicy) -> HashSet<Token> {
    fn collect(ty: &TypeDef, top_level: bool, policy: VisibilityPolicy, kept: &mut HashSet<Token>) {
        let keep = if top_level {
            policy.retains_type(ty.visibility())
        } else {
            policy.retains_nested(ty.visibility())
        };
        if !keep {
            return;
        }
        kept.insert(ty.token);
        for nested in &ty.nested_types {
            collect(nested, false, policy, kept);
        }
    }

    let mut kept = HashSet::new();
    for ty in &module.types {
        collect(ty, true, policy, &mut kept);
    }
    kept
}

/// Follow the base chain from `base` to the first retained definition or the first type
/// defined elsewhere
fn nearest_retained(
    mut base: Token,
    bases: &HashMap<Token, Option<Token>>,
    retained: &HashSet<Token>,
) -> Option<Token> {
    let mut seen = HashSet::new();
    loop {
        if !base.is_table(TableId::TYPE_DEF) || retained.contains(&base) {
            return Some(base);
        }
        if !seen.insert(base) {
            return None;
        }
        base = bases.get(&base).copied().flatten()?;
    }
}
