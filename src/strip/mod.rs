//! Reduction of an assembly to its public API surface.
//!
//! [`Stripper::strip`] rewrites an [`Assembly`] in place so that only the members a consumer
//! can compile against remain, and every remaining method body is replaced by a stub that
//! throws `System.NotImplementedException`.
//!
//! # Pass structure
//!
//! 1. **Setup** - the stub constructor is bound to the core library the assembly already
//!    references ([`StripConfig::bind_stub_target`]) and imported into the main module. Every
//!    attribute constructor is judged and every base type rewrite is planned against the
//!    unmodified model ([`AttributeVerdicts`], [`BaseRewrites`]); chains without a retained
//!    base get a `System.Object` reference. This is the only step that can fail, and it
//!    fails before anything is modified.
//! 2. **Walk** - base types are re-pointed, assembly and module attributes are filtered, then
//!    each type is walked post-order: nested types first, then attributes, members and the
//!    nested type list of the type itself. Top-level types that are not retained are removed
//!    last, together with the interface implementations and member references that pointed
//!    at removed definitions.
//! 3. **References** - references matching [`StripConfig::excluded_reference`] are removed and
//!    the type references scoped to them are moved to the scope of the stub constructor.
//!
//! Everything the pass needs is carried by a [`StripContext`], created per assembly, so any
//! number of assemblies can be stripped concurrently by the same [`Stripper`].
//!
//! # Examples
//!
//! ```rust,no_run
//! use dotstub::{AssemblyReader, NullResolver, PeImage, StripConfig, Stripper};
//! use std::path::Path;
//!
//! let mut assembly = PeImage.read_file(Path::new("Library.dll"))?;
//! let stats = Stripper::new(StripConfig::extended()).strip(&mut assembly, &NullResolver)?;
//! println!("{} methods stubbed", stats.methods_stubbed);
//! # Ok::<(), dotstub::Error>(())
//! ```

mod attributes;
mod bases;
mod body;
mod members;
mod policy;
mod walker;

pub use attributes::AttributeVerdicts;
pub use bases::BaseRewrites;
pub use policy::VisibilityPolicy;

use std::{borrow::Cow, collections::HashSet};

use serde::{Deserialize, Serialize};

use crate::{
    metadata::{
        assembly::{Assembly, ExternalConstructor},
        identity::Identity,
        method::DEFAULT_CTOR_SIGNATURE,
        module::Module,
        references::{AssemblyName, AssemblyRef, AssemblyVersion, ResolutionScope, TypeRef},
        resolver::AssemblyResolver,
        token::{TableId, Token},
        typesystem::TypeDef,
    },
    Error, Result,
};

/// Public key token of the ECMA core libraries (`b77a5c561934e089`)
pub const CORE_LIBRARY_KEY_TOKEN: [u8; 8] = [0xb7, 0x7a, 0x5c, 0x56, 0x19, 0x34, 0xe0, 0x89];

/// Simple names of the libraries that define or forward the base class library, in the order
/// a stub constructor is bound to them
pub const CORE_LIBRARY_NAMES: [&str; 4] = [
    "System.Runtime",
    "netstandard",
    "System.Private.CoreLib",
    "mscorlib",
];

/// Returns true if `name` is one of [`CORE_LIBRARY_NAMES`]
#[must_use]
pub fn is_core_library(name: &str) -> bool {
    CORE_LIBRARY_NAMES
        .iter()
        .any(|core| core.eq_ignore_ascii_case(name))
}

/// Removes assembly references by name and major version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceFilter {
    /// Simple name, compared case-insensitively
    pub name: String,
    /// Major version
    pub major: u16,
}

impl ReferenceFilter {
    /// The .NET 2.0 core library, which stubbed assemblies must not depend on
    #[must_use]
    pub fn legacy_core_library() -> Self {
        ReferenceFilter {
            name: "mscorlib".to_string(),
            major: 2,
        }
    }

    /// Returns true if the filter removes `reference`
    #[must_use]
    pub fn matches(&self, reference: &AssemblyRef) -> bool {
        self.matches_name(&reference.name, reference.version)
    }

    fn matches_name(&self, name: &str, version: AssemblyVersion) -> bool {
        name.eq_ignore_ascii_case(&self.name) && version.major == self.major
    }
}

/// Configuration of one stripping pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StripConfig {
    /// Which accessibility levels are retained
    pub policy: VisibilityPolicy,
    /// The parameterless constructor instantiated by every stub body
    pub stub_target: ExternalConstructor,
    /// Assembly references to remove, if any
    pub excluded_reference: Option<ReferenceFilter>,
}

impl StripConfig {
    /// Public members only; references are left alone
    #[must_use]
    pub fn strict() -> Self {
        StripConfig {
            policy: VisibilityPolicy::Strict,
            stub_target: not_implemented_exception(),
            excluded_reference: None,
        }
    }

    /// Public and protected members; references to the .NET 2.0 core library are removed
    #[must_use]
    pub fn extended() -> Self {
        StripConfig {
            policy: VisibilityPolicy::Extended,
            stub_target: not_implemented_exception(),
            excluded_reference: Some(ReferenceFilter::legacy_core_library()),
        }
    }
}

impl StripConfig {
    /// The stub constructor as it should be bound for `assembly`.
    ///
    /// A target in a core library is moved to the core library `assembly` already uses, so
    /// a `System.Runtime` or `netstandard` assembly does not gain a `mscorlib` reference:
    /// - a core library that defines the target type binds to itself
    /// - a reference with exactly the configured identity keeps the target as configured
    /// - otherwise the first reference named in [`CORE_LIBRARY_NAMES`] that the reference
    ///   filter keeps takes over
    ///
    /// Anything else is bound as configured.
    #[must_use]
    pub fn bind_stub_target(&self, assembly: &Assembly) -> Cow<'_, ExternalConstructor> {
        let target = &self.stub_target;
        if !is_core_library(&target.assembly.name) {
            return Cow::Borrowed(target);
        }
        let rebind = |name: AssemblyName| {
            Cow::Owned(ExternalConstructor {
                assembly: name,
                ..target.clone()
            })
        };

        let defines_target = assembly
            .main_module()
            .and_then(|module| module.find_type(&target.namespace, &target.type_name))
            .is_some();
        if is_core_library(&assembly.name) && defines_target {
            return rebind(assembly.assembly_name());
        }

        if assembly
            .references
            .iter()
            .any(|reference| reference.is_same_identity(&target.assembly))
        {
            return Cow::Borrowed(target);
        }

        let kept = |reference: &&AssemblyRef| {
            !self
                .excluded_reference
                .as_ref()
                .is_some_and(|filter| filter.matches(reference))
        };
        CORE_LIBRARY_NAMES
            .iter()
            .find_map(|name| {
                assembly
                    .references
                    .iter()
                    .filter(kept)
                    .find(|reference| reference.name.eq_ignore_ascii_case(name))
            })
            .map_or(Cow::Borrowed(target), |reference| {
                rebind(reference.assembly_name())
            })
    }
}

impl Default for StripConfig {
    fn default() -> Self {
        StripConfig::strict()
    }
}

/// `System.NotImplementedException::.ctor()` in `mscorlib` 4.0.0.0
#[must_use]
pub fn not_implemented_exception() -> ExternalConstructor {
    ExternalConstructor {
        assembly: AssemblyName {
            name: "mscorlib".to_string(),
            version: AssemblyVersion::new(4, 0, 0, 0),
            culture: None,
            public_key_token: Some(Identity::from_token_bytes(CORE_LIBRARY_KEY_TOKEN).to_token()),
        },
        namespace: "System".to_string(),
        type_name: "NotImplementedException".to_string(),
        signature: DEFAULT_CTOR_SIGNATURE.to_vec(),
    }
}

/// State of the pass over one assembly
pub struct StripContext<'a> {
    /// The configuration of the pass
    pub config: &'a StripConfig,
    /// The stub constructor, valid within the main module
    pub stub_constructor: Token,
    /// Visibility of every attribute constructor
    pub verdicts: AttributeVerdicts,
}

impl<'a> StripContext<'a> {
    /// Create a context from an already bound stub constructor
    #[must_use]
    pub fn new(
        config: &'a StripConfig,
        stub_constructor: Token,
        verdicts: AttributeVerdicts,
    ) -> Self {
        StripContext {
            config,
            stub_constructor,
            verdicts,
        }
    }
}

/// What a pass removed and rewrote
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StripStats {
    /// Types removed, nested ones included
    pub types_removed: usize,
    /// Fields removed
    pub fields_removed: usize,
    /// Methods removed
    pub methods_removed: usize,
    /// Properties removed
    pub properties_removed: usize,
    /// Events removed
    pub events_removed: usize,
    /// Custom attributes removed, on every level
    pub attributes_removed: usize,
    /// Assembly references removed
    pub references_removed: usize,
    /// Member references removed because their declaring definition is gone
    pub member_refs_removed: usize,
    /// Types re-pointed at another base type
    pub types_rebased: usize,
    /// Methods whose body is now the stub
    pub methods_stubbed: usize,
}

#[derive(Debug, Default, Clone, Copy)]
struct Census {
    types: usize,
    fields: usize,
    methods: usize,
    properties: usize,
    events: usize,
    attributes: usize,
}

impl Census {
    fn take(assembly: &Assembly) -> Self {
        let mut census = Census {
            attributes: assembly.custom_attributes.len(),
            ..Default::default()
        };

        if let Some(module) = assembly.main_module() {
            census.attributes += module.custom_attributes.len();
            for ty in module.all_types() {
                census.add(ty);
            }
        }

        census
    }

    fn add(&mut self, ty: &TypeDef) {
        self.types += 1;
        self.fields += ty.fields.len();
        self.methods += ty.methods.len();
        self.properties += ty.properties.len();
        self.events += ty.events.len();
        self.attributes += ty.custom_attributes.len()
            + ty.fields.iter().map(|f| f.custom_attributes.len()).sum::<usize>()
            + ty.methods.iter().map(|m| m.custom_attributes.len()).sum::<usize>()
            + ty.properties.iter().map(|p| p.custom_attributes.len()).sum::<usize>()
            + ty.events.iter().map(|e| e.custom_attributes.len()).sum::<usize>();
    }
}

/// Runs the stripping pass
#[derive(Debug, Clone, Default)]
pub struct Stripper {
    config: StripConfig,
}

impl Stripper {
    /// Create a stripper for `config`
    #[must_use]
    pub fn new(config: StripConfig) -> Self {
        Stripper { config }
    }

    /// The configuration in use
    #[must_use]
    pub fn config(&self) -> &StripConfig {
        &self.config
    }

    /// Strip `assembly` in place.
    ///
    /// `resolver` is consulted for attribute constructors declared in other assemblies;
    /// whatever it cannot resolve is treated as invisible.
    ///
    /// # Errors
    /// - [`Error::NoMainModule`] if the assembly has no module
    /// - [`Error::StubTargetUnavailable`] if the stub constructor cannot be bound, including
    ///   when its assembly is itself excluded by the reference filter, or if a base type has
    ///   to fall back to a local `System.Object` the assembly does not define
    /// - [`Error::TokenSpaceExhausted`] if importing the stub constructor or `System.Object`
    ///   needs a row a table does not have
    ///
    /// The assembly is left untouched when an error is returned.
    pub fn strip(
        &self,
        assembly: &mut Assembly,
        resolver: &dyn AssemblyResolver,
    ) -> Result<StripStats> {
        let config = &self.config;
        if assembly.main_module().is_none() {
            return Err(Error::NoMainModule);
        }
        if let Some(filter) = &config.excluded_reference {
            let target = &config.stub_target.assembly;
            if filter.matches_name(&target.name, target.version) {
                return Err(Error::StubTargetUnavailable(format!(
                    "{} is excluded by the reference filter",
                    target
                )));
            }
        }

        let target = config.bind_stub_target(assembly);
        let verdicts = AttributeVerdicts::compute(assembly, config.policy, resolver);
        let rewrites = assembly
            .main_module()
            .map(|module| BaseRewrites::compute(module, config.policy))
            .unwrap_or_default();
        let before = Census::take(assembly);

        let checkpoint = Checkpoint::take(assembly);
        let stub_constructor = assembly.import_constructor(&target)?;
        let root = if rewrites.needs_root() {
            match import_root(assembly, stub_constructor) {
                Ok(root) => Some(root),
                Err(error) => {
                    checkpoint.restore(assembly);
                    return Err(error);
                }
            }
        } else {
            None
        };
        log::debug!(
            "{}: bound {} as 0x{:08x}",
            assembly.name,
            target.display_name(),
            stub_constructor.value()
        );

        let ctx = StripContext::new(config, stub_constructor, verdicts);
        let mut types_rebased = 0;
        let mut member_refs_removed = 0;
        attributes::filter_attributes(&ctx, assembly);
        if let Some(module) = assembly.main_module_mut() {
            types_rebased = rewrites.apply(module, root);
            walker::walk_module(&ctx, module);
            member_refs_removed = walker::drop_orphaned_member_refs(module);
        }
        let references_removed = prune_references(&ctx, assembly);

        let after = Census::take(assembly);
        let stats = StripStats {
            types_removed: before.types - after.types,
            fields_removed: before.fields - after.fields,
            methods_removed: before.methods - after.methods,
            properties_removed: before.properties - after.properties,
            events_removed: before.events - after.events,
            attributes_removed: before.attributes - after.attributes,
            references_removed,
            member_refs_removed,
            types_rebased,
            methods_stubbed: after.methods,
        };

        log::debug!(
            "{}: removed {} types, {} fields, {} methods, {} properties, {} events, {} attributes, {} references, {} member references; rebased {} types",
            assembly.name,
            stats.types_removed,
            stats.fields_removed,
            stats.methods_removed,
            stats.properties_removed,
            stats.events_removed,
            stats.attributes_removed,
            stats.references_removed,
            stats.member_refs_removed,
            stats.types_rebased
        );

        Ok(stats)
    }
}

/// Table lengths of the rows setup may add, for undoing a setup that fails half way
struct Checkpoint {
    references: usize,
    type_refs: usize,
    member_refs: usize,
}

impl Checkpoint {
    fn take(assembly: &Assembly) -> Self {
        let module = assembly.main_module();
        Checkpoint {
            references: assembly.references.len(),
            type_refs: module.map_or(0, |module| module.type_refs.len()),
            member_refs: module.map_or(0, |module| module.member_refs.len()),
        }
    }

    fn restore(&self, assembly: &mut Assembly) {
        assembly.references.truncate(self.references);
        if let Some(module) = assembly.main_module_mut() {
            module.type_refs.truncate(self.type_refs);
            module.member_refs.truncate(self.member_refs);
        }
    }
}

/// Scope of the type declaring the stub constructor; `None` if the module defines it
fn stub_scope(module: &Module, stub_constructor: Token) -> Option<ResolutionScope> {
    let member_ref = module.member_ref(stub_constructor)?;
    module
        .type_ref(member_ref.parent)
        .map(|type_ref| type_ref.scope)
}

/// Find or add `System.Object` next to the stub constructor's declaring type
fn import_root(assembly: &mut Assembly, stub_constructor: Token) -> Result<Token> {
    let module = assembly.main_module_mut().ok_or(Error::NoMainModule)?;

    let Some(scope) = stub_scope(module, stub_constructor) else {
        return module
            .find_type("System", "Object")
            .map(|ty| ty.token)
            .ok_or_else(|| {
                Error::StubTargetUnavailable(format!("{} does not define System.Object", module.name))
            });
    };

    if let Some(existing) = module.type_refs.iter().find(|type_ref| {
        type_ref.scope == scope && type_ref.namespace == "System" && type_ref.name == "Object"
    }) {
        return Ok(existing.token);
    }

    let token = module.next_token(TableId::TYPE_REF)?;
    module.type_refs.push(TypeRef {
        token,
        scope,
        namespace: "System".to_string(),
        name: "Object".to_string(),
    });
    Ok(token)
}

/// Remove the excluded references and move the type references scoped to them over to the
/// scope of the stub constructor.
fn prune_references(ctx: &StripContext<'_>, assembly: &mut Assembly) -> usize {
    let Some(filter) = &ctx.config.excluded_reference else {
        return 0;
    };

    let removed: HashSet<Token> = assembly
        .references
        .iter()
        .filter(|reference| filter.matches(reference))
        .map(|reference| reference.token)
        .collect();
    if removed.is_empty() {
        return 0;
    }

    assembly
        .references
        .retain(|reference| !removed.contains(&reference.token));

    if let Some(module) = assembly.main_module_mut() {
        let replacement =
            stub_scope(module, ctx.stub_constructor).unwrap_or(ResolutionScope::Module);
        for type_ref in &mut module.type_refs {
            if let ResolutionScope::AssemblyRef(token) = type_ref.scope {
                if removed.contains(&token) {
                    log::trace!(
                        "Moving {}.{} to {:?}",
                        type_ref.namespace,
                        type_ref.name,
                        replacement
                    );
                    type_ref.scope = replacement;
                }
            }
        }
    }

    removed.len()
}
