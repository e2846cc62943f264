//! Assemblies: identity, references and modules, plus the two collaborator services the
//! stripping pass needs from the model, constructor import and constructor resolution.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::{
    metadata::{
        customattributes::CustomAttribute,
        flags::{MemberAccess, TypeVisibility},
        method::{MethodDef, CTOR},
        module::{max_row, Module},
        references::{
            AssemblyName, AssemblyRef, AssemblyVersion, MemberRef, ResolutionScope, TypeRef,
        },
        resolver::AssemblyResolver,
        token::{TableId, Token, MAX_ROW},
        typesystem::TypeDef,
    },
    Error, Result,
};

/// Maximum `TypeRef` nesting followed while resolving a reference
const MAX_TYPE_REF_DEPTH: usize = 64;

/// A parameterless instance constructor defined in another assembly
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalConstructor {
    /// The assembly defining the type
    pub assembly: AssemblyName,
    /// Namespace of the declaring type
    pub namespace: String,
    /// Name of the declaring type
    pub type_name: String,
    /// `MethodRefSig` blob of the constructor
    pub signature: Vec<u8>,
}

impl ExternalConstructor {
    /// `Namespace.Type::.ctor`
    #[must_use]
    pub fn display_name(&self) -> String {
        format!("{}.{}::{}", self.namespace, self.type_name, CTOR)
    }
}

/// Accessibility of a resolved member and of the types declaring it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedMember {
    /// Accessibility of the member itself
    pub access: MemberAccess,
    /// Visibility of the declaring type and its enclosing types, outermost first
    pub declaring_chain: Vec<TypeVisibility>,
}

impl ResolvedMember {
    fn new(chain: &[&TypeDef], method: &MethodDef) -> Self {
        ResolvedMember {
            access: method.access(),
            declaring_chain: chain.iter().map(|ty| ty.visibility()).collect(),
        }
    }
}

/// A single compiled unit of managed code and its metadata
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Assembly {
    /// Simple name
    pub name: String,
    /// Version
    #[serde(default)]
    pub version: AssemblyVersion,
    /// Culture; `None` is the neutral culture
    #[serde(default)]
    pub culture: Option<String>,
    /// Assembly-level custom attributes
    #[serde(default)]
    pub custom_attributes: Vec<CustomAttribute>,
    /// Referenced assemblies
    #[serde(default)]
    pub references: Vec<AssemblyRef>,
    /// Modules; the first one is the main module
    #[serde(default)]
    pub modules: Vec<Module>,
    /// The image this assembly was read from, needed to write it back
    #[serde(skip)]
    pub source: Option<Arc<[u8]>>,
}

impl Assembly {
    /// Create an assembly with an empty main module named `<name>.dll`
    #[must_use]
    pub fn new(name: &str, version: AssemblyVersion) -> Self {
        Assembly {
            name: name.to_string(),
            version,
            modules: vec![Module::new(&format!("{name}.dll"))],
            ..Default::default()
        }
    }

    /// Add a top-level type to the main module
    #[must_use]
    pub fn with_type(mut self, ty: TypeDef) -> Self {
        if let Some(module) = self.modules.first_mut() {
            module.types.push(ty);
        }
        self
    }

    /// Add an assembly reference
    #[must_use]
    pub fn with_reference(mut self, reference: AssemblyRef) -> Self {
        self.references.push(reference);
        self
    }

    /// The main module
    #[must_use]
    pub fn main_module(&self) -> Option<&Module> {
        self.modules.first()
    }

    /// The main module, mutable
    pub fn main_module_mut(&mut self) -> Option<&mut Module> {
        self.modules.first_mut()
    }

    /// The token-less identity of this assembly
    #[must_use]
    pub fn assembly_name(&self) -> AssemblyName {
        AssemblyName {
            name: self.name.clone(),
            version: self.version,
            culture: self.culture.clone(),
            public_key_token: None,
        }
    }

    /// Look up an assembly reference
    #[must_use]
    pub fn reference(&self, token: Token) -> Option<&AssemblyRef> {
        self.references
            .iter()
            .find(|reference| reference.token == token)
    }

    /// Import a constructor of another assembly into the main module.
    ///
    /// Finds or creates the `AssemblyRef`, `TypeRef` and `MemberRef` rows naming the
    /// constructor and returns the `MemberRef` token, which is valid for emitting calls from
    /// the main module. Importing the same constructor twice returns the same token.
    ///
    /// If this assembly *is* the target assembly, the local constructor definition is returned
    /// instead.
    ///
    /// Nothing is modified when an error is returned.
    ///
    /// # Errors
    /// - [`Error::NoMainModule`] if the assembly has no module
    /// - [`Error::StubTargetUnavailable`] if this is the target assembly but it does not
    ///   define the constructor
    /// - [`Error::TokenSpaceExhausted`] if a new row cannot be allocated
    pub fn import_constructor(&mut self, target: &ExternalConstructor) -> Result<Token> {
        let module = self.main_module().ok_or(Error::NoMainModule)?;

        if self.name.eq_ignore_ascii_case(&target.assembly.name) {
            return module
                .find_type(&target.namespace, &target.type_name)
                .and_then(|ty| {
                    ty.methods
                        .iter()
                        .find(|m| m.name == CTOR && m.signature == target.signature)
                })
                .map(|ctor| ctor.token)
                .ok_or_else(|| {
                    Error::StubTargetUnavailable(format!(
                        "{} does not define {}",
                        self.name,
                        target.display_name()
                    ))
                });
        }

        // Plan every row first, commit only once all allocations succeeded
        let existing_ref = self
            .references
            .iter()
            .find(|reference| reference.is_same_identity(&target.assembly))
            .map(|reference| reference.token);
        let ref_token = match existing_ref {
            Some(token) => token,
            None => self.next_reference_token()?,
        };

        let scope = ResolutionScope::AssemblyRef(ref_token);
        let existing_type = module
            .type_refs
            .iter()
            .find(|type_ref| {
                type_ref.scope == scope
                    && type_ref.namespace == target.namespace
                    && type_ref.name == target.type_name
            })
            .map(|type_ref| type_ref.token);
        let type_token = match existing_type {
            Some(token) => token,
            None => module.next_token(TableId::TYPE_REF)?,
        };

        if let Some(existing) = module.member_refs.iter().find(|member_ref| {
            member_ref.parent == type_token
                && member_ref.name == CTOR
                && member_ref.signature == target.signature
        }) {
            return Ok(existing.token);
        }
        let member_token = module.next_token(TableId::MEMBER_REF)?;

        if existing_ref.is_none() {
            self.references
                .push(AssemblyRef::new(ref_token, &target.assembly));
        }

        let module = self.main_module_mut().ok_or(Error::NoMainModule)?;
        if existing_type.is_none() {
            module.type_refs.push(TypeRef {
                token: type_token,
                scope,
                namespace: target.namespace.clone(),
                name: target.type_name.clone(),
            });
        }
        module.member_refs.push(MemberRef {
            token: member_token,
            parent: type_token,
            name: CTOR.to_string(),
            signature: target.signature.clone(),
        });

        Ok(member_token)
    }

    fn next_reference_token(&self) -> Result<Token> {
        let max = max_row(self.references.iter().map(|reference| reference.token));
        if max >= MAX_ROW {
            return Err(Error::TokenSpaceExhausted(TableId::ASSEMBLY_REF));
        }
        Ok(Token::from_parts(TableId::ASSEMBLY_REF, max + 1))
    }

    /// Resolve a method token (`MethodDef` or `MemberRef`) of the main module to the
    /// accessibility of the method and its declaring types.
    ///
    /// `MemberRef` tokens into other assemblies go through `resolver`. Returns `None` for
    /// anything that cannot be resolved, including forwarded types and generic instantiations.
    #[must_use]
    pub fn resolve_method(
        &self,
        token: Token,
        resolver: &dyn AssemblyResolver,
    ) -> Option<ResolvedMember> {
        let module = self.main_module()?;

        match token.table() {
            TableId::METHOD_DEF => module
                .find_method(token)
                .map(|(chain, method)| ResolvedMember::new(&chain, method)),
            TableId::MEMBER_REF => {
                let member = module.member_ref(token)?;
                match member.parent.table() {
                    TableId::TYPE_DEF => {
                        let chain = module.type_path(member.parent)?;
                        find_member(&chain, member)
                    }
                    TableId::TYPE_REF => self.resolve_member_ref(member, resolver),
                    _ => None,
                }
            }
            _ => None,
        }
    }

    fn resolve_member_ref(
        &self,
        member: &MemberRef,
        resolver: &dyn AssemblyResolver,
    ) -> Option<ResolvedMember> {
        let (scope, namespace, names) = self.type_ref_path(member.parent)?;

        let external;
        let home: &Assembly = match scope {
            Some(reference) => {
                external = resolver.resolve(reference)?;
                &external
            }
            None => self,
        };

        let chain = home.main_module()?.find_type_path(&namespace, &names)?;
        find_member(&chain, member)
    }

    /// Flatten a `TypeRef` into its assembly scope, namespace and nesting path.
    ///
    /// A `None` scope means the type lives in this assembly.
    fn type_ref_path(&self, token: Token) -> Option<(Option<&AssemblyRef>, String, Vec<String>)> {
        let module = self.main_module()?;
        let mut names = Vec::new();
        let mut current = module.type_ref(token)?;

        for _ in 0..MAX_TYPE_REF_DEPTH {
            names.push(current.name.clone());
            match current.scope {
                ResolutionScope::TypeRef(outer) => current = module.type_ref(outer)?,
                ResolutionScope::AssemblyRef(reference) => {
                    names.reverse();
                    let reference = self.reference(reference)?;
                    return Some((Some(reference), current.namespace.clone(), names));
                }
                ResolutionScope::Module => {
                    names.reverse();
                    return Some((None, current.namespace.clone(), names));
                }
                ResolutionScope::ModuleRef(_) | ResolutionScope::Exported => return None,
            }
        }

        None
    }
}

fn find_member(chain: &[&TypeDef], member: &MemberRef) -> Option<ResolvedMember> {
    let declaring = chain.last()?;
    declaring
        .methods
        .iter()
        .find(|method| {
            method.name == member.name
                && (member.signature.is_empty() || method.signature == member.signature)
        })
        .map(|method| ResolvedMember::new(chain, method))
}
