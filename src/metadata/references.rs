//! References to other assemblies and to the types and members they define.
//!
//! - [`AssemblyRef`]: a named, versioned dependency of the assembly
//! - [`TypeRef`]: a type defined elsewhere, scoped to an assembly reference, to another
//!   type reference (nested types) or to the current module
//! - [`MemberRef`]: a field or method of a referenced type
//!
//! [`AssemblyName`] is the token-less identity used to look references up.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::metadata::{identity::Identity, token::Token};

/// Four-part assembly version
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct AssemblyVersion {
    /// Major version
    pub major: u16,
    /// Minor version
    pub minor: u16,
    /// Build number
    pub build: u16,
    /// Revision number
    pub revision: u16,
}

impl AssemblyVersion {
    /// Create a version from its four parts
    #[must_use]
    pub const fn new(major: u16, minor: u16, build: u16, revision: u16) -> Self {
        AssemblyVersion {
            major,
            minor,
            build,
            revision,
        }
    }
}

impl fmt::Display for AssemblyVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.major, self.minor, self.build, self.revision
        )
    }
}

/// The identity of an assembly, independent of any metadata table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssemblyName {
    /// Simple name, e.g. `mscorlib`
    pub name: String,
    /// Version
    pub version: AssemblyVersion,
    /// Culture; `None` is the neutral culture
    pub culture: Option<String>,
    /// Public key token, if the assembly is strong-named
    pub public_key_token: Option<u64>,
}

impl fmt::Display for AssemblyName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}, Version={}, Culture={}, PublicKeyToken=",
            self.name,
            self.version,
            self.culture.as_deref().unwrap_or("neutral")
        )?;
        match self.public_key_token {
            Some(token) => write!(f, "{}", Identity::Token(token)),
            None => write!(f, "null"),
        }
    }
}

/// A dependency of the assembly on another assembly
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssemblyRef {
    /// `AssemblyRef` token
    pub token: Token,
    /// Simple name of the referenced assembly
    pub name: String,
    /// Version of the referenced assembly
    #[serde(default)]
    pub version: AssemblyVersion,
    /// Culture of the referenced assembly; `None` is the neutral culture
    #[serde(default)]
    pub culture: Option<String>,
    /// Public key or public key token of the referenced assembly
    #[serde(default)]
    pub identity: Option<Identity>,
}

impl AssemblyRef {
    /// Create a reference to an assembly identity
    #[must_use]
    pub fn new(token: Token, name: &AssemblyName) -> Self {
        AssemblyRef {
            token,
            name: name.name.clone(),
            version: name.version,
            culture: name.culture.clone(),
            identity: name.public_key_token.map(Identity::Token),
        }
    }

    /// The public key token, computed from the full key if necessary
    #[must_use]
    pub fn public_key_token(&self) -> Option<u64> {
        self.identity.as_ref().map(Identity::to_token)
    }

    /// The token-less identity of this reference
    #[must_use]
    pub fn assembly_name(&self) -> AssemblyName {
        AssemblyName {
            name: self.name.clone(),
            version: self.version,
            culture: self.culture.clone(),
            public_key_token: self.public_key_token(),
        }
    }

    /// Returns true if this reference points at exactly the given identity.
    ///
    /// Names compare case-insensitively, as the runtime binder does.
    #[must_use]
    pub fn is_same_identity(&self, name: &AssemblyName) -> bool {
        self.name.eq_ignore_ascii_case(&name.name)
            && self.version == name.version
            && culture_eq(self.culture.as_deref(), name.culture.as_deref())
            && self.public_key_token() == name.public_key_token
    }
}

fn culture_eq(left: Option<&str>, right: Option<&str>) -> bool {
    let normalize = |culture: Option<&str>| match culture {
        None | Some("") => None,
        Some(c) if c.eq_ignore_ascii_case("neutral") => None,
        Some(c) => Some(c.to_ascii_lowercase()),
    };
    normalize(left) == normalize(right)
}

/// Where a [`TypeRef`] is defined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResolutionScope {
    /// Defined in the current module
    Module,
    /// Defined in the referenced assembly (`AssemblyRef` token)
    AssemblyRef(Token),
    /// Nested in another referenced type (`TypeRef` token)
    TypeRef(Token),
    /// Defined in another module of this assembly (`ModuleRef` token)
    ModuleRef(Token),
    /// Null scope; the type is looked up in the exported type table
    Exported,
}

/// A reference to a type defined outside the current type table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeRef {
    /// `TypeRef` token
    pub token: Token,
    /// Where the type is defined
    pub scope: ResolutionScope,
    /// Namespace; empty for nested types
    #[serde(default)]
    pub namespace: String,
    /// Type name
    pub name: String,
}

/// A reference to a member of another type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberRef {
    /// `MemberRef` token
    pub token: Token,
    /// The declaring type or method (`TypeRef`, `TypeDef`, `TypeSpec`, `ModuleRef` or
    /// `MethodDef` token)
    pub parent: Token,
    /// Member name
    pub name: String,
    /// `MethodRefSig` or `FieldSig` blob
    #[serde(default)]
    pub signature: Vec<u8>,
}
