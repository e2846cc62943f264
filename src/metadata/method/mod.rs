//! Method definitions, their flags and bodies.
//!
//! # Key Components
//! - [`MethodDef`]: a method declared by a type, including accessors and constructors
//! - [`MethodBody`]: the executable body; [`Instruction`], [`OpCode`] and [`Operand`] assemble
//!   its code
//! - [`MethodImplOptions`], [`MethodModifiers`], [`MethodBodyFlags`]: flag groups

mod body;
mod types;

pub use body::{Instruction, MethodBody, OpCode, Operand};
pub use types::*;

use serde::{Deserialize, Serialize};

use crate::metadata::{
    customattributes::CustomAttribute, flags::MemberAccess, token::Token,
};

/// Name of instance constructors
pub const CTOR: &str = ".ctor";
/// Name of type initializers
pub const CCTOR: &str = ".cctor";

/// `MethodDefSig` of a parameterless instance method returning `void`:
/// `HASTHIS`, no parameters, `ELEMENT_TYPE_VOID`
pub const DEFAULT_CTOR_SIGNATURE: [u8; 3] = [0x20, 0x00, 0x01];

/// A method declared by a type
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MethodDef {
    /// `MethodDef` token
    pub token: Token,
    /// Method name
    pub name: String,
    /// Raw `MethodAttributes`
    pub flags: u32,
    /// Raw `MethodImplAttributes`
    #[serde(default)]
    pub impl_flags: u32,
    /// `MethodDefSig` blob (ECMA-335 II.23.2.1)
    #[serde(default)]
    pub signature: Vec<u8>,
    /// The body; `None` for abstract, runtime-provided and P/Invoke methods
    #[serde(default)]
    pub body: Option<MethodBody>,
    /// Custom attributes
    #[serde(default)]
    pub custom_attributes: Vec<CustomAttribute>,
}

impl MethodDef {
    /// Create a method without body
    #[must_use]
    pub fn new(token: Token, name: &str, flags: u32, signature: &[u8]) -> Self {
        MethodDef {
            token,
            name: name.to_string(),
            flags,
            signature: signature.to_vec(),
            ..Default::default()
        }
    }

    /// Attach a body
    #[must_use]
    pub fn with_body(mut self, body: MethodBody) -> Self {
        self.body = Some(body);
        self
    }

    /// Declared accessibility
    #[must_use]
    pub fn access(&self) -> MemberAccess {
        MemberAccess::from_flags(self.flags)
    }

    /// Modifier flags
    #[must_use]
    pub fn modifiers(&self) -> MethodModifiers {
        MethodModifiers::from_method_flags(self.flags)
    }

    /// Implementation option flags
    #[must_use]
    pub fn impl_options(&self) -> MethodImplOptions {
        MethodImplOptions::from_impl_flags(self.impl_flags)
    }

    /// Returns true if the runtime provides the implementation (`internalcall`)
    #[must_use]
    pub fn is_internal_call(&self) -> bool {
        self.impl_options().contains(MethodImplOptions::INTERNAL_CALL)
    }

    /// Returns true for abstract methods
    #[must_use]
    pub fn is_abstract(&self) -> bool {
        self.modifiers().contains(MethodModifiers::ABSTRACT)
    }

    /// Returns true if the method's RVA can point at a CIL body.
    ///
    /// Abstract and P/Invoke methods, runtime-provided code and anything not implemented in
    /// CIL must keep a zero RVA whatever the model carries as body.
    #[must_use]
    pub fn can_have_body(&self) -> bool {
        let options = self.impl_options();
        !self.is_abstract()
            && !self.modifiers().contains(MethodModifiers::PINVOKE_IMPL)
            && !options.contains(MethodImplOptions::INTERNAL_CALL)
            && self.impl_flags & METHOD_IMPL_MANAGED_MASK == 0
            && self.impl_flags & METHOD_IMPL_CODE_TYPE_MASK == 0
    }

    /// Returns true for instance constructors and type initializers
    #[must_use]
    pub fn is_constructor(&self) -> bool {
        self.modifiers().contains(MethodModifiers::RTSPECIAL_NAME)
            && (self.name == CTOR || self.name == CCTOR)
    }
}
