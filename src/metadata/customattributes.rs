//! Custom attributes and the owners they attach to.

use serde::{Deserialize, Serialize};

use crate::metadata::token::Token;

/// A custom attribute attached to an assembly, module, type or member.
///
/// The attribute type is implied by the constructor: a `MethodDef` token for attributes
/// declared in the same module, a `MemberRef` token for imported ones. A missing constructor
/// means the reader could not resolve the row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CustomAttribute {
    /// The `CustomAttribute` row this attribute was read from; `None` for attributes that
    /// were never written
    #[serde(default)]
    pub token: Option<Token>,
    /// The attribute constructor (`MethodDef` or `MemberRef`)
    pub constructor: Option<Token>,
    /// The encoded constructor arguments and named arguments (ECMA-335 II.23.3)
    #[serde(default)]
    pub value: Vec<u8>,
}

impl CustomAttribute {
    /// Create an attribute without arguments
    #[must_use]
    pub fn new(constructor: Token) -> Self {
        CustomAttribute {
            token: None,
            constructor: Some(constructor),
            // Prolog only, no fixed or named arguments
            value: vec![0x01, 0x00, 0x00, 0x00],
        }
    }
}

/// Anything that can carry custom attributes.
pub trait HasCustomAttributes {
    /// The attributes in declaration order
    fn custom_attributes(&self) -> &[CustomAttribute];

    /// Mutable access to the attribute list
    fn custom_attributes_mut(&mut self) -> &mut Vec<CustomAttribute>;
}

macro_rules! impl_has_custom_attributes {
    ($($owner:ty),+ $(,)?) => {
        $(
            impl $crate::metadata::customattributes::HasCustomAttributes for $owner {
                fn custom_attributes(&self) -> &[$crate::metadata::customattributes::CustomAttribute] {
                    &self.custom_attributes
                }

                fn custom_attributes_mut(
                    &mut self,
                ) -> &mut Vec<$crate::metadata::customattributes::CustomAttribute> {
                    &mut self.custom_attributes
                }
            }
        )+
    };
}

impl_has_custom_attributes!(
    crate::metadata::assembly::Assembly,
    crate::metadata::module::Module,
    crate::metadata::typesystem::TypeDef,
    crate::metadata::members::FieldDef,
    crate::metadata::members::PropertyDef,
    crate::metadata::members::EventDef,
    crate::metadata::method::MethodDef,
);
