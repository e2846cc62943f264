//! Fields, properties and events.
//!
//! Properties and events are composite members: they own no code themselves and refer to
//! their accessor methods by `MethodDef` token. The accessors live in the `methods` list of the
//! same [`crate::metadata::typesystem::TypeDef`].

use serde::{Deserialize, Serialize};

use crate::metadata::{customattributes::CustomAttribute, flags::MemberAccess, token::Token};

/// A field declared by a type
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldDef {
    /// `Field` token
    pub token: Token,
    /// Field name
    pub name: String,
    /// Raw `FieldAttributes`
    pub flags: u32,
    /// `FieldSig` blob (ECMA-335 II.23.2.4)
    #[serde(default)]
    pub signature: Vec<u8>,
    /// Custom attributes
    #[serde(default)]
    pub custom_attributes: Vec<CustomAttribute>,
}

impl FieldDef {
    /// Create a field
    #[must_use]
    pub fn new(token: Token, name: &str, flags: u32, signature: &[u8]) -> Self {
        FieldDef {
            token,
            name: name.to_string(),
            flags,
            signature: signature.to_vec(),
            custom_attributes: Vec::new(),
        }
    }

    /// Declared accessibility
    #[must_use]
    pub fn access(&self) -> MemberAccess {
        MemberAccess::from_flags(self.flags)
    }
}

/// A property declared by a type
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PropertyDef {
    /// `Property` token
    pub token: Token,
    /// Property name
    pub name: String,
    /// Raw `PropertyAttributes`
    #[serde(default)]
    pub flags: u16,
    /// `PropertySig` blob (ECMA-335 II.23.2.5)
    #[serde(default)]
    pub signature: Vec<u8>,
    /// The get accessor (`MethodDef` token)
    #[serde(default)]
    pub getter: Option<Token>,
    /// The set accessor (`MethodDef` token)
    #[serde(default)]
    pub setter: Option<Token>,
    /// Custom attributes
    #[serde(default)]
    pub custom_attributes: Vec<CustomAttribute>,
}

impl PropertyDef {
    /// Create a property from its accessors
    #[must_use]
    pub fn new(token: Token, name: &str, getter: Option<Token>, setter: Option<Token>) -> Self {
        PropertyDef {
            token,
            name: name.to_string(),
            getter,
            setter,
            ..Default::default()
        }
    }

    /// Returns true if neither accessor is present
    #[must_use]
    pub fn has_no_accessors(&self) -> bool {
        self.getter.is_none() && self.setter.is_none()
    }
}

/// An event declared by a type
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventDef {
    /// `Event` token
    pub token: Token,
    /// Event name
    pub name: String,
    /// Raw `EventAttributes`
    #[serde(default)]
    pub flags: u16,
    /// The delegate type of the event (`TypeDef`, `TypeRef` or `TypeSpec` token)
    #[serde(default)]
    pub event_type: Option<Token>,
    /// The add accessor (`MethodDef` token)
    #[serde(default)]
    pub add_method: Option<Token>,
    /// The remove accessor (`MethodDef` token)
    #[serde(default)]
    pub remove_method: Option<Token>,
    /// The raise accessor (`MethodDef` token)
    #[serde(default)]
    pub raise_method: Option<Token>,
    /// Custom attributes
    #[serde(default)]
    pub custom_attributes: Vec<CustomAttribute>,
}

impl EventDef {
    /// Create an event from its add / remove accessors
    #[must_use]
    pub fn new(
        token: Token,
        name: &str,
        add_method: Option<Token>,
        remove_method: Option<Token>,
    ) -> Self {
        EventDef {
            token,
            name: name.to_string(),
            add_method,
            remove_method,
            ..Default::default()
        }
    }

    /// Returns true if neither the add nor the remove accessor is present
    #[must_use]
    pub fn has_no_accessors(&self) -> bool {
        self.add_method.is_none() && self.remove_method.is_none()
    }
}
