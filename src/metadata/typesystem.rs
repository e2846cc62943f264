//! Type definitions.

use serde::{Deserialize, Serialize};

use crate::metadata::{
    customattributes::CustomAttribute,
    flags::{TypeAttributes, TypeVisibility},
    members::{EventDef, FieldDef, PropertyDef},
    method::MethodDef,
    token::Token,
};

/// A type declared by a module, either top-level or nested in another type.
///
/// Classes, value types and interfaces share this representation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TypeDef {
    /// `TypeDef` token
    pub token: Token,
    /// Namespace; empty for nested types
    #[serde(default)]
    pub namespace: String,
    /// Type name
    pub name: String,
    /// Raw `TypeAttributes`
    pub flags: u32,
    /// Base type (`TypeDef`, `TypeRef` or `TypeSpec` token)
    #[serde(default)]
    pub extends: Option<Token>,
    /// Implemented interfaces (`TypeDef`, `TypeRef` or `TypeSpec` tokens)
    #[serde(default)]
    pub interfaces: Vec<Token>,
    /// Fields
    #[serde(default)]
    pub fields: Vec<FieldDef>,
    /// Methods, including property and event accessors
    #[serde(default)]
    pub methods: Vec<MethodDef>,
    /// Properties
    #[serde(default)]
    pub properties: Vec<PropertyDef>,
    /// Events
    #[serde(default)]
    pub events: Vec<EventDef>,
    /// Nested types
    #[serde(default)]
    pub nested_types: Vec<TypeDef>,
    /// Custom attributes
    #[serde(default)]
    pub custom_attributes: Vec<CustomAttribute>,
}

impl TypeDef {
    /// Create an empty type
    #[must_use]
    pub fn new(token: Token, namespace: &str, name: &str, flags: u32) -> Self {
        TypeDef {
            token,
            namespace: namespace.to_string(),
            name: name.to_string(),
            flags,
            ..Default::default()
        }
    }

    /// Add a field
    #[must_use]
    pub fn with_field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    /// Add a method
    #[must_use]
    pub fn with_method(mut self, method: MethodDef) -> Self {
        self.methods.push(method);
        self
    }

    /// Add a property
    #[must_use]
    pub fn with_property(mut self, property: PropertyDef) -> Self {
        self.properties.push(property);
        self
    }

    /// Add an event
    #[must_use]
    pub fn with_event(mut self, event: EventDef) -> Self {
        self.events.push(event);
        self
    }

    /// Add a nested type
    #[must_use]
    pub fn with_nested(mut self, nested: TypeDef) -> Self {
        self.nested_types.push(nested);
        self
    }

    /// Add a custom attribute
    #[must_use]
    pub fn with_attribute(mut self, attribute: CustomAttribute) -> Self {
        self.custom_attributes.push(attribute);
        self
    }

    /// Declared visibility
    #[must_use]
    pub fn visibility(&self) -> TypeVisibility {
        TypeVisibility::from_flags(self.flags)
    }

    /// Returns true for interfaces
    #[must_use]
    pub fn is_interface(&self) -> bool {
        self.flags & TypeAttributes::INTERFACE != 0
    }

    /// `Namespace.Name`, or just the name without namespace
    #[must_use]
    pub fn full_name(&self) -> String {
        if self.namespace.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.namespace, self.name)
        }
    }

    /// Look up a method declared by this type
    #[must_use]
    pub fn method(&self, token: Token) -> Option<&MethodDef> {
        self.methods.iter().find(|method| method.token == token)
    }

    /// Look up a nested type by name
    #[must_use]
    pub fn nested(&self, name: &str) -> Option<&TypeDef> {
        self.nested_types.iter().find(|nested| nested.name == name)
    }

    /// Visit this type and all types nested in it, parents before children
    pub fn visit<'a>(&'a self, visitor: &mut impl FnMut(&'a TypeDef)) {
        visitor(self);
        for nested in &self.nested_types {
            nested.visit(visitor);
        }
    }

    /// The chain of types from this one down to the type with `token`, outermost first
    #[must_use]
    pub fn path_to(&self, token: Token) -> Option<Vec<&TypeDef>> {
        if self.token == token {
            return Some(vec![self]);
        }

        self.nested_types.iter().find_map(|nested| {
            nested.path_to(token).map(|mut path| {
                path.insert(0, self);
                path
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outer() -> TypeDef {
        TypeDef::new(Token(0x02000002), "Lib", "Outer", TypeAttributes::PUBLIC).with_nested(
            TypeDef::new(Token(0x02000003), "", "Inner", TypeAttributes::NESTED_PRIVATE)
                .with_nested(TypeDef::new(
                    Token(0x02000004),
                    "",
                    "Innermost",
                    TypeAttributes::NESTED_PUBLIC,
                )),
        )
    }

    #[test]
    fn path_to_nested_type() {
        let ty = outer();
        let path = ty.path_to(Token(0x02000004)).unwrap();

        let names: Vec<_> = path.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["Outer", "Inner", "Innermost"]);
        assert!(ty.path_to(Token(0x02000009)).is_none());
    }

    #[test]
    fn visit_is_pre_order() {
        let ty = outer();
        let mut names = Vec::new();
        ty.visit(&mut |t| names.push(t.full_name()));

        assert_eq!(names, vec!["Lib.Outer", "Inner", "Innermost"]);
    }

    #[test]
    fn visibility_and_lookup() {
        let ty = outer();
        assert_eq!(ty.visibility(), TypeVisibility::Public);
        assert_eq!(
            ty.nested("Inner").unwrap().visibility(),
            TypeVisibility::NestedPrivate
        );
        assert!(ty.nested("Missing").is_none());
    }
}
