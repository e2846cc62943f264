//! Accessibility encoding for types and members.
//!
//! The raw attribute words of `TypeDef`, `Field` and `MethodDef` rows carry a small
//! visibility field in their low bits (ECMA-335 II.23.1.5, II.23.1.10, II.23.1.15). This
//! module exposes the masks and decodes them into [`TypeVisibility`] and [`MemberAccess`].

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

/// `TypeDef` attribute flags (subset relevant to visibility and type kind)
#[allow(non_snake_case)]
pub mod TypeAttributes {
    /// Use this mask to retrieve visibility information
    pub const VISIBILITY_MASK: u32 = 0x0000_0007;
    /// Class has no public scope
    pub const NOT_PUBLIC: u32 = 0x0000_0000;
    /// Class has public scope
    pub const PUBLIC: u32 = 0x0000_0001;
    /// Class is nested with public visibility
    pub const NESTED_PUBLIC: u32 = 0x0000_0002;
    /// Class is nested with private visibility
    pub const NESTED_PRIVATE: u32 = 0x0000_0003;
    /// Class is nested with family visibility
    pub const NESTED_FAMILY: u32 = 0x0000_0004;
    /// Class is nested with assembly visibility
    pub const NESTED_ASSEMBLY: u32 = 0x0000_0005;
    /// Class is nested with family and assembly visibility
    pub const NESTED_FAM_AND_ASSEM: u32 = 0x0000_0006;
    /// Class is nested with family or assembly visibility
    pub const NESTED_FAM_OR_ASSEM: u32 = 0x0000_0007;
    /// Type is an interface
    pub const INTERFACE: u32 = 0x0000_0020;
    /// Class is abstract
    pub const ABSTRACT: u32 = 0x0000_0080;
    /// Class cannot be extended
    pub const SEALED: u32 = 0x0000_0100;
}

/// `Field` attribute flags (subset relevant to accessibility)
#[allow(non_snake_case)]
pub mod FieldAttributes {
    /// Use this mask to retrieve accessibility information
    pub const FIELD_ACCESS_MASK: u32 = 0x0007;
    /// Field is private
    pub const PRIVATE: u32 = 0x0001;
    /// Field is accessible by sub-types only
    pub const FAMILY: u32 = 0x0004;
    /// Field is public
    pub const PUBLIC: u32 = 0x0006;
    /// Field is static
    pub const STATIC: u32 = 0x0010;
    /// Field is a compile-time constant
    pub const LITERAL: u32 = 0x0040;
}

/// Declared accessibility of a field or method.
///
/// The discriminants are the raw values of the 3-bit access field shared by
/// `FieldAttributes` and `MethodAttributes`.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumString,
    EnumIter,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "snake_case")]
pub enum MemberAccess {
    /// Member not referenceable
    CompilerControlled = 0,
    /// Accessible only by the parent type
    Private = 1,
    /// Accessible by sub-types only in this assembly
    FamAndAssem = 2,
    /// Accessible by anyone in the assembly
    Assembly = 3,
    /// Accessible only by type and sub-types (`protected`)
    Family = 4,
    /// Accessible by sub-types anywhere, plus anyone in the assembly
    FamOrAssem = 5,
    /// Accessible by anyone who has visibility to this scope
    Public = 6,
}

impl MemberAccess {
    /// Mask of the access field inside field and method flags
    pub const MASK: u32 = 0x0007;

    /// Decode the access field from raw field or method flags.
    ///
    /// The value 7 is reserved by ECMA-335 and decodes as [`MemberAccess::CompilerControlled`],
    /// the most restrictive level.
    #[must_use]
    pub fn from_flags(flags: u32) -> Self {
        match flags & Self::MASK {
            1 => MemberAccess::Private,
            2 => MemberAccess::FamAndAssem,
            3 => MemberAccess::Assembly,
            4 => MemberAccess::Family,
            5 => MemberAccess::FamOrAssem,
            6 => MemberAccess::Public,
            _ => MemberAccess::CompilerControlled,
        }
    }

    /// Replace the access field of raw flags with this accessibility
    #[must_use]
    pub fn apply(self, flags: u32) -> u32 {
        (flags & !Self::MASK) | self as u32
    }
}

/// Declared visibility of a type.
///
/// Top-level types use [`TypeVisibility::NotPublic`] or [`TypeVisibility::Public`]; nested
/// types use one of the `Nested*` variants.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumString,
    EnumIter,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "snake_case")]
pub enum TypeVisibility {
    /// Class has no public scope
    NotPublic = 0,
    /// Class has public scope
    Public = 1,
    /// Nested, public
    NestedPublic = 2,
    /// Nested, private
    NestedPrivate = 3,
    /// Nested, family (`protected`)
    NestedFamily = 4,
    /// Nested, assembly (`internal`)
    NestedAssembly = 5,
    /// Nested, family and assembly
    NestedFamAndAssem = 6,
    /// Nested, family or assembly
    NestedFamOrAssem = 7,
}

impl TypeVisibility {
    /// Decode the visibility field from raw `TypeDef` flags
    #[must_use]
    pub fn from_flags(flags: u32) -> Self {
        match flags & TypeAttributes::VISIBILITY_MASK {
            TypeAttributes::PUBLIC => TypeVisibility::Public,
            TypeAttributes::NESTED_PUBLIC => TypeVisibility::NestedPublic,
            TypeAttributes::NESTED_PRIVATE => TypeVisibility::NestedPrivate,
            TypeAttributes::NESTED_FAMILY => TypeVisibility::NestedFamily,
            TypeAttributes::NESTED_ASSEMBLY => TypeVisibility::NestedAssembly,
            TypeAttributes::NESTED_FAM_AND_ASSEM => TypeVisibility::NestedFamAndAssem,
            TypeAttributes::NESTED_FAM_OR_ASSEM => TypeVisibility::NestedFamOrAssem,
            _ => TypeVisibility::NotPublic,
        }
    }

    /// Replace the visibility field of raw `TypeDef` flags with this visibility
    #[must_use]
    pub fn apply(self, flags: u32) -> u32 {
        (flags & !TypeAttributes::VISIBILITY_MASK) | self as u32
    }

    /// Returns true for the `Nested*` variants
    #[must_use]
    pub fn is_nested(self) -> bool {
        self as u32 >= TypeAttributes::NESTED_PUBLIC
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use strum::IntoEnumIterator;

    #[test]
    fn member_access_round_trips_through_flags() {
        for access in MemberAccess::iter() {
            let flags = access.apply(0x0010 | 0x0080);
            assert_eq!(MemberAccess::from_flags(flags), access);
            assert_eq!(flags & !MemberAccess::MASK, 0x0090);
        }
    }

    #[test]
    fn reserved_access_value_is_most_restrictive() {
        assert_eq!(MemberAccess::from_flags(0x0007), MemberAccess::CompilerControlled);
    }

    #[test]
    fn type_visibility_decodes_nested_variants() {
        assert_eq!(TypeVisibility::from_flags(0x0010_0001), TypeVisibility::Public);
        assert_eq!(
            TypeVisibility::from_flags(TypeAttributes::NESTED_FAMILY | TypeAttributes::SEALED),
            TypeVisibility::NestedFamily
        );
        assert!(TypeVisibility::NestedPrivate.is_nested());
        assert!(!TypeVisibility::Public.is_nested());
        assert!(!TypeVisibility::NotPublic.is_nested());
    }

    #[test]
    fn names_parse_and_display() {
        assert_eq!(MemberAccess::from_str("family").unwrap(), MemberAccess::Family);
        assert_eq!(MemberAccess::FamOrAssem.to_string(), "fam_or_assem");
        assert_eq!(
            TypeVisibility::from_str("nested_public").unwrap(),
            TypeVisibility::NestedPublic
        );
    }
}
