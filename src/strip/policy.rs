//! Which accessibility levels survive stripping.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

use crate::metadata::flags::{MemberAccess, TypeVisibility};

/// The retention rule for members and types.
///
/// | Policy     | Members             | Top-level types | Nested types    |
/// |------------|---------------------|-----------------|-----------------|
/// | `Strict`   | `public`            | `public`        | `nested public` |
/// | `Extended` | `public`, `family`  | `public`        | `nested public` |
///
/// `Extended` also keeps protected members, the surface a subclass in another assembly
/// compiles against. Nested types are held to `nested public` in both modes.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
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
#[serde(rename_all = "snake_case")]
pub enum VisibilityPolicy {
    /// Retain public members only
    #[default]
    Strict,
    /// Retain public and family (`protected`) members
    Extended,
}

impl VisibilityPolicy {
    /// Returns true if a field, method, or accessor with `access` is retained
    #[must_use]
    pub fn retains(self, access: MemberAccess) -> bool {
        match self {
            VisibilityPolicy::Strict => access == MemberAccess::Public,
            VisibilityPolicy::Extended => {
                matches!(access, MemberAccess::Public | MemberAccess::Family)
            }
        }
    }

    /// Returns true if a top-level type with `visibility` is retained
    #[must_use]
    pub fn retains_type(self, visibility: TypeVisibility) -> bool {
        visibility == TypeVisibility::Public
    }

    /// Returns true if a nested type with `visibility` is retained
    #[must_use]
    pub fn retains_nested(self, visibility: TypeVisibility) -> bool {
        visibility == TypeVisibility::NestedPublic
    }

    /// Returns true if every type of a declaring chain (outermost first) is retained
    #[must_use]
    pub fn retains_chain(self, chain: &[TypeVisibility]) -> bool {
        match chain.split_first() {
            Some((outermost, nested)) => {
                self.retains_type(*outermost)
                    && nested.iter().all(|visibility| self.retains_nested(*visibility))
            }
            None => false,
        }
    }
}
