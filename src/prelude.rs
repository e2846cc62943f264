//! # dotstub Prelude
//!
//! The most commonly used types and traits, for glob import.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all dotstub operations
pub use crate::Error;

/// The result type used throughout dotstub
pub use crate::Result;

// ================================================================================================
// Reading and Writing
// ================================================================================================

/// Image codec traits
pub use crate::{AssemblyReader, AssemblyWriter};

/// The PE image codec
pub use crate::PeImage;

/// Raw image bytes
pub use crate::File;

// ================================================================================================
// Object Model
// ================================================================================================

/// Assemblies and their modules
pub use crate::metadata::{assembly::Assembly, module::Module};

/// Types and members
pub use crate::metadata::{
    members::{EventDef, FieldDef, PropertyDef},
    method::{MethodBody, MethodDef},
    typesystem::TypeDef,
};

/// References to other assemblies, types and members
pub use crate::metadata::references::{
    AssemblyName, AssemblyRef, AssemblyVersion, MemberRef, ResolutionScope, TypeRef,
};

/// Custom attributes
pub use crate::metadata::customattributes::{CustomAttribute, HasCustomAttributes};

/// Accessibility
pub use crate::metadata::flags::{MemberAccess, TypeVisibility};

/// Metadata tokens
pub use crate::metadata::token::Token;

// ================================================================================================
// Resolution
// ================================================================================================

/// Resolvers for referenced assemblies
pub use crate::{AssemblyCache, AssemblyResolver, NullResolver};

// ================================================================================================
// Stripping
// ================================================================================================

/// The stripping pass and its configuration
pub use crate::{ReferenceFilter, StripConfig, StripStats, Stripper, VisibilityPolicy};
