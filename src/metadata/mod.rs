//! The in-memory metadata object model of a .NET assembly.
//!
//! This is the mutable entity graph the stripping pass operates on:
//!
//! - [`assembly::Assembly`] owns the assembly-level custom attributes, the assembly
//!   references and the modules (the first one being the main module)
//! - [`module::Module`] owns the top-level types and the imported type / member references
//! - [`typesystem::TypeDef`] owns fields, methods, properties, events, nested types and
//!   custom attributes
//!
//! Entities never point at each other. Every cross reference (an accessor of a property,
//! the constructor of a custom attribute, the scope of a type reference) is a
//! [`token::Token`], so removing an entity never leaves a dangling pointer, only a token that
//! can be checked.
//!
//! Reading and writing assemblies goes through the [`image::AssemblyReader`] and
//! [`image::AssemblyWriter`] traits; references to other assemblies are resolved through an
//! [`resolver::AssemblyResolver`].

pub mod assembly;
pub mod customattributes;
pub mod flags;
pub mod identity;
pub mod image;
pub mod members;
pub mod method;
pub mod module;
pub mod references;
pub mod resolver;
pub mod token;
pub mod typesystem;
