// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
//#![deny(unsafe_code)]
// - 'file/physical.rs' uses mmap to map a file into memory

//! # dotstub
//!
//! Reduces .NET assemblies to their public API surface.
//!
//! `dotstub` reads a compiled assembly into a metadata model, removes everything a consumer
//! cannot compile against, and replaces the body of every remaining method with
//! `newobj NotImplementedException::.ctor; throw`. The result is a reference assembly: it
//! exposes the same types, signatures and attributes as the original, but ships none of its
//! logic.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use dotstub::prelude::*;
//! use std::path::Path;
//!
//! let mut assembly = PeImage.read_file(Path::new("Library.dll"))?;
//! let stats = Stripper::new(StripConfig::strict()).strip(&mut assembly, &NullResolver)?;
//! println!("Removed {} types", stats.types_removed);
//!
//! PeImage.write_file(&assembly, Path::new("ref/Library.dll"))?;
//! # Ok::<(), dotstub::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`metadata`] - The assembly object model, the image codecs and reference resolution
//! - [`strip`] - The stripping pass: visibility policy, attribute filter, member pruning,
//!   body stubbing and the type walker
//! - [`Error`] and [`Result`] - Error handling
//!
//! ### Modes
//!
//! [`StripConfig::strict`] keeps `public` members only. [`StripConfig::extended`] also keeps
//! `protected` members, which subclasses in other assemblies compile against, and drops
//! references to the .NET 2.0 `mscorlib`.
//!
//! ### Image formats
//!
//! Reading and writing goes through the [`AssemblyReader`] and [`AssemblyWriter`] traits.
//! [`PeImage`] implements both for PE files on top of `dotscope`: the reader builds the
//! object model from the metadata tables, the writer diffs the stripped model against the
//! image it came from and applies the difference as row removals, updates and additions.
//! Debug information is never carried into the output.
//!
//! ## Thread Safety
//!
//! Stripping one assembly is sequential; every assembly carries its own state, so separate
//! assemblies can be stripped in parallel with a shared [`Stripper`] and resolver.
#[macro_use]
pub(crate) mod error;
pub(crate) mod file;

/// Shared functionality which is used in unit- and integration-tests
#[cfg(test)]
pub(crate) mod test;

/// Convenient re-exports of the most commonly used types and traits.
///
/// # Example
///
/// ```rust,no_run
/// use dotstub::prelude::*;
///
/// let assembly = PeImage.read_file("Library.dll".as_ref())?;
/// println!("{} has {} references", assembly.name, assembly.references.len());
/// # Ok::<(), dotstub::Error>(())
/// ```
pub mod prelude;

/// The in-memory model of an assembly based on ECMA-335.
///
/// Entities are owned in a tree, `Assembly` → `Module` → `TypeDef` → members, and refer to
/// each other only through metadata [`metadata::token::Token`]s.
///
/// # Key Components
///
/// - [`metadata::assembly::Assembly`] - Assembly identity, references and modules, plus
///   constructor import and resolution
/// - [`metadata::typesystem::TypeDef`] - Types with their members and nested types
/// - [`metadata::method::MethodBody`] - CIL bodies and their encoding
/// - [`metadata::image`] - Image readers and writers
/// - [`metadata::resolver`] - Locating referenced assemblies
pub mod metadata;

/// The stripping pass.
///
/// See [`strip::Stripper`] for the entry point and [`strip::StripConfig`] for the two modes.
pub mod strip;

/// `dotstub` Result type
///
/// A type alias for `std::result::Result<T, Error>` where the error type is always
/// [`Error`]. Used consistently throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// `dotstub` Error type
///
/// The main error type for all operations in this crate.
pub use error::Error;

/// Raw image bytes, memory-mapped or owned
pub use file::File;

pub use metadata::{
    assembly::{Assembly, ExternalConstructor},
    image::{AssemblyReader, AssemblyWriter, PeImage},
    resolver::{AssemblyCache, AssemblyResolver, NullResolver},
};

pub use strip::{ReferenceFilter, StripConfig, StripStats, Stripper, VisibilityPolicy};
