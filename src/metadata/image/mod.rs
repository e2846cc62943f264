//! Reading and writing of PE assembly images.
//!
//! Images go through the [`AssemblyReader`] and [`AssemblyWriter`] traits. [`PeImage`]
//! implements both on top of `dotscope`:
//!
//! - [`reader`] loads the image with `CilAssemblyView` and builds the object model from the
//!   metadata tables, keeping every token as it is in the image
//! - [`patch`] compares a modified model with the one read from its source image and lists
//!   the rows to remove, update and add
//! - [`writer`] applies that list to a `CilAssembly` over the source image and generates a
//!   new PE file
//!
//! The generated image never carries a debug directory, so no symbols are written.
//!
//! # Examples
//!
//! ```rust,no_run
//! use dotstub::{AssemblyReader, AssemblyWriter, PeImage};
//! use std::path::Path;
//!
//! let assembly = PeImage.read_file(Path::new("Library.dll"))?;
//! PeImage.write_file(&assembly, Path::new("out/Library.dll"))?;
//! # Ok::<(), dotstub::Error>(())
//! ```

pub mod patch;
pub mod reader;
pub mod writer;

use std::{fs, path::Path};

use crate::{file::File, metadata::assembly::Assembly, Result};

/// Decodes an assembly image into the object model
pub trait AssemblyReader: Send + Sync {
    /// Decode an image held in memory.
    ///
    /// # Errors
    /// Returns [`crate::Error::Empty`] for empty input and [`crate::Error::Malformed`] or
    /// [`crate::Error::Metadata`] for anything that is not a valid image.
    fn read(&self, data: &[u8]) -> Result<Assembly>;

    /// Decode an image from disk; the file is memory-mapped.
    ///
    /// # Errors
    /// Returns [`crate::Error::FileError`] if the file cannot be opened, otherwise as
    /// [`Self::read`].
    fn read_file(&self, path: &Path) -> Result<Assembly> {
        let file = File::from_file(path)?;
        self.read(file.data())
    }
}

/// Encodes the object model into an assembly image
pub trait AssemblyWriter: Send + Sync {
    /// Encode an assembly completely in memory.
    ///
    /// # Errors
    /// Returns an error if the model cannot be encoded.
    fn write(&self, assembly: &Assembly) -> Result<Vec<u8>>;

    /// Encode an assembly and write it to `path`.
    ///
    /// The image is encoded fully before the file is created, so an encoding error never
    /// leaves a partial file behind.
    ///
    /// # Errors
    /// Returns an error if encoding fails or the file cannot be written.
    fn write_file(&self, assembly: &Assembly, path: &Path) -> Result<()> {
        let data = self.write(assembly)?;
        fs::write(path, data)?;
        Ok(())
    }
}

/// The PE image codec
#[derive(Debug, Clone, Copy, Default)]
pub struct PeImage;

impl AssemblyReader for PeImage {
    fn read(&self, data: &[u8]) -> Result<Assembly> {
        reader::read(data)
    }
}

impl AssemblyWriter for PeImage {
    fn write(&self, assembly: &Assembly) -> Result<Vec<u8>> {
        writer::write(assembly)
    }
}
