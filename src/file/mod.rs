//! Access to the raw bytes of an assembly image.
//!
//! Images are either memory-mapped from disk ([`File::from_file`]) or owned buffers
//! ([`File::from_mem`]). Both go through the [`Backend`] trait so that the image codecs in
//! [`crate::metadata::image`] never care where the bytes came from.
//!
//! # Thread Safety
//!
//! [`File`] is `Send + Sync`; one image can be decoded from several threads.

mod memory;
mod physical;

use std::path::Path;

use crate::{Error::Empty, Result};
use memory::Memory;
use physical::Physical;

/// Backend trait for image data sources.
///
/// Abstracts over the source of the image bytes, allowing for both in-memory and on-disk
/// representations. All implementations must be thread-safe.
pub trait Backend: Send + Sync {
    /// Returns the entire data buffer.
    fn data(&self) -> &[u8];

    /// Returns the total length of the data buffer.
    fn len(&self) -> usize;
}

/// The raw bytes of one assembly image
pub struct File {
    data: Box<dyn Backend>,
}

impl File {
    /// Memory-map an image from disk.
    ///
    /// # Errors
    /// Returns [`crate::Error::FileError`] if the file cannot be opened,
    /// [`crate::Error::Empty`] if it has no content.
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use dotstub::File;
    /// use std::path::Path;
    ///
    /// let file = File::from_file(Path::new("Library.dll"))?;
    /// println!("Loaded {} bytes", file.len());
    /// # Ok::<(), dotstub::Error>(())
    /// ```
    pub fn from_file(file: &Path) -> Result<File> {
        let input = Physical::new(file)?;

        Self::load(input)
    }

    /// Wrap an image that is already in memory.
    ///
    /// # Errors
    /// Returns [`crate::Error::Empty`] if `data` is empty.
    pub fn from_mem(data: Vec<u8>) -> Result<File> {
        let input = Memory::new(data);

        Self::load(input)
    }

    fn load<T: Backend + 'static>(data: T) -> Result<File> {
        if data.len() == 0 {
            return Err(Empty);
        }

        Ok(File {
            data: Box::new(data),
        })
    }

    /// Size of the image in bytes
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if the image has no content; never the case for a loaded `File`
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.len() == 0
    }

    /// The image bytes
    #[must_use]
    pub fn data(&self) -> &[u8] {
        self.data.data()
    }
}
