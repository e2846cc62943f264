//! Memory-mapped image backend.
//!
//! Maps the image read-only into the address space instead of reading it upfront; the
//! operating system pages it in as the decoder touches it.

use super::Backend;
use crate::{
    Error::{Empty, Error, FileError},
    Result,
};

use memmap2::Mmap;
use std::{fs, path::Path};

/// A file backend that uses memory-mapped I/O
#[derive(Debug)]
pub struct Physical {
    /// Memory-mapped file data
    data: Mmap,
}

impl Physical {
    /// Create a new physical file backend by memory-mapping the specified file.
    ///
    /// # Errors
    /// Returns [`crate::Error::FileError`] if the file cannot be opened,
    /// [`crate::Error::Empty`] for a zero-length file, or [`crate::Error::Error`] if memory
    /// mapping fails.
    pub fn new(path: impl AsRef<Path>) -> Result<Physical> {
        let file = match fs::File::open(path) {
            Ok(file) => file,
            Err(error) => return Err(FileError(error)),
        };

        // Zero-length mappings are rejected by some platforms
        if file.metadata().map_err(FileError)?.len() == 0 {
            return Err(Empty);
        }

        let mmap = match unsafe { Mmap::map(&file) } {
            Ok(mmap) => mmap,
            Err(error) => return Err(Error(error.to_string())),
        };

        Ok(Physical { data: mmap })
    }
}

impl Backend for Physical {
    fn data(&self) -> &[u8] {
        self.data.as_ref()
    }

    fn len(&self) -> usize {
        self.data.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_file_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("image.json");
        std::fs::write(&path, b"{\"format\":1}").unwrap();

        let physical = Physical::new(&path).unwrap();
        assert_eq!(physical.len(), 12);
        assert_eq!(physical.data()[0], b'{');
    }

    #[test]
    fn missing_file() {
        let result = Physical::new("/nonexistent/path/to/file.dll");
        match result {
            Err(FileError(io_error)) => {
                assert_eq!(io_error.kind(), std::io::ErrorKind::NotFound);
            }
            _ => panic!("Expected FileError"),
        }
    }
}
