use thiserror::Error;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// # Error Categories
///
/// ## Input Errors
/// - [`Error::Malformed`] - The assembly image could not be decoded
/// - [`Error::Empty`] - Empty input provided
/// - [`Error::FileError`] - Filesystem I/O errors
/// - [`Error::Metadata`] - Errors from the PE / metadata reader and writer
/// - [`Error::NoSourceImage`] - The assembly was not read from an image and cannot be written
///
/// ## Setup Errors
/// - [`Error::NoMainModule`] - The assembly has no module to strip
/// - [`Error::StubTargetUnavailable`] - The throwing constructor could not be bound
/// - [`Error::TokenSpaceExhausted`] - A metadata table has no free row left
///
/// Setup errors abort the stripping of one assembly before its type graph is touched.
/// Attribute constructors that fail to resolve are never an error; such attributes are
/// simply removed.
///
/// # Examples
///
/// ```rust,no_run
/// use dotstub::{Error, PeImage, AssemblyReader};
/// use std::path::Path;
///
/// match PeImage.read_file(Path::new("Library.dll")) {
///     Ok(assembly) => println!("Loaded {}", assembly.name),
///     Err(Error::Empty) => eprintln!("Input is empty"),
///     Err(Error::Malformed { message, file, line }) => {
///         eprintln!("Malformed image: {} ({}:{})", message, file, line);
///     }
///     Err(e) => eprintln!("Other error: {}", e),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// The image is damaged and could not be decoded.
    ///
    /// # Fields
    ///
    /// * `message` - Detailed description of what was malformed
    /// * `file` - Source file where the error was detected
    /// * `line` - Source line where the error was detected
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// Provided input was empty.
    #[error("Provided input was empty")]
    Empty,

    /// File I/O error.
    #[error("{0}")]
    FileError(#[from] std::io::Error),

    /// Error from `dotscope` while loading, modifying or generating a PE image.
    #[error("{0}")]
    Metadata(#[from] dotscope::Error),

    /// The assembly carries no source image to apply its changes to.
    ///
    /// Images are written by patching the image an assembly was read from, so assemblies
    /// built in memory cannot be written.
    #[error("The assembly was not read from an image")]
    NoSourceImage,

    /// The assembly does not contain a main module.
    ///
    /// Every assembly needs a module to host the imported stub constructor.
    #[error("The assembly has no main module")]
    NoMainModule,

    /// The "not implemented" constructor could not be bound into the module.
    ///
    /// Without a throwable stub target none of the method bodies can be rewritten, so the
    /// whole assembly is rejected.
    #[error("Unable to bind the stub constructor - {0}")]
    StubTargetUnavailable(String),

    /// A metadata table ran out of rows while allocating a new token.
    ///
    /// The associated value is the table id.
    #[error("No free row left in metadata table 0x{0:02x}")]
    TokenSpaceExhausted(u8),

    /// Generic error for miscellaneous failures.
    #[error("{0}")]
    Error(String),
}
