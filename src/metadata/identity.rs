//! Strong-name identity of referenced assemblies.
//!
//! An `AssemblyRef` row carries either the full RSA public key of the referenced assembly or
//! the 8-byte public key token derived from it. Comparing references requires reducing both
//! forms to the token.
//!
//! # Example
//! ```rust
//! use dotstub::metadata::identity::Identity;
//!
//! let id = Identity::from_token_bytes([0xb7, 0x7a, 0x5c, 0x56, 0x19, 0x34, 0xe0, 0x89]);
//! assert_eq!(id.to_string(), "b77a5c561934e089");
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};

/// An identifier for a referenced assembly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Identity {
    /// The full RSA public-key
    PubKey(Vec<u8>),
    /// 8-byte end of the SHA-1 hash of the public-key, read little-endian
    Token(u64),
}

impl Identity {
    /// Build a token identity from the token bytes in their canonical (displayed) order
    #[must_use]
    pub fn from_token_bytes(bytes: [u8; 8]) -> Self {
        Identity::Token(u64::from_le_bytes(bytes))
    }

    /// Get the public key token; the token is the last 8 bytes of the SHA-1 hash of the
    /// public-key.
    #[must_use]
    pub fn to_token(&self) -> u64 {
        match &self {
            Identity::PubKey(data) => {
                let mut hasher = Sha1::new();
                hasher.update(data);
                let result = hasher.finalize();

                let mut tail = [0u8; 8];
                tail.copy_from_slice(&result[result.len() - 8..]);
                u64::from_le_bytes(tail)
            }
            Identity::Token(token) => *token,
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.to_token().to_le_bytes() {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}
