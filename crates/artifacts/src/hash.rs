use crate::{ArtifactError, ArtifactResult};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// A SHA-256 digest in its canonical hex form: 64 lowercase hexadecimal characters.
///
/// Once constructed the contained digest is guaranteed canonical, so it can be used
/// directly as a storage filename and compared byte-for-byte.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Sha256Hash(String);

impl Sha256Hash {
    /// Computes the SHA-256 digest of `bytes`.
    pub fn digest(bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        Self(hex::encode(hasher.finalize()))
    }

    /// Validates and wraps an externally supplied hash string.
    ///
    /// # Errors
    ///
    /// Returns [`ArtifactError::InvalidHash`] unless the input is exactly 64 lowercase
    /// hex characters.
    pub fn parse(input: &str) -> ArtifactResult<Self> {
        let canonical = input.len() == 64
            && input
                .bytes()
                .all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'));
        if !canonical {
            return Err(ArtifactError::InvalidHash(input.to_string()));
        }
        Ok(Self(input.to_string()))
    }

    /// Returns the hex digest as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the two-character shard prefix used for blob storage.
    pub fn shard_prefix(&self) -> &str {
        &self.0[0..2]
    }
}

impl fmt::Display for Sha256Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for Sha256Hash {
    type Error = ArtifactError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Sha256Hash> for String {
    fn from(hash: Sha256Hash) -> Self {
        hash.0
    }
}
