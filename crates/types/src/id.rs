use crate::{TypeError, TypeResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use uuid::Uuid;

/// An identifier guaranteed to be in DCR's canonical form.
///
/// Once constructed, the wrapped UUID is always rendered as 32 lowercase hexadecimal
/// characters without hyphens. Use this type whenever an identifier is accepted from
/// outside the core (CLI input, API request) or used to derive a storage path.
///
/// # Construction
/// - [`CanonicalId::generate`] allocates a fresh identifier for a new record.
/// - [`CanonicalId::parse`] validates an externally supplied identifier; it does **not**
///   normalise other UUID forms (hyphenated or uppercase inputs are rejected).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CanonicalId(Uuid);

impl CanonicalId {
    /// Generates a new random identifier in canonical form.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Validates and wraps an identifier string that must already be canonical.
    ///
    /// # Errors
    ///
    /// Returns [`TypeError::NonCanonicalId`] if `input` is not exactly 32 lowercase
    /// hex characters.
    pub fn parse(input: &str) -> TypeResult<Self> {
        if !Self::is_canonical(input) {
            return Err(TypeError::NonCanonicalId(input.to_string()));
        }
        let uuid =
            Uuid::parse_str(input).map_err(|_| TypeError::NonCanonicalId(input.to_string()))?;
        Ok(Self(uuid))
    }

    /// Returns `true` if `input` is already in canonical form.
    pub fn is_canonical(input: &str) -> bool {
        input.len() == 32
            && input
                .bytes()
                .all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
    }

    /// Returns the canonical string representation.
    pub fn as_simple(&self) -> String {
        self.0.simple().to_string()
    }

    /// Derives the sharded directory for this identifier under `parent_dir`.
    ///
    /// The layout is `parent_dir/<u[0..2]>/<u[2..4]>/<u>/`, bounding per-directory
    /// fan-out regardless of how many records exist.
    pub fn sharded_dir(&self, parent_dir: &Path) -> PathBuf {
        let s = self.as_simple();
        parent_dir.join(&s[0..2]).join(&s[2..4]).join(&s)
    }
}

impl fmt::Display for CanonicalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_simple())
    }
}

impl FromStr for CanonicalId {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for CanonicalId {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<CanonicalId> for String {
    fn from(id: CanonicalId) -> Self {
        id.as_simple()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_produces_canonical_form() {
        let id = CanonicalId::generate();
        assert!(CanonicalId::is_canonical(&id.to_string()));
    }

    #[test]
    fn parse_accepts_canonical_input() {
        let id = CanonicalId::parse("550e8400e29b41d4a716446655440000")
            .expect("canonical input should parse");
        assert_eq!(id.to_string(), "550e8400e29b41d4a716446655440000");
    }

    #[test]
    fn parse_rejects_hyphenated_and_uppercase() {
        assert!(CanonicalId::parse("550e8400-e29b-41d4-a716-446655440000").is_err());
        assert!(CanonicalId::parse("550E8400E29B41D4A716446655440000").is_err());
        assert!(CanonicalId::parse("550e84").is_err());
        assert!(CanonicalId::parse("").is_err());
    }

    #[test]
    fn sharded_dir_uses_two_level_prefix() {
        let id = CanonicalId::parse("aabbccddeeff00112233445566778899")
            .expect("canonical input should parse");
        let dir = id.sharded_dir(Path::new("records"));
        assert_eq!(
            dir,
            Path::new("records")
                .join("aa")
                .join("bb")
                .join("aabbccddeeff00112233445566778899")
        );
    }

    #[test]
    fn serde_round_trip_enforces_canonical_form() {
        let id = CanonicalId::parse("550e8400e29b41d4a716446655440000")
            .expect("canonical input should parse");
        let json = serde_json::to_string(&id).expect("serialize should succeed");
        assert_eq!(json, "\"550e8400e29b41d4a716446655440000\"");

        let back: CanonicalId = serde_json::from_str(&json).expect("deserialize should succeed");
        assert_eq!(back, id);

        let bad: Result<CanonicalId, _> =
            serde_json::from_str("\"550e8400-e29b-41d4-a716-446655440000\"");
        assert!(bad.is_err());
    }
}
