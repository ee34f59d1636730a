use crate::{TypeError, TypeResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A string type that guarantees non-empty content.
///
/// Wraps a `String` and ensures it contains at least one non-whitespace character.
/// Input is trimmed of leading and trailing whitespace during construction, so
/// `"  Ana  "` and `"Ana"` compare equal once wrapped.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NonEmptyText(String);

impl NonEmptyText {
    /// Creates a new `NonEmptyText` from the given input.
    ///
    /// # Errors
    ///
    /// Returns [`TypeError::EmptyText`] if the trimmed input is empty.
    pub fn new(input: impl AsRef<str>) -> TypeResult<Self> {
        let trimmed = input.as_ref().trim();
        if trimmed.is_empty() {
            return Err(TypeError::EmptyText);
        }
        Ok(Self(trimmed.to_owned()))
    }

    /// Returns the inner string as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NonEmptyText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for NonEmptyText {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for NonEmptyText {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<NonEmptyText> for String {
    fn from(text: NonEmptyText) -> Self {
        text.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_trims_surrounding_whitespace() {
        let text = NonEmptyText::new("  Ana Ruiz  ").expect("non-empty input should succeed");
        assert_eq!(text.as_str(), "Ana Ruiz");
    }

    #[test]
    fn new_rejects_empty_and_whitespace_only() {
        assert!(NonEmptyText::new("").is_err());
        assert!(NonEmptyText::new("   \t\n").is_err());
    }

    #[test]
    fn deserialization_rejects_blank_strings() {
        let ok: NonEmptyText = serde_json::from_str("\"caries\"").expect("should deserialize");
        assert_eq!(ok.as_str(), "caries");

        let blank: Result<NonEmptyText, _> = serde_json::from_str("\"   \"");
        assert!(blank.is_err());
    }
}
