//! Symbol value object for instrument identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A ticker symbol, the primary key of a screener record.
///
/// Examples: "AAPL", "MSFT", "BRK.B"
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Symbol(String);

impl Symbol {
    /// Create a new Symbol.
    ///
    /// The symbol is trimmed and normalized to uppercase.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into().trim().to_uppercase())
    }

    /// Get the symbol string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume and return the inner string.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }

    /// Check whether the symbol is empty after normalization.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Case-insensitive comparison against a raw string.
    #[must_use]
    pub fn matches(&self, other: &str) -> bool {
        self.0.eq_ignore_ascii_case(other.trim())
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Symbol {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Symbol {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl AsRef<str> for Symbol {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbol_normalizes_to_uppercase() {
        let symbol = Symbol::new(" aapl ");
        assert_eq!(symbol.as_str(), "AAPL");
    }

    #[test]
    fn symbol_matches_ignores_case() {
        let symbol = Symbol::new("MSFT");
        assert!(symbol.matches("msft"));
        assert!(!symbol.matches("msf"));
    }

    #[test]
    fn symbol_serializes_transparently() {
        let symbol = Symbol::new("brk.b");
        let json = serde_json::to_string(&symbol).unwrap();
        assert_eq!(json, "\"BRK.B\"");
    }

    #[test]
    fn empty_symbol_detected() {
        assert!(Symbol::new("   ").is_empty());
    }
}
