//! Shared domain enumerations aligned with persisted database values.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One of the two answer options a question offers.
///
/// Persisted as the lowercase wire value (`"a"` / `"b"`); anything else is
/// rejected before it reaches the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Choice {
    A,
    B,
}

impl Choice {
    pub fn as_str(self) -> &'static str {
        match self {
            Choice::A => "a",
            Choice::B => "b",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "a" => Some(Choice::A),
            "b" => Some(Choice::B),
            _ => None,
        }
    }
}

impl fmt::Display for Choice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for Choice {
    type Error = ();

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Choice::parse(value).ok_or(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_wire_values() {
        assert_eq!(Choice::parse("a"), Some(Choice::A));
        assert_eq!(Choice::parse("b"), Some(Choice::B));
        assert_eq!(Choice::parse("A"), None);
        assert_eq!(Choice::parse("c"), None);
        assert_eq!(Choice::parse(""), None);
    }

    #[test]
    fn round_trips_as_str() {
        assert_eq!(Choice::parse(Choice::A.as_str()), Some(Choice::A));
        assert_eq!(Choice::parse(Choice::B.as_str()), Some(Choice::B));
    }
}
