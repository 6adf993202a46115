//! Opaque restriction target identifiers.
//!
//! Targets are tokens handed out by the host platform for an app, a web
//! domain, or a category of either. They are compared for equality and set
//! membership only; nothing here parses or displays their contents beyond a
//! base64 rendering.

use std::fmt;
use std::str::FromStr;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Which of the four selection sets a target belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    App,
    AppCategory,
    Domain,
    DomainCategory,
}

impl TargetKind {
    pub const ALL: [TargetKind; 4] = [
        TargetKind::App,
        TargetKind::AppCategory,
        TargetKind::Domain,
        TargetKind::DomainCategory,
    ];
}

/// An opaque host-provided token.
///
/// The derived `Ord` is byte order and exists only so sets encode
/// deterministically.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RestrictionTarget(Vec<u8>);

impl RestrictionTarget {
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Standard base64 of the raw token.
    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.0)
    }

    pub fn from_base64(s: &str) -> Result<Self, base64::DecodeError> {
        STANDARD.decode(s.trim()).map(Self)
    }
}

impl fmt::Debug for RestrictionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RestrictionTarget({})", self.to_base64())
    }
}

impl fmt::Display for RestrictionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_base64())
    }
}

impl FromStr for RestrictionTarget {
    type Err = base64::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_base64(s)
    }
}

impl Serialize for RestrictionTarget {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_base64())
    }
}

impl<'de> Deserialize<'de> for RestrictionTarget {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_base64(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_utf8_tokens_survive_json() {
        let target = RestrictionTarget::from_bytes(vec![0xff, 0x00, 0x7f, 0x80]);
        let json = serde_json::to_string(&target).unwrap();
        let parsed: RestrictionTarget = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, target);
    }

    #[test]
    fn rejects_invalid_base64() {
        assert!("not base64!".parse::<RestrictionTarget>().is_err());
    }
}
