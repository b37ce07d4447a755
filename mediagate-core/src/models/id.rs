use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Client-supplied identifier of a remote media resource
///
/// Opaque to the gateway; the only validation is that it is not blank.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Locator(String);

impl Locator {
    /// Trim and validate a raw locator
    pub fn parse(raw: impl AsRef<str>) -> Result<Self> {
        let trimmed = raw.as_ref().trim();
        if trimmed.is_empty() {
            return Err(Error::InvalidRequest("url must not be empty".to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Locator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Name of one logical client channel
///
/// Unique among currently connected channels; may be reused once the
/// previous holder disconnects.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(String);

impl ChannelId {
    pub fn parse(raw: impl AsRef<str>) -> Result<Self> {
        let trimmed = raw.as_ref().trim();
        if trimmed.is_empty() {
            return Err(Error::InvalidRequest("client id must not be empty".to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ChannelId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locator_trims_input() {
        let locator = Locator::parse("  https://example.com/watch?v=abc \n").unwrap();
        assert_eq!(locator.as_str(), "https://example.com/watch?v=abc");
    }

    #[test]
    fn test_locator_rejects_blank() {
        assert!(matches!(Locator::parse(""), Err(Error::InvalidRequest(_))));
        assert!(matches!(Locator::parse("   "), Err(Error::InvalidRequest(_))));
    }

    #[test]
    fn test_channel_id_display() {
        let id = ChannelId::parse("client-1").unwrap();
        assert_eq!(id.to_string(), "client-1");
        assert!(ChannelId::parse(" ").is_err());
    }
}
