use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;
use serde::{Serialize, Serializer};

const ID_BYTES: usize = 32;

/// Opaque, server-issued session token.
///
/// Generated ids carry 256 bits from the thread-local CSPRNG and are encoded
/// as URL-safe base64, so they are always valid header values.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(Arc<str>);

impl SessionId {
    pub fn generate() -> Self {
        let mut bytes = [0u8; ID_BYTES];
        rand::rng().fill_bytes(&mut bytes);
        Self(URL_SAFE_NO_PAD.encode(bytes).into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Serialize for SessionId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(raw: &str) -> Self {
        Self(raw.into())
    }
}

impl From<String> for SessionId {
    fn from(raw: String) -> Self {
        Self(raw.into())
    }
}

impl Borrow<str> for SessionId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_generated_ids_are_unique_and_header_safe() {
        let ids: HashSet<SessionId> = (0..10_000).map(|_| SessionId::generate()).collect();
        assert_eq!(ids.len(), 10_000);
        for id in ids.iter().take(100) {
            assert_eq!(id.as_str().len(), 43);
            assert!(http::HeaderValue::from_str(id.as_str()).is_ok());
            assert!(id
                .as_str()
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
        }
    }

    #[test]
    fn test_lookup_by_str() {
        let id = SessionId::from("abc");
        let set: HashSet<SessionId> = [id.clone()].into_iter().collect();
        assert!(set.contains("abc"));
        assert_eq!(id.to_string(), "abc");
    }

    #[test]
    fn test_serializes_as_plain_string() {
        let id = SessionId::from("abc-123");
        assert_eq!(serde_json::to_value(&id).unwrap(), serde_json::json!("abc-123"));
    }
}
