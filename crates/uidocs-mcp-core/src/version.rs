use std::fmt;

pub const SUPPORTED_VERSIONS: &[&str] = &["2024-11-05", "2025-03-26", "2025-06-18"];
pub const DEFAULT_VERSION: &str = "2025-06-18";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProtocolVersion(String);

impl ProtocolVersion {
    pub fn new(version: impl Into<String>) -> crate::Result<Self> {
        let version = version.into();
        if Self::is_supported(&version) {
            Ok(Self(version))
        } else {
            Err(crate::McpError::VersionMismatch {
                expected: SUPPORTED_VERSIONS.join(", "),
                actual: version,
            })
        }
    }

    pub fn latest() -> Self {
        Self(DEFAULT_VERSION.to_string())
    }

    pub fn is_supported(version: &str) -> bool {
        SUPPORTED_VERSIONS.contains(&version)
    }

    /// Pick the version the server answers an `initialize` with: the
    /// client's requested version when we speak it, otherwise our latest.
    pub fn negotiate(requested: &str) -> Self {
        Self::new(requested).unwrap_or_else(|_| Self::latest())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for ProtocolVersion {
    type Err = crate::McpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negotiate_echoes_supported_version() {
        assert_eq!(ProtocolVersion::negotiate("2024-11-05").as_str(), "2024-11-05");
        assert_eq!(ProtocolVersion::negotiate("2025-03-26").as_str(), "2025-03-26");
    }

    #[test]
    fn test_negotiate_falls_back_to_latest() {
        assert_eq!(ProtocolVersion::negotiate("1999-01-01"), ProtocolVersion::latest());
        assert_eq!(ProtocolVersion::negotiate(""), ProtocolVersion::latest());
    }

    #[test]
    fn test_parse_unsupported_version_fails() {
        let err = "2023-01-01".parse::<ProtocolVersion>().unwrap_err();
        assert!(err.to_string().contains("2023-01-01"));
    }
}
