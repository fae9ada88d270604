use crate::config::HttpConfig;
use crate::endpoint::{EndpointError, RequestMeta};

/// DNS-rebinding protection: optional allow-lists for the `Origin` and
/// `Host` headers. An empty list disables that check. Requests without an
/// `Origin` header (non-browser clients) pass the origin check.
#[derive(Debug, Clone, Default)]
pub struct OriginPolicy {
    allowed_origins: Vec<String>,
    allowed_hosts: Vec<String>,
}

impl OriginPolicy {
    pub fn new(allowed_origins: Vec<String>, allowed_hosts: Vec<String>) -> Self {
        Self {
            allowed_origins: normalize(allowed_origins),
            allowed_hosts: normalize(allowed_hosts),
        }
    }

    pub fn from_config(config: &HttpConfig) -> Self {
        Self::new(config.allowed_origins.clone(), config.allowed_hosts.clone())
    }

    pub fn is_enabled(&self) -> bool {
        !self.allowed_origins.is_empty() || !self.allowed_hosts.is_empty()
    }

    pub fn check(&self, meta: &RequestMeta) -> Result<(), EndpointError> {
        if !self.allowed_origins.is_empty() {
            if let Some(origin) = &meta.origin {
                let origin = origin.trim_end_matches('/').to_ascii_lowercase();
                if !self.allowed_origins.contains(&origin) {
                    return Err(EndpointError::OriginRejected(origin));
                }
            }
        }

        if !self.allowed_hosts.is_empty() {
            let host = meta
                .host
                .as_deref()
                .map(str::to_ascii_lowercase)
                .unwrap_or_default();
            if !self.allowed_hosts.contains(&host) {
                return Err(EndpointError::OriginRejected(format!("host {:?}", host)));
            }
        }
        Ok(())
    }
}

fn normalize(values: Vec<String>) -> Vec<String> {
    values
        .into_iter()
        .map(|v| v.trim().trim_end_matches('/').to_ascii_lowercase())
        .filter(|v| !v.is_empty())
        .collect()
}
