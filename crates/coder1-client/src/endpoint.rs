//! WebSocket endpoint derivation.
//!
//! The socket URL is the `connection.baseUrl` origin with its scheme mapped
//! (`http` to `ws`, `https` to `wss`) and a fixed path per endpoint.

use coder1_settings::ConnectionSettings;
use url::Url;

use crate::errors::{ClientError, Result};

/// Server endpoints this client can talk to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Endpoint {
    /// Streamed LLM responses.
    Streaming,
    /// Long-running generation sessions.
    InfiniteLoop,
}

impl Endpoint {
    /// Host-relative socket path.
    pub fn path(self) -> &'static str {
        match self {
            Self::Streaming => "/ws/streaming",
            Self::InfiniteLoop => "/ws/infinite-loop",
        }
    }
}

/// Derive the socket URL for `endpoint` from an HTTP(S) or WS(S) origin.
pub fn derive_ws_url(base: &str, endpoint: Endpoint) -> Result<Url> {
    let mut url = parse(base)?;
    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(ClientError::InvalidUrl {
                url: base.to_string(),
                reason: format!("unsupported scheme '{other}'"),
            });
        }
    };
    url.set_scheme(scheme).map_err(|()| ClientError::InvalidUrl {
        url: base.to_string(),
        reason: format!("cannot switch scheme to '{scheme}'"),
    })?;
    url.set_path(endpoint.path());
    url.set_query(None);
    url.set_fragment(None);
    Ok(url)
}

/// Resolve the socket URL from settings: the explicit `url` when set,
/// otherwise derived from `base_url`.
pub fn resolve_ws_url(settings: &ConnectionSettings, endpoint: Endpoint) -> Result<Url> {
    match &settings.url {
        Some(explicit) => {
            let url = parse(explicit)?;
            if matches!(url.scheme(), "ws" | "wss") {
                Ok(url)
            } else {
                Err(ClientError::InvalidUrl {
                    url: explicit.clone(),
                    reason: "explicit URL must use ws or wss".into(),
                })
            }
        }
        None => derive_ws_url(&settings.base_url, endpoint),
    }
}

fn parse(raw: &str) -> Result<Url> {
    Url::parse(raw).map_err(|e| ClientError::InvalidUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })
}
