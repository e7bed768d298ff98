use std::net::SocketAddr;
use std::sync::Arc;

use http::Extensions;
use hyper::header::HeaderMap;
use shared::types::server_config::KeySource;
use tracing::debug;

/// Produces the identity a request is rate limited under.
///
/// The connection handler stores the peer `SocketAddr` in the request
/// extensions; implementations may use it, the headers, or both. Returning
/// `None` means the client cannot be identified and the request is not
/// limited.
pub trait ClientKey: Send + Sync + 'static {
    fn client_key(&self, headers: &HeaderMap, extensions: &Extensions) -> Option<String>;
}

impl<F> ClientKey for F
where
    F: Fn(&HeaderMap, &Extensions) -> Option<String> + Send + Sync + 'static,
{
    fn client_key(&self, headers: &HeaderMap, extensions: &Extensions) -> Option<String> {
        self(headers, extensions)
    }
}

/// Keys clients by IP address, optionally trusting proxy headers.
#[derive(Debug, Clone, Copy)]
pub struct AddressKey {
    source: KeySource,
}

impl AddressKey {
    pub fn new(source: KeySource) -> Self {
        Self { source }
    }

    pub fn shared(source: KeySource) -> Arc<dyn ClientKey> {
        Arc::new(Self::new(source))
    }
}

impl ClientKey for AddressKey {
    fn client_key(&self, headers: &HeaderMap, extensions: &Extensions) -> Option<String> {
        if self.source == KeySource::Forwarded {
            if let Some(ip) = forwarded_client_ip(headers) {
                return Some(ip);
            }
        }
        extensions
            .get::<SocketAddr>()
            .map(|addr| addr.ip().to_string())
    }
}

/// Extract a header value as a string
pub fn get_header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers.get(name).and_then(|v| v.to_str().ok()).map(|s| {
        debug!("Retrieved header: {}", name);
        s.to_string()
    })
}

/// Client IP as reported by a reverse proxy: the first `X-Forwarded-For`
/// entry, else `X-Real-IP`.
pub fn forwarded_client_ip(headers: &HeaderMap) -> Option<String> {
    if let Some(forwarded) = get_header_value(headers, "x-forwarded-for") {
        let first = forwarded.split(',').next().map(|s| s.trim().to_string());
        if let Some(ip) = first.filter(|ip| !ip.is_empty()) {
            return Some(ip);
        }
    }

    get_header_value(headers, "x-real-ip")
        .map(|s| s.trim().to_string())
        .filter(|ip| !ip.is_empty())
}
