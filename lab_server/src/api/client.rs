//! Client address and user agent of the current request.

use axum::{
    extract::{ConnectInfo, FromRequestParts},
    http::{Extensions, HeaderMap, header::USER_AGENT, request::Parts},
};
use labitory::auth::ClientContext;
use std::{
    convert::Infallible,
    net::{IpAddr, SocketAddr},
};

const FORWARDED_FOR: &str = "x-forwarded-for";
const FALLBACK_IP: &str = "127.0.0.1";

/// Client IP: first `X-Forwarded-For` entry, else the socket peer, else loopback
///
/// The forwarded entry is only used when it parses as an address, and is
/// returned in canonical form.
pub fn client_ip(headers: &HeaderMap, peer: Option<&ConnectInfo<SocketAddr>>) -> String {
    if let Some(forwarded) = headers.get(FORWARDED_FOR).and_then(|v| v.to_str().ok())
        && let Some(ip) = forwarded.split(',').next().and_then(parse_forwarded)
    {
        return ip.to_string();
    }

    peer.map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| FALLBACK_IP.to_string())
}

fn parse_forwarded(entry: &str) -> Option<IpAddr> {
    let entry = entry.trim();
    entry
        .parse::<IpAddr>()
        .ok()
        .or_else(|| entry.parse::<SocketAddr>().ok().map(|addr| addr.ip()))
}

/// Axum extractor for the request origin
#[derive(Debug, Clone)]
pub struct ClientInfo(pub ClientContext);

impl ClientInfo {
    pub fn new(headers: &HeaderMap, extensions: &Extensions) -> Self {
        let ip = client_ip(headers, extensions.get::<ConnectInfo<SocketAddr>>());
        let user_agent = headers
            .get(USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        Self(ClientContext::new(ip, user_agent))
    }
}

impl<S> FromRequestParts<S> for ClientInfo
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self::new(&parts.headers, &parts.extensions))
    }
}
