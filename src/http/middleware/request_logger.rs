//! Per-request access log.

use std::net::{IpAddr, SocketAddr};

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{HeaderMap, Request},
    middleware::Next,
    response::Response,
};

use crate::observability::metrics;

const FORWARDED: &str = "forwarded";
const X_FORWARDED_FOR: &str = "x-forwarded-for";
const X_REAL_IP: &str = "x-real-ip";

/// Logs `"Request received."` once the response status is known.
pub async fn request_logger(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let remote_ip = resolve_ip(request.headers(), peer);

    let response = next.run(request).await;
    let status = response.status().as_u16();

    tracing::info!(
        status,
        method = %method,
        path = %path,
        remote_ip = %remote_ip,
        "Request received."
    );
    metrics::record_request(method.as_str(), status);

    response
}

/// Best-effort client address: proxy headers first, then the socket peer.
///
/// Returns `"N/A"` when nothing yields a parseable IP.
pub fn resolve_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    header(headers, FORWARDED)
        .and_then(forwarded_for)
        .or_else(|| header(headers, X_FORWARDED_FOR).and_then(|v| parse_ip(first_element(v))))
        .or_else(|| header(headers, X_REAL_IP).and_then(parse_ip))
        .or_else(|| peer.map(|addr| addr.ip()))
        .map(|ip| ip.to_string())
        .unwrap_or_else(|| "N/A".to_string())
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn first_element(value: &str) -> &str {
    value.split(',').next().unwrap_or_default()
}

/// `Forwarded: for=192.0.2.60;proto=http, for=...` → first `for=` value.
fn forwarded_for(value: &str) -> Option<IpAddr> {
    first_element(value)
        .split(';')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| key.trim().eq_ignore_ascii_case("for"))
        .and_then(|(_, node)| parse_ip(node))
}

/// Accepts `ip`, `ip:port`, `[v6]`, `[v6]:port`, optionally quoted.
fn parse_ip(raw: &str) -> Option<IpAddr> {
    let value = raw.trim().trim_matches('"');

    if let Some(rest) = value.strip_prefix('[') {
        return rest.split_once(']')?.0.parse().ok();
    }

    value
        .parse::<IpAddr>()
        .ok()
        .or_else(|| value.parse::<SocketAddr>().ok().map(|addr| addr.ip()))
}
