//! Raw registry protocol pass-through
//!
//! Every `/v2` request is authenticated against the directory, checked by the
//! gate and then streamed to the upstream registry. Client credentials and
//! forwarding headers never reach the upstream.

pub mod handlers;
pub mod routes;

use anyhow::{Context, Result};
use axum::body::{Body, HttpBody};
use axum::http::{header, HeaderMap, HeaderName, HeaderValue};
use reqwest::Url;
use std::net::IpAddr;
use std::time::Duration;

/// Headers that only apply to a single connection
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Where and how proxied requests are sent
#[derive(Debug, Clone)]
pub struct ProxyTarget {
    base_url: String,
    /// Path of the upstream URL without a trailing slash ("" for the root)
    base_path: String,
    forwarded_proto: String,
    client: reqwest::Client,
}

impl ProxyTarget {
    pub fn new(upstream_url: &Url, forwarded_proto: &str, connect_timeout: Duration) -> Result<Self> {
        // Connecting is bounded; transfers are not, blobs can be large
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .connect_timeout(connect_timeout)
            .build()
            .context("Failed to build proxy client")?;

        Ok(Self {
            base_url: upstream_url.as_str().trim_end_matches('/').to_string(),
            base_path: upstream_url.path().trim_end_matches('/').to_string(),
            forwarded_proto: forwarded_proto.to_string(),
            client,
        })
    }

    /// Upstream URL for an incoming path and query.
    ///
    /// The result is normalised by the URL parser (`\` becomes `/`, dot
    /// segments are resolved), so authorization must look at
    /// [`ProxyTarget::upstream_path`] of this URL, not at the incoming path.
    pub fn target_url(&self, path_and_query: &str) -> Result<Url> {
        Url::parse(&format!("{}{}", self.base_url, path_and_query))
            .with_context(|| format!("Invalid registry path {}", path_and_query))
    }

    /// Path of `target` relative to the upstream base, or `None` if it escaped the base
    pub fn upstream_path<'a>(&self, target: &'a Url) -> Option<&'a str> {
        let path = target.path().strip_prefix(self.base_path.as_str())?;
        path.starts_with('/').then_some(path)
    }
}

/// Names listed in the `Connection` header are hop-by-hop as well
fn connection_tokens(headers: &HeaderMap) -> Vec<String> {
    headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .map(|token| token.trim().to_ascii_lowercase())
        .filter(|token| !token.is_empty())
        .collect()
}

fn is_hop_by_hop(name: &HeaderName, connection: &[String]) -> bool {
    let name = name.as_str();
    HOP_BY_HOP.contains(&name) || connection.iter().any(|token| token == name)
}

fn is_client_identity(name: &HeaderName) -> bool {
    let name = name.as_str();
    name == "host"
        || name == "authorization"
        || name == "forwarded"
        || name.starts_with("x-forwarded-")
}

/// Build the header set sent upstream.
///
/// Drops hop-by-hop headers, client credentials, `Host` (reqwest derives it
/// from the upstream URL) and any client-supplied forwarding headers, then
/// sets fresh `X-Forwarded-For/Host/Proto`.
pub fn upstream_request_headers(
    incoming: &HeaderMap,
    client_ip: Option<IpAddr>,
    forwarded_proto: &str,
) -> HeaderMap {
    let connection = connection_tokens(incoming);
    let mut headers = HeaderMap::with_capacity(incoming.len());

    for (name, value) in incoming {
        if is_hop_by_hop(name, &connection) || is_client_identity(name) {
            continue;
        }
        headers.append(name.clone(), value.clone());
    }

    if let Some(ip) = client_ip {
        if let Ok(value) = HeaderValue::from_str(&ip.to_string()) {
            headers.insert(HeaderName::from_static("x-forwarded-for"), value);
        }
    }
    if let Some(host) = incoming.get(header::HOST) {
        headers.insert(HeaderName::from_static("x-forwarded-host"), host.clone());
    }
    if let Ok(proto) = HeaderValue::from_str(forwarded_proto) {
        headers.insert(HeaderName::from_static("x-forwarded-proto"), proto);
    }

    headers
}

/// Build the header set returned to the client (hop-by-hop headers removed)
pub fn downstream_response_headers(upstream: &HeaderMap) -> HeaderMap {
    let connection = connection_tokens(upstream);
    let mut headers = HeaderMap::with_capacity(upstream.len());
    for (name, value) in upstream {
        if !is_hop_by_hop(name, &connection) {
            headers.append(name.clone(), value.clone());
        }
    }
    headers
}

/// Whether the incoming request carries a body worth streaming.
///
/// Looks at the body itself rather than at `Content-Length`, since HTTP/2
/// uploads may carry neither that nor `Transfer-Encoding`.
pub fn has_body(body: &Body) -> bool {
    !body.is_end_stream()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn incoming() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, HeaderValue::from_static("gate.example.com"));
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        headers.insert(
            header::PROXY_AUTHORIZATION,
            HeaderValue::from_static("Basic def"),
        );
        headers.insert("forwarded", HeaderValue::from_static("for=1.2.3.4"));
        headers.insert("x-forwarded-for", HeaderValue::from_static("6.6.6.6"));
        headers.insert("x-forwarded-prefix", HeaderValue::from_static("/evil"));
        headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive, x-trace"));
        headers.insert("x-trace", HeaderValue::from_static("1"));
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from_static("42"));
        headers
    }

    #[test]
    fn test_upstream_request_headers_strip_client_identity() {
        let headers = upstream_request_headers(
            &incoming(),
            Some(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 7))),
            "https",
        );

        assert!(headers.get(header::AUTHORIZATION).is_none());
        assert!(headers.get(header::PROXY_AUTHORIZATION).is_none());
        assert!(headers.get(header::HOST).is_none());
        assert!(headers.get("forwarded").is_none());
        assert!(headers.get("x-forwarded-prefix").is_none());
        assert!(headers.get(header::CONNECTION).is_none());
        assert!(headers.get("x-trace").is_none());

        assert_eq!(headers.get("x-forwarded-for").unwrap(), "10.0.0.7");
        assert_eq!(headers.get("x-forwarded-host").unwrap(), "gate.example.com");
        assert_eq!(headers.get("x-forwarded-proto").unwrap(), "https");
        assert_eq!(headers.get(header::ACCEPT).unwrap(), "application/json");
        assert_eq!(headers.get(header::CONTENT_LENGTH).unwrap(), "42");
    }

    #[test]
    fn test_upstream_request_headers_without_peer() {
        let headers = upstream_request_headers(&incoming(), None, "http");
        assert!(headers.get("x-forwarded-for").is_none());
        assert_eq!(headers.get("x-forwarded-proto").unwrap(), "http");
    }

    #[test]
    fn test_downstream_response_headers() {
        let mut upstream = HeaderMap::new();
        upstream.insert(header::TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
        upstream.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        upstream.insert("docker-content-digest", HeaderValue::from_static("sha256:abc"));

        let headers = downstream_response_headers(&upstream);
        assert!(headers.get(header::TRANSFER_ENCODING).is_none());
        assert_eq!(headers.get("docker-content-digest").unwrap(), "sha256:abc");
    }

    #[test]
    fn test_has_body() {
        assert!(!has_body(&Body::empty()));
        assert!(has_body(&Body::from("hello")));

        // Streams without any length information still count
        let chunks = futures::stream::iter(vec![Ok::<_, std::io::Error>(bytes::Bytes::from("x"))]);
        assert!(has_body(&Body::from_stream(chunks)));
    }

    fn target(base: &str) -> ProxyTarget {
        ProxyTarget::new(&Url::parse(base).unwrap(), "https", Duration::from_secs(1)).unwrap()
    }

    #[test]
    fn test_target_url() {
        let target = target("http://registry:5000/");
        let url = target.target_url("/v2/team1/app/manifests/latest?x=1").unwrap();
        assert_eq!(
            url.as_str(),
            "http://registry:5000/v2/team1/app/manifests/latest?x=1"
        );
        assert_eq!(target.upstream_path(&url), Some("/v2/team1/app/manifests/latest"));
    }

    #[test]
    fn test_target_url_is_normalised() {
        let target = target("http://registry:5000");

        let url = target.target_url("/v2/team1/..\\team2/secret/tags/list").unwrap();
        assert_eq!(target.upstream_path(&url), Some("/v2/team2/secret/tags/list"));

        let url = target.target_url("/v2/team1/%2e%2e/team2/app").unwrap();
        assert_eq!(target.upstream_path(&url), Some("/v2/team2/app"));
    }

    #[test]
    fn test_upstream_path_with_base_prefix() {
        let target = target("http://registry:5000/mirror/");

        let url = target.target_url("/v2/team1/app/tags/list").unwrap();
        assert_eq!(target.upstream_path(&url), Some("/v2/team1/app/tags/list"));

        // Escaping the base path yields nothing to authorize
        let url = target.target_url("/../../v2/team2/app/tags/list").unwrap();
        assert_eq!(target.upstream_path(&url), None);
    }
}
