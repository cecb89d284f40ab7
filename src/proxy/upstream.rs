//! Reverse proxy to a single upstream host.

use async_trait::async_trait;
use axum::body::{Body, HttpBody};
use axum::extract::ConnectInfo;
use axum::http::header::{self, HeaderMap, HeaderName, HeaderValue};
use axum::http::{Request, StatusCode};
use axum::response::{IntoResponse, Response};
use reqwest::{redirect, Client, Url};
use std::net::{IpAddr, SocketAddr};
use tracing::{debug, warn};

use super::Forwarder;
use crate::error::{Result, SubgateError};

const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// Connection-scoped headers that must not cross the proxy.
const HOP_BY_HOP: [&str; 9] = [
    "connection",
    "keep-alive",
    "proxy-connection",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Forwards requests to one upstream base URL.
///
/// Method, path, query, headers and body are passed through. The outbound
/// `Host` is the upstream's, redirects are relayed rather than followed,
/// and bodies are streamed in both directions.
pub struct UpstreamProxy {
    /// HTTP client used for upstream calls
    client: Client,
    /// Base URL every request is resolved against
    upstream: Url,
}

impl UpstreamProxy {
    /// Create a proxy for the given upstream base URL.
    pub fn new(upstream: Url) -> Result<Self> {
        let client = Client::builder()
            .redirect(redirect::Policy::none())
            .build()
            .map_err(|e| SubgateError::Config(format!("Failed to build upstream client: {}", e)))?;

        Ok(Self { client, upstream })
    }

    /// Get the upstream base URL.
    pub fn upstream(&self) -> &Url {
        &self.upstream
    }
}

#[async_trait]
impl Forwarder for UpstreamProxy {
    async fn forward(&self, request: Request<Body>) -> Response {
        let client_ip = request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip());

        let (parts, body) = request.into_parts();
        let target = target_url(&self.upstream, parts.uri.path(), parts.uri.query());

        let mut headers = parts.headers;
        strip_hop_by_hop(&mut headers);
        headers.remove(header::HOST);
        if let Some(ip) = client_ip {
            append_forwarded_for(&mut headers, ip);
        }

        debug!(method = %parts.method, target = %target, "Forwarding request upstream");

        let mut outbound = self
            .client
            .request(parts.method, target.clone())
            .headers(headers);
        if !body.is_end_stream() {
            outbound = outbound.body(reqwest::Body::wrap_stream(body.into_data_stream()));
        }

        match outbound.send().await {
            Ok(upstream) => relay(upstream),
            Err(e) => {
                warn!(target = %target, error = %e, "Upstream request failed");
                StatusCode::BAD_GATEWAY.into_response()
            }
        }
    }
}

/// Turn an upstream response into the response sent to the client.
fn relay(upstream: reqwest::Response) -> Response {
    let status = upstream.status();
    let mut headers = upstream.headers().clone();
    strip_hop_by_hop(&mut headers);

    let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}

/// Resolve a request path and query against the upstream base URL.
///
/// Paths are joined with exactly one slash between them. When both the
/// base and the request carry a query, the base query comes first.
pub(crate) fn target_url(upstream: &Url, path: &str, query: Option<&str>) -> Url {
    let mut target = upstream.clone();
    target.set_path(&join_paths(upstream.path(), path));
    target.set_fragment(None);

    let base_query = upstream.query().filter(|q| !q.is_empty());
    let request_query = query.filter(|q| !q.is_empty());
    let merged = match (base_query, request_query) {
        (Some(base), Some(request)) => Some(format!("{}&{}", base, request)),
        (Some(base), None) => Some(base.to_string()),
        (None, Some(request)) => Some(request.to_string()),
        (None, None) => None,
    };
    target.set_query(merged.as_deref());
    target
}

fn join_paths(base: &str, path: &str) -> String {
    match (base.ends_with('/'), path.starts_with('/')) {
        (true, true) => format!("{}{}", base, &path[1..]),
        (false, false) => format!("{}/{}", base, path),
        _ => format!("{}{}", base, path),
    }
}

/// Remove hop-by-hop headers, including any named by `Connection`.
pub(crate) fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in listed {
        headers.remove(name);
    }
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
}

/// Append the client address to any `X-Forwarded-For` chain already present.
fn append_forwarded_for(headers: &mut HeaderMap, ip: IpAddr) {
    let prior: Vec<&str> = headers
        .get_all(X_FORWARDED_FOR)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .collect();

    let chain = if prior.is_empty() {
        ip.to_string()
    } else {
        format!("{}, {}", prior.join(", "), ip)
    };

    if let Ok(value) = HeaderValue::from_str(&chain) {
        headers.insert(X_FORWARDED_FOR, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string, header as header_is, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    async fn body_text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[test]
    fn test_target_url_joins_paths() {
        let root = url("http://backend:8000");
        assert_eq!(
            target_url(&root, "/s/abc", None).as_str(),
            "http://backend:8000/s/abc"
        );

        let nested = url("http://backend:8000/api");
        assert_eq!(
            target_url(&nested, "/s/abc", None).as_str(),
            "http://backend:8000/api/s/abc"
        );

        let nested_slash = url("http://backend:8000/api/");
        assert_eq!(
            target_url(&nested_slash, "/s/abc", None).as_str(),
            "http://backend:8000/api/s/abc"
        );
    }

    #[test]
    fn test_target_url_merges_queries() {
        let plain = url("http://backend");
        assert_eq!(
            target_url(&plain, "/s/abc", Some("flag=clash")).as_str(),
            "http://backend/s/abc?flag=clash"
        );

        let with_query = url("http://backend/?key=1");
        assert_eq!(
            target_url(&with_query, "/s/abc", Some("flag=clash")).as_str(),
            "http://backend/s/abc?key=1&flag=clash"
        );
        assert_eq!(
            target_url(&with_query, "/s/abc", None).as_str(),
            "http://backend/s/abc?key=1"
        );
    }

    #[test]
    fn test_strip_hop_by_hop() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONNECTION, HeaderValue::from_static("close, x-session"));
        headers.insert("x-session", HeaderValue::from_static("1"));
        headers.insert(header::UPGRADE, HeaderValue::from_static("websocket"));
        headers.insert("keep-alive", HeaderValue::from_static("timeout=5"));
        headers.insert(header::USER_AGENT, HeaderValue::from_static("clash"));

        strip_hop_by_hop(&mut headers);

        assert!(headers.get(header::CONNECTION).is_none());
        assert!(headers.get("x-session").is_none());
        assert!(headers.get(header::UPGRADE).is_none());
        assert!(headers.get("keep-alive").is_none());
        assert_eq!(headers.get(header::USER_AGENT).unwrap(), "clash");
    }

    #[test]
    fn test_append_forwarded_for() {
        let mut headers = HeaderMap::new();
        append_forwarded_for(&mut headers, "10.0.0.1".parse().unwrap());
        assert_eq!(headers.get(X_FORWARDED_FOR).unwrap(), "10.0.0.1");

        append_forwarded_for(&mut headers, "10.0.0.2".parse().unwrap());
        assert_eq!(headers.get(X_FORWARDED_FOR).unwrap(), "10.0.0.1, 10.0.0.2");
    }

    #[tokio::test]
    async fn test_forward_relays_upstream_response() {
        let server = MockServer::start().await;
        let host = server.address().to_string();

        Mock::given(method("GET"))
            .and(path("/s/abc"))
            .and(query_param("flag", "clash"))
            .and(header_is("host", host.as_str()))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("subscription-userinfo", "upload=0; download=0")
                    .set_body_string("proxies: []"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let proxy = UpstreamProxy::new(url(&server.uri())).unwrap();
        let request = Request::builder()
            .uri("/s/abc?flag=clash")
            .header(header::HOST, "gate.example.com")
            .body(Body::empty())
            .unwrap();

        let response = proxy.forward(request).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get("subscription-userinfo").unwrap(),
            "upload=0; download=0"
        );
        assert_eq!(body_text(response).await, "proxies: []");
    }

    #[tokio::test]
    async fn test_forward_passes_body_and_client_address() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/s/abc"))
            .and(header_is("x-forwarded-for", "10.1.2.3"))
            .and(body_string("payload"))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let proxy = UpstreamProxy::new(url(&server.uri())).unwrap();
        let mut request = Request::builder()
            .method("POST")
            .uri("/s/abc")
            .header(header::CONTENT_LENGTH, "7")
            .body(Body::from("payload"))
            .unwrap();
        let client: SocketAddr = "10.1.2.3:40000".parse().unwrap();
        request.extensions_mut().insert(ConnectInfo(client));

        let response = proxy.forward(request).await;
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    #[tokio::test]
    async fn test_forward_does_not_follow_redirects() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/s/abc"))
            .respond_with(ResponseTemplate::new(302).insert_header("location", "/elsewhere"))
            .mount(&server)
            .await;

        let proxy = UpstreamProxy::new(url(&server.uri())).unwrap();
        let request = Request::builder().uri("/s/abc").body(Body::empty()).unwrap();

        let response = proxy.forward(request).await;
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(response.headers().get(header::LOCATION).unwrap(), "/elsewhere");
    }

    #[tokio::test]
    async fn test_forward_unreachable_upstream_is_bad_gateway() {
        // Bind and drop to get a port nothing listens on
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let proxy = UpstreamProxy::new(url(&format!("http://{}", addr))).unwrap();
        let request = Request::builder().uri("/s/abc").body(Body::empty()).unwrap();

        let response = proxy.forward(request).await;
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }
}
