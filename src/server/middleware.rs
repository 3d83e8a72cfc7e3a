use axum::{
    extract::Request,
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use tracing::Span;
use uuid::Uuid;

const REQUEST_ID_HEADER: &str = "x-request-id";

/// Request ID stored in request extensions for correlation and debugging
#[derive(Clone, Debug)]
pub struct RequestId(pub Uuid);

/// Reuse a well-formed incoming request ID (e.g. from a fronting load balancer)
fn incoming_request_id(headers: &HeaderMap) -> Option<Uuid> {
    let value = headers.get(REQUEST_ID_HEADER)?.to_str().ok()?;
    Uuid::parse_str(value.trim()).ok()
}

/// Middleware that assigns a request ID to each request.
///
/// The ID is taken from a valid incoming `x-request-id` header or generated as
/// a UUID v4, stored in request extensions and echoed in the response headers.
/// Must run outside the trace layer so request spans can pick it up.
pub async fn request_id_middleware(mut request: Request, next: Next) -> Response {
    let request_id =
        RequestId(incoming_request_id(request.headers()).unwrap_or_else(Uuid::new_v4));

    request.extensions_mut().insert(request_id.clone());

    let mut response = next.run(request).await;

    response.headers_mut().insert(
        header::HeaderName::from_static(REQUEST_ID_HEADER),
        header::HeaderValue::from_str(&request_id.0.to_string())
            .unwrap_or_else(|_| header::HeaderValue::from_static("invalid")),
    );

    response
}

/// Span for one HTTP request, tagged with its request ID.
///
/// Only the path is recorded; query strings can carry upload state.
pub fn make_request_span(request: &Request) -> Span {
    let request_id = request
        .extensions()
        .get::<RequestId>()
        .map(|rid| rid.0.to_string())
        .unwrap_or_default();

    tracing::info_span!(
        "request",
        method = %request.method(),
        path = %request.uri().path(),
        request_id = %request_id,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        extract::Extension,
        http::{Request as HttpRequest, StatusCode},
        routing::get,
        Router,
    };
    use tower::ServiceExt; // for `oneshot`

    async fn echo_request_id(Extension(request_id): Extension<RequestId>) -> String {
        request_id.0.to_string()
    }

    fn app() -> Router {
        Router::new()
            .route("/", get(echo_request_id))
            .layer(axum::middleware::from_fn(request_id_middleware))
    }

    #[tokio::test]
    async fn test_request_id_generated() {
        let request = HttpRequest::builder()
            .uri("/")
            .body(Body::empty())
            .unwrap();

        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let header = response
            .headers()
            .get(REQUEST_ID_HEADER)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        assert!(Uuid::parse_str(&header).is_ok());

        // Handler saw the same ID
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(String::from_utf8(body.to_vec()).unwrap(), header);
    }

    #[tokio::test]
    async fn test_incoming_request_id_reused() {
        let id = "6f1c7f6e-3d4b-4c43-9a57-2a0f0d1f5e2b";
        let request = HttpRequest::builder()
            .uri("/")
            .header(REQUEST_ID_HEADER, id)
            .body(Body::empty())
            .unwrap();

        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.headers().get(REQUEST_ID_HEADER).unwrap(), id);
    }

    #[tokio::test]
    async fn test_malformed_request_id_replaced() {
        let request = HttpRequest::builder()
            .uri("/")
            .header(REQUEST_ID_HEADER, "not-a-uuid")
            .body(Body::empty())
            .unwrap();

        let response = app().oneshot(request).await.unwrap();
        let header = response.headers().get(REQUEST_ID_HEADER).unwrap();
        assert_ne!(header, "not-a-uuid");
        assert!(Uuid::parse_str(header.to_str().unwrap()).is_ok());
    }
}
