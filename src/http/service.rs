//! Admission request handling.

use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::{Body, Bytes};
use hyper::header::{HeaderName, HeaderValue, CONTENT_TYPE};
use hyper::{Method, Request, Response, StatusCode};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::admission::{Admission, NodeId, RejectReason, Registry};
use crate::error::{NodegateError, Result};

/// Header selecting a target node on requests and naming the admitting node
/// on responses.
pub const NODE_ID_HEADER: HeaderName = HeaderName::from_static("x-node-id");

/// Default largest accepted request body.
pub const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;

/// Translates HTTP requests into registry calls.
pub struct AdmissionService {
    /// The registry instance
    registry: Arc<Registry>,
    /// Bodies above this size are refused before admission
    max_body_bytes: usize,
}

impl AdmissionService {
    /// Create a new AdmissionService with the given registry.
    pub fn new(registry: Arc<Registry>, max_body_bytes: usize) -> Self {
        Self {
            registry,
            max_body_bytes,
        }
    }

    /// Route a request.
    ///
    /// `/` admits the request body against the registry, `/nodes` reports
    /// node usage and `/health` answers liveness checks.
    #[instrument(
        skip(self, request),
        fields(method = %request.method(), path = %request.uri().path())
    )]
    pub async fn handle<B>(&self, request: Request<B>) -> Response<Full<Bytes>>
    where
        B: Body<Data = Bytes>,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let path = request.uri().path().to_string();
        let method = request.method().clone();
        match (path.as_str(), &method) {
            ("/", _) => self.admit(request).await,
            ("/nodes", &Method::GET) => self.nodes(),
            ("/health", &Method::GET) => text(StatusCode::OK, "OK"),
            ("/nodes", _) | ("/health", _) => {
                text(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed")
            }
            _ => text(StatusCode::NOT_FOUND, "Not Found"),
        }
    }

    async fn admit<B>(&self, request: Request<B>) -> Response<Full<Bytes>>
    where
        B: Body<Data = Bytes>,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let target = match target_node(&request) {
            Ok(target) => target,
            Err(e) => {
                warn!(error = %e, "Rejecting request with malformed node header");
                return text(StatusCode::BAD_REQUEST, e.to_string());
            }
        };

        let body = match Limited::new(request.into_body(), self.max_body_bytes)
            .collect()
            .await
        {
            Ok(collected) => collected.to_bytes(),
            Err(e) if e.is::<LengthLimitError>() => {
                debug!(max_body_bytes = self.max_body_bytes, "Request body too large");
                return text(StatusCode::PAYLOAD_TOO_LARGE, "Payload Too Large");
            }
            Err(e) => {
                warn!(error = %e, "Failed to read request body");
                return text(StatusCode::BAD_REQUEST, "Failed to read request body");
            }
        };

        let size = match u64::try_from(body.len()) {
            Ok(size) => size,
            Err(_) => {
                let e = NodegateError::InvalidInput("body length out of range".to_string());
                return text(StatusCode::BAD_REQUEST, e.to_string());
            }
        };

        let admission = match target {
            Some(node_id) => self.registry.admit_to(node_id, size),
            None => self.registry.admit(size),
        };

        info!(size = size, target = ?target, admission = ?admission, "Admission decision made");

        match admission {
            Admission::Admitted { node_id } => {
                let mut response = text(StatusCode::OK, format!("Admitted by node {}", node_id));
                response
                    .headers_mut()
                    .insert(NODE_ID_HEADER, HeaderValue::from(node_id.0));
                response
            }
            Admission::Rejected {
                reason: RejectReason::UnknownNode,
            } => text(StatusCode::NOT_FOUND, "Unknown node"),
            Admission::Rejected { reason } => {
                text(StatusCode::TOO_MANY_REQUESTS, format!("Rejected: {}", reason))
            }
        }
    }

    fn nodes(&self) -> Response<Full<Bytes>> {
        match serde_json::to_vec(&self.registry.snapshot()) {
            Ok(json) => {
                let mut response = text(StatusCode::OK, json);
                response
                    .headers_mut()
                    .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
                response
            }
            Err(e) => {
                warn!(error = %e, "Failed to encode node snapshot");
                text(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
            }
        }
    }
}

/// Read the optional target node from the request headers.
fn target_node<B>(request: &Request<B>) -> Result<Option<NodeId>> {
    let Some(value) = request.headers().get(&NODE_ID_HEADER) else {
        return Ok(None);
    };

    value
        .to_str()
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(|id| Some(NodeId(id)))
        .ok_or_else(|| {
            NodegateError::InvalidInput(format!(
                "{} must be an unsigned integer",
                NODE_ID_HEADER
            ))
        })
}

fn text(status: StatusCode, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admission::{NodeDescriptor, NodeUsage};

    fn service_with(nodes: &[(u64, u64, u64)], max_body_bytes: usize) -> (Arc<Registry>, AdmissionService) {
        let registry = Arc::new(Registry::new());
        for &(id, requests, bytes) in nodes {
            registry.add_node(NodeDescriptor::new(id, requests, bytes));
        }
        let service = AdmissionService::new(registry.clone(), max_body_bytes);
        (registry, service)
    }

    fn post(body: &'static [u8]) -> Request<Full<Bytes>> {
        Request::builder()
            .method(Method::POST)
            .uri("/")
            .body(Full::new(Bytes::from_static(body)))
            .unwrap()
    }

    async fn body_string(response: Response<Full<Bytes>>) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_admitted_request_returns_ok() {
        let (registry, service) = service_with(&[(1, 10, 1000)], DEFAULT_MAX_BODY_BYTES);

        let response = service.handle(post(b"hello")).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[NODE_ID_HEADER], "1");
        assert_eq!(body_string(response).await, "Admitted by node 1");
        assert_eq!(registry.snapshot()[0].current_bytes, 5);
    }

    #[tokio::test]
    async fn test_capacity_exceeded_returns_too_many_requests() {
        let (registry, service) = service_with(&[(1, 1, 1000)], DEFAULT_MAX_BODY_BYTES);

        assert_eq!(service.handle(post(b"a")).await.status(), StatusCode::OK);
        let response = service.handle(post(b"b")).await;

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(response.headers().get(NODE_ID_HEADER).is_none());
        assert_eq!(registry.snapshot()[0].current_requests, 1);
    }

    #[tokio::test]
    async fn test_targeted_request() {
        let (registry, service) = service_with(&[(1, 10, 1000), (2, 10, 1000)], DEFAULT_MAX_BODY_BYTES);

        let mut request = post(b"abc");
        request
            .headers_mut()
            .insert(NODE_ID_HEADER, HeaderValue::from_static("2"));
        let response = service.handle(request).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[NODE_ID_HEADER], "2");
        assert_eq!(registry.snapshot()[0].current_requests, 0);
    }

    #[tokio::test]
    async fn test_targeted_unknown_node() {
        let (_, service) = service_with(&[(1, 10, 1000)], DEFAULT_MAX_BODY_BYTES);

        let mut request = post(b"abc");
        request
            .headers_mut()
            .insert(NODE_ID_HEADER, HeaderValue::from_static("42"));

        assert_eq!(service.handle(request).await.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_malformed_node_header_rejected() {
        let (registry, service) = service_with(&[(1, 10, 1000)], DEFAULT_MAX_BODY_BYTES);

        let mut request = post(b"abc");
        request
            .headers_mut()
            .insert(NODE_ID_HEADER, HeaderValue::from_static("-1"));

        assert_eq!(service.handle(request).await.status(), StatusCode::BAD_REQUEST);
        assert_eq!(registry.snapshot()[0].current_requests, 0);
    }

    #[tokio::test]
    async fn test_oversized_body_rejected() {
        let (registry, service) = service_with(&[(1, 10, 1000)], 4);

        let response = service.handle(post(b"too long")).await;

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(registry.snapshot()[0].current_requests, 0);
    }

    #[tokio::test]
    async fn test_nodes_snapshot() {
        let (_, service) = service_with(&[(1, 10, 1000), (2, 5, 500)], DEFAULT_MAX_BODY_BYTES);
        service.handle(post(b"12345")).await;

        let request = Request::builder()
            .method(Method::GET)
            .uri("/nodes")
            .body(Full::new(Bytes::new()))
            .unwrap();
        let response = service.handle(request).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[CONTENT_TYPE], "application/json");
        let usage: Vec<NodeUsage> = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(usage.len(), 2);
        assert_eq!(usage[0].current_bytes, 5);
        assert_eq!(usage[1].current_requests, 0);
    }

    #[tokio::test]
    async fn test_routing() {
        let (_, service) = service_with(&[], DEFAULT_MAX_BODY_BYTES);

        let get = |uri: &'static str| {
            Request::builder()
                .method(Method::GET)
                .uri(uri)
                .body(Full::new(Bytes::new()))
                .unwrap()
        };

        assert_eq!(service.handle(get("/health")).await.status(), StatusCode::OK);
        assert_eq!(service.handle(get("/missing")).await.status(), StatusCode::NOT_FOUND);

        let delete = Request::builder()
            .method(Method::DELETE)
            .uri("/nodes")
            .body(Full::new(Bytes::new()))
            .unwrap();
        assert_eq!(
            service.handle(delete).await.status(),
            StatusCode::METHOD_NOT_ALLOWED
        );
    }
}
