//! Router-level tests: multipart render round-trips, error mapping, and the
//! health surface, all against scripted browser mocks.

mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use common::{MockHost, PNG_SIGNATURE, PageScript, WEBM_MAGIC};
use http_body_util::BodyExt;
use schemat::application::render::{
    PageFactory, PageFactoryConfig, PagePool, ReadinessGate, RenderService, RenderServiceConfig,
};
use schemat::infra::http::{HttpState, build_router};
use tower::ServiceExt;

const BOUNDARY: &str = "schemat-test-boundary";

fn service_config() -> RenderServiceConfig {
    RenderServiceConfig {
        backend_wait: Duration::from_millis(300),
        image_timeout: Duration::from_millis(200),
        video_timeout: Duration::from_millis(300),
    }
}

fn factory_config() -> PageFactoryConfig {
    PageFactoryConfig {
        frontend_url: "http://localhost:3000".to_string(),
        navigation_timeout: Duration::from_millis(200),
        helper_discovery_timeout: Duration::from_millis(200),
        helper_poll_interval: Duration::from_millis(10),
        frontend_ready_timeout: Duration::from_millis(200),
    }
}

async fn router_with(host: MockHost, bootstrap: bool) -> Router {
    let factory = PageFactory::new(Arc::new(host), factory_config());
    let pool = Arc::new(PagePool::new(factory, 1));
    let gate = Arc::new(ReadinessGate::new());
    let renderer = Arc::new(RenderService::new(pool, gate, service_config()));

    if bootstrap {
        renderer.initialize().await;
    }

    build_router(HttpState {
        renderer,
        started_at: Instant::now(),
        upload_limit_bytes: 1024 * 1024,
    })
}

struct MultipartBody {
    bytes: Vec<u8>,
}

impl MultipartBody {
    fn new() -> Self {
        Self { bytes: Vec::new() }
    }

    fn file(mut self, name: &str, filename: &str, content: &[u8]) -> Self {
        self.bytes.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        self.bytes.extend_from_slice(content);
        self.bytes.extend_from_slice(b"\r\n");
        self
    }

    fn field(mut self, name: &str, value: &str) -> Self {
        self.bytes.extend_from_slice(
            format!("--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n")
                .as_bytes(),
        );
        self
    }

    fn finish(mut self) -> Vec<u8> {
        self.bytes
            .extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        self.bytes
    }
}

fn multipart_request(uri: &str, body: Vec<u8>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

async fn response_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn render_schematic_returns_png_attachment() {
    let router = router_with(MockHost::healthy(), true).await;

    let body = MultipartBody::new()
        .file("schematic", "castle.schem", b"\x0a\x00\x09schematic-bytes")
        .field("width", "640")
        .field("height", "480")
        .finish();

    let response = router
        .oneshot(multipart_request("/api/render-schematic", body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "image/png"
    );
    let disposition = response
        .headers()
        .get(header::CONTENT_DISPOSITION)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(disposition.contains("castle.png"), "{disposition}");

    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert!(bytes.starts_with(&PNG_SIGNATURE));
}

#[tokio::test]
async fn render_schematic_video_returns_webm_attachment() {
    let router = router_with(MockHost::healthy(), true).await;

    let body = MultipartBody::new()
        .file("schematic", "castle.litematic", b"schematic-bytes")
        .field("duration", "3")
        .finish();

    let response = router
        .oneshot(multipart_request("/api/render-schematic-video", body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "video/webm"
    );
    let disposition = response
        .headers()
        .get(header::CONTENT_DISPOSITION)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(disposition.contains("castle_animation.webm"), "{disposition}");

    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert!(bytes.starts_with(&WEBM_MAGIC));
}

#[tokio::test]
async fn missing_file_is_a_bad_request() {
    let router = router_with(MockHost::healthy(), true).await;

    let body = MultipartBody::new().field("width", "640").finish();
    let response = router
        .oneshot(multipart_request("/api/render-schematic", body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = response_json(response).await;
    assert_eq!(json["error"]["code"], "bad_request");
}

#[tokio::test]
async fn unsupported_extension_is_rejected_before_rendering() {
    let host = MockHost::healthy();
    let router = router_with(host, true).await;

    let body = MultipartBody::new()
        .file("schematic", "castle.zip", b"not-a-schematic")
        .finish();
    let response = router
        .oneshot(multipart_request("/api/render-schematic", body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = response_json(response).await;
    assert_eq!(json["error"]["code"], "bad_request");
    assert!(
        json["error"]["hint"]
            .as_str()
            .unwrap()
            .contains("unsupported schematic format")
    );
}

#[tokio::test]
async fn rejected_load_maps_to_unprocessable_entity() {
    let router = router_with(
        MockHost::new(PageScript::rejecting_load("corrupt nbt tag")),
        true,
    )
    .await;

    let body = MultipartBody::new()
        .file("schematic", "broken.schem", b"broken")
        .finish();
    let response = router
        .oneshot(multipart_request("/api/render-schematic", body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let json = response_json(response).await;
    assert_eq!(json["error"]["code"], "invalid_schematic");
}

#[tokio::test]
async fn stalled_render_maps_to_gateway_timeout_with_hint() {
    let host = MockHost::healthy();
    host.queue_page(PageScript::stalling_load());
    let router = router_with(host, true).await;

    let body = MultipartBody::new()
        .file("schematic", "huge.schem", b"huge")
        .finish();
    let response = router
        .oneshot(multipart_request("/api/render-schematic", body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
    let json = response_json(response).await;
    assert_eq!(json["error"]["code"], "render_timeout");
    assert!(json["error"]["hint"].as_str().unwrap().contains("smaller"));
}

#[tokio::test]
async fn unready_backend_maps_to_service_unavailable() {
    let host = MockHost::healthy();
    host.queue_open_failure("no browser");
    let router = router_with(host, true).await;

    let body = MultipartBody::new()
        .file("schematic", "castle.schem", b"bytes")
        .finish();
    let response = router
        .oneshot(multipart_request("/api/render-schematic", body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let json = response_json(response).await;
    assert_eq!(json["error"]["code"], "backend_unavailable");
}

#[tokio::test]
async fn health_reports_pool_occupancy() {
    let router = router_with(MockHost::healthy(), true).await;

    let response = router
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = response_json(response).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["services"]["renderer"], "ready");
    assert_eq!(json["services"]["pool"]["available"], 1);
    assert_eq!(json["services"]["pool"]["total"], 1);
}

#[tokio::test]
async fn health_reports_degraded_before_bootstrap() {
    let router = router_with(MockHost::healthy(), false).await;

    let response = router
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    let json = response_json(response).await;
    assert_eq!(json["status"], "degraded");
    assert_eq!(json["services"]["renderer"], "uninitialized");
    assert_eq!(json["services"]["pool"]["available"], 0);
}

#[tokio::test]
async fn api_index_lists_endpoints() {
    let router = router_with(MockHost::healthy(), true).await;

    let response = router
        .oneshot(Request::builder().uri("/api").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = response_json(response).await;
    assert_eq!(json["message"], "Schemat Render Service API");
    assert!(
        json["endpoints"]
            .as_array()
            .unwrap()
            .iter()
            .any(|entry| entry == "POST /api/render-schematic")
    );
}
