// Authentication middleware tests

#[path = "common/mod.rs"]
mod common;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    routing::get,
    Extension, Router,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use nanohub::auth::{ClientCertificate, EnrollmentId, TlsPeerCertificates};
use nanohub::core::constants::mdm::{CHECKIN_CONTENT_TYPE, MDM_SIGNATURE_HEADER};
use nanohub::core::models::{CallContext, Certificate};
use nanohub::hub::{HubBuilder, NanoHub};
use std::sync::Arc;
use tower::ServiceExt;

use common::*;

const CERT_HEADER: &str = "X-Client-Cert";

fn builder() -> HubBuilder {
    HubBuilder::new().with_verifier(Arc::new(MockVerifier::default()))
}

async fn status_of(router: Router, req: Request<Body>) -> StatusCode {
    router.oneshot(req).await.unwrap().status()
}

fn checkin_request() -> axum::http::request::Builder {
    Request::builder()
        .method("PUT")
        .uri("/mdm")
        .header(header::CONTENT_TYPE, CHECKIN_CONTENT_TYPE)
}

#[tokio::test]
async fn test_rfc9440_header_extraction() {
    let store = Arc::new(MockStore::default());
    let hub = NanoHub::from_builder(store.clone(), builder().with_cert_header(CERT_HEADER)).unwrap();

    let body = checkin_plist("Authenticate", "UDID-1", "");
    let req = checkin_request()
        .header(CERT_HEADER, format!(":{}:", STANDARD.encode(b"proxy-cert")))
        .body(Body::from(body))
        .unwrap();

    assert_eq!(status_of(hub.server_handler(), req).await, StatusCode::OK);
    assert_eq!(
        store.hash_for("UDID-1"),
        Some(Certificate::from_der(b"proxy-cert".to_vec()).hash().as_str().to_string())
    );
}

#[tokio::test]
async fn test_header_extraction_ignores_tls_certificate() {
    let store = Arc::new(MockStore::default());
    let hub = NanoHub::from_builder(store.clone(), builder().with_cert_header(CERT_HEADER)).unwrap();

    let body = checkin_plist("Authenticate", "UDID-1", "");
    let mut req = checkin_request().body(Body::from(body)).unwrap();
    req.extensions_mut()
        .insert(TlsPeerCertificates(vec![b"tls-cert".to_vec()]));

    assert_eq!(status_of(hub.server_handler(), req).await, StatusCode::BAD_REQUEST);
    assert!(store.calls().is_empty());
}

#[tokio::test]
async fn test_malformed_header_is_bad_request() {
    let store = Arc::new(MockStore::default());
    let hub = NanoHub::from_builder(store.clone(), builder().with_cert_header(CERT_HEADER)).unwrap();

    let body = checkin_plist("Authenticate", "UDID-1", "");
    let req = checkin_request()
        .header(CERT_HEADER, ":not base64!:")
        .body(Body::from(body))
        .unwrap();

    assert_eq!(status_of(hub.server_handler(), req).await, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_mdm_signature_extraction() {
    let store = Arc::new(MockStore::default());
    let hub = NanoHub::from_builder(
        store.clone(),
        builder().with_mdm_signature(Arc::new(MockSignatureVerifier)),
    )
    .unwrap();

    let body = checkin_plist("Authenticate", "UDID-1", "");
    let req = checkin_request()
        .header(MDM_SIGNATURE_HEADER, "signer-cert")
        .body(Body::from(body))
        .unwrap();

    // the handler still sees the buffered body
    assert_eq!(status_of(hub.server_handler(), req).await, StatusCode::OK);
    assert!(store.calls().contains(&"store_authenticate:UDID-1".to_string()));
    assert_eq!(
        store.hash_for("UDID-1"),
        Some(Certificate::from_der(b"signer-cert".to_vec()).hash().as_str().to_string())
    );
}

#[tokio::test]
async fn test_mdm_signature_failures() {
    let store = Arc::new(MockStore::default());
    let hub = NanoHub::from_builder(
        store.clone(),
        builder()
            .with_mdm_signature(Arc::new(MockSignatureVerifier))
            .with_mdm_signature_error_log(),
    )
    .unwrap();

    let body = checkin_plist("Authenticate", "UDID-1", "");
    let missing = checkin_request().body(Body::from(body.clone())).unwrap();
    assert_eq!(status_of(hub.server_handler(), missing).await, StatusCode::BAD_REQUEST);

    let invalid = checkin_request()
        .header(MDM_SIGNATURE_HEADER, "invalid")
        .body(Body::from(body))
        .unwrap();
    assert_eq!(status_of(hub.server_handler(), invalid).await, StatusCode::BAD_REQUEST);

    assert!(store.calls().is_empty());
}

#[tokio::test]
async fn test_untrusted_header_certificate() {
    let store = Arc::new(MockStore::default());
    let verifier = MockVerifier {
        rejected: vec![b"proxy-cert".to_vec()],
    };
    let hub = NanoHub::from_builder(
        store.clone(),
        HubBuilder::new()
            .with_verifier(Arc::new(verifier))
            .with_cert_header(CERT_HEADER),
    )
    .unwrap();

    let body = checkin_plist("Authenticate", "UDID-1", "");
    let req = checkin_request()
        .header(CERT_HEADER, format!(":{}:", STANDARD.encode(b"proxy-cert")))
        .body(Body::from(body))
        .unwrap();

    assert_eq!(status_of(hub.server_handler(), req).await, StatusCode::UNAUTHORIZED);
}

async fn whoami(
    Extension(EnrollmentId(id)): Extension<EnrollmentId>,
    Extension(ClientCertificate(cert)): Extension<ClientCertificate>,
) -> String {
    format!("{} {}", id, cert.hash())
}

fn tls_get(cert: Option<&[u8]>) -> Request<Body> {
    let mut req = Request::builder().uri("/whoami").body(Body::empty()).unwrap();
    if let Some(der) = cert {
        req.extensions_mut()
            .insert(TlsPeerCertificates(vec![der.to_vec()]));
    }
    req
}

#[tokio::test]
async fn test_id_auth_middleware() {
    let store = Arc::new(MockStore::default());
    let cert = Certificate::from_der(b"device-cert".to_vec());
    store.associate("UDID-1", &cert);
    let hub = NanoHub::from_builder(store.clone(), builder()).unwrap();
    let app = hub.id_auth_middleware(Router::new().route("/whoami", get(whoami)));

    let response = app.clone().oneshot(tls_get(Some(b"device-cert"))).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(body, format!("UDID-1 {}", cert.hash()).into_bytes());

    assert_eq!(
        status_of(app.clone(), tls_get(Some(b"unknown-cert"))).await,
        StatusCode::FORBIDDEN
    );
    assert_eq!(status_of(app, tls_get(None)).await, StatusCode::BAD_REQUEST);
}

async fn trace_id(Extension(ctx): Extension<CallContext>) -> String {
    ctx.trace_id().unwrap_or_default().to_string()
}

#[tokio::test]
async fn test_id_auth_middleware_scopes_call_context() {
    let store = Arc::new(MockStore::default());
    store.associate("UDID-1", &Certificate::from_der(b"device-cert".to_vec()));
    let hub = NanoHub::from_builder(store.clone(), builder()).unwrap();
    let app = hub.id_auth_middleware(Router::new().route("/whoami", get(trace_id)));

    let response = app.oneshot(tls_get(Some(b"device-cert"))).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();

    let contexts = store.retriever_contexts.lock().unwrap();
    assert_eq!(contexts.len(), 1);
    let ctx = &contexts[0];
    assert_eq!(ctx.trace_id().map(str::as_bytes), Some(&body[..]));
    assert!(!body.is_empty());
    // released once the request completes
    assert!(ctx.is_cancelled());
}

#[tokio::test]
async fn test_id_auth_middleware_lookup_failure() {
    let store = Arc::new(MockStore {
        store_should_fail: true,
        ..Default::default()
    });
    let hub = NanoHub::from_builder(store, builder()).unwrap();
    let app = hub.id_auth_middleware(Router::new().route("/whoami", get(whoami)));

    assert_eq!(
        status_of(app, tls_get(Some(b"device-cert"))).await,
        StatusCode::INTERNAL_SERVER_ERROR
    );
}
