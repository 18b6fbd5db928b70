// Copyright 2026 BadCompany
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! HTTP framing of the MDM protocol.
//!
//! Handlers decode plist bodies into typed messages, resolve the enrollment
//! and call the service chain. Routers answer on every path and method so the
//! embedding application can mount them wherever its MDM URLs point.

pub mod responses;

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Query, State},
    http::{header::CONTENT_TYPE, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Extension, Router,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::auth::ClientCertificate;
use crate::core::constants::mdm;
use crate::core::errors::HubError;
use crate::core::models::{CallContext, MdmRequest, Params};
use crate::mdm::{decode_checkin, decode_command_results, Enrollment};
use crate::service::{dispatch_checkin, CheckinAndCommandService};

use self::responses::ApiError;

#[derive(Clone)]
pub struct HandlerState {
    service: Arc<dyn CheckinAndCommandService>,
    handler: &'static str,
}

impl HandlerState {
    pub fn new(service: Arc<dyn CheckinAndCommandService>, handler: &'static str) -> Self {
        Self { service, handler }
    }
}

/// Check-ins and command reports on one endpoint, split by content type.
pub fn checkin_and_command_router(state: HandlerState, body_limit: usize) -> Router {
    mdm_router(state, body_limit, Kind::Combined)
}

pub fn checkin_router(state: HandlerState, body_limit: usize) -> Router {
    mdm_router(state, body_limit, Kind::Checkin)
}

pub fn command_router(state: HandlerState, body_limit: usize) -> Router {
    mdm_router(state, body_limit, Kind::Command)
}

#[derive(Clone, Copy)]
enum Kind {
    Combined,
    Checkin,
    Command,
}

fn mdm_router(state: HandlerState, body_limit: usize, kind: Kind) -> Router {
    let router = match kind {
        Kind::Combined => Router::new().fallback(checkin_and_command_handler),
        Kind::Checkin => Router::new().fallback(checkin_handler),
        Kind::Command => Router::new().fallback(command_handler),
    };
    router
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn new_request(
    enrollment: &Enrollment,
    cert: Option<Extension<ClientCertificate>>,
    params: Params,
) -> Result<MdmRequest, HubError> {
    let id = enrollment.resolve_id()?;
    let ctx = CallContext::new(CancellationToken::new()).with_trace_id(Uuid::new_v4().to_string());

    let mut r = MdmRequest::new(ctx, id).with_params(params);
    if let Some(Extension(ClientCertificate(cert))) = cert {
        r = r.with_certificate(cert);
    }
    Ok(r)
}

fn log_error(handler: &'static str, what: &'static str, id: Option<&str>, err: &HubError) {
    let id = id.unwrap_or_default();
    if err.status_code() >= 500 {
        error!(service = "handler", handler, enrollment_id = %id, error = %err, "{}", what);
    } else {
        warn!(service = "handler", handler, enrollment_id = %id, error = %err, "{}", what);
    }
}

async fn checkin(
    state: &HandlerState,
    cert: Option<Extension<ClientCertificate>>,
    params: Params,
    body: &[u8],
) -> Result<Response, ApiError> {
    let msg = decode_checkin(body).map_err(|e| {
        log_error(state.handler, "decoding check-in", None, &e);
        ApiError::from(e)
    })?;
    let r = new_request(msg.enrollment(), cert, params).map_err(|e| {
        log_error(state.handler, "resolving enrollment", None, &e);
        ApiError::from(e)
    })?;
    // cancel collaborator work if the client goes away
    let _guard = r.ctx.cancellation().clone().drop_guard();

    debug!(
        service = "handler",
        handler = state.handler,
        enrollment_id = %r.id,
        message_type = msg.message_type(),
        "check-in"
    );
    match dispatch_checkin(state.service.as_ref(), &r, &msg).await {
        Ok(Some(body)) => Ok((StatusCode::OK, body).into_response()),
        Ok(None) => Ok(StatusCode::OK.into_response()),
        Err(e) => {
            log_error(state.handler, "check-in", Some(&r.id), &e);
            let trace_id = r.ctx.trace_id().unwrap_or_default().to_string();
            Err(ApiError::from(e).with_request_id(trace_id))
        }
    }
}

async fn command(
    state: &HandlerState,
    cert: Option<Extension<ClientCertificate>>,
    params: Params,
    body: &[u8],
) -> Result<Response, ApiError> {
    let results = decode_command_results(body).map_err(|e| {
        log_error(state.handler, "decoding command report", None, &e);
        ApiError::from(e)
    })?;
    let r = new_request(&results.enrollment, cert, params).map_err(|e| {
        log_error(state.handler, "resolving enrollment", None, &e);
        ApiError::from(e)
    })?;
    let _guard = r.ctx.cancellation().clone().drop_guard();

    debug!(
        service = "handler",
        handler = state.handler,
        enrollment_id = %r.id,
        status = %results.status,
        "command report"
    );
    match state.service.command_and_report_results(&r, &results).await {
        Ok(Some(cmd)) => Ok((StatusCode::OK, cmd.raw).into_response()),
        Ok(None) => Ok(StatusCode::OK.into_response()),
        Err(e) => {
            log_error(state.handler, "command report", Some(&r.id), &e);
            let trace_id = r.ctx.trace_id().unwrap_or_default().to_string();
            Err(ApiError::from(e).with_request_id(trace_id))
        }
    }
}

async fn checkin_and_command_handler(
    State(state): State<HandlerState>,
    headers: HeaderMap,
    cert: Option<Extension<ClientCertificate>>,
    Query(params): Query<Params>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let is_checkin = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| ct.starts_with(mdm::CHECKIN_CONTENT_TYPE))
        .unwrap_or(false);

    if is_checkin {
        checkin(&state, cert, params, &body).await
    } else {
        command(&state, cert, params, &body).await
    }
}

async fn checkin_handler(
    State(state): State<HandlerState>,
    cert: Option<Extension<ClientCertificate>>,
    Query(params): Query<Params>,
    body: Bytes,
) -> Result<Response, ApiError> {
    checkin(&state, cert, params, &body).await
}

async fn command_handler(
    State(state): State<HandlerState>,
    cert: Option<Extension<ClientCertificate>>,
    Query(params): Query<Params>,
    body: Bytes,
) -> Result<Response, ApiError> {
    command(&state, cert, params, &body).await
}
