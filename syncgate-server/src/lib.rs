//! HTTP API for syncgate: the `/object/*` routes over an [`Orchestrator`].
//!
//! The caller's application and device come from the `X-BLGREQ-*` headers.
//! Authentication happens upstream; the authenticator forwards the
//! principal through the `X-Auth-*` headers. Every response body is
//! `{status, message}` with `status` mirroring the HTTP status code.

use std::sync::Arc;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::post,
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use syncgate_core::{GatewayError, ObjectRequest, Orchestrator, RequestContext};
use syncgate_types::Principal;
use tracing::error;

pub const APP_ID_HEADER: &str = "x-blgreq-appid";
pub const DEVICE_HEADER: &str = "x-blgreq-udid";
pub const AUTH_EMAIL_HEADER: &str = "x-auth-email";
pub const AUTH_USER_ID_HEADER: &str = "x-auth-user-id";
pub const AUTH_ADMIN_HEADER: &str = "x-auth-admin";

/// JSON body of every response.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub message: Value,
}

fn respond(status: StatusCode, message: impl Into<Value>) -> Response {
    let body = ApiResponse {
        status: status.as_u16(),
        message: message.into(),
    };
    (status, Json(body)).into_response()
}

/// A failed request, rendered as `{status, message}`.
#[derive(Debug)]
pub struct ApiError(GatewayError);

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        Self(err)
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        Self(GatewayError::Serialization(err))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            error!(error = %self.0, "request failed");
        }
        respond(status, self.0.to_string())
    }
}

type ApiResult = Result<Response, ApiError>;

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

/// Builds the caller context from request headers.
pub fn request_context(headers: &HeaderMap) -> Result<RequestContext, GatewayError> {
    let application_id = header(headers, APP_ID_HEADER).ok_or_else(|| {
        GatewayError::InvalidRequest("Requested application is not provided.".into())
    })?;
    let mut ctx = RequestContext::new(application_id);

    if let Some(device) = header(headers, DEVICE_HEADER) {
        ctx = ctx.with_device(device);
    }
    if let Some(email) = header(headers, AUTH_EMAIL_HEADER) {
        let is_admin = header(headers, AUTH_ADMIN_HEADER)
            .is_some_and(|flag| flag.eq_ignore_ascii_case("true") || flag == "1");
        let mut principal = if is_admin {
            Principal::admin(email)
        } else {
            Principal::user(email)
        };
        if let Some(user_id) = header(headers, AUTH_USER_ID_HEADER) {
            principal = principal.with_user_id(user_id);
        }
        ctx = ctx.with_principal(principal);
    }
    Ok(ctx)
}

fn parse(
    headers: &HeaderMap,
    body: Result<Json<ObjectRequest>, JsonRejection>,
) -> Result<(RequestContext, ObjectRequest), ApiError> {
    let ctx = request_context(headers)?;
    let Json(request) =
        body.map_err(|rejection| GatewayError::InvalidRequest(rejection.body_text()))?;
    Ok((ctx, request))
}

async fn subscribe_handler(
    State(orchestrator): State<Arc<Orchestrator>>,
    headers: HeaderMap,
    body: Result<Json<ObjectRequest>, JsonRejection>,
) -> ApiResult {
    let (ctx, request) = parse(&headers, body)?;
    let completed = orchestrator.subscribe(&ctx, &request).await?;
    let objects = serde_json::to_value(&completed.output.objects)?;
    Ok(respond(StatusCode::OK, objects))
}

async fn unsubscribe_handler(
    State(orchestrator): State<Arc<Orchestrator>>,
    headers: HeaderMap,
    body: Result<Json<ObjectRequest>, JsonRejection>,
) -> ApiResult {
    let (ctx, request) = parse(&headers, body)?;
    orchestrator.unsubscribe(&ctx, &request).await?;
    Ok(respond(StatusCode::OK, "Subscription removed"))
}

async fn create_handler(
    State(orchestrator): State<Arc<Orchestrator>>,
    headers: HeaderMap,
    body: Result<Json<ObjectRequest>, JsonRejection>,
) -> ApiResult {
    let (ctx, request) = parse(&headers, body)?;
    orchestrator.create(&ctx, &request).await?;
    Ok(respond(StatusCode::CREATED, "Created"))
}

async fn update_handler(
    State(orchestrator): State<Arc<Orchestrator>>,
    headers: HeaderMap,
    body: Result<Json<ObjectRequest>, JsonRejection>,
) -> ApiResult {
    let (ctx, request) = parse(&headers, body)?;
    orchestrator.update(&ctx, &request).await?;
    Ok(respond(StatusCode::OK, "Updated"))
}

async fn delete_handler(
    State(orchestrator): State<Arc<Orchestrator>>,
    headers: HeaderMap,
    body: Result<Json<ObjectRequest>, JsonRejection>,
) -> ApiResult {
    let (ctx, request) = parse(&headers, body)?;
    orchestrator.delete(&ctx, &request).await?;
    Ok(respond(StatusCode::OK, "Deleted"))
}

async fn count_handler(
    State(orchestrator): State<Arc<Orchestrator>>,
    headers: HeaderMap,
    body: Result<Json<ObjectRequest>, JsonRejection>,
) -> ApiResult {
    let (ctx, request) = parse(&headers, body)?;
    let count = orchestrator.count(&ctx, &request).await?;
    Ok(respond(StatusCode::OK, count))
}

/// Build the HTTP API router around a shared orchestrator.
pub fn build_router(orchestrator: Arc<Orchestrator>) -> Router {
    Router::new()
        .route("/object/subscribe", post(subscribe_handler))
        .route("/object/unsubscribe", post(unsubscribe_handler))
        .route("/object/create", post(create_handler))
        .route("/object/update", post(update_handler))
        .route("/object/delete", post(delete_handler))
        .route("/object/count", post(count_handler))
        .with_state(orchestrator)
}
