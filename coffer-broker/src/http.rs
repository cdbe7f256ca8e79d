use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware;
use axum::response::IntoResponse;
use axum::{Extension, Json, Router, routing::get, routing::put};
use tracing::Instrument;

use crate::auth::{self, AuthContext};
use crate::error::{AppError, AppErrorKind, attach_correlation};
use crate::models::{PingResponse, SecretResponse, WriteSecretRequest};
use crate::state::AppState;
use crate::telemetry::{CorrelationId, correlation_layer, request_span};
use coffer_core::crypto::signing::SigningKey;
use coffer_core::scopes::ScopeExpression;
use coffer_core::types::{Expiry, SecretId, SecretPatch};

/// Carries the integrity key on GET and DELETE, which have no body.
pub const SIGNING_KEY_HEADER: &str = "x-signing-key";

pub fn router(state: AppState) -> Router {
    let api = api_routes().layer(middleware::from_fn_with_state(
        state.clone(),
        auth::http_layer,
    ));

    Router::new()
        .route("/v1/ping", get(ping))
        .merge(api)
        .layer(middleware::from_fn(correlation_layer))
        .with_state(state)
}

fn api_routes() -> Router<AppState> {
    Router::new().route(
        "/v1/secret/{*name}",
        put(set_secret)
            .patch(update_secret)
            .get(get_secret)
            .delete(remove_secret),
    )
}

async fn ping(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(PingResponse {
            alive: true,
            uptime: state.started.elapsed().as_secs_f64(),
        }),
    )
}

async fn set_secret(
    State(state): State<AppState>,
    Extension(correlation): Extension<CorrelationId>,
    Extension(auth): Extension<AuthContext>,
    Path(name): Path<String>,
    Json(request): Json<WriteSecretRequest>,
) -> Result<impl IntoResponse, AppError> {
    let span = request_span("http.set", &correlation.0);
    async move {
        state
            .authorizer
            .authorize(&auth, &secret_scope("set", &name))?;
        let id = SecretId::new(name).map_err(AppError::from)?;
        let expires = parse_expires(request.expires.as_deref())?.unwrap_or(Expiry::Never);
        let signing_key = request.signing_key.as_deref().map(SigningKey::new);

        state
            .vault
            .create(&id, &request.secret, expires, signing_key.as_ref())
            .map_err(AppError::from)?;
        Ok(StatusCode::NO_CONTENT)
    }
    .instrument(span)
    .await
    .map_err(|err| attach_correlation(err, &correlation))
}

async fn update_secret(
    State(state): State<AppState>,
    Extension(correlation): Extension<CorrelationId>,
    Extension(auth): Extension<AuthContext>,
    Path(name): Path<String>,
    Json(request): Json<WriteSecretRequest>,
) -> Result<impl IntoResponse, AppError> {
    let span = request_span("http.update", &correlation.0);
    async move {
        state
            .authorizer
            .authorize(&auth, &secret_scope("update", &name))?;
        let id = SecretId::new(name).map_err(AppError::from)?;
        let expires = parse_expires(request.expires.as_deref())?;
        let signing_key = request.signing_key.as_deref().map(SigningKey::new);

        let patch = SecretPatch {
            value: Some(request.secret),
            expires,
        };
        state
            .vault
            .modify(&id, patch, signing_key.as_ref())
            .map_err(AppError::from)?;
        Ok(StatusCode::NO_CONTENT)
    }
    .instrument(span)
    .await
    .map_err(|err| attach_correlation(err, &correlation))
}

async fn get_secret(
    State(state): State<AppState>,
    Extension(correlation): Extension<CorrelationId>,
    Extension(auth): Extension<AuthContext>,
    Path(name): Path<String>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let span = request_span("http.get", &correlation.0);
    async move {
        state
            .authorizer
            .authorize(&auth, &secret_scope("get", &name))?;
        let id = SecretId::new(name).map_err(AppError::from)?;
        let signing_key = signing_key_from_headers(&headers)?;

        let secret = state
            .vault
            .load(&id, signing_key.as_ref())
            .map_err(AppError::from)?;
        if secret.has_expired() {
            return Err(AppError::new(AppErrorKind::Gone));
        }

        Ok((
            StatusCode::OK,
            Json(SecretResponse {
                secret: secret.value,
                expires: secret.expires,
            }),
        ))
    }
    .instrument(span)
    .await
    .map_err(|err| attach_correlation(err, &correlation))
}

async fn remove_secret(
    State(state): State<AppState>,
    Extension(correlation): Extension<CorrelationId>,
    Extension(auth): Extension<AuthContext>,
    Path(name): Path<String>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let span = request_span("http.remove", &correlation.0);
    async move {
        state
            .authorizer
            .authorize(&auth, &secret_scope("remove", &name))?;
        let id = SecretId::new(name).map_err(AppError::from)?;
        let signing_key = signing_key_from_headers(&headers)?;

        state
            .vault
            .remove(&id, signing_key.as_ref())
            .map_err(AppError::from)?;
        Ok(StatusCode::NO_CONTENT)
    }
    .instrument(span)
    .await
    .map_err(|err| attach_correlation(err, &correlation))
}

fn secret_scope(verb: &str, name: &str) -> ScopeExpression {
    ScopeExpression::single(format!("secrets:{verb}:{name}"))
}

fn parse_expires(raw: Option<&str>) -> Result<Option<Expiry>, AppError> {
    raw.map(Expiry::parse).transpose().map_err(AppError::from)
}

fn signing_key_from_headers(headers: &HeaderMap) -> Result<Option<SigningKey>, AppError> {
    match headers.get(SIGNING_KEY_HEADER) {
        None => Ok(None),
        Some(value) => {
            let value = value
                .to_str()
                .map_err(|_| AppError::bad_request("x-signing-key header must be valid utf-8"))?;
            Ok(Some(SigningKey::new(value)))
        }
    }
}
