use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{Context, anyhow};
use axum::body::Body;
use axum::extract::State;
use axum::http::{Request, header::AUTHORIZATION};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use coffer_core::scopes::{ScopeExpression, satisfies};
use serde::Deserialize;

use crate::error::AppError;
use crate::state::AppState;

/// Verified caller identity. `scopes` may carry trailing-`*` patterns;
/// they are matched against required scopes, never the other way around.
#[derive(Clone, Debug)]
pub struct AuthContext {
    pub subject: String,
    pub scopes: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct JwtHeaderParts {
    alg: String,
}

#[derive(Debug, Deserialize)]
struct Claims {
    sub: String,
    #[serde(default)]
    iss: Option<String>,
    #[serde(default)]
    aud: Option<String>,
    exp: i64,
    #[serde(default)]
    scopes: Vec<String>,
}

/// Validates EdDSA bearer tokens and decides scope questions.
#[derive(Clone)]
pub struct Authorizer {
    issuer: String,
    audience: String,
    public_key: Arc<Vec<u8>>,
}

impl Authorizer {
    pub fn from_env() -> anyhow::Result<Self> {
        let issuer = std::env::var("AUTH_JWT_ISS").context("AUTH_JWT_ISS is required")?;
        let audience = std::env::var("AUTH_JWT_AUD").context("AUTH_JWT_AUD is required")?;
        let encoded =
            std::env::var("AUTH_JWT_ED25519_PUB").context("AUTH_JWT_ED25519_PUB is required")?;
        let public_key = decode_ed25519_key(&encoded)
            .map_err(|err| anyhow!("failed to decode AUTH_JWT_ED25519_PUB: {err}"))?;

        Ok(Self {
            issuer,
            audience,
            public_key: Arc::new(public_key),
        })
    }

    pub fn authenticate(&self, token: &str) -> Result<AuthContext, AppError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(AppError::unauthorized("missing authorization token"));
        }

        let segments: Vec<&str> = token.split('.').collect();
        if segments.len() != 3 {
            return Err(AppError::unauthorized("invalid token format"));
        }

        let header_bytes = URL_SAFE_NO_PAD
            .decode(segments[0].as_bytes())
            .map_err(|_| AppError::unauthorized("invalid token header"))?;
        let header: JwtHeaderParts = serde_json::from_slice(&header_bytes)
            .map_err(|_| AppError::unauthorized("invalid token header"))?;
        if header.alg != "EdDSA" {
            return Err(AppError::unauthorized("unsupported signing algorithm"));
        }

        let signing_input = format!(
            "{header}.{payload}",
            header = segments[0],
            payload = segments[1]
        );
        let signature = URL_SAFE_NO_PAD
            .decode(segments[2].as_bytes())
            .map_err(|_| AppError::unauthorized("invalid token signature"))?;

        ring::signature::UnparsedPublicKey::new(&ring::signature::ED25519, self.public_key.as_ref())
            .verify(signing_input.as_bytes(), &signature)
            .map_err(|_| AppError::unauthorized("token validation error"))?;

        let payload_bytes = URL_SAFE_NO_PAD
            .decode(segments[1].as_bytes())
            .map_err(|_| AppError::unauthorized("invalid token payload"))?;
        let claims: Claims = serde_json::from_slice(&payload_bytes)
            .map_err(|_| AppError::unauthorized("invalid token payload"))?;

        self.validate_claims(&claims)?;

        Ok(AuthContext {
            subject: claims.sub,
            scopes: claims.scopes,
        })
    }

    pub fn authorize(
        &self,
        ctx: &AuthContext,
        required: &ScopeExpression,
    ) -> Result<(), AppError> {
        if satisfies(&ctx.scopes, required) {
            Ok(())
        } else {
            Err(AppError::unauthorized(format!(
                "token scopes do not satisfy {required}"
            )))
        }
    }

    fn validate_claims(&self, claims: &Claims) -> Result<(), AppError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_else(|_| Duration::from_secs(0))
            .as_secs() as i64;
        if claims.exp < now {
            return Err(AppError::unauthorized("token expired"));
        }

        match claims.iss.as_deref() {
            Some(value) if value == self.issuer => {}
            _ => return Err(AppError::unauthorized("invalid issuer")),
        }

        match claims.aud.as_deref() {
            Some(value) if value == self.audience => {}
            _ => return Err(AppError::unauthorized("invalid audience")),
        }

        Ok(())
    }
}

pub fn extract_bearer_token(value: &str) -> Option<&str> {
    let value = value.trim();
    if let Some(rest) = value.strip_prefix("Bearer ") {
        Some(rest.trim())
    } else if let Some(rest) = value.strip_prefix("bearer ") {
        Some(rest.trim())
    } else {
        None
    }
}

pub async fn http_layer(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let token = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(extract_bearer_token)
        .map(str::to_owned);

    let token = match token {
        Some(token) => token,
        None => return AppError::unauthorized("missing authorization header").into_response(),
    };

    match state.authorizer.authenticate(&token) {
        Ok(context) => {
            req.extensions_mut().insert(context);
            next.run(req).await
        }
        Err(err) => err.into_response(),
    }
}

fn decode_ed25519_key(value: &str) -> Result<Vec<u8>, base64::DecodeError> {
    URL_SAFE_NO_PAD.decode(value.as_bytes())
}
