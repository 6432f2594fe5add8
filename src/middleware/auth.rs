use axum::{
    extract::Request,
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use jsonwebtoken::jwk::{AlgorithmParameters, JwkSet};
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::OnceLock;

use crate::error::Result;

static JWKS: OnceLock<JwkSet> = OnceLock::new();

/// Claims issued by the external identity provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
    pub full_name: Option<String>,
    pub email: Option<String>,
}

/// The verified caller, inserted as a request extension for handlers.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub clerk_id: String,
    pub full_name: Option<String>,
    pub email: Option<String>,
}

/// Fetches the provider's key set once at startup. Verification is
/// fail-closed: until this succeeds, every authenticated route returns 503.
pub async fn load_jwks() -> Result<()> {
    let config = crate::config::get_config();
    let jwks = reqwest::get(config.jwks_url())
        .await?
        .error_for_status()?
        .json::<JwkSet>()
        .await?;
    let _ = JWKS.set(jwks);
    tracing::info!("identity provider key set loaded");
    Ok(())
}

fn unauthorized(code: &str) -> Response {
    (StatusCode::UNAUTHORIZED, Json(json!({"error": code}))).into_response()
}

pub async fn require_bearer_auth(mut req: Request, next: Next) -> Response {
    let Some(auth_header) = req.headers().get(axum::http::header::AUTHORIZATION) else {
        return unauthorized("missing_authorization");
    };
    let Ok(auth_str) = auth_header.to_str() else {
        return unauthorized("bad_authorization");
    };
    let Some(token) = auth_str.strip_prefix("Bearer ") else {
        return unauthorized("unsupported_scheme");
    };

    let Some(jwks) = JWKS.get() else {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"error": "jwks_not_available"})),
        )
            .into_response();
    };

    let Ok(header) = decode_header(token) else {
        return unauthorized("invalid_token");
    };
    let Some(kid) = header.kid else {
        return unauthorized("invalid_token");
    };
    let Some(jwk) = jwks.find(&kid) else {
        return unauthorized("unknown_key");
    };
    let AlgorithmParameters::RSA(rsa) = &jwk.algorithm else {
        return unauthorized("unsupported_key");
    };
    let Ok(key) = DecodingKey::from_rsa_components(&rsa.n, &rsa.e) else {
        return unauthorized("invalid_key");
    };

    let config = crate::config::get_config();
    let mut validation = Validation::new(Algorithm::RS256);
    validation.set_issuer(&[&config.identity_issuer]);
    validation.validate_aud = false;

    match decode::<Claims>(token, &key, &validation) {
        Ok(data) => {
            req.extensions_mut().insert(AuthUser {
                clerk_id: data.claims.sub,
                full_name: data.claims.full_name,
                email: data.claims.email,
            });
            next.run(req).await
        }
        Err(err) => {
            tracing::debug!(error = %err, "token verification failed");
            unauthorized("invalid_token")
        }
    }
}
