//! Bearer-token authentication.
//!
//! Callers are authenticated by the app's identity provider and arrive with
//! an HS256 JWT. The middleware validates it and attaches an [`AuthUser`]
//! extension; handlers that require identity extract it.

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id.
    pub sub: String,
    #[serde(default)]
    pub email: Option<String>,
    /// Expiry, epoch seconds.
    pub exp: i64,
}

/// Authenticated caller identity, inserted by the auth middleware.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub uid: String,
    pub email: Option<String>,
}

#[derive(Clone)]
pub struct JwtManager {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl JwtManager {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        }
    }

    pub fn verify_token(&self, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
        decode::<Claims>(token, &self.decoding, &self.validation).map(|data| data.claims)
    }

    /// Issue a token. Used by tooling and tests; production tokens come from
    /// the identity provider sharing the same secret.
    pub fn issue_token(
        &self,
        uid: &str,
        email: Option<&str>,
        expires_in: time::Duration,
    ) -> Result<String, jsonwebtoken::errors::Error> {
        let claims = Claims {
            sub: uid.to_string(),
            email: email.map(str::to_string),
            exp: (time::OffsetDateTime::now_utc() + expires_in).unix_timestamp(),
        };
        encode(&Header::default(), &claims, &self.encoding)
    }
}

/// Require a valid bearer token and attach the caller identity.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = request
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or_else(|| ApiError::Unauthenticated("must be signed in".to_string()))?;

    let claims = state.jwt_manager.verify_token(token).map_err(|e| {
        tracing::debug!(error = %e, "Token validation failed");
        ApiError::Unauthenticated("invalid or expired token".to_string())
    })?;

    request.extensions_mut().insert(AuthUser {
        uid: claims.sub,
        email: claims.email,
    });

    Ok(next.run(request).await)
}
