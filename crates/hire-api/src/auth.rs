use axum::async_trait;
use axum::extract::FromRef;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use clap::ValueEnum;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::Deserialize;

use crate::error::ApiError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "snake_case")]
pub enum AuthMode {
    ApiKey,
    Jwt,
}

/// HMAC algorithms accepted for `AUTH_MODE=jwt`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "lowercase")]
pub enum JwtAlgorithm {
    Hs256,
    Hs384,
    Hs512,
}

impl From<JwtAlgorithm> for Algorithm {
    fn from(value: JwtAlgorithm) -> Self {
        match value {
            JwtAlgorithm::Hs256 => Algorithm::HS256,
            JwtAlgorithm::Hs384 => Algorithm::HS384,
            JwtAlgorithm::Hs512 => Algorithm::HS512,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub mode: AuthMode,
    pub api_key: Option<String>,
    pub jwt_secret: Option<String>,
    pub jwt_algorithm: JwtAlgorithm,
}

impl AuthConfig {
    pub fn api_key(key: impl Into<String>) -> Self {
        Self {
            mode: AuthMode::ApiKey,
            api_key: Some(key.into()),
            jwt_secret: None,
            jwt_algorithm: JwtAlgorithm::Hs256,
        }
    }
}

/// Caller identity; webhook senders and operators share one credential.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub subject: String,
}

#[derive(Debug, Deserialize)]
struct Claims {
    sub: String,
    #[allow(dead_code)]
    exp: Option<usize>,
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    AuthConfig: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let config = AuthConfig::from_ref(state);

        match config.mode {
            AuthMode::ApiKey => authorize_api_key(parts, &config),
            AuthMode::Jwt => authorize_jwt(parts, &config),
        }
    }
}

fn authorize_api_key(parts: &Parts, config: &AuthConfig) -> Result<AuthUser, ApiError> {
    let expected = config
        .api_key
        .as_deref()
        .ok_or_else(|| ApiError::Unauthorized("missing HIRE_API_KEY".into()))?;

    let provided = parts
        .headers
        .get("x-api-key")
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| ApiError::Unauthorized("missing X-API-Key header".into()))?;

    if provided != expected {
        return Err(ApiError::Unauthorized("invalid API key".into()));
    }

    Ok(AuthUser {
        subject: "api_key".to_string(),
    })
}

fn authorize_jwt(parts: &Parts, config: &AuthConfig) -> Result<AuthUser, ApiError> {
    let secret = config
        .jwt_secret
        .as_deref()
        .ok_or_else(|| ApiError::Unauthorized("missing JWT_SECRET".into()))?;

    let header = parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| ApiError::Unauthorized("missing Authorization header".into()))?;

    let token = header
        .strip_prefix("Bearer ")
        .ok_or_else(|| ApiError::Unauthorized("expected Bearer token".into()))?;

    let mut validation = Validation::new(config.jwt_algorithm.into());
    validation.required_spec_claims.clear();
    validation.required_spec_claims.insert("sub".to_string());

    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map_err(|err| ApiError::Unauthorized(format!("invalid token: {err}")))?;

    Ok(AuthUser {
        subject: data.claims.sub,
    })
}

#[cfg(test)]
mod tests {
    use axum::http::Request;
    use jsonwebtoken::{EncodingKey, Header, encode};
    use serde::Serialize;

    use super::*;

    #[derive(Serialize)]
    struct TestClaims<'a> {
        sub: &'a str,
        exp: usize,
    }

    fn parts_with(header: &str, value: &str) -> Parts {
        let (parts, _) = Request::builder()
            .header(header, value)
            .body(())
            .unwrap()
            .into_parts();
        parts
    }

    #[test]
    fn api_key_must_match() {
        let config = AuthConfig::api_key("secret");

        assert!(authorize_api_key(&parts_with("x-api-key", "secret"), &config).is_ok());
        assert!(matches!(
            authorize_api_key(&parts_with("x-api-key", "nope"), &config),
            Err(ApiError::Unauthorized(_))
        ));
    }

    #[test]
    fn jwt_subject_is_extracted() {
        let config = AuthConfig {
            mode: AuthMode::Jwt,
            api_key: None,
            jwt_secret: Some("jwt-secret".into()),
            jwt_algorithm: JwtAlgorithm::Hs512,
        };
        let token = encode(
            &Header::new(Algorithm::HS512),
            &TestClaims {
                sub: "recruiter@example.com",
                exp: 4_102_444_800,
            },
            &EncodingKey::from_secret(b"jwt-secret"),
        )
        .unwrap();

        let user = authorize_jwt(&parts_with("authorization", &format!("Bearer {token}")), &config)
            .unwrap();
        assert_eq!(user.subject, "recruiter@example.com");

        let wrong_algorithm = AuthConfig {
            jwt_algorithm: JwtAlgorithm::Hs256,
            ..config
        };
        assert!(
            authorize_jwt(&parts_with("authorization", &format!("Bearer {token}")), &wrong_algorithm)
                .is_err()
        );
    }
}
