use axum::http::StatusCode;
use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use crate::error::{ErrorMessage, HttpError};

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

/// sub: user id, iat/exp: unix seconds, jti: refresh token row id
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TokenClaims {
    pub sub: String,
    pub iat: usize,
    pub exp: usize,
    pub typ: TokenKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,
}

fn sign(claims: &TokenClaims, secret: &[u8]) -> Result<String, jsonwebtoken::errors::Error> {
    encode(&Header::default(), claims, &EncodingKey::from_secret(secret))
}

fn claims(
    user_id: &str,
    kind: TokenKind,
    jti: Option<String>,
    expires_in_seconds: i64,
) -> Result<TokenClaims, jsonwebtoken::errors::Error> {
    if user_id.is_empty() {
        return Err(jsonwebtoken::errors::ErrorKind::InvalidSubject.into());
    }

    let now = Utc::now();
    Ok(TokenClaims {
        sub: user_id.to_string(),
        iat: now.timestamp() as usize,
        exp: (now + Duration::seconds(expires_in_seconds)).timestamp() as usize,
        typ: kind,
        jti,
    })
}

pub fn create_access_token(
    user_id: &str,
    secret: &[u8],
    expires_in_seconds: i64,
) -> Result<String, jsonwebtoken::errors::Error> {
    sign(
        &claims(user_id, TokenKind::Access, None, expires_in_seconds)?,
        secret,
    )
}

/// Refresh tokens carry the id of their `refresh_tokens` row so they can be
/// revoked server side.
pub fn create_refresh_token(
    user_id: &str,
    token_id: &str,
    secret: &[u8],
    expires_in_seconds: i64,
) -> Result<String, jsonwebtoken::errors::Error> {
    sign(
        &claims(
            user_id,
            TokenKind::Refresh,
            Some(token_id.to_string()),
            expires_in_seconds,
        )?,
        secret,
    )
}

/// Decode and verify signature, expiry and token kind.
pub fn decode_token<T: Into<String>>(
    token: T,
    secret: &[u8],
    expected: TokenKind,
) -> Result<TokenClaims, HttpError> {
    let decoded = decode::<TokenClaims>(
        &token.into(),
        &DecodingKey::from_secret(secret),
        &Validation::new(Algorithm::HS256),
    );

    match decoded {
        Ok(token) if token.claims.typ == expected => Ok(token.claims),
        _ => Err(HttpError::new(
            ErrorMessage::InvalidToken.to_string(),
            StatusCode::UNAUTHORIZED,
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"test-secret";

    #[test]
    fn access_token_roundtrip() {
        let token = create_access_token("user-1", SECRET, 60).unwrap();
        let claims = decode_token(token, SECRET, TokenKind::Access).unwrap();
        assert_eq!(claims.sub, "user-1");
        assert!(claims.jti.is_none());
    }

    #[test]
    fn refresh_token_is_not_an_access_token() {
        let token = create_refresh_token("user-1", "row-9", SECRET, 60).unwrap();
        assert!(decode_token(token.clone(), SECRET, TokenKind::Access).is_err());

        let claims = decode_token(token, SECRET, TokenKind::Refresh).unwrap();
        assert_eq!(claims.jti.as_deref(), Some("row-9"));
    }

    #[test]
    fn wrong_secret_and_expired_tokens_fail() {
        let token = create_access_token("user-1", SECRET, 60).unwrap();
        let err = decode_token(token, b"other", TokenKind::Access).unwrap_err();
        assert_eq!(err.status, StatusCode::UNAUTHORIZED);

        // jsonwebtoken allows 60s of leeway by default
        let expired = create_access_token("user-1", SECRET, -120).unwrap();
        assert!(decode_token(expired, SECRET, TokenKind::Access).is_err());
    }

    #[test]
    fn empty_subject_is_rejected() {
        assert!(create_access_token("", SECRET, 60).is_err());
    }
}
