//! Custom Axum extractors for request authentication.
//!
//! Token verification happens in the proxy in front of this service; it
//! forwards the caller's DID in [`AUTHENTICATED_DID_HEADER`].

use axum::{
    extract::FromRequestParts,
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Response},
};

pub const AUTHENTICATED_DID_HEADER: &str = "x-authenticated-did";

/// The DID of the calling user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedDid(pub String);

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("missing X-Authenticated-Did header")]
    MissingIdentity,
    #[error("invalid X-Authenticated-Did header")]
    InvalidHeader,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let message = match self {
            AuthError::MissingIdentity => "authentication required",
            AuthError::InvalidHeader => "invalid authenticated identity",
        };
        (StatusCode::UNAUTHORIZED, message).into_response()
    }
}

impl<S: Send + Sync> FromRequestParts<S> for AuthenticatedDid {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let did = parts
            .headers
            .get(AUTHENTICATED_DID_HEADER)
            .ok_or(AuthError::MissingIdentity)?
            .to_str()
            .map_err(|_| AuthError::InvalidHeader)?
            .trim();
        if did.is_empty() {
            return Err(AuthError::MissingIdentity);
        }
        Ok(AuthenticatedDid(did.to_string()))
    }
}
