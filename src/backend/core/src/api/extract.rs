//! Handler extractors for what the pipeline attached to the request.

use std::convert::Infallible;

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};

use crate::error::GateError;
use crate::rbac::{AuthUser, ResolvedContext};

/// The authenticated user; rejects with 401 when the request has none.
#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = GateError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthUser>()
            .cloned()
            .ok_or_else(GateError::unauthenticated)
    }
}

/// Department and resource resolved by the enforcement layer. Empty for
/// routes that declare no requirement or for owners, who skip resolution.
#[async_trait]
impl<S> FromRequestParts<S> for ResolvedContext
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<ResolvedContext>()
            .cloned()
            .unwrap_or_default())
    }
}
