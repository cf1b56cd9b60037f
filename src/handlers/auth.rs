//! Extracts the authenticated actor from a request.
//!
//! Sessions and API keys are verified by the authentication layer in front
//! of the store, which forwards the resulting identity as headers. Requests
//! arriving without a well-formed identity are rejected with 401.

use crate::{
    errors::AppError,
    models::actor::{Actor, Role},
};
use axum::{extract::FromRequestParts, http::request::Parts};

pub const ACTOR_ID_HEADER: &str = "x-actor-id";
pub const ACTOR_ROLE_HEADER: &str = "x-actor-role";

impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let id = parts
            .headers
            .get(ACTOR_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<i64>().ok())
            .ok_or_else(|| AppError::unauthorized("Unauthorized"))?;

        let role = match parts.headers.get(ACTOR_ROLE_HEADER) {
            None => Role::User,
            Some(value) => value
                .to_str()
                .ok()
                .and_then(|v| v.parse::<Role>().ok())
                .ok_or_else(|| AppError::unauthorized("Unauthorized"))?,
        };

        Ok(Actor::new(id, role))
    }
}
