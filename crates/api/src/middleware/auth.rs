//! Bearer-token caller extractor.
//!
//! Reads never require a token, so extraction itself never fails: a missing
//! or malformed `Authorization` header yields [`Principal::Anonymous`], and
//! the write path decides through the hub's authorizer.

use std::convert::Infallible;

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use opswatch_events::{Principal, Writer};

use crate::state::AppState;

/// The principal behind an HTTP request.
///
/// ```ignore
/// async fn my_handler(caller: Caller, State(state): State<AppState>) -> AppResult<Json<()>> {
///     state.hub.publish(&channel, value, &caller.writer()).await?;
///     Ok(Json(()))
/// }
/// ```
#[derive(Debug, Clone)]
pub struct Caller(pub Principal);

impl Caller {
    pub fn writer(&self) -> Writer {
        Writer::new(self.0.clone())
    }
}

impl FromRequestParts<AppState> for Caller {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "));

        Ok(Caller(Principal::from_token(token)))
    }
}
