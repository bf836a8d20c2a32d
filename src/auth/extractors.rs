use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use axum_extra::extract::CookieJar;
use tracing::warn;

use crate::auth::jwt::{SessionKeys, SESSION_COOKIE};
use crate::error::ApiError;
use crate::state::AppState;
use crate::users::User;

/// Guard for protected routes. Resolves the session token (cookie first,
/// then bearer header) to the current user. Side-effect-free: never
/// refreshes or extends the token.
pub struct CurrentUser(pub User);

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);
        let cookie_token = jar.get(SESSION_COOKIE).map(|c| c.value().to_string());

        let bearer_token = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::to_string);

        let token = cookie_token
            .filter(|t| !t.is_empty())
            .or(bearer_token)
            .ok_or_else(|| ApiError::Unauthorized("User not authenticated".into()))?;

        let keys = SessionKeys::from_ref(state);
        let claims = keys.verify(&token).map_err(|e| {
            warn!(error = %e, "session token rejected");
            ApiError::Forbidden(e.to_string())
        })?;

        let user = User::find_by_id(&state.db, claims.sub)
            .await
            .map_err(|e| ApiError::Internal(e.into()))?
            .ok_or_else(|| ApiError::NotFound("User no longer exists".into()))?;

        Ok(CurrentUser(user))
    }
}
