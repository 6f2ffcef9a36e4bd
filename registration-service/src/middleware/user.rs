//! Caller identity extracted from request headers.
//!
//! The upstream auth proxy authenticates the user and forwards their email
//! in `X-User-Email`. The header is trusted as-is, so this service must only
//! be reachable through that proxy.

use crate::startup::AppState;
use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use service_core::error::AppError;

pub const USER_EMAIL_HEADER: &str = "X-User-Email";

/// Authenticated caller.
#[derive(Debug, Clone)]
pub struct UserContext {
    /// Lowercased.
    pub email: String,
}

fn email_from_headers(parts: &Parts) -> Option<String> {
    parts
        .headers
        .get(USER_EMAIL_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_lowercase())
        .filter(|v| !v.is_empty())
}

#[async_trait]
impl<S> FromRequestParts<S> for UserContext
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let email = email_from_headers(parts).ok_or_else(|| {
            AppError::Unauthorized(anyhow::anyhow!(
                "Missing X-User-Email header (required from auth proxy)"
            ))
        })?;

        tracing::Span::current().record("user_email", email.as_str());

        Ok(UserContext { email })
    }
}

/// Caller listed in `ADMIN_EMAILS`.
#[derive(Debug, Clone)]
pub struct AdminContext {
    pub email: String,
}

#[async_trait]
impl FromRequestParts<AppState> for AdminContext {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let user = UserContext::from_request_parts(parts, state).await?;

        if !state.config.admin.is_admin(&user.email) {
            tracing::warn!(email = %user.email, "Admin route refused");
            return Err(AppError::Forbidden(anyhow::anyhow!("Admin access required")));
        }

        Ok(AdminContext { email: user.email })
    }
}
