//! Team registration and the caller's own team view.

use axum::{extract::State, http::StatusCode, Json};
use service_core::error::AppError;

use crate::{
    dtos::{CreateRegistrationRequest, CreateRegistrationResponse, TeamDetail},
    middleware::UserContext,
    services::admin::team_detail,
    startup::AppState,
};

/// Creates the caller's team, or returns the existing one unchanged.
pub async fn create_registration(
    State(state): State<AppState>,
    user: UserContext,
    Json(payload): Json<CreateRegistrationRequest>,
) -> Result<(StatusCode, Json<CreateRegistrationResponse>), AppError> {
    tracing::info!(email = %user.email, "Registration submitted");

    let resolved = state
        .resolver
        .resolve_team(
            Some(&user.email),
            None,
            Some((&payload.team, payload.members.as_slice())),
        )
        .await?;

    let status = if resolved.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };

    Ok((
        status,
        Json(CreateRegistrationResponse {
            team_id: resolved.team.id,
            created: resolved.created,
        }),
    ))
}

pub async fn get_my_team(
    State(state): State<AppState>,
    user: UserContext,
) -> Result<Json<TeamDetail>, AppError> {
    let team = state
        .store
        .find_team_by_email(&user.email)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("No team registered for this user")))?;

    Ok(Json(team_detail(state.store.as_ref(), team).await?))
}
