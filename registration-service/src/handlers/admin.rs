//! Organiser views. Every handler requires [`AdminContext`].

use axum::{
    extract::{Path, Query, State},
    Json,
};
use service_core::error::AppError;
use uuid::Uuid;

use crate::{
    dtos::{
        DashboardStats, RegistrationListQuery, ReminderResponse, TeamDetail, TeamListQuery,
        UpdateTeamStatusRequest,
    },
    middleware::AdminContext,
    models::{CompetitionRegistration, Contact, Team},
    startup::AppState,
};

pub async fn list_teams(
    State(state): State<AppState>,
    _admin: AdminContext,
    Query(query): Query<TeamListQuery>,
) -> Result<Json<Vec<Team>>, AppError> {
    Ok(Json(state.admin.list_teams(&query).await?))
}

pub async fn get_team(
    State(state): State<AppState>,
    _admin: AdminContext,
    Path(id): Path<Uuid>,
) -> Result<Json<TeamDetail>, AppError> {
    Ok(Json(state.admin.team(id).await?))
}

pub async fn update_team_status(
    State(state): State<AppState>,
    admin: AdminContext,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateTeamStatusRequest>,
) -> Result<Json<Team>, AppError> {
    tracing::info!(
        admin = %admin.email,
        team_id = %id,
        status = %payload.status,
        "Updating team status"
    );
    Ok(Json(state.admin.update_team_status(id, payload.status).await?))
}

pub async fn list_registrations(
    State(state): State<AppState>,
    _admin: AdminContext,
    Query(query): Query<RegistrationListQuery>,
) -> Result<Json<Vec<CompetitionRegistration>>, AppError> {
    Ok(Json(state.admin.list_registrations(&query).await?))
}

pub async fn dashboard(
    State(state): State<AppState>,
    _admin: AdminContext,
) -> Result<Json<DashboardStats>, AppError> {
    Ok(Json(state.admin.dashboard().await?))
}

pub async fn list_contacts(
    State(state): State<AppState>,
    _admin: AdminContext,
) -> Result<Json<Vec<Contact>>, AppError> {
    Ok(Json(state.admin.list_contacts().await?))
}

pub async fn send_reminders(
    State(state): State<AppState>,
    admin: AdminContext,
) -> Result<Json<ReminderResponse>, AppError> {
    tracing::info!(admin = %admin.email, "Sending payment reminders");
    Ok(Json(state.admin.send_payment_reminders().await?))
}
