//! Contact form and the caller's profile.

use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;
use service_core::error::AppError;
use uuid::Uuid;

use crate::{
    dtos::{ContactRequest, ContactResponse, UpdateProfileRequest},
    middleware::UserContext,
    models::{Contact, Profile},
    startup::AppState,
    utils::ValidatedJson,
};

pub async fn submit_contact(
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<ContactRequest>,
) -> Result<(StatusCode, Json<ContactResponse>), AppError> {
    let contact = Contact {
        id: Uuid::new_v4(),
        name: payload.name.trim().to_string(),
        email: payload.email.trim().to_lowercase(),
        phone: payload.phone.filter(|p| !p.trim().is_empty()),
        subject: payload.subject.trim().to_string(),
        message: payload.message,
        created_at: Utc::now(),
    };
    state.store.insert_contact(&contact).await?;

    tracing::info!(contact_id = %contact.id, "Contact message received");
    Ok((StatusCode::CREATED, Json(ContactResponse { id: contact.id })))
}

pub async fn get_profile(
    State(state): State<AppState>,
    user: UserContext,
) -> Result<Json<Profile>, AppError> {
    let profile = state
        .store
        .get_profile(&user.email)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Profile not found")))?;
    Ok(Json(profile))
}

pub async fn update_profile(
    State(state): State<AppState>,
    user: UserContext,
    ValidatedJson(payload): ValidatedJson<UpdateProfileRequest>,
) -> Result<Json<Profile>, AppError> {
    let profile = Profile {
        email: user.email,
        name: payload.name.trim().to_string(),
        phone: payload.phone,
        institution: payload.institution.filter(|i| !i.trim().is_empty()),
        updated_at: Utc::now(),
    };
    let saved = state.store.upsert_profile(&profile).await?;
    Ok(Json(saved))
}
