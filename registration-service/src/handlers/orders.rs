use axum::{extract::State, http::StatusCode, Json};
use service_core::error::AppError;

use crate::{
    dtos::{CreateOrderRequest, CreateOrderResponse},
    middleware::UserContext,
    startup::AppState,
};

/// Writes the requested registrations and opens a gateway order for them.
pub async fn create_order(
    State(state): State<AppState>,
    user: UserContext,
    Json(payload): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<CreateOrderResponse>), AppError> {
    tracing::info!(
        email = %user.email,
        gateway = ?payload.gateway,
        competitions = payload.competitions.len(),
        "Creating order"
    );

    let response = state
        .checkout
        .create_order(Some(&user.email), &payload)
        .await?;

    Ok((StatusCode::CREATED, Json(response)))
}
