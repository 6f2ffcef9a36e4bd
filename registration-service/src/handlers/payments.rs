//! Payment completion entry points.
//!
//! All of them end in the same reconciliation: the gateway's own status API
//! decides the outcome, never the caller.

use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    response::Redirect,
    Json,
};
use service_core::error::AppError;

use crate::{
    dtos::{PaymentStatusQuery, PhonePeRedirectQuery, VerifyPaymentRequest},
    middleware::UserContext,
    models::PaymentGatewayKind,
    services::ReconcileOutcome,
    startup::AppState,
    utils::ValidatedJson,
};

pub const RAZORPAY_SIGNATURE_HEADER: &str = "X-Razorpay-Signature";

/// Razorpay checkout success handler. A signature mismatch is reported as a
/// FAILED outcome, not an error.
pub async fn verify_payment(
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<VerifyPaymentRequest>,
) -> Result<Json<ReconcileOutcome>, AppError> {
    tracing::info!(
        razorpay_order_id = %payload.razorpay_order_id,
        razorpay_payment_id = %payload.razorpay_payment_id,
        "Verifying Razorpay payment"
    );

    let outcome = state.reconciler.verify_payment(&payload).await?;
    Ok(Json(outcome))
}

/// Razorpay webhook. Answers 200 once the signature checks out.
pub async fn razorpay_callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Result<(StatusCode, Json<ReconcileOutcome>), AppError> {
    let signature = headers
        .get(RAZORPAY_SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());

    let outcome = state
        .reconciler
        .handle_callback(PaymentGatewayKind::Razorpay, signature, &body)
        .await?;
    Ok((StatusCode::OK, Json(outcome)))
}

/// PhonePe webhook, authenticated by the `Authorization` header.
pub async fn phonepe_callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Result<(StatusCode, Json<ReconcileOutcome>), AppError> {
    let authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    let outcome = state
        .reconciler
        .handle_callback(PaymentGatewayKind::Phonepe, authorization, &body)
        .await?;
    Ok((StatusCode::OK, Json(outcome)))
}

/// Where PhonePe sends the browser after checkout.
pub async fn phonepe_redirect(
    State(state): State<AppState>,
    Query(query): Query<PhonePeRedirectQuery>,
) -> Redirect {
    tracing::info!(merchant_order_id = %query.merchant_order_id, "PhonePe redirect");
    let target = state
        .reconciler
        .redirect_target(&query.merchant_order_id)
        .await;
    Redirect::to(&target)
}

pub async fn payment_status(
    State(state): State<AppState>,
    user: UserContext,
    Query(query): Query<PaymentStatusQuery>,
) -> Result<Json<ReconcileOutcome>, AppError> {
    tracing::info!(email = %user.email, order_ref = %query.order_ref, "Payment status poll");

    let caller = (!state.config.admin.is_admin(&user.email)).then_some(user.email.as_str());
    let outcome = state
        .reconciler
        .poll(&query.order_ref, query.gateway, caller)
        .await?;
    Ok(Json(outcome))
}
