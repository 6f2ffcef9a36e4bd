//! Payment gateway adapters.
//!
//! Reconciliation only talks to [`PaymentGateway`]; each provider's HTTP
//! protocol, auth scheme and status vocabulary stays inside its adapter.

mod phonepe;
mod razorpay;

pub use phonepe::PhonePeGateway;
pub use razorpay::RazorpayGateway;

use crate::models::PaymentGatewayKind;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use service_core::error::AppError;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("{0} is not configured")]
    NotConfigured(PaymentGatewayKind),

    #[error("{gateway} rejected the request: {message}")]
    Provider {
        gateway: PaymentGatewayKind,
        status: Option<u16>,
        message: String,
    },

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unexpected response: {0}")]
    Decode(String),

    #[error("callback rejected: {0}")]
    Unauthorized(String),

    #[error("{0} does not support this operation")]
    Unsupported(PaymentGatewayKind),
}

impl From<GatewayError> for AppError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Unauthorized(msg) => AppError::Unauthorized(anyhow::anyhow!(msg)),
            GatewayError::Unsupported(kind) => {
                AppError::BadRequest(anyhow::anyhow!("{} does not support this operation", kind))
            }
            GatewayError::NotConfigured(kind) => {
                AppError::BadGateway(format!("{} is not configured", kind))
            }
            other => AppError::BadGateway(other.to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct OrderRequest {
    /// Whole rupees; adapters convert to paise.
    pub amount: i64,
    pub currency: String,
    pub merchant_order_id: String,
    pub redirect_url: String,
    pub expiry: Duration,
}

impl OrderRequest {
    pub fn amount_minor(&self) -> i64 {
        self.amount * 100
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GatewayOrder {
    /// Key the registrations are stored under and reconciled by.
    pub order_ref: String,
    pub provider_order_id: String,
    pub checkout_token: Option<String>,
    pub expire_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderState {
    Completed,
    Failed,
    Pending,
}

#[derive(Debug, Clone)]
pub struct OrderStatus {
    pub state: OrderState,
    /// Minor units as reported by the gateway.
    pub amount: Option<i64>,
    pub transaction_id: Option<String>,
    pub error_code: Option<String>,
}

/// What a verified callback tells us. Only `order_ref` is acted on; the
/// state itself is always re-fetched.
#[derive(Debug, Clone)]
pub struct CallbackPayload {
    pub order_ref: String,
    pub event: String,
    pub state_hint: Option<String>,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    fn kind(&self) -> PaymentGatewayKind;

    fn is_configured(&self) -> bool;

    async fn create_order(&self, request: &OrderRequest) -> Result<GatewayOrder, GatewayError>;

    /// Checks a client-side checkout signature.
    fn verify_signature(
        &self,
        _order_id: &str,
        _payment_id: &str,
        _signature: &str,
    ) -> Result<bool, GatewayError> {
        Err(GatewayError::Unsupported(self.kind()))
    }

    async fn get_order_status(
        &self,
        order_ref: &str,
        detailed: bool,
    ) -> Result<OrderStatus, GatewayError>;

    fn validate_callback(
        &self,
        auth_header: Option<&str>,
        raw_body: &str,
    ) -> Result<CallbackPayload, GatewayError>;
}

/// Configured gateways keyed by kind.
#[derive(Clone, Default)]
pub struct GatewayRegistry {
    gateways: HashMap<PaymentGatewayKind, Arc<dyn PaymentGateway>>,
}

impl GatewayRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, gateway: Arc<dyn PaymentGateway>) -> Self {
        self.gateways.insert(gateway.kind(), gateway);
        self
    }

    pub fn get(&self, kind: PaymentGatewayKind) -> Result<Arc<dyn PaymentGateway>, AppError> {
        self.gateways
            .get(&kind)
            .cloned()
            .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("{} is not available", kind)))
    }
}
