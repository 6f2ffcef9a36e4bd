//! PhonePe Standard Checkout (v2) adapter.
//!
//! Every API call carries an OAuth client-credentials token, cached until
//! shortly before it expires. Callbacks are authenticated with
//! `SHA256(username:password)` in the `Authorization` header.

use super::{
    CallbackPayload, GatewayError, GatewayOrder, OrderRequest, OrderState, OrderStatus,
    PaymentGateway,
};
use crate::config::PhonePeConfig;
use crate::models::PaymentGatewayKind;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::Client;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use service_core::utils::signature::{constant_time_eq, sha256_hex};
use std::sync::Arc;
use tokio::sync::RwLock;

const MIN_EXPIRY_SECS: u64 = 300;
const MAX_EXPIRY_SECS: u64 = 3600;
/// Refresh this many seconds before the token's own expiry.
const TOKEN_REFRESH_MARGIN_SECS: i64 = 60;

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: i64,
}

#[derive(Clone)]
pub struct PhonePeGateway {
    client: Client,
    config: PhonePeConfig,
    require_callback_auth: bool,
    token: Arc<RwLock<Option<CachedToken>>>,
}

#[derive(Debug, Serialize)]
struct TokenRequest<'a> {
    client_id: &'a str,
    client_version: u32,
    client_secret: &'a str,
    grant_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    /// Epoch seconds.
    expires_at: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateOrderRequest<'a> {
    merchant_order_id: &'a str,
    /// Paise.
    amount: i64,
    /// Seconds.
    expire_after: u64,
    payment_flow: PaymentFlow<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PaymentFlow<'a> {
    #[serde(rename = "type")]
    flow_type: &'static str,
    merchant_urls: MerchantUrls<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MerchantUrls<'a> {
    redirect_url: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateOrderResponse {
    order_id: String,
    token: Option<String>,
    /// Epoch milliseconds.
    expire_at: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderStatusResponse {
    state: String,
    amount: Option<i64>,
    error_code: Option<String>,
    #[serde(default)]
    payment_details: Vec<PaymentDetail>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PaymentDetail {
    transaction_id: Option<String>,
    state: Option<String>,
    error_code: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PhonePeError {
    code: Option<String>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CallbackBody {
    #[serde(default)]
    event: String,
    payload: CallbackOrder,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CallbackOrder {
    merchant_order_id: String,
    state: Option<String>,
}

impl PhonePeGateway {
    pub fn new(config: PhonePeConfig, require_callback_auth: bool) -> Self {
        Self {
            client: Client::new(),
            config,
            require_callback_auth,
            token: Arc::new(RwLock::new(None)),
        }
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}{}", self.config.api_base_url.trim_end_matches('/'), path)
    }

    fn ensure_configured(&self) -> Result<(), GatewayError> {
        if self.config.is_configured() {
            Ok(())
        } else {
            Err(GatewayError::NotConfigured(PaymentGatewayKind::Phonepe))
        }
    }

    async fn access_token(&self) -> Result<String, GatewayError> {
        let now = Utc::now().timestamp();

        if let Some(cached) = self.token.read().await.as_ref() {
            if now < cached.expires_at - TOKEN_REFRESH_MARGIN_SECS {
                return Ok(cached.access_token.clone());
            }
        }

        let mut slot = self.token.write().await;
        // Another task may have refreshed while we waited for the lock.
        if let Some(cached) = slot.as_ref() {
            if now < cached.expires_at - TOKEN_REFRESH_MARGIN_SECS {
                return Ok(cached.access_token.clone());
            }
        }

        let url = format!(
            "{}/v1/oauth/token",
            self.config.auth_base_url.trim_end_matches('/')
        );
        let request = TokenRequest {
            client_id: &self.config.client_id,
            client_version: self.config.client_version,
            client_secret: self.config.client_secret.expose_secret(),
            grant_type: "client_credentials",
        };

        let response = self.client.post(&url).form(&request).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            tracing::error!(status = %status, "PhonePe token request failed");
            return Err(provider_error(status.as_u16(), &body));
        }

        let token: TokenResponse =
            serde_json::from_str(&body).map_err(|e| GatewayError::Decode(e.to_string()))?;

        tracing::debug!(expires_at = token.expires_at, "PhonePe access token refreshed");

        *slot = Some(CachedToken {
            access_token: token.access_token.clone(),
            expires_at: token.expires_at,
        });

        Ok(token.access_token)
    }

    fn callback_auth_matches(&self, header: &str) -> bool {
        let expected = sha256_hex(&format!(
            "{}:{}",
            self.config.callback_username,
            self.config.callback_password.expose_secret()
        ));
        let received = header
            .trim()
            .strip_prefix("SHA256 ")
            .unwrap_or(header.trim())
            .to_ascii_lowercase();
        constant_time_eq(&expected, &received)
    }
}

fn provider_error(status: u16, body: &str) -> GatewayError {
    let message = serde_json::from_str::<PhonePeError>(body)
        .ok()
        .and_then(|e| match (e.code, e.message) {
            (Some(code), Some(message)) => Some(format!("{} - {}", code, message)),
            (Some(code), None) => Some(code),
            (None, Some(message)) => Some(message),
            (None, None) => None,
        })
        .unwrap_or_else(|| body.to_string());

    GatewayError::Provider {
        gateway: PaymentGatewayKind::Phonepe,
        status: Some(status),
        message,
    }
}

fn clamp_expiry(secs: u64) -> u64 {
    secs.clamp(MIN_EXPIRY_SECS, MAX_EXPIRY_SECS)
}

fn map_state(state: &str) -> OrderState {
    match state {
        "COMPLETED" => OrderState::Completed,
        "FAILED" => OrderState::Failed,
        _ => OrderState::Pending,
    }
}

#[async_trait]
impl PaymentGateway for PhonePeGateway {
    fn kind(&self) -> PaymentGatewayKind {
        PaymentGatewayKind::Phonepe
    }

    fn is_configured(&self) -> bool {
        self.config.is_configured()
    }

    async fn create_order(&self, request: &OrderRequest) -> Result<GatewayOrder, GatewayError> {
        self.ensure_configured()?;
        let token = self.access_token().await?;

        let body = CreateOrderRequest {
            merchant_order_id: &request.merchant_order_id,
            amount: request.amount_minor(),
            expire_after: clamp_expiry(request.expiry.as_secs()),
            payment_flow: PaymentFlow {
                flow_type: "PG_CHECKOUT",
                merchant_urls: MerchantUrls {
                    redirect_url: &request.redirect_url,
                },
            },
        };

        let response = self
            .client
            .post(self.api_url("/checkout/v2/sdk/order"))
            .header("Authorization", format!("O-Bearer {}", token))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            let err = provider_error(status.as_u16(), &text);
            tracing::error!(
                error = %err,
                merchant_order_id = %request.merchant_order_id,
                "PhonePe order creation failed"
            );
            return Err(err);
        }

        let order: CreateOrderResponse =
            serde_json::from_str(&text).map_err(|e| GatewayError::Decode(e.to_string()))?;

        tracing::info!(
            order_id = %order.order_id,
            merchant_order_id = %request.merchant_order_id,
            amount = body.amount,
            "PhonePe order created"
        );

        Ok(GatewayOrder {
            order_ref: request.merchant_order_id.clone(),
            provider_order_id: order.order_id,
            checkout_token: order.token,
            expire_at: order.expire_at.and_then(from_epoch_millis),
        })
    }

    async fn get_order_status(
        &self,
        order_ref: &str,
        detailed: bool,
    ) -> Result<OrderStatus, GatewayError> {
        self.ensure_configured()?;
        let token = self.access_token().await?;

        let response = self
            .client
            .get(self.api_url(&format!("/checkout/v2/order/{}/status", order_ref)))
            .query(&[("details", detailed)])
            .header("Authorization", format!("O-Bearer {}", token))
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(provider_error(status.as_u16(), &text));
        }

        let order: OrderStatusResponse =
            serde_json::from_str(&text).map_err(|e| GatewayError::Decode(e.to_string()))?;

        let state = map_state(&order.state);
        let settled = order
            .payment_details
            .iter()
            .rev()
            .find(|p| p.state.as_deref() == Some("COMPLETED"))
            .or_else(|| order.payment_details.last());

        tracing::debug!(merchant_order_id = %order_ref, state = %order.state, "PhonePe order status");

        Ok(OrderStatus {
            state,
            amount: order.amount,
            transaction_id: settled.and_then(|p| p.transaction_id.clone()),
            error_code: order
                .error_code
                .or_else(|| settled.and_then(|p| p.error_code.clone())),
        })
    }

    fn validate_callback(
        &self,
        auth_header: Option<&str>,
        raw_body: &str,
    ) -> Result<CallbackPayload, GatewayError> {
        if self.config.has_callback_credentials() {
            let header = auth_header
                .ok_or_else(|| GatewayError::Unauthorized("missing authorization".to_string()))?;
            if !self.callback_auth_matches(header) {
                tracing::warn!("PhonePe callback authorization mismatch");
                return Err(GatewayError::Unauthorized(
                    "invalid authorization".to_string(),
                ));
            }
        } else if self.require_callback_auth {
            return Err(GatewayError::Unauthorized(
                "callback credentials are not configured".to_string(),
            ));
        } else {
            tracing::warn!("PhonePe callback credentials not configured; accepting unverified callback");
        }

        let body: CallbackBody =
            serde_json::from_str(raw_body).map_err(|e| GatewayError::Decode(e.to_string()))?;

        Ok(CallbackPayload {
            order_ref: body.payload.merchant_order_id,
            event: body.event,
            state_hint: body.payload.state,
        })
    }
}

fn from_epoch_millis(ms: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms).single()
}
