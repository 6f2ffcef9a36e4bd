//! Razorpay adapter.
//!
//! Orders API for payment initiation, checkout and webhook signature
//! verification, and order/payment lookups for reconciliation.

use super::{
    CallbackPayload, GatewayError, GatewayOrder, OrderRequest, OrderState, OrderStatus,
    PaymentGateway,
};
use crate::config::RazorpayConfig;
use crate::models::PaymentGatewayKind;
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use service_core::utils::signature::verify_hmac_sha256;

#[derive(Clone)]
pub struct RazorpayGateway {
    client: Client,
    config: RazorpayConfig,
    require_callback_auth: bool,
}

/// Request to create a Razorpay order.
#[derive(Debug, Serialize)]
struct CreateOrderRequest<'a> {
    /// Amount in paise.
    amount: i64,
    currency: &'a str,
    receipt: &'a str,
    notes: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct RazorpayOrder {
    id: String,
    amount: i64,
    #[serde(default)]
    amount_paid: i64,
    /// `created`, `attempted` or `paid`.
    status: String,
}

#[derive(Debug, Deserialize)]
struct PaymentList {
    #[serde(default)]
    items: Vec<PaymentEntity>,
}

#[derive(Debug, Deserialize)]
struct PaymentEntity {
    id: String,
    /// `created`, `authorized`, `captured`, `refunded` or `failed`.
    status: String,
    order_id: Option<String>,
    error_code: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RazorpayError {
    error: RazorpayErrorDetail,
}

#[derive(Debug, Deserialize)]
struct RazorpayErrorDetail {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct WebhookEvent {
    event: String,
    payload: WebhookPayload,
}

#[derive(Debug, Deserialize)]
struct WebhookPayload {
    payment: Option<WebhookEntity<PaymentEntity>>,
    order: Option<WebhookEntity<WebhookOrder>>,
}

#[derive(Debug, Deserialize)]
struct WebhookEntity<T> {
    entity: T,
}

#[derive(Debug, Deserialize)]
struct WebhookOrder {
    id: String,
    status: Option<String>,
}

impl RazorpayGateway {
    pub fn new(config: RazorpayConfig, require_callback_auth: bool) -> Self {
        Self {
            client: Client::new(),
            config,
            require_callback_auth,
        }
    }

    pub fn key_id(&self) -> &str {
        &self.config.key_id
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.api_base_url.trim_end_matches('/'), path)
    }

    fn ensure_configured(&self) -> Result<(), GatewayError> {
        if self.config.is_configured() {
            Ok(())
        } else {
            Err(GatewayError::NotConfigured(PaymentGatewayKind::Razorpay))
        }
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, path: &str) -> Result<T, GatewayError> {
        let response = self
            .client
            .get(self.url(path))
            .basic_auth(
                &self.config.key_id,
                Some(self.config.key_secret.expose_secret()),
            )
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if status.is_success() {
            serde_json::from_str(&body).map_err(|e| GatewayError::Decode(e.to_string()))
        } else {
            Err(provider_error(status.as_u16(), &body))
        }
    }
}

fn provider_error(status: u16, body: &str) -> GatewayError {
    let message = serde_json::from_str::<RazorpayError>(body)
        .map(|e| format!("{} - {}", e.error.code, e.error.description))
        .unwrap_or_else(|_| body.to_string());

    GatewayError::Provider {
        gateway: PaymentGatewayKind::Razorpay,
        status: Some(status),
        message,
    }
}

/// Maps an order and its payment attempts onto our three-state view.
fn resolve_state(order: &RazorpayOrder, payments: &[PaymentEntity]) -> OrderState {
    let captured = payments.iter().any(|p| p.status == "captured");
    if order.status == "paid" || captured {
        return OrderState::Completed;
    }

    let all_failed = !payments.is_empty() && payments.iter().all(|p| p.status == "failed");
    if order.status == "attempted" && all_failed {
        OrderState::Failed
    } else {
        OrderState::Pending
    }
}

#[async_trait]
impl PaymentGateway for RazorpayGateway {
    fn kind(&self) -> PaymentGatewayKind {
        PaymentGatewayKind::Razorpay
    }

    fn is_configured(&self) -> bool {
        self.config.is_configured()
    }

    async fn create_order(&self, request: &OrderRequest) -> Result<GatewayOrder, GatewayError> {
        self.ensure_configured()?;

        let body = CreateOrderRequest {
            amount: request.amount_minor(),
            currency: &request.currency,
            receipt: &request.merchant_order_id,
            notes: serde_json::json!({ "merchant_order_id": request.merchant_order_id }),
        };

        let response = self
            .client
            .post(self.url("/orders"))
            .basic_auth(
                &self.config.key_id,
                Some(self.config.key_secret.expose_secret()),
            )
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        tracing::debug!(status = %status, "Razorpay create_order response");

        if !status.is_success() {
            let err = provider_error(status.as_u16(), &text);
            tracing::error!(error = %err, "Razorpay order creation failed");
            return Err(err);
        }

        let order: RazorpayOrder =
            serde_json::from_str(&text).map_err(|e| GatewayError::Decode(e.to_string()))?;

        tracing::info!(
            order_id = %order.id,
            amount = order.amount,
            merchant_order_id = %request.merchant_order_id,
            "Razorpay order created"
        );

        let expiry = chrono::Duration::from_std(request.expiry)
            .unwrap_or_else(|_| chrono::Duration::minutes(30));

        Ok(GatewayOrder {
            order_ref: order.id.clone(),
            provider_order_id: order.id,
            checkout_token: None,
            expire_at: Some(Utc::now() + expiry),
        })
    }

    /// `HMAC-SHA256(order_id + "|" + payment_id, key_secret)`
    fn verify_signature(
        &self,
        order_id: &str,
        payment_id: &str,
        signature: &str,
    ) -> Result<bool, GatewayError> {
        self.ensure_configured()?;

        let payload = format!("{}|{}", order_id, payment_id);
        let is_valid = verify_hmac_sha256(self.config.key_secret.expose_secret(), &payload, signature)
            .map_err(|e| GatewayError::Decode(e.to_string()))?;

        if is_valid {
            tracing::info!(order_id, payment_id, "Payment signature verified");
        } else {
            tracing::warn!(order_id, payment_id, "Payment signature verification failed");
        }

        Ok(is_valid)
    }

    async fn get_order_status(
        &self,
        order_ref: &str,
        detailed: bool,
    ) -> Result<OrderStatus, GatewayError> {
        self.ensure_configured()?;

        let order: RazorpayOrder = self.get_json(&format!("/orders/{}", order_ref)).await?;

        let payments = if detailed || order.status != "created" {
            self.get_json::<PaymentList>(&format!("/orders/{}/payments", order_ref))
                .await?
                .items
        } else {
            Vec::new()
        };

        let state = resolve_state(&order, &payments);
        let transaction_id = payments
            .iter()
            .find(|p| p.status == "captured")
            .or_else(|| payments.iter().find(|p| p.status == "authorized"))
            .map(|p| p.id.clone());
        let error_code = match state {
            OrderState::Failed => payments.iter().rev().find_map(|p| p.error_code.clone()),
            _ => None,
        };

        tracing::debug!(
            order_id = %order_ref,
            order_status = %order.status,
            amount_paid = order.amount_paid,
            state = ?state,
            "Razorpay order status"
        );

        Ok(OrderStatus {
            state,
            amount: Some(order.amount),
            transaction_id,
            error_code,
        })
    }

    /// Verifies `X-Razorpay-Signature`: `HMAC-SHA256(body, webhook_secret)`.
    fn validate_callback(
        &self,
        signature: Option<&str>,
        raw_body: &str,
    ) -> Result<CallbackPayload, GatewayError> {
        let secret = self.config.webhook_secret.expose_secret();

        if secret.is_empty() {
            if self.require_callback_auth {
                return Err(GatewayError::Unauthorized(
                    "webhook secret is not configured".to_string(),
                ));
            }
            tracing::warn!("Razorpay webhook secret not configured; accepting unverified webhook");
        } else {
            let signature = signature
                .ok_or_else(|| GatewayError::Unauthorized("missing signature".to_string()))?;
            let valid = verify_hmac_sha256(secret, raw_body, signature)
                .map_err(|e| GatewayError::Decode(e.to_string()))?;
            if !valid {
                tracing::warn!("Razorpay webhook signature verification failed");
                return Err(GatewayError::Unauthorized("invalid signature".to_string()));
            }
        }

        let event: WebhookEvent =
            serde_json::from_str(raw_body).map_err(|e| GatewayError::Decode(e.to_string()))?;

        let payment = event.payload.payment.map(|p| p.entity);
        let order = event.payload.order.map(|o| o.entity);

        let order_ref = order
            .as_ref()
            .map(|o| o.id.clone())
            .or_else(|| payment.as_ref().and_then(|p| p.order_id.clone()))
            .ok_or_else(|| GatewayError::Decode("webhook carries no order id".to_string()))?;

        let state_hint = payment
            .map(|p| p.status)
            .or_else(|| order.and_then(|o| o.status));

        Ok(CallbackPayload {
            order_ref,
            event: event.event,
            state_hint,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::Secret;
    use service_core::utils::signature::hmac_sha256_hex;

    fn test_config() -> RazorpayConfig {
        RazorpayConfig {
            key_id: "rzp_test_123".to_string(),
            key_secret: Secret::new("my_secret_key".to_string()),
            webhook_secret: Secret::new("webhook_secret".to_string()),
            api_base_url: "https://api.razorpay.com/v1".to_string(),
        }
    }

    fn payment(id: &str, status: &str) -> PaymentEntity {
        PaymentEntity {
            id: id.to_string(),
            status: status.to_string(),
            order_id: Some("order_1".to_string()),
            error_code: None,
        }
    }

    fn order(status: &str) -> RazorpayOrder {
        RazorpayOrder {
            id: "order_1".to_string(),
            amount: 50_000,
            amount_paid: 0,
            status: status.to_string(),
        }
    }

    #[test]
    fn test_is_configured() {
        let gateway = RazorpayGateway::new(test_config(), true);
        assert!(gateway.is_configured());

        let empty = RazorpayConfig {
            key_id: "".to_string(),
            key_secret: Secret::new("".to_string()),
            webhook_secret: Secret::new("".to_string()),
            api_base_url: "".to_string(),
        };
        assert!(!RazorpayGateway::new(empty, true).is_configured());
    }

    #[test]
    fn test_payment_signature_verification() {
        let gateway = RazorpayGateway::new(test_config(), true);
        let signature = hmac_sha256_hex("my_secret_key", "order_123|pay_456").unwrap();

        assert!(gateway
            .verify_signature("order_123", "pay_456", &signature)
            .unwrap());
        assert!(!gateway
            .verify_signature("order_123", "pay_456", "invalid_signature")
            .unwrap());
    }

    #[test]
    fn test_state_mapping() {
        assert_eq!(resolve_state(&order("paid"), &[]), OrderState::Completed);
        assert_eq!(resolve_state(&order("created"), &[]), OrderState::Pending);
        assert_eq!(
            resolve_state(&order("attempted"), &[payment("pay_1", "failed")]),
            OrderState::Failed
        );
        assert_eq!(
            resolve_state(
                &order("attempted"),
                &[payment("pay_1", "failed"), payment("pay_2", "authorized")]
            ),
            OrderState::Pending
        );
        assert_eq!(
            resolve_state(&order("attempted"), &[payment("pay_1", "captured")]),
            OrderState::Completed
        );
    }

    #[test]
    fn test_webhook_signature() {
        let gateway = RazorpayGateway::new(test_config(), true);
        let body = r#"{"event":"payment.captured","payload":{"payment":{"entity":{"id":"pay_1","status":"captured","order_id":"order_1"}}}}"#;
        let signature = hmac_sha256_hex("webhook_secret", body).unwrap();

        let payload = gateway.validate_callback(Some(&signature), body).unwrap();
        assert_eq!(payload.order_ref, "order_1");
        assert_eq!(payload.event, "payment.captured");
        assert_eq!(payload.state_hint.as_deref(), Some("captured"));

        assert!(matches!(
            gateway.validate_callback(Some("bad"), body),
            Err(GatewayError::Unauthorized(_))
        ));
        assert!(matches!(
            gateway.validate_callback(None, body),
            Err(GatewayError::Unauthorized(_))
        ));
    }

    #[test]
    fn test_missing_webhook_secret_fails_closed() {
        let mut config = test_config();
        config.webhook_secret = Secret::new(String::new());
        let body = r#"{"event":"order.paid","payload":{"order":{"entity":{"id":"order_9","status":"paid"}}}}"#;

        let strict = RazorpayGateway::new(config.clone(), true);
        assert!(matches!(
            strict.validate_callback(None, body),
            Err(GatewayError::Unauthorized(_))
        ));

        let lenient = RazorpayGateway::new(config, false);
        assert_eq!(lenient.validate_callback(None, body).unwrap().order_ref, "order_9");
    }
}
