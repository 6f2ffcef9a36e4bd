#![allow(dead_code)]

use registration_service::config::{
    AdminConfig, DatabaseConfig, NotificationQueueConfig, PaymentsConfig, PhonePeConfig,
    PublicUrlConfig, RazorpayConfig, RegistrationConfig, SmtpConfig, StoreBackend,
};
use registration_service::models::PaymentGatewayKind;
use registration_service::services::notifications::EmailMessage;
use registration_service::services::{
    InMemoryStore, MockEmailProvider, NotificationDispatcher,
};
use registration_service::startup::{build_gateways, build_router, AppState};
use reqwest::Client;
use secrecy::Secret;
use serde_json::{json, Value};
use service_core::config::Config as CoreConfig;
use service_core::utils::signature::{hmac_sha256_hex, sha256_hex};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const LEAD_EMAIL: &str = "lead@x.com";
pub const ADMIN_EMAIL: &str = "organiser@robomania.in";

pub const RAZORPAY_KEY_SECRET: &str = "rzp_test_secret";
pub const RAZORPAY_WEBHOOK_SECRET: &str = "rzp_webhook_secret";
pub const PHONEPE_CALLBACK_USER: &str = "robomania";
pub const PHONEPE_CALLBACK_PASSWORD: &str = "callback-pass";

pub const FRONTEND_URL: &str = "http://frontend.test";

pub struct TestOptions {
    pub require_callback_auth: bool,
    pub webhook_secret: String,
}

impl Default for TestOptions {
    fn default() -> Self {
        Self {
            require_callback_auth: true,
            webhook_secret: RAZORPAY_WEBHOOK_SECRET.to_string(),
        }
    }
}

pub struct TestApp {
    pub address: String,
    pub client: Client,
    pub store: Arc<InMemoryStore>,
    pub mailer: Arc<MockEmailProvider>,
    pub razorpay: MockServer,
    pub phonepe: MockServer,
}

pub fn test_config(razorpay_url: &str, phonepe_url: &str, options: &TestOptions) -> RegistrationConfig {
    RegistrationConfig {
        common: CoreConfig {
            port: 0,
            ..CoreConfig::default()
        },
        service_name: "registration-service-test".to_string(),
        log_level: "info".to_string(),
        otlp_endpoint: None,
        is_production: false,
        database: DatabaseConfig {
            backend: StoreBackend::Memory,
            url: Secret::new(String::new()),
            max_connections: 1,
            min_connections: 1,
        },
        razorpay: RazorpayConfig {
            key_id: "rzp_test_key".to_string(),
            key_secret: Secret::new(RAZORPAY_KEY_SECRET.to_string()),
            webhook_secret: Secret::new(options.webhook_secret.clone()),
            api_base_url: razorpay_url.to_string(),
        },
        phonepe: PhonePeConfig {
            client_id: "phonepe-client".to_string(),
            client_secret: Secret::new("phonepe-secret".to_string()),
            client_version: 1,
            api_base_url: phonepe_url.to_string(),
            auth_base_url: phonepe_url.to_string(),
            callback_username: PHONEPE_CALLBACK_USER.to_string(),
            callback_password: Secret::new(PHONEPE_CALLBACK_PASSWORD.to_string()),
        },
        payments: PaymentsConfig {
            default_gateway: PaymentGatewayKind::Razorpay,
            order_expiry_secs: 1800,
            currency: "INR".to_string(),
            require_callback_auth: options.require_callback_auth,
        },
        public: PublicUrlConfig {
            api_base_url: "http://api.test".to_string(),
            frontend_url: FRONTEND_URL.to_string(),
        },
        smtp: SmtpConfig {
            host: "localhost".to_string(),
            port: 587,
            user: String::new(),
            password: Secret::new(String::new()),
            from_email: "noreply@robomania.in".to_string(),
            from_name: "RoboMania".to_string(),
            enabled: false,
        },
        notifications: NotificationQueueConfig {
            queue_size: 64,
            max_retry_secs: 2,
        },
        admin: AdminConfig {
            emails: vec![ADMIN_EMAIL.to_string()],
        },
    }
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::spawn_with(TestOptions::default()).await
    }

    pub async fn spawn_with(options: TestOptions) -> Self {
        let razorpay = MockServer::start().await;
        let phonepe = MockServer::start().await;
        let config = test_config(&razorpay.uri(), &phonepe.uri(), &options);

        let store = Arc::new(InMemoryStore::new());
        let mailer = Arc::new(MockEmailProvider::new());
        let notifier = NotificationDispatcher::start(mailer.clone(), &config.notifications);
        let gateways = build_gateways(&config);
        let state = AppState::new(config, store.clone(), gateways, notifier);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind test listener");
        let port = listener.local_addr().expect("No local address").port();
        let router = build_router(state);
        tokio::spawn(async move {
            axum::serve(listener, router).await.ok();
        });

        let client = Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .expect("Failed to build HTTP client");

        TestApp {
            address: format!("http://127.0.0.1:{}", port),
            client,
            store,
            mailer,
            razorpay,
            phonepe,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.address, path)
    }

    pub async fn post_json(&self, path: &str, email: Option<&str>, body: &Value) -> reqwest::Response {
        let mut request = self.client.post(self.url(path)).json(body);
        if let Some(email) = email {
            request = request.header("X-User-Email", email);
        }
        request.send().await.expect("Failed to execute request")
    }

    pub async fn get(&self, path: &str, email: Option<&str>) -> reqwest::Response {
        let mut request = self.client.get(self.url(path));
        if let Some(email) = email {
            request = request.header("X-User-Email", email);
        }
        request.send().await.expect("Failed to execute request")
    }

    /// Razorpay answers order creation with `order_id`.
    pub async fn mount_razorpay_order(&self, order_id: &str) {
        Mock::given(method("POST"))
            .and(path("/orders"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": order_id,
                "amount": 50000,
                "amount_paid": 0,
                "currency": "INR",
                "status": "created"
            })))
            .mount(&self.razorpay)
            .await;
    }

    /// Replaces every Razorpay mock with an order in `status` and the given payments.
    pub async fn set_razorpay_status(&self, order_id: &str, status: &str, payments: Value) {
        self.razorpay.reset().await;
        Mock::given(method("GET"))
            .and(path(format!("/orders/{}", order_id)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": order_id,
                "amount": 50000,
                "amount_paid": if status == "paid" { 50000 } else { 0 },
                "status": status
            })))
            .mount(&self.razorpay)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("/orders/{}/payments", order_id)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "items": payments })))
            .mount(&self.razorpay)
            .await;
    }

    pub async fn mount_phonepe_token(&self) {
        Mock::given(method("POST"))
            .and(path("/v1/oauth/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "phonepe-token",
                "expires_at": chrono::Utc::now().timestamp() + 3600
            })))
            .mount(&self.phonepe)
            .await;
    }

    pub async fn mount_phonepe_order(&self) {
        Mock::given(method("POST"))
            .and(path("/checkout/v2/sdk/order"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "orderId": "OMO123",
                "state": "PENDING",
                "token": "checkout-token",
                "expireAt": chrono::Utc::now().timestamp_millis() + 1_800_000
            })))
            .mount(&self.phonepe)
            .await;
    }

    /// Replaces every PhonePe mock with the token endpoint and an order in `state`.
    pub async fn set_phonepe_status(&self, merchant_order_id: &str, state: &str) {
        self.phonepe.reset().await;
        self.mount_phonepe_token().await;
        Mock::given(method("GET"))
            .and(path(format!(
                "/checkout/v2/order/{}/status",
                merchant_order_id
            )))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "orderId": "OMO123",
                "state": state,
                "amount": 30000,
                "paymentDetails": [
                    { "transactionId": "TX123", "state": state }
                ]
            })))
            .mount(&self.phonepe)
            .await;
    }

    /// Waits until at least `count` emails were handed to the provider.
    pub async fn wait_for_emails(&self, count: u64) -> Vec<EmailMessage> {
        for _ in 0..100 {
            if self.mailer.send_count() >= count {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        // Let any surplus jobs land so callers can assert exact counts.
        tokio::time::sleep(Duration::from_millis(100)).await;
        self.mailer.sent()
    }
}

pub fn team_payload() -> Value {
    json!({
        "team_name": "Sparks",
        "institution": "IIT Delhi",
        "contact_phone": "9876543210"
    })
}

pub fn members_payload() -> Value {
    json!([
        { "name": "Asha", "email": LEAD_EMAIL, "phone": "9876543210" },
        { "name": "Ravi", "email": "ravi@x.com" }
    ])
}

pub fn combat_entry(bot_id: &str, weight: f64) -> Value {
    json!({
        "competition_type": "ROBOWARS",
        "amount": 300,
        "bot": {
            "id": bot_id,
            "name": "Crusher",
            "weight": weight,
            "dimensions": "40x30x20",
            "weapon_type": "spinner"
        }
    })
}

pub fn race_entry(weight: f64) -> Value {
    json!({
        "competition_type": "ROBORACE",
        "amount": 200,
        "bot": {
            "name": "Dash",
            "weight": weight,
            "dimensions": "20x15x10"
        }
    })
}

pub fn soccer_entry(weight: f64) -> Value {
    json!({
        "competition_type": "ROBOSOCCER",
        "bot": {
            "name": "Striker",
            "weight": weight,
            "dimensions": "15 x 15 x 10 cm"
        }
    })
}

pub fn order_request(gateway: &str, competitions: Value) -> Value {
    json!({
        "gateway": gateway,
        "team": team_payload(),
        "members": members_payload(),
        "competitions": competitions
    })
}

pub fn checkout_signature(order_id: &str, payment_id: &str) -> String {
    hmac_sha256_hex(RAZORPAY_KEY_SECRET, &format!("{}|{}", order_id, payment_id))
        .expect("Failed to sign")
}

pub fn webhook_signature(body: &str) -> String {
    hmac_sha256_hex(RAZORPAY_WEBHOOK_SECRET, body).expect("Failed to sign")
}

pub fn phonepe_authorization() -> String {
    sha256_hex(&format!(
        "{}:{}",
        PHONEPE_CALLBACK_USER, PHONEPE_CALLBACK_PASSWORD
    ))
}
