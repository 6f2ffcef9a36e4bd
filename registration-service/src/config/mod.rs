//! Configuration for registration-service.
//!
//! Built once at process start and handed to the gateway adapters, the
//! notification worker and the handlers by reference.

use crate::models::PaymentGatewayKind;
use secrecy::{ExposeSecret, Secret};
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;
use std::str::FromStr;

#[derive(Debug, Clone)]
pub struct RegistrationConfig {
    pub common: core_config::Config,
    pub service_name: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub is_production: bool,
    pub database: DatabaseConfig,
    pub razorpay: RazorpayConfig,
    pub phonepe: PhonePeConfig,
    pub payments: PaymentsConfig,
    pub public: PublicUrlConfig,
    pub smtp: SmtpConfig,
    pub notifications: NotificationQueueConfig,
    pub admin: AdminConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    Memory,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub backend: StoreBackend,
    pub url: Secret<String>,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone)]
pub struct RazorpayConfig {
    pub key_id: String,
    pub key_secret: Secret<String>,
    pub webhook_secret: Secret<String>,
    pub api_base_url: String,
}

#[derive(Debug, Clone)]
pub struct PhonePeConfig {
    pub client_id: String,
    pub client_secret: Secret<String>,
    pub client_version: u32,
    /// Checkout API root, e.g. `https://api.phonepe.com/apis/pg`.
    pub api_base_url: String,
    /// OAuth API root, e.g. `https://api.phonepe.com/apis/identity-manager`.
    pub auth_base_url: String,
    pub callback_username: String,
    pub callback_password: Secret<String>,
}

#[derive(Debug, Clone)]
pub struct PaymentsConfig {
    pub default_gateway: PaymentGatewayKind,
    pub order_expiry_secs: u64,
    pub currency: String,
    /// Reject gateway callbacks outright when callback credentials are missing.
    pub require_callback_auth: bool,
}

#[derive(Debug, Clone)]
pub struct PublicUrlConfig {
    /// Externally reachable base URL of this service (used for gateway redirects).
    pub api_base_url: String,
    /// Base URL of the web frontend (confirmation and retry pages).
    pub frontend_url: String,
}

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: Secret<String>,
    pub from_email: String,
    pub from_name: String,
    pub enabled: bool,
}

#[derive(Debug, Clone)]
pub struct NotificationQueueConfig {
    pub queue_size: usize,
    pub max_retry_secs: u64,
}

#[derive(Debug, Clone, Default)]
pub struct AdminConfig {
    pub emails: Vec<String>,
}

impl RazorpayConfig {
    pub fn is_configured(&self) -> bool {
        !self.key_id.is_empty() && !self.key_secret.expose_secret().is_empty()
    }
}

impl PhonePeConfig {
    pub fn is_configured(&self) -> bool {
        !self.client_id.is_empty() && !self.client_secret.expose_secret().is_empty()
    }

    pub fn has_callback_credentials(&self) -> bool {
        !self.callback_username.is_empty() && !self.callback_password.expose_secret().is_empty()
    }
}

impl PaymentsConfig {
    /// Gateway order lifetime, capped at one hour.
    pub fn order_expiry(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.order_expiry_secs.min(3600))
    }
}

impl PublicUrlConfig {
    pub fn phonepe_redirect_url(&self, merchant_order_id: &str) -> String {
        format!(
            "{}/payments/phonepe/redirect?merchant_order_id={}",
            self.api_base_url.trim_end_matches('/'),
            merchant_order_id
        )
    }

    pub fn confirmation_url(&self, order_ref: &str) -> String {
        format!(
            "{}/registration/success?order={}",
            self.frontend_url.trim_end_matches('/'),
            order_ref
        )
    }

    pub fn retry_url(&self, order_ref: &str, status: &str) -> String {
        format!(
            "{}/registration/payment?order={}&status={}",
            self.frontend_url.trim_end_matches('/'),
            order_ref,
            status
        )
    }
}

impl AdminConfig {
    pub fn is_admin(&self, email: &str) -> bool {
        self.emails.iter().any(|e| e.eq_ignore_ascii_case(email))
    }
}

impl RegistrationConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common = core_config::Config::load()?;
        let is_prod = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string()) == "prod";

        let backend = match get_env("STORE_BACKEND", Some("postgres"), false)?.as_str() {
            "memory" if !is_prod => StoreBackend::Memory,
            "memory" => {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "STORE_BACKEND=memory is not allowed in production"
                )))
            }
            _ => StoreBackend::Postgres,
        };

        let database_url = if backend == StoreBackend::Postgres {
            get_env("DATABASE_URL", None, is_prod)?
        } else {
            String::new()
        };

        let default_gateway = PaymentGatewayKind::from_str(&get_env(
            "DEFAULT_PAYMENT_GATEWAY",
            Some("RAZORPAY"),
            false,
        )?)
        .map_err(|e| AppError::ConfigError(anyhow::anyhow!(e)))?;

        // Unverified callbacks are only ever tolerated outside production.
        let require_callback_auth = is_prod
            || env::var("REQUIRE_CALLBACK_AUTH")
                .unwrap_or_else(|_| "true".to_string())
                .parse()
                .unwrap_or(true);

        Ok(Self {
            common,
            service_name: env::var("SERVICE_NAME")
                .unwrap_or_else(|_| "registration-service".to_string()),
            log_level: env::var("LOG_LEVEL")
                .unwrap_or_else(|_| "info,registration_service=debug,sqlx=warn".to_string()),
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok().filter(|s| !s.is_empty()),
            is_production: is_prod,
            database: DatabaseConfig {
                backend,
                url: Secret::new(database_url),
                max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(10),
                min_connections: env::var("DATABASE_MIN_CONNECTIONS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(2),
            },
            razorpay: RazorpayConfig {
                key_id: get_env("RAZORPAY_KEY_ID", Some(""), is_prod)?,
                key_secret: Secret::new(get_env("RAZORPAY_KEY_SECRET", Some(""), is_prod)?),
                webhook_secret: Secret::new(get_env(
                    "RAZORPAY_WEBHOOK_SECRET",
                    Some(""),
                    is_prod,
                )?),
                api_base_url: get_env(
                    "RAZORPAY_API_BASE_URL",
                    Some("https://api.razorpay.com/v1"),
                    false,
                )?,
            },
            phonepe: PhonePeConfig {
                client_id: get_env("PHONEPE_CLIENT_ID", Some(""), is_prod)?,
                client_secret: Secret::new(get_env("PHONEPE_CLIENT_SECRET", Some(""), is_prod)?),
                client_version: get_env("PHONEPE_CLIENT_VERSION", Some("1"), false)?
                    .parse()
                    .unwrap_or(1),
                api_base_url: get_env(
                    "PHONEPE_API_BASE_URL",
                    Some("https://api-preprod.phonepe.com/apis/pg-sandbox"),
                    false,
                )?,
                auth_base_url: get_env(
                    "PHONEPE_AUTH_BASE_URL",
                    Some("https://api-preprod.phonepe.com/apis/pg-sandbox"),
                    false,
                )?,
                callback_username: get_env("PHONEPE_CALLBACK_USERNAME", Some(""), is_prod)?,
                callback_password: Secret::new(get_env(
                    "PHONEPE_CALLBACK_PASSWORD",
                    Some(""),
                    is_prod,
                )?),
            },
            payments: PaymentsConfig {
                default_gateway,
                order_expiry_secs: get_env("ORDER_EXPIRY_SECS", Some("1800"), false)?
                    .parse()
                    .unwrap_or(1800),
                currency: get_env("PAYMENT_CURRENCY", Some("INR"), false)?,
                require_callback_auth,
            },
            public: PublicUrlConfig {
                api_base_url: get_env("PUBLIC_API_URL", Some("http://localhost:8080"), is_prod)?,
                frontend_url: get_env("FRONTEND_URL", Some("http://localhost:3000"), is_prod)?,
            },
            smtp: SmtpConfig {
                host: get_env("SMTP_HOST", Some("smtp.gmail.com"), false)?,
                port: get_env("SMTP_PORT", Some("587"), false)?
                    .parse()
                    .unwrap_or(587),
                user: get_env("SMTP_USER", Some(""), false)?,
                password: Secret::new(get_env("SMTP_PASSWORD", Some(""), false)?),
                from_email: get_env("SMTP_FROM_EMAIL", Some("noreply@robomania.in"), false)?,
                from_name: get_env("SMTP_FROM_NAME", Some("RoboMania 2025"), false)?,
                enabled: env::var("SMTP_ENABLED")
                    .unwrap_or_else(|_| "false".to_string())
                    .parse()
                    .unwrap_or(false),
            },
            notifications: NotificationQueueConfig {
                queue_size: env::var("NOTIFICATION_QUEUE_SIZE")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(1024),
                max_retry_secs: env::var("NOTIFICATION_MAX_RETRY_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(300),
            },
            admin: AdminConfig {
                emails: parse_email_list(&env::var("ADMIN_EMAILS").unwrap_or_default()),
            },
        })
    }
}

fn parse_email_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required in production but not set",
                    key
                )))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required but not set",
                    key
                )))
            }
        }
    }
}
