//! Application startup and lifecycle management.

use crate::config::{PublicUrlConfig, RegistrationConfig, StoreBackend};
use crate::handlers;
use crate::services::{
    AdminService, CheckoutService, EmailProvider, GatewayRegistry, InMemoryStore,
    MockEmailProvider, NotificationDispatcher, PgStore, PhonePeGateway, RazorpayGateway,
    Reconciler, RegistrationStore, SmtpProvider, TeamResolver,
};
use axum::{
    http::{header, HeaderName, HeaderValue, Method, Request},
    middleware::from_fn,
    routing::{get, post, put},
    Router,
};
use secrecy::ExposeSecret;
use service_core::error::AppError;
use service_core::middleware::{
    metrics::metrics_middleware, security_headers::security_headers_middleware,
    tracing::request_id_middleware,
};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<RegistrationConfig>,
    pub store: Arc<dyn RegistrationStore>,
    pub notifier: NotificationDispatcher,
    pub resolver: TeamResolver,
    pub checkout: CheckoutService,
    pub reconciler: Reconciler,
    pub admin: AdminService,
}

impl AppState {
    pub fn new(
        config: RegistrationConfig,
        store: Arc<dyn RegistrationStore>,
        gateways: GatewayRegistry,
        notifier: NotificationDispatcher,
    ) -> Self {
        let checkout = CheckoutService::new(
            store.clone(),
            gateways.clone(),
            notifier.clone(),
            config.payments.clone(),
            config.public.clone(),
            config.razorpay.key_id.clone(),
        );
        let reconciler = Reconciler::new(
            store.clone(),
            gateways,
            notifier.clone(),
            config.public.clone(),
        );
        let admin = AdminService::new(store.clone(), notifier.clone(), config.public.clone());

        Self {
            resolver: TeamResolver::new(store.clone()),
            config: Arc::new(config),
            store,
            notifier,
            checkout,
            reconciler,
            admin,
        }
    }
}

/// Registers both gateway adapters; unconfigured ones refuse new orders.
pub fn build_gateways(config: &RegistrationConfig) -> GatewayRegistry {
    let require_auth = config.payments.require_callback_auth;

    let razorpay = RazorpayGateway::new(config.razorpay.clone(), require_auth);
    if !config.razorpay.is_configured() {
        tracing::warn!("Razorpay credentials not configured - Razorpay checkout disabled");
    }
    let phonepe = PhonePeGateway::new(config.phonepe.clone(), require_auth);
    if !config.phonepe.is_configured() {
        tracing::warn!("PhonePe credentials not configured - PhonePe checkout disabled");
    }

    GatewayRegistry::new()
        .with(Arc::new(razorpay))
        .with(Arc::new(phonepe))
}

/// The browser frontend is the only cross-origin caller.
fn cors_layer(public: &PublicUrlConfig) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static("x-user-email"),
        ]);

    let origin = public.frontend_url.trim_end_matches('/');
    match origin.parse::<HeaderValue>() {
        Ok(origin) => layer.allow_origin(origin),
        Err(e) => {
            tracing::error!(
                "Invalid CORS origin '{}': {}. Cross-origin requests disabled.",
                origin,
                e
            );
            layer
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.public);

    let admin = Router::new()
        .route("/teams", get(handlers::admin::list_teams))
        .route("/teams/:id", get(handlers::admin::get_team))
        .route("/teams/:id/status", put(handlers::admin::update_team_status))
        .route("/registrations", get(handlers::admin::list_registrations))
        .route("/stats", get(handlers::admin::dashboard))
        .route("/contacts", get(handlers::admin::list_contacts))
        .route("/reminders", post(handlers::admin::send_reminders));

    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/metrics", get(handlers::metrics_endpoint))
        .route(
            "/registrations",
            post(handlers::registrations::create_registration),
        )
        .route("/teams/me", get(handlers::registrations::get_my_team))
        .route("/orders", post(handlers::orders::create_order))
        .route("/payments/verify", post(handlers::payments::verify_payment))
        .route(
            "/payments/callback/razorpay",
            post(handlers::payments::razorpay_callback),
        )
        .route(
            "/payments/callback/phonepe",
            post(handlers::payments::phonepe_callback),
        )
        .route(
            "/payments/phonepe/redirect",
            get(handlers::payments::phonepe_redirect),
        )
        .route("/payments/status", get(handlers::payments::payment_status))
        .route("/contact", post(handlers::contact::submit_contact))
        .route(
            "/profile",
            get(handlers::contact::get_profile).put(handlers::contact::update_profile),
        )
        .nest("/admin", admin)
        .layer(from_fn(security_headers_middleware))
        .layer(from_fn(metrics_middleware))
        .layer(from_fn(request_id_middleware))
        .layer(cors)
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                    user_email = tracing::field::Empty,
                )
            }),
        )
        .with_state(state)
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    state: AppState,
}

impl Application {
    /// Connects the store, starts the notification worker and binds the listener.
    pub async fn build(config: RegistrationConfig) -> Result<Self, AppError> {
        let store: Arc<dyn RegistrationStore> = match config.database.backend {
            StoreBackend::Postgres => {
                let store = PgStore::connect(
                    config.database.url.expose_secret(),
                    config.database.max_connections,
                    config.database.min_connections,
                )
                .await
                .map_err(|e| {
                    tracing::error!("Failed to connect to PostgreSQL: {}", e);
                    e
                })?;
                store.migrate().await.map_err(|e| {
                    tracing::error!("Failed to run migrations: {}", e);
                    e
                })?;
                Arc::new(store)
            }
            StoreBackend::Memory => {
                tracing::warn!("Using in-memory store; data is lost on restart");
                Arc::new(InMemoryStore::new())
            }
        };

        let provider: Arc<dyn EmailProvider> = if config.smtp.enabled {
            Arc::new(SmtpProvider::new(config.smtp.clone()).map_err(|e| {
                AppError::ConfigError(anyhow::anyhow!("SMTP setup failed: {}", e))
            })?)
        } else {
            tracing::warn!("SMTP disabled - emails are logged, not sent");
            Arc::new(MockEmailProvider::new())
        };
        let notifier = NotificationDispatcher::start(provider, &config.notifications);

        let gateways = build_gateways(&config);

        let addr = config.common.bind_addr();
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!("Failed to bind HTTP listener to {}: {}", addr, e);
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!(port, "Registration service listening");

        Ok(Self {
            port,
            listener,
            state: AppState::new(config, store, gateways, notifier),
        })
    }

    /// Get the HTTP port the server is listening on.
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn state(&self) -> AppState {
        self.state.clone()
    }

    /// Serves until `shutdown` resolves, then stops the notification worker.
    pub async fn run_until_stopped<F>(self, shutdown: F) -> std::io::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let notifier = self.state.notifier.clone();
        let router = build_router(self.state);

        let result = axum::serve(self.listener, router)
            .with_graceful_shutdown(shutdown)
            .await;

        notifier.shutdown();
        result
    }
}
