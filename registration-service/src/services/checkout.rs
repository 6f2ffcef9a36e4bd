//! Order creation: team resolution, registration writes, then the gateway order.

use crate::config::{PaymentsConfig, PublicUrlConfig};
use crate::dtos::{CreateOrderRequest, CreateOrderResponse};
use crate::models::PaymentGatewayKind;
use crate::services::gateways::{GatewayError, GatewayRegistry, OrderRequest};
use crate::services::notifications::{NotificationDispatcher, NotificationKind, TemplateData};
use crate::services::pricing::display_name;
use crate::services::registration_writer::RegistrationWriter;
use crate::services::store::RegistrationStore;
use crate::services::team_resolver::TeamResolver;
use service_core::error::AppError;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Clone)]
pub struct CheckoutService {
    store: Arc<dyn RegistrationStore>,
    resolver: TeamResolver,
    writer: RegistrationWriter,
    gateways: GatewayRegistry,
    notifier: NotificationDispatcher,
    payments: PaymentsConfig,
    public: PublicUrlConfig,
    razorpay_key_id: String,
}

/// Merchant-side order id, unique per checkout attempt.
pub fn new_merchant_order_id() -> String {
    format!("RM{}", Uuid::new_v4().simple())
}

impl CheckoutService {
    pub fn new(
        store: Arc<dyn RegistrationStore>,
        gateways: GatewayRegistry,
        notifier: NotificationDispatcher,
        payments: PaymentsConfig,
        public: PublicUrlConfig,
        razorpay_key_id: String,
    ) -> Self {
        Self {
            resolver: TeamResolver::new(store.clone()),
            writer: RegistrationWriter::new(store.clone()),
            store,
            gateways,
            notifier,
            payments,
            public,
            razorpay_key_id,
        }
    }

    /// Writes PENDING registrations and opens a gateway order for their total.
    ///
    /// A gateway failure surfaces as `BadGateway`; the rows already written
    /// stay PENDING under the merchant order id and are reused on retry.
    #[tracing::instrument(skip(self, request), fields(email = ?email))]
    pub async fn create_order(
        &self,
        email: Option<&str>,
        request: &CreateOrderRequest,
    ) -> Result<CreateOrderResponse, AppError> {
        let kind = request.gateway.unwrap_or(self.payments.default_gateway);
        let gateway = self.gateways.get(kind)?;
        if !gateway.is_configured() {
            tracing::warn!(gateway = %kind, "Order requested for unconfigured gateway");
            return Err(GatewayError::NotConfigured(kind).into());
        }

        self.writer.validate(&request.competitions).await?;

        let payload = request
            .team
            .as_ref()
            .map(|team| (team, request.members.as_slice()));
        let team = self
            .resolver
            .resolve_team(email, request.team_id, payload)
            .await?
            .team;

        let merchant_order_id = new_merchant_order_id();
        let outcome = self
            .writer
            .write_registrations(&team, &request.competitions, &merchant_order_id, kind)
            .await?;

        let order = gateway
            .create_order(&OrderRequest {
                amount: outcome.total_amount,
                currency: self.payments.currency.clone(),
                merchant_order_id: merchant_order_id.clone(),
                redirect_url: self.public.phonepe_redirect_url(&merchant_order_id),
                expiry: self.payments.order_expiry(),
            })
            .await
            .map_err(|e| {
                tracing::error!(
                    gateway = %kind,
                    merchant_order_id = %merchant_order_id,
                    error = %e,
                    "Gateway order creation failed"
                );
                metrics::counter!("orders_failed_total", "gateway" => kind.as_str()).increment(1);
                AppError::from(e)
            })?;

        let mut registrations = outcome.registrations;
        if order.order_ref != merchant_order_id {
            let moved = self
                .store
                .rebind_payment_id(&merchant_order_id, &order.order_ref)
                .await?;
            tracing::debug!(moved, order_ref = %order.order_ref, "Registrations rebound to gateway order");
            for registration in registrations.iter_mut() {
                registration.payment_id = Some(order.order_ref.clone());
            }
        }
        self.store
            .set_team_payment_id(team.id, &order.order_ref)
            .await?;

        self.notifier.send(
            NotificationKind::RegistrationReceived,
            &team.user_email,
            TemplateData {
                team_name: team.team_name.clone(),
                competitions: registrations
                    .iter()
                    .map(|r| display_name(r.competition_type).to_string())
                    .collect(),
                amount: outcome.total_amount,
                order_ref: Some(order.order_ref.clone()),
                link: Some(self.public.retry_url(&order.order_ref, "pending")),
                ..Default::default()
            },
        );

        metrics::counter!("orders_created_total", "gateway" => kind.as_str()).increment(1);
        tracing::info!(
            team_id = %team.id,
            gateway = %kind,
            order_ref = %order.order_ref,
            total_amount = outcome.total_amount,
            "Order created"
        );

        let amount_minor = outcome.total_amount * 100;
        Ok(CreateOrderResponse {
            order_ref: order.order_ref,
            merchant_order_id,
            provider_order_id: order.provider_order_id,
            gateway: kind,
            team_id: team.id,
            total_amount: outcome.total_amount,
            amount_minor,
            currency: self.payments.currency.clone(),
            razorpay_key_id: (kind == PaymentGatewayKind::Razorpay)
                .then(|| self.razorpay_key_id.clone()),
            checkout_token: order.checkout_token,
            expire_at: order.expire_at,
            registrations,
        })
    }
}
