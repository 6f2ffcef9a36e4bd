//! Payment reconciliation.
//!
//! Every trigger (checkout verify, webhook, browser redirect, manual poll)
//! funnels into [`Reconciler::reconcile`], which asks the gateway for the
//! authoritative order state and applies it with conditional writes. Running
//! it twice for the same order is harmless: rows already COMPLETED are never
//! rewritten and only the call that transitioned rows sends the confirmation.

use crate::config::PublicUrlConfig;
use crate::dtos::VerifyPaymentRequest;
use crate::models::{CompetitionRegistration, PaymentCallback, PaymentGatewayKind, Team};
use crate::services::gateways::{GatewayError, GatewayRegistry, OrderState, OrderStatus};
use crate::services::notifications::{NotificationDispatcher, NotificationKind, TemplateData};
use crate::services::pricing::display_name;
use crate::services::store::{CompletedPayment, RegistrationStore};
use chrono::Utc;
use serde::Serialize;
use service_core::error::AppError;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileTrigger {
    Verify,
    Callback,
    Redirect,
    Poll,
}

impl ReconcileTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReconcileTrigger::Verify => "verify",
            ReconcileTrigger::Callback => "callback",
            ReconcileTrigger::Redirect => "redirect",
            ReconcileTrigger::Poll => "poll",
        }
    }

    fn notifies_failure(&self) -> bool {
        matches!(self, ReconcileTrigger::Verify | ReconcileTrigger::Callback)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReconcileState {
    Completed,
    Failed,
    Pending,
    /// The gateway could not be asked; nothing was written.
    Unknown,
}

impl ReconcileState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReconcileState::Completed => "COMPLETED",
            ReconcileState::Failed => "FAILED",
            ReconcileState::Pending => "PENDING",
            ReconcileState::Unknown => "UNKNOWN",
        }
    }
}

impl From<OrderState> for ReconcileState {
    fn from(state: OrderState) -> Self {
        match state {
            OrderState::Completed => ReconcileState::Completed,
            OrderState::Failed => ReconcileState::Failed,
            OrderState::Pending => ReconcileState::Pending,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconcileOutcome {
    pub order_ref: String,
    pub status: ReconcileState,
    pub registrations_updated: usize,
    pub team_updated: bool,
}

impl ReconcileOutcome {
    fn untouched(order_ref: &str, status: ReconcileState) -> Self {
        Self {
            order_ref: order_ref.to_string(),
            status,
            registrations_updated: 0,
            team_updated: false,
        }
    }
}

#[derive(Clone)]
pub struct Reconciler {
    store: Arc<dyn RegistrationStore>,
    gateways: GatewayRegistry,
    notifier: NotificationDispatcher,
    public: PublicUrlConfig,
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn RegistrationStore>,
        gateways: GatewayRegistry,
        notifier: NotificationDispatcher,
        public: PublicUrlConfig,
    ) -> Self {
        Self {
            store,
            gateways,
            notifier,
            public,
        }
    }

    pub async fn reconcile(
        &self,
        gateway: PaymentGatewayKind,
        order_ref: &str,
        trigger: ReconcileTrigger,
    ) -> Result<ReconcileOutcome, AppError> {
        self.reconcile_order(gateway, order_ref, trigger, trigger.notifies_failure())
            .await
    }

    #[tracing::instrument(skip(self), fields(gateway = %gateway, trigger = trigger.as_str()))]
    async fn reconcile_order(
        &self,
        gateway: PaymentGatewayKind,
        order_ref: &str,
        trigger: ReconcileTrigger,
        notify_failure: bool,
    ) -> Result<ReconcileOutcome, AppError> {
        let adapter = self.gateways.get(gateway)?;

        let status = match adapter.get_order_status(order_ref, true).await {
            Ok(status) => status,
            Err(e) => {
                tracing::error!(order_ref, error = %e, "Order status check failed");
                record(ReconcileState::Unknown, trigger);
                return Ok(ReconcileOutcome::untouched(order_ref, ReconcileState::Unknown));
            }
        };

        let outcome = match status.state {
            OrderState::Completed => self.apply_completion(gateway, order_ref, &status).await?,
            OrderState::Failed => {
                tracing::info!(order_ref, error_code = ?status.error_code, "Payment failed");
                if notify_failure {
                    self.notify_failure(order_ref, status.error_code.as_deref())
                        .await?;
                }
                ReconcileOutcome::untouched(order_ref, ReconcileState::Failed)
            }
            OrderState::Pending => {
                tracing::debug!(order_ref, "Payment still pending");
                ReconcileOutcome::untouched(order_ref, status.state.into())
            }
        };

        record(outcome.status, trigger);
        Ok(outcome)
    }

    /// Razorpay checkout completion. A bad signature fails the payment
    /// without touching any row.
    #[tracing::instrument(skip(self, request), fields(order_ref = %request.razorpay_order_id))]
    pub async fn verify_payment(
        &self,
        request: &VerifyPaymentRequest,
    ) -> Result<ReconcileOutcome, AppError> {
        let adapter = self.gateways.get(PaymentGatewayKind::Razorpay)?;
        let valid = adapter.verify_signature(
            &request.razorpay_order_id,
            &request.razorpay_payment_id,
            &request.razorpay_signature,
        )?;

        if !valid {
            tracing::warn!(
                payment_id = %request.razorpay_payment_id,
                "Checkout signature mismatch"
            );
            metrics::counter!("payment_signature_rejected_total").increment(1);
            self.notify_failure(&request.razorpay_order_id, Some("signature verification failed"))
                .await?;
            record(ReconcileState::Failed, ReconcileTrigger::Verify);
            return Ok(ReconcileOutcome::untouched(
                &request.razorpay_order_id,
                ReconcileState::Failed,
            ));
        }

        self.reconcile(
            PaymentGatewayKind::Razorpay,
            &request.razorpay_order_id,
            ReconcileTrigger::Verify,
        )
        .await
    }

    /// Authenticates a webhook, records it and reconciles the order it names.
    /// Once the callback is accepted, processing errors are logged and
    /// reported as `Unknown` so the gateway does not retry forever.
    /// Redelivered events do not repeat the failure notice.
    pub async fn handle_callback(
        &self,
        gateway: PaymentGatewayKind,
        auth_header: Option<&str>,
        raw_body: &str,
    ) -> Result<ReconcileOutcome, AppError> {
        let adapter = self.gateways.get(gateway)?;
        let payload = adapter
            .validate_callback(auth_header, raw_body)
            .map_err(|e| {
                tracing::warn!(gateway = %gateway, error = %e, "Callback rejected");
                metrics::counter!("payment_callbacks_rejected_total", "gateway" => gateway.as_str())
                    .increment(1);
                match e {
                    GatewayError::Decode(message) => {
                        AppError::BadRequest(anyhow::anyhow!("Malformed callback: {}", message))
                    }
                    other => other.into(),
                }
            })?;

        tracing::info!(
            gateway = %gateway,
            order_ref = %payload.order_ref,
            event = %payload.event,
            state_hint = ?payload.state_hint,
            "Callback accepted"
        );

        let audit = PaymentCallback {
            id: Uuid::new_v4(),
            gateway,
            order_ref: payload.order_ref.clone(),
            event: payload.event.clone(),
            raw_body: raw_body.to_string(),
            received_at: Utc::now(),
        };
        let first_delivery = match self.store.record_callback(&audit).await {
            Ok(first) => first,
            Err(e) => {
                tracing::error!(order_ref = %payload.order_ref, error = %e, "Failed to record callback");
                true
            }
        };
        if !first_delivery {
            tracing::debug!(order_ref = %payload.order_ref, event = %payload.event, "Callback redelivered");
        }

        match self
            .reconcile_order(
                gateway,
                &payload.order_ref,
                ReconcileTrigger::Callback,
                first_delivery,
            )
            .await
        {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                tracing::error!(order_ref = %payload.order_ref, error = %e, "Callback reconciliation failed");
                Ok(ReconcileOutcome::untouched(
                    &payload.order_ref,
                    ReconcileState::Unknown,
                ))
            }
        }
    }

    /// Reconciles after the PhonePe checkout page returns and picks the
    /// frontend page to send the browser to.
    pub async fn redirect_target(&self, merchant_order_id: &str) -> String {
        let state = match self
            .reconcile(
                PaymentGatewayKind::Phonepe,
                merchant_order_id,
                ReconcileTrigger::Redirect,
            )
            .await
        {
            Ok(outcome) => outcome.status,
            Err(e) => {
                tracing::error!(merchant_order_id, error = %e, "Redirect reconciliation failed");
                ReconcileState::Unknown
            }
        };

        match state {
            ReconcileState::Completed => self.public.confirmation_url(merchant_order_id),
            other => self
                .public
                .retry_url(merchant_order_id, &other.as_str().to_lowercase()),
        }
    }

    /// Manual status poll. `caller` must own the order's team; `None` skips
    /// the check for organisers. Without an explicit gateway the one recorded
    /// on the order's registrations is used.
    pub async fn poll(
        &self,
        order_ref: &str,
        gateway: Option<PaymentGatewayKind>,
        caller: Option<&str>,
    ) -> Result<ReconcileOutcome, AppError> {
        let rows = self
            .store
            .list_registrations_by_payment_id(order_ref)
            .await?;
        let not_found = || AppError::NotFound(anyhow::anyhow!("Order {} not found", order_ref));

        let team = self
            .owning_team(order_ref, &rows)
            .await?
            .ok_or_else(not_found)?;
        if let Some(email) = caller {
            if !team.is_owned_by(email) {
                tracing::warn!(order_ref, email, "Poll for another team's order refused");
                return Err(AppError::Forbidden(anyhow::anyhow!(
                    "Order {} belongs to another team",
                    order_ref
                )));
            }
        }

        let gateway = gateway
            .or_else(|| rows.first().map(|r| r.payment_gateway))
            .ok_or_else(not_found)?;
        self.reconcile(gateway, order_ref, ReconcileTrigger::Poll)
            .await
    }

    async fn apply_completion(
        &self,
        gateway: PaymentGatewayKind,
        order_ref: &str,
        status: &OrderStatus,
    ) -> Result<ReconcileOutcome, AppError> {
        let payment = CompletedPayment {
            gateway,
            transaction_id: status.transaction_id.clone(),
            paid_at: Utc::now(),
        };
        let transitioned = self
            .store
            .complete_registrations(order_ref, &payment)
            .await?;

        let Some(team) = self.owning_team(order_ref, &transitioned).await? else {
            tracing::warn!(order_ref, "Completed order matches no registration or team");
            return Ok(ReconcileOutcome {
                order_ref: order_ref.to_string(),
                status: ReconcileState::Completed,
                registrations_updated: transitioned.len(),
                team_updated: false,
            });
        };

        let team_updated = self
            .store
            .complete_team_payment(team.id, !team.is_multi_competition)
            .await?;

        tracing::info!(
            order_ref,
            team_id = %team.id,
            registrations_updated = transitioned.len(),
            team_updated,
            "Payment completed"
        );

        if !transitioned.is_empty() || team_updated {
            let amount = if transitioned.is_empty() {
                status.amount.map(|paise| paise / 100).unwrap_or_default()
            } else {
                transitioned.iter().map(|r| r.amount).sum()
            };
            self.notifier.send(
                NotificationKind::PaymentConfirmed,
                &team.user_email,
                TemplateData {
                    team_name: team.team_name.clone(),
                    competitions: competition_names(&transitioned),
                    amount,
                    order_ref: Some(order_ref.to_string()),
                    transaction_id: status.transaction_id.clone(),
                    link: Some(self.public.confirmation_url(order_ref)),
                    ..Default::default()
                },
            );
        }

        Ok(ReconcileOutcome {
            order_ref: order_ref.to_string(),
            status: ReconcileState::Completed,
            registrations_updated: transitioned.len(),
            team_updated,
        })
    }

    async fn owning_team(
        &self,
        order_ref: &str,
        transitioned: &[CompetitionRegistration],
    ) -> Result<Option<Team>, AppError> {
        let team_id = match transitioned.first() {
            Some(row) => Some(row.team_id),
            None => self
                .store
                .list_registrations_by_payment_id(order_ref)
                .await?
                .first()
                .map(|row| row.team_id),
        };

        match team_id {
            Some(id) => self.store.get_team(id).await,
            None => self.store.find_team_by_payment_id(order_ref).await,
        }
    }

    async fn notify_failure(&self, order_ref: &str, reason: Option<&str>) -> Result<(), AppError> {
        let rows = self
            .store
            .list_registrations_by_payment_id(order_ref)
            .await?;
        let team = match rows.first() {
            Some(row) => self.store.get_team(row.team_id).await?,
            None => self.store.find_team_by_payment_id(order_ref).await?,
        };
        let Some(team) = team else {
            tracing::debug!(order_ref, "No team to notify about failed payment");
            return Ok(());
        };

        let pending: Vec<CompetitionRegistration> =
            rows.into_iter().filter(|r| !r.is_completed()).collect();
        self.notifier.send(
            NotificationKind::PaymentFailed,
            &team.user_email,
            TemplateData {
                team_name: team.team_name.clone(),
                competitions: competition_names(&pending),
                amount: pending.iter().map(|r| r.amount).sum(),
                order_ref: Some(order_ref.to_string()),
                reason: reason.map(str::to_string),
                link: Some(self.public.retry_url(order_ref, "failed")),
                ..Default::default()
            },
        );
        Ok(())
    }
}

fn competition_names(rows: &[CompetitionRegistration]) -> Vec<String> {
    rows.iter()
        .map(|r| display_name(r.competition_type).to_string())
        .collect()
}

fn record(state: ReconcileState, trigger: ReconcileTrigger) {
    metrics::counter!(
        "reconciliations_total",
        "state" => state.as_str(),
        "trigger" => trigger.as_str()
    )
    .increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NotificationQueueConfig;
    use crate::models::{CompetitionType, PaymentStatus, RegistrationStatus, TeamStatus};
    use crate::services::gateways::{CallbackPayload, GatewayOrder, OrderRequest, PaymentGateway};
    use crate::services::notifications::MockEmailProvider;
    use crate::services::store::InMemoryStore;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Gateway whose order state is set by the test.
    struct ScriptedGateway {
        state: Mutex<Result<OrderState, String>>,
    }

    impl ScriptedGateway {
        fn new(state: OrderState) -> Self {
            Self {
                state: Mutex::new(Ok(state)),
            }
        }

        fn set(&self, state: Result<OrderState, String>) {
            *self.state.lock().unwrap() = state;
        }
    }

    #[async_trait]
    impl PaymentGateway for ScriptedGateway {
        fn kind(&self) -> PaymentGatewayKind {
            PaymentGatewayKind::Razorpay
        }

        fn is_configured(&self) -> bool {
            true
        }

        async fn create_order(&self, _request: &OrderRequest) -> Result<GatewayOrder, GatewayError> {
            Err(GatewayError::Decode("not scripted".to_string()))
        }

        fn verify_signature(
            &self,
            _order_id: &str,
            _payment_id: &str,
            signature: &str,
        ) -> Result<bool, GatewayError> {
            Ok(signature == "good")
        }

        async fn get_order_status(
            &self,
            _order_ref: &str,
            _detailed: bool,
        ) -> Result<OrderStatus, GatewayError> {
            let state = self.state.lock().unwrap().clone();
            match state {
                Ok(state) => Ok(OrderStatus {
                    state,
                    amount: Some(50000),
                    transaction_id: Some("pay_1".to_string()),
                    error_code: None,
                }),
                Err(message) => Err(GatewayError::Provider {
                    gateway: PaymentGatewayKind::Razorpay,
                    status: Some(500),
                    message,
                }),
            }
        }

        fn validate_callback(
            &self,
            auth_header: Option<&str>,
            raw_body: &str,
        ) -> Result<CallbackPayload, GatewayError> {
            if auth_header != Some("good") {
                return Err(GatewayError::Unauthorized("bad signature".to_string()));
            }
            Ok(CallbackPayload {
                order_ref: "order_1".to_string(),
                event: raw_body.to_string(),
                state_hint: None,
            })
        }
    }

    struct Fixture {
        store: Arc<InMemoryStore>,
        gateway: Arc<ScriptedGateway>,
        mailer: Arc<MockEmailProvider>,
        reconciler: Reconciler,
        team: Team,
    }

    async fn fixture(state: OrderState) -> Fixture {
        let store = Arc::new(InMemoryStore::new());
        let gateway = Arc::new(ScriptedGateway::new(state));
        let mailer = Arc::new(MockEmailProvider::new());
        let notifier = NotificationDispatcher::start(
            mailer.clone(),
            &NotificationQueueConfig {
                queue_size: 16,
                max_retry_secs: 1,
            },
        );
        let reconciler = Reconciler::new(
            store.clone(),
            GatewayRegistry::new().with(gateway.clone()),
            notifier,
            PublicUrlConfig {
                api_base_url: "http://api.test".to_string(),
                frontend_url: "http://web.test".to_string(),
            },
        );

        let now = Utc::now();
        let team = Team {
            id: Uuid::new_v4(),
            user_email: "lead@x.com".to_string(),
            team_name: "Sparks".to_string(),
            institution: "IIT".to_string(),
            leader_name: "Asha".to_string(),
            leader_email: "lead@x.com".to_string(),
            leader_phone: None,
            contact_email: "lead@x.com".to_string(),
            contact_phone: None,
            robot_name: None,
            robot_weight: None,
            robot_dimensions: None,
            weapon_type: None,
            status: TeamStatus::Pending,
            payment_status: PaymentStatus::Pending,
            payment_id: Some("order_1".to_string()),
            is_multi_competition: true,
            created_at: now,
            updated_at: now,
        };
        store.insert_team(&team, &[]).await.unwrap();
        for (competition, amount) in [
            (CompetitionType::Robowars, 300),
            (CompetitionType::Roborace, 200),
        ] {
            store
                .insert_registration(&CompetitionRegistration {
                    id: Uuid::new_v4(),
                    team_id: team.id,
                    competition_type: competition,
                    bot_id: Some(Uuid::new_v4()),
                    amount,
                    payment_id: Some("order_1".to_string()),
                    payment_status: PaymentStatus::Pending,
                    registration_status: RegistrationStatus::Pending,
                    payment_gateway: PaymentGatewayKind::Razorpay,
                    payment_date: None,
                    razorpay_payment_id: None,
                    phonepe_transaction_id: None,
                    created_at: now,
                    updated_at: now,
                })
                .await
                .unwrap();
        }

        Fixture {
            store,
            gateway,
            mailer,
            reconciler,
            team,
        }
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    #[tokio::test]
    async fn reconcile_is_idempotent() {
        let f = fixture(OrderState::Completed).await;

        let first = f
            .reconciler
            .reconcile(PaymentGatewayKind::Razorpay, "order_1", ReconcileTrigger::Poll)
            .await
            .unwrap();
        assert_eq!(first.status, ReconcileState::Completed);
        assert_eq!(first.registrations_updated, 2);
        assert!(first.team_updated);

        let rows = f.store.list_registrations_by_payment_id("order_1").await.unwrap();
        let paid_at: Vec<_> = rows.iter().map(|r| r.payment_date).collect();

        let second = f
            .reconciler
            .reconcile(PaymentGatewayKind::Razorpay, "order_1", ReconcileTrigger::Callback)
            .await
            .unwrap();
        assert_eq!(second.status, ReconcileState::Completed);
        assert_eq!(second.registrations_updated, 0);
        assert!(!second.team_updated);

        let rows = f.store.list_registrations_by_payment_id("order_1").await.unwrap();
        assert!(rows.iter().all(|r| r.payment_status == PaymentStatus::Completed
            && r.registration_status == RegistrationStatus::Confirmed
            && r.razorpay_payment_id.as_deref() == Some("pay_1")));
        assert_eq!(rows.iter().map(|r| r.payment_date).collect::<Vec<_>>(), paid_at);

        let team = f.store.get_team(f.team.id).await.unwrap().unwrap();
        assert_eq!(team.payment_status, PaymentStatus::Completed);
        // Multi-competition teams keep their review status.
        assert_eq!(team.status, TeamStatus::Pending);

        settle().await;
        assert_eq!(f.mailer.send_count(), 1);
        assert!(f.mailer.sent()[0].subject.contains("confirmed"));
    }

    #[tokio::test]
    async fn status_failure_is_unknown_and_writes_nothing() {
        let f = fixture(OrderState::Completed).await;
        f.gateway.set(Err("gateway down".to_string()));

        let outcome = f
            .reconciler
            .reconcile(PaymentGatewayKind::Razorpay, "order_1", ReconcileTrigger::Poll)
            .await
            .unwrap();
        assert_eq!(outcome.status, ReconcileState::Unknown);

        let rows = f.store.list_registrations_by_payment_id("order_1").await.unwrap();
        assert!(rows.iter().all(|r| r.payment_status == PaymentStatus::Pending));
    }

    #[tokio::test]
    async fn pending_and_failed_leave_rows_pending() {
        let f = fixture(OrderState::Pending).await;
        let outcome = f
            .reconciler
            .reconcile(PaymentGatewayKind::Razorpay, "order_1", ReconcileTrigger::Poll)
            .await
            .unwrap();
        assert_eq!(outcome.status, ReconcileState::Pending);

        f.gateway.set(Ok(OrderState::Failed));
        let outcome = f
            .reconciler
            .reconcile(PaymentGatewayKind::Razorpay, "order_1", ReconcileTrigger::Poll)
            .await
            .unwrap();
        assert_eq!(outcome.status, ReconcileState::Failed);

        let rows = f.store.list_registrations_by_payment_id("order_1").await.unwrap();
        assert!(rows.iter().all(|r| r.payment_status == PaymentStatus::Pending));

        settle().await;
        // Polls never send failure notices.
        assert_eq!(f.mailer.send_count(), 0);
    }

    #[tokio::test]
    async fn redelivered_failure_callback_notifies_once() {
        let f = fixture(OrderState::Failed).await;

        for _ in 0..3 {
            let outcome = f
                .reconciler
                .handle_callback(PaymentGatewayKind::Razorpay, Some("good"), "payment.failed")
                .await
                .unwrap();
            assert_eq!(outcome.status, ReconcileState::Failed);
        }
        assert_eq!(f.store.callbacks().await.len(), 3);

        settle().await;
        let failures = f
            .mailer
            .sent()
            .into_iter()
            .filter(|m| m.subject.contains("failed"))
            .count();
        assert_eq!(failures, 1);
    }

    #[tokio::test]
    async fn bad_signature_fails_without_touching_rows() {
        let f = fixture(OrderState::Completed).await;

        let outcome = f
            .reconciler
            .verify_payment(&VerifyPaymentRequest {
                razorpay_order_id: "order_1".to_string(),
                razorpay_payment_id: "pay_1".to_string(),
                razorpay_signature: "forged".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(outcome.status, ReconcileState::Failed);
        assert_eq!(outcome.registrations_updated, 0);

        let rows = f.store.list_registrations_by_payment_id("order_1").await.unwrap();
        assert!(rows.iter().all(|r| r.payment_status == PaymentStatus::Pending));

        // A later poll still completes the order.
        let polled = f
            .reconciler
            .poll("order_1", None, Some("lead@x.com"))
            .await
            .unwrap();
        assert_eq!(polled.status, ReconcileState::Completed);
        assert_eq!(polled.registrations_updated, 2);

        settle().await;
        let subjects: Vec<String> = f.mailer.sent().into_iter().map(|m| m.subject).collect();
        assert!(subjects.iter().any(|s| s.contains("failed")));
        assert!(subjects.iter().any(|s| s.contains("confirmed")));
    }

    #[tokio::test]
    async fn poll_is_limited_to_the_owning_team() {
        let f = fixture(OrderState::Completed).await;

        let err = f
            .reconciler
            .poll("order_1", None, Some("intruder@x.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
        let rows = f.store.list_registrations_by_payment_id("order_1").await.unwrap();
        assert!(rows.iter().all(|r| r.payment_status == PaymentStatus::Pending));

        let err = f
            .reconciler
            .poll("order_missing", None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        let organiser = f.reconciler.poll("order_1", None, None).await.unwrap();
        assert_eq!(organiser.status, ReconcileState::Completed);
    }

    #[tokio::test]
    async fn good_signature_reconciles() {
        let f = fixture(OrderState::Completed).await;
        let outcome = f
            .reconciler
            .verify_payment(&VerifyPaymentRequest {
                razorpay_order_id: "order_1".to_string(),
                razorpay_payment_id: "pay_1".to_string(),
                razorpay_signature: "good".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(outcome.status, ReconcileState::Completed);
        assert_eq!(outcome.registrations_updated, 2);
    }

    #[tokio::test]
    async fn redirect_picks_confirmation_or_retry_page() {
        let f = fixture(OrderState::Pending).await;
        let phonepe = Arc::new(ScriptedPhonePe(f.gateway.clone()));
        let reconciler = Reconciler::new(
            f.store.clone(),
            GatewayRegistry::new().with(phonepe),
            NotificationDispatcher::start(
                f.mailer.clone(),
                &NotificationQueueConfig {
                    queue_size: 4,
                    max_retry_secs: 1,
                },
            ),
            PublicUrlConfig {
                api_base_url: "http://api.test".to_string(),
                frontend_url: "http://web.test".to_string(),
            },
        );

        let target = reconciler.redirect_target("order_1").await;
        assert_eq!(
            target,
            "http://web.test/registration/payment?order=order_1&status=pending"
        );

        f.gateway.set(Ok(OrderState::Completed));
        let target = reconciler.redirect_target("order_1").await;
        assert_eq!(target, "http://web.test/registration/success?order=order_1");
    }

    /// Presents the scripted gateway under the PhonePe kind.
    struct ScriptedPhonePe(Arc<ScriptedGateway>);

    #[async_trait]
    impl PaymentGateway for ScriptedPhonePe {
        fn kind(&self) -> PaymentGatewayKind {
            PaymentGatewayKind::Phonepe
        }

        fn is_configured(&self) -> bool {
            true
        }

        async fn create_order(&self, request: &OrderRequest) -> Result<GatewayOrder, GatewayError> {
            self.0.create_order(request).await
        }

        async fn get_order_status(
            &self,
            order_ref: &str,
            detailed: bool,
        ) -> Result<OrderStatus, GatewayError> {
            self.0.get_order_status(order_ref, detailed).await
        }

        fn validate_callback(
            &self,
            auth_header: Option<&str>,
            raw_body: &str,
        ) -> Result<CallbackPayload, GatewayError> {
            self.0.validate_callback(auth_header, raw_body)
        }
    }
}
