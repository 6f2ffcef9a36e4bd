//! Persistence gateway for teams, bots, registrations and their satellites.
//!
//! Every state change the reconciliation path depends on is a conditional
//! write, so concurrent webhook and poll handlers converge on one result.

mod memory;
mod postgres;

pub use memory::InMemoryStore;
pub use postgres::PgStore;

use crate::models::{
    Bot, CompetitionRegistration, CompetitionType, Contact, PaymentCallback, PaymentGatewayKind,
    PaymentStatus, Profile, Team, TeamMember, TeamStatus,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use service_core::error::AppError;
use uuid::Uuid;

#[derive(Debug, Clone, Default)]
pub struct TeamFilter {
    pub status: Option<TeamStatus>,
    pub payment_status: Option<PaymentStatus>,
}

#[derive(Debug, Clone, Default)]
pub struct RegistrationFilter {
    pub team_id: Option<Uuid>,
    pub competition_type: Option<CompetitionType>,
    pub payment_status: Option<PaymentStatus>,
}

/// Gateway-side identifiers recorded when a payment completes.
#[derive(Debug, Clone)]
pub struct CompletedPayment {
    pub gateway: PaymentGatewayKind,
    pub transaction_id: Option<String>,
    pub paid_at: DateTime<Utc>,
}

impl CompletedPayment {
    fn razorpay_payment_id(&self) -> Option<&str> {
        match self.gateway {
            PaymentGatewayKind::Razorpay => self.transaction_id.as_deref(),
            PaymentGatewayKind::Phonepe => None,
        }
    }

    fn phonepe_transaction_id(&self) -> Option<&str> {
        match self.gateway {
            PaymentGatewayKind::Phonepe => self.transaction_id.as_deref(),
            PaymentGatewayKind::Razorpay => None,
        }
    }
}

#[async_trait]
pub trait RegistrationStore: Send + Sync {
    async fn ping(&self) -> Result<(), AppError>;

    /// Inserts the team and its roster as one unit. Fails with `Conflict`,
    /// writing nothing, when a team already exists for `team.user_email`.
    async fn insert_team(&self, team: &Team, members: &[TeamMember]) -> Result<(), AppError>;
    async fn get_team(&self, id: Uuid) -> Result<Option<Team>, AppError>;
    /// Matches `user_email` first, then the legacy `contact_email`.
    async fn find_team_by_email(&self, email: &str) -> Result<Option<Team>, AppError>;
    async fn find_team_by_payment_id(&self, payment_id: &str) -> Result<Option<Team>, AppError>;
    async fn set_team_payment_id(&self, team_id: Uuid, payment_id: &str) -> Result<(), AppError>;
    async fn set_team_multi_competition(&self, team_id: Uuid, multi: bool)
    -> Result<(), AppError>;
    /// Marks the team's payment COMPLETED (and CONFIRMED when `confirm`).
    /// Returns `false` when it was already COMPLETED.
    async fn complete_team_payment(&self, team_id: Uuid, confirm: bool) -> Result<bool, AppError>;
    async fn update_team_status(
        &self,
        team_id: Uuid,
        status: TeamStatus,
    ) -> Result<Option<Team>, AppError>;
    async fn list_teams(&self, filter: &TeamFilter) -> Result<Vec<Team>, AppError>;

    /// Replaces the members scoped to one registration.
    async fn replace_scoped_members(
        &self,
        registration_id: Uuid,
        members: &[TeamMember],
    ) -> Result<(), AppError>;
    async fn list_members(&self, team_id: Uuid) -> Result<Vec<TeamMember>, AppError>;

    async fn insert_bot(&self, bot: &Bot) -> Result<(), AppError>;
    async fn get_bot(&self, id: Uuid) -> Result<Option<Bot>, AppError>;
    async fn list_bots(&self, team_id: Uuid) -> Result<Vec<Bot>, AppError>;

    async fn insert_registration(&self, registration: &CompetitionRegistration)
    -> Result<(), AppError>;
    async fn find_combat_registration(
        &self,
        team_id: Uuid,
        bot_id: Uuid,
    ) -> Result<Option<CompetitionRegistration>, AppError>;
    /// Points an unpaid registration at a new order and resets it to PENDING.
    /// Returns `None` when the row is already COMPLETED.
    async fn reset_registration_payment(
        &self,
        registration_id: Uuid,
        payment_id: &str,
        amount: i64,
        gateway: PaymentGatewayKind,
    ) -> Result<Option<CompetitionRegistration>, AppError>;
    async fn list_registrations(
        &self,
        filter: &RegistrationFilter,
    ) -> Result<Vec<CompetitionRegistration>, AppError>;
    async fn list_registrations_by_payment_id(
        &self,
        payment_id: &str,
    ) -> Result<Vec<CompetitionRegistration>, AppError>;
    /// Moves every PENDING registration from `from` to `to`. Returns the row count.
    async fn rebind_payment_id(&self, from: &str, to: &str) -> Result<u64, AppError>;
    /// Completes the registrations for `payment_id` that are not COMPLETED yet and
    /// returns only the rows this call transitioned.
    async fn complete_registrations(
        &self,
        payment_id: &str,
        payment: &CompletedPayment,
    ) -> Result<Vec<CompetitionRegistration>, AppError>;

    async fn insert_contact(&self, contact: &Contact) -> Result<(), AppError>;
    async fn list_contacts(&self) -> Result<Vec<Contact>, AppError>;

    async fn get_profile(&self, email: &str) -> Result<Option<Profile>, AppError>;
    async fn upsert_profile(&self, profile: &Profile) -> Result<Profile, AppError>;

    /// Appends to the callback audit log. Returns `true` when no earlier
    /// callback from the same gateway carried this `order_ref` and `event`.
    async fn record_callback(&self, callback: &PaymentCallback) -> Result<bool, AppError>;
}
