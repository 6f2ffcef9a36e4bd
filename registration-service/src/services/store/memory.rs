use super::{CompletedPayment, RegistrationFilter, RegistrationStore, TeamFilter};
use crate::models::{
    Bot, CompetitionRegistration, CompetitionType, Contact, PaymentCallback, PaymentGatewayKind,
    PaymentStatus, Profile, RegistrationStatus, Team, TeamMember, TeamStatus,
};
use async_trait::async_trait;
use chrono::Utc;
use service_core::error::AppError;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct Tables {
    teams: HashMap<Uuid, Team>,
    members: Vec<TeamMember>,
    bots: HashMap<Uuid, Bot>,
    registrations: HashMap<Uuid, CompetitionRegistration>,
    contacts: Vec<Contact>,
    profiles: HashMap<String, Profile>,
    callbacks: Vec<PaymentCallback>,
}

/// Process-local store. Each operation holds the table lock for its whole
/// duration, which gives the same conditional-update semantics as the
/// PostgreSQL implementation.
#[derive(Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn callbacks(&self) -> Vec<PaymentCallback> {
        self.tables.read().await.callbacks.clone()
    }
}

fn sorted_by_creation<T, F>(mut rows: Vec<T>, key: F) -> Vec<T>
where
    F: Fn(&T) -> chrono::DateTime<Utc>,
{
    rows.sort_by_key(|r| key(r));
    rows
}

#[async_trait]
impl RegistrationStore for InMemoryStore {
    async fn ping(&self) -> Result<(), AppError> {
        Ok(())
    }

    async fn insert_team(&self, team: &Team, members: &[TeamMember]) -> Result<(), AppError> {
        let mut tables = self.tables.write().await;
        if tables
            .teams
            .values()
            .any(|t| t.user_email.eq_ignore_ascii_case(&team.user_email))
        {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Team for this email already exists"
            )));
        }
        tables.teams.insert(team.id, team.clone());
        tables.members.extend_from_slice(members);
        Ok(())
    }

    async fn get_team(&self, id: Uuid) -> Result<Option<Team>, AppError> {
        Ok(self.tables.read().await.teams.get(&id).cloned())
    }

    async fn find_team_by_email(&self, email: &str) -> Result<Option<Team>, AppError> {
        let tables = self.tables.read().await;
        let by_user = tables
            .teams
            .values()
            .find(|t| t.user_email.eq_ignore_ascii_case(email));
        if let Some(team) = by_user {
            return Ok(Some(team.clone()));
        }

        let legacy = tables
            .teams
            .values()
            .filter(|t| t.contact_email.eq_ignore_ascii_case(email))
            .min_by_key(|t| t.created_at)
            .cloned();
        Ok(legacy)
    }

    async fn find_team_by_payment_id(&self, payment_id: &str) -> Result<Option<Team>, AppError> {
        let tables = self.tables.read().await;
        Ok(tables
            .teams
            .values()
            .find(|t| t.payment_id.as_deref() == Some(payment_id))
            .cloned())
    }

    async fn set_team_payment_id(&self, team_id: Uuid, payment_id: &str) -> Result<(), AppError> {
        let mut tables = self.tables.write().await;
        if let Some(team) = tables.teams.get_mut(&team_id) {
            team.payment_id = Some(payment_id.to_string());
            team.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn set_team_multi_competition(
        &self,
        team_id: Uuid,
        multi: bool,
    ) -> Result<(), AppError> {
        let mut tables = self.tables.write().await;
        if let Some(team) = tables.teams.get_mut(&team_id) {
            team.is_multi_competition = multi;
            team.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn complete_team_payment(&self, team_id: Uuid, confirm: bool) -> Result<bool, AppError> {
        let mut tables = self.tables.write().await;
        match tables.teams.get_mut(&team_id) {
            Some(team) if team.payment_status != PaymentStatus::Completed => {
                team.payment_status = PaymentStatus::Completed;
                if confirm {
                    team.status = TeamStatus::Confirmed;
                }
                team.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn update_team_status(
        &self,
        team_id: Uuid,
        status: TeamStatus,
    ) -> Result<Option<Team>, AppError> {
        let mut tables = self.tables.write().await;
        Ok(tables.teams.get_mut(&team_id).map(|team| {
            team.status = status;
            team.updated_at = Utc::now();
            team.clone()
        }))
    }

    async fn list_teams(&self, filter: &TeamFilter) -> Result<Vec<Team>, AppError> {
        let tables = self.tables.read().await;
        let mut teams: Vec<Team> = tables
            .teams
            .values()
            .filter(|t| filter.status.is_none_or(|s| t.status == s))
            .filter(|t| filter.payment_status.is_none_or(|s| t.payment_status == s))
            .cloned()
            .collect();
        teams.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(teams)
    }

    async fn replace_scoped_members(
        &self,
        registration_id: Uuid,
        members: &[TeamMember],
    ) -> Result<(), AppError> {
        let mut tables = self.tables.write().await;
        tables
            .members
            .retain(|m| m.competition_registration_id != Some(registration_id));
        tables.members.extend_from_slice(members);
        Ok(())
    }

    async fn list_members(&self, team_id: Uuid) -> Result<Vec<TeamMember>, AppError> {
        let tables = self.tables.read().await;
        let members = tables
            .members
            .iter()
            .filter(|m| m.team_id == team_id)
            .cloned()
            .collect();
        Ok(sorted_by_creation(members, |m: &TeamMember| m.created_at))
    }

    async fn insert_bot(&self, bot: &Bot) -> Result<(), AppError> {
        self.tables.write().await.bots.insert(bot.id, bot.clone());
        Ok(())
    }

    async fn get_bot(&self, id: Uuid) -> Result<Option<Bot>, AppError> {
        Ok(self.tables.read().await.bots.get(&id).cloned())
    }

    async fn list_bots(&self, team_id: Uuid) -> Result<Vec<Bot>, AppError> {
        let tables = self.tables.read().await;
        let bots = tables
            .bots
            .values()
            .filter(|b| b.team_id == team_id)
            .cloned()
            .collect();
        Ok(sorted_by_creation(bots, |b: &Bot| b.created_at))
    }

    async fn insert_registration(
        &self,
        registration: &CompetitionRegistration,
    ) -> Result<(), AppError> {
        let mut tables = self.tables.write().await;
        if registration.competition_type == CompetitionType::Robowars
            && registration.bot_id.is_some()
            && tables.registrations.values().any(|r| {
                r.competition_type == CompetitionType::Robowars
                    && r.team_id == registration.team_id
                    && r.bot_id == registration.bot_id
            })
        {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Combat registration for this bot already exists"
            )));
        }
        tables
            .registrations
            .insert(registration.id, registration.clone());
        Ok(())
    }

    async fn find_combat_registration(
        &self,
        team_id: Uuid,
        bot_id: Uuid,
    ) -> Result<Option<CompetitionRegistration>, AppError> {
        let tables = self.tables.read().await;
        Ok(tables
            .registrations
            .values()
            .find(|r| {
                r.competition_type == CompetitionType::Robowars
                    && r.team_id == team_id
                    && r.bot_id == Some(bot_id)
            })
            .cloned())
    }

    async fn reset_registration_payment(
        &self,
        registration_id: Uuid,
        payment_id: &str,
        amount: i64,
        gateway: PaymentGatewayKind,
    ) -> Result<Option<CompetitionRegistration>, AppError> {
        let mut tables = self.tables.write().await;
        match tables.registrations.get_mut(&registration_id) {
            Some(row) if !row.is_completed() => {
                row.payment_id = Some(payment_id.to_string());
                row.amount = amount;
                row.payment_gateway = gateway;
                row.payment_status = PaymentStatus::Pending;
                row.registration_status = RegistrationStatus::Pending;
                row.updated_at = Utc::now();
                Ok(Some(row.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn list_registrations(
        &self,
        filter: &RegistrationFilter,
    ) -> Result<Vec<CompetitionRegistration>, AppError> {
        let tables = self.tables.read().await;
        let rows = tables
            .registrations
            .values()
            .filter(|r| filter.team_id.is_none_or(|id| r.team_id == id))
            .filter(|r| filter.competition_type.is_none_or(|c| r.competition_type == c))
            .filter(|r| filter.payment_status.is_none_or(|s| r.payment_status == s))
            .cloned()
            .collect();
        Ok(sorted_by_creation(rows, |r: &CompetitionRegistration| {
            r.created_at
        }))
    }

    async fn list_registrations_by_payment_id(
        &self,
        payment_id: &str,
    ) -> Result<Vec<CompetitionRegistration>, AppError> {
        let tables = self.tables.read().await;
        let rows = tables
            .registrations
            .values()
            .filter(|r| r.payment_id.as_deref() == Some(payment_id))
            .cloned()
            .collect();
        Ok(sorted_by_creation(rows, |r: &CompetitionRegistration| {
            r.created_at
        }))
    }

    async fn rebind_payment_id(&self, from: &str, to: &str) -> Result<u64, AppError> {
        let mut tables = self.tables.write().await;
        let mut count = 0;
        for row in tables.registrations.values_mut() {
            if row.payment_id.as_deref() == Some(from) && !row.is_completed() {
                row.payment_id = Some(to.to_string());
                row.updated_at = Utc::now();
                count += 1;
            }
        }
        Ok(count)
    }

    async fn complete_registrations(
        &self,
        payment_id: &str,
        payment: &CompletedPayment,
    ) -> Result<Vec<CompetitionRegistration>, AppError> {
        let mut tables = self.tables.write().await;
        let mut transitioned = Vec::new();
        for row in tables.registrations.values_mut() {
            if row.payment_id.as_deref() != Some(payment_id) || row.is_completed() {
                continue;
            }
            row.payment_status = PaymentStatus::Completed;
            row.registration_status = RegistrationStatus::Confirmed;
            row.payment_date = Some(payment.paid_at);
            if let Some(id) = payment.razorpay_payment_id() {
                row.razorpay_payment_id = Some(id.to_string());
            }
            if let Some(id) = payment.phonepe_transaction_id() {
                row.phonepe_transaction_id = Some(id.to_string());
            }
            row.updated_at = Utc::now();
            transitioned.push(row.clone());
        }
        Ok(sorted_by_creation(
            transitioned,
            |r: &CompetitionRegistration| r.created_at,
        ))
    }

    async fn insert_contact(&self, contact: &Contact) -> Result<(), AppError> {
        self.tables.write().await.contacts.push(contact.clone());
        Ok(())
    }

    async fn list_contacts(&self) -> Result<Vec<Contact>, AppError> {
        let mut contacts = self.tables.read().await.contacts.clone();
        contacts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(contacts)
    }

    async fn get_profile(&self, email: &str) -> Result<Option<Profile>, AppError> {
        Ok(self
            .tables
            .read()
            .await
            .profiles
            .get(&email.to_lowercase())
            .cloned())
    }

    async fn upsert_profile(&self, profile: &Profile) -> Result<Profile, AppError> {
        let mut tables = self.tables.write().await;
        tables
            .profiles
            .insert(profile.email.to_lowercase(), profile.clone());
        Ok(profile.clone())
    }

    async fn record_callback(&self, callback: &PaymentCallback) -> Result<bool, AppError> {
        let mut tables = self.tables.write().await;
        let seen = tables.callbacks.iter().any(|c| {
            c.gateway == callback.gateway
                && c.order_ref == callback.order_ref
                && c.event == callback.event
        });
        tables.callbacks.push(callback.clone());
        Ok(!seen)
    }
}
