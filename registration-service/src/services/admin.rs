//! Read views and the few writes available to organisers.

use crate::config::PublicUrlConfig;
use crate::dtos::{
    CompetitionStats, DashboardStats, RegistrationListQuery, ReminderResponse, TeamDetail,
    TeamListQuery,
};
use crate::models::{
    CompetitionRegistration, CompetitionType, Contact, PaymentStatus, RegistrationStatus, Team,
    TeamStatus,
};
use crate::services::notifications::{NotificationDispatcher, NotificationKind, TemplateData};
use crate::services::pricing::display_name;
use crate::services::store::{RegistrationFilter, RegistrationStore, TeamFilter};
use service_core::error::AppError;
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

/// Loads a team together with its members, bots and registrations.
pub async fn team_detail(store: &dyn RegistrationStore, team: Team) -> Result<TeamDetail, AppError> {
    let members = store.list_members(team.id).await?;
    let bots = store.list_bots(team.id).await?;
    let registrations = store
        .list_registrations(&RegistrationFilter {
            team_id: Some(team.id),
            ..Default::default()
        })
        .await?;

    Ok(TeamDetail {
        team,
        members,
        bots,
        registrations,
    })
}

#[derive(Clone)]
pub struct AdminService {
    store: Arc<dyn RegistrationStore>,
    notifier: NotificationDispatcher,
    public: PublicUrlConfig,
}

impl AdminService {
    pub fn new(
        store: Arc<dyn RegistrationStore>,
        notifier: NotificationDispatcher,
        public: PublicUrlConfig,
    ) -> Self {
        Self {
            store,
            notifier,
            public,
        }
    }

    pub async fn list_teams(&self, query: &TeamListQuery) -> Result<Vec<Team>, AppError> {
        self.store
            .list_teams(&TeamFilter {
                status: query.status,
                payment_status: query.payment_status,
            })
            .await
    }

    pub async fn team(&self, id: Uuid) -> Result<TeamDetail, AppError> {
        let team = self
            .store
            .get_team(id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Team {} not found", id)))?;
        team_detail(self.store.as_ref(), team).await
    }

    pub async fn list_registrations(
        &self,
        query: &RegistrationListQuery,
    ) -> Result<Vec<CompetitionRegistration>, AppError> {
        self.store
            .list_registrations(&RegistrationFilter {
                team_id: None,
                competition_type: query.competition_type,
                payment_status: query.payment_status,
            })
            .await
    }

    pub async fn list_contacts(&self) -> Result<Vec<Contact>, AppError> {
        self.store.list_contacts().await
    }

    /// Sets the review status. CONFIRMED is reserved for payment reconciliation.
    #[tracing::instrument(skip(self))]
    pub async fn update_team_status(&self, id: Uuid, status: TeamStatus) -> Result<Team, AppError> {
        if status == TeamStatus::Confirmed {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "CONFIRMED is set by payment reconciliation only"
            )));
        }

        let team = self
            .store
            .update_team_status(id, status)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Team {} not found", id)))?;

        tracing::info!(team_id = %id, status = %status, "Team status updated");
        Ok(team)
    }

    pub async fn dashboard(&self) -> Result<DashboardStats, AppError> {
        let teams = self.store.list_teams(&TeamFilter::default()).await?;
        let registrations = self
            .store
            .list_registrations(&RegistrationFilter::default())
            .await?;

        let mut stats = DashboardStats {
            total_teams: teams.len(),
            total_registrations: registrations.len(),
            ..Default::default()
        };

        for team in &teams {
            *stats
                .teams_by_status
                .entry(team.status.as_str().to_string())
                .or_default() += 1;
            *stats
                .teams_by_payment_status
                .entry(team.payment_status.as_str().to_string())
                .or_default() += 1;
        }

        let mut per_competition: BTreeMap<CompetitionType, CompetitionStats> = CompetitionType::ALL
            .iter()
            .map(|&kind| {
                (
                    kind,
                    CompetitionStats {
                        competition_type: kind,
                        display_name: display_name(kind).to_string(),
                        registrations: 0,
                        confirmed: 0,
                        confirmed_revenue: 0,
                    },
                )
            })
            .collect();

        for registration in &registrations {
            if registration.payment_status == PaymentStatus::Pending {
                stats.pending_registrations += 1;
            }
            let Some(entry) = per_competition.get_mut(&registration.competition_type) else {
                continue;
            };
            entry.registrations += 1;
            if registration.registration_status == RegistrationStatus::Confirmed {
                entry.confirmed += 1;
                entry.confirmed_revenue += registration.amount;
                stats.confirmed_revenue += registration.amount;
            }
        }

        stats.competitions = per_competition.into_values().collect();
        Ok(stats)
    }

    /// Emails every team that still has unpaid registrations.
    #[tracing::instrument(skip(self))]
    pub async fn send_payment_reminders(&self) -> Result<ReminderResponse, AppError> {
        let pending = self
            .store
            .list_registrations(&RegistrationFilter {
                payment_status: Some(PaymentStatus::Pending),
                ..Default::default()
            })
            .await?;

        let mut by_team: BTreeMap<Uuid, Vec<CompetitionRegistration>> = BTreeMap::new();
        for registration in pending {
            by_team
                .entry(registration.team_id)
                .or_default()
                .push(registration);
        }

        let mut teams_notified = 0;
        for (team_id, rows) in by_team {
            let Some(team) = self.store.get_team(team_id).await? else {
                tracing::warn!(%team_id, "Pending registrations without a team");
                continue;
            };

            let link = team
                .payment_id
                .as_deref()
                .map(|order_ref| self.public.retry_url(order_ref, "pending"));
            let queued = self.notifier.send(
                NotificationKind::PaymentReminder,
                &team.user_email,
                TemplateData {
                    team_name: team.team_name.clone(),
                    competitions: rows
                        .iter()
                        .map(|r| display_name(r.competition_type).to_string())
                        .collect(),
                    amount: rows.iter().map(|r| r.amount).sum(),
                    order_ref: team.payment_id.clone(),
                    link,
                    ..Default::default()
                },
            );
            if queued {
                teams_notified += 1;
            }
        }

        tracing::info!(teams_notified, "Payment reminders queued");
        Ok(ReminderResponse { teams_notified })
    }
}
