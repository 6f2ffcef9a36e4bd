//! Finds the caller's team, creating it on first registration.

use crate::dtos::{MemberPayload, TeamPayload};
use crate::models::{PaymentStatus, Team, TeamMember, TeamStatus};
use crate::services::store::RegistrationStore;
use chrono::Utc;
use service_core::error::AppError;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct ResolvedTeam {
    pub team: Team,
    pub created: bool,
}

#[derive(Clone)]
pub struct TeamResolver {
    store: Arc<dyn RegistrationStore>,
}

fn required<'a>(value: &'a Option<String>, field: &str) -> Result<&'a str, AppError> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("{} is required", field)))
}

/// Builds member rows; the first member defaults to `LEADER`.
pub fn build_members(
    team_id: Uuid,
    registration_id: Option<Uuid>,
    members: &[MemberPayload],
) -> Result<Vec<TeamMember>, AppError> {
    let now = Utc::now();
    members
        .iter()
        .enumerate()
        .map(|(i, m)| {
            let name = required(&m.name, "Member name")?;
            let email = required(&m.email, "Member email")?;
            if !email.contains('@') {
                return Err(AppError::BadRequest(anyhow::anyhow!(
                    "Invalid member email: {}",
                    email
                )));
            }
            let role = m
                .role
                .as_deref()
                .map(|r| r.trim().to_uppercase())
                .filter(|r| !r.is_empty())
                .unwrap_or_else(|| {
                    if i == 0 && registration_id.is_none() {
                        "LEADER".to_string()
                    } else {
                        "MEMBER".to_string()
                    }
                });

            Ok(TeamMember {
                id: Uuid::new_v4(),
                team_id,
                competition_registration_id: registration_id,
                name: name.to_string(),
                email: email.to_lowercase(),
                phone: m.phone.clone().filter(|p| !p.trim().is_empty()),
                role,
                created_at: now,
            })
        })
        .collect()
}

impl TeamResolver {
    pub fn new(store: Arc<dyn RegistrationStore>) -> Self {
        Self { store }
    }

    /// Resolves by explicit id, then by email, then creates from `payload`.
    /// Existing teams are returned unchanged.
    #[tracing::instrument(skip(self, payload), fields(email = ?email, team_id = ?team_id))]
    pub async fn resolve_team(
        &self,
        email: Option<&str>,
        team_id: Option<Uuid>,
        payload: Option<(&TeamPayload, &[MemberPayload])>,
    ) -> Result<ResolvedTeam, AppError> {
        let email = email.map(|e| e.trim().to_lowercase()).filter(|e| !e.is_empty());

        if let Some(id) = team_id {
            let team = self
                .store
                .get_team(id)
                .await?
                .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Team {} not found", id)))?;

            if let Some(email) = &email {
                if !team.is_owned_by(email) {
                    return Err(AppError::Forbidden(anyhow::anyhow!(
                        "Team {} belongs to another user",
                        id
                    )));
                }
            }
            return Ok(ResolvedTeam {
                team,
                created: false,
            });
        }

        let email = email.ok_or_else(|| {
            AppError::BadRequest(anyhow::anyhow!("Either a user email or a team id is required"))
        })?;

        if let Some(team) = self.store.find_team_by_email(&email).await? {
            return Ok(ResolvedTeam {
                team,
                created: false,
            });
        }

        let (team_payload, members) = payload.ok_or_else(|| {
            AppError::NotFound(anyhow::anyhow!("No team registered for {}", email))
        })?;

        let team = self.build_team(&email, team_payload, members)?;
        let member_rows = build_members(team.id, None, members)?;

        match self.store.insert_team(&team, &member_rows).await {
            Ok(()) => {}
            // A concurrent submission for the same email won the insert.
            Err(AppError::Conflict(_)) => {
                let existing = self.store.find_team_by_email(&email).await?.ok_or_else(|| {
                    AppError::InternalError(anyhow::anyhow!("Team vanished after conflict"))
                })?;
                return Ok(ResolvedTeam {
                    team: existing,
                    created: false,
                });
            }
            Err(e) => return Err(e),
        }

        tracing::info!(team_id = %team.id, team_name = %team.team_name, "Team created");
        metrics::counter!("teams_created_total").increment(1);

        Ok(ResolvedTeam {
            team,
            created: true,
        })
    }

    fn build_team(
        &self,
        email: &str,
        payload: &TeamPayload,
        members: &[MemberPayload],
    ) -> Result<Team, AppError> {
        let team_name = required(&payload.team_name, "Team name")?;
        let institution = required(&payload.institution, "Institution")?;
        if members.is_empty() {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "At least one team member is required"
            )));
        }

        let leader = members
            .iter()
            .find(|m| {
                m.role
                    .as_deref()
                    .is_some_and(|r| r.trim().eq_ignore_ascii_case("leader"))
            })
            .unwrap_or(&members[0]);
        let leader_name = required(&leader.name, "Member name")?;
        let leader_email = required(&leader.email, "Member email")?;

        let now = Utc::now();
        Ok(Team {
            id: Uuid::new_v4(),
            user_email: email.to_string(),
            team_name: team_name.to_string(),
            institution: institution.to_string(),
            leader_name: leader_name.to_string(),
            leader_email: leader_email.to_lowercase(),
            leader_phone: leader.phone.clone(),
            contact_email: email.to_string(),
            contact_phone: payload.contact_phone.clone().or_else(|| leader.phone.clone()),
            robot_name: payload.robot_name.clone(),
            robot_weight: payload.robot_weight,
            robot_dimensions: payload.robot_dimensions.clone(),
            weapon_type: payload.weapon_type.clone(),
            status: TeamStatus::Pending,
            payment_status: PaymentStatus::Pending,
            payment_id: None,
            is_multi_competition: false,
            created_at: now,
            updated_at: now,
        })
    }
}
