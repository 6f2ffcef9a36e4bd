//! Writes bots, competition registrations and competition-scoped members for
//! one order.
//!
//! Every entry is validated before the first write. Combat entries are unique
//! per (team, bot) and are updated in place on resubmission; race and soccer
//! entries are inserted fresh each time.

use crate::dtos::{BotPayload, CompetitionEntry};
use crate::models::{
    Bot, CompetitionRegistration, CompetitionType, PaymentGatewayKind, PaymentStatus,
    RegistrationStatus, Team, TeamMember,
};
use crate::services::pricing::{
    display_name, max_weight_of, price_of, requires_weapon, validate_dimensions, validate_weight,
};
use crate::services::store::{RegistrationFilter, RegistrationStore};
use crate::services::team_resolver::build_members;
use chrono::Utc;
use service_core::error::AppError;
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct WriteOutcome {
    pub registrations: Vec<CompetitionRegistration>,
    /// Whole rupees.
    pub total_amount: i64,
}

#[derive(Debug)]
enum BotPlan {
    None,
    Existing(Bot),
    New(Bot),
}

impl BotPlan {
    fn id(&self) -> Option<Uuid> {
        match self {
            BotPlan::None => None,
            BotPlan::Existing(bot) | BotPlan::New(bot) => Some(bot.id),
        }
    }
}

#[derive(Debug)]
struct PlannedEntry {
    competition_type: CompetitionType,
    amount: i64,
    bot: BotPlan,
    /// Combat row to update in place.
    existing: Option<CompetitionRegistration>,
    members: Vec<TeamMember>,
}

#[derive(Clone)]
pub struct RegistrationWriter {
    store: Arc<dyn RegistrationStore>,
}

impl RegistrationWriter {
    pub fn new(store: Arc<dyn RegistrationStore>) -> Self {
        Self { store }
    }

    #[tracing::instrument(skip(self, team, competitions), fields(team_id = %team.id, entries = competitions.len()))]
    pub async fn write_registrations(
        &self,
        team: &Team,
        competitions: &[CompetitionEntry],
        payment_id: &str,
        gateway: PaymentGatewayKind,
    ) -> Result<WriteOutcome, AppError> {
        let plan = self.plan(Some(team), competitions).await?;
        let total_amount: i64 = plan.iter().map(|p| p.amount).sum();

        let mut registrations = Vec::with_capacity(plan.len());
        for entry in plan {
            registrations.push(self.apply(team, entry, payment_id, gateway).await?);
        }

        self.refresh_multi_competition(team).await?;

        tracing::info!(
            payment_id,
            total_amount,
            registrations = registrations.len(),
            "Registrations written"
        );

        Ok(WriteOutcome {
            registrations,
            total_amount,
        })
    }

    /// Checks what does not depend on the team: fees, robot fields, weight
    /// ceilings, weapons and rosters. Runs before the team is created so a
    /// rejected order leaves nothing behind.
    pub async fn validate(&self, competitions: &[CompetitionEntry]) -> Result<(), AppError> {
        self.plan(None, competitions).await.map(|_| ())
    }

    /// Validates every entry and resolves the rows it will touch. Read-only.
    /// Ownership and existing combat rows are only checked when `team` is known.
    async fn plan(
        &self,
        team: Option<&Team>,
        competitions: &[CompetitionEntry],
    ) -> Result<Vec<PlannedEntry>, AppError> {
        if competitions.is_empty() {
            return Err(AppError::invalid_field(
                "competitions",
                "required",
                "Select at least one competition".to_string(),
            ));
        }

        let team_id = team.map_or_else(Uuid::nil, |t| t.id);
        let mut combat_bots = HashSet::new();
        let mut plan = Vec::with_capacity(competitions.len());

        for entry in competitions {
            let competition = entry.competition_type;
            let price = price_of(competition);
            let amount = entry.amount.unwrap_or(price);
            if amount != price {
                return Err(AppError::invalid_field(
                    "amount",
                    "amount_mismatch",
                    format!(
                        "{} costs {}, got {}",
                        display_name(competition),
                        price,
                        amount
                    ),
                ));
            }

            let bot = match &entry.bot {
                Some(payload) => self.plan_bot(team, competition, payload).await?,
                None => BotPlan::None,
            };

            let mut existing = None;
            if competition == CompetitionType::Robowars {
                let bot_id = bot.id().ok_or_else(|| {
                    AppError::invalid_field(
                        "bot",
                        "required",
                        format!("{} requires robot details", display_name(competition)),
                    )
                })?;
                if !combat_bots.insert(bot_id) {
                    return Err(AppError::invalid_field(
                        "bot",
                        "duplicate",
                        "The same robot cannot enter RoboWars twice in one order".to_string(),
                    ));
                }
                if let (BotPlan::Existing(_), Some(team)) = (&bot, team) {
                    existing = self.store.find_combat_registration(team.id, bot_id).await?;
                    if existing.as_ref().is_some_and(|r| r.is_completed()) {
                        return Err(AppError::Conflict(anyhow::anyhow!(
                            "This robot is already registered and paid for {}",
                            display_name(competition)
                        )));
                    }
                }
            }

            let members = build_members(team_id, Some(Uuid::nil()), &entry.members)?;

            plan.push(PlannedEntry {
                competition_type: competition,
                amount,
                bot,
                existing,
                members,
            });
        }

        let total_amount: i64 = plan.iter().map(|p| p.amount).sum();
        if total_amount <= 0 {
            return Err(AppError::InvalidAmount(format!(
                "total must be positive, got {}",
                total_amount
            )));
        }

        Ok(plan)
    }

    async fn plan_bot(
        &self,
        team: Option<&Team>,
        competition: CompetitionType,
        payload: &BotPayload,
    ) -> Result<BotPlan, AppError> {
        if let Some(id) = payload.id {
            if let Some(bot) = self.store.get_bot(id).await? {
                if team.is_some_and(|t| bot.team_id != t.id) {
                    return Err(AppError::Forbidden(anyhow::anyhow!(
                        "Robot {} belongs to another team",
                        id
                    )));
                }
                check_bot(competition, bot.weight, bot.weapon_type.as_deref())?;
                return Ok(BotPlan::Existing(bot));
            }
            if !payload.has_robot_fields() {
                return Err(AppError::NotFound(anyhow::anyhow!("Robot {} not found", id)));
            }
        } else if !payload.has_robot_fields() {
            return Ok(BotPlan::None);
        }

        let name = payload
            .name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .ok_or_else(|| {
                AppError::invalid_field("bot_name", "required", "Robot name is required".to_string())
            })?;
        let weight = payload.weight.ok_or_else(|| {
            AppError::invalid_field("weight", "required", "Robot weight is required".to_string())
        })?;
        let dimensions = payload
            .dimensions
            .as_deref()
            .map(str::trim)
            .filter(|d| validate_dimensions(d))
            .ok_or_else(|| {
                AppError::invalid_field(
                    "dimensions",
                    "invalid_dimensions",
                    "Dimensions must look like 40x30x20".to_string(),
                )
            })?;
        let weapon_type = payload
            .weapon_type
            .as_deref()
            .map(str::trim)
            .filter(|w| !w.is_empty());
        check_bot(competition, weight, weapon_type)?;

        Ok(BotPlan::New(Bot {
            id: payload.id.unwrap_or_else(Uuid::new_v4),
            team_id: team.map_or_else(Uuid::nil, |t| t.id),
            name: name.to_string(),
            weight,
            dimensions: dimensions.to_string(),
            weapon_type: weapon_type.map(str::to_string),
            is_weapon_bot: weapon_type.is_some(),
            created_at: Utc::now(),
        }))
    }

    async fn apply(
        &self,
        team: &Team,
        entry: PlannedEntry,
        payment_id: &str,
        gateway: PaymentGatewayKind,
    ) -> Result<CompetitionRegistration, AppError> {
        let bot_id = entry.bot.id();
        if let BotPlan::New(bot) = &entry.bot {
            self.store.insert_bot(bot).await?;
        }

        let registration = match entry.existing {
            Some(row) => self
                .store
                .reset_registration_payment(row.id, payment_id, entry.amount, gateway)
                .await?
                .ok_or_else(|| {
                    AppError::Conflict(anyhow::anyhow!(
                        "Registration {} was completed concurrently",
                        row.id
                    ))
                })?,
            None => {
                let now = Utc::now();
                let row = CompetitionRegistration {
                    id: Uuid::new_v4(),
                    team_id: team.id,
                    competition_type: entry.competition_type,
                    bot_id,
                    amount: entry.amount,
                    payment_id: Some(payment_id.to_string()),
                    payment_status: PaymentStatus::Pending,
                    registration_status: RegistrationStatus::Pending,
                    payment_gateway: gateway,
                    payment_date: None,
                    razorpay_payment_id: None,
                    phonepe_transaction_id: None,
                    created_at: now,
                    updated_at: now,
                };
                self.store.insert_registration(&row).await?;
                row
            }
        };

        if !entry.members.is_empty() {
            let members: Vec<TeamMember> = entry
                .members
                .into_iter()
                .map(|m| TeamMember {
                    competition_registration_id: Some(registration.id),
                    ..m
                })
                .collect();
            self.store
                .replace_scoped_members(registration.id, &members)
                .await?;
        }

        Ok(registration)
    }

    async fn refresh_multi_competition(&self, team: &Team) -> Result<(), AppError> {
        let rows = self
            .store
            .list_registrations(&RegistrationFilter {
                team_id: Some(team.id),
                ..Default::default()
            })
            .await?;
        let kinds: HashSet<CompetitionType> = rows.iter().map(|r| r.competition_type).collect();
        let multi = kinds.len() > 1 || rows.len() > 1;

        if multi && !team.is_multi_competition {
            self.store.set_team_multi_competition(team.id, true).await?;
        }
        Ok(())
    }
}

fn check_bot(
    competition: CompetitionType,
    weight: f64,
    weapon_type: Option<&str>,
) -> Result<(), AppError> {
    if !validate_weight(weight, competition) {
        return Err(AppError::invalid_field(
            "weight",
            "max_weight",
            format!(
                "{} robots must weigh more than 0 and at most {} kg, got {}",
                display_name(competition),
                max_weight_of(competition),
                weight
            ),
        ));
    }
    if requires_weapon(competition) && weapon_type.is_none_or(|w| w.trim().is_empty()) {
        return Err(AppError::invalid_field(
            "weapon_type",
            "required",
            format!("{} robots must declare a weapon", display_name(competition)),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dtos::MemberPayload;
    use crate::models::TeamStatus;
    use crate::services::store::InMemoryStore;

    async fn setup() -> (Arc<InMemoryStore>, RegistrationWriter, Team) {
        let store = Arc::new(InMemoryStore::new());
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
            payment_id: None,
            is_multi_competition: false,
            created_at: now,
            updated_at: now,
        };
        store.insert_team(&team, &[]).await.unwrap();
        (store.clone(), RegistrationWriter::new(store), team)
    }

    fn combat(bot_id: Uuid) -> CompetitionEntry {
        CompetitionEntry {
            competition_type: CompetitionType::Robowars,
            amount: Some(300),
            bot: Some(BotPayload {
                id: Some(bot_id),
                name: Some("Crusher".to_string()),
                weight: Some(7.5),
                dimensions: Some("40x30x20".to_string()),
                weapon_type: Some("spinner".to_string()),
            }),
            members: vec![],
        }
    }

    fn race(bot: Option<BotPayload>) -> CompetitionEntry {
        CompetitionEntry {
            competition_type: CompetitionType::Roborace,
            amount: Some(200),
            bot,
            members: vec![],
        }
    }

    fn race_bot(weight: f64) -> BotPayload {
        BotPayload {
            id: None,
            name: Some("Dash".to_string()),
            weight: Some(weight),
            dimensions: Some("20x15x10".to_string()),
            weapon_type: None,
        }
    }

    #[tokio::test]
    async fn totals_amounts_and_marks_team_multi_competition() {
        let (store, writer, team) = setup().await;

        let outcome = writer
            .write_registrations(
                &team,
                &[combat(Uuid::new_v4()), race(Some(race_bot(4.0)))],
                "RM1",
                PaymentGatewayKind::Razorpay,
            )
            .await
            .unwrap();

        assert_eq!(outcome.total_amount, 500);
        assert_eq!(outcome.registrations.len(), 2);
        assert!(outcome
            .registrations
            .iter()
            .all(|r| r.payment_status == PaymentStatus::Pending
                && r.registration_status == RegistrationStatus::Pending));
        assert_eq!(store.list_bots(team.id).await.unwrap().len(), 2);
        assert!(store.get_team(team.id).await.unwrap().unwrap().is_multi_competition);
    }

    #[tokio::test]
    async fn empty_list_is_a_validation_error() {
        let (_, writer, team) = setup().await;
        let err = writer
            .write_registrations(&team, &[], "RM1", PaymentGatewayKind::Razorpay)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));
    }

    #[tokio::test]
    async fn combat_resubmission_updates_in_place() {
        let (store, writer, team) = setup().await;
        let bot_id = Uuid::new_v4();

        writer
            .write_registrations(&team, &[combat(bot_id)], "RM1", PaymentGatewayKind::Razorpay)
            .await
            .unwrap();
        let second = writer
            .write_registrations(&team, &[combat(bot_id)], "RM2", PaymentGatewayKind::Phonepe)
            .await
            .unwrap();

        let rows = store
            .list_registrations(&RegistrationFilter {
                team_id: Some(team.id),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, second.registrations[0].id);
        assert_eq!(rows[0].payment_id.as_deref(), Some("RM2"));
        assert_eq!(rows[0].payment_gateway, PaymentGatewayKind::Phonepe);
    }

    #[tokio::test]
    async fn race_resubmission_inserts_again() {
        let (store, writer, team) = setup().await;
        let first = writer
            .write_registrations(&team, &[race(Some(race_bot(4.0)))], "RM1", PaymentGatewayKind::Razorpay)
            .await
            .unwrap();
        let bot_id = first.registrations[0].bot_id;

        let reuse = BotPayload {
            id: bot_id,
            ..Default::default()
        };
        writer
            .write_registrations(&team, &[race(Some(reuse))], "RM2", PaymentGatewayKind::Razorpay)
            .await
            .unwrap();

        let rows = store
            .list_registrations(&RegistrationFilter {
                team_id: Some(team.id),
                competition_type: Some(CompetitionType::Roborace),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.bot_id == bot_id));
    }

    #[tokio::test]
    async fn invalid_entry_prevents_all_writes() {
        let (store, writer, team) = setup().await;

        let err = writer
            .write_registrations(
                &team,
                &[combat(Uuid::new_v4()), race(Some(race_bot(5.01)))],
                "RM1",
                PaymentGatewayKind::Razorpay,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::ValidationError(_)));
        assert!(store.list_bots(team.id).await.unwrap().is_empty());
        assert!(store
            .list_registrations(&RegistrationFilter::default())
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn validation_needs_no_team_and_writes_nothing() {
        let (store, writer, team) = setup().await;

        writer
            .validate(&[combat(Uuid::new_v4()), race(Some(race_bot(5.0)))])
            .await
            .unwrap();
        let err = writer.validate(&[race(Some(race_bot(5.01)))]).await.unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));
        let err = writer.validate(&[]).await.unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));

        assert!(store.list_bots(team.id).await.unwrap().is_empty());
        assert!(store.list_bots(Uuid::nil()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn amount_must_match_entry_fee() {
        let (_, writer, team) = setup().await;
        let mut entry = race(None);
        entry.amount = Some(1);

        let err = writer
            .write_registrations(&team, &[entry], "RM1", PaymentGatewayKind::Razorpay)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));
    }

    #[tokio::test]
    async fn combat_without_weapon_is_rejected() {
        let (_, writer, team) = setup().await;
        let mut entry = combat(Uuid::new_v4());
        if let Some(bot) = entry.bot.as_mut() {
            bot.weapon_type = None;
        }

        let err = writer
            .write_registrations(&team, &[entry], "RM1", PaymentGatewayKind::Razorpay)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));
    }

    #[tokio::test]
    async fn paid_combat_entry_is_not_reopened() {
        let (store, writer, team) = setup().await;
        let bot_id = Uuid::new_v4();
        writer
            .write_registrations(&team, &[combat(bot_id)], "RM1", PaymentGatewayKind::Razorpay)
            .await
            .unwrap();
        store
            .complete_registrations(
                "RM1",
                &crate::services::store::CompletedPayment {
                    gateway: PaymentGatewayKind::Razorpay,
                    transaction_id: Some("pay_1".to_string()),
                    paid_at: Utc::now(),
                },
            )
            .await
            .unwrap();

        let err = writer
            .write_registrations(&team, &[combat(bot_id)], "RM2", PaymentGatewayKind::Razorpay)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn scoped_members_are_replaced_on_retry() {
        let (store, writer, team) = setup().await;
        let bot_id = Uuid::new_v4();
        let mut entry = combat(bot_id);
        entry.members = vec![MemberPayload {
            name: Some("Ravi".to_string()),
            email: Some("ravi@x.com".to_string()),
            phone: None,
            role: Some("driver".to_string()),
        }];

        writer
            .write_registrations(&team, &[entry.clone()], "RM1", PaymentGatewayKind::Razorpay)
            .await
            .unwrap();
        writer
            .write_registrations(&team, &[entry], "RM2", PaymentGatewayKind::Razorpay)
            .await
            .unwrap();

        let members = store.list_members(team.id).await.unwrap();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].role, "DRIVER");
        assert!(members[0].competition_registration_id.is_some());
    }
}
