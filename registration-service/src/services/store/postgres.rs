use super::{CompletedPayment, RegistrationFilter, RegistrationStore, TeamFilter};
use crate::models::{
    Bot, CompetitionRegistration, Contact, PaymentCallback, PaymentGatewayKind, Profile, Team,
    TeamMember, TeamStatus,
};
use async_trait::async_trait;
use service_core::error::AppError;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, QueryBuilder};
use std::time::Duration;
use uuid::Uuid;

const TEAM_COLUMNS: &str = "id, user_email, team_name, institution, leader_name, leader_email, \
     leader_phone, contact_email, contact_phone, robot_name, robot_weight, robot_dimensions, \
     weapon_type, status, payment_status, payment_id, is_multi_competition, created_at, updated_at";

const REGISTRATION_COLUMNS: &str = "id, team_id, competition_type, bot_id, amount, payment_id, \
     payment_status, registration_status, payment_gateway, payment_date, razorpay_payment_id, \
     phonepe_transaction_id, created_at, updated_at";

/// PostgreSQL-backed store.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(
        url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(5))
            .connect(url)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to connect to PostgreSQL");
                AppError::from(e)
            })?;

        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<(), AppError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        tracing::info!("Database migrations applied");
        Ok(())
    }
}

fn map_unique_violation(err: sqlx::Error, what: &str) -> AppError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            AppError::Conflict(anyhow::anyhow!("{} already exists", what))
        }
        _ => AppError::from(err),
    }
}

#[async_trait]
impl RegistrationStore for PgStore {
    async fn ping(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn insert_team(&self, team: &Team, members: &[TeamMember]) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r#"
            INSERT INTO teams (id, user_email, team_name, institution, leader_name, leader_email,
                leader_phone, contact_email, contact_phone, robot_name, robot_weight,
                robot_dimensions, weapon_type, status, payment_status, payment_id,
                is_multi_competition, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19)
            "#,
        )
        .bind(team.id)
        .bind(&team.user_email)
        .bind(&team.team_name)
        .bind(&team.institution)
        .bind(&team.leader_name)
        .bind(&team.leader_email)
        .bind(&team.leader_phone)
        .bind(&team.contact_email)
        .bind(&team.contact_phone)
        .bind(&team.robot_name)
        .bind(team.robot_weight)
        .bind(&team.robot_dimensions)
        .bind(&team.weapon_type)
        .bind(team.status.as_str())
        .bind(team.payment_status.as_str())
        .bind(&team.payment_id)
        .bind(team.is_multi_competition)
        .bind(team.created_at)
        .bind(team.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_unique_violation(e, "Team for this email"))?;

        for member in members {
            insert_member(&mut tx, member).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn get_team(&self, id: Uuid) -> Result<Option<Team>, AppError> {
        let team = sqlx::query_as::<_, Team>(&format!(
            "SELECT {} FROM teams WHERE id = $1",
            TEAM_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(team)
    }

    async fn find_team_by_email(&self, email: &str) -> Result<Option<Team>, AppError> {
        let team = sqlx::query_as::<_, Team>(&format!(
            r#"
            SELECT {} FROM teams
            WHERE LOWER(user_email) = LOWER($1) OR LOWER(contact_email) = LOWER($1)
            ORDER BY (LOWER(user_email) = LOWER($1)) DESC, created_at ASC
            LIMIT 1
            "#,
            TEAM_COLUMNS
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(team)
    }

    async fn find_team_by_payment_id(&self, payment_id: &str) -> Result<Option<Team>, AppError> {
        let team = sqlx::query_as::<_, Team>(&format!(
            "SELECT {} FROM teams WHERE payment_id = $1 LIMIT 1",
            TEAM_COLUMNS
        ))
        .bind(payment_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(team)
    }

    async fn set_team_payment_id(&self, team_id: Uuid, payment_id: &str) -> Result<(), AppError> {
        sqlx::query("UPDATE teams SET payment_id = $2, updated_at = NOW() WHERE id = $1")
            .bind(team_id)
            .bind(payment_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_team_multi_competition(
        &self,
        team_id: Uuid,
        multi: bool,
    ) -> Result<(), AppError> {
        sqlx::query(
            "UPDATE teams SET is_multi_competition = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(team_id)
        .bind(multi)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn complete_team_payment(&self, team_id: Uuid, confirm: bool) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE teams
            SET payment_status = 'COMPLETED',
                status = CASE WHEN $2 THEN 'CONFIRMED' ELSE status END,
                updated_at = NOW()
            WHERE id = $1 AND payment_status <> 'COMPLETED'
            "#,
        )
        .bind(team_id)
        .bind(confirm)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn update_team_status(
        &self,
        team_id: Uuid,
        status: TeamStatus,
    ) -> Result<Option<Team>, AppError> {
        let team = sqlx::query_as::<_, Team>(&format!(
            "UPDATE teams SET status = $2, updated_at = NOW() WHERE id = $1 RETURNING {}",
            TEAM_COLUMNS
        ))
        .bind(team_id)
        .bind(status.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(team)
    }

    async fn list_teams(&self, filter: &TeamFilter) -> Result<Vec<Team>, AppError> {
        let mut query: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {} FROM teams WHERE TRUE", TEAM_COLUMNS));
        if let Some(status) = filter.status {
            query.push(" AND status = ").push_bind(status.as_str());
        }
        if let Some(payment_status) = filter.payment_status {
            query
                .push(" AND payment_status = ")
                .push_bind(payment_status.as_str());
        }
        query.push(" ORDER BY created_at DESC");

        let teams = query
            .build_query_as::<Team>()
            .fetch_all(&self.pool)
            .await?;
        Ok(teams)
    }

    async fn replace_scoped_members(
        &self,
        registration_id: Uuid,
        members: &[TeamMember],
    ) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM team_members WHERE competition_registration_id = $1")
            .bind(registration_id)
            .execute(&mut *tx)
            .await?;
        for member in members {
            insert_member(&mut tx, member).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn list_members(&self, team_id: Uuid) -> Result<Vec<TeamMember>, AppError> {
        let members = sqlx::query_as::<_, TeamMember>(
            r#"
            SELECT id, team_id, competition_registration_id, name, email, phone, role, created_at
            FROM team_members WHERE team_id = $1 ORDER BY created_at ASC
            "#,
        )
        .bind(team_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(members)
    }

    async fn insert_bot(&self, bot: &Bot) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO bots (id, team_id, name, weight, dimensions, weapon_type, is_weapon_bot, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(bot.id)
        .bind(bot.team_id)
        .bind(&bot.name)
        .bind(bot.weight)
        .bind(&bot.dimensions)
        .bind(&bot.weapon_type)
        .bind(bot.is_weapon_bot)
        .bind(bot.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_bot(&self, id: Uuid) -> Result<Option<Bot>, AppError> {
        let bot = sqlx::query_as::<_, Bot>(
            r#"
            SELECT id, team_id, name, weight, dimensions, weapon_type, is_weapon_bot, created_at
            FROM bots WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(bot)
    }

    async fn list_bots(&self, team_id: Uuid) -> Result<Vec<Bot>, AppError> {
        let bots = sqlx::query_as::<_, Bot>(
            r#"
            SELECT id, team_id, name, weight, dimensions, weapon_type, is_weapon_bot, created_at
            FROM bots WHERE team_id = $1 ORDER BY created_at ASC
            "#,
        )
        .bind(team_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(bots)
    }

    async fn insert_registration(
        &self,
        registration: &CompetitionRegistration,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO competition_registrations (id, team_id, competition_type, bot_id, amount,
                payment_id, payment_status, registration_status, payment_gateway, payment_date,
                razorpay_payment_id, phonepe_transaction_id, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(registration.id)
        .bind(registration.team_id)
        .bind(registration.competition_type.as_str())
        .bind(registration.bot_id)
        .bind(registration.amount)
        .bind(&registration.payment_id)
        .bind(registration.payment_status.as_str())
        .bind(registration.registration_status.as_str())
        .bind(registration.payment_gateway.as_str())
        .bind(registration.payment_date)
        .bind(&registration.razorpay_payment_id)
        .bind(&registration.phonepe_transaction_id)
        .bind(registration.created_at)
        .bind(registration.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_unique_violation(e, "Combat registration for this bot"))?;
        Ok(())
    }

    async fn find_combat_registration(
        &self,
        team_id: Uuid,
        bot_id: Uuid,
    ) -> Result<Option<CompetitionRegistration>, AppError> {
        let registration = sqlx::query_as::<_, CompetitionRegistration>(&format!(
            r#"
            SELECT {} FROM competition_registrations
            WHERE team_id = $1 AND bot_id = $2 AND competition_type = 'ROBOWARS'
            "#,
            REGISTRATION_COLUMNS
        ))
        .bind(team_id)
        .bind(bot_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(registration)
    }

    async fn reset_registration_payment(
        &self,
        registration_id: Uuid,
        payment_id: &str,
        amount: i64,
        gateway: PaymentGatewayKind,
    ) -> Result<Option<CompetitionRegistration>, AppError> {
        let registration = sqlx::query_as::<_, CompetitionRegistration>(&format!(
            r#"
            UPDATE competition_registrations
            SET payment_id = $2, amount = $3, payment_gateway = $4,
                payment_status = 'PENDING', registration_status = 'PENDING', updated_at = NOW()
            WHERE id = $1 AND payment_status <> 'COMPLETED'
            RETURNING {}
            "#,
            REGISTRATION_COLUMNS
        ))
        .bind(registration_id)
        .bind(payment_id)
        .bind(amount)
        .bind(gateway.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(registration)
    }

    async fn list_registrations(
        &self,
        filter: &RegistrationFilter,
    ) -> Result<Vec<CompetitionRegistration>, AppError> {
        let mut query: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            "SELECT {} FROM competition_registrations WHERE TRUE",
            REGISTRATION_COLUMNS
        ));
        if let Some(team_id) = filter.team_id {
            query.push(" AND team_id = ").push_bind(team_id);
        }
        if let Some(competition) = filter.competition_type {
            query
                .push(" AND competition_type = ")
                .push_bind(competition.as_str());
        }
        if let Some(payment_status) = filter.payment_status {
            query
                .push(" AND payment_status = ")
                .push_bind(payment_status.as_str());
        }
        query.push(" ORDER BY created_at ASC");

        let registrations = query
            .build_query_as::<CompetitionRegistration>()
            .fetch_all(&self.pool)
            .await?;
        Ok(registrations)
    }

    async fn list_registrations_by_payment_id(
        &self,
        payment_id: &str,
    ) -> Result<Vec<CompetitionRegistration>, AppError> {
        let registrations = sqlx::query_as::<_, CompetitionRegistration>(&format!(
            "SELECT {} FROM competition_registrations WHERE payment_id = $1 ORDER BY created_at ASC",
            REGISTRATION_COLUMNS
        ))
        .bind(payment_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(registrations)
    }

    async fn rebind_payment_id(&self, from: &str, to: &str) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE competition_registrations
            SET payment_id = $2, updated_at = NOW()
            WHERE payment_id = $1 AND payment_status <> 'COMPLETED'
            "#,
        )
        .bind(from)
        .bind(to)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn complete_registrations(
        &self,
        payment_id: &str,
        payment: &CompletedPayment,
    ) -> Result<Vec<CompetitionRegistration>, AppError> {
        let registrations = sqlx::query_as::<_, CompetitionRegistration>(&format!(
            r#"
            UPDATE competition_registrations
            SET payment_status = 'COMPLETED',
                registration_status = 'CONFIRMED',
                payment_date = $2,
                razorpay_payment_id = COALESCE($3, razorpay_payment_id),
                phonepe_transaction_id = COALESCE($4, phonepe_transaction_id),
                updated_at = NOW()
            WHERE payment_id = $1 AND payment_status <> 'COMPLETED'
            RETURNING {}
            "#,
            REGISTRATION_COLUMNS
        ))
        .bind(payment_id)
        .bind(payment.paid_at)
        .bind(payment.razorpay_payment_id())
        .bind(payment.phonepe_transaction_id())
        .fetch_all(&self.pool)
        .await?;

        Ok(registrations)
    }

    async fn insert_contact(&self, contact: &Contact) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO contacts (id, name, email, phone, subject, message, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(contact.id)
        .bind(&contact.name)
        .bind(&contact.email)
        .bind(&contact.phone)
        .bind(&contact.subject)
        .bind(&contact.message)
        .bind(contact.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_contacts(&self) -> Result<Vec<Contact>, AppError> {
        let contacts = sqlx::query_as::<_, Contact>(
            "SELECT id, name, email, phone, subject, message, created_at FROM contacts ORDER BY created_at DESC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(contacts)
    }

    async fn get_profile(&self, email: &str) -> Result<Option<Profile>, AppError> {
        let profile = sqlx::query_as::<_, Profile>(
            "SELECT email, name, phone, institution, updated_at FROM profiles WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(profile)
    }

    async fn upsert_profile(&self, profile: &Profile) -> Result<Profile, AppError> {
        let stored = sqlx::query_as::<_, Profile>(
            r#"
            INSERT INTO profiles (email, name, phone, institution, updated_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (email) DO UPDATE
            SET name = EXCLUDED.name, phone = EXCLUDED.phone,
                institution = EXCLUDED.institution, updated_at = EXCLUDED.updated_at
            RETURNING email, name, phone, institution, updated_at
            "#,
        )
        .bind(&profile.email)
        .bind(&profile.name)
        .bind(&profile.phone)
        .bind(&profile.institution)
        .bind(profile.updated_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(stored)
    }

    async fn record_callback(&self, callback: &PaymentCallback) -> Result<bool, AppError> {
        // The CTE reads the log as it was before this insert.
        let seen = sqlx::query_scalar::<_, bool>(
            r#"
            WITH prior AS (
                SELECT EXISTS (
                    SELECT 1 FROM payment_callbacks
                    WHERE gateway = $2 AND order_ref = $3 AND event = $4
                ) AS seen
            )
            INSERT INTO payment_callbacks (id, gateway, order_ref, event, raw_body, received_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING (SELECT seen FROM prior)
            "#,
        )
        .bind(callback.id)
        .bind(callback.gateway.as_str())
        .bind(&callback.order_ref)
        .bind(&callback.event)
        .bind(&callback.raw_body)
        .bind(callback.received_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(!seen)
    }
}

async fn insert_member(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    member: &TeamMember,
) -> Result<(), AppError> {
    sqlx::query(
        r#"
        INSERT INTO team_members (id, team_id, competition_registration_id, name, email, phone, role, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(member.id)
    .bind(member.team_id)
    .bind(member.competition_registration_id)
    .bind(&member.name)
    .bind(&member.email)
    .bind(&member.phone)
    .bind(&member.role)
    .bind(member.created_at)
    .execute(&mut **tx)
    .await?;
    Ok(())
}
