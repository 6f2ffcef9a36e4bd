use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
#[error("unknown {kind} value: {value}")]
pub struct UnknownVariant {
    kind: &'static str,
    value: String,
}

/// Implements `as_str`, `Display`, `FromStr` and `TryFrom<String>` for a
/// unit-only enum stored as TEXT.
macro_rules! text_enum {
    ($name:ident, $kind:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_ascii_uppercase().as_str() {
                    $($text => Ok($name::$variant),)+
                    _ => Err(UnknownVariant {
                        kind: $kind,
                        value: s.to_string(),
                    }),
                }
            }
        }

        impl TryFrom<String> for $name {
            type Error = UnknownVariant;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                value.parse()
            }
        }
    };
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TeamStatus {
    Pending,
    Approved,
    Confirmed,
    Rejected,
    Waitlisted,
}

text_enum!(TeamStatus, "team status", {
    Pending => "PENDING",
    Approved => "APPROVED",
    Confirmed => "CONFIRMED",
    Rejected => "REJECTED",
    Waitlisted => "WAITLISTED",
});

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
}

text_enum!(PaymentStatus, "payment status", {
    Pending => "PENDING",
    Completed => "COMPLETED",
    Failed => "FAILED",
});

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RegistrationStatus {
    Pending,
    Confirmed,
}

text_enum!(RegistrationStatus, "registration status", {
    Pending => "PENDING",
    Confirmed => "CONFIRMED",
});

/// The three competitions of the event.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CompetitionType {
    /// Combat.
    Robowars,
    Roborace,
    Robosoccer,
}

text_enum!(CompetitionType, "competition type", {
    Robowars => "ROBOWARS",
    Roborace => "ROBORACE",
    Robosoccer => "ROBOSOCCER",
});

impl CompetitionType {
    pub const ALL: [CompetitionType; 3] = [
        CompetitionType::Robowars,
        CompetitionType::Roborace,
        CompetitionType::Robosoccer,
    ];
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentGatewayKind {
    Razorpay,
    Phonepe,
}

text_enum!(PaymentGatewayKind, "payment gateway", {
    Razorpay => "RAZORPAY",
    Phonepe => "PHONEPE",
});

#[derive(Debug, Serialize, Deserialize, Clone, FromRow)]
pub struct Team {
    pub id: Uuid,
    pub user_email: String,
    pub team_name: String,
    pub institution: String,
    pub leader_name: String,
    pub leader_email: String,
    pub leader_phone: Option<String>,
    pub contact_email: String,
    pub contact_phone: Option<String>,
    pub robot_name: Option<String>,
    pub robot_weight: Option<f64>,
    pub robot_dimensions: Option<String>,
    pub weapon_type: Option<String>,
    #[sqlx(try_from = "String")]
    pub status: TeamStatus,
    #[sqlx(try_from = "String")]
    pub payment_status: PaymentStatus,
    pub payment_id: Option<String>,
    pub is_multi_competition: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Team {
    /// Matches the owning account, or the legacy contact email.
    pub fn is_owned_by(&self, email: &str) -> bool {
        self.user_email.eq_ignore_ascii_case(email) || self.contact_email.eq_ignore_ascii_case(email)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, FromRow)]
pub struct TeamMember {
    pub id: Uuid,
    pub team_id: Uuid,
    /// `None` for team-wide members.
    pub competition_registration_id: Option<Uuid>,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub role: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone, FromRow)]
pub struct Bot {
    pub id: Uuid,
    pub team_id: Uuid,
    pub name: String,
    /// Kilograms.
    pub weight: f64,
    pub dimensions: String,
    pub weapon_type: Option<String>,
    pub is_weapon_bot: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone, FromRow)]
pub struct CompetitionRegistration {
    pub id: Uuid,
    pub team_id: Uuid,
    #[sqlx(try_from = "String")]
    pub competition_type: CompetitionType,
    pub bot_id: Option<Uuid>,
    /// Whole rupees.
    pub amount: i64,
    pub payment_id: Option<String>,
    #[sqlx(try_from = "String")]
    pub payment_status: PaymentStatus,
    #[sqlx(try_from = "String")]
    pub registration_status: RegistrationStatus,
    #[sqlx(try_from = "String")]
    pub payment_gateway: PaymentGatewayKind,
    pub payment_date: Option<DateTime<Utc>>,
    pub razorpay_payment_id: Option<String>,
    pub phonepe_transaction_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CompetitionRegistration {
    pub fn is_completed(&self) -> bool {
        self.payment_status == PaymentStatus::Completed
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, FromRow)]
pub struct Contact {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub subject: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone, FromRow)]
pub struct Profile {
    pub email: String,
    pub name: String,
    pub phone: Option<String>,
    pub institution: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Audit row for an accepted gateway callback.
#[derive(Debug, Serialize, Deserialize, Clone, FromRow)]
pub struct PaymentCallback {
    pub id: Uuid,
    #[sqlx(try_from = "String")]
    pub gateway: PaymentGatewayKind,
    pub order_ref: String,
    pub event: String,
    pub raw_body: String,
    pub received_at: DateTime<Utc>,
}
