use crate::models::{
    Bot, CompetitionRegistration, CompetitionType, PaymentGatewayKind, PaymentStatus, Team,
    TeamMember, TeamStatus,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Team details supplied on first registration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TeamPayload {
    pub team_name: Option<String>,
    pub institution: Option<String>,
    pub contact_phone: Option<String>,
    /// Legacy single-robot fields.
    pub robot_name: Option<String>,
    pub robot_weight: Option<f64>,
    pub robot_dimensions: Option<String>,
    pub weapon_type: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MemberPayload {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    /// Defaults to `LEADER` for the first team member and `MEMBER` otherwise.
    pub role: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateRegistrationRequest {
    pub team: TeamPayload,
    #[serde(default)]
    pub members: Vec<MemberPayload>,
}

#[derive(Debug, Serialize)]
pub struct CreateRegistrationResponse {
    pub team_id: Uuid,
    /// `false` when an existing team was returned.
    pub created: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BotPayload {
    /// Reuses this bot when it exists; otherwise a new bot is created under this id.
    pub id: Option<Uuid>,
    pub name: Option<String>,
    pub weight: Option<f64>,
    pub dimensions: Option<String>,
    pub weapon_type: Option<String>,
}

impl BotPayload {
    pub fn has_robot_fields(&self) -> bool {
        self.name.is_some()
            || self.weight.is_some()
            || self.dimensions.is_some()
            || self.weapon_type.is_some()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CompetitionEntry {
    pub competition_type: CompetitionType,
    /// Whole rupees. Must equal the entry fee when supplied.
    pub amount: Option<i64>,
    pub bot: Option<BotPayload>,
    #[serde(default)]
    pub members: Vec<MemberPayload>,
}

#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub team_id: Option<Uuid>,
    /// Creates the team when the caller has none yet.
    pub team: Option<TeamPayload>,
    #[serde(default)]
    pub members: Vec<MemberPayload>,
    pub gateway: Option<PaymentGatewayKind>,
    #[serde(default)]
    pub competitions: Vec<CompetitionEntry>,
}

#[derive(Debug, Serialize)]
pub struct CreateOrderResponse {
    pub order_ref: String,
    pub merchant_order_id: String,
    pub provider_order_id: String,
    pub gateway: PaymentGatewayKind,
    pub team_id: Uuid,
    /// Whole rupees.
    pub total_amount: i64,
    /// Paise.
    pub amount_minor: i64,
    pub currency: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub razorpay_key_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkout_token: Option<String>,
    pub expire_at: Option<DateTime<Utc>>,
    pub registrations: Vec<CompetitionRegistration>,
}

/// Sent by the Razorpay checkout handler after the buyer pays.
#[derive(Debug, Deserialize, Validate)]
pub struct VerifyPaymentRequest {
    #[validate(length(min = 1, message = "Order reference is required"))]
    pub razorpay_order_id: String,
    #[validate(length(min = 1, message = "Payment id is required"))]
    pub razorpay_payment_id: String,
    #[validate(length(min = 1, message = "Signature is required"))]
    pub razorpay_signature: String,
}

#[derive(Debug, Deserialize)]
pub struct PaymentStatusQuery {
    pub order_ref: String,
    pub gateway: Option<PaymentGatewayKind>,
}

#[derive(Debug, Deserialize)]
pub struct PhonePeRedirectQuery {
    pub merchant_order_id: String,
}

#[derive(Debug, Serialize)]
pub struct TeamDetail {
    #[serde(flatten)]
    pub team: Team,
    pub members: Vec<TeamMember>,
    pub bots: Vec<Bot>,
    pub registrations: Vec<CompetitionRegistration>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ContactRequest {
    #[validate(length(min = 1, max = 200, message = "Name is required"))]
    pub name: String,
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
    pub phone: Option<String>,
    #[validate(length(min = 1, max = 200, message = "Subject is required"))]
    pub subject: String,
    #[validate(length(min = 1, max = 5000, message = "Message is required"))]
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ContactResponse {
    pub id: Uuid,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateProfileRequest {
    #[validate(length(min = 1, max = 200, message = "Name is required"))]
    pub name: String,
    #[validate(length(min = 6, max = 20, message = "Invalid phone number"))]
    pub phone: Option<String>,
    pub institution: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TeamListQuery {
    pub status: Option<TeamStatus>,
    pub payment_status: Option<PaymentStatus>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RegistrationListQuery {
    pub competition_type: Option<CompetitionType>,
    pub payment_status: Option<PaymentStatus>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateTeamStatusRequest {
    pub status: TeamStatus,
}

#[derive(Debug, Serialize)]
pub struct CompetitionStats {
    pub competition_type: CompetitionType,
    pub display_name: String,
    pub registrations: usize,
    pub confirmed: usize,
    /// Whole rupees from confirmed registrations.
    pub confirmed_revenue: i64,
}

#[derive(Debug, Default, Serialize)]
pub struct DashboardStats {
    pub total_teams: usize,
    pub teams_by_status: std::collections::BTreeMap<String, usize>,
    pub teams_by_payment_status: std::collections::BTreeMap<String, usize>,
    pub total_registrations: usize,
    pub pending_registrations: usize,
    pub confirmed_revenue: i64,
    pub competitions: Vec<CompetitionStats>,
}

#[derive(Debug, Serialize)]
pub struct ReminderResponse {
    pub teams_notified: usize,
}
