//! Common types used across UserLab

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// Sentinel meaning "no limit" in plan limit tables
pub const UNLIMITED: i64 = -1;

// =============================================================================
// Plans and limits
// =============================================================================

/// Subscription plan tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PlanTier {
    Free,
    Basic,
    Pro,
    Enterprise,
}

impl Default for PlanTier {
    fn default() -> Self {
        Self::Free
    }
}

impl PlanTier {
    /// Fixed per-plan limit table. `UNLIMITED` (-1) means no limit.
    pub fn limits(&self) -> PlanLimits {
        match self {
            Self::Free => PlanLimits {
                studies: 2,
                participants: 50,
                recordings: 10,
                storage_mb: 500,
                collaborators: 1,
                api_calls: 1_000,
            },
            Self::Basic => PlanLimits {
                studies: 10,
                participants: 500,
                recordings: 100,
                storage_mb: 5_000,
                collaborators: 3,
                api_calls: 10_000,
            },
            Self::Pro => PlanLimits {
                studies: 50,
                participants: 2_500,
                recordings: 1_000,
                storage_mb: 50_000,
                collaborators: 10,
                api_calls: 100_000,
            },
            Self::Enterprise => PlanLimits {
                studies: UNLIMITED,
                participants: UNLIMITED,
                recordings: UNLIMITED,
                storage_mb: UNLIMITED,
                collaborators: UNLIMITED,
                api_calls: UNLIMITED,
            },
        }
    }

    /// Feature-name allowlist for this plan
    pub fn features(&self) -> &'static [&'static str] {
        match self {
            Self::Free => &["api_access"],
            Self::Basic => &["api_access", "screen_recording", "data_export"],
            Self::Pro => &[
                "api_access",
                "screen_recording",
                "data_export",
                "advanced_analytics",
                "custom_branding",
            ],
            Self::Enterprise => &[
                "api_access",
                "screen_recording",
                "data_export",
                "advanced_analytics",
                "custom_branding",
                "priority_support",
                "dedicated_support",
            ],
        }
    }

    pub fn includes_feature(&self, name: &str) -> bool {
        self.features().contains(&name)
    }

    /// Trial length in days when a subscription starts on this plan
    pub fn trial_days(&self) -> i64 {
        match self {
            Self::Free => 0,
            Self::Basic | Self::Pro => 14,
            Self::Enterprise => 30,
        }
    }
}

impl std::fmt::Display for PlanTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Free => write!(f, "free"),
            Self::Basic => write!(f, "basic"),
            Self::Pro => write!(f, "pro"),
            Self::Enterprise => write!(f, "enterprise"),
        }
    }
}

impl std::str::FromStr for PlanTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "free" => Ok(Self::Free),
            "basic" => Ok(Self::Basic),
            "pro" => Ok(Self::Pro),
            "enterprise" => Ok(Self::Enterprise),
            _ => Err(format!("Invalid plan tier: {}", s)),
        }
    }
}

/// Per-plan limit snapshot. Stored on the subscription as JSONB at
/// activation/plan-change time so a later table change never silently
/// re-prices an existing subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanLimits {
    pub studies: i64,
    pub participants: i64,
    pub recordings: i64,
    pub storage_mb: i64,
    pub collaborators: i64,
    pub api_calls: i64,
}

impl PlanLimits {
    pub fn get(&self, kind: LimitKind) -> i64 {
        match kind {
            LimitKind::Studies => self.studies,
            LimitKind::Participants => self.participants,
            LimitKind::Recordings => self.recordings,
            LimitKind::StorageMb => self.storage_mb,
            LimitKind::Collaborators => self.collaborators,
            LimitKind::ApiCalls => self.api_calls,
        }
    }
}

/// The countable resources a plan limits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitKind {
    Studies,
    Participants,
    Recordings,
    StorageMb,
    Collaborators,
    ApiCalls,
}

impl LimitKind {
    pub const ALL: [LimitKind; 6] = [
        LimitKind::Studies,
        LimitKind::Participants,
        LimitKind::Recordings,
        LimitKind::StorageMb,
        LimitKind::Collaborators,
        LimitKind::ApiCalls,
    ];
}

impl std::fmt::Display for LimitKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Studies => write!(f, "studies"),
            Self::Participants => write!(f, "participants"),
            Self::Recordings => write!(f, "recordings"),
            Self::StorageMb => write!(f, "storage_mb"),
            Self::Collaborators => write!(f, "collaborators"),
            Self::ApiCalls => write!(f, "api_calls"),
        }
    }
}

impl std::str::FromStr for LimitKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "studies" => Ok(Self::Studies),
            "participants" => Ok(Self::Participants),
            "recordings" => Ok(Self::Recordings),
            "storage_mb" => Ok(Self::StorageMb),
            "collaborators" => Ok(Self::Collaborators),
            "api_calls" => Ok(Self::ApiCalls),
            _ => Err(format!("Invalid limit kind: {}", s)),
        }
    }
}

/// Usage counters accumulated within one billing period
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UsageCounters {
    pub studies: i64,
    pub participants: i64,
    pub recordings: i64,
    pub storage_mb: i64,
    pub collaborators: i64,
    pub api_calls: i64,
}

impl UsageCounters {
    pub fn get(&self, kind: LimitKind) -> i64 {
        match kind {
            LimitKind::Studies => self.studies,
            LimitKind::Participants => self.participants,
            LimitKind::Recordings => self.recordings,
            LimitKind::StorageMb => self.storage_mb,
            LimitKind::Collaborators => self.collaborators,
            LimitKind::ApiCalls => self.api_calls,
        }
    }

    pub fn add(&mut self, kind: LimitKind, amount: i64) {
        match kind {
            LimitKind::Studies => self.studies += amount,
            LimitKind::Participants => self.participants += amount,
            LimitKind::Recordings => self.recordings += amount,
            LimitKind::StorageMb => self.storage_mb += amount,
            LimitKind::Collaborators => self.collaborators += amount,
            LimitKind::ApiCalls => self.api_calls += amount,
        }
    }
}

// =============================================================================
// Status enums
// =============================================================================

/// Payment lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Processing,
    Succeeded,
    Failed,
    Canceled,
    Refunded,
}

impl PaymentStatus {
    /// Terminal statuses accept no further transitions (other than refunds
    /// against a succeeded payment)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Canceled | Self::Refunded)
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Processing => write!(f, "processing"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
            Self::Canceled => write!(f, "canceled"),
            Self::Refunded => write!(f, "refunded"),
        }
    }
}

impl std::str::FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "succeeded" => Ok(Self::Succeeded),
            "failed" => Ok(Self::Failed),
            "canceled" => Ok(Self::Canceled),
            "refunded" => Ok(Self::Refunded),
            _ => Err(format!("Invalid payment status: {}", s)),
        }
    }
}

/// Subscription status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Trialing,
    Active,
    PastDue,
    Canceled,
    Unpaid,
}

impl SubscriptionStatus {
    pub fn is_entitled(&self) -> bool {
        matches!(self, Self::Trialing | Self::Active | Self::PastDue)
    }
}

impl std::fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Trialing => write!(f, "trialing"),
            Self::Active => write!(f, "active"),
            Self::PastDue => write!(f, "past_due"),
            Self::Canceled => write!(f, "canceled"),
            Self::Unpaid => write!(f, "unpaid"),
        }
    }
}

impl std::str::FromStr for SubscriptionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "trialing" => Ok(Self::Trialing),
            "active" => Ok(Self::Active),
            "past_due" => Ok(Self::PastDue),
            "canceled" => Ok(Self::Canceled),
            "unpaid" => Ok(Self::Unpaid),
            _ => Err(format!("Invalid subscription status: {}", s)),
        }
    }
}

/// Billing cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum BillingCycle {
    Monthly,
    Yearly,
}

impl BillingCycle {
    /// Nominal period length used when the engine rolls a period itself
    /// (gateway-driven updates carry their own boundaries)
    pub fn period_duration(&self) -> time::Duration {
        match self {
            Self::Monthly => time::Duration::days(30),
            Self::Yearly => time::Duration::days(365),
        }
    }
}

impl std::fmt::Display for BillingCycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Monthly => write!(f, "monthly"),
            Self::Yearly => write!(f, "yearly"),
        }
    }
}

impl std::str::FromStr for BillingCycle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "monthly" => Ok(Self::Monthly),
            "yearly" => Ok(Self::Yearly),
            _ => Err(format!("Invalid billing cycle: {}", s)),
        }
    }
}

/// Risk bucket derived from a 0-100 risk score
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    /// Bucket a 0-100 gateway risk score
    pub fn from_score(score: i16) -> Self {
        if score >= 80 {
            Self::Critical
        } else if score >= 60 {
            Self::High
        } else if score >= 40 {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

impl std::str::FromStr for RiskLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "critical" => Ok(Self::Critical),
            _ => Err(format!("Invalid risk level: {}", s)),
        }
    }
}

/// Fraud review outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum FraudReviewStatus {
    Pending,
    Approved,
    Declined,
}

impl std::fmt::Display for FraudReviewStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Approved => write!(f, "approved"),
            Self::Declined => write!(f, "declined"),
        }
    }
}

/// Manual payment request status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ManualPaymentStatus {
    Pending,
    Verified,
    Rejected,
}

impl std::fmt::Display for ManualPaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Verified => write!(f, "verified"),
            Self::Rejected => write!(f, "rejected"),
        }
    }
}

/// Supported manual-payment currencies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    Sar,
    Usd,
}

impl std::fmt::Display for Currency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sar => write!(f, "SAR"),
            Self::Usd => write!(f, "USD"),
        }
    }
}

impl std::str::FromStr for Currency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "SAR" => Ok(Self::Sar),
            "USD" => Ok(Self::Usd),
            _ => Err(format!("Unsupported currency: {}", s)),
        }
    }
}

/// Manual payment method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    BankTransfer,
    LocalPayment,
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BankTransfer => write!(f, "bank_transfer"),
            Self::LocalPayment => write!(f, "local_payment"),
        }
    }
}

// =============================================================================
// Add-ons and credit features
// =============================================================================

/// Subscription add-on line item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddOn {
    pub name: String,
    pub amount_cents: i64,
    pub quantity: i64,
    pub enabled: bool,
}

/// Entitlement snapshot for a credit account. Unlike the subscription limit
/// table this is set once per tier when the account is credited and can be
/// customized per customer afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditFeatures {
    pub max_studies: i64,
    pub max_participants: i64,
    pub max_recording_minutes: i64,
    pub advanced_analytics: bool,
    pub priority_support: bool,
    pub custom_branding: bool,
}

impl CreditFeatures {
    pub fn for_tier(tier: PlanTier) -> Self {
        match tier {
            PlanTier::Free => Self {
                max_studies: 2,
                max_participants: 50,
                max_recording_minutes: 60,
                advanced_analytics: false,
                priority_support: false,
                custom_branding: false,
            },
            PlanTier::Basic => Self {
                max_studies: 10,
                max_participants: 500,
                max_recording_minutes: 600,
                advanced_analytics: false,
                priority_support: false,
                custom_branding: false,
            },
            PlanTier::Pro => Self {
                max_studies: 50,
                max_participants: 2_500,
                max_recording_minutes: 6_000,
                advanced_analytics: true,
                priority_support: false,
                custom_branding: true,
            },
            PlanTier::Enterprise => Self {
                max_studies: UNLIMITED,
                max_participants: UNLIMITED,
                max_recording_minutes: UNLIMITED,
                advanced_analytics: true,
                priority_support: true,
                custom_branding: true,
            },
        }
    }
}

// =============================================================================
// Database Models
// =============================================================================

/// Payment ledger record. Created on every charge attempt, never deleted.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Payment {
    pub id: Uuid,
    pub user_id: Uuid,
    pub subscription_id: Option<Uuid>,
    pub gateway_intent_id: Option<String>,
    pub gateway_charge_id: Option<String>,
    pub gateway_customer_id: Option<String>,
    pub amount_cents: i64,
    pub amount_received_cents: i64,
    pub gateway_fee_cents: i64,
    pub application_fee_cents: i64,
    pub net_amount_cents: i64,
    pub refund_amount_cents: i64,
    pub currency: String,
    pub status: String,
    pub attempted_at: OffsetDateTime,
    pub paid_at: Option<OffsetDateTime>,
    pub failed_at: Option<OffsetDateTime>,
    pub refunded_at: Option<OffsetDateTime>,
    pub failure_code: Option<String>,
    pub failure_message: Option<String>,
    pub retry_attempts: i32,
    pub max_retry_attempts: i32,
    pub next_retry_at: Option<OffsetDateTime>,
    pub retry_history: serde_json::Value,
    pub risk_score: Option<i16>,
    pub risk_level: String,
    pub fraud_flagged: bool,
    pub fraud_review_status: Option<String>,
    pub dispute_status: Option<String>,
    pub dispute_amount_cents: Option<i64>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl Payment {
    pub fn status_parsed(&self) -> PaymentStatus {
        self.status.parse().unwrap_or(PaymentStatus::Pending)
    }

    pub fn risk_level_parsed(&self) -> RiskLevel {
        self.risk_level.parse().unwrap_or(RiskLevel::Low)
    }

    /// Retry attempts in order; malformed history reads as empty
    pub fn retry_history_parsed(&self) -> Vec<RetryHistoryEntry> {
        serde_json::from_value(self.retry_history.clone()).unwrap_or_default()
    }
}

/// One retry-history entry on a payment (stored in the `retry_history` JSONB
/// array, ordered by attempt number)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryHistoryEntry {
    pub attempt: i32,
    #[serde(with = "time::serde::rfc3339")]
    pub attempted_at: OffsetDateTime,
    pub status: String,
    pub failure_reason: Option<String>,
}

/// Subscription record
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Subscription {
    pub id: Uuid,
    pub user_id: Uuid,
    pub gateway_subscription_id: Option<String>,
    pub plan: String,
    pub status: String,
    pub billing_cycle: String,
    pub amount_cents: i64,
    pub currency: String,
    pub current_period_start: OffsetDateTime,
    pub current_period_end: OffsetDateTime,
    pub trial_start: Option<OffsetDateTime>,
    pub trial_end: Option<OffsetDateTime>,
    pub cancel_at_period_end: bool,
    pub canceled_at: Option<OffsetDateTime>,
    pub cancellation_reason: Option<String>,
    pub end_date: Option<OffsetDateTime>,
    pub total_discount_cents: i64,
    pub renewal_amount_cents: i64,
    pub usage_limits: serde_json::Value,
    pub current_usage: serde_json::Value,
    pub add_ons: serde_json::Value,
    pub features: serde_json::Value,
    pub last_reset_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Custom feature override on a subscription. Overrides are additive only: a
/// disabled entry never revokes a plan-included feature.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureOverride {
    pub name: String,
    pub enabled: bool,
}

impl Subscription {
    pub fn plan_parsed(&self) -> PlanTier {
        self.plan.parse().unwrap_or_default()
    }

    pub fn status_parsed(&self) -> SubscriptionStatus {
        self.status.parse().unwrap_or(SubscriptionStatus::Canceled)
    }

    /// Usage limit snapshot taken at activation/plan-change time
    pub fn limits(&self) -> PlanLimits {
        serde_json::from_value(self.usage_limits.clone())
            .unwrap_or_else(|_| self.plan_parsed().limits())
    }

    /// Counters for the current billing period
    pub fn usage(&self) -> UsageCounters {
        serde_json::from_value(self.current_usage.clone()).unwrap_or_default()
    }

    pub fn add_ons_parsed(&self) -> Vec<AddOn> {
        serde_json::from_value(self.add_ons.clone()).unwrap_or_default()
    }

    pub fn feature_overrides(&self) -> Vec<FeatureOverride> {
        serde_json::from_value(self.features.clone()).unwrap_or_default()
    }

    /// Whether `now` falls inside the trial window
    pub fn is_trial_active(&self, now: OffsetDateTime) -> bool {
        match (self.trial_start, self.trial_end) {
            (Some(start), Some(end)) => now >= start && now <= end,
            _ => false,
        }
    }
}

/// Credit account record (manual/bank-transfer billing path; one per user)
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CreditAccount {
    pub id: Uuid,
    pub user_id: Uuid,
    pub total_credits: i64,
    pub used_credits: i64,
    pub available_credits: i64,
    pub plan_type: String,
    pub plan_start_date: Option<OffsetDateTime>,
    pub plan_end_date: Option<OffsetDateTime>,
    pub is_active: bool,
    pub features: serde_json::Value,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl CreditAccount {
    pub fn plan_parsed(&self) -> PlanTier {
        self.plan_type.parse().unwrap_or_default()
    }

    pub fn features_parsed(&self) -> CreditFeatures {
        serde_json::from_value(self.features.clone())
            .unwrap_or_else(|_| CreditFeatures::for_tier(self.plan_parsed()))
    }

    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        self.plan_end_date.map(|end| now > end).unwrap_or(false)
    }
}

/// Derived balance: never independently settable, recomputed on every save
pub fn available_credits(total: i64, used: i64) -> i64 {
    (total - used).max(0)
}

/// Manual payment request record
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ManualPaymentRequest {
    pub id: Uuid,
    pub user_id: Uuid,
    pub plan_type: String,
    pub amount_cents: i64,
    pub currency: String,
    pub payment_method: String,
    pub payment_proof: Option<String>,
    pub reference_number: String,
    pub status: String,
    pub bank_details: Option<serde_json::Value>,
    pub admin_notes: Option<String>,
    pub rejection_reason: Option<String>,
    pub verified_at: Option<OffsetDateTime>,
    pub verified_by: Option<Uuid>,
    pub rejected_at: Option<OffsetDateTime>,
    pub rejected_by: Option<Uuid>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl ManualPaymentRequest {
    pub fn status_parsed(&self) -> ManualPaymentStatus {
        match self.status.as_str() {
            "verified" => ManualPaymentStatus::Verified,
            "rejected" => ManualPaymentStatus::Rejected,
            _ => ManualPaymentStatus::Pending,
        }
    }
}

/// One credit grant against a credit account (the audit trail for every
/// credit increase; append-only)
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CreditGrant {
    pub id: Uuid,
    pub credit_account_id: Uuid,
    pub payment_request_id: Uuid,
    pub credits_added: i64,
    pub added_by: Uuid,
    pub added_at: OffsetDateTime,
}

/// Archived usage counters for a completed billing period
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UsagePeriod {
    pub id: Uuid,
    pub subscription_id: Uuid,
    pub period_start: OffsetDateTime,
    pub period_end: OffsetDateTime,
    pub counters: serde_json::Value,
    pub archived_at: OffsetDateTime,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration;

    #[test]
    fn test_plan_tier_default() {
        assert_eq!(PlanTier::default(), PlanTier::Free);
    }

    #[test]
    fn test_plan_limit_table() {
        assert_eq!(PlanTier::Free.limits().studies, 2);
        assert_eq!(PlanTier::Basic.limits().participants, 500);
        assert_eq!(PlanTier::Pro.limits().participants, 2_500);
        assert_eq!(PlanTier::Enterprise.limits().participants, UNLIMITED);
        assert_eq!(PlanTier::Enterprise.limits().get(LimitKind::ApiCalls), UNLIMITED);
    }

    #[test]
    fn test_plan_tier_features() {
        assert!(PlanTier::Free.includes_feature("api_access"));
        assert!(!PlanTier::Free.includes_feature("advanced_analytics"));
        assert!(PlanTier::Pro.includes_feature("advanced_analytics"));
        assert!(!PlanTier::Pro.includes_feature("priority_support"));
        assert!(PlanTier::Enterprise.includes_feature("priority_support"));
        assert!(!PlanTier::Basic.includes_feature("unknown_feature"));
    }

    #[test]
    fn test_plan_tier_display_and_parse() {
        assert_eq!(format!("{}", PlanTier::Pro), "pro");
        assert_eq!("PRO".parse::<PlanTier>().unwrap(), PlanTier::Pro);
        assert_eq!("enterprise".parse::<PlanTier>().unwrap(), PlanTier::Enterprise);
        assert!("platinum".parse::<PlanTier>().is_err());
    }

    #[test]
    fn test_limit_kind_roundtrip() {
        for kind in LimitKind::ALL {
            assert_eq!(kind.to_string().parse::<LimitKind>().unwrap(), kind);
        }
        assert!("widgets".parse::<LimitKind>().is_err());
    }

    #[test]
    fn test_usage_counters_add_and_get() {
        let mut usage = UsageCounters::default();
        usage.add(LimitKind::Participants, 3);
        usage.add(LimitKind::Participants, 2);
        usage.add(LimitKind::Studies, 1);
        assert_eq!(usage.get(LimitKind::Participants), 5);
        assert_eq!(usage.get(LimitKind::Studies), 1);
        assert_eq!(usage.get(LimitKind::Recordings), 0);
    }

    #[test]
    fn test_risk_level_from_score() {
        assert_eq!(RiskLevel::from_score(0), RiskLevel::Low);
        assert_eq!(RiskLevel::from_score(39), RiskLevel::Low);
        assert_eq!(RiskLevel::from_score(40), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_score(45), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_score(60), RiskLevel::High);
        assert_eq!(RiskLevel::from_score(79), RiskLevel::High);
        assert_eq!(RiskLevel::from_score(80), RiskLevel::Critical);
        assert_eq!(RiskLevel::from_score(85), RiskLevel::Critical);
        assert_eq!(RiskLevel::from_score(100), RiskLevel::Critical);
    }

    #[test]
    fn test_payment_status_parse() {
        assert_eq!("past_due".parse::<SubscriptionStatus>().unwrap(), SubscriptionStatus::PastDue);
        assert_eq!("succeeded".parse::<PaymentStatus>().unwrap(), PaymentStatus::Succeeded);
        assert!(PaymentStatus::Refunded.is_terminal());
        assert!(!PaymentStatus::Failed.is_terminal());
    }

    #[test]
    fn test_subscription_status_entitlement() {
        assert!(SubscriptionStatus::Trialing.is_entitled());
        assert!(SubscriptionStatus::Active.is_entitled());
        assert!(SubscriptionStatus::PastDue.is_entitled());
        assert!(!SubscriptionStatus::Canceled.is_entitled());
        assert!(!SubscriptionStatus::Unpaid.is_entitled());
    }

    #[test]
    fn test_billing_cycle_parse_and_duration() {
        assert_eq!("monthly".parse::<BillingCycle>().unwrap(), BillingCycle::Monthly);
        assert_eq!(BillingCycle::Yearly.period_duration(), Duration::days(365));
        assert!("weekly".parse::<BillingCycle>().is_err());
    }

    #[test]
    fn test_currency_parse() {
        assert_eq!("sar".parse::<Currency>().unwrap(), Currency::Sar);
        assert_eq!("USD".parse::<Currency>().unwrap(), Currency::Usd);
        assert!("EUR".parse::<Currency>().is_err());
    }

    #[test]
    fn test_available_credits_floors_at_zero() {
        assert_eq!(available_credits(500, 100), 400);
        assert_eq!(available_credits(100, 100), 0);
        assert_eq!(available_credits(100, 250), 0);
    }

    #[test]
    fn test_credit_features_for_tier() {
        let pro = CreditFeatures::for_tier(PlanTier::Pro);
        assert_eq!(pro.max_participants, 2_500);
        assert!(pro.advanced_analytics);
        assert!(!pro.priority_support);

        let enterprise = CreditFeatures::for_tier(PlanTier::Enterprise);
        assert_eq!(enterprise.max_studies, UNLIMITED);
        assert!(enterprise.priority_support);
    }

    #[test]
    fn test_trial_window() {
        let now = OffsetDateTime::now_utc();
        let sub = Subscription {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            gateway_subscription_id: None,
            plan: "pro".into(),
            status: "trialing".into(),
            billing_cycle: "monthly".into(),
            amount_cents: 5_000,
            currency: "USD".into(),
            current_period_start: now - Duration::days(1),
            current_period_end: now + Duration::days(29),
            trial_start: Some(now - Duration::days(1)),
            trial_end: Some(now + Duration::days(13)),
            cancel_at_period_end: false,
            canceled_at: None,
            cancellation_reason: None,
            end_date: None,
            total_discount_cents: 0,
            renewal_amount_cents: 5_000,
            usage_limits: serde_json::json!({}),
            current_usage: serde_json::json!({}),
            add_ons: serde_json::json!([]),
            features: serde_json::json!([]),
            last_reset_at: None,
            created_at: now,
            updated_at: now,
        };
        assert!(sub.is_trial_active(now));
        assert!(!sub.is_trial_active(now + Duration::days(20)));
        // Malformed limits JSON falls back to the plan table
        assert_eq!(sub.limits().participants, 2_500);
    }
}
