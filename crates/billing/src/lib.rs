//! Billing and entitlement engine
//!
//! Two billing paths feed one entitlement surface: gateway-driven
//! subscriptions (automatic renewal, retries, fraud review) and manually
//! verified bank-transfer payments that credit a prepaid account. The
//! [`facade::BillingFacade`] is the entry point for both; everything else is
//! the machinery behind it.

pub mod error;
pub mod events;
pub mod facade;
pub mod gateway;
pub mod ledger;
pub mod manual;
pub mod retry;
pub mod risk;
pub mod subscription;
pub mod usage;

pub use error::{BillingError, BillingResult};
pub use events::{BillingEventLogger, BillingEventType};
pub use facade::{BillingFacade, EntitlementSummary};
pub use gateway::{ChargeOutcome, GatewayEvent, HttpGateway, PaymentGateway};
pub use ledger::{NewPayment, PaymentLedger};
pub use manual::{ManualCreditWorkflow, NewManualPayment};
pub use retry::RetryScheduler;
pub use risk::RiskScorer;
pub use subscription::{NewSubscription, SubscriptionLifecycle};
pub use usage::{check_limit, LimitCheck, UsageMeter};
