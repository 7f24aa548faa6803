//! Stripe billing subscriptions

use authdb_macros::Model;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// A plan subscription.
///
/// `reference_id` points at the paying user or organization, so it carries
/// no foreign key.
#[derive(Model, Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
#[model(table = "subscription")]
pub struct Subscription {
    #[model(id, default_uuid)]
    pub id: String,
    pub plan: String,
    #[model(index)]
    pub reference_id: String,
    pub stripe_customer_id: Option<String>,
    #[model(unique)]
    pub stripe_subscription_id: Option<String>,
    /// Stripe status: incomplete, trialing, active, past_due, canceled, ...
    #[model(default = "incomplete")]
    pub status: String,
    pub period_start: Option<DateTime<Utc>>,
    pub period_end: Option<DateTime<Utc>>,
    #[model(default = false)]
    pub cancel_at_period_end: bool,
    pub seats: Option<i64>,
    pub trial_start: Option<DateTime<Utc>>,
    pub trial_end: Option<DateTime<Utc>>,
}

impl Subscription {
    pub fn is_active(&self) -> bool {
        matches!(self.status.as_str(), "active" | "trialing")
    }
}
