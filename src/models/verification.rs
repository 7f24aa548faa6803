//! Verification values (email links, OTPs, reset tokens)

use authdb_macros::Model;
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Model, Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
#[model(table = "verification")]
pub struct Verification {
    #[model(id, default_uuid)]
    pub id: String,
    #[model(index)]
    pub identifier: String,
    pub value: String,
    pub expires_at: DateTime<Utc>,
    #[model(default_now)]
    pub created_at: DateTime<Utc>,
    #[model(default_now, updated_at)]
    pub updated_at: DateTime<Utc>,
}
