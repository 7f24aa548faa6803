//! Login sessions

use authdb_macros::Model;
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{User, UserField};
use crate::orm::BelongsTo;

#[derive(Model, Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
#[model(table = "session")]
pub struct Session {
    #[model(id, default_uuid)]
    pub id: String,
    pub expires_at: DateTime<Utc>,
    #[model(unique)]
    pub token: String,
    #[model(default_now)]
    pub created_at: DateTime<Utc>,
    #[model(default_now, updated_at)]
    pub updated_at: DateTime<Utc>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    #[model(index, references = "user.id", on_delete = "cascade")]
    pub user_id: String,
    pub active_organization_id: Option<String>,
    /// Admin user id when the session is an impersonation
    pub impersonated_by: Option<String>,
}

impl Session {
    pub const USER: BelongsTo<Session, User> =
        BelongsTo::new("user", SessionField::UserId, UserField::Id);

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}
