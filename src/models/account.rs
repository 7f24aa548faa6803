//! Linked credentials: OAuth provider accounts and email/password

use authdb_macros::Model;
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{User, UserField};
use crate::orm::BelongsTo;

#[derive(Model, Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
#[model(table = "account")]
pub struct Account {
    #[model(id, default_uuid)]
    pub id: String,
    /// Account id at the provider
    pub account_id: String,
    pub provider_id: String,
    #[model(index, references = "user.id", on_delete = "cascade")]
    pub user_id: String,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub id_token: Option<String>,
    pub access_token_expires_at: Option<DateTime<Utc>>,
    pub refresh_token_expires_at: Option<DateTime<Utc>>,
    pub scope: Option<String>,
    /// Password hash for the credential provider
    #[serde(skip_serializing)]
    pub password: Option<String>,
    #[model(default_now)]
    pub created_at: DateTime<Utc>,
    #[model(default_now, updated_at)]
    pub updated_at: DateTime<Utc>,
}

impl Account {
    pub const USER: BelongsTo<Account, User> =
        BelongsTo::new("user", AccountField::UserId, UserField::Id);
}
