//! WebAuthn credentials

use authdb_macros::Model;
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{User, UserField};
use crate::orm::BelongsTo;

#[derive(Model, Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
#[model(table = "passkey")]
pub struct Passkey {
    #[model(id, default_uuid)]
    pub id: String,
    pub name: Option<String>,
    pub public_key: String,
    #[model(references = "user.id", on_delete = "cascade")]
    pub user_id: String,
    #[model(unique)]
    pub credential_id: String,
    /// Signature counter reported by the authenticator
    #[model(default = 0)]
    pub counter: i64,
    pub device_type: String,
    #[model(default = false)]
    pub backed_up: bool,
    pub transports: Option<String>,
    #[model(default_now)]
    pub created_at: DateTime<Utc>,
    pub aaguid: Option<String>,
}

impl Passkey {
    pub const USER: BelongsTo<Passkey, User> =
        BelongsTo::new("user", PasskeyField::UserId, UserField::Id);
}
