use authdb_macros::Model;
use serde::Serialize;

use super::{User, UserField};
use crate::orm::BelongsTo;

/// TOTP secret and backup codes of a user
#[derive(Model, Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
#[model(table = "two_factor")]
pub struct TwoFactor {
    #[model(id, default_uuid)]
    pub id: String,
    #[serde(skip_serializing)]
    pub secret: String,
    #[serde(skip_serializing)]
    pub backup_codes: String,
    #[model(references = "user.id", on_delete = "cascade")]
    pub user_id: String,
}

impl TwoFactor {
    pub const USER: BelongsTo<TwoFactor, User> =
        BelongsTo::new("user", TwoFactorField::UserId, UserField::Id);
}
