//! Extended public profile, one per user

use authdb_macros::Model;
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{User, UserField};
use crate::orm::BelongsTo;

#[derive(Model, Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
#[model(table = "user_profile")]
pub struct UserProfile {
    #[model(id, default_uuid)]
    pub id: String,
    #[model(unique, references = "user.id", on_delete = "cascade")]
    pub user_id: String,
    pub display_name: Option<String>,
    pub bio: Option<String>,
    pub location: Option<String>,
    pub website: Option<String>,
    pub avatar_url: Option<String>,
    /// IANA zone name
    pub timezone: Option<String>,
    #[model(default_now)]
    pub created_at: DateTime<Utc>,
    #[model(default_now, updated_at)]
    pub updated_at: DateTime<Utc>,
}

impl UserProfile {
    pub const USER: BelongsTo<UserProfile, User> =
        BelongsTo::new("user", UserProfileField::UserId, UserField::Id);
}
