//! OAuth provider: issued access and refresh tokens

use authdb_macros::Model;
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{OauthApplication, OauthApplicationField, User, UserField};
use crate::orm::BelongsTo;

#[derive(Model, Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
#[model(table = "oauth_access_token")]
pub struct OauthAccessToken {
    #[model(id, default_uuid)]
    pub id: String,
    #[model(unique)]
    pub access_token: String,
    #[model(unique)]
    pub refresh_token: String,
    pub access_token_expires_at: DateTime<Utc>,
    pub refresh_token_expires_at: DateTime<Utc>,
    #[model(references = "oauth_application.client_id", on_delete = "cascade")]
    pub client_id: String,
    #[model(references = "user.id", on_delete = "cascade")]
    pub user_id: Option<String>,
    /// Space-separated scopes
    pub scopes: String,
    #[model(default_now)]
    pub created_at: DateTime<Utc>,
    #[model(default_now, updated_at)]
    pub updated_at: DateTime<Utc>,
}

impl OauthAccessToken {
    pub const APPLICATION: BelongsTo<OauthAccessToken, OauthApplication> = BelongsTo::new(
        "application",
        OauthAccessTokenField::ClientId,
        OauthApplicationField::ClientId,
    );
    pub const USER: BelongsTo<OauthAccessToken, User> =
        BelongsTo::new("user", OauthAccessTokenField::UserId, UserField::Id);
}
