//! OAuth provider: user consent per client

use authdb_macros::Model;
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{OauthApplication, OauthApplicationField, User, UserField};
use crate::orm::BelongsTo;

#[derive(Model, Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
#[model(table = "oauth_consent")]
pub struct OauthConsent {
    #[model(id, default_uuid)]
    pub id: String,
    #[model(references = "oauth_application.client_id", on_delete = "cascade")]
    pub client_id: String,
    #[model(references = "user.id", on_delete = "cascade")]
    pub user_id: String,
    pub scopes: String,
    #[model(default_now)]
    pub created_at: DateTime<Utc>,
    #[model(default_now, updated_at)]
    pub updated_at: DateTime<Utc>,
    #[model(default = false)]
    pub consent_given: bool,
}

impl OauthConsent {
    pub const APPLICATION: BelongsTo<OauthConsent, OauthApplication> = BelongsTo::new(
        "application",
        OauthConsentField::ClientId,
        OauthApplicationField::ClientId,
    );
    pub const USER: BelongsTo<OauthConsent, User> =
        BelongsTo::new("user", OauthConsentField::UserId, UserField::Id);
}
