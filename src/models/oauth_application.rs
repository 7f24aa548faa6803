//! OAuth provider: registered client applications

use authdb_macros::Model;
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{OauthAccessToken, OauthAccessTokenField, OauthConsent, OauthConsentField, User, UserField};
use crate::orm::{BelongsTo, HasMany};

#[derive(Model, Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
#[model(table = "oauth_application")]
pub struct OauthApplication {
    #[model(id, default_uuid)]
    pub id: String,
    pub name: String,
    pub icon: Option<String>,
    pub metadata: Option<String>,
    #[model(unique)]
    pub client_id: String,
    #[serde(skip_serializing)]
    pub client_secret: Option<String>,
    /// Comma-separated redirect URLs
    pub redirect_urls: String,
    /// "web", "native", "user-agent-based" or "public"
    #[model(column = "type")]
    #[serde(rename = "type")]
    pub app_type: String,
    #[model(default = false)]
    pub disabled: bool,
    #[model(references = "user.id", on_delete = "cascade")]
    pub user_id: Option<String>,
    #[model(default_now)]
    pub created_at: DateTime<Utc>,
    #[model(default_now, updated_at)]
    pub updated_at: DateTime<Utc>,
}

impl OauthApplication {
    pub const OWNER: BelongsTo<OauthApplication, User> =
        BelongsTo::new("owner", OauthApplicationField::UserId, UserField::Id);
    pub const ACCESS_TOKENS: HasMany<OauthApplication, OauthAccessToken> = HasMany::new(
        "accessTokens",
        OauthApplicationField::ClientId,
        OauthAccessTokenField::ClientId,
    );
    pub const CONSENTS: HasMany<OauthApplication, OauthConsent> = HasMany::new(
        "consents",
        OauthApplicationField::ClientId,
        OauthConsentField::ClientId,
    );

    pub fn redirect_url_list(&self) -> Vec<&str> {
        self.redirect_urls
            .split(',')
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .collect()
    }
}
