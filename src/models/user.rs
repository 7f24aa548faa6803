//! User accounts

use authdb_macros::Model;
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{
    Account, AccountField, Invitation, InvitationField, Member, MemberField, OauthAccessToken,
    OauthAccessTokenField, OauthApplication, OauthApplicationField, OauthConsent,
    OauthConsentField, Passkey, PasskeyField, Session, SessionField, TwoFactor, TwoFactorField,
    UserProfile, UserProfileField,
};
use crate::orm::{HasMany, HasOne};

#[derive(Model, Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
#[model(table = "user")]
pub struct User {
    #[model(id, default_uuid)]
    pub id: String,
    pub name: String,
    #[model(unique)]
    pub email: String,
    #[model(default = false)]
    pub email_verified: bool,
    pub image: Option<String>,
    #[model(default_now)]
    pub created_at: DateTime<Utc>,
    #[model(default_now, updated_at)]
    pub updated_at: DateTime<Utc>,
    #[model(default = false)]
    pub two_factor_enabled: bool,
    /// Admin plugin role, e.g. "admin"
    pub role: Option<String>,
    #[model(default = false)]
    pub banned: bool,
    pub ban_reason: Option<String>,
    pub ban_expires: Option<DateTime<Utc>>,
    pub stripe_customer_id: Option<String>,
}

impl User {
    pub const SESSIONS: HasMany<User, Session> =
        HasMany::new("sessions", UserField::Id, SessionField::UserId);
    pub const ACCOUNTS: HasMany<User, Account> =
        HasMany::new("accounts", UserField::Id, AccountField::UserId);
    pub const MEMBERSHIPS: HasMany<User, Member> =
        HasMany::new("memberships", UserField::Id, MemberField::UserId);
    pub const INVITATIONS_SENT: HasMany<User, Invitation> =
        HasMany::new("invitationsSent", UserField::Id, InvitationField::InviterId);
    pub const TWO_FACTORS: HasMany<User, TwoFactor> =
        HasMany::new("twoFactors", UserField::Id, TwoFactorField::UserId);
    pub const PASSKEYS: HasMany<User, Passkey> =
        HasMany::new("passkeys", UserField::Id, PasskeyField::UserId);
    pub const OAUTH_APPLICATIONS: HasMany<User, OauthApplication> =
        HasMany::new("oauthApplications", UserField::Id, OauthApplicationField::UserId);
    pub const OAUTH_ACCESS_TOKENS: HasMany<User, OauthAccessToken> =
        HasMany::new("oauthAccessTokens", UserField::Id, OauthAccessTokenField::UserId);
    pub const OAUTH_CONSENTS: HasMany<User, OauthConsent> =
        HasMany::new("oauthConsents", UserField::Id, OauthConsentField::UserId);
    pub const PROFILE: HasOne<User, UserProfile> =
        HasOne::new("profile", UserField::Id, UserProfileField::UserId);
}
