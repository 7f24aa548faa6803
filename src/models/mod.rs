//! Schema models
//!
//! One struct per table, each deriving [`Model`](crate::orm::Model). Relation
//! constants (`User::SESSIONS`, `Session::USER`, ...) live next to the models.

mod account;
mod invitation;
mod member;
mod oauth_access_token;
mod oauth_application;
mod oauth_consent;
mod organization;
mod passkey;
mod session;
mod subscription;
mod two_factor;
mod user;
mod user_profile;
mod verification;

pub use account::{Account, AccountField};
pub use invitation::{Invitation, InvitationField};
pub use member::{Member, MemberField};
pub use oauth_access_token::{OauthAccessToken, OauthAccessTokenField};
pub use oauth_application::{OauthApplication, OauthApplicationField};
pub use oauth_consent::{OauthConsent, OauthConsentField};
pub use organization::{Organization, OrganizationField};
pub use passkey::{Passkey, PasskeyField};
pub use session::{Session, SessionField};
pub use subscription::{Subscription, SubscriptionField};
pub use two_factor::{TwoFactor, TwoFactorField};
pub use user::{User, UserField};
pub use user_profile::{UserProfile, UserProfileField};
pub use verification::{Verification, VerificationField};

/// Invoke `$callback! { method => Model, ... }` with every model.
///
/// Models are listed parents first, so creating tables in this order
/// satisfies every foreign key.
macro_rules! with_models {
    ($callback:ident) => {
        $callback! {
            user => User,
            session => Session,
            account => Account,
            verification => Verification,
            organization => Organization,
            member => Member,
            invitation => Invitation,
            two_factor => TwoFactor,
            passkey => Passkey,
            oauth_application => OauthApplication,
            oauth_access_token => OauthAccessToken,
            oauth_consent => OauthConsent,
            subscription => Subscription,
            user_profile => UserProfile,
        }
    };
}

pub(crate) use with_models;
