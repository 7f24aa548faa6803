//! Pending organization invitations

use authdb_macros::Model;
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{Organization, OrganizationField, User, UserField};
use crate::orm::BelongsTo;

#[derive(Model, Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
#[model(table = "invitation")]
pub struct Invitation {
    #[model(id, default_uuid)]
    pub id: String,
    #[model(references = "organization.id", on_delete = "cascade")]
    pub organization_id: String,
    pub email: String,
    pub role: Option<String>,
    /// pending, accepted, rejected or canceled
    #[model(default = "pending")]
    pub status: String,
    pub expires_at: DateTime<Utc>,
    #[model(references = "user.id", on_delete = "cascade")]
    pub inviter_id: String,
    #[model(default_now)]
    pub created_at: DateTime<Utc>,
}

impl Invitation {
    pub const ORGANIZATION: BelongsTo<Invitation, Organization> =
        BelongsTo::new("organization", InvitationField::OrganizationId, OrganizationField::Id);
    pub const INVITER: BelongsTo<Invitation, User> =
        BelongsTo::new("inviter", InvitationField::InviterId, UserField::Id);
}
