//! Organizations (tenants)

use authdb_macros::Model;
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{Invitation, InvitationField, Member, MemberField};
use crate::orm::HasMany;

#[derive(Model, Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
#[model(table = "organization")]
pub struct Organization {
    #[model(id, default_uuid)]
    pub id: String,
    pub name: String,
    #[model(unique)]
    pub slug: String,
    pub logo: Option<String>,
    #[model(default_now)]
    pub created_at: DateTime<Utc>,
    /// Free-form JSON
    pub metadata: Option<String>,
}

impl Organization {
    pub const MEMBERS: HasMany<Organization, Member> =
        HasMany::new("members", OrganizationField::Id, MemberField::OrganizationId);
    pub const INVITATIONS: HasMany<Organization, Invitation> =
        HasMany::new("invitations", OrganizationField::Id, InvitationField::OrganizationId);
}
