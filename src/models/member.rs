//! Organization membership

use authdb_macros::Model;
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{Organization, OrganizationField, User, UserField};
use crate::orm::BelongsTo;

#[derive(Model, Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
#[model(table = "member")]
pub struct Member {
    #[model(id, default_uuid)]
    pub id: String,
    #[model(references = "organization.id", on_delete = "cascade")]
    pub organization_id: String,
    #[model(references = "user.id", on_delete = "cascade")]
    pub user_id: String,
    #[model(default = "member")]
    pub role: String,
    #[model(default_now)]
    pub created_at: DateTime<Utc>,
}

impl Member {
    pub const ORGANIZATION: BelongsTo<Member, Organization> =
        BelongsTo::new("organization", MemberField::OrganizationId, OrganizationField::Id);
    pub const USER: BelongsTo<Member, User> =
        BelongsTo::new("user", MemberField::UserId, UserField::Id);
}
