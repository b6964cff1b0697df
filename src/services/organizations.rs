//! Per-organization closure policy.

use chrono::Utc;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use uuid::Uuid;

use crate::{models::Organization, schema::organizations};

use super::{Actor, ServiceError, ServiceResult};

#[derive(Debug, Clone, Copy, Default)]
pub struct SettingsUpdate {
    pub require_feedback_before_closure: Option<bool>,
    pub require_manager_approval: Option<bool>,
}

#[derive(AsChangeset)]
#[diesel(table_name = organizations)]
struct SettingsChangeset {
    require_feedback_before_closure: Option<bool>,
    require_manager_approval: Option<bool>,
    updated_at: chrono::NaiveDateTime,
}

/// The caller's own organization. A session pointing at a missing
/// organization is a data fault, not a 404.
pub fn get_organization(
    conn: &mut PgConnection,
    organization_id: Uuid,
) -> ServiceResult<Organization> {
    organizations::table
        .find(organization_id)
        .first(conn)
        .optional()?
        .ok_or_else(|| ServiceError::Integrity(format!("organization {organization_id} missing")))
}

/// Changes only the flags that are present. Existing closures keep the
/// approval requirement they were created with.
pub fn update_settings(
    conn: &mut PgConnection,
    actor: Actor,
    update: SettingsUpdate,
) -> ServiceResult<Organization> {
    if update.require_feedback_before_closure.is_none() && update.require_manager_approval.is_none()
    {
        return get_organization(conn, actor.organization_id);
    }

    let organization: Organization = diesel::update(organizations::table.find(actor.organization_id))
        .set(&SettingsChangeset {
            require_feedback_before_closure: update.require_feedback_before_closure,
            require_manager_approval: update.require_manager_approval,
            updated_at: Utc::now().naive_utc(),
        })
        .get_result(conn)
        .optional()?
        .ok_or_else(|| {
            ServiceError::Integrity(format!("organization {} missing", actor.organization_id))
        })?;

    tracing::info!(
        organization_id = %organization.id,
        user_id = %actor.user_id,
        require_feedback_before_closure = organization.require_feedback_before_closure,
        require_manager_approval = organization.require_manager_approval,
        "organization settings updated"
    );
    Ok(organization)
}
