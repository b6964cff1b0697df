use crate::status::text_enum;

text_enum!(
    /// Organization role stored on the user row.
    Role {
        OrgAdmin => "org_admin",
        Admin => "admin",
        Manager => "manager",
        Technician => "technician",
        StandardUser => "standard_user",
    }
);

text_enum!(
    /// Coarse permissions granted by role. Service permissions fall back onto
    /// these when a user holds no explicit grant.
    LegacyPermission {
        CreateUsers => "create_users",
        ViewUsers => "view_users",
        ManageUsers => "manage_users",
        DeleteUsers => "delete_users",
        ManageOrganizations => "manage_organizations",
        AccessOrgSettings => "access_org_settings",
        SuperAdmin => "super_admin",
    }
);

text_enum!(
    /// Fine-grained permissions checked by the CRM endpoints.
    ServicePermission {
        CustomerServiceCreate => "customer_service_create",
        CustomerServiceRead => "customer_service_read",
        TicketCreate => "ticket_create",
        TicketRead => "ticket_read",
        TicketUpdate => "ticket_update",
        SlaCreate => "sla_create",
        SlaRead => "sla_read",
        SlaUpdate => "sla_update",
        SlaDelete => "sla_delete",
        SlaEscalate => "sla_escalate",
        DispatchCreate => "dispatch_create",
        DispatchRead => "dispatch_read",
        DispatchUpdate => "dispatch_update",
        DispatchDelete => "dispatch_delete",
        InstallationCreate => "installation_create",
        InstallationRead => "installation_read",
        InstallationUpdate => "installation_update",
        InstallationDelete => "installation_delete",
        CrmAdmin => "crm_admin",
        CrmSettings => "crm_settings",
    }
);

impl ServicePermission {
    /// Legacy permissions that satisfy this permission when it was not granted
    /// explicitly. Any one of them is enough.
    pub fn fallback(self) -> &'static [LegacyPermission] {
        use LegacyPermission::*;
        use ServicePermission::*;
        match self {
            CustomerServiceCreate | TicketCreate | SlaCreate | DispatchCreate
            | InstallationCreate => &[CreateUsers],
            CustomerServiceRead | TicketRead | SlaRead | DispatchRead | InstallationRead => {
                &[ViewUsers]
            }
            TicketUpdate | SlaUpdate | SlaEscalate | DispatchUpdate | InstallationUpdate => {
                &[ManageUsers]
            }
            SlaDelete | DispatchDelete | InstallationDelete => &[DeleteUsers],
            CrmAdmin => &[ManageOrganizations, SuperAdmin],
            CrmSettings => &[ManageOrganizations, AccessOrgSettings],
        }
    }
}

impl Role {
    pub fn grants(self) -> &'static [LegacyPermission] {
        use LegacyPermission::*;
        match self {
            Role::OrgAdmin | Role::Admin => &[
                CreateUsers,
                ViewUsers,
                ManageUsers,
                DeleteUsers,
                ManageOrganizations,
                AccessOrgSettings,
            ],
            Role::Manager => &[CreateUsers, ViewUsers, ManageUsers],
            Role::Technician | Role::StandardUser => &[ViewUsers],
        }
    }

    pub fn has_legacy(self, permission: LegacyPermission) -> bool {
        self.grants().contains(&permission)
    }
}

/// Decides whether a principal holds `required`.
///
/// Super admins pass every check. Otherwise an explicit grant wins, then the
/// role is consulted through the fallback table.
pub fn is_allowed(
    role: Role,
    is_super_admin: bool,
    granted: &[ServicePermission],
    required: ServicePermission,
) -> bool {
    if is_super_admin {
        return true;
    }
    if granted.contains(&required) {
        return true;
    }
    required
        .fallback()
        .iter()
        .any(|legacy| role.has_legacy(*legacy))
}
