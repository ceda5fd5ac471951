use axum::http::HeaderMap;
use std::collections::HashSet;
use uuid::Uuid;

/// Capabilities an actor may hold. Checked once at the handler boundary;
/// the services below never re-check authorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Permission {
    CampaignsViewAll,
    CampaignsViewOwn,
    CampaignsCreate,
    CampaignsEditAll,
    CampaignsEditOwn,
    CampaignsDeleteAll,
    CampaignsDeleteOwn,
    CampaignsExecute,
    ProspectsView,
    ProspectsCreate,
    ProspectsEdit,
    ProspectsDelete,
    ProspectsConvert,
}

/// The authenticated caller, threaded explicitly through every handler.
#[derive(Debug, Clone)]
pub struct Actor {
    pub id: Uuid,
    pub permissions: HashSet<Permission>,
}

impl Actor {
    pub fn new(id: Uuid, permissions: HashSet<Permission>) -> Self {
        Self { id, permissions }
    }

    /// Actor with every capability. Authentication middleware is upstream
    /// infrastructure; until it populates a real permission set, requests
    /// run with full access under the caller id from `x-user-id`.
    pub fn system(id: Uuid) -> Self {
        let permissions = [
            Permission::CampaignsViewAll,
            Permission::CampaignsViewOwn,
            Permission::CampaignsCreate,
            Permission::CampaignsEditAll,
            Permission::CampaignsEditOwn,
            Permission::CampaignsDeleteAll,
            Permission::CampaignsDeleteOwn,
            Permission::CampaignsExecute,
            Permission::ProspectsView,
            Permission::ProspectsCreate,
            Permission::ProspectsEdit,
            Permission::ProspectsDelete,
            Permission::ProspectsConvert,
        ]
        .into_iter()
        .collect();
        Self { id, permissions }
    }

    pub fn from_headers(headers: &HeaderMap) -> Self {
        let id = headers
            .get("x-user-id")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| Uuid::parse_str(s).ok())
            .unwrap_or(Uuid::nil());
        Self::system(id)
    }

    pub fn has(&self, permission: Permission) -> bool {
        self.permissions.contains(&permission)
    }

    /// view_all, or view_own combined with ownership.
    pub fn can_view_campaign(&self, owner_id: Uuid) -> bool {
        self.has(Permission::CampaignsViewAll)
            || (self.has(Permission::CampaignsViewOwn) && self.id == owner_id)
    }

    pub fn can_edit_campaign(&self, owner_id: Uuid) -> bool {
        self.has(Permission::CampaignsEditAll)
            || (self.has(Permission::CampaignsEditOwn) && self.id == owner_id)
    }

    pub fn can_delete_campaign(&self, owner_id: Uuid) -> bool {
        self.has(Permission::CampaignsDeleteAll)
            || (self.has(Permission::CampaignsDeleteOwn) && self.id == owner_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ownership_scoped_view() {
        let owner = Uuid::new_v4();
        let other = Uuid::new_v4();
        let actor = Actor::new(owner, [Permission::CampaignsViewOwn].into_iter().collect());
        assert!(actor.can_view_campaign(owner));
        assert!(!actor.can_view_campaign(other));
    }

    #[test]
    fn test_view_all_ignores_ownership() {
        let actor = Actor::new(
            Uuid::new_v4(),
            [Permission::CampaignsViewAll].into_iter().collect(),
        );
        assert!(actor.can_view_campaign(Uuid::new_v4()));
    }

    #[test]
    fn test_system_actor_has_execute() {
        let actor = Actor::system(Uuid::nil());
        assert!(actor.has(Permission::CampaignsExecute));
        assert!(actor.has(Permission::ProspectsConvert));
    }
}
