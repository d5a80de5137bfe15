use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::stage::{Role, Stage, StatusModel};

/// Coarse stage grant for a non-admin role.
///
/// A pair `(from, to)` is permitted when `from` is in `allowed_from` and `to`
/// is in `allowed_to`. The grant is a Cartesian product, so it can admit
/// pairs the sequence check still rejects.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RolePermission {
    #[serde(rename = "from")]
    pub allowed_from: BTreeSet<Stage>,
    #[serde(rename = "to")]
    pub allowed_to: BTreeSet<Stage>,
}

impl RolePermission {
    pub fn new(
        allowed_from: impl IntoIterator<Item = Stage>,
        allowed_to: impl IntoIterator<Item = Stage>,
    ) -> Self {
        Self {
            allowed_from: allowed_from.into_iter().collect(),
            allowed_to: allowed_to.into_iter().collect(),
        }
    }

    pub fn permits(&self, from: Stage, to: Stage) -> bool {
        self.allowed_from.contains(&from) && self.allowed_to.contains(&to)
    }
}

/// Maps actor roles to the stages they may move sites between.
///
/// Authorization is necessary but not sufficient: a permitted pair must still
/// pass [`StatusModel::validate_progression`] unless the actor is an admin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionAuthorizer {
    grants: BTreeMap<Role, RolePermission>,
}

impl Default for TransitionAuthorizer {
    fn default() -> Self {
        let mut grants = BTreeMap::new();
        grants.insert(
            Role::OpsManager,
            RolePermission::new(
                [Stage::SiteCreated, Stage::StudyDone, Stage::ScopingDone],
                [Stage::StudyDone, Stage::ScopingDone, Stage::Approved],
            ),
        );
        grants.insert(
            Role::DeploymentEngineer,
            RolePermission::new(
                [Stage::Approved, Stage::ProcurementDone],
                [Stage::ProcurementDone, Stage::Deployed, Stage::Live],
            ),
        );
        Self { grants }
    }
}

impl TransitionAuthorizer {
    /// Authorizer with no grants: only admins may move sites.
    pub fn empty() -> Self {
        Self {
            grants: BTreeMap::new(),
        }
    }

    /// Default grants with the given entries replacing those of their roles.
    /// Admin entries are ignored.
    pub fn with_overrides(overrides: &BTreeMap<Role, RolePermission>) -> Self {
        let mut authorizer = Self::default();
        for (role, permission) in overrides {
            authorizer = authorizer.with_grant(*role, permission.clone());
        }
        authorizer
    }

    pub fn with_grant(mut self, role: Role, permission: RolePermission) -> Self {
        if role.is_admin() {
            tracing::warn!("Ignoring permission grant for admin role; admins are always permitted");
            return self;
        }
        self.grants.insert(role, permission);
        self
    }

    pub fn grant(&self, role: Role) -> Option<&RolePermission> {
        self.grants.get(&role)
    }

    pub fn has_permission(&self, from: Stage, to: Stage, role: Role) -> bool {
        if role.is_admin() {
            return true;
        }
        self.grants
            .get(&role)
            .is_some_and(|permission| permission.permits(from, to))
    }

    /// Advisory listing of the stages `role` could target from `current`.
    /// Role grants are not applied here; they are enforced at transition time.
    pub fn valid_next_stages(&self, current: Stage, role: Role) -> BTreeSet<Stage> {
        if role.is_admin() {
            return Stage::ALL.into_iter().filter(|s| *s != current).collect();
        }
        StatusModel::next_stages(current)
    }
}
