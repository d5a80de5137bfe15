use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The seven onboarding stages a site moves through, in canonical order.
///
/// `Stage::ALL` is the only place the order is declared. Ordering, adjacency
/// and the stats key set are all derived from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "&'static str", try_from = "String")]
pub enum Stage {
    SiteCreated,
    StudyDone,
    ScopingDone,
    Approved,
    ProcurementDone,
    Deployed,
    Live,
}

impl Stage {
    pub const ALL: [Stage; 7] = [
        Stage::SiteCreated,
        Stage::StudyDone,
        Stage::ScopingDone,
        Stage::Approved,
        Stage::ProcurementDone,
        Stage::Deployed,
        Stage::Live,
    ];

    /// Position of this stage in the canonical order.
    pub fn index(self) -> usize {
        Self::ALL
            .iter()
            .position(|s| *s == self)
            .unwrap_or_default()
    }

    pub fn from_index(index: usize) -> Option<Stage> {
        Self::ALL.get(index).copied()
    }

    pub fn is_terminal(self) -> bool {
        self.index() == Self::ALL.len() - 1
    }

    /// Canonical storage/wire key.
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::SiteCreated => "Created",
            Stage::StudyDone => "site_study_done",
            Stage::ScopingDone => "scoping_done",
            Stage::Approved => "approved",
            Stage::ProcurementDone => "procurement_done",
            Stage::Deployed => "deployed",
            Stage::Live => "live",
        }
    }

    /// Human readable label for dashboards and CLI output.
    pub fn label(self) -> &'static str {
        match self {
            Stage::SiteCreated => "Site Created",
            Stage::StudyDone => "Site Study Done",
            Stage::ScopingDone => "Scoping Done",
            Stage::Approved => "Approved",
            Stage::ProcurementDone => "Procurement Done",
            Stage::Deployed => "Deployed",
            Stage::Live => "Live",
        }
    }

    /// Name of the workflow page that captures this stage's payload.
    pub fn page_name(self) -> &'static str {
        match self {
            Stage::SiteCreated => "create_site",
            Stage::StudyDone => "site_study",
            Stage::ScopingDone => "scoping",
            Stage::Approved => "approval",
            Stage::ProcurementDone => "procurement",
            Stage::Deployed => "deployment",
            Stage::Live => "go_live",
        }
    }

    pub fn from_page_name(page: &str) -> Option<Stage> {
        Self::ALL.into_iter().find(|s| s.page_name() == page)
    }
}

impl PartialOrd for Stage {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Stage {
    fn cmp(&self, other: &Self) -> Ordering {
        self.index().cmp(&other.index())
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown stage: {0}")]
pub struct StageParseError(pub String);

impl FromStr for Stage {
    type Err = StageParseError;

    /// Accepts the canonical key, the variant name and the legacy spellings
    /// older dashboard builds still write.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_ascii_lowercase().replace('-', "_");
        let stage = match key.as_str() {
            "created" | "site_created" | "sitecreated" => Stage::SiteCreated,
            "site_study_done" | "studydone" | "study_done" | "study_in_progress"
            | "study_completed" => Stage::StudyDone,
            "scoping_done" | "scopingdone" | "hardware_scoped" => Stage::ScopingDone,
            "approved" | "approval_approved" => Stage::Approved,
            "procurement_done" | "procurementdone" | "procurement" => Stage::ProcurementDone,
            "deployed" | "deployment" | "deployment_completed" => Stage::Deployed,
            "live" => Stage::Live,
            _ => return Err(StageParseError(s.to_string())),
        };
        Ok(stage)
    }
}

impl From<Stage> for &'static str {
    fn from(stage: Stage) -> Self {
        stage.as_str()
    }
}

impl TryFrom<String> for Stage {
    type Error = StageParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Authorization class of the actor requesting a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "&'static str", try_from = "String")]
pub enum Role {
    Admin,
    OpsManager,
    DeploymentEngineer,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Admin, Role::OpsManager, Role::DeploymentEngineer];

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::OpsManager => "ops_manager",
            Role::DeploymentEngineer => "deployment_engineer",
        }
    }

    pub fn is_admin(self) -> bool {
        self == Role::Admin
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown role: {0}")]
pub struct RoleParseError(pub String);

impl FromStr for Role {
    type Err = RoleParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_ascii_lowercase().replace('-', "_");
        match key.as_str() {
            "admin" => Ok(Role::Admin),
            "ops_manager" | "opsmanager" => Ok(Role::OpsManager),
            "deployment_engineer" | "deploymentengineer" => Ok(Role::DeploymentEngineer),
            _ => Err(RoleParseError(s.to_string())),
        }
    }
}

impl From<Role> for &'static str {
    fn from(role: Role) -> Self {
        role.as_str()
    }
}

impl TryFrom<String> for Role {
    type Error = RoleParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

pub const UNKNOWN_STAGE: &str = "unknown stage";
pub const CANNOT_MOVE_BACKWARDS: &str = "cannot move backwards";

/// Outcome of checking a progression against the canonical order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressionCheck {
    pub valid: bool,
    pub reason: Option<String>,
}

impl ProgressionCheck {
    pub fn ok() -> Self {
        Self {
            valid: true,
            reason: None,
        }
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            valid: false,
            reason: Some(reason.into()),
        }
    }
}

/// Pure functions over the canonical stage order.
pub struct StatusModel;

impl StatusModel {
    /// The stage directly after `current`, or nothing once a site is live.
    pub fn next_stages(current: Stage) -> BTreeSet<Stage> {
        Stage::from_index(current.index() + 1).into_iter().collect()
    }

    /// Same as [`StatusModel::next_stages`] for an untyped key; unknown keys
    /// have no successors.
    pub fn next_stages_for_key(current: &str) -> BTreeSet<Stage> {
        current
            .parse::<Stage>()
            .map(Self::next_stages)
            .unwrap_or_default()
    }

    /// Only a single step forward is a valid progression.
    pub fn validate_progression(current: Stage, target: Stage) -> ProgressionCheck {
        let (from, to) = (current.index(), target.index());
        if to <= from {
            return ProgressionCheck::rejected(CANNOT_MOVE_BACKWARDS);
        }
        if to > from + 1 {
            return match Stage::from_index(from + 1) {
                Some(next) => ProgressionCheck::rejected(format!(
                    "cannot skip stages, next valid is {next}"
                )),
                None => ProgressionCheck::rejected(UNKNOWN_STAGE),
            };
        }
        ProgressionCheck::ok()
    }

    pub fn validate_progression_keys(current: &str, target: &str) -> ProgressionCheck {
        match (current.parse::<Stage>(), target.parse::<Stage>()) {
            (Ok(current), Ok(target)) => Self::validate_progression(current, target),
            _ => ProgressionCheck::rejected(UNKNOWN_STAGE),
        }
    }

    pub fn can_progress(current: Stage, target: Stage, is_admin: bool) -> bool {
        is_admin || Self::validate_progression(current, target).valid
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_order_is_total() {
        for pair in Stage::ALL.windows(2) {
            assert!(pair[0] < pair[1]);
            assert_eq!(pair[0].index() + 1, pair[1].index());
        }
        assert_eq!(Stage::SiteCreated.index(), 0);
        assert!(Stage::Live.is_terminal());
        assert!(!Stage::Deployed.is_terminal());
    }

    #[test]
    fn test_next_stages() {
        assert_eq!(
            StatusModel::next_stages(Stage::SiteCreated),
            BTreeSet::from([Stage::StudyDone])
        );
        assert_eq!(
            StatusModel::next_stages(Stage::ProcurementDone),
            BTreeSet::from([Stage::Deployed])
        );
        assert!(StatusModel::next_stages(Stage::Live).is_empty());
    }

    #[test]
    fn test_next_stages_for_unknown_key_is_empty() {
        assert!(StatusModel::next_stages_for_key("archived").is_empty());
        assert_eq!(
            StatusModel::next_stages_for_key("approved"),
            BTreeSet::from([Stage::ProcurementDone])
        );
    }

    #[test]
    fn test_validate_progression_rules() {
        assert_eq!(
            StatusModel::validate_progression(Stage::Approved, Stage::ProcurementDone),
            ProgressionCheck::ok()
        );

        let backwards = StatusModel::validate_progression(Stage::Deployed, Stage::Approved);
        assert!(!backwards.valid);
        assert_eq!(backwards.reason.as_deref(), Some("cannot move backwards"));

        let same = StatusModel::validate_progression(Stage::ScopingDone, Stage::ScopingDone);
        assert_eq!(same.reason.as_deref(), Some("cannot move backwards"));

        let skip = StatusModel::validate_progression(Stage::SiteCreated, Stage::Approved);
        assert!(!skip.valid);
        assert_eq!(
            skip.reason.as_deref(),
            Some("cannot skip stages, next valid is site_study_done")
        );
    }

    #[test]
    fn test_validate_progression_unknown_keys() {
        let check = StatusModel::validate_progression_keys("archived", "live");
        assert_eq!(check.reason.as_deref(), Some("unknown stage"));
        let check = StatusModel::validate_progression_keys("Created", "nowhere");
        assert_eq!(check.reason.as_deref(), Some("unknown stage"));
        assert!(StatusModel::validate_progression_keys("Created", "site_study_done").valid);
    }

    #[test]
    fn test_can_progress_admin_bypass() {
        assert!(StatusModel::can_progress(Stage::Live, Stage::SiteCreated, true));
        assert!(!StatusModel::can_progress(Stage::Live, Stage::SiteCreated, false));
        assert!(StatusModel::can_progress(Stage::Deployed, Stage::Live, false));
    }

    #[test]
    fn test_stage_parsing_accepts_legacy_spellings() {
        assert_eq!("Created".parse::<Stage>().unwrap(), Stage::SiteCreated);
        assert_eq!("created".parse::<Stage>().unwrap(), Stage::SiteCreated);
        assert_eq!("SiteCreated".parse::<Stage>().unwrap(), Stage::SiteCreated);
        assert_eq!("study_completed".parse::<Stage>().unwrap(), Stage::StudyDone);
        assert_eq!("hardware_scoped".parse::<Stage>().unwrap(), Stage::ScopingDone);
        assert_eq!("procurement-done".parse::<Stage>().unwrap(), Stage::ProcurementDone);
        assert!("archived".parse::<Stage>().is_err());
        assert!("live_ready".parse::<Stage>().is_err());
    }

    #[test]
    fn test_stage_serializes_to_canonical_key() {
        let json = serde_json::to_string(&Stage::StudyDone).unwrap();
        assert_eq!(json, "\"site_study_done\"");
        let legacy: Stage = serde_json::from_str("\"study_in_progress\"").unwrap();
        assert_eq!(legacy, Stage::StudyDone);
        assert!(serde_json::from_str::<Stage>("\"archived\"").is_err());
    }

    #[test]
    fn test_page_mapping() {
        for stage in Stage::ALL {
            assert_eq!(Stage::from_page_name(stage.page_name()), Some(stage));
        }
        assert_eq!(Stage::from_page_name("go_live"), Some(Stage::Live));
        assert_eq!(Stage::from_page_name("unknown"), None);
    }

    #[test]
    fn test_role_parsing_and_display() {
        assert_eq!("ops-manager".parse::<Role>().unwrap(), Role::OpsManager);
        assert_eq!("DeploymentEngineer".parse::<Role>().unwrap(), Role::DeploymentEngineer);
        assert_eq!(Role::Admin.to_string(), "admin");
        assert!("viewer".parse::<Role>().is_err());
    }
}
