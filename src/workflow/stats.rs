use std::collections::BTreeMap;

use super::stage::Stage;

/// Number of sites currently sitting at each stage.
pub type StageCounts = BTreeMap<Stage, u64>;

pub struct WorkflowStats;

impl WorkflowStats {
    /// Every stage starts at zero so empty stages still show up.
    pub fn empty() -> StageCounts {
        Stage::ALL.into_iter().map(|stage| (stage, 0)).collect()
    }

    pub fn aggregate(stages: impl IntoIterator<Item = Stage>) -> StageCounts {
        let mut counts = Self::empty();
        for stage in stages {
            *counts.entry(stage).or_insert(0) += 1;
        }
        counts
    }

    pub fn total(counts: &StageCounts) -> u64 {
        counts.values().sum()
    }
}
