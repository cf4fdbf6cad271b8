//! Ensemble members and how failed ones are counted.

use pipecast_common::{Aoi, MemberId};
use serde::{Deserialize, Serialize};

/// Result of processing one member for a (date, hour, bin).
#[derive(Debug, Clone)]
pub enum MemberOutcome {
    /// AOIs extracted (possibly none)
    Succeeded(Vec<Aoi>),
    /// Member could not be processed
    Failed(String),
}

/// One member's outcome.
#[derive(Debug, Clone)]
pub struct EnsembleMember {
    pub member: MemberId,
    pub outcome: MemberOutcome,
}

impl EnsembleMember {
    pub fn succeeded(member: MemberId, aois: Vec<Aoi>) -> Self {
        Self {
            member,
            outcome: MemberOutcome::Succeeded(aois),
        }
    }

    pub fn failed(member: MemberId, reason: impl Into<String>) -> Self {
        Self {
            member,
            outcome: MemberOutcome::Failed(reason.into()),
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.outcome, MemberOutcome::Failed(_))
    }
}

/// How failed members enter the probability denominator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingMemberPolicy {
    /// Failed members are left out of the denominator
    #[default]
    Exclude,
    /// Failed members count as members with no coverage
    CountAsZero,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_serde() {
        let p: MissingMemberPolicy = serde_json::from_str("\"count_as_zero\"").unwrap();
        assert_eq!(p, MissingMemberPolicy::CountAsZero);
        assert_eq!(MissingMemberPolicy::default(), MissingMemberPolicy::Exclude);
    }
}
