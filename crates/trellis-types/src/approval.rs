//! Approval decisions recorded against steps.
//!
//! Each decision event produces one immutable [`Approval`] record. A step
//! may accumulate several across re-submissions; none is ever rewritten.

use crate::{ActorId, ApprovalId, StepId, StepStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The two admissible decision values.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Approved,
    Rejected,
}

impl Decision {
    /// The terminal step status this decision drives the step into.
    pub fn step_status(&self) -> StepStatus {
        match self {
            Self::Approved => StepStatus::Approved,
            Self::Rejected => StepStatus::Rejected,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An immutable accept/reject decision against one step.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Approval {
    pub id: ApprovalId,
    pub step_id: StepId,
    pub decision: Decision,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    /// Who asked for the decision; defaults to the step's assignee.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requested_by: Option<ActorId>,
    /// The acting user who decided.
    pub decided_by: ActorId,
    pub decided_at: DateTime<Utc>,
}

impl Approval {
    pub fn new(
        step_id: StepId,
        decision: Decision,
        decided_by: ActorId,
        decided_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: ApprovalId::generate(),
            step_id,
            decision,
            comment: None,
            requested_by: None,
            decided_by,
            decided_at,
        }
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    pub fn with_requested_by(mut self, actor: ActorId) -> Self {
        self.requested_by = Some(actor);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decision_maps_to_terminal_status() {
        assert_eq!(Decision::Approved.step_status(), StepStatus::Approved);
        assert_eq!(Decision::Rejected.step_status(), StepStatus::Rejected);
    }

    #[test]
    fn decision_serde_uses_lowercase() {
        assert_eq!(
            serde_json::to_value(Decision::Approved).unwrap(),
            serde_json::json!("approved")
        );
        let back: Decision = serde_json::from_value(serde_json::json!("rejected")).unwrap();
        assert_eq!(back, Decision::Rejected);
    }

    #[test]
    fn approval_builder_sets_optionals() {
        let approval = Approval::new(
            StepId::new("s1"),
            Decision::Approved,
            ActorId::new("supervisor"),
            Utc::now(),
        )
        .with_comment("looks complete")
        .with_requested_by(ActorId::new("foreman"));

        assert_eq!(approval.comment.as_deref(), Some("looks complete"));
        assert_eq!(approval.requested_by, Some(ActorId::new("foreman")));
        assert_eq!(approval.decided_by, ActorId::new("supervisor"));
    }
}
