use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{EvaluationId, Period, PersonId, TemplateId};
use super::ledger::IndicatorResponse;
use super::snapshot::StructureSnapshot;
use super::workflow::{WorkflowStage, WorkflowState};

/// Fields shared by both evaluation variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationCore {
    pub id: EvaluationId,
    pub subject: PersonId,
    pub template: TemplateId,
    pub period: Period,
    pub started_at: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
    pub highlights: Option<String>,
    pub improvements: Option<String>,
    pub achievement_score: f64,
    pub snapshot: Option<StructureSnapshot>,
    pub snapshot_version: Option<String>,
    pub responses: Vec<IndicatorResponse>,
}

impl EvaluationCore {
    pub(crate) fn new(
        id: EvaluationId,
        subject: PersonId,
        template: TemplateId,
        period: Period,
        snapshot: StructureSnapshot,
        snapshot_version: String,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            subject,
            template,
            period,
            started_at: now,
            last_modified: now,
            highlights: None,
            improvements: None,
            achievement_score: 0.0,
            snapshot: Some(snapshot),
            snapshot_version: Some(snapshot_version),
            responses: Vec::new(),
        }
    }

    /// Snapshot required for scoring and validation; absence outside the
    /// explicit backfill path is a data-integrity failure.
    pub fn snapshot(&self) -> Result<&StructureSnapshot, IntegrityError> {
        self.snapshot
            .as_ref()
            .ok_or(IntegrityError::MissingSnapshot(self.id))
    }

    pub fn answered(&self) -> usize {
        self.responses.len()
    }

    pub fn expected(&self) -> usize {
        self.snapshot
            .as_ref()
            .map(StructureSnapshot::indicator_count)
            .unwrap_or(0)
    }
}

/// Evaluation a person fills in about themself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelfEvaluation {
    pub core: EvaluationCore,
    pub completed: bool,
}

impl SelfEvaluation {
    pub fn status_view(&self) -> EvaluationStatusView {
        EvaluationStatusView {
            id: self.core.id,
            subject: self.core.subject,
            evaluator: None,
            template: self.core.template,
            period: self.core.period.as_str().to_string(),
            stage: if self.completed {
                WorkflowStage::Completed.label()
            } else {
                WorkflowStage::InProgress.label()
            },
            achievement_score: self.core.achievement_score,
            snapshot_version: self.core.snapshot_version.clone(),
            answered: self.core.answered(),
            expected: self.core.expected(),
        }
    }
}

/// Evaluation a manager records about a subordinate, carrying the approval
/// workflow. `paired_self_template` is copied from the template at creation
/// so the comparator can resolve the parallel self-evaluation later without
/// consulting the (mutable) template store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManagerEvaluation {
    pub core: EvaluationCore,
    pub evaluator: PersonId,
    pub paired_self_template: Option<TemplateId>,
    pub feedback: Option<String>,
    pub workflow: WorkflowState,
}

impl ManagerEvaluation {
    pub fn stage(&self) -> WorkflowStage {
        self.workflow.stage()
    }

    pub fn status_view(&self) -> EvaluationStatusView {
        EvaluationStatusView {
            id: self.core.id,
            subject: self.core.subject,
            evaluator: Some(self.evaluator),
            template: self.core.template,
            period: self.core.period.as_str().to_string(),
            stage: self.stage().label(),
            achievement_score: self.core.achievement_score,
            snapshot_version: self.core.snapshot_version.clone(),
            answered: self.core.answered(),
            expected: self.core.expected(),
        }
    }
}

/// Read view exposed by the HTTP surface.
#[derive(Debug, Clone, Serialize)]
pub struct EvaluationStatusView {
    pub id: EvaluationId,
    pub subject: PersonId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evaluator: Option<PersonId>,
    pub template: TemplateId,
    pub period: String,
    pub stage: &'static str,
    pub achievement_score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot_version: Option<String>,
    pub answered: usize,
    pub expected: usize,
}

/// Programmer/migration errors: never recovered implicitly, only through the
/// explicit backfill operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum IntegrityError {
    #[error("evaluation {0} has no structure snapshot; run a snapshot backfill")]
    MissingSnapshot(EvaluationId),
}
