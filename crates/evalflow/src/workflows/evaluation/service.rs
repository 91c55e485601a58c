use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::comparison::{
    self, ComparisonReport, ComparisonSummary, NormalizedStructure,
};
use super::domain::{EvaluationId, Period, PersonId, TemplateId, ValidationError};
use super::instance::{
    EvaluationCore, EvaluationStatusView, IntegrityError, ManagerEvaluation, SelfEvaluation,
};
use super::ledger::{self, ResponseEntry};
use super::repository::{
    EvaluationNotice, EvaluationRef, EvaluationRepository, NotificationPublisher, RepositoryError,
    TemplateStore,
};
use super::scoring::{self, round2, ScoreBreakdown};
use super::snapshot;
use super::workflow::{StateError, WorkflowAction, WorkflowError, WorkflowEvent, WorkflowStage};

/// Service facade composing the template store, evaluation repository, and
/// notification publisher. All workflow invariants are enforced here before
/// anything is persisted; notification failures are logged and swallowed.
pub struct EvaluationService<T, R, N> {
    templates: Arc<T>,
    repository: Arc<R>,
    notifier: Arc<N>,
}

static EVALUATION_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_evaluation_id() -> EvaluationId {
    EvaluationId(EVALUATION_SEQUENCE.fetch_add(1, Ordering::Relaxed))
}

/// Parameters to create one self-evaluation.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateSelfEvaluation {
    pub subject: PersonId,
    pub template: TemplateId,
    pub period: Period,
}

/// Parameters to create one manager-evaluation.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateManagerEvaluation {
    pub subject: PersonId,
    pub evaluator: PersonId,
    pub template: TemplateId,
    pub period: Period,
}

/// Self-evaluation assignment batch: one instance per subject.
#[derive(Debug, Clone, Deserialize)]
pub struct SelfAssignment {
    pub template: TemplateId,
    pub period: Period,
    pub subjects: Vec<PersonId>,
}

/// Manager-evaluation assignment batch: one instance per entry.
#[derive(Debug, Clone, Deserialize)]
pub struct ManagerAssignment {
    pub template: TemplateId,
    pub period: Period,
    pub entries: Vec<AssignmentEntry>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct AssignmentEntry {
    pub subject: PersonId,
    pub evaluator: PersonId,
}

/// Result of processing an assignment batch. Subjects whose uniqueness key
/// is already taken are skipped rather than failing the batch.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AssignmentOutcome {
    pub created: Vec<EvaluationId>,
    pub skipped: usize,
}

/// A full response submission, authoritative for the instance's response
/// set. `feedback` only applies to manager evaluations.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResponseSubmission {
    pub responses: Vec<ResponseEntry>,
    #[serde(default)]
    pub highlights: Option<String>,
    #[serde(default)]
    pub improvements: Option<String>,
    #[serde(default)]
    pub feedback: Option<String>,
}

/// Result of the snapshot backfill sweep.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct BackfillSummary {
    pub examined: usize,
    pub backfilled: usize,
    pub failed: usize,
}

/// Error raised by the evaluation service. Notification errors are absent on
/// purpose: they are logged, never propagated.
#[derive(Debug, thiserror::Error)]
pub enum EvaluationServiceError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    State(#[from] StateError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Integrity(#[from] IntegrityError),
}

impl<T, R, N> EvaluationService<T, R, N>
where
    T: TemplateStore + 'static,
    R: EvaluationRepository + 'static,
    N: NotificationPublisher + 'static,
{
    pub fn new(templates: Arc<T>, repository: Arc<R>, notifier: Arc<N>) -> Self {
        Self {
            templates,
            repository,
            notifier,
        }
    }

    /// Create a self-evaluation, capturing the structure snapshot at this
    /// moment. Rejects duplicates for (subject, template, period).
    pub fn create_self(
        &self,
        request: CreateSelfEvaluation,
    ) -> Result<SelfEvaluation, EvaluationServiceError> {
        let template = self
            .templates
            .fetch(request.template)?
            .ok_or(ValidationError::UnknownTemplate {
                template: request.template,
            })?;

        let now = Utc::now();
        let (structure, version) = snapshot::capture(&template, now);
        let record = SelfEvaluation {
            core: EvaluationCore::new(
                next_evaluation_id(),
                request.subject,
                request.template,
                request.period,
                structure,
                version,
                now,
            ),
            completed: false,
        };

        match self.repository.insert_self(record) {
            Ok(stored) => Ok(stored),
            Err(RepositoryError::Conflict) => Err(ValidationError::DuplicateEvaluation.into()),
            Err(other) => Err(other.into()),
        }
    }

    /// Create a manager-evaluation, capturing the snapshot and denormalizing
    /// the paired self template onto the record. Rejects duplicates for
    /// (subject, evaluator, template, period).
    pub fn create_manager(
        &self,
        request: CreateManagerEvaluation,
    ) -> Result<ManagerEvaluation, EvaluationServiceError> {
        let template = self
            .templates
            .fetch(request.template)?
            .ok_or(ValidationError::UnknownTemplate {
                template: request.template,
            })?;

        let now = Utc::now();
        let (structure, version) = snapshot::capture(&template, now);
        let record = ManagerEvaluation {
            core: EvaluationCore::new(
                next_evaluation_id(),
                request.subject,
                request.template,
                request.period,
                structure,
                version,
                now,
            ),
            evaluator: request.evaluator,
            paired_self_template: template.paired_self_template,
            feedback: None,
            workflow: Default::default(),
        };

        match self.repository.insert_manager(record) {
            Ok(stored) => Ok(stored),
            Err(RepositoryError::Conflict) => Err(ValidationError::DuplicateEvaluation.into()),
            Err(other) => Err(other.into()),
        }
    }

    /// Process a self-evaluation assignment batch.
    pub fn assign_self(
        &self,
        assignment: SelfAssignment,
    ) -> Result<AssignmentOutcome, EvaluationServiceError> {
        let mut outcome = AssignmentOutcome::default();
        for subject in assignment.subjects {
            match self.create_self(CreateSelfEvaluation {
                subject,
                template: assignment.template,
                period: assignment.period.clone(),
            }) {
                Ok(record) => outcome.created.push(record.core.id),
                Err(EvaluationServiceError::Validation(ValidationError::DuplicateEvaluation)) => {
                    outcome.skipped += 1;
                }
                Err(other) => return Err(other),
            }
        }
        Ok(outcome)
    }

    /// Process a manager-evaluation assignment batch.
    pub fn assign_manager(
        &self,
        assignment: ManagerAssignment,
    ) -> Result<AssignmentOutcome, EvaluationServiceError> {
        let mut outcome = AssignmentOutcome::default();
        for entry in assignment.entries {
            match self.create_manager(CreateManagerEvaluation {
                subject: entry.subject,
                evaluator: entry.evaluator,
                template: assignment.template,
                period: assignment.period.clone(),
            }) {
                Ok(record) => outcome.created.push(record.core.id),
                Err(EvaluationServiceError::Validation(ValidationError::DuplicateEvaluation)) => {
                    outcome.skipped += 1;
                }
                Err(other) => return Err(other),
            }
        }
        Ok(outcome)
    }

    pub fn self_evaluation(
        &self,
        id: EvaluationId,
    ) -> Result<SelfEvaluation, EvaluationServiceError> {
        let record = self
            .repository
            .fetch_self(id)?
            .ok_or(RepositoryError::NotFound)?;
        Ok(record)
    }

    pub fn manager_evaluation(
        &self,
        id: EvaluationId,
    ) -> Result<ManagerEvaluation, EvaluationServiceError> {
        let record = self
            .repository
            .fetch_manager(id)?
            .ok_or(RepositoryError::NotFound)?;
        Ok(record)
    }

    /// Status views of a subject's self-evaluations, newest first,
    /// optionally filtered by completion.
    pub fn self_evaluations_for(
        &self,
        subject: PersonId,
        completed: Option<bool>,
    ) -> Result<Vec<EvaluationStatusView>, EvaluationServiceError> {
        let mut records = self.repository.self_evaluations_for(subject)?;
        records.sort_by(|a, b| b.core.started_at.cmp(&a.core.started_at));
        Ok(records
            .iter()
            .filter(|record| completed.map_or(true, |wanted| record.completed == wanted))
            .map(SelfEvaluation::status_view)
            .collect())
    }

    /// Status views of the evaluations a manager authors, newest first,
    /// optionally filtered by workflow stage.
    pub fn manager_evaluations_for(
        &self,
        evaluator: PersonId,
        stage: Option<WorkflowStage>,
    ) -> Result<Vec<EvaluationStatusView>, EvaluationServiceError> {
        let mut records = self.repository.manager_evaluations_for(evaluator)?;
        records.sort_by(|a, b| b.core.started_at.cmp(&a.core.started_at));
        Ok(records
            .iter()
            .filter(|record| stage.map_or(true, |wanted| record.stage() == wanted))
            .map(ManagerEvaluation::status_view)
            .collect())
    }

    /// Submit the authoritative response set for a self-evaluation: validate
    /// against the snapshot, upsert with pruning, rescore, persist as one
    /// update.
    pub fn submit_self_responses(
        &self,
        id: EvaluationId,
        submission: ResponseSubmission,
    ) -> Result<ScoreBreakdown, EvaluationServiceError> {
        let mut record = self
            .repository
            .fetch_self(id)?
            .ok_or(RepositoryError::NotFound)?;

        let now = Utc::now();
        let breakdown = apply_submission(&mut record.core, &submission.responses, now)?;
        if let Some(highlights) = submission.highlights {
            record.core.highlights = Some(highlights);
        }
        if let Some(improvements) = submission.improvements {
            record.core.improvements = Some(improvements);
        }

        self.repository.update_self(record)?;
        Ok(breakdown)
    }

    /// Manager-evaluation counterpart of [`Self::submit_self_responses`],
    /// additionally updating the feedback narrative.
    pub fn submit_manager_responses(
        &self,
        id: EvaluationId,
        submission: ResponseSubmission,
    ) -> Result<ScoreBreakdown, EvaluationServiceError> {
        let mut record = self
            .repository
            .fetch_manager(id)?
            .ok_or(RepositoryError::NotFound)?;

        let now = Utc::now();
        let breakdown = apply_submission(&mut record.core, &submission.responses, now)?;
        if let Some(highlights) = submission.highlights {
            record.core.highlights = Some(highlights);
        }
        if let Some(improvements) = submission.improvements {
            record.core.improvements = Some(improvements);
        }
        if let Some(feedback) = submission.feedback {
            record.feedback = Some(feedback);
        }

        self.repository.update_manager(record)?;
        Ok(breakdown)
    }

    /// Mark a self-evaluation completed and notify. Completing an already
    /// completed instance is a no-op rather than an error.
    pub fn complete_self(
        &self,
        id: EvaluationId,
    ) -> Result<SelfEvaluation, EvaluationServiceError> {
        let mut record = self
            .repository
            .fetch_self(id)?
            .ok_or(RepositoryError::NotFound)?;

        if !record.completed {
            record.completed = true;
            record.core.last_modified = Utc::now();
            self.repository.update_self(record.clone())?;

            let mut details = BTreeMap::new();
            details.insert("period".to_string(), record.core.period.to_string());
            details.insert(
                "achievement_score".to_string(),
                format!("{:.2}", record.core.achievement_score),
            );
            self.publish(EvaluationNotice {
                template: "self_evaluation_completed".to_string(),
                evaluation: record.core.id,
                recipient: None,
                details,
            });
        }

        Ok(record)
    }

    /// Advance a manager-evaluation workflow by one named action. The
    /// transition is validated, persisted, and only then notified; a failed
    /// notification never rolls the transition back.
    pub fn advance(
        &self,
        id: EvaluationId,
        action: WorkflowAction,
    ) -> Result<WorkflowStage, EvaluationServiceError> {
        let mut record = self
            .repository
            .fetch_manager(id)?
            .ok_or(RepositoryError::NotFound)?;

        let now = Utc::now();
        let event = record.workflow.apply(action, now).map_err(|err| match err {
            WorkflowError::State(state) => EvaluationServiceError::State(state),
            WorkflowError::Validation(validation) => EvaluationServiceError::Validation(validation),
        })?;
        record.workflow.validate()?;
        record.core.last_modified = now;

        self.repository.update_manager(record.clone())?;
        self.dispatch(&record, event);

        Ok(record.stage())
    }

    /// Build the side-by-side comparison report for a manager evaluation and
    /// its positionally parallel self-evaluation, refreshing both stored
    /// achievement scores first where a snapshot is present.
    pub fn compare(
        &self,
        manager_id: EvaluationId,
    ) -> Result<ComparisonReport, EvaluationServiceError> {
        let mut manager = self
            .repository
            .fetch_manager(manager_id)?
            .ok_or(RepositoryError::NotFound)?;
        if refresh_score(&mut manager.core) {
            self.repository.update_manager(manager.clone())?;
        }

        let paired_template = manager
            .paired_self_template
            .unwrap_or(manager.core.template);
        let mut self_eval = self.repository.find_self(
            manager.core.subject,
            paired_template,
            &manager.core.period,
        )?;
        if let Some(record) = self_eval.as_mut() {
            if refresh_score(&mut record.core) {
                self.repository.update_self(record.clone())?;
            }
        }

        let manager_structure = self.structure_for(&manager.core)?;
        let self_structure = match &self_eval {
            Some(record) => Some(self.structure_for(&record.core)?),
            None => None,
        };

        let self_side = match (&self_structure, &self_eval) {
            (Some(structure), Some(record)) => {
                Some((structure, record.core.responses.as_slice()))
            }
            _ => None,
        };
        let (areas, totals) =
            comparison::walk(&manager_structure, &manager.core.responses, self_side);

        let answered_manager =
            comparison::answered_count(&manager_structure, &manager.core.responses);
        let answered_self = match (&self_structure, &self_eval) {
            (Some(structure), Some(record)) => {
                comparison::answered_count(structure, &record.core.responses)
            }
            _ => 0,
        };

        let self_points = (totals.self_points > 0.0).then_some(totals.self_points);
        let manager_points = (totals.manager_points > 0.0).then_some(totals.manager_points);
        let max_points = (totals.max_points > 0.0).then_some(totals.max_points);
        let self_percentage = self_eval
            .as_ref()
            .map(|record| record.core.achievement_score);
        let manager_percentage = Some(manager.core.achievement_score);

        let summary = ComparisonSummary {
            delta_points: match (manager_points, self_points) {
                (Some(manager), Some(own)) => Some(manager - own),
                _ => None,
            },
            delta_percentage: match (manager_percentage, self_percentage) {
                (Some(manager), Some(own)) => Some(round2(manager - own)),
                _ => None,
            },
            self_points,
            manager_points,
            max_points,
            self_percentage,
            manager_percentage,
            answered_self,
            answered_manager,
        };

        let template_name = manager
            .core
            .snapshot
            .as_ref()
            .map(|structure| structure.template_name.clone())
            .or_else(|| {
                self.templates
                    .fetch(manager.core.template)
                    .ok()
                    .flatten()
                    .map(|template| template.name)
            })
            .unwrap_or_else(|| manager.core.template.to_string());

        Ok(ComparisonReport {
            manager_evaluation: manager.core.id,
            self_evaluation: self_eval.as_ref().map(|record| record.core.id),
            subject: manager.core.subject,
            evaluator: manager.evaluator,
            template: manager.core.template,
            template_name,
            period: manager.core.period.to_string(),
            areas,
            summary,
        })
    }

    /// Capture a snapshot from the *current* template onto a legacy instance
    /// that predates the snapshot mechanism. The only sanctioned repair path
    /// for a missing snapshot; every backfill is logged.
    pub fn backfill(
        &self,
        reference: EvaluationRef,
    ) -> Result<String, EvaluationServiceError> {
        match reference {
            EvaluationRef::SelfEvaluation(id) => {
                let mut record = self
                    .repository
                    .fetch_self(id)?
                    .ok_or(RepositoryError::NotFound)?;
                if record.core.snapshot.is_some() {
                    return Ok(record.core.snapshot_version.clone().unwrap_or_default());
                }
                let version = self.capture_onto(&mut record.core)?;
                self.repository.update_self(record)?;
                Ok(version)
            }
            EvaluationRef::ManagerEvaluation(id) => {
                let mut record = self
                    .repository
                    .fetch_manager(id)?
                    .ok_or(RepositoryError::NotFound)?;
                if record.core.snapshot.is_some() {
                    return Ok(record.core.snapshot_version.clone().unwrap_or_default());
                }
                let version = self.capture_onto(&mut record.core)?;
                self.repository.update_manager(record)?;
                Ok(version)
            }
        }
    }

    /// Maintenance sweep over every instance lacking a snapshot. Individual
    /// failures are logged and counted, not propagated.
    pub fn backfill_missing(&self) -> Result<BackfillSummary, EvaluationServiceError> {
        let pending = self.repository.missing_snapshots()?;
        let mut summary = BackfillSummary {
            examined: pending.len(),
            ..Default::default()
        };

        for reference in pending {
            match self.backfill(reference) {
                Ok(_) => summary.backfilled += 1,
                Err(err) => {
                    warn!(?reference, error = %err, "snapshot backfill failed");
                    summary.failed += 1;
                }
            }
        }

        Ok(summary)
    }

    fn structure_for(
        &self,
        core: &EvaluationCore,
    ) -> Result<NormalizedStructure, EvaluationServiceError> {
        if let Some(structure) = &core.snapshot {
            return Ok(comparison::normalize_snapshot(structure));
        }
        let template =
            self.templates
                .fetch(core.template)?
                .ok_or(ValidationError::UnknownTemplate {
                    template: core.template,
                })?;
        Ok(comparison::normalize_template(&template))
    }

    fn capture_onto(
        &self,
        core: &mut EvaluationCore,
    ) -> Result<String, EvaluationServiceError> {
        let template =
            self.templates
                .fetch(core.template)?
                .ok_or(ValidationError::UnknownTemplate {
                    template: core.template,
                })?;
        let now = Utc::now();
        let (structure, version) = snapshot::capture(&template, now);
        warn!(
            evaluation = %core.id,
            template = %core.template,
            version = %version,
            "backfilling structure snapshot from the current template"
        );
        core.snapshot = Some(structure);
        core.snapshot_version = Some(version.clone());
        core.last_modified = now;
        Ok(version)
    }

    fn dispatch(&self, record: &ManagerEvaluation, event: WorkflowEvent) {
        let recipient = if event.notifies_evaluator() {
            record.evaluator
        } else {
            record.core.subject
        };

        let mut details = BTreeMap::new();
        details.insert("period".to_string(), record.core.period.to_string());
        details.insert("stage".to_string(), record.stage().label().to_string());
        details.insert(
            "achievement_score".to_string(),
            format!("{:.2}", record.core.achievement_score),
        );
        if event == WorkflowEvent::SignedWithObjection {
            if let Some(reason) = &record.workflow.objection_reason {
                details.insert("objection_reason".to_string(), reason.clone());
            }
        }

        self.publish(EvaluationNotice {
            template: event.notice_template().to_string(),
            evaluation: record.core.id,
            recipient: Some(recipient),
            details,
        });
    }

    fn publish(&self, notice: EvaluationNotice) {
        let evaluation = notice.evaluation;
        if let Err(err) = self.notifier.publish(notice) {
            warn!(evaluation = %evaluation, error = %err, "notification dispatch failed");
        }
    }
}

/// Validate, upsert, and rescore one submission against the instance's
/// snapshot. Nothing is touched unless the whole payload validates.
fn apply_submission(
    core: &mut EvaluationCore,
    entries: &[ResponseEntry],
    now: DateTime<Utc>,
) -> Result<ScoreBreakdown, EvaluationServiceError> {
    let version = core.snapshot_version.clone().unwrap_or_default();
    let structure = core
        .snapshot
        .as_ref()
        .ok_or(IntegrityError::MissingSnapshot(core.id))?;

    ledger::validate(structure, &version, entries)?;
    ledger::apply(&mut core.responses, entries, now);

    let breakdown = scoring::compute(structure, &core.responses);
    core.achievement_score = breakdown.total;
    core.last_modified = now;

    Ok(breakdown)
}

/// Recompute the stored achievement score from the snapshot; returns whether
/// the stored value changed. Instances without a snapshot are left alone.
fn refresh_score(core: &mut EvaluationCore) -> bool {
    let Some(structure) = &core.snapshot else {
        return false;
    };
    let breakdown = scoring::compute(structure, &core.responses);
    if (breakdown.total - core.achievement_score).abs() > f64::EPSILON {
        core.achievement_score = breakdown.total;
        true
    } else {
        false
    }
}
