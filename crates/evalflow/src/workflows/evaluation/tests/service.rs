use std::sync::Arc;

use super::common::*;
use crate::workflows::evaluation::domain::{PersonId, ValidationError};
use crate::workflows::evaluation::instance::IntegrityError;
use crate::workflows::evaluation::repository::{EvaluationRef, EvaluationRepository};
use crate::workflows::evaluation::service::{
    AssignmentEntry, CreateManagerEvaluation, CreateSelfEvaluation, EvaluationService,
    EvaluationServiceError, ManagerAssignment, ResponseSubmission, SelfAssignment,
};
use crate::workflows::evaluation::workflow::{WorkflowAction, WorkflowStage};

fn submission(pairs: &[(u32, u16)]) -> ResponseSubmission {
    ResponseSubmission {
        responses: entries(pairs),
        ..Default::default()
    }
}

#[test]
fn creating_an_instance_captures_a_snapshot_and_version() {
    let (service, _, _, _) = build_service();

    let record = create_self(&service, SINGLE_TEMPLATE);

    let snapshot = record.core.snapshot.as_ref().expect("snapshot captured");
    assert_eq!(snapshot.template_id, SINGLE_TEMPLATE);
    assert_eq!(snapshot.indicator_count(), 1);
    assert!(record
        .core
        .snapshot_version
        .as_deref()
        .expect("version tag set")
        .starts_with("10_"));
}

#[test]
fn duplicate_instances_are_rejected_per_uniqueness_key() {
    let (service, _, _, _) = build_service();

    create_self(&service, SINGLE_TEMPLATE);
    let duplicate = service.create_self(CreateSelfEvaluation {
        subject: SUBJECT,
        template: SINGLE_TEMPLATE,
        period: period(),
    });

    match duplicate {
        Err(EvaluationServiceError::Validation(ValidationError::DuplicateEvaluation)) => {}
        other => panic!("expected duplicate rejection, got {other:?}"),
    }

    // A different evaluator is a different manager-evaluation key.
    create_manager(&service, MANAGER_TEMPLATE);
    let second_evaluator = service.create_manager(CreateManagerEvaluation {
        subject: SUBJECT,
        evaluator: PersonId(99),
        template: MANAGER_TEMPLATE,
        period: period(),
    });
    assert!(second_evaluator.is_ok());
}

#[test]
fn assignment_batches_create_one_instance_per_subject_and_skip_duplicates() {
    let (service, _, _, _) = build_service();

    create_self(&service, SINGLE_TEMPLATE);

    let outcome = service
        .assign_self(SelfAssignment {
            template: SINGLE_TEMPLATE,
            period: period(),
            subjects: vec![SUBJECT, PersonId(8), PersonId(9)],
        })
        .expect("batch processes");

    assert_eq!(outcome.created.len(), 2);
    assert_eq!(outcome.skipped, 1);

    let managers = service
        .assign_manager(ManagerAssignment {
            template: MANAGER_TEMPLATE,
            period: period(),
            entries: vec![
                AssignmentEntry {
                    subject: PersonId(8),
                    evaluator: EVALUATOR,
                },
                AssignmentEntry {
                    subject: PersonId(9),
                    evaluator: EVALUATOR,
                },
            ],
        })
        .expect("manager batch processes");
    assert_eq!(managers.created.len(), 2);
    assert_eq!(managers.skipped, 0);
}

#[test]
fn submitting_responses_rescores_and_persists_in_one_update() {
    let (service, _, repository, _) = build_service();
    let record = create_self(&service, SINGLE_TEMPLATE);

    let breakdown = service
        .submit_self_responses(record.core.id, submission(&[(101, 4)]))
        .expect("submission accepted");
    assert_eq!(breakdown.total, 100.00);

    let stored = repository
        .fetch_self(record.core.id)
        .expect("fetch succeeds")
        .expect("record present");
    assert_eq!(stored.core.achievement_score, 100.00);
    assert_eq!(stored.core.responses.len(), 1);

    let breakdown = service
        .submit_self_responses(record.core.id, submission(&[(101, 2)]))
        .expect("resubmission accepted");
    assert_eq!(breakdown.total, 50.00);

    let breakdown = service
        .submit_self_responses(record.core.id, submission(&[]))
        .expect("empty submission accepted");
    assert_eq!(breakdown.total, 0.00);

    let stored = repository
        .fetch_self(record.core.id)
        .expect("fetch succeeds")
        .expect("record present");
    assert_eq!(stored.core.achievement_score, 0.00);
    assert!(stored.core.responses.is_empty());
}

#[test]
fn an_invalid_entry_fails_the_whole_submission_without_changes() {
    let (service, _, repository, _) = build_service();
    let record = create_self(&service, TWO_AREA_TEMPLATE);

    service
        .submit_self_responses(record.core.id, submission(&[(201, 2)]))
        .expect("first submission accepted");

    let result = service.submit_self_responses(
        record.core.id,
        submission(&[(202, 3), (999, 1)]),
    );
    assert!(matches!(
        result,
        Err(EvaluationServiceError::Validation(
            ValidationError::UnknownIndicator { indicator: 999, .. }
        ))
    ));

    let stored = repository
        .fetch_self(record.core.id)
        .expect("fetch succeeds")
        .expect("record present");
    assert_eq!(stored.core.responses.len(), 1, "ledger untouched");
    assert_eq!(stored.core.responses[0].indicator, 201);
}

#[test]
fn scores_stay_pinned_to_the_snapshot_when_the_template_changes() {
    let (service, templates, repository, _) = build_service();
    let record = create_self(&service, SINGLE_TEMPLATE);

    service
        .submit_self_responses(record.core.id, submission(&[(101, 2)]))
        .expect("submission accepted");

    // Admin edit after capture: raise the top level to 8 and renumber the
    // indicator, which would halve the percentage and orphan the response if
    // the live template were consulted.
    let mut edited = single_indicator_template();
    edited.areas[0].competencies[0].indicators[0].id = 888;
    edited.areas[0].competencies[0].indicators[0]
        .levels
        .last_mut()
        .expect("level present")
        .score = 8;
    templates.replace(edited);

    let breakdown = service
        .submit_self_responses(record.core.id, submission(&[(101, 2)]))
        .expect("snapshot still accepts indicator 101");
    assert_eq!(breakdown.total, 50.00, "snapshot maxima still apply");

    let stored = repository
        .fetch_self(record.core.id)
        .expect("fetch succeeds")
        .expect("record present");
    assert_eq!(stored.core.achievement_score, 50.00);
}

#[test]
fn workflow_transitions_persist_and_notify_the_counterpart() {
    let (service, _, repository, notifier) = build_service();
    let record = create_manager(&service, MANAGER_TEMPLATE);
    let id = record.core.id;

    let stage = service
        .advance(id, WorkflowAction::Complete)
        .expect("complete applies");
    assert_eq!(stage, WorkflowStage::Completed);

    service
        .advance(id, WorkflowAction::GiveFeedback)
        .expect("feedback applies");
    service
        .advance(id, WorkflowAction::CloseForSignature)
        .expect("close applies");
    let stage = service
        .advance(id, WorkflowAction::Sign)
        .expect("sign applies");
    assert_eq!(stage, WorkflowStage::Signed);

    let stored = repository
        .fetch_manager(id)
        .expect("fetch succeeds")
        .expect("record present");
    assert!(stored.workflow.meeting_date.is_some());
    assert!(stored.workflow.signature_date.is_some());

    let events = notifier.events();
    assert_eq!(
        events
            .iter()
            .map(|notice| notice.template.as_str())
            .collect::<Vec<_>>(),
        vec![
            "manager_evaluation_completed",
            "feedback_recorded",
            "evaluation_closed_for_signature",
            "evaluation_signed",
        ]
    );
    // Forward steps address the subject; the signature addresses the
    // evaluator.
    assert_eq!(events[0].recipient, Some(SUBJECT));
    assert_eq!(events[3].recipient, Some(EVALUATOR));
}

#[test]
fn a_failed_notification_does_not_roll_back_the_transition() {
    let templates = Arc::new(MemoryTemplateStore::default());
    templates.insert(paired_templates().0);
    let repository = Arc::new(MemoryRepository::default());
    let service = EvaluationService::new(
        templates,
        repository.clone(),
        Arc::new(FailingNotifier),
    );

    let record = service
        .create_manager(CreateManagerEvaluation {
            subject: SUBJECT,
            evaluator: EVALUATOR,
            template: MANAGER_TEMPLATE,
            period: period(),
        })
        .expect("manager evaluation created");

    let stage = service
        .advance(record.core.id, WorkflowAction::Complete)
        .expect("transition survives a dead notifier");
    assert_eq!(stage, WorkflowStage::Completed);

    let stored = repository
        .fetch_manager(record.core.id)
        .expect("fetch succeeds")
        .expect("record present");
    assert!(stored.workflow.completed);
}

#[test]
fn a_rejected_sign_leaves_the_record_untouched() {
    let (service, _, repository, notifier) = build_service();
    let record = create_manager(&service, MANAGER_TEMPLATE);
    let id = record.core.id;

    service
        .advance(id, WorkflowAction::Complete)
        .expect("complete applies");

    let result = service.advance(id, WorkflowAction::Sign);
    assert!(matches!(result, Err(EvaluationServiceError::State(_))));

    let stored = repository
        .fetch_manager(id)
        .expect("fetch succeeds")
        .expect("record present");
    assert!(stored.workflow.signature_date.is_none());
    assert_eq!(stored.stage(), WorkflowStage::Completed);
    assert_eq!(notifier.events().len(), 1, "only the completion notified");
}

#[test]
fn denial_records_the_reason_and_notifies_the_evaluator() {
    let (service, _, repository, notifier) = build_service();
    let record = create_manager(&service, MANAGER_TEMPLATE);
    let id = record.core.id;
    close_for_signature(&service, id);

    let short = service.advance(
        id,
        WorkflowAction::Deny {
            reason: "disagree".to_string(),
        },
    );
    assert!(matches!(
        short,
        Err(EvaluationServiceError::Validation(
            ValidationError::ObjectionReasonTooShort { .. }
        ))
    ));

    let stage = service
        .advance(
            id,
            WorkflowAction::Deny {
                reason: valid_objection(),
            },
        )
        .expect("denial applies");
    assert_eq!(stage, WorkflowStage::SignedWithObjection);

    let stored = repository
        .fetch_manager(id)
        .expect("fetch succeeds")
        .expect("record present");
    assert_eq!(
        stored.workflow.objection_reason.as_deref(),
        Some(valid_objection().as_str())
    );

    let last = notifier.events().pop().expect("denial notified");
    assert_eq!(last.template, "evaluation_signed_with_objection");
    assert_eq!(last.recipient, Some(EVALUATOR));
    assert_eq!(
        last.details.get("objection_reason").map(String::as_str),
        Some(valid_objection().as_str())
    );
}

#[test]
fn completing_a_self_evaluation_notifies_once() {
    let (service, _, _, notifier) = build_service();
    let record = create_self(&service, SINGLE_TEMPLATE);

    service
        .complete_self(record.core.id)
        .expect("completion applies");
    service
        .complete_self(record.core.id)
        .expect("re-completion is a no-op");

    let events = notifier.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].template, "self_evaluation_completed");
    assert_eq!(events[0].recipient, None);
}

#[test]
fn listings_filter_by_stage_and_completion() {
    let (service, _, _, _) = build_service();

    let first = create_manager(&service, MANAGER_TEMPLATE);
    let second = service
        .create_manager(CreateManagerEvaluation {
            subject: PersonId(8),
            evaluator: EVALUATOR,
            template: MANAGER_TEMPLATE,
            period: period(),
        })
        .expect("manager evaluation created");
    close_for_signature(&service, second.core.id);

    let all = service
        .manager_evaluations_for(EVALUATOR, None)
        .expect("listing builds");
    assert_eq!(all.len(), 2);

    let pending = service
        .manager_evaluations_for(EVALUATOR, Some(WorkflowStage::PendingSignature))
        .expect("listing builds");
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, second.core.id);

    let in_progress = service
        .manager_evaluations_for(EVALUATOR, Some(WorkflowStage::InProgress))
        .expect("listing builds");
    assert_eq!(in_progress.len(), 1);
    assert_eq!(in_progress[0].id, first.core.id);

    let own = create_self(&service, SINGLE_TEMPLATE);
    service.complete_self(own.core.id).expect("completion applies");
    let completed = service
        .self_evaluations_for(SUBJECT, Some(true))
        .expect("listing builds");
    assert_eq!(completed.len(), 1);
    assert!(service
        .self_evaluations_for(SUBJECT, Some(false))
        .expect("listing builds")
        .is_empty());
}

#[test]
fn scoring_a_legacy_instance_requires_an_explicit_backfill() {
    let (service, _, repository, _) = build_service();
    let record = create_self(&service, SINGLE_TEMPLATE);

    // Strip the snapshot to simulate a row predating the mechanism.
    let mut legacy = record.clone();
    legacy.core.snapshot = None;
    legacy.core.snapshot_version = None;
    repository.update_self(legacy).expect("update succeeds");

    let result = service.submit_self_responses(record.core.id, submission(&[(101, 4)]));
    assert!(matches!(
        result,
        Err(EvaluationServiceError::Integrity(
            IntegrityError::MissingSnapshot(_)
        ))
    ));

    let version = service
        .backfill(EvaluationRef::SelfEvaluation(record.core.id))
        .expect("backfill captures from the current template");
    assert!(version.starts_with("10_"));

    let breakdown = service
        .submit_self_responses(record.core.id, submission(&[(101, 4)]))
        .expect("submission accepted after backfill");
    assert_eq!(breakdown.total, 100.00);
}

#[test]
fn the_backfill_sweep_covers_both_variants_and_counts_failures() {
    let (service, _, repository, _) = build_service();
    let own = create_self(&service, SINGLE_TEMPLATE);
    let manager = create_manager(&service, MANAGER_TEMPLATE);

    let mut legacy_self = own.clone();
    legacy_self.core.snapshot = None;
    repository.update_self(legacy_self).expect("update succeeds");

    let mut legacy_manager = manager.clone();
    legacy_manager.core.snapshot = None;
    repository
        .update_manager(legacy_manager)
        .expect("update succeeds");

    let summary = service.backfill_missing().expect("sweep completes");
    assert_eq!(summary.examined, 2);
    assert_eq!(summary.backfilled, 2);
    assert_eq!(summary.failed, 0);

    let summary = service.backfill_missing().expect("second sweep is empty");
    assert_eq!(summary.examined, 0);
}
