//! Immutable-snapshot evaluation scoring and approval workflows.
//!
//! An evaluation instance captures a deep copy of its rubric template at
//! creation time; every later validation and score computation reads that
//! snapshot, never the live template. Manager evaluations additionally move
//! through a gated approval sequence ending in a signature or a signature
//! with objection, and can be compared positionally against the subject's
//! own self-evaluation.

pub mod comparison;
pub mod domain;
pub mod instance;
pub mod ledger;
pub mod repository;
pub mod router;
pub mod scoring;
pub mod service;
pub mod snapshot;
pub mod workflow;

#[cfg(test)]
mod tests;

pub use comparison::{
    AreaComparison, ComparisonReport, ComparisonSummary, CompetencyComparison,
    IndicatorComparison, NormalizedStructure, INDICATOR_POINT_CAP,
};
pub use domain::{
    AchievementLevel, EvaluationId, EvaluationTemplate, Period, PersonId, TemplateArea,
    TemplateCompetency, TemplateId, TemplateIndicator, ValidationError,
};
pub use instance::{
    EvaluationCore, EvaluationStatusView, IntegrityError, ManagerEvaluation, SelfEvaluation,
};
pub use ledger::{IndicatorResponse, LedgerDiff, ResponseEntry};
pub use repository::{
    EvaluationNotice, EvaluationRef, EvaluationRepository, NotificationError,
    NotificationPublisher, RepositoryError, TemplateStore,
};
pub use router::evaluation_router;
pub use scoring::{AreaScore, ScoreBreakdown};
pub use service::{
    AssignmentEntry, AssignmentOutcome, BackfillSummary, CreateManagerEvaluation,
    CreateSelfEvaluation, EvaluationService, EvaluationServiceError, ManagerAssignment,
    ResponseSubmission, SelfAssignment,
};
pub use snapshot::{capture, StructureSnapshot};
pub use workflow::{
    SignatureState, StateError, WorkflowAction, WorkflowStage, WorkflowState,
    MINIMUM_OBJECTION_CHARS,
};
