use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::domain::{EvaluationId, EvaluationTemplate, Period, PersonId, TemplateId};
use super::instance::{ManagerEvaluation, SelfEvaluation};

/// Read-only access to the rubric templates owned by the admin subsystem.
pub trait TemplateStore: Send + Sync {
    fn fetch(&self, id: TemplateId) -> Result<Option<EvaluationTemplate>, RepositoryError>;
}

/// Persistence abstraction for evaluation instances. Implementations enforce
/// the uniqueness keys — (subject, template, period) for self-evaluations,
/// (subject, evaluator, template, period) for manager-evaluations — by
/// returning [`RepositoryError::Conflict`] from the insert methods.
pub trait EvaluationRepository: Send + Sync {
    fn insert_self(&self, record: SelfEvaluation) -> Result<SelfEvaluation, RepositoryError>;
    fn insert_manager(
        &self,
        record: ManagerEvaluation,
    ) -> Result<ManagerEvaluation, RepositoryError>;
    fn fetch_self(&self, id: EvaluationId) -> Result<Option<SelfEvaluation>, RepositoryError>;
    fn fetch_manager(
        &self,
        id: EvaluationId,
    ) -> Result<Option<ManagerEvaluation>, RepositoryError>;
    fn update_self(&self, record: SelfEvaluation) -> Result<(), RepositoryError>;
    fn update_manager(&self, record: ManagerEvaluation) -> Result<(), RepositoryError>;
    fn find_self(
        &self,
        subject: PersonId,
        template: TemplateId,
        period: &Period,
    ) -> Result<Option<SelfEvaluation>, RepositoryError>;
    fn self_evaluations_for(
        &self,
        subject: PersonId,
    ) -> Result<Vec<SelfEvaluation>, RepositoryError>;
    fn manager_evaluations_for(
        &self,
        evaluator: PersonId,
    ) -> Result<Vec<ManagerEvaluation>, RepositoryError>;
    /// Instances still lacking a structure snapshot (legacy rows), for the
    /// maintenance sweep.
    fn missing_snapshots(&self) -> Result<Vec<EvaluationRef>, RepositoryError>;
}

/// Variant-tagged reference to a stored evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "id")]
pub enum EvaluationRef {
    SelfEvaluation(EvaluationId),
    ManagerEvaluation(EvaluationId),
}

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// Outbound notification hook. Dispatch is fire-and-forget: the workflow
/// never awaits delivery, and publish failures are logged by the caller
/// rather than propagated.
pub trait NotificationPublisher: Send + Sync {
    fn publish(&self, notice: EvaluationNotice) -> Result<(), NotificationError>;
}

/// Notification payload handed to the delivery adapter. The recipient is
/// optional because some notices (a completed self-evaluation) are routed by
/// the adapter through the org hierarchy, which is outside this crate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationNotice {
    pub template: String,
    pub evaluation: EvaluationId,
    pub recipient: Option<PersonId>,
    pub details: BTreeMap<String, String>,
}

/// Notification dispatch error; best-effort side channel only.
#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("notification transport unavailable: {0}")]
    Transport(String),
}
