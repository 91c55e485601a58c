use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::domain::ValidationError;

/// Minimum character count (after trimming) for an objection reason.
pub const MINIMUM_OBJECTION_CHARS: usize = 50;

/// Signature outcome recorded once the evaluation is closed for signature.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignatureState {
    #[default]
    Pending,
    Signed,
    SignedWithObjection,
}

impl SignatureState {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Signed => "signed",
            Self::SignedWithObjection => "signed_with_objection",
        }
    }
}

/// Derived stage of the approval sequence, in required order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStage {
    InProgress,
    Completed,
    FeedbackGiven,
    PendingSignature,
    Signed,
    SignedWithObjection,
}

impl WorkflowStage {
    pub const fn label(self) -> &'static str {
        match self {
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::FeedbackGiven => "feedback_given",
            Self::PendingSignature => "pending_signature",
            Self::Signed => "signed",
            Self::SignedWithObjection => "signed_with_objection",
        }
    }

    /// Terminal stages admit no further transitions.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Signed | Self::SignedWithObjection)
    }
}

impl fmt::Display for WorkflowStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Named workflow actions accepted by the service and the HTTP surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "action")]
pub enum WorkflowAction {
    Complete,
    GiveFeedback,
    CloseForSignature,
    Sign,
    Deny { reason: String },
}

impl WorkflowAction {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Complete => "complete",
            Self::GiveFeedback => "give_feedback",
            Self::CloseForSignature => "close_for_signature",
            Self::Sign => "sign",
            Self::Deny { .. } => "deny",
        }
    }
}

/// Event emitted by a successful transition, consumed by the notifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowEvent {
    Completed,
    FeedbackGiven,
    ClosedForSignature,
    Signed,
    SignedWithObjection,
}

impl WorkflowEvent {
    pub const fn notice_template(self) -> &'static str {
        match self {
            Self::Completed => "manager_evaluation_completed",
            Self::FeedbackGiven => "feedback_recorded",
            Self::ClosedForSignature => "evaluation_closed_for_signature",
            Self::Signed => "evaluation_signed",
            Self::SignedWithObjection => "evaluation_signed_with_objection",
        }
    }

    /// Signature outcomes notify the evaluator; everything else notifies the
    /// subject awaiting the next step.
    pub const fn notifies_evaluator(self) -> bool {
        matches!(self, Self::Signed | Self::SignedWithObjection)
    }
}

/// Workflow precondition violations, raised at the persistence boundary as
/// well as at the API surface so direct model-level misuse fails loudly.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StateError {
    #[error("cannot {action} while the evaluation is {stage}")]
    OutOfSequence {
        action: &'static str,
        stage: WorkflowStage,
    },
    #[error("inconsistent workflow flags ({detail}); current stage: {stage}")]
    CorruptState {
        stage: WorkflowStage,
        detail: &'static str,
    },
}

/// Errors a transition can produce: an out-of-sequence action, or invalid
/// user input gating the action (the objection reason).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorkflowError {
    #[error(transparent)]
    State(#[from] StateError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// Approval-sequence state of a manager evaluation.
///
/// The flags mirror what is persisted; [`WorkflowState::stage`] derives the
/// tagged stage and [`WorkflowState::apply`] is the single transition table.
/// `meeting_date` and `signature_date` are stamped the first time their
/// gating flag flips and never overwritten afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowState {
    pub completed: bool,
    pub feedback_given: bool,
    pub closed_for_signature: bool,
    pub signature: SignatureState,
    pub meeting_date: Option<DateTime<Utc>>,
    pub signature_date: Option<DateTime<Utc>>,
    pub objection_reason: Option<String>,
}

impl WorkflowState {
    pub fn stage(&self) -> WorkflowStage {
        match self.signature {
            SignatureState::Signed => WorkflowStage::Signed,
            SignatureState::SignedWithObjection => WorkflowStage::SignedWithObjection,
            SignatureState::Pending => {
                if self.closed_for_signature {
                    WorkflowStage::PendingSignature
                } else if self.feedback_given {
                    WorkflowStage::FeedbackGiven
                } else if self.completed {
                    WorkflowStage::Completed
                } else {
                    WorkflowStage::InProgress
                }
            }
        }
    }

    pub fn can_give_feedback(&self) -> bool {
        self.completed && !self.feedback_given
    }

    pub fn can_close_for_signature(&self) -> bool {
        self.feedback_given && !self.closed_for_signature
    }

    pub fn can_sign(&self) -> bool {
        self.closed_for_signature && self.signature == SignatureState::Pending
    }

    pub fn can_deny(&self) -> bool {
        self.closed_for_signature && self.signature == SignatureState::Pending
    }

    /// Apply one action against the transition table. Nothing is mutated on
    /// any error path.
    pub fn apply(
        &mut self,
        action: WorkflowAction,
        now: DateTime<Utc>,
    ) -> Result<WorkflowEvent, WorkflowError> {
        let stage = self.stage();
        let out_of_sequence = |action: &WorkflowAction| {
            WorkflowError::State(StateError::OutOfSequence {
                action: action.name(),
                stage,
            })
        };

        match action {
            WorkflowAction::Complete => {
                if self.completed {
                    return Err(out_of_sequence(&action));
                }
                self.completed = true;
                Ok(WorkflowEvent::Completed)
            }
            WorkflowAction::GiveFeedback => {
                if !self.can_give_feedback() {
                    return Err(out_of_sequence(&action));
                }
                self.feedback_given = true;
                if self.meeting_date.is_none() {
                    self.meeting_date = Some(now);
                }
                Ok(WorkflowEvent::FeedbackGiven)
            }
            WorkflowAction::CloseForSignature => {
                if !self.can_close_for_signature() {
                    return Err(out_of_sequence(&action));
                }
                self.closed_for_signature = true;
                Ok(WorkflowEvent::ClosedForSignature)
            }
            WorkflowAction::Sign => {
                if !self.can_sign() {
                    return Err(out_of_sequence(&action));
                }
                self.signature = SignatureState::Signed;
                if self.signature_date.is_none() {
                    self.signature_date = Some(now);
                }
                Ok(WorkflowEvent::Signed)
            }
            WorkflowAction::Deny { ref reason } => {
                if !self.can_deny() {
                    return Err(out_of_sequence(&action));
                }
                let trimmed = reason.trim();
                if trimmed.is_empty() {
                    return Err(ValidationError::ObjectionReasonMissing.into());
                }
                let length = trimmed.chars().count();
                if length < MINIMUM_OBJECTION_CHARS {
                    return Err(ValidationError::ObjectionReasonTooShort {
                        length,
                        minimum: MINIMUM_OBJECTION_CHARS,
                    }
                    .into());
                }
                self.signature = SignatureState::SignedWithObjection;
                self.objection_reason = Some(trimmed.to_string());
                if self.signature_date.is_none() {
                    self.signature_date = Some(now);
                }
                Ok(WorkflowEvent::SignedWithObjection)
            }
        }
    }

    /// Re-check the monotonicity invariants before persisting, so a state
    /// assembled outside [`WorkflowState::apply`] cannot be stored.
    pub fn validate(&self) -> Result<(), StateError> {
        let stage = self.stage();

        if self.signature != SignatureState::Pending && !self.closed_for_signature {
            return Err(StateError::CorruptState {
                stage,
                detail: "signature recorded before closing for signature",
            });
        }
        if self.closed_for_signature && !self.feedback_given {
            return Err(StateError::CorruptState {
                stage,
                detail: "closed for signature before feedback was given",
            });
        }
        if self.feedback_given && !self.completed {
            return Err(StateError::CorruptState {
                stage,
                detail: "feedback given before the evaluation was completed",
            });
        }
        if self.signature == SignatureState::SignedWithObjection {
            let length = self
                .objection_reason
                .as_deref()
                .map(|reason| reason.trim().chars().count())
                .unwrap_or(0);
            if length < MINIMUM_OBJECTION_CHARS {
                return Err(StateError::CorruptState {
                    stage,
                    detail: "objection reason missing or too short",
                });
            }
        }

        Ok(())
    }
}
