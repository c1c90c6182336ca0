use thiserror::Error;

use crate::directory::DirectoryError;
use crate::domain::{ApplicationId, ApplicationStatus, PrincipalId, Role, StageRole};
use crate::permissions::AccessDenial;
use crate::repository::RepositoryError;

/// Input the caller can fix and resend.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("title must not be blank")]
    BlankTitle,
    #[error("content must not be blank")]
    BlankContent,
    #[error("amount must not be negative")]
    NegativeAmount,
    #[error("a first-stage approver must be chosen")]
    MissingFirstApprover,
    #[error("requester `{requester_id}` cannot approve their own application")]
    SelfApproval { requester_id: PrincipalId },
    #[error("principal `{principal_id}` is not known to the directory")]
    UnknownPrincipal { principal_id: PrincipalId },
    #[error("principal `{principal_id}` has role `{actual}` but stage `{stage}` requires `{expected}`")]
    IneligibleApprover { principal_id: PrincipalId, stage: StageRole, expected: Role, actual: Role },
    #[error("a comment is required when rejecting")]
    MissingRejectionComment,
    #[error("stage `{stage}` must nominate the approver for the next stage")]
    MissingNextApprover { stage: StageRole },
    #[error("a next approver can only be nominated when approving into an unresolved stage")]
    UnexpectedNextApprover,
    #[error("approver for stage `{stage}` is already resolved")]
    AlreadyResolved { stage: StageRole },
    #[error("stage index {index} is outside the {stage_count} effective stages")]
    StageOutOfRange { index: usize, stage_count: usize },
    #[error("stage `{stage}` is already assigned to `{principal_id}`")]
    ApproverUnchanged { stage: StageRole, principal_id: PrincipalId },
    #[error("the effective stage sequence is empty")]
    EmptyStageSequence,
    #[error("stage `{stage}` has no resolved approver")]
    UnresolvedStage { stage: StageRole },
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("permission denied: {0}")]
    PermissionDenied(AccessDenial),
    #[error("application `{application_id}` is {status}: {reason}")]
    InvalidState { application_id: ApplicationId, status: ApplicationStatus, reason: String },
    #[error("application `{application_id}` not found")]
    NotFound { application_id: ApplicationId },
    #[error("repository failure: {0}")]
    Repository(#[from] RepositoryError),
    #[error("principal directory failure: {0}")]
    Directory(#[from] DirectoryError),
}

impl EngineError {
    pub fn invalid_state(
        application_id: &ApplicationId,
        status: ApplicationStatus,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidState { application_id: application_id.clone(), status, reason: reason.into() }
    }

    /// Stable class label used by logs, audit metadata and CLI payloads.
    pub fn class(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::PermissionDenied(_) => "permission_denied",
            Self::InvalidState { .. } => "invalid_state",
            Self::NotFound { .. } => "not_found",
            Self::Repository(_) => "repository",
            Self::Directory(_) => "directory",
        }
    }

    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::Forbidden { correlation_id: id, .. }
            | InterfaceError::Conflict { correlation_id: id, .. }
            | InterfaceError::NotFound { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("forbidden: {message}")]
    Forbidden { message: String, correlation_id: String },
    #[error("conflict: {message}")]
    Conflict { message: String, correlation_id: String },
    #[error("not found: {message}")]
    NotFound { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
}

impl InterfaceError {
    /// Caller-facing class label. Storage and directory faults share one.
    pub fn class(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => "validation",
            Self::Forbidden { .. } => "permission_denied",
            Self::Conflict { .. } => "invalid_state",
            Self::NotFound { .. } => "not_found",
            Self::ServiceUnavailable { .. } => "storage",
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::BadRequest { message, .. }
            | Self::Forbidden { message, .. }
            | Self::Conflict { message, .. }
            | Self::NotFound { message, .. }
            | Self::ServiceUnavailable { message, .. } => message,
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::Forbidden { correlation_id, .. }
            | Self::Conflict { correlation_id, .. }
            | Self::NotFound { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. } => correlation_id,
        }
    }

    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::Forbidden { .. } => {
                "You are not permitted to perform this action on the application."
            }
            Self::Conflict { .. } => {
                "The application has changed since it was loaded. Refresh before retrying."
            }
            Self::NotFound { .. } => "The application does not exist.",
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly."
            }
        }
    }
}

impl From<EngineError> for InterfaceError {
    fn from(value: EngineError) -> Self {
        let message = value.to_string();
        let correlation_id = "unassigned".to_owned();
        match value {
            EngineError::Validation(_) => Self::BadRequest { message, correlation_id },
            EngineError::PermissionDenied(_) => Self::Forbidden { message, correlation_id },
            EngineError::InvalidState { .. } => Self::Conflict { message, correlation_id },
            EngineError::NotFound { .. } => Self::NotFound { message, correlation_id },
            EngineError::Repository(_) | EngineError::Directory(_) => {
                Self::ServiceUnavailable { message, correlation_id }
            }
        }
    }
}
