use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::{Application, ApplicationStatus, Principal, PrincipalId, Role, StageRole};
use crate::errors::ValidationError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Decide,
    View,
    Submit,
    Edit,
    Cancel,
    Reassign,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AccessDenial {
    NotCurrentApprover { principal_id: PrincipalId, expected_approver_id: Option<PrincipalId> },
    NoActiveStage { principal_id: PrincipalId, status: ApplicationStatus },
    NotVisible { principal_id: PrincipalId },
    NotRequester { principal_id: PrincipalId },
    AdminOnly { principal_id: PrincipalId, role: Role },
    ObserverOnly { principal_id: PrincipalId },
}

impl AccessDenial {
    fn reason(&self) -> String {
        match self {
            Self::NotCurrentApprover { principal_id, expected_approver_id: Some(expected) } => {
                format!("`{principal_id}` is not the current approver (expected `{expected}`)")
            }
            Self::NotCurrentApprover { principal_id, expected_approver_id: None } => {
                format!("`{principal_id}` is not the current approver (stage is unassigned)")
            }
            Self::NoActiveStage { principal_id, status } => {
                format!("`{principal_id}` cannot act: application is {status}")
            }
            Self::NotVisible { principal_id } => {
                format!("`{principal_id}` may not view this application")
            }
            Self::NotRequester { principal_id } => {
                format!("`{principal_id}` is not the requester of this application")
            }
            Self::AdminOnly { principal_id, role } => {
                format!("`{principal_id}` has role `{role}`; only admins may reassign stages")
            }
            Self::ObserverOnly { principal_id } => {
                format!("`{principal_id}` is a read-only observer")
            }
        }
    }
}

impl fmt::Display for AccessDenial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.reason())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessCheck {
    pub allowed: bool,
    pub reason: String,
    pub failure: Option<AccessDenial>,
}

impl AccessCheck {
    fn allow(reason: impl Into<String>) -> Self {
        Self { allowed: true, reason: reason.into(), failure: None }
    }

    fn deny(failure: AccessDenial) -> Self {
        Self { allowed: false, reason: failure.reason(), failure: Some(failure) }
    }

    pub fn into_result(self) -> Result<(), AccessDenial> {
        match self.failure {
            Some(failure) => Err(failure),
            None => Ok(()),
        }
    }
}

/// Authorization rules, split in two steps: role eligibility is checked when
/// a principal is assigned to a stage, identity is checked when someone acts.
#[derive(Clone, Copy, Debug, Default)]
pub struct PermissionGate;

impl PermissionGate {
    pub fn new() -> Self {
        Self
    }

    pub fn can_act(
        &self,
        application: &Application,
        principal: &Principal,
        action: Action,
    ) -> AccessCheck {
        match action {
            Action::Decide => self.check_decide(application, principal),
            Action::View => self.check_view(application, principal),
            Action::Submit | Action::Edit | Action::Cancel => {
                self.check_owner(application, principal)
            }
            Action::Reassign => self.check_reassign(principal),
        }
    }

    pub fn can_create(&self, principal: &Principal) -> AccessCheck {
        if principal.role == Role::ReadOnly {
            return AccessCheck::deny(AccessDenial::ObserverOnly {
                principal_id: principal.id.clone(),
            });
        }
        AccessCheck::allow(format!("role `{}` may file applications", principal.role))
    }

    /// Role eligibility of a principal being bound to `stage`.
    pub fn check_eligibility(
        &self,
        stage: StageRole,
        candidate: &Principal,
    ) -> Result<(), ValidationError> {
        let expected = stage.eligible_role();
        if candidate.role != expected {
            return Err(ValidationError::IneligibleApprover {
                principal_id: candidate.id.clone(),
                stage,
                expected,
                actual: candidate.role,
            });
        }
        Ok(())
    }

    fn check_decide(&self, application: &Application, principal: &Principal) -> AccessCheck {
        let Some(stage) = application.current_stage() else {
            return AccessCheck::deny(AccessDenial::NoActiveStage {
                principal_id: principal.id.clone(),
                status: application.status,
            });
        };

        // Exact identity match. A second holder of the same role is denied.
        if stage.approver_id.as_ref() != Some(&principal.id) {
            return AccessCheck::deny(AccessDenial::NotCurrentApprover {
                principal_id: principal.id.clone(),
                expected_approver_id: stage.approver_id.clone(),
            });
        }

        AccessCheck::allow(format!(
            "`{}` is the bound approver for `{}`",
            principal.id, stage.role
        ))
    }

    fn check_view(&self, application: &Application, principal: &Principal) -> AccessCheck {
        if application.requester_id == principal.id {
            return AccessCheck::allow("requester");
        }
        if principal.role.sees_everything() {
            return AccessCheck::allow(format!("role `{}` sees every application", principal.role));
        }

        if application.status != ApplicationStatus::Draft {
            if application.has_decided(&principal.id) {
                return AccessCheck::allow("acted on an earlier stage");
            }
            if application.is_bound_approver(&principal.id) {
                return AccessCheck::allow("bound to a stage of this application");
            }
        }

        AccessCheck::deny(AccessDenial::NotVisible { principal_id: principal.id.clone() })
    }

    fn check_owner(&self, application: &Application, principal: &Principal) -> AccessCheck {
        if application.requester_id == principal.id {
            return AccessCheck::allow("requester");
        }
        if principal.role == Role::Admin {
            return AccessCheck::allow("admin");
        }
        AccessCheck::deny(AccessDenial::NotRequester { principal_id: principal.id.clone() })
    }

    fn check_reassign(&self, principal: &Principal) -> AccessCheck {
        if principal.role == Role::Admin {
            return AccessCheck::allow("admin");
        }
        AccessCheck::deny(AccessDenial::AdminOnly {
            principal_id: principal.id.clone(),
            role: principal.role,
        })
    }
}
