//! Pure state transitions over an [`Application`] snapshot.
//!
//! Nothing here touches storage; the engine loads a snapshot, asks for the
//! next value and persists it with a compare-and-swap. A function that
//! returns `Err` leaves its input untouched.

use chrono::{DateTime, Utc};

use crate::domain::{
    Application, ApplicationStatus, ApprovalRecord, Decision, Principal, PrincipalId,
    StageReassignment,
};
use crate::errors::ValidationError;
use crate::permissions::PermissionGate;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecisionInput {
    pub decision: Decision,
    pub comment: Option<String>,
    pub next_approver_id: Option<PrincipalId>,
}

impl DecisionInput {
    pub fn approve() -> Self {
        Self { decision: Decision::Approved, comment: None, next_approver_id: None }
    }

    pub fn reject(comment: impl Into<String>) -> Self {
        Self { decision: Decision::Rejected, comment: Some(comment.into()), next_approver_id: None }
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    pub fn routing_to(mut self, next_approver_id: PrincipalId) -> Self {
        self.next_approver_id = Some(next_approver_id);
        self
    }
}

/// Rules that vary by deployment rather than by stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RoutingPolicy {
    pub require_nominee_distinct_from_requester: bool,
}

impl Default for RoutingPolicy {
    fn default() -> Self {
        Self { require_nominee_distinct_from_requester: true }
    }
}

pub fn submit(application: &Application, now: DateTime<Utc>) -> Result<Application, ValidationError> {
    let Some(first) = application.effective_stages.first() else {
        return Err(ValidationError::EmptyStageSequence);
    };
    if first.approver_id.is_none() {
        return Err(ValidationError::UnresolvedStage { stage: first.role });
    }

    let mut next = application.clone();
    next.status = ApplicationStatus::InReview;
    next.current_stage_index = 0;
    next.submitted_at = Some(now);
    touch(&mut next, now);
    Ok(next)
}

/// Applies one decision by the current approver. Identity has already been
/// checked; `nominee` is the directory entry for `input.next_approver_id`.
pub fn decide(
    application: &Application,
    actor: &Principal,
    input: &DecisionInput,
    nominee: Option<&Principal>,
    gate: &PermissionGate,
    policy: RoutingPolicy,
    now: DateTime<Utc>,
) -> Result<Application, ValidationError> {
    let stage_index = application.current_stage_index;
    let stage_count = application.effective_stages.len();
    let Some(stage) = application.effective_stages.get(stage_index) else {
        return Err(ValidationError::StageOutOfRange { index: stage_index, stage_count });
    };
    let comment = normalized_comment(input.comment.as_deref());

    let mut next = application.clone();
    let mut routed_to = None;

    match input.decision {
        Decision::Rejected => {
            if comment.is_none() {
                return Err(ValidationError::MissingRejectionComment);
            }
            if input.next_approver_id.is_some() {
                return Err(ValidationError::UnexpectedNextApprover);
            }
            next.status = ApplicationStatus::Rejected;
            next.completed_at = Some(now);
        }
        Decision::Approved => {
            let next_index = stage_index + 1;
            match next.effective_stages.get_mut(next_index) {
                Some(slot) if slot.approver_id.is_none() => {
                    let nominee = nominee
                        .ok_or(ValidationError::MissingNextApprover { stage: stage.role })?;
                    gate.check_eligibility(slot.role, nominee)?;
                    if policy.require_nominee_distinct_from_requester
                        && nominee.id == application.requester_id
                    {
                        return Err(ValidationError::SelfApproval {
                            requester_id: application.requester_id.clone(),
                        });
                    }
                    slot.approver_id = Some(nominee.id.clone());
                    routed_to = Some(nominee.id.clone());
                }
                Some(slot) => {
                    if input.next_approver_id.is_some() {
                        return Err(ValidationError::AlreadyResolved { stage: slot.role });
                    }
                }
                None => {
                    if input.next_approver_id.is_some() {
                        return Err(ValidationError::UnexpectedNextApprover);
                    }
                }
            }

            next.current_stage_index = next_index;
            if next_index == stage_count {
                next.status = ApplicationStatus::Approved;
                next.completed_at = Some(now);
            }
        }
    }

    next.history.push(ApprovalRecord {
        sequence: u32::try_from(application.history.len()).unwrap_or(u32::MAX),
        stage_index,
        stage_role: stage.role,
        actor_id: actor.id.clone(),
        decision: input.decision,
        comment,
        next_approver_id: routed_to,
        decided_at: now,
    });
    touch(&mut next, now);
    Ok(next)
}

/// Rebinds a not-yet-completed stage. Eligibility of `new_approver` is the
/// caller's concern.
pub fn reassign(
    application: &Application,
    stage_index: usize,
    new_approver: &Principal,
    reassigned_by: &Principal,
    policy: RoutingPolicy,
    now: DateTime<Utc>,
) -> Result<Application, ValidationError> {
    let stage_count = application.effective_stages.len();
    let Some(slot) = application.effective_stages.get(stage_index) else {
        return Err(ValidationError::StageOutOfRange { index: stage_index, stage_count });
    };

    if slot.approver_id.as_ref() == Some(&new_approver.id) {
        return Err(ValidationError::ApproverUnchanged {
            stage: slot.role,
            principal_id: new_approver.id.clone(),
        });
    }
    let requester_barred = stage_index == 0 || policy.require_nominee_distinct_from_requester;
    if requester_barred && new_approver.id == application.requester_id {
        return Err(ValidationError::SelfApproval {
            requester_id: application.requester_id.clone(),
        });
    }

    let mut next = application.clone();
    next.reassignments.push(StageReassignment {
        stage_index,
        stage_role: slot.role,
        previous_approver_id: slot.approver_id.clone(),
        new_approver_id: new_approver.id.clone(),
        reassigned_by: reassigned_by.id.clone(),
        reassigned_at: now,
    });
    next.effective_stages[stage_index].approver_id = Some(new_approver.id.clone());
    touch(&mut next, now);
    Ok(next)
}

pub fn cancel(application: &Application, now: DateTime<Utc>) -> Application {
    let mut next = application.clone();
    next.status = ApplicationStatus::Cancelled;
    next.completed_at = Some(now);
    touch(&mut next, now);
    next
}

fn touch(application: &mut Application, now: DateTime<Utc>) {
    application.version += 1;
    application.updated_at = now;
}

fn normalized_comment(comment: Option<&str>) -> Option<String> {
    comment.map(str::trim).filter(|comment| !comment.is_empty()).map(str::to_owned)
}
