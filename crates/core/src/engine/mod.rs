pub mod transition;

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{info, warn};
use uuid::Uuid;

use crate::audit::{AuditCategory, AuditContext, AuditOutcome, AuditSink};
use crate::config::WorkflowConfig;
use crate::directory::PrincipalDirectory;
use crate::domain::{
    Application, ApplicationId, ApplicationStatus, Principal, PrincipalId, Priority, StageSlot,
};
use crate::errors::{EngineError, ValidationError};
use crate::permissions::{Action, PermissionGate};
use crate::repository::{ApplicationRepository, RepositoryError};
use crate::workflow::WorkflowDefinition;

pub use transition::{DecisionInput, RoutingPolicy};

/// Field changes for a draft. `None` leaves the stored value alone.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DraftPatch {
    pub title: Option<String>,
    pub content: Option<String>,
    pub amount: Option<Decimal>,
    pub priority: Option<Priority>,
    pub skip_manager_stage: Option<bool>,
    pub first_approver_id: Option<PrincipalId>,
}

impl DraftPatch {
    fn reroutes(&self, application: &Application) -> bool {
        self.skip_manager_stage.is_some_and(|skip| skip != application.skip_manager_stage)
            || self.first_approver_id.as_ref().is_some_and(|approver_id| {
                application.effective_stages.first().and_then(|slot| slot.approver_id.as_ref())
                    != Some(approver_id)
            })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewApplication {
    pub title: String,
    pub content: String,
    pub amount: Option<Decimal>,
    pub priority: Priority,
    pub skip_manager_stage: bool,
    pub first_approver_id: Option<PrincipalId>,
}

/// The approval state machine.
///
/// Every mutating call reads one snapshot, computes the successor with the
/// pure functions in [`transition`] and writes it back with a
/// compare-and-swap on `version`. A call that fails writes nothing.
pub struct ApprovalEngine<R, D, S> {
    definition: WorkflowDefinition,
    repository: R,
    directory: D,
    sink: S,
    gate: PermissionGate,
    policy: RoutingPolicy,
}

impl<R, D, S> ApprovalEngine<R, D, S>
where
    R: ApplicationRepository,
    D: PrincipalDirectory,
    S: AuditSink,
{
    pub fn new(definition: WorkflowDefinition, repository: R, directory: D, sink: S) -> Self {
        Self {
            definition,
            repository,
            directory,
            sink,
            gate: PermissionGate::new(),
            policy: RoutingPolicy::default(),
        }
    }

    pub fn from_config(config: &WorkflowConfig, repository: R, directory: D, sink: S) -> Self {
        Self::new(WorkflowDefinition::from_config(config), repository, directory, sink)
            .with_policy(RoutingPolicy {
                require_nominee_distinct_from_requester: config
                    .require_manager_nominee_distinct_from_requester,
            })
    }

    pub fn with_policy(mut self, policy: RoutingPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn definition(&self) -> &WorkflowDefinition {
        &self.definition
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    pub async fn create_application(
        &self,
        requester: &Principal,
        input: NewApplication,
    ) -> Result<Application, EngineError> {
        let audit = self.audit_context(None, requester);
        let result = self.create_inner(requester, input).await;

        match &result {
            Ok(application) => {
                info!(
                    event_name = "approval.application.created",
                    correlation_id = %audit.correlation_id,
                    application_id = %application.id,
                    requester_id = %requester.id,
                    stage_count = application.effective_stages.len(),
                    "application created"
                );
                let stage_count = application.effective_stages.len();
                self.sink.emit(
                    audit
                        .event(
                            "approval.application.created",
                            AuditCategory::Lifecycle,
                            AuditOutcome::Success,
                        )
                        .with_metadata("application_id", application.id.to_string())
                        .with_metadata("stage_count", stage_count.to_string())
                        .with_metadata(
                            "skip_manager_stage",
                            application.skip_manager_stage.to_string(),
                        ),
                );
            }
            Err(error) => self.emit_failure(
                &audit,
                "approval.application.create_failed",
                AuditCategory::Lifecycle,
                error,
            ),
        }
        result
    }

    /// Edits a draft in place. Changing the skip flag or the first approver
    /// recomputes the effective stages.
    pub async fn update_draft(
        &self,
        application_id: &ApplicationId,
        actor: &Principal,
        patch: DraftPatch,
    ) -> Result<Application, EngineError> {
        let audit = self.audit_context(Some(application_id.clone()), actor);
        let result = self.update_draft_inner(application_id, actor, patch).await;

        match &result {
            Ok(application) => {
                let stage_count = application.effective_stages.len();
                info!(
                    event_name = "approval.application.updated",
                    correlation_id = %audit.correlation_id,
                    application_id = %application.id,
                    actor_id = %actor.id,
                    version = application.version,
                    "draft updated"
                );
                self.sink.emit(
                    audit
                        .event(
                            "approval.application.updated",
                            AuditCategory::Lifecycle,
                            AuditOutcome::Success,
                        )
                        .with_metadata("stage_count", stage_count.to_string())
                        .with_metadata("first_approver_id", approver_label(application)),
                );
            }
            Err(error) => self.emit_failure(
                &audit,
                "approval.application.update_failed",
                AuditCategory::Lifecycle,
                error,
            ),
        }
        result
    }

    pub async fn submit(
        &self,
        application_id: &ApplicationId,
        actor: &Principal,
    ) -> Result<Application, EngineError> {
        let audit = self.audit_context(Some(application_id.clone()), actor);
        let result = self.submit_inner(application_id, actor).await;

        match &result {
            Ok(application) => {
                info!(
                    event_name = "approval.application.submitted",
                    correlation_id = %audit.correlation_id,
                    application_id = %application.id,
                    actor_id = %actor.id,
                    "application submitted for review"
                );
                self.sink.emit(
                    audit
                        .event(
                            "approval.application.submitted",
                            AuditCategory::Lifecycle,
                            AuditOutcome::Success,
                        )
                        .with_metadata("first_approver_id", approver_label(application)),
                );
            }
            Err(error) => self.emit_failure(
                &audit,
                "approval.application.submit_failed",
                AuditCategory::Lifecycle,
                error,
            ),
        }
        result
    }

    pub async fn decide(
        &self,
        application_id: &ApplicationId,
        actor: &Principal,
        input: DecisionInput,
    ) -> Result<Application, EngineError> {
        let audit = self.audit_context(Some(application_id.clone()), actor);
        let result = self.decide_inner(application_id, actor, &input).await;

        match &result {
            Ok(application) => {
                let record = application.history.last();
                info!(
                    event_name = "approval.decision.recorded",
                    correlation_id = %audit.correlation_id,
                    application_id = %application.id,
                    actor_id = %actor.id,
                    decision = input.decision.as_str(),
                    stage_index = application.current_stage_index,
                    status = application.status.as_str(),
                    "decision recorded"
                );
                let mut event = audit
                    .event(
                        "approval.decision.recorded",
                        AuditCategory::Decision,
                        AuditOutcome::Success,
                    )
                    .with_metadata("decision", input.decision.as_str())
                    .with_metadata("status", application.status.as_str())
                    .with_metadata("stage_index", application.current_stage_index.to_string());
                if let Some(record) = record {
                    event = event.with_metadata("stage", record.stage_role.as_str());
                    if let Some(routed) = &record.next_approver_id {
                        event = event.with_metadata("next_approver_id", routed.to_string());
                    }
                }
                self.sink.emit(event);

                if application.is_terminal() {
                    self.sink.emit(
                        audit
                            .event(
                                "approval.application.completed",
                                AuditCategory::Lifecycle,
                                AuditOutcome::Success,
                            )
                            .with_metadata("status", application.status.as_str()),
                    );
                }
            }
            Err(error) => {
                self.emit_failure(&audit, "approval.decision.denied", AuditCategory::Decision, error)
            }
        }
        result
    }

    pub async fn reassign(
        &self,
        application_id: &ApplicationId,
        actor: &Principal,
        stage_index: usize,
        new_approver_id: &PrincipalId,
    ) -> Result<Application, EngineError> {
        let audit = self.audit_context(Some(application_id.clone()), actor);
        let result =
            self.reassign_inner(application_id, actor, stage_index, new_approver_id).await;

        match &result {
            Ok(application) => {
                info!(
                    event_name = "approval.stage.reassigned",
                    correlation_id = %audit.correlation_id,
                    application_id = %application.id,
                    actor_id = %actor.id,
                    stage_index,
                    new_approver_id = %new_approver_id,
                    "stage reassigned"
                );
                self.sink.emit(
                    audit
                        .event(
                            "approval.stage.reassigned",
                            AuditCategory::Routing,
                            AuditOutcome::Success,
                        )
                        .with_metadata("stage_index", stage_index.to_string())
                        .with_metadata("new_approver_id", new_approver_id.to_string()),
                );
            }
            Err(error) => self.emit_failure(
                &audit,
                "approval.stage.reassign_failed",
                AuditCategory::Routing,
                error,
            ),
        }
        result
    }

    pub async fn cancel(
        &self,
        application_id: &ApplicationId,
        actor: &Principal,
    ) -> Result<Application, EngineError> {
        let audit = self.audit_context(Some(application_id.clone()), actor);
        let result = self.cancel_inner(application_id, actor).await;

        match &result {
            Ok(application) => {
                info!(
                    event_name = "approval.application.cancelled",
                    correlation_id = %audit.correlation_id,
                    application_id = %application.id,
                    actor_id = %actor.id,
                    "application cancelled"
                );
                self.sink.emit(audit.event(
                    "approval.application.cancelled",
                    AuditCategory::Lifecycle,
                    AuditOutcome::Success,
                ));
            }
            Err(error) => self.emit_failure(
                &audit,
                "approval.application.cancel_failed",
                AuditCategory::Lifecycle,
                error,
            ),
        }
        result
    }

    /// The application with its full history, if `principal` may see it.
    pub async fn get_application(
        &self,
        application_id: &ApplicationId,
        principal: &Principal,
    ) -> Result<Application, EngineError> {
        let application = self.load(application_id).await?;
        let check = self.gate.can_act(&application, principal, Action::View);
        if let Err(denial) = check.into_result() {
            let audit = self.audit_context(Some(application_id.clone()), principal);
            let error = EngineError::PermissionDenied(denial);
            self.emit_failure(
                &audit,
                "approval.application.view_denied",
                AuditCategory::Access,
                &error,
            );
            return Err(error);
        }
        Ok(application)
    }

    async fn create_inner(
        &self,
        requester: &Principal,
        input: NewApplication,
    ) -> Result<Application, EngineError> {
        if let Err(denial) = self.gate.can_create(requester).into_result() {
            return Err(EngineError::PermissionDenied(denial));
        }

        let (title, content) = validated_fields(&input.title, &input.content, input.amount)?;
        if input.first_approver_id.as_ref() == Some(&requester.id) {
            let requester_id = requester.id.clone();
            return Err(ValidationError::SelfApproval { requester_id }.into());
        }

        let effective_stages =
            self.definition.resolve(input.skip_manager_stage, input.first_approver_id.as_ref())?;

        self.check_bound_slots(&requester.id, &effective_stages).await?;

        let now = Utc::now();
        let application = Application {
            id: ApplicationId::generate(),
            requester_id: requester.id.clone(),
            title,
            content,
            amount: input.amount,
            priority: input.priority,
            skip_manager_stage: input.skip_manager_stage,
            status: ApplicationStatus::Draft,
            current_stage_index: 0,
            effective_stages,
            history: Vec::new(),
            reassignments: Vec::new(),
            version: 0,
            created_at: now,
            updated_at: now,
            submitted_at: None,
            completed_at: None,
        };

        self.repository.insert(application.clone()).await?;
        Ok(application)
    }

    async fn update_draft_inner(
        &self,
        application_id: &ApplicationId,
        actor: &Principal,
        patch: DraftPatch,
    ) -> Result<Application, EngineError> {
        let application = self.load(application_id).await?;
        if application.status != ApplicationStatus::Draft {
            return Err(EngineError::invalid_state(
                application_id,
                application.status,
                "only draft applications can be edited",
            ));
        }
        self.authorize(&application, actor, Action::Edit)?;

        let amount = patch.amount.or(application.amount);
        let (title, content) = validated_fields(
            patch.title.as_deref().unwrap_or(application.title.as_str()),
            patch.content.as_deref().unwrap_or(application.content.as_str()),
            amount,
        )?;

        let mut next = application.clone();
        if patch.reroutes(&application) {
            let skip = patch.skip_manager_stage.unwrap_or(application.skip_manager_stage);
            let first_approver_id = patch.first_approver_id.clone().or_else(|| {
                application.effective_stages.first().and_then(|slot| slot.approver_id.clone())
            });
            let effective_stages = self.definition.resolve(skip, first_approver_id.as_ref())?;
            self.check_bound_slots(&application.requester_id, &effective_stages).await?;
            next.skip_manager_stage = skip;
            next.effective_stages = effective_stages;
        }

        next.title = title;
        next.content = content;
        next.amount = amount;
        next.priority = patch.priority.unwrap_or(application.priority);
        next.version += 1;
        next.updated_at = Utc::now();
        self.store(application.version, next).await
    }

    async fn submit_inner(
        &self,
        application_id: &ApplicationId,
        actor: &Principal,
    ) -> Result<Application, EngineError> {
        let application = self.load(application_id).await?;
        if application.status != ApplicationStatus::Draft {
            return Err(EngineError::invalid_state(
                application_id,
                application.status,
                "only draft applications can be submitted",
            ));
        }
        self.authorize(&application, actor, Action::Submit)?;

        let next = transition::submit(&application, Utc::now())?;
        self.store(application.version, next).await
    }

    async fn decide_inner(
        &self,
        application_id: &ApplicationId,
        actor: &Principal,
        input: &DecisionInput,
    ) -> Result<Application, EngineError> {
        let application = self.load(application_id).await?;
        ensure_reviewable(&application)?;

        // A former approver acting again is looking at a stale stage, not
        // trying to act out of turn.
        if !application.is_current_approver(&actor.id) && application.has_decided(&actor.id) {
            return Err(EngineError::invalid_state(
                application_id,
                application.status,
                format!(
                    "stage has already advanced past `{}` to index {}",
                    actor.id, application.current_stage_index
                ),
            ));
        }
        self.authorize(&application, actor, Action::Decide)?;

        let nominee = match &input.next_approver_id {
            Some(nominee_id) => Some(self.resolve_principal(nominee_id).await?),
            None => None,
        };

        let next = transition::decide(
            &application,
            actor,
            input,
            nominee.as_ref(),
            &self.gate,
            self.policy,
            Utc::now(),
        )?;
        self.store(application.version, next).await
    }

    async fn reassign_inner(
        &self,
        application_id: &ApplicationId,
        actor: &Principal,
        stage_index: usize,
        new_approver_id: &PrincipalId,
    ) -> Result<Application, EngineError> {
        let application = self.load(application_id).await?;
        if application.is_terminal() {
            return Err(EngineError::invalid_state(
                application_id,
                application.status,
                "terminal applications cannot be reassigned",
            ));
        }
        self.authorize(&application, actor, Action::Reassign)?;

        if application.status == ApplicationStatus::InReview
            && stage_index < application.current_stage_index
        {
            return Err(EngineError::invalid_state(
                application_id,
                application.status,
                format!(
                    "stage {stage_index} is already complete; review is at stage {}",
                    application.current_stage_index
                ),
            ));
        }

        let stage_count = application.effective_stages.len();
        let Some(slot) = application.effective_stages.get(stage_index) else {
            let error = ValidationError::StageOutOfRange { index: stage_index, stage_count };
            return Err(error.into());
        };
        let new_approver = self.resolve_principal(new_approver_id).await?;
        self.gate.check_eligibility(slot.role, &new_approver)?;

        let next = transition::reassign(
            &application,
            stage_index,
            &new_approver,
            actor,
            self.policy,
            Utc::now(),
        )?;
        self.store(application.version, next).await
    }

    async fn cancel_inner(
        &self,
        application_id: &ApplicationId,
        actor: &Principal,
    ) -> Result<Application, EngineError> {
        let application = self.load(application_id).await?;
        if application.is_terminal() {
            return Err(EngineError::invalid_state(
                application_id,
                application.status,
                "application is already complete",
            ));
        }
        self.authorize(&application, actor, Action::Cancel)?;

        let next = transition::cancel(&application, Utc::now());
        self.store(application.version, next).await
    }

    /// Every bound slot must name an eligible principal other than the
    /// requester. Later stages are only barred when the policy asks for it.
    async fn check_bound_slots(
        &self,
        requester_id: &PrincipalId,
        slots: &[StageSlot],
    ) -> Result<(), EngineError> {
        for (index, slot) in slots.iter().enumerate() {
            let Some(approver_id) = &slot.approver_id else {
                continue;
            };
            let requester_barred =
                index == 0 || self.policy.require_nominee_distinct_from_requester;
            if requester_barred && approver_id == requester_id {
                let requester_id = requester_id.clone();
                return Err(ValidationError::SelfApproval { requester_id }.into());
            }
            let approver = self.resolve_principal(approver_id).await?;
            self.gate.check_eligibility(slot.role, &approver)?;
        }
        Ok(())
    }

    async fn load(&self, application_id: &ApplicationId) -> Result<Application, EngineError> {
        self.repository
            .find_by_id(application_id)
            .await?
            .ok_or_else(|| EngineError::NotFound { application_id: application_id.clone() })
    }

    async fn store(
        &self,
        expected_version: u64,
        next: Application,
    ) -> Result<Application, EngineError> {
        match self.repository.compare_and_swap(expected_version, next.clone()).await {
            Ok(()) => Ok(next),
            Err(RepositoryError::VersionConflict { application_id, expected, actual }) => {
                Err(EngineError::invalid_state(
                    &application_id,
                    next.status,
                    format!(
                        "application changed concurrently \
                         (expected version {expected}, found {actual})"
                    ),
                ))
            }
            Err(RepositoryError::Missing { application_id }) => {
                Err(EngineError::NotFound { application_id })
            }
            Err(error) => Err(error.into()),
        }
    }

    async fn resolve_principal(
        &self,
        principal_id: &PrincipalId,
    ) -> Result<Principal, EngineError> {
        self.directory.lookup(principal_id).await?.ok_or_else(|| {
            ValidationError::UnknownPrincipal { principal_id: principal_id.clone() }.into()
        })
    }

    fn authorize(
        &self,
        application: &Application,
        actor: &Principal,
        action: Action,
    ) -> Result<(), EngineError> {
        self.gate
            .can_act(application, actor, action)
            .into_result()
            .map_err(EngineError::PermissionDenied)
    }

    fn audit_context(
        &self,
        application_id: Option<ApplicationId>,
        actor: &Principal,
    ) -> AuditContext {
        AuditContext::new(application_id, Uuid::new_v4().to_string(), actor.id.to_string())
    }

    fn emit_failure(
        &self,
        audit: &AuditContext,
        event_type: &str,
        category: AuditCategory,
        error: &EngineError,
    ) {
        let outcome = match error {
            EngineError::Repository(_) | EngineError::Directory(_) => AuditOutcome::Failed,
            _ => AuditOutcome::Rejected,
        };
        warn!(
            event_name = event_type,
            correlation_id = %audit.correlation_id,
            application_id = audit.application_id.as_ref().map(|id| id.as_str()).unwrap_or(""),
            actor_id = %audit.actor,
            error_class = error.class(),
            error = %error,
            "approval operation rejected"
        );
        self.sink.emit(
            audit
                .event(event_type, category, outcome)
                .with_metadata("error_class", error.class())
                .with_metadata("error", error.to_string()),
        );
    }
}

fn validated_fields(
    title: &str,
    content: &str,
    amount: Option<Decimal>,
) -> Result<(String, String), ValidationError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(ValidationError::BlankTitle);
    }
    let content = content.trim();
    if content.is_empty() {
        return Err(ValidationError::BlankContent);
    }
    if amount.is_some_and(|amount| amount < Decimal::ZERO) {
        return Err(ValidationError::NegativeAmount);
    }
    Ok((title.to_owned(), content.to_owned()))
}

fn ensure_reviewable(application: &Application) -> Result<(), EngineError> {
    match application.status {
        ApplicationStatus::InReview => Ok(()),
        ApplicationStatus::Draft => Err(EngineError::invalid_state(
            &application.id,
            application.status,
            "application has not been submitted",
        )),
        status => Err(EngineError::invalid_state(
            &application.id,
            status,
            "application is complete and accepts no further decisions",
        )),
    }
}

fn approver_label(application: &Application) -> String {
    application.current_approver().map(ToString::to_string).unwrap_or_default()
}
