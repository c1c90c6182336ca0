use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::WorkflowConfig;
use crate::domain::{PrincipalId, StageRole, StageSlot};
use crate::errors::ValidationError;

/// How a stage gets its approver.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "approver_id", rename_all = "snake_case")]
pub enum ApproverBinding {
    /// Named by the requester when the application is created.
    ChosenByRequester,
    /// Fixed by workflow configuration.
    Designated(PrincipalId),
    /// Left open; the previous stage's approver nominates it while approving.
    RoutedByPrevious,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageSpec {
    pub role: StageRole,
    pub binding: ApproverBinding,
    /// Elided from the effective sequence when the application asks to skip.
    pub skippable: bool,
}

impl StageSpec {
    pub fn new(role: StageRole, binding: ApproverBinding) -> Self {
        Self { role, binding, skippable: false }
    }

    pub fn skippable(mut self) -> Self {
        self.skippable = true;
        self
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum WorkflowDefinitionError {
    #[error("workflow must declare at least one stage")]
    Empty,
    #[error("first stage `{role}` must be bound at creation time and cannot be skipped")]
    FirstStageUnbound { role: StageRole },
    #[error("only the first stage can be chosen by the requester, found `{role}`")]
    RequesterChoiceNotFirst { role: StageRole },
    #[error("stage `{role}` is declared more than once")]
    DuplicateStage { role: StageRole },
}

/// Static, ordered description of the approval stages.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkflowDefinition {
    stages: Vec<StageSpec>,
}

impl WorkflowDefinition {
    pub fn new(stages: Vec<StageSpec>) -> Result<Self, WorkflowDefinitionError> {
        let Some(first) = stages.first() else {
            return Err(WorkflowDefinitionError::Empty);
        };

        if first.skippable || first.binding == ApproverBinding::RoutedByPrevious {
            return Err(WorkflowDefinitionError::FirstStageUnbound { role: first.role });
        }

        if let Some(stage) = stages
            .iter()
            .skip(1)
            .find(|stage| stage.binding == ApproverBinding::ChosenByRequester)
        {
            return Err(WorkflowDefinitionError::RequesterChoiceNotFirst { role: stage.role });
        }

        for (index, stage) in stages.iter().enumerate() {
            if stages[..index].iter().any(|earlier| earlier.role == stage.role) {
                return Err(WorkflowDefinitionError::DuplicateStage { role: stage.role });
            }
        }

        Ok(Self { stages })
    }

    /// Factory manager -> director -> manager (skippable) -> CEO.
    ///
    /// Director and CEO are designated when an id is supplied and otherwise
    /// routed by whichever stage precedes them.
    pub fn standard(
        director_approver_id: Option<PrincipalId>,
        ceo_approver_id: Option<PrincipalId>,
    ) -> Self {
        let bind = |approver: Option<PrincipalId>| {
            approver.map(ApproverBinding::Designated).unwrap_or(ApproverBinding::RoutedByPrevious)
        };

        Self {
            stages: vec![
                StageSpec::new(StageRole::FactoryManagerReview, ApproverBinding::ChosenByRequester),
                StageSpec::new(StageRole::DirectorReview, bind(director_approver_id)),
                StageSpec::new(StageRole::ManagerReview, ApproverBinding::RoutedByPrevious)
                    .skippable(),
                StageSpec::new(StageRole::CeoReview, bind(ceo_approver_id)),
            ],
        }
    }

    pub fn from_config(config: &WorkflowConfig) -> Self {
        Self::standard(
            config.director_approver_id.clone().map(PrincipalId::new),
            config.ceo_approver_id.clone().map(PrincipalId::new),
        )
    }

    pub fn stages(&self) -> &[StageSpec] {
        &self.stages
    }

    /// Computes the effective stage sequence for one application.
    ///
    /// Routed stages come back unresolved. Decisions read routing from these
    /// slots, so later configuration changes leave in-flight applications alone.
    pub fn resolve(
        &self,
        skip_skippable: bool,
        first_approver_id: Option<&PrincipalId>,
    ) -> Result<Vec<StageSlot>, ValidationError> {
        let mut slots = Vec::with_capacity(self.stages.len());

        for spec in self.stages.iter().filter(|spec| !(skip_skippable && spec.skippable)) {
            let slot = match &spec.binding {
                ApproverBinding::ChosenByRequester => {
                    let approver_id = first_approver_id
                        .filter(|id| !id.as_str().trim().is_empty())
                        .ok_or(ValidationError::MissingFirstApprover)?;
                    StageSlot::bound(spec.role, approver_id.clone())
                }
                ApproverBinding::Designated(approver_id) => {
                    StageSlot::bound(spec.role, approver_id.clone())
                }
                ApproverBinding::RoutedByPrevious => StageSlot::unresolved(spec.role),
            };
            slots.push(slot);
        }

        let Some(first) = slots.first() else {
            return Err(ValidationError::EmptyStageSequence);
        };
        if first.approver_id.is_none() {
            return Err(ValidationError::UnresolvedStage { stage: first.role });
        }

        Ok(slots)
    }
}

impl Default for WorkflowDefinition {
    fn default() -> Self {
        Self::standard(None, None)
    }
}

#[cfg(test)]
mod tests {
    use super::{ApproverBinding, StageSpec, WorkflowDefinition, WorkflowDefinitionError};
    use crate::config::WorkflowConfig;
    use crate::domain::{PrincipalId, StageRole, StageSlot};
    use crate::errors::ValidationError;

    fn standard() -> WorkflowDefinition {
        WorkflowDefinition::standard(Some(PrincipalId::new("D1")), Some(PrincipalId::new("C1")))
    }

    #[test]
    fn full_sequence_binds_requester_choice_and_designated_approvers() {
        let slots = standard().resolve(false, Some(&PrincipalId::new("F1"))).expect("resolve");

        assert_eq!(
            slots,
            vec![
                StageSlot::bound(StageRole::FactoryManagerReview, PrincipalId::new("F1")),
                StageSlot::bound(StageRole::DirectorReview, PrincipalId::new("D1")),
                StageSlot::unresolved(StageRole::ManagerReview),
                StageSlot::bound(StageRole::CeoReview, PrincipalId::new("C1")),
            ]
        );
    }

    #[test]
    fn skipping_elides_manager_review_only() {
        let slots = standard().resolve(true, Some(&PrincipalId::new("F1"))).expect("resolve");

        assert_eq!(slots.len(), 3);
        assert!(slots.iter().all(|slot| slot.role != StageRole::ManagerReview));
        assert_eq!(slots[2].role, StageRole::CeoReview);
    }

    #[test]
    fn missing_first_approver_fails_instead_of_skipping_review() {
        let error = standard().resolve(false, None).expect_err("must fail");
        assert_eq!(error, ValidationError::MissingFirstApprover);

        let blank = PrincipalId::new("  ");
        let error = standard().resolve(false, Some(&blank)).expect_err("must fail");
        assert_eq!(error, ValidationError::MissingFirstApprover);
    }

    #[test]
    fn unconfigured_director_and_ceo_are_routed() {
        let definition = WorkflowDefinition::from_config(&WorkflowConfig::default());
        let routed: Vec<StageRole> = definition
            .stages()
            .iter()
            .filter(|stage| stage.binding == ApproverBinding::RoutedByPrevious)
            .map(|stage| stage.role)
            .collect();

        assert_eq!(
            routed,
            vec![StageRole::DirectorReview, StageRole::ManagerReview, StageRole::CeoReview]
        );

        let slots = definition.resolve(false, Some(&PrincipalId::new("F1"))).expect("resolve");
        assert!(slots[1..].iter().all(|slot| slot.approver_id.is_none()));
    }

    #[test]
    fn definition_rejects_unbound_first_stage() {
        let error = WorkflowDefinition::new(vec![StageSpec::new(
            StageRole::DirectorReview,
            ApproverBinding::RoutedByPrevious,
        )])
        .expect_err("must fail");
        assert_eq!(
            error,
            WorkflowDefinitionError::FirstStageUnbound { role: StageRole::DirectorReview }
        );

        let error = WorkflowDefinition::new(Vec::new()).expect_err("must fail");
        assert_eq!(error, WorkflowDefinitionError::Empty);
    }

    #[test]
    fn definition_rejects_duplicates_and_late_requester_choice() {
        let duplicate = WorkflowDefinition::new(vec![
            StageSpec::new(StageRole::FactoryManagerReview, ApproverBinding::ChosenByRequester),
            StageSpec::new(StageRole::FactoryManagerReview, ApproverBinding::RoutedByPrevious),
        ])
        .expect_err("duplicate stage");
        assert_eq!(
            duplicate,
            WorkflowDefinitionError::DuplicateStage { role: StageRole::FactoryManagerReview }
        );

        let late_choice = WorkflowDefinition::new(vec![
            StageSpec::new(StageRole::FactoryManagerReview, ApproverBinding::ChosenByRequester),
            StageSpec::new(StageRole::CeoReview, ApproverBinding::ChosenByRequester),
        ])
        .expect_err("late requester choice");
        assert_eq!(
            late_choice,
            WorkflowDefinitionError::RequesterChoiceNotFirst { role: StageRole::CeoReview }
        );
    }
}
