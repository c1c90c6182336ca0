use std::fmt;

use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::principal::{PrincipalId, Role};

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ApplicationId(pub String);

impl ApplicationId {
    /// `APP-YYYYMMDD-XXXXXXXX`, dated by creation day.
    pub fn generate() -> Self {
        let suffix = Uuid::new_v4().simple().to_string();
        Self(format!("APP-{}-{}", Utc::now().format("%Y%m%d"), suffix[..8].to_ascii_uppercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ApplicationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    Draft,
    InReview,
    Approved,
    Rejected,
    Cancelled,
}

impl ApplicationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::InReview => "in_review",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "draft" => Some(Self::Draft),
            "in_review" => Some(Self::InReview),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Terminal statuses are absorbing: nothing but reads happens afterwards.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Approved | Self::Rejected | Self::Cancelled)
    }
}

impl fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Urgent,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
            Self::Urgent => "urgent",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "low" => Some(Self::Low),
            "normal" => Some(Self::Normal),
            "high" => Some(Self::High),
            "urgent" => Some(Self::Urgent),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageRole {
    FactoryManagerReview,
    DirectorReview,
    ManagerReview,
    CeoReview,
}

impl StageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FactoryManagerReview => "factory_manager_review",
            Self::DirectorReview => "director_review",
            Self::ManagerReview => "manager_review",
            Self::CeoReview => "ceo_review",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "factory_manager_review" => Some(Self::FactoryManagerReview),
            "director_review" => Some(Self::DirectorReview),
            "manager_review" => Some(Self::ManagerReview),
            "ceo_review" => Some(Self::CeoReview),
            _ => None,
        }
    }

    /// The only principal role that may be bound to this stage.
    pub fn eligible_role(&self) -> Role {
        match self {
            Self::FactoryManagerReview => Role::FactoryManager,
            Self::DirectorReview => Role::Director,
            Self::ManagerReview => Role::Manager,
            Self::CeoReview => Role::Ceo,
        }
    }
}

impl fmt::Display for StageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Approved,
    Rejected,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "approved" | "approve" => Some(Self::Approved),
            "rejected" | "reject" => Some(Self::Rejected),
            _ => None,
        }
    }
}

/// Parses a user-entered amount, accepting `,` thousands separators.
pub fn parse_amount(raw: &str) -> Option<Decimal> {
    let cleaned: String = raw.chars().filter(|ch| *ch != ',' && !ch.is_whitespace()).collect();
    if cleaned.is_empty() {
        return None;
    }
    Decimal::from_str(&cleaned).ok()
}

/// One position of the effective stage sequence. `approver_id` stays `None`
/// until a dynamic route (or an explicit reassign) fills it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageSlot {
    pub role: StageRole,
    pub approver_id: Option<PrincipalId>,
}

impl StageSlot {
    pub fn bound(role: StageRole, approver_id: PrincipalId) -> Self {
        Self { role, approver_id: Some(approver_id) }
    }

    pub fn unresolved(role: StageRole) -> Self {
        Self { role, approver_id: None }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalRecord {
    pub sequence: u32,
    pub stage_index: usize,
    pub stage_role: StageRole,
    pub actor_id: PrincipalId,
    pub decision: Decision,
    pub comment: Option<String>,
    pub next_approver_id: Option<PrincipalId>,
    pub decided_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageReassignment {
    pub stage_index: usize,
    pub stage_role: StageRole,
    pub previous_approver_id: Option<PrincipalId>,
    pub new_approver_id: PrincipalId,
    pub reassigned_by: PrincipalId,
    pub reassigned_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Application {
    pub id: ApplicationId,
    pub requester_id: PrincipalId,
    pub title: String,
    pub content: String,
    pub amount: Option<Decimal>,
    pub priority: Priority,
    pub skip_manager_stage: bool,
    pub status: ApplicationStatus,
    pub current_stage_index: usize,
    pub effective_stages: Vec<StageSlot>,
    pub history: Vec<ApprovalRecord>,
    pub reassignments: Vec<StageReassignment>,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Application {
    pub fn current_stage(&self) -> Option<&StageSlot> {
        if self.status != ApplicationStatus::InReview {
            return None;
        }
        self.effective_stages.get(self.current_stage_index)
    }

    pub fn current_approver(&self) -> Option<&PrincipalId> {
        self.current_stage().and_then(|stage| stage.approver_id.as_ref())
    }

    pub fn is_current_approver(&self, principal_id: &PrincipalId) -> bool {
        self.current_approver() == Some(principal_id)
    }

    pub fn has_decided(&self, principal_id: &PrincipalId) -> bool {
        self.history.iter().any(|record| &record.actor_id == principal_id)
    }

    pub fn is_bound_approver(&self, principal_id: &PrincipalId) -> bool {
        self.effective_stages.iter().any(|stage| stage.approver_id.as_ref() == Some(principal_id))
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Structural invariants every persisted application must satisfy.
    pub fn invariant_violations(&self) -> Vec<String> {
        let mut violations = Vec::new();
        let stage_count = self.effective_stages.len();

        match self.status {
            ApplicationStatus::InReview if self.current_stage_index >= stage_count => {
                violations.push(format!(
                    "in_review application has stage index {} outside {} stages",
                    self.current_stage_index, stage_count
                ));
            }
            ApplicationStatus::Approved if self.current_stage_index != stage_count => {
                violations.push(format!(
                    "approved application stopped at stage index {} of {}",
                    self.current_stage_index, stage_count
                ));
            }
            _ => {}
        }

        if self.current_stage_index > stage_count {
            violations.push("stage index exceeds stage count".to_string());
        }

        let decided_stages: Vec<usize> =
            self.history.iter().map(|record| record.stage_index).collect();
        if decided_stages.windows(2).any(|pair| pair[0] >= pair[1]) {
            violations.push("approval history revisits a stage".to_string());
        }

        violations
    }
}
