pub mod audit;
pub mod config;
pub mod directory;
pub mod domain;
pub mod engine;
pub mod errors;
pub mod permissions;
pub mod query;
pub mod repository;
pub mod workflow;

pub use audit::{AuditEvent, AuditSink, InMemoryAuditSink, TracingAuditSink};
pub use directory::{DirectoryError, InMemoryPrincipalDirectory, PrincipalDirectory};
pub use domain::{
    Application, ApplicationId, ApplicationStatus, ApprovalRecord, Decision, Principal,
    PrincipalId, Priority, Role, StageReassignment, StageRole, StageSlot,
};
pub use engine::{ApprovalEngine, DecisionInput, DraftPatch, NewApplication, RoutingPolicy};
pub use errors::{EngineError, InterfaceError, ValidationError};
pub use permissions::{AccessCheck, AccessDenial, Action, PermissionGate};
pub use query::{ApplicationSummary, QueryService, Statistics, StatisticsFilter};
pub use repository::{ApplicationRepository, InMemoryApplicationRepository, RepositoryError};
pub use workflow::{ApproverBinding, StageSpec, WorkflowDefinition, WorkflowDefinitionError};
