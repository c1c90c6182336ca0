pub mod application;
pub mod principal;

pub use application::{
    parse_amount, Application, ApplicationId, ApplicationStatus, ApprovalRecord, Decision,
    Priority, StageReassignment, StageRole, StageSlot,
};
pub use principal::{Principal, PrincipalId, Role};
