pub mod definition;

pub use definition::{ApproverBinding, StageSpec, WorkflowDefinition, WorkflowDefinitionError};
