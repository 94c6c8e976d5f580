//! Core engine for multi-stage approval workflows.
//!
//! A workflow is a versioned sequence of typed stages; applications move
//! through a version's stages by applying actions, with per-stage approval
//! levels and resolvable approvers. Persistence, authorization and
//! notification sit behind traits so the engine embeds anywhere.
//!
//! Entry points: [`machine::ApplicationEngine`] for application lifecycle,
//! [`types::WorkflowVersion`] for configuration, [`cloner::clone_workflow`]
//! for duplicating configured workflows.

pub mod action;
pub mod approver;
pub mod cloner;
pub mod error;
pub mod events;
pub mod feature;
pub mod machine;
pub mod notify;
pub mod stage_type;
pub mod state_manager;
pub mod store;
pub mod transition;
pub mod types;

pub use action::Action;
pub use approver::{ApproverKind, ApproverResolver};
pub use error::{ApprovalError, ApprovalResult};
pub use feature::{Feature, FeatureManager};
pub use machine::{ApplicationEngine, ApplyOutcome, CreateApplicationRequest};
pub use stage_type::StageType;
pub use state_manager::StateManager;
pub use store::{ApplicationStore, MemoryStore, WorkflowStore};
pub use transition::Transition;
pub use types::{
    Application, ApplicationState, ApprovalLevel, Assignment, Workflow, WorkflowStage,
    WorkflowVersion,
};
