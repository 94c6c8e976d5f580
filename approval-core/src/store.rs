//! Persistence seams and the in-memory reference store.

use crate::error::{ApprovalError, ApprovalResult};
use crate::types::{
    Application, ApplicationId, ApplicationState, Assignment, AssignmentId, Workflow, WorkflowId,
    WorkflowVersion, WorkflowVersionId,
};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

/// Storage for workflow configuration and assignments.
#[async_trait]
pub trait WorkflowStore: Send + Sync {
    async fn save_workflow(&self, workflow: Workflow) -> ApprovalResult<()>;
    async fn load_workflow(&self, id: WorkflowId) -> ApprovalResult<Workflow>;
    async fn load_version(&self, id: WorkflowVersionId) -> ApprovalResult<WorkflowVersion>;
    async fn save_assignment(&self, assignment: Assignment) -> ApprovalResult<()>;
    async fn load_assignment(&self, id: AssignmentId) -> ApprovalResult<Assignment>;
}

/// Storage for application instances.
///
/// `update_application` is compare-and-swap on the current state: the write
/// commits only if the stored state still equals `expected`, otherwise the
/// caller gets a conflict and must reload.
#[async_trait]
pub trait ApplicationStore: Send + Sync {
    async fn save_application(&self, application: Application) -> ApprovalResult<()>;
    async fn load_application(&self, id: ApplicationId) -> ApprovalResult<Application>;
    async fn update_application(
        &self,
        expected: &ApplicationState,
        application: Application,
    ) -> ApprovalResult<()>;
}

/// In-memory store backing tests and embedded use.
#[derive(Default)]
pub struct MemoryStore {
    workflows: RwLock<HashMap<WorkflowId, Workflow>>,
    assignments: RwLock<HashMap<AssignmentId, Assignment>>,
    applications: RwLock<HashMap<ApplicationId, Application>>,
}

impl MemoryStore {
    pub fn new() -> MemoryStore {
        MemoryStore::default()
    }
}

#[async_trait]
impl WorkflowStore for MemoryStore {
    async fn save_workflow(&self, workflow: Workflow) -> ApprovalResult<()> {
        debug!(workflow = workflow.id, "saving workflow");
        self.workflows.write().await.insert(workflow.id, workflow);
        Ok(())
    }

    async fn load_workflow(&self, id: WorkflowId) -> ApprovalResult<Workflow> {
        self.workflows
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| ApprovalError::Model(format!("Workflow {id} not found")))
    }

    async fn load_version(&self, id: WorkflowVersionId) -> ApprovalResult<WorkflowVersion> {
        self.workflows
            .read()
            .await
            .values()
            .flat_map(|w| w.versions.iter())
            .find(|v| v.id == id)
            .cloned()
            .ok_or_else(|| ApprovalError::Model(format!("Workflow version {id} not found")))
    }

    async fn save_assignment(&self, assignment: Assignment) -> ApprovalResult<()> {
        self.assignments
            .write()
            .await
            .insert(assignment.id, assignment);
        Ok(())
    }

    async fn load_assignment(&self, id: AssignmentId) -> ApprovalResult<Assignment> {
        self.assignments
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| ApprovalError::Model(format!("Assignment {id} not found")))
    }
}

#[async_trait]
impl ApplicationStore for MemoryStore {
    async fn save_application(&self, application: Application) -> ApprovalResult<()> {
        debug!(application = %application.id, "saving application");
        self.applications
            .write()
            .await
            .insert(application.id, application);
        Ok(())
    }

    async fn load_application(&self, id: ApplicationId) -> ApprovalResult<Application> {
        self.applications
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| ApprovalError::Model(format!("Application {id} not found")))
    }

    async fn update_application(
        &self,
        expected: &ApplicationState,
        application: Application,
    ) -> ApprovalResult<()> {
        let mut applications = self.applications.write().await;
        let stored = applications.get(&application.id).ok_or_else(|| {
            ApprovalError::Model(format!("Application {} not found", application.id))
        })?;
        if !stored.current_state.is_same_as(expected) {
            return Err(ApprovalError::Conflict(format!(
                "Application {} was modified concurrently",
                application.id
            )));
        }
        applications.insert(application.id, application);
        Ok(())
    }
}
