//! The application engine: creation and action application.
//!
//! All application mutation funnels through [`ApplicationEngine`]. An
//! action application is a single pass: legality check, transition
//! selection, state resolution, audit recording, compare-and-swap commit,
//! then approver resolution and notification for the committed state.

use crate::action::Action;
use crate::approver::ApproverResolver;
use crate::error::{ApprovalError, ApprovalResult};
use crate::events::{ActivityKind, ApplicationAction};
use crate::notify::{ApplicationNotification, NotificationKind, Notifier};
use crate::state_manager::StateManager;
use crate::store::{ApplicationStore, WorkflowStore};
use crate::transition::Transition;
use crate::types::{
    Application, ApplicationId, ApplicationState, Assignment, AssignmentId, JobAssignmentId,
    UserId, WorkflowVersion, WorkflowVersionId,
};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Authorization seam. The engine asks before applying any action; hosts
/// wire this to their permission system.
pub trait CapabilityOracle: Send + Sync {
    fn can_apply(&self, actor_id: UserId, action: Action, application: &Application) -> bool;
}

/// Grants everything. For embedded and test use.
pub struct AllowAll;

impl CapabilityOracle for AllowAll {
    fn can_apply(&self, _actor_id: UserId, _action: Action, _application: &Application) -> bool {
        true
    }
}

#[derive(Clone, Debug)]
pub struct CreateApplicationRequest {
    pub title: String,
    pub user_id: UserId,
    pub job_assignment_id: Option<JobAssignmentId>,
    pub workflow_version_id: WorkflowVersionId,
    pub assignment_id: AssignmentId,
    pub creator_id: UserId,
}

/// Result of a committed state change.
#[derive(Clone, Debug)]
pub struct ApplyOutcome {
    pub new_state: ApplicationState,
    /// Users who may act at the new state's approval level. Empty when the
    /// state has no level, and also when the level has no configured
    /// approvers yet; in the latter case the application waits.
    pub approvers: Vec<UserId>,
    /// The audit record appended by this change. None for system-fired
    /// interactions, which record activities but no actor action.
    pub recorded: Option<ApplicationAction>,
}

pub struct ApplicationEngine {
    applications: Arc<dyn ApplicationStore>,
    workflows: Arc<dyn WorkflowStore>,
    capabilities: Arc<dyn CapabilityOracle>,
    approvers: ApproverResolver,
    notifier: Arc<dyn Notifier>,
}

impl ApplicationEngine {
    pub fn new(
        applications: Arc<dyn ApplicationStore>,
        workflows: Arc<dyn WorkflowStore>,
        capabilities: Arc<dyn CapabilityOracle>,
        approvers: ApproverResolver,
        notifier: Arc<dyn Notifier>,
    ) -> ApplicationEngine {
        ApplicationEngine {
            applications,
            workflows,
            capabilities,
            approvers,
            notifier,
        }
    }

    /// Create an application on an active workflow version. The version's
    /// first stage hosts creation, so it must be a form-submission stage.
    pub async fn create_application(
        &self,
        request: CreateApplicationRequest,
    ) -> ApprovalResult<Application> {
        let version = self.workflows.load_version(request.workflow_version_id).await?;
        let workflow = self.workflows.load_workflow(version.workflow_id).await?;
        // Applications start on the workflow's active version, never on a
        // draft, archived or superseded one.
        let active = workflow.active_version().ok_or_else(|| {
            ApprovalError::Model(format!("Workflow {} has no active version", workflow.id))
        })?;
        if active.id != version.id {
            return Err(ApprovalError::Model(format!(
                "Workflow version {} is not the active version of workflow {}",
                version.id, workflow.id
            )));
        }
        let assignment = self.workflows.load_assignment(request.assignment_id).await?;
        if !assignment.is_active() {
            return Err(ApprovalError::Model(format!(
                "Assignment {} is not active",
                assignment.id
            )));
        }

        let first_stage = version.first_stage().ok_or_else(|| {
            ApprovalError::Model(format!("Workflow version {} has no stages", version.id))
        })?;
        let state = first_stage.state_manager().creation_state()?;

        let mut application = Application {
            id: Uuid::now_v7(),
            title: request.title,
            user_id: request.user_id,
            job_assignment_id: request.job_assignment_id,
            workflow_version_id: version.id,
            assignment_id: assignment.id,
            creator_id: request.creator_id,
            owner_id: request.creator_id,
            created: Utc::now(),
            submitted: None,
            submitter_id: None,
            completed: None,
            current_state: state.clone(),
            form_data: serde_json::Value::Object(Default::default()),
            actions: Vec::new(),
            activities: Vec::new(),
        };
        application.record_activity(ActivityKind::Creation, Some(request.creator_id), &state);

        info!(application = %application.id, version = version.id, "application created");
        self.applications.save_application(application.clone()).await?;
        Ok(application)
    }

    /// Apply an action on behalf of an actor.
    pub async fn apply_action(
        &self,
        application_id: ApplicationId,
        actor_id: UserId,
        action: Action,
        form_data: Option<serde_json::Value>,
    ) -> ApprovalResult<ApplyOutcome> {
        let mut application = self.applications.load_application(application_id).await?;
        let version = self
            .workflows
            .load_version(application.workflow_version_id)
            .await?;
        let expected_state = application.current_state.clone();
        let stage = version.stage(expected_state.stage_id())?;

        if !stage.stage_type.is_action_available(action) {
            return Err(ApprovalError::IllegalAction {
                action: action.as_enum(),
                stage: stage.name.clone(),
            });
        }
        if !self.capabilities.can_apply(actor_id, action, &application) {
            return Err(ApprovalError::Model(format!(
                "User {actor_id} can not perform {} on application {application_id}",
                action.as_enum()
            )));
        }

        if let Some(form_data) = form_data {
            application.form_data = form_data;
        }

        let transition = stage
            .interaction_for(action)
            .map(|i| *i.select_transition(&application.form_data))
            .unwrap_or_else(|| action.default_transition());

        let new_state = self.resolve_state(&version, &expected_state, action, transition)?;
        debug!(application = %application_id, action = action.as_enum(),
            from_stage = expected_state.stage_id(), to_stage = new_state.stage_id(),
            "action resolved");

        if action == Action::Submit && !application.is_submitted() {
            application.mark_submitted(actor_id)?;
        }

        let recorded = ApplicationAction {
            action,
            user_id: actor_id,
            created: Utc::now(),
            resulting_state: new_state.clone(),
            form_data: application.form_data.clone(),
        };
        application.actions.push(recorded.clone());
        application.current_state = new_state.clone();
        StateManager::record_state_change(
            &version,
            &mut application,
            &expected_state,
            &new_state,
            Some(actor_id),
        )?;

        // Approvers are resolved before the commit so a failing assignment
        // lookup leaves the stored state untouched.
        let approvers = self
            .resolve_approvers(&version, &application, &new_state)
            .await?;

        self.applications
            .update_application(&expected_state, application.clone())
            .await?;

        // The commit is durable at this point. Notification delivery is
        // fire-and-forget; a failing notifier must not turn a committed
        // state change into an error the caller would retry.
        if let Err(error) = self
            .dispatch_notification(&application, action, &new_state, &approvers)
            .await
        {
            warn!(application = %application_id, %error, "notification dispatch failed");
        }

        Ok(ApplyOutcome {
            new_state,
            approvers,
            recorded: Some(recorded),
        })
    }

    /// Fire a configured interaction directly, without an actor action.
    /// This is how waiting stages progress: an external collaborator fires
    /// the stage's interaction when its condition is met. Activities are
    /// recorded with no actor; no action audit record is appended.
    pub async fn fire_interaction(
        &self,
        application_id: ApplicationId,
        interaction_id: i64,
    ) -> ApprovalResult<ApplyOutcome> {
        let mut application = self.applications.load_application(application_id).await?;
        let version = self
            .workflows
            .load_version(application.workflow_version_id)
            .await?;
        let expected_state = application.current_state.clone();
        let stage = version.stage(expected_state.stage_id())?;

        let interaction = stage
            .interactions
            .iter()
            .find(|i| i.id == interaction_id)
            .ok_or_else(|| {
                ApprovalError::Model(format!(
                    "Interaction {interaction_id} is not configured on stage '{}'",
                    stage.name
                ))
            })?;
        let transition = *interaction.select_transition(&application.form_data);

        let new_state = resolve_transition(&version, &expected_state, transition)?;
        debug!(application = %application_id, interaction = interaction_id,
            from_stage = expected_state.stage_id(), to_stage = new_state.stage_id(),
            "interaction fired");

        application.current_state = new_state.clone();
        StateManager::record_state_change(
            &version,
            &mut application,
            &expected_state,
            &new_state,
            None,
        )?;

        let approvers = self
            .resolve_approvers(&version, &application, &new_state)
            .await?;

        self.applications
            .update_application(&expected_state, application.clone())
            .await?;

        if new_state.approval_level_id().is_some() {
            let notification = ApplicationNotification {
                kind: NotificationKind::ApprovalRequired,
                application_id: application.id,
                stage_id: new_state.stage_id(),
                approval_level_id: new_state.approval_level_id(),
                recipients: approvers.clone(),
            };
            if let Err(error) = self.notifier.notify(notification).await {
                warn!(application = %application_id, %error, "notification dispatch failed");
            }
        }

        Ok(ApplyOutcome {
            new_state,
            approvers,
            recorded: None,
        })
    }

    /// The approver user set for an application's current level.
    pub async fn current_approvers(
        &self,
        application: &Application,
    ) -> ApprovalResult<Vec<UserId>> {
        let version = self
            .workflows
            .load_version(application.workflow_version_id)
            .await?;
        self.resolve_approvers(&version, application, &application.current_state)
            .await
    }

    fn resolve_state(
        &self,
        version: &WorkflowVersion,
        current: &ApplicationState,
        action: Action,
        transition: Transition,
    ) -> ApprovalResult<ApplicationState> {
        // Withdrawing an unsubmitted application returns it to its stage's
        // creation state, keeping the draft flag.
        if action == Action::WithdrawBeforeSubmission {
            return version.stage(current.stage_id())?.state_manager().creation_state();
        }
        resolve_transition(version, current, transition)
    }

    async fn resolve_approvers(
        &self,
        version: &WorkflowVersion,
        application: &Application,
        state: &ApplicationState,
    ) -> ApprovalResult<Vec<UserId>> {
        let Some(level_id) = state.approval_level_id() else {
            return Ok(Vec::new());
        };
        // A stored state can drift from the configuration it references.
        if !version.has_approval_level(level_id) {
            return Err(ApprovalError::Model(format!(
                "Approval level {level_id} is not part of workflow version {}",
                version.id
            )));
        }
        let assignment: Assignment =
            self.workflows.load_assignment(application.assignment_id).await?;
        self.approvers
            .resolve(
                &assignment,
                level_id,
                application.user_id,
                application.job_assignment_id,
            )
            .await
    }

    async fn dispatch_notification(
        &self,
        application: &Application,
        action: Action,
        new_state: &ApplicationState,
        approvers: &[UserId],
    ) -> ApprovalResult<()> {
        let (kind, recipients) = if new_state.approval_level_id().is_some() {
            (NotificationKind::ApprovalRequired, approvers.to_vec())
        } else {
            let kind = match action {
                Action::Submit => NotificationKind::ApplicationSubmitted,
                Action::Approve => {
                    if application.completed.is_some() {
                        NotificationKind::ApplicationCompleted
                    } else {
                        NotificationKind::ApplicationApproved
                    }
                }
                Action::Reject => NotificationKind::ApplicationRejected,
                Action::WithdrawBeforeSubmission | Action::WithdrawInApprovals => {
                    NotificationKind::ApplicationWithdrawn
                }
                Action::ResetApprovals => return Ok(()),
            };
            (kind, vec![application.user_id])
        };
        self.notifier
            .notify(ApplicationNotification {
                kind,
                application_id: application.id,
                stage_id: new_state.stage_id(),
                approval_level_id: new_state.approval_level_id(),
                recipients,
            })
            .await
    }
}

/// Next and Previous walk approval levels through the stage's state
/// manager; absolute jumps and resets go straight to the target stage's
/// initial state.
fn resolve_transition(
    version: &WorkflowVersion,
    current: &ApplicationState,
    transition: Transition,
) -> ApprovalResult<ApplicationState> {
    let stage = version.stage(current.stage_id())?;
    match transition {
        Transition::Next => stage.state_manager().next_state(version, current),
        Transition::Previous => stage.state_manager().previous_state(version, current),
        other => other.resolve(version, current),
    }
}
