//! Notification dispatch seam.
//!
//! The engine emits notifications after a state change commits; delivery
//! is behind a trait so hosts can plug in mail, message buses or nothing.

use crate::error::ApprovalResult;
use crate::types::{ApplicationId, ApprovalLevelId, StageId, UserId, Workflow, WorkflowVersion};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotificationKind {
    ApplicationSubmitted,
    ApprovalRequired,
    ApplicationApproved,
    ApplicationRejected,
    ApplicationWithdrawn,
    ApplicationCompleted,
}

/// One notification ready for dispatch. Recipients are resolved user ids;
/// template rendering happens host-side with a [`PlaceholderContext`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApplicationNotification {
    pub kind: NotificationKind,
    pub application_id: ApplicationId,
    pub stage_id: StageId,
    pub approval_level_id: Option<ApprovalLevelId>,
    pub recipients: Vec<UserId>,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: ApplicationNotification) -> ApprovalResult<()>;
}

/// Discards notifications. Default for embedded and test use.
pub struct NullNotifier;

#[async_trait]
impl Notifier for NullNotifier {
    async fn notify(&self, notification: ApplicationNotification) -> ApprovalResult<()> {
        debug!(kind = ?notification.kind, application = %notification.application_id,
            recipients = notification.recipients.len(), "notification discarded");
        Ok(())
    }
}

/// Name lookups for notification templates. Lookups are cached per id so a
/// template referencing the same placeholder repeatedly resolves once.
pub struct PlaceholderContext<'a> {
    workflow: &'a Workflow,
    version: &'a WorkflowVersion,
    stage_names: HashMap<StageId, String>,
    level_names: HashMap<ApprovalLevelId, String>,
}

impl<'a> PlaceholderContext<'a> {
    pub fn new(workflow: &'a Workflow, version: &'a WorkflowVersion) -> PlaceholderContext<'a> {
        PlaceholderContext {
            workflow,
            version,
            stage_names: HashMap::new(),
            level_names: HashMap::new(),
        }
    }

    pub fn workflow_name(&self) -> &str {
        &self.workflow.name
    }

    pub fn stage_name(&mut self, stage_id: StageId) -> &str {
        let version = self.version;
        self.stage_names.entry(stage_id).or_insert_with(|| {
            version
                .stage(stage_id)
                .map(|s| s.name.clone())
                .unwrap_or_default()
        })
    }

    pub fn level_name(&mut self, level_id: ApprovalLevelId) -> &str {
        let version = self.version;
        self.level_names.entry(level_id).or_insert_with(|| {
            version
                .stages
                .iter()
                .find_map(|s| s.level(level_id))
                .map(|l| l.name.clone())
                .unwrap_or_default()
        })
    }
}
