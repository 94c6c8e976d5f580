//! Audit records appended to an application as it moves.

use crate::action::Action;
use crate::types::{ApplicationState, ApprovalLevelId, StageId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One applied action and the state it produced. Append-only.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApplicationAction {
    pub action: Action,
    pub user_id: UserId,
    pub created: DateTime<Utc>,
    pub resulting_state: ApplicationState,
    /// Form data snapshot published by this action.
    pub form_data: serde_json::Value,
}

/// The kind of lifecycle boundary an activity records.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActivityKind {
    Creation,
    StageStarted,
    StageEnded,
    LevelStarted,
    LevelEnded,
}

/// One activity-trail entry. `user_id` is None for system-driven moves.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApplicationActivity {
    pub kind: ActivityKind,
    pub user_id: Option<UserId>,
    pub stage_id: StageId,
    pub approval_level_id: Option<ApprovalLevelId>,
    pub created: DateTime<Utc>,
}
