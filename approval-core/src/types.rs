//! Core data model: workflows, stages, approval levels, applications.

use crate::action::Action;
use crate::error::{ApprovalError, ApprovalResult};
use crate::events::{ActivityKind, ApplicationAction, ApplicationActivity};
use crate::feature::FeatureManager;
use crate::stage_type::StageType;
use crate::state_manager::StateManager;
use crate::transition::Transition;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicI64, Ordering};
use uuid::Uuid;

// ─── Scalar aliases ───────────────────────────────────────────

pub type UserId = i64;
pub type WorkflowId = i64;
pub type WorkflowVersionId = i64;
pub type StageId = i64;
pub type ApprovalLevelId = i64;
pub type AssignmentId = i64;
pub type JobAssignmentId = i64;
pub type RelationshipId = i64;

/// Application instance id.
pub type ApplicationId = Uuid;

/// Allocates configuration entity ids. Persistence backends with their own
/// sequences can ignore it; the in-memory store and the cloner use it to
/// issue fresh ids.
#[derive(Debug)]
pub struct IdAllocator(AtomicI64);

impl IdAllocator {
    pub fn new() -> Self {
        IdAllocator(AtomicI64::new(1))
    }

    pub fn starting_at(next: i64) -> Self {
        IdAllocator(AtomicI64::new(next))
    }

    pub fn next(&self) -> i64 {
        self.0.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Application state ────────────────────────────────────────

/// The application's current position: (stage, draft flag, approval level).
///
/// Immutable value object — transitions always produce a new state rather
/// than mutating in place.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationState {
    stage_id: StageId,
    is_draft: bool,
    approval_level_id: Option<ApprovalLevelId>,
}

impl ApplicationState {
    pub fn new(
        stage_id: StageId,
        is_draft: bool,
        approval_level_id: Option<ApprovalLevelId>,
    ) -> Self {
        ApplicationState {
            stage_id,
            is_draft,
            approval_level_id,
        }
    }

    pub fn stage_id(&self) -> StageId {
        self.stage_id
    }

    pub fn is_draft(&self) -> bool {
        self.is_draft
    }

    pub fn approval_level_id(&self) -> Option<ApprovalLevelId> {
        self.approval_level_id
    }

    pub fn is_same_as(&self, other: &ApplicationState) -> bool {
        self == other
    }

    /// Whether this state sits in a stage of the given type code.
    pub fn is_stage_type(&self, version: &WorkflowVersion, code: u8) -> bool {
        version
            .stage(self.stage_id)
            .map(|stage| stage.stage_type.code() == code)
            .unwrap_or(false)
    }
}

// ─── Workflow configuration ───────────────────────────────────

/// Lifecycle status shared by workflows, versions and assignments.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    Draft,
    Active,
    Archived,
}

/// One ordered approval sub-step within an approvals-type stage.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ApprovalLevel {
    pub id: ApprovalLevelId,
    pub workflow_stage_id: StageId,
    pub name: String,
    /// 1-based position within the stage. Unique and contiguous per stage.
    pub ordinal_number: u32,
    pub active: bool,
}

/// Visibility of one form field at one stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FormviewVisibility {
    Editable,
    EditableAndRequired,
    ReadOnly,
    Hidden,
}

impl FormviewVisibility {
    /// Resolve the required/disabled flag pair. Hidden fields are deleted
    /// rather than stored, so (required, disabled) is unresolvable.
    pub fn from_flags(required: bool, disabled: bool) -> ApprovalResult<FormviewVisibility> {
        match (required, disabled) {
            (false, false) => Ok(FormviewVisibility::Editable),
            (true, false) => Ok(FormviewVisibility::EditableAndRequired),
            (false, true) => Ok(FormviewVisibility::ReadOnly),
            (true, true) => Err(ApprovalError::Coding(
                "Can not resolve visibility enum, unknown configuration".to_string(),
            )),
        }
    }
}

/// A form field's visibility configuration at one stage.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Formview {
    pub id: i64,
    pub workflow_stage_id: StageId,
    pub field_key: String,
    pub required: bool,
    pub disabled: bool,
}

impl Formview {
    pub fn visibility(&self) -> ApprovalResult<FormviewVisibility> {
        FormviewVisibility::from_flags(self.required, self.disabled)
    }
}

/// Predicate guarding a conditional transition. Compares one submitted
/// form-data field against an expected JSON value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub field_key: String,
    pub expected: serde_json::Value,
}

impl Condition {
    pub fn matches(&self, form_data: &serde_json::Value) -> bool {
        form_data
            .get(&self.field_key)
            .map(|value| *value == self.expected)
            .unwrap_or(false)
    }
}

/// A guarded transition within an interaction. Lower priority values are
/// evaluated first; the first matching condition wins.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConditionalTransition {
    pub id: i64,
    pub condition: Condition,
    pub transition: Transition,
    pub priority: u32,
}

/// Binds one (stage, action) pair to its possible transitions: a default
/// plus zero or more conditional transitions.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorkflowStageInteraction {
    pub id: i64,
    pub workflow_stage_id: StageId,
    pub action: Action,
    pub default_transition: Transition,
    pub conditional_transitions: Vec<ConditionalTransition>,
}

impl WorkflowStageInteraction {
    /// Select the transition for the given application form data:
    /// conditionals in ascending priority order, default otherwise.
    pub fn select_transition(&self, form_data: &serde_json::Value) -> &Transition {
        let mut conditionals: Vec<&ConditionalTransition> =
            self.conditional_transitions.iter().collect();
        conditionals.sort_by_key(|c| c.priority);
        conditionals
            .iter()
            .find(|c| c.condition.matches(form_data))
            .map(|c| &c.transition)
            .unwrap_or(&self.default_transition)
    }
}

/// One stage in a workflow version's ordered stage sequence.
///
/// Neighbor navigation lives on [`WorkflowVersion`], which holds the
/// authoritative ordered sequence.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorkflowStage {
    pub id: StageId,
    pub workflow_version_id: WorkflowVersionId,
    pub name: String,
    pub stage_type: StageType,
    /// Ordinal position within the version (1, 2, 3, ...).
    pub ordinal_number: u32,
    pub active: bool,
    /// Ordered by ordinal_number.
    pub approval_levels: Vec<ApprovalLevel>,
    pub formviews: Vec<Formview>,
    pub interactions: Vec<WorkflowStageInteraction>,
    /// Stage a RESET transition returns to. None = the version's first
    /// stage.
    pub reset_target: Option<StageId>,
}

impl WorkflowStage {
    pub fn new(
        id: StageId,
        workflow_version_id: WorkflowVersionId,
        name: &str,
        stage_type: StageType,
        ordinal_number: u32,
    ) -> WorkflowStage {
        WorkflowStage {
            id,
            workflow_version_id,
            name: name.to_string(),
            stage_type,
            ordinal_number,
            active: true,
            approval_levels: Vec::new(),
            formviews: Vec::new(),
            interactions: Vec::new(),
            reset_target: None,
        }
    }

    pub fn feature_manager(&self) -> FeatureManager {
        FeatureManager::for_stage(self)
    }

    pub fn state_manager(&self) -> StateManager<'_> {
        StateManager::new(self)
    }

    pub fn active_levels(&self) -> impl Iterator<Item = &ApprovalLevel> {
        self.approval_levels.iter().filter(|l| l.active)
    }

    pub fn first_level(&self) -> Option<&ApprovalLevel> {
        self.active_levels().min_by_key(|l| l.ordinal_number)
    }

    pub fn level(&self, id: ApprovalLevelId) -> Option<&ApprovalLevel> {
        self.approval_levels.iter().find(|l| l.id == id)
    }

    /// The next active level after the given one, if any.
    pub fn next_level(&self, id: ApprovalLevelId) -> Option<&ApprovalLevel> {
        let current = self.level(id)?;
        self.active_levels()
            .filter(|l| l.ordinal_number > current.ordinal_number)
            .min_by_key(|l| l.ordinal_number)
    }

    pub fn interaction_for(&self, action: Action) -> Option<&WorkflowStageInteraction> {
        self.interactions.iter().find(|i| i.action == action)
    }

    /// Append an approval level with the next ordinal number.
    pub fn add_approval_level(
        &mut self,
        ids: &IdAllocator,
        name: &str,
    ) -> ApprovalResult<ApprovalLevelId> {
        if self.stage_type != StageType::Approvals {
            return Err(ApprovalError::Model(format!(
                "Stage '{}' does not support approval levels",
                self.name
            )));
        }
        let ordinal = self.approval_levels.len() as u32 + 1;
        let id = ids.next();
        self.approval_levels.push(ApprovalLevel {
            id,
            workflow_stage_id: self.id,
            name: name.to_string(),
            ordinal_number: ordinal,
            active: true,
        });
        validate_level_ordinals(self)?;
        Ok(id)
    }

    /// Replace the level ordering. Ordinals are validated
    /// unique-and-contiguous at write time.
    pub fn reorder_approval_levels(&mut self, ordered_ids: &[ApprovalLevelId]) -> ApprovalResult<()> {
        if ordered_ids.len() != self.approval_levels.len() {
            return Err(ApprovalError::Validation(format!(
                "Reorder must include all {} approval levels",
                self.approval_levels.len()
            )));
        }
        for (index, id) in ordered_ids.iter().enumerate() {
            let level = self
                .approval_levels
                .iter_mut()
                .find(|l| l.id == *id)
                .ok_or_else(|| {
                    ApprovalError::Validation(format!("Unknown approval level id {id}"))
                })?;
            level.ordinal_number = index as u32 + 1;
        }
        self.approval_levels.sort_by_key(|l| l.ordinal_number);
        validate_level_ordinals(self)
    }
}

/// Ordinal numbers must be 1..=n with no duplicates or gaps.
pub fn validate_level_ordinals(stage: &WorkflowStage) -> ApprovalResult<()> {
    let mut ordinals: Vec<u32> = stage.approval_levels.iter().map(|l| l.ordinal_number).collect();
    ordinals.sort_unstable();
    for (index, ordinal) in ordinals.iter().enumerate() {
        let expected = index as u32 + 1;
        if *ordinal != expected {
            return Err(ApprovalError::Validation(format!(
                "Approval level ordinals for stage {} must be contiguous and unique, found {ordinal} at position {expected}",
                stage.id
            )));
        }
    }
    Ok(())
}

/// One immutable snapshot of a workflow's stage graph.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkflowVersion {
    pub id: WorkflowVersionId,
    pub workflow_id: WorkflowId,
    pub status: Status,
    /// Ordered by ordinal_number — the authoritative stage sequence.
    pub stages: Vec<WorkflowStage>,
}

impl WorkflowVersion {
    pub fn new(id: WorkflowVersionId, workflow_id: WorkflowId) -> WorkflowVersion {
        WorkflowVersion {
            id,
            workflow_id,
            status: Status::Draft,
            stages: Vec::new(),
        }
    }

    pub fn is_draft(&self) -> bool {
        self.status == Status::Draft
    }

    pub fn is_active(&self) -> bool {
        self.status == Status::Active
    }

    pub fn activate(&mut self) {
        self.status = Status::Active;
    }

    pub fn archive(&mut self) {
        self.status = Status::Archived;
    }

    pub fn stage(&self, id: StageId) -> ApprovalResult<&WorkflowStage> {
        self.stages
            .iter()
            .find(|s| s.id == id)
            .ok_or_else(|| ApprovalError::Model(format!("Stage {id} not found in version {}", self.id)))
    }

    pub fn stage_mut(&mut self, id: StageId) -> ApprovalResult<&mut WorkflowStage> {
        let version_id = self.id;
        self.stages
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| ApprovalError::Model(format!("Stage {id} not found in version {version_id}")))
    }

    pub fn has_stage(&self, id: StageId) -> bool {
        self.stages.iter().any(|s| s.id == id)
    }

    pub fn has_approval_level(&self, id: ApprovalLevelId) -> bool {
        self.stages.iter().any(|s| s.level(id).is_some())
    }

    pub fn first_stage(&self) -> Option<&WorkflowStage> {
        self.stages.iter().min_by_key(|s| s.ordinal_number)
    }

    pub fn next_stage(&self, id: StageId) -> Option<&WorkflowStage> {
        let current = self.stages.iter().find(|s| s.id == id)?;
        self.stages
            .iter()
            .filter(|s| s.ordinal_number > current.ordinal_number)
            .min_by_key(|s| s.ordinal_number)
    }

    pub fn previous_stage(&self, id: StageId) -> Option<&WorkflowStage> {
        let current = self.stages.iter().find(|s| s.id == id)?;
        self.stages
            .iter()
            .filter(|s| s.ordinal_number < current.ordinal_number)
            .max_by_key(|s| s.ordinal_number)
    }

    /// Add a stage of the given type, populating default interactions from
    /// the stage type's available actions. Finished stages are appended at
    /// the very end; all other types are inserted before any finished
    /// stage.
    pub fn add_stage(
        &mut self,
        ids: &IdAllocator,
        name: &str,
        stage_type: StageType,
    ) -> ApprovalResult<StageId> {
        if name.is_empty() {
            return Err(ApprovalError::Coding("name cannot be empty".to_string()));
        }
        if !self.is_draft() {
            return Err(ApprovalError::Model(
                "Can only add stage to a draft workflow version".to_string(),
            ));
        }

        let insert_at = if stage_type == StageType::Finished {
            self.stages.len()
        } else {
            self.stages
                .iter()
                .position(|s| s.stage_type == StageType::Finished)
                .unwrap_or(self.stages.len())
        };

        let stage_id = ids.next();
        let mut stage = WorkflowStage::new(stage_id, self.id, name, stage_type, 0);
        for action in stage_type.available_actions() {
            stage.interactions.push(WorkflowStageInteraction {
                id: ids.next(),
                workflow_stage_id: stage_id,
                action: *action,
                default_transition: action.default_transition(),
                conditional_transitions: Vec::new(),
            });
        }
        if stage_type == StageType::Approvals {
            stage.add_approval_level(ids, "Level 1")?;
        }

        self.stages.insert(insert_at, stage);
        for (index, stage) in self.stages.iter_mut().enumerate() {
            stage.ordinal_number = index as u32 + 1;
        }
        Ok(stage_id)
    }
}

/// A configured, versioned approval process template.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Workflow {
    pub id: WorkflowId,
    pub name: String,
    pub id_number: String,
    pub status: Status,
    /// Ordered oldest-first.
    pub versions: Vec<WorkflowVersion>,
}

impl Workflow {
    pub fn latest_version(&self) -> Option<&WorkflowVersion> {
        self.versions.last()
    }

    pub fn latest_version_mut(&mut self) -> Option<&mut WorkflowVersion> {
        self.versions.last_mut()
    }

    pub fn active_version(&self) -> Option<&WorkflowVersion> {
        self.versions.iter().rev().find(|v| v.is_active())
    }
}

// ─── Assignment ───────────────────────────────────────────────

/// One approver bound to an (assignment, approval level) pair.
///
/// `kind` selects the approver type (user or relationship); `identifier`
/// is the account id or relationship record id respectively.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AssignmentApprover {
    pub id: i64,
    pub approval_level_id: ApprovalLevelId,
    pub kind: crate::approver::ApproverKind,
    pub identifier: i64,
    pub active: bool,
}

/// The scope binding a workflow to a population of applicants and their
/// approvers.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Assignment {
    pub id: AssignmentId,
    pub workflow_id: WorkflowId,
    pub name: String,
    pub status: Status,
    pub approvers: Vec<AssignmentApprover>,
}

impl Assignment {
    pub fn is_active(&self) -> bool {
        self.status == Status::Active
    }

    pub fn approvers_for_level(
        &self,
        level_id: ApprovalLevelId,
    ) -> impl Iterator<Item = &AssignmentApprover> {
        self.approvers
            .iter()
            .filter(move |a| a.active && a.approval_level_id == level_id)
    }
}

// ─── Application ──────────────────────────────────────────────

/// Overall dashboard progress. Not a state representation — derived from
/// the last action and the current state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OverallProgress {
    Draft,
    InProgress,
    Rejected,
    Finished,
    Withdrawn,
}

/// One instance of a user progressing through a workflow. Aggregate root;
/// mutated only through the application engine, never deleted — withdrawal
/// is an audit-trail fact.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Application {
    pub id: ApplicationId,
    pub title: String,
    pub user_id: UserId,
    pub job_assignment_id: Option<JobAssignmentId>,
    pub workflow_version_id: WorkflowVersionId,
    pub assignment_id: AssignmentId,
    pub creator_id: UserId,
    pub owner_id: UserId,
    pub created: DateTime<Utc>,
    pub submitted: Option<DateTime<Utc>>,
    pub submitter_id: Option<UserId>,
    pub completed: Option<DateTime<Utc>>,
    pub current_state: ApplicationState,
    /// Latest published form data, used by interaction conditions.
    pub form_data: serde_json::Value,
    /// Append-only audit trail of applied actions.
    pub actions: Vec<ApplicationAction>,
    /// Append-only activity history (creation, stage/level boundaries).
    pub activities: Vec<ApplicationActivity>,
}

impl Application {
    pub fn last_action(&self) -> Option<&ApplicationAction> {
        self.actions.last()
    }

    pub fn is_submitted(&self) -> bool {
        self.submitted.is_some()
    }

    /// Marks the application submitted for the first time. Calling it on an
    /// already-submitted application is a programming error.
    pub fn mark_submitted(&mut self, submitter_id: UserId) -> ApprovalResult<()> {
        if self.submitted.is_some() {
            return Err(ApprovalError::Coding(
                "Cannot submit application that has already been marked submitted".to_string(),
            ));
        }
        self.submitted = Some(Utc::now());
        self.submitter_id = Some(submitter_id);
        Ok(())
    }

    pub fn mark_completed(&mut self) {
        self.completed = Some(Utc::now());
    }

    pub fn record_activity(
        &mut self,
        kind: ActivityKind,
        actor_id: Option<UserId>,
        state: &ApplicationState,
    ) {
        self.activities.push(ApplicationActivity {
            kind,
            user_id: actor_id,
            stage_id: state.stage_id(),
            approval_level_id: state.approval_level_id(),
            created: Utc::now(),
        });
    }

    /// One of DRAFT, IN_PROGRESS, REJECTED, FINISHED, WITHDRAWN.
    pub fn overall_progress(&self, version: &WorkflowVersion) -> OverallProgress {
        if let Some(last) = self.last_action() {
            match last.action {
                Action::Reject => return OverallProgress::Rejected,
                Action::WithdrawInApprovals | Action::WithdrawBeforeSubmission => {
                    return OverallProgress::Withdrawn
                }
                _ => {}
            }
        }
        if self.current_state.is_draft() {
            OverallProgress::Draft
        } else if self
            .current_state
            .is_stage_type(version, StageType::Finished.code())
        {
            OverallProgress::Finished
        } else {
            OverallProgress::InProgress
        }
    }
}
