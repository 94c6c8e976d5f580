//! Per-stage state semantics.
//!
//! Each stage type answers the same four questions: what state does an
//! application created in this stage get, what state does it get when it
//! enters this stage mid-flow, and what comes next or previous from a
//! state inside it. The answers differ by stage type; everything else in
//! the engine is type-agnostic.

use crate::error::{ApprovalError, ApprovalResult};
use crate::events::ActivityKind;
use crate::stage_type::StageType;
use crate::types::{
    Application, ApplicationState, ApprovalLevel, UserId, WorkflowStage, WorkflowVersion,
};

pub struct StateManager<'a> {
    stage: &'a WorkflowStage,
}

impl<'a> StateManager<'a> {
    pub fn new(stage: &'a WorkflowStage) -> StateManager<'a> {
        StateManager { stage }
    }

    /// State of a newly created application. Only form-submission stages
    /// can host creation; everywhere else it is a configuration error.
    pub fn creation_state(&self) -> ApprovalResult<ApplicationState> {
        match self.stage.stage_type {
            StageType::FormSubmission => {
                Ok(ApplicationState::new(self.stage.id, true, None))
            }
            StageType::Approvals => Err(ApprovalError::Model(
                "An application can not start in an approval stage".to_string(),
            )),
            StageType::Waiting => Err(ApprovalError::Model(
                "An application can not start in a waiting stage".to_string(),
            )),
            StageType::Finished => Err(ApprovalError::Model(
                "An application can not start in a finished stage".to_string(),
            )),
        }
    }

    /// State an application takes when it transitions into this stage.
    /// Approvals stages land on their first active level.
    pub fn initial_state(&self) -> ApprovalResult<ApplicationState> {
        match self.stage.stage_type {
            StageType::Approvals => {
                let level = self.first_active_level()?;
                Ok(ApplicationState::new(self.stage.id, false, Some(level.id)))
            }
            _ => Ok(ApplicationState::new(self.stage.id, false, None)),
        }
    }

    /// The state after the given one: the next approval level within this
    /// stage when there is one, otherwise the initial state of the next
    /// stage.
    pub fn next_state(
        &self,
        version: &WorkflowVersion,
        current: &ApplicationState,
    ) -> ApprovalResult<ApplicationState> {
        if self.stage.stage_type == StageType::Approvals {
            if let Some(level_id) = current.approval_level_id() {
                if let Some(next) = self.stage.next_level(level_id) {
                    return Ok(ApplicationState::new(self.stage.id, false, Some(next.id)));
                }
            }
        }
        let next = version.next_stage(self.stage.id).ok_or_else(|| {
            ApprovalError::Model(format!(
                "Stage '{}' has no next state",
                self.stage.name
            ))
        })?;
        next.state_manager().initial_state()
    }

    /// The state before the given one: the previous approval level within
    /// this stage when there is one, otherwise the initial state of the
    /// previous stage.
    pub fn previous_state(
        &self,
        version: &WorkflowVersion,
        current: &ApplicationState,
    ) -> ApprovalResult<ApplicationState> {
        if self.stage.stage_type == StageType::Approvals {
            if let Some(level_id) = current.approval_level_id() {
                if let Some(previous) = self.previous_level(level_id) {
                    return Ok(ApplicationState::new(
                        self.stage.id,
                        false,
                        Some(previous.id),
                    ));
                }
            }
        }
        let previous = version.previous_stage(self.stage.id).ok_or_else(|| {
            ApprovalError::Model(format!(
                "Stage '{}' has no previous state",
                self.stage.name
            ))
        })?;
        previous.state_manager().initial_state()
    }

    fn first_active_level(&self) -> ApprovalResult<&ApprovalLevel> {
        self.stage.first_level().ok_or_else(|| {
            ApprovalError::Model(format!(
                "Approvals stage '{}' has no active approval levels",
                self.stage.name
            ))
        })
    }

    fn previous_level(&self, level_id: i64) -> Option<&ApprovalLevel> {
        let current = self.stage.level(level_id)?;
        self.stage
            .active_levels()
            .filter(|l| l.ordinal_number < current.ordinal_number)
            .max_by_key(|l| l.ordinal_number)
    }

    /// Append the activity records a state change implies and mark
    /// completion when the application enters a finished stage.
    ///
    /// Exit records come before entry records; within a boundary the
    /// level record sits inside the stage record. `actor_id` is None for
    /// system-driven moves (fired interactions).
    pub fn record_state_change(
        version: &WorkflowVersion,
        application: &mut Application,
        from: &ApplicationState,
        to: &ApplicationState,
        actor_id: Option<UserId>,
    ) -> ApprovalResult<()> {
        if from.is_same_as(to) {
            return Ok(());
        }
        if from.stage_id() != to.stage_id() {
            if from.approval_level_id().is_some() {
                application.record_activity(ActivityKind::LevelEnded, actor_id, from);
            }
            application.record_activity(ActivityKind::StageEnded, actor_id, from);
            application.record_activity(ActivityKind::StageStarted, actor_id, to);
            if to.approval_level_id().is_some() {
                application.record_activity(ActivityKind::LevelStarted, actor_id, to);
            }
        } else if from.approval_level_id() != to.approval_level_id() {
            application.record_activity(ActivityKind::LevelEnded, actor_id, from);
            application.record_activity(ActivityKind::LevelStarted, actor_id, to);
        }

        let entered = version.stage(to.stage_id())?;
        if entered.stage_type == StageType::Finished {
            application.mark_completed();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{IdAllocator, StageId};
    use chrono::Utc;
    use serde_json::json;
    use uuid::Uuid;

    fn version() -> (WorkflowVersion, IdAllocator, StageId, StageId, StageId) {
        let ids = IdAllocator::new();
        let mut version = WorkflowVersion::new(1, 1);
        let s1 = version.add_stage(&ids, "Request", StageType::FormSubmission).unwrap();
        let s2 = version.add_stage(&ids, "Review", StageType::Approvals).unwrap();
        let s3 = version.add_stage(&ids, "End", StageType::Finished).unwrap();
        (version, ids, s1, s2, s3)
    }

    fn application(state: ApplicationState) -> Application {
        Application {
            id: Uuid::now_v7(),
            title: "Test".to_string(),
            user_id: 10,
            job_assignment_id: None,
            workflow_version_id: 1,
            assignment_id: 1,
            creator_id: 10,
            owner_id: 10,
            created: Utc::now(),
            submitted: None,
            submitter_id: None,
            completed: None,
            current_state: state,
            form_data: json!({}),
            actions: Vec::new(),
            activities: Vec::new(),
        }
    }

    #[test]
    fn only_form_submission_hosts_creation() {
        let (version, _, s1, s2, s3) = version();
        let creation = version.stage(s1).unwrap().state_manager().creation_state().unwrap();
        assert!(creation.is_draft());
        assert_eq!(creation.stage_id(), s1);
        assert_eq!(creation.approval_level_id(), None);

        let err = version.stage(s2).unwrap().state_manager().creation_state().unwrap_err();
        assert_eq!(
            err.to_string(),
            "An application can not start in an approval stage"
        );
        assert!(version.stage(s3).unwrap().state_manager().creation_state().is_err());
    }

    #[test]
    fn approvals_initial_state_is_first_level() {
        let (mut version, ids, _, s2, _) = version();
        let stage = version.stage_mut(s2).unwrap();
        stage.add_approval_level(&ids, "Level 2").unwrap();
        let first = stage.first_level().unwrap().id;

        let state = version.stage(s2).unwrap().state_manager().initial_state().unwrap();
        assert_eq!(state.approval_level_id(), Some(first));
        assert!(!state.is_draft());
    }

    #[test]
    fn approvals_without_levels_cannot_be_entered() {
        let (mut version, _, _, s2, _) = version();
        version.stage_mut(s2).unwrap().approval_levels.clear();
        assert!(matches!(
            version.stage(s2).unwrap().state_manager().initial_state(),
            Err(ApprovalError::Model(_))
        ));
    }

    #[test]
    fn next_state_walks_levels_then_stages() {
        let (mut version, ids, _, s2, s3) = version();
        version.stage_mut(s2).unwrap().add_approval_level(&ids, "Level 2").unwrap();
        let stage = version.stage(s2).unwrap();
        let l1 = stage.approval_levels[0].id;
        let l2 = stage.approval_levels[1].id;

        let at_l1 = ApplicationState::new(s2, false, Some(l1));
        let next = stage.state_manager().next_state(&version, &at_l1).unwrap();
        assert_eq!(next, ApplicationState::new(s2, false, Some(l2)));

        let at_l2 = ApplicationState::new(s2, false, Some(l2));
        let next = stage.state_manager().next_state(&version, &at_l2).unwrap();
        assert_eq!(next.stage_id(), s3);
        assert_eq!(next.approval_level_id(), None);
    }

    #[test]
    fn previous_state_walks_levels_then_stages() {
        let (mut version, ids, s1, s2, _) = version();
        version.stage_mut(s2).unwrap().add_approval_level(&ids, "Level 2").unwrap();
        let stage = version.stage(s2).unwrap();
        let l1 = stage.approval_levels[0].id;
        let l2 = stage.approval_levels[1].id;

        let at_l2 = ApplicationState::new(s2, false, Some(l2));
        let previous = stage.state_manager().previous_state(&version, &at_l2).unwrap();
        assert_eq!(previous, ApplicationState::new(s2, false, Some(l1)));

        let at_l1 = ApplicationState::new(s2, false, Some(l1));
        let previous = stage.state_manager().previous_state(&version, &at_l1).unwrap();
        assert_eq!(previous.stage_id(), s1);
    }

    #[test]
    fn stage_change_records_exit_then_entry() {
        let (version, _, s1, s2, _) = version();
        let from = ApplicationState::new(s1, false, None);
        let to = version.stage(s2).unwrap().state_manager().initial_state().unwrap();
        let mut app = application(from.clone());

        StateManager::record_state_change(&version, &mut app, &from, &to, Some(42)).unwrap();
        let kinds: Vec<ActivityKind> = app.activities.iter().map(|a| a.kind).collect();
        assert_eq!(
            kinds,
            vec![
                ActivityKind::StageEnded,
                ActivityKind::StageStarted,
                ActivityKind::LevelStarted,
            ]
        );
        assert!(app.completed.is_none());
    }

    #[test]
    fn level_change_within_stage_records_level_boundary_only() {
        let (mut version, ids, _, s2, _) = version();
        version.stage_mut(s2).unwrap().add_approval_level(&ids, "Level 2").unwrap();
        let stage = version.stage(s2).unwrap();
        let l1 = stage.approval_levels[0].id;
        let l2 = stage.approval_levels[1].id;

        let from = ApplicationState::new(s2, false, Some(l1));
        let to = ApplicationState::new(s2, false, Some(l2));
        let mut app = application(from.clone());

        StateManager::record_state_change(&version, &mut app, &from, &to, Some(42)).unwrap();
        let kinds: Vec<ActivityKind> = app.activities.iter().map(|a| a.kind).collect();
        assert_eq!(kinds, vec![ActivityKind::LevelEnded, ActivityKind::LevelStarted]);
    }

    #[test]
    fn entering_finished_marks_completed() {
        let (version, _, _, s2, s3) = version();
        let level = version.stage(s2).unwrap().first_level().unwrap().id;
        let from = ApplicationState::new(s2, false, Some(level));
        let to = ApplicationState::new(s3, false, None);
        let mut app = application(from.clone());

        StateManager::record_state_change(&version, &mut app, &from, &to, Some(42)).unwrap();
        assert!(app.completed.is_some());
        let kinds: Vec<ActivityKind> = app.activities.iter().map(|a| a.kind).collect();
        assert_eq!(
            kinds,
            vec![
                ActivityKind::LevelEnded,
                ActivityKind::StageEnded,
                ActivityKind::StageStarted,
            ]
        );
    }

    #[test]
    fn identical_states_record_nothing() {
        let (version, _, s1, _, _) = version();
        let state = ApplicationState::new(s1, false, None);
        let mut app = application(state.clone());
        StateManager::record_state_change(&version, &mut app, &state, &state, Some(42)).unwrap();
        assert!(app.activities.is_empty());
    }
}
