//! Transition resolution: mapping an applied action to the application's
//! next state.
//!
//! A transition is either relative (next, previous, reset) or an absolute
//! jump to a named stage. Interactions persist transitions as a string
//! field: a relative kind keyword or a stage id rendered as digits.

use crate::error::{ApprovalError, ApprovalResult};
use crate::types::{ApplicationState, StageId, WorkflowStage, WorkflowVersion};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Transition {
    /// The stage after the current one in ordinal order.
    Next,
    /// The stage before the current one in ordinal order.
    Previous,
    /// Jump to a specific stage.
    Stage(StageId),
    /// Return to the stage's configured reset target, or the version's
    /// first stage when no target is set. An explicit target overrides
    /// both.
    Reset { target: Option<StageId> },
}

impl Transition {
    /// Relative transition kind from its stored keyword.
    pub fn kind_from_enum(value: &str) -> ApprovalResult<Transition> {
        match value {
            "NEXT" => Ok(Transition::Next),
            "PREVIOUS" => Ok(Transition::Previous),
            "RESET" => Ok(Transition::Reset { target: None }),
            other => Err(ApprovalError::UnknownTransition(format!("enum {other}"))),
        }
    }

    /// The persisted string form. Stage jumps render as the stage id.
    pub fn as_field(&self) -> String {
        match self {
            Transition::Next => "NEXT".to_string(),
            Transition::Previous => "PREVIOUS".to_string(),
            Transition::Reset { target: None } => "RESET".to_string(),
            Transition::Reset {
                target: Some(stage_id),
            } => format!("RESET:{stage_id}"),
            Transition::Stage(stage_id) => stage_id.to_string(),
        }
    }

    /// Parse a persisted transition field. Numeric fields are absolute
    /// stage jumps and must name a stage of the given version.
    pub fn by_field(field: &str, version: &WorkflowVersion) -> ApprovalResult<Transition> {
        if let Ok(stage_id) = field.parse::<StageId>() {
            if !version.has_stage(stage_id) {
                return Err(ApprovalError::UnknownTransition(format!(
                    "stage {stage_id} is not part of workflow version {}",
                    version.id
                )));
            }
            return Ok(Transition::Stage(stage_id));
        }
        if let Some(target) = field.strip_prefix("RESET:") {
            let stage_id = target.parse::<StageId>().map_err(|_| {
                ApprovalError::UnknownTransition(format!("reset target {target}"))
            })?;
            if !version.has_stage(stage_id) {
                return Err(ApprovalError::UnknownTransition(format!(
                    "stage {stage_id} is not part of workflow version {}",
                    version.id
                )));
            }
            return Ok(Transition::Reset {
                target: Some(stage_id),
            });
        }
        Transition::kind_from_enum(field)
    }

    /// The stage this transition lands on, relative to `from`.
    pub fn target_stage<'a>(
        &self,
        version: &'a WorkflowVersion,
        from: &WorkflowStage,
    ) -> ApprovalResult<&'a WorkflowStage> {
        match self {
            Transition::Next => version.next_stage(from.id).ok_or_else(|| {
                ApprovalError::UnknownTransition(format!(
                    "stage '{}' has no next stage",
                    from.name
                ))
            }),
            Transition::Previous => version.previous_stage(from.id).ok_or_else(|| {
                ApprovalError::UnknownTransition(format!(
                    "stage '{}' has no previous stage",
                    from.name
                ))
            }),
            Transition::Stage(stage_id) => version.stage(*stage_id).map_err(|_| {
                ApprovalError::UnknownTransition(format!(
                    "stage {stage_id} is not part of workflow version {}",
                    version.id
                ))
            }),
            Transition::Reset { target } => {
                let stage_id = target.or(from.reset_target);
                match stage_id {
                    Some(stage_id) => version.stage(stage_id).map_err(|_| {
                        ApprovalError::UnknownTransition(format!(
                            "reset target {stage_id} is not part of workflow version {}",
                            version.id
                        ))
                    }),
                    None => version.first_stage().ok_or_else(|| {
                        ApprovalError::Model(format!(
                            "Workflow version {} has no stages",
                            version.id
                        ))
                    }),
                }
            }
        }
    }

    /// Resolve the state this transition leads to from the given state.
    /// The result is always the target stage's initial state; the level
    /// the application previously held is never carried across.
    pub fn resolve(
        &self,
        version: &WorkflowVersion,
        from: &ApplicationState,
    ) -> ApprovalResult<ApplicationState> {
        let current = version.stage(from.stage_id())?;
        let target = self.target_stage(version, current)?;
        target.state_manager().initial_state()
    }

    /// All transitions configurable on the given stage, in presentation
    /// order: relative kinds first, then absolute jumps to every other
    /// stage by ordinal.
    pub fn options_for_stage(
        version: &WorkflowVersion,
        stage: &WorkflowStage,
    ) -> Vec<Transition> {
        let mut options = Vec::new();
        if version.previous_stage(stage.id).is_some() {
            options.push(Transition::Previous);
        }
        if version.next_stage(stage.id).is_some() {
            options.push(Transition::Next);
        }
        let is_first = version.first_stage().map(|s| s.id) == Some(stage.id);
        if !is_first {
            options.push(Transition::Reset { target: None });
        }
        let mut others: Vec<&WorkflowStage> =
            version.stages.iter().filter(|s| s.id != stage.id).collect();
        others.sort_by_key(|s| s.ordinal_number);
        options.extend(others.into_iter().map(|s| Transition::Stage(s.id)));
        options
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage_type::StageType;
    use crate::types::IdAllocator;

    fn version() -> (WorkflowVersion, StageId, StageId, StageId) {
        let ids = IdAllocator::new();
        let mut version = WorkflowVersion::new(1, 1);
        let s1 = version.add_stage(&ids, "Request", StageType::FormSubmission).unwrap();
        let s2 = version.add_stage(&ids, "Review", StageType::Approvals).unwrap();
        let s3 = version.add_stage(&ids, "End", StageType::Finished).unwrap();
        (version, s1, s2, s3)
    }

    #[test]
    fn kind_keywords_parse() {
        assert_eq!(Transition::kind_from_enum("NEXT").unwrap(), Transition::Next);
        assert_eq!(
            Transition::kind_from_enum("PREVIOUS").unwrap(),
            Transition::Previous
        );
        assert_eq!(
            Transition::kind_from_enum("RESET").unwrap(),
            Transition::Reset { target: None }
        );
        assert!(matches!(
            Transition::kind_from_enum("SIDEWAYS"),
            Err(ApprovalError::UnknownTransition(_))
        ));
    }

    #[test]
    fn field_round_trip() {
        let (version, _, s2, _) = version();
        for transition in [
            Transition::Next,
            Transition::Previous,
            Transition::Reset { target: None },
            Transition::Reset { target: Some(s2) },
            Transition::Stage(s2),
        ] {
            let field = transition.as_field();
            assert_eq!(Transition::by_field(&field, &version).unwrap(), transition);
        }
    }

    #[test]
    fn numeric_field_must_name_a_stage() {
        let (version, ..) = version();
        assert!(matches!(
            Transition::by_field("999", &version),
            Err(ApprovalError::UnknownTransition(_))
        ));
        assert!(matches!(
            Transition::by_field("RESET:999", &version),
            Err(ApprovalError::UnknownTransition(_))
        ));
    }

    #[test]
    fn next_and_previous_follow_stage_order() {
        let (version, s1, s2, s3) = version();
        let from = ApplicationState::new(s2, false, None);
        let next = Transition::Next.resolve(&version, &from).unwrap();
        assert_eq!(next.stage_id(), s3);
        let previous = Transition::Previous.resolve(&version, &from).unwrap();
        assert_eq!(previous.stage_id(), s1);
        assert!(!previous.is_draft());
    }

    #[test]
    fn next_off_the_end_fails() {
        let (version, _, _, s3) = version();
        let from = ApplicationState::new(s3, false, None);
        assert!(matches!(
            Transition::Next.resolve(&version, &from),
            Err(ApprovalError::UnknownTransition(_))
        ));
    }

    #[test]
    fn reset_defaults_to_first_stage() {
        let (version, s1, s2, _) = version();
        let from = ApplicationState::new(s2, false, None);
        let state = Transition::Reset { target: None }
            .resolve(&version, &from)
            .unwrap();
        assert_eq!(state.stage_id(), s1);
        assert_eq!(state.approval_level_id(), None);
    }

    #[test]
    fn reset_honours_stage_reset_target() {
        let (mut version, _, s2, _) = version();
        version.stage_mut(s2).unwrap().reset_target = Some(s2);
        let from = ApplicationState::new(s2, false, None);
        let state = Transition::Reset { target: None }
            .resolve(&version, &from)
            .unwrap();
        // Back to the start of the approvals stage: first level, no draft.
        assert_eq!(state.stage_id(), s2);
        let first_level = version.stage(s2).unwrap().first_level().unwrap().id;
        assert_eq!(state.approval_level_id(), Some(first_level));
    }

    #[test]
    fn entering_approvals_lands_on_first_level() {
        let (version, s1, s2, _) = version();
        let from = ApplicationState::new(s1, false, None);
        let state = Transition::Next.resolve(&version, &from).unwrap();
        assert_eq!(state.stage_id(), s2);
        let first_level = version.stage(s2).unwrap().first_level().unwrap().id;
        assert_eq!(state.approval_level_id(), Some(first_level));
    }

    #[test]
    fn options_order_relative_kinds_then_stage_jumps() {
        let (version, s1, s2, s3) = version();
        let stage = version.stage(s2).unwrap();
        assert_eq!(
            Transition::options_for_stage(&version, stage),
            vec![
                Transition::Previous,
                Transition::Next,
                Transition::Reset { target: None },
                Transition::Stage(s1),
                Transition::Stage(s3),
            ]
        );

        // Resetting from the first stage is meaningless, so it is not offered.
        let first = version.stage(s1).unwrap();
        assert_eq!(
            Transition::options_for_stage(&version, first),
            vec![
                Transition::Next,
                Transition::Stage(s2),
                Transition::Stage(s3),
            ]
        );

        let last = version.stage(s3).unwrap();
        assert_eq!(
            Transition::options_for_stage(&version, last),
            vec![
                Transition::Previous,
                Transition::Reset { target: None },
                Transition::Stage(s1),
                Transition::Stage(s2),
            ]
        );
    }
}
