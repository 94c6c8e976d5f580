//! Stage archetypes and the actions legal within each.

use crate::action::Action;
use crate::error::{ApprovalError, ApprovalResult};
use crate::feature::Feature;
use serde::{Deserialize, Serialize};

/// The archetype of a workflow stage. The set of available actions per
/// stage type is fixed and exhaustive; an action outside that set is
/// illegal for the stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StageType {
    FormSubmission,
    Approvals,
    Waiting,
    Finished,
}

/// Canonical order — represents workflow progression.
const TYPES: [StageType; 4] = [
    StageType::FormSubmission,
    StageType::Approvals,
    StageType::Waiting,
    StageType::Finished,
];

impl StageType {
    pub const fn code(self) -> u8 {
        match self {
            StageType::FormSubmission => 10,
            StageType::Approvals => 20,
            StageType::Waiting => 25,
            StageType::Finished => 30,
        }
    }

    pub const fn as_enum(self) -> &'static str {
        match self {
            StageType::FormSubmission => "FORM_SUBMISSION",
            StageType::Approvals => "APPROVALS",
            StageType::Waiting => "WAITING",
            StageType::Finished => "FINISHED",
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            StageType::FormSubmission => "Form submission",
            StageType::Approvals => "Approvals",
            StageType::Waiting => "Waiting",
            StageType::Finished => "Finished",
        }
    }

    pub const fn sort_order(self) -> u32 {
        self.code() as u32
    }

    /// All stage types in canonical progression order.
    pub fn types() -> &'static [StageType] {
        &TYPES
    }

    pub fn get_by_code(code: u8) -> ApprovalResult<StageType> {
        TYPES
            .iter()
            .copied()
            .find(|t| t.code() == code)
            .ok_or_else(|| ApprovalError::UnknownStageType(format!("code {code}")))
    }

    pub fn get_by_enum(value: &str) -> ApprovalResult<StageType> {
        TYPES
            .iter()
            .copied()
            .find(|t| t.as_enum() == value)
            .ok_or_else(|| ApprovalError::UnknownStageType(format!("enum {value}")))
    }

    /// The actions an actor may perform while an application sits in a
    /// stage of this type. Finished declares none — it is terminal.
    /// Waiting declares none — waiting stages progress through externally
    /// fired interactions, never user actions.
    pub fn available_actions(self) -> &'static [Action] {
        match self {
            StageType::FormSubmission => &[Action::Submit, Action::WithdrawBeforeSubmission],
            StageType::Approvals => &[
                Action::Approve,
                Action::Reject,
                Action::WithdrawInApprovals,
                Action::ResetApprovals,
            ],
            StageType::Waiting => &[],
            StageType::Finished => &[],
        }
    }

    pub fn is_action_available(self, action: Action) -> bool {
        self.available_actions().contains(&action)
    }

    /// The optional stage capabilities a stage of this type carries.
    pub fn configured_features(self) -> &'static [Feature] {
        match self {
            StageType::FormSubmission => &[Feature::Formviews, Feature::Interactions],
            StageType::Approvals => &[
                Feature::Formviews,
                Feature::ApprovalLevels,
                Feature::Interactions,
            ],
            StageType::Waiting => &[Feature::Interactions],
            StageType::Finished => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_order_is_progression_order() {
        let codes: Vec<u8> = StageType::types().iter().map(|t| t.code()).collect();
        assert_eq!(codes, vec![10, 20, 25, 30]);
    }

    #[test]
    fn lookup_round_trips() {
        for ty in StageType::types() {
            assert_eq!(StageType::get_by_code(ty.code()).unwrap(), *ty);
            assert_eq!(StageType::get_by_enum(ty.as_enum()).unwrap(), *ty);
        }
    }

    #[test]
    fn unknown_lookups_fail_descriptively() {
        let err = StageType::get_by_code(15).unwrap_err();
        assert!(err.to_string().contains("15"));
        let err = StageType::get_by_enum("DRAFT").unwrap_err();
        assert!(err.to_string().contains("DRAFT"));
    }

    #[test]
    fn finished_has_no_actions() {
        assert!(StageType::Finished.available_actions().is_empty());
        assert!(!StageType::Finished.is_action_available(Action::Approve));
    }

    #[test]
    fn withdraw_actions_are_stage_type_bound() {
        assert!(StageType::FormSubmission.is_action_available(Action::WithdrawBeforeSubmission));
        assert!(!StageType::Approvals.is_action_available(Action::WithdrawBeforeSubmission));
        assert!(StageType::Approvals.is_action_available(Action::WithdrawInApprovals));
        assert!(StageType::Approvals.is_action_available(Action::ResetApprovals));
        assert!(!StageType::FormSubmission.is_action_available(Action::WithdrawInApprovals));
        assert!(!StageType::Waiting.is_action_available(Action::WithdrawInApprovals));
    }

    #[test]
    fn approvals_carries_approval_levels_feature() {
        assert!(StageType::Approvals
            .configured_features()
            .contains(&Feature::ApprovalLevels));
        assert!(!StageType::FormSubmission
            .configured_features()
            .contains(&Feature::ApprovalLevels));
        assert!(StageType::Finished.configured_features().is_empty());
    }
}
