//! The fixed set of application actions.
//!
//! Actions are process-wide static reference data: each variant carries a
//! stable numeric code and an uppercase string enum used by external
//! protocols. The registry is immutable; lookups fail with a typed error
//! for unknown values.

use crate::error::{ApprovalError, ApprovalResult};
use crate::transition::Transition;
use serde::{Deserialize, Serialize};

/// An operation an actor performs on an application.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    Submit,
    Approve,
    Reject,
    /// Withdraw while still in a form-submission stage. Returns the
    /// application to that stage's creation state (still draft).
    WithdrawBeforeSubmission,
    /// Withdraw while in an approvals stage. Routes through the stage's
    /// reset target.
    WithdrawInApprovals,
    /// Restart the approval cycle. Same state transform as
    /// [`Action::WithdrawInApprovals`]; only the audit record differs.
    ResetApprovals,
}

/// Canonical registry order. Insertion-defined, used by UIs, not
/// semantically significant.
const ALL: [Action; 6] = [
    Action::Submit,
    Action::Approve,
    Action::Reject,
    Action::WithdrawBeforeSubmission,
    Action::WithdrawInApprovals,
    Action::ResetApprovals,
];

impl Action {
    /// Stable numeric code, unique across all variants.
    pub const fn code(self) -> u8 {
        match self {
            Action::Submit => 1,
            Action::Approve => 2,
            Action::Reject => 3,
            Action::WithdrawBeforeSubmission => 4,
            Action::WithdrawInApprovals => 5,
            Action::ResetApprovals => 6,
        }
    }

    /// Stable uppercase identifier for external protocols.
    pub const fn as_enum(self) -> &'static str {
        match self {
            Action::Submit => "SUBMIT",
            Action::Approve => "APPROVE",
            Action::Reject => "REJECT",
            Action::WithdrawBeforeSubmission => "WITHDRAW_BEFORE_SUBMISSION",
            Action::WithdrawInApprovals => "WITHDRAW_IN_APPROVALS",
            Action::ResetApprovals => "RESET_APPROVALS",
        }
    }

    /// The transition applied when no stage interaction overrides it.
    pub fn default_transition(self) -> Transition {
        match self {
            Action::Submit | Action::Approve => Transition::Next,
            Action::Reject => Transition::Previous,
            Action::WithdrawBeforeSubmission
            | Action::WithdrawInApprovals
            | Action::ResetApprovals => Transition::Reset { target: None },
        }
    }

    /// All registered actions in canonical order.
    pub fn all() -> &'static [Action] {
        &ALL
    }

    pub fn is_valid_code(code: u8) -> bool {
        ALL.iter().any(|a| a.code() == code)
    }

    pub fn from_code(code: u8) -> ApprovalResult<Action> {
        ALL.iter()
            .copied()
            .find(|a| a.code() == code)
            .ok_or_else(|| ApprovalError::UnknownAction(format!("code {code}")))
    }

    pub fn from_enum(value: &str) -> ApprovalResult<Action> {
        ALL.iter()
            .copied()
            .find(|a| a.as_enum() == value)
            .ok_or_else(|| ApprovalError::UnknownAction(format!("enum {value}")))
    }
}
