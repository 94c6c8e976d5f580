//! Approver types and per-level approver resolution.
//!
//! An assignment binds approvers to approval levels either directly (a
//! named user) or indirectly (a relationship to the applicant, resolved at
//! approval time). Relationship lookups go through a provider trait so the
//! engine stays independent of the account directory.

use crate::error::{ApprovalError, ApprovalResult};
use crate::types::{
    Assignment, AssignmentApprover, ApprovalLevelId, JobAssignmentId, RelationshipId, UserId,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Relationship idnumbers that may be used as approvers. Closed set.
pub const ALLOWED_RELATIONSHIPS: [&str; 1] = ["manager"];

/// How an assignment approver entry names its approvers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ApproverKind {
    /// Resolved against the applicant at approval time.
    Relationship,
    /// A specific user account.
    User,
}

const KINDS: [ApproverKind; 2] = [ApproverKind::Relationship, ApproverKind::User];

impl ApproverKind {
    pub const fn code(self) -> u8 {
        match self {
            ApproverKind::Relationship => 1,
            ApproverKind::User => 2,
        }
    }

    pub const fn as_enum(self) -> &'static str {
        match self {
            ApproverKind::Relationship => "RELATIONSHIP",
            ApproverKind::User => "USER",
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            ApproverKind::Relationship => "Relationship",
            ApproverKind::User => "Individual",
        }
    }

    pub fn kinds() -> &'static [ApproverKind] {
        &KINDS
    }

    pub fn is_valid_code(code: u8) -> bool {
        KINDS.iter().any(|k| k.code() == code)
    }

    pub fn from_code(code: u8) -> ApprovalResult<ApproverKind> {
        KINDS
            .iter()
            .copied()
            .find(|k| k.code() == code)
            .ok_or_else(|| {
                ApprovalError::Model("Unknown assignment_approver type code".to_string())
            })
    }

    pub fn from_enum(value: &str) -> ApprovalResult<ApproverKind> {
        KINDS
            .iter()
            .copied()
            .find(|k| k.as_enum() == value)
            .ok_or_else(|| {
                ApprovalError::Model(format!("Unknown assignment_approver type enum {value}"))
            })
    }
}

pub fn is_allowed_relationship(idnumber: &str) -> bool {
    ALLOWED_RELATIONSHIPS.contains(&idnumber)
}

/// Account directory the engine resolves user approvers against.
#[async_trait]
pub trait AccountProvider: Send + Sync {
    async fn exists(&self, user_id: UserId) -> ApprovalResult<bool>;
    async fn display_name(&self, user_id: UserId) -> ApprovalResult<String>;
}

/// Resolves relationship approvers (e.g. "manager") for an applicant.
#[async_trait]
pub trait RelationshipProvider: Send + Sync {
    /// The relationship record for an allowed idnumber, if configured.
    async fn relationship_id(&self, idnumber: &str) -> ApprovalResult<Option<RelationshipId>>;

    /// The users holding the relationship towards the applicant, scoped to
    /// a job assignment when one is given. Empty is a valid answer.
    async fn users_for(
        &self,
        relationship_id: RelationshipId,
        subject: UserId,
        job_assignment_id: Option<JobAssignmentId>,
    ) -> ApprovalResult<Vec<UserId>>;
}

/// Resolves the concrete approver user set for one approval level of one
/// application.
pub struct ApproverResolver {
    accounts: Arc<dyn AccountProvider>,
    relationships: Arc<dyn RelationshipProvider>,
}

impl ApproverResolver {
    pub fn new(
        accounts: Arc<dyn AccountProvider>,
        relationships: Arc<dyn RelationshipProvider>,
    ) -> ApproverResolver {
        ApproverResolver {
            accounts,
            relationships,
        }
    }

    /// Validate an approver entry before it is bound to a level. User
    /// approvers must name an existing account; relationship approvers are
    /// validated against the allow-list when the relationship is looked up.
    pub async fn validate_approver(
        &self,
        approver: &AssignmentApprover,
    ) -> ApprovalResult<()> {
        match approver.kind {
            ApproverKind::User => {
                if self.accounts.exists(approver.identifier).await? {
                    Ok(())
                } else {
                    Err(ApprovalError::Validation(format!(
                        "User {} does not exist",
                        approver.identifier
                    )))
                }
            }
            ApproverKind::Relationship => Ok(()),
        }
    }

    /// Display name for an approver entry.
    pub async fn approver_name(
        &self,
        approver: &AssignmentApprover,
    ) -> ApprovalResult<String> {
        match approver.kind {
            ApproverKind::User => self.accounts.display_name(approver.identifier).await,
            ApproverKind::Relationship => Ok(ApproverKind::Relationship.label().to_string()),
        }
    }

    /// Look up a relationship for use as an approver. The idnumber must be
    /// allow-listed and configured in the provider.
    pub async fn relationship_for(&self, idnumber: &str) -> ApprovalResult<RelationshipId> {
        if !is_allowed_relationship(idnumber) {
            return Err(ApprovalError::Validation(format!(
                "Relationship {idnumber} can not be used as an approver"
            )));
        }
        self.relationships
            .relationship_id(idnumber)
            .await?
            .ok_or_else(|| {
                ApprovalError::Validation(format!("Relationship {idnumber} is not configured"))
            })
    }

    /// All users who may act at the given level, deduplicated in first-seen
    /// order. An empty result is valid and means the application waits
    /// until approvers are configured.
    pub async fn resolve(
        &self,
        assignment: &Assignment,
        level_id: ApprovalLevelId,
        applicant: UserId,
        job_assignment_id: Option<JobAssignmentId>,
    ) -> ApprovalResult<Vec<UserId>> {
        let mut users: Vec<UserId> = Vec::new();
        for approver in assignment.approvers_for_level(level_id) {
            match approver.kind {
                ApproverKind::User => {
                    push_unique(&mut users, approver.identifier);
                }
                ApproverKind::Relationship => {
                    let resolved = self
                        .relationships
                        .users_for(approver.identifier, applicant, job_assignment_id)
                        .await?;
                    for user in resolved {
                        push_unique(&mut users, user);
                    }
                }
            }
        }
        Ok(users)
    }
}

fn push_unique(users: &mut Vec<UserId>, user: UserId) {
    if !users.contains(&user) {
        users.push(user);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AssignmentApprover, Status};
    use std::collections::HashMap;

    struct StubAccounts {
        known: Vec<UserId>,
    }

    #[async_trait]
    impl AccountProvider for StubAccounts {
        async fn exists(&self, user_id: UserId) -> ApprovalResult<bool> {
            Ok(self.known.contains(&user_id))
        }

        async fn display_name(&self, user_id: UserId) -> ApprovalResult<String> {
            Ok(format!("User {user_id}"))
        }
    }

    struct StubRelationships {
        by_relationship: HashMap<RelationshipId, Vec<UserId>>,
    }

    #[async_trait]
    impl RelationshipProvider for StubRelationships {
        async fn relationship_id(&self, idnumber: &str) -> ApprovalResult<Option<RelationshipId>> {
            Ok(if idnumber == "manager" { Some(1) } else { None })
        }

        async fn users_for(
            &self,
            relationship_id: RelationshipId,
            _subject: UserId,
            _job_assignment_id: Option<JobAssignmentId>,
        ) -> ApprovalResult<Vec<UserId>> {
            Ok(self
                .by_relationship
                .get(&relationship_id)
                .cloned()
                .unwrap_or_default())
        }
    }

    fn assignment(approvers: Vec<AssignmentApprover>) -> Assignment {
        Assignment {
            id: 1,
            workflow_id: 1,
            name: "All staff".to_string(),
            status: Status::Active,
            approvers,
        }
    }

    fn resolver(by_relationship: HashMap<RelationshipId, Vec<UserId>>) -> ApproverResolver {
        ApproverResolver::new(
            Arc::new(StubAccounts {
                known: vec![30, 40, 50],
            }),
            Arc::new(StubRelationships { by_relationship }),
        )
    }

    #[test]
    fn kind_codes_round_trip() {
        for kind in ApproverKind::kinds() {
            assert_eq!(ApproverKind::from_code(kind.code()).unwrap(), *kind);
            assert_eq!(ApproverKind::from_enum(kind.as_enum()).unwrap(), *kind);
        }
        assert!(ApproverKind::is_valid_code(1));
        assert!(!ApproverKind::is_valid_code(3));
    }

    #[test]
    fn unknown_kind_code_fails_with_model_error() {
        let err = ApproverKind::from_code(7).unwrap_err();
        assert_eq!(err.to_string(), "Unknown assignment_approver type code");
    }

    #[test]
    fn manager_is_the_only_allowed_relationship() {
        assert!(is_allowed_relationship("manager"));
        assert!(!is_allowed_relationship("appraiser"));
    }

    #[tokio::test]
    async fn resolves_user_and_relationship_approvers_deduplicated() {
        let assignment = assignment(vec![
            AssignmentApprover {
                id: 1,
                approval_level_id: 5,
                kind: ApproverKind::User,
                identifier: 30,
                active: true,
            },
            AssignmentApprover {
                id: 2,
                approval_level_id: 5,
                kind: ApproverKind::Relationship,
                identifier: 1,
                active: true,
            },
        ]);
        let resolver = resolver(HashMap::from([(1, vec![40, 30])]));

        let users = resolver.resolve(&assignment, 5, 10, None).await.unwrap();
        assert_eq!(users, vec![30, 40]);
    }

    #[tokio::test]
    async fn inactive_and_other_level_approvers_are_skipped() {
        let assignment = assignment(vec![
            AssignmentApprover {
                id: 1,
                approval_level_id: 5,
                kind: ApproverKind::User,
                identifier: 30,
                active: false,
            },
            AssignmentApprover {
                id: 2,
                approval_level_id: 6,
                kind: ApproverKind::User,
                identifier: 31,
                active: true,
            },
        ]);
        let resolver = resolver(HashMap::new());

        let users = resolver.resolve(&assignment, 5, 10, None).await.unwrap();
        assert!(users.is_empty());
    }

    #[tokio::test]
    async fn user_approvers_must_name_existing_accounts() {
        let resolver = resolver(HashMap::new());
        let mut approver = AssignmentApprover {
            id: 1,
            approval_level_id: 5,
            kind: ApproverKind::User,
            identifier: 30,
            active: true,
        };
        resolver.validate_approver(&approver).await.unwrap();
        assert_eq!(resolver.approver_name(&approver).await.unwrap(), "User 30");

        approver.identifier = 999;
        assert!(matches!(
            resolver.validate_approver(&approver).await,
            Err(ApprovalError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn relationship_lookup_enforces_the_allow_list() {
        let resolver = resolver(HashMap::new());
        assert_eq!(resolver.relationship_for("manager").await.unwrap(), 1);
        assert!(matches!(
            resolver.relationship_for("appraiser").await,
            Err(ApprovalError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn applicant_without_manager_resolves_to_empty_set() {
        let assignment = assignment(vec![AssignmentApprover {
            id: 1,
            approval_level_id: 5,
            kind: ApproverKind::Relationship,
            identifier: 1,
            active: true,
        }]);
        let resolver = resolver(HashMap::from([(1, Vec::new())]));

        let users = resolver.resolve(&assignment, 5, 10, None).await.unwrap();
        assert!(users.is_empty());
    }
}
