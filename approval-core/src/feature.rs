//! Per-stage composition of optional capabilities.

use crate::error::{ApprovalError, ApprovalResult};
use crate::types::{StageId, WorkflowStage};
use serde::{Deserialize, Serialize};

/// A capability a workflow stage may carry. The set is closed; which
/// features a stage actually has is declared by its stage type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Feature {
    Formviews,
    ApprovalLevels,
    Interactions,
}

const ALL: [Feature; 3] = [
    Feature::Formviews,
    Feature::ApprovalLevels,
    Feature::Interactions,
];

impl Feature {
    pub const fn as_enum(self) -> &'static str {
        match self {
            Feature::Formviews => "FORMVIEWS",
            Feature::ApprovalLevels => "APPROVAL_LEVELS",
            Feature::Interactions => "INTERACTIONS",
        }
    }

    /// Fixed presentation order: formviews before approval levels before
    /// interactions.
    pub const fn sort_order(self) -> u32 {
        match self {
            Feature::Formviews => 10,
            Feature::ApprovalLevels => 20,
            Feature::Interactions => 30,
        }
    }

    pub fn from_enum(key: &str) -> ApprovalResult<Feature> {
        ALL.iter()
            .copied()
            .find(|f| f.as_enum() == key)
            .ok_or_else(|| ApprovalError::Coding(format!("Invalid feature class {key}")))
    }
}

/// Holds the features registered for one stage.
///
/// `all()` is ordered by feature sort order, never by construction order.
#[derive(Clone, Debug)]
pub struct FeatureManager {
    stage_id: StageId,
    features: Vec<Feature>,
}

impl FeatureManager {
    /// Build a manager from capability keys. Fails immediately on an
    /// unregistered key, before any stage mutation can occur.
    pub fn new(keys: &[&str], stage: &WorkflowStage) -> ApprovalResult<FeatureManager> {
        let mut features = Vec::with_capacity(keys.len());
        for key in keys {
            let feature = Feature::from_enum(key)?;
            if !features.contains(&feature) {
                features.push(feature);
            }
        }
        features.sort_by_key(|f| f.sort_order());
        Ok(FeatureManager {
            stage_id: stage.id,
            features,
        })
    }

    /// Manager with the features the stage's type declares.
    pub fn for_stage(stage: &WorkflowStage) -> FeatureManager {
        let mut features = stage.stage_type.configured_features().to_vec();
        features.sort_by_key(|f| f.sort_order());
        FeatureManager {
            stage_id: stage.id,
            features,
        }
    }

    pub fn stage_id(&self) -> StageId {
        self.stage_id
    }

    pub fn has(&self, key: &str) -> bool {
        Feature::from_enum(key)
            .map(|f| self.features.contains(&f))
            .unwrap_or(false)
    }

    /// Fails with a coding error when the key was not registered for this
    /// manager.
    pub fn get(&self, key: &str) -> ApprovalResult<Feature> {
        let feature = Feature::from_enum(key)?;
        if self.features.contains(&feature) {
            Ok(feature)
        } else {
            Err(ApprovalError::Coding(format!(
                "Feature {key} is not registered for stage {}",
                self.stage_id
            )))
        }
    }

    pub fn all(&self) -> &[Feature] {
        &self.features
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage_type::StageType;
    use crate::types::WorkflowStage;

    fn stage(stage_type: StageType) -> WorkflowStage {
        WorkflowStage::new(7, 1, "Review", stage_type, 2)
    }

    #[test]
    fn unregistered_key_fails_at_construction() {
        let stage = stage(StageType::Approvals);
        let err = FeatureManager::new(&["FORMVIEWS", "COMMENTS"], &stage).unwrap_err();
        assert!(matches!(err, ApprovalError::Coding(_)));
        assert!(err.to_string().contains("COMMENTS"));
    }

    #[test]
    fn all_is_ordered_by_feature_sort_order() {
        let stage = stage(StageType::Approvals);
        let manager =
            FeatureManager::new(&["INTERACTIONS", "APPROVAL_LEVELS", "FORMVIEWS"], &stage).unwrap();
        assert_eq!(
            manager.all(),
            &[
                Feature::Formviews,
                Feature::ApprovalLevels,
                Feature::Interactions
            ]
        );
    }

    #[test]
    fn get_requires_registration() {
        let stage = stage(StageType::FormSubmission);
        let manager = FeatureManager::for_stage(&stage);
        assert!(manager.has("FORMVIEWS"));
        assert!(!manager.has("APPROVAL_LEVELS"));
        assert!(manager.get("INTERACTIONS").is_ok());
        assert!(matches!(
            manager.get("APPROVAL_LEVELS"),
            Err(ApprovalError::Coding(_))
        ));
    }
}
