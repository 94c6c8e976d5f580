//! Deep-cloning a workflow into a fresh draft.
//!
//! A clone copies the source's latest version with brand-new ids. Stage
//! ids are remapped first so interaction transitions that jump to or
//! reset into a sibling stage keep pointing inside the clone.

use crate::error::{ApprovalError, ApprovalResult};
use crate::transition::Transition;
use crate::types::{
    ApprovalLevel, Formview, IdAllocator, StageId, Status, Workflow, WorkflowId, WorkflowStage,
    WorkflowStageInteraction, WorkflowVersion,
};
use std::collections::HashMap;
use tracing::info;

pub fn clone_workflow(
    source: &Workflow,
    new_id: WorkflowId,
    name: &str,
    id_number: &str,
    ids: &IdAllocator,
) -> ApprovalResult<Workflow> {
    let source_version = source.latest_version().ok_or_else(|| {
        ApprovalError::Model(format!("Workflow {} has no versions to clone", source.id))
    })?;

    let version_id = ids.next();
    let stage_ids: HashMap<StageId, StageId> = source_version
        .stages
        .iter()
        .map(|stage| (stage.id, ids.next()))
        .collect();

    let mut stages = Vec::with_capacity(source_version.stages.len());
    for stage in &source_version.stages {
        stages.push(clone_stage(stage, version_id, &stage_ids, ids)?);
    }

    info!(source = source.id, clone = new_id, "workflow cloned");
    Ok(Workflow {
        id: new_id,
        name: name.to_string(),
        id_number: id_number.to_string(),
        status: Status::Draft,
        versions: vec![WorkflowVersion {
            id: version_id,
            workflow_id: new_id,
            status: Status::Draft,
            stages,
        }],
    })
}

fn clone_stage(
    stage: &WorkflowStage,
    version_id: i64,
    stage_ids: &HashMap<StageId, StageId>,
    ids: &IdAllocator,
) -> ApprovalResult<WorkflowStage> {
    let new_stage_id = remap(stage_ids, stage.id)?;

    let formviews = stage
        .formviews
        .iter()
        .map(|formview| Formview {
            id: ids.next(),
            workflow_stage_id: new_stage_id,
            field_key: formview.field_key.clone(),
            required: formview.required,
            disabled: formview.disabled,
        })
        .collect();

    let approval_levels = stage
        .approval_levels
        .iter()
        .map(|level| ApprovalLevel {
            id: ids.next(),
            workflow_stage_id: new_stage_id,
            name: level.name.clone(),
            ordinal_number: level.ordinal_number,
            active: level.active,
        })
        .collect();

    let mut interactions = Vec::with_capacity(stage.interactions.len());
    for interaction in &stage.interactions {
        let mut conditionals = Vec::with_capacity(interaction.conditional_transitions.len());
        for conditional in &interaction.conditional_transitions {
            let mut cloned = conditional.clone();
            cloned.id = ids.next();
            cloned.transition = remap_transition(stage_ids, conditional.transition)?;
            conditionals.push(cloned);
        }
        interactions.push(WorkflowStageInteraction {
            id: ids.next(),
            workflow_stage_id: new_stage_id,
            action: interaction.action,
            default_transition: remap_transition(stage_ids, interaction.default_transition)?,
            conditional_transitions: conditionals,
        });
    }

    Ok(WorkflowStage {
        id: new_stage_id,
        workflow_version_id: version_id,
        name: stage.name.clone(),
        stage_type: stage.stage_type,
        ordinal_number: stage.ordinal_number,
        active: stage.active,
        approval_levels,
        formviews,
        interactions,
        reset_target: stage
            .reset_target
            .map(|target| remap(stage_ids, target))
            .transpose()?,
    })
}

fn remap_transition(
    stage_ids: &HashMap<StageId, StageId>,
    transition: Transition,
) -> ApprovalResult<Transition> {
    Ok(match transition {
        Transition::Stage(stage_id) => Transition::Stage(remap(stage_ids, stage_id)?),
        Transition::Reset {
            target: Some(stage_id),
        } => Transition::Reset {
            target: Some(remap(stage_ids, stage_id)?),
        },
        other => other,
    })
}

fn remap(stage_ids: &HashMap<StageId, StageId>, stage_id: StageId) -> ApprovalResult<StageId> {
    stage_ids.get(&stage_id).copied().ok_or_else(|| {
        ApprovalError::Model(format!(
            "Stage {stage_id} referenced by a transition is not part of the cloned version"
        ))
    })
}
