use crate::db::{EscalationStage, EscalationStepRecord};

/// Decide which stage the next preview/approval targets.
///
/// 1. The earliest-created step still pending (drafted, awaiting approval or
///    scheduled) wins: its stage is re-previewed rather than advanced past.
/// 2. Otherwise the first stage in escalation order with no step at all.
/// 3. Otherwise the last stage. The sequence plateaus instead of cycling.
pub fn next_stage(steps: &[EscalationStepRecord]) -> EscalationStage {
    let earliest_pending = steps
        .iter()
        .enumerate()
        .filter(|(_, step)| step.status.is_pending())
        // Ties on created_at fall back to list position.
        .min_by_key(|(idx, step)| (step.created_at, *idx))
        .map(|(_, step)| step.stage);
    if let Some(stage) = earliest_pending {
        return stage;
    }

    EscalationStage::ORDER
        .into_iter()
        .find(|stage| !steps.iter().any(|step| step.stage == *stage))
        .unwrap_or(EscalationStage::SmallClaimsTemplate)
}
