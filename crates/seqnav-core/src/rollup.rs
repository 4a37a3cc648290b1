//! Child-to-parent status aggregation.
//!
//! Rollup recomputes every cluster on the path from an activity to the
//! root. Each cluster's derived status is rebuilt from scratch out of its
//! children, so running it twice without a tracking change in between is a
//! no-op.

use crate::rules::{self, EvalContext};
use crate::sequencing::{ChildActivitySet, RequiredFor, RollupAction, RollupRule, RuleAction};
use crate::tracking::TrackingState;
use crate::tree::{ActivityId, ActivityTree};
use crate::types::{CompletionStatus, RuleType, SuccessStatus};
use chrono::{DateTime, Utc};

/// Derived status of one cluster.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Derived {
    measure: Option<f64>,
    success: SuccessStatus,
    completion: CompletionStatus,
}

/// Roll up from `from` to the root. Returns the clusters whose status
/// changed, nearest first.
pub fn rollup(
    tree: &ActivityTree,
    tracking: &mut TrackingState,
    from: ActivityId,
    now: DateTime<Utc>,
) -> Vec<ActivityId> {
    let mut changed = Vec::new();
    tracking.write_globals(tree, from);

    for id in tree.path_to_root(from) {
        if tree.is_leaf(id) {
            continue;
        }
        let derived = {
            let ctx = EvalContext::new(tree, tracking, now);
            derive(&ctx, id)
        };
        let record = tracking.record_mut(id);
        let before = Derived {
            measure: record.objective_measure,
            success: record.success_status,
            completion: record.completion_status,
        };
        record.objective_measure = derived.measure;
        record.success_status = derived.success;
        record.completion_status = derived.completion;
        let globals_changed = tracking.write_globals(tree, id);

        if before != derived || globals_changed {
            tracing::debug!(
                activity = %tree.identifier(id),
                completion = %derived.completion,
                success = %derived.success,
                "rollup changed status"
            );
            changed.push(id);
        }
    }
    changed
}

fn derive(ctx: &EvalContext, id: ActivityId) -> Derived {
    let measure = measure_rollup(ctx, id);
    Derived {
        measure,
        success: objective_rollup(ctx, id, measure),
        completion: progress_rollup(ctx, id),
    }
}

// ---------------------------------------------------------------------------
// Measure
// ---------------------------------------------------------------------------

fn measure_rollup(ctx: &EvalContext, id: ActivityId) -> Option<f64> {
    let mut total_weight = 0.0;
    let mut weighted = 0.0;
    let mut any_known = false;
    for &child in ctx.tree.children(id) {
        let seq = &ctx.tree.get(child).sequencing;
        if !seq.delivery_controls.tracked {
            continue;
        }
        let weight = seq.rollup_considerations.measure_weight;
        if weight.is_nan() || weight <= 0.0 {
            continue;
        }
        total_weight += weight;
        if let Some(m) = ctx.tracking.objective(ctx.tree, child, None).measure {
            weighted += m * weight;
            any_known = true;
        }
    }
    if !any_known || total_weight <= 0.0 {
        return None;
    }
    let measure = weighted / total_weight;
    (!measure.is_nan()).then_some(measure)
}

// ---------------------------------------------------------------------------
// Objective (satisfied / not satisfied)
// ---------------------------------------------------------------------------

fn objective_rollup(ctx: &EvalContext, id: ActivityId, measure: Option<f64>) -> SuccessStatus {
    let primary = &ctx.tree.get(id).sequencing.primary_objective;
    if primary.satisfied_by_measure {
        return match measure {
            Some(m) => SuccessStatus::from_satisfied(Some(m >= primary.min_normalized_measure)),
            None => SuccessStatus::Unknown,
        };
    }

    let mut status = SuccessStatus::Unknown;
    if action_fires(ctx, id, &RollupAction::NotSatisfied) {
        status = SuccessStatus::Failed;
    }
    if action_fires(ctx, id, &RollupAction::Satisfied) {
        status = SuccessStatus::Passed;
    }
    status
}

// ---------------------------------------------------------------------------
// Progress (completed / incomplete)
// ---------------------------------------------------------------------------

fn progress_rollup(ctx: &EvalContext, id: ActivityId) -> CompletionStatus {
    let mut status = CompletionStatus::Unknown;
    if action_fires(ctx, id, &RollupAction::Incomplete) {
        status = CompletionStatus::Incomplete;
    }
    if action_fires(ctx, id, &RollupAction::Completed) {
        status = CompletionStatus::Completed;
    }
    status
}

/// Explicit rules for `action` when the cluster has any, else the default
/// rule for it.
fn action_fires(ctx: &EvalContext, id: ActivityId, action: &RollupAction) -> bool {
    let mut explicit = ctx
        .tree
        .get(id)
        .sequencing
        .rollup_rules
        .iter()
        .filter(|r| &r.action == action)
        .peekable();
    if explicit.peek().is_some() {
        return explicit.any(|rule| rule_fires(ctx, id, rule));
    }
    default_fires(ctx, id, action)
}

fn default_fires(ctx: &EvalContext, id: ActivityId, action: &RollupAction) -> bool {
    let children = eligible_children(ctx, id, action);
    if children.is_empty() {
        return false;
    }
    let record = |c: ActivityId| ctx.tracking.record(c);
    let satisfied = |c: ActivityId| ctx.tracking.objective(ctx.tree, c, None).satisfied;
    match action {
        RollupAction::Satisfied => children.iter().all(|&c| satisfied(c) == Some(true)),
        RollupAction::NotSatisfied => children.iter().any(|&c| satisfied(c) == Some(false)),
        RollupAction::Completed => children
            .iter()
            .all(|&c| record(c).completion_status == CompletionStatus::Completed),
        RollupAction::Incomplete => children
            .iter()
            .any(|&c| record(c).completion_status.is_known() || record(c).is_attempted()),
        RollupAction::Unknown(_) => false,
    }
}

fn rule_fires(ctx: &EvalContext, id: ActivityId, rule: &RollupRule) -> bool {
    if rule.conditions.is_empty() {
        return false;
    }
    let children = eligible_children(ctx, id, &rule.action);
    let total = children.len();
    let matching = children
        .iter()
        .filter(|&&c| rules::conditions_hold(ctx, c, rule.combination, &rule.conditions))
        .count();
    match &rule.child_activity_set {
        ChildActivitySet::All => total > 0 && matching == total,
        ChildActivitySet::Any => matching > 0,
        ChildActivitySet::None => total > 0 && matching == 0,
        ChildActivitySet::AtLeastCount => total > 0 && matching >= rule.minimum_count as usize,
        ChildActivitySet::AtLeastPercent => {
            total > 0 && (matching as f64 / total as f64) >= rule.minimum_percent
        }
        ChildActivitySet::Unknown(_) => false,
    }
}

// ---------------------------------------------------------------------------
// Eligibility
// ---------------------------------------------------------------------------

/// Children that contribute to `action` on `id`.
pub fn eligible_children(ctx: &EvalContext, id: ActivityId, action: &RollupAction) -> Vec<ActivityId> {
    ctx.tree
        .children(id)
        .iter()
        .copied()
        .filter(|&c| contributes(ctx, c, action))
        .collect()
}

fn contributes(ctx: &EvalContext, child: ActivityId, action: &RollupAction) -> bool {
    let seq = &ctx.tree.get(child).sequencing;
    if !seq.delivery_controls.tracked {
        return false;
    }
    let considerations = &seq.rollup_considerations;
    let required = match action {
        RollupAction::Satisfied => considerations.required_for_satisfied,
        RollupAction::NotSatisfied => considerations.required_for_not_satisfied,
        RollupAction::Completed => considerations.required_for_completed,
        RollupAction::Incomplete => considerations.required_for_incomplete,
        RollupAction::Unknown(_) => return false,
    };
    if action.is_objective() && !considerations.rollup_objective_satisfied {
        return false;
    }
    if action.is_progress() && !considerations.rollup_progress_completion {
        return false;
    }
    let record = ctx.tracking.record(child);
    match required {
        RequiredFor::Always => true,
        RequiredFor::Never => false,
        RequiredFor::IfAttempted => record.is_attempted(),
        RequiredFor::IfNotSkipped => {
            rules::evaluate_actions(ctx, child, RuleType::PreCondition, &[RuleAction::Skip]).is_none()
        }
        RequiredFor::IfNotSuspended => !record.is_suspended,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
