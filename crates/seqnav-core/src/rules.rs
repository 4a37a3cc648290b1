use crate::sequencing::{
    Combination, ConditionKind, ConditionOperator, RuleAction, RuleCondition, SequencingRule,
};
use crate::tracking::TrackingState;
use crate::tree::{ActivityId, ActivityTree};
use crate::types::{CompletionStatus, RuleType};
use chrono::{DateTime, Utc};

// ---------------------------------------------------------------------------
// EvalContext
// ---------------------------------------------------------------------------

/// Everything a rule condition may look at.
#[derive(Clone, Copy)]
pub struct EvalContext<'a> {
    pub tree: &'a ActivityTree,
    pub tracking: &'a TrackingState,
    pub now: DateTime<Utc>,
}

impl<'a> EvalContext<'a> {
    pub fn new(tree: &'a ActivityTree, tracking: &'a TrackingState, now: DateTime<Utc>) -> Self {
        Self { tree, tracking, now }
    }
}

// ---------------------------------------------------------------------------
// Rule evaluation
// ---------------------------------------------------------------------------

/// Action of the first rule of `rule_type` on `id` that fires, in
/// declaration order.
pub fn evaluate(ctx: &EvalContext, id: ActivityId, rule_type: RuleType) -> Option<RuleAction> {
    let rules = ctx.tree.get(id).sequencing.rules(rule_type);
    first_firing(ctx, id, rule_type, rules.iter())
}

/// Like [`evaluate`], restricted to rules whose action is one of `actions`.
pub fn evaluate_actions(
    ctx: &EvalContext,
    id: ActivityId,
    rule_type: RuleType,
    actions: &[RuleAction],
) -> Option<RuleAction> {
    let rules = ctx.tree.get(id).sequencing.rules(rule_type);
    first_firing(
        ctx,
        id,
        rule_type,
        rules.iter().filter(|r| actions.contains(&r.action)),
    )
}

fn first_firing<'r>(
    ctx: &EvalContext,
    id: ActivityId,
    rule_type: RuleType,
    mut rules: impl Iterator<Item = &'r SequencingRule>,
) -> Option<RuleAction> {
    let fired = rules.find(|rule| rule_fires(ctx, id, rule, rule_type))?;
    tracing::debug!(
        activity = %ctx.tree.identifier(id),
        rule_type = %rule_type,
        action = %fired.action,
        "sequencing rule fired"
    );
    Some(fired.action.clone())
}

/// A rule fires when its action belongs in `rule_type` and its conditions
/// satisfy the combination. Rules without conditions never fire.
pub fn rule_fires(ctx: &EvalContext, id: ActivityId, rule: &SequencingRule, rule_type: RuleType) -> bool {
    if !rule.action.allowed_in(rule_type) {
        return false;
    }
    conditions_hold(ctx, id, rule.combination, &rule.conditions)
}

pub fn conditions_hold(
    ctx: &EvalContext,
    id: ActivityId,
    combination: Combination,
    conditions: &[RuleCondition],
) -> bool {
    if conditions.is_empty() {
        return false;
    }
    match combination {
        Combination::All => conditions.iter().all(|c| condition_holds(ctx, id, c)),
        Combination::Any => conditions.iter().any(|c| condition_holds(ctx, id, c)),
    }
}

/// Evaluate one condition, applying its operator. Unknown conditions are
/// false under either operator.
pub fn condition_holds(ctx: &EvalContext, id: ActivityId, condition: &RuleCondition) -> bool {
    let raw = match &condition.kind {
        ConditionKind::Unknown(_) => return false,
        kind => raw_condition(ctx, id, kind, condition),
    };
    match condition.operator {
        ConditionOperator::NoOp => raw,
        ConditionOperator::Not => !raw,
    }
}

fn raw_condition(ctx: &EvalContext, id: ActivityId, kind: &ConditionKind, condition: &RuleCondition) -> bool {
    let record = ctx.tracking.record(id);
    let objective = || {
        ctx.tracking
            .objective(ctx.tree, id, condition.referenced_objective.as_deref())
    };
    match kind {
        ConditionKind::Satisfied => objective().satisfied == Some(true),
        ConditionKind::ObjectiveStatusKnown => objective().satisfied.is_some(),
        ConditionKind::ObjectiveMeasureKnown => objective().measure.is_some(),
        ConditionKind::ObjectiveMeasureGreaterThan => objective()
            .measure
            .is_some_and(|m| m > condition.measure_threshold),
        ConditionKind::ObjectiveMeasureLessThan => objective()
            .measure
            .is_some_and(|m| m < condition.measure_threshold),
        ConditionKind::Completed => record.completion_status == CompletionStatus::Completed,
        ConditionKind::ActivityProgressKnown => record.completion_status.is_known(),
        ConditionKind::ActivityIsActive => record.is_active,
        ConditionKind::Attempted => record.is_attempted(),
        ConditionKind::NotAttempted => !record.is_attempted(),
        ConditionKind::AttemptLimitExceeded => attempt_limit_exceeded(ctx, id),
        ConditionKind::DurationLimitExceeded => duration_limit_exceeded(ctx, id),
        ConditionKind::OutsideAvailableTimeRange => outside_time_range(ctx, id),
        ConditionKind::Always => true,
        ConditionKind::Unknown(_) => false,
    }
}

// ---------------------------------------------------------------------------
// Limit conditions
// ---------------------------------------------------------------------------

pub fn attempt_limit_exceeded(ctx: &EvalContext, id: ActivityId) -> bool {
    let limits = &ctx.tree.get(id).sequencing.limit_conditions;
    limits
        .attempt_limit
        .is_some_and(|limit| ctx.tracking.record(id).attempt_count >= limit)
}

pub fn duration_limit_exceeded(ctx: &EvalContext, id: ActivityId) -> bool {
    let limits = &ctx.tree.get(id).sequencing.limit_conditions;
    let record = ctx.tracking.record(id);
    limits
        .attempt_absolute_duration_limit
        .is_some_and(|limit| record.attempt_elapsed(ctx.now) >= limit)
        || limits
            .activity_absolute_duration_limit
            .is_some_and(|limit| record.activity_elapsed(ctx.now) >= limit)
}

pub fn outside_time_range(ctx: &EvalContext, id: ActivityId) -> bool {
    let limits = &ctx.tree.get(id).sequencing.limit_conditions;
    limits.begin_time_limit.is_some_and(|begin| ctx.now < begin)
        || limits.end_time_limit.is_some_and(|end| ctx.now > end)
}

/// Why an activity may not start a new attempt, if it may not.
///
/// Only inactive activities are checked; an activity already in an attempt
/// is never cut off by its own limits.
pub fn limit_violation(ctx: &EvalContext, id: ActivityId) -> Option<&'static str> {
    let record = ctx.tracking.record(id);
    if record.is_active {
        return None;
    }
    if !record.is_suspended && attempt_limit_exceeded(ctx, id) {
        return Some("attempt limit reached");
    }
    if duration_limit_exceeded(ctx, id) {
        return Some("duration limit reached");
    }
    if outside_time_range(ctx, id) {
        return Some("outside the available time range");
    }
    None
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
