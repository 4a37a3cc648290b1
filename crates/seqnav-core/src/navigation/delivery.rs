use super::Navigator;
use crate::error::{Result, SeqError};
use crate::rules;
use crate::sequencing::RuleAction;
use crate::tree::ActivityId;
use crate::types::RuleType;

impl Navigator<'_> {
    /// Whether `id` may be part of a delivery: not disabled, and within its
    /// limit conditions.
    pub(super) fn check_activity(&self, id: ActivityId) -> Result<()> {
        let ctx = self.ctx();
        if rules::evaluate_actions(&ctx, id, RuleType::PreCondition, &[RuleAction::Disabled]).is_some() {
            return Err(SeqError::exception(
                "UP.5-1",
                format!("Activity '{}' is disabled", self.name(id)),
            ));
        }
        if let Some(why) = rules::limit_violation(&ctx, id) {
            return Err(SeqError::exception(
                "UP.5-2",
                format!("Activity '{}' cannot be attempted: {why}", self.name(id)),
            ));
        }
        Ok(())
    }

    /// Make `target` the current activity.
    ///
    /// Every activity from the root down to `target` is checked first; only
    /// then are attempts outside the new path ended and attempts on it
    /// started or resumed.
    pub(super) fn deliver(&mut self, target: ActivityId) -> Result<()> {
        if !self.tree.is_leaf(target) {
            return Err(SeqError::exception(
                "DB.1.1-1",
                format!("Delivery failed: '{}' is not a leaf activity", self.name(target)),
            ));
        }
        let mut path = self.tree.path_to_root(target);
        path.reverse();
        for &a in &path {
            self.check_activity(a)?;
        }

        if let Some(current) = self.cursor.current {
            for a in self.tree.path_to_root(current) {
                if self.tree.is_ancestor_or_self(a, target) {
                    break;
                }
                if self.tracking.is_active(a) {
                    self.end_attempt(a);
                }
            }
        }

        for &a in &path {
            let record = self.tracking.record_mut(a);
            if record.is_active {
                continue;
            }
            if record.is_suspended {
                record.is_suspended = false;
                record.attempt_started_at = Some(self.now);
            } else {
                record.begin_attempt(self.now);
            }
            record.is_active = true;
        }
        let stale: Vec<ActivityId> = self
            .tracking
            .records()
            .filter(|(_, r)| r.is_suspended)
            .map(|(id, _)| id)
            .collect();
        for a in stale {
            self.tracking.record_mut(a).is_suspended = false;
        }

        self.cursor.current = Some(target);
        self.cursor.suspended = None;
        self.rollup(target);
        tracing::debug!(activity = %self.name(target), "delivered");
        Ok(())
    }
}
