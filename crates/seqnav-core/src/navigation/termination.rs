use super::{NavigationEffect, Navigator, SequencingRequest, Termination};
use crate::error::{Result, SeqError};
use crate::rules;
use crate::sequencing::RuleAction;
use crate::tree::ActivityId;
use crate::types::{CompletionStatus, RuleType, SuccessStatus};

impl Navigator<'_> {
    /// Run a termination request. Returns a sequencing request that
    /// replaces the pending one when a post-condition rule asks for it.
    pub(super) fn terminate(
        &mut self,
        termination: Termination,
        effect: &mut NavigationEffect,
    ) -> Result<Option<SequencingRequest>> {
        let current = self.current()?;
        tracing::debug!(?termination, activity = %self.name(current), "terminating");
        match termination {
            Termination::Exit => self.terminate_exit(current, effect),
            Termination::ExitAll => {
                self.end_attempts_up_to(current, self.tree.root());
                self.cursor.current = Some(self.tree.root());
                Ok(None)
            }
            Termination::Abandon => {
                self.tracking.record_mut(current).is_active = false;
                Ok(None)
            }
            Termination::AbandonAll => {
                for a in self.tree.path_to_root(current) {
                    self.tracking.record_mut(a).is_active = false;
                }
                self.cursor.current = Some(self.tree.root());
                Ok(None)
            }
            Termination::SuspendAll => {
                self.rollup(current);
                for a in self.tree.path_to_root(current) {
                    let record = self.tracking.record_mut(a);
                    if record.is_active {
                        record.close_attempt(self.now);
                    }
                    record.is_suspended = true;
                }
                self.cursor.suspended = Some(current);
                self.cursor.current = Some(self.tree.root());
                effect.suspended = true;
                Ok(None)
            }
        }
    }

    fn terminate_exit(
        &mut self,
        current: ActivityId,
        effect: &mut NavigationEffect,
    ) -> Result<Option<SequencingRequest>> {
        if !self.tracking.is_active(current) {
            return Err(SeqError::exception(
                "TB.2.3-2",
                "Exit request invalid: the current activity has already been exited",
            ));
        }
        self.end_attempt(current);
        self.exit_action_rules(current);

        // Post-condition rules on the activity being left; exitParent climbs
        // and evaluates again.
        loop {
            let current = self.current()?;
            let action = rules::evaluate(&self.ctx(), current, RuleType::PostCondition);
            match action {
                Some(RuleAction::ExitParent) => {
                    let Some(parent) = self.tree.parent(current) else {
                        break;
                    };
                    self.cursor.current = Some(parent);
                    if self.tracking.is_active(parent) {
                        self.end_attempt(parent);
                    }
                }
                Some(RuleAction::ExitAll) => {
                    self.terminate(Termination::ExitAll, effect)?;
                    return Ok(Some(SequencingRequest::Exit));
                }
                Some(RuleAction::RetryAll) => {
                    self.terminate(Termination::ExitAll, effect)?;
                    return Ok(Some(SequencingRequest::Retry));
                }
                Some(RuleAction::Retry) => return Ok(Some(SequencingRequest::Retry)),
                Some(RuleAction::Continue) => return Ok(Some(SequencingRequest::Continue)),
                Some(RuleAction::Previous) => return Ok(Some(SequencingRequest::Previous)),
                _ => break,
            }
        }

        if self.cursor.current == Some(self.tree.root()) {
            return Ok(Some(SequencingRequest::Exit));
        }
        Ok(None)
    }

    /// Evaluate exit-condition rules on the ancestors of `current`, root
    /// first. The first ancestor whose rule fires has its attempt, and
    /// every attempt below it, ended and becomes current.
    fn exit_action_rules(&mut self, current: ActivityId) {
        let mut ancestors = self.tree.path_to_root(current);
        ancestors.remove(0);
        ancestors.reverse();
        let fired = ancestors.into_iter().find(|&a| {
            rules::evaluate_actions(&self.ctx(), a, RuleType::ExitCondition, &[RuleAction::Exit])
                .is_some()
        });
        if let Some(exit_target) = fired {
            tracing::debug!(activity = %self.name(exit_target), "exit rule fired");
            self.end_attempts_up_to(current, exit_target);
            self.cursor.current = Some(exit_target);
        }
    }

    /// End every active attempt from `from` up to and including `until`,
    /// innermost first.
    pub(super) fn end_attempts_up_to(&mut self, from: ActivityId, until: ActivityId) {
        for a in self.tree.path_to_root(from) {
            if self.tracking.is_active(a) {
                self.end_attempt(a);
            }
            if a == until {
                break;
            }
        }
    }

    /// End the attempt on `id`: settle content-unreported status on leaves,
    /// close the attempt clock, then roll up.
    pub(super) fn end_attempt(&mut self, id: ActivityId) {
        let seq = &self.tree.get(id).sequencing;
        let is_leaf = self.tree.is_leaf(id);
        let any_child_suspended = self
            .tree
            .children(id)
            .iter()
            .any(|&c| self.tracking.record(c).is_suspended);

        let record = self.tracking.record_mut(id);
        if is_leaf {
            if seq.delivery_controls.tracked && self.config.auto_complete_on_exit {
                if !seq.delivery_controls.completion_set_by_content
                    && !record.completion_status.is_known()
                {
                    record.completion_status = CompletionStatus::Completed;
                }
                if !seq.delivery_controls.objective_set_by_content
                    && !record.success_status.is_known()
                {
                    record.success_status = SuccessStatus::Passed;
                }
            }
        } else {
            record.is_suspended = any_child_suspended;
        }
        record.close_attempt(self.now);
        tracing::debug!(activity = %self.name(id), "attempt ended");
        self.rollup(id);
    }

    /// Sequencing exit: leaving the root ends the pass through the tree.
    pub(super) fn sequencing_exit(&mut self, effect: &mut NavigationEffect) -> Result<()> {
        match self.cursor.current {
            None => {
                effect.ended = true;
            }
            Some(current) if self.tracking.is_active(current) => {
                return Err(SeqError::exception(
                    "SB.2.11-2",
                    "Exit request failed: the current activity is still active",
                ));
            }
            Some(current) if current == self.tree.root() => {
                self.cursor.current = None;
                effect.ended = true;
                tracing::debug!("pass through the activity tree ended");
            }
            Some(_) => {}
        }
        Ok(())
    }
}
