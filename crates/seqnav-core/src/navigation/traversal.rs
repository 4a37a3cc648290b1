use super::{Direction, Navigator, SequencingRequest};
use crate::error::{Result, SeqError};
use crate::rules;
use crate::sequencing::RuleAction;
use crate::tree::ActivityId;
use crate::types::RuleType;

impl Navigator<'_> {
    /// Resolve a sequencing request to the leaf that should be delivered.
    pub(super) fn sequence(&mut self, request: SequencingRequest) -> Result<ActivityId> {
        match request {
            SequencingRequest::Start => self.flow_into(self.tree.root())?.ok_or_else(|| {
                SeqError::exception(
                    "SB.2.5-3",
                    "Start request failed: no activity is available to deliver",
                )
            }),

            SequencingRequest::ResumeAll => self.cursor.suspended.ok_or_else(|| {
                SeqError::exception(
                    "SB.2.6-2",
                    "Resume all request failed: there is no suspended activity",
                )
            }),

            SequencingRequest::Continue => {
                let current = self.current()?;
                let next = match self.step_out(current, Direction::Forward)? {
                    Some(candidate) => self.flow_activity(candidate, Direction::Forward)?,
                    None => None,
                };
                next.ok_or_else(|| {
                    SeqError::exception(
                        "SB.2.1-1",
                        "Continue request failed: reached the end of the course",
                    )
                })
            }

            SequencingRequest::Previous => {
                let current = self.current()?;
                let prev = match self.step_out(current, Direction::Backward)? {
                    Some(candidate) => self.flow_activity(candidate, Direction::Backward)?,
                    None => None,
                };
                prev.ok_or_else(|| {
                    SeqError::exception(
                        "SB.2.1-3",
                        "Previous request failed: there is no previous activity before the beginning of the course",
                    )
                })
            }

            SequencingRequest::Choice(target) => self.choice_target(target),

            SequencingRequest::Jump(target) => self.flow_into(target)?.ok_or_else(|| {
                SeqError::exception(
                    "SB.2.13-1",
                    format!("Jump request failed: '{}' has no activity to deliver", self.name(target)),
                )
            }),

            SequencingRequest::Retry => {
                let current = self.current()?;
                let record = self.tracking.record(current);
                if record.is_active || record.is_suspended {
                    return Err(SeqError::exception(
                        "SB.2.10-2",
                        "Retry request failed: the current activity has not been exited",
                    ));
                }
                self.tracking.reset_subtree(
                    self.tree,
                    current,
                    !self.config.retry_resets_attempt_count,
                );
                self.flow_into(current)?.ok_or_else(|| {
                    SeqError::exception(
                        "SB.2.10-3",
                        format!("Retry request failed: '{}' has no activity to deliver", self.name(current)),
                    )
                })
            }

            SequencingRequest::Exit => Err(SeqError::exception(
                "SB.2.12-1",
                "Exit is not a delivery request",
            )),
        }
    }

    // -----------------------------------------------------------------------
    // Flow
    // -----------------------------------------------------------------------

    /// Next activity after leaving `from` in `direction`, climbing out of
    /// clusters as needed. `None` past either end of the tree.
    pub(super) fn step_out(&self, from: ActivityId, direction: Direction) -> Result<Option<ActivityId>> {
        let mut node = from;
        loop {
            let Some(parent) = self.tree.parent(node) else {
                return Ok(None);
            };
            let sibling = match direction {
                Direction::Forward => self.tree.next_sibling(node),
                Direction::Backward => {
                    if self.tree.get(parent).control_mode().forward_only {
                        return Err(SeqError::exception(
                            "SB.2.1-4",
                            format!(
                                "Previous request failed: '{}' is forward-only, cannot move to the previous activity",
                                self.name(parent)
                            ),
                        ));
                    }
                    self.tree.previous_sibling(node)
                }
            };
            if let Some(sibling) = sibling {
                return Ok(Some(sibling));
            }
            node = parent;
        }
    }

    /// Settle on a deliverable leaf starting at `candidate`: skipped
    /// activities are passed over in `direction`, clusters are entered.
    /// `None` when the walk runs off the tree.
    pub(super) fn flow_activity(&self, candidate: ActivityId, direction: Direction) -> Result<Option<ActivityId>> {
        let mut candidate = candidate;
        // Each step either enters a child or moves past a subtree, so a walk
        // visits an activity at most twice.
        let budget = self.tree.len().saturating_mul(2).saturating_add(1);
        for _ in 0..budget {
            if let Some(parent) = self.tree.parent(candidate) {
                if !self.tree.get(parent).control_mode().flow {
                    return Err(SeqError::exception(
                        "SB.2.2-1",
                        format!("Flow navigation is disabled inside '{}'", self.name(parent)),
                    ));
                }
            }

            let skipped =
                rules::evaluate_actions(&self.ctx(), candidate, RuleType::PreCondition, &[RuleAction::Skip])
                    .is_some();
            if skipped {
                tracing::debug!(activity = %self.name(candidate), "skipped");
                match self.step_out(candidate, direction)? {
                    Some(next) => {
                        candidate = next;
                        continue;
                    }
                    None => return Ok(None),
                }
            }

            self.check_activity(candidate)?;
            if self.tree.is_leaf(candidate) {
                return Ok(Some(candidate));
            }

            let children = self.tree.children(candidate);
            let enter_at = match direction {
                Direction::Forward => children.first(),
                Direction::Backward if self.tree.get(candidate).control_mode().forward_only => {
                    children.first()
                }
                Direction::Backward => children.last(),
            };
            match enter_at {
                Some(&child) => candidate = child,
                None => return Ok(None),
            }
        }
        Err(SeqError::exception(
            "SB.2.2-2",
            "Flow traversal did not settle on an activity",
        ))
    }

    /// First deliverable leaf inside `subtree` (the subtree itself when it
    /// is a leaf).
    pub(super) fn flow_into(&self, subtree: ActivityId) -> Result<Option<ActivityId>> {
        let Some(&first) = self.tree.children(subtree).first() else {
            return Ok(Some(subtree));
        };
        let found = self.flow_activity(first, Direction::Forward)?;
        Ok(found.filter(|&leaf| self.tree.is_ancestor(subtree, leaf)))
    }

    // -----------------------------------------------------------------------
    // Choice
    // -----------------------------------------------------------------------

    fn choice_target(&self, target: ActivityId) -> Result<ActivityId> {
        for a in self.tree.path_to_root(target) {
            let hidden = rules::evaluate_actions(
                &self.ctx(),
                a,
                RuleType::PreCondition,
                &[RuleAction::HiddenFromChoice],
            )
            .is_some();
            if hidden {
                return Err(SeqError::exception(
                    "SB.2.9-3",
                    format!("Choice request failed: '{}' is hidden from choice", self.name(target)),
                ));
            }
        }

        if let Some(current) = self.cursor.current {
            let common = self.tree.common_ancestor(current, target);
            let earlier = target < current && !self.tree.is_ancestor(target, current);
            if earlier && self.tree.get(common).control_mode().forward_only {
                return Err(SeqError::exception(
                    "SB.2.9-5",
                    format!(
                        "Choice request failed: '{}' is forward-only, cannot choose an earlier activity",
                        self.name(common)
                    ),
                ));
            }
            if target > current {
                for a in self.tree.path_to_root(current) {
                    if a == common {
                        break;
                    }
                    let stopped = rules::evaluate_actions(
                        &self.ctx(),
                        a,
                        RuleType::PreCondition,
                        &[RuleAction::StopForwardTraversal],
                    )
                    .is_some();
                    if stopped {
                        return Err(SeqError::exception(
                            "SB.2.9-6",
                            format!(
                                "Choice request failed: forward traversal is stopped at '{}'",
                                self.name(a)
                            ),
                        ));
                    }
                }
            }
        }

        self.flow_into(target)?.ok_or_else(|| {
            SeqError::exception(
                "SB.2.9-7",
                format!("Choice request failed: '{}' has no activity to deliver", self.name(target)),
            )
        })
    }
}
