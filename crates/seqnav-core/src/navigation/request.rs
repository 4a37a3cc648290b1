use super::{Navigator, Plan, SequencingRequest, Termination};
use crate::error::{Result, SeqError};
use crate::tree::ActivityId;
use crate::types::NavigationRequest;

impl Navigator<'_> {
    /// Validate a navigation request against the cursor and translate it
    /// into termination and sequencing requests.
    pub(super) fn plan(&self, request: NavigationRequest, target: Option<&str>) -> Result<Plan> {
        let plan = |termination, sequencing| Plan {
            termination,
            sequencing: Some(sequencing),
        };
        match request {
            NavigationRequest::Start => {
                if self.cursor.current.is_some() {
                    return Err(SeqError::exception(
                        "NB.2.1-1",
                        "Start request invalid: the sequencing session has already begun",
                    ));
                }
                Ok(plan(None, SequencingRequest::Start))
            }

            NavigationRequest::ResumeAll => {
                if self.cursor.current.is_some() {
                    return Err(SeqError::exception(
                        "NB.2.1-1",
                        "Resume all request invalid: the sequencing session has already begun",
                    ));
                }
                if self.cursor.suspended.is_none() {
                    return Err(SeqError::exception(
                        "NB.2.1-3",
                        "Resume all request invalid: there is no suspended activity",
                    ));
                }
                Ok(plan(None, SequencingRequest::ResumeAll))
            }

            NavigationRequest::Continue => {
                let current = self.current()?;
                if !self.parent_flow(current) {
                    return Err(SeqError::exception(
                        "NB.2.1-4",
                        "Continue request invalid: flow navigation is disabled",
                    ));
                }
                Ok(plan(self.exit_if_active(current), SequencingRequest::Continue))
            }

            NavigationRequest::Previous => {
                let current = self.cursor.current.ok_or_else(|| {
                    SeqError::exception(
                        "NB.2.1-2",
                        "Previous request invalid: there is no current activity to move back from",
                    )
                })?;
                if !self.parent_flow(current) {
                    return Err(SeqError::exception(
                        "NB.2.1-4",
                        "Previous request invalid: flow navigation is disabled, cannot move to the previous activity",
                    ));
                }
                let forward_only = self
                    .tree
                    .parent(current)
                    .is_some_and(|p| self.tree.get(p).control_mode().forward_only);
                if forward_only {
                    return Err(SeqError::exception(
                        "NB.2.1-5",
                        "Previous request invalid: forward-only navigation does not allow moving to the previous activity",
                    ));
                }
                Ok(plan(self.exit_if_active(current), SequencingRequest::Previous))
            }

            NavigationRequest::Choice => {
                let current = self.current()?;
                let target = self.resolve_target(request, target)?;
                self.check_choice(current, target)?;
                Ok(plan(self.exit_if_active(current), SequencingRequest::Choice(target)))
            }

            NavigationRequest::Jump => {
                let target = self.resolve_target(request, target)?;
                let termination = self.cursor.current.and_then(|c| self.exit_if_active(c));
                Ok(plan(termination, SequencingRequest::Jump(target)))
            }

            NavigationRequest::Exit | NavigationRequest::Abandon => {
                let current = self.current()?;
                if !self.tracking.is_active(current) {
                    return Err(SeqError::exception(
                        "NB.2.1-12",
                        format!(
                            "{} request invalid: the current activity has already been exited",
                            capitalize(request.as_str())
                        ),
                    ));
                }
                let termination = if request == NavigationRequest::Exit {
                    Termination::Exit
                } else {
                    Termination::Abandon
                };
                Ok(plan(Some(termination), SequencingRequest::Exit))
            }

            NavigationRequest::ExitAll => {
                self.current()?;
                Ok(plan(Some(Termination::ExitAll), SequencingRequest::Exit))
            }

            NavigationRequest::AbandonAll => {
                self.current()?;
                Ok(plan(Some(Termination::AbandonAll), SequencingRequest::Exit))
            }

            NavigationRequest::SuspendAll => {
                self.current()?;
                Ok(plan(Some(Termination::SuspendAll), SequencingRequest::Exit))
            }

            NavigationRequest::Retry => {
                let current = self.current()?;
                Ok(plan(self.exit_if_active(current), SequencingRequest::Retry))
            }

            NavigationRequest::RetryAll => {
                self.current()?;
                Ok(plan(Some(Termination::ExitAll), SequencingRequest::Retry))
            }
        }
    }

    fn exit_if_active(&self, current: ActivityId) -> Option<Termination> {
        self.tracking.is_active(current).then_some(Termination::Exit)
    }

    fn parent_flow(&self, id: ActivityId) -> bool {
        self.tree
            .parent(id)
            .map_or(true, |p| self.tree.get(p).control_mode().flow)
    }

    fn resolve_target(&self, request: NavigationRequest, target: Option<&str>) -> Result<ActivityId> {
        let target = target
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| SeqError::MissingTarget {
                request: request.to_string(),
            })?;
        self.tree
            .id_of(target)
            .ok_or_else(|| SeqError::ActivityNotFound(target.to_string()))
    }

    /// Control-mode checks for choosing `target` while `current` is current.
    fn check_choice(&self, current: ActivityId, target: ActivityId) -> Result<()> {
        if let Some(parent) = self.tree.parent(target) {
            if !self.tree.get(parent).control_mode().choice {
                return Err(SeqError::exception(
                    "NB.2.1-10",
                    format!(
                        "Choice request invalid: '{}' does not allow choosing its children",
                        self.name(parent)
                    ),
                ));
            }
        }

        if self.tracking.is_active(current) {
            let common = self.tree.common_ancestor(current, target);
            for a in self.tree.path_to_root(current) {
                if a == common {
                    break;
                }
                if self.tracking.is_active(a) && !self.tree.get(a).control_mode().choice_exit {
                    return Err(SeqError::exception(
                        "NB.2.1-11",
                        format!(
                            "Choice request invalid: '{}' does not allow choice to leave it",
                            self.name(a)
                        ),
                    ));
                }
            }
        }
        Ok(())
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
