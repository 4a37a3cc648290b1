//! The navigation request processor.
//!
//! A request runs in three stages, each in its own module:
//!
//! 1. [`request`] validates the navigation request against the cursor and
//!    turns it into a [`Plan`]: an optional termination request plus an
//!    optional sequencing request.
//! 2. [`termination`] ends the current attempt (exit, exit all, abandon,
//!    suspend), applying exit-condition and post-condition rules, which may
//!    replace the pending sequencing request.
//! 3. [`traversal`] resolves the sequencing request to a leaf and
//!    [`delivery`] checks and starts it.
//!
//! The [`Navigator`] mutates whatever tracking state and cursor it is
//! given. Callers hand it a scratch copy and keep the result only when
//! [`Navigator::run`] succeeds.

mod delivery;
mod request;
mod termination;
mod traversal;

use crate::config::EngineConfig;
use crate::error::{Result, SeqError};
use crate::rollup;
use crate::rules::EvalContext;
use crate::tracking::TrackingState;
use crate::tree::{ActivityId, ActivityTree};
use crate::types::NavigationRequest;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where the learner is: the delivered activity and the suspended one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    pub current: Option<ActivityId>,
    pub suspended: Option<ActivityId>,
}

/// What a successful request did, beyond moving the cursor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NavigationEffect {
    /// Leaf that was delivered, if any.
    pub delivered: Option<ActivityId>,
    /// The pass through the tree ended; no activity is current.
    pub ended: bool,
    /// The session was suspended.
    pub suspended: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Termination {
    Exit,
    ExitAll,
    SuspendAll,
    Abandon,
    AbandonAll,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SequencingRequest {
    Start,
    ResumeAll,
    Continue,
    Previous,
    Choice(ActivityId),
    Jump(ActivityId),
    Retry,
    Exit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Plan {
    pub termination: Option<Termination>,
    pub sequencing: Option<SequencingRequest>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Direction {
    Forward,
    Backward,
}

// ---------------------------------------------------------------------------
// Navigator
// ---------------------------------------------------------------------------

pub struct Navigator<'a> {
    tree: &'a ActivityTree,
    config: &'a EngineConfig,
    tracking: &'a mut TrackingState,
    cursor: &'a mut Cursor,
    now: DateTime<Utc>,
}

impl<'a> Navigator<'a> {
    pub fn new(
        tree: &'a ActivityTree,
        config: &'a EngineConfig,
        tracking: &'a mut TrackingState,
        cursor: &'a mut Cursor,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            tree,
            config,
            tracking,
            cursor,
            now,
        }
    }

    /// Process one navigation request. `target` names the activity for
    /// `choice` and `jump`.
    pub fn run(&mut self, request: NavigationRequest, target: Option<&str>) -> Result<NavigationEffect> {
        let plan = self.plan(request, target)?;
        tracing::debug!(%request, ?plan, "navigation request accepted");

        let mut effect = NavigationEffect::default();
        let mut sequencing = plan.sequencing;
        if let Some(termination) = plan.termination {
            if let Some(replacement) = self.terminate(termination, &mut effect)? {
                tracing::debug!(?replacement, "post-condition replaced sequencing request");
                sequencing = Some(replacement);
            }
        }

        match sequencing {
            None => {}
            Some(SequencingRequest::Exit) => self.sequencing_exit(&mut effect)?,
            Some(request) => {
                let target = self.sequence(request)?;
                self.deliver(target)?;
                effect.delivered = Some(target);
                effect.ended = false;
                effect.suspended = false;
            }
        }
        Ok(effect)
    }

    fn ctx(&self) -> EvalContext<'_> {
        EvalContext::new(self.tree, &*self.tracking, self.now)
    }

    fn name(&self, id: ActivityId) -> &'a str {
        self.tree.identifier(id)
    }

    fn current(&self) -> Result<ActivityId> {
        self.cursor.current.ok_or(SeqError::NoCurrentActivity)
    }

    fn rollup(&mut self, from: ActivityId) {
        rollup::rollup(self.tree, self.tracking, from, self.now);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
