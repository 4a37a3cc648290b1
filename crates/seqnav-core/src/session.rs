//! A sequencing session: one learner's pass over one activity tree.
//!
//! Every public operation matches on [`SessionPhase`] first. Navigation runs
//! against scratch copies of the tracking state and cursor; the copies
//! replace the live ones only when the request succeeds.

use crate::config::EngineConfig;
use crate::error::{Result, SeqError};
use crate::navigation::{Cursor, NavigationEffect, Navigator};
use crate::progress::{self, PatchReport, ProgressPatch};
use crate::rollup;
use crate::rules::{self, EvalContext};
use crate::sequencing::RuleAction;
use crate::snapshot::{SessionSnapshot, SNAPSHOT_VERSION};
use crate::tracking::TrackingState;
use crate::tree::{ActivityId, ActivityTree};
use crate::types::{NavigationRequest, RuleType, SessionPhase};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

/// One processed navigation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub at: DateTime<Utc>,
    pub request: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Current activity after the request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeStats {
    pub total_activities: usize,
    pub leaf_count: usize,
    pub max_depth: usize,
    pub completed_count: usize,
    pub satisfied_count: usize,
    pub attempted_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequencingState {
    pub session_id: Option<Uuid>,
    pub current_activity: Option<String>,
    pub suspended_activity: Option<String>,
    pub session_phase: SessionPhase,
    pub activity_tree_stats: TreeStats,
    #[serde(default)]
    pub anomalies: Vec<String>,
}

impl SequencingState {
    /// The report when no session exists.
    pub fn not_started() -> Self {
        Self {
            session_id: None,
            current_activity: None,
            suspended_activity: None,
            session_phase: SessionPhase::NotStarted,
            activity_tree_stats: TreeStats::default(),
            anomalies: Vec::new(),
        }
    }
}

/// Requests that would currently succeed.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AvailableNavigation {
    pub requests: Vec<NavigationRequest>,
    /// Activities a `choice` request could target.
    pub choices: Vec<String>,
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Session {
    id: Uuid,
    tree: Arc<ActivityTree>,
    config: EngineConfig,
    tracking: TrackingState,
    cursor: Cursor,
    phase: SessionPhase,
    history: Vec<HistoryEntry>,
}

impl Session {
    /// Start a session on `tree`. The session is active with no current
    /// activity; `start` delivers the first one.
    pub fn new(tree: Arc<ActivityTree>, config: EngineConfig) -> Self {
        let tracking = TrackingState::new(&tree);
        let id = Uuid::new_v4();
        tracing::info!(session = %id, activities = tree.len(), "sequencing session initialized");
        Self {
            id,
            tree,
            config,
            tracking,
            cursor: Cursor::default(),
            phase: SessionPhase::Active,
            history: Vec::new(),
        }
    }

    /// Rebuild a session from a snapshot taken on the same tree. Tracking
    /// for identifiers the tree does not have is dropped with a warning.
    pub fn restore(tree: Arc<ActivityTree>, config: EngineConfig, snapshot: SessionSnapshot) -> Self {
        if snapshot.version != SNAPSHOT_VERSION {
            tracing::warn!(version = snapshot.version, "restoring snapshot from another format version");
        }
        let root = tree.identifier(tree.root());
        if snapshot.organization != root {
            tracing::warn!(
                snapshot = %snapshot.organization,
                tree = %root,
                "snapshot was taken on a different organization"
            );
        }

        let mut tracking = TrackingState::new(&tree);
        for (identifier, record) in snapshot.activities {
            match tree.id_of(&identifier) {
                Some(id) => *tracking.record_mut(id) = record,
                None => tracing::warn!(activity = %identifier, "snapshot activity not in tree; ignored"),
            }
        }
        *tracking.globals_mut() = snapshot.global_objectives;

        let lookup = |identifier: Option<String>| {
            let identifier = identifier?;
            let id = tree.id_of(&identifier);
            if id.is_none() {
                tracing::warn!(activity = %identifier, "snapshot cursor not in tree; cleared");
            }
            id
        };
        let cursor = Cursor {
            current: lookup(snapshot.current),
            suspended: lookup(snapshot.suspended),
        };
        let phase = match snapshot.phase {
            SessionPhase::NotStarted => SessionPhase::Active,
            phase => phase,
        };
        tracing::info!(session = %snapshot.session_id, %phase, "sequencing session restored");

        Self {
            id: snapshot.session_id,
            tree,
            config,
            tracking,
            cursor,
            phase,
            history: snapshot.history,
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            version: SNAPSHOT_VERSION,
            session_id: self.id,
            phase: self.phase,
            organization: self.tree.identifier(self.tree.root()).to_string(),
            current: self.cursor.current.map(|id| self.name(id)),
            suspended: self.cursor.suspended.map(|id| self.name(id)),
            activities: self
                .tracking
                .records()
                .map(|(id, record)| (self.name(id), record.clone()))
                .collect(),
            global_objectives: self.tracking.globals().clone(),
            history: self.history.clone(),
            saved_at: Utc::now(),
        }
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn tree(&self) -> &ActivityTree {
        &self.tree
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn tracking(&self) -> &TrackingState {
        &self.tracking
    }

    pub fn cursor(&self) -> Cursor {
        self.cursor
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    pub fn current_activity(&self) -> Option<&str> {
        self.cursor.current.map(|id| self.tree.identifier(id))
    }

    fn name(&self, id: ActivityId) -> String {
        self.tree.identifier(id).to_string()
    }

    fn lookup(&self, identifier: &str) -> Result<ActivityId> {
        self.tree
            .id_of(identifier)
            .ok_or_else(|| SeqError::ActivityNotFound(identifier.to_string()))
    }

    // -----------------------------------------------------------------------
    // Navigation
    // -----------------------------------------------------------------------

    /// Process a navigation request given by name.
    pub fn process_str(&mut self, request: &str, target: Option<&str>) -> Result<NavigationEffect> {
        let parsed = match self.phase {
            SessionPhase::Terminated => Err(SeqError::SessionNotActive),
            _ => request.parse::<NavigationRequest>(),
        };
        match parsed {
            Ok(request) => self.process(request, target),
            Err(e) => {
                self.record_history(request, target, &Err(&e));
                Err(e)
            }
        }
    }

    /// Process a navigation request. On failure nothing changes.
    pub fn process(&mut self, request: NavigationRequest, target: Option<&str>) -> Result<NavigationEffect> {
        let result = self.dry_run(request, target);
        let outcome = match result {
            Ok((tracking, cursor, effect, phase)) => {
                self.tracking = tracking;
                self.cursor = cursor;
                if phase != self.phase {
                    tracing::info!(from = %self.phase, to = %phase, "session phase changed");
                }
                self.phase = phase;
                Ok(effect)
            }
            Err(e) => {
                tracing::debug!(%request, error = %e, "navigation request rejected");
                Err(e)
            }
        };
        self.record_history(request.as_str(), target, &outcome.as_ref().map(|_| ()));
        outcome
    }

    /// Whether `request` would succeed now. Nothing is committed.
    pub fn is_request_valid(&self, request: NavigationRequest, target: Option<&str>) -> bool {
        self.dry_run(request, target).is_ok()
    }

    pub fn available_navigation(&self) -> AvailableNavigation {
        let requests = NavigationRequest::all()
            .iter()
            .copied()
            .filter(|r| !r.requires_target() && self.is_request_valid(*r, None))
            .collect();
        let choices = self
            .tree
            .iter()
            .filter(|a| a.is_visible)
            .filter(|a| self.is_request_valid(NavigationRequest::Choice, Some(&a.identifier)))
            .map(|a| a.identifier.clone())
            .collect();
        AvailableNavigation { requests, choices }
    }

    fn dry_run(
        &self,
        request: NavigationRequest,
        target: Option<&str>,
    ) -> Result<(TrackingState, Cursor, NavigationEffect, SessionPhase)> {
        let request = match (self.phase, request) {
            (SessionPhase::Active, request) => request,
            (SessionPhase::Suspended, NavigationRequest::Start | NavigationRequest::ResumeAll) => {
                NavigationRequest::ResumeAll
            }
            _ => return Err(SeqError::SessionNotActive),
        };

        let mut tracking = self.tracking.clone();
        let mut cursor = self.cursor;
        let effect = Navigator::new(&self.tree, &self.config, &mut tracking, &mut cursor, Utc::now())
            .run(request, target)?;
        let phase = if effect.suspended {
            SessionPhase::Suspended
        } else {
            SessionPhase::Active
        };
        Ok((tracking, cursor, effect, phase))
    }

    fn record_history(&mut self, request: &str, target: Option<&str>, outcome: &std::result::Result<(), &SeqError>) {
        if self.config.history_limit == 0 {
            return;
        }
        self.history.push(HistoryEntry {
            at: Utc::now(),
            request: request.to_string(),
            target: target.map(str::to_string),
            success: outcome.is_ok(),
            reason: outcome.err().map(ToString::to_string),
            current: self.cursor.current.map(|id| self.name(id)),
        });
        if self.history.len() > self.config.history_limit {
            let excess = self.history.len() - self.config.history_limit;
            self.history.drain(..excess);
        }
    }

    // -----------------------------------------------------------------------
    // Tracking
    // -----------------------------------------------------------------------

    /// Apply a progress patch to one activity and roll up from it.
    pub fn update_progress(&mut self, identifier: &str, patch: &ProgressPatch) -> Result<PatchReport> {
        self.ensure_not_terminated()?;
        let id = self.lookup(identifier)?;
        let activity = self.tree.get(id);
        let primary = &activity.sequencing.primary_objective;
        let threshold = primary.satisfied_by_measure.then_some(primary.min_normalized_measure);

        let report = progress::apply(patch, self.tracking.record_mut(id), activity.is_leaf(), threshold);
        rollup::rollup(&self.tree, &mut self.tracking, id, Utc::now());
        tracing::debug!(activity = %identifier, applied = ?report.applied, "progress updated");
        Ok(report)
    }

    /// Run rollup from an activity. Returns the clusters whose status
    /// changed.
    pub fn rollup_from(&mut self, identifier: &str) -> Result<Vec<String>> {
        self.ensure_not_terminated()?;
        let id = self.lookup(identifier)?;
        let changed = rollup::rollup(&self.tree, &mut self.tracking, id, Utc::now());
        Ok(changed.into_iter().map(|id| self.name(id)).collect())
    }

    /// The action of the first rule of `rule_type` that fires on an
    /// activity.
    pub fn evaluate_rules(&self, identifier: &str, rule_type: RuleType) -> Result<Option<RuleAction>> {
        self.ensure_not_terminated()?;
        let id = self.lookup(identifier)?;
        let ctx = EvalContext::new(&self.tree, &self.tracking, Utc::now());
        Ok(rules::evaluate(&ctx, id, rule_type))
    }

    fn ensure_not_terminated(&self) -> Result<()> {
        match self.phase {
            SessionPhase::Terminated => Err(SeqError::SessionNotActive),
            SessionPhase::NotStarted | SessionPhase::Active | SessionPhase::Suspended => Ok(()),
        }
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    pub fn state(&self) -> SequencingState {
        let records = || self.tracking.records().map(|(_, r)| r);
        let stats = TreeStats {
            total_activities: self.tree.len(),
            leaf_count: self.tree.leaves(self.tree.root()).count(),
            max_depth: self.tree.max_depth(),
            completed_count: records()
                .filter(|r| r.completion_status == crate::types::CompletionStatus::Completed)
                .count(),
            satisfied_count: records()
                .filter(|r| r.success_status == crate::types::SuccessStatus::Passed)
                .count(),
            attempted_count: records().filter(|r| r.is_attempted()).count(),
        };
        SequencingState {
            session_id: Some(self.id),
            current_activity: self.cursor.current.map(|id| self.name(id)),
            suspended_activity: self.cursor.suspended.map(|id| self.name(id)),
            session_phase: self.phase,
            activity_tree_stats: stats,
            anomalies: self.tree.anomalies().to_vec(),
        }
    }

    /// End the session. Every later request is rejected.
    pub fn terminate(&mut self) -> Result<()> {
        if self.phase == SessionPhase::Terminated {
            return Err(SeqError::SessionNotActive);
        }
        let now = Utc::now();
        let active: Vec<ActivityId> = self
            .tracking
            .records()
            .filter(|(_, r)| r.is_active)
            .map(|(id, _)| id)
            .collect();
        for id in active {
            self.tracking.record_mut(id).close_attempt(now);
        }
        self.cursor.current = None;
        self.phase = SessionPhase::Terminated;
        tracing::info!(session = %self.id, "sequencing session terminated");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::navigation::tests::{flat, nested};
    use crate::types::CompletionStatus;
    use serde_json::{json, Value};

    fn session(items: Value) -> Session {
        session_with(items, EngineConfig::default())
    }

    fn session_with(items: Value, config: EngineConfig) -> Session {
        let tree = ActivityTree::build(
            &json!({ "organizations": { "organizations": [{ "identifier": "root", "items": items }] } }),
            &config,
        )
        .unwrap();
        Session::new(Arc::new(tree), config)
    }

    #[test]
    fn new_session_is_active_without_current() {
        let s = session(flat(2));
        assert_eq!(s.phase(), SessionPhase::Active);
        assert_eq!(s.current_activity(), None);
        let err = s.clone().process(NavigationRequest::Choice, Some("l1")).unwrap_err();
        assert_eq!(err.to_string(), "No current activity");
    }

    #[test]
    fn invalid_request_name_is_reported_and_recorded() {
        let mut s = session(flat(2));
        let err = s.process_str("teleport", None).unwrap_err();
        assert!(err.to_string().contains("Invalid navigation request type"));
        assert_eq!(s.history().len(), 1);
        assert!(!s.history()[0].success);
    }

    #[test]
    fn suspend_then_start_resumes() {
        let mut s = session(nested());
        s.process(NavigationRequest::Start, None).unwrap();
        s.process(NavigationRequest::Continue, None).unwrap();
        s.process(NavigationRequest::SuspendAll, None).unwrap();
        assert_eq!(s.phase(), SessionPhase::Suspended);
        assert_eq!(s.state().suspended_activity.as_deref(), Some("l2"));

        let err = s.process(NavigationRequest::Continue, None).unwrap_err();
        assert!(err.to_string().contains("not active"));

        s.process(NavigationRequest::Start, None).unwrap();
        assert_eq!(s.phase(), SessionPhase::Active);
        assert_eq!(s.current_activity(), Some("l2"));
        assert_eq!(s.tracking().record(s.tree().id_of("l2").unwrap()).attempt_count, 1);
    }

    #[test]
    fn terminated_session_rejects_everything() {
        let mut s = session(flat(2));
        s.process(NavigationRequest::Start, None).unwrap();
        s.terminate().unwrap();
        for &request in NavigationRequest::all() {
            let err = s.process(request, Some("l1")).unwrap_err();
            assert!(err.to_string().contains("not active"), "{request}");
        }
        assert!(s.update_progress("l1", &ProgressPatch::default()).is_err());
        let before = s.tracking().clone();
        assert!(matches!(s.rollup_from("l1"), Err(SeqError::SessionNotActive)));
        assert!(matches!(
            s.evaluate_rules("l1", RuleType::PreCondition),
            Err(SeqError::SessionNotActive)
        ));
        assert_eq!(s.tracking(), &before);
        let err = s.process_str("teleport", None).unwrap_err();
        assert!(matches!(err, SeqError::SessionNotActive), "{err}");
        assert!(s.terminate().is_err());
        assert_eq!(s.state().session_phase, SessionPhase::Terminated);
    }

    #[test]
    fn validity_query_does_not_commit() {
        let s = session(flat(3));
        let before = s.tracking().clone();
        assert!(s.is_request_valid(NavigationRequest::Start, None));
        assert!(!s.is_request_valid(NavigationRequest::Continue, None));
        assert_eq!(s.tracking(), &before);
        assert_eq!(s.current_activity(), None);
    }

    #[test]
    fn available_navigation_after_start() {
        let mut s = session(flat(3));
        s.process(NavigationRequest::Start, None).unwrap();
        let nav = s.available_navigation();
        assert!(nav.requests.contains(&NavigationRequest::Continue));
        assert!(nav.requests.contains(&NavigationRequest::SuspendAll));
        assert!(!nav.requests.contains(&NavigationRequest::Previous));
        assert!(!nav.requests.contains(&NavigationRequest::Start));
        assert!(nav.choices.contains(&"l3".to_string()));
    }

    #[test]
    fn progress_update_rolls_up() {
        let mut s = session(flat(2));
        s.process(NavigationRequest::Start, None).unwrap();
        let patch = ProgressPatch::default().completed("completed");
        s.update_progress("l1", &patch).unwrap();
        s.update_progress("l2", &patch).unwrap();
        let root = s.tree().root();
        assert_eq!(s.tracking().record(root).completion_status, CompletionStatus::Completed);
        assert_eq!(s.state().activity_tree_stats.completed_count, 3);

        let err = s.update_progress("nope", &patch).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn history_is_trimmed() {
        let config = EngineConfig {
            history_limit: 3,
            ..EngineConfig::default()
        };
        let mut s = session_with(flat(2), config);
        for _ in 0..5 {
            let _ = s.process(NavigationRequest::Previous, None);
        }
        assert_eq!(s.history().len(), 3);
    }

    #[test]
    fn snapshot_restores_progress_and_cursor() {
        let mut s = session(nested());
        s.process(NavigationRequest::Start, None).unwrap();
        s.process(NavigationRequest::Continue, None).unwrap();
        s.process(NavigationRequest::SuspendAll, None).unwrap();
        let snapshot = s.snapshot();

        let tree = Arc::new(s.tree().clone());
        let mut restored = Session::restore(tree, EngineConfig::default(), snapshot);
        assert_eq!(restored.id(), s.id());
        assert_eq!(restored.phase(), SessionPhase::Suspended);
        assert_eq!(restored.tracking(), s.tracking());
        restored.process(NavigationRequest::ResumeAll, None).unwrap();
        assert_eq!(restored.current_activity(), Some("l2"));
    }

    #[test]
    fn snapshot_from_another_tree_drops_unknown_ids() {
        let mut s = session(flat(3));
        s.process(NavigationRequest::Start, None).unwrap();
        let snapshot = s.snapshot();

        let other = session(json!([{ "identifier": "l1" }, { "identifier": "x" }]));
        let restored = Session::restore(Arc::new(other.tree().clone()), EngineConfig::default(), snapshot);
        assert_eq!(restored.current_activity(), Some("l1"));
        let x = restored.tree().id_of("x").unwrap();
        assert_eq!(restored.tracking().record(x).attempt_count, 0);
    }

    #[test]
    fn evaluate_rules_reports_first_firing_action() {
        let s = session(json!([
            { "identifier": "a", "sequencing": { "sequencingRules": { "preConditionRules": [
                { "conditions": [{ "condition": "always" }], "action": "skip" }
            ]}}},
            { "identifier": "b" }
        ]));
        assert_eq!(s.evaluate_rules("a", RuleType::PreCondition).unwrap(), Some(RuleAction::Skip));
        assert_eq!(s.evaluate_rules("b", RuleType::PreCondition).unwrap(), None);
    }
}
