use crate::sequencing::ObjectiveDefinition;
use crate::tree::{ActivityId, ActivityTree};
use crate::types::{CompletionStatus, SuccessStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ---------------------------------------------------------------------------
// ObjectiveState
// ---------------------------------------------------------------------------

/// Satisfaction and measure of one objective; `None` means unknown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ObjectiveState {
    #[serde(default)]
    pub satisfied: Option<bool>,
    #[serde(default)]
    pub measure: Option<f64>,
}

impl ObjectiveState {
    pub fn is_known(&self) -> bool {
        self.satisfied.is_some()
    }
}

// ---------------------------------------------------------------------------
// TrackingRecord
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackingRecord {
    pub attempt_count: u32,
    #[serde(default)]
    pub attempt_completion_amount: Option<f64>,
    #[serde(default)]
    pub completion_status: CompletionStatus,
    #[serde(default)]
    pub success_status: SuccessStatus,
    /// Primary objective measure, nominally in `[-1, 1]`.
    #[serde(default)]
    pub objective_measure: Option<f64>,
    /// Seconds.
    #[serde(default)]
    pub attempt_absolute_duration: f64,
    #[serde(default)]
    pub attempt_experienced_duration: f64,
    #[serde(default)]
    pub activity_absolute_duration: f64,
    #[serde(default)]
    pub activity_experienced_duration: f64,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default)]
    pub is_suspended: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attempt_started_at: Option<DateTime<Utc>>,
    /// Secondary objectives keyed by local objective id.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub objectives: BTreeMap<String, ObjectiveState>,
}

impl TrackingRecord {
    pub fn is_attempted(&self) -> bool {
        self.attempt_count > 0
    }

    pub fn primary_objective(&self) -> ObjectiveState {
        ObjectiveState {
            satisfied: self.success_status.satisfied(),
            measure: self.objective_measure,
        }
    }

    /// Attempt time so far, including the running attempt when active.
    pub fn attempt_elapsed(&self, now: DateTime<Utc>) -> f64 {
        self.attempt_absolute_duration + self.running_secs(now)
    }

    pub fn activity_elapsed(&self, now: DateTime<Utc>) -> f64 {
        self.activity_absolute_duration + self.running_secs(now)
    }

    fn running_secs(&self, now: DateTime<Utc>) -> f64 {
        match (self.is_active, self.attempt_started_at) {
            (true, Some(start)) => ((now - start).num_milliseconds().max(0) as f64) / 1_000.0,
            _ => 0.0,
        }
    }

    /// Reset attempt-scoped data for a fresh attempt. Activity-level
    /// durations and secondary objectives carry over.
    pub fn begin_attempt(&mut self, now: DateTime<Utc>) {
        self.attempt_count = self.attempt_count.saturating_add(1);
        self.completion_status = CompletionStatus::Unknown;
        self.success_status = SuccessStatus::Unknown;
        self.objective_measure = None;
        self.attempt_completion_amount = None;
        self.attempt_absolute_duration = 0.0;
        self.attempt_experienced_duration = 0.0;
        self.attempt_started_at = Some(now);
    }

    /// Close the running attempt and accumulate its duration.
    pub fn close_attempt(&mut self, now: DateTime<Utc>) {
        let secs = self.running_secs(now);
        self.attempt_absolute_duration += secs;
        self.activity_absolute_duration += secs;
        self.activity_experienced_duration += secs;
        if self.attempt_experienced_duration == 0.0 {
            self.attempt_experienced_duration = self.attempt_absolute_duration;
        }
        self.is_active = false;
        self.attempt_started_at = None;
    }

    /// Forget everything except, optionally, the attempt count.
    pub fn reset(&mut self, keep_attempt_count: bool) {
        let attempts = self.attempt_count;
        *self = TrackingRecord::default();
        if keep_attempt_count {
            self.attempt_count = attempts;
        }
    }
}

// ---------------------------------------------------------------------------
// GlobalObjectiveMap
// ---------------------------------------------------------------------------

/// Shared objective status keyed by global objective id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GlobalObjectiveMap(BTreeMap<String, ObjectiveState>);

impl GlobalObjectiveMap {
    pub fn get(&self, id: &str) -> Option<&ObjectiveState> {
        self.0.get(id)
    }

    pub fn entry(&mut self, id: &str) -> &mut ObjectiveState {
        self.0.entry(id.to_string()).or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ObjectiveState)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_inner(self) -> BTreeMap<String, ObjectiveState> {
        self.0
    }
}

impl From<BTreeMap<String, ObjectiveState>> for GlobalObjectiveMap {
    fn from(map: BTreeMap<String, ObjectiveState>) -> Self {
        Self(map)
    }
}

// ---------------------------------------------------------------------------
// TrackingState
// ---------------------------------------------------------------------------

/// All mutable per-learner data for one tree: one record per activity plus
/// the global objective table. Cheap to clone, which is how navigation
/// requests get a scratch copy to work on.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackingState {
    records: Vec<TrackingRecord>,
    globals: GlobalObjectiveMap,
}

impl TrackingState {
    pub fn new(tree: &ActivityTree) -> Self {
        Self {
            records: vec![TrackingRecord::default(); tree.len()],
            globals: GlobalObjectiveMap::default(),
        }
    }

    pub fn record(&self, id: ActivityId) -> &TrackingRecord {
        &self.records[id.0]
    }

    pub fn record_mut(&mut self, id: ActivityId) -> &mut TrackingRecord {
        &mut self.records[id.0]
    }

    pub fn globals(&self) -> &GlobalObjectiveMap {
        &self.globals
    }

    pub fn globals_mut(&mut self) -> &mut GlobalObjectiveMap {
        &mut self.globals
    }

    pub fn is_active(&self, id: ActivityId) -> bool {
        self.records[id.0].is_active
    }

    /// Local view of an objective before global reads are applied.
    fn local_objective(&self, id: ActivityId, def: &ObjectiveDefinition, primary: bool) -> ObjectiveState {
        let record = &self.records[id.0];
        if primary {
            record.primary_objective()
        } else {
            record.objectives.get(&def.id).copied().unwrap_or_default()
        }
    }

    /// Objective status as rule conditions see it: the local value,
    /// overridden by any known global it is mapped to read from.
    /// `objective` of `None` selects the primary objective.
    pub fn objective(&self, tree: &ActivityTree, id: ActivityId, objective: Option<&str>) -> ObjectiveState {
        let seq = &tree.get(id).sequencing;
        let Some(def) = seq.objective(objective) else {
            return ObjectiveState::default();
        };
        let primary = std::ptr::eq(def, &seq.primary_objective);
        let mut state = self.local_objective(id, def, primary);
        for map in def.reads_from() {
            let Some(global) = self.globals.get(&map.target_objective_id) else {
                continue;
            };
            if map.read_satisfied_status && global.satisfied.is_some() {
                state.satisfied = global.satisfied;
            }
            if map.read_normalized_measure && global.measure.is_some() {
                state.measure = global.measure;
            }
        }
        state
    }

    /// Push known local objective values to every global they write to.
    /// Returns true when a global changed.
    pub fn write_globals(&mut self, tree: &ActivityTree, id: ActivityId) -> bool {
        let seq = &tree.get(id).sequencing;
        let mut changed = false;
        for (index, def) in seq.all_objectives().enumerate() {
            let local = self.local_objective(id, def, index == 0);
            for map in def.writes_to() {
                let global = self.globals.entry(&map.target_objective_id);
                let before = *global;
                if map.write_satisfied_status && local.satisfied.is_some() {
                    global.satisfied = local.satisfied;
                }
                if map.write_normalized_measure && local.measure.is_some() {
                    global.measure = local.measure;
                }
                if *global != before {
                    tracing::debug!(
                        activity = %tree.identifier(id),
                        global = %map.target_objective_id,
                        "global objective written"
                    );
                    changed = true;
                }
            }
        }
        changed
    }

    /// Clear every record in the subtree rooted at `id`.
    pub fn reset_subtree(&mut self, tree: &ActivityTree, id: ActivityId, keep_attempt_count: bool) {
        for a in tree.descendants_or_self(id) {
            self.records[a.0].reset(keep_attempt_count);
        }
    }

    pub fn records(&self) -> impl Iterator<Item = (ActivityId, &TrackingRecord)> {
        self.records.iter().enumerate().map(|(i, r)| (ActivityId(i), r))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use chrono::Duration;
    use serde_json::json;

    fn tree() -> ActivityTree {
        ActivityTree::build(
            &json!({ "organizations": { "organizations": [{
                "identifier": "org",
                "items": [
                    { "identifier": "a", "sequencing": { "objectives": {
                        "primaryObjective": { "objectiveID": "pa", "mapInfo": [{
                            "targetObjectiveID": "g", "writeSatisfiedStatus": true, "writeNormalizedMeasure": true
                        }]}
                    }}},
                    { "identifier": "b", "sequencing": { "objectives": {
                        "primaryObjective": { "objectiveID": "pb", "mapInfo": [{ "targetObjectiveID": "g" }] },
                        "objectives": [{ "objectiveID": "local2" }]
                    }}}
                ]
            }]}}),
            &EngineConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn globals_flow_from_writer_to_reader() {
        let tree = tree();
        let a = tree.id_of("a").unwrap();
        let b = tree.id_of("b").unwrap();
        let mut state = TrackingState::new(&tree);
        assert_eq!(state.objective(&tree, b, None), ObjectiveState::default());

        state.record_mut(a).success_status = SuccessStatus::Passed;
        state.record_mut(a).objective_measure = Some(0.9);
        assert!(state.write_globals(&tree, a));
        assert!(!state.write_globals(&tree, a));

        let seen = state.objective(&tree, b, None);
        assert_eq!(seen.satisfied, Some(true));
        assert_eq!(seen.measure, Some(0.9));
        // b's own record is untouched.
        assert_eq!(state.record(b).success_status, SuccessStatus::Unknown);
    }

    #[test]
    fn reader_does_not_write() {
        let tree = tree();
        let b = tree.id_of("b").unwrap();
        let mut state = TrackingState::new(&tree);
        state.record_mut(b).success_status = SuccessStatus::Failed;
        assert!(!state.write_globals(&tree, b));
        assert!(state.globals().is_empty());
    }

    #[test]
    fn secondary_objectives_are_looked_up_by_id() {
        let tree = tree();
        let b = tree.id_of("b").unwrap();
        let mut state = TrackingState::new(&tree);
        state.record_mut(b).objectives.insert(
            "local2".to_string(),
            ObjectiveState { satisfied: Some(false), measure: None },
        );
        assert_eq!(state.objective(&tree, b, Some("local2")).satisfied, Some(false));
        assert_eq!(state.objective(&tree, b, Some("missing")), ObjectiveState::default());
    }

    #[test]
    fn attempt_lifecycle_accumulates_time() {
        let start = Utc::now();
        let mut record = TrackingRecord::default();
        record.begin_attempt(start);
        record.is_active = true;
        record.completion_status = CompletionStatus::Completed;
        assert_eq!(record.attempt_elapsed(start + Duration::seconds(30)), 30.0);
        record.close_attempt(start + Duration::seconds(30));
        assert!(!record.is_active);
        assert_eq!(record.attempt_absolute_duration, 30.0);

        record.begin_attempt(start + Duration::seconds(60));
        assert_eq!(record.attempt_count, 2);
        assert_eq!(record.completion_status, CompletionStatus::Unknown);
        assert_eq!(record.attempt_absolute_duration, 0.0);
        assert_eq!(record.activity_absolute_duration, 30.0);
    }

    #[test]
    fn new_attempt_clears_objective_status() {
        let mut record = TrackingRecord {
            attempt_count: 1,
            success_status: SuccessStatus::Failed,
            objective_measure: Some(-0.5),
            ..TrackingRecord::default()
        };
        record.objectives.insert(
            "local".to_string(),
            ObjectiveState { satisfied: Some(true), measure: None },
        );
        record.begin_attempt(Utc::now());
        assert_eq!(record.attempt_count, 2);
        assert_eq!(record.success_status, SuccessStatus::Unknown);
        assert_eq!(record.objective_measure, None);
        assert_eq!(record.objectives["local"].satisfied, Some(true));
    }

    #[test]
    fn reset_can_keep_attempts() {
        let mut record = TrackingRecord {
            attempt_count: 3,
            success_status: SuccessStatus::Passed,
            ..TrackingRecord::default()
        };
        record.reset(true);
        assert_eq!(record.attempt_count, 3);
        assert_eq!(record.success_status, SuccessStatus::Unknown);
        record.reset(false);
        assert_eq!(record.attempt_count, 0);
    }
}
