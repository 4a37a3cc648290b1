//! Tracking updates reported by content.
//!
//! Telemetry arrives loosely typed. Every field goes through an explicit
//! coercion step: values that can be read are applied, everything else is
//! reported back in `ignored`. Nothing here fails on bad input.

use crate::duration::parse_duration;
use crate::tracking::{ObjectiveState, TrackingRecord};
use crate::types::{CompletionStatus, SuccessStatus};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

// ---------------------------------------------------------------------------
// PatchValue
// ---------------------------------------------------------------------------

/// One field of a progress patch, as received.
#[derive(Debug, Clone, PartialEq)]
pub enum PatchValue {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
    /// Arrays and objects; never coerced.
    Other(Value),
}

impl From<&Value> for PatchValue {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => PatchValue::Null,
            Value::Bool(b) => PatchValue::Bool(*b),
            Value::Number(n) => n.as_f64().map_or(PatchValue::Other(value.clone()), PatchValue::Number),
            Value::String(s) => PatchValue::Text(s.clone()),
            other => PatchValue::Other(other.clone()),
        }
    }
}

impl From<bool> for PatchValue {
    fn from(b: bool) -> Self {
        PatchValue::Bool(b)
    }
}

impl From<f64> for PatchValue {
    fn from(n: f64) -> Self {
        PatchValue::Number(n)
    }
}

impl From<&str> for PatchValue {
    fn from(s: &str) -> Self {
        PatchValue::Text(s.to_string())
    }
}

// ---------------------------------------------------------------------------
// Coercion
// ---------------------------------------------------------------------------

pub fn coerce_completion(value: &PatchValue) -> Option<CompletionStatus> {
    match value {
        PatchValue::Bool(true) => Some(CompletionStatus::Completed),
        PatchValue::Bool(false) => Some(CompletionStatus::Incomplete),
        PatchValue::Number(n) if n.is_nan() => None,
        PatchValue::Number(n) if *n >= 1.0 => Some(CompletionStatus::Completed),
        PatchValue::Number(_) => Some(CompletionStatus::Incomplete),
        PatchValue::Text(s) => match normalize(s).as_str() {
            "completed" | "complete" | "true" | "yes" | "1" => Some(CompletionStatus::Completed),
            "incomplete" | "notattempted" | "browsed" | "false" | "no" | "0" => {
                Some(CompletionStatus::Incomplete)
            }
            "unknown" => Some(CompletionStatus::Unknown),
            _ => None,
        },
        PatchValue::Null | PatchValue::Other(_) => None,
    }
}

pub fn coerce_success(value: &PatchValue) -> Option<SuccessStatus> {
    match value {
        PatchValue::Bool(b) => Some(SuccessStatus::from_satisfied(Some(*b))),
        PatchValue::Number(n) if n.is_nan() => None,
        PatchValue::Number(n) => Some(SuccessStatus::from_satisfied(Some(*n > 0.0))),
        PatchValue::Text(s) => match normalize(s).as_str() {
            "passed" | "pass" | "satisfied" | "true" | "yes" => Some(SuccessStatus::Passed),
            "failed" | "fail" | "notsatisfied" | "false" | "no" => Some(SuccessStatus::Failed),
            "unknown" => Some(SuccessStatus::Unknown),
            _ => None,
        },
        PatchValue::Null | PatchValue::Other(_) => None,
    }
}

/// Any non-NaN number is accepted as is, including infinities and values
/// outside `[-1, 1]`.
pub fn coerce_number(value: &PatchValue) -> Option<f64> {
    match value {
        PatchValue::Number(n) => (!n.is_nan()).then_some(*n),
        PatchValue::Text(s) => s.trim().parse::<f64>().ok().filter(|n| !n.is_nan()),
        _ => None,
    }
}

/// Seconds, from a number or an ISO 8601 duration.
pub fn coerce_duration(value: &PatchValue) -> Option<f64> {
    match value {
        PatchValue::Number(n) => (!n.is_nan()).then_some(*n),
        PatchValue::Text(s) => parse_duration(s),
        _ => None,
    }
}

fn normalize(s: &str) -> String {
    s.trim()
        .chars()
        .filter(|c| !matches!(c, ' ' | '_' | '-'))
        .flat_map(char::to_lowercase)
        .collect()
}

// ---------------------------------------------------------------------------
// ProgressPatch
// ---------------------------------------------------------------------------

/// A set of tracking fields to update on one activity.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgressPatch {
    pub completion: Option<PatchValue>,
    pub success: Option<PatchValue>,
    pub measure: Option<PatchValue>,
    pub completion_amount: Option<PatchValue>,
    pub experienced_duration: Option<PatchValue>,
    /// Secondary objectives: local objective id → (satisfied, measure).
    pub objectives: BTreeMap<String, (Option<PatchValue>, Option<PatchValue>)>,
    /// Keys that matched no field.
    pub unrecognized: Vec<String>,
}

impl ProgressPatch {
    /// Read a JSON patch. Accepts the data-model spellings
    /// (`completion_status`, `success_status`, `score_scaled`) as well as the
    /// shorthand flags (`completed`, `satisfied`, `measure`).
    pub fn from_value(value: &Value) -> Self {
        let mut patch = ProgressPatch::default();
        let Some(obj) = value.as_object() else {
            patch.unrecognized.push(format!("<{}>", value));
            return patch;
        };
        for (key, raw) in obj {
            let v = PatchValue::from(raw);
            match normalize(key).as_str() {
                "completionstatus" | "completed" | "completion" => patch.completion = Some(v),
                "successstatus" | "satisfied" | "passed" | "success" | "objectivesatisfiedstatus" => {
                    patch.success = Some(v)
                }
                "scorescaled" | "measure" | "objectivemeasure" | "score" | "normalizedmeasure" => {
                    patch.measure = Some(v)
                }
                "progressmeasure" | "attemptcompletionamount" | "completionamount" => {
                    patch.completion_amount = Some(v)
                }
                "sessiontime" | "experiencedduration" | "attemptexperiencedduration" => {
                    patch.experienced_duration = Some(v)
                }
                "objectives" => patch.read_objectives(raw),
                _ => patch.unrecognized.push(key.clone()),
            }
        }
        patch
    }

    fn read_objectives(&mut self, raw: &Value) {
        let Some(map) = raw.as_object() else {
            self.unrecognized.push("objectives".to_string());
            return;
        };
        for (id, fields) in map {
            let Some(fields) = fields.as_object() else {
                self.unrecognized.push(format!("objectives.{id}"));
                continue;
            };
            let mut satisfied = None;
            let mut measure = None;
            for (key, raw) in fields {
                match normalize(key).as_str() {
                    "satisfied" | "successstatus" | "satisfiedstatus" => satisfied = Some(PatchValue::from(raw)),
                    "measure" | "scorescaled" | "normalizedmeasure" => measure = Some(PatchValue::from(raw)),
                    _ => self.unrecognized.push(format!("objectives.{id}.{key}")),
                }
            }
            self.objectives.insert(id.clone(), (satisfied, measure));
        }
    }

    pub fn completed(mut self, value: impl Into<PatchValue>) -> Self {
        self.completion = Some(value.into());
        self
    }

    pub fn satisfied(mut self, value: impl Into<PatchValue>) -> Self {
        self.success = Some(value.into());
        self
    }

    pub fn measure(mut self, value: impl Into<PatchValue>) -> Self {
        self.measure = Some(value.into());
        self
    }
}

/// What applying a patch did.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PatchReport {
    pub applied: Vec<String>,
    pub ignored: Vec<String>,
}

/// Apply `patch` to `record`. Status fields are only written on leaves;
/// cluster status is derived by rollup. `satisfied_by_measure` carries the
/// primary objective's threshold when satisfaction follows the measure.
pub fn apply(
    patch: &ProgressPatch,
    record: &mut TrackingRecord,
    is_leaf: bool,
    satisfied_by_measure: Option<f64>,
) -> PatchReport {
    let mut report = PatchReport {
        applied: Vec::new(),
        ignored: patch.unrecognized.clone(),
    };
    let mut note = |field: &str, ok: bool| {
        if ok {
            report.applied.push(field.to_string());
        } else {
            report.ignored.push(field.to_string());
        }
    };

    if let Some(v) = &patch.completion {
        match coerce_completion(v).filter(|_| is_leaf) {
            Some(status) => {
                record.completion_status = status;
                note("completion_status", true);
            }
            None => note("completion_status", false),
        }
    }
    if let Some(v) = &patch.success {
        match coerce_success(v).filter(|_| is_leaf) {
            Some(status) => {
                record.success_status = status;
                note("success_status", true);
            }
            None => note("success_status", false),
        }
    }
    if let Some(v) = &patch.measure {
        match coerce_number(v).filter(|_| is_leaf) {
            Some(m) => {
                record.objective_measure = Some(m);
                note("objective_measure", true);
            }
            None => note("objective_measure", false),
        }
    }
    if let Some(v) = &patch.completion_amount {
        match coerce_number(v) {
            Some(amount) => {
                record.attempt_completion_amount = Some(amount);
                note("attempt_completion_amount", true);
            }
            None => note("attempt_completion_amount", false),
        }
    }
    if let Some(v) = &patch.experienced_duration {
        match coerce_duration(v) {
            Some(secs) => {
                record.attempt_experienced_duration = secs;
                note("attempt_experienced_duration", true);
            }
            None => note("attempt_experienced_duration", false),
        }
    }
    for (id, (satisfied, measure)) in &patch.objectives {
        let entry: &mut ObjectiveState = record.objectives.entry(id.clone()).or_default();
        if let Some(v) = satisfied {
            match coerce_success(v).map(SuccessStatus::satisfied) {
                Some(s) => {
                    entry.satisfied = s;
                    note(&format!("objectives.{id}.satisfied"), true);
                }
                None => note(&format!("objectives.{id}.satisfied"), false),
            }
        }
        if let Some(v) = measure {
            match coerce_number(v) {
                Some(m) => {
                    entry.measure = Some(m);
                    note(&format!("objectives.{id}.measure"), true);
                }
                None => note(&format!("objectives.{id}.measure"), false),
            }
        }
    }

    if let (true, Some(threshold), Some(m)) = (is_leaf, satisfied_by_measure, record.objective_measure) {
        record.success_status = SuccessStatus::from_satisfied(Some(m >= threshold));
    }

    if !report.ignored.is_empty() {
        tracing::warn!(ignored = ?report.ignored, "progress fields ignored");
    }
    report
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn coerces_completion_spellings() {
        assert_eq!(coerce_completion(&"Completed".into()), Some(CompletionStatus::Completed));
        assert_eq!(coerce_completion(&"not attempted".into()), Some(CompletionStatus::Incomplete));
        assert_eq!(coerce_completion(&true.into()), Some(CompletionStatus::Completed));
        assert_eq!(coerce_completion(&0.0.into()), Some(CompletionStatus::Incomplete));
        assert_eq!(coerce_completion(&"banana".into()), None);
        assert_eq!(coerce_completion(&PatchValue::Null), None);
    }

    #[test]
    fn coerces_success_spellings() {
        assert_eq!(coerce_success(&"passed".into()), Some(SuccessStatus::Passed));
        assert_eq!(coerce_success(&"not_satisfied".into()), Some(SuccessStatus::Failed));
        assert_eq!(coerce_success(&false.into()), Some(SuccessStatus::Failed));
        assert_eq!(coerce_success(&PatchValue::Other(json!([1]))), None);
    }

    #[test]
    fn extreme_numbers_are_stored() {
        assert_eq!(coerce_number(&f64::INFINITY.into()), Some(f64::INFINITY));
        assert_eq!(coerce_number(&(-1e300).into()), Some(-1e300));
        assert_eq!(coerce_number(&"Infinity".into()), Some(f64::INFINITY));
        assert_eq!(coerce_number(&f64::NAN.into()), None);
    }

    #[test]
    fn reads_patch_keys() {
        let patch = ProgressPatch::from_value(&json!({
            "completion_status": "completed",
            "satisfied": "yes",
            "scoreScaled": 0.5,
            "session_time": "PT1M",
            "colour": "blue",
            "objectives": { "obj2": { "satisfied": true, "measure": "0.3", "weight": 1 } }
        }));
        assert!(patch.completion.is_some());
        assert!(patch.success.is_some());
        assert_eq!(patch.measure, Some(PatchValue::Number(0.5)));
        assert_eq!(patch.unrecognized, vec!["colour".to_string(), "objectives.obj2.weight".to_string()]);

        let mut record = TrackingRecord::default();
        let report = apply(&patch, &mut record, true, None);
        assert_eq!(record.completion_status, CompletionStatus::Completed);
        assert_eq!(record.success_status, SuccessStatus::Passed);
        assert_eq!(record.attempt_experienced_duration, 60.0);
        assert_eq!(record.objectives["obj2"].measure, Some(0.3));
        assert_eq!(report.ignored.len(), 2);
    }

    #[test]
    fn clusters_ignore_status_fields() {
        let patch = ProgressPatch::default().completed(true).satisfied(true).measure(0.9);
        let mut record = TrackingRecord::default();
        let report = apply(&patch, &mut record, false, None);
        assert_eq!(record, TrackingRecord::default());
        assert_eq!(report.ignored.len(), 3);
        assert!(report.applied.is_empty());
    }

    #[test]
    fn measure_decides_satisfaction_when_configured() {
        let mut record = TrackingRecord::default();
        apply(&ProgressPatch::default().measure(0.4), &mut record, true, Some(0.6));
        assert_eq!(record.success_status, SuccessStatus::Failed);
        apply(&ProgressPatch::default().measure(f64::INFINITY), &mut record, true, Some(0.6));
        assert_eq!(record.success_status, SuccessStatus::Passed);
    }

    #[test]
    fn non_object_patch_is_ignored_not_rejected() {
        let patch = ProgressPatch::from_value(&json!("complete please"));
        let mut record = TrackingRecord::default();
        let report = apply(&patch, &mut record, true, None);
        assert_eq!(report.ignored.len(), 1);
        assert_eq!(record, TrackingRecord::default());
    }
}
