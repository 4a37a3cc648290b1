use crate::duration::parse_duration;
use crate::shape::lenient;
use crate::types::RuleType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ---------------------------------------------------------------------------
// ControlMode
// ---------------------------------------------------------------------------

/// Which navigation requests are legal among an activity's children.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlMode {
    #[serde(default = "default_true")]
    pub choice: bool,
    #[serde(default = "default_true")]
    pub choice_exit: bool,
    #[serde(default = "default_true")]
    pub flow: bool,
    #[serde(default)]
    pub forward_only: bool,
}

fn default_true() -> bool {
    true
}

impl Default for ControlMode {
    fn default() -> Self {
        Self {
            choice: true,
            choice_exit: true,
            flow: true,
            forward_only: false,
        }
    }
}

impl ControlMode {
    /// Flags present in `value` override `defaults`; anything missing or
    /// unreadable keeps the default.
    pub fn from_value(value: Option<&Value>, defaults: ControlMode) -> Self {
        let Some(obj) = value.and_then(Value::as_object) else {
            return defaults;
        };
        let flag = |keys: &[&str], fallback: bool| {
            lenient::field(obj, keys)
                .and_then(lenient::bool_of)
                .unwrap_or(fallback)
        };
        Self {
            choice: flag(&["choice"], defaults.choice),
            choice_exit: flag(&["choiceExit", "choice_exit"], defaults.choice_exit),
            flow: flag(&["flow"], defaults.flow),
            forward_only: flag(&["forwardOnly", "forward_only"], defaults.forward_only),
        }
    }
}

// ---------------------------------------------------------------------------
// Rule conditions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ConditionKind {
    Satisfied,
    ObjectiveStatusKnown,
    ObjectiveMeasureKnown,
    ObjectiveMeasureGreaterThan,
    ObjectiveMeasureLessThan,
    Completed,
    ActivityProgressKnown,
    ActivityIsActive,
    Attempted,
    NotAttempted,
    AttemptLimitExceeded,
    DurationLimitExceeded,
    OutsideAvailableTimeRange,
    Always,
    /// Unrecognized condition name; never holds.
    Unknown(String),
}

impl ConditionKind {
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "satisfied" => ConditionKind::Satisfied,
            "objectiveStatusKnown" => ConditionKind::ObjectiveStatusKnown,
            "objectiveMeasureKnown" => ConditionKind::ObjectiveMeasureKnown,
            "objectiveMeasureGreaterThan" => ConditionKind::ObjectiveMeasureGreaterThan,
            "objectiveMeasureLessThan" => ConditionKind::ObjectiveMeasureLessThan,
            "completed" => ConditionKind::Completed,
            "activityProgressKnown" | "progressKnown" => ConditionKind::ActivityProgressKnown,
            "activityIsActive" | "active" => ConditionKind::ActivityIsActive,
            "attempted" | "activityAttempted" => ConditionKind::Attempted,
            "notAttempted" | "activityNotAttempted" => ConditionKind::NotAttempted,
            "attemptLimitExceeded" => ConditionKind::AttemptLimitExceeded,
            "durationLimitExceeded" | "timeLimitExceeded" => ConditionKind::DurationLimitExceeded,
            "outsideAvailableTimeRange" => ConditionKind::OutsideAvailableTimeRange,
            "always" => ConditionKind::Always,
            other => ConditionKind::Unknown(other.to_string()),
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, ConditionKind::Unknown(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ConditionOperator {
    #[default]
    NoOp,
    Not,
}

impl ConditionOperator {
    pub fn parse(raw: &str) -> Self {
        if raw.trim().eq_ignore_ascii_case("not") {
            ConditionOperator::Not
        } else {
            ConditionOperator::NoOp
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Combination {
    #[default]
    All,
    Any,
}

impl Combination {
    pub fn parse(raw: &str) -> Self {
        if raw.trim().eq_ignore_ascii_case("any") {
            Combination::Any
        } else {
            Combination::All
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuleCondition {
    pub kind: ConditionKind,
    pub operator: ConditionOperator,
    /// Local objective the condition reads; `None` means the primary objective.
    pub referenced_objective: Option<String>,
    pub measure_threshold: f64,
}

impl RuleCondition {
    pub fn new(kind: ConditionKind) -> Self {
        Self {
            kind,
            operator: ConditionOperator::NoOp,
            referenced_objective: None,
            measure_threshold: 0.0,
        }
    }

    fn from_value(value: &Value, owner: &str, anomalies: &mut Vec<String>) -> Self {
        let Some(obj) = value.as_object() else {
            anomalies.push(format!("{owner}: rule condition is not an object"));
            return Self::new(ConditionKind::Unknown(value.to_string()));
        };
        let kind = lenient::field(obj, &["condition", "ruleCondition"])
            .and_then(lenient::str_of)
            .map(ConditionKind::parse)
            .unwrap_or_else(|| ConditionKind::Unknown(String::new()));
        if let ConditionKind::Unknown(raw) = &kind {
            anomalies.push(format!("{owner}: unrecognized rule condition '{raw}'"));
        }
        Self {
            kind,
            operator: lenient::field(obj, &["operator"])
                .and_then(lenient::str_of)
                .map(ConditionOperator::parse)
                .unwrap_or_default(),
            referenced_objective: lenient::field(obj, &["referencedObjective"])
                .and_then(lenient::str_of)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
            measure_threshold: lenient::field(obj, &["measureThreshold"])
                .and_then(lenient::f64_of)
                .unwrap_or(0.0),
        }
    }
}

fn parse_conditions(
    obj: &Map<String, Value>,
    owner: &str,
    anomalies: &mut Vec<String>,
) -> (Combination, Vec<RuleCondition>) {
    // Conditions may be a bare array or wrapped as
    // `{ conditionCombination, conditions: [...] }`.
    let mut combination = lenient::field(obj, &["conditionCombination", "combination"])
        .and_then(lenient::str_of)
        .map(Combination::parse)
        .unwrap_or_default();
    let mut list = lenient::field(obj, &["conditions", "ruleConditions", "rollupConditions"]);
    if let Some(inner) = list.and_then(Value::as_object) {
        if let Some(c) = lenient::field(inner, &["conditionCombination", "combination"])
            .and_then(lenient::str_of)
        {
            combination = Combination::parse(c);
        }
        list = lenient::field(inner, &["conditions", "ruleConditions", "rollupConditions"]);
    }
    let conditions = match list {
        Some(Value::Array(items)) => items
            .iter()
            .map(|c| RuleCondition::from_value(c, owner, anomalies))
            .collect(),
        Some(single @ Value::Object(_)) => vec![RuleCondition::from_value(single, owner, anomalies)],
        _ => Vec::new(),
    };
    (combination, conditions)
}

// ---------------------------------------------------------------------------
// Sequencing rules
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum RuleAction {
    Skip,
    Disabled,
    HiddenFromChoice,
    StopForwardTraversal,
    ExitParent,
    ExitAll,
    Retry,
    RetryAll,
    Continue,
    Previous,
    Exit,
    /// Unrecognized action; a rule carrying it never fires.
    Unknown(String),
}

impl RuleAction {
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "skip" => RuleAction::Skip,
            "disabled" => RuleAction::Disabled,
            "hiddenFromChoice" => RuleAction::HiddenFromChoice,
            "stopForwardTraversal" => RuleAction::StopForwardTraversal,
            "exitParent" => RuleAction::ExitParent,
            "exitAll" => RuleAction::ExitAll,
            "retry" => RuleAction::Retry,
            "retryAll" => RuleAction::RetryAll,
            "continue" => RuleAction::Continue,
            "previous" => RuleAction::Previous,
            "exit" => RuleAction::Exit,
            other => RuleAction::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            RuleAction::Skip => "skip",
            RuleAction::Disabled => "disabled",
            RuleAction::HiddenFromChoice => "hiddenFromChoice",
            RuleAction::StopForwardTraversal => "stopForwardTraversal",
            RuleAction::ExitParent => "exitParent",
            RuleAction::ExitAll => "exitAll",
            RuleAction::Retry => "retry",
            RuleAction::RetryAll => "retryAll",
            RuleAction::Continue => "continue",
            RuleAction::Previous => "previous",
            RuleAction::Exit => "exit",
            RuleAction::Unknown(raw) => raw,
        }
    }

    /// Whether the action is meaningful in a rule set of the given type.
    pub fn allowed_in(&self, rule_type: RuleType) -> bool {
        match rule_type {
            RuleType::PreCondition => matches!(
                self,
                RuleAction::Skip
                    | RuleAction::Disabled
                    | RuleAction::HiddenFromChoice
                    | RuleAction::StopForwardTraversal
            ),
            RuleType::PostCondition => matches!(
                self,
                RuleAction::ExitParent
                    | RuleAction::ExitAll
                    | RuleAction::Retry
                    | RuleAction::RetryAll
                    | RuleAction::Continue
                    | RuleAction::Previous
            ),
            RuleType::ExitCondition => matches!(self, RuleAction::Exit),
        }
    }
}

impl std::fmt::Display for RuleAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SequencingRule {
    pub combination: Combination,
    pub conditions: Vec<RuleCondition>,
    pub action: RuleAction,
}

impl SequencingRule {
    fn from_value(value: &Value, owner: &str, anomalies: &mut Vec<String>) -> Option<Self> {
        let Some(obj) = value.as_object() else {
            anomalies.push(format!("{owner}: dropped sequencing rule that is not an object"));
            return None;
        };
        let action = match lenient::field(obj, &["action", "ruleAction"]) {
            Some(Value::String(s)) => RuleAction::parse(s),
            Some(Value::Object(inner)) => lenient::field(inner, &["action"])
                .and_then(lenient::str_of)
                .map(RuleAction::parse)
                .unwrap_or_else(|| RuleAction::Unknown(String::new())),
            _ => RuleAction::Unknown(String::new()),
        };
        if let RuleAction::Unknown(raw) = &action {
            anomalies.push(format!("{owner}: unrecognized rule action '{raw}'"));
        }
        let (combination, conditions) = parse_conditions(obj, owner, anomalies);
        Some(Self {
            combination,
            conditions,
            action,
        })
    }
}

fn parse_rule_list(
    value: Option<&Value>,
    owner: &str,
    anomalies: &mut Vec<String>,
) -> Vec<SequencingRule> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| SequencingRule::from_value(v, owner, anomalies))
            .collect(),
        Some(single @ Value::Object(_)) => SequencingRule::from_value(single, owner, anomalies)
            .into_iter()
            .collect(),
        Some(Value::Null) | None => Vec::new(),
        Some(_) => {
            anomalies.push(format!("{owner}: rule list is not an array"));
            Vec::new()
        }
    }
}

// ---------------------------------------------------------------------------
// Rollup rules
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum RollupAction {
    Satisfied,
    NotSatisfied,
    Completed,
    Incomplete,
    Unknown(String),
}

impl RollupAction {
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "satisfied" => RollupAction::Satisfied,
            "notSatisfied" => RollupAction::NotSatisfied,
            "completed" => RollupAction::Completed,
            "incomplete" => RollupAction::Incomplete,
            other => RollupAction::Unknown(other.to_string()),
        }
    }

    pub fn is_objective(&self) -> bool {
        matches!(self, RollupAction::Satisfied | RollupAction::NotSatisfied)
    }

    pub fn is_progress(&self) -> bool {
        matches!(self, RollupAction::Completed | RollupAction::Incomplete)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ChildActivitySet {
    All,
    Any,
    None,
    AtLeastCount,
    AtLeastPercent,
    Unknown(String),
}

impl ChildActivitySet {
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "all" => ChildActivitySet::All,
            "any" => ChildActivitySet::Any,
            "none" => ChildActivitySet::None,
            "atLeastCount" => ChildActivitySet::AtLeastCount,
            "atLeastPercent" => ChildActivitySet::AtLeastPercent,
            other => ChildActivitySet::Unknown(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RollupRule {
    pub child_activity_set: ChildActivitySet,
    pub minimum_count: u32,
    /// Fraction in `[0, 1]`.
    pub minimum_percent: f64,
    pub combination: Combination,
    pub conditions: Vec<RuleCondition>,
    pub action: RollupAction,
}

impl RollupRule {
    fn from_value(value: &Value, owner: &str, anomalies: &mut Vec<String>) -> Option<Self> {
        let Some(obj) = value.as_object() else {
            anomalies.push(format!("{owner}: dropped rollup rule that is not an object"));
            return None;
        };
        let action = match lenient::field(obj, &["action", "rollupAction"]) {
            Some(Value::String(s)) => RollupAction::parse(s),
            Some(Value::Object(inner)) => lenient::field(inner, &["action"])
                .and_then(lenient::str_of)
                .map(RollupAction::parse)
                .unwrap_or_else(|| RollupAction::Unknown(String::new())),
            _ => RollupAction::Unknown(String::new()),
        };
        if let RollupAction::Unknown(raw) = &action {
            anomalies.push(format!("{owner}: unrecognized rollup action '{raw}'"));
        }
        let child_activity_set = lenient::field(obj, &["childActivitySet"])
            .and_then(lenient::str_of)
            .map(ChildActivitySet::parse)
            .unwrap_or(ChildActivitySet::All);
        let mut minimum_percent = lenient::field(obj, &["minimumPercent"])
            .and_then(lenient::f64_of)
            .unwrap_or(0.0);
        // Authored as 0..100 by some tools.
        if minimum_percent > 1.0 {
            minimum_percent /= 100.0;
        }
        let (combination, conditions) = parse_conditions(obj, owner, anomalies);
        Some(Self {
            child_activity_set,
            minimum_count: lenient::field(obj, &["minimumCount"])
                .and_then(lenient::u32_of)
                .unwrap_or(0),
            minimum_percent,
            combination,
            conditions,
            action,
        })
    }
}

// ---------------------------------------------------------------------------
// LimitConditions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LimitConditions {
    pub attempt_limit: Option<u32>,
    /// Seconds.
    pub attempt_absolute_duration_limit: Option<f64>,
    /// Seconds.
    pub activity_absolute_duration_limit: Option<f64>,
    pub begin_time_limit: Option<DateTime<Utc>>,
    pub end_time_limit: Option<DateTime<Utc>>,
}

impl LimitConditions {
    fn from_value(value: Option<&Value>, owner: &str, anomalies: &mut Vec<String>) -> Self {
        let Some(obj) = value.and_then(Value::as_object) else {
            return Self::default();
        };
        let duration = |keys: &[&str], anomalies: &mut Vec<String>| -> Option<f64> {
            let raw = lenient::field(obj, keys)?;
            let parsed = match raw {
                Value::Number(n) => n.as_f64(),
                Value::String(s) => parse_duration(s),
                _ => None,
            };
            if parsed.is_none() {
                anomalies.push(format!("{owner}: unreadable duration limit {raw}"));
            }
            parsed
        };
        let timestamp = |keys: &[&str], anomalies: &mut Vec<String>| -> Option<DateTime<Utc>> {
            let raw = lenient::field(obj, keys)?.as_str()?;
            match DateTime::parse_from_rfc3339(raw) {
                Ok(t) => Some(t.with_timezone(&Utc)),
                Err(_) => {
                    anomalies.push(format!("{owner}: unreadable time limit '{raw}'"));
                    None
                }
            }
        };
        Self {
            attempt_limit: lenient::field(obj, &["attemptLimit"])
                .and_then(lenient::u32_of)
                .filter(|n| *n > 0),
            attempt_absolute_duration_limit: duration(&["attemptAbsoluteDurationLimit"], anomalies),
            activity_absolute_duration_limit: duration(
                &["activityAbsoluteDurationLimit"],
                anomalies,
            ),
            begin_time_limit: timestamp(&["beginTimeLimit"], anomalies),
            end_time_limit: timestamp(&["endTimeLimit"], anomalies),
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

// ---------------------------------------------------------------------------
// RollupConsiderations
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum RequiredFor {
    #[default]
    Always,
    IfAttempted,
    IfNotSkipped,
    IfNotSuspended,
    Never,
}

impl RequiredFor {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(true) => Some(RequiredFor::Always),
            Value::Bool(false) => Some(RequiredFor::Never),
            Value::String(s) => match s.trim() {
                "always" | "true" => Some(RequiredFor::Always),
                "ifAttempted" => Some(RequiredFor::IfAttempted),
                "ifNotSkipped" => Some(RequiredFor::IfNotSkipped),
                "ifNotSuspended" => Some(RequiredFor::IfNotSuspended),
                "never" | "false" => Some(RequiredFor::Never),
                _ => None,
            },
            _ => None,
        }
    }
}

/// How an activity contributes to its parent's rollup.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RollupConsiderations {
    pub required_for_satisfied: RequiredFor,
    pub required_for_not_satisfied: RequiredFor,
    pub required_for_completed: RequiredFor,
    pub required_for_incomplete: RequiredFor,
    pub measure_weight: f64,
    pub rollup_objective_satisfied: bool,
    pub rollup_progress_completion: bool,
}

impl Default for RollupConsiderations {
    fn default() -> Self {
        Self {
            required_for_satisfied: RequiredFor::Always,
            required_for_not_satisfied: RequiredFor::Always,
            required_for_completed: RequiredFor::Always,
            required_for_incomplete: RequiredFor::Always,
            measure_weight: 1.0,
            rollup_objective_satisfied: true,
            rollup_progress_completion: true,
        }
    }
}

impl RollupConsiderations {
    fn apply_value(&mut self, value: Option<&Value>, owner: &str, anomalies: &mut Vec<String>) {
        let Some(obj) = value.and_then(Value::as_object) else {
            return;
        };
        let mut read = |keys: &[&str], slot: &mut RequiredFor| {
            if let Some(raw) = lenient::field(obj, keys) {
                match RequiredFor::from_value(raw) {
                    Some(v) => *slot = v,
                    None => anomalies.push(format!(
                        "{owner}: unrecognized rollup consideration {raw}; using 'always'"
                    )),
                }
            }
        };
        read(&["requiredForSatisfied"], &mut self.required_for_satisfied);
        read(&["requiredForNotSatisfied"], &mut self.required_for_not_satisfied);
        read(&["requiredForCompleted"], &mut self.required_for_completed);
        read(&["requiredForIncomplete"], &mut self.required_for_incomplete);
        if let Some(w) = lenient::field(obj, &["measureWeight", "objectiveMeasureWeight"])
            .and_then(lenient::f64_of)
        {
            self.measure_weight = w;
        }
    }
}

// ---------------------------------------------------------------------------
// Objectives
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObjectiveMapInfo {
    pub target_objective_id: String,
    pub read_satisfied_status: bool,
    pub read_normalized_measure: bool,
    pub write_satisfied_status: bool,
    pub write_normalized_measure: bool,
}

impl ObjectiveMapInfo {
    fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        let target = lenient::field(obj, &["targetObjectiveID", "targetObjectiveId"])
            .and_then(lenient::str_of)
            .filter(|s| !s.is_empty())?;
        let flag = |keys: &[&str], fallback: bool| {
            lenient::field(obj, keys)
                .and_then(lenient::bool_of)
                .unwrap_or(fallback)
        };
        Some(Self {
            target_objective_id: target.to_string(),
            read_satisfied_status: flag(&["readSatisfiedStatus"], true),
            read_normalized_measure: flag(&["readNormalizedMeasure"], true),
            write_satisfied_status: flag(&["writeSatisfiedStatus"], false),
            write_normalized_measure: flag(&["writeNormalizedMeasure"], false),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObjectiveDefinition {
    pub id: String,
    pub satisfied_by_measure: bool,
    pub min_normalized_measure: f64,
    pub map_info: Vec<ObjectiveMapInfo>,
}

impl ObjectiveDefinition {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            satisfied_by_measure: false,
            min_normalized_measure: 1.0,
            map_info: Vec::new(),
        }
    }

    fn from_value(value: &Value, fallback_id: &str, owner: &str, anomalies: &mut Vec<String>) -> Self {
        let Some(obj) = value.as_object() else {
            anomalies.push(format!("{owner}: objective definition is not an object"));
            return Self::new(fallback_id);
        };
        let id = lenient::field(obj, &["objectiveID", "objectiveId", "id"])
            .and_then(lenient::str_of)
            .filter(|s| !s.is_empty())
            .unwrap_or(fallback_id);
        let map_info = match lenient::field(obj, &["mapInfo"]) {
            Some(Value::Array(items)) => items.iter().filter_map(ObjectiveMapInfo::from_value).collect(),
            Some(single @ Value::Object(_)) => {
                ObjectiveMapInfo::from_value(single).into_iter().collect()
            }
            _ => Vec::new(),
        };
        Self {
            id: id.to_string(),
            satisfied_by_measure: lenient::field(obj, &["satisfiedByMeasure"])
                .and_then(lenient::bool_of)
                .unwrap_or(false),
            min_normalized_measure: lenient::field(obj, &["minNormalizedMeasure"])
                .and_then(lenient::f64_of)
                .unwrap_or(1.0),
            map_info,
        }
    }

    pub fn reads_from(&self) -> impl Iterator<Item = &ObjectiveMapInfo> {
        self.map_info
            .iter()
            .filter(|m| m.read_satisfied_status || m.read_normalized_measure)
    }

    pub fn writes_to(&self) -> impl Iterator<Item = &ObjectiveMapInfo> {
        self.map_info
            .iter()
            .filter(|m| m.write_satisfied_status || m.write_normalized_measure)
    }
}

// ---------------------------------------------------------------------------
// DeliveryControls
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DeliveryControls {
    pub tracked: bool,
    pub completion_set_by_content: bool,
    pub objective_set_by_content: bool,
}

impl Default for DeliveryControls {
    fn default() -> Self {
        Self {
            tracked: true,
            completion_set_by_content: false,
            objective_set_by_content: false,
        }
    }
}

// ---------------------------------------------------------------------------
// SequencingDefinition
// ---------------------------------------------------------------------------

/// Per-activity sequencing data, fixed once the tree is built.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SequencingDefinition {
    pub control_mode: ControlMode,
    pub pre_condition_rules: Vec<SequencingRule>,
    pub post_condition_rules: Vec<SequencingRule>,
    pub exit_condition_rules: Vec<SequencingRule>,
    pub rollup_rules: Vec<RollupRule>,
    pub limit_conditions: LimitConditions,
    pub rollup_considerations: RollupConsiderations,
    pub primary_objective: ObjectiveDefinition,
    pub objectives: Vec<ObjectiveDefinition>,
    pub delivery_controls: DeliveryControls,
}

pub const PRIMARY_OBJECTIVE_ID: &str = "primary";

impl SequencingDefinition {
    pub fn with_control_mode(control_mode: ControlMode) -> Self {
        Self {
            control_mode,
            pre_condition_rules: Vec::new(),
            post_condition_rules: Vec::new(),
            exit_condition_rules: Vec::new(),
            rollup_rules: Vec::new(),
            limit_conditions: LimitConditions::default(),
            rollup_considerations: RollupConsiderations::default(),
            primary_objective: ObjectiveDefinition::new(PRIMARY_OBJECTIVE_ID),
            objectives: Vec::new(),
            delivery_controls: DeliveryControls::default(),
        }
    }

    /// Read a `sequencing` block. Malformed parts fall back to defaults and
    /// are reported in `anomalies`; this never fails.
    pub fn from_value(
        value: Option<&Value>,
        defaults: ControlMode,
        owner: &str,
        anomalies: &mut Vec<String>,
    ) -> Self {
        let mut def = Self::with_control_mode(defaults);
        let obj = match value {
            None | Some(Value::Null) => return def,
            Some(Value::Object(obj)) => obj,
            Some(_) => {
                anomalies.push(format!(
                    "{owner}: sequencing block is not an object; using defaults"
                ));
                return def;
            }
        };

        def.control_mode = ControlMode::from_value(lenient::field(obj, &["controlMode"]), defaults);

        if let Some(rules) = lenient::field(obj, &["sequencingRules"]).and_then(Value::as_object) {
            def.pre_condition_rules = parse_rule_list(
                lenient::field(rules, &["preConditionRules", "preConditionRule"]),
                owner,
                anomalies,
            );
            def.exit_condition_rules = parse_rule_list(
                lenient::field(rules, &["exitConditionRules", "exitConditionRule"]),
                owner,
                anomalies,
            );
            def.post_condition_rules = parse_rule_list(
                lenient::field(rules, &["postConditionRules", "postConditionRule"]),
                owner,
                anomalies,
            );
        }

        def.limit_conditions =
            LimitConditions::from_value(lenient::field(obj, &["limitConditions"]), owner, anomalies);

        if let Some(rollup) = lenient::field(obj, &["rollupRules"]) {
            match rollup {
                Value::Object(r) => {
                    let flag = |keys: &[&str], fallback: bool| {
                        lenient::field(r, keys)
                            .and_then(lenient::bool_of)
                            .unwrap_or(fallback)
                    };
                    let rc = &mut def.rollup_considerations;
                    rc.rollup_objective_satisfied = flag(&["rollupObjectiveSatisfied"], true);
                    rc.rollup_progress_completion = flag(&["rollupProgressCompletion"], true);
                    if let Some(w) = lenient::field(r, &["objectiveMeasureWeight"])
                        .and_then(lenient::f64_of)
                    {
                        rc.measure_weight = w;
                    }
                    def.rollup_rules = parse_rollup_list(
                        lenient::field(r, &["rules", "rollupRule", "rollupRules"]),
                        owner,
                        anomalies,
                    );
                }
                Value::Array(_) => {
                    def.rollup_rules = parse_rollup_list(Some(rollup), owner, anomalies);
                }
                _ => anomalies.push(format!("{owner}: rollupRules is not an object")),
            }
        }

        def.rollup_considerations.apply_value(
            lenient::field(obj, &["rollupConsiderations"]),
            owner,
            anomalies,
        );

        if let Some(objectives) = lenient::field(obj, &["objectives"]).and_then(Value::as_object) {
            if let Some(primary) = lenient::field(objectives, &["primaryObjective"]) {
                def.primary_objective =
                    ObjectiveDefinition::from_value(primary, PRIMARY_OBJECTIVE_ID, owner, anomalies);
            }
            if let Some(Value::Array(items)) = lenient::field(objectives, &["objectives", "objective"]) {
                def.objectives = items
                    .iter()
                    .enumerate()
                    .map(|(i, v)| {
                        ObjectiveDefinition::from_value(v, &format!("objective_{i}"), owner, anomalies)
                    })
                    .collect();
            }
        }

        if let Some(dc) = lenient::field(obj, &["deliveryControls"]).and_then(Value::as_object) {
            let flag = |keys: &[&str], fallback: bool| {
                lenient::field(dc, keys)
                    .and_then(lenient::bool_of)
                    .unwrap_or(fallback)
            };
            def.delivery_controls = DeliveryControls {
                tracked: flag(&["tracked"], true),
                completion_set_by_content: flag(&["completionSetByContent"], false),
                objective_set_by_content: flag(&["objectiveSetByContent"], false),
            };
        }

        def
    }

    pub fn rules(&self, rule_type: RuleType) -> &[SequencingRule] {
        match rule_type {
            RuleType::PreCondition => &self.pre_condition_rules,
            RuleType::PostCondition => &self.post_condition_rules,
            RuleType::ExitCondition => &self.exit_condition_rules,
        }
    }

    /// Look up an objective by local id; `None` selects the primary objective.
    pub fn objective(&self, id: Option<&str>) -> Option<&ObjectiveDefinition> {
        match id {
            None => Some(&self.primary_objective),
            Some(id) if id == self.primary_objective.id => Some(&self.primary_objective),
            Some(id) => self.objectives.iter().find(|o| o.id == id),
        }
    }

    pub fn all_objectives(&self) -> impl Iterator<Item = &ObjectiveDefinition> {
        std::iter::once(&self.primary_objective).chain(self.objectives.iter())
    }
}

fn parse_rollup_list(
    value: Option<&Value>,
    owner: &str,
    anomalies: &mut Vec<String>,
) -> Vec<RollupRule> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| RollupRule::from_value(v, owner, anomalies))
            .collect(),
        Some(single @ Value::Object(_)) => RollupRule::from_value(single, owner, anomalies)
            .into_iter()
            .collect(),
        _ => Vec::new(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
