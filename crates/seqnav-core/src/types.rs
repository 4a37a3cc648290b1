use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// CompletionStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionStatus {
    #[default]
    Unknown,
    Completed,
    Incomplete,
}

impl CompletionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            CompletionStatus::Unknown => "unknown",
            CompletionStatus::Completed => "completed",
            CompletionStatus::Incomplete => "incomplete",
        }
    }

    pub fn is_known(self) -> bool {
        !matches!(self, CompletionStatus::Unknown)
    }
}

impl fmt::Display for CompletionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// SuccessStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuccessStatus {
    #[default]
    Unknown,
    Passed,
    Failed,
}

impl SuccessStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SuccessStatus::Unknown => "unknown",
            SuccessStatus::Passed => "passed",
            SuccessStatus::Failed => "failed",
        }
    }

    pub fn is_known(self) -> bool {
        !matches!(self, SuccessStatus::Unknown)
    }

    /// Objective satisfaction view of the status: `None` while unknown.
    pub fn satisfied(self) -> Option<bool> {
        match self {
            SuccessStatus::Unknown => None,
            SuccessStatus::Passed => Some(true),
            SuccessStatus::Failed => Some(false),
        }
    }

    pub fn from_satisfied(satisfied: Option<bool>) -> Self {
        match satisfied {
            None => SuccessStatus::Unknown,
            Some(true) => SuccessStatus::Passed,
            Some(false) => SuccessStatus::Failed,
        }
    }
}

impl fmt::Display for SuccessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// SessionPhase
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    #[default]
    NotStarted,
    Active,
    Suspended,
    Terminated,
}

impl SessionPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionPhase::NotStarted => "not_started",
            SessionPhase::Active => "active",
            SessionPhase::Suspended => "suspended",
            SessionPhase::Terminated => "terminated",
        }
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// NavigationRequest
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NavigationRequest {
    Start,
    ResumeAll,
    Continue,
    Previous,
    Choice,
    Jump,
    Exit,
    ExitAll,
    SuspendAll,
    Abandon,
    AbandonAll,
    Retry,
    RetryAll,
}

impl NavigationRequest {
    pub fn all() -> &'static [NavigationRequest] {
        &[
            NavigationRequest::Start,
            NavigationRequest::ResumeAll,
            NavigationRequest::Continue,
            NavigationRequest::Previous,
            NavigationRequest::Choice,
            NavigationRequest::Jump,
            NavigationRequest::Exit,
            NavigationRequest::ExitAll,
            NavigationRequest::SuspendAll,
            NavigationRequest::Abandon,
            NavigationRequest::AbandonAll,
            NavigationRequest::Retry,
            NavigationRequest::RetryAll,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            NavigationRequest::Start => "start",
            NavigationRequest::ResumeAll => "resumeAll",
            NavigationRequest::Continue => "continue",
            NavigationRequest::Previous => "previous",
            NavigationRequest::Choice => "choice",
            NavigationRequest::Jump => "jump",
            NavigationRequest::Exit => "exit",
            NavigationRequest::ExitAll => "exitAll",
            NavigationRequest::SuspendAll => "suspendAll",
            NavigationRequest::Abandon => "abandon",
            NavigationRequest::AbandonAll => "abandonAll",
            NavigationRequest::Retry => "retry",
            NavigationRequest::RetryAll => "retryAll",
        }
    }

    /// Requests that name a target activity.
    pub fn requires_target(self) -> bool {
        matches!(self, NavigationRequest::Choice | NavigationRequest::Jump)
    }
}

impl fmt::Display for NavigationRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for NavigationRequest {
    type Err = crate::error::SeqError;

    /// Accepts the camelCase vocabulary as well as snake_case and
    /// kebab-case spellings (`exit_all`, `suspend-all`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .flat_map(char::to_lowercase)
            .collect();
        match normalized.as_str() {
            "start" => Ok(NavigationRequest::Start),
            "resumeall" => Ok(NavigationRequest::ResumeAll),
            "continue" => Ok(NavigationRequest::Continue),
            "previous" => Ok(NavigationRequest::Previous),
            "choice" => Ok(NavigationRequest::Choice),
            "jump" => Ok(NavigationRequest::Jump),
            "exit" => Ok(NavigationRequest::Exit),
            "exitall" => Ok(NavigationRequest::ExitAll),
            "suspendall" => Ok(NavigationRequest::SuspendAll),
            "abandon" => Ok(NavigationRequest::Abandon),
            "abandonall" => Ok(NavigationRequest::AbandonAll),
            "retry" => Ok(NavigationRequest::Retry),
            "retryall" => Ok(NavigationRequest::RetryAll),
            _ => Err(crate::error::SeqError::InvalidRequestType(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// RuleType
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleType {
    PreCondition,
    PostCondition,
    ExitCondition,
}

impl RuleType {
    pub fn as_str(self) -> &'static str {
        match self {
            RuleType::PreCondition => "pre_condition",
            RuleType::PostCondition => "post_condition",
            RuleType::ExitCondition => "exit_condition",
        }
    }
}

impl fmt::Display for RuleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn request_roundtrip() {
        for req in NavigationRequest::all() {
            assert_eq!(NavigationRequest::from_str(req.as_str()).unwrap(), *req);
        }
    }

    #[test]
    fn request_accepts_alternate_spellings() {
        assert_eq!(
            NavigationRequest::from_str("exit_all").unwrap(),
            NavigationRequest::ExitAll
        );
        assert_eq!(
            NavigationRequest::from_str("Suspend-All").unwrap(),
            NavigationRequest::SuspendAll
        );
    }

    #[test]
    fn unknown_request_is_rejected() {
        let err = NavigationRequest::from_str("teleport").unwrap_err();
        assert!(err.to_string().contains("Invalid navigation request type"));
        assert!(NavigationRequest::from_str("").is_err());
    }

    #[test]
    fn only_choice_and_jump_need_targets() {
        let targeted: Vec<_> = NavigationRequest::all()
            .iter()
            .filter(|r| r.requires_target())
            .collect();
        assert_eq!(targeted.len(), 2);
    }

    #[test]
    fn success_status_satisfaction_view() {
        assert_eq!(SuccessStatus::Passed.satisfied(), Some(true));
        assert_eq!(SuccessStatus::Unknown.satisfied(), None);
        assert_eq!(SuccessStatus::from_satisfied(Some(false)), SuccessStatus::Failed);
    }
}
