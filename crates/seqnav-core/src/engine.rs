//! The caller-facing surface: one engine holds at most one session.
//!
//! Operations never return `Err`. Failures come back as outcomes with
//! `success: false`, a `reason` and a stable `error_code`, so a caller's
//! control loop can inspect them and carry on. Calls are serialized by a
//! mutex; the engine is `Send + Sync` and can be shared behind an `Arc`.

use crate::config::EngineConfig;
use crate::error::{Result, SeqError};
use crate::progress::ProgressPatch;
use crate::session::{AvailableNavigation, SequencingState, Session};
use crate::snapshot::SessionSnapshot;
use crate::tree::ActivityTree;
use crate::types::NavigationRequest;
use serde::Serialize;
use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct InitOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub anomalies: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NavigationOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_activity: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    /// IMS exception code, for sequencing failures.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exception: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub ended: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub suspended: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProgressOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub applied: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ignored: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TerminateOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

fn failure(e: &SeqError) -> (Option<String>, Option<String>) {
    (Some(e.to_string()), Some(e.code().to_string()))
}

// ---------------------------------------------------------------------------
// SequencingEngine
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct SequencingEngine {
    config: EngineConfig,
    session: Mutex<Option<Session>>,
}

impl SequencingEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            session: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// A panic inside one call must not lock the session out for good;
    /// every operation leaves the session consistent before it can panic.
    fn lock(&self) -> MutexGuard<'_, Option<Session>> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Build a tree from `shape` and start a new session on it, replacing
    /// any existing one. When the shape is unusable the prior session is
    /// kept.
    pub fn initialize(&self, shape: &Value) -> InitOutcome {
        match ActivityTree::build(shape, &self.config) {
            Ok(tree) => {
                let anomalies = tree.anomalies().to_vec();
                let session = Session::new(Arc::new(tree), self.config.clone());
                let session_id = session.id();
                *self.lock() = Some(session);
                InitOutcome {
                    success: true,
                    session_id: Some(session_id),
                    anomalies,
                    ..InitOutcome::default()
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, code = e.code(), "initialize failed");
                let (reason, error_code) = failure(&e);
                InitOutcome {
                    success: false,
                    reason,
                    error_code,
                    ..InitOutcome::default()
                }
            }
        }
    }

    /// Rebuild the tree from `shape` and continue the session captured in
    /// `snapshot`.
    pub fn resume_from(&self, shape: &Value, snapshot: SessionSnapshot) -> InitOutcome {
        match ActivityTree::build(shape, &self.config) {
            Ok(tree) => {
                let anomalies = tree.anomalies().to_vec();
                let session = Session::restore(Arc::new(tree), self.config.clone(), snapshot);
                let session_id = session.id();
                *self.lock() = Some(session);
                InitOutcome {
                    success: true,
                    session_id: Some(session_id),
                    anomalies,
                    ..InitOutcome::default()
                }
            }
            Err(e) => {
                let (reason, error_code) = failure(&e);
                InitOutcome {
                    success: false,
                    reason,
                    error_code,
                    ..InitOutcome::default()
                }
            }
        }
    }

    /// Process a navigation request given by name (`"continue"`,
    /// `"suspendAll"`, ...). `target` is required for `choice` and `jump`.
    pub fn process_navigation(&self, request: &str, target: Option<&str>) -> NavigationOutcome {
        let mut guard = self.lock();
        let result = match guard.as_mut() {
            Some(session) => session
                .process_str(request, target)
                .map(|effect| (effect, session.current_activity().map(str::to_string))),
            None => Err(SeqError::SessionNotActive),
        };
        match result {
            Ok((effect, current_activity)) => NavigationOutcome {
                success: true,
                current_activity,
                ended: effect.ended,
                suspended: effect.suspended,
                ..NavigationOutcome::default()
            },
            Err(e) => {
                let (reason, error_code) = failure(&e);
                NavigationOutcome {
                    success: false,
                    current_activity: guard
                        .as_ref()
                        .and_then(|s| s.current_activity().map(str::to_string)),
                    reason,
                    error_code,
                    exception: e.exception_code().map(str::to_string),
                    ..NavigationOutcome::default()
                }
            }
        }
    }

    /// Apply a loosely typed progress patch (a JSON object) to an activity.
    pub fn update_activity_progress(&self, activity: &str, patch: &Value) -> ProgressOutcome {
        let patch = ProgressPatch::from_value(patch);
        let result = match self.lock().as_mut() {
            Some(session) => session.update_progress(activity, &patch),
            None => Err(SeqError::SessionNotActive),
        };
        match result {
            Ok(report) => ProgressOutcome {
                success: true,
                applied: report.applied,
                ignored: report.ignored,
                ..ProgressOutcome::default()
            },
            Err(e) => {
                let (reason, error_code) = failure(&e);
                ProgressOutcome {
                    success: false,
                    reason,
                    error_code,
                    ..ProgressOutcome::default()
                }
            }
        }
    }

    pub fn get_sequencing_state(&self) -> SequencingState {
        self.lock()
            .as_ref()
            .map_or_else(SequencingState::not_started, Session::state)
    }

    pub fn available_navigation(&self) -> AvailableNavigation {
        self.lock()
            .as_ref()
            .map(Session::available_navigation)
            .unwrap_or_default()
    }

    pub fn is_request_valid(&self, request: NavigationRequest, target: Option<&str>) -> bool {
        self.lock()
            .as_ref()
            .is_some_and(|s| s.is_request_valid(request, target))
    }

    /// End the session. The terminated session stays in place so its state
    /// can still be read; every later request is rejected.
    pub fn terminate_sequencing(&self) -> TerminateOutcome {
        let result = match self.lock().as_mut() {
            Some(session) => session.terminate(),
            None => Err(SeqError::SessionNotActive),
        };
        match result {
            Ok(()) => TerminateOutcome {
                success: true,
                reason: None,
            },
            Err(e) => TerminateOutcome {
                success: false,
                reason: Some(e.to_string()),
            },
        }
    }

    pub fn snapshot(&self) -> Result<SessionSnapshot> {
        self.lock()
            .as_ref()
            .map(Session::snapshot)
            .ok_or(SeqError::SessionNotActive)
    }

    /// Run `f` against the live session, if there is one.
    pub fn with_session<T>(&self, f: impl FnOnce(&mut Session) -> T) -> Option<T> {
        self.lock().as_mut().map(f)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
