use seqnav_core::rollup;
use seqnav_core::types::CompletionStatus;
use seqnav_core::{EngineConfig, NavigationRequest, SequencingEngine, SessionPhase};
use serde_json::{json, Value};
use std::sync::Arc;
use std::thread;

fn shape(items: Value) -> Value {
    json!({
        "organizations": {
            "default": "org",
            "organizations": [{ "identifier": "org", "title": "Course", "items": items }]
        },
        "resources": [{ "identifier": "r1", "scormType": "sco", "href": "index.html" }]
    })
}

fn two_leaves() -> Value {
    shape(json!([
        { "identifier": "A", "identifierref": "r1" },
        { "identifier": "B", "identifierref": "r1" }
    ]))
}

/// Depth 3, five children per cluster: 125 leaves.
fn wide_tree() -> Value {
    let leaf = |p: &str, i: usize| json!({ "identifier": format!("{p}_{i}") });
    let items: Vec<Value> = (0..5)
        .map(|a| {
            let a_id = format!("m{a}");
            let children: Vec<Value> = (0..5)
                .map(|b| {
                    let b_id = format!("{a_id}_{b}");
                    let leaves: Vec<Value> = (0..5).map(|c| leaf(&b_id, c)).collect();
                    json!({ "identifier": b_id, "items": leaves })
                })
                .collect();
            json!({ "identifier": a_id, "items": children })
        })
        .collect();
    shape(Value::Array(items))
}

fn started(tree: Value) -> SequencingEngine {
    let engine = SequencingEngine::default();
    assert!(engine.initialize(&tree).success);
    assert!(engine.process_navigation("start", None).success);
    engine
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

#[test]
fn requests_without_an_active_session_fail_as_not_active() {
    let engine = SequencingEngine::default();
    for request in NavigationRequest::all() {
        let outcome = engine.process_navigation(request.as_str(), Some("A"));
        assert!(!outcome.success);
        assert!(outcome.reason.unwrap().contains("not active"), "{request}");
    }
}

#[test]
fn terminated_session_rejects_navigation() {
    let engine = started(two_leaves());
    assert!(engine.terminate_sequencing().success);
    for request in ["start", "continue", "previous", "exit", "suspendAll", "resumeAll", "teleport"] {
        let outcome = engine.process_navigation(request, None);
        assert!(!outcome.success);
        assert!(outcome.reason.unwrap().contains("not active"), "{request}");
    }
}

#[test]
fn unknown_request_types_are_rejected() {
    let engine = started(two_leaves());
    for request in ["", "forward", "CONTINUE!", "choose", "exit all please"] {
        let outcome = engine.process_navigation(request, None);
        assert!(!outcome.success);
        assert!(
            outcome.reason.unwrap().contains("Invalid navigation request type"),
            "{request:?}"
        );
    }
    assert_eq!(engine.get_sequencing_state().current_activity.as_deref(), Some("A"));
}

#[test]
fn initialize_rejects_unusable_shapes_with_codes() {
    let engine = SequencingEngine::default();
    let cases = [
        (Value::Null, "PARSE_EMPTY_INPUT"),
        (json!({}), "PARSE_EMPTY_INPUT"),
        (json!(42), "PARSE_XML_ERROR"),
        (json!({ "organizations": "nope" }), "PARSE_XML_ERROR"),
        (shape(json!([])), "PARSE_VALIDATION_ERROR"),
    ];
    for (input, code) in cases {
        let outcome = engine.initialize(&input);
        assert!(!outcome.success, "{input}");
        assert_eq!(outcome.error_code.as_deref(), Some(code), "{input}");
    }
    let empty = engine.initialize(&shape(json!([])));
    assert!(empty.reason.unwrap().contains("No items in default organization"));
}

// ---------------------------------------------------------------------------
// Navigation
// ---------------------------------------------------------------------------

#[test]
fn previous_right_after_start_names_previous() {
    let engine = started(two_leaves());
    let outcome = engine.process_navigation("previous", None);
    assert!(!outcome.success);
    assert!(outcome.reason.unwrap().to_lowercase().contains("previous"));
}

#[test]
fn previous_under_forward_only_names_previous() {
    let tree = json!({
        "organizations": { "organizations": [{
            "identifier": "org",
            "sequencing": { "controlMode": { "forwardOnly": true } },
            "items": [{ "identifier": "A" }, { "identifier": "B" }]
        }]}
    });
    let engine = started(tree);
    assert!(engine.process_navigation("continue", None).success);
    let outcome = engine.process_navigation("previous", None);
    assert!(!outcome.success);
    assert!(outcome.reason.unwrap().to_lowercase().contains("previous"));
}

#[test]
fn choice_needs_a_current_activity_and_an_existing_target() {
    let engine = SequencingEngine::default();
    engine.initialize(&two_leaves());
    let outcome = engine.process_navigation("choice", Some("B"));
    assert!(!outcome.success);
    assert_eq!(outcome.reason.as_deref(), Some("No current activity"));

    engine.process_navigation("start", None);
    let outcome = engine.process_navigation("choice", Some("Z"));
    assert!(!outcome.success);
    assert!(outcome.reason.unwrap().contains("not found"));

    let outcome = engine.process_navigation("choice", Some("B"));
    assert!(outcome.success);
    assert_eq!(outcome.current_activity.as_deref(), Some("B"));
}

#[test]
fn wide_tree_start_and_ten_continues() {
    let engine = SequencingEngine::default();
    assert!(engine.initialize(&wide_tree()).success);
    let state = engine.get_sequencing_state();
    assert_eq!(state.activity_tree_stats.total_activities, 1 + 5 + 25 + 125);
    assert_eq!(state.activity_tree_stats.leaf_count, 125);
    assert_eq!(state.activity_tree_stats.max_depth, 3);

    assert!(engine.process_navigation("start", None).success);
    for _ in 0..10 {
        assert!(engine.process_navigation("continue", None).success);
    }
    let state = engine.get_sequencing_state();
    assert_eq!(state.current_activity.as_deref(), Some("m0_2_0"));
}

#[test]
fn continuing_past_the_last_leaf_terminates_cleanly() {
    let engine = started(two_leaves());
    let mut successes = 0;
    for _ in 0..10 {
        if engine.process_navigation("continue", None).success {
            successes += 1;
        }
    }
    assert_eq!(successes, 1);
    let state = engine.get_sequencing_state();
    assert_eq!(state.current_activity.as_deref(), Some("B"));
    assert_eq!(state.session_phase, SessionPhase::Active);
}

#[test]
fn circular_item_reference_still_initializes() {
    let cyclic = shape(json!([
        { "identifier": "A", "items": [
            { "identifier": "B", "items": [{ "identifier": "A" }] }
        ]},
        { "identifier": "C" }
    ]));
    let engine = SequencingEngine::default();
    let first = engine.initialize(&cyclic);
    assert!(first.success);
    assert!(!first.anomalies.is_empty());
    let again = engine.initialize(&cyclic);
    assert!(again.success);
    assert!(engine.process_navigation("start", None).success);
}

#[test]
fn suspend_and_resume_round_trip() {
    let engine = started(two_leaves());
    engine.process_navigation("continue", None);
    let outcome = engine.process_navigation("suspendAll", None);
    assert!(outcome.success);
    assert!(outcome.suspended);
    assert_eq!(engine.get_sequencing_state().session_phase, SessionPhase::Suspended);

    let outcome = engine.process_navigation("resumeAll", None);
    assert!(outcome.success);
    assert_eq!(outcome.current_activity.as_deref(), Some("B"));
    assert_eq!(engine.get_sequencing_state().session_phase, SessionPhase::Active);
}

// ---------------------------------------------------------------------------
// Progress and rollup
// ---------------------------------------------------------------------------

#[test]
fn progress_updates_never_throw() {
    let engine = started(two_leaves());
    let patches = [
        json!({ "completed": "yes" }),
        json!({ "completed": 17, "measure": f64::MAX }),
        json!({ "measure": "Infinity" }),
        json!({ "measure": -3.5, "satisfied": [1, 2] }),
        json!({ "completed": null, "satisfied": { "deep": true } }),
        json!("not even an object"),
        json!([]),
    ];
    for patch in patches {
        let outcome = engine.update_activity_progress("A", &patch);
        assert!(outcome.success, "{patch}");
    }
    let missing = engine.update_activity_progress("ghost", &json!({ "completed": true }));
    assert!(!missing.success);
    assert!(missing.reason.unwrap().contains("not found"));
}

#[test]
fn both_leaves_completed_rolls_up_to_root() {
    let engine = started(two_leaves());
    engine.update_activity_progress("A", &json!({ "completion_status": "completed" }));
    engine.update_activity_progress("B", &json!({ "completion_status": "completed" }));
    let root_completion = engine
        .with_session(|s| {
            let root = s.tree().root();
            s.tracking().record(root).completion_status
        })
        .unwrap();
    assert_eq!(root_completion, CompletionStatus::Completed);
}

#[test]
fn rollup_twice_is_idempotent() {
    let engine = started(two_leaves());
    engine.update_activity_progress("A", &json!({ "completed": true, "measure": 0.4 }));
    engine
        .with_session(|s| {
            let first = s.rollup_from("A").unwrap();
            let after_first = s.tracking().clone();
            let second = s.rollup_from("A").unwrap();
            assert!(first.is_empty());
            assert!(second.is_empty());
            assert_eq!(s.tracking(), &after_first);
        })
        .unwrap();
}

#[test]
fn rollup_function_reports_no_change_on_second_run() {
    let config = EngineConfig::default();
    let tree = seqnav_core::ActivityTree::build(&two_leaves(), &config).unwrap();
    let mut tracking = seqnav_core::tracking::TrackingState::new(&tree);
    let a = tree.id_of("A").unwrap();
    tracking.record_mut(a).completion_status = CompletionStatus::Completed;
    let now = chrono::Utc::now();
    assert_eq!(rollup::rollup(&tree, &mut tracking, a, now), vec![tree.root()]);
    assert!(rollup::rollup(&tree, &mut tracking, a, now).is_empty());
}

// ---------------------------------------------------------------------------
// Concurrency
// ---------------------------------------------------------------------------

#[test]
fn concurrent_starts_have_one_winner() {
    let engine = Arc::new(SequencingEngine::default());
    assert!(engine.initialize(&two_leaves()).success);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || engine.process_navigation("start", None).success)
        })
        .collect();
    let wins = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|won| *won)
        .count();
    assert_eq!(wins, 1);

    let state = engine.get_sequencing_state();
    assert_eq!(state.session_phase, SessionPhase::Active);
    assert_eq!(state.current_activity.as_deref(), Some("A"));
    assert_eq!(state.activity_tree_stats.attempted_count, 2);
}

#[test]
fn independent_engines_run_in_parallel() {
    let handles: Vec<_> = (0..4)
        .map(|_| {
            thread::spawn(|| {
                let engine = started(two_leaves());
                engine.process_navigation("continue", None).current_activity
            })
        })
        .collect();
    for h in handles {
        assert_eq!(h.join().unwrap().as_deref(), Some("B"));
    }
}
