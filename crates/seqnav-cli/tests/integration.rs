#![allow(deprecated)]
use assert_cmd::Command;
use predicates::prelude::*;
use std::path::PathBuf;
use tempfile::TempDir;

fn seqnav(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("seqnav").unwrap();
    cmd.current_dir(dir.path())
        .env("SEQNAV_CONFIG", dir.path().join("seqnav.yaml"))
        .env_remove("RUST_LOG");
    cmd
}

fn write_tree(dir: &TempDir) -> PathBuf {
    let tree = serde_json::json!({
        "organizations": {
            "default": "course",
            "organizations": [{
                "identifier": "course",
                "title": "Safety Course",
                "items": [
                    { "identifier": "intro", "title": "Introduction", "identifierref": "r_intro" },
                    { "identifier": "module", "title": "Module", "items": [
                        { "identifier": "lesson1", "title": "Lesson 1" },
                        { "identifier": "lesson2", "title": "Lesson 2" }
                    ]}
                ]
            }]
        },
        "resources": [{ "identifier": "r_intro", "scormType": "sco", "href": "intro/index.html" }]
    });
    let path = dir.path().join("tree.json");
    std::fs::write(&path, serde_json::to_string_pretty(&tree).unwrap()).unwrap();
    path
}

// ---------------------------------------------------------------------------
// seqnav validate
// ---------------------------------------------------------------------------

#[test]
fn validate_reports_summary() {
    let dir = TempDir::new().unwrap();
    let tree = write_tree(&dir);
    seqnav(&dir)
        .arg("validate")
        .arg(&tree)
        .assert()
        .success()
        .stdout(predicate::str::contains("course (Safety Course): 5 activities, 3 leaves, depth 2"))
        .stdout(predicate::str::contains("No anomalies."));
}

#[test]
fn validate_json_output() {
    let dir = TempDir::new().unwrap();
    let tree = write_tree(&dir);
    let output = seqnav(&dir)
        .args(["validate", "--json"])
        .arg(&tree)
        .output()
        .unwrap();
    assert!(output.status.success());
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["valid"], true);
    assert_eq!(value["leaves"], 3);
}

#[test]
fn validate_fails_on_empty_organization() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("empty.json");
    std::fs::write(
        &path,
        r#"{"organizations":{"organizations":[{"identifier":"o","items":[]}]}}"#,
    )
    .unwrap();
    seqnav(&dir)
        .arg("validate")
        .arg(&path)
        .assert()
        .failure()
        .stdout(predicate::str::contains("PARSE_VALIDATION_ERROR"))
        .stdout(predicate::str::contains("No items in default organization"));
}

#[test]
fn validate_fails_on_non_json_text() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("broken.json");
    std::fs::write(&path, "<manifest>").unwrap();
    seqnav(&dir)
        .arg("validate")
        .arg(&path)
        .assert()
        .failure()
        .stdout(predicate::str::contains("PARSE_XML_ERROR"));
}

#[test]
fn validate_reports_anomalies() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("dup.json");
    std::fs::write(
        &path,
        r#"{"organizations":{"organizations":[{"identifier":"o","items":[{"identifier":"a"},{"identifier":"a"}]}]}}"#,
    )
    .unwrap();
    seqnav(&dir)
        .arg("validate")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("[anomaly]"));
}

// ---------------------------------------------------------------------------
// seqnav outline
// ---------------------------------------------------------------------------

#[test]
fn outline_lists_activities() {
    let dir = TempDir::new().unwrap();
    let tree = write_tree(&dir);
    seqnav(&dir)
        .arg("outline")
        .arg(&tree)
        .assert()
        .success()
        .stdout(predicate::str::contains("ACTIVITY"))
        .stdout(predicate::str::contains("    lesson1"))
        .stdout(predicate::str::contains("intro/index.html"))
        .stdout(predicate::str::contains("choice,choiceExit,flow"));
}

#[test]
fn outline_json_lists_objective_maps() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("mapped.json");
    let tree = serde_json::json!({
        "organizations": { "organizations": [{
            "identifier": "course",
            "items": [
                { "identifier": "quiz", "sequencing": { "objectives": {
                    "primaryObjective": {
                        "objectiveID": "quiz_passed",
                        "mapInfo": [{ "targetObjectiveID": "course_mastery", "writeSatisfiedStatus": true }]
                    }
                }}},
                { "identifier": "recap" }
            ]
        }]}
    });
    std::fs::write(&path, tree.to_string()).unwrap();
    let output = seqnav(&dir)
        .args(["outline", "--json"])
        .arg(&path)
        .output()
        .unwrap();
    assert!(output.status.success());
    let rows: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let quiz = rows
        .as_array()
        .unwrap()
        .iter()
        .find(|r| r["identifier"] == "quiz")
        .unwrap();
    assert_eq!(quiz["objective_map"], serde_json::json!([["quiz_passed", "course_mastery"]]));
    let recap = rows.as_array().unwrap().iter().find(|r| r["identifier"] == "recap").unwrap();
    assert!(recap.get("objective_map").is_none());
}

// ---------------------------------------------------------------------------
// seqnav run
// ---------------------------------------------------------------------------

#[test]
fn run_walks_the_course() {
    let dir = TempDir::new().unwrap();
    let tree = write_tree(&dir);
    seqnav(&dir)
        .arg("run")
        .arg(&tree)
        .args(["start", "continue", "continue", "continue"])
        .assert()
        .success()
        .stdout(predicate::str::contains("start -> intro"))
        .stdout(predicate::str::contains("continue -> lesson1"))
        .stdout(predicate::str::contains("continue -> lesson2"))
        .stdout(predicate::str::contains("continue -> failed:"))
        .stdout(predicate::str::contains("current=lesson2"));
}

#[test]
fn run_strict_fails_on_failed_step() {
    let dir = TempDir::new().unwrap();
    let tree = write_tree(&dir);
    seqnav(&dir)
        .arg("run")
        .arg(&tree)
        .args(["--strict", "start", "previous"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("1 step(s) failed"));
}

#[test]
fn run_rejects_unknown_requests_without_crashing() {
    let dir = TempDir::new().unwrap();
    let tree = write_tree(&dir);
    seqnav(&dir)
        .arg("run")
        .arg(&tree)
        .args(["start", "teleport"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Invalid navigation request type"));
}

#[test]
fn run_json_reports_steps_and_state() {
    let dir = TempDir::new().unwrap();
    let tree = write_tree(&dir);
    let output = seqnav(&dir)
        .args(["--json", "run"])
        .arg(&tree)
        .args(["start", "choice:lesson2", r#"progress:lesson2:{"completed":true}"#])
        .output()
        .unwrap();
    assert!(output.status.success());
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let steps = value["steps"].as_array().unwrap();
    assert_eq!(steps.len(), 3);
    assert!(steps.iter().all(|s| s["success"] == true));
    assert_eq!(value["state"]["current_activity"], "lesson2");
    assert_eq!(value["state"]["session_phase"], "active");
}

#[test]
fn run_script_then_resume_from_snapshot() {
    let dir = TempDir::new().unwrap();
    let tree = write_tree(&dir);
    let script = dir.path().join("steps.txt");
    std::fs::write(&script, "# first visit\nstart\ncontinue\n\nsuspendAll\n").unwrap();
    let snapshot = dir.path().join("snapshots/learner.yaml");

    seqnav(&dir)
        .arg("run")
        .arg(&tree)
        .arg("--script")
        .arg(&script)
        .arg("--save")
        .arg(&snapshot)
        .assert()
        .success()
        .stdout(predicate::str::contains("state: suspended"));
    assert!(snapshot.exists());

    seqnav(&dir)
        .arg("run")
        .arg(&tree)
        .arg("--resume")
        .arg(&snapshot)
        .args(["resumeAll", "continue"])
        .assert()
        .success()
        .stdout(predicate::str::contains("resumeAll -> lesson1"))
        .stdout(predicate::str::contains("continue -> lesson2"));
}

#[test]
fn run_terminate_rejects_later_steps() {
    let dir = TempDir::new().unwrap();
    let tree = write_tree(&dir);
    seqnav(&dir)
        .arg("run")
        .arg(&tree)
        .args(["start", "terminate", "continue"])
        .assert()
        .success()
        .stdout(predicate::str::contains("continue -> failed: sequencing session not active"))
        .stdout(predicate::str::contains("state: terminated"));
}

#[test]
fn run_fails_on_bad_progress_step() {
    let dir = TempDir::new().unwrap();
    let tree = write_tree(&dir);
    seqnav(&dir)
        .arg("run")
        .arg(&tree)
        .args(["start", "progress:intro:{oops"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("step 2"));
}

// ---------------------------------------------------------------------------
// seqnav config
// ---------------------------------------------------------------------------

#[test]
fn config_shows_defaults() {
    let dir = TempDir::new().unwrap();
    seqnav(&dir)
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("max_depth: 64"))
        .stdout(predicate::str::contains("Config is valid. No warnings."));
}

#[test]
fn config_init_writes_file() {
    let dir = TempDir::new().unwrap();
    seqnav(&dir).args(["config", "--init"]).assert().success();
    let written = std::fs::read_to_string(dir.path().join("seqnav.yaml")).unwrap();
    assert!(written.contains("history_limit: 200"));
}

#[test]
fn config_errors_fail_the_command() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("seqnav.yaml"), "max_depth: 0\n").unwrap();
    seqnav(&dir)
        .arg("config")
        .assert()
        .failure()
        .stdout(predicate::str::contains("[error]"))
        .stderr(predicate::str::contains("config validation found errors"));
}

#[test]
fn config_max_depth_limits_the_tree() {
    let dir = TempDir::new().unwrap();
    let tree = write_tree(&dir);
    std::fs::write(dir.path().join("seqnav.yaml"), "max_depth: 1\n").unwrap();
    seqnav(&dir)
        .arg("validate")
        .arg(&tree)
        .assert()
        .success()
        .stdout(predicate::str::contains("[anomaly]"));
}
