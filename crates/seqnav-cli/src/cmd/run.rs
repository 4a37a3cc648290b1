use super::{load_config, load_shape};
use crate::output::{or_dash, print_json};
use anyhow::Context;
use seqnav_core::{SequencingEngine, SequencingState, SessionSnapshot};
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};

pub struct RunOptions {
    pub steps: Vec<String>,
    pub script: Option<PathBuf>,
    pub resume: Option<PathBuf>,
    pub save: Option<PathBuf>,
    pub strict: bool,
}

// ---------------------------------------------------------------------------
// Steps
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// A navigation request with an optional target (`choice:intro`).
    Navigate {
        request: String,
        target: Option<String>,
    },
    /// `progress:<activity>:<json patch>`
    Progress { activity: String, patch: Value },
    Terminate,
}

impl Step {
    pub fn parse(text: &str) -> anyhow::Result<Self> {
        let text = text.trim();
        if text == "terminate" {
            return Ok(Step::Terminate);
        }
        if let Some(rest) = text.strip_prefix("progress:") {
            let (activity, patch) = rest
                .split_once(':')
                .with_context(|| format!("expected progress:<activity>:<json>, got '{text}'"))?;
            let patch = serde_json::from_str(patch)
                .with_context(|| format!("invalid progress patch for '{activity}'"))?;
            return Ok(Step::Progress {
                activity: activity.trim().to_string(),
                patch,
            });
        }
        let (request, target) = match text.split_once(':') {
            Some((request, target)) => (request, Some(target.trim().to_string())),
            None => (text, None),
        };
        Ok(Step::Navigate {
            request: request.trim().to_string(),
            target,
        })
    }
}

/// Steps from a script, each with its source text: one per line, `#`
/// starts a comment.
pub fn parse_script(text: &str) -> anyhow::Result<Vec<(String, Step)>> {
    text.lines()
        .enumerate()
        .map(|(n, line)| (n, line.trim()))
        .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'))
        .map(|(n, line)| {
            let step = Step::parse(line).with_context(|| format!("script line {}", n + 1))?;
            Ok((line.to_string(), step))
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct StepReport {
    step: String,
    success: bool,
    outcome: Value,
}

#[derive(Serialize)]
struct RunReport {
    steps: Vec<StepReport>,
    state: SequencingState,
}

pub fn run(config: Option<&Path>, tree_path: &Path, opts: RunOptions, json: bool) -> anyhow::Result<()> {
    let config = load_config(config)?;
    let shape = load_shape(tree_path)?;

    let mut steps = Vec::new();
    for (i, text) in opts.steps.iter().enumerate() {
        steps.push((text.clone(), Step::parse(text).with_context(|| format!("step {}", i + 1))?));
    }
    if let Some(script) = &opts.script {
        let text = std::fs::read_to_string(script)
            .with_context(|| format!("failed to read script {}", script.display()))?;
        steps.extend(parse_script(&text)?);
    }

    let engine = SequencingEngine::new(config);
    let init = match &opts.resume {
        Some(path) => {
            let snapshot = SessionSnapshot::load(path)
                .with_context(|| format!("failed to load snapshot {}", path.display()))?;
            engine.resume_from(&shape, snapshot)
        }
        None => engine.initialize(&shape),
    };
    if !init.success {
        anyhow::bail!(
            "failed to initialize from {}: [{}] {}",
            tree_path.display(),
            init.error_code.as_deref().unwrap_or("UNKNOWN"),
            init.reason.as_deref().unwrap_or("unknown error")
        );
    }
    if !json {
        for anomaly in &init.anomalies {
            println!("[anomaly] {anomaly}");
        }
    }

    let mut reports = Vec::new();
    for (text, step) in steps {
        let (success, outcome) = match &step {
            Step::Navigate { request, target } => {
                let outcome = engine.process_navigation(request, target.as_deref());
                (outcome.success, serde_json::to_value(&outcome)?)
            }
            Step::Progress { activity, patch } => {
                let outcome = engine.update_activity_progress(activity, patch);
                (outcome.success, serde_json::to_value(&outcome)?)
            }
            Step::Terminate => {
                let outcome = engine.terminate_sequencing();
                (outcome.success, serde_json::to_value(&outcome)?)
            }
        };
        if !json {
            print_step(&text, success, &outcome);
        }
        reports.push(StepReport {
            step: text,
            success,
            outcome,
        });
    }

    let state = engine.get_sequencing_state();
    if let Some(path) = &opts.save {
        engine
            .snapshot()?
            .save(path)
            .with_context(|| format!("failed to save snapshot {}", path.display()))?;
        if !json {
            println!("Saved snapshot to {}", path.display());
        }
    }

    let failed = reports.iter().filter(|r| !r.success).count();
    if json {
        print_json(&RunReport { steps: reports, state })?;
    } else {
        let stats = &state.activity_tree_stats;
        println!(
            "state: {} current={} suspended={} completed={}/{} attempted={}",
            state.session_phase,
            or_dash(state.current_activity.as_deref()),
            or_dash(state.suspended_activity.as_deref()),
            stats.completed_count,
            stats.total_activities,
            stats.attempted_count
        );
    }

    if opts.strict && failed > 0 {
        anyhow::bail!("{failed} step(s) failed");
    }
    Ok(())
}

fn print_step(text: &str, success: bool, outcome: &Value) {
    if success {
        match outcome.get("current_activity").and_then(Value::as_str) {
            Some(current) => println!("{text} -> {current}"),
            None if outcome.get("ended").is_some_and(|v| v == true) => println!("{text} -> (ended)"),
            None => println!("{text} -> ok"),
        }
    } else {
        let reason = outcome.get("reason").and_then(Value::as_str).unwrap_or("failed");
        println!("{text} -> failed: {reason}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_step_forms() {
        assert_eq!(
            Step::parse("continue").unwrap(),
            Step::Navigate {
                request: "continue".to_string(),
                target: None
            }
        );
        assert_eq!(
            Step::parse(" choice:intro ").unwrap(),
            Step::Navigate {
                request: "choice".to_string(),
                target: Some("intro".to_string())
            }
        );
        assert_eq!(Step::parse("terminate").unwrap(), Step::Terminate);
        assert_eq!(
            Step::parse(r#"progress:intro:{"completed":true,"note":"a:b"}"#).unwrap(),
            Step::Progress {
                activity: "intro".to_string(),
                patch: json!({ "completed": true, "note": "a:b" })
            }
        );
    }

    #[test]
    fn bad_progress_steps_are_errors() {
        assert!(Step::parse("progress:intro").is_err());
        assert!(Step::parse("progress:intro:{not json").is_err());
    }

    #[test]
    fn script_skips_comments_and_blanks() {
        let steps = parse_script("# warm up\nstart\n\n  continue  \n# done\nsuspendAll\n").unwrap();
        assert_eq!(steps.len(), 3);
        assert_eq!(steps[1].0, "continue");
        assert_eq!(
            steps[2].1,
            Step::Navigate {
                request: "suspendAll".to_string(),
                target: None
            }
        );
    }

    #[test]
    fn script_errors_name_the_line() {
        let err = parse_script("start\nprogress:x\n").unwrap_err();
        assert!(format!("{err:#}").contains("script line 2"));
    }
}
