use super::{load_config, load_shape};
use crate::output::{or_dash, print_json, print_table};
use anyhow::Context;
use seqnav_core::sequencing::ControlMode;
use seqnav_core::ActivityTree;
use serde::Serialize;
use std::path::Path;

#[derive(Serialize)]
struct OutlineRow<'a> {
    identifier: &'a str,
    title: &'a str,
    depth: usize,
    leaf: bool,
    visible: bool,
    parent: Option<&'a str>,
    href: Option<&'a str>,
    control_mode: &'a ControlMode,
    /// `[local, global]` pairs for objectives mapped to global ones.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    objective_map: Vec<(&'a str, &'a str)>,
}

pub fn run(config: Option<&Path>, tree_path: &Path, json: bool) -> anyhow::Result<()> {
    let config = load_config(config)?;
    let shape = load_shape(tree_path)?;
    let tree = ActivityTree::build(&shape, &config)
        .with_context(|| format!("failed to build activity tree from {}", tree_path.display()))?;

    let rows: Vec<OutlineRow> = tree
        .iter()
        .map(|a| OutlineRow {
            identifier: &a.identifier,
            title: &a.title,
            depth: a.depth,
            leaf: a.is_leaf(),
            visible: a.is_visible,
            parent: a.parent.map(|p| tree.identifier(p)),
            href: a.resource.as_ref().and_then(|r| r.href.as_deref()),
            control_mode: a.control_mode(),
            objective_map: a.objective_map(),
        })
        .collect();

    if json {
        return print_json(&rows);
    }

    let table = rows
        .iter()
        .map(|r| {
            vec![
                format!("{}{}", "  ".repeat(r.depth), r.identifier),
                r.title.to_string(),
                if r.leaf { "leaf" } else { "cluster" }.to_string(),
                modes(r.control_mode),
                or_dash(r.href),
            ]
        })
        .collect();
    print_table(&["ACTIVITY", "TITLE", "KIND", "MODES", "HREF"], table);
    Ok(())
}

fn modes(mode: &ControlMode) -> String {
    let flags = [
        (mode.choice, "choice"),
        (mode.choice_exit, "choiceExit"),
        (mode.flow, "flow"),
        (mode.forward_only, "forwardOnly"),
    ];
    let on: Vec<&str> = flags.iter().filter(|(set, _)| *set).map(|(_, name)| *name).collect();
    if on.is_empty() {
        "-".to_string()
    } else {
        on.join(",")
    }
}
