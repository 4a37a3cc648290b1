use super::{load_config, load_shape};
use crate::output::print_json;
use seqnav_core::ActivityTree;
use std::path::Path;

pub fn run(config: Option<&Path>, tree_path: &Path, json: bool) -> anyhow::Result<()> {
    let config = load_config(config)?;
    let shape = load_shape(tree_path)?;

    let tree = match ActivityTree::build(&shape, &config) {
        Ok(tree) => tree,
        Err(e) => {
            if json {
                print_json(&serde_json::json!({
                    "valid": false,
                    "error_code": e.code(),
                    "message": e.to_string(),
                }))?;
            } else {
                println!("[{}] {}", e.code(), e);
            }
            anyhow::bail!("{} is not a usable activity tree", tree_path.display());
        }
    };

    let root = tree.get(tree.root());
    let leaves = tree.leaves(tree.root()).count();
    if json {
        print_json(&serde_json::json!({
            "valid": true,
            "organization": root.identifier,
            "title": root.title,
            "activities": tree.len(),
            "leaves": leaves,
            "max_depth": tree.max_depth(),
            "anomalies": tree.anomalies(),
        }))?;
    } else {
        println!(
            "{} ({}): {} activities, {} leaves, depth {}",
            root.identifier,
            root.title,
            tree.len(),
            leaves,
            tree.max_depth()
        );
        if tree.anomalies().is_empty() {
            println!("No anomalies.");
        } else {
            for anomaly in tree.anomalies() {
                println!("[anomaly] {anomaly}");
            }
        }
    }
    Ok(())
}
