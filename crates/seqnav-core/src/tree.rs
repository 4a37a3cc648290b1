//! The activity tree: an arena of activities in document (preorder) order.
//!
//! Parent and child links are [`ActivityId`] indexes into the arena. Because
//! activities are stored in preorder, every subtree occupies a contiguous
//! range `id..subtree_end`, which makes ancestry checks and leaf walks
//! simple range operations.

use crate::config::EngineConfig;
use crate::error::Result;
use crate::sequencing::{ControlMode, SequencingDefinition};
use crate::shape::{lenient, Resource, TreeShape};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActivityId(pub usize);

impl fmt::Display for ActivityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Activity
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Activity {
    pub id: ActivityId,
    pub identifier: String,
    pub title: String,
    pub parent: Option<ActivityId>,
    pub children: Vec<ActivityId>,
    pub depth: usize,
    pub is_visible: bool,
    pub resource: Option<Resource>,
    pub parameters: Option<String>,
    pub sequencing: SequencingDefinition,
    subtree_end: usize,
}

impl Activity {
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    pub fn control_mode(&self) -> &ControlMode {
        &self.sequencing.control_mode
    }

    /// Local objective id → global objective id, for every mapped objective.
    pub fn objective_map(&self) -> Vec<(&str, &str)> {
        self.sequencing
            .all_objectives()
            .flat_map(|o| {
                o.map_info
                    .iter()
                    .map(move |m| (o.id.as_str(), m.target_objective_id.as_str()))
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// ActivityTree
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ActivityTree {
    activities: Vec<Activity>,
    index: HashMap<String, ActivityId>,
    anomalies: Vec<String>,
}

impl ActivityTree {
    /// Build a tree from a tree-shape value.
    ///
    /// Fails only for unusable shapes (see [`TreeShape::parse`]). Duplicate
    /// identifiers, repeated ancestors and items below `max_depth` are
    /// skipped and recorded in [`ActivityTree::anomalies`].
    pub fn build(value: &Value, config: &EngineConfig) -> Result<Self> {
        let shape = TreeShape::parse(value, config.default_organization.as_deref())?;
        Self::from_shape(&shape, config)
    }

    pub fn from_shape(shape: &TreeShape, config: &EngineConfig) -> Result<Self> {
        let mut builder = Builder {
            tree: ActivityTree {
                activities: Vec::new(),
                index: HashMap::new(),
                anomalies: Vec::new(),
            },
            shape,
            config,
            seen: HashSet::new(),
        };

        let root = builder.push(
            shape.organization_id.clone(),
            shape.title.clone(),
            None,
            0,
            &shape.organization,
        );
        builder.seen.insert(shape.organization_id.clone());
        let mut ancestors = vec![shape.organization_id.clone()];
        builder.expand(root, &shape.organization, &mut ancestors);

        let tree = builder.tree;
        if tree.activities[root.0].children.is_empty() {
            return Err(crate::error::SeqError::Validation(
                "No items in default organization".to_string(),
            ));
        }
        for anomaly in &tree.anomalies {
            tracing::warn!(%anomaly, "tree shape anomaly");
        }
        tracing::debug!(
            activities = tree.len(),
            leaves = tree.leaves(tree.root()).count(),
            "activity tree built"
        );
        Ok(tree)
    }

    pub fn root(&self) -> ActivityId {
        ActivityId(0)
    }

    pub fn len(&self) -> usize {
        self.activities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.activities.is_empty()
    }

    /// Access by id. Ids are only ever produced by this tree.
    pub fn get(&self, id: ActivityId) -> &Activity {
        &self.activities[id.0]
    }

    pub fn find(&self, identifier: &str) -> Option<&Activity> {
        self.id_of(identifier).map(|id| self.get(id))
    }

    pub fn id_of(&self, identifier: &str) -> Option<ActivityId> {
        self.index.get(identifier).copied()
    }

    pub fn identifier(&self, id: ActivityId) -> &str {
        &self.get(id).identifier
    }

    pub fn anomalies(&self) -> &[String] {
        &self.anomalies
    }

    /// All activities in document order.
    pub fn iter(&self) -> impl Iterator<Item = &Activity> {
        self.activities.iter()
    }

    pub fn parent(&self, id: ActivityId) -> Option<ActivityId> {
        self.get(id).parent
    }

    pub fn children(&self, id: ActivityId) -> &[ActivityId] {
        &self.get(id).children
    }

    pub fn is_leaf(&self, id: ActivityId) -> bool {
        self.get(id).is_leaf()
    }

    /// True when `a` is a proper ancestor of `b`.
    pub fn is_ancestor(&self, a: ActivityId, b: ActivityId) -> bool {
        a.0 < b.0 && b.0 < self.get(a).subtree_end
    }

    pub fn is_ancestor_or_self(&self, a: ActivityId, b: ActivityId) -> bool {
        a == b || self.is_ancestor(a, b)
    }

    /// `id` and its ancestors, nearest first, ending at the root.
    pub fn path_to_root(&self, id: ActivityId) -> Vec<ActivityId> {
        let mut path = vec![id];
        let mut cursor = self.parent(id);
        while let Some(p) = cursor {
            path.push(p);
            cursor = self.parent(p);
        }
        path
    }

    /// Nearest activity that is an ancestor-or-self of both `a` and `b`.
    pub fn common_ancestor(&self, a: ActivityId, b: ActivityId) -> ActivityId {
        self.path_to_root(a)
            .into_iter()
            .find(|candidate| self.is_ancestor_or_self(*candidate, b))
            .unwrap_or_else(|| self.root())
    }

    /// Leaves of the subtree rooted at `subtree`, in document order.
    /// Each call starts a fresh walk.
    pub fn leaves(&self, subtree: ActivityId) -> Leaves<'_> {
        Leaves {
            tree: self,
            next: subtree.0,
            end: self.get(subtree).subtree_end,
        }
    }

    /// `subtree` and all its descendants, in document order.
    pub fn descendants_or_self(&self, subtree: ActivityId) -> impl Iterator<Item = ActivityId> {
        (subtree.0..self.get(subtree).subtree_end).map(ActivityId)
    }

    pub fn sibling_index(&self, id: ActivityId) -> Option<usize> {
        let parent = self.parent(id)?;
        self.children(parent).iter().position(|c| *c == id)
    }

    pub fn next_sibling(&self, id: ActivityId) -> Option<ActivityId> {
        let parent = self.parent(id)?;
        let idx = self.sibling_index(id)?;
        self.children(parent).get(idx + 1).copied()
    }

    pub fn previous_sibling(&self, id: ActivityId) -> Option<ActivityId> {
        let parent = self.parent(id)?;
        let idx = self.sibling_index(id)?;
        idx.checked_sub(1)
            .and_then(|i| self.children(parent).get(i).copied())
    }

    pub fn first_leaf(&self) -> Option<ActivityId> {
        self.leaves(self.root()).next().map(|a| a.id)
    }

    pub fn max_depth(&self) -> usize {
        self.activities.iter().map(|a| a.depth).max().unwrap_or(0)
    }
}

/// Restartable, finite walk over the leaves of a subtree.
#[derive(Debug, Clone)]
pub struct Leaves<'a> {
    tree: &'a ActivityTree,
    next: usize,
    end: usize,
}

impl<'a> Iterator for Leaves<'a> {
    type Item = &'a Activity;

    fn next(&mut self) -> Option<Self::Item> {
        while self.next < self.end {
            let activity = &self.tree.activities[self.next];
            self.next += 1;
            if activity.is_leaf() {
                return Some(activity);
            }
        }
        None
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

struct Builder<'a> {
    tree: ActivityTree,
    shape: &'a TreeShape,
    config: &'a EngineConfig,
    /// Every identifier already placed in this walk.
    seen: HashSet<String>,
}

impl Builder<'_> {
    fn push(
        &mut self,
        identifier: String,
        title: String,
        parent: Option<ActivityId>,
        depth: usize,
        source: &Map<String, Value>,
    ) -> ActivityId {
        let id = ActivityId(self.tree.activities.len());
        let sequencing = SequencingDefinition::from_value(
            lenient::field(source, &["sequencing"]),
            self.config.control_mode_defaults,
            &identifier,
            &mut self.tree.anomalies,
        );
        let resource = lenient::field(source, &["identifierref", "identifierRef"])
            .and_then(lenient::str_of)
            .and_then(|r| {
                let found = self.shape.resource(r).cloned();
                if found.is_none() {
                    self.tree
                        .anomalies
                        .push(format!("{identifier}: identifierref '{r}' names no resource"));
                }
                found
            });
        self.tree.index.insert(identifier.clone(), id);
        self.tree.activities.push(Activity {
            id,
            identifier,
            title,
            parent,
            children: Vec::new(),
            depth,
            is_visible: lenient::field(source, &["isvisible", "isVisible"])
                .and_then(lenient::bool_of)
                .unwrap_or(true),
            resource,
            parameters: lenient::field(source, &["parameters"])
                .and_then(lenient::str_of)
                .map(str::to_string),
            sequencing,
            subtree_end: id.0 + 1,
        });
        if let Some(p) = parent {
            self.tree.activities[p.0].children.push(id);
        }
        id
    }

    fn expand(&mut self, parent: ActivityId, source: &Map<String, Value>, ancestors: &mut Vec<String>) {
        let items: Vec<&Value> = match lenient::field(source, &["items", "item"]) {
            Some(Value::Array(list)) => list.iter().collect(),
            Some(single @ Value::Object(_)) => vec![single],
            _ => Vec::new(),
        };
        let depth = self.tree.activities[parent.0].depth + 1;
        let parent_identifier = self.tree.activities[parent.0].identifier.clone();

        for (index, item) in items.into_iter().enumerate() {
            let Some(obj) = item.as_object() else {
                self.tree
                    .anomalies
                    .push(format!("{parent_identifier}: item {index} is not an object; skipped"));
                continue;
            };
            let identifier = match lenient::field(obj, &["identifier"]).and_then(lenient::str_of) {
                Some(s) if !s.trim().is_empty() => s.to_string(),
                _ => {
                    let synthetic = format!("{parent_identifier}_{index}");
                    self.tree.anomalies.push(format!(
                        "{parent_identifier}: item {index} has no identifier; using '{synthetic}'"
                    ));
                    synthetic
                }
            };
            if ancestors.contains(&identifier) {
                self.tree.anomalies.push(format!(
                    "{identifier}: appears as its own descendant under '{parent_identifier}'; not expanded"
                ));
                continue;
            }
            if !self.seen.insert(identifier.clone()) {
                self.tree.anomalies.push(format!(
                    "{identifier}: duplicate identifier under '{parent_identifier}'; skipped"
                ));
                continue;
            }
            if depth > self.config.max_depth {
                self.tree.anomalies.push(format!(
                    "{identifier}: deeper than max_depth {}; skipped",
                    self.config.max_depth
                ));
                continue;
            }
            let title = lenient::field(obj, &["title"])
                .and_then(lenient::str_of)
                .unwrap_or(&identifier)
                .to_string();
            let child = self.push(identifier.clone(), title, Some(parent), depth, obj);
            ancestors.push(identifier);
            self.expand(child, obj, ancestors);
            ancestors.pop();
        }

        self.tree.activities[parent.0].subtree_end = self.tree.activities.len();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
