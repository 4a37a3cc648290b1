//! Reading the tree-shape value handed over by the manifest collaborator.
//!
//! The shape is consumed as loosely-typed JSON: only the presence of an
//! organization with at least one item is enforced here. Everything below
//! the organization is read leniently by [`crate::tree`] and
//! [`crate::sequencing`].

use crate::error::{Result, SeqError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// A resource referenced by an item's `identifierref`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    pub identifier: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scorm_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
}

/// The selected organization plus the resource table.
#[derive(Debug, Clone)]
pub struct TreeShape {
    pub organization_id: String,
    pub title: String,
    /// The organization object itself (`items`, `sequencing`, ...).
    pub organization: Map<String, Value>,
    pub resources: HashMap<String, Resource>,
}

impl TreeShape {
    /// Select the organization to build from.
    ///
    /// `preferred` is tried first, then the shape's own
    /// `organizations.default`. When neither names an existing organization
    /// the first one is used.
    pub fn parse(value: &Value, preferred: Option<&str>) -> Result<Self> {
        let owned;
        let value = match value {
            Value::Null => return Err(SeqError::EmptyInput("tree shape is null".to_string())),
            Value::String(text) => {
                if text.trim().is_empty() {
                    return Err(SeqError::EmptyInput("tree shape is an empty string".to_string()));
                }
                owned = serde_json::from_str::<Value>(text)
                    .map_err(|e| SeqError::MalformedShape(format!("unparseable tree shape text: {e}")))?;
                if owned.is_string() {
                    return Err(SeqError::MalformedShape("tree shape text is not an object".to_string()));
                }
                return Self::parse(&owned, preferred);
            }
            other => other,
        };

        let root = value.as_object().ok_or_else(|| {
            SeqError::MalformedShape(format!("expected an object, got {}", kind_of(value)))
        })?;
        if root.is_empty() {
            return Err(SeqError::EmptyInput("tree shape is an empty object".to_string()));
        }

        let (default_id, organizations) = match root.get("organizations") {
            Some(Value::Object(orgs)) => (
                lenient::field(orgs, &["default"]).and_then(lenient::str_of),
                match lenient::field(orgs, &["organizations", "organization"]) {
                    Some(Value::Array(list)) => list.iter().collect::<Vec<_>>(),
                    Some(single @ Value::Object(_)) => vec![single],
                    _ => Vec::new(),
                },
            ),
            Some(Value::Array(list)) => (None, list.iter().collect()),
            Some(other) => {
                return Err(SeqError::MalformedShape(format!(
                    "organizations must be an object, got {}",
                    kind_of(other)
                )))
            }
            None => {
                return Err(SeqError::MalformedShape(
                    "tree shape has no organizations".to_string(),
                ))
            }
        };

        let organizations: Vec<&Map<String, Value>> =
            organizations.into_iter().filter_map(Value::as_object).collect();
        let named = |want: &str| {
            organizations.iter().copied().find(|org| {
                lenient::field(org, &["identifier"]).and_then(lenient::str_of) == Some(want)
            })
        };
        let organization = preferred
            .filter(|s| !s.trim().is_empty())
            .and_then(named)
            .or_else(|| default_id.and_then(named))
            .or_else(|| organizations.first().copied())
            .ok_or_else(no_items)?;

        let has_items = matches!(
            lenient::field(organization, &["items", "item"]),
            Some(Value::Array(items)) if !items.is_empty()
        ) || matches!(
            lenient::field(organization, &["items", "item"]),
            Some(Value::Object(_))
        );
        if !has_items {
            return Err(no_items());
        }

        let organization_id = lenient::field(organization, &["identifier"])
            .and_then(lenient::str_of)
            .filter(|s| !s.is_empty())
            .unwrap_or("organization")
            .to_string();
        let title = lenient::field(organization, &["title"])
            .and_then(lenient::str_of)
            .unwrap_or(&organization_id)
            .to_string();

        Ok(Self {
            organization_id,
            title,
            organization: organization.clone(),
            resources: read_resources(root.get("resources")),
        })
    }

    pub fn resource(&self, identifier: &str) -> Option<&Resource> {
        self.resources.get(identifier)
    }
}

fn no_items() -> SeqError {
    SeqError::Validation("No items in default organization".to_string())
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn read_resources(value: Option<&Value>) -> HashMap<String, Resource> {
    let list = match value {
        Some(Value::Array(list)) => list.as_slice(),
        Some(Value::Object(obj)) => match lenient::field(obj, &["resources", "resource"]) {
            Some(Value::Array(list)) => list.as_slice(),
            _ => &[],
        },
        _ => &[],
    };
    list.iter()
        .filter_map(|r| serde_json::from_value::<Resource>(r.clone()).ok())
        .map(|r| (r.identifier.clone(), r))
        .collect()
}

// ---------------------------------------------------------------------------
// Lenient accessors
// ---------------------------------------------------------------------------

/// Best-effort readers for hand-written or tool-generated JSON where
/// booleans arrive as `"true"` and numbers as `"0.8"`.
pub mod lenient {
    use serde_json::{Map, Value};

    /// First present key among `keys`.
    pub fn field<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
        keys.iter().find_map(|k| obj.get(*k))
    }

    pub fn str_of(value: &Value) -> Option<&str> {
        value.as_str()
    }

    pub fn bool_of(value: &Value) -> Option<bool> {
        match value {
            Value::Bool(b) => Some(*b),
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" | "1" => Some(true),
                "false" | "no" | "0" => Some(false),
                _ => None,
            },
            Value::Number(n) => n.as_f64().map(|f| f != 0.0),
            _ => None,
        }
    }

    pub fn f64_of(value: &Value) -> Option<f64> {
        match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| !f.is_nan()),
            _ => None,
        }
    }

    pub fn u32_of(value: &Value) -> Option<u32> {
        let f = f64_of(value)?;
        (f.is_finite() && f >= 0.0).then(|| f.min(u32::MAX as f64) as u32)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn shape() -> Value {
        json!({
            "organizations": {
                "default": "org-2",
                "organizations": [
                    { "identifier": "org-1", "title": "First", "items": [{ "identifier": "a" }] },
                    { "identifier": "org-2", "title": "Second", "items": [{ "identifier": "b", "identifierref": "r1" }] }
                ]
            },
            "resources": [{ "identifier": "r1", "scormType": "sco", "href": "b.html" }]
        })
    }

    #[test]
    fn null_and_empty_are_empty_input() {
        for v in [Value::Null, json!(""), json!({})] {
            let err = TreeShape::parse(&v, None).unwrap_err();
            assert_eq!(err.code(), "PARSE_EMPTY_INPUT", "{v}");
        }
    }

    #[test]
    fn non_objects_are_malformed() {
        for v in [json!(42), json!([1, 2]), json!(true), json!("not json"), json!({ "organizations": 3 })] {
            let err = TreeShape::parse(&v, None).unwrap_err();
            assert_eq!(err.code(), "PARSE_XML_ERROR", "{v}");
        }
    }

    #[test]
    fn no_items_is_validation_error() {
        let v = json!({ "organizations": { "default": "o", "organizations": [{ "identifier": "o", "items": [] }] } });
        let err = TreeShape::parse(&v, None).unwrap_err();
        assert_eq!(err.code(), "PARSE_VALIDATION_ERROR");
        assert!(err.to_string().contains("No items in default organization"));
    }

    #[test]
    fn selects_default_organization() {
        let s = TreeShape::parse(&shape(), None).unwrap();
        assert_eq!(s.organization_id, "org-2");
        assert_eq!(s.title, "Second");
        assert_eq!(s.resource("r1").and_then(|r| r.href.as_deref()), Some("b.html"));
    }

    #[test]
    fn preferred_organization_wins_and_unknown_falls_back() {
        assert_eq!(TreeShape::parse(&shape(), Some("org-1")).unwrap().organization_id, "org-1");
        assert_eq!(TreeShape::parse(&shape(), Some("nope")).unwrap().organization_id, "org-2");
        assert_eq!(TreeShape::parse(&shape(), Some(" ")).unwrap().organization_id, "org-2");

        let mut dangling = shape();
        dangling["organizations"]["default"] = json!("missing");
        assert_eq!(TreeShape::parse(&dangling, Some("nope")).unwrap().organization_id, "org-1");
    }

    #[test]
    fn json_text_is_accepted() {
        let text = Value::String(shape().to_string());
        assert_eq!(TreeShape::parse(&text, None).unwrap().organization_id, "org-2");
    }

    #[test]
    fn lenient_readers_coerce() {
        assert_eq!(lenient::bool_of(&json!("TRUE")), Some(true));
        assert_eq!(lenient::bool_of(&json!(0)), Some(false));
        assert_eq!(lenient::bool_of(&json!("maybe")), None);
        assert_eq!(lenient::f64_of(&json!("0.25")), Some(0.25));
        assert_eq!(lenient::u32_of(&json!(-3)), None);
        assert_eq!(lenient::u32_of(&json!("4")), Some(4));
    }
}
