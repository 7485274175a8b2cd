//! Attribute differences between two versions of a resource.
//!
//! Used by update postcommit hooks to decide whether an update touched
//! anything the agent cares about.

use std::collections::BTreeSet;

use serde::Serialize;
use serde_json::{Map, Value};

/// Keys added, removed and changed between two versions of a resource.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Difference {
    pub added: BTreeSet<String>,
    pub removed: BTreeSet<String>,
    pub changed: BTreeSet<String>,
}

impl Difference {
    /// Returns true if both versions are identical.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }

    /// Every key that moved, whatever the direction.
    pub fn moving_keys(&self) -> BTreeSet<&str> {
        self.added
            .iter()
            .chain(&self.removed)
            .chain(&self.changed)
            .map(String::as_str)
            .collect()
    }

    /// Returns true if any moving key is in `keys`.
    pub fn touches(&self, keys: &[&str]) -> bool {
        self.moving_keys().iter().any(|k| keys.contains(k))
    }
}

/// Computes `(added, removed, changed)` of `current` relative to `previous`.
///
/// Values are compared with deep equality; arrays are order-sensitive.
pub fn diff(current: &Map<String, Value>, previous: &Map<String, Value>) -> Difference {
    let mut difference = Difference::default();

    for (key, value) in current {
        match previous.get(key) {
            None => {
                difference.added.insert(key.clone());
            }
            Some(old) if old != value => {
                difference.changed.insert(key.clone());
            }
            Some(_) => {}
        }
    }

    difference.removed = previous
        .keys()
        .filter(|key| !current.contains_key(*key))
        .cloned()
        .collect();

    difference
}

/// Serializes both resources to JSON objects and diffs them.
///
/// A resource that does not serialize to an object is treated as empty.
pub fn diff_resources<T: Serialize>(current: &T, previous: &T) -> Difference {
    diff(&as_object(current), &as_object(previous))
}

fn as_object<T: Serialize>(resource: &T) -> Map<String, Value> {
    match serde_json::to_value(resource) {
        Ok(Value::Object(map)) => map,
        _ => Map::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected an object"),
        }
    }

    fn keys(values: &[&str]) -> BTreeSet<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_identical_is_empty() {
        let a = object(json!({"name": "vpn", "route_targets": ["64512:1"]}));
        assert!(diff(&a, &a).is_empty());
    }

    #[test]
    fn test_added_removed_changed() {
        let current = object(json!({"name": "new", "route_targets": ["64512:1"], "extra": 1}));
        let previous = object(json!({"name": "old", "route_targets": ["64512:1"], "gone": true}));
        let d = diff(&current, &previous);
        assert_eq!(d.added, keys(&["extra"]));
        assert_eq!(d.removed, keys(&["gone"]));
        assert_eq!(d.changed, keys(&["name"]));
        assert!(d.added.is_disjoint(&d.removed));
    }

    #[test]
    fn test_list_order_is_significant() {
        let current = object(json!({"route_targets": ["64512:2", "64512:1"]}));
        let previous = object(json!({"route_targets": ["64512:1", "64512:2"]}));
        assert_eq!(diff(&current, &previous).changed, keys(&["route_targets"]));
    }

    #[test]
    fn test_changed_is_symmetric() {
        let a = object(json!({"a": 1, "b": [1, 2], "c": {"x": 1}}));
        let b = object(json!({"a": 2, "b": [1, 2], "c": {"x": 2}, "d": null}));
        let forward = diff(&a, &b);
        let backward = diff(&b, &a);
        assert_eq!(forward.changed, backward.changed);
        assert_eq!(forward.added, backward.removed);
        assert_eq!(forward.removed, backward.added);
    }

    #[test]
    fn test_touches() {
        let current = object(json!({"name": "new", "route_targets": []}));
        let previous = object(json!({"name": "old", "route_targets": []}));
        let d = diff(&current, &previous);
        assert!(d.touches(&["name"]));
        assert!(!d.touches(&["route_targets", "import_targets"]));
    }

    #[test]
    fn test_diff_resources() {
        #[derive(Serialize)]
        struct Resource {
            name: String,
            targets: Vec<String>,
        }
        let old = Resource {
            name: "a".into(),
            targets: vec!["64512:1".into()],
        };
        let new = Resource {
            name: "a".into(),
            targets: vec!["64512:2".into()],
        };
        assert_eq!(diff_resources(&new, &old).changed, keys(&["targets"]));
    }
}
