//! Nested field readers over dynamic cluster payloads.
//!
//! The Kubernetes dynamic client returns string-keyed maps of arbitrary values;
//! these helpers are the only sanctioned way to reach into them. Absent or
//! wrong-typed fields read as `None`, never as errors.

use std::collections::BTreeMap;

use serde_json::Value;

/// Walk `path` through nested objects, returning the value at the leaf
pub fn nested<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
  let mut current = value;
  for key in path {
    current = current.as_object()?.get(*key)?;
  }
  Some(current)
}

/// Read a string at `path`
pub fn nested_string(value: &Value, path: &[&str]) -> Option<String> {
  nested(value, path)?.as_str().map(ToString::to_string)
}

/// Read an integer at `path`
pub fn nested_i64(value: &Value, path: &[&str]) -> Option<i64> {
  nested(value, path)?.as_i64()
}

/// Read an array at `path`
pub fn nested_slice<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Vec<Value>> {
  nested(value, path)?.as_array()
}

/// Read an object at `path`
pub fn nested_map<'a>(value: &'a Value, path: &[&str]) -> Option<&'a serde_json::Map<String, Value>> {
  nested(value, path)?.as_object()
}

/// Read a string→string map at `path`, dropping non-string values
pub fn nested_str_map(value: &Value, path: &[&str]) -> BTreeMap<String, String> {
  match nested_map(value, path) {
    Some(map) => map
      .iter()
      .filter_map(|(k, v)| v.as_str().map(|s| (k.to_owned(), s.to_owned())))
      .collect(),
    None => BTreeMap::new(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn nested_string_present() {
    let v = json!({"metadata": {"name": "web"}});
    assert_eq!(nested_string(&v, &["metadata", "name"]), Some("web".to_string()));
  }

  #[test]
  fn nested_string_absent() {
    let v = json!({"metadata": {}});
    assert_eq!(nested_string(&v, &["metadata", "name"]), None);
  }

  #[test]
  fn nested_string_wrong_type() {
    let v = json!({"spec": {"replicas": 3}});
    assert_eq!(nested_string(&v, &["spec", "replicas"]), None);
  }

  #[test]
  fn nested_i64_present() {
    let v = json!({"spec": {"replicas": 3}});
    assert_eq!(nested_i64(&v, &["spec", "replicas"]), Some(3));
  }

  #[test]
  fn nested_slice_counts_entries() {
    let v = json!({"status": {"inventory": {"entries": [{}, {}, {}]}}});
    assert_eq!(nested_slice(&v, &["status", "inventory", "entries"]).unwrap().len(), 3);
  }

  #[test]
  fn nested_str_map_drops_non_strings() {
    let v = json!({"metadata": {"labels": {"app": "web", "count": 3}}});
    let m = nested_str_map(&v, &["metadata", "labels"]);
    assert_eq!(m.len(), 1);
    assert_eq!(m.get("app").unwrap(), "web");
  }

  #[test]
  fn nested_through_non_object_is_none() {
    let v = json!({"spec": "oops"});
    assert!(nested(&v, &["spec", "selector"]).is_none());
  }
}
