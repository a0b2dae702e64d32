//! Query evaluation over JSON documents: matching, sorting, projection and
//! aggregation.

use crate::types::{Query, QueryOptions};
use serde_json::{Map, Value, json};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Prefix of fields that are never returned to clients.
pub const HIDDEN_PREFIX: char = '_';

/// Look up a dotted path such as `internal.status.id`.
pub fn get_path<'a>(doc: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let mut current = doc.get(parts.next()?)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

/// String form used for comparisons against query values.
pub fn value_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Every query key must match. Comma-separated values are alternatives and
/// a leading `~` requests a case-insensitive substring match.
pub fn matches(doc: &Map<String, Value>, query: &Query) -> bool {
    query.iter().all(|(key, expected)| {
        let Some(actual) = get_path(doc, key) else {
            return false;
        };
        let expected = value_string(expected);
        let alternatives: Vec<&str> = expected.split(',').map(str::trim).collect();
        match actual {
            Value::Array(items) => items
                .iter()
                .any(|item| alternatives.iter().any(|alt| value_matches(item, alt))),
            single => alternatives.iter().any(|alt| value_matches(single, alt)),
        }
    })
}

fn value_matches(actual: &Value, expected: &str) -> bool {
    let actual = value_string(actual);
    match expected.strip_prefix('~') {
        Some(needle) => actual.to_lowercase().contains(&needle.to_lowercase()),
        None => actual == expected,
    }
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(x), Some(y)) => value_string(x).cmp(&value_string(y)),
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

pub fn sort_docs(docs: &mut [&Map<String, Value>], field: &str, descending: bool) {
    docs.sort_by(|a, b| {
        let ordering = compare_values(get_path(a, field), get_path(b, field));
        if descending {
            ordering.reverse()
        } else {
            ordering
        }
    });
}

/// Apply `include`/`exclude`/`flattenAnnotations` and strip hidden fields.
pub fn project(doc: &Map<String, Value>, options: &QueryOptions) -> Value {
    let mut visible: Map<String, Value> = doc
        .iter()
        .filter(|(k, _)| !k.starts_with(HIDDEN_PREFIX))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    let include = options.include();
    if !include.is_empty() {
        let mut projected = Map::new();
        if let Some(id) = visible.get("id") {
            projected.insert("id".to_string(), id.clone());
        }
        for path in &include {
            if let Some(value) = get_path(&visible, path) {
                insert_path(&mut projected, path, value.clone());
            }
        }
        visible = projected;
    }

    for path in options.exclude() {
        if path != "id" {
            remove_path(&mut visible, &path);
        }
    }

    if options.get_bool(QueryOptions::FLATTEN_ANNOTATIONS) {
        if let Some(Value::Array(sets)) = visible.get_mut("annotationSets") {
            for set in sets.iter_mut() {
                if let Some(Value::Object(annotations)) = set.get_mut("annotations") {
                    let mut flat = Map::new();
                    flatten_into(&mut flat, "", annotations);
                    *annotations = flat;
                }
            }
        }
    }

    Value::Object(visible)
}

fn insert_path(target: &mut Map<String, Value>, path: &str, value: Value) {
    match path.split_once('.') {
        None => {
            target.insert(path.to_string(), value);
        }
        Some((head, rest)) => {
            let child = target
                .entry(head.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if let Value::Object(child) = child {
                insert_path(child, rest, value);
            }
        }
    }
}

fn remove_path(target: &mut Map<String, Value>, path: &str) {
    match path.split_once('.') {
        None => {
            target.remove(path);
        }
        Some((head, rest)) => {
            if let Some(Value::Object(child)) = target.get_mut(head) {
                remove_path(child, rest);
            }
        }
    }
}

fn flatten_into(flat: &mut Map<String, Value>, prefix: &str, object: &Map<String, Value>) {
    for (key, value) in object {
        let name = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{}.{}", prefix, key)
        };
        match value {
            Value::Object(inner) => flatten_into(flat, &name, inner),
            other => {
                flat.insert(name, other.clone());
            }
        }
    }
}

/// Collect the values of `field`, expanding arrays, in sorted order.
pub fn distinct<'a>(docs: impl IntoIterator<Item = &'a Map<String, Value>>, field: &str) -> Vec<Value> {
    let mut values: BTreeMap<String, Value> = BTreeMap::new();
    for doc in docs {
        match get_path(doc, field) {
            Some(Value::Array(items)) => {
                for item in items {
                    values.insert(value_string(item), item.clone());
                }
            }
            Some(Value::Null) | None => {}
            Some(value) => {
                values.insert(value_string(value), value.clone());
            }
        }
    }
    values.into_values().collect()
}

/// Count documents per distinct value for each field.
pub fn facet(docs: &[&Map<String, Value>], fields: &[String]) -> Vec<Value> {
    fields
        .iter()
        .map(|field| {
            let mut counts: BTreeMap<String, usize> = BTreeMap::new();
            for doc in docs {
                match get_path(doc, field) {
                    Some(Value::Array(items)) => {
                        for item in items {
                            *counts.entry(value_string(item)).or_default() += 1;
                        }
                    }
                    Some(Value::Null) | None => {}
                    Some(value) => *counts.entry(value_string(value)).or_default() += 1,
                }
            }
            let mut buckets: Vec<(String, usize)> = counts.into_iter().collect();
            buckets.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
            json!({
                "name": field,
                "count": docs.len(),
                "buckets": buckets
                    .into_iter()
                    .map(|(value, count)| json!({"value": value, "count": count}))
                    .collect::<Vec<_>>(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_matches_alternatives_and_nested() {
        let sample = doc(json!({
            "id": "s1",
            "somatic": false,
            "internal": {"status": {"id": "READY"}},
            "phenotypes": ["HP:1", "HP:2"],
        }));

        let mut query = Query::new();
        query.put("id", "s0,s1");
        assert!(matches(&sample, &query));

        query.put("internal.status.id", "READY");
        assert!(matches(&sample, &query));

        query.put("phenotypes", "HP:2");
        assert!(matches(&sample, &query));

        query.put("somatic", "true");
        assert!(!matches(&sample, &query));
    }

    #[test]
    fn test_matches_substring() {
        let sample = doc(json!({"id": "s1", "description": "Tumour biopsy"}));
        let mut query = Query::new();
        query.put("description", "~BIOPSY");
        assert!(matches(&sample, &query));

        let mut missing = Query::new();
        missing.put("name", "x");
        assert!(!matches(&sample, &missing));
    }

    #[test]
    fn test_project_include_exclude() {
        let sample = doc(json!({
            "id": "s1",
            "name": "one",
            "_acl": {},
            "internal": {"status": {"id": "READY"}, "release": 1},
        }));

        let mut options = QueryOptions::new();
        options.put(QueryOptions::INCLUDE, json!(["internal.status"]));
        let projected = project(&sample, &options);
        assert_eq!(projected, json!({"id": "s1", "internal": {"status": {"id": "READY"}}}));

        let mut options = QueryOptions::new();
        options.put(QueryOptions::EXCLUDE, json!(["internal.release", "name"]));
        let projected = project(&sample, &options);
        assert_eq!(projected, json!({"id": "s1", "internal": {"status": {"id": "READY"}}}));
    }

    #[test]
    fn test_flatten_annotations() {
        let sample = doc(json!({
            "id": "s1",
            "annotationSets": [{"id": "a", "annotations": {"tumour": {"grade": 2}}}],
        }));
        let mut options = QueryOptions::new();
        options.put(QueryOptions::FLATTEN_ANNOTATIONS, true);
        let projected = project(&sample, &options);
        assert_eq!(projected["annotationSets"][0]["annotations"]["tumour.grade"], 2);
    }

    #[test]
    fn test_sort_numeric() {
        let a = doc(json!({"id": "a", "size": 10}));
        let b = doc(json!({"id": "b", "size": 9}));
        let c = doc(json!({"id": "c"}));
        let mut docs = vec![&a, &b, &c];
        sort_docs(&mut docs, "size", false);
        let ids: Vec<_> = docs.iter().map(|d| d["id"].as_str().unwrap()).collect();
        assert_eq!(ids, vec!["c", "b", "a"]);
    }

    #[test]
    fn test_distinct_and_facet() {
        let a = doc(json!({"sex": "FEMALE", "tags": ["x", "y"]}));
        let b = doc(json!({"sex": "MALE", "tags": ["x"]}));
        let c = doc(json!({"sex": "FEMALE"}));

        assert_eq!(distinct([&a, &b, &c], "tags"), vec![json!("x"), json!("y")]);

        let facets = facet(&[&a, &b, &c], &["sex".to_string()]);
        assert_eq!(facets[0]["buckets"][0], json!({"value": "FEMALE", "count": 2}));
        assert_eq!(facets[0]["count"], 3);
    }
}
