//! Annotation sets and their validation against study variable sets.

use super::state::Document;
use crate::catalog::AnnotationChange;
use crate::params::split_list;
use crate::types::AnnotationAction;
use crate::{Error, Result};
use serde_json::{Map, Value, json};

const ANNOTATION_SETS: &str = "annotationSets";

fn find_variable_set<'a>(variable_sets: &'a [Value], id: &str) -> Result<&'a Value> {
    variable_sets
        .iter()
        .find(|vs| vs.get("id").and_then(Value::as_str) == Some(id))
        .ok_or_else(|| Error::NotFound(format!("Variable set '{}' not found", id)))
}

fn type_matches(kind: &str, value: &Value, variable: &Value) -> bool {
    match kind {
        "STRING" | "TEXT" => value.is_string(),
        "INTEGER" => value.is_i64() || value.is_u64(),
        "DOUBLE" => value.is_number(),
        "BOOLEAN" => value.is_boolean(),
        "OBJECT" | "MAP" => value.is_object(),
        "CATEGORICAL" => {
            let allowed = variable.get("allowedValues").and_then(Value::as_array);
            match (value.as_str(), allowed) {
                (Some(v), Some(allowed)) => allowed.iter().any(|a| a.as_str() == Some(v)),
                (Some(_), None) => true,
                _ => false,
            }
        }
        _ => true,
    }
}

/// Check an annotation set against the variable set it declares.
pub fn validate(set: &Value, variable_sets: &[Value]) -> Result<()> {
    let id = set
        .get("id")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| Error::missing("annotationSets.id"))?;
    let variable_set_id = set
        .get("variableSetId")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::missing("annotationSets.variableSetId"))?;
    let variable_set = find_variable_set(variable_sets, variable_set_id)?;
    let variables = variable_set
        .get("variables")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    let empty = Map::new();
    let annotations = match set.get("annotations") {
        Some(Value::Object(a)) => a,
        None => &empty,
        Some(_) => {
            return Err(Error::InvalidParameter(format!(
                "Annotations of annotation set '{}' must be an object",
                id
            )));
        }
    };

    for (key, value) in annotations {
        let variable = variables
            .iter()
            .find(|v| v.get("id").and_then(Value::as_str) == Some(key.as_str()))
            .ok_or_else(|| {
                Error::InvalidParameter(format!(
                    "Variable '{}' not defined in variable set '{}'",
                    key, variable_set_id
                ))
            })?;
        let kind = variable
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or("STRING")
            .to_ascii_uppercase();
        if !value.is_null() && !type_matches(&kind, value, variable) {
            return Err(Error::InvalidParameter(format!(
                "Value {} of variable '{}' is not a valid {}",
                value, key, kind
            )));
        }
    }

    for variable in &variables {
        let required = variable
            .get("required")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let name = variable.get("id").and_then(Value::as_str).unwrap_or_default();
        if required && annotations.get(name).is_none_or(Value::is_null) {
            return Err(Error::InvalidParameter(format!(
                "Missing required variable '{}' in annotation set '{}'",
                name, id
            )));
        }
    }
    Ok(())
}

/// Validate every annotation set present in entity create/update params.
pub fn validate_all(params: &Map<String, Value>, variable_sets: &[Value]) -> Result<()> {
    match params.get(ANNOTATION_SETS) {
        None | Some(Value::Null) => Ok(()),
        Some(Value::Array(sets)) => {
            let mut seen = std::collections::HashSet::new();
            for set in sets {
                validate(set, variable_sets)?;
                let id = set.get("id").and_then(Value::as_str).unwrap_or_default();
                if !seen.insert(id) {
                    return Err(Error::AlreadyExists(format!(
                        "Annotation set '{}' is duplicated",
                        id
                    )));
                }
            }
            Ok(())
        }
        Some(_) => Err(Error::InvalidParameter(
            "annotationSets must be a list".to_string(),
        )),
    }
}

/// Apply an annotation change to an entity document.
pub fn apply(doc: &mut Document, change: &AnnotationChange, variable_sets: &[Value]) -> Result<()> {
    let sets = doc
        .entry(ANNOTATION_SETS)
        .or_insert_with(|| Value::Array(Vec::new()));
    let Value::Array(sets) = sets else {
        return Err(Error::Internal("corrupted annotation sets".to_string()));
    };

    let position = sets
        .iter()
        .position(|s| s.get("id").and_then(Value::as_str) == Some(change.annotation_set.as_str()));

    let mut set = match position {
        Some(i) => sets[i].clone(),
        None => {
            if change.action == AnnotationAction::Remove {
                return Err(Error::NotFound(format!(
                    "Annotation set '{}' not found",
                    change.annotation_set
                )));
            }
            let variable_set = change
                .variable_set
                .as_deref()
                .ok_or_else(|| Error::missing("variableSetId"))?;
            json!({
                "id": change.annotation_set,
                "variableSetId": variable_set,
                "annotations": {},
            })
        }
    };

    let annotations = set
        .as_object_mut()
        .and_then(|s| {
            s.entry("annotations")
                .or_insert_with(|| Value::Object(Map::new()))
                .as_object_mut()
        })
        .ok_or_else(|| Error::Internal("corrupted annotation set".to_string()))?;

    match change.action {
        AnnotationAction::Add => {
            for (key, value) in &change.annotations {
                annotations.insert(key.clone(), value.clone());
            }
        }
        AnnotationAction::Set => {
            *annotations = change.annotations.clone();
        }
        AnnotationAction::Remove => {
            let keys = change
                .annotations
                .get("remove")
                .and_then(Value::as_str)
                .map(split_list)
                .ok_or_else(|| Error::missing("remove"))?;
            for key in keys {
                annotations.remove(&key);
            }
        }
    }

    validate(&set, variable_sets)?;
    match position {
        Some(i) => sets[i] = set,
        None => sets.push(set),
    }
    Ok(())
}

/// Whether any document uses the given variable set.
pub fn uses_variable_set(doc: &Document, variable_set: &str) -> bool {
    doc.get(ANNOTATION_SETS)
        .and_then(Value::as_array)
        .is_some_and(|sets| {
            sets.iter()
                .any(|s| s.get("variableSetId").and_then(Value::as_str) == Some(variable_set))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn variable_sets() -> Vec<Value> {
        vec![json!({
            "id": "clinical",
            "variables": [
                {"id": "age", "type": "INTEGER", "required": true},
                {"id": "stage", "type": "CATEGORICAL", "allowedValues": ["I", "II", "III"]},
                {"id": "smoker", "type": "BOOLEAN"},
            ],
        })]
    }

    fn change(action: AnnotationAction, annotations: Value) -> AnnotationChange {
        AnnotationChange {
            annotation_set: "as1".to_string(),
            variable_set: Some("clinical".to_string()),
            action,
            annotations: annotations.as_object().cloned().unwrap(),
        }
    }

    #[test]
    fn test_validate_ok() {
        let set = json!({"id": "as1", "variableSetId": "clinical", "annotations": {"age": 40, "stage": "II"}});
        validate(&set, &variable_sets()).unwrap();
    }

    #[test]
    fn test_validate_failures() {
        let vs = variable_sets();
        let missing = json!({"id": "as1", "variableSetId": "clinical", "annotations": {"stage": "I"}});
        assert!(validate(&missing, &vs).is_err());

        let unknown = json!({"id": "as1", "variableSetId": "clinical", "annotations": {"age": 1, "weight": 3}});
        assert!(validate(&unknown, &vs).is_err());

        let wrong_category = json!({"id": "as1", "variableSetId": "clinical", "annotations": {"age": 1, "stage": "IV"}});
        assert!(validate(&wrong_category, &vs).is_err());

        let no_vs = json!({"id": "as1", "variableSetId": "other", "annotations": {}});
        assert!(matches!(validate(&no_vs, &vs), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_apply_add_then_remove() {
        let vs = variable_sets();
        let mut doc = Document::new();

        apply(&mut doc, &change(AnnotationAction::Add, json!({"age": 51})), &vs).unwrap();
        apply(&mut doc, &change(AnnotationAction::Add, json!({"smoker": true})), &vs).unwrap();
        assert_eq!(doc["annotationSets"][0]["annotations"], json!({"age": 51, "smoker": true}));

        apply(&mut doc, &change(AnnotationAction::Remove, json!({"remove": "smoker"})), &vs).unwrap();
        assert_eq!(doc["annotationSets"][0]["annotations"], json!({"age": 51}));

        // removing a required variable is rejected and leaves the set untouched
        assert!(apply(&mut doc, &change(AnnotationAction::Remove, json!({"remove": "age"})), &vs).is_err());
        assert_eq!(doc["annotationSets"][0]["annotations"], json!({"age": 51}));
    }

    #[test]
    fn test_apply_set_replaces() {
        let vs = variable_sets();
        let mut doc = Document::new();
        apply(&mut doc, &change(AnnotationAction::Add, json!({"age": 1, "stage": "I"})), &vs).unwrap();
        apply(&mut doc, &change(AnnotationAction::Set, json!({"age": 2})), &vs).unwrap();
        assert_eq!(doc["annotationSets"][0]["annotations"], json!({"age": 2}));
    }

    #[test]
    fn test_uses_variable_set() {
        let vs = variable_sets();
        let mut doc = Document::new();
        apply(&mut doc, &change(AnnotationAction::Add, json!({"age": 3})), &vs).unwrap();
        assert!(uses_variable_set(&doc, "clinical"));
        assert!(!uses_variable_set(&doc, "other"));
    }
}
