//! Translation of raw HTTP query parameters into `Query` and `QueryOptions`.
//!
//! Only superficial coercion happens here: strings become ints, booleans or
//! lists. Interpreting the values is left to the managers.

use crate::types::{Query, QueryOptions};
use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};

/// Maximum number of IDs accepted in a single comma-separated list.
pub const MAX_ID_SIZE: usize = 100;

/// Parameters that never reach a manager.
const IGNORED_PARAMS: &[&str] = &["sid", "apiVersion"];

/// Pagination bounds applied while parsing `limit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub default_limit: usize,
    pub max_limit: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            default_limit: 10,
            max_limit: 5000,
        }
    }
}

/// Split request parameters into filter criteria and response options.
pub fn parse_params(
    params: &BTreeMap<String, String>,
    limits: Limits,
) -> Result<(Query, QueryOptions)> {
    let mut query = Query::new();
    let mut options = QueryOptions::new();

    for (key, value) in params {
        match key.as_str() {
            QueryOptions::INCLUDE | QueryOptions::EXCLUDE => {
                let fields: Vec<Value> = split_list(value).into_iter().map(Value::from).collect();
                options.put(key.as_str(), fields);
            }
            QueryOptions::LIMIT => {
                let limit = parse_int(key, value)?;
                if limit < 0 || limit as usize > limits.max_limit {
                    return Err(Error::InvalidParameter(format!(
                        "Invalid limit {}. It must be between 0 and {}",
                        limit, limits.max_limit
                    )));
                }
                options.put(key.as_str(), limit);
            }
            QueryOptions::SKIP => {
                let skip = parse_int(key, value)?;
                if skip < 0 {
                    return Err(Error::InvalidParameter(format!(
                        "Invalid skip {}. It must be a positive number",
                        skip
                    )));
                }
                options.put(key.as_str(), skip);
            }
            QueryOptions::COUNT
            | QueryOptions::INCLUDE_RESULT
            | QueryOptions::FLATTEN_ANNOTATIONS => {
                options.put(key.as_str(), parse_bool(value));
            }
            QueryOptions::ORDER => {
                let order = value.to_ascii_uppercase();
                if !matches!(order.as_str(), "ASC" | "ASCENDING" | "DESC" | "DESCENDING") {
                    return Err(Error::InvalidParameter(format!(
                        "Invalid order '{}'. Expected ASC or DESC",
                        value
                    )));
                }
                let order = if order.starts_with("DESC") { "DESC" } else { "ASC" };
                options.put(key.as_str(), order);
            }
            QueryOptions::SORT | QueryOptions::FACET => {
                options.put(key.as_str(), value.as_str());
            }
            k if IGNORED_PARAMS.contains(&k) => {}
            _ => {
                query.put(key.as_str(), value.as_str());
            }
        }
    }

    if options.limit().is_none() {
        options.put(QueryOptions::LIMIT, limits.default_limit);
    }

    Ok((query, options))
}

/// Booleans follow the lenient convention: only `true` (any case) is true.
pub fn parse_bool(value: &str) -> bool {
    value.trim().eq_ignore_ascii_case("true")
}

pub fn parse_int(key: &str, value: &str) -> Result<i64> {
    value.trim().parse::<i64>().map_err(|_| {
        Error::InvalidParameter(format!("Invalid value '{}' for parameter '{}'", value, key))
    })
}

/// Parse an enumerated parameter from its serialized name.
pub fn parse_enum<T: DeserializeOwned>(key: &str, value: &str) -> Result<T> {
    serde_json::from_value(Value::from(value.trim())).map_err(|_| {
        Error::InvalidParameter(format!("Invalid value '{}' for parameter '{}'", value, key))
    })
}

/// Comma-split a list, trimming entries and dropping empty ones.
pub fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parse a comma-separated ID list, rejecting duplicates and, when
/// `check_max` is set, lists longer than [`MAX_ID_SIZE`].
pub fn split_ids(value: &str, check_max: bool) -> Result<Vec<String>> {
    let ids = split_list(value);
    if ids.is_empty() {
        return Err(Error::InvalidParameter("Empty list of IDs".to_string()));
    }
    if check_max && ids.len() > MAX_ID_SIZE {
        return Err(Error::InvalidParameter(format!(
            "Too many IDs. Maximum number of IDs per request is {}, found {}",
            MAX_ID_SIZE,
            ids.len()
        )));
    }

    let mut seen = HashSet::with_capacity(ids.len());
    for id in &ids {
        if !seen.insert(id.as_str()) {
            return Err(Error::InvalidParameter(format!(
                "Duplicated ID '{}' found in list",
                id
            )));
        }
    }
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_default_limit_applied() {
        let (query, options) = parse_params(&params(&[("id", "s1")]), Limits::default()).unwrap();
        assert_eq!(options.limit(), Some(10));
        assert_eq!(query.get_str("id"), Some("s1"));
    }

    #[test]
    fn test_parse_enum() {
        use crate::types::{AclAction, LogType};
        let action: AclAction = parse_enum("action", "ADD").unwrap();
        assert_eq!(action, AclAction::Add);
        let log: LogType = parse_enum("type", " stderr ").unwrap();
        assert_eq!(log, LogType::Stderr);
        assert!(parse_enum::<AclAction>("action", "MERGE").is_err());
    }

    #[test]
    fn test_limit_bounds() {
        let limits = Limits {
            default_limit: 10,
            max_limit: 100,
        };
        assert!(parse_params(&params(&[("limit", "-1")]), limits).is_err());
        assert!(parse_params(&params(&[("limit", "101")]), limits).is_err());
        assert!(parse_params(&params(&[("limit", "ten")]), limits).is_err());

        let (_, options) = parse_params(&params(&[("limit", "100")]), limits).unwrap();
        assert_eq!(options.limit(), Some(100));
    }

    #[test]
    fn test_option_dispatch() {
        let (query, options) = parse_params(
            &params(&[
                ("include", "id,name"),
                ("count", "TRUE"),
                ("includeResult", "yes"),
                ("order", "descending"),
                ("sort", "creationDate"),
                ("sid", "token"),
                ("phenotypes", "HP:0001"),
            ]),
            Limits::default(),
        )
        .unwrap();

        assert_eq!(options.include(), vec!["id", "name"]);
        assert!(options.count());
        assert!(!options.get_bool(QueryOptions::INCLUDE_RESULT));
        assert!(options.descending());
        assert_eq!(options.sort(), Some("creationDate"));
        assert!(!query.contains_key("sid"));
        assert_eq!(query.get_str("phenotypes"), Some("HP:0001"));
        assert_eq!(query.len(), 1);
    }

    #[test]
    fn test_invalid_order_rejected() {
        assert!(parse_params(&params(&[("order", "sideways")]), Limits::default()).is_err());
    }

    #[test]
    fn test_split_ids() {
        assert_eq!(split_ids("a, b,c", true).unwrap(), vec!["a", "b", "c"]);
        assert!(split_ids("a,b,a", true).is_err());
        assert!(split_ids(" , ", true).is_err());
    }

    #[test]
    fn test_split_ids_max() {
        let ids: Vec<String> = (0..=MAX_ID_SIZE).map(|i| format!("s{}", i)).collect();
        let joined = ids.join(",");
        assert!(split_ids(&joined, true).is_err());
        assert_eq!(split_ids(&joined, false).unwrap().len(), MAX_ID_SIZE + 1);
    }
}
