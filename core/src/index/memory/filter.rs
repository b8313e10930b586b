//! Evaluates the subset of the Elasticsearch query DSL that the query
//! compiler emits against JSON documents

use std::cmp::Ordering;

use serde_json::{Map, Value};

use crate::index::BackendError;

/// Check if `doc` matches `filter`
pub(crate) fn matches(filter: &Value, doc: &Value) -> Result<bool, BackendError> {
    let obj = filter
        .as_object()
        .ok_or_else(|| BackendError::bad_request(format!("filter must be an object: {filter}")))?;
    let (kind, body) = single_entry(obj)?;

    match kind.as_str() {
        "match_all" => Ok(true),
        "bool" => matches_bool(body, doc),
        "term" => {
            let (field, expected) = field_clause(body)?;
            Ok(field_values(doc, field)
                .into_iter()
                .any(|v| loosely_equal(v, expected)))
        }
        "prefix" => {
            let (field, prefix) = field_clause(body)?;
            let prefix = prefix
                .as_str()
                .ok_or_else(|| BackendError::bad_request("prefix must be a string"))?;
            Ok(field_values(doc, field)
                .into_iter()
                .any(|v| v.as_str().is_some_and(|s| s.starts_with(prefix))))
        }
        "exists" => {
            let field = body
                .get("field")
                .and_then(Value::as_str)
                .ok_or_else(|| BackendError::bad_request("exists requires a field"))?;
            Ok(field_values(doc, field).iter().any(|v| !v.is_null()))
        }
        "range" => {
            let (field, bounds) = field_clause(body)?;
            let bounds = bounds
                .as_object()
                .ok_or_else(|| BackendError::bad_request("range bounds must be an object"))?;
            let values = field_values(doc, field);
            Ok(values.into_iter().any(|v| in_range(v, bounds)))
        }
        _ => Err(BackendError::bad_request(format!(
            "unsupported filter `{kind}'"
        ))),
    }
}

fn single_entry(obj: &Map<String, Value>) -> Result<(&String, &Value), BackendError> {
    let mut it = obj.iter();
    match (it.next(), it.next()) {
        (Some(e), None) => Ok(e),
        _ => Err(BackendError::bad_request(
            "filter must have exactly one clause",
        )),
    }
}

fn field_clause(body: &Value) -> Result<(&str, &Value), BackendError> {
    let obj = body
        .as_object()
        .ok_or_else(|| BackendError::bad_request("clause must be an object"))?;
    single_entry(obj).map(|(k, v)| (k.as_str(), v))
}

/// Occurrence lists may be given as a single clause or as an array
fn clauses(v: Option<&Value>) -> Vec<&Value> {
    match v {
        None => vec![],
        Some(Value::Array(a)) => a.iter().collect(),
        Some(v) => vec![v],
    }
}

fn matches_bool(body: &Value, doc: &Value) -> Result<bool, BackendError> {
    let must = clauses(body.get("must"))
        .into_iter()
        .chain(clauses(body.get("filter")))
        .collect::<Vec<_>>();
    let should = clauses(body.get("should"));
    let must_not = clauses(body.get("must_not"));

    for c in &must {
        if !matches(c, doc)? {
            return Ok(false);
        }
    }

    for c in &must_not {
        if matches(c, doc)? {
            return Ok(false);
        }
    }

    // should clauses are optional if there are required ones
    let minimum_should_match = match body.get("minimum_should_match") {
        Some(v) => v
            .as_u64()
            .ok_or_else(|| BackendError::bad_request("minimum_should_match must be a number"))?
            as usize,
        None if must.is_empty() && !should.is_empty() => 1,
        None => 0,
    };

    let mut matched = 0;
    for c in &should {
        if matched >= minimum_should_match {
            break;
        }
        if matches(c, doc)? {
            matched += 1;
        }
    }

    Ok(matched >= minimum_should_match)
}

/// Collect all values at the given dotted path. Arrays are flattened so a
/// clause matches if any element matches.
fn field_values<'a>(doc: &'a Value, field: &str) -> Vec<&'a Value> {
    let mut result = Vec::new();
    collect_values(doc, field, &mut result);
    result
}

fn collect_values<'a>(v: &'a Value, field: &str, result: &mut Vec<&'a Value>) {
    match v {
        Value::Array(a) => {
            for e in a {
                collect_values(e, field, result);
            }
        }

        Value::Object(o) => {
            // keys may contain dots themselves
            if let Some(e) = o.get(field) {
                push_leaves(e, result);
            }
            for (i, _) in field.match_indices('.') {
                if let Some(e) = o.get(&field[..i]) {
                    collect_values(e, &field[i + 1..], result);
                }
            }
        }

        _ => {}
    }
}

fn push_leaves<'a>(v: &'a Value, result: &mut Vec<&'a Value>) {
    match v {
        Value::Array(a) => a.iter().for_each(|e| push_leaves(e, result)),
        v => result.push(v),
    }
}

/// Indexed properties are keywords, so `5` matches `"5"`
fn loosely_equal(a: &Value, b: &Value) -> bool {
    if a == b {
        return true;
    }
    match (as_number(a), as_number(b)) {
        (Some(x), Some(y)) => x == y,
        _ => match (a, b) {
            (Value::String(s), other) | (other, Value::String(s)) => {
                !other.is_string() && !other.is_null() && *s == other.to_string()
            }
            _ => false,
        },
    }
}

fn as_number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (as_number(a), as_number(b)) {
        (Some(x), Some(y)) => x.partial_cmp(&y),
        _ => match (a, b) {
            (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
            _ => None,
        },
    }
}

fn in_range(v: &Value, bounds: &Map<String, Value>) -> bool {
    bounds.iter().all(|(bound, limit)| {
        let Some(o) = compare(v, limit) else {
            return false;
        };
        match bound.as_str() {
            "gt" => o == Ordering::Greater,
            "gte" => o != Ordering::Less,
            "lt" => o == Ordering::Less,
            "lte" => o != Ordering::Greater,
            _ => false,
        }
    })
}
