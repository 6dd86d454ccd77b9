//! The small subset of query, update and aggregation semantics the mock
//! server understands.

use std::cmp::Ordering;

use serde_json::{Map, Value};

pub type Document = Map<String, Value>;

/// True if `doc` satisfies every top-level condition in `filter`. An empty
/// filter matches everything.
pub fn matches(doc: &Document, filter: &Document) -> Result<bool, String> {
    for (field, condition) in filter {
        let actual = doc.get(field);
        let ok = match condition {
            Value::Object(ops) if ops.keys().all(|k| k.starts_with('$')) && !ops.is_empty() => {
                operators_match(actual, ops)?
            }
            expected => actual == Some(expected),
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

fn operators_match(actual: Option<&Value>, ops: &Document) -> Result<bool, String> {
    for (op, operand) in ops {
        let ok = match op.as_str() {
            "$eq" => actual == Some(operand),
            "$ne" => actual != Some(operand),
            "$gt" => compare(actual, operand) == Some(Ordering::Greater),
            "$gte" => matches!(compare(actual, operand), Some(Ordering::Greater | Ordering::Equal)),
            "$lt" => compare(actual, operand) == Some(Ordering::Less),
            "$lte" => matches!(compare(actual, operand), Some(Ordering::Less | Ordering::Equal)),
            "$in" => in_list(actual, operand, op)?,
            "$nin" => !in_list(actual, operand, op)?,
            other => return Err(format!("unsupported query operator: {other}")),
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

fn in_list(actual: Option<&Value>, operand: &Value, op: &str) -> Result<bool, String> {
    let Value::Array(candidates) = operand else {
        return Err(format!("{op} needs an array"));
    };
    Ok(actual.is_some_and(|v| candidates.contains(v)))
}

/// Numbers compare numerically, strings lexicographically; anything else is
/// incomparable.
fn compare(actual: Option<&Value>, operand: &Value) -> Option<Ordering> {
    match (actual?, operand) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

/// Apply `$set`, `$unset` and `$inc` to `doc`. Returns whether the document
/// changed. On error `doc` is left as it was.
pub fn apply_update(target: &mut Document, update: &Document) -> Result<bool, String> {
    let mut doc = target.clone();
    for (op, fields) in update {
        let Value::Object(fields) = fields else {
            return Err(format!("{op} needs an object"));
        };
        match op.as_str() {
            "$set" => {
                for (k, v) in fields {
                    if k == "_id" {
                        return Err("_id is immutable".to_string());
                    }
                    doc.insert(k.clone(), v.clone());
                }
            }
            "$unset" => {
                for k in fields.keys() {
                    doc.remove(k);
                }
            }
            "$inc" => {
                for (k, v) in fields {
                    let by = v.as_f64().ok_or_else(|| format!("$inc value for {k} is not a number"))?;
                    let next = match doc.get(k) {
                        None => v.clone(),
                        Some(Value::Number(n)) => match (n.as_i64(), v.as_i64()) {
                            (Some(a), Some(b)) => {
                                Value::from(a.checked_add(b).ok_or_else(|| format!("$inc overflows {k}"))?)
                            }
                            _ => Value::from(n.as_f64().unwrap_or_default() + by),
                        },
                        Some(_) => return Err(format!("cannot $inc non-numeric field {k}")),
                    };
                    doc.insert(k.clone(), next);
                }
            }
            other => return Err(format!("unsupported update operator: {other}")),
        }
    }
    let changed = doc != *target;
    *target = doc;
    Ok(changed)
}

/// Run `$match`, `$skip`, `$limit` and `$count` stages in order.
pub fn run_pipeline(mut docs: Vec<Document>, pipeline: &[Document]) -> Result<Vec<Document>, String> {
    for stage in pipeline {
        let mut entries = stage.iter();
        let (Some((name, spec)), None) = (entries.next(), entries.next()) else {
            return Err("each pipeline stage must have exactly one key".to_string());
        };
        docs = match (name.as_str(), spec) {
            ("$match", Value::Object(filter)) => {
                let mut kept = Vec::with_capacity(docs.len());
                for doc in docs {
                    if matches(&doc, filter)? {
                        kept.push(doc);
                    }
                }
                kept
            }
            ("$skip", n) => {
                let n = as_count(n, "$skip")?;
                docs.into_iter().skip(n).collect()
            }
            ("$limit", n) => {
                let n = as_count(n, "$limit")?;
                docs.into_iter().take(n).collect()
            }
            ("$count", Value::String(field)) => {
                let mut out = Document::new();
                out.insert(field.clone(), Value::from(docs.len()));
                vec![out]
            }
            (other, _) => return Err(format!("unsupported pipeline stage: {other}")),
        };
    }
    Ok(docs)
}

fn as_count(value: &Value, stage: &str) -> Result<usize, String> {
    value
        .as_u64()
        .map(|n| n as usize)
        .ok_or_else(|| format!("{stage} needs a non-negative integer"))
}
