//! `datastore:` line grammar:
//! `measurement[,tag=val,...] field=val[,field=val,...] [unixTimestamp]`
//!
//! Malformed lines produce a row-local warning string, never a fatal
//! error; widget stdout is untrusted input.

use crate::store::{DataPoint, FieldValue};

/// Parse one datastore line body (text after the `datastore:` keyword).
///
/// Tags are canonicalized: sorted by key, duplicate keys collapsed to the
/// last occurrence, so `m,b=2,a=1` and `m,a=1,b=2` share one natural key.
pub fn parse_line(raw: &str) -> Result<DataPoint, String> {
    let mut parts = raw.trim().split_whitespace();
    let head = parts.next().ok_or_else(|| "empty datastore line".to_string())?;
    let fields_part = parts
        .next()
        .ok_or_else(|| format!("datastore line {raw:?}: missing fields"))?;
    let timestamp = match parts.next() {
        None => None,
        Some(ts) => Some(
            ts.parse::<i64>()
                .map_err(|_| format!("datastore line {raw:?}: bad timestamp {ts:?}"))?,
        ),
    };
    if parts.next().is_some() {
        return Err(format!("datastore line {raw:?}: trailing tokens"));
    }

    let mut head_parts = head.split(',');
    let measurement = head_parts
        .next()
        .filter(|m| !m.is_empty())
        .ok_or_else(|| format!("datastore line {raw:?}: empty measurement"))?
        .to_string();

    let mut tags: Vec<(String, String)> = Vec::new();
    for tag in head_parts {
        let (key, value) = tag
            .split_once('=')
            .ok_or_else(|| format!("datastore line {raw:?}: bad tag {tag:?}"))?;
        if key.is_empty() {
            return Err(format!("datastore line {raw:?}: empty tag key"));
        }
        // Last occurrence of a duplicate key wins.
        tags.retain(|(existing, _)| existing != key);
        tags.push((key.to_string(), value.to_string()));
    }
    tags.sort_by(|a, b| a.0.cmp(&b.0));

    let mut fields: Vec<(String, FieldValue)> = Vec::new();
    for field in fields_part.split(',') {
        let (key, value) = field
            .split_once('=')
            .ok_or_else(|| format!("datastore line {raw:?}: bad field {field:?}"))?;
        if key.is_empty() {
            return Err(format!("datastore line {raw:?}: empty field key"));
        }
        fields.retain(|(existing, _)| existing != key);
        fields.push((key.to_string(), parse_field_value(value)));
    }
    if fields.is_empty() {
        return Err(format!("datastore line {raw:?}: no fields"));
    }

    Ok(DataPoint {
        measurement,
        tags,
        timestamp,
        fields,
    })
}

fn parse_field_value(raw: &str) -> FieldValue {
    if let Ok(number) = raw.parse::<f64>() {
        if number.is_finite() {
            return FieldValue::Number(number);
        }
    }
    if let Some(quoted) = raw
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
    {
        return FieldValue::Text(quoted.to_string());
    }
    if raw.starts_with('{') || raw.starts_with('[') {
        if let Ok(json) = serde_json::from_str::<serde_json::Value>(raw) {
            return FieldValue::Json(json);
        }
    }
    FieldValue::Text(raw.to_string())
}
