//! Raw page bodies to flat output rows.
//!
//! Two shapes exist upstream: plain record pages (an array under a known
//! key, or a bare object for singleton endpoints) and insight payloads,
//! where each metric carries a list of time-stamped values and
//! demographic metrics hide a whole distribution inside one value map.
//! Insight payloads fan out to one row per (metric, period end, key).
//! All declared datetime fields leave here in the canonical
//! `YYYY-MM-DD HH:mm:ss` form regardless of how the upstream spelled them.

use serde_json::{Map, Value};

use graphtap_types::cursor::{parse_replication_value, CANONICAL_DATETIME_FMT};
use graphtap_types::row::Row;
use graphtap_types::stream::{StreamDefinition, TransformStrategy};

/// Normalize one raw page into output rows, in upstream order.
#[must_use]
pub fn normalize_page(stream: &StreamDefinition, body: &Value) -> Vec<Row> {
    match &stream.transform {
        TransformStrategy::Records {
            path,
            datetime_fields,
        } => normalize_records(stream.name, body, *path, datetime_fields),
        TransformStrategy::InsightFanout => fan_out_insights(stream.name, body),
    }
}

fn normalize_records(
    stream: &str,
    body: &Value,
    path: Option<&str>,
    datetime_fields: &[&str],
) -> Vec<Row> {
    let candidates: Vec<&Value> = match path {
        None => vec![body],
        Some(key) => match body.get(key) {
            Some(Value::Array(items)) => items.iter().collect(),
            Some(other) => {
                tracing::warn!(
                    stream,
                    "Record container '{key}' is {}, expected an array; treating page as empty",
                    json_kind(other)
                );
                Vec::new()
            }
            None => {
                tracing::warn!(stream, "Page has no '{key}' container; treating as empty");
                Vec::new()
            }
        },
    };

    let mut rows = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        let Some(obj) = candidate.as_object() else {
            tracing::warn!(stream, "Dropping non-object record: {}", json_kind(candidate));
            continue;
        };
        let mut row = obj.clone();
        for field in datetime_fields {
            canonicalize_datetime(stream, &mut row, field);
        }
        rows.push(row);
    }
    rows
}

/// Flatten an insights payload.
///
/// Each entry under `data` contributes its identity fields (`name`,
/// `period`, `title`, `id`, `description`) to every emitted row. A scalar
/// value yields one row per `values` element; an object value yields one
/// row per map key, with the key surfaced as `context`.
fn fan_out_insights(stream: &str, body: &Value) -> Vec<Row> {
    let Some(insights) = body.get("data").and_then(Value::as_array) else {
        tracing::warn!(stream, "Insights page has no 'data' array; treating as empty");
        return Vec::new();
    };

    let mut rows = Vec::new();
    for insight in insights {
        let Some(obj) = insight.as_object() else {
            tracing::warn!(stream, "Dropping non-object insight entry");
            continue;
        };
        let base: Map<String, Value> = ["name", "period", "title", "id", "description"]
            .iter()
            .filter_map(|k| obj.get(*k).map(|v| ((*k).to_string(), v.clone())))
            .collect();
        let Some(values) = obj.get("values").and_then(Value::as_array) else {
            continue;
        };
        for entry in values {
            let Some(entry) = entry.as_object() else {
                tracing::warn!(stream, "Dropping non-object insight value entry");
                continue;
            };
            match entry.get("value") {
                Some(Value::Object(keyed)) => {
                    for (key, count) in keyed {
                        let mut row = Row::new();
                        row.insert("context".to_string(), Value::String(key.clone()));
                        row.insert("value".to_string(), count.clone());
                        if let Some(end_time) = entry.get("end_time") {
                            row.insert("end_time".to_string(), end_time.clone());
                            canonicalize_datetime(stream, &mut row, "end_time");
                        }
                        row.extend(base.clone());
                        rows.push(row);
                    }
                }
                _ => {
                    let mut row = entry.clone();
                    row.extend(base.clone());
                    canonicalize_datetime(stream, &mut row, "end_time");
                    rows.push(row);
                }
            }
        }
    }
    rows
}

/// Rewrite `field` in place to the canonical datetime form. Absent fields
/// are ignored; unparseable values pass through untouched with a warning.
fn canonicalize_datetime(stream: &str, row: &mut Row, field: &str) {
    let Some(Value::String(raw)) = row.get(field) else {
        return;
    };
    match parse_replication_value(raw) {
        Some(ts) => {
            let canonical = ts.format(CANONICAL_DATETIME_FMT).to_string();
            row.insert(field.to_string(), Value::String(canonical));
        }
        None => {
            tracing::warn!(stream, field, value = raw.as_str(), "Unparseable datetime left as-is");
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use graphtap_types::stream::ParamStrategy;
    use serde_json::json;

    fn records_stream(path: Option<&'static str>) -> StreamDefinition {
        StreamDefinition {
            name: "media",
            path: "/{user_id}/media",
            primary_keys: &["id"],
            replication_key: Some("timestamp"),
            parent: None,
            state_partition_keys: None,
            params: ParamStrategy::Fields {
                fields: &["id", "timestamp"],
            },
            transform: TransformStrategy::Records {
                path,
                datetime_fields: &["timestamp"],
            },
            child_context: &[],
        }
    }

    fn insights_stream() -> StreamDefinition {
        StreamDefinition {
            name: "user_insights_audience",
            path: "/{user_id}/insights",
            primary_keys: &["id"],
            replication_key: None,
            parent: None,
            state_partition_keys: None,
            params: ParamStrategy::LifetimeMetrics {
                metrics: &["audience_gender_age"],
                period: "lifetime",
            },
            transform: TransformStrategy::InsightFanout,
            child_context: &[],
        }
    }

    #[test]
    fn records_canonicalize_datetime_fields() {
        let body = json!({"data": [
            {"id": "1", "timestamp": "2024-01-15T08:30:00+0000"},
            {"id": "2", "timestamp": "2024-01-16T00:00:00Z"},
        ]});
        let rows = normalize_page(&records_stream(Some("data")), &body);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["timestamp"], "2024-01-15 08:30:00");
        assert_eq!(rows[1]["timestamp"], "2024-01-16 00:00:00");
    }

    #[test]
    fn singleton_body_is_one_record() {
        let body = json!({"id": "17841", "username": "acme"});
        let mut stream = records_stream(None);
        stream.transform = TransformStrategy::Records {
            path: None,
            datetime_fields: &[],
        };
        let rows = normalize_page(&stream, &body);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["username"], "acme");
    }

    #[test]
    fn missing_container_is_empty_page() {
        let rows = normalize_page(&records_stream(Some("data")), &json!({"paging": {}}));
        assert!(rows.is_empty());
    }

    #[test]
    fn unparseable_datetime_survives_untouched() {
        let body = json!({"data": [{"id": "1", "timestamp": "not-a-date"}]});
        let rows = normalize_page(&records_stream(Some("data")), &body);
        assert_eq!(rows[0]["timestamp"], "not-a-date");
    }

    #[test]
    fn keyed_insight_value_fans_out_per_key() {
        let body = json!({"data": [{
            "name": "audience_gender_age",
            "period": "lifetime",
            "title": "Gender and Age",
            "id": "17841/insights/audience_gender_age/lifetime",
            "description": "d",
            "values": [{"value": {"M.25-34": 10, "F.25-34": 20},
                        "end_time": "2024-01-15T08:00:00+0000"}],
        }]});
        let rows = normalize_page(&insights_stream(), &body);
        assert_eq!(rows.len(), 2);
        let male = rows.iter().find(|r| r["context"] == "M.25-34").unwrap();
        assert_eq!(male["value"], 10);
        assert_eq!(male["name"], "audience_gender_age");
        assert_eq!(male["end_time"], "2024-01-15 08:00:00");
        let female = rows.iter().find(|r| r["context"] == "F.25-34").unwrap();
        assert_eq!(female["value"], 20);
    }

    #[test]
    fn scalar_insight_value_keeps_one_row_per_entry() {
        let body = json!({"data": [{
            "name": "impressions",
            "period": "day",
            "title": "Impressions",
            "id": "17841/insights/impressions/day",
            "description": "d",
            "values": [
                {"value": 4, "end_time": "2024-01-14T08:00:00+0000"},
                {"value": 7, "end_time": "2024-01-15T08:00:00+0000"},
            ],
        }]});
        let rows = normalize_page(&insights_stream(), &body);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["value"], 4);
        assert_eq!(rows[0]["period"], "day");
        assert_eq!(rows[1]["end_time"], "2024-01-15 08:00:00");
        assert!(!rows[0].contains_key("context"));
    }

    #[test]
    fn media_insight_without_end_time() {
        let body = json!({"data": [{
            "name": "reach",
            "period": "lifetime",
            "title": "Reach",
            "id": "9/insights/reach/lifetime",
            "description": "d",
            "values": [{"value": 120}],
        }]});
        let rows = normalize_page(&insights_stream(), &body);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["value"], 120);
        assert!(!rows[0].contains_key("end_time"));
    }
}
