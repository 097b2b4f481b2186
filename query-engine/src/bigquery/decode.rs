//! Typed decoding of `getQueryResults` rows into JSON objects.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Number, Value};

use super::resources::{TableFieldSchema, TableRow};
use crate::domain::{Row, TableSchema};

pub fn decode_schema(fields: &[TableFieldSchema]) -> Vec<TableSchema> {
    fields.iter().map(decode_field_schema).collect()
}

fn decode_field_schema(field: &TableFieldSchema) -> TableSchema {
    TableSchema {
        name: field.name.clone(),
        field_type: field.field_type.clone(),
        mode: field.mode.clone(),
        description: field.description.clone(),
    }
}

pub fn decode_row(fields: &[TableFieldSchema], row: &TableRow) -> Row {
    let mut decoded = Map::with_capacity(fields.len());
    for (field, cell) in fields.iter().zip(row.f.iter()) {
        decoded.insert(field.name.clone(), decode_field(field, &cell.v));
    }
    decoded
}

fn decode_field(field: &TableFieldSchema, value: &Value) -> Value {
    if field.is_repeated() {
        return match value {
            Value::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|item| decode_scalar(field, cell_value(item)))
                    .collect(),
            ),
            Value::Null => Value::Array(Vec::new()),
            other => decode_scalar(field, other),
        };
    }
    decode_scalar(field, value)
}

/// Repeated entries are wrapped as `{"v": ...}`.
fn cell_value(item: &Value) -> &Value {
    match item {
        Value::Object(map) if map.contains_key("v") => &map["v"],
        other => other,
    }
}

fn decode_scalar(field: &TableFieldSchema, value: &Value) -> Value {
    if value.is_null() {
        return Value::Null;
    }

    match field.field_type.to_ascii_uppercase().as_str() {
        "RECORD" | "STRUCT" => decode_record(field, value),
        "INTEGER" | "INT64" => match value {
            Value::String(text) => text
                .parse::<i64>()
                .map(Value::from)
                .unwrap_or_else(|_| value.clone()),
            other => other.clone(),
        },
        "FLOAT" | "FLOAT64" => match value {
            Value::String(text) => text
                .parse::<f64>()
                .ok()
                .and_then(Number::from_f64)
                .map(Value::Number)
                .unwrap_or_else(|| value.clone()),
            other => other.clone(),
        },
        "BOOLEAN" | "BOOL" => match value {
            Value::String(text) if text.eq_ignore_ascii_case("true") => Value::Bool(true),
            Value::String(text) if text.eq_ignore_ascii_case("false") => Value::Bool(false),
            other => other.clone(),
        },
        "TIMESTAMP" => match value {
            Value::String(text) => decode_timestamp(text)
                .map(Value::String)
                .unwrap_or_else(|| value.clone()),
            other => other.clone(),
        },
        "JSON" => match value {
            Value::String(text) => serde_json::from_str(text).unwrap_or_else(|_| value.clone()),
            other => other.clone(),
        },
        _ => value.clone(),
    }
}

fn decode_record(field: &TableFieldSchema, value: &Value) -> Value {
    let cells = match value.get("f").and_then(Value::as_array) {
        Some(cells) => cells,
        None => return value.clone(),
    };

    let mut record = Map::with_capacity(field.fields.len());
    for (sub_field, cell) in field.fields.iter().zip(cells.iter()) {
        record.insert(sub_field.name.clone(), decode_field(sub_field, cell_value(cell)));
    }
    Value::Object(record)
}

/// Accepts int64 microseconds and the legacy float-seconds encoding.
fn decode_timestamp(text: &str) -> Option<String> {
    let timestamp: DateTime<Utc> = match text.parse::<i64>() {
        Ok(micros) => DateTime::from_timestamp_micros(micros)?,
        Err(_) => {
            let seconds = text.parse::<f64>().ok()?;
            DateTime::from_timestamp_micros((seconds * 1_000_000.0).round() as i64)?
        }
    };
    Some(timestamp.to_rfc3339_opts(SecondsFormat::AutoSi, true))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn orders_schema() -> Vec<TableFieldSchema> {
        vec![
            TableFieldSchema::new("id", "INTEGER").with_mode("REQUIRED"),
            TableFieldSchema::new("amount", "FLOAT"),
            TableFieldSchema::new("paid", "BOOLEAN"),
            TableFieldSchema::new("placed_at", "TIMESTAMP"),
            TableFieldSchema::new("price", "NUMERIC"),
            TableFieldSchema::new("tags", "STRING").with_mode("REPEATED"),
            TableFieldSchema::new("customer", "RECORD").with_fields(vec![
                TableFieldSchema::new("name", "STRING"),
                TableFieldSchema::new("visits", "INT64"),
            ]),
            TableFieldSchema::new("attributes", "JSON"),
            TableFieldSchema::new("note", "STRING"),
        ]
    }

    #[test]
    fn rows_are_decoded_by_field_type() {
        let row = TableRow::new([
            json!("42"),
            json!("19.5"),
            json!("true"),
            json!("1700000000123456"),
            json!("10.25"),
            json!([{ "v": "a" }, { "v": "b" }]),
            json!({ "f": [{ "v": "Ada" }, { "v": "3" }] }),
            json!("{\"vip\":true}"),
            Value::Null,
        ]);

        let decoded = Value::Object(decode_row(&orders_schema(), &row));

        assert_eq!(
            decoded,
            json!({
                "id": 42,
                "amount": 19.5,
                "paid": true,
                "placed_at": "2023-11-14T22:13:20.123456Z",
                "price": "10.25",
                "tags": ["a", "b"],
                "customer": { "name": "Ada", "visits": 3 },
                "attributes": { "vip": true },
                "note": null
            })
        );
    }

    #[test]
    fn decoded_rows_keep_column_order() {
        let row = TableRow::new([json!("1"), json!("2"), json!("3")]);
        let fields = vec![
            TableFieldSchema::new("z", "INTEGER"),
            TableFieldSchema::new("a", "INTEGER"),
            TableFieldSchema::new("m", "INTEGER"),
        ];

        let keys: Vec<String> = decode_row(&fields, &row).keys().cloned().collect();
        assert_eq!(keys, vec!["z", "a", "m"]);
    }

    #[test]
    fn legacy_float_timestamps_are_accepted() {
        assert_eq!(
            decode_timestamp("1.7E9").as_deref(),
            Some("2023-11-14T22:13:20Z")
        );
        assert_eq!(decode_timestamp("not a time"), None);
    }

    #[test]
    fn schema_keeps_mode_and_description() {
        let mut field = TableFieldSchema::new("n", "INTEGER").with_mode("NULLABLE");
        field.description = Some("order count".to_string());

        assert_eq!(
            decode_schema(&[field]),
            vec![TableSchema {
                name: "n".to_string(),
                field_type: "INTEGER".to_string(),
                mode: Some("NULLABLE".to_string()),
                description: Some("order count".to_string()),
            }]
        );
    }
}
