//! Conversion between [`Value`] and the Firestore REST value encoding.
//!
//! Every REST value is an object with exactly one key naming its kind:
//!
//! ```json
//! { "integerValue": "250000" }
//! { "mapValue": { "fields": { "name": { "stringValue": "Vase" } } } }
//! ```

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;
use serde_json::{Map, Value as Json, json};

use crate::backend::{BackendError, Document, Fields, FieldTransform, Value};

/// Encode a value for a REST request body.
pub fn encode_value(value: &Value) -> Json {
    match value {
        Value::Null => json!({ "nullValue": null }),
        Value::Bool(b) => json!({ "booleanValue": b }),
        // int64 travels as a decimal string
        Value::Integer(i) => json!({ "integerValue": i.to_string() }),
        Value::Double(d) => encode_double(*d),
        Value::Timestamp(t) => {
            json!({ "timestampValue": t.to_rfc3339_opts(SecondsFormat::Micros, true) })
        }
        Value::String(s) => json!({ "stringValue": s }),
        Value::Array(values) => {
            let values: Vec<Json> = values.iter().map(encode_value).collect();
            json!({ "arrayValue": { "values": values } })
        }
        Value::Map(fields) => json!({ "mapValue": { "fields": encode_fields(fields) } }),
    }
}

fn encode_double(d: f64) -> Json {
    if d.is_nan() {
        json!({ "doubleValue": "NaN" })
    } else if d.is_infinite() {
        let text = if d > 0.0 { "Infinity" } else { "-Infinity" };
        json!({ "doubleValue": text })
    } else {
        json!({ "doubleValue": d })
    }
}

/// Encode a field map.
pub fn encode_fields(fields: &Fields) -> Map<String, Json> {
    fields
        .iter()
        .map(|(k, v)| (k.clone(), encode_value(v)))
        .collect()
}

/// Decode one REST value.
///
/// # Errors
///
/// Returns `BackendError::Decode` for objects that are not a single known
/// value kind.
pub fn decode_value(json: &Json) -> Result<Value, BackendError> {
    let object = json
        .as_object()
        .ok_or_else(|| BackendError::Decode(format!("value is not an object: {json}")))?;
    let (kind, inner) = object
        .iter()
        .next()
        .ok_or_else(|| BackendError::Decode("empty value object".to_string()))?;

    match kind.as_str() {
        "nullValue" => Ok(Value::Null),
        "booleanValue" => inner
            .as_bool()
            .map(Value::Bool)
            .ok_or_else(|| bad_kind(kind, inner)),
        "integerValue" => decode_integer(inner).ok_or_else(|| bad_kind(kind, inner)),
        "doubleValue" => decode_double(inner).ok_or_else(|| bad_kind(kind, inner)),
        "timestampValue" => inner
            .as_str()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|t| Value::Timestamp(t.with_timezone(&Utc)))
            .ok_or_else(|| bad_kind(kind, inner)),
        "stringValue" | "referenceValue" | "bytesValue" => inner
            .as_str()
            .map(|s| Value::String(s.to_string()))
            .ok_or_else(|| bad_kind(kind, inner)),
        "arrayValue" => {
            let values = inner
                .get("values")
                .and_then(Json::as_array)
                .map_or_else(|| Ok(Vec::new()), |vs| vs.iter().map(decode_value).collect())?;
            Ok(Value::Array(values))
        }
        "mapValue" => {
            let fields = inner
                .get("fields")
                .and_then(Json::as_object)
                .map_or_else(|| Ok(Fields::new()), decode_fields)?;
            Ok(Value::Map(fields))
        }
        "geoPointValue" => {
            let mut point = Fields::new();
            for axis in ["latitude", "longitude"] {
                let coordinate = inner.get(axis).and_then(Json::as_f64).unwrap_or(0.0);
                point.insert(axis.to_string(), Value::Double(coordinate));
            }
            Ok(Value::Map(point))
        }
        other => Err(BackendError::Decode(format!("unknown value kind: {other}"))),
    }
}

fn decode_integer(inner: &Json) -> Option<Value> {
    match inner {
        Json::String(s) => s.parse().ok().map(Value::Integer),
        Json::Number(n) => n.as_i64().map(Value::Integer),
        _ => None,
    }
}

fn decode_double(inner: &Json) -> Option<Value> {
    match inner {
        Json::Number(n) => n.as_f64().map(Value::Double),
        Json::String(s) => match s.as_str() {
            "NaN" => Some(Value::Double(f64::NAN)),
            "Infinity" => Some(Value::Double(f64::INFINITY)),
            "-Infinity" => Some(Value::Double(f64::NEG_INFINITY)),
            _ => None,
        },
        _ => None,
    }
}

fn bad_kind(kind: &str, inner: &Json) -> BackendError {
    BackendError::Decode(format!("invalid {kind}: {inner}"))
}

/// Decode a REST field map.
///
/// # Errors
///
/// Returns the first field decoding error.
pub fn decode_fields(fields: &Map<String, Json>) -> Result<Fields, BackendError> {
    fields
        .iter()
        .map(|(k, v)| decode_value(v).map(|v| (k.clone(), v)))
        .collect()
}

/// Document resource as returned by the REST API.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestDocument {
    /// Full resource name, `projects/{p}/databases/{d}/documents/{collection}/{id}`.
    pub name: String,
    #[serde(default)]
    pub fields: Map<String, Json>,
    pub update_time: Option<DateTime<Utc>>,
}

impl RestDocument {
    /// Convert into a [`Document`] keyed by the last path segment.
    ///
    /// # Errors
    ///
    /// Returns `BackendError::Decode` if a field cannot be decoded.
    pub fn into_document(self) -> Result<Document, BackendError> {
        let id = self
            .name
            .rsplit('/')
            .next()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| BackendError::Decode(format!("bad document name: {}", self.name)))?
            .to_string();
        Ok(Document {
            id,
            fields: decode_fields(&self.fields)?,
            update_time: self.update_time,
        })
    }
}

/// Field paths containing anything but `[A-Za-z_][A-Za-z0-9_]*` must be quoted.
pub fn quote_field_path(field: &str) -> String {
    let mut chars = field.chars();
    let simple = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if simple {
        field.to_string()
    } else {
        format!("`{}`", field.replace('\\', "\\\\").replace('`', "\\`"))
    }
}

/// Encode a field transform for `updateTransforms`.
pub fn encode_transform(field: &str, transform: &FieldTransform) -> Json {
    let path = quote_field_path(field);
    match transform {
        FieldTransform::ArrayUnion(values) => {
            let values: Vec<Json> = values.iter().map(encode_value).collect();
            json!({ "fieldPath": path, "appendMissingElements": { "values": values } })
        }
        FieldTransform::ArrayRemove(values) => {
            let values: Vec<Json> = values.iter().map(encode_value).collect();
            json!({ "fieldPath": path, "removeAllFromArray": { "values": values } })
        }
        FieldTransform::ServerTimestamp => {
            json!({ "fieldPath": path, "setToServerValue": "REQUEST_TIME" })
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::fields;

    #[test]
    fn test_encode_scalars() {
        assert_eq!(
            encode_value(&Value::Integer(250_000)),
            json!({ "integerValue": "250000" })
        );
        assert_eq!(
            encode_value(&Value::from("Bình gốm")),
            json!({ "stringValue": "Bình gốm" })
        );
        assert_eq!(encode_value(&Value::Null), json!({ "nullValue": null }));
        assert_eq!(
            encode_value(&Value::Double(f64::NAN)),
            json!({ "doubleValue": "NaN" })
        );
    }

    #[test]
    fn test_encode_timestamp_is_utc_rfc3339() {
        let t = Utc.with_ymd_and_hms(2025, 3, 1, 8, 30, 0).unwrap();
        assert_eq!(
            encode_value(&Value::Timestamp(t)),
            json!({ "timestampValue": "2025-03-01T08:30:00.000000Z" })
        );
    }

    #[test]
    fn test_decode_nested_document() {
        let raw = json!({
            "name": "projects/demo/databases/(default)/documents/users/u1",
            "fields": {
                "fullName": { "stringValue": "Lan" },
                "wishlist": { "arrayValue": { "values": [
                    { "mapValue": { "fields": {
                        "id": { "stringValue": "p1" },
                        "price": { "integerValue": "1000" }
                    } } }
                ] } },
                "cart": { "arrayValue": {} },
                "createdAt": { "timestampValue": "2025-03-01T08:30:00.123456Z" }
            },
            "updateTime": "2025-03-01T08:30:01Z"
        });
        let doc: RestDocument = serde_json::from_value(raw).unwrap();
        let doc = doc.into_document().unwrap();

        assert_eq!(doc.id, "u1");
        assert_eq!(doc.fields["fullName"], Value::from("Lan"));
        assert_eq!(doc.fields["cart"], Value::Array(vec![]));
        let wishlist = doc.fields["wishlist"].as_array().unwrap();
        assert_eq!(
            wishlist[0],
            Value::Map(fields! { "id" => "p1", "price" => 1000_i64 })
        );
        assert!(doc.fields["createdAt"].as_timestamp().is_some());
        assert!(doc.update_time.is_some());
    }

    #[test]
    fn test_decode_accepts_numeric_integer_encoding() {
        assert_eq!(
            decode_value(&json!({ "integerValue": 7 })).unwrap(),
            Value::Integer(7)
        );
    }

    #[test]
    fn test_decode_rejects_unknown_kind() {
        assert!(decode_value(&json!({ "vectorValue": {} })).is_err());
        assert!(decode_value(&json!("bare")).is_err());
    }

    #[test]
    fn test_quote_field_path() {
        assert_eq!(quote_field_path("imageUrl"), "imageUrl");
        assert_eq!(quote_field_path("_private"), "_private");
        assert_eq!(quote_field_path("first-name"), "`first-name`");
        assert_eq!(quote_field_path("9lives"), "`9lives`");
    }

    #[test]
    fn test_encode_array_union_transform() {
        let t = FieldTransform::ArrayUnion(vec![Value::from("p1")]);
        assert_eq!(
            encode_transform("wishlist", &t),
            json!({
                "fieldPath": "wishlist",
                "appendMissingElements": { "values": [{ "stringValue": "p1" }] }
            })
        );
    }
}
