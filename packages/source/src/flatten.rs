//! Flattens heterogeneous upstream records into attribute maps.
//!
//! Two record shapes arrive from the feeds:
//!
//! - `GeoJSON` features (`{"properties": {...}, "geometry": {...}}`): the
//!   properties become the record and the geometry is converted to WKT
//!   under the `geometry` key.
//! - Plain JSON objects: copied as-is, with nested objects and arrays
//!   serialized to JSON text so every value is a scalar. The
//!   `multipolygon` attribute is the exception and is converted to WKT.
//!
//! Flattening never fails. Shapes it does not recognize degrade to text.

use accident_map_spatial::normalize::normalize;
use serde_json::Value;

/// A flat attribute map. Values are scalars (string, number, bool) or null.
pub type FlatRecord = serde_json::Map<String, Value>;

/// Attribute carrying geometry in plain (non-`GeoJSON`) Socrata exports.
const MULTIPOLYGON_ATTR: &str = "multipolygon";

/// Attribute that receives the WKT of a `GeoJSON` feature's geometry.
pub const GEOMETRY_ATTR: &str = "geometry";

/// Attribute used to hold records that are not JSON objects at all.
const VALUE_ATTR: &str = "value";

/// Flattens every record. Empty input yields empty output.
#[must_use]
pub fn flatten(records: &[Value]) -> Vec<FlatRecord> {
    records.iter().map(flatten_record).collect()
}

/// Flattens a single record.
#[must_use]
pub fn flatten_record(record: &Value) -> FlatRecord {
    let Value::Object(object) = record else {
        let mut flat = FlatRecord::new();
        flat.insert(VALUE_ATTR.to_string(), Value::String(record.to_string()));
        return flat;
    };

    if let Some(Value::Object(properties)) = object.get("properties") {
        let mut flat = properties.clone();
        let geometry = object
            .get(GEOMETRY_ATTR)
            .and_then(normalize)
            .map_or(Value::Null, Value::String);
        flat.insert(GEOMETRY_ATTR.to_string(), geometry);
        return flat;
    }

    object
        .iter()
        .map(|(key, value)| (key.clone(), flatten_value(key, value)))
        .collect()
}

fn flatten_value(key: &str, value: &Value) -> Value {
    match value {
        Value::Object(_) if key == MULTIPOLYGON_ATTR => {
            normalize(value).map_or(Value::Null, Value::String)
        }
        Value::Object(_) | Value::Array(_) => Value::String(value.to_string()),
        scalar => scalar.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_input_yields_empty_output() {
        assert!(flatten(&[]).is_empty());
    }

    #[test]
    fn geojson_feature_uses_properties_and_wkt_geometry() {
        let feature = json!({
            "type": "Feature",
            "properties": {"id": "abc", "start_dt": "2024-03-01T08:15:00.000"},
            "geometry": {"type": "Point", "coordinates": [-114.05, 51.05]}
        });

        let flat = flatten_record(&feature);
        assert_eq!(flat.len(), 3);
        assert_eq!(flat["id"], json!("abc"));
        assert_eq!(flat["geometry"], json!("POINT(-114.05 51.05)"));
        assert!(!flat.contains_key("type"), "feature envelope keys are dropped");
    }

    #[test]
    fn geojson_feature_with_missing_or_unsupported_geometry_is_unlocated() {
        let missing = json!({"properties": {"id": "a"}});
        let null = json!({"properties": {"id": "b"}, "geometry": null});
        let line = json!({
            "properties": {"id": "c"},
            "geometry": {"type": "LineString", "coordinates": [[0, 0], [1, 1]]}
        });

        for feature in [missing, null, line] {
            let flat = flatten_record(&feature);
            assert_eq!(flat["geometry"], Value::Null);
        }
    }

    #[test]
    fn plain_record_serializes_nested_values() {
        let record = json!({
            "id": 7,
            "description": "Two vehicle collision",
            "point": {"type": "Point", "coordinates": [-114.0, 51.0]},
            "tags": ["a", "b"],
            "count": 2,
            "cleared": true,
            "note": null
        });

        let flat = flatten_record(&record);
        assert_eq!(flat["id"], json!(7));
        assert_eq!(flat["description"], json!("Two vehicle collision"));
        assert_eq!(
            flat["point"],
            json!(r#"{"coordinates":[-114.0,51.0],"type":"Point"}"#)
        );
        assert_eq!(flat["tags"], json!(r#"["a","b"]"#));
        assert_eq!(flat["cleared"], json!(true));
        assert_eq!(flat["note"], Value::Null);
    }

    #[test]
    fn plain_record_converts_multipolygon_attribute() {
        let record = json!({
            "name": "DOWNTOWN COMMERCIAL CORE",
            "multipolygon": {
                "type": "MultiPolygon",
                "coordinates": [[[[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 0.0]]]]
            }
        });

        let flat = flatten_record(&record);
        assert_eq!(flat["multipolygon"], json!("MULTIPOLYGON(((0 0, 1 0, 1 1, 0 0)))"));
        assert_eq!(flat["name"], json!("DOWNTOWN COMMERCIAL CORE"));
    }

    #[test]
    fn multipolygon_attribute_as_array_is_serialized_as_text() {
        let record = json!({"multipolygon": [[1, 2]]});
        let flat = flatten_record(&record);
        assert_eq!(flat["multipolygon"], json!("[[1,2]]"));
    }

    #[test]
    fn non_object_records_degrade_to_text() {
        let flat = flatten(&[json!([1, 2]), json!("bare")]);
        assert_eq!(flat.len(), 2);
        assert_eq!(flat[0]["value"], json!("[1,2]"));
        assert_eq!(flat[1]["value"], json!("\"bare\""));
    }
}
