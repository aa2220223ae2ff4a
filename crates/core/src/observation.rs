//! Observation and table-schema model.
//!
//! An [`Observation`] is one row of the ingested stream: a unique, totally
//! ordered timestamp plus a flat set of named scalar fields. The persisted
//! form is a [`ScoredRecord`], the observation extended with a nullable
//! anomaly flag.
//!
//! Field order must be deterministic because the table schema and the feature
//! matrix both derive their column order from it. JSON objects do not carry a
//! reliable insertion order, so fields are kept in lexicographic order
//! (`BTreeMap`) and that order is the canonical column order everywhere.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde_json::{Map as JsonMap, Value as JsonValue};

use crate::error::{DomainError, DomainResult};

/// Name of the column the storage layer appends for the anomaly verdict.
pub const ANOMALY_FLAG_COLUMN: &str = "is_anomaly";

/// A single scalar field value.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Float(f64),
    Integer(i64),
    Timestamp(DateTime<Utc>),
    Text(String),
}

impl FieldValue {
    /// Coerce to a numeric feature value.
    ///
    /// Text is parsed leniently (mirrors upstream producers that emit numbers
    /// as strings); timestamps coerce to epoch seconds. `None` means the value
    /// is genuinely non-numeric and must surface as a data-quality failure.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Float(v) => Some(*v),
            FieldValue::Integer(v) => Some(*v as f64),
            FieldValue::Timestamp(ts) => Some(ts.timestamp() as f64),
            FieldValue::Text(s) => s.trim().parse::<f64>().ok(),
        }
    }

    pub fn kind(&self) -> FieldKind {
        match self {
            FieldValue::Float(_) => FieldKind::Numeric,
            FieldValue::Integer(_) => FieldKind::Integer,
            FieldValue::Timestamp(_) => FieldKind::Timestamp,
            FieldValue::Text(_) => FieldKind::Text,
        }
    }

    pub fn to_json(&self) -> JsonValue {
        match self {
            FieldValue::Float(v) => JsonValue::from(*v),
            FieldValue::Integer(v) => JsonValue::from(*v),
            FieldValue::Timestamp(ts) => JsonValue::from(ts.to_rfc3339()),
            FieldValue::Text(s) => JsonValue::from(s.clone()),
        }
    }
}

/// Storage-level column kind.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FieldKind {
    Numeric,
    Integer,
    Timestamp,
    Text,
}

impl FieldKind {
    /// Whether a value of `value_kind` may land in a column of this kind.
    ///
    /// Integers widen into numeric columns; everything else must match
    /// exactly. A float arriving for an integer column is schema drift, not a
    /// tolerated narrowing.
    fn accepts(self, value_kind: FieldKind) -> bool {
        self == value_kind || (self == FieldKind::Numeric && value_kind == FieldKind::Integer)
    }
}

/// One record of the ingested stream.
///
/// Identity is the timestamp: no two observations share one, and the stream
/// is totally ordered by it.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    timestamp: DateTime<Utc>,
    values: BTreeMap<String, FieldValue>,
}

impl Observation {
    /// Parse a flat JSON object into an observation.
    ///
    /// `timestamp_field` names the field carrying the record timestamp; it
    /// must be present and RFC 3339-parseable. Nested values, arrays, booleans
    /// and nulls are rejected: the wire contract is a flat map of scalars.
    pub fn from_json(body: &JsonValue, timestamp_field: &str) -> DomainResult<Self> {
        let map = body
            .as_object()
            .ok_or_else(|| DomainError::validation("record body must be a JSON object"))?;

        let timestamp = parse_timestamp(map, timestamp_field)?;

        let mut values = BTreeMap::new();
        for (name, value) in map {
            let field = if name == timestamp_field {
                FieldValue::Timestamp(timestamp)
            } else {
                parse_scalar(name, value)?
            };
            values.insert(name.clone(), field);
        }

        Ok(Self { timestamp, values })
    }

    /// Reassemble an observation from already-typed parts (storage decode
    /// path). `timestamp` must equal the value stored under the timestamp
    /// field in `values`.
    pub fn from_parts(timestamp: DateTime<Utc>, values: BTreeMap<String, FieldValue>) -> Self {
        Self { timestamp, values }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.values.get(field)
    }

    /// Fields in canonical (lexicographic) order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn field_count(&self) -> usize {
        self.values.len()
    }

    /// The raw value of the target field, required and numeric.
    pub fn target_value(&self, target_field: &str) -> DomainResult<f64> {
        let value = self.values.get(target_field).ok_or_else(|| {
            DomainError::validation(format!("missing target field '{target_field}'"))
        })?;
        value
            .as_f64()
            .ok_or_else(|| DomainError::non_numeric(target_field, format!("{value:?}")))
    }
}

fn parse_timestamp(map: &JsonMap<String, JsonValue>, timestamp_field: &str) -> DomainResult<DateTime<Utc>> {
    let raw = map.get(timestamp_field).ok_or_else(|| {
        DomainError::validation(format!("missing timestamp field '{timestamp_field}'"))
    })?;
    let text = raw.as_str().ok_or_else(|| {
        DomainError::validation(format!(
            "timestamp field '{timestamp_field}' must be an RFC 3339 string"
        ))
    })?;
    DateTime::parse_from_rfc3339(text)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| {
            DomainError::validation(format!("invalid timestamp '{text}' in '{timestamp_field}': {e}"))
        })
}

fn parse_scalar(name: &str, value: &JsonValue) -> DomainResult<FieldValue> {
    match value {
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(FieldValue::Integer(i))
            } else if let Some(f) = n.as_f64() {
                Ok(FieldValue::Float(f))
            } else {
                Err(DomainError::validation(format!(
                    "field '{name}' holds an unrepresentable number"
                )))
            }
        }
        JsonValue::String(s) => Ok(FieldValue::Text(s.clone())),
        other => Err(DomainError::validation(format!(
            "field '{name}' must be a scalar, got {other}"
        ))),
    }
}

/// A persisted row: observation plus the (nullable) anomaly verdict.
///
/// `is_anomaly` is `None` for unscored rows (cold-start persistence); once
/// written the row is never mutated by the steady-state path.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredRecord {
    pub observation: Observation,
    pub is_anomaly: Option<bool>,
}

impl ScoredRecord {
    pub fn new(observation: Observation, is_anomaly: Option<bool>) -> Self {
        Self {
            observation,
            is_anomaly,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.observation.timestamp()
    }

    /// Flat JSON rendition for read-only consumers.
    pub fn to_json(&self) -> JsonValue {
        let mut map = JsonMap::new();
        for (name, value) in self.observation.fields() {
            map.insert(name.to_string(), value.to_json());
        }
        map.insert(
            ANOMALY_FLAG_COLUMN.to_string(),
            match self.is_anomaly {
                Some(flag) => JsonValue::from(flag),
                None => JsonValue::Null,
            },
        );
        JsonValue::Object(map)
    }
}

/// The negotiated table schema: ordered (field name, kind) pairs, excluding
/// the anomaly-flag column (the storage layer appends that itself).
///
/// Inferred once from the first observation and immutable thereafter; later
/// observations that do not fit are schema drift, never an auto-migration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    fields: Vec<(String, FieldKind)>,
}

impl TableSchema {
    /// Infer the schema from the shape of the first observation.
    pub fn infer(observation: &Observation) -> DomainResult<Self> {
        let fields: Vec<(String, FieldKind)> = observation
            .fields()
            .map(|(name, value)| (name.to_string(), value.kind()))
            .collect();
        if fields.is_empty() {
            return Err(DomainError::validation("observation has no fields"));
        }
        Ok(Self { fields })
    }

    /// Check a later observation against the negotiated schema.
    ///
    /// The field-name set must match exactly: a missing field is drift (never
    /// silently null-padded) and so is an unknown extra field.
    pub fn validate(&self, observation: &Observation) -> DomainResult<()> {
        for (name, kind) in &self.fields {
            match observation.get(name) {
                None => {
                    return Err(DomainError::schema_mismatch(format!(
                        "record is missing field '{name}'"
                    )));
                }
                Some(value) if !kind.accepts(value.kind()) => {
                    return Err(DomainError::schema_mismatch(format!(
                        "field '{name}' expected {kind:?}, got {:?}",
                        value.kind()
                    )));
                }
                Some(_) => {}
            }
        }
        if observation.field_count() != self.fields.len() {
            let known: Vec<&str> = self.fields.iter().map(|(n, _)| n.as_str()).collect();
            let extra: Vec<&str> = observation
                .fields()
                .map(|(n, _)| n)
                .filter(|n| !known.contains(n))
                .collect();
            return Err(DomainError::schema_mismatch(format!(
                "record carries unknown field(s): {}",
                extra.join(", ")
            )));
        }
        Ok(())
    }

    pub fn fields(&self) -> &[(String, FieldKind)] {
        &self.fields
    }

    /// Column names that feed the feature matrix: everything except the
    /// timestamp column (which is the row index, not a feature).
    pub fn feature_columns(&self, timestamp_field: &str) -> Vec<String> {
        self.fields
            .iter()
            .filter(|(name, _)| name != timestamp_field)
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// The single timestamp-kind column, if the schema has exactly one.
    pub fn timestamp_column(&self) -> Option<&str> {
        let mut it = self
            .fields
            .iter()
            .filter(|(_, kind)| *kind == FieldKind::Timestamp)
            .map(|(name, _)| name.as_str());
        let first = it.next()?;
        if it.next().is_some() {
            return None;
        }
        Some(first)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> JsonValue {
        json!({
            "date": "2021-03-01T00:00:00Z",
            "open": 45000.0,
            "high": 45100.5,
            "low": 44800.0,
            "close": 45050.0,
            "volume": 1234,
        })
    }

    #[test]
    fn parses_flat_record() {
        let obs = Observation::from_json(&sample(), "date").unwrap();
        assert_eq!(obs.field_count(), 6);
        assert_eq!(obs.get("volume"), Some(&FieldValue::Integer(1234)));
        assert_eq!(obs.target_value("high").unwrap(), 45100.5);
    }

    #[test]
    fn missing_timestamp_is_validation_error() {
        let err = Observation::from_json(&json!({"high": 1.0}), "date").unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn nested_values_are_rejected() {
        let body = json!({"date": "2021-03-01T00:00:00Z", "high": {"nested": 1}});
        let err = Observation::from_json(&body, "date").unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn missing_target_is_validation_error() {
        let obs = Observation::from_json(&sample(), "date").unwrap();
        let err = obs.target_value("vwap").unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn numeric_text_coerces() {
        assert_eq!(FieldValue::Text(" 42.5 ".into()).as_f64(), Some(42.5));
        assert_eq!(FieldValue::Text("n/a".into()).as_f64(), None);
    }

    #[test]
    fn schema_infers_kinds_in_stable_order() {
        let obs = Observation::from_json(&sample(), "date").unwrap();
        let schema = TableSchema::infer(&obs).unwrap();
        let names: Vec<&str> = schema.fields().iter().map(|(n, _)| n.as_str()).collect();
        // Lexicographic order is the canonical column order.
        assert_eq!(names, vec!["close", "date", "high", "low", "open", "volume"]);
        assert_eq!(schema.fields()[1].1, FieldKind::Timestamp);
        assert_eq!(schema.fields()[5].1, FieldKind::Integer);
    }

    #[test]
    fn missing_field_is_schema_drift() {
        let obs = Observation::from_json(&sample(), "date").unwrap();
        let schema = TableSchema::infer(&obs).unwrap();

        let mut body = sample();
        body.as_object_mut().unwrap().remove("volume");
        let later = Observation::from_json(&body, "date").unwrap();

        let err = schema.validate(&later).unwrap_err();
        assert!(matches!(err, DomainError::SchemaMismatch(_)));
        assert!(err.to_string().contains("volume"));
    }

    #[test]
    fn unknown_field_is_schema_drift() {
        let obs = Observation::from_json(&sample(), "date").unwrap();
        let schema = TableSchema::infer(&obs).unwrap();

        let mut body = sample();
        body.as_object_mut()
            .unwrap()
            .insert("vwap".into(), json!(45010.0));
        let later = Observation::from_json(&body, "date").unwrap();

        let err = schema.validate(&later).unwrap_err();
        assert!(err.to_string().contains("vwap"));
    }

    #[test]
    fn integer_widens_into_numeric_column() {
        let first = json!({"date": "2021-03-01T00:00:00Z", "high": 1.5});
        let schema =
            TableSchema::infer(&Observation::from_json(&first, "date").unwrap()).unwrap();

        let later = json!({"date": "2021-03-01T01:00:00Z", "high": 2});
        let obs = Observation::from_json(&later, "date").unwrap();
        assert!(schema.validate(&obs).is_ok());
    }

    #[test]
    fn feature_columns_exclude_timestamp() {
        let obs = Observation::from_json(&sample(), "date").unwrap();
        let schema = TableSchema::infer(&obs).unwrap();
        let cols = schema.feature_columns("date");
        assert_eq!(cols, vec!["close", "high", "low", "open", "volume"]);
    }
}
