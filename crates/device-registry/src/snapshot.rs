use indexmap::IndexMap;
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;

/// Most recent value of one datapoint.
#[derive(Debug, Clone, PartialEq)]
pub enum DataValue {
    Double(f64),
    Text(String),
    /// Shape is known but nothing has been read yet.
    Unknown,
    /// The device reported an error for this datapoint.
    Null,
}

impl DataValue {
    /// Text form of a JSON value as the relay and driver report it: strings verbatim,
    /// everything else in JSON notation.
    pub fn from_json_text(v: &Value) -> Self {
        match v {
            Value::String(s) => DataValue::Text(s.clone()),
            other => DataValue::Text(other.to_string()),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            DataValue::Double(v) => Some(*v),
            DataValue::Text(s) => s.parse().ok(),
            _ => None,
        }
    }
}

impl fmt::Display for DataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataValue::Double(v) => write!(f, "{v:?}"),
            DataValue::Text(s) => f.write_str(s),
            DataValue::Unknown => f.write_str("unknown"),
            DataValue::Null => Ok(()),
        }
    }
}

impl Serialize for DataValue {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        match self {
            DataValue::Double(v) => s.serialize_f64(*v),
            DataValue::Text(t) => s.serialize_str(t),
            DataValue::Unknown => s.serialize_str("unknown"),
            DataValue::Null => s.serialize_none(),
        }
    }
}

/// A datapoint's value plus whatever metadata its device reports.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValueRecord {
    #[serde(rename = "type")]
    pub data_type: String,
    pub value: DataValue,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dimension: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ValueRecord {
    pub fn new(data_type: impl Into<String>, value: DataValue) -> Self {
        Self {
            data_type: data_type.into(),
            value,
            dimension: None,
            access: None,
            extra: Map::new(),
        }
    }

    pub fn double(v: f64) -> Self {
        Self::new("DOUBLE", DataValue::Double(v))
    }

    /// Text of a field by heading key, if the record has it.
    pub fn field_text(&self, key: &str) -> Option<String> {
        match key {
            "type" => Some(self.data_type.clone()),
            "value" => Some(self.value.to_string()),
            "dimension" | "dim" => self.dimension.as_ref().map(json_text),
            "access" => self.access.clone(),
            other => self.extra.get(other).map(json_text),
        }
    }
}

fn json_text(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Ordered datapoint name → record map. Iteration order is insertion order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Snapshot {
    records: IndexMap<String, ValueRecord>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, record: ValueRecord) {
        self.records.insert(name.into(), record);
    }

    pub fn get(&self, name: &str) -> Option<&ValueRecord> {
        self.records.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut ValueRecord> {
        self.records.get_mut(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.records.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.records.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ValueRecord)> {
        self.records.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Values in key order.
    pub fn values(&self) -> Vec<DataValue> {
        self.records.values().map(|r| r.value.clone()).collect()
    }
}

impl FromIterator<(String, ValueRecord)> for Snapshot {
    fn from_iter<I: IntoIterator<Item = (String, ValueRecord)>>(iter: I) -> Self {
        Self {
            records: iter.into_iter().collect(),
        }
    }
}

/// One column of a device's tabular display: record field key and its label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Heading {
    pub key: &'static str,
    pub label: &'static str,
}

pub const STREAM_HEADINGS: &[Heading] = &[
    Heading {
        key: "type",
        label: "Type",
    },
    Heading {
        key: "value",
        label: "Value",
    },
];

pub const TAG_HEADINGS: &[Heading] = &[
    Heading {
        key: "type",
        label: "Type",
    },
    Heading {
        key: "dimension",
        label: "Dimension",
    },
    Heading {
        key: "access",
        label: "Access",
    },
    Heading {
        key: "value",
        label: "Value",
    },
];

const CELL_LIMIT: usize = 30;

/// Table cell text: `N/A` when absent, cut to 30 characters plus `..` when long.
pub fn truncate_cell(text: Option<&str>) -> String {
    match text {
        None => "N/A".to_string(),
        Some(t) if t.chars().count() > CELL_LIMIT => {
            let mut out: String = t.chars().take(CELL_LIMIT).collect();
            out.push_str("..");
            out
        }
        Some(t) => t.to_string(),
    }
}

/// Equal percentage width for the name column plus one column per heading.
pub fn column_width_percent(headings: &[Heading]) -> u32 {
    100 / (headings.len() as u32 + 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_snapshot_keeps_insertion_order() {
        let mut snap = Snapshot::new();
        for name in ["z", "a", "m"] {
            snap.insert(name, ValueRecord::double(1.0));
        }
        assert_eq!(snap.keys().collect::<Vec<_>>(), vec!["z", "a", "m"]);
    }

    #[test]
    fn test_value_serialization() {
        let mut snap = Snapshot::new();
        snap.insert("x", ValueRecord::double(1.5));
        snap.insert("t", ValueRecord::new("INT", DataValue::Text("5".into())));
        snap.insert("u", ValueRecord::new("BOOL", DataValue::Unknown));
        snap.insert("n", ValueRecord::new("REAL", DataValue::Null));
        let v = serde_json::to_value(&snap).unwrap();
        assert_eq!(
            v,
            json!({
                "x": {"type": "DOUBLE", "value": 1.5},
                "t": {"type": "INT", "value": "5"},
                "u": {"type": "BOOL", "value": "unknown"},
                "n": {"type": "REAL", "value": null},
            })
        );
    }

    #[test]
    fn test_display_forms() {
        assert_eq!(DataValue::Double(1.0).to_string(), "1.0");
        assert_eq!(DataValue::Text("on".into()).to_string(), "on");
        assert_eq!(DataValue::Unknown.to_string(), "unknown");
        assert_eq!(DataValue::Null.to_string(), "");
        assert_eq!(DataValue::from_json_text(&json!(5)).to_string(), "5");
        assert_eq!(DataValue::from_json_text(&json!("abc")).to_string(), "abc");
        assert_eq!(DataValue::from_json_text(&json!([1, 2])).to_string(), "[1,2]");
    }

    #[test]
    fn test_field_text() {
        let mut rec = ValueRecord::new("DINT", DataValue::Text("7".into()));
        rec.dimension = Some(json!([2, 0, 0]));
        rec.access = Some("Read/Write".into());
        rec.extra.insert("scope".into(), json!("program"));
        assert_eq!(rec.field_text("type").as_deref(), Some("DINT"));
        assert_eq!(rec.field_text("value").as_deref(), Some("7"));
        assert_eq!(rec.field_text("dimension").as_deref(), Some("[2,0,0]"));
        assert_eq!(rec.field_text("access").as_deref(), Some("Read/Write"));
        assert_eq!(rec.field_text("scope").as_deref(), Some("program"));
        assert_eq!(rec.field_text("units"), None);
    }

    #[test]
    fn test_truncate_cell() {
        assert_eq!(truncate_cell(None), "N/A");
        assert_eq!(truncate_cell(Some("short")), "short");
        let long = "a".repeat(31);
        assert_eq!(truncate_cell(Some(&long)), format!("{}..", "a".repeat(30)));
        assert_eq!(truncate_cell(Some(&"b".repeat(30))), "b".repeat(30));
    }

    #[test]
    fn test_column_width() {
        assert_eq!(column_width_percent(STREAM_HEADINGS), 33);
        assert_eq!(column_width_percent(TAG_HEADINGS), 20);
    }
}
