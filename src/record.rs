//! Calibration records as delivered by a [`RecordSource`][crate::source::RecordSource].
//!
//! A record is one measured row for one instrument at one point in time.  The measurement
//! fields are kept in an explicit, insertion-ordered mapping so the column order observed in
//! the source survives all the way into the rendered table.

use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

const NUMBER_PRECISION: f64 = 10_000.0;

/// Formats a reading rounded to four decimals, keeping one decimal for whole values.
pub fn format_number(value: f64) -> String {
    let scaled = value * NUMBER_PRECISION;
    let mut rounded = if scaled.is_finite() {
        scaled.round() / NUMBER_PRECISION
    } else {
        value
    };
    if rounded == 0.0 {
        rounded = 0.0;
    }
    if rounded.fract() == 0.0 && rounded.abs() < 1e15 {
        format!("{:.1}", rounded)
    } else {
        format!("{}", rounded)
    }
}

/// A single measurement value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// Numeric reading.
    Number(f64),
    /// Free-form text such as a switch state or a pass/fail marker.
    Text(String),
}

impl FieldValue {
    /// Interprets a spreadsheet cell. Blank cells yield `None`.
    pub fn parse_cell(cell: &str) -> Option<Self> {
        let trimmed = cell.trim();
        if trimmed.is_empty() {
            return None;
        }
        match trimmed.parse::<f64>() {
            Ok(number) if number.is_finite() => Some(Self::Number(number)),
            _ => Some(Self::Text(trimmed.to_string())),
        }
    }

    /// Text used when the value identifies something, such as a serial number or a name.
    ///
    /// Whole numbers print without a decimal part.
    pub fn as_label(&self) -> String {
        match self {
            Self::Number(value) if value.fract() == 0.0 && value.abs() < 1e15 => {
                format!("{}", *value as i64)
            }
            Self::Number(value) => value.to_string(),
            Self::Text(text) => text.clone(),
        }
    }

    /// Returns the numeric value, if this is a number.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(value) => Some(*value),
            Self::Text(_) => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(value) => f.write_str(&format_number(*value)),
            Self::Text(text) => f.write_str(text),
        }
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// Insertion-ordered mapping from measurement-field name to value.
///
/// Setting a field that already exists replaces its value in place.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Fields {
    entries: Vec<(String, FieldValue)>,
}

impl Fields {
    /// Creates an empty mapping.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `name` to `value`, keeping the original position of an existing field.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<FieldValue>) {
        let name = name.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(existing, _)| *existing == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    /// Looks up a field by name.
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, value)| value)
    }

    /// Iterates over field names in insertion order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    /// Iterates over `(name, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.entries.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for Fields
where
    K: Into<String>,
    V: Into<FieldValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut fields = Fields::new();
        for (name, value) in iter {
            fields.insert(name, value);
        }
        fields
    }
}

impl Serialize for Fields {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, value) in &self.entries {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

struct FieldsVisitor;

impl<'de> Visitor<'de> for FieldsVisitor {
    type Value = Fields;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a map of measurement names to numbers or strings")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Fields, A::Error> {
        let mut fields = Fields::new();
        while let Some((name, value)) = access.next_entry::<String, Option<FieldValue>>()? {
            if let Some(value) = value {
                fields.insert(name, value);
            }
        }
        Ok(fields)
    }
}

impl<'de> Deserialize<'de> for Fields {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(FieldsVisitor)
    }
}

/// Errors raised when constructing a record with invalid data.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RecordError {
    /// The instrument identifier was empty or whitespace only.
    EmptyInstrumentId,
}

impl fmt::Display for RecordError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyInstrumentId => write!(f, "instrument identifier must not be empty"),
        }
    }
}

impl std::error::Error for RecordError {}

#[derive(Deserialize)]
struct RecordRepr {
    instrument_id: String,
    timestamp: NaiveDateTime,
    #[serde(default)]
    fields: Fields,
    #[serde(default)]
    notes: Option<String>,
}

impl TryFrom<RecordRepr> for CalibrationRecord {
    type Error = RecordError;

    fn try_from(repr: RecordRepr) -> Result<Self, Self::Error> {
        let mut record = CalibrationRecord::new(repr.instrument_id, repr.timestamp)?;
        record.fields = repr.fields;
        record.notes = normalize_notes(repr.notes);
        Ok(record)
    }
}

fn normalize_notes(notes: Option<String>) -> Option<String> {
    notes
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
}

/// One row of calibration data for one instrument.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RecordRepr")]
pub struct CalibrationRecord {
    instrument_id: String,
    timestamp: NaiveDateTime,
    fields: Fields,
    #[serde(skip_serializing_if = "Option::is_none")]
    notes: Option<String>,
}

impl CalibrationRecord {
    /// Creates a record without measurements. The identifier is trimmed and must not be empty.
    pub fn new(
        instrument_id: impl Into<String>,
        timestamp: NaiveDateTime,
    ) -> Result<Self, RecordError> {
        let instrument_id = instrument_id.into().trim().to_string();
        if instrument_id.is_empty() {
            return Err(RecordError::EmptyInstrumentId);
        }
        Ok(Self {
            instrument_id,
            timestamp,
            fields: Fields::new(),
            notes: None,
        })
    }

    /// Adds a measurement and returns the updated record.
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(name, value);
        self
    }

    /// Replaces all measurements and returns the updated record.
    pub fn with_fields(mut self, fields: Fields) -> Self {
        self.fields = fields;
        self
    }

    /// Attaches free-text notes. Blank notes are dropped.
    pub fn with_notes(mut self, notes: impl Into<Option<String>>) -> Self {
        self.notes = normalize_notes(notes.into());
        self
    }

    pub fn instrument_id(&self) -> &str {
        &self.instrument_id
    }

    pub fn timestamp(&self) -> NaiveDateTime {
        self.timestamp
    }

    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }
}

/// Inclusive calendar-date window used to select the records of a run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct DateRange {
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
}

impl DateRange {
    /// Creates a range; either end may be open. Reversed bounds are swapped.
    pub fn new(from: Option<NaiveDate>, to: Option<NaiveDate>) -> Self {
        match (from, to) {
            (Some(start), Some(end)) if start > end => Self {
                from: Some(end),
                to: Some(start),
            },
            _ => Self { from, to },
        }
    }

    pub fn from(&self) -> Option<NaiveDate> {
        self.from
    }

    pub fn to(&self) -> Option<NaiveDate> {
        self.to
    }

    /// Returns whether the calendar date of `timestamp` lies within the range.
    pub fn contains(&self, timestamp: NaiveDateTime) -> bool {
        let date = timestamp.date();
        self.from.map_or(true, |from| date >= from) && self.to.map_or(true, |to| date <= to)
    }

    /// Keeps only the records inside the range, preserving their order.
    pub fn retain(&self, records: Vec<CalibrationRecord>) -> Vec<CalibrationRecord> {
        records
            .into_iter()
            .filter(|record| self.contains(record.timestamp()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(day: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, day)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap()
    }

    #[test]
    fn numbers_are_rounded_to_four_decimals() {
        assert_eq!(format_number(1.0), "1.0");
        assert_eq!(format_number(1.23456), "1.2346");
        assert_eq!(format_number(-0.00001), "0.0");
        assert_eq!(format_number(5.1), "5.1");
    }

    #[test]
    fn huge_numbers_print_without_rounding_overflow() {
        let text = format_number(1.0e305);
        assert!(!text.contains("inf"), "{}", text);
        assert_eq!(text.parse::<f64>().expect("finite"), 1.0e305);
        assert_eq!(format_number(-f64::MAX).parse::<f64>().expect("finite"), -f64::MAX);
    }

    #[test]
    fn labels_drop_the_decimal_part_of_whole_numbers() {
        assert_eq!(FieldValue::Number(40212.0).as_label(), "40212");
        assert_eq!(FieldValue::Number(2.5).as_label(), "2.5");
        assert_eq!(FieldValue::from("MS-12").as_label(), "MS-12");
    }

    #[test]
    fn cells_parse_as_numbers_or_text() {
        assert_eq!(FieldValue::parse_cell(" 4.5 "), Some(FieldValue::Number(4.5)));
        assert_eq!(FieldValue::parse_cell("OK"), Some(FieldValue::Text("OK".into())));
        assert_eq!(FieldValue::parse_cell("   "), None);
        assert_eq!(FieldValue::parse_cell("NaN"), Some(FieldValue::Text("NaN".into())));
    }

    #[test]
    fn fields_keep_insertion_order_and_replace_in_place() {
        let mut fields = Fields::new();
        fields.insert("zero", 0.0);
        fields.insert("span", 10.0);
        fields.insert("zero", 0.1);
        assert_eq!(fields.names().collect::<Vec<_>>(), vec!["zero", "span"]);
        assert_eq!(fields.get("zero"), Some(&FieldValue::Number(0.1)));
    }

    #[test]
    fn empty_instrument_id_is_rejected() {
        assert_eq!(
            CalibrationRecord::new("  ", at(1)).unwrap_err(),
            RecordError::EmptyInstrumentId
        );
    }

    #[test]
    fn records_deserialize_with_ordered_fields() {
        let json = r#"{
            "instrument_id": " PT-101 ",
            "timestamp": "2024-03-01T09:30:00",
            "fields": {"zeta": 1.5, "alpha": "pass", "skipped": null},
            "notes": "  "
        }"#;
        let record: CalibrationRecord = serde_json::from_str(json).expect("valid record");
        assert_eq!(record.instrument_id(), "PT-101");
        assert_eq!(record.fields().names().collect::<Vec<_>>(), vec!["zeta", "alpha"]);
        assert_eq!(record.notes(), None);
    }

    #[test]
    fn records_with_blank_ids_fail_to_deserialize() {
        let json = r#"{"instrument_id": "", "timestamp": "2024-03-01T09:30:00"}"#;
        assert!(serde_json::from_str::<CalibrationRecord>(json).is_err());
    }

    #[test]
    fn date_range_is_inclusive_and_normalized() {
        let range = DateRange::new(at(10).date().into(), at(5).date().into());
        assert_eq!(range.from(), Some(at(5).date()));
        assert!(range.contains(at(5)));
        assert!(range.contains(at(10)));
        assert!(!range.contains(at(11)));
        assert!(DateRange::default().contains(at(30)));
    }
}
