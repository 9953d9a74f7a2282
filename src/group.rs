//! Partitioning of calibration records into per-instrument groups.

use std::collections::HashMap;

use serde::Deserialize;

use crate::record::CalibrationRecord;

/// Order in which instrument groups are rendered and archived.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupOrder {
    /// Order of first appearance of each instrument in the input.
    #[default]
    FirstAppearance,
    /// Instrument identifier ascending.
    InstrumentId,
}

/// All records of one instrument, ordered by timestamp ascending.
#[derive(Clone, Debug, PartialEq)]
pub struct InstrumentGroup {
    instrument_id: String,
    records: Vec<CalibrationRecord>,
}

impl InstrumentGroup {
    /// Creates an empty group for `instrument_id`.
    pub fn new(instrument_id: impl Into<String>) -> Self {
        Self {
            instrument_id: instrument_id.into(),
            records: Vec::new(),
        }
    }

    /// Builds a group from records that all belong to `instrument_id`.
    ///
    /// Records for other instruments are rejected and handed back.
    pub fn from_records(
        instrument_id: impl Into<String>,
        records: Vec<CalibrationRecord>,
    ) -> Result<Self, Vec<CalibrationRecord>> {
        let mut group = Self::new(instrument_id);
        let (own, foreign): (Vec<_>, Vec<_>) = records
            .into_iter()
            .partition(|record| record.instrument_id() == group.instrument_id);
        if !foreign.is_empty() {
            return Err(foreign);
        }
        group.records = own;
        group.sort();
        Ok(group)
    }

    pub fn instrument_id(&self) -> &str {
        &self.instrument_id
    }

    /// Records in timestamp order.
    pub fn records(&self) -> &[CalibrationRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Union of measurement-field names across the group, in first-seen order.
    pub fn field_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for record in &self.records {
            for name in record.fields().names() {
                if !names.iter().any(|existing| existing == name) {
                    names.push(name.to_string());
                }
            }
        }
        names
    }

    fn sort(&mut self) {
        // Stable, so records sharing a timestamp keep their input order.
        self.records.sort_by_key(CalibrationRecord::timestamp);
    }
}

/// Partitions `records` into one group per instrument.
///
/// Every record lands in exactly one group. Groups follow `order`; records inside a group
/// follow their timestamps.
pub fn group_records(records: Vec<CalibrationRecord>, order: GroupOrder) -> Vec<InstrumentGroup> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<InstrumentGroup> = Vec::new();

    for record in records {
        let slot = match index.get(record.instrument_id()) {
            Some(&slot) => slot,
            None => {
                let slot = groups.len();
                index.insert(record.instrument_id().to_string(), slot);
                groups.push(InstrumentGroup::new(record.instrument_id()));
                slot
            }
        };
        groups[slot].records.push(record);
    }

    for group in &mut groups {
        group.sort();
    }

    if order == GroupOrder::InstrumentId {
        groups.sort_by(|a, b| a.instrument_id.cmp(&b.instrument_id));
    }

    groups
}
