//! Expected readings across an instrument's range, and the error of the as-found values.
//!
//! Checkpoints sit at 0, 25, 50, 75 and 100 % of span. Each checkpoint has a desired value in
//! engineering units and the matching 4-20 mA loop current. The as-found readings for a
//! checkpoint come from fields named after it, e.g. `As Found (25%) Up`.

use serde::Deserialize;

use crate::group::InstrumentGroup;
use crate::record::FieldValue;

/// Checkpoints as a percentage of span.
pub const CHECKPOINTS: [u32; 5] = [0, 25, 50, 75, 100];

const PERCENT_PLACEHOLDER: &str = "{percent}";
const LOOP_ZERO_MA: f64 = 4.0;
const LOOP_SPAN_MA: f64 = 16.0;
const VALUE_DIGITS: i32 = 4;
const CURRENT_DIGITS: i32 = 3;

/// Names of the catalog entries and record fields used for the span check.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SpanLayout {
    /// Catalog entry holding the lower range value.
    pub min_range_column: String,
    /// Catalog entry holding the upper range value.
    pub max_range_column: String,
    /// Catalog entry holding the engineering unit.
    pub unit_column: String,
    /// Field name of an upscale reading; `{percent}` is replaced by the checkpoint.
    pub up_column: String,
    /// Field name of a downscale reading; `{percent}` is replaced by the checkpoint.
    pub down_column: String,
}

impl Default for SpanLayout {
    fn default() -> Self {
        Self {
            min_range_column: "Min Range".to_string(),
            max_range_column: "Max Range".to_string(),
            unit_column: "Unit".to_string(),
            up_column: "As Found ({percent}%) Up".to_string(),
            down_column: "As Found ({percent}%) Down".to_string(),
        }
    }
}

impl SpanLayout {
    pub fn up_field(&self, percent: u32) -> String {
        self.up_column.replace(PERCENT_PLACEHOLDER, &percent.to_string())
    }

    pub fn down_field(&self, percent: u32) -> String {
        self.down_column
            .replace(PERCENT_PLACEHOLDER, &percent.to_string())
    }
}

fn round_to(value: f64, digits: i32) -> f64 {
    let factor = 10f64.powi(digits);
    let scaled = value * factor;
    if scaled.is_finite() {
        scaled.round() / factor
    } else {
        value
    }
}

fn detail<'a>(details: &'a [(String, String)], label: &str) -> Option<&'a str> {
    let label = label.trim();
    details
        .iter()
        .find(|(name, _)| name.trim().eq_ignore_ascii_case(label))
        .map(|(_, value)| value.trim())
}

fn parse_number(text: &str) -> Option<f64> {
    text.parse::<f64>().ok().filter(|value| value.is_finite())
}

/// Calibrated range of an instrument.
#[derive(Clone, Debug, PartialEq)]
pub struct InstrumentRange {
    min: f64,
    max: f64,
    unit: Option<String>,
}

impl InstrumentRange {
    /// Creates a range; reversed bounds are swapped.
    pub fn new(lower: f64, upper: f64, unit: Option<String>) -> Self {
        let (min, max) = if lower > upper {
            (upper, lower)
        } else {
            (lower, upper)
        };
        Self {
            min,
            max,
            unit: unit.filter(|unit| !unit.trim().is_empty()),
        }
    }

    /// Reads the range from catalog details.
    ///
    /// A missing bound counts as zero; without either bound there is no range.
    pub fn from_details(details: &[(String, String)], layout: &SpanLayout) -> Option<Self> {
        let min = detail(details, &layout.min_range_column).and_then(parse_number);
        let max = detail(details, &layout.max_range_column).and_then(parse_number);
        if min.is_none() && max.is_none() {
            return None;
        }
        let unit = detail(details, &layout.unit_column).map(str::to_string);
        Some(Self::new(min.unwrap_or(0.0), max.unwrap_or(0.0), unit))
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    pub fn unit(&self) -> Option<&str> {
        self.unit.as_deref()
    }

    pub fn span(&self) -> f64 {
        self.max - self.min
    }

    /// Desired reading at `percent` of span, rounded to four decimals.
    pub fn desired(&self, percent: u32) -> f64 {
        round_to(
            self.min + f64::from(percent) / 100.0 * self.span(),
            VALUE_DIGITS,
        )
    }

    /// Loop current for `value`, rounded to three decimals. Undefined for a zero span.
    pub fn desired_milliamps(&self, value: f64) -> Option<f64> {
        let span = self.span();
        if span == 0.0 {
            return None;
        }
        Some(round_to(
            LOOP_ZERO_MA + (value - self.min) / span * LOOP_SPAN_MA,
            CURRENT_DIGITS,
        ))
    }
}

/// Error of `actual` relative to `desired`, in percent. Undefined when `desired` is zero.
pub fn percent_error(actual: f64, desired: f64) -> Option<f64> {
    if desired == 0.0 {
        None
    } else {
        Some((actual - desired) / desired * 100.0)
    }
}

/// One checkpoint row.
#[derive(Clone, Debug, PartialEq)]
pub struct Checkpoint {
    pub percent: u32,
    pub desired: f64,
    pub desired_milliamps: Option<f64>,
    pub actual_up: Option<f64>,
    pub error_up: Option<f64>,
    pub actual_down: Option<f64>,
    pub error_down: Option<f64>,
}

/// Desired values of every checkpoint with the group's as-found readings.
#[derive(Clone, Debug, PartialEq)]
pub struct SpanCheck {
    pub range: InstrumentRange,
    pub checkpoints: Vec<Checkpoint>,
}

impl SpanCheck {
    /// Builds the checkpoints of `range`.
    ///
    /// Each reading is taken from the latest record of `group` that carries it as a number.
    pub fn compute(range: InstrumentRange, group: &InstrumentGroup, layout: &SpanLayout) -> Self {
        let latest = |field: String| {
            group
                .records()
                .iter()
                .rev()
                .find_map(|record| record.fields().get(&field).and_then(FieldValue::as_number))
        };

        let checkpoints = CHECKPOINTS
            .iter()
            .map(|&percent| {
                let desired = range.desired(percent);
                let actual_up = latest(layout.up_field(percent));
                let actual_down = latest(layout.down_field(percent));
                Checkpoint {
                    percent,
                    desired,
                    desired_milliamps: range.desired_milliamps(desired),
                    actual_up,
                    error_up: actual_up.and_then(|actual| percent_error(actual, desired)),
                    actual_down,
                    error_down: actual_down.and_then(|actual| percent_error(actual, desired)),
                }
            })
            .collect();

        Self { range, checkpoints }
    }
}
