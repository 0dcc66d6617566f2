//! # Row Formatting
//!
//! Canonical, store-ready projection of a [`Reading`].
//!
//! Float fields are written with exactly one decimal place, integer fields as
//! plain integers and date/time in the station's own `DD-MM-YYYY` and
//! `HH:MM:SS` notation. Two readings are considered the same when their
//! formatted rows are equal, so this projection is also the duplicate test
//! used by the gatekeeper: noise that rounds away at one decimal never counts
//! as a change.

use serde::{Deserialize, Serialize};

use super::protocol::*;

/// One full 10-cell store row, in [`STORE_HEADER`] order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PersistedRow {
    cells: [String; ROW_WIDTH],
}

impl PersistedRow {
    /// Build a row from cells already in store order.
    ///
    /// Returns `None` unless exactly [`ROW_WIDTH`] cells are given.
    pub fn from_cells(cells: Vec<String>) -> Option<Self> {
        let cells: [String; ROW_WIDTH] = cells.try_into().ok()?;
        Some(Self { cells })
    }

    /// The canonical projection of a reading
    ///
    /// # Examples
    ///
    /// ```
    /// use aws_monitor::station::{format::PersistedRow, parser::parse};
    ///
    /// let reading = parse(
    ///     "12:00:00 01-01-2024 Temp=25.35 Kelembaban=60 W.Speed=3.2 W.Dir=180 \
    ///      Press=1012.4 Hujan=0.5 Rad=120.0 Signal=-70",
    /// ).unwrap();
    ///
    /// let row = PersistedRow::from_reading(&reading);
    /// let cells: Vec<&str> = row.cells().iter().map(String::as_str).collect();
    /// assert_eq!(
    ///     cells,
    ///     ["01-01-2024", "12:00:00", "25.3", "60", "3.2", "180", "1012.4", "0.5", "120.0", "-70"]
    /// );
    /// ```
    pub fn from_reading(reading: &Reading) -> Self {
        let date = reading
            .date
            .map(|d| d.format(DATE_FORMAT).to_string())
            .unwrap_or_default();
        let time = reading
            .time
            .map(|t| t.format(TIME_FORMAT).to_string())
            .unwrap_or_default();

        Self {
            cells: [
                date.trim().to_string(),
                time.trim().to_string(),
                format_one_decimal(reading.temperature_c),
                reading.humidity_pct.to_string(),
                format_one_decimal(reading.wind_speed_ms),
                reading.wind_dir_deg.to_string(),
                format_one_decimal(reading.pressure_hpa),
                format_one_decimal(reading.rain_mm),
                format_one_decimal(reading.radiation_wm2),
                reading.signal.to_string(),
            ],
        }
    }

    /// All cells in store order
    pub fn cells(&self) -> &[String; ROW_WIDTH] {
        &self.cells
    }

    /// Cell at a store column (see the `COL_*` constants)
    pub fn cell(&self, column: usize) -> &str {
        &self.cells[column]
    }

    /// Station-local date cell, empty when the reading had no timestamp
    pub fn date(&self) -> &str {
        self.cell(COL_DATE)
    }
}

/// Format a float with one decimal place, rounding half toward zero.
///
/// The value is first rounded to six decimals to absorb binary representation
/// error (`1012.4` is stored as `1012.39999...`). The remaining digits past
/// the first decimal round up only when they exceed one half, so `25.39`
/// becomes `25.4` while `25.35` stays `25.3`. Values that round to zero print
/// as `0.0`, never `-0.0`.
///
/// # Examples
///
/// ```
/// use aws_monitor::station::format::format_one_decimal;
///
/// assert_eq!(format_one_decimal(25.35), "25.3");
/// assert_eq!(format_one_decimal(0.99), "1.0");
/// ```
pub fn format_one_decimal(value: f64) -> String {
    if !value.is_finite() {
        return value.to_string();
    }

    let micro = format!("{:.6}", value.abs());
    let Some((whole, fraction)) = micro.split_once('.') else {
        return format!("{}.0", micro);
    };
    let (tenths, rest) = fraction.split_at(1);

    // Integer count of tenths, as decimal digits
    let mut digits: Vec<u8> = whole.bytes().chain(tenths.bytes()).map(|b| b - b'0').collect();
    if rest > HALF {
        increment(&mut digits);
    }

    let negative = value < 0.0 && digits.iter().any(|&d| d != 0);
    let (int_part, tenth) = digits.split_at(digits.len() - 1);
    let int_part: String = int_part.iter().map(|&d| char::from(b'0' + d)).collect();

    format!("{}{}.{}", if negative { "-" } else { "" }, int_part, tenth[0])
}

/// Digits after the first decimal that sit exactly at one half
const HALF: &str = "50000";

fn increment(digits: &mut Vec<u8>) {
    for digit in digits.iter_mut().rev() {
        if *digit == 9 {
            *digit = 0;
        } else {
            *digit += 1;
            return;
        }
    }
    digits.insert(0, 1);
}
