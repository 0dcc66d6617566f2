//! # Station Protocol Constants and Types
//!
//! Core definitions for the station's text payload and the row store layout.
//!
//! A payload is free-form text carrying a `HH:MM:SS DD-MM-YYYY` token and ten
//! `Label = value` tokens in any order, for example:
//!
//! ```text
//! 12:00:00 01-01-2024 Temp=25.35 Kelembaban=60 W.Speed=3.2 W.Dir=180
//! Press=1012.4 Hujan=0.5 Rad=120.0 Signal=-70
//! ```

use chrono::{NaiveDate, NaiveTime};

/// Payload label for air temperature (°C)
pub const LABEL_TEMPERATURE: &str = "Temp";

/// Payload label for relative humidity (%)
pub const LABEL_HUMIDITY: &str = "Kelembaban";

/// Payload label for wind speed (m/s)
pub const LABEL_WIND_SPEED: &str = "W.Speed";

/// Payload label for wind direction (degrees)
pub const LABEL_WIND_DIR: &str = "W.Dir";

/// Payload label for barometric pressure (hPa)
pub const LABEL_PRESSURE: &str = "Press";

/// Payload label for cumulative rainfall since the gauge reset (mm)
pub const LABEL_RAIN: &str = "Hujan";

/// Payload label for solar radiation (W/m²)
pub const LABEL_RADIATION: &str = "Rad";

/// Payload label for the link-quality indicator
pub const LABEL_SIGNAL: &str = "Signal";

/// Name used in diagnostics for the combined time/date token
pub const LABEL_TIMESTAMP: &str = "HH:MM:SS DD-MM-YYYY";

/// Station-local date format (`DD-MM-YYYY`)
pub const DATE_FORMAT: &str = "%d-%m-%Y";

/// Station-local time format (`HH:MM:SS`)
pub const TIME_FORMAT: &str = "%H:%M:%S";

/// Number of cells in every store row
pub const ROW_WIDTH: usize = 10;

/// Header row written once at the top of the store
pub const STORE_HEADER: [&str; ROW_WIDTH] = [
    "Tanggal",
    "Waktu",
    "Suhu",
    "Kelembaban",
    "W.Speed",
    "W.Dir",
    "Tekanan",
    "Hujan",
    "Rad",
    "Signal",
];

/// Store column indices
pub const COL_DATE: usize = 0;
pub const COL_TIME: usize = 1;
pub const COL_TEMPERATURE: usize = 2;
pub const COL_HUMIDITY: usize = 3;
pub const COL_WIND_SPEED: usize = 4;
pub const COL_WIND_DIR: usize = 5;
pub const COL_PRESSURE: usize = 6;
pub const COL_RAIN: usize = 7;
pub const COL_RADIATION: usize = 8;
pub const COL_SIGNAL: usize = 9;

/// Relative humidity upper bound (%)
pub const HUMIDITY_MAX: i64 = 100;

/// Wind direction upper bound (degrees, 360 wraps to 0)
pub const WIND_DIR_MAX: i64 = 359;

/// One fully parsed sensor sample.
///
/// Either every numeric field is present or no `Reading` exists at all;
/// only `date`/`time` may be missing when the payload lacks the timestamp token.
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    /// Station-local calendar date
    pub date: Option<NaiveDate>,

    /// Station-local time of day
    pub time: Option<NaiveTime>,

    /// Air temperature in °C
    pub temperature_c: f64,

    /// Relative humidity (0-100%)
    pub humidity_pct: u8,

    /// Wind speed in m/s (≥ 0)
    pub wind_speed_ms: f64,

    /// Wind direction in degrees (0-359)
    pub wind_dir_deg: u16,

    /// Barometric pressure in hPa
    pub pressure_hpa: f64,

    /// Rainfall accumulated since the last gauge reset in mm (≥ 0)
    pub rain_mm: f64,

    /// Solar radiation in W/m² (≥ 0)
    pub radiation_wm2: f64,

    /// Link-quality indicator
    pub signal: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_matches_columns() {
        assert_eq!(STORE_HEADER.len(), ROW_WIDTH);
        assert_eq!(STORE_HEADER[COL_DATE], "Tanggal");
        assert_eq!(STORE_HEADER[COL_TIME], "Waktu");
        assert_eq!(STORE_HEADER[COL_TEMPERATURE], "Suhu");
        assert_eq!(STORE_HEADER[COL_PRESSURE], "Tekanan");
        assert_eq!(STORE_HEADER[COL_RAIN], "Hujan");
        assert_eq!(STORE_HEADER[COL_SIGNAL], "Signal");
    }

    #[test]
    fn test_date_and_time_formats() {
        let date = NaiveDate::parse_from_str("01-01-2024", DATE_FORMAT).unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());

        let time = NaiveTime::parse_from_str("12:00:00", TIME_FORMAT).unwrap();
        assert_eq!(time, NaiveTime::from_hms_opt(12, 0, 0).unwrap());
    }
}
