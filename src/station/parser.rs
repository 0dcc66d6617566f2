//! # Station Payload Parser
//!
//! Extracts a [`Reading`] from a raw text payload.
//!
//! Each field is located independently by its `Label = value` pattern, so
//! token order and surrounding text do not matter. The time/date token is
//! optional; every numeric field is required and must parse as its declared
//! type. There is no partial result: the first bad field fails the payload.

use std::sync::OnceLock;

use chrono::{NaiveDate, NaiveTime};
use regex::Regex;
use tracing::debug;

use super::protocol::*;
use crate::error::ParseError;

/// Compiled field patterns, built once per process
struct Patterns {
    timestamp: Regex,
    temperature: Regex,
    humidity: Regex,
    wind_speed: Regex,
    wind_dir: Regex,
    pressure: Regex,
    rain: Regex,
    radiation: Regex,
    signal: Regex,
}

/// Build the `Label = value` pattern for one field.
///
/// The value capture is the whole token up to whitespace or a `,` `;` `|`
/// separator, possibly empty; the typed parse rejects what is not a plain
/// decimal number.
fn field_pattern(label: &str) -> Regex {
    let pattern = format!(r"\b{}\s*=\s*([^\s,;|]*)", regex::escape(label));
    Regex::new(&pattern).expect("field pattern is a valid regex")
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        timestamp: Regex::new(r"(\d{2}:\d{2}:\d{2})\s+(\d{2}-\d{2}-\d{4})")
            .expect("timestamp pattern is a valid regex"),
        temperature: field_pattern(LABEL_TEMPERATURE),
        humidity: field_pattern(LABEL_HUMIDITY),
        wind_speed: field_pattern(LABEL_WIND_SPEED),
        wind_dir: field_pattern(LABEL_WIND_DIR),
        pressure: field_pattern(LABEL_PRESSURE),
        rain: field_pattern(LABEL_RAIN),
        radiation: field_pattern(LABEL_RADIATION),
        signal: field_pattern(LABEL_SIGNAL),
    })
}

/// Parse a raw payload as received from the broker
///
/// # Arguments
///
/// * `payload` - Raw message bytes, expected to be UTF-8 text
///
/// # Returns
///
/// * `Result<Reading, ParseError>` - Fully populated reading, or the first failure
///
/// # Errors
///
/// Returns [`ParseError::InvalidEncoding`] for non-UTF-8 bytes, otherwise the
/// same errors as [`parse`].
pub fn parse_payload(payload: &[u8]) -> Result<Reading, ParseError> {
    let text = std::str::from_utf8(payload).map_err(|_| ParseError::InvalidEncoding)?;
    parse(text)
}

/// Parse a text payload into a [`Reading`]
///
/// # Errors
///
/// Returns error if any of the eight labeled fields is:
/// - absent ([`ParseError::MissingField`])
/// - not a number of the declared type ([`ParseError::InvalidNumber`])
/// - outside the sensor's physical range ([`ParseError::OutOfRange`])
///
/// # Examples
///
/// ```
/// use aws_monitor::station::parser::parse;
///
/// let reading = parse(
///     "12:00:00 01-01-2024 Temp=25.35 Kelembaban=60 W.Speed=3.2 W.Dir=180 \
///      Press=1012.4 Hujan=0.5 Rad=120.0 Signal=-70",
/// ).unwrap();
/// assert_eq!(reading.humidity_pct, 60);
/// assert_eq!(reading.signal, -70);
/// ```
pub fn parse(text: &str) -> Result<Reading, ParseError> {
    let p = patterns();
    let (date, time) = parse_timestamp(&p.timestamp, text);

    Ok(Reading {
        date,
        time,
        temperature_c: parse_float(&p.temperature, text, LABEL_TEMPERATURE)?,
        humidity_pct: parse_integer(&p.humidity, text, LABEL_HUMIDITY, 0, HUMIDITY_MAX)? as u8,
        wind_speed_ms: parse_non_negative(&p.wind_speed, text, LABEL_WIND_SPEED)?,
        wind_dir_deg: parse_integer(&p.wind_dir, text, LABEL_WIND_DIR, 0, WIND_DIR_MAX)? as u16,
        pressure_hpa: parse_float(&p.pressure, text, LABEL_PRESSURE)?,
        rain_mm: parse_non_negative(&p.rain, text, LABEL_RAIN)?,
        radiation_wm2: parse_non_negative(&p.radiation, text, LABEL_RADIATION)?,
        signal: parse_integer(&p.signal, text, LABEL_SIGNAL, i32::MIN as i64, i32::MAX as i64)? as i32,
    })
}

/// Locate the first valid `HH:MM:SS DD-MM-YYYY` token.
///
/// Tokens naming an impossible date or time are passed over. Without a valid
/// token both halves stay unset; this never fails the parse.
fn parse_timestamp(pattern: &Regex, text: &str) -> (Option<NaiveDate>, Option<NaiveTime>) {
    let found = pattern.captures_iter(text).find_map(|caps| {
        let time = NaiveTime::parse_from_str(&caps[1], TIME_FORMAT);
        let date = NaiveDate::parse_from_str(&caps[2], DATE_FORMAT);
        match (date, time) {
            (Ok(date), Ok(time)) => Some((date, time)),
            _ => {
                debug!("Ignoring invalid timestamp token '{} {}'", &caps[1], &caps[2]);
                None
            }
        }
    });

    match found {
        Some((date, time)) => (Some(date), Some(time)),
        None => {
            debug!("Payload has no valid {} token", LABEL_TIMESTAMP);
            (None, None)
        }
    }
}

/// Plain decimal notation: optional leading `-`, digits, at most one `.`.
///
/// Rejects what `str::parse` would otherwise accept (`1e3`, `+5`, `inf`, `NaN`).
fn is_plain_decimal(raw: &str) -> bool {
    let digits = raw.strip_prefix('-').unwrap_or(raw);
    digits.bytes().any(|b| b.is_ascii_digit())
        && digits.bytes().all(|b| b.is_ascii_digit() || b == b'.')
        && digits.bytes().filter(|&b| b == b'.').count() <= 1
}

fn capture<'a>(pattern: &Regex, text: &'a str, field: &'static str) -> Result<&'a str, ParseError> {
    pattern
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .ok_or(ParseError::MissingField { field })
}

fn parse_float(pattern: &Regex, text: &str, field: &'static str) -> Result<f64, ParseError> {
    let raw = capture(pattern, text, field)?;
    Some(raw)
        .filter(|raw| is_plain_decimal(raw))
        .and_then(|raw| raw.parse::<f64>().ok())
        .filter(|value| value.is_finite())
        .ok_or_else(|| ParseError::InvalidNumber { field, value: raw.to_string() })
}

fn parse_non_negative(pattern: &Regex, text: &str, field: &'static str) -> Result<f64, ParseError> {
    let value = parse_float(pattern, text, field)?;
    if value < 0.0 {
        return Err(ParseError::OutOfRange { field, value: value.to_string() });
    }
    Ok(value)
}

fn parse_integer(
    pattern: &Regex,
    text: &str,
    field: &'static str,
    min: i64,
    max: i64,
) -> Result<i64, ParseError> {
    let raw = capture(pattern, text, field)?;
    let value = Some(raw)
        .filter(|raw| is_plain_decimal(raw) && !raw.contains('.'))
        .and_then(|raw| raw.parse::<i64>().ok())
        .ok_or_else(|| ParseError::InvalidNumber { field, value: raw.to_string() })?;

    if value < min || value > max {
        return Err(ParseError::OutOfRange { field, value: raw.to_string() });
    }
    Ok(value)
}
