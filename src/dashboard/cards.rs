//! # Metric Cards
//!
//! Plain-text rendering of a stored row as labeled metric cards, three per
//! line:
//!
//! ```text
//! +----------------------+ +----------------------+ +----------------------+
//! | Time                 | | Date                 | | Signal               |
//! | 12:00:00             | | 01-01-2024           | | -70                  |
//! +----------------------+ +----------------------+ +----------------------+
//! ```

use chrono::{DateTime, Local};

use super::Frame;
use crate::receiver::LiveStatus;
use crate::station::format::PersistedRow;
use crate::station::protocol::*;

/// Total card width including borders
const CARD_WIDTH: usize = 24;

/// Text width inside a card
const INNER_WIDTH: usize = CARD_WIDTH - 4;

/// Shown for an empty cell
const MISSING_VALUE: &str = "-";

/// One metric card: title, store column and unit
#[derive(Debug, Clone, Copy)]
pub struct Card {
    pub title: &'static str,
    pub column: usize,
    pub unit: &'static str,
}

const fn card(title: &'static str, column: usize, unit: &'static str) -> Card {
    Card { title, column, unit }
}

/// Card layout, one inner slice per line of cards
pub const CARD_LAYOUT: [&[Card]; 4] = [
    &[
        card("Time", COL_TIME, ""),
        card("Date", COL_DATE, ""),
        card("Signal", COL_SIGNAL, ""),
    ],
    &[
        card("Temperature", COL_TEMPERATURE, "°C"),
        card("Humidity", COL_HUMIDITY, "%"),
        card("Rainfall", COL_RAIN, "mm"),
    ],
    &[
        card("Wind Speed", COL_WIND_SPEED, "m/s"),
        card("Wind Direction", COL_WIND_DIR, "°"),
        card("Pressure", COL_PRESSURE, "hPa"),
    ],
    &[card("Radiation", COL_RADIATION, "W/m²")],
];

fn fit(text: &str) -> String {
    let clipped: String = text.chars().take(INNER_WIDTH).collect();
    format!("| {:<width$} |", clipped, width = INNER_WIDTH)
}

fn card_lines(card: &Card, row: &PersistedRow) -> [String; 4] {
    let cell = row.cell(card.column);
    let value = if cell.is_empty() {
        MISSING_VALUE.to_string()
    } else if card.unit.is_empty() {
        cell.to_string()
    } else {
        format!("{} {}", cell, card.unit)
    };

    let border = format!("+{}+", "-".repeat(CARD_WIDTH - 2));
    [border.clone(), fit(card.title), fit(&value), border]
}

/// Render all ten cards for a row
pub fn render_cards(row: &PersistedRow) -> String {
    let mut out = String::new();

    for cards in CARD_LAYOUT {
        let rendered: Vec<[String; 4]> = cards.iter().map(|c| card_lines(c, row)).collect();
        for line in 0..4 {
            let joined: Vec<&str> = rendered.iter().map(|lines| lines[line].as_str()).collect();
            out.push_str(&joined.join(" "));
            out.push('\n');
        }
    }

    out
}

/// Render a refresh result for the terminal
///
/// # Arguments
///
/// * `frame` - Result of [`super::Dashboard::refresh`]
/// * `now` - Local time of the refresh, shown as the update time
pub fn render_frame(frame: &Frame, now: DateTime<Local>) -> String {
    match frame {
        Frame::Updated(row) => format!(
            "{}Last updated: {}\n",
            render_cards(row),
            now.format("%Y-%m-%d %H:%M:%S")
        ),
        Frame::NoNewData => format!("No new data (checked {})\n", now.format("%H:%M:%S")),
    }
}

/// Notice for the receiver's live status, shown below the cards.
///
/// Only a failed last payload produces a notice; the cards themselves always
/// come from the store.
pub fn render_status(status: &LiveStatus) -> Option<String> {
    match status {
        LiveStatus::Error(e) => Some(format!("Parsing error in latest message: {}\n", e)),
        LiveStatus::Waiting | LiveStatus::Reading(_) => None,
    }
}
