use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::store::LessonColors;

static FIRST_INTEGER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+").unwrap());

/// Default markers meaning a lesson cannot be booked.
pub const DEFAULT_SOLD_OUT_MARKERS: &[&str] = &["満席", "受付終了", "sold out", "full"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Availability {
    pub is_available: bool,
    pub seats_left: Option<u32>,
}

/// Interprets a lesson's status text.
///
/// Missing status means bookable with an unknown seat count.
pub fn parse_status(text: Option<&str>, sold_out_markers: &[String]) -> Availability {
    let Some(text) = text else {
        return Availability {
            is_available: true,
            seats_left: None,
        };
    };
    let lower = text.to_lowercase();
    let sold_out = sold_out_markers
        .iter()
        .any(|m| !m.is_empty() && lower.contains(&m.to_lowercase()));
    let seats_left = FIRST_INTEGER
        .find(text)
        .and_then(|m| m.as_str().parse::<u32>().ok());
    Availability {
        is_available: !sold_out,
        seats_left,
    }
}

/// Reads `color` and `background-color` from an inline `style` attribute.
pub fn parse_style_colors(style: &str) -> Option<LessonColors> {
    let mut text = None;
    let mut background = None;
    for decl in style.split(';') {
        let Some((prop, value)) = decl.split_once(':') else {
            continue;
        };
        let value = value.trim();
        if value.is_empty() {
            continue;
        }
        match prop.trim().to_ascii_lowercase().as_str() {
            "color" => text = Some(value.to_string()),
            "background-color" | "background" => background = Some(value.to_string()),
            _ => {}
        }
    }
    if text.is_none() && background.is_none() {
        return None;
    }
    Some(LessonColors { text, background })
}
