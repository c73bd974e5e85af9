//! Popup-bearing text annotations
//!
//! Only text annotations that link a popup are kept. Rectangles are converted
//! to hundredths of a millimetre with a top-left origin.

use super::backend::{AnnotationSubtype, EngineAnnotation, EnginePage};
use super::units::point_to_mm100;
use chrono::{DateTime, FixedOffset};
use serde::Serialize;

/// Annotation rectangle in hundredths of a millimetre, origin top-left.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct AnnotationRect {
    pub left: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
}

/// A comment attached to a page.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct PageAnnotation {
    pub rect: AnnotationRect,
    pub author: String,
    pub text: String,
    /// `None` when the annotation carries no usable modification date.
    pub modified: Option<DateTime<FixedOffset>>,
}

/// Whether an engine annotation is a text annotation with a linked popup.
pub fn is_popup_comment(annotation: &EngineAnnotation) -> bool {
    annotation.subtype == Some(AnnotationSubtype::Text) && annotation.has_popup
}

/// Convert one engine annotation, flipping Y against `page_height_points`.
pub fn convert_annotation(annotation: &EngineAnnotation, page_height_points: f64) -> PageAnnotation {
    let rect = &annotation.rect;
    let flipped_a = point_to_mm100(page_height_points - rect.min_y());
    let flipped_b = point_to_mm100(page_height_points - rect.max_y());

    PageAnnotation {
        rect: AnnotationRect {
            left: point_to_mm100(rect.min_x()),
            top: flipped_a.min(flipped_b),
            right: point_to_mm100(rect.max_x()),
            bottom: flipped_a.max(flipped_b),
        },
        author: annotation.title.clone(),
        text: annotation.contents.clone(),
        modified: pdf_date_to_iso8601(&annotation.modification_date)
            .and_then(|iso| parse_iso8601(&iso)),
    }
}

/// Popup comments of `page`, in engine enumeration order.
pub fn extract_page_annotations<P: EnginePage>(page: &P, page_height_points: f64) -> Vec<PageAnnotation> {
    page.annotations()
        .iter()
        .filter(|annotation| is_popup_comment(annotation))
        .map(|annotation| convert_annotation(annotation, page_height_points))
        .collect()
}

/// Convert a PDF date (`D:YYYYMMDDHHmmSSOHH'mm'`) to ISO 8601.
///
/// Only the year is mandatory; missing fields default to the start of their
/// range and a missing time zone to UTC. Returns `None` without the `D:`
/// prefix or a four-character year.
pub fn pdf_date_to_iso8601(input: &str) -> Option<String> {
    let rest = input.strip_prefix("D:")?;
    if !rest.is_ascii() || rest.len() < 4 {
        return None;
    }

    let field = |start: usize, len: usize, default: &'static str| date_field(rest, start, len, default);

    let year = &rest[0..4];
    let month = field(4, 2, "01");
    let day = field(6, 2, "01");
    let hours = field(8, 2, "00");
    let minutes = field(10, 2, "00");
    let seconds = field(12, 2, "00");

    let zone = match rest.get(14..15) {
        None | Some("Z") => "Z".to_string(),
        Some(mark) => {
            let zone_hours = field(15, 2, "00");
            let zone_minutes = field(18, 2, "00");
            format!("{}{}:{}", mark, zone_hours, zone_minutes)
        }
    };

    Some(format!(
        "{}-{}-{}T{}:{}:{}{}",
        year, month, day, hours, minutes, seconds, zone
    ))
}

fn date_field<'a>(rest: &'a str, start: usize, len: usize, default: &'a str) -> &'a str {
    rest.get(start..start + len).unwrap_or(default)
}

/// Parse an ISO 8601 date-time with offset. `None` if it does not parse.
pub fn parse_iso8601(input: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(input).ok()
}
