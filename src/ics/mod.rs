//! Hand-rolled ICS (RFC 5545) event parser for calendar feed exports.
//!
//! The feed path only needs VEVENT records with a handful of properties, so
//! this parser unfolds lines, walks `BEGIN:VEVENT`/`END:VEVENT` blocks, and
//! maps each record to the unified [`AgendaItem`]. Records with no resolvable
//! due date are dropped — they cannot be placed on the calendar.

mod html;

use std::str::FromStr;

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;

use crate::models::{AgendaItem, ItemKind};

pub use html::{html_to_text, sanitize_html};

// ─── Raw event ──────────────────────────────────────────────────────────────

/// A `DTSTART`/`DTEND` value: either a bare date (`VALUE=DATE`, all-day)
/// or a resolved instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IcsTime {
    Date(NaiveDate),
    Instant(DateTime<Utc>),
}

/// One VEVENT as read off the wire, before normalization.
#[derive(Debug, Clone, Default)]
pub struct IcsEvent {
    pub uid: Option<String>,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub html_description: Option<String>,
    pub start: Option<IcsTime>,
    pub end: Option<IcsTime>,
    pub url: Option<String>,
    pub location: Option<String>,
    pub categories: Vec<String>,
}

// ─── Parsing ────────────────────────────────────────────────────────────────

/// Parse a whole ICS document into raw events. Malformed records are
/// silently skipped.
pub fn parse_events(text: &str) -> Vec<IcsEvent> {
    let lines = unfold_lines(text);
    let mut events = Vec::new();
    let mut current: Option<Vec<&str>> = None;

    for line in &lines {
        let line = line.as_str();
        if line == "BEGIN:VEVENT" {
            current = Some(Vec::new());
        } else if line == "END:VEVENT" {
            if let Some(record) = current.take() {
                if let Some(event) = parse_record(&record) {
                    events.push(event);
                }
            }
        } else if let Some(record) = current.as_mut() {
            record.push(line);
        }
    }

    events
}

/// Normalize line endings and unfold continuations: a line starting with a
/// space or tab continues the previous logical line.
pub(crate) fn unfold_lines(text: &str) -> Vec<String> {
    let normalized = text.replace("\r\n", "\n").replace('\r', "\n");
    let mut lines: Vec<String> = Vec::new();

    for raw in normalized.split('\n') {
        if raw.starts_with(' ') || raw.starts_with('\t') {
            if let Some(last) = lines.last_mut() {
                last.push_str(&raw[1..]);
                continue;
            }
        }
        lines.push(raw.to_string());
    }

    lines
}

struct ContentLine<'a> {
    name: String,
    params: Vec<(String, &'a str)>,
    raw_value: &'a str,
}

impl ContentLine<'_> {
    fn param(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| *v)
    }

    fn value(&self) -> String {
        unescape_text(self.raw_value)
    }
}

/// Split a content line at the first `:` into `NAME;PARAM=VALUE;...` and the
/// raw value. Param keys are upper-cased; the value stays raw so date parsing
/// and text unescaping can each do their own thing.
fn split_content_line(line: &str) -> Option<ContentLine<'_>> {
    let colon = line.find(':')?;
    let (left, value) = (&line[..colon], &line[colon + 1..]);

    let mut segments = left.split(';');
    let name = segments.next()?.trim().to_ascii_uppercase();
    if name.is_empty() {
        return None;
    }

    let params = segments
        .filter_map(|seg| {
            let eq = seg.find('=')?;
            Some((seg[..eq].trim().to_ascii_uppercase(), seg[eq + 1..].trim()))
        })
        .collect();

    Some(ContentLine {
        name,
        params,
        raw_value: value,
    })
}

/// Decode ICS backslash escapes. Unknown escapes pass the following
/// character through literally.
pub(crate) fn unescape_text(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') | Some('N') => out.push('\n'),
            Some(',') => out.push(','),
            Some(';') => out.push(';'),
            Some('\\') => out.push('\\'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }

    out
}

fn parse_record(lines: &[&str]) -> Option<IcsEvent> {
    let mut event = IcsEvent::default();
    let mut saw_field = false;

    for line in lines {
        let Some(content) = split_content_line(line) else {
            continue;
        };
        saw_field = true;

        match content.name.as_str() {
            "UID" => event.uid = non_empty(content.value()),
            "SUMMARY" => event.summary = non_empty(content.value()),
            "DESCRIPTION" => event.description = non_empty(content.value()),
            "X-ALT-DESC" => event.html_description = non_empty(content.value()),
            "URL" => event.url = non_empty(content.raw_value.trim().to_string()),
            "LOCATION" => event.location = non_empty(content.value()),
            "DTSTART" => {
                event.start = parse_ics_time(
                    content.raw_value.trim(),
                    content.param("TZID"),
                    content.param("VALUE") == Some("DATE"),
                );
            }
            "DTEND" => {
                event.end = parse_ics_time(
                    content.raw_value.trim(),
                    content.param("TZID"),
                    content.param("VALUE") == Some("DATE"),
                );
            }
            "CATEGORIES" => {
                for tag in content.value().split(',') {
                    let tag = tag.trim();
                    if !tag.is_empty() {
                        event.categories.push(tag.to_string());
                    }
                }
            }
            _ => {}
        }
    }

    saw_field.then_some(event)
}

/// Parse an ICS date or date-time.
///
/// - `VALUE=DATE` values are `yyyyMMdd`, interpreted as local all-day dates
/// - a trailing `Z` marks `yyyyMMdd'T'HHmmss'Z'` in UTC
/// - anything else is `yyyyMMdd'T'HHmmss` in the `TZID` zone, falling back
///   to the local zone when the zone name is unrecognized
pub(crate) fn parse_ics_time(value: &str, tzid: Option<&str>, date_only: bool) -> Option<IcsTime> {
    if date_only {
        let date = NaiveDate::parse_from_str(value, "%Y%m%d").ok()?;
        return Some(IcsTime::Date(date));
    }

    if let Some(stripped) = value.strip_suffix('Z') {
        let naive = NaiveDateTime::parse_from_str(stripped, "%Y%m%dT%H%M%S").ok()?;
        return Some(IcsTime::Instant(Utc.from_utc_datetime(&naive)));
    }

    let naive = NaiveDateTime::parse_from_str(value, "%Y%m%dT%H%M%S").ok()?;
    if let Some(name) = tzid {
        match Tz::from_str(name) {
            Ok(tz) => {
                let resolved = tz.from_local_datetime(&naive).earliest()?;
                return Some(IcsTime::Instant(resolved.with_timezone(&Utc)));
            }
            Err(_) => {
                tracing::debug!(tzid = name, "unrecognized TZID, using local zone");
            }
        }
    }
    let resolved = Local.from_local_datetime(&naive).earliest()?;
    Some(IcsTime::Instant(resolved.with_timezone(&Utc)))
}

// ─── Summary tokenizer ──────────────────────────────────────────────────────

/// Split a feed summary into title, course, and extra tags.
///
/// Summaries may end with bracketed tokens, e.g.
/// `Homework 3 [BIO 101][Extra Credit]`. Trailing `[...]` spans are stripped
/// right-to-left; the last one stripped (closest to the title) is the course,
/// the rest are tags in their original left-to-right order.
pub(crate) fn split_summary(summary: &str) -> (String, Option<String>, Vec<String>) {
    let mut rest = summary.trim();
    let mut stripped: Vec<&str> = Vec::new();

    while rest.ends_with(']') {
        let Some(open) = rest.rfind('[') else { break };
        stripped.push(rest[open + 1..rest.len() - 1].trim());
        rest = rest[..open].trim_end();
    }

    let course = stripped.pop().filter(|s| !s.is_empty()).map(String::from);
    stripped.reverse();
    let tags = stripped
        .into_iter()
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect();

    let title = if rest.is_empty() {
        "Untitled".to_string()
    } else {
        rest.to_string()
    };

    (title, course, tags)
}

// ─── Normalization ──────────────────────────────────────────────────────────

/// Map a raw VEVENT to the unified item, or `None` when it has no resolvable
/// due date.
pub fn to_agenda_item(event: &IcsEvent) -> Option<AgendaItem> {
    // DTEND stands in for the due instant when DTSTART is absent.
    let due = event.start.or(event.end)?;

    let (due_at, all_day_date, all_day) = match due {
        IcsTime::Instant(instant) => (Some(instant), None, false),
        IcsTime::Date(date) => (None, Some(date), true),
    };

    let (title, course, bracket_tags) = match event.summary.as_deref() {
        Some(summary) => split_summary(summary),
        None => ("Untitled".to_string(), None, Vec::new()),
    };

    // UID substring heuristic: only feed UIDs mentioning "assignment"
    // classify as assignments.
    let kind = match &event.uid {
        Some(uid) if uid.to_ascii_lowercase().contains("assignment") => ItemKind::Assignment,
        _ => ItemKind::CalendarEvent,
    };

    // Prefer the HTML description (scripts and styles stripped), fall back
    // to the plain DESCRIPTION field.
    let (description, html_description) = match event.html_description.as_deref() {
        Some(raw) => {
            let clean = sanitize_html(raw);
            let text = html_to_text(&clean);
            (non_empty(text), Some(clean))
        }
        None => (
            event.description.clone().and_then(non_empty),
            None,
        ),
    };

    let mut tags: Vec<String> = Vec::new();
    for tag in event.categories.iter().chain(bracket_tags.iter()) {
        if !tags.iter().any(|t| t == tag) {
            tags.push(tag.clone());
        }
    }

    let id = event.uid.clone().unwrap_or_else(|| {
        let stamp = match due {
            IcsTime::Instant(instant) => instant.timestamp().to_string(),
            IcsTime::Date(date) => date.to_string(),
        };
        format!("{title}@{stamp}")
    });

    Some(AgendaItem {
        id,
        title,
        course_name: course,
        course_code: None,
        due_at,
        all_day_date,
        all_day,
        html_url: event.url.clone(),
        points_possible: None,
        description,
        html_description,
        location: event.location.clone(),
        kind,
        tags,
        has_submitted: None,
        submission: None,
    })
}

/// Parse a document straight to agenda items.
pub fn parse_agenda_items(text: &str) -> Vec<AgendaItem> {
    parse_events(text).iter().filter_map(to_agenda_item).collect()
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}
