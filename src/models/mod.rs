use chrono::{DateTime, Local, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::util::local_midnight;

// ─── Unified agenda item ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ItemKind {
    Assignment,
    CalendarEvent,
}

/// Submission details carried through from the API when available.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionInfo {
    pub submitted_at: Option<DateTime<Utc>>,
    pub graded_at: Option<DateTime<Utc>>,
    pub workflow_state: Option<String>,
    pub score: Option<f64>,
}

/// One due-today item, normalized from either the Canvas REST API or an ICS
/// feed. Sources that cannot resolve a due instant never produce an item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgendaItem {
    pub id: String,
    pub title: String,
    pub course_name: Option<String>,
    pub course_code: Option<String>,
    pub due_at: Option<DateTime<Utc>>,
    pub all_day_date: Option<NaiveDate>,
    pub all_day: bool,
    pub html_url: Option<String>,
    pub points_possible: Option<f64>,
    pub description: Option<String>,
    pub html_description: Option<String>,
    pub location: Option<String>,
    pub kind: ItemKind,
    /// De-duplicated, first-seen order preserved.
    pub tags: Vec<String>,
    pub has_submitted: Option<bool>,
    pub submission: Option<SubmissionInfo>,
}

impl AgendaItem {
    /// Precise due instant if present, else the all-day date at local
    /// midnight. `None` means the item cannot be placed on the calendar.
    pub fn effective_due_at(&self) -> Option<DateTime<Utc>> {
        self.due_at.or_else(|| self.all_day_date.map(local_midnight))
    }

    /// Local calendar day this item falls on.
    pub fn due_date_local(&self) -> Option<NaiveDate> {
        if let Some(date) = self.all_day_date {
            return Some(date);
        }
        self.due_at.map(|d| d.with_timezone(&Local).date_naive())
    }

    /// Course label for display: course name, then decoded course code,
    /// then a generic placeholder.
    pub fn display_course(&self) -> String {
        if let Some(name) = self.course_name.as_deref().filter(|s| !s.is_empty()) {
            return name.to_string();
        }
        if let Some(code) = self.course_code.as_deref().filter(|s| !s.is_empty()) {
            return decode_course_code(code);
        }
        "unlabeled".to_string()
    }

    pub fn is_submitted(&self) -> bool {
        if let Some(sub) = &self.submission {
            if matches!(
                sub.workflow_state.as_deref(),
                Some("submitted") | Some("graded")
            ) {
                return true;
            }
            if sub.submitted_at.is_some() {
                return true;
            }
        }
        self.has_submitted == Some(true)
    }

    /// Past due and not submitted. All-day items are compared at day
    /// granularity, so they only become overdue once their day has ended.
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        if self.is_submitted() {
            return false;
        }
        if self.all_day {
            if let Some(date) = self.due_date_local() {
                return date < now.with_timezone(&Local).date_naive();
            }
        }
        match self.effective_due_at() {
            Some(due) => due < now,
            None => false,
        }
    }
}

/// Canvas context codes look like `course_1234`; render them as a readable
/// label. Anything else passes through unchanged.
pub fn decode_course_code(code: &str) -> String {
    if let Some(id) = code.strip_prefix("course_") {
        if !id.is_empty() && id.chars().all(|c| c.is_ascii_digit()) {
            return format!("Course #{id}");
        }
    }
    code.to_string()
}

// ─── Raw REST records ───────────────────────────────────────────────────────
//
// Wire shapes for `/api/v1/calendar_events`. Dates stay as strings here;
// the client decodes them tolerantly (fractional ISO-8601, plain ISO-8601,
// bare date) after the JSON pass.

#[derive(Debug, Clone, Deserialize)]
pub struct RawCalendarEvent {
    pub id: Option<serde_json::Value>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub start_at: Option<String>,
    pub end_at: Option<String>,
    pub all_day: Option<bool>,
    pub all_day_date: Option<String>,
    pub context_code: Option<String>,
    pub context_name: Option<String>,
    pub location_name: Option<String>,
    #[serde(rename = "type")]
    pub event_type: Option<String>,
    pub html_url: Option<String>,
    pub url: Option<String>,
    pub assignment: Option<RawAssignment>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawAssignment {
    pub id: Option<serde_json::Value>,
    pub name: Option<String>,
    pub due_at: Option<String>,
    pub points_possible: Option<f64>,
    pub html_url: Option<String>,
    pub user_submitted: Option<bool>,
    pub submission: Option<RawSubmission>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawSubmission {
    pub submitted_at: Option<String>,
    pub graded_at: Option<String>,
    pub workflow_state: Option<String>,
    pub score: Option<f64>,
}

/// Render a JSON id (string or number) as the stable string identifier.
pub fn id_to_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
