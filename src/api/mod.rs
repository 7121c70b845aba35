pub mod http;
mod pagination;

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use url::Url;

use crate::models::*;
use crate::util::{local_midnight, DayBounds};
use http::{HttpFetch, HttpResponse, ReqwestFetch};
use pagination::next_link;

// ─── Error types ────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("Not configured — add a Canvas token or a feed URL")]
    NotConfigured,
    #[error("Unauthorized — check your API token")]
    Unauthorized,
    #[error("HTTP {0}")]
    Status(u16),
    #[error("Decoding error: {0}")]
    Decoding(String),
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
}

// ─── Date decoding ──────────────────────────────────────────────────────────

/// Decode an API timestamp: any RFC 3339 instant (`Z` or numeric offset,
/// with or without fractional seconds), falling back to a bare `yyyy-MM-dd`
/// date taken as local midnight. Anything else is a decoding error.
pub(crate) fn parse_api_datetime(value: &str) -> Result<DateTime<Utc>, FetchError> {
    if let Ok(instant) = DateTime::parse_from_rfc3339(value) {
        return Ok(instant.with_timezone(&Utc));
    }
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Ok(local_midnight(date));
    }
    Err(FetchError::Decoding(format!("unparseable date: {value:?}")))
}

// ─── Client ─────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct CalendarClient {
    http: Arc<dyn HttpFetch>,
    base_url: Url,
    token: String,
    context_codes: Vec<String>,
}

impl CalendarClient {
    pub fn new(base_url: Url, token: String, context_codes: Vec<String>) -> Result<Self, FetchError> {
        Ok(Self {
            http: Arc::new(ReqwestFetch::new()?),
            base_url,
            token,
            context_codes,
        })
    }

    pub fn with_http(
        http: Arc<dyn HttpFetch>,
        base_url: Url,
        token: String,
        context_codes: Vec<String>,
    ) -> Self {
        Self {
            http,
            base_url,
            token,
            context_codes,
        }
    }

    fn events_url(&self, bounds: &DayBounds) -> Result<Url, FetchError> {
        let mut url = self
            .base_url
            .join("/api/v1/calendar_events")
            .map_err(|e| FetchError::Decoding(format!("bad base URL: {e}")))?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("type", "assignment");
            query.append_pair("per_page", "100");
            query.append_pair(
                "start_date",
                &bounds.start.to_rfc3339_opts(SecondsFormat::Millis, true),
            );
            query.append_pair(
                "end_date",
                &bounds.end.to_rfc3339_opts(SecondsFormat::Millis, true),
            );
            for code in &self.context_codes {
                query.append_pair("context_codes[]", code);
            }
        }
        Ok(url)
    }

    async fn get_checked(&self, url: &Url) -> Result<HttpResponse, FetchError> {
        let headers = [
            ("Authorization", format!("Bearer {}", self.token)),
            ("Accept", "application/json".to_string()),
        ];
        let response = self.http.get(url, &headers).await?;
        match response.status {
            401 => Err(FetchError::Unauthorized),
            s if !(200..300).contains(&s) => Err(FetchError::Status(s)),
            _ => Ok(response),
        }
    }

    /// Fetch all assignments/events due within `bounds`, following
    /// pagination, and map them to unified items. Records whose resolved due
    /// instant falls outside the bounds are dropped.
    pub async fn fetch_assignments(&self, bounds: &DayBounds) -> Result<Vec<AgendaItem>, FetchError> {
        let mut raw: Vec<RawCalendarEvent> = Vec::new();
        let mut url = Some(self.events_url(bounds)?);

        while let Some(current) = url.take() {
            let response = self.get_checked(&current).await?;
            let page: Vec<RawCalendarEvent> = serde_json::from_str(&response.body)
                .map_err(|e| FetchError::Decoding(e.to_string()))?;
            raw.extend(page);

            url = next_link(&response.headers)
                .map(|next| {
                    Url::parse(&next)
                        .map_err(|e| FetchError::Decoding(format!("bad pagination URL: {e}")))
                })
                .transpose()?;
        }

        tracing::debug!(count = raw.len(), day = %bounds.day_key(), "calendar events fetched");

        let mut items = Vec::new();
        for record in raw {
            if let Some(item) = map_event(record, bounds)? {
                items.push(item);
            }
        }
        Ok(items)
    }
}

// ─── Mapping ────────────────────────────────────────────────────────────────

/// Resolved due value: the fallback chain can land on a precise instant or
/// a bare all-day date.
enum DueValue {
    Instant(DateTime<Utc>),
    AllDay(NaiveDate),
}

fn resolve_due(record: &RawCalendarEvent) -> Result<Option<DueValue>, FetchError> {
    let instant_fields = [
        record.assignment.as_ref().and_then(|a| a.due_at.as_deref()),
        record.end_at.as_deref(),
        record.start_at.as_deref(),
    ];
    if let Some(field) = instant_fields.into_iter().flatten().next() {
        return Ok(Some(DueValue::Instant(parse_api_datetime(field)?)));
    }
    if let Some(date) = record.all_day_date.as_deref() {
        let parsed = NaiveDate::parse_from_str(date, "%Y-%m-%d")
            .map_err(|e| FetchError::Decoding(format!("bad all_day_date {date:?}: {e}")))?;
        return Ok(Some(DueValue::AllDay(parsed)));
    }
    Ok(None)
}

fn map_event(record: RawCalendarEvent, bounds: &DayBounds) -> Result<Option<AgendaItem>, FetchError> {
    let Some(due) = resolve_due(&record)? else {
        // No resolvable due instant: the item cannot be placed on a day.
        return Ok(None);
    };

    let (due_at, all_day_date, all_day, effective) = match due {
        DueValue::Instant(instant) => {
            (Some(instant), None, record.all_day.unwrap_or(false), instant)
        }
        DueValue::AllDay(date) => (None, Some(date), true, local_midnight(date)),
    };
    if !bounds.contains(effective) {
        return Ok(None);
    }

    let assignment = record.assignment.as_ref();

    let id = record
        .id
        .as_ref()
        .and_then(id_to_string)
        .or_else(|| assignment.and_then(|a| a.id.as_ref()).and_then(id_to_string))
        .unwrap_or_else(|| {
            format!(
                "{}@{}",
                record.title.as_deref().unwrap_or("event"),
                effective.timestamp()
            )
        });

    let title = record
        .title
        .clone()
        .or_else(|| assignment.and_then(|a| a.name.clone()))
        .unwrap_or_else(|| "Untitled".to_string());

    let kind = if record.event_type.as_deref() == Some("assignment") || record.assignment.is_some()
    {
        ItemKind::Assignment
    } else {
        ItemKind::CalendarEvent
    };

    let submission = assignment
        .and_then(|a| a.submission.as_ref())
        .map(|s| -> Result<SubmissionInfo, FetchError> {
            Ok(SubmissionInfo {
                submitted_at: s.submitted_at.as_deref().map(parse_api_datetime).transpose()?,
                graded_at: s.graded_at.as_deref().map(parse_api_datetime).transpose()?,
                workflow_state: s.workflow_state.clone(),
                score: s.score,
            })
        })
        .transpose()?;

    Ok(Some(AgendaItem {
        id,
        title,
        course_name: record.context_name.clone(),
        course_code: record.context_code.clone(),
        due_at,
        all_day_date,
        all_day,
        html_url: record
            .html_url
            .clone()
            .or_else(|| assignment.and_then(|a| a.html_url.clone()))
            .or(record.url.clone()),
        points_possible: assignment.and_then(|a| a.points_possible),
        description: record.description.clone(),
        html_description: None,
        location: record.location_name.clone(),
        kind,
        tags: Vec::new(),
        has_submitted: assignment.and_then(|a| a.user_submitted),
        submission,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn date_decoding_accepts_rfc3339_and_bare_dates() {
        let fractional = parse_api_datetime("2024-01-15T09:30:00.250Z").unwrap();
        assert_eq!(fractional.timestamp_subsec_millis(), 250);

        let plain = parse_api_datetime("2024-01-15T09:30:00Z").unwrap();
        assert_eq!(plain, Utc.with_ymd_and_hms(2024, 1, 15, 9, 30, 0).unwrap());

        // Numeric offsets normalize to the same UTC instant.
        let offset = parse_api_datetime("2024-01-15T09:30:00-06:00").unwrap();
        assert_eq!(offset, Utc.with_ymd_and_hms(2024, 1, 15, 15, 30, 0).unwrap());

        let bare = parse_api_datetime("2024-01-15").unwrap();
        assert_eq!(
            bare,
            local_midnight(NaiveDate::from_ymd_opt(2024, 1, 15).unwrap())
        );

        assert!(matches!(
            parse_api_datetime("yesterday"),
            Err(FetchError::Decoding(_))
        ));
    }

    fn raw(json: serde_json::Value) -> RawCalendarEvent {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn due_chain_prefers_assignment_due_at() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        let bounds = DayBounds::for_date(date);
        let due = (bounds.start + chrono::Duration::hours(10))
            .to_rfc3339_opts(SecondsFormat::Secs, true);
        let later = (bounds.start + chrono::Duration::hours(12))
            .to_rfc3339_opts(SecondsFormat::Secs, true);

        let record = raw(serde_json::json!({
            "id": "assignment_77",
            "title": "Essay",
            "start_at": later,
            "end_at": later,
            "type": "assignment",
            "assignment": { "id": 77, "due_at": due }
        }));
        let item = map_event(record, &bounds).unwrap().unwrap();
        assert_eq!(item.id, "assignment_77");
        assert_eq!(item.kind, ItemKind::Assignment);
        assert_eq!(
            item.due_at.unwrap(),
            bounds.start + chrono::Duration::hours(10)
        );
    }

    #[test]
    fn records_outside_bounds_are_dropped() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        let bounds = DayBounds::for_date(date);
        // Exactly at day end: half-open interval excludes it.
        let at_end = bounds.end.to_rfc3339_opts(SecondsFormat::Secs, true);

        let record = raw(serde_json::json!({
            "id": 1, "title": "Boundary", "start_at": at_end
        }));
        assert!(map_event(record, &bounds).unwrap().is_none());

        let next_bounds = DayBounds::for_date(date + chrono::Duration::days(1));
        let record = raw(serde_json::json!({
            "id": 1, "title": "Boundary", "start_at": at_end
        }));
        assert!(map_event(record, &next_bounds).unwrap().is_some());
    }

    #[test]
    fn all_day_date_fallback_marks_all_day() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        let bounds = DayBounds::for_date(date);
        let record = raw(serde_json::json!({
            "id": 2, "title": "Reading day", "all_day_date": "2024-01-15"
        }));
        let item = map_event(record, &bounds).unwrap().unwrap();
        assert!(item.all_day);
        assert_eq!(item.all_day_date, Some(date));
        assert_eq!(item.due_at, None);
    }
}
