//! REST client pagination against a scripted HTTP backend.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, NaiveDate, SecondsFormat};
use reqwest::header::{HeaderMap, HeaderValue};
use url::Url;

use canvas_agenda::api::http::{HttpFetch, HttpResponse};
use canvas_agenda::api::CalendarClient;
use canvas_agenda::{DayBounds, FetchError};

struct ScriptedHttp {
    responses: Mutex<VecDeque<HttpResponse>>,
    requests: Mutex<Vec<(Url, Vec<(String, String)>)>>,
}

impl ScriptedHttp {
    fn new(responses: Vec<HttpResponse>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl HttpFetch for ScriptedHttp {
    async fn get(&self, url: &Url, headers: &[(&str, String)]) -> Result<HttpResponse, FetchError> {
        self.requests.lock().unwrap().push((
            url.clone(),
            headers
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        ));
        Ok(self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .expect("unexpected extra request"))
    }
}

fn page(bounds: &DayBounds, ids: &[u64], next: Option<&str>) -> HttpResponse {
    let events: Vec<serde_json::Value> = ids
        .iter()
        .map(|id| {
            let due = (bounds.start + Duration::hours(*id as i64 % 20))
                .to_rfc3339_opts(SecondsFormat::Secs, true);
            serde_json::json!({
                "id": format!("assignment_{id}"),
                "title": format!("Item {id}"),
                "type": "assignment",
                "context_code": "course_42",
                "assignment": { "id": id, "due_at": due }
            })
        })
        .collect();

    let mut headers = HeaderMap::new();
    if let Some(next) = next {
        headers.insert(
            "link",
            HeaderValue::from_str(&format!("<{next}>; rel=\"next\"")).unwrap(),
        );
    }
    HttpResponse {
        status: 200,
        headers,
        body: serde_json::to_string(&events).unwrap(),
    }
}

fn client(http: Arc<ScriptedHttp>) -> CalendarClient {
    CalendarClient::with_http(
        http,
        Url::parse("https://school.test").unwrap(),
        "token-123".into(),
        vec!["course_42".into()],
    )
}

#[tokio::test]
async fn follows_next_links_and_accumulates_pages() {
    let date = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
    let bounds = DayBounds::for_date(date);

    let http = ScriptedHttp::new(vec![
        page(&bounds, &[1, 2], Some("https://school.test/api/v1/calendar_events?page=2")),
        page(&bounds, &[3], Some("https://school.test/api/v1/calendar_events?page=3")),
        page(&bounds, &[4, 5], None),
    ]);

    let items = client(Arc::clone(&http))
        .fetch_assignments(&bounds)
        .await
        .unwrap();

    assert_eq!(items.len(), 5);
    let ids: Vec<&str> = items.iter().map(|i| i.id.as_str()).collect();
    assert!(ids.contains(&"assignment_1") && ids.contains(&"assignment_5"));

    let requests = http.requests.lock().unwrap();
    assert_eq!(requests.len(), 3);

    // First request carries the documented query string and bearer auth.
    let (first_url, first_headers) = &requests[0];
    let query: Vec<(String, String)> = first_url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    assert!(query.contains(&("type".into(), "assignment".into())));
    assert!(query.contains(&("per_page".into(), "100".into())));
    assert!(query.iter().any(|(k, _)| k == "start_date"));
    assert!(query.contains(&("context_codes[]".into(), "course_42".into())));
    assert!(first_headers
        .iter()
        .any(|(k, v)| k == "Authorization" && v == "Bearer token-123"));

    // Later requests hit the URLs the Link headers announced.
    assert_eq!(requests[1].0.query(), Some("page=2"));
    assert_eq!(requests[2].0.query(), Some("page=3"));
}

#[tokio::test]
async fn unauthorized_terminates_pagination() {
    let date = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
    let bounds = DayBounds::for_date(date);

    let http = ScriptedHttp::new(vec![
        page(&bounds, &[1], Some("https://school.test/api/v1/calendar_events?page=2")),
        HttpResponse {
            status: 401,
            headers: HeaderMap::new(),
            body: String::new(),
        },
    ]);

    let err = client(http).fetch_assignments(&bounds).await.unwrap_err();
    assert!(matches!(err, FetchError::Unauthorized));
}

#[tokio::test]
async fn other_statuses_surface_as_status_errors() {
    let date = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
    let bounds = DayBounds::for_date(date);

    let http = ScriptedHttp::new(vec![HttpResponse {
        status: 503,
        headers: HeaderMap::new(),
        body: "maintenance".into(),
    }]);

    let err = client(http).fetch_assignments(&bounds).await.unwrap_err();
    assert!(matches!(err, FetchError::Status(503)));
}
