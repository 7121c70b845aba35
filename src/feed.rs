//! Per-URL cache of parsed ICS feeds with conditional revalidation.
//!
//! Each feed URL keeps its last ETag, the full parsed item list, and a
//! day-indexed partition of that list. Mutating operations hold the cache
//! lock for their whole duration, so two callers can never race a download
//! against each other and corrupt the revalidation token.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use url::Url;

use crate::api::http::{HttpFetch, ReqwestFetch};
use crate::api::FetchError;
use crate::ics;
use crate::models::AgendaItem;
use crate::util::{day_key, DayBounds};

#[derive(Debug, Clone)]
struct FeedEntry {
    etag: Option<String>,
    items: Vec<AgendaItem>,
    /// Partition of `items` by local due day. Items with no due date never
    /// make it into either collection.
    by_day: HashMap<String, Vec<AgendaItem>>,
    last_validated: DateTime<Utc>,
}

pub struct FeedCache {
    http: Arc<dyn HttpFetch>,
    entries: Mutex<HashMap<Url, FeedEntry>>,
}

impl FeedCache {
    pub fn new() -> Result<Self, FetchError> {
        Ok(Self::with_http(Arc::new(ReqwestFetch::new()?)))
    }

    pub fn with_http(http: Arc<dyn HttpFetch>) -> Self {
        Self {
            http,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Items due within `bounds` for the given feed. The cached entry is
    /// reused unless `force_reload` is set or no entry exists yet; a reload
    /// sends `If-None-Match` so an unchanged feed costs no re-parse.
    pub async fn assignments(
        &self,
        url: &Url,
        bounds: &DayBounds,
        force_reload: bool,
    ) -> Result<Vec<AgendaItem>, FetchError> {
        let mut entries = self.entries.lock().await;

        if force_reload || !entries.contains_key(url) {
            self.revalidate(&mut entries, url).await?;
        }

        let entry = entries
            .get(url)
            .expect("feed entry exists after revalidation");

        // Prefer the day index, but re-check against the exact bounds in
        // case the index key and the bounds disagree (zone changes).
        let candidates = match entry.by_day.get(&bounds.day_key()) {
            Some(indexed) => indexed,
            None => &entry.items,
        };
        Ok(candidates
            .iter()
            .filter(|item| {
                item.effective_due_at()
                    .map(|due| bounds.contains(due))
                    .unwrap_or(false)
            })
            .cloned()
            .collect())
    }

    async fn revalidate(
        &self,
        entries: &mut HashMap<Url, FeedEntry>,
        url: &Url,
    ) -> Result<(), FetchError> {
        let prior_etag = entries.get(url).and_then(|e| e.etag.clone());

        let mut headers: Vec<(&str, String)> = vec![("Accept", "text/calendar".to_string())];
        if let Some(etag) = &prior_etag {
            headers.push(("If-None-Match", etag.clone()));
        }

        let response = self.http.get(url, &headers).await?;
        let new_etag = response
            .header("etag")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());

        if response.status == 304 {
            // Unchanged: keep parsed data, refresh only the validation state.
            if let Some(entry) = entries.get_mut(url) {
                entry.last_validated = Utc::now();
                if new_etag.is_some() {
                    entry.etag = new_etag;
                }
                tracing::debug!(%url, "feed not modified");
                return Ok(());
            }
            // A 304 with no cached body is unusable; treat as a status error
            // and leave the (empty) cache alone.
            return Err(FetchError::Status(304));
        }

        if !response.is_success() {
            return match response.status {
                401 => Err(FetchError::Unauthorized),
                s => Err(FetchError::Status(s)),
            };
        }

        let items = ics::parse_agenda_items(&response.body);
        let mut by_day: HashMap<String, Vec<AgendaItem>> = HashMap::new();
        for item in &items {
            if let Some(date) = item.due_date_local() {
                by_day.entry(day_key(date)).or_default().push(item.clone());
            }
        }

        tracing::debug!(%url, count = items.len(), "feed re-parsed");
        entries.insert(
            url.clone(),
            FeedEntry {
                etag: new_etag,
                items,
                by_day,
                last_validated: Utc::now(),
            },
        );
        Ok(())
    }

    /// Drop one entry, or everything when `url` is `None`. Called whenever
    /// the active source configuration changes.
    pub async fn invalidate(&self, url: Option<&Url>) {
        let mut entries = self.entries.lock().await;
        match url {
            Some(url) => {
                entries.remove(url);
            }
            None => entries.clear(),
        }
    }

    /// When the given feed's cache entry was last validated against the
    /// server, if it is cached at all.
    pub async fn last_validated(&self, url: &Url) -> Option<DateTime<Utc>> {
        self.entries.lock().await.get(url).map(|e| e.last_validated)
    }
}
