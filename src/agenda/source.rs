use std::sync::Arc;

use async_trait::async_trait;
use url::Url;

use crate::api::{CalendarClient, FetchError};
use crate::feed::FeedCache;
use crate::models::AgendaItem;
use crate::util::DayBounds;

/// A data source that can produce the items due within one day's bounds.
/// The REST client and the feed cache both sit behind this seam, which is
/// also where tests plug in scripted sources.
#[async_trait]
pub trait AgendaSource: Send + Sync {
    async fn fetch(
        &self,
        bounds: &DayBounds,
        force_reload: bool,
    ) -> Result<Vec<AgendaItem>, FetchError>;
}

#[async_trait]
impl AgendaSource for CalendarClient {
    async fn fetch(
        &self,
        bounds: &DayBounds,
        _force_reload: bool,
    ) -> Result<Vec<AgendaItem>, FetchError> {
        // The REST path has no cache of its own; every fetch is fresh.
        self.fetch_assignments(bounds).await
    }
}

/// ICS path: one feed URL read through the shared [`FeedCache`].
pub struct FeedSource {
    pub cache: Arc<FeedCache>,
    pub url: Url,
}

#[async_trait]
impl AgendaSource for FeedSource {
    async fn fetch(
        &self,
        bounds: &DayBounds,
        force_reload: bool,
    ) -> Result<Vec<AgendaItem>, FetchError> {
        self.cache.assignments(&self.url, bounds, force_reload).await
    }
}
