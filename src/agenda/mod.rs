//! Aggregation core: a single owner for the selected day, the per-day result
//! cache, filters, completion overlay, and the badge count.
//!
//! All published state lives behind one async mutex; fetches run outside the
//! lock and commit through a generation check, so a superseded refresh can
//! never overwrite newer state or clear a loading flag it no longer owns.
//! Consumers observe state through a `watch` channel snapshot.

mod source;

pub use source::{AgendaSource, FeedSource};

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{Duration, Local, NaiveDate};
use serde::Serialize;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

use crate::api::{CalendarClient, FetchError};
use crate::config::SourceConfig;
use crate::feed::FeedCache;
use crate::models::{AgendaItem, ItemKind};
use crate::store::StateStore;
use crate::util::{day_key, DayBounds};

pub const MIN_REFRESH_MINUTES: u64 = 5;

/// Offsets (in days) prefetched around the selected day after a successful
/// foreground refresh.
const PREFETCH_OFFSETS: [i64; 4] = [-1, 1, -2, 2];

// ─── Public types ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshReason {
    Manual,
    Timer,
    DayChange,
    ConfigChange,
    Startup,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum KindFilter {
    All,
    Assignments,
    Events,
}

impl KindFilter {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Assignments => "assignments",
            Self::Events => "events",
        }
    }

    pub fn from_persisted(value: &str) -> Option<Self> {
        match value {
            "all" => Some(Self::All),
            "assignments" => Some(Self::Assignments),
            "events" => Some(Self::Events),
            _ => None,
        }
    }

    fn matches(self, kind: ItemKind) -> bool {
        match self {
            Self::All => true,
            Self::Assignments => kind == ItemKind::Assignment,
            Self::Events => kind == ItemKind::CalendarEvent,
        }
    }
}

/// Everything a front-end needs to render, published on each transition.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub day: NaiveDate,
    /// Selected day's items with kind and course filters applied.
    pub items: Vec<AgendaItem>,
    pub loading: bool,
    pub message: Option<String>,
    /// Remaining assignments due on the real current day.
    pub badge_count: usize,
    pub kind_filter: KindFilter,
    pub course_options: Vec<String>,
    pub selected_courses: HashSet<String>,
    pub completed: HashSet<String>,
}

impl Snapshot {
    fn empty(day: NaiveDate, kind_filter: KindFilter) -> Self {
        Self {
            day,
            items: Vec::new(),
            loading: false,
            message: None,
            badge_count: 0,
            kind_filter,
            course_options: Vec::new(),
            selected_courses: HashSet::new(),
            completed: HashSet::new(),
        }
    }
}

// ─── State ──────────────────────────────────────────────────────────────────

struct AgendaState {
    selected_day: NaiveDate,
    source: Option<Arc<dyn AgendaSource>>,
    /// Day-key → sorted items fetched for that day.
    day_cache: HashMap<String, Vec<AgendaItem>>,
    /// Most recent successful fetch of the real current day; the badge falls
    /// back to this when the day cache has been invalidated.
    today_items: Option<Vec<AgendaItem>>,
    kind_filter: KindFilter,
    course_filter: HashSet<String>,
    course_options: Vec<String>,
    loading: bool,
    message: Option<String>,
    store: StateStore,
    force_feed_reload: bool,
    timer: Option<JoinHandle<()>>,
}

impl AgendaState {
    fn rebuild_course_options(&mut self, items: &[AgendaItem]) {
        let mut options: Vec<String> = Vec::new();
        for item in items {
            let course = item.display_course();
            if !options.contains(&course) {
                options.push(course);
            }
        }
        self.course_filter.retain(|c| options.contains(c));
        self.course_options = options;
    }

    fn clear_visible(&mut self) {
        self.day_cache.clear();
        self.today_items = None;
        self.course_options.clear();
        self.course_filter.clear();
    }
}

pub struct Agenda {
    inner: Mutex<AgendaState>,
    /// Foreground refresh generation; only the newest stamp may commit.
    generation: AtomicU64,
    /// Bumped on configuration change so stale prefetches cannot repopulate
    /// an invalidated cache.
    config_epoch: AtomicU64,
    feed_cache: Arc<FeedCache>,
    tx: watch::Sender<Snapshot>,
}

impl Agenda {
    pub fn new(store: StateStore) -> Result<Arc<Self>, FetchError> {
        Ok(Self::with_feed_cache(store, Arc::new(FeedCache::new()?)))
    }

    pub fn with_feed_cache(store: StateStore, feed_cache: Arc<FeedCache>) -> Arc<Self> {
        let kind_filter = store
            .kind_filter()
            .and_then(KindFilter::from_persisted)
            .unwrap_or(KindFilter::All);
        let today = Local::now().date_naive();
        let (tx, _) = watch::channel(Snapshot::empty(today, kind_filter));

        Arc::new(Self {
            inner: Mutex::new(AgendaState {
                selected_day: today,
                source: None,
                day_cache: HashMap::new(),
                today_items: None,
                kind_filter,
                course_filter: HashSet::new(),
                course_options: Vec::new(),
                loading: false,
                message: None,
                store,
                force_feed_reload: false,
                timer: None,
            }),
            generation: AtomicU64::new(0),
            config_epoch: AtomicU64::new(0),
            feed_cache,
            tx,
        })
    }

    /// Observe published snapshots. The receiver always holds the latest.
    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.tx.subscribe()
    }

    // ── Configuration ───────────────────────────────────────────────────

    /// Apply a configuration change: the whole per-day cache and the feed
    /// cache are invalidated, the next feed fetch is forced, and an
    /// immediate refresh runs against the new source.
    pub async fn set_config(self: &Arc<Self>, config: Option<SourceConfig>) {
        let source: Option<Arc<dyn AgendaSource>> = match config {
            Some(SourceConfig::Canvas {
                base_url,
                token,
                context_codes,
            }) => match CalendarClient::new(base_url, token, context_codes) {
                Ok(client) => Some(Arc::new(client)),
                Err(err) => {
                    tracing::warn!(error = %err, "failed to build REST client");
                    None
                }
            },
            Some(SourceConfig::Feed { url }) => Some(Arc::new(FeedSource {
                cache: Arc::clone(&self.feed_cache),
                url,
            })),
            None => None,
        };
        self.set_source(source).await;
    }

    /// Lower-level form of [`set_config`](Self::set_config) taking a ready
    /// source; tests use this to inject scripted sources.
    pub async fn set_source(self: &Arc<Self>, source: Option<Arc<dyn AgendaSource>>) {
        self.config_epoch.fetch_add(1, Ordering::SeqCst);
        self.feed_cache.invalidate(None).await;
        {
            let mut state = self.inner.lock().await;
            state.clear_visible();
            state.force_feed_reload = true;
            state.source = source;
        }
        self.refresh(RefreshReason::ConfigChange).await;
    }

    // ── Refresh ─────────────────────────────────────────────────────────

    /// Fetch the selected day from the active source and commit the result
    /// if no newer refresh has started since. On success the adjacent days
    /// are prefetched in the background.
    pub async fn refresh(self: &Arc<Self>, reason: RefreshReason) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        let (source, day, force) = {
            let mut state = self.inner.lock().await;
            let Some(source) = state.source.clone() else {
                state.clear_visible();
                state.loading = false;
                state.message = Some(FetchError::NotConfigured.to_string());
                self.publish(&state);
                return;
            };
            state.loading = true;
            let force = std::mem::take(&mut state.force_feed_reload);
            self.publish(&state);
            (source, state.selected_day, force)
        };

        tracing::debug!(?reason, day = %day, "refresh");
        let bounds = DayBounds::for_date(day);
        let result = source.fetch(&bounds, force).await;

        let prefetch = {
            let mut state = self.inner.lock().await;
            if self.generation.load(Ordering::SeqCst) != generation {
                // Superseded: a newer refresh owns the loading flag and any
                // error reporting now.
                tracing::debug!(day = %day, "stale refresh dropped");
                return;
            }
            state.loading = false;
            let ok = match result {
                Ok(mut items) => {
                    sort_by_due(&mut items);
                    state.day_cache.insert(day_key(day), items.clone());
                    if day == Local::now().date_naive() {
                        state.today_items = Some(items.clone());
                    }
                    if day == state.selected_day {
                        state.rebuild_course_options(&items);
                        state.message = None;
                    }
                    true
                }
                Err(err) => {
                    // Errors are only user-visible for the day being looked
                    // at; anything else is stale by definition.
                    if day == state.selected_day {
                        tracing::warn!(day = %day, error = %err, "refresh failed");
                        state.message = Some(err.to_string());
                    }
                    false
                }
            };
            self.publish(&state);
            ok
        };

        if prefetch {
            self.spawn_prefetch(day);
        }
    }

    fn spawn_prefetch(self: &Arc<Self>, around: NaiveDate) {
        let epoch = self.config_epoch.load(Ordering::SeqCst);
        for offset in PREFETCH_OFFSETS {
            let date = around + Duration::days(offset);
            let this = Arc::clone(self);
            tokio::spawn(async move {
                this.prefetch_day(date, epoch).await;
            });
        }
    }

    /// Best-effort background fetch of one adjacent day. Only ever writes
    /// the shared day cache and the today snapshot; errors are swallowed.
    async fn prefetch_day(self: Arc<Self>, date: NaiveDate, epoch: u64) {
        let source = {
            let state = self.inner.lock().await;
            if state.day_cache.contains_key(&day_key(date)) {
                return;
            }
            match &state.source {
                Some(source) => Arc::clone(source),
                None => return,
            }
        };

        let bounds = DayBounds::for_date(date);
        match source.fetch(&bounds, false).await {
            Ok(mut items) => {
                sort_by_due(&mut items);
                let mut state = self.inner.lock().await;
                if self.config_epoch.load(Ordering::SeqCst) != epoch {
                    // Configuration changed while this was in flight.
                    return;
                }
                state
                    .day_cache
                    .entry(day_key(date))
                    .or_insert_with(|| items.clone());
                if date == Local::now().date_naive() {
                    state.today_items = Some(items);
                    // Badge may have changed; the visible day is untouched.
                    self.publish(&state);
                }
            }
            Err(err) => {
                tracing::debug!(day = %date, error = %err, "prefetch failed, ignoring");
            }
        }
    }

    // ── Navigation ──────────────────────────────────────────────────────

    /// Move the selected day, showing cached data (or an empty view)
    /// immediately while a refresh runs for the new day.
    pub async fn change_day(self: &Arc<Self>, delta: i64) {
        self.select_day_offset(Some(delta)).await;
    }

    pub async fn go_to_today(self: &Arc<Self>) {
        self.select_day_offset(None).await;
    }

    async fn select_day_offset(self: &Arc<Self>, delta: Option<i64>) {
        {
            let mut state = self.inner.lock().await;
            state.selected_day = match delta {
                Some(days) => state.selected_day + Duration::days(days),
                None => Local::now().date_naive(),
            };
            let cached = state
                .day_cache
                .get(&day_key(state.selected_day))
                .cloned()
                .unwrap_or_default();
            state.rebuild_course_options(&cached);
            state.message = None;
            self.publish(&state);
        }
        self.refresh(RefreshReason::DayChange).await;
    }

    // ── Completion ──────────────────────────────────────────────────────

    /// Flip completion for an entity on the selected day and return the
    /// day's updated completion set.
    pub async fn toggle_completion(&self, id: &str) -> HashSet<String> {
        let mut state = self.inner.lock().await;
        let key = day_key(state.selected_day);
        let set = match state.store.toggle(id, &key) {
            Ok(set) => set,
            Err(err) => {
                tracing::warn!(error = %err, "failed to persist completion state");
                state.store.completions(&key)
            }
        };
        self.publish(&state);
        set
    }

    // ── Filters ─────────────────────────────────────────────────────────

    pub async fn set_kind_filter(&self, filter: KindFilter) {
        let mut state = self.inner.lock().await;
        state.kind_filter = filter;
        if let Err(err) = state.store.set_kind_filter(filter.as_str()) {
            tracing::warn!(error = %err, "failed to persist kind filter");
        }
        self.publish(&state);
    }

    /// Select or deselect one course; filtering re-applies from the cache
    /// without a fetch. An empty selection shows every course.
    pub async fn toggle_course(&self, course: &str) {
        let mut state = self.inner.lock().await;
        if !state.course_filter.remove(course) {
            state.course_filter.insert(course.to_string());
        }
        self.publish(&state);
    }

    // ── Timer ───────────────────────────────────────────────────────────

    /// Rebuild the auto-refresh timer with a new interval (minimum five
    /// minutes). The previous timer task is torn down.
    pub async fn set_refresh_interval(self: &Arc<Self>, minutes: u64) {
        let minutes = minutes.max(MIN_REFRESH_MINUTES);
        let period = std::time::Duration::from_secs(minutes * 60);

        let weak = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            let start = tokio::time::Instant::now() + period;
            let mut ticker = tokio::time::interval_at(start, period);
            loop {
                ticker.tick().await;
                let Some(agenda) = weak.upgrade() else { break };
                agenda.refresh(RefreshReason::Timer).await;
            }
        });

        let mut state = self.inner.lock().await;
        if let Some(old) = state.timer.replace(handle) {
            old.abort();
        }
    }

    // ── Snapshot ────────────────────────────────────────────────────────

    fn publish(&self, state: &AgendaState) {
        // send_replace updates the value even with no live receivers, so a
        // late subscriber still sees the latest state.
        let _ = self.tx.send_replace(self.snapshot_of(state));
    }

    fn snapshot_of(&self, state: &AgendaState) -> Snapshot {
        let key = day_key(state.selected_day);
        let completed = state.store.completions(&key);

        let items: Vec<AgendaItem> = state
            .day_cache
            .get(&key)
            .map(|items| {
                items
                    .iter()
                    .filter(|item| state.kind_filter.matches(item.kind))
                    .filter(|item| {
                        state.course_filter.is_empty()
                            || state.course_filter.contains(&item.display_course())
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        Snapshot {
            day: state.selected_day,
            items,
            loading: state.loading,
            message: state.message.clone(),
            badge_count: badge_count(state),
            kind_filter: state.kind_filter,
            course_options: state.course_options.clone(),
            selected_courses: state.course_filter.clone(),
            completed,
        }
    }
}

/// Remaining assignments due on the real current day, regardless of which
/// day is being browsed.
fn badge_count(state: &AgendaState) -> usize {
    let today = Local::now().date_naive();
    let key = day_key(today);
    let completed = state.store.completions(&key);

    let items = match state.day_cache.get(&key) {
        Some(items) => items.as_slice(),
        None => state
            .today_items
            .as_deref()
            .unwrap_or_default(),
    };

    items
        .iter()
        .filter(|item| item.kind == ItemKind::Assignment)
        .filter(|item| !completed.contains(&item.id))
        .count()
}

/// Ascending by effective due instant; items with no due date sort last.
fn sort_by_due(items: &mut [AgendaItem]) {
    items.sort_by(|a, b| match (a.effective_due_at(), b.effective_due_at()) {
        (None, None) => std::cmp::Ordering::Equal,
        (None, _) => std::cmp::Ordering::Greater,
        (_, None) => std::cmp::Ordering::Less,
        (Some(x), Some(y)) => x.cmp(&y),
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn item(id: &str, due_hour: Option<u32>) -> AgendaItem {
        AgendaItem {
            id: id.into(),
            title: id.into(),
            course_name: None,
            course_code: None,
            due_at: due_hour.map(|h| Utc.with_ymd_and_hms(2024, 1, 15, h, 0, 0).unwrap()),
            all_day_date: None,
            all_day: false,
            html_url: None,
            points_possible: None,
            description: None,
            html_description: None,
            location: None,
            kind: ItemKind::Assignment,
            tags: Vec::new(),
            has_submitted: None,
            submission: None,
        }
    }

    #[test]
    fn sort_puts_undated_items_last() {
        let mut items = vec![item("b", Some(12)), item("c", None), item("a", Some(9))];
        sort_by_due(&mut items);
        let ids: Vec<&str> = items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn kind_filter_round_trips_through_persisted_string() {
        for filter in [KindFilter::All, KindFilter::Assignments, KindFilter::Events] {
            assert_eq!(KindFilter::from_persisted(filter.as_str()), Some(filter));
        }
        assert_eq!(KindFilter::from_persisted("bogus"), None);
    }

    #[test]
    fn kind_filter_matches_kinds() {
        assert!(KindFilter::All.matches(ItemKind::CalendarEvent));
        assert!(KindFilter::Assignments.matches(ItemKind::Assignment));
        assert!(!KindFilter::Assignments.matches(ItemKind::CalendarEvent));
        assert!(KindFilter::Events.matches(ItemKind::CalendarEvent));
        assert!(!KindFilter::Events.matches(ItemKind::Assignment));
    }
}
