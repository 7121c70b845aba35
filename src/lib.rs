//! Due-today agenda core for Canvas LMS.
//!
//! Normalizes two data sources — the paginated Canvas REST calendar API and
//! a raw ICS feed — into one item model, keeps a per-day cache with adjacent
//! day prefetch and ETag revalidation, and derives completion, overdue, and
//! badge state for a front-end to render.

pub mod agenda;
pub mod api;
pub mod config;
pub mod feed;
pub mod ics;
pub mod models;
pub mod store;
pub mod util;

pub use agenda::{Agenda, KindFilter, RefreshReason, Snapshot};
pub use api::FetchError;
pub use config::{Config, SourceConfig};
pub use models::{AgendaItem, ItemKind};
pub use store::StateStore;
pub use util::DayBounds;
