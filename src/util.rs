use chrono::{DateTime, Duration, Local, NaiveDate, TimeZone, Utc};

// ─── Day bounds ─────────────────────────────────────────────────────────────

/// Half-open instant interval `[start, end)` covering one local calendar day.
///
/// `end` is the local midnight of the *following* day, computed with calendar
/// day-arithmetic so the interval is 23/24/25 hours across DST transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayBounds {
    pub date: NaiveDate,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DayBounds {
    pub fn for_date(date: NaiveDate) -> Self {
        let next = date + Duration::days(1);
        Self {
            date,
            start: local_midnight(date),
            end: local_midnight(next),
        }
    }

    /// Half-open containment: an instant exactly at `end` belongs to the
    /// next day, not this one.
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start <= instant && instant < self.end
    }

    pub fn day_key(&self) -> String {
        day_key(self.date)
    }
}

/// Canonical `YYYY-MM-DD` key used to index per-day caches.
pub fn day_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Local midnight of `date` as a UTC instant. If midnight does not exist
/// (DST spring-forward at 00:00), the first valid instant of the day is used.
pub fn local_midnight(date: NaiveDate) -> DateTime<Utc> {
    let naive = date.and_time(chrono::NaiveTime::MIN);
    match Local.from_local_datetime(&naive).earliest() {
        Some(dt) => dt.with_timezone(&Utc),
        None => {
            // Midnight was skipped by a DST jump; walk forward to the first
            // hour that exists.
            let mut probe = naive + Duration::hours(1);
            loop {
                if let Some(dt) = Local.from_local_datetime(&probe).earliest() {
                    return dt.with_timezone(&Utc);
                }
                probe += Duration::hours(1);
            }
        }
    }
}

// ─── Version compare ────────────────────────────────────────────────────────

/// Compare two dotted numeric version strings (`"1.4.2"` vs `"1.10"`).
/// Missing segments count as zero; non-numeric segments count as zero.
pub fn compare_versions(a: &str, b: &str) -> std::cmp::Ordering {
    let parse = |s: &str| -> Vec<u64> {
        s.trim_start_matches('v')
            .split('.')
            .map(|seg| seg.trim().parse::<u64>().unwrap_or(0))
            .collect()
    };
    let (va, vb) = (parse(a), parse(b));
    let len = va.len().max(vb.len());
    for i in 0..len {
        let x = va.get(i).copied().unwrap_or(0);
        let y = vb.get(i).copied().unwrap_or(0);
        match x.cmp(&y) {
            std::cmp::Ordering::Equal => continue,
            other => return other,
        }
    }
    std::cmp::Ordering::Equal
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cmp::Ordering;

    #[test]
    fn day_bounds_are_half_open() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        let bounds = DayBounds::for_date(date);
        let next = DayBounds::for_date(date + Duration::days(1));

        assert!(bounds.contains(bounds.start));
        assert!(bounds.contains(bounds.end - Duration::seconds(1)));
        // The exact end instant belongs to the next day.
        assert!(!bounds.contains(bounds.end));
        assert!(next.contains(bounds.end));
        assert_eq!(bounds.end, next.start);
    }

    #[test]
    fn day_key_is_iso_date() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 7).unwrap();
        assert_eq!(day_key(date), "2024-03-07");
    }

    #[test]
    fn version_compare_orders_numerically() {
        assert_eq!(compare_versions("1.4.2", "1.10"), Ordering::Less);
        assert_eq!(compare_versions("2.0", "2.0.0"), Ordering::Equal);
        assert_eq!(compare_versions("1.2.1", "1.2"), Ordering::Greater);
        assert_eq!(compare_versions("v1.3", "1.2.9"), Ordering::Greater);
    }
}
