use reqwest::header::HeaderMap;

/// Pull the `rel="next"` URL out of an RFC 5988 `Link` response header.
/// The Canvas API paginates every list endpoint this way.
pub fn next_link(headers: &HeaderMap) -> Option<String> {
    let header = headers.get("link").and_then(|v| v.to_str().ok())?;

    for part in header.split(',') {
        let mut segments = part.split(';');
        let url = segments
            .next()
            .map(|s| s.trim().trim_start_matches('<').trim_end_matches('>'))?;
        let is_next = segments.any(|s| {
            let s = s.trim();
            s.strip_prefix("rel=")
                .map(|rel| rel.trim_matches('"') == "next")
                .unwrap_or(false)
        });
        if is_next {
            return Some(url.to_string());
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    fn headers(link: &str) -> HeaderMap {
        let mut map = HeaderMap::new();
        map.insert("link", HeaderValue::from_str(link).unwrap());
        map
    }

    #[test]
    fn extracts_rel_next() {
        let map = headers(
            "<https://school.test/api/v1/calendar_events?page=2>; rel=\"next\", \
             <https://school.test/api/v1/calendar_events?page=1>; rel=\"current\"",
        );
        assert_eq!(
            next_link(&map).as_deref(),
            Some("https://school.test/api/v1/calendar_events?page=2")
        );
    }

    #[test]
    fn no_next_on_last_page() {
        let map = headers("<https://school.test/api?page=3>; rel=\"current\"");
        assert_eq!(next_link(&map), None);
        assert_eq!(next_link(&HeaderMap::new()), None);
    }
}
