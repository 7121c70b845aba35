//! Minimal HTML handling for feed descriptions: drop script/style blocks,
//! then flatten markup to plain text for display.

/// Remove `<script>` and `<style>` blocks (tags and contents,
/// case-insensitive) from an HTML fragment.
pub fn sanitize_html(html: &str) -> String {
    let mut out = html.to_string();
    for tag in ["script", "style"] {
        out = strip_tag_blocks(&out, tag);
    }
    out
}

/// Flatten an HTML fragment to plain text: block-level breaks become
/// newlines, remaining tags are dropped, common entities are decoded.
pub fn html_to_text(html: &str) -> String {
    let mut text = String::with_capacity(html.len());
    let bytes = html.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'<' {
            let close = match find_byte(bytes, b'>', i) {
                Some(pos) => pos,
                None => break,
            };
            let tag = html[i + 1..close].trim().to_ascii_lowercase();
            let name = tag
                .trim_start_matches('/')
                .split(|c: char| c.is_whitespace() || c == '/')
                .next()
                .unwrap_or("");
            if matches!(name, "br" | "p" | "div" | "li" | "tr") {
                text.push('\n');
            }
            i = close + 1;
        } else {
            // Safe: '<' and '>' are single-byte, so i sits on a char boundary.
            let ch = html[i..].chars().next().unwrap_or('\u{FFFD}');
            text.push(ch);
            i += ch.len_utf8();
        }
    }

    let decoded = decode_entities(&text);

    // Collapse runs of blank lines and trim the edges.
    let mut lines: Vec<&str> = Vec::new();
    let mut last_blank = true;
    for line in decoded.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            if !last_blank {
                lines.push("");
            }
            last_blank = true;
        } else {
            lines.push(trimmed);
            last_blank = false;
        }
    }
    while lines.last() == Some(&"") {
        lines.pop();
    }
    lines.join("\n")
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// Remove every `<tag ...>...</tag>` span, matching the tag name
/// case-insensitively. An unclosed opening tag swallows the rest of the
/// fragment.
fn strip_tag_blocks(html: &str, tag: &str) -> String {
    let open = format!("<{tag}");
    let close = format!("</{tag}");
    let mut out = String::with_capacity(html.len());
    let mut i = 0;

    while let Some(start) = find_ci(html.as_bytes(), open.as_bytes(), i) {
        out.push_str(&html[i..start]);
        let after_open = match find_byte(html.as_bytes(), b'>', start) {
            Some(pos) => pos + 1,
            None => return out,
        };
        match find_ci(html.as_bytes(), close.as_bytes(), after_open) {
            Some(end) => {
                i = match find_byte(html.as_bytes(), b'>', end) {
                    Some(pos) => pos + 1,
                    None => return out,
                };
            }
            None => return out,
        }
    }

    out.push_str(&html[i..]);
    out
}

/// ASCII-case-insensitive substring search returning a byte offset.
fn find_ci(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    (from..=haystack.len() - needle.len())
        .find(|&i| haystack[i..i + needle.len()].eq_ignore_ascii_case(needle))
}

fn find_byte(haystack: &[u8], byte: u8, from: usize) -> Option<usize> {
    haystack[from..].iter().position(|&b| b == byte).map(|p| p + from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_script_and_style_blocks() {
        let html = "before<SCRIPT type=\"text/javascript\">evil()</Script>mid<style>.a{}</style>after";
        assert_eq!(sanitize_html(html), "beforemidafter");
    }

    #[test]
    fn unclosed_script_swallows_rest() {
        let html = "keep<script>never ends";
        assert_eq!(sanitize_html(html), "keep");
    }

    #[test]
    fn flattens_markup_to_text() {
        let html = "<p>One &amp; two</p><p>Three<br>Four</p>";
        // Paragraph boundaries keep one blank line; <br> is a plain break.
        assert_eq!(html_to_text(html), "One & two\n\nThree\nFour");
    }

    #[test]
    fn decodes_common_entities() {
        assert_eq!(html_to_text("a &lt;b&gt; &quot;c&quot;&nbsp;d"), "a <b> \"c\" d");
    }
}
