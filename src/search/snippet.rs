//! Result snippets

const ELLIPSIS: &str = "...";

/// Shorten `content` to at most `max_chars` characters (plus the ellipsis),
/// cutting at the last word boundary that fits.
///
/// A single word longer than the limit is cut mid-word since there is no
/// boundary to use.
pub fn snippet(content: &str, max_chars: usize) -> String {
    let content = content.trim();
    if content.chars().count() <= max_chars {
        return content.to_string();
    }

    let cut = content
        .char_indices()
        .nth(max_chars)
        .map_or(content.len(), |(i, _)| i);
    let head = &content[..cut];

    // The cut lands on a boundary when the next char is whitespace.
    let at_boundary = content[cut..].starts_with(char::is_whitespace);
    let kept = if at_boundary {
        head
    } else {
        match head.rfind(char::is_whitespace) {
            Some(space) => &head[..space],
            None => head,
        }
    };

    format!("{}{}", kept.trim_end(), ELLIPSIS)
}
