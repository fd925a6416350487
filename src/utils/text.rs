use ammonia::Builder;

/// Strip every HTML tag from user-supplied text and trim it. Text content
/// is kept; markup characters come back entity-escaped.
pub fn sanitize_plain(raw: &str) -> String {
    Builder::empty().clean(raw.trim()).to_string()
}

/// Trimmed value, or `None` when blank.
pub fn non_blank(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
