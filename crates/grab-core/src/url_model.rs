//! Local filenames for remote resources.
//!
//! Output paths are built by tasks; these helpers only turn a URL into one
//! safe path component.

/// Used when the URL yields no usable name.
pub const DEFAULT_FILENAME: &str = "download.bin";

/// Longest file name most Linux filesystems accept (NAME_MAX, in bytes).
const NAME_MAX: usize = 255;

/// Last non-empty path segment of `url`, if any. Query and fragment are ignored.
pub fn filename_from_url(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let last = parsed.path_segments()?.filter(|s| !s.is_empty()).last()?;
    match last {
        "." | ".." => None,
        s => Some(s.to_string()),
    }
}

/// Makes `name` safe as a single path component: separators, NUL, control
/// characters and whitespace become `_` (runs collapsed), leading/trailing
/// dots and underscores are trimmed, and the result is cut to `NAME_MAX` bytes.
pub fn sanitize_component(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        let unsafe_char = matches!(c, '/' | '\\' | '\0') || c.is_control() || c.is_whitespace();
        if unsafe_char {
            if !out.ends_with('_') {
                out.push('_');
            }
        } else {
            out.push(c);
        }
    }
    let trimmed = out.trim_matches(|c| c == '.' || c == '_');
    let mut end = trimmed.len().min(NAME_MAX);
    while !trimmed.is_char_boundary(end) {
        end -= 1;
    }
    trimmed[..end].to_string()
}

/// Safe filename for saving `url`, falling back to [`DEFAULT_FILENAME`].
pub fn derive_filename(url: &str) -> String {
    filename_from_url(url)
        .map(|raw| sanitize_component(&raw))
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| DEFAULT_FILENAME.to_string())
}
