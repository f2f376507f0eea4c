//! Fragment payloads and the extension table used for conversions.

use serde::{Deserialize, Serialize};

/// Raw content of a fragment as read from the API or the local store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FragmentContent {
    /// Content type the payload is encoded as.
    pub content_type: String,
    /// Raw bytes.
    pub data: Vec<u8>,
}

impl FragmentContent {
    pub fn new(content_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            content_type: content_type.into(),
            data,
        }
    }
}

const EXTENSIONS: &[(&str, &str)] = &[
    ("txt", "text/plain"),
    ("md", "text/markdown"),
    ("html", "text/html"),
    ("csv", "text/csv"),
    ("json", "application/json"),
    ("yaml", "application/yaml"),
    ("yml", "application/yaml"),
    ("png", "image/png"),
    ("jpg", "image/jpeg"),
    ("webp", "image/webp"),
    ("avif", "image/avif"),
    ("gif", "image/gif"),
];

/// Strip parameters such as `; charset=utf-8` from a content type.
pub fn base_type(content_type: &str) -> &str {
    content_type
        .split(';')
        .next()
        .unwrap_or(content_type)
        .trim()
}

/// Content type a conversion extension produces, e.g. `md` → `text/markdown`.
///
/// A leading dot is accepted.
pub fn type_for_extension(ext: &str) -> Option<&'static str> {
    let ext = ext.trim_start_matches('.').to_ascii_lowercase();
    EXTENSIONS
        .iter()
        .find(|(e, _)| *e == ext)
        .map(|(_, t)| *t)
}

/// Preferred extension for a content type.
pub fn extension_for_type(content_type: &str) -> Option<&'static str> {
    let base = base_type(content_type);
    EXTENSIONS
        .iter()
        .find(|(_, t)| t.eq_ignore_ascii_case(base))
        .map(|(e, _)| *e)
}
