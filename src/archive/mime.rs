//! Content-type lookup by file extension

/// Fallback for anything not in the table
pub const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

/// Resolve the content type for a path from its extension
pub fn mime_type_for(path: &str) -> &'static str {
    let extension = match path.rsplit_once('.') {
        Some((_, ext)) if !ext.contains('/') => ext.to_ascii_lowercase(),
        _ => return DEFAULT_MIME_TYPE,
    };

    match extension.as_str() {
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "js" => "application/javascript",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "svg" => "image/svg+xml",
        _ => DEFAULT_MIME_TYPE,
    }
}

/// Markup entries get link rewriting and a base-path directive
pub fn is_markup(path: &str) -> bool {
    matches!(mime_type_for(path), "text/html")
}

/// Stylesheet entries get link rewriting only
pub fn is_stylesheet(path: &str) -> bool {
    matches!(mime_type_for(path), "text/css")
}
