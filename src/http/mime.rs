//! Static extension → content-type table.

use std::path::Path;

/// Content type used for generated pages and CGI output.
pub const HTML: &str = "text/html; charset=utf-8";

/// Looks up the content type for `path` by extension (case-insensitive).
///
/// A file without an extension is served as plain text. `None` means the
/// extension is not supported.
///
/// ```
/// # use webserv::http::mime::content_type;
/// assert_eq!(content_type("www/index.html".as_ref()), Some("text/html; charset=utf-8"));
/// assert_eq!(content_type("README".as_ref()), Some("text/plain; charset=utf-8"));
/// assert_eq!(content_type("archive.xyz".as_ref()), None);
/// ```
pub fn content_type(path: &Path) -> Option<&'static str> {
    let Some(ext) = path.extension() else {
        return Some("text/plain; charset=utf-8");
    };
    let ext = ext.to_str()?.to_ascii_lowercase();
    let mime = match ext.as_str() {
        "htm" | "html" => HTML,
        "txt" | "text" => "text/plain; charset=utf-8",
        "css" => "text/css",
        "csv" => "text/csv",
        "js" | "mjs" => "application/javascript",
        "json" => "application/json",
        "xml" => "application/xml",
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        "gz" => "application/gzip",
        "wasm" => "application/wasm",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "ico" => "image/x-icon",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "ogg" => "audio/ogg",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "ttf" => "font/ttf",
        "bin" => "application/octet-stream",
        _ => return None,
    };
    Some(mime)
}
