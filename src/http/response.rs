use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;

use crate::http::mime;
use crate::http::request::{Request, SUPPORTED_VERSION};

/// Numeric HTTP status with its reason phrase.
///
/// Any code in 100..=599 can be carried (configured redirects pick their
/// own); the reason phrase falls back to the phrase of the code's class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StatusCode(u16);

impl StatusCode {
    pub const OK: StatusCode = StatusCode(200);
    pub const CREATED: StatusCode = StatusCode(201);
    pub const MOVED_PERMANENTLY: StatusCode = StatusCode(301);
    pub const FOUND: StatusCode = StatusCode(302);
    pub const BAD_REQUEST: StatusCode = StatusCode(400);
    pub const FORBIDDEN: StatusCode = StatusCode(403);
    pub const NOT_FOUND: StatusCode = StatusCode(404);
    pub const METHOD_NOT_ALLOWED: StatusCode = StatusCode(405);
    pub const CONFLICT: StatusCode = StatusCode(409);
    pub const PAYLOAD_TOO_LARGE: StatusCode = StatusCode(413);
    pub const HEADERS_TOO_LARGE: StatusCode = StatusCode(431);
    pub const INTERNAL_SERVER_ERROR: StatusCode = StatusCode(500);
    pub const VERSION_NOT_SUPPORTED: StatusCode = StatusCode(505);

    pub const fn from_u16(code: u16) -> Self {
        StatusCode(code)
    }

    /// Returns the numeric HTTP status code.
    ///
    /// # Example
    ///
    /// ```
    /// # use webserv::http::response::StatusCode;
    /// assert_eq!(StatusCode::OK.as_u16(), 200);
    /// assert_eq!(StatusCode::NOT_FOUND.as_u16(), 404);
    /// ```
    pub fn as_u16(&self) -> u16 {
        self.0
    }

    /// Returns the reason phrase, or the phrase of the status class when
    /// the exact code is not in the table.
    ///
    /// # Example
    ///
    /// ```
    /// # use webserv::http::response::StatusCode;
    /// assert_eq!(StatusCode::NOT_FOUND.reason_phrase(), "Not Found");
    /// assert_eq!(StatusCode::from_u16(499).reason_phrase(), "Bad Request");
    /// ```
    pub fn reason_phrase(&self) -> &'static str {
        Self::known_phrase(self.0)
            .or_else(|| Self::known_phrase(self.0 / 100 * 100))
            .unwrap_or("Unknown")
    }

    fn known_phrase(code: u16) -> Option<&'static str> {
        let phrase = match code {
            100 => "Continue",
            101 => "Switching Protocols",
            200 => "OK",
            201 => "Created",
            202 => "Accepted",
            204 => "No Content",
            300 => "Multiple Choices",
            301 => "Moved Permanently",
            302 => "Found",
            303 => "See Other",
            304 => "Not Modified",
            307 => "Temporary Redirect",
            308 => "Permanent Redirect",
            400 => "Bad Request",
            401 => "Unauthorized",
            403 => "Forbidden",
            404 => "Not Found",
            405 => "Method Not Allowed",
            408 => "Request Timeout",
            409 => "Conflict",
            411 => "Length Required",
            413 => "Payload Too Large",
            414 => "URI Too Long",
            415 => "Unsupported Media Type",
            431 => "Request Header Fields Too Large",
            500 => "Internal Server Error",
            501 => "Not Implemented",
            502 => "Bad Gateway",
            503 => "Service Unavailable",
            504 => "Gateway Timeout",
            505 => "HTTP Version Not Supported",
            _ => return None,
        };
        Some(phrase)
    }

    pub fn is_error(&self) -> bool {
        self.0 >= 400
    }
}

impl std::fmt::Display for StatusCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.0, self.reason_phrase())
    }
}

static TRANSIENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// A scratch file under the system temp directory, removed when dropped.
#[derive(Debug)]
pub struct TransientFile {
    path: PathBuf,
}

impl TransientFile {
    /// Creates an empty file with a process-unique name and returns it
    /// together with a handle open for writing.
    pub fn create(tag: &str) -> io::Result<(Self, File)> {
        let seq = TRANSIENT_SEQ.fetch_add(1, Ordering::Relaxed);
        let path = std::env::temp_dir().join(format!(
            "webserv-{tag}-{}-{seq}.tmp",
            std::process::id()
        ));
        let file = File::create(&path)?;
        Ok((Self { path }, file))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TransientFile {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            tracing::warn!(path = %self.path.display(), error = %e, "Failed to remove transient file");
        }
    }
}

/// Where the bytes after the head come from.
#[derive(Debug)]
pub enum Body {
    /// Generated in memory (error, redirect, listing and status pages).
    Memory(Bytes),
    /// A file under a virtual host root.
    File(PathBuf),
    /// Output captured from a CGI child.
    Transient(TransientFile),
    /// The resource has an extension with no known content type; nothing
    /// is sent and the connection is closed.
    Unsupported,
}

/// A response as assembled by the handler pipeline.
#[derive(Debug)]
pub struct Response {
    pub method: String,
    pub version: String,
    pub status: StatusCode,
    /// Filesystem path the request resolved to, if any.
    pub path: PathBuf,
    pub content_type: &'static str,
    /// Target for redirects, sent as a `Location` header.
    pub location: Option<String>,
    pub body: Body,
    /// Every byte of the body has been queued.
    pub finished: bool,
    /// At least one window has been queued but the body is not complete.
    pub in_progress: bool,
}

impl Response {
    pub fn new(request: &Request) -> Self {
        Self {
            method: request.method.clone(),
            version: if request.version.is_empty() {
                SUPPORTED_VERSION.to_string()
            } else {
                request.version.clone()
            },
            status: StatusCode::OK,
            path: PathBuf::new(),
            content_type: mime::HTML,
            location: None,
            body: Body::Memory(Bytes::new()),
            finished: false,
            in_progress: false,
        }
    }

    /// A response with a generated HTML page and no request behind it, as
    /// for requests that failed to parse.
    pub fn page(status: StatusCode, html: impl Into<Bytes>) -> Self {
        Self {
            method: String::new(),
            version: SUPPORTED_VERSION.to_string(),
            status,
            path: PathBuf::new(),
            content_type: mime::HTML,
            location: None,
            body: Body::Memory(html.into()),
            finished: false,
            in_progress: false,
        }
    }

    pub fn is_unsupported(&self) -> bool {
        matches!(self.body, Body::Unsupported)
    }

    /// Serializes the head with `length` as the declared content length.
    ///
    /// ```
    /// # use webserv::http::response::{Response, StatusCode};
    /// let resp = Response::page(StatusCode::NOT_FOUND, "");
    /// assert_eq!(
    ///     resp.head(12),
    ///     "HTTP/1.1 404 Not Found\nContent-Type: text/html; charset=utf-8\nContent-Length: 12\n\n"
    /// );
    /// ```
    pub fn head(&self, length: u64) -> String {
        let mut head = format!(
            "{SUPPORTED_VERSION} {} {}\nContent-Type: {}\n",
            self.status.as_u16(),
            self.status.reason_phrase(),
            self.content_type
        );
        if let Some(target) = &self.location {
            head.push_str(&format!("Location: {target}\n"));
        }
        head.push_str("Content-Length: LENGTH\n\n");
        head.replacen("LENGTH", &length.to_string(), 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn class_fallback() {
        assert_eq!(StatusCode::from_u16(418).reason_phrase(), "Bad Request");
        assert_eq!(StatusCode::from_u16(299).reason_phrase(), "OK");
        assert_eq!(StatusCode::from_u16(599).reason_phrase(), "Internal Server Error");
        assert_eq!(StatusCode::from_u16(999).reason_phrase(), "Unknown");
    }

    #[test]
    fn redirect_head_carries_location() {
        let mut resp = Response::page(StatusCode::MOVED_PERMANENTLY, "");
        resp.location = Some("http://example.com/".to_string());
        let head = resp.head(0);
        assert!(head.starts_with("HTTP/1.1 301 Moved Permanently\n"));
        assert!(head.contains("\nLocation: http://example.com/\n"));
        assert!(head.ends_with("Content-Length: 0\n\n"));
    }

    #[test]
    fn transient_file_is_removed_on_drop() {
        let (tmp, _file) = TransientFile::create("test").unwrap();
        let path = tmp.path().to_path_buf();
        assert!(path.exists());
        drop(tmp);
        assert!(!path.exists());
    }
}
