use std::collections::HashMap;

/// The only protocol version the server speaks.
pub const SUPPORTED_VERSION: &str = "HTTP/1.1";

/// Request methods the server knows how to answer.
///
/// The parser accepts any uppercase token as a method; [`Method::from_token`]
/// narrows it to this closed set right before dispatch. Anything else is
/// answered with 405 Method Not Allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// GET - Retrieve a resource
    Get,
    /// POST - Upload a resource or feed a CGI script
    Post,
    /// DELETE - Remove a resource
    Delete,
}

impl Method {
    /// Parses a method token (case-sensitive).
    ///
    /// # Example
    ///
    /// ```
    /// # use webserv::http::request::Method;
    /// assert_eq!(Method::from_token("GET"), Some(Method::Get));
    /// assert_eq!(Method::from_token("get"), None);
    /// ```
    pub fn from_token(s: &str) -> Option<Self> {
        match s {
            "GET" => Some(Method::Get),
            "POST" => Some(Method::Post),
            "DELETE" => Some(Method::Delete),
            _ => None,
        }
    }
}

/// Represents a request read from a client.
///
/// A `Request` is filled in incrementally by the
/// [`RequestParser`](crate::http::parser::RequestParser); `finished` turns
/// true once the whole message, body included, has been consumed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Request {
    /// Method token as sent by the client (e.g. "GET")
    pub method: String,
    /// Raw request target, not yet resolved against the filesystem
    pub path: String,
    /// Protocol version, always [`SUPPORTED_VERSION`] once parsed
    pub version: String,
    /// Value of the `Host` header, if any
    pub host: String,
    /// Header names as sent; a name repeated in any case keeps the last value
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
    /// Size announced by `Content-Length`
    pub body_size: usize,
    pub finished: bool,
}

/// Builder for constructing Request objects.
pub struct RequestBuilder {
    method: Option<String>,
    path: Option<String>,
    version: Option<String>,
    headers: HashMap<String, String>,
    body: Vec<u8>,
}

impl RequestBuilder {
    pub fn new() -> Self {
        Self {
            method: None,
            path: None,
            version: None,
            headers: HashMap::new(),
            body: Vec::new(),
        }
    }

    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        self.headers.retain(|k, _| !k.eq_ignore_ascii_case(&key));
        self.headers.insert(key, value.into());
        self
    }

    pub fn body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    /// Builds a finished request. `host` and `body_size` are derived from
    /// the headers and body the same way the parser derives them.
    pub fn build(self) -> Result<Request, &'static str> {
        let mut request = Request {
            method: self.method.ok_or("method missing")?,
            path: self.path.ok_or("path missing")?,
            version: self.version.unwrap_or_else(|| SUPPORTED_VERSION.to_string()),
            headers: self.headers,
            body_size: self.body.len(),
            body: self.body,
            host: String::new(),
            finished: true,
        };
        if let Some(host) = request.header("Host") {
            request.host = host.to_string();
        }
        Ok(request)
    }
}

impl Default for RequestBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl Request {
    /// Stores a header, replacing an earlier one whose name differs only in
    /// ASCII case. `Host` is mirrored into [`Request::host`].
    pub fn set_header(&mut self, key: String, value: String) {
        self.headers.retain(|k, _| !k.eq_ignore_ascii_case(&key));
        if key.eq_ignore_ascii_case("Host") {
            self.host = value.clone();
        }
        self.headers.insert(key, value);
    }

    /// Looks a header up by name, ignoring ASCII case.
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// `None` when the header is absent, `Some(Err)` when it is not a number.
    pub fn content_length(&self) -> Option<Result<usize, std::num::ParseIntError>> {
        self.header("Content-Length").map(|v| v.parse())
    }

    /// Narrows the method token to the closed set the server dispatches on.
    pub fn known_method(&self) -> Option<Method> {
        Method::from_token(&self.method)
    }
}
