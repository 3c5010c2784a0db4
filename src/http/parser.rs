//! Incremental request parser.
//!
//! [`RequestParser`] is a byte-driven state machine: every call to
//! [`RequestParser::feed`] consumes whatever slice the socket produced and
//! resumes exactly where the previous call stopped, so a request split over
//! any number of reads parses to the same [`Request`] as one delivered whole.
//!
//! ```text
//! METHOD_START → METHOD → URI_START → URI → HTTP_VERSION
//!   → REQUEST_LINE_CRLF → REQUEST_LINE_LF → HEADER_LINE_START
//!   → { HEADER_LINE_KEY → HEADER_LINE_SPACE → HEADER_LINE_VALUE → HEADER_LINE_LF }*
//!   → HEADERS_END_LF → BODY_START → BODY
//! ```

use crate::http::request::{Request, SUPPORTED_VERSION};

/// Upper bound for the request line plus headers.
pub const MAX_HEAD_BYTES: usize = 64 * 1024;

/// Default cap on captured body bytes (1 MiB).
pub const DEFAULT_BODY_CAP: usize = 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("invalid request: unexpected byte {byte:#04x} in {state}")]
    InvalidRequest { state: &'static str, byte: u8 },

    #[error("unsupported protocol version")]
    UnsupportedVersion,

    #[error("invalid Content-Length")]
    InvalidContentLength,

    #[error("request head exceeds {} bytes", MAX_HEAD_BYTES)]
    HeadTooLarge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseStatus {
    /// More bytes are needed.
    Incomplete,
    /// The request, body included, is complete. Later bytes are ignored.
    Complete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    MethodStart,
    Method,
    UriStart,
    Uri,
    HttpVersion,
    RequestLineCrlf,
    RequestLineLf,
    HeaderLineStart,
    HeaderLineKey,
    HeaderLineSpace,
    HeaderLineValue,
    HeaderLineLf,
    HeadersEndLf,
    BodyStart,
    Body,
    Done,
}

impl State {
    fn name(self) -> &'static str {
        match self {
            State::MethodStart => "METHOD_START",
            State::Method => "METHOD",
            State::UriStart => "URI_START",
            State::Uri => "URI",
            State::HttpVersion => "HTTP_VERSION",
            State::RequestLineCrlf => "REQUEST_LINE_CRLF",
            State::RequestLineLf => "REQUEST_LINE_LF",
            State::HeaderLineStart => "HEADER_LINE_START",
            State::HeaderLineKey => "HEADER_LINE_KEY",
            State::HeaderLineSpace => "HEADER_LINE_SPACE",
            State::HeaderLineValue => "HEADER_LINE_VALUE",
            State::HeaderLineLf => "HEADER_LINE_LF",
            State::HeadersEndLf => "HEADERS_END_LF",
            State::BodyStart => "BODY_START",
            State::Body => "BODY",
            State::Done => "DONE",
        }
    }
}

fn is_ctl(b: u8) -> bool {
    b < 32 || b == 127
}

fn is_separator(b: u8) -> bool {
    matches!(
        b,
        b'(' | b')'
            | b'<'
            | b'>'
            | b'@'
            | b','
            | b';'
            | b':'
            | b'"'
            | b'/'
            | b'['
            | b']'
            | b'?'
            | b'='
            | b'{'
            | b'}'
            | b' '
            | b'\\'
            | b'\t'
    )
}

pub struct RequestParser {
    state: State,
    request: Request,
    path: Vec<u8>,
    header_key: Vec<u8>,
    header_value: Vec<u8>,
    version_index: usize,
    head_bytes: usize,
    body_cap: usize,
    failure: Option<ParseError>,
}

impl RequestParser {
    pub fn new() -> Self {
        Self::with_body_cap(DEFAULT_BODY_CAP)
    }

    /// Bodies announced larger than `body_cap` are not captured: the
    /// request completes right after its headers so the caller can reject
    /// it without buffering.
    pub fn with_body_cap(body_cap: usize) -> Self {
        Self {
            state: State::MethodStart,
            request: Request::default(),
            path: Vec::new(),
            header_key: Vec::new(),
            header_value: Vec::new(),
            version_index: 0,
            head_bytes: 0,
            body_cap,
            failure: None,
        }
    }

    /// Bytes taken by the request line and headers so far.
    pub fn head_len(&self) -> usize {
        self.head_bytes
    }

    pub fn into_request(self) -> Request {
        self.request
    }

    pub fn is_finished(&self) -> bool {
        self.state == State::Done
    }

    /// Consumes the next slice of the request.
    ///
    /// Returns [`ParseStatus::Incomplete`] until the whole request has been
    /// seen. A failure is terminal: every later call reports it again.
    pub fn feed(&mut self, data: &[u8]) -> Result<ParseStatus, ParseError> {
        if let Some(err) = &self.failure {
            return Err(err.clone());
        }
        match self.advance(data) {
            Ok(status) => Ok(status),
            Err(err) => {
                self.failure = Some(err.clone());
                Err(err)
            }
        }
    }

    fn advance(&mut self, data: &[u8]) -> Result<ParseStatus, ParseError> {
        let mut i = 0;
        while i < data.len() {
            match self.state {
                State::Done => break,
                State::Body => {
                    let wanted = self.request.body_size - self.request.body.len();
                    let take = wanted.min(data.len() - i);
                    self.request.body.extend_from_slice(&data[i..i + take]);
                    i += take;
                    if self.request.body.len() == self.request.body_size {
                        self.finish();
                    }
                }
                _ => {
                    self.head_bytes += 1;
                    if self.head_bytes > MAX_HEAD_BYTES {
                        return Err(ParseError::HeadTooLarge);
                    }
                    self.step(data[i])?;
                    i += 1;
                    if self.state == State::BodyStart {
                        self.start_body()?;
                    }
                }
            }
        }

        Ok(if self.is_finished() {
            ParseStatus::Complete
        } else {
            ParseStatus::Incomplete
        })
    }

    fn fail(&self, byte: u8) -> ParseError {
        ParseError::InvalidRequest {
            state: self.state.name(),
            byte,
        }
    }

    fn step(&mut self, c: u8) -> Result<(), ParseError> {
        match self.state {
            State::MethodStart => {
                if !c.is_ascii_uppercase() {
                    return Err(self.fail(c));
                }
                self.request.method.push(c as char);
                self.state = State::Method;
            }

            State::Method => {
                if c == b' ' {
                    self.state = State::UriStart;
                } else if c.is_ascii_uppercase() {
                    self.request.method.push(c as char);
                } else {
                    return Err(self.fail(c));
                }
            }

            State::UriStart => {
                if is_ctl(c) || c == b' ' {
                    return Err(self.fail(c));
                }
                self.path.push(c);
                self.state = State::Uri;
            }

            State::Uri => {
                if c == b' ' {
                    self.request.path = String::from_utf8_lossy(&self.path).into_owned();
                    self.state = State::HttpVersion;
                } else if is_ctl(c) {
                    return Err(self.fail(c));
                } else {
                    self.path.push(c);
                }
            }

            State::HttpVersion => {
                let expected = SUPPORTED_VERSION.as_bytes();
                if c != expected[self.version_index] {
                    return Err(ParseError::UnsupportedVersion);
                }
                self.version_index += 1;
                if self.version_index == expected.len() {
                    self.request.version = SUPPORTED_VERSION.to_string();
                    self.state = State::RequestLineCrlf;
                }
            }

            State::RequestLineCrlf => match c {
                b'\r' => self.state = State::RequestLineLf,
                b'\n' => self.state = State::HeaderLineStart,
                _ => return Err(self.fail(c)),
            },

            State::RequestLineLf => {
                if c != b'\n' {
                    return Err(self.fail(c));
                }
                self.state = State::HeaderLineStart;
            }

            State::HeaderLineStart => {
                if c == b'\r' {
                    self.state = State::HeadersEndLf;
                } else if c == b'\n' {
                    self.state = State::BodyStart;
                } else if !c.is_ascii_alphanumeric() {
                    return Err(self.fail(c));
                } else {
                    self.header_key.clear();
                    self.header_key.push(c);
                    self.state = State::HeaderLineKey;
                }
            }

            State::HeaderLineKey => {
                if c == b':' {
                    self.state = State::HeaderLineSpace;
                } else if is_ctl(c) || is_separator(c) {
                    return Err(self.fail(c));
                } else {
                    self.header_key.push(c);
                }
            }

            State::HeaderLineSpace => {
                if c != b' ' {
                    return Err(self.fail(c));
                }
                self.header_value.clear();
                self.state = State::HeaderLineValue;
            }

            State::HeaderLineValue => match c {
                b'\r' => self.state = State::HeaderLineLf,
                b'\n' => {
                    self.commit_header();
                    self.state = State::HeaderLineStart;
                }
                c if is_ctl(c) => return Err(self.fail(c)),
                c => self.header_value.push(c),
            },

            State::HeaderLineLf => {
                if c != b'\n' {
                    return Err(self.fail(c));
                }
                self.commit_header();
                self.state = State::HeaderLineStart;
            }

            State::HeadersEndLf => {
                if c != b'\n' {
                    return Err(self.fail(c));
                }
                self.state = State::BodyStart;
            }

            // Handled by `advance` without going through `step`.
            State::BodyStart | State::Body | State::Done => {}
        }
        Ok(())
    }

    fn commit_header(&mut self) {
        let key = String::from_utf8_lossy(&self.header_key).into_owned();
        let value = String::from_utf8_lossy(&self.header_value).into_owned();
        self.request.set_header(key, value);
    }

    fn start_body(&mut self) -> Result<(), ParseError> {
        let declared = match self.request.content_length() {
            None => 0,
            Some(Ok(n)) => n,
            Some(Err(_)) => return Err(ParseError::InvalidContentLength),
        };
        self.request.body_size = declared;

        if declared == 0 || declared > self.body_cap {
            self.finish();
        } else {
            self.request.body.reserve(declared);
            self.state = State::Body;
        }
        Ok(())
    }

    fn finish(&mut self) {
        self.request.finished = true;
        self.state = State::Done;
    }
}

impl Default for RequestParser {
    fn default() -> Self {
        Self::new()
    }
}
