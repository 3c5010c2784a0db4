use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::BytesMut;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc::UnboundedSender;
use tokio::time::{Duration, Instant, timeout_at};

use crate::handler::{self, ResponseBuilder};
use crate::http::parser::{ParseError, ParseStatus, RequestParser};
use crate::http::request::Request;
use crate::http::response::StatusCode;
use crate::http::writer::ResponseWriter;
use crate::server::access_log;
use crate::server::binding::Binding;
use crate::server::manager::{ConnEvent, ConnId};

const READ_CHUNK: usize = 4096;

/// Upper bounds for discarding a body that was answered without being read.
const DRAIN_LIMIT: usize = 4 * 1024 * 1024;
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// One accepted socket, serving a single request.
pub struct Connection {
    id: ConnId,
    stream: TcpStream,
    peer: SocketAddr,
    binding: Arc<Binding>,
    buffer: BytesMut,
    parser: RequestParser,
    /// Bytes read from the socket so far.
    received: usize,
    /// Announced body bytes still in flight after the request completed.
    unread: usize,
    state: ConnectionState,
    events: UnboundedSender<ConnEvent>,
}

pub enum ConnectionState {
    Reading,
    Processing(Request),
    Writing(ResponseWriter),
    Closed,
}

impl Connection {
    pub fn new(
        id: ConnId,
        stream: TcpStream,
        peer: SocketAddr,
        binding: Arc<Binding>,
        events: UnboundedSender<ConnEvent>,
    ) -> Self {
        let parser = RequestParser::with_body_cap(binding.body_cap());
        Self {
            id,
            stream,
            peer,
            binding,
            buffer: BytesMut::with_capacity(READ_CHUNK),
            parser,
            received: 0,
            unread: 0,
            state: ConnectionState::Reading,
            events,
        }
    }

    fn touch(&self) {
        let _ = self.events.send(ConnEvent::Active(self.id));
    }

    pub async fn run(mut self) -> anyhow::Result<()> {
        loop {
            match std::mem::replace(&mut self.state, ConnectionState::Closed) {
                ConnectionState::Reading => {
                    self.state = match self.read_request().await? {
                        Some(Ok(request)) => ConnectionState::Processing(request),
                        Some(Err(e)) => self.reject(e).await?,
                        None => ConnectionState::Closed,
                    };
                }

                ConnectionState::Processing(request) => {
                    self.state = self.process(request).await?;
                }

                ConnectionState::Writing(mut writer) => {
                    while writer.send_window(&self.stream).await? {
                        self.touch();
                    }
                    self.touch();
                    if self.unread > 0 {
                        self.drain().await?;
                    }
                    self.state = ConnectionState::Closed;
                }

                ConnectionState::Closed => break,
            }
        }
        Ok(())
    }

    /// Reads on readiness until the parser reports a complete request or a
    /// failure. `None` means the peer closed first.
    async fn read_request(&mut self) -> anyhow::Result<Option<Result<Request, ParseError>>> {
        loop {
            self.stream.readable().await?;
            self.buffer.reserve(READ_CHUNK);
            match self.stream.try_read_buf(&mut self.buffer) {
                Ok(0) => return Ok(None),
                Ok(n) => {
                    self.received += n;
                    self.touch();
                    let status = self.parser.feed(&self.buffer);
                    self.buffer.clear();
                    match status {
                        Ok(ParseStatus::Complete) => {
                            let parser = std::mem::take(&mut self.parser);
                            let head_len = parser.head_len();
                            let request = parser.into_request();
                            if request.body.len() < request.body_size {
                                self.unread = (head_len + request.body_size)
                                    .saturating_sub(self.received);
                            }
                            return Ok(Some(Ok(request)));
                        }
                        Ok(ParseStatus::Incomplete) => continue,
                        Err(e) => return Ok(Some(Err(e))),
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Reads and discards a body the response was sent without, so the peer
    /// sees the response and a clean close instead of a reset.
    async fn drain(&mut self) -> io::Result<()> {
        self.stream.shutdown().await?;
        let deadline = Instant::now() + DRAIN_TIMEOUT;
        let mut left = self.unread.min(DRAIN_LIMIT);
        tracing::debug!(peer = %self.peer, unread = self.unread, "Draining unread body");

        while left > 0 {
            match timeout_at(deadline, self.stream.readable()).await {
                Ok(ready) => ready?,
                Err(_) => break,
            }
            self.buffer.clear();
            self.buffer.reserve(READ_CHUNK);
            match self.stream.try_read_buf(&mut self.buffer) {
                Ok(0) => break,
                Ok(n) => left = left.saturating_sub(n),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    async fn reject(&mut self, error: ParseError) -> anyhow::Result<ConnectionState> {
        let host = self.binding.default_host().clone();
        access_log::record_parse_failure(&host, self.peer, &error).await;

        let status = match error {
            ParseError::UnsupportedVersion => StatusCode::VERSION_NOT_SUPPORTED,
            ParseError::HeadTooLarge => StatusCode::HEADERS_TOO_LARGE,
            ParseError::InvalidRequest { .. } | ParseError::InvalidContentLength => {
                StatusCode::BAD_REQUEST
            }
        };
        let writer = ResponseWriter::open(handler::rejection(&host, status)).await?;
        Ok(ConnectionState::Writing(writer))
    }

    async fn process(&mut self, request: Request) -> anyhow::Result<ConnectionState> {
        let host = self.binding.select(&request.host).clone();
        let response = ResponseBuilder::new(&host, &request).build().await;

        let writer = match ResponseWriter::open(response).await {
            Ok(writer) => writer,
            Err(e) => {
                tracing::warn!(path = %request.path, error = %e, "Failed to open response body");
                let fallback = handler::rejection(&host, StatusCode::INTERNAL_SERVER_ERROR);
                ResponseWriter::open(fallback).await?
            }
        };

        if writer.response().is_unsupported() {
            return Ok(ConnectionState::Closed);
        }

        access_log::record(
            &host,
            self.peer,
            &request,
            writer.response().status,
            writer.content_length(),
        )
        .await;
        Ok(ConnectionState::Writing(writer))
    }
}
