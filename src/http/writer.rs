use std::io;

use bytes::{Bytes, BytesMut};
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;

use crate::http::response::{Body, Response};

/// Body bytes queued per send.
pub const TRANSFER_WINDOW: usize = 125_000;

enum Source {
    Memory(Bytes),
    File(File),
    Nothing,
}

/// Streams one [`Response`] in windows: the first window carries the head
/// and up to `window` body bytes, every later one the next `window` bytes,
/// until the declared length has been sent.
pub struct ResponseWriter {
    response: Response,
    source: Source,
    head: Option<Vec<u8>>,
    content_length: u64,
    body_sent: u64,
    bytes_sent: u64,
    window: usize,
}

impl ResponseWriter {
    pub async fn open(response: Response) -> io::Result<Self> {
        Self::with_window(response, TRANSFER_WINDOW).await
    }

    pub async fn with_window(mut response: Response, window: usize) -> io::Result<Self> {
        let (source, content_length) = match &response.body {
            Body::Memory(bytes) => (Source::Memory(bytes.clone()), bytes.len() as u64),
            Body::File(path) => open_sized(path).await?,
            Body::Transient(tmp) => open_sized(tmp.path()).await?,
            Body::Unsupported => (Source::Nothing, 0),
        };

        let head = if response.is_unsupported() {
            response.finished = true;
            None
        } else {
            Some(response.head(content_length).into_bytes())
        };

        Ok(Self {
            response,
            source,
            head,
            content_length,
            body_sent: 0,
            bytes_sent: 0,
            window: window.max(1),
        })
    }

    pub fn response(&self) -> &Response {
        &self.response
    }

    pub fn content_length(&self) -> u64 {
        self.content_length
    }

    /// Head and body bytes handed out so far.
    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent
    }

    pub fn is_finished(&self) -> bool {
        self.response.finished
    }

    /// Produces the next window, or `None` once the response is finished.
    pub async fn next_chunk(&mut self) -> io::Result<Option<Bytes>> {
        if self.response.finished {
            return Ok(None);
        }

        let take = (self.content_length - self.body_sent).min(self.window as u64) as usize;
        let head = self.head.take().unwrap_or_default();
        let mut out = BytesMut::with_capacity(head.len() + take);
        out.extend_from_slice(&head);

        match &mut self.source {
            Source::Memory(bytes) => {
                let start = self.body_sent as usize;
                out.extend_from_slice(&bytes[start..start + take]);
            }
            Source::File(file) => {
                let mut buf = Vec::with_capacity(take);
                (&mut *file).take(take as u64).read_to_end(&mut buf).await?;
                if buf.len() < take {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "file shrank while it was being sent",
                    ));
                }
                out.extend_from_slice(&buf);
            }
            Source::Nothing => {}
        }

        self.body_sent += take as u64;
        self.bytes_sent += out.len() as u64;
        if self.body_sent == self.content_length {
            self.response.finished = true;
            self.response.in_progress = false;
        } else {
            self.response.in_progress = true;
        }
        Ok(Some(out.freeze()))
    }

    /// Sends the next window on write readiness. Returns `false` once
    /// nothing is left to send.
    pub async fn send_window(&mut self, stream: &TcpStream) -> io::Result<bool> {
        let Some(chunk) = self.next_chunk().await? else {
            return Ok(false);
        };

        let mut written = 0;
        while written < chunk.len() {
            stream.writable().await?;
            match stream.try_write(&chunk[written..]) {
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "connection closed while writing",
                    ));
                }
                Ok(n) => written += n,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => continue,
                Err(e) => return Err(e),
            }
        }

        Ok(!self.is_finished())
    }
}

async fn open_sized(path: &std::path::Path) -> io::Result<(Source, u64)> {
    let file = File::open(path).await?;
    let len = file.metadata().await?.len();
    Ok((Source::File(file), len))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::response::StatusCode;

    fn text(chunk: &Bytes) -> String {
        String::from_utf8_lossy(chunk).into_owned()
    }

    #[tokio::test]
    async fn small_body_goes_out_in_one_send() {
        let resp = Response::page(StatusCode::OK, "hello");
        let mut writer = ResponseWriter::with_window(resp, 16).await.unwrap();

        let first = writer.next_chunk().await.unwrap().unwrap();
        assert!(text(&first).ends_with("Content-Length: 5\n\nhello"));
        assert!(writer.is_finished());
        assert!(writer.next_chunk().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn large_body_is_split_into_windows() {
        let resp = Response::page(StatusCode::OK, "abcdefghij");
        let mut writer = ResponseWriter::with_window(resp, 4).await.unwrap();

        let first = writer.next_chunk().await.unwrap().unwrap();
        assert!(text(&first).ends_with("Content-Length: 10\n\nabcd"));
        assert!(writer.response().in_progress);
        assert!(!writer.is_finished());

        assert_eq!(writer.next_chunk().await.unwrap().unwrap(), "efgh");
        assert_eq!(writer.next_chunk().await.unwrap().unwrap(), "ij");
        assert!(writer.is_finished());
        assert!(!writer.response().in_progress);
        assert!(writer.next_chunk().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn file_body_is_streamed() {
        let path = std::env::temp_dir().join(format!("webserv-writer-{}.txt", std::process::id()));
        std::fs::write(&path, b"0123456789").unwrap();

        let mut resp = Response::page(StatusCode::OK, "");
        resp.body = Body::File(path.clone());
        let mut writer = ResponseWriter::with_window(resp, 6).await.unwrap();
        assert_eq!(writer.content_length(), 10);

        let first = writer.next_chunk().await.unwrap().unwrap();
        assert!(text(&first).ends_with("\n\n012345"));
        assert_eq!(writer.next_chunk().await.unwrap().unwrap(), "6789");
        assert!(writer.is_finished());

        std::fs::remove_file(path).unwrap();
    }

    #[tokio::test]
    async fn unsupported_body_sends_nothing() {
        let mut resp = Response::page(StatusCode::OK, "");
        resp.body = Body::Unsupported;
        let mut writer = ResponseWriter::open(resp).await.unwrap();

        assert!(writer.is_finished());
        assert!(writer.next_chunk().await.unwrap().is_none());
        assert_eq!(writer.bytes_sent(), 0);
    }
}
