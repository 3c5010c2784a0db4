//! Per-host access and error log files.
//!
//! Every response is also reported through `tracing`; the files are only
//! written when the host configures `access_log` / `error_log`.

use std::net::SocketAddr;
use std::path::Path;

use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use crate::config::VirtualHost;
use crate::http::parser::ParseError;
use crate::http::request::Request;
use crate::http::response::StatusCode;

pub fn access_line(peer: SocketAddr, request: &Request, status: StatusCode, bytes: u64) -> String {
    format!(
        "{peer} \"{} {} {}\" {} {bytes}\n",
        request.method,
        request.path,
        request.version,
        status.as_u16()
    )
}

async fn append(path: &Path, line: &str) {
    let result: std::io::Result<()> = async {
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        file.write_all(line.as_bytes()).await
    }
    .await;

    if let Err(e) = result {
        warn!(path = %path.display(), error = %e, "Failed to write log file");
    }
}

pub async fn record(
    host: &VirtualHost,
    peer: SocketAddr,
    request: &Request,
    status: StatusCode,
    bytes: u64,
) {
    info!(
        %peer,
        method = %request.method,
        path = %request.path,
        status = status.as_u16(),
        bytes,
        "Response sent"
    );

    let line = access_line(peer, request, status, bytes);
    if let Some(path) = &host.access_log {
        append(path, &line).await;
    }
    if status.as_u16() >= 500 {
        if let Some(path) = &host.error_log {
            append(path, &line).await;
        }
    }
}

pub async fn record_parse_failure(host: &VirtualHost, peer: SocketAddr, error: &ParseError) {
    warn!(%peer, error = %error, "Rejected malformed request");
    if let Some(path) = &host.error_log {
        append(path, &format!("{peer} {error}\n")).await;
    }
}
