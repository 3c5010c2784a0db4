//! CGI execution.
//!
//! The interpreter runs with the script path as its argument, the request
//! body on stdin and stdout redirected into a [`TransientFile`] that becomes
//! the response body. The child is awaited on the event loop and killed if
//! it outlives the host timeout.

use std::io;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::timeout;

use crate::config::VirtualHost;
use crate::handler::target::Target;
use crate::http::request::Request;
use crate::http::response::TransientFile;

#[derive(Debug, thiserror::Error)]
pub enum CgiError {
    #[error("failed to prepare CGI output: {0}")]
    Output(#[source] io::Error),

    #[error("failed to spawn {interpreter}: {source}")]
    Spawn {
        interpreter: String,
        #[source]
        source: io::Error,
    },

    #[error("CGI exited with {0}")]
    Exit(ExitStatus),

    #[error("CGI did not finish within {0:?}")]
    Timeout(Duration),

    #[error("CGI wait failed: {0}")]
    Wait(#[source] io::Error),
}

pub struct Script<'a> {
    pub interpreter: &'a str,
    pub path: &'a Path,
    pub request: &'a Request,
    pub target: &'a Target,
    pub host: &'a VirtualHost,
}

impl Script<'_> {
    fn environment(&self) -> Vec<(&'static str, String)> {
        let request = self.request;
        vec![
            ("GATEWAY_INTERFACE", "CGI/1.1".to_string()),
            ("REDIRECT_STATUS", "200".to_string()),
            ("REQUEST_METHOD", request.method.clone()),
            ("QUERY_STRING", self.target.query().unwrap_or_default().to_string()),
            ("CONTENT_LENGTH", request.body.len().to_string()),
            (
                "CONTENT_TYPE",
                request.header("Content-Type").unwrap_or_default().to_string(),
            ),
            ("SCRIPT_FILENAME", self.path.display().to_string()),
            ("SCRIPT_NAME", self.target.path().to_string()),
            ("SERVER_PROTOCOL", request.version.clone()),
            (
                "SERVER_NAME",
                self.host.server_names.first().cloned().unwrap_or_default(),
            ),
            ("SERVER_PORT", self.host.port.to_string()),
        ]
    }

    pub async fn run(&self) -> Result<TransientFile, CgiError> {
        let (output, stdout) = TransientFile::create("cgi").map_err(CgiError::Output)?;

        let mut child = Command::new(self.interpreter)
            .arg(self.path)
            .envs(self.environment())
            .stdin(Stdio::piped())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| CgiError::Spawn {
                interpreter: self.interpreter.to_string(),
                source,
            })?;

        tracing::debug!(
            interpreter = self.interpreter,
            script = %self.path.display(),
            pid = child.id(),
            "CGI started"
        );

        let stdin = child.stdin.take();
        let body = &self.request.body;
        let limit = self.host.timeout();

        let status = timeout(limit, async {
            if let Some(mut stdin) = stdin {
                // The script may exit without reading its input.
                if let Err(e) = stdin.write_all(body).await {
                    if e.kind() != io::ErrorKind::BrokenPipe {
                        tracing::debug!(error = %e, "CGI stdin write failed");
                    }
                }
            }
            child.wait().await
        })
        .await
        .map_err(|_| CgiError::Timeout(limit))?
        .map_err(CgiError::Wait)?;

        if !status.success() {
            return Err(CgiError::Exit(status));
        }
        Ok(output)
    }
}
